// SPDX-FileCopyrightText: Copyright © 2025 Serpent OS Developers
//
// SPDX-License-Identifier: MPL-2.0

//! `host:channel:target:lun` addressing
//!
//! SCSI devices are named in sysfs by their address tuple (e.g. `2:0:3:0`).
//! NVMe namespaces are folded into the same space using a reserved host number,
//! with the controller index as channel, the controller id as target and the
//! namespace id as LUN.

use std::{cmp::Ordering, fmt, str::FromStr};

use crate::{lun, Error, Lun};

/// Host number reserved for NVMe entries, rendered as `N`
pub const NVME_HOST: i32 = 0x7fff;

/// Textual form of an unset field
const UNSET: &str = "-1";

/// An address identifying a SCSI device or host (or an NVMe analogue).
///
/// Unset fields act as wildcards when the tuple is used as a filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct AddressTuple {
    host: Option<i32>,
    channel: Option<i32>,
    target: Option<i32>,
    lun: Lun,
}

/// Selection of fields to render
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Fields {
    pub host: bool,
    pub channel: bool,
    pub target: bool,
    pub lun: bool,
}

impl Fields {
    /// All four fields
    pub const ALL: Fields = Fields {
        host: true,
        channel: true,
        target: true,
        lun: true,
    };

    /// Host only, as used for host listings
    pub const HOST: Fields = Fields {
        host: true,
        channel: false,
        target: false,
        lun: false,
    };

    /// Host and channel, as used for NVMe controllers
    pub const HOST_CHANNEL: Fields = Fields {
        host: true,
        channel: true,
        target: false,
        lun: false,
    };
}

/// Rendering of the LUN field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LunStyle {
    /// Plain decimal integer
    #[default]
    Decimal,
    /// T10 hex with `_` between addressing levels, e.g. `0x0122_0033`
    T10Hex,
    /// All eight bytes as 16 hex digits
    FullHex,
}

impl AddressTuple {
    /// Create a SCSI address. Negative fields are left unset, as when parsed.
    pub fn new(host: i32, channel: i32, target: i32, lun: u64) -> Self {
        Self {
            host: field(host),
            channel: field(channel),
            target: field(target),
            lun: Lun::scsi(lun),
        }
    }

    /// Create an NVMe address from controller index, controller id and namespace id
    pub fn nvme(controller: i32, cntlid: u16, nsid: u32) -> Self {
        Self {
            host: Some(NVME_HOST),
            channel: field(controller),
            target: Some(i32::from(cntlid)),
            lun: Lun::nvme(nsid),
        }
    }

    /// A tuple with every field unset
    pub fn unset() -> Self {
        Self::default()
    }

    /// Reset every field to unset
    pub fn invalidate(&mut self) {
        *self = Self::unset();
    }

    pub fn host(&self) -> Option<i32> {
        self.host
    }

    pub fn channel(&self) -> Option<i32> {
        self.channel
    }

    pub fn target(&self) -> Option<i32> {
        self.target
    }

    pub fn lun(&self) -> &Lun {
        &self.lun
    }

    /// Whether this address belongs to the NVMe space
    pub fn is_nvme(&self) -> bool {
        self.host == Some(NVME_HOST)
    }

    /// Whether every field is set
    pub fn is_complete(&self) -> bool {
        self.host.is_some() && self.channel.is_some() && self.target.is_some() && self.lun.is_set()
    }

    /// Fields with their serialized sentinels, in comparison order
    fn key(&self) -> (i32, i32, i32, u64) {
        (
            self.host.unwrap_or(-1),
            self.channel.unwrap_or(-1),
            self.target.unwrap_or(-1),
            self.lun.raw(),
        )
    }

    /// Test this address against a filter; unset filter fields match anything
    pub fn matches(&self, filter: &AddressTuple) -> bool {
        fn field<T: PartialEq>(want: Option<T>, have: Option<T>) -> bool {
            want.is_none() || want == have
        }

        field(filter.host, self.host)
            && field(filter.channel, self.channel)
            && field(filter.target, self.target)
            && field(filter.lun.value(), self.lun.value())
    }

    /// Render the selected fields joined by `:`
    pub fn format(&self, fields: Fields, style: LunStyle) -> String {
        let mut parts: Vec<String> = Vec::with_capacity(4);

        if fields.host {
            parts.push(match self.host {
                Some(NVME_HOST) => "N".to_owned(),
                host => signed(host),
            });
        }
        if fields.channel {
            parts.push(signed(self.channel));
        }
        if fields.target {
            parts.push(signed(self.target));
        }
        if fields.lun {
            parts.push(self.format_lun(style));
        }

        parts.join(":")
    }

    fn format_lun(&self, style: LunStyle) -> String {
        let Some(value) = self.lun.value() else {
            return UNSET.to_owned();
        };

        match style {
            LunStyle::Decimal => value.to_string(),
            // Namespace ids have no T10 structure
            LunStyle::T10Hex | LunStyle::FullHex if self.is_nvme() => format!("0x{value:x}"),
            LunStyle::T10Hex => lun::t10_hex(self.lun.bytes()),
            LunStyle::FullHex => lun::full_hex(self.lun.bytes()),
        }
    }

    /// Parse a CLI filter.
    ///
    /// Accepts either one argument holding up to four `:` separated components
    /// (optionally wrapped in `[...]`) or up to four separate arguments. Each
    /// component is a number, `N` for the host, or one of the wildcards `*`,
    /// `-` and `?`. Missing trailing components are wildcards.
    pub fn parse_filter<S: AsRef<str>>(args: &[S]) -> Result<Self, Error> {
        let joined = args.iter().map(AsRef::as_ref).collect::<Vec<_>>().join(":");
        let text = joined.trim();
        let text = text
            .strip_prefix('[')
            .and_then(|t| t.strip_suffix(']'))
            .unwrap_or(text);

        let mut filter = Self::unset();
        if text.is_empty() {
            return Ok(filter);
        }

        let parts: Vec<&str> = text.split(':').collect();
        if parts.len() > 4 {
            return Err(Error::parse(text, "more than four components"));
        }

        for (index, part) in parts.into_iter().enumerate() {
            if matches!(part, "*" | "-" | "?" | "") {
                continue;
            }
            match index {
                0 => filter.host = parse_host(part, text)?,
                1 => filter.channel = parse_signed(part, text)?,
                2 => filter.target = parse_signed(part, text)?,
                _ => filter.lun = parse_lun(part, text, filter.is_nvme())?,
            }
        }

        Ok(filter)
    }
}

fn field(value: i32) -> Option<i32> {
    (value >= 0).then_some(value)
}

fn signed(value: Option<i32>) -> String {
    value.map_or_else(|| UNSET.to_owned(), |v| v.to_string())
}

fn parse_host(part: &str, input: &str) -> Result<Option<i32>, Error> {
    if part.eq_ignore_ascii_case("n") {
        Ok(Some(NVME_HOST))
    } else {
        parse_signed(part, input)
    }
}

fn parse_signed(part: &str, input: &str) -> Result<Option<i32>, Error> {
    match part.trim().parse::<i32>() {
        Ok(-1) => Ok(None),
        Ok(value) if value >= 0 => Ok(Some(value)),
        Ok(_) => Err(Error::parse(input, "negative component")),
        Err(_) => Err(Error::parse(input, "component is not an integer")),
    }
}

fn parse_lun(part: &str, input: &str, nvme: bool) -> Result<Lun, Error> {
    let part = part.trim();
    if part == UNSET {
        return Ok(Lun::UNSET);
    }
    let value = part
        .parse::<u64>()
        .map_err(|_| Error::parse(input, "lun is not an unsigned integer"))?;

    match u32::try_from(value) {
        Ok(nsid) if nvme => Ok(Lun::nvme(nsid)),
        _ => Ok(Lun::scsi(value)),
    }
}

impl FromStr for AddressTuple {
    type Err = Error;

    /// Parse a full `host:channel:target:lun` tuple
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.splitn(4, ':').collect();
        let [host, channel, target, lun] = parts.as_slice() else {
            return Err(Error::parse(s, "expected four ':' separated components"));
        };

        let host = parse_host(host, s)?;
        Ok(Self {
            host,
            channel: parse_signed(channel, s)?,
            target: parse_signed(target, s)?,
            lun: parse_lun(lun, s, host == Some(NVME_HOST))?,
        })
    }
}

impl Ord for AddressTuple {
    fn cmp(&self, other: &Self) -> Ordering {
        self.key()
            .cmp(&other.key())
            .then_with(|| self.lun.bytes().cmp(other.lun.bytes()))
    }
}

impl PartialOrd for AddressTuple {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for AddressTuple {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.format(Fields::ALL, LunStyle::Decimal))
    }
}

/// Order sysfs entry names by their address; names that do not parse sort first.
pub fn compare_names(a: &str, b: &str) -> Ordering {
    a.parse::<AddressTuple>()
        .ok()
        .cmp(&b.parse::<AddressTuple>().ok())
        .then_with(|| a.cmp(b))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t(h: i32, c: i32, tg: i32, l: u64) -> AddressTuple {
        AddressTuple::new(h, c, tg, l)
    }

    #[test]
    fn test_parse() {
        let tuple: AddressTuple = "2:0:3:0".parse().unwrap();
        assert_eq!(tuple, t(2, 0, 3, 0));
        assert_eq!(tuple.host(), Some(2));
        assert_eq!(tuple.lun().bytes(), &[0; 8]);

        let nvme: AddressTuple = "n:1:4:2".parse().unwrap();
        assert!(nvme.is_nvme());
        assert_eq!(nvme, AddressTuple::nvme(1, 4, 2));

        let big: AddressTuple = "0:0:0:1073758208".parse().unwrap();
        assert_eq!(big.lun().bytes(), &[0x40, 0x00, 0x40, 0x00, 0, 0, 0, 0]);
    }

    #[test]
    fn test_constructors() {
        let wide: AddressTuple = "70000:0:2147483647:0".parse().unwrap();
        assert_eq!(t(70000, 0, i32::MAX, 0), wide);
        assert_eq!(wide.target(), Some(i32::MAX));

        let unset = t(-1, -1, 5, 0);
        assert_eq!(unset.host(), None);
        assert_eq!(unset.channel(), None);
        assert_eq!(unset.to_string(), "-1:-1:5:0");

        let nvme = AddressTuple::nvme(2, u16::MAX, 1);
        assert_eq!(nvme.target(), Some(65535));
        assert_eq!(nvme.format(Fields::ALL, LunStyle::Decimal), "N:2:65535:1");
    }

    #[test]
    fn test_parse_failures() {
        for bad in ["", "2", "2:0:3", "a:0:0:0", "0:x:0:0", "0:0:0:-5", "0:0:0:0:0", "-7:0:0:0"] {
            assert!(bad.parse::<AddressTuple>().is_err(), "{bad} should fail");
        }
    }

    #[test]
    fn test_round_trip() {
        for tuple in [t(0, 0, 0, 0), t(7, 1, 255, 49152), t(3, 2, 1, u64::MAX - 1), AddressTuple::nvme(0, 1, 1)] {
            let text = tuple.format(Fields::ALL, LunStyle::Decimal);
            assert_eq!(text.parse::<AddressTuple>().unwrap(), tuple, "{text}");
        }

        let unset_lun = t(1, 2, 3, u64::MAX);
        assert_eq!(unset_lun.to_string(), "1:2:3:-1");
        let parsed: AddressTuple = "1:2:3:-1".parse().unwrap();
        assert!(!parsed.lun().is_set());
        assert_eq!(parsed, unset_lun);
    }

    #[test]
    fn test_invalidate() {
        let mut tuple = t(1, 2, 3, 4);
        tuple.invalidate();
        assert_eq!(tuple.to_string(), "-1:-1:-1:-1");
        assert_eq!(tuple.lun().bytes(), &[0xff; 8]);
        assert!(!tuple.is_complete());
    }

    #[test]
    fn test_ordering() {
        assert_eq!(t(1, 0, 0, 0).cmp(&t(1, 0, 0, 1)), Ordering::Less);
        assert_eq!(t(2, 0, 0, 0).cmp(&t(1, 5, 5, 5)), Ordering::Greater);
        assert_eq!(t(1, 1, 1, 1).cmp(&t(1, 1, 1, 1)), Ordering::Equal);
        assert_eq!(t(0, 0, 2, 0).cmp(&t(0, 0, 10, 0)), Ordering::Less);

        let mut names = vec!["2:0:10:0", "host0", "2:0:2:0", "0:0:0:1", "10:0:0:0"];
        names.sort_by(|a, b| compare_names(a, b));
        assert_eq!(names, vec!["host0", "0:0:0:1", "2:0:2:0", "2:0:10:0", "10:0:0:0"]);
    }

    #[test]
    fn test_format() {
        let tuple = t(2, 0, 3, 0x0033_0122);
        assert_eq!(tuple.format(Fields::ALL, LunStyle::T10Hex), "2:0:3:0x0122_0033");
        assert_eq!(tuple.format(Fields::ALL, LunStyle::FullHex), "2:0:3:0x0122003300000000");
        assert_eq!(tuple.format(Fields::HOST, LunStyle::Decimal), "2");

        let nvme = AddressTuple::nvme(0, 4, 1);
        assert_eq!(nvme.to_string(), "N:0:4:1");
        assert_eq!(nvme.format(Fields::HOST_CHANNEL, LunStyle::Decimal), "N:0");
        assert_eq!(nvme.format(Fields::ALL, LunStyle::T10Hex), "N:0:4:0x1");
    }

    #[test]
    fn test_filters() {
        let all = AddressTuple::unset();
        let host2 = AddressTuple::parse_filter(&["2"]).unwrap();
        for tuple in [t(0, 0, 0, 0), t(2, 0, 3, 0), t(2, 1, 0, 7), AddressTuple::nvme(0, 1, 1)] {
            assert!(tuple.matches(&all));
            assert_eq!(tuple.matches(&host2), tuple.host() == Some(2));
        }

        let lun7 = AddressTuple::parse_filter(&["[*:*:*:7]"]).unwrap();
        assert!(t(2, 1, 0, 7).matches(&lun7));
        assert!(!t(2, 1, 0, 6).matches(&lun7));

        let split = AddressTuple::parse_filter(&["2", "-", "3"]).unwrap();
        assert!(t(2, 9, 3, 1).matches(&split));
        assert!(!t(2, 9, 4, 1).matches(&split));

        let nvme = AddressTuple::parse_filter(&["N:0"]).unwrap();
        assert!(AddressTuple::nvme(0, 5, 1).matches(&nvme));
        assert!(!AddressTuple::nvme(1, 5, 1).matches(&nvme));

        assert!(AddressTuple::parse_filter(&["1:2:3:4:5"]).is_err());
        assert!(AddressTuple::parse_filter(&["x"]).is_err());
        assert_eq!(AddressTuple::parse_filter::<&str>(&[]).unwrap(), all);
    }
}
