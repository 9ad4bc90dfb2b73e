// SPDX-FileCopyrightText: Copyright © 2025 Serpent OS Developers
//
// SPDX-License-Identifier: MPL-2.0

//! Table and value formatting shared by the device and host listings

use std::{
    collections::BTreeMap,
    io::{self, Write},
};

use itertools::Itertools;
use serde::Serialize;

/// Placeholder for a value that could not be read
pub const MISSING: &str = "-";

/// Short peripheral device type name for the table column
pub fn short_type(pdt: u8) -> String {
    let name = match pdt {
        0x00 => "disk",
        0x01 => "tape",
        0x02 => "printer",
        0x03 => "process",
        0x04 => "worm",
        0x05 => "cd/dvd",
        0x06 => "scanner",
        0x07 => "optical",
        0x08 => "mediumx",
        0x09 => "comms",
        0x0c => "storage",
        0x0d => "enclosu",
        0x0e => "sim dsk",
        0x0f => "opti rd",
        0x10 => "bridge",
        0x11 => "osd",
        0x12 => "adi",
        0x13 => "sec man",
        0x14 => "zbc",
        0x1e => "wlun",
        0x1f => "no dev",
        other => return format!("(0x{other:x})"),
    };
    name.to_owned()
}

/// Peripheral device type name as shown by `/proc/scsi/scsi`
pub fn classic_type(pdt: u8) -> &'static str {
    match pdt {
        0x00 => "Direct-Access",
        0x01 => "Sequential-Access",
        0x02 => "Printer",
        0x03 => "Processor",
        0x04 => "WORM",
        0x05 => "CD-ROM",
        0x06 => "Scanner",
        0x07 => "Optical Device",
        0x08 => "Medium Changer",
        0x09 => "Communications",
        0x0a | 0x0b => "ASC IT8",
        0x0c => "RAID",
        0x0d => "Enclosure",
        0x0e => "Direct-Access-RBC",
        0x0f => "Optical card",
        0x10 => "Bridge controller",
        0x11 => "Object storage",
        0x12 => "Automation/Drive",
        0x13 => "Security Manager",
        0x14 => "Zoned Block",
        0x1e => "Well known LU",
        0x1f => "No Device",
        _ => "Unknown",
    }
}

/// Format a byte count with decimal SI units and three significant digits
///
/// # Examples
///
/// `format_size(1_000_204_886_016)` is `1.00TB`, `format_size(512)` is `512B`
pub fn format_size(size: u64) -> String {
    const UNITS: [&str; 6] = ["B", "kB", "MB", "GB", "TB", "PB"];

    let mut value = size as f64;
    let mut unit = 0;
    while value >= 1000.0 && unit < UNITS.len() - 1 {
        value /= 1000.0;
        unit += 1;
    }

    if unit == 0 {
        format!("{size}B")
    } else if value < 10.0 {
        format!("{value:.2}{}", UNITS[unit])
    } else if value < 100.0 {
        format!("{value:.1}{}", UNITS[unit])
    } else {
        format!("{value:.0}{}", UNITS[unit])
    }
}

/// A table line built from left aligned, padded columns
#[derive(Debug, Default)]
pub struct Line {
    text: String,
}

impl Line {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `value` padded to `width`, always followed by at least one space
    pub fn column(mut self, value: &str, width: usize) -> Self {
        self.text.push_str(&format!("{value:<width$}"));
        if value.chars().count() >= width {
            self.text.push(' ');
        }
        self
    }

    /// Append `value` right aligned within `width`
    pub fn right(mut self, value: &str, width: usize) -> Self {
        self.text.push_str(&format!("{value:>width$}"));
        self
    }

    /// The finished line without trailing padding
    pub fn finish(self) -> String {
        self.text.trim_end().to_owned()
    }
}

/// Value or the missing placeholder
pub fn or_missing(value: Option<&str>) -> &str {
    value.filter(|v| !v.is_empty()).unwrap_or(MISSING)
}

/// Write `name=value` attribute lines, or a single line of them when `inline` is set
pub fn write_attributes<W: Write>(out: &mut W, attributes: &BTreeMap<String, String>, inline: bool) -> io::Result<()> {
    if attributes.is_empty() {
        return Ok(());
    }

    if inline {
        let joined = attributes.iter().map(|(k, v)| format!("{k}={v}")).join(" ");
        writeln!(out, "  {joined}")
    } else {
        attributes
            .iter()
            .try_for_each(|(name, value)| writeln!(out, "  {name}={value}"))
    }
}

/// Write records as a pretty printed JSON array
pub fn write_json<W: Write, T: Serialize>(out: &mut W, records: &[T]) -> io::Result<()> {
    serde_json::to_writer_pretty(&mut *out, records)?;
    writeln!(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_type_names() {
        assert_eq!(short_type(0), "disk");
        assert_eq!(short_type(0x0d), "enclosu");
        assert_eq!(short_type(0x0a), "(0xa)");
        assert_eq!(short_type(0x1f), "no dev");
        assert_eq!(classic_type(5), "CD-ROM");
        assert_eq!(classic_type(0x17), "Unknown");
    }

    #[test]
    fn test_format_size() {
        assert_eq!(format_size(512), "512B");
        assert_eq!(format_size(1_000_204_886_016), "1.00TB");
        assert_eq!(format_size(500_107_862_016), "500GB");
        assert_eq!(format_size(32_017_047_552), "32.0GB");
        assert_eq!(format_size(4_096_000), "4.10MB");
    }

    #[test]
    fn test_line() {
        let line = Line::new()
            .column("[0:0:0:0]", 13)
            .column("disk", 8)
            .right("1.00TB", 8)
            .column("", 4)
            .finish();
        assert_eq!(line, "[0:0:0:0]    disk      1.00TB");

        let line = Line::new().column("LSILOGIC", 8).column("Logical Volume", 4).finish();
        assert_eq!(line, "LSILOGIC Logical Volume");
    }

    #[test]
    fn test_attributes() {
        let attributes = BTreeMap::from([
            ("state".to_owned(), "running".to_owned()),
            ("queue_depth".to_owned(), "32".to_owned()),
        ]);
        let mut out = Vec::new();
        write_attributes(&mut out, &attributes, true).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "  queue_depth=32 state=running\n");

        let mut out = Vec::new();
        write_attributes(&mut out, &attributes, false).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "  queue_depth=32\n  state=running\n");
    }
}
