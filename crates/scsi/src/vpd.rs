// SPDX-FileCopyrightText: Copyright © 2025 Serpent OS Developers
//
// SPDX-License-Identifier: MPL-2.0

//! Device identification VPD page (0x83) decoding
//!
//! The kernel exposes the raw page as the `vpd_pg83` attribute of a SCSI device.
//! The page is a 4-byte header followed by a list of designation descriptors,
//! each a 4-byte header plus a variable length designator.

use std::fmt::Write;

use uuid::Uuid;
use zerocopy::{BigEndian, FromBytes, U16};

use crate::Error;

/// Page code of the device identification page
pub const PAGE_CODE: u8 = 0x83;

/// Protocol identifier used by iSCSI target ports
const PROTOCOL_ISCSI: u8 = 0x5;

/// VPD page header
#[derive(Debug, FromBytes)]
#[repr(C)]
struct PageHeader {
    peripheral: u8,
    page_code: u8,
    length: U16<BigEndian>,
}

/// Designation descriptor header
#[derive(Debug, FromBytes)]
#[repr(C)]
struct DescriptorHeader {
    protocol_code_set: u8,
    piv_association_type: u8,
    _reserved: u8,
    length: u8,
}

/// Which entity a designator names
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Association {
    LogicalUnit,
    TargetPort,
    TargetDevice,
    Reserved,
}

impl From<u8> for Association {
    fn from(value: u8) -> Self {
        match value & 0x3 {
            0 => Association::LogicalUnit,
            1 => Association::TargetPort,
            2 => Association::TargetDevice,
            _ => Association::Reserved,
        }
    }
}

/// Designator naming scheme
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DesignatorType {
    VendorSpecific,
    T10VendorId,
    Eui64,
    Naa,
    RelativeTargetPort,
    TargetPortGroup,
    LogicalUnitGroup,
    Md5LogicalUnit,
    ScsiName,
    ProtocolSpecificPort,
    Uuid,
    Reserved(u8),
}

impl From<u8> for DesignatorType {
    fn from(value: u8) -> Self {
        match value & 0xf {
            0x0 => DesignatorType::VendorSpecific,
            0x1 => DesignatorType::T10VendorId,
            0x2 => DesignatorType::Eui64,
            0x3 => DesignatorType::Naa,
            0x4 => DesignatorType::RelativeTargetPort,
            0x5 => DesignatorType::TargetPortGroup,
            0x6 => DesignatorType::LogicalUnitGroup,
            0x7 => DesignatorType::Md5LogicalUnit,
            0x8 => DesignatorType::ScsiName,
            0x9 => DesignatorType::ProtocolSpecificPort,
            0xa => DesignatorType::Uuid,
            other => DesignatorType::Reserved(other),
        }
    }
}

/// Encoding of the designator bytes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodeSet {
    Binary,
    Ascii,
    Utf8,
    Reserved(u8),
}

impl From<u8> for CodeSet {
    fn from(value: u8) -> Self {
        match value & 0xf {
            1 => CodeSet::Binary,
            2 => CodeSet::Ascii,
            3 => CodeSet::Utf8,
            other => CodeSet::Reserved(other),
        }
    }
}

/// Descriptor selection; `None` fields match anything
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Filter {
    pub association: Option<Association>,
    pub designator_type: Option<DesignatorType>,
    pub code_set: Option<CodeSet>,
}

impl Filter {
    /// Match every descriptor
    pub const ANY: Filter = Filter {
        association: None,
        designator_type: None,
        code_set: None,
    };

    pub const fn new(association: Association, designator_type: DesignatorType, code_set: Option<CodeSet>) -> Self {
        Self {
            association: Some(association),
            designator_type: Some(designator_type),
            code_set,
        }
    }

    fn matches(&self, d: &Designator<'_>) -> bool {
        self.code_set.map_or(true, |c| c == d.code_set)
            && self.association.map_or(true, |a| a == d.association)
            && self.designator_type.map_or(true, |t| t == d.designator_type)
    }
}

/// One designation descriptor found in a page
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Designator<'a> {
    /// Offset of the descriptor header within the descriptor list
    pub offset: usize,
    pub protocol: u8,
    pub code_set: CodeSet,
    /// Whether the protocol identifier field is valid
    pub piv: bool,
    pub association: Association,
    pub designator_type: DesignatorType,
    /// The designator itself, excluding the descriptor header
    pub bytes: &'a [u8],
}

impl Designator<'_> {
    fn hex(&self) -> String {
        self.bytes.iter().fold(String::new(), |mut out, b| {
            let _ = write!(out, "{b:02x}");
            out
        })
    }

    /// Text designators are NUL padded
    fn text(&self) -> String {
        let end = self
            .bytes
            .iter()
            .position(|&b| b == 0)
            .unwrap_or(self.bytes.len());
        String::from_utf8_lossy(&self.bytes[..end]).into_owned()
    }
}

/// A validated device identification page
#[derive(Debug, Clone, Copy)]
pub struct Page<'a> {
    descriptors: &'a [u8],
}

impl<'a> Page<'a> {
    /// Validate the page header and length
    pub fn parse(raw: &'a [u8]) -> Result<Self, Error> {
        let (header, descriptors) =
            PageHeader::read_from_prefix(raw).map_err(|_| Error::Malformed("page shorter than its header"))?;

        if header.page_code != PAGE_CODE {
            return Err(Error::Malformed("not a device identification page"));
        }
        if usize::from(header.length.get()) != descriptors.len() {
            return Err(Error::Malformed("page length does not match buffer"));
        }

        log::trace!(
            "device identification page: peripheral 0x{:02x}, {} descriptor bytes",
            header.peripheral,
            descriptors.len()
        );
        Ok(Self { descriptors })
    }

    /// Find the next descriptor matching `filter`.
    ///
    /// `after` is the offset of a previously returned descriptor, or `None` to
    /// start from the beginning. Returns `Ok(None)` once the scan ends exactly at
    /// the end of the page and [`Error::Malformed`] when a descriptor overruns it.
    pub fn next_designator(&self, after: Option<usize>, filter: &Filter) -> Result<Option<Designator<'a>>, Error> {
        let page = self.descriptors;
        let mut cursor = after;

        loop {
            let offset = match cursor {
                None => 0,
                Some(prev) => {
                    let length = prev
                        .checked_add(3)
                        .and_then(|at| page.get(at))
                        .ok_or(Error::Malformed("cursor outside page"))?;
                    prev + 4 + usize::from(*length)
                }
            };
            if offset + 4 > page.len() {
                return if offset == page.len() {
                    Ok(None)
                } else {
                    Err(Error::Malformed("descriptor header overruns page"))
                };
            }
            cursor = Some(offset);

            let (header, rest) =
                DescriptorHeader::read_from_prefix(&page[offset..]).map_err(|_| Error::Malformed("short descriptor"))?;
            let length = usize::from(header.length);

            let designator = Designator {
                offset,
                protocol: header.protocol_code_set >> 4,
                code_set: CodeSet::from(header.protocol_code_set),
                piv: header.piv_association_type & 0x80 != 0,
                association: Association::from(header.piv_association_type >> 4),
                designator_type: DesignatorType::from(header.piv_association_type),
                bytes: rest.get(..length).unwrap_or(rest),
            };

            if filter.matches(&designator) {
                if rest.len() < length {
                    return Err(Error::Malformed("designator overruns page"));
                }
                return Ok(Some(designator));
            }
        }
    }

    /// Iterate over every descriptor in the page
    pub fn designators(&self) -> Designators<'a> {
        Designators {
            page: *self,
            cursor: None,
            done: false,
        }
    }

    /// First descriptor matching `filter` that `render` accepts
    fn find_map<F>(&self, filter: &Filter, mut render: F) -> Result<Option<String>, Error>
    where
        F: FnMut(&Designator<'a>) -> Option<String>,
    {
        let mut cursor = None;
        while let Some(designator) = self.next_designator(cursor, filter)? {
            if let Some(name) = render(&designator) {
                return Ok(Some(name));
            }
            cursor = Some(designator.offset);
        }
        Ok(None)
    }

    /// Whether an iSCSI target port carries a SCSI name string
    fn has_iscsi_target_port(&self) -> Result<bool, Error> {
        let filter = Filter::new(Association::TargetPort, DesignatorType::ScsiName, Some(CodeSet::Utf8));
        let mut cursor = None;
        while let Some(designator) = self.next_designator(cursor, &filter)? {
            if designator.piv && designator.protocol == PROTOCOL_ISCSI {
                return Ok(true);
            }
            cursor = Some(designator.offset);
        }
        Ok(false)
    }

    /// Pick the name of the logical unit from the page.
    ///
    /// A logical unit SCSI name string wins outright when the device is reached
    /// over iSCSI. Otherwise the first usable designator in [`LU_NAME_RULES`]
    /// order is rendered, optionally with its scheme prefix (`naa.`, `eui.`, ...).
    pub fn logical_unit_name(&self, prefix: bool) -> Result<Option<String>, Error> {
        let scsi_name = Filter::new(Association::LogicalUnit, DesignatorType::ScsiName, Some(CodeSet::Utf8));
        if let Some(name) = self.find_map(&scsi_name, |d| render_scsi_name(d, prefix))? {
            if self.has_iscsi_target_port()? {
                log::debug!("using iSCSI name string {name}");
                return Ok(Some(name));
            }
        }

        for rule in LU_NAME_RULES {
            let filter = Filter::new(Association::LogicalUnit, rule.designator_type, rule.code_set);
            if let Some(name) = self.find_map(&filter, |d| (rule.render)(d, prefix))? {
                return Ok(Some(name));
            }
        }

        Ok(None)
    }
}

/// Iterator over every descriptor of a [`Page`]
#[derive(Debug)]
pub struct Designators<'a> {
    page: Page<'a>,
    cursor: Option<usize>,
    done: bool,
}

impl<'a> Iterator for Designators<'a> {
    type Item = Result<Designator<'a>, Error>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.page.next_designator(self.cursor, &Filter::ANY) {
            Ok(Some(designator)) => {
                self.cursor = Some(designator.offset);
                Some(Ok(designator))
            }
            Ok(None) => {
                self.done = true;
                None
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}

/// One step of the logical unit name selection
pub struct Rule {
    pub designator_type: DesignatorType,
    pub code_set: Option<CodeSet>,
    render: fn(&Designator<'_>, bool) -> Option<String>,
}

/// Logical unit name candidates in priority order
pub const LU_NAME_RULES: [Rule; 5] = [
    Rule {
        designator_type: DesignatorType::Naa,
        code_set: Some(CodeSet::Binary),
        render: render_naa,
    },
    Rule {
        designator_type: DesignatorType::Eui64,
        code_set: Some(CodeSet::Binary),
        render: render_eui,
    },
    Rule {
        designator_type: DesignatorType::Uuid,
        code_set: Some(CodeSet::Binary),
        render: render_uuid,
    },
    Rule {
        designator_type: DesignatorType::ScsiName,
        code_set: Some(CodeSet::Utf8),
        render: render_scsi_name,
    },
    Rule {
        designator_type: DesignatorType::T10VendorId,
        code_set: None,
        render: render_t10,
    },
];

fn with_prefix(prefix: bool, scheme: &str, body: String) -> String {
    if prefix {
        format!("{scheme}.{body}")
    } else {
        body
    }
}

fn render_naa(d: &Designator<'_>, prefix: bool) -> Option<String> {
    matches!(d.bytes.len(), 8 | 16).then(|| with_prefix(prefix, "naa", d.hex()))
}

fn render_eui(d: &Designator<'_>, prefix: bool) -> Option<String> {
    matches!(d.bytes.len(), 8 | 12 | 16).then(|| with_prefix(prefix, "eui", d.hex()))
}

fn render_uuid(d: &Designator<'_>, prefix: bool) -> Option<String> {
    if d.bytes.len() != 18 {
        return None;
    }
    if d.bytes[0] >> 4 != 1 {
        // Unknown UUID sub-type: placeholder without scheme prefix
        return Some("??".to_owned());
    }
    let uuid = Uuid::from_slice(&d.bytes[2..]).ok()?;
    Some(with_prefix(prefix, "uuid", uuid.hyphenated().to_string()))
}

fn render_scsi_name(d: &Designator<'_>, _prefix: bool) -> Option<String> {
    Some(d.text()).filter(|name| !name.is_empty())
}

fn render_t10(d: &Designator<'_>, prefix: bool) -> Option<String> {
    // Binary T10 vendor ids have no defined rendering
    if !matches!(d.code_set, CodeSet::Ascii | CodeSet::Utf8) || d.bytes.len() < 8 {
        return None;
    }
    Some(with_prefix(prefix, "t10", d.text()))
}

/// Decode the logical unit name from a raw device identification page
pub fn logical_unit_name(raw: &[u8], prefix: bool) -> Result<Option<String>, Error> {
    Page::parse(raw)?.logical_unit_name(prefix)
}
