// SPDX-FileCopyrightText: Copyright © 2025 Serpent OS Developers
//
// SPDX-License-Identifier: MPL-2.0

//! Logical unit number handling
//!
//! The kernel reports a LUN as a 64-bit integer, while SAM-5 defines it as an
//! 8-byte structure made of up to four 2-byte addressing levels. Linux maps one to
//! the other by flipping 16-bit words: the lowest word of the integer becomes the
//! first level of the byte form.

use std::fmt::Write;

/// Byte pattern reported for a "LUN not specified" address
pub const NOT_SPECIFIED: [u8; 8] = [0xff, 0xff, 0, 0, 0, 0, 0, 0];

/// A logical unit number with its integer and T10 byte views kept together.
///
/// Both views are derived in the constructors and never mutated separately.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Lun {
    value: Option<u64>,
    bytes: [u8; 8],
}

impl Lun {
    /// The unset LUN (integer all ones, bytes all 0xff)
    pub const UNSET: Lun = Lun {
        value: None,
        bytes: [0xff; 8],
    };

    /// Build a SCSI LUN from the integer reported by the kernel
    pub fn scsi(value: u64) -> Self {
        if value == u64::MAX {
            return Self::UNSET;
        }
        Self {
            value: Some(value),
            bytes: to_t10(value),
        }
    }

    /// Build a LUN holding an NVMe namespace id
    pub fn nvme(nsid: u32) -> Self {
        let mut bytes = [0u8; 8];
        bytes[..4].copy_from_slice(&nsid.to_le_bytes());
        Self {
            value: Some(u64::from(nsid)),
            bytes,
        }
    }

    /// Build a SCSI LUN from its T10 byte form
    pub fn from_t10(bytes: [u8; 8]) -> Self {
        Self::scsi(from_t10(&bytes))
    }

    /// The integer value, `None` when unset
    pub fn value(&self) -> Option<u64> {
        self.value
    }

    /// The integer value with the unset sentinel applied
    pub fn raw(&self) -> u64 {
        self.value.unwrap_or(u64::MAX)
    }

    /// The 8-byte representation
    pub fn bytes(&self) -> &[u8; 8] {
        &self.bytes
    }

    pub fn is_set(&self) -> bool {
        self.value.is_some()
    }
}

impl Default for Lun {
    fn default() -> Self {
        Self::UNSET
    }
}

/// Convert the kernel integer form into T10 bytes
pub fn to_t10(value: u64) -> [u8; 8] {
    let mut bytes = [0u8; 8];
    for (level, pair) in bytes.chunks_exact_mut(2).enumerate() {
        let word = (value >> (16 * level)) as u16;
        pair.copy_from_slice(&word.to_be_bytes());
    }
    bytes
}

/// Convert T10 bytes into the kernel integer form
pub fn from_t10(bytes: &[u8; 8]) -> u64 {
    bytes
        .chunks_exact(2)
        .enumerate()
        .fold(0u64, |acc, (level, pair)| {
            acc | u64::from(u16::from_be_bytes([pair[0], pair[1]])) << (16 * level)
        })
}

/// How a single LUN byte is rendered in the T10 hex form
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Tag {
    /// Not printed
    #[default]
    Ignore,
    /// Printed as two hex digits
    Plain,
    /// Printed as two hex digits after a `_` separator
    Separated,
}

/// The addressing method held in the top two bits of a level's first byte
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Peripheral,
    Flat,
    LogicalUnit,
    Extended,
}

impl From<u8> for Method {
    fn from(byte: u8) -> Self {
        match byte >> 6 {
            0 => Method::Peripheral,
            1 => Method::Flat,
            2 => Method::LogicalUnit,
            _ => Method::Extended,
        }
    }
}

/// Number of bytes taken by an extended addressing level, given its length
/// field and extended address method
fn extended_span(length: u8, method: u8) -> usize {
    match (length, method) {
        (0, 0x1) => 2,
        (1, 0x2) => 4,
        (2, 0x2) => 6,
        (3, 0xf) => 1,
        (0 | 1, _) => 4,
        (2, _) => 6,
        _ => 8,
    }
}

/// Work out which bytes of a T10 LUN are printed and where separators go.
pub fn tag_lun(bytes: &[u8; 8]) -> [Tag; 8] {
    let mut tags = [Tag::Ignore; 8];

    if *bytes == NOT_SPECIFIED {
        tags[0] = Tag::Plain;
        tags[1] = Tag::Plain;
        return tags;
    }

    for level in 0..4 {
        let start = level * 2;
        let first = bytes[start];
        let lead = if level == 0 { Tag::Plain } else { Tag::Separated };

        let span = match Method::from(first) {
            Method::Peripheral | Method::Flat | Method::LogicalUnit => 2,
            Method::Extended => extended_span((first >> 4) & 0x3, first & 0xf),
        };

        let end = (start + span).min(tags.len());
        tags[start] = lead;
        for tag in &mut tags[start + 1..end] {
            *tag = Tag::Plain;
        }

        // Only peripheral addressing with a non-zero bus id descends a level
        let next_level = Method::from(first) == Method::Peripheral && first & 0x3f != 0;
        if !next_level {
            break;
        }
    }

    tags
}

/// Render a LUN in T10 hex form, e.g. `0x0122_0033`
pub fn t10_hex(bytes: &[u8; 8]) -> String {
    let mut out = String::from("0x");
    for (byte, tag) in bytes.iter().zip(tag_lun(bytes)) {
        match tag {
            Tag::Ignore => break,
            Tag::Plain => {}
            Tag::Separated => out.push('_'),
        }
        let _ = write!(out, "{byte:02x}");
    }
    out
}

/// Render all eight LUN bytes as 16 hex digits, e.g. `0x0122003300000000`
pub fn full_hex(bytes: &[u8; 8]) -> String {
    bytes.iter().fold(String::from("0x"), |mut out, byte| {
        let _ = write!(out, "{byte:02x}");
        out
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    use Tag::{Ignore as I, Plain as P, Separated as S};

    #[test]
    fn test_word_flip() {
        assert_eq!(to_t10(0), [0; 8]);
        assert_eq!(to_t10(1), [0, 1, 0, 0, 0, 0, 0, 0]);
        assert_eq!(to_t10(0x0033_0122), [0x01, 0x22, 0x00, 0x33, 0, 0, 0, 0]);
        assert_eq!(from_t10(&[0x01, 0x22, 0x00, 0x33, 0, 0, 0, 0]), 0x0033_0122);
        assert_eq!(from_t10(&to_t10(0x1234_5678_9abc_def0)), 0x1234_5678_9abc_def0);
    }

    #[test]
    fn test_views_agree() {
        let lun = Lun::scsi(0x4001);
        assert_eq!(lun.bytes(), &[0x40, 0x01, 0, 0, 0, 0, 0, 0]);
        assert_eq!(Lun::from_t10(*lun.bytes()), lun);

        let ns = Lun::nvme(0x0102_0304);
        assert_eq!(ns.bytes(), &[0x04, 0x03, 0x02, 0x01, 0, 0, 0, 0]);
        assert_eq!(ns.value(), Some(0x0102_0304));

        assert_eq!(Lun::scsi(u64::MAX), Lun::UNSET);
        assert_eq!(Lun::UNSET.bytes(), &[0xff; 8]);
        assert_eq!(Lun::UNSET.raw(), u64::MAX);
    }

    #[test]
    fn test_not_specified() {
        assert_eq!(tag_lun(&NOT_SPECIFIED), [P, P, I, I, I, I, I, I]);
        assert_eq!(t10_hex(&NOT_SPECIFIED), "0xffff");
    }

    #[test]
    fn test_peripheral_two_levels() {
        let bytes = [0x01, 0x22, 0x00, 0x33, 0, 0, 0, 0];
        assert_eq!(tag_lun(&bytes), [P, P, S, P, I, I, I, I]);
        assert_eq!(t10_hex(&bytes), "0x0122_0033");
    }

    #[test]
    fn test_single_level() {
        assert_eq!(t10_hex(&[0; 8]), "0x0000");
        assert_eq!(t10_hex(&to_t10(5)), "0x0005");
        // flat space addressing never descends
        assert_eq!(t10_hex(&[0x40, 0x10, 0x00, 0x22, 0, 0, 0, 0]), "0x4010");
    }

    #[test]
    fn test_extended_levels() {
        // length 1, extended method 2: four bytes
        let bytes = [0xd2, 0x01, 0x02, 0x03, 0, 0, 0, 0];
        assert_eq!(tag_lun(&bytes), [P, P, P, P, I, I, I, I]);
        assert_eq!(t10_hex(&bytes), "0xd2010203");

        // length 3, extended method 0xf: a single byte
        assert_eq!(tag_lun(&[0xff; 8]), [P, I, I, I, I, I, I, I]);

        // length 3 with another method: all eight bytes
        let bytes = [0xf2, 1, 2, 3, 4, 5, 6, 7];
        assert_eq!(tag_lun(&bytes), [P; 8]);
        assert_eq!(full_hex(&bytes), "0xf201020304050607");
    }

    #[test]
    fn test_extended_spans() {
        // length 0, extended method 1: two bytes
        let bytes = [0xc1, 0x11, 0x22, 0x33, 0, 0, 0, 0];
        assert_eq!(tag_lun(&bytes), [P, P, I, I, I, I, I, I]);
        assert_eq!(t10_hex(&bytes), "0xc111");

        // length 2, extended method 2: six bytes
        let bytes = [0xe2, 0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07];
        assert_eq!(tag_lun(&bytes), [P, P, P, P, P, P, I, I]);
        assert_eq!(t10_hex(&bytes), "0xe20102030405");

        // lengths 0 and 1 default to four bytes for other methods
        assert_eq!(t10_hex(&[0xc0, 0x11, 0x22, 0x33, 0x44, 0, 0, 0]), "0xc0112233");
        assert_eq!(t10_hex(&[0xd0, 0x11, 0x22, 0x33, 0x44, 0, 0, 0]), "0xd0112233");

        // length 2 defaults to six bytes
        let bytes = [0xe0, 0x11, 0x22, 0x33, 0x44, 0x55, 0x66, 0];
        assert_eq!(tag_lun(&bytes), [P, P, P, P, P, P, I, I]);
        assert_eq!(t10_hex(&bytes), "0xe01122334455");

        // an extended level below a peripheral one is separated
        let bytes = [0x01, 0x00, 0xc1, 0x05, 0, 0, 0, 0];
        assert_eq!(tag_lun(&bytes), [P, P, S, P, I, I, I, I]);
        assert_eq!(t10_hex(&bytes), "0x0100_c105");
    }

    #[test]
    fn test_extended_after_peripheral_is_clamped() {
        // three peripheral levels then a six byte extended level at the end
        let bytes = [0x01, 0x00, 0x02, 0x00, 0x03, 0x00, 0xe2, 0x00];
        assert_eq!(tag_lun(&bytes), [P, P, S, P, S, P, S, P]);
    }
}
