// SPDX-FileCopyrightText: Copyright © 2025 Serpent OS Developers
//
// SPDX-License-Identifier: MPL-2.0

//! Resolved command line options

use std::{env, path::PathBuf};

use scsi::{AddressTuple, LunStyle};

use crate::Args;

/// Environment variable supplying the default LUN rendering when `--lunhex` is absent
pub const LUNHEX_ENV: &str = "LSSCSI_LUNHEX_OPT";

/// How the size column is rendered
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SizeStyle {
    #[default]
    Hidden,
    /// Powers of ten with an SI suffix
    Human,
    /// Count of 512 byte blocks
    Blocks,
}

/// How the logical unit name column replaces the device node column
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UnitStyle {
    #[default]
    Hidden,
    Bare,
    Prefixed,
}

/// Options for a single run, fixed once parsed
#[derive(Debug, Clone, Default)]
pub struct Config {
    pub sysfs_root: PathBuf,
    pub brief: bool,
    pub classic: bool,
    pub device: bool,
    pub pdt: bool,
    pub generic: bool,
    pub hosts: bool,
    pub json: bool,
    pub kname: bool,
    pub list: bool,
    pub long: u8,
    pub no_nvme: bool,
    pub protection: bool,
    pub size: SizeStyle,
    pub transport: bool,
    pub unit: UnitStyle,
    pub verbose: u8,
    pub wwn: bool,
    pub lun_style: LunStyle,
    pub filter: AddressTuple,
}

impl Config {
    pub fn new(args: Args) -> Result<Self, scsi::Error> {
        Self::with_lunhex_default(args, env::var(LUNHEX_ENV).ok())
    }

    fn with_lunhex_default(args: Args, lunhex_env: Option<String>) -> Result<Self, scsi::Error> {
        let filter = AddressTuple::parse_filter(&args.filter)?;

        let lunhex = match args.lunhex {
            0 => lunhex_env.as_deref().map_or(0, parse_lunhex),
            n => n,
        };

        Ok(Self {
            sysfs_root: args.sysfsroot,
            brief: args.brief,
            classic: args.classic,
            device: args.device,
            pdt: args.pdt,
            generic: args.generic,
            hosts: args.hosts,
            json: args.json,
            kname: args.kname,
            list: args.list,
            long: args.long,
            no_nvme: args.no_nvme,
            protection: args.protection,
            size: match args.size {
                0 => SizeStyle::Hidden,
                1 => SizeStyle::Human,
                _ => SizeStyle::Blocks,
            },
            transport: args.transport,
            unit: match args.unit {
                0 => UnitStyle::Hidden,
                1 => UnitStyle::Bare,
                _ => UnitStyle::Prefixed,
            },
            verbose: args.verbose,
            wwn: args.wwn,
            lun_style: match lunhex {
                0 => LunStyle::Decimal,
                1 => LunStyle::T10Hex,
                _ => LunStyle::FullHex,
            },
            filter,
        })
    }

    /// Every attribute of an entry is dumped, rather than a selection
    pub fn all_attributes(&self) -> bool {
        self.list || self.long > 1
    }

    /// Some attributes beyond the table columns are shown
    pub fn attributes(&self) -> bool {
        self.list || self.long > 0
    }
}

fn parse_lunhex(value: &str) -> u8 {
    match value.trim() {
        "0" => 0,
        "1" => 1,
        "2" => 2,
        other => {
            log::warn!("ignoring {LUNHEX_ENV}={other}, expected 0, 1 or 2");
            0
        }
    }
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use super::*;

    fn config(args: &[&str], env: Option<&str>) -> Result<Config, scsi::Error> {
        let args = Args::try_parse_from(std::iter::once("lsscsi").chain(args.iter().copied())).unwrap();
        Config::with_lunhex_default(args, env.map(str::to_owned))
    }

    #[test]
    fn test_counts() {
        let config = config(&["-ss", "-u", "-ll"], None).unwrap();
        assert_eq!(config.size, SizeStyle::Blocks);
        assert_eq!(config.unit, UnitStyle::Bare);
        assert!(config.all_attributes());
        assert_eq!(config.lun_style, LunStyle::Decimal);
        assert_eq!(config.filter, AddressTuple::unset());
    }

    #[test_log::test]
    fn test_lunhex_env() {
        assert_eq!(config(&[], Some("1")).unwrap().lun_style, LunStyle::T10Hex);
        assert_eq!(config(&[], Some("2")).unwrap().lun_style, LunStyle::FullHex);
        assert_eq!(config(&[], Some("yes")).unwrap().lun_style, LunStyle::Decimal);
        // the option wins over the environment
        assert_eq!(config(&["-x"], Some("2")).unwrap().lun_style, LunStyle::T10Hex);
    }

    #[test]
    fn test_filter() {
        let parsed = config(&["[2:0:*]"], None).unwrap();
        assert!(AddressTuple::new(2, 0, 7, 1).matches(&parsed.filter));
        assert!(!AddressTuple::new(3, 0, 7, 1).matches(&parsed.filter));

        assert!(config(&["2:x"], None).is_err());
    }
}
