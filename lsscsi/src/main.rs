// SPDX-FileCopyrightText: Copyright © 2025 Serpent OS Developers
//
// SPDX-License-Identifier: MPL-2.0

use std::{io, path::PathBuf};

use clap::{ArgAction, Parser};
use log::{debug, LevelFilter};

use scsi::{DevNodes, Root};

mod config;
mod devices;
mod hosts;
mod nvme;
mod output;

use config::Config;

#[derive(Debug, Parser)]
#[command(name = "lsscsi", version)]
#[command(about = "List SCSI devices (or hosts), NVMe namespaces (or controllers) and their attributes")]
pub struct Args {
    /// Tuple and device name only
    #[arg(short, long)]
    brief: bool,

    /// Output in the style of /proc/scsi/scsi
    #[arg(short, long)]
    classic: bool,

    /// Show device node major and minor numbers
    #[arg(short, long)]
    device: bool,

    /// Show the peripheral device type in hex
    #[arg(short = 'D', long)]
    pdt: bool,

    /// Show the SCSI generic device name
    #[arg(short, long)]
    generic: bool,

    /// List hosts instead of devices
    #[arg(short = 'H', long)]
    hosts: bool,

    /// Output JSON instead of a table
    #[arg(short, long)]
    json: bool,

    /// Show kernel names instead of device node names
    #[arg(short, long)]
    kname: bool,

    /// Additional information as name=value lines
    #[arg(short = 'L', long)]
    list: bool,

    /// Additional information (repeat for more)
    #[arg(short, long, action = ArgAction::Count)]
    long: u8,

    /// Exclude NVMe devices and controllers
    #[arg(short = 'N', long = "no-nvme")]
    no_nvme: bool,

    /// Show target and host protection information
    #[arg(short, long)]
    protection: bool,

    /// Show disk capacity (twice for 512 byte blocks)
    #[arg(short, long, action = ArgAction::Count)]
    size: u8,

    /// Show transport information
    #[arg(short, long)]
    transport: bool,

    /// Show the logical unit name (twice to add its prefix)
    #[arg(short, long, action = ArgAction::Count)]
    unit: u8,

    /// Output paths and debug logging (repeat for more)
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,

    /// Show the world wide name
    #[arg(short, long)]
    wwn: bool,

    /// LUN in hex (twice for all 16 digits)
    #[arg(short = 'x', long, action = ArgAction::Count)]
    lunhex: u8,

    /// Root of the sysfs tree
    #[arg(short = 'y', long, value_name = "PATH", default_value = scsi::SYSFS_DIR)]
    sysfsroot: PathBuf,

    /// Filter as `H:C:T:L` or up to four separate components
    #[arg(value_name = "FILTER", num_args = 0..=4, allow_negative_numbers = true)]
    filter: Vec<String>,
}

fn log_level(verbose: u8) -> LevelFilter {
    match verbose {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        2 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    pretty_env_logger::formatted_builder()
        .filter_level(log_level(args.verbose))
        .parse_default_env()
        .init();

    let config = Config::new(args)?;
    debug!("{config:?}");

    let sysfs = Root::new(&config.sysfs_root);
    let nodes = DevNodes::default();
    let mut out = io::stdout().lock();

    if config.hosts {
        hosts::run(&sysfs, &config, &mut out)?;
    } else {
        devices::run(&sysfs, &nodes, &config, &mut out)?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_arguments() {
        let args = Args::try_parse_from(["lsscsi", "-llvtgx", "-s", "--unit", "-u", "2:0:*"]).unwrap();
        assert_eq!(args.long, 2);
        assert_eq!(args.verbose, 1);
        assert_eq!(args.lunhex, 1);
        assert_eq!(args.size, 1);
        assert_eq!(args.unit, 2);
        assert!(args.transport && args.generic);
        assert_eq!(args.filter, vec!["2:0:*"]);
        assert_eq!(args.sysfsroot, PathBuf::from("/sys"));

        let args = Args::try_parse_from(["lsscsi", "-H", "-y", "/tmp/sys", "1", "0", "3", "5"]).unwrap();
        assert!(args.hosts);
        assert_eq!(args.filter.len(), 4);
        assert_eq!(args.sysfsroot, PathBuf::from("/tmp/sys"));

        assert!(Args::try_parse_from(["lsscsi", "1", "2", "3", "4", "5"]).is_err());
    }

    #[test]
    fn test_log_level() {
        assert_eq!(log_level(0), LevelFilter::Warn);
        assert_eq!(log_level(2), LevelFilter::Debug);
        assert_eq!(log_level(7), LevelFilter::Trace);
    }
}
