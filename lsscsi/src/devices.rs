// SPDX-FileCopyrightText: Copyright © 2025 Serpent OS Developers
//
// SPDX-License-Identifier: MPL-2.0

//! SCSI device listing
//!
//! Walks `bus/scsi/devices`, keeping the entries named by an address tuple, and
//! gathers one [`Device`] record per logical unit. NVMe namespaces are appended by
//! [`crate::nvme`] using the same record type.

use std::{
    collections::BTreeMap,
    io::{self, Write},
    path::{Path, PathBuf},
};

use itertools::Itertools;
use log::{debug, warn};
use serde::Serialize;

use scsi::{
    address::compare_names,
    classify::{self, Classification},
    devnode::parse_dev,
    transport, vpd, AddressTuple, DevKind, DevNodes, EntryKind, Fields, LunStyle, NodeKind, Sysfs,
};

use crate::{
    config::{Config, SizeStyle, UnitStyle},
    nvme,
    output::{self, classic_type, format_size, or_missing, short_type, Line},
};

/// Directory listing every SCSI device by address
pub const DEVICES_DIR: &str = "bus/scsi/devices";

/// Device attributes shown by `--long`
const LONG_ATTRIBUTES: &[&str] = &[
    "device_blocked",
    "iocounterbits",
    "iodone_cnt",
    "ioerr_cnt",
    "iorequest_cnt",
    "queue_depth",
    "queue_type",
    "scsi_level",
    "state",
    "timeout",
    "type",
];

/// One listed SCSI logical unit or NVMe namespace
#[derive(Debug, Clone, Default, Serialize)]
pub struct Device {
    #[serde(skip)]
    pub address: AddressTuple,
    #[serde(skip)]
    pub nvme: bool,
    pub tuple: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sysfs: Option<String>,
    pub pdt: Option<u8>,
    pub vendor: Option<String>,
    pub model: Option<String>,
    pub revision: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scsi_level: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transport: Option<String>,
    pub node: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lu_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub wwn: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dev: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub generic: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub protection: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<String>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub attributes: BTreeMap<String, String>,
}

/// List devices (and NVMe namespaces) in the configured format
pub fn run<S: Sysfs, W: Write>(sysfs: &S, nodes: &DevNodes, config: &Config, out: &mut W) -> io::Result<()> {
    let mut devices = collect(sysfs, nodes, config)?;
    if !config.no_nvme && !config.classic {
        devices.extend(nvme::namespaces(sysfs, nodes, config));
    }

    if config.json {
        output::write_json(out, &devices)
    } else if config.classic {
        write_classic(out, &devices)
    } else {
        devices.iter().try_for_each(|device| write_device(out, device, config))
    }
}

/// Gather every SCSI device passing the filter, in address order.
///
/// Only an unreadable device directory is an error; problems with a single
/// device leave the affected fields empty.
pub fn collect<S: Sysfs>(sysfs: &S, nodes: &DevNodes, config: &Config) -> io::Result<Vec<Device>> {
    let entries = sysfs.children(Path::new(DEVICES_DIR))?;

    let devices = entries
        .into_iter()
        .map(|e| e.name)
        .sorted_by(|a, b| compare_names(a, b))
        .filter_map(|name| match name.parse::<AddressTuple>() {
            Ok(address) => Some((address, name)),
            Err(e) => {
                debug!("skipping {name}: {e}");
                None
            }
        })
        .filter(|(address, _)| address.matches(&config.filter))
        .map(|(address, name)| probe(sysfs, nodes, config, address, &name))
        .collect();

    Ok(devices)
}

fn probe<S: Sysfs>(sysfs: &S, nodes: &DevNodes, config: &Config, address: AddressTuple, name: &str) -> Device {
    let dir = Path::new(DEVICES_DIR).join(name);
    let attr = |attribute: &str| non_empty(sysfs.read_attribute(&dir.join(attribute)));

    let mut device = Device {
        address,
        tuple: address.format(Fields::ALL, config.lun_style),
        pdt: sysfs.read(&dir.join("type")),
        vendor: attr("vendor"),
        model: attr("model"),
        revision: attr("rev"),
        scsi_level: sysfs.read(&dir.join("scsi_level")),
        ..Default::default()
    };

    let class = classify::classify(sysfs, &dir);
    debug!("{name}: {:?} {:?}", class.kind, class.name);

    if let Some(kind) = dev_kind(class.kind) {
        if let Some(kname) = &class.name {
            let node_dir = dir.join(&class.path);
            let dev = sysfs.read_attribute(&node_dir.join("dev")).and_then(|d| parse_dev(&d));
            device.node = Some(node_path(nodes, config, kind, kname, dev));
            device.dev = dev.map(|(major, minor)| format!("{major}:{minor}"));

            if class.kind == NodeKind::Block {
                device.size = size(sysfs, &node_dir, config.size);
                if config.protection {
                    device.protection = protection(sysfs, &dir, &node_dir);
                }
            }
        }
    }

    if config.wwn {
        device.wwn = attr("wwid").as_deref().and_then(wwid_to_wwn).or_else(|| {
            let disk = class.name.as_deref().filter(|_| class.kind == NodeKind::Block)?;
            nodes.wwn_for_disk(disk).map(str::to_owned)
        });
    }

    if config.generic {
        device.generic = classify::generic(sysfs, &dir).and_then(|g| generic_node(sysfs, nodes, config, &dir, &g));
    }

    if config.unit != UnitStyle::Hidden {
        device.lu_name = lu_name(sysfs, &dir, config.unit);
    }

    if config.transport {
        let transport = transport::resolve_device(sysfs, &address);
        device.transport = transport.is_known().then(|| transport.to_string());
    }

    if config.verbose > 0 {
        device.sysfs = Some(sysfs_path(sysfs, config, &dir));
    }

    device.attributes = attributes(sysfs, &dir, config);
    device
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}

fn dev_kind(kind: NodeKind) -> Option<DevKind> {
    match kind {
        NodeKind::Block | NodeKind::NvmeNamespace => Some(DevKind::Block),
        NodeKind::Tape => Some(DevKind::Char),
        NodeKind::Enclosure | NodeKind::Generic | NodeKind::None => None,
    }
}

/// Device node for a kernel name, looked up by number unless `--kname` is set
pub(crate) fn node_path(
    nodes: &DevNodes,
    config: &Config,
    kind: DevKind,
    kname: &str,
    dev: Option<(u64, u64)>,
) -> String {
    let path = match dev {
        Some(dev) if !config.kname => nodes.resolve(kind, kname, dev),
        _ => nodes.root().join(kname),
    };
    path.display().to_string()
}

fn generic_node<S: Sysfs>(
    sysfs: &S,
    nodes: &DevNodes,
    config: &Config,
    dir: &Path,
    generic: &Classification,
) -> Option<String> {
    let kname = generic.name.as_deref()?;
    let dev = sysfs
        .read_attribute(&dir.join(&generic.path).join("dev"))
        .and_then(|d| parse_dev(&d));
    Some(node_path(nodes, config, DevKind::Char, kname, dev))
}

/// Capacity from a block directory's `size` attribute, counted in 512 byte sectors
pub(crate) fn size<S: Sysfs>(sysfs: &S, block_dir: &Path, style: SizeStyle) -> Option<String> {
    let blocks: u64 = match style {
        SizeStyle::Hidden => return None,
        _ => sysfs.read(&block_dir.join("size"))?,
    };
    match style {
        SizeStyle::Blocks => Some(blocks.to_string()),
        _ => Some(format_size(blocks.saturating_mul(512))),
    }
}

/// `naa.5000c500a1b2c3d4` to `0x5000c500a1b2c3d4`
fn wwid_to_wwn(wwid: &str) -> Option<String> {
    wwid.strip_prefix("naa.").map(|naa| format!("0x{naa}"))
}

fn protection<S: Sysfs>(sysfs: &S, dir: &Path, block_dir: &Path) -> Option<String> {
    let disk = sysfs.child_dirs(&dir.join("scsi_disk")).into_iter().next()?;
    let kind: u8 = sysfs.read(&dir.join("scsi_disk").join(disk).join("protection_type"))?;
    let integrity = non_empty(sysfs.read_attribute(&block_dir.join("integrity/format"))).filter(|f| f != "none");

    match (kind, integrity) {
        (0, None) => None,
        (0, Some(format)) => Some(format),
        (kind, None) => Some(format!("DIF/Type{kind}")),
        (kind, Some(format)) => Some(format!("DIF/Type{kind},{format}")),
    }
}

/// Logical unit name from the device identification VPD page, falling back to
/// the kernel's `wwid` rendering of it
fn lu_name<S: Sysfs>(sysfs: &S, dir: &Path, unit: UnitStyle) -> Option<String> {
    let prefix = unit == UnitStyle::Prefixed;

    if let Some(raw) = sysfs.read_bytes(&dir.join("vpd_pg83")) {
        match vpd::logical_unit_name(&raw, prefix) {
            Ok(Some(name)) => return Some(name),
            Ok(None) => debug!("{}: no logical unit designator", dir.display()),
            Err(e) => warn!("{}: {e}", dir.display()),
        }
    }

    let wwid = non_empty(sysfs.read_attribute(&dir.join("wwid")))?;
    Some(strip_designator_prefix(&wwid, prefix))
}

/// Drop a `naa.`/`eui.`/`t10.` style prefix unless it was asked for
pub(crate) fn strip_designator_prefix(name: &str, prefix: bool) -> String {
    match name.split_once('.') {
        Some((_, bare)) if !prefix => bare.to_owned(),
        _ => name.to_owned(),
    }
}

/// Full path of an entry for verbose output
pub(crate) fn sysfs_path<S: Sysfs>(sysfs: &S, config: &Config, dir: &Path) -> String {
    let resolved: PathBuf = sysfs.canonicalize(dir).unwrap_or_else(|| dir.to_path_buf());
    config.sysfs_root.join(resolved).display().to_string()
}

/// Attribute files of an entry as selected by `--long` and `--list`
pub(crate) fn read_attributes<S: Sysfs>(
    sysfs: &S,
    dir: &Path,
    config: &Config,
    selected: &[&str],
) -> BTreeMap<String, String> {
    if config.all_attributes() {
        let Ok(children) = sysfs.children(dir) else {
            return BTreeMap::new();
        };
        children
            .into_iter()
            .filter(|e| e.kind == EntryKind::File)
            // Binary pages and write-only triggers
            .filter(|e| !e.name.starts_with("vpd_pg") && e.name != "inquiry" && e.name != "uevent")
            .filter_map(|e| Some((e.name.clone(), sysfs.read_attribute(&dir.join(&e.name))?)))
            .collect()
    } else if config.attributes() {
        selected
            .iter()
            .filter_map(|name| Some((name.to_string(), sysfs.read_attribute(&dir.join(name))?)))
            .collect()
    } else {
        BTreeMap::new()
    }
}

fn attributes<S: Sysfs>(sysfs: &S, dir: &Path, config: &Config) -> BTreeMap<String, String> {
    read_attributes(sysfs, dir, config, LONG_ATTRIBUTES)
}

fn tuple_width(style: LunStyle) -> usize {
    match style {
        LunStyle::Decimal => 13,
        LunStyle::T10Hex => 22,
        LunStyle::FullHex => 28,
    }
}

fn type_column(device: &Device, config: &Config) -> String {
    match device.pdt {
        Some(pdt) if config.pdt => format!("0x{pdt:x}"),
        Some(pdt) => short_type(pdt),
        None => output::MISSING.to_owned(),
    }
}

/// Render one device as a table line followed by any verbose detail
pub fn write_device<W: Write>(out: &mut W, device: &Device, config: &Config) -> io::Result<()> {
    let mut line = Line::new().column(&format!("[{}]", device.tuple), tuple_width(config.lun_style));

    if !config.brief {
        line = line.column(&type_column(device, config), 8);
        line = if device.nvme {
            line.column(or_missing(device.model.as_deref()), 31)
        } else {
            line.column(or_missing(device.vendor.as_deref()), 9)
                .column(or_missing(device.model.as_deref()), 17)
        };
        line = line.column(or_missing(device.revision.as_deref()), 6);
        if config.transport {
            line = line.column(or_missing(device.transport.as_deref()), 30);
        }
    }

    let node = match config.unit {
        UnitStyle::Hidden => device.node.as_deref(),
        _ => device.lu_name.as_deref(),
    };
    line = line.column(or_missing(node), if config.unit == UnitStyle::Hidden { 9 } else { 33 });

    if !config.brief {
        if config.wwn {
            line = line.column(or_missing(device.wwn.as_deref()), 19);
        }
        if config.device {
            let dev = device.dev.as_ref().map(|d| format!("[{d}]"));
            line = line.column(or_missing(dev.as_deref()), 9);
        }
    }
    if config.generic {
        line = line.column(or_missing(device.generic.as_deref()), 11);
    }
    if !config.brief {
        if config.protection {
            line = line.column(or_missing(device.protection.as_deref()), 12);
        }
        if config.size != SizeStyle::Hidden {
            line = line.right(or_missing(device.size.as_deref()), 7);
        }
    }

    writeln!(out, "{}", line.finish())?;

    if let Some(path) = &device.sysfs {
        writeln!(out, "  dir: {path}")?;
    }
    output::write_attributes(out, &device.attributes, !config.all_attributes())
}

/// Render devices in the style of `/proc/scsi/scsi`
pub fn write_classic<W: Write>(out: &mut W, devices: &[Device]) -> io::Result<()> {
    writeln!(out, "Attached devices:")?;

    for device in devices {
        let address = &device.address;
        writeln!(
            out,
            "Host: scsi{} Channel: {:02} Id: {:02} Lun: {:02}",
            address.host().unwrap_or(-1),
            address.channel().unwrap_or(-1),
            address.target().unwrap_or(-1),
            address.lun().raw()
        )?;
        writeln!(
            out,
            "  Vendor: {:<8} Model: {:<16} Rev: {:<4}",
            device.vendor.as_deref().unwrap_or_default(),
            device.model.as_deref().unwrap_or_default(),
            device.revision.as_deref().unwrap_or_default()
        )?;

        let kind = device.pdt.map_or("Unknown", classic_type);
        // The kernel stores the ANSI version plus one from SCSI-2 onwards
        let ansi = device.scsi_level.map_or(0, |level| if level > 1 { level - 1 } else { level });
        writeln!(out, "  Type:   {kind:<32} ANSI  SCSI revision: {ansi:02x}")?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use scsi::mock::MockSysfs;

    use super::*;

    const ATA: &str = "devices/pci0000:00/0000:00:17.0/ata1/host0/target0:0:0/0:0:0:0";
    const TAPE: &str = "devices/pci0000:00/0000:00:1c.0/host3/target3:0:5/3:0:5:0";

    /// A SATA disk, a tape, and the non-device entries the kernel puts alongside
    fn tree() -> MockSysfs {
        MockSysfs::new()
            .attr(format!("{ATA}/type"), "0")
            .attr(format!("{ATA}/vendor"), "ATA     ")
            .attr(format!("{ATA}/model"), "Samsung SSD 860 ")
            .attr(format!("{ATA}/rev"), "2B6Q")
            .attr(format!("{ATA}/scsi_level"), "6")
            .attr(format!("{ATA}/state"), "running")
            .attr(format!("{ATA}/queue_depth"), "32")
            .attr(format!("{ATA}/wwid"), "naa.5002538e40a1b2c3")
            .attr(format!("{ATA}/block/sda/dev"), "8:0")
            .attr(format!("{ATA}/block/sda/size"), "976773168")
            .attr(format!("{ATA}/scsi_generic/sg0/dev"), "21:0")
            .attr("devices/pci0000:00/0000:00:17.0/ata1/host0/scsi_host/host0/proc_name", "ahci")
            .link("class/scsi_host/host0", "/devices/pci0000:00/0000:00:17.0/ata1/host0/scsi_host/host0")
            .link("bus/scsi/devices/0:0:0:0", format!("/{ATA}"))
            .link("bus/scsi/devices/host0", "/devices/pci0000:00/0000:00:17.0/ata1/host0")
            .link("bus/scsi/devices/target0:0:0", "/devices/pci0000:00/0000:00:17.0/ata1/host0/target0:0:0")
            .attr(format!("{TAPE}/type"), "1")
            .attr(format!("{TAPE}/vendor"), "HP")
            .attr(format!("{TAPE}/model"), "Ultrium 5-SCSI")
            .attr(format!("{TAPE}/rev"), "Z6HD")
            .attr(format!("{TAPE}/scsi_level"), "7")
            .attr(format!("{TAPE}/scsi_tape/st0/dev"), "9:0")
            .link("bus/scsi/devices/3:0:5:0", format!("/{TAPE}"))
    }

    fn config() -> Config {
        Config {
            kname: true,
            no_nvme: true,
            ..Default::default()
        }
    }

    fn render(sysfs: &MockSysfs, config: &Config) -> String {
        let mut out = Vec::new();
        run(sysfs, &DevNodes::new("/dev"), config, &mut out).unwrap();
        String::from_utf8(out).unwrap()
    }

    #[test_log::test]
    fn test_listing() {
        assert_eq!(
            render(&tree(), &config()),
            "[0:0:0:0]    disk    ATA      Samsung SSD 860  2B6Q  /dev/sda\n\
             [3:0:5:0]    tape    HP       Ultrium 5-SCSI   Z6HD  /dev/st0\n"
        );
    }

    #[test]
    fn test_columns() {
        let config = Config {
            generic: true,
            device: true,
            size: SizeStyle::Human,
            wwn: true,
            ..config()
        };
        let devices = collect(&tree(), &DevNodes::new("/dev"), &config).unwrap();
        let disk = &devices[0];
        assert_eq!(disk.dev.as_deref(), Some("8:0"));
        assert_eq!(disk.generic.as_deref(), Some("/dev/sg0"));
        assert_eq!(disk.size.as_deref(), Some("500GB"));
        assert_eq!(disk.wwn.as_deref(), Some("0x5002538e40a1b2c3"));

        let tape = &devices[1];
        assert_eq!(tape.size, None);
        assert_eq!(tape.generic, None);

        let mut out = Vec::new();
        write_device(&mut out, tape, &config).unwrap();
        let columns = format!("{:<19}{:<9}{:<11}{:>7}", "-", "[9:0]", "-", "-");
        assert_eq!(
            String::from_utf8(out).unwrap(),
            format!("[3:0:5:0]    tape    HP       Ultrium 5-SCSI   Z6HD  /dev/st0 {columns}\n")
        );
    }

    #[test]
    fn test_filter_and_brief() {
        let config = Config {
            brief: true,
            filter: AddressTuple::parse_filter(&["3"]).unwrap(),
            ..config()
        };
        assert_eq!(render(&tree(), &config), "[3:0:5:0]    /dev/st0\n");

        let config = Config {
            filter: AddressTuple::parse_filter(&["9", "*"]).unwrap(),
            ..config
        };
        assert_eq!(render(&tree(), &config), "");
    }

    #[test]
    fn test_missing_values() {
        let sysfs = tree().dir("bus/scsi/devices/5:0:0:0");
        let config = Config { pdt: true, ..config() };
        let devices = collect(&sysfs, &DevNodes::new("/dev"), &config).unwrap();
        assert_eq!(devices.len(), 3);

        let mut out = Vec::new();
        write_device(&mut out, &devices[2], &config).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "[5:0:0:0]    -       -        -                -     -\n");
    }

    #[test]
    fn test_unreadable_root() {
        let sysfs = MockSysfs::new().dir("class");
        let mut out = Vec::new();
        assert!(run(&sysfs, &DevNodes::new("/dev"), &config(), &mut out).is_err());
    }

    #[test]
    fn test_long_and_verbose() {
        let config = Config {
            long: 1,
            verbose: 1,
            sysfs_root: PathBuf::from("/sys"),
            filter: AddressTuple::parse_filter(&["0"]).unwrap(),
            ..config()
        };
        let output = render(&tree(), &config);
        let lines: Vec<&str> = output.lines().collect();
        assert_eq!(lines[1], format!("  dir: /sys/{ATA}"));
        assert_eq!(lines[2], "  queue_depth=32 scsi_level=6 state=running type=0");

        let config = Config { list: true, ..config };
        let output = render(&tree(), &config);
        assert!(output.contains("\n  model=Samsung SSD 860\n"));
        assert!(output.contains("\n  wwid=naa.5002538e40a1b2c3\n"));
    }

    #[test]
    fn test_classic() {
        let config = Config { classic: true, ..config() };
        assert_eq!(
            render(&tree(), &config),
            "Attached devices:\n\
             Host: scsi0 Channel: 00 Id: 00 Lun: 00\n  \
             Vendor: ATA      Model: Samsung SSD 860  Rev: 2B6Q\n  \
             Type:   Direct-Access                    ANSI  SCSI revision: 05\n\
             Host: scsi3 Channel: 00 Id: 05 Lun: 00\n  \
             Vendor: HP       Model: Ultrium 5-SCSI   Rev: Z6HD\n  \
             Type:   Sequential-Access                ANSI  SCSI revision: 06\n"
        );
    }

    #[test]
    fn test_lu_name_and_transport() {
        let sysfs = tree();
        let config = Config {
            unit: UnitStyle::Prefixed,
            transport: true,
            filter: AddressTuple::parse_filter(&["0"]).unwrap(),
            ..config()
        };
        let devices = collect(&sysfs, &DevNodes::new("/dev"), &config).unwrap();
        assert_eq!(devices[0].lu_name.as_deref(), Some("naa.5002538e40a1b2c3"));
        assert_eq!(devices[0].transport.as_deref(), Some("sata:0x5002538e40a1b2c3"));

        // An NAA page wins over the wwid fallback
        let page = [
            0x00, 0x83, 0x00, 0x0c, 0x01, 0x03, 0x00, 0x08, 0x50, 0x02, 0x53, 0x8e, 0x40, 0xff, 0xee, 0xdd,
        ];
        let sysfs = sysfs.bytes(format!("{ATA}/vpd_pg83"), &page);
        let config = Config {
            unit: UnitStyle::Bare,
            ..config
        };
        let devices = collect(&sysfs, &DevNodes::new("/dev"), &config).unwrap();
        assert_eq!(devices[0].lu_name.as_deref(), Some("5002538e40ffeedd"));

        // A page naming only the target port leaves the wwid to name the unit
        let page = [
            0x00, 0x83, 0x00, 0x0c, 0x01, 0x13, 0x00, 0x08, 0x50, 0x02, 0x53, 0x8e, 0x40, 0xff, 0xee, 0xdd,
        ];
        let sysfs = tree().bytes(format!("{ATA}/vpd_pg83"), &page);
        let devices = collect(&sysfs, &DevNodes::new("/dev"), &config).unwrap();
        assert_eq!(devices[0].lu_name.as_deref(), Some("5002538e40a1b2c3"));
    }

    #[test]
    fn test_json() {
        let config = Config { json: true, ..config() };
        let output = render(&tree(), &config);
        let value: serde_json::Value = serde_json::from_str(&output).unwrap();
        assert_eq!(value[0]["tuple"], "0:0:0:0");
        assert_eq!(value[0]["node"], "/dev/sda");
        assert_eq!(value[1]["pdt"], 1);
        assert!(value[1].get("attributes").is_none());
    }

    #[test]
    fn test_prefixes() {
        assert_eq!(strip_designator_prefix("eui.0025385b71b07b37", false), "0025385b71b07b37");
        assert_eq!(strip_designator_prefix("eui.0025385b71b07b37", true), "eui.0025385b71b07b37");
        assert_eq!(wwid_to_wwn("t10.ATA"), None);
    }
}
