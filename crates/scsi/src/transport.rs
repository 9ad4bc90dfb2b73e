// SPDX-FileCopyrightText: Copyright © 2025 Serpent OS Developers
//
// SPDX-License-Identifier: MPL-2.0

//! Transport protocol resolution
//!
//! The transport of a SCSI host is found by probing for the marker each transport
//! class leaves in sysfs. Probes run in a fixed order and the first hit wins. A
//! device shares the transport of its host; only the identifying detail (SAS
//! address, FC port, iSCSI target name, ...) is read from the device's own
//! transport objects.
//!
//! Nothing here is cached: each call resolves from scratch and hands the result
//! back to the caller.

use std::{
    fmt,
    path::{Component, Path, PathBuf},
};

use serde::Serialize;

use crate::{sysfs::Sysfs, AddressTuple};

/// Transport protocol connecting a host adapter to its devices
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    Unknown,
    Spi,
    Fc,
    Fcoe,
    /// SAS through the `sas_host` transport class
    Sas,
    /// SAS through the legacy `sas/ha` class
    SasClass,
    Iscsi,
    /// FireWire (IEEE 1394) serial bus protocol
    Sbp,
    Usb,
    Ata,
    Sata,
    /// SCSI RDMA protocol
    Srp,
    /// NVMe over PCIe
    Pcie,
    /// NVMe over a fabric (tcp, rdma, fc, loop)
    NvmeFabrics,
}

/// A resolved transport with its display string (e.g. `sas:0x5000c500a1b2c3d4`)
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Transport {
    pub kind: TransportKind,
    pub detail: String,
}

impl Transport {
    fn new(kind: TransportKind, detail: impl Into<String>) -> Self {
        Self {
            kind,
            detail: detail.into(),
        }
    }

    pub fn unknown() -> Self {
        Self::new(TransportKind::Unknown, "")
    }

    pub fn is_known(&self) -> bool {
        self.kind != TransportKind::Unknown
    }
}

impl fmt::Display for Transport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.detail)
    }
}

/// `class/scsi_host/host<N>`
fn scsi_host(host: &str) -> PathBuf {
    Path::new("class/scsi_host").join(host)
}

fn attr<S: Sysfs>(sysfs: &S, path: impl AsRef<Path>) -> Option<String> {
    sysfs.read_attribute(path.as_ref()).filter(|v| !v.is_empty())
}

fn prefixed(prefix: &str, value: Option<String>) -> String {
    format!("{prefix}{}", value.unwrap_or_default())
}

/// Name of the path component preceding `name`
fn component_before<'a>(path: &'a Path, name: &str) -> Option<&'a str> {
    let names: Vec<&str> = path
        .components()
        .filter_map(|c| match c {
            Component::Normal(n) => n.to_str(),
            _ => None,
        })
        .collect();
    names.windows(2).find(|w| w[1] == name).map(|w| w[0])
}

type HostProbe<S> = fn(&S, &str) -> Option<Transport>;

/// Resolve the transport of a SCSI host such as `host0`
pub fn resolve_host<S: Sysfs>(sysfs: &S, host: &str) -> Transport {
    let probes: [HostProbe<S>; 9] = [
        probe_sas,
        probe_sas_class,
        probe_spi,
        probe_fc,
        probe_srp,
        probe_sbp,
        probe_iscsi,
        probe_usb,
        probe_ata,
    ];

    match probes.iter().find_map(|probe| probe(sysfs, host)) {
        Some(transport) => {
            log::trace!("{host}: transport {:?}", transport.kind);
            transport
        }
        None => {
            log::debug!("{host}: unknown transport");
            Transport::unknown()
        }
    }
}

fn probe_sas<S: Sysfs>(sysfs: &S, host: &str) -> Option<Transport> {
    if !sysfs.exists(&Path::new("class/sas_host").join(host)) {
        return None;
    }
    let address = attr(sysfs, scsi_host(host).join("host_sas_address"));
    Some(Transport::new(TransportKind::Sas, prefixed("sas:", address)))
}

fn probe_sas_class<S: Sysfs>(sysfs: &S, host: &str) -> Option<Transport> {
    let ha = scsi_host(host).join("device/sas/ha");
    if !sysfs.exists(&ha) {
        return None;
    }
    let name = attr(sysfs, ha.join("device_name"));
    Some(Transport::new(TransportKind::SasClass, prefixed("sas:", name)))
}

fn probe_spi<S: Sysfs>(sysfs: &S, host: &str) -> Option<Transport> {
    sysfs
        .exists(&Path::new("class/spi_host").join(host))
        .then(|| Transport::new(TransportKind::Spi, "spi:"))
}

fn probe_fc<S: Sysfs>(sysfs: &S, host: &str) -> Option<Transport> {
    let fc_host = Path::new("class/fc_host").join(host);
    if !sysfs.exists(&fc_host) {
        return None;
    }

    let fcoe = attr(sysfs, fc_host.join("symbolic_name")).is_some_and(|name| name.contains(" over "));
    let (kind, prefix) = if fcoe {
        (TransportKind::Fcoe, "fcoe:")
    } else {
        (TransportKind::Fc, "fc:")
    };

    let port_name = attr(sysfs, fc_host.join("port_name")).unwrap_or_default();
    let port_id = attr(sysfs, fc_host.join("port_id")).unwrap_or_default();
    Some(Transport::new(kind, format!("{prefix}{port_name},{port_id}")))
}

fn probe_srp<S: Sysfs>(sysfs: &S, host: &str) -> Option<Transport> {
    if !sysfs.exists(&Path::new("class/srp_host").join(host)) {
        return None;
    }
    let device = attr(sysfs, scsi_host(host).join("local_ib_device"));
    let port = attr(sysfs, scsi_host(host).join("local_ib_port"));
    let detail = match (device, port) {
        (Some(device), Some(port)) => format!("srp:{device},{port}"),
        (device, _) => prefixed("srp:", device),
    };
    Some(Transport::new(TransportKind::Srp, detail))
}

fn probe_sbp<S: Sysfs>(sysfs: &S, host: &str) -> Option<Transport> {
    let target = sysfs.link_target(&scsi_host(host))?;
    target
        .to_string_lossy()
        .contains("/fw-host")
        .then(|| Transport::new(TransportKind::Sbp, "sbp:"))
}

fn probe_iscsi<S: Sysfs>(sysfs: &S, host: &str) -> Option<Transport> {
    let iscsi_host = Path::new("class/iscsi_host").join(host);
    if !sysfs.exists(&iscsi_host) {
        return None;
    }
    let initiator = attr(sysfs, iscsi_host.join("initiatorname"));
    Some(Transport::new(TransportKind::Iscsi, prefixed("iscsi:", initiator)))
}

fn probe_usb<S: Sysfs>(sysfs: &S, host: &str) -> Option<Transport> {
    let resolved = sysfs.canonicalize(&scsi_host(host))?;
    let below_usb = resolved
        .ancestors()
        .filter_map(Path::file_name)
        .any(|n| n.to_string_lossy().contains("usb"));
    if !below_usb {
        return None;
    }
    let interface = component_before(&resolved, host).unwrap_or_default();
    Some(Transport::new(TransportKind::Usb, format!("usb: {interface}")))
}

fn probe_ata<S: Sysfs>(sysfs: &S, host: &str) -> Option<Transport> {
    let driver = attr(sysfs, scsi_host(host).join("proc_name"))?;
    if driver == "ahci" || driver.starts_with("sata") {
        Some(Transport::new(TransportKind::Sata, "sata:"))
    } else if driver.contains("ata") {
        Some(Transport::new(TransportKind::Ata, "ata:"))
    } else {
        None
    }
}

/// Resolve the transport of a SCSI device from its host's transport
pub fn resolve_device<S: Sysfs>(sysfs: &S, address: &AddressTuple) -> Transport {
    let Some(host) = address.host() else {
        return Transport::unknown();
    };
    let kind = resolve_host(sysfs, &format!("host{host}")).kind;
    let device = Path::new("bus/scsi/devices").join(address.to_string());

    let detail = match kind {
        TransportKind::Unknown => return Transport::unknown(),
        TransportKind::Sas => device_sas(sysfs, &device),
        TransportKind::SasClass => prefixed("sas:", attr(sysfs, device.join("sas_addr"))),
        TransportKind::Spi => "spi:".to_owned(),
        TransportKind::Fc | TransportKind::Fcoe => device_fc(sysfs, address, kind),
        TransportKind::Srp => "srp:".to_owned(),
        TransportKind::Iscsi => device_iscsi(sysfs, &device),
        TransportKind::Sbp => prefixed("sbp:", attr(sysfs, device.join("ieee1394_id"))),
        TransportKind::Usb => device_usb(sysfs, &device, host),
        TransportKind::Ata => "ata:".to_owned(),
        TransportKind::Sata => device_sata(sysfs, &device),
        TransportKind::Pcie | TransportKind::NvmeFabrics => String::new(),
    };

    Transport::new(kind, detail)
}

fn device_sas<S: Sysfs>(sysfs: &S, device: &Path) -> String {
    let address = sysfs
        .canonicalize(device)
        .and_then(|resolved| {
            resolved
                .components()
                .filter_map(|c| match c {
                    Component::Normal(n) => n.to_str().map(str::to_owned),
                    _ => None,
                })
                .filter(|n| n.starts_with("end_device-"))
                .last()
        })
        .and_then(|end_device| attr(sysfs, Path::new("class/sas_device").join(end_device).join("sas_address")));
    prefixed("sas:", address)
}

fn device_fc<S: Sysfs>(sysfs: &S, address: &AddressTuple, kind: TransportKind) -> String {
    let target = format!(
        "target{}:{}:{}",
        address.host().unwrap_or(-1),
        address.channel().unwrap_or(-1),
        address.target().unwrap_or(-1)
    );
    let remote = Path::new("class/fc_transport").join(target);
    let port_name = attr(sysfs, remote.join("port_name")).unwrap_or_default();
    let port_id = attr(sysfs, remote.join("port_id")).unwrap_or_default();
    let prefix = if kind == TransportKind::Fcoe { "fcoe:" } else { "fc:" };
    format!("{prefix}{port_name},{port_id}")
}

fn device_iscsi<S: Sysfs>(sysfs: &S, device: &Path) -> String {
    let session = sysfs.canonicalize(device).and_then(|resolved| {
        resolved
            .components()
            .filter_map(|c| match c {
                Component::Normal(n) => n.to_str().map(str::to_owned),
                _ => None,
            })
            .find(|n| n.starts_with("session"))
    });
    let Some(session) = session else {
        return "iscsi:".to_owned();
    };

    let session = Path::new("class/iscsi_session").join(session);
    let name = attr(sysfs, session.join("targetname")).unwrap_or_default();
    match attr(sysfs, session.join("tpgt")).and_then(|t| t.parse::<u32>().ok()) {
        Some(tpgt) => format!("{name},t,0x{tpgt:x}"),
        None => name,
    }
}

fn device_usb<S: Sysfs>(sysfs: &S, device: &Path, host: i32) -> String {
    let interface = sysfs
        .canonicalize(device)
        .and_then(|resolved| component_before(&resolved, &format!("host{host}")).map(str::to_owned))
        .unwrap_or_default();
    format!("usb: {interface}")
}

fn device_sata<S: Sysfs>(sysfs: &S, device: &Path) -> String {
    let wwn = attr(sysfs, device.join("wwid")).and_then(|w| w.strip_prefix("naa.").map(|n| format!("0x{n}")));
    prefixed("sata:", wwn)
}

/// Resolve the transport of an NVMe controller such as `nvme0`.
///
/// With `device` set the PCI vendor ids are shown (`pcie 0x144d:0xa801`),
/// otherwise the controller address.
pub fn resolve_nvme<S: Sysfs>(sysfs: &S, controller: &str, device: bool) -> Transport {
    let ctl = Path::new("class/nvme").join(controller);
    let Some(transport) = attr(sysfs, ctl.join("transport")) else {
        return Transport::unknown();
    };
    let address = attr(sysfs, ctl.join("address")).unwrap_or_default();

    if transport != "pcie" {
        return Transport::new(TransportKind::NvmeFabrics, format!("{transport}:{address}"));
    }

    let detail = if device {
        let vendor = attr(sysfs, ctl.join("device/vendor")).unwrap_or_default();
        let subsystem = attr(sysfs, ctl.join("device/subsystem_vendor")).unwrap_or_default();
        format!("pcie {vendor}:{subsystem}")
    } else {
        format!("pcie {address}")
    };
    Transport::new(TransportKind::Pcie, detail)
}
