// SPDX-FileCopyrightText: Copyright © 2025 Serpent OS Developers
//
// SPDX-License-Identifier: MPL-2.0

//! NVMe controllers and namespaces
//!
//! NVMe devices are not part of the SCSI bus, but are listed alongside it. A
//! namespace is addressed as `N:<controller>:<cntlid>:<nsid>` and a controller as
//! `N:<controller>`.

use std::path::{Path, PathBuf};

use log::{debug, warn};

use scsi::{classify::is_nvme_namespace, devnode::parse_dev, transport, AddressTuple, DevKind, DevNodes, Fields, Sysfs};

use crate::{
    config::{Config, UnitStyle},
    devices::{self, Device},
};

/// Class directory holding one entry per NVMe controller
pub const NVME_CLASS: &str = "class/nvme";

/// Class directory of the per namespace character devices
const NVME_GENERIC_CLASS: &str = "class/nvme-generic";

/// Controller attributes shown by `--long`
pub const LONG_ATTRIBUTES: &[&str] = &["cntlid", "firmware_rev", "model", "serial", "state", "transport"];

/// An NVMe controller such as `nvme0`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Controller {
    pub index: i32,
    pub name: String,
}

impl Controller {
    pub fn dir(&self) -> PathBuf {
        Path::new(NVME_CLASS).join(&self.name)
    }
}

/// Controllers in index order. A missing NVMe class just means no controllers.
pub fn controllers<S: Sysfs>(sysfs: &S) -> Vec<Controller> {
    let Ok(entries) = sysfs.children(Path::new(NVME_CLASS)) else {
        debug!("no {NVME_CLASS}");
        return Vec::new();
    };

    let mut controllers: Vec<Controller> = entries
        .into_iter()
        .filter_map(|e| {
            let index = e.name.strip_prefix("nvme")?.parse::<u32>().ok()?;
            let index = i32::try_from(index).ok()?;
            Some(Controller { index, name: e.name })
        })
        .collect();
    controllers.sort_by_key(|c| c.index);
    controllers
}

/// Namespace id from its `nsid` attribute, else from the trailing `n<id>` of its name
fn nsid<S: Sysfs>(sysfs: &S, dir: &Path, name: &str) -> Option<u32> {
    sysfs
        .read(&dir.join("nsid"))
        .or_else(|| name.rsplit_once('n').and_then(|(_, id)| id.parse().ok()))
}

/// Every namespace passing the filter, as device records
pub fn namespaces<S: Sysfs>(sysfs: &S, nodes: &DevNodes, config: &Config) -> Vec<Device> {
    let mut devices = Vec::new();

    for controller in controllers(sysfs) {
        let ctl = controller.dir();
        let Some(cntlid) = sysfs.read::<u16>(&ctl.join("cntlid")) else {
            warn!("{}: unreadable cntlid, skipping", controller.name);
            continue;
        };
        let model = sysfs.read_attribute(&ctl.join("model")).unwrap_or_default();
        let firmware = sysfs.read_attribute(&ctl.join("firmware_rev"));
        let transport = config
            .transport
            .then(|| transport::resolve_nvme(sysfs, &controller.name, true))
            .filter(|t| t.is_known())
            .map(|t| t.to_string());

        for name in sysfs.child_dirs(&ctl).into_iter().filter(|n| is_nvme_namespace(n)) {
            let dir = ctl.join(&name);
            let Some(nsid) = nsid(sysfs, &dir, &name) else {
                warn!("{name}: no namespace id, skipping");
                continue;
            };

            let address = AddressTuple::nvme(controller.index, cntlid, nsid);
            if !address.matches(&config.filter) {
                continue;
            }

            let dev = sysfs.read_attribute(&dir.join("dev")).and_then(|d| parse_dev(&d));
            let wwid = sysfs.read_attribute(&dir.join("wwid")).filter(|w| !w.is_empty());

            devices.push(Device {
                address,
                nvme: true,
                tuple: address.format(Fields::ALL, config.lun_style),
                sysfs: (config.verbose > 0).then(|| devices::sysfs_path(sysfs, config, &dir)),
                pdt: Some(0),
                model: Some(format!("{model}__{nsid}")),
                revision: firmware.clone(),
                transport: transport.clone(),
                node: Some(devices::node_path(nodes, config, DevKind::Block, &name, dev)),
                lu_name: match config.unit {
                    UnitStyle::Hidden => None,
                    unit => wwid
                        .as_deref()
                        .map(|w| devices::strip_designator_prefix(w, unit == UnitStyle::Prefixed)),
                },
                wwn: config.wwn.then(|| wwid.clone()).flatten(),
                dev: dev.map(|(major, minor)| format!("{major}:{minor}")),
                generic: config.generic.then(|| generic_node(sysfs, nodes, config, &name)).flatten(),
                size: devices::size(sysfs, &dir, config.size),
                attributes: if config.all_attributes() {
                    devices::read_attributes(sysfs, &dir, config, &[])
                } else {
                    devices::read_attributes(sysfs, &ctl, config, LONG_ATTRIBUTES)
                },
                ..Default::default()
            });
        }
    }

    devices
}

/// The `ng<ctl>n<ns>` character device paired with a namespace block device
fn generic_node<S: Sysfs>(sysfs: &S, nodes: &DevNodes, config: &Config, namespace: &str) -> Option<String> {
    let name = format!("ng{}", namespace.strip_prefix("nvme")?);
    let dir = Path::new(NVME_GENERIC_CLASS).join(&name);
    if !sysfs.exists(&dir) {
        return None;
    }
    let dev = sysfs.read_attribute(&dir.join("dev")).and_then(|d| parse_dev(&d));
    Some(devices::node_path(nodes, config, DevKind::Char, &name, dev))
}

/// Address of a controller, rendered as `N:<index>`
pub fn controller_tuple(controller: &Controller, config: &Config) -> String {
    AddressTuple::nvme(controller.index, 0, 0).format(Fields::HOST_CHANNEL, config.lun_style)
}
