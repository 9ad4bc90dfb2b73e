// SPDX-FileCopyrightText: Copyright © 2025 Serpent OS Developers
//
// SPDX-License-Identifier: MPL-2.0

//! SCSI host (and NVMe controller) listing

use std::{
    collections::BTreeMap,
    io::{self, Write},
    path::Path,
};

use log::debug;
use serde::Serialize;

use scsi::{transport, AddressTuple, Fields, Sysfs, NVME_HOST};

use crate::{
    config::Config,
    devices, nvme,
    output::{self, or_missing, Line},
};

/// Class directory with one entry per SCSI host adapter
pub const HOSTS_DIR: &str = "class/scsi_host";

/// Host attributes shown by `--long`
const LONG_ATTRIBUTES: &[&str] = &[
    "active_mode",
    "can_queue",
    "cmd_per_lun",
    "host_busy",
    "nr_hw_queues",
    "prot_capabilities",
    "prot_guard_type",
    "sg_tablesize",
    "state",
    "supported_mode",
    "unique_id",
];

/// One listed SCSI host or NVMe controller
#[derive(Debug, Clone, Default, Serialize)]
pub struct Host {
    pub tuple: String,
    /// Driver name for SCSI hosts, device node for NVMe controllers
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transport: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sysfs: Option<String>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub attributes: BTreeMap<String, String>,
    #[serde(skip)]
    pub nvme: bool,
}

/// Whether a host number passes the filter; only its host field applies
fn wanted(filter: &AddressTuple, host: i32) -> bool {
    filter.host().map_or(true, |h| h == host)
}

/// List hosts in the configured format
pub fn run<S: Sysfs, W: Write>(sysfs: &S, config: &Config, out: &mut W) -> io::Result<()> {
    let mut hosts = collect(sysfs, config)?;
    if !config.no_nvme {
        hosts.extend(controllers(sysfs, config));
    }

    if config.json {
        output::write_json(out, &hosts)
    } else {
        hosts.iter().try_for_each(|host| write_host(out, host, config))
    }
}

/// Gather every SCSI host passing the filter, in host number order
pub fn collect<S: Sysfs>(sysfs: &S, config: &Config) -> io::Result<Vec<Host>> {
    let mut numbered: Vec<(i32, String)> = sysfs
        .children(Path::new(HOSTS_DIR))?
        .into_iter()
        .filter_map(|e| {
            let number = e.name.strip_prefix("host").and_then(|n| n.parse::<i32>().ok());
            let Some(number) = number.filter(|n| *n >= 0) else {
                debug!("skipping {}", e.name);
                return None;
            };
            Some((number, e.name))
        })
        .filter(|(number, _)| wanted(&config.filter, *number))
        .collect();
    numbered.sort();

    Ok(numbered
        .into_iter()
        .map(|(number, name)| {
            let dir = Path::new(HOSTS_DIR).join(&name);
            let transport = config
                .transport
                .then(|| transport::resolve_host(sysfs, &name))
                .filter(|t| t.is_known())
                .map(|t| t.to_string());

            Host {
                tuple: AddressTuple::new(number, 0, 0, 0).format(Fields::HOST, config.lun_style),
                name: sysfs.read_attribute(&dir.join("proc_name")).filter(|n| !n.is_empty()),
                transport,
                sysfs: (config.verbose > 0).then(|| devices::sysfs_path(sysfs, config, &dir)),
                attributes: devices::read_attributes(sysfs, &dir, config, LONG_ATTRIBUTES),
                ..Default::default()
            }
        })
        .collect())
}

/// NVMe controllers passing the filter
fn controllers<S: Sysfs>(sysfs: &S, config: &Config) -> Vec<Host> {
    if !wanted(&config.filter, NVME_HOST) {
        return Vec::new();
    }

    nvme::controllers(sysfs)
        .into_iter()
        .filter(|c| config.filter.channel().map_or(true, |ch| ch == c.index))
        .map(|controller| {
            let dir = controller.dir();
            let transport = config
                .transport
                .then(|| transport::resolve_nvme(sysfs, &controller.name, false))
                .filter(|t| t.is_known())
                .map(|t| t.to_string());

            Host {
                tuple: nvme::controller_tuple(&controller, config),
                name: Some(Path::new(scsi::DEVFS_DIR).join(&controller.name).display().to_string()),
                model: sysfs.read_attribute(&dir.join("model")).filter(|m| !m.is_empty()),
                transport,
                sysfs: (config.verbose > 0).then(|| devices::sysfs_path(sysfs, config, &dir)),
                attributes: devices::read_attributes(sysfs, &dir, config, nvme::LONG_ATTRIBUTES),
                nvme: true,
            }
        })
        .collect()
}

/// Render one host as a table line followed by any verbose detail
pub fn write_host<W: Write>(out: &mut W, host: &Host, config: &Config) -> io::Result<()> {
    let mut line = Line::new()
        .column(&format!("[{}]", host.tuple), 7)
        .column(or_missing(host.name.as_deref()), 12);

    if !config.brief {
        if host.nvme {
            line = line.column(or_missing(host.model.as_deref()), 41);
        }
        if config.transport {
            line = line.column(or_missing(host.transport.as_deref()), 30);
        }
    }

    writeln!(out, "{}", line.finish())?;

    if let Some(path) = &host.sysfs {
        writeln!(out, "  dir: {path}")?;
    }
    output::write_attributes(out, &host.attributes, !config.all_attributes())
}
