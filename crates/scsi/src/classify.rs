// SPDX-FileCopyrightText: Copyright © 2025 Serpent OS Developers
//
// SPDX-License-Identifier: MPL-2.0

//! Device directory classification
//!
//! A SCSI device directory in sysfs carries one child per upper level driver that
//! bound to it: `block` (or `block:sda` on old kernels) for disks, `scsi_tape:st0`
//! for tapes, `scsi_generic` for sg, `enclosure_device:...` for SES slots. NVMe
//! controller directories carry one child per namespace (`nvme0n1`).

use std::{
    path::{Path, PathBuf},
    sync::OnceLock,
};

use regex::Regex;

use crate::sysfs::{Entry, Sysfs};

static TAPE_PATTERN: OnceLock<Regex> = OnceLock::new();
static TAPE_DIR_PATTERN: OnceLock<Regex> = OnceLock::new();
static NVME_NAMESPACE_PATTERN: OnceLock<Regex> = OnceLock::new();

fn pattern(cell: &'static OnceLock<Regex>, re: &str) -> &'static Regex {
    cell.get_or_init(|| Regex::new(re).expect("Failed to initialise known-working regex"))
}

/// The kind of device node found under a directory
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    /// SCSI disk, CD/DVD or other block device
    Block,
    /// SCSI tape (st) or OnStream tape (osst)
    Tape,
    /// NVMe namespace
    NvmeNamespace,
    /// SCSI enclosure slot
    Enclosure,
    /// SCSI generic (sg) device
    Generic,
    /// Nothing recognised
    None,
}

/// Result of classifying a device directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    pub kind: NodeKind,
    /// Path of the matched child, relative to the classified directory
    pub path: PathBuf,
    /// Kernel name of the device node (e.g. `sda`, `st7`), when known
    pub name: Option<String>,
}

impl Classification {
    fn none() -> Self {
        Self {
            kind: NodeKind::None,
            path: PathBuf::new(),
            name: None,
        }
    }

    pub fn is_found(&self) -> bool {
        self.kind != NodeKind::None
    }
}

/// A probe looks at the children of a directory and returns the matched relative
/// path together with the node name
type Probe<S> = fn(&S, &Path, &[Entry]) -> Option<(PathBuf, Option<String>)>;

/// Classify a device directory, trying block, tape, NVMe namespace, enclosure and
/// generic children in that order.
pub fn classify<S: Sysfs>(sysfs: &S, dir: &Path) -> Classification {
    let probes: [(NodeKind, Probe<S>); 5] = [
        (NodeKind::Block, probe_block),
        (NodeKind::Tape, probe_tape),
        (NodeKind::NvmeNamespace, probe_nvme_namespace),
        (NodeKind::Enclosure, probe_enclosure),
        (NodeKind::Generic, probe_generic),
    ];

    let children = match sysfs.children(dir) {
        Ok(children) => children,
        Err(e) => {
            log::debug!("cannot list {}: {e}", dir.display());
            return Classification::none();
        }
    };

    probes
        .iter()
        .find_map(|(kind, probe)| {
            probe(sysfs, dir, &children).map(|(path, name)| Classification {
                kind: *kind,
                path,
                name,
            })
        })
        .unwrap_or_else(Classification::none)
}

/// Locate only the SCSI generic node of a device directory
pub fn generic<S: Sysfs>(sysfs: &S, dir: &Path) -> Option<Classification> {
    let children = sysfs.children(dir).ok()?;
    probe_generic(sysfs, dir, &children).map(|(path, name)| Classification {
        kind: NodeKind::Generic,
        path,
        name,
    })
}

/// Children sorted by name so that probes are deterministic
fn sorted(children: &[Entry]) -> Vec<&Entry> {
    let mut sorted: Vec<&Entry> = children.iter().collect();
    sorted.sort_by(|a, b| a.name.cmp(&b.name));
    sorted
}

/// Either a `<class>` directory holding the node, or a legacy `<class>:<node>` entry
fn probe_class_dir<S: Sysfs>(
    sysfs: &S,
    dir: &Path,
    children: &[Entry],
    class: &str,
) -> Option<(PathBuf, Option<String>)> {
    let child = sorted(children)
        .into_iter()
        .find(|e| e.name.starts_with(class) && e.is_dir_like())?;

    if let Some(name) = child.name.strip_prefix(class).and_then(|n| n.strip_prefix(':')) {
        return Some((PathBuf::from(&child.name), Some(name.to_owned())));
    }

    let node = sysfs.child_dirs(&dir.join(&child.name)).into_iter().next();
    match node {
        Some(node) => Some((Path::new(&child.name).join(&node), Some(node))),
        None => Some((PathBuf::from(&child.name), None)),
    }
}

fn probe_block<S: Sysfs>(sysfs: &S, dir: &Path, children: &[Entry]) -> Option<(PathBuf, Option<String>)> {
    probe_class_dir(sysfs, dir, children, "block")
}

fn probe_tape<S: Sysfs>(sysfs: &S, dir: &Path, children: &[Entry]) -> Option<(PathBuf, Option<String>)> {
    let legacy = pattern(&TAPE_PATTERN, r"^(scsi_tape:st|onstream_tape:os)\d+$");
    let modern = pattern(&TAPE_DIR_PATTERN, r"^st\d+$");

    for child in sorted(children) {
        if legacy.is_match(&child.name) {
            let name = child.name.split_once(':').map(|(_, n)| n.to_owned());
            return Some((PathBuf::from(&child.name), name));
        }
        if child.name == "scsi_tape" && child.is_dir_like() {
            let path = dir.join(&child.name);
            if let Some(node) = sysfs.child_dirs(&path).into_iter().find(|n| modern.is_match(n)) {
                return Some((Path::new(&child.name).join(&node), Some(node)));
            }
        }
    }
    None
}

/// Whether a name is an NVMe namespace such as `nvme0n1` or `nvme1c2n3`
pub fn is_nvme_namespace(name: &str) -> bool {
    pattern(&NVME_NAMESPACE_PATTERN, r"^nvme\d+(c\d+)?n\d+$").is_match(name)
}

fn probe_nvme_namespace<S: Sysfs>(_sysfs: &S, _dir: &Path, children: &[Entry]) -> Option<(PathBuf, Option<String>)> {
    sorted(children)
        .into_iter()
        .find(|e| e.is_dir_like() && is_nvme_namespace(&e.name))
        .map(|e| (PathBuf::from(&e.name), Some(e.name.clone())))
}

fn probe_enclosure<S: Sysfs>(_sysfs: &S, _dir: &Path, children: &[Entry]) -> Option<(PathBuf, Option<String>)> {
    sorted(children)
        .into_iter()
        .find(|e| e.name.starts_with("enclosure_device"))
        .map(|e| {
            let name = e.name.split_once(':').map(|(_, n)| n.to_owned());
            (PathBuf::from(&e.name), name)
        })
}

fn probe_generic<S: Sysfs>(sysfs: &S, dir: &Path, children: &[Entry]) -> Option<(PathBuf, Option<String>)> {
    if let Some(found) = probe_class_dir(sysfs, dir, children, "scsi_generic") {
        return Some(found);
    }

    // Old kernels only provide a `generic` link into the sg class
    let generic = children.iter().find(|e| e.name == "generic")?;
    let name = sysfs
        .link_target(&dir.join(&generic.name))
        .and_then(|t| t.file_name().map(|n| n.to_string_lossy().into_owned()));
    Some((PathBuf::from(&generic.name), name))
}
