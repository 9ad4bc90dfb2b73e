// SPDX-FileCopyrightText: Copyright © 2025 Serpent OS Developers
//
// SPDX-License-Identifier: MPL-2.0

//! Device node lookup
//!
//! Maps kernel device numbers back to nodes in `/dev`, and world wide names to
//! disks via the `/dev/disk/by-id/wwn-*` links. Both tables are built on first use
//! and then kept for the rest of the run.

use std::{
    cell::OnceCell,
    collections::HashMap,
    fs,
    path::{Path, PathBuf},
};

use nix::sys::stat::{lstat, major, minor, SFlag};

use crate::DEVFS_DIR;

/// Block or character special file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DevKind {
    Block,
    Char,
}

type DevKey = (DevKind, u64, u64);

/// Lazily built lookup tables over a device directory
#[derive(Debug)]
pub struct DevNodes {
    root: PathBuf,
    nodes: OnceCell<HashMap<DevKey, PathBuf>>,
    wwns: OnceCell<HashMap<String, String>>,
}

impl Default for DevNodes {
    fn default() -> Self {
        Self::new(DEVFS_DIR)
    }
}

/// Parse a sysfs `dev` attribute (`major:minor`)
pub fn parse_dev(value: &str) -> Option<(u64, u64)> {
    let (major, minor) = value.trim().split_once(':')?;
    Some((major.parse().ok()?, minor.parse().ok()?))
}

/// Device kind and number of a special file, without following symlinks
fn stat_node(path: &Path) -> Option<DevKey> {
    let stat = lstat(path).ok()?;
    let format = SFlag::from_bits_truncate(stat.st_mode & SFlag::S_IFMT.bits());
    let kind = if format == SFlag::S_IFBLK {
        DevKind::Block
    } else if format == SFlag::S_IFCHR {
        DevKind::Char
    } else {
        return None;
    };
    Some((kind, major(stat.st_rdev), minor(stat.st_rdev)))
}

impl DevNodes {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            nodes: OnceCell::new(),
            wwns: OnceCell::new(),
        }
    }

    /// The device directory being scanned
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Find the node for a device number.
    ///
    /// `/dev/<kname>` is tried first; failing that the whole device directory is
    /// searched. Falls back to `/dev/<kname>` when nothing matches.
    pub fn resolve(&self, kind: DevKind, kname: &str, dev: (u64, u64)) -> PathBuf {
        let direct = self.root.join(kname);
        if stat_node(&direct) == Some((kind, dev.0, dev.1)) {
            return direct;
        }

        match self.lookup(kind, dev.0, dev.1) {
            Some(path) => path.to_path_buf(),
            None => {
                log::debug!("no node for {kname} ({}:{}) under {}", dev.0, dev.1, self.root.display());
                direct
            }
        }
    }

    /// Search the device directory for a node with the given number
    pub fn lookup(&self, kind: DevKind, major: u64, minor: u64) -> Option<&Path> {
        self.nodes
            .get_or_init(|| Self::scan_nodes(&self.root))
            .get(&(kind, major, minor))
            .map(PathBuf::as_path)
    }

    /// Disk basename for a world wide name such as `0x5000c500a1b2c3d4`
    pub fn disk_for_wwn(&self, wwn: &str) -> Option<&str> {
        self.wwns().get(wwn).map(String::as_str)
    }

    /// World wide name of a disk basename such as `sda`
    pub fn wwn_for_disk(&self, disk: &str) -> Option<&str> {
        self.wwns()
            .iter()
            .filter(|(_, d)| d.as_str() == disk)
            .map(|(wwn, _)| wwn.as_str())
            .min()
    }

    fn wwns(&self) -> &HashMap<String, String> {
        self.wwns.get_or_init(|| Self::scan_wwns(&self.root))
    }

    fn scan_nodes(root: &Path) -> HashMap<DevKey, PathBuf> {
        let mut nodes = HashMap::new();
        let Ok(entries) = fs::read_dir(root) else {
            log::warn!("cannot scan {}", root.display());
            return nodes;
        };

        for entry in entries.filter_map(Result::ok) {
            let path = entry.path();
            if let Some(key) = stat_node(&path) {
                // Keep the first name seen for a number
                nodes.entry(key).or_insert(path);
            }
        }

        log::debug!("scanned {} device nodes in {}", nodes.len(), root.display());
        nodes
    }

    fn scan_wwns(root: &Path) -> HashMap<String, String> {
        let by_id = root.join("disk/by-id");
        let Ok(entries) = fs::read_dir(&by_id) else {
            log::debug!("no {}", by_id.display());
            return HashMap::new();
        };

        entries
            .filter_map(Result::ok)
            .filter_map(|e| {
                let name = e.file_name().to_str()?.to_owned();
                let wwn = name.strip_prefix("wwn-")?;
                if wwn.contains("-part") {
                    return None;
                }
                let target = fs::read_link(e.path()).ok()?;
                let disk = target.file_name()?.to_str()?.to_owned();
                Some((wwn.to_owned(), disk))
            })
            .collect()
    }
}
