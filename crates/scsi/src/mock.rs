// SPDX-FileCopyrightText: Copyright © 2025 Serpent OS Developers
//
// SPDX-License-Identifier: MPL-2.0

//! Mock sysfs tree for testing.
//!
//! This module provides an in-memory [`Sysfs`] implementation so that
//! classification and transport logic can be tested without real hardware.
//! Symlink targets may be relative to the link's directory or absolute, where
//! absolute means relative to the root of the mock tree.

use std::{
    collections::{BTreeMap, VecDeque},
    io,
    path::{Component, Path, PathBuf},
};

use crate::sysfs::{Entry, EntryKind, Sysfs};

/// Upper bound on symlink hops while resolving a path
const MAX_LINK_HOPS: usize = 40;

#[derive(Debug, Clone)]
enum Node {
    Dir,
    File(Vec<u8>),
    Link(PathBuf),
}

/// An in-memory sysfs tree built with chained calls.
///
/// ```
/// use scsi::{mock::MockSysfs, Sysfs};
/// use std::path::Path;
///
/// let sysfs = MockSysfs::new()
///     .attr("devices/host0/scsi_host/host0/proc_name", "ahci")
///     .link("class/scsi_host/host0", "../../devices/host0/scsi_host/host0");
/// assert_eq!(
///     sysfs.read_attribute(Path::new("class/scsi_host/host0/proc_name")).as_deref(),
///     Some("ahci")
/// );
/// ```
#[derive(Debug, Clone, Default)]
pub struct MockSysfs {
    nodes: BTreeMap<PathBuf, Node>,
}

fn parts(path: &Path) -> VecDeque<String> {
    path.components()
        .filter_map(|c| match c {
            Component::Normal(name) => Some(name.to_string_lossy().into_owned()),
            Component::ParentDir => Some("..".to_owned()),
            _ => None,
        })
        .collect()
}

impl MockSysfs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a directory (and any missing parents)
    pub fn dir(mut self, path: impl AsRef<Path>) -> Self {
        self.insert(path.as_ref(), Node::Dir);
        self
    }

    /// Add a text attribute
    pub fn attr(mut self, path: impl AsRef<Path>, value: &str) -> Self {
        self.insert(path.as_ref(), Node::File(format!("{value}\n").into_bytes()));
        self
    }

    /// Add a binary attribute
    pub fn bytes(mut self, path: impl AsRef<Path>, value: &[u8]) -> Self {
        self.insert(path.as_ref(), Node::File(value.to_vec()));
        self
    }

    /// Add a symlink pointing at `target`
    pub fn link(mut self, path: impl AsRef<Path>, target: impl AsRef<Path>) -> Self {
        self.insert(path.as_ref(), Node::Link(target.as_ref().to_path_buf()));
        self
    }

    /// Insert a node, creating missing parents and following links on the way
    fn insert(&mut self, path: &Path, node: Node) {
        let mut names = parts(path);
        let Some(leaf) = names.pop_back() else {
            return;
        };

        let mut parent = PathBuf::new();
        for name in names {
            let candidate = parent.join(&name);
            parent = match self.nodes.get(&candidate) {
                Some(Node::Link(_)) => self.resolve(&candidate).unwrap_or(candidate),
                Some(_) => candidate,
                None => {
                    self.nodes.insert(candidate.clone(), Node::Dir);
                    candidate
                }
            };
        }

        self.nodes.insert(parent.join(leaf), node);
    }

    /// Resolve every symlink along `path`
    fn resolve(&self, path: &Path) -> Option<PathBuf> {
        let mut pending = parts(path);
        let mut resolved = PathBuf::new();
        let mut hops = 0;

        while let Some(name) = pending.pop_front() {
            if name == ".." {
                resolved.pop();
                continue;
            }

            let candidate = resolved.join(&name);
            match self.nodes.get(&candidate)? {
                Node::Link(target) => {
                    hops += 1;
                    if hops > MAX_LINK_HOPS {
                        return None;
                    }
                    if target.is_absolute() {
                        resolved = PathBuf::new();
                    }
                    for name in parts(target).into_iter().rev() {
                        pending.push_front(name);
                    }
                }
                _ => resolved = candidate,
            }
        }

        Some(resolved)
    }

    fn node(&self, path: &Path) -> Option<&Node> {
        self.nodes.get(&self.resolve(path)?)
    }
}

impl Sysfs for MockSysfs {
    fn read_attribute(&self, path: &Path) -> Option<String> {
        self.read_bytes(path)
            .map(|raw| String::from_utf8_lossy(&raw).trim().to_owned())
    }

    fn read_bytes(&self, path: &Path) -> Option<Vec<u8>> {
        match self.node(path)? {
            Node::File(raw) => Some(raw.clone()),
            _ => None,
        }
    }

    fn children(&self, path: &Path) -> io::Result<Vec<Entry>> {
        let dir = match self.resolve(path) {
            Some(dir) if dir.as_os_str().is_empty() || matches!(self.nodes.get(&dir), Some(Node::Dir)) => dir,
            _ => return Err(io::Error::from(io::ErrorKind::NotFound)),
        };

        Ok(self
            .nodes
            .iter()
            .filter(|(p, _)| p.parent() == Some(dir.as_path()))
            .filter_map(|(p, node)| {
                let kind = match node {
                    Node::Dir => EntryKind::Dir,
                    Node::File(_) => EntryKind::File,
                    Node::Link(_) => EntryKind::Symlink,
                };
                Some(Entry {
                    name: p.file_name()?.to_string_lossy().into_owned(),
                    kind,
                })
            })
            .collect())
    }

    fn exists(&self, path: &Path) -> bool {
        self.node(path).is_some()
    }

    fn link_target(&self, path: &Path) -> Option<PathBuf> {
        let parent = self.resolve(path.parent()?)?;
        match self.nodes.get(&parent.join(path.file_name()?))? {
            Node::Link(target) => Some(target.clone()),
            _ => None,
        }
    }

    fn canonicalize(&self, path: &Path) -> Option<PathBuf> {
        self.resolve(path)
    }
}
