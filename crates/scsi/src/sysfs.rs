// SPDX-FileCopyrightText: Copyright © 2025 Serpent OS Developers
//
// SPDX-License-Identifier: MPL-2.0

//! Access to the sysfs attribute tree
//!
//! Every path handed to a [`Sysfs`] implementation is relative to the root of the
//! tree, e.g. `class/scsi_host/host0/proc_name`.

use std::{
    fs, io,
    path::{Path, PathBuf},
    str::FromStr,
};

use crate::SYSFS_DIR;

/// What a directory entry is, without following symlinks
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    Dir,
    Symlink,
    File,
}

/// One child of a sysfs directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    pub name: String,
    pub kind: EntryKind,
}

impl Entry {
    /// Directories and symlinks (which in sysfs nearly always point at directories)
    pub fn is_dir_like(&self) -> bool {
        matches!(self.kind, EntryKind::Dir | EntryKind::Symlink)
    }
}

/// Read-only view of a sysfs style tree
pub trait Sysfs {
    /// Read a text attribute, trimmed of surrounding whitespace
    fn read_attribute(&self, path: &Path) -> Option<String>;

    /// Read a binary attribute verbatim
    fn read_bytes(&self, path: &Path) -> Option<Vec<u8>>;

    /// List one level of a directory, in no particular order
    fn children(&self, path: &Path) -> io::Result<Vec<Entry>>;

    /// Whether the path exists, following symlinks
    fn exists(&self, path: &Path) -> bool;

    /// The raw target of a symlink
    fn link_target(&self, path: &Path) -> Option<PathBuf>;

    /// The fully resolved path, relative to the root
    fn canonicalize(&self, path: &Path) -> Option<PathBuf>;

    /// Reads an attribute and attempts to parse it to type T
    ///
    /// # Returns
    ///
    /// * `Some(T)` if the value was successfully read and parsed
    /// * `None` if the file could not be read or parsed
    fn read<T>(&self, path: &Path) -> Option<T>
    where
        T: FromStr,
    {
        self.read_attribute(path)?.parse().ok()
    }

    /// Sorted names of the directory-like children of `path`
    fn child_dirs(&self, path: &Path) -> Vec<String> {
        let mut names: Vec<String> = self
            .children(path)
            .unwrap_or_default()
            .into_iter()
            .filter(Entry::is_dir_like)
            .map(|e| e.name)
            .collect();
        names.sort();
        names
    }
}

/// A sysfs tree mounted on the real filesystem
#[derive(Debug, Clone)]
pub struct Root {
    path: PathBuf,
}

impl Default for Root {
    fn default() -> Self {
        Self::new(SYSFS_DIR)
    }
}

impl Root {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// The directory this tree is rooted at
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn full(&self, path: &Path) -> PathBuf {
        self.path.join(path)
    }
}

impl Sysfs for Root {
    fn read_attribute(&self, path: &Path) -> Option<String> {
        let raw = fs::read(self.full(path)).ok()?;
        Some(String::from_utf8_lossy(&raw).trim().to_owned())
    }

    fn read_bytes(&self, path: &Path) -> Option<Vec<u8>> {
        fs::read(self.full(path)).ok()
    }

    fn children(&self, path: &Path) -> io::Result<Vec<Entry>> {
        let entries = fs::read_dir(self.full(path))?
            .filter_map(Result::ok)
            .filter_map(|e| {
                let file_type = e.file_type().ok()?;
                let kind = if file_type.is_symlink() {
                    EntryKind::Symlink
                } else if file_type.is_dir() {
                    EntryKind::Dir
                } else {
                    EntryKind::File
                };
                Some(Entry {
                    name: e.file_name().to_str()?.to_owned(),
                    kind,
                })
            })
            .collect();
        Ok(entries)
    }

    fn exists(&self, path: &Path) -> bool {
        self.full(path).exists()
    }

    fn link_target(&self, path: &Path) -> Option<PathBuf> {
        fs::read_link(self.full(path)).ok()
    }

    fn canonicalize(&self, path: &Path) -> Option<PathBuf> {
        let root = fs::canonicalize(&self.path).ok()?;
        let resolved = fs::canonicalize(self.full(path)).ok()?;
        resolved.strip_prefix(&root).ok().map(Path::to_path_buf)
    }
}

#[cfg(test)]
mod tests {
    use std::os::unix::fs::symlink;

    use super::*;

    #[test]
    fn test_root_store() {
        let dir = tempfile::tempdir().expect("cannot create temporary sysfs");
        let host = dir.path().join("devices/pci0000:00/host0/scsi_host/host0");
        fs::create_dir_all(&host).unwrap();
        fs::write(host.join("proc_name"), "ahci\n").unwrap();
        fs::write(host.join("raw"), [0u8, 0x83, 0, 0]).unwrap();
        fs::create_dir_all(dir.path().join("class/scsi_host")).unwrap();
        symlink(
            "../../devices/pci0000:00/host0/scsi_host/host0",
            dir.path().join("class/scsi_host/host0"),
        )
        .unwrap();

        let root = Root::new(dir.path());
        let link = Path::new("class/scsi_host/host0");

        assert_eq!(root.read_attribute(&link.join("proc_name")).as_deref(), Some("ahci"));
        assert_eq!(root.read::<u32>(&link.join("proc_name")), None);
        assert_eq!(root.read_bytes(&link.join("raw")), Some(vec![0, 0x83, 0, 0]));
        assert!(root.exists(link));
        assert!(!root.exists(Path::new("class/fc_host/host0")));
        assert_eq!(
            root.canonicalize(link),
            Some(PathBuf::from("devices/pci0000:00/host0/scsi_host/host0"))
        );
        assert!(root
            .link_target(link)
            .is_some_and(|t| t.starts_with("../../devices")));

        let children = root.children(Path::new("class/scsi_host")).unwrap();
        assert_eq!(
            children,
            vec![Entry {
                name: "host0".into(),
                kind: EntryKind::Symlink
            }]
        );
        assert_eq!(root.child_dirs(Path::new("class/scsi_host")), vec!["host0"]);
        assert!(root.children(Path::new("class/nope")).is_err());
    }
}
