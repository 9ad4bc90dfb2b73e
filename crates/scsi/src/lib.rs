// SPDX-FileCopyrightText: Copyright © 2025 Serpent OS Developers
//
// SPDX-License-Identifier: MPL-2.0

//! SCSI and NVMe topology decoding for Linux sysfs
//!
//! This crate provides the pieces needed to describe the SCSI (and NVMe) devices
//! and host adapters that the kernel exposes under `/sys`:
//!
//! - [`AddressTuple`]: the `host:channel:target:lun` identifier, its parsing,
//!   ordering, filtering and rendering
//! - [`lun`]: the T10 logical unit number structure and its display tagging
//! - [`vpd`]: the device identification VPD page (0x83) decoder
//! - [`classify`]: what kind of device node hangs off a sysfs device directory
//! - [`transport`]: which transport protocol a host or device belongs to
//!
//! Directory access goes through the [`Sysfs`] trait so that all of the above can be
//! exercised against the in-memory [`mock::MockSysfs`] tree.

use std::io;

use thiserror::Error;

pub mod address;
pub mod classify;
pub mod devnode;
pub mod lun;
pub mod mock;
pub mod sysfs;
pub mod transport;
pub mod vpd;

pub use address::{AddressTuple, Fields, LunStyle, NVME_HOST};
pub use classify::{classify, Classification, NodeKind};
pub use devnode::{DevKind, DevNodes};
pub use lun::Lun;
pub use sysfs::{Entry, EntryKind, Root, Sysfs};
pub use transport::{Transport, TransportKind};

/// Default mount point of sysfs
pub const SYSFS_DIR: &str = "/sys";

/// Default location of device nodes
pub const DEVFS_DIR: &str = "/dev";

/// Errors produced while parsing or decoding topology information
#[derive(Debug, Error)]
pub enum Error {
    /// An address tuple or filter string could not be parsed
    #[error("invalid address '{input}': {reason}")]
    Parse { input: String, reason: &'static str },

    /// A binary page failed its sanity checks
    #[error("malformed page: {0}")]
    Malformed(&'static str),

    /// An I/O error occurred
    #[error("io: {0}")]
    IO(#[from] io::Error),
}

impl Error {
    pub(crate) fn parse(input: &str, reason: &'static str) -> Self {
        Self::Parse {
            input: input.to_owned(),
            reason,
        }
    }
}
