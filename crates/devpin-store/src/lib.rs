//! Store layout, snapshot objects, and pin registry for devpin.
//!
//! This crate owns the on-disk state: `StoreLayout` for directory structure,
//! a content-addressable `ObjectStore` keeping a blake3-verified copy of every
//! index and overlay snapshot read, and `PinRegistry` holding the first digest
//! seen for each source pin so a pin can never silently change meaning.

pub mod layout;
pub mod objects;
pub mod pins;

pub use layout::{StoreLayout, STORE_FORMAT_VERSION};
pub use objects::{digest_bytes, ObjectStore};
pub use pins::{PinRecord, PinRegistry, SnapshotKind};

use std::path::Path;
use thiserror::Error;

/// Fsync a directory so a preceding `rename()` is durable.
pub(crate) fn fsync_dir(dir: &Path) -> Result<(), std::io::Error> {
    let f = std::fs::File::open(dir)?;
    f.sync_all()
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("integrity check failed for object '{hash}': expected {expected}, got {actual}")]
    IntegrityFailure {
        hash: String,
        expected: String,
        actual: String,
    },
    #[error("object not found: {0}")]
    ObjectNotFound(String),
    #[error("pin '{pin}' changed: recorded snapshot {recorded}, found {found}")]
    PinMutated {
        pin: String,
        recorded: String,
        found: String,
    },
    #[error("store format version mismatch: expected {expected}, found {found}")]
    VersionMismatch { expected: u32, found: u32 },
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
