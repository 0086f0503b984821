//! Package index and overlay snapshots for devpin.
//!
//! A source pin names a `PackageIndex` snapshot; overlay pins name patch
//! modules applied on top of it in declaration order. Snapshots are loaded
//! through the `IndexSource` trait: `StoreSource` reads what a fetcher placed
//! under the store root, `MemorySource` serves in-memory fixtures.

pub mod index;
pub mod memory;
pub mod overlay;
pub mod source;
pub mod store_source;

pub use index::{parse_index_str, PackageDef, PackageIndex};
pub use memory::MemorySource;
pub use overlay::{apply_overlays, parse_overlay_str, Overlay, PatchOp};
pub use source::{IndexSource, Snapshot};
pub use store_source::StoreSource;

use devpin_store::{SnapshotKind, StoreError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum IndexError {
    #[error("index I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse snapshot for '{pin}': {error}")]
    Parse {
        pin: String,
        #[source]
        error: toml::de::Error,
    },
    #[error("snapshot for '{pin}' has unsupported format version {found}, expected 1")]
    UnsupportedVersion { pin: String, found: u32 },
    #[error("invalid definition of '{name}' in '{pin}': {reason}")]
    InvalidDefinition {
        pin: String,
        name: String,
        reason: String,
    },
    #[error("{kind} snapshot for '{pin}' not found at {location}")]
    NotFound {
        kind: SnapshotKind,
        pin: String,
        location: String,
    },
    #[error("snapshot for '{pin}' is not valid UTF-8")]
    NotUtf8 { pin: String },
    #[error(transparent)]
    Store(#[from] StoreError),
}
