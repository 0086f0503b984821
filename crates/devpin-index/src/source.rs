use crate::index::PackageIndex;
use crate::overlay::Overlay;
use crate::IndexError;
use devpin_schema::{LockedSource, SnapshotDigest, SourcePin};

/// A parsed snapshot together with the digest of the bytes it came from.
#[derive(Debug, Clone)]
pub struct Snapshot<T> {
    pub pin: SourcePin,
    pub digest: SnapshotDigest,
    pub value: T,
}

impl<T> Snapshot<T> {
    pub fn locked(&self) -> LockedSource {
        LockedSource {
            pin: self.pin.clone(),
            digest: self.digest.clone(),
        }
    }
}

/// Where pinned index and overlay snapshots come from.
pub trait IndexSource: Send + Sync {
    fn name(&self) -> &str;

    /// Load the package index a source pin names.
    fn fetch_index(&self, pin: &SourcePin) -> Result<Snapshot<PackageIndex>, IndexError>;

    /// Load the overlay module an overlay pin names.
    fn fetch_overlay(&self, pin: &SourcePin) -> Result<Snapshot<Overlay>, IndexError>;
}
