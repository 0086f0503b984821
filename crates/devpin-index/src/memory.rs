use crate::index::{parse_index_str, PackageIndex};
use crate::overlay::{parse_overlay_str, Overlay};
use crate::source::{IndexSource, Snapshot};
use crate::IndexError;
use devpin_schema::SourcePin;
use devpin_store::{digest_bytes, SnapshotKind};
use std::collections::HashMap;

/// In-memory index source for tests and benchmarks.
///
/// Snapshots are stored as raw text and parsed on every fetch, so digests
/// behave exactly as they would for files in the store.
#[derive(Debug, Default, Clone)]
pub struct MemorySource {
    indexes: HashMap<SourcePin, String>,
    overlays: HashMap<SourcePin, String>,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_index(mut self, pin: &SourcePin, toml: impl Into<String>) -> Self {
        self.indexes.insert(pin.clone(), toml.into());
        self
    }

    pub fn with_overlay(mut self, pin: &SourcePin, toml: impl Into<String>) -> Self {
        self.overlays.insert(pin.clone(), toml.into());
        self
    }
}

impl IndexSource for MemorySource {
    fn name(&self) -> &'static str {
        "memory"
    }

    fn fetch_index(&self, pin: &SourcePin) -> Result<Snapshot<PackageIndex>, IndexError> {
        let text = self.indexes.get(pin).ok_or_else(|| IndexError::NotFound {
            kind: SnapshotKind::Index,
            pin: pin.to_string(),
            location: "memory".to_owned(),
        })?;
        Ok(Snapshot {
            pin: pin.clone(),
            digest: digest_bytes(text.as_bytes()),
            value: parse_index_str(pin, text)?,
        })
    }

    fn fetch_overlay(&self, pin: &SourcePin) -> Result<Snapshot<Overlay>, IndexError> {
        let text = self.overlays.get(pin).ok_or_else(|| IndexError::NotFound {
            kind: SnapshotKind::Overlay,
            pin: pin.to_string(),
            location: "memory".to_owned(),
        })?;
        Ok(Snapshot {
            pin: pin.clone(),
            digest: digest_bytes(text.as_bytes()),
            value: parse_overlay_str(pin, text)?,
        })
    }
}
