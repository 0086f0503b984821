use crate::layout::StoreLayout;
use crate::{fsync_dir, StoreError};
use devpin_schema::{SnapshotDigest, SourcePin};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use std::path::PathBuf;
use tempfile::NamedTempFile;
use tracing::debug;

/// Which kind of snapshot a pin names.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SnapshotKind {
    Index,
    Overlay,
}

impl std::fmt::Display for SnapshotKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SnapshotKind::Index => write!(f, "index"),
            SnapshotKind::Overlay => write!(f, "overlay"),
        }
    }
}

/// First digest observed for a pin.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PinRecord {
    pub kind: SnapshotKind,
    pub pin: SourcePin,
    pub digest: SnapshotDigest,
    pub first_seen: String,
}

/// Registry enforcing that a pin always names the same snapshot bytes.
///
/// The first read of a pin records its digest. Any later read yielding a
/// different digest fails with [`StoreError::PinMutated`].
pub struct PinRegistry {
    layout: StoreLayout,
}

impl PinRegistry {
    pub fn new(layout: StoreLayout) -> Self {
        Self { layout }
    }

    fn record_path(&self, kind: SnapshotKind, pin: &SourcePin) -> PathBuf {
        let key = blake3::hash(format!("{kind}:{pin}").as_bytes()).to_hex();
        self.layout.pins_dir().join(format!("{key}.json"))
    }

    pub fn get(&self, kind: SnapshotKind, pin: &SourcePin) -> Result<Option<PinRecord>, StoreError> {
        let path = self.record_path(kind, pin);
        if !path.exists() {
            return Ok(None);
        }
        let content = fs::read_to_string(&path)?;
        Ok(Some(serde_json::from_str(&content)?))
    }

    /// Record `digest` for `pin`, or check it against the recorded one.
    pub fn record(
        &self,
        kind: SnapshotKind,
        pin: &SourcePin,
        digest: &SnapshotDigest,
    ) -> Result<PinRecord, StoreError> {
        if let Some(existing) = self.get(kind, pin)? {
            if existing.digest != *digest {
                return Err(StoreError::PinMutated {
                    pin: pin.to_string(),
                    recorded: existing.digest.into_inner(),
                    found: digest.to_string(),
                });
            }
            return Ok(existing);
        }

        let record = PinRecord {
            kind,
            pin: pin.clone(),
            digest: digest.clone(),
            first_seen: chrono::Utc::now().to_rfc3339(),
        };
        let content = serde_json::to_string_pretty(&record)?;

        let dir = self.layout.pins_dir();
        fs::create_dir_all(&dir)?;
        let mut tmp = NamedTempFile::new_in(&dir)?;
        tmp.write_all(content.as_bytes())?;
        tmp.as_file().sync_all()?;
        tmp.persist(self.record_path(kind, pin))
            .map_err(|e| StoreError::Io(e.error))?;
        fsync_dir(&dir)?;

        debug!("recorded {kind} pin {pin} -> {}", &digest.as_str()[..12.min(digest.len())]);
        Ok(record)
    }
}
