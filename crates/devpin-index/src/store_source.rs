use crate::index::{parse_index_str, PackageIndex};
use crate::overlay::{parse_overlay_str, Overlay};
use crate::source::{IndexSource, Snapshot};
use crate::IndexError;
use devpin_schema::{SnapshotDigest, SourcePin};
use devpin_store::{digest_bytes, ObjectStore, PinRegistry, SnapshotKind, StoreLayout};
use std::fs;
use std::path::PathBuf;
use tracing::debug;

/// Reads snapshots placed under a store root.
///
/// Every snapshot read is copied into the object store and its digest checked
/// against the pin registry, so a pin that starts pointing at different
/// bytes is reported instead of silently producing a different environment.
/// A pin already registered is served from the object store once its file
/// under `indexes/` or `overlays/` is gone.
pub struct StoreSource {
    layout: StoreLayout,
    objects: ObjectStore,
    pins: PinRegistry,
}

impl StoreSource {
    pub fn new(layout: StoreLayout) -> Self {
        Self {
            objects: ObjectStore::new(layout.clone()),
            pins: PinRegistry::new(layout.clone()),
            layout,
        }
    }

    fn read_snapshot(
        &self,
        kind: SnapshotKind,
        pin: &SourcePin,
        path: PathBuf,
    ) -> Result<(String, SnapshotDigest), IndexError> {
        let bytes = if path.exists() {
            debug!("read {kind} {pin} from {}", path.display());
            fs::read(&path)?
        } else if let Some(record) = self.pins.get(kind, pin)? {
            debug!("{kind} {pin} served from object {}", record.digest);
            self.objects.get(&record.digest)?
        } else {
            return Err(IndexError::NotFound {
                kind,
                pin: pin.to_string(),
                location: path.display().to_string(),
            });
        };
        let digest = digest_bytes(&bytes);
        let text = String::from_utf8(bytes).map_err(|_| IndexError::NotUtf8 {
            pin: pin.to_string(),
        })?;
        Ok((text, digest))
    }

    fn commit(
        &self,
        kind: SnapshotKind,
        pin: &SourcePin,
        text: &str,
        digest: &SnapshotDigest,
    ) -> Result<(), IndexError> {
        self.objects.put(text.as_bytes())?;
        self.pins.record(kind, pin, digest)?;
        Ok(())
    }
}

impl IndexSource for StoreSource {
    fn name(&self) -> &'static str {
        "store"
    }

    fn fetch_index(&self, pin: &SourcePin) -> Result<Snapshot<PackageIndex>, IndexError> {
        let (text, digest) =
            self.read_snapshot(SnapshotKind::Index, pin, self.layout.index_file(pin))?;
        let value = parse_index_str(pin, &text)?;
        self.commit(SnapshotKind::Index, pin, &text, &digest)?;
        Ok(Snapshot {
            pin: pin.clone(),
            digest,
            value,
        })
    }

    fn fetch_overlay(&self, pin: &SourcePin) -> Result<Snapshot<Overlay>, IndexError> {
        let (text, digest) =
            self.read_snapshot(SnapshotKind::Overlay, pin, self.layout.overlay_file(pin))?;
        let value = parse_overlay_str(pin, &text)?;
        self.commit(SnapshotKind::Overlay, pin, &text, &digest)?;
        Ok(Snapshot {
            pin: pin.clone(),
            digest,
            value,
        })
    }
}
