use crate::index::{PackageDef, PackageIndex};
use crate::IndexError;
use devpin_schema::SourcePin;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::debug;

/// A single patch against a package index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PatchOp {
    Upsert(String, PackageDef),
    Remove(String),
}

/// An overlay: an ordered list of patch operations from one pinned module.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Overlay {
    pub pin: SourcePin,
    pub ops: Vec<PatchOp>,
}

#[derive(Debug, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
struct OverlayFile {
    overlay_version: u32,
    #[serde(default)]
    remove: Vec<String>,
    #[serde(default)]
    packages: BTreeMap<String, PackageDef>,
}

/// Parse an overlay snapshot. Removals are applied before upserts, so an
/// overlay can replace a definition wholesale by removing and redefining it.
pub fn parse_overlay_str(pin: &SourcePin, input: &str) -> Result<Overlay, IndexError> {
    let file: OverlayFile = toml::from_str(input).map_err(|error| IndexError::Parse {
        pin: pin.to_string(),
        error,
    })?;
    if file.overlay_version != 1 {
        return Err(IndexError::UnsupportedVersion {
            pin: pin.to_string(),
            found: file.overlay_version,
        });
    }

    let mut ops = Vec::with_capacity(file.remove.len() + file.packages.len());
    for name in file.remove {
        ops.push(PatchOp::Remove(name.trim().to_owned()));
    }
    for (name, def) in file.packages {
        def.validate(pin, &name)?;
        ops.push(PatchOp::Upsert(name, def));
    }

    Ok(Overlay {
        pin: pin.clone(),
        ops,
    })
}

impl PackageIndex {
    /// Apply one overlay in place, last write wins.
    pub fn apply(&mut self, overlay: &Overlay) {
        for op in &overlay.ops {
            match op {
                PatchOp::Upsert(name, def) => {
                    if self.packages.insert(name.clone(), def.clone()).is_some() {
                        debug!("overlay {} overrides '{name}'", overlay.pin);
                    }
                }
                PatchOp::Remove(name) => {
                    if self.packages.remove(name).is_some() {
                        debug!("overlay {} removes '{name}'", overlay.pin);
                    }
                }
            }
        }
    }
}

/// Apply overlays left to right on a copy of `base`.
pub fn apply_overlays(base: &PackageIndex, overlays: &[Overlay]) -> PackageIndex {
    let mut index = base.clone();
    for overlay in overlays {
        index.apply(overlay);
    }
    index
}
