use crate::normalize::NormalizedManifest;
use crate::types::{EnvId, ShortId};
use serde::Serialize;

/// Deterministic identity for an evaluated shell.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct EnvIdentity {
    pub env_id: EnvId,
    pub short_id: ShortId,
}

impl EnvIdentity {
    pub(crate) fn from_hasher(hasher: &blake3::Hasher) -> Self {
        let hex = hasher.finalize().to_hex().to_string();
        let short = hex[..12].to_owned();
        Self {
            env_id: EnvId::new(hex),
            short_id: ShortId::new(short),
        }
    }
}

/// Compute a **declaration** identity from unresolved manifest data.
///
/// This is NOT the canonical identity. The canonical identity comes from
/// [`LockFile::compute_identity()`](crate::LockFile::compute_identity) after
/// resolution, which hashes snapshot digests and artifact paths rather than
/// pin names. Two manifests with the same declaration identity can still
/// resolve differently if a pinned snapshot in the store changed.
pub fn compute_env_id(normalized: &NormalizedManifest) -> Result<EnvIdentity, serde_json::Error> {
    let mut hasher = blake3::Hasher::new();

    hasher.update(normalized.canonical_json()?.as_bytes());

    hasher.update(format!("source:{}", normalized.source).as_bytes());
    for overlay in &normalized.overlays {
        hasher.update(format!("overlay:{overlay}").as_bytes());
    }
    if let Some(system) = &normalized.system {
        hasher.update(format!("system:{system}").as_bytes());
    }

    for shell in normalized.shells.values() {
        hasher.update(format!("shell:{}", shell.name).as_bytes());
        for pkg in &shell.packages {
            hasher.update(format!("pkg:{}[{}]", pkg.name, pkg.features.join(",")).as_bytes());
        }
    }

    Ok(EnvIdentity::from_hasher(&hasher))
}
