use crate::identity::EnvIdentity;
use crate::manifest::ManifestError;
use crate::normalize::NormalizedManifest;
use crate::pin::SourcePin;
use crate::platform::Platform;
use crate::types::{ArtifactHash, SnapshotDigest};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use thiserror::Error;

/// File name of the lock file written next to a manifest.
pub const LOCK_FILE_NAME: &str = "devpin.lock";

#[derive(Debug, Error)]
pub enum LockError {
    #[error("manifest error: {0}")]
    Manifest(#[from] ManifestError),
    #[error("lock file I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("lock file parse error: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("lock file serialize error: {0}")]
    Serialize(#[from] toml::ser::Error),
    #[error("unsupported lock_version: {0}, expected 1")]
    UnsupportedVersion(u32),
    #[error("lock file env_id mismatch: lock has '{lock_id}', recomputed '{computed_id}'")]
    EnvIdMismatch {
        lock_id: String,
        computed_id: String,
    },
    #[error("lock file drift: {0}")]
    ManifestDrift(String),
}

pub const LOCK_VERSION: u32 = 1;

/// A pin together with the digest of the snapshot it resolved to.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LockedSource {
    pub pin: SourcePin,
    pub digest: SnapshotDigest,
}

/// One resolved artifact as recorded in the lock file.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
pub struct LockedArtifact {
    pub name: String,
    pub version: String,
    pub hash: ArtifactHash,
    pub path: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub features: Vec<String>,
}

/// Result of resolving one or more shells against pinned snapshots.
#[derive(Debug, Clone)]
pub struct ResolutionRecord {
    pub source: LockedSource,
    pub overlays: Vec<LockedSource>,
    pub system: Platform,
    pub shells: BTreeMap<String, Vec<LockedArtifact>>,
}

/// The lock file captures the fully resolved state of a manifest.
///
/// The env_id is computed from snapshot digests and artifact hashes, so
/// identical lock contents always yield the same env_id.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LockFile {
    pub lock_version: u32,
    pub env_id: String,
    pub short_id: String,
    pub system: Platform,
    pub source: LockedSource,
    #[serde(default)]
    pub overlays: Vec<LockedSource>,
    #[serde(default)]
    pub shells: BTreeMap<String, Vec<LockedArtifact>>,
}

impl LockFile {
    pub fn from_resolved(record: &ResolutionRecord) -> Self {
        let shells = record
            .shells
            .iter()
            .map(|(name, artifacts)| {
                let mut artifacts = artifacts.clone();
                artifacts.sort();
                (name.clone(), artifacts)
            })
            .collect();

        let lock = LockFile {
            lock_version: LOCK_VERSION,
            env_id: String::new(),
            short_id: String::new(),
            system: record.system.clone(),
            source: record.source.clone(),
            overlays: record.overlays.clone(),
            shells,
        };

        let identity = lock.compute_identity();
        LockFile {
            env_id: identity.env_id.into_inner(),
            short_id: identity.short_id.into_inner(),
            ..lock
        }
    }

    /// Compute the identity from the locked state.
    ///
    /// Pin names are not hashed, only what they resolved to.
    pub fn compute_identity(&self) -> EnvIdentity {
        let mut hasher = blake3::Hasher::new();

        hasher.update(format!("source:{}", self.source.digest).as_bytes());
        for overlay in &self.overlays {
            hasher.update(format!("overlay:{}", overlay.digest).as_bytes());
        }
        hasher.update(format!("system:{}", self.system).as_bytes());

        for (shell, artifacts) in &self.shells {
            hasher.update(format!("shell:{shell}").as_bytes());
            for a in artifacts {
                hasher.update(format!("artifact:{}@{}#{}", a.name, a.version, a.hash).as_bytes());
            }
        }

        EnvIdentity::from_hasher(&hasher)
    }

    /// Verify that the stored env_id matches the recomputed one.
    pub fn verify_integrity(&self) -> Result<EnvIdentity, LockError> {
        if self.lock_version != LOCK_VERSION {
            return Err(LockError::UnsupportedVersion(self.lock_version));
        }
        let identity = self.compute_identity();
        if self.env_id != identity.env_id.as_str() {
            return Err(LockError::EnvIdMismatch {
                lock_id: self.env_id.clone(),
                computed_id: identity.env_id.into_inner(),
            });
        }
        Ok(identity)
    }

    /// Check that the manifest's pins, platform and shells still match this lock file.
    ///
    /// `system` is an explicit platform override. Without one the manifest's
    /// `system` is compared; a manifest that names no platform accepts the
    /// locked one.
    pub fn verify_manifest_intent(
        &self,
        normalized: &NormalizedManifest,
        system: Option<&Platform>,
    ) -> Result<(), LockError> {
        if self.source.pin != normalized.source {
            return Err(LockError::ManifestDrift(format!(
                "source pin changed: lock has '{}', manifest has '{}'",
                self.source.pin, normalized.source
            )));
        }

        let locked: Vec<&SourcePin> = self.overlays.iter().map(|o| &o.pin).collect();
        let declared: Vec<&SourcePin> = normalized.overlays.iter().collect();
        if locked != declared {
            return Err(LockError::ManifestDrift(
                "overlay list changed. Run 'devpin lock' to re-resolve.".to_owned(),
            ));
        }

        if let Some(declared) = system.or(normalized.system.as_ref()) {
            if *declared != self.system {
                return Err(LockError::ManifestDrift(format!(
                    "platform changed: lock has '{}', manifest targets '{declared}'",
                    self.system
                )));
            }
        }

        for shell in normalized.shells.keys() {
            if !self.shells.contains_key(shell) {
                return Err(LockError::ManifestDrift(format!(
                    "shell '{shell}' is in manifest but not in lock file. Run 'devpin lock' to re-resolve."
                )));
            }
        }

        Ok(())
    }

    /// Compare a fresh resolution of one shell against what was locked.
    pub fn verify_shell(&self, shell: &str, fresh: &ResolutionRecord) -> Result<(), LockError> {
        if self.system != fresh.system {
            return Err(LockError::ManifestDrift(format!(
                "platform changed: lock has '{}', evaluating for '{}'",
                self.system, fresh.system
            )));
        }
        if self.source.digest != fresh.source.digest {
            return Err(LockError::ManifestDrift(format!(
                "snapshot for '{}' changed: lock has {}, store has {}",
                self.source.pin, self.source.digest, fresh.source.digest
            )));
        }
        for (locked, current) in self.overlays.iter().zip(&fresh.overlays) {
            if locked.digest != current.digest {
                return Err(LockError::ManifestDrift(format!(
                    "overlay '{}' changed: lock has {}, store has {}",
                    locked.pin, locked.digest, current.digest
                )));
            }
        }

        let Some(locked) = self.shells.get(shell) else {
            return Err(LockError::ManifestDrift(format!(
                "shell '{shell}' is not in lock file"
            )));
        };
        let mut current = fresh.shells.get(shell).cloned().unwrap_or_default();
        current.sort();
        if *locked != current {
            let changed: Vec<&str> = current
                .iter()
                .filter(|a| !locked.contains(a))
                .map(|a| a.name.as_str())
                .chain(
                    locked
                        .iter()
                        .filter(|a| !current.contains(a))
                        .map(|a| a.name.as_str()),
                )
                .collect();
            return Err(LockError::ManifestDrift(format!(
                "resolved artifacts of shell '{shell}' differ from lock: {}",
                changed.join(", ")
            )));
        }
        Ok(())
    }

    pub fn write_to_file(&self, path: impl AsRef<Path>) -> Result<(), LockError> {
        let path = path.as_ref();
        let content = toml::to_string_pretty(self)?;
        let dir = path.parent().unwrap_or(Path::new("."));
        let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
        std::io::Write::write_all(&mut tmp, content.as_bytes())?;
        tmp.as_file().sync_all()?;
        tmp.persist(path).map_err(|e| LockError::Io(e.error))?;
        if let Ok(f) = fs::File::open(dir) {
            let _ = f.sync_all();
        }
        Ok(())
    }

    pub fn read_from_file(path: impl AsRef<Path>) -> Result<Self, LockError> {
        let content = fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }
}
