use crate::concurrency::StoreLock;
use crate::materialize::{materialize, EnvironmentVariable, InheritedEnv};
use crate::resolver::{Resolution, Resolver};
use crate::script::ActivationScript;
use crate::CoreError;
use devpin_index::{IndexSource, Overlay, PackageIndex, Snapshot, StoreSource};
use devpin_schema::{
    compute_env_id, parse_manifest_file, EnvIdentity, LockError, LockFile, LockedArtifact,
    NormalizedManifest, Platform, ResolutionRecord, LOCK_FILE_NAME,
};
use devpin_store::StoreLayout;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Evaluates manifests against the snapshots in one store.
///
/// The whole pipeline (load, resolve, materialize) either completes or
/// fails; no partial result is ever returned.
pub struct Engine {
    layout: StoreLayout,
    source: Box<dyn IndexSource>,
}

#[derive(Debug, Clone, Default)]
pub struct EvalOptions {
    /// Shell to evaluate. `None` selects `default`, or the only shell.
    pub shell: Option<String>,
    /// Overrides the manifest's platform.
    pub system: Option<Platform>,
    /// Require `devpin.lock` and fail on any difference from it.
    pub locked: bool,
}

/// Result of evaluating one shell.
#[derive(Debug, Clone)]
pub struct Evaluation {
    pub shell: String,
    pub identity: EnvIdentity,
    /// Lock state of this shell alone.
    pub lock: LockFile,
    pub resolution: Resolution,
    pub variables: Vec<EnvironmentVariable>,
    pub script: ActivationScript,
}

/// What `inspect` reports about a manifest without resolving it.
#[derive(Debug, Clone)]
pub struct Inspection {
    pub manifest: NormalizedManifest,
    pub declaration: EnvIdentity,
    pub platform: Platform,
    pub lock: Option<LockFile>,
}

struct Snapshots {
    index: Snapshot<PackageIndex>,
    overlays: Vec<Snapshot<Overlay>>,
}

impl Snapshots {
    fn overlay_values(&self) -> Vec<Overlay> {
        self.overlays.iter().map(|s| s.value.clone()).collect()
    }

    fn record(
        &self,
        platform: &Platform,
        shells: BTreeMap<String, Vec<LockedArtifact>>,
    ) -> ResolutionRecord {
        ResolutionRecord {
            source: self.index.locked(),
            overlays: self.overlays.iter().map(Snapshot::locked).collect(),
            system: platform.clone(),
            shells,
        }
    }
}

/// Path of the lock file belonging to a manifest.
pub fn lock_path_for(manifest_path: &Path) -> PathBuf {
    manifest_path
        .parent()
        .unwrap_or(Path::new("."))
        .join(LOCK_FILE_NAME)
}

fn load_manifest(manifest_path: &Path) -> Result<NormalizedManifest, CoreError> {
    let manifest = parse_manifest_file(manifest_path)?;
    Ok(manifest.normalize()?)
}

impl Engine {
    /// Create an engine reading snapshots from the store at `store_root`.
    pub fn new(store_root: impl Into<PathBuf>) -> Self {
        let root: PathBuf = store_root.into();
        let root = std::path::absolute(&root).unwrap_or(root);
        let layout = StoreLayout::new(root);
        let source = StoreSource::new(layout.clone());
        Self {
            layout,
            source: Box::new(source),
        }
    }

    /// Create an engine that takes snapshots from `source` instead of the store.
    /// Artifact paths are still placed under `store_root`.
    pub fn with_source(store_root: impl Into<PathBuf>, source: impl IndexSource + 'static) -> Self {
        let root: PathBuf = store_root.into();
        let root = std::path::absolute(&root).unwrap_or(root);
        Self {
            layout: StoreLayout::new(root),
            source: Box::new(source),
        }
    }

    pub fn store_root(&self) -> &Path {
        self.layout.root()
    }

    fn fetch(&self, normalized: &NormalizedManifest) -> Result<Snapshots, CoreError> {
        self.layout.initialize()?;
        let lock_path = self.layout.lock_file();
        let _lock = match StoreLock::try_acquire(&lock_path)? {
            Some(lock) => lock,
            None => {
                debug!("store is locked by another process, waiting");
                StoreLock::acquire(&lock_path)?
            }
        };

        debug!(
            "fetching snapshots for {} via {} source",
            normalized.source,
            self.source.name()
        );
        let index = self.source.fetch_index(&normalized.source)?;
        let overlays = normalized
            .overlays
            .iter()
            .map(|pin| self.source.fetch_overlay(pin))
            .collect::<Result<Vec<_>, _>>()?;

        debug!(
            "index {} -> {} ({} packages, {} overlay(s))",
            index.pin,
            &index.digest.as_str()[..12.min(index.digest.len())],
            index.value.len(),
            overlays.len()
        );
        Ok(Snapshots { index, overlays })
    }

    /// Evaluate one shell of the manifest into variables and an activation script.
    pub fn evaluate(
        &self,
        manifest_path: &Path,
        options: &EvalOptions,
        inherited: &InheritedEnv,
    ) -> Result<Evaluation, CoreError> {
        info!("evaluating {}", manifest_path.display());
        let normalized = load_manifest(manifest_path)?;
        let shell = normalized.shell(options.shell.as_deref())?;

        let existing = if options.locked {
            let lock = read_lock(manifest_path)?;
            lock.verify_integrity()?;
            lock.verify_manifest_intent(&normalized, options.system.as_ref())?;
            Some(lock)
        } else {
            None
        };
        let platform = match &existing {
            Some(lock) => locked_platform(&normalized, options.system.as_ref(), lock),
            None => normalized.target_platform(options.system.as_ref()),
        };

        let snapshots = self.fetch(&normalized)?;
        let overlays = snapshots.overlay_values();
        let artifacts_dir = self.layout.artifacts_dir();
        let resolver = Resolver::new(
            &snapshots.index.value,
            &overlays,
            &normalized.source,
            &platform,
            &artifacts_dir,
        );
        let resolution = resolver.resolve(&shell.packages)?;

        let mut shells = BTreeMap::new();
        shells.insert(shell.name.clone(), resolution.to_locked());
        let record = snapshots.record(&platform, shells);
        if let Some(lock) = &existing {
            lock.verify_shell(&shell.name, &record)?;
            debug!("shell '{}' matches {LOCK_FILE_NAME}", shell.name);
        }

        let materialized = materialize(&resolution, shell, inherited)?;
        let lock = LockFile::from_resolved(&record);
        let identity = lock.compute_identity();

        info!(
            "shell '{}' evaluated: {} artifact(s), env {}",
            shell.name,
            resolution.len(),
            identity.short_id
        );

        Ok(Evaluation {
            shell: shell.name.clone(),
            identity,
            lock,
            resolution,
            variables: materialized.variables,
            script: materialized.script,
        })
    }

    /// Resolve every shell of the manifest.
    fn resolve_all(
        &self,
        normalized: &NormalizedManifest,
        system: Option<&Platform>,
    ) -> Result<ResolutionRecord, CoreError> {
        let platform = normalized.target_platform(system);
        let snapshots = self.fetch(normalized)?;
        let overlays = snapshots.overlay_values();
        let artifacts_dir = self.layout.artifacts_dir();
        let resolver = Resolver::new(
            &snapshots.index.value,
            &overlays,
            &normalized.source,
            &platform,
            &artifacts_dir,
        );

        let mut shells = BTreeMap::new();
        for (name, shell) in &normalized.shells {
            let resolution = resolver.resolve(&shell.packages)?;
            shells.insert(name.clone(), resolution.to_locked());
        }
        Ok(snapshots.record(&platform, shells))
    }

    /// Resolve every shell and write `devpin.lock` next to the manifest.
    pub fn lock(
        &self,
        manifest_path: &Path,
        system: Option<&Platform>,
    ) -> Result<LockFile, CoreError> {
        info!("locking {}", manifest_path.display());
        let normalized = load_manifest(manifest_path)?;
        let record = self.resolve_all(&normalized, system)?;
        let lock = LockFile::from_resolved(&record);

        let lock_path = lock_path_for(manifest_path);
        lock.write_to_file(&lock_path)?;
        info!("wrote {} (env {})", lock_path.display(), lock.short_id);
        Ok(lock)
    }

    /// Check that `devpin.lock` still describes what the manifest resolves to.
    pub fn check_lock(
        &self,
        manifest_path: &Path,
        system: Option<&Platform>,
    ) -> Result<LockFile, CoreError> {
        let normalized = load_manifest(manifest_path)?;
        let lock = read_lock(manifest_path)?;
        lock.verify_integrity()?;
        lock.verify_manifest_intent(&normalized, system)?;

        let platform = locked_platform(&normalized, system, &lock);
        let record = self.resolve_all(&normalized, Some(&platform))?;
        for shell in normalized.shells.keys() {
            lock.verify_shell(shell, &record)?;
        }
        if let Some(stale) = lock.shells.keys().find(|s| !record.shells.contains_key(*s)) {
            return Err(LockError::ManifestDrift(format!(
                "shell '{stale}' is in lock file but not in manifest. Run 'devpin lock' to re-resolve."
            ))
            .into());
        }
        Ok(lock)
    }

    /// Load and normalize a manifest without touching the store.
    pub fn inspect(&self, manifest_path: &Path) -> Result<Inspection, CoreError> {
        let manifest = load_manifest(manifest_path)?;
        let declaration = compute_env_id(&manifest)?;
        let platform = manifest.target_platform(None);
        let lock_path = lock_path_for(manifest_path);
        let lock = if lock_path.exists() {
            Some(LockFile::read_from_file(&lock_path)?)
        } else {
            None
        };
        Ok(Inspection {
            manifest,
            declaration,
            platform,
            lock,
        })
    }
}

/// Platform of a locked evaluation: an explicit override, then the manifest's
/// `system`, then the platform recorded in the lock file.
fn locked_platform(
    normalized: &NormalizedManifest,
    system: Option<&Platform>,
    lock: &LockFile,
) -> Platform {
    system
        .or(normalized.system.as_ref())
        .unwrap_or(&lock.system)
        .clone()
}

fn read_lock(manifest_path: &Path) -> Result<LockFile, CoreError> {
    let lock_path = lock_path_for(manifest_path);
    if !lock_path.exists() {
        return Err(CoreError::LockMissing(lock_path));
    }
    Ok(LockFile::read_from_file(&lock_path)?)
}
