use crate::StoreError;
use devpin_schema::SourcePin;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

/// Current store format version. Incremented on incompatible layout changes.
pub const STORE_FORMAT_VERSION: u32 = 1;
const VERSION_FILE: &str = "version";

/// Directory layout for a devpin store.
///
/// ```text
/// <root>/indexes/<owner>/<repo>/<ref>.toml    package index snapshots
/// <root>/overlays/<owner>/<repo>/<ref>.toml   overlay snapshots
/// <root>/artifacts/<hash>-<name>-<version>    artifact paths handed out by the resolver
/// <root>/store/objects/<blake3>               copies of every snapshot read
/// <root>/store/pins/<blake3(pin)>.json        pin -> digest registry
/// ```
///
/// Index and overlay files are placed by whatever fetches them; devpin only
/// reads them. All subdirectories are created on [`initialize`](Self::initialize).
#[derive(Debug, Clone)]
pub struct StoreLayout {
    root: PathBuf,
}

#[derive(Debug, Serialize, Deserialize)]
struct StoreVersion {
    format_version: u32,
}

impl StoreLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    #[inline]
    pub fn root(&self) -> &Path {
        &self.root
    }

    #[inline]
    pub fn indexes_dir(&self) -> PathBuf {
        self.root.join("indexes")
    }

    #[inline]
    pub fn overlays_dir(&self) -> PathBuf {
        self.root.join("overlays")
    }

    #[inline]
    pub fn artifacts_dir(&self) -> PathBuf {
        self.root.join("artifacts")
    }

    #[inline]
    pub fn objects_dir(&self) -> PathBuf {
        self.root.join("store").join("objects")
    }

    #[inline]
    pub fn pins_dir(&self) -> PathBuf {
        self.root.join("store").join("pins")
    }

    #[inline]
    pub fn lock_file(&self) -> PathBuf {
        self.root.join("store").join(".lock")
    }

    pub fn index_file(&self, pin: &SourcePin) -> PathBuf {
        self.indexes_dir().join(pin.relative_path("toml"))
    }

    pub fn overlay_file(&self, pin: &SourcePin) -> PathBuf {
        self.overlays_dir().join(pin.relative_path("toml"))
    }

    pub fn initialize(&self) -> Result<(), StoreError> {
        fs::create_dir_all(self.indexes_dir())?;
        fs::create_dir_all(self.overlays_dir())?;
        fs::create_dir_all(self.artifacts_dir())?;
        fs::create_dir_all(self.objects_dir())?;
        fs::create_dir_all(self.pins_dir())?;

        let version_path = self.root.join("store").join(VERSION_FILE);
        if version_path.exists() {
            self.verify_version()?;
        } else {
            let ver = StoreVersion {
                format_version: STORE_FORMAT_VERSION,
            };
            let content = serde_json::to_string_pretty(&ver)?;
            let store_dir = self.root.join("store");
            let mut tmp = NamedTempFile::new_in(&store_dir)?;
            tmp.write_all(content.as_bytes())?;
            tmp.as_file().sync_all()?;
            tmp.persist(&version_path)
                .map_err(|e| StoreError::Io(e.error))?;
            crate::fsync_dir(&store_dir)?;
        }

        Ok(())
    }

    pub fn verify_version(&self) -> Result<(), StoreError> {
        let version_path = self.root.join("store").join(VERSION_FILE);
        let content = fs::read_to_string(&version_path)?;
        let ver: StoreVersion = serde_json::from_str(&content)?;

        if ver.format_version != STORE_FORMAT_VERSION {
            return Err(StoreError::VersionMismatch {
                expected: STORE_FORMAT_VERSION,
                found: ver.format_version,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout_paths_are_correct() {
        let layout = StoreLayout::new("/tmp/devpin-test");
        assert_eq!(
            layout.objects_dir(),
            PathBuf::from("/tmp/devpin-test/store/objects")
        );
        assert_eq!(
            layout.pins_dir(),
            PathBuf::from("/tmp/devpin-test/store/pins")
        );
        assert_eq!(
            layout.artifacts_dir(),
            PathBuf::from("/tmp/devpin-test/artifacts")
        );
        let pin = SourcePin::parse("nixos/nixpkgs/nixos-unstable").unwrap();
        assert_eq!(
            layout.index_file(&pin),
            PathBuf::from("/tmp/devpin-test/indexes/nixos/nixpkgs/nixos-unstable.toml")
        );
        assert_eq!(
            layout.overlay_file(&pin),
            PathBuf::from("/tmp/devpin-test/overlays/nixos/nixpkgs/nixos-unstable.toml")
        );
    }

    #[test]
    fn initialize_creates_directories() {
        let dir = tempfile::tempdir().unwrap();
        let layout = StoreLayout::new(dir.path());
        layout.initialize().unwrap();

        assert!(layout.indexes_dir().is_dir());
        assert!(layout.overlays_dir().is_dir());
        assert!(layout.objects_dir().is_dir());
        assert!(layout.pins_dir().is_dir());
    }

    #[test]
    fn initialize_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let layout = StoreLayout::new(dir.path());
        layout.initialize().unwrap();
        layout.initialize().unwrap();
        layout.verify_version().unwrap();
    }

    #[test]
    fn version_mismatch_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let layout = StoreLayout::new(dir.path());
        layout.initialize().unwrap();
        fs::write(
            dir.path().join("store").join(VERSION_FILE),
            r#"{"format_version": 99}"#,
        )
        .unwrap();
        assert!(matches!(
            layout.verify_version(),
            Err(StoreError::VersionMismatch { found: 99, .. })
        ));
    }
}
