use crate::layout::StoreLayout;
use crate::{fsync_dir, StoreError};
use devpin_schema::SnapshotDigest;
use std::fs;
use std::io::Write;
use tempfile::NamedTempFile;

/// Content-addressable copies of every index and overlay snapshot read.
///
/// Objects are stored as files named by their blake3 hash. Writes are atomic
/// via `NamedTempFile`, and reads verify integrity by recomputing the hash.
pub struct ObjectStore {
    layout: StoreLayout,
}

/// Blake3 digest of raw snapshot bytes.
pub fn digest_bytes(data: &[u8]) -> SnapshotDigest {
    SnapshotDigest::new(blake3::hash(data).to_hex().to_string())
}

impl ObjectStore {
    pub fn new(layout: StoreLayout) -> Self {
        Self { layout }
    }

    /// Store data and return its digest. Existing objects are not rewritten.
    pub fn put(&self, data: &[u8]) -> Result<SnapshotDigest, StoreError> {
        let digest = digest_bytes(data);
        if self.exists(&digest) {
            return Ok(digest);
        }

        let dir = self.layout.objects_dir();
        let dest = dir.join(digest.as_str());
        let mut tmp = NamedTempFile::new_in(&dir)?;
        tmp.write_all(data)?;
        tmp.as_file().sync_all()?;
        tmp.persist(&dest).map_err(|e| StoreError::Io(e.error))?;
        fsync_dir(&dir)?;

        Ok(digest)
    }

    /// Retrieve data by digest, verifying integrity on read.
    pub fn get(&self, digest: &SnapshotDigest) -> Result<Vec<u8>, StoreError> {
        let path = self.layout.objects_dir().join(digest.as_str());
        if !path.exists() {
            return Err(StoreError::ObjectNotFound(digest.to_string()));
        }
        let data = fs::read(&path)?;

        let actual = digest_bytes(&data);
        if actual != *digest {
            return Err(StoreError::IntegrityFailure {
                hash: digest.to_string(),
                expected: digest.to_string(),
                actual: actual.into_inner(),
            });
        }

        Ok(data)
    }

    pub fn exists(&self, digest: &SnapshotDigest) -> bool {
        self.layout.objects_dir().join(digest.as_str()).exists()
    }
}
