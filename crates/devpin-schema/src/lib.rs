//! Manifest parsing, normalization, source pins, lock files, and identity for devpin.
//!
//! This crate is the input layer: TOML manifest parsing (`ManifestV1`),
//! validated representations (`NormalizedManifest`), `owner/repo/ref` source
//! pins, `<arch>-<os>` platform ids, deterministic identity hashing, and the
//! `devpin.lock` file recording what every pin resolved to.

pub mod identity;
pub mod lock;
pub mod manifest;
pub mod normalize;
pub mod pin;
pub mod platform;
pub mod types;

pub use identity::{compute_env_id, EnvIdentity};
pub use lock::{
    LockError, LockFile, LockedArtifact, LockedSource, ResolutionRecord, LOCK_FILE_NAME,
};
pub use manifest::{
    parse_manifest_file, parse_manifest_str, DirKind, ManifestError, ManifestV1, MergeStrategy,
    PackageEntry, PathVarSection, ShellSection,
};
pub use normalize::{
    NormalizedManifest, NormalizedPathVar, NormalizedShell, PackageRef, DEFAULT_SHELL,
};
pub use pin::SourcePin;
pub use platform::Platform;
pub use types::{ArtifactHash, EnvId, ShortId, SnapshotDigest};
