//! Evaluation engine for devpin development shells.
//!
//! This crate ties together manifest loading, index snapshots, and the store
//! into the `Engine`: the `Resolver` computes a deduplicated, content-addressed
//! artifact closure against an overlaid package index, and `materialize` turns
//! that closure plus an explicit inherited environment into variables and an
//! `ActivationScript`. It also provides the store lock.

pub mod concurrency;
pub mod engine;
pub mod materialize;
pub mod resolver;
pub mod script;

pub use concurrency::StoreLock;
pub use engine::{lock_path_for, Engine, EvalOptions, Evaluation, Inspection};
pub use materialize::{
    materialize, EnvironmentVariable, InheritedEnv, MaterializeError, Materialized,
};
pub use resolver::{ResolveError, Resolution, ResolvedArtifact, Resolver};
pub use script::{shell_quote, ActivationScript, Statement};

use devpin_index::IndexError;
use devpin_schema::{LockError, ManifestError};
use devpin_store::StoreError;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("manifest error: {0}")]
    Manifest(#[from] ManifestError),
    #[error("lock error: {0}")]
    Lock(#[from] LockError),
    #[error("no lock file at {0} (run 'devpin lock' first)")]
    LockMissing(PathBuf),
    #[error("store error: {0}")]
    Store(#[from] StoreError),
    #[error("index error: {0}")]
    Index(#[from] IndexError),
    #[error("{0}")]
    Resolve(#[from] ResolveError),
    #[error("{0}")]
    Materialize(#[from] MaterializeError),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Failure classes surfaced to the user. Every failure is fatal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The declaration, an index or an overlay is structurally invalid.
    MalformedSpec,
    /// A package name, placeholder or dependency has nothing to resolve to.
    UnresolvedDependency,
    /// A package in the closure has no recipe for the target platform.
    PlatformUnsupported,
    Store,
    Other,
}

impl CoreError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            CoreError::Manifest(_) => ErrorKind::MalformedSpec,
            CoreError::Lock(e) => match e {
                LockError::Manifest(_) | LockError::Parse(_) | LockError::UnsupportedVersion(_) => {
                    ErrorKind::MalformedSpec
                }
                _ => ErrorKind::Other,
            },
            CoreError::LockMissing(_) | CoreError::Io(_) | CoreError::Serialization(_) => {
                ErrorKind::Other
            }
            CoreError::Store(_) => ErrorKind::Store,
            CoreError::Index(e) => match e {
                IndexError::Parse { .. }
                | IndexError::UnsupportedVersion { .. }
                | IndexError::InvalidDefinition { .. }
                | IndexError::NotUtf8 { .. } => ErrorKind::MalformedSpec,
                IndexError::NotFound { .. } | IndexError::Store(_) | IndexError::Io(_) => {
                    ErrorKind::Store
                }
            },
            CoreError::Resolve(e) => match e {
                ResolveError::UnresolvedDependency { .. } | ResolveError::DependencyCycle { .. } => {
                    ErrorKind::UnresolvedDependency
                }
                ResolveError::PlatformUnsupported { .. } => ErrorKind::PlatformUnsupported,
                ResolveError::UnknownFeature { .. } => ErrorKind::MalformedSpec,
                ResolveError::Hash { .. } => ErrorKind::Other,
            },
            CoreError::Materialize(e) => match e {
                MaterializeError::DanglingReference { .. } | MaterializeError::MissingDir { .. } => {
                    ErrorKind::UnresolvedDependency
                }
                MaterializeError::UnterminatedPlaceholder { .. }
                | MaterializeError::UnknownDirKind { .. } => ErrorKind::MalformedSpec,
            },
        }
    }
}
