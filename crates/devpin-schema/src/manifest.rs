use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("failed to read manifest file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse manifest: {0}")]
    ParseToml(#[from] toml::de::Error),
    #[error("unsupported manifest_version: {0}, expected 1")]
    UnsupportedVersion(u32),
    #[error("manifest has no source pin (set `source = \"owner/repo/ref\"`)")]
    MissingSourcePin,
    #[error("invalid pin '{pin}': {reason}")]
    InvalidPin { pin: String, reason: String },
    #[error("invalid platform '{0}', expected '<arch>-<os>'")]
    InvalidPlatform(String),
    #[error("manifest declares no shells")]
    NoShells,
    #[error("unknown shell '{name}' (available: {available})")]
    UnknownShell { name: String, available: String },
    #[error("shell name must not be empty")]
    EmptyShellName,
    #[error("package name must not be empty in shell '{0}'")]
    EmptyPackageName(String),
    #[error("invalid variable name '{name}' in shell '{shell}'")]
    InvalidVariableName { shell: String, name: String },
    #[error("variable '{name}' is declared twice in shell '{shell}'")]
    DuplicateVariable { shell: String, name: String },
    #[error("invalid alias name '{name}' in shell '{shell}'")]
    InvalidAliasName { shell: String, name: String },
}

/// Kind of artifact subdirectory a path variable collects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DirKind {
    Lib,
    Include,
    Bin,
    Pkgconfig,
}

impl DirKind {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "lib" => Some(Self::Lib),
            "include" => Some(Self::Include),
            "bin" => Some(Self::Bin),
            "pkgconfig" => Some(Self::Pkgconfig),
            _ => None,
        }
    }
}

impl std::fmt::Display for DirKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DirKind::Lib => write!(f, "lib"),
            DirKind::Include => write!(f, "include"),
            DirKind::Bin => write!(f, "bin"),
            DirKind::Pkgconfig => write!(f, "pkgconfig"),
        }
    }
}

/// Where artifact directories go relative to an inherited list value.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MergeStrategy {
    #[default]
    Append,
    Prepend,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct ManifestV1 {
    pub manifest_version: u32,
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub overlays: Vec<String>,
    #[serde(default)]
    pub system: Option<String>,
    #[serde(default)]
    pub shells: BTreeMap<String, ShellSection>,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct ShellSection {
    #[serde(default)]
    pub packages: Vec<PackageEntry>,
    #[serde(default = "default_auto_path")]
    pub auto_path: bool,
    #[serde(default)]
    pub env: BTreeMap<String, String>,
    #[serde(default)]
    pub path_vars: BTreeMap<String, PathVarSection>,
    #[serde(default)]
    pub aliases: BTreeMap<String, String>,
    #[serde(default)]
    pub hook: Vec<String>,
}

impl Default for ShellSection {
    fn default() -> Self {
        Self {
            packages: Vec::new(),
            auto_path: default_auto_path(),
            env: BTreeMap::new(),
            path_vars: BTreeMap::new(),
            aliases: BTreeMap::new(),
            hook: Vec::new(),
        }
    }
}

/// A package request: either a bare name or a table with feature flags.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum PackageEntry {
    Name(String),
    Detailed(DetailedPackage),
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct DetailedPackage {
    pub name: String,
    #[serde(default)]
    pub features: Vec<String>,
}

impl PackageEntry {
    pub fn name(&self) -> &str {
        match self {
            PackageEntry::Name(n) => n,
            PackageEntry::Detailed(d) => &d.name,
        }
    }

    pub fn features(&self) -> &[String] {
        match self {
            PackageEntry::Name(_) => &[],
            PackageEntry::Detailed(d) => &d.features,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct PathVarSection {
    pub kind: DirKind,
    #[serde(default)]
    pub packages: Option<Vec<String>>,
    #[serde(default)]
    pub merge: MergeStrategy,
}

fn default_auto_path() -> bool {
    true
}

pub fn parse_manifest_str(input: &str) -> Result<ManifestV1, ManifestError> {
    Ok(toml::from_str(input)?)
}

pub fn parse_manifest_file(path: impl AsRef<Path>) -> Result<ManifestV1, ManifestError> {
    let content = fs::read_to_string(path)?;
    parse_manifest_str(&content)
}
