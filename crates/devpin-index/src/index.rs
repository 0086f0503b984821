use crate::IndexError;
use devpin_schema::{Platform, SourcePin};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Component, Path};

/// One package definition in an index or overlay.
///
/// A definition is either concrete (has a `version`) or an alias naming
/// another package it stands for. Aliases carry no other fields.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct PackageDef {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,
    #[serde(default)]
    pub deps: Vec<String>,
    /// Empty means the recipe builds on every platform.
    #[serde(default)]
    pub platforms: Vec<Platform>,
    /// Feature name to the extra dependencies it pulls in.
    #[serde(default)]
    pub features: BTreeMap<String, Vec<String>>,
    #[serde(default = "default_lib_dirs")]
    pub lib_dirs: Vec<String>,
    #[serde(default = "default_include_dirs")]
    pub include_dirs: Vec<String>,
    #[serde(default = "default_bin_dirs")]
    pub bin_dirs: Vec<String>,
}

fn default_lib_dirs() -> Vec<String> {
    vec!["lib".to_owned()]
}

fn default_include_dirs() -> Vec<String> {
    vec!["include".to_owned()]
}

fn default_bin_dirs() -> Vec<String> {
    vec!["bin".to_owned()]
}

impl PackageDef {
    /// A concrete definition with default directories and no dependencies.
    pub fn concrete(version: impl Into<String>) -> Self {
        Self {
            version: Some(version.into()),
            alias: None,
            deps: Vec::new(),
            platforms: Vec::new(),
            features: BTreeMap::new(),
            lib_dirs: default_lib_dirs(),
            include_dirs: default_include_dirs(),
            bin_dirs: default_bin_dirs(),
        }
    }

    pub fn with_deps<I, S>(mut self, deps: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.deps = deps.into_iter().map(Into::into).collect();
        self
    }

    pub fn supports(&self, platform: &Platform) -> bool {
        self.platforms.is_empty() || self.platforms.contains(platform)
    }

    /// Stable serialization used for artifact hashing.
    pub fn canonical_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub(crate) fn validate(&self, pin: &SourcePin, name: &str) -> Result<(), IndexError> {
        let invalid = |reason: String| IndexError::InvalidDefinition {
            pin: pin.to_string(),
            name: name.to_owned(),
            reason,
        };

        if name.trim().is_empty() || name != name.trim() {
            return Err(invalid("package name is empty or padded".to_owned()));
        }

        match (&self.version, &self.alias) {
            (Some(_), Some(_)) => {
                return Err(invalid("both `version` and `alias` are set".to_owned()));
            }
            (None, None) => {
                return Err(invalid("needs `version` or `alias`".to_owned()));
            }
            (Some(v), None) if v.trim().is_empty() => {
                return Err(invalid("version is empty".to_owned()));
            }
            (None, Some(target)) => {
                if target.trim().is_empty() {
                    return Err(invalid("alias target is empty".to_owned()));
                }
                if !self.deps.is_empty() || !self.features.is_empty() || !self.platforms.is_empty()
                {
                    return Err(invalid(
                        "an alias cannot declare deps, features or platforms".to_owned(),
                    ));
                }
            }
            _ => {}
        }

        if let Some(dep) = self
            .deps
            .iter()
            .chain(self.features.values().flatten())
            .find(|d| d.trim().is_empty())
        {
            return Err(invalid(format!("empty dependency name '{dep}'")));
        }

        for dir in self
            .lib_dirs
            .iter()
            .chain(&self.include_dirs)
            .chain(&self.bin_dirs)
        {
            if !is_relative_subpath(dir) {
                return Err(invalid(format!(
                    "directory '{dir}' must be relative and stay inside the artifact"
                )));
            }
        }

        Ok(())
    }
}

fn is_relative_subpath(dir: &str) -> bool {
    !dir.is_empty()
        && Path::new(dir)
            .components()
            .all(|c| matches!(c, Component::Normal(_) | Component::CurDir))
}

/// A package index snapshot: package name to definition.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct PackageIndex {
    pub index_version: u32,
    #[serde(default)]
    pub packages: BTreeMap<String, PackageDef>,
}

impl PackageIndex {
    pub fn get(&self, name: &str) -> Option<&PackageDef> {
        self.packages.get(name)
    }

    pub fn len(&self) -> usize {
        self.packages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.packages.is_empty()
    }

    pub(crate) fn validate(&self, pin: &SourcePin) -> Result<(), IndexError> {
        if self.index_version != 1 {
            return Err(IndexError::UnsupportedVersion {
                pin: pin.to_string(),
                found: self.index_version,
            });
        }
        for (name, def) in &self.packages {
            def.validate(pin, name)?;
        }
        Ok(())
    }
}

pub fn parse_index_str(pin: &SourcePin, input: &str) -> Result<PackageIndex, IndexError> {
    let index: PackageIndex = toml::from_str(input).map_err(|error| IndexError::Parse {
        pin: pin.to_string(),
        error,
    })?;
    index.validate(pin)?;
    Ok(index)
}
