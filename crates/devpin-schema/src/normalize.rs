use crate::manifest::{DirKind, ManifestError, ManifestV1, MergeStrategy, ShellSection};
use crate::pin::SourcePin;
use crate::platform::Platform;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Name of the shell selected when none is given explicitly.
pub const DEFAULT_SHELL: &str = "default";

/// Canonical, validated representation of a parsed manifest.
///
/// Pins and platform are parsed, shells are keyed by name, and duplicate
/// package requests inside a shell are collapsed. This is the input to the
/// resolver, identity hashing and lock file generation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NormalizedManifest {
    pub manifest_version: u32,
    pub source: SourcePin,
    pub overlays: Vec<SourcePin>,
    pub system: Option<Platform>,
    pub shells: BTreeMap<String, NormalizedShell>,
}

/// A request for one package from the pinned index.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PackageRef {
    pub name: String,
    pub source: SourcePin,
    /// Sorted and deduplicated.
    pub features: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NormalizedPathVar {
    pub kind: DirKind,
    pub packages: Option<Vec<String>>,
    pub merge: MergeStrategy,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NormalizedShell {
    pub name: String,
    /// Declaration order, first occurrence wins the position.
    pub packages: Vec<PackageRef>,
    pub auto_path: bool,
    pub env: BTreeMap<String, String>,
    pub path_vars: BTreeMap<String, NormalizedPathVar>,
    pub aliases: BTreeMap<String, String>,
    pub hook: Vec<String>,
}

impl ManifestV1 {
    /// Normalize the manifest: validate pins and names, collapse duplicates.
    pub fn normalize(&self) -> Result<NormalizedManifest, ManifestError> {
        if self.manifest_version != 1 {
            return Err(ManifestError::UnsupportedVersion(self.manifest_version));
        }

        let source = match self.source.as_deref().map(str::trim) {
            None | Some("") => return Err(ManifestError::MissingSourcePin),
            Some(raw) => SourcePin::parse(raw)?,
        };

        let overlays = self
            .overlays
            .iter()
            .map(|o| SourcePin::parse(o))
            .collect::<Result<Vec<_>, _>>()?;

        let system = self.system.as_deref().map(Platform::parse).transpose()?;

        if self.shells.is_empty() {
            return Err(ManifestError::NoShells);
        }

        let mut shells = BTreeMap::new();
        for (name, section) in &self.shells {
            let name = name.trim();
            if name.is_empty() {
                return Err(ManifestError::EmptyShellName);
            }
            shells.insert(name.to_owned(), normalize_shell(name, section, &source)?);
        }

        Ok(NormalizedManifest {
            manifest_version: self.manifest_version,
            source,
            overlays,
            system,
            shells,
        })
    }
}

impl NormalizedManifest {
    pub fn canonical_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Pick a shell by name. Without a name, `default` is used, or the only
    /// shell if exactly one is declared.
    pub fn shell(&self, name: Option<&str>) -> Result<&NormalizedShell, ManifestError> {
        let wanted = match name {
            Some(n) => n,
            None if self.shells.len() == 1 => {
                return self
                    .shells
                    .values()
                    .next()
                    .ok_or(ManifestError::NoShells);
            }
            None => DEFAULT_SHELL,
        };
        self.shells
            .get(wanted)
            .ok_or_else(|| ManifestError::UnknownShell {
                name: wanted.to_owned(),
                available: self.shells.keys().cloned().collect::<Vec<_>>().join(", "),
            })
    }

    /// The platform to resolve for: an explicit override, then the manifest, then the host.
    pub fn target_platform(&self, overridden: Option<&Platform>) -> Platform {
        overridden
            .or(self.system.as_ref())
            .cloned()
            .unwrap_or_else(Platform::host)
    }
}

fn normalize_shell(
    name: &str,
    section: &ShellSection,
    source: &SourcePin,
) -> Result<NormalizedShell, ManifestError> {
    let mut packages: Vec<PackageRef> = Vec::with_capacity(section.packages.len());
    for entry in &section.packages {
        let pkg_name = entry.name().trim();
        if pkg_name.is_empty() {
            return Err(ManifestError::EmptyPackageName(name.to_owned()));
        }
        let features = entry.features();
        if let Some(existing) = packages.iter_mut().find(|p| p.name == pkg_name) {
            existing.features.extend(features.iter().cloned());
            existing.features = normalize_string_list(&existing.features);
        } else {
            packages.push(PackageRef {
                name: pkg_name.to_owned(),
                source: source.clone(),
                features: normalize_string_list(features),
            });
        }
    }

    for var in section.env.keys().chain(section.path_vars.keys()) {
        if !is_valid_var_name(var) {
            return Err(ManifestError::InvalidVariableName {
                shell: name.to_owned(),
                name: var.clone(),
            });
        }
    }
    if let Some(dup) = section
        .env
        .keys()
        .find(|k| section.path_vars.contains_key(*k))
    {
        return Err(ManifestError::DuplicateVariable {
            shell: name.to_owned(),
            name: dup.clone(),
        });
    }

    for alias in section.aliases.keys() {
        if !is_valid_alias_name(alias) {
            return Err(ManifestError::InvalidAliasName {
                shell: name.to_owned(),
                name: alias.clone(),
            });
        }
    }

    let path_vars = section
        .path_vars
        .iter()
        .map(|(var, spec)| {
            (
                var.clone(),
                NormalizedPathVar {
                    kind: spec.kind,
                    packages: spec.packages.as_ref().map(|p| {
                        let mut seen = Vec::with_capacity(p.len());
                        for n in p.iter().map(|n| n.trim()).filter(|n| !n.is_empty()) {
                            if !seen.iter().any(|s: &String| s == n) {
                                seen.push(n.to_owned());
                            }
                        }
                        seen
                    }),
                    merge: spec.merge,
                },
            )
        })
        .collect();

    Ok(NormalizedShell {
        name: name.to_owned(),
        packages,
        auto_path: section.auto_path,
        env: section.env.clone(),
        path_vars,
        aliases: section.aliases.clone(),
        hook: section.hook.clone(),
    })
}

fn is_valid_var_name(name: &str) -> bool {
    let mut bytes = name.bytes();
    match bytes.next() {
        Some(b) if b.is_ascii_alphabetic() || b == b'_' => {}
        _ => return false,
    }
    bytes.all(|b| b.is_ascii_alphanumeric() || b == b'_')
}

fn is_valid_alias_name(name: &str) -> bool {
    !name.is_empty()
        && !name.starts_with('-')
        && name
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'_' | b'-' | b'.' | b':' | b'+'))
}

fn normalize_string_list(values: &[String]) -> Vec<String> {
    let mut out: Vec<String> = values
        .iter()
        .map(|v| v.trim().to_owned())
        .filter(|v| !v.is_empty())
        .collect();
    out.sort();
    out.dedup();
    out
}
