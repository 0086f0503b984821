//! Dependency closure resolution against a pinned, overlaid package index.

use devpin_index::{apply_overlays, Overlay, PackageDef, PackageIndex};
use devpin_schema::{ArtifactHash, DirKind, LockedArtifact, PackageRef, Platform, SourcePin};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("package '{name}' has no definition{}", required_by_suffix(.required_by))]
    UnresolvedDependency {
        name: String,
        required_by: Vec<String>,
    },
    #[error("package '{name}' {version} has no recipe for {platform} (supported: {supported})")]
    PlatformUnsupported {
        name: String,
        version: String,
        platform: Platform,
        supported: String,
    },
    #[error("dependency cycle: {}", .chain.join(" -> "))]
    DependencyCycle { chain: Vec<String> },
    #[error("package '{name}' has no feature '{feature}' (available: {available})")]
    UnknownFeature {
        name: String,
        feature: String,
        available: String,
    },
    #[error("failed to hash definition of '{name}': {source}")]
    Hash {
        name: String,
        #[source]
        source: serde_json::Error,
    },
}

fn required_by_suffix(chain: &[String]) -> String {
    if chain.is_empty() {
        String::new()
    } else {
        format!(" (required by {})", chain.join(" -> "))
    }
}

/// One resolved package: an immutable artifact under the store.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ResolvedArtifact {
    /// The canonical package, with the features it was resolved with.
    pub package: PackageRef,
    pub version: String,
    pub hash: ArtifactHash,
    pub path: PathBuf,
    pub lib_dirs: Vec<String>,
    pub include_dirs: Vec<String>,
    pub bin_dirs: Vec<String>,
    /// Canonical names of direct dependencies, sorted.
    pub deps: Vec<String>,
    /// Requested names that collapsed onto this artifact.
    pub aliases: Vec<String>,
}

impl ResolvedArtifact {
    pub fn name(&self) -> &str {
        &self.package.name
    }

    /// Absolute directories of the given kind.
    pub fn dirs(&self, kind: DirKind) -> Vec<PathBuf> {
        let subpaths: Vec<String> = match kind {
            DirKind::Lib => self.lib_dirs.clone(),
            DirKind::Include => self.include_dirs.clone(),
            DirKind::Bin => self.bin_dirs.clone(),
            DirKind::Pkgconfig => self
                .lib_dirs
                .iter()
                .map(|d| format!("{d}/pkgconfig"))
                .collect(),
        };
        subpaths.iter().map(|s| self.path.join(s)).collect()
    }

    pub fn to_locked(&self) -> LockedArtifact {
        LockedArtifact {
            name: self.package.name.clone(),
            version: self.version.clone(),
            hash: self.hash.clone(),
            path: self.path.to_string_lossy().into_owned(),
            features: self.package.features.clone(),
        }
    }
}

/// The deduplicated closure of a set of package requests.
#[derive(Debug, Clone, Serialize)]
pub struct Resolution {
    pub platform: Platform,
    /// Canonical name to artifact. One entry per distinct package.
    pub artifacts: BTreeMap<String, ResolvedArtifact>,
    /// Canonical names of the requested packages, in declaration order.
    pub requested: Vec<String>,
    /// Canonical names in depth-first discovery order.
    pub closure: Vec<String>,
    /// Alias name to canonical name, for every alias followed.
    pub aliases: BTreeMap<String, String>,
}

impl Resolution {
    /// Look up an artifact by canonical or alias name.
    pub fn get(&self, name: &str) -> Option<&ResolvedArtifact> {
        let canonical = self.aliases.get(name).map_or(name, String::as_str);
        self.artifacts.get(canonical)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn len(&self) -> usize {
        self.artifacts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.artifacts.is_empty()
    }

    /// Artifacts in discovery order.
    pub fn in_closure_order(&self) -> impl Iterator<Item = &ResolvedArtifact> {
        self.closure.iter().filter_map(|n| self.artifacts.get(n))
    }

    /// Artifacts of the requested packages, in declaration order.
    pub fn requested_artifacts(&self) -> impl Iterator<Item = &ResolvedArtifact> {
        self.requested.iter().filter_map(|n| self.artifacts.get(n))
    }

    pub fn to_locked(&self) -> Vec<LockedArtifact> {
        self.artifacts
            .values()
            .map(ResolvedArtifact::to_locked)
            .collect()
    }
}

/// Resolves package requests against one overlaid index for one platform.
pub struct Resolver<'a> {
    index: PackageIndex,
    source: &'a SourcePin,
    platform: &'a Platform,
    artifacts_dir: &'a Path,
}

impl<'a> Resolver<'a> {
    /// Apply `overlays` left to right on `base` and prepare to resolve.
    pub fn new(
        base: &PackageIndex,
        overlays: &[Overlay],
        source: &'a SourcePin,
        platform: &'a Platform,
        artifacts_dir: &'a Path,
    ) -> Self {
        Self {
            index: apply_overlays(base, overlays),
            source,
            platform,
            artifacts_dir,
        }
    }

    /// Resolve the closure of `requests`.
    ///
    /// Requests naming the same package (directly or through aliases)
    /// collapse onto one artifact whose feature set is the union.
    pub fn resolve(&self, requests: &[PackageRef]) -> Result<Resolution, ResolveError> {
        let mut walk = Walk {
            resolver: self,
            features: BTreeMap::new(),
            artifacts: BTreeMap::new(),
            aliases: BTreeMap::new(),
            closure: Vec::new(),
            stack: Vec::new(),
        };

        let mut requested = Vec::with_capacity(requests.len());
        for request in requests {
            let (canonical, def) = walk.follow_aliases(&request.name)?;
            for feature in &request.features {
                if !def.features.contains_key(feature) {
                    return Err(ResolveError::UnknownFeature {
                        name: request.name.clone(),
                        feature: feature.clone(),
                        available: def.features.keys().cloned().collect::<Vec<_>>().join(", "),
                    });
                }
            }
            walk.features
                .entry(canonical.clone())
                .or_default()
                .extend(request.features.iter().cloned());
            if !requested.contains(&canonical) {
                requested.push(canonical);
            }
        }

        for name in &requested {
            walk.visit(name)?;
        }
        for (alias, canonical) in &walk.aliases {
            if let Some(artifact) = walk.artifacts.get_mut(canonical) {
                artifact.aliases.push(alias.clone());
            }
        }

        debug!(
            "resolved {} requested package(s) to {} artifact(s) for {}",
            requested.len(),
            walk.artifacts.len(),
            self.platform
        );

        Ok(Resolution {
            platform: self.platform.clone(),
            artifacts: walk.artifacts,
            requested,
            closure: walk.closure,
            aliases: walk.aliases,
        })
    }
}

struct Walk<'r, 'a> {
    resolver: &'r Resolver<'a>,
    features: BTreeMap<String, BTreeSet<String>>,
    artifacts: BTreeMap<String, ResolvedArtifact>,
    aliases: BTreeMap<String, String>,
    closure: Vec<String>,
    stack: Vec<String>,
}

impl<'r> Walk<'r, '_> {
    fn follow_aliases(&mut self, name: &str) -> Result<(String, &'r PackageDef), ResolveError> {
        let resolver: &'r Resolver<'_> = self.resolver;
        let index = &resolver.index;
        let mut seen = vec![name.to_owned()];
        let mut current = name.to_owned();
        loop {
            let Some(def) = index.get(&current) else {
                return Err(ResolveError::UnresolvedDependency {
                    name: current,
                    required_by: if seen.len() > 1 {
                        seen[..seen.len() - 1].to_vec()
                    } else {
                        self.stack.clone()
                    },
                });
            };
            let Some(target) = &def.alias else {
                if current != name {
                    self.aliases.insert(name.to_owned(), current.clone());
                }
                return Ok((current, def));
            };
            if seen.contains(target) {
                seen.push(target.clone());
                return Err(ResolveError::DependencyCycle { chain: seen });
            }
            seen.push(target.clone());
            current.clone_from(target);
        }
    }

    fn visit(&mut self, name: &str) -> Result<(String, ArtifactHash), ResolveError> {
        let (canonical, def) = self.follow_aliases(name)?;

        if let Some(done) = self.artifacts.get(&canonical) {
            return Ok((canonical, done.hash.clone()));
        }

        if let Some(pos) = self.stack.iter().position(|n| *n == canonical) {
            let mut chain = self.stack[pos..].to_vec();
            chain.push(canonical);
            return Err(ResolveError::DependencyCycle { chain });
        }

        let platform = self.resolver.platform;
        let version = def.version.clone().unwrap_or_default();
        if !def.supports(platform) {
            return Err(ResolveError::PlatformUnsupported {
                name: canonical,
                version,
                platform: platform.clone(),
                supported: def
                    .platforms
                    .iter()
                    .map(ToString::to_string)
                    .collect::<Vec<_>>()
                    .join(", "),
            });
        }

        let features = self.features.get(&canonical).cloned().unwrap_or_default();
        let mut dep_names: Vec<&str> = def.deps.iter().map(String::as_str).collect();
        for feature in &features {
            if let Some(extra) = def.features.get(feature) {
                dep_names.extend(extra.iter().map(String::as_str));
            }
        }

        self.closure.push(canonical.clone());
        self.stack.push(canonical.clone());
        let mut deps: BTreeMap<String, ArtifactHash> = BTreeMap::new();
        for dep in dep_names {
            let (dep_canonical, dep_hash) = self.visit(dep)?;
            deps.insert(dep_canonical, dep_hash);
        }
        self.stack.pop();

        let hash = artifact_hash(&canonical, def, &features, platform, &deps)?;
        let path = self
            .resolver
            .artifacts_dir
            .join(format!("{hash}-{canonical}-{version}"));
        debug!("{canonical} {version} -> {}", path.display());

        let artifact = ResolvedArtifact {
            package: PackageRef {
                name: canonical.clone(),
                source: self.resolver.source.clone(),
                features: features.into_iter().collect(),
            },
            version,
            hash: hash.clone(),
            path,
            lib_dirs: def.lib_dirs.clone(),
            include_dirs: def.include_dirs.clone(),
            bin_dirs: def.bin_dirs.clone(),
            deps: deps.into_keys().collect(),
            aliases: Vec::new(),
        };
        self.artifacts.insert(canonical.clone(), artifact);
        Ok((canonical, hash))
    }
}

/// Content hash of one artifact: its definition, enabled features, target
/// platform, and the hashes of its dependencies. Two identical definitions
/// share a hash regardless of which snapshot they came from.
fn artifact_hash(
    name: &str,
    def: &PackageDef,
    features: &BTreeSet<String>,
    platform: &Platform,
    deps: &BTreeMap<String, ArtifactHash>,
) -> Result<ArtifactHash, ResolveError> {
    let def_json = def.canonical_json().map_err(|source| ResolveError::Hash {
        name: name.to_owned(),
        source,
    })?;

    let mut hasher = blake3::Hasher::new();
    hasher.update(format!("name:{name}").as_bytes());
    hasher.update(format!("version:{}", def.version.as_deref().unwrap_or("")).as_bytes());
    hasher.update(format!("def:{def_json}").as_bytes());
    for feature in features {
        hasher.update(format!("feature:{feature}").as_bytes());
    }
    hasher.update(format!("platform:{platform}").as_bytes());
    for (dep, hash) in deps {
        hasher.update(format!("dep:{dep}={hash}").as_bytes());
    }

    let hex = hasher.finalize().to_hex();
    Ok(ArtifactHash::new(&hex.as_str()[..32]))
}
