//! Turns a resolved closure and a shell declaration into environment
//! variables and an activation script.
//!
//! The inherited environment is an explicit input. Nothing here reads or
//! mutates the process environment, so materialization is a pure function
//! of (resolution, shell, inherited environment).

use crate::resolver::{ResolvedArtifact, Resolution};
use crate::script::ActivationScript;
use devpin_schema::{DirKind, MergeStrategy, NormalizedPathVar, NormalizedShell};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::PathBuf;
use thiserror::Error;
use tracing::debug;

/// Separator for list-valued variables such as `PATH`.
pub const LIST_SEPARATOR: char = ':';

#[derive(Debug, Error)]
pub enum MaterializeError {
    #[error("variable '{variable}' references package '{package}', which is not in the resolved set")]
    DanglingReference { variable: String, package: String },
    #[error("variable '{variable}' references {kind} directory of '{package}', which has none")]
    MissingDir {
        variable: String,
        package: String,
        kind: DirKind,
    },
    #[error("variable '{variable}' has an unterminated placeholder")]
    UnterminatedPlaceholder { variable: String },
    #[error("variable '{variable}' uses unknown directory kind '{kind}' (expected lib, include, bin or pkgconfig)")]
    UnknownDirKind { variable: String, kind: String },
}

/// The environment a shell session starts from.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InheritedEnv {
    vars: BTreeMap<String, String>,
}

impl InheritedEnv {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot the current process environment. Non-UTF-8 entries are skipped.
    pub fn from_process() -> Self {
        Self {
            vars: std::env::vars_os()
                .filter_map(|(k, v)| Some((k.into_string().ok()?, v.into_string().ok()?)))
                .collect(),
        }
    }

    #[must_use]
    pub fn with(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.vars.insert(name.into(), value.into());
        self
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.vars.get(name).map(String::as_str)
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for InheritedEnv {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            vars: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

/// A variable set by the activation script.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EnvironmentVariable {
    pub name: String,
    pub value: String,
}

/// Output of materialization.
#[derive(Debug, Clone, Serialize)]
pub struct Materialized {
    /// In script order.
    pub variables: Vec<EnvironmentVariable>,
    pub script: ActivationScript,
}

impl Materialized {
    pub fn get(&self, name: &str) -> Option<&str> {
        self.variables
            .iter()
            .find(|v| v.name == name)
            .map(|v| v.value.as_str())
    }
}

/// Materialize `shell` against `resolution`.
///
/// Statement order: path variables (by name), `PATH`, plain assignments
/// (by name), aliases (by name), hook lines (as declared).
pub fn materialize(
    resolution: &Resolution,
    shell: &NormalizedShell,
    inherited: &InheritedEnv,
) -> Result<Materialized, MaterializeError> {
    let mut variables = Vec::new();
    let mut path_value: Option<String> = None;

    for (name, spec) in &shell.path_vars {
        let dirs = collect_dirs(resolution, name, spec)?;
        let value = merge_list(inherited.get(name), &dirs, spec.merge);
        if value.is_empty() {
            debug!("path variable {name} is empty, not exported");
        } else if name == "PATH" {
            path_value = Some(value);
        } else {
            variables.push(EnvironmentVariable {
                name: name.clone(),
                value,
            });
        }
    }

    if shell.auto_path && !shell.env.contains_key("PATH") {
        let bins: Vec<PathBuf> = resolution
            .requested_artifacts()
            .flat_map(|a| a.dirs(DirKind::Bin))
            .collect();
        if !bins.is_empty() {
            let base = path_value.take().or_else(|| inherited.get("PATH").map(str::to_owned));
            path_value = Some(merge_list(base.as_deref(), &bins, MergeStrategy::Prepend));
        }
    }
    if let Some(value) = path_value {
        variables.push(EnvironmentVariable {
            name: "PATH".to_owned(),
            value,
        });
    }

    for (name, template) in &shell.env {
        variables.push(EnvironmentVariable {
            name: name.clone(),
            value: interpolate(resolution, name, template)?,
        });
    }

    let mut script = ActivationScript::new();
    for var in &variables {
        script.export(&var.name, &var.value);
    }
    for (name, command) in &shell.aliases {
        script.alias(name, command);
    }
    for line in &shell.hook {
        script.raw(line);
    }

    debug!(
        "materialized shell '{}': {} variable(s), {} statement(s)",
        shell.name,
        variables.len(),
        script.len()
    );

    Ok(Materialized { variables, script })
}

fn collect_dirs(
    resolution: &Resolution,
    variable: &str,
    spec: &NormalizedPathVar,
) -> Result<Vec<PathBuf>, MaterializeError> {
    let artifacts: Vec<&ResolvedArtifact> = match &spec.packages {
        None => resolution.in_closure_order().collect(),
        Some(names) => names
            .iter()
            .map(|n| {
                resolution
                    .get(n)
                    .ok_or_else(|| MaterializeError::DanglingReference {
                        variable: variable.to_owned(),
                        package: n.clone(),
                    })
            })
            .collect::<Result<_, _>>()?,
    };

    let mut dirs: Vec<PathBuf> = Vec::new();
    for artifact in artifacts {
        for dir in artifact.dirs(spec.kind) {
            if !dirs.contains(&dir) {
                dirs.push(dir);
            }
        }
    }
    Ok(dirs)
}

/// Merge artifact directories into an inherited `:`-separated list.
///
/// The inherited value is kept byte for byte, empty entries included; only
/// directories it does not already list are added.
fn merge_list(inherited: Option<&str>, dirs: &[PathBuf], merge: MergeStrategy) -> String {
    let inherited = inherited.unwrap_or("");
    let existing: Vec<&str> = inherited
        .split(LIST_SEPARATOR)
        .filter(|e| !e.is_empty())
        .collect();
    let mut fresh: Vec<String> = Vec::with_capacity(dirs.len());
    for dir in dirs {
        let dir = dir.to_string_lossy().into_owned();
        if !existing.contains(&dir.as_str()) && !fresh.contains(&dir) {
            fresh.push(dir);
        }
    }

    if fresh.is_empty() {
        return inherited.to_owned();
    }
    let added = fresh.join(&LIST_SEPARATOR.to_string());
    if inherited.is_empty() {
        return added;
    }
    match merge {
        MergeStrategy::Append => format!("{inherited}{LIST_SEPARATOR}{added}"),
        MergeStrategy::Prepend => format!("{added}{LIST_SEPARATOR}{inherited}"),
    }
}

/// Expand `@{name}` and `@{name:kind}` placeholders. `@@` is a literal `@`;
/// a lone `@` is kept as is.
fn interpolate(
    resolution: &Resolution,
    variable: &str,
    template: &str,
) -> Result<String, MaterializeError> {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(at) = rest.find('@') {
        out.push_str(&rest[..at]);
        let after = &rest[at + 1..];
        if let Some(tail) = after.strip_prefix('@') {
            out.push('@');
            rest = tail;
        } else if let Some(body) = after.strip_prefix('{') {
            let Some(close) = body.find('}') else {
                return Err(MaterializeError::UnterminatedPlaceholder {
                    variable: variable.to_owned(),
                });
            };
            out.push_str(&expand(resolution, variable, &body[..close])?);
            rest = &body[close + 1..];
        } else {
            out.push('@');
            rest = after;
        }
    }
    out.push_str(rest);
    Ok(out)
}

fn expand(
    resolution: &Resolution,
    variable: &str,
    placeholder: &str,
) -> Result<String, MaterializeError> {
    let (package, kind) = match placeholder.split_once(':') {
        Some((package, kind)) => (package.trim(), Some(kind.trim())),
        None => (placeholder.trim(), None),
    };
    let artifact = resolution
        .get(package)
        .ok_or_else(|| MaterializeError::DanglingReference {
            variable: variable.to_owned(),
            package: package.to_owned(),
        })?;

    let Some(kind) = kind else {
        return Ok(artifact.path.to_string_lossy().into_owned());
    };
    let kind = DirKind::parse(kind).ok_or_else(|| MaterializeError::UnknownDirKind {
        variable: variable.to_owned(),
        kind: kind.to_owned(),
    })?;
    artifact
        .dirs(kind)
        .first()
        .map(|d| d.to_string_lossy().into_owned())
        .ok_or_else(|| MaterializeError::MissingDir {
            variable: variable.to_owned(),
            package: package.to_owned(),
            kind,
        })
}
