use super::{dim, json_pretty, CliError, EXIT_SUCCESS};
use devpin_core::{Engine, EvalOptions, InheritedEnv};
use std::path::Path;

pub fn run(
    engine: &Engine,
    manifest: &Path,
    options: &EvalOptions,
    json: bool,
) -> Result<u8, CliError> {
    let eval = engine.evaluate(manifest, options, &InheritedEnv::new())?;
    let resolution = &eval.resolution;
    if json {
        let payload = serde_json::json!({
            "shell": eval.shell,
            "platform": resolution.platform,
            "env_id": eval.identity.env_id,
            "requested": resolution.requested,
            "aliases": resolution.aliases,
            "artifacts": resolution.artifacts.values().collect::<Vec<_>>(),
        });
        println!("{}", json_pretty(&payload)?);
        return Ok(EXIT_SUCCESS);
    }

    let width = resolution
        .artifacts
        .keys()
        .map(String::len)
        .max()
        .unwrap_or(0);
    println!(
        "shell '{}' for {}: {} artifact(s)",
        eval.shell,
        resolution.platform,
        resolution.len()
    );
    for artifact in resolution.artifacts.values() {
        let marker = if resolution.requested.iter().any(|r| r == artifact.name()) {
            '*'
        } else {
            ' '
        };
        println!(
            "{marker} {:<width$}  {:<12}  {}",
            artifact.name(),
            artifact.version,
            dim(&artifact.path.to_string_lossy()),
        );
    }
    for (alias, target) in &resolution.aliases {
        println!("  {alias} -> {target}");
    }
    Ok(EXIT_SUCCESS)
}
