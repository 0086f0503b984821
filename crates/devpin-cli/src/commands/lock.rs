use super::{colorize_status, json_pretty, spin_fail, spin_ok, spinner, CliError, EXIT_SUCCESS};
use devpin_core::{lock_path_for, Engine};
use devpin_schema::Platform;
use std::path::Path;

pub fn run(
    engine: &Engine,
    manifest: &Path,
    system: Option<&Platform>,
    check: bool,
    json: bool,
) -> Result<u8, CliError> {
    let pb = if json {
        None
    } else if check {
        Some(spinner("checking lock file..."))
    } else {
        Some(spinner("resolving shells..."))
    };

    let result = if check {
        engine.check_lock(manifest, system)
    } else {
        engine.lock(manifest, system)
    };
    let lock = match result {
        Ok(lock) => {
            if let Some(ref pb) = pb {
                spin_ok(pb, if check { "lock file is current" } else { "shells resolved" });
            }
            lock
        }
        Err(e) => {
            if let Some(ref pb) = pb {
                spin_fail(pb, if check { "lock check failed" } else { "resolution failed" });
            }
            return Err(e.into());
        }
    };

    let lock_path = lock_path_for(manifest);
    let status = if check { "ok" } else { "written" };
    if json {
        let shells: serde_json::Map<String, serde_json::Value> = lock
            .shells
            .iter()
            .map(|(name, artifacts)| (name.clone(), artifacts.len().into()))
            .collect();
        let payload = serde_json::json!({
            "status": status,
            "path": lock_path,
            "env_id": lock.env_id,
            "short_id": lock.short_id,
            "system": lock.system,
            "shells": shells,
        });
        println!("{}", json_pretty(&payload)?);
    } else {
        println!(
            "{}: {} (env {})",
            lock_path.display(),
            colorize_status(status),
            lock.short_id
        );
        for (name, artifacts) in &lock.shells {
            println!("  {name}: {} artifact(s)", artifacts.len());
        }
    }
    Ok(EXIT_SUCCESS)
}
