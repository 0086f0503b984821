use super::{colorize_status, json_pretty, CliError, EXIT_SUCCESS};
use devpin_core::Engine;
use std::path::Path;

pub fn run(engine: &Engine, manifest: &Path, json: bool) -> Result<u8, CliError> {
    let info = engine.inspect(manifest)?;
    let lock_status = match &info.lock {
        None => "unlocked",
        Some(lock) => {
            if lock.verify_integrity().is_ok()
                && lock.verify_manifest_intent(&info.manifest, None).is_ok()
            {
                "locked"
            } else {
                "drift"
            }
        }
    };

    if json {
        let payload = serde_json::json!({
            "manifest": info.manifest,
            "declaration_id": info.declaration.env_id,
            "short_id": info.declaration.short_id,
            "platform": info.platform,
            "lock": {
                "status": lock_status,
                "env_id": info.lock.as_ref().map(|l| l.env_id.clone()),
            },
        });
        println!("{}", json_pretty(&payload)?);
        return Ok(EXIT_SUCCESS);
    }

    let m = &info.manifest;
    println!("source:      {}", m.source);
    if m.overlays.is_empty() {
        println!("overlays:    (none)");
    } else {
        for (i, overlay) in m.overlays.iter().enumerate() {
            let label = if i == 0 { "overlays:" } else { "" };
            println!("{label:<12} {overlay}");
        }
    }
    println!("platform:    {}", info.platform);
    println!("declaration: {}", info.declaration.short_id);
    match &info.lock {
        Some(lock) => println!("lock:        {} (env {})", colorize_status(lock_status), lock.short_id),
        None => println!("lock:        {}", colorize_status(lock_status)),
    }
    for shell in m.shells.values() {
        println!();
        println!("[{}]", shell.name);
        let packages: Vec<String> = shell
            .packages
            .iter()
            .map(|p| {
                if p.features.is_empty() {
                    p.name.clone()
                } else {
                    format!("{}[{}]", p.name, p.features.join(","))
                }
            })
            .collect();
        println!("  packages:  {}", packages.join(" "));
        println!("  auto_path: {}", shell.auto_path);
        for (name, var) in &shell.path_vars {
            println!("  path_var:  {name} ({}, {:?})", var.kind, var.merge);
        }
        for (name, value) in &shell.env {
            println!("  env:       {name}={value}");
        }
        for (name, command) in &shell.aliases {
            println!("  alias:     {name} = {command}");
        }
        if !shell.hook.is_empty() {
            println!("  hook:      {} line(s)", shell.hook.len());
        }
    }
    Ok(EXIT_SUCCESS)
}
