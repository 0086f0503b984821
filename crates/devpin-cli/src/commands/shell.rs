use super::{json_pretty, CliError, EXIT_SUCCESS};
use devpin_core::{Engine, EvalOptions, InheritedEnv};
use std::path::Path;

pub fn run(
    engine: &Engine,
    manifest: &Path,
    options: &EvalOptions,
    json: bool,
) -> Result<u8, CliError> {
    let eval = engine.evaluate(manifest, options, &InheritedEnv::from_process())?;
    if json {
        let payload = serde_json::json!({
            "shell": eval.shell,
            "env_id": eval.identity.env_id,
            "short_id": eval.identity.short_id,
            "statements": eval.script.statements,
            "script": eval.script.render(),
        });
        println!("{}", json_pretty(&payload)?);
    } else {
        print!("{}", eval.script.render());
    }
    Ok(EXIT_SUCCESS)
}
