use super::{json_pretty, CliError, EXIT_SUCCESS};
use devpin_core::{Engine, EvalOptions, InheritedEnv};
use std::collections::BTreeMap;
use std::path::Path;

pub fn run(
    engine: &Engine,
    manifest: &Path,
    options: &EvalOptions,
    json: bool,
) -> Result<u8, CliError> {
    let eval = engine.evaluate(manifest, options, &InheritedEnv::from_process())?;
    if json {
        let vars: BTreeMap<&str, &str> = eval
            .variables
            .iter()
            .map(|v| (v.name.as_str(), v.value.as_str()))
            .collect();
        println!("{}", json_pretty(&vars)?);
    } else {
        for var in &eval.variables {
            println!("{}={}", var.name, var.value);
        }
    }
    Ok(EXIT_SUCCESS)
}
