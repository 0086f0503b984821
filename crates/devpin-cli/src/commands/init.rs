use super::{json_pretty, CliError, EXIT_SUCCESS};
use devpin_core::CoreError;
use devpin_schema::{parse_manifest_str, SourcePin};
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

const DEST_MANIFEST: &str = "devpin.toml";

fn template_source(name: &str) -> Option<&'static str> {
    match name {
        "minimal" => Some(include_str!("../../templates/minimal.toml")),
        "rust" => Some(include_str!("../../templates/rust.toml")),
        "gui" => Some(include_str!("../../templates/gui.toml")),
        _ => None,
    }
}

/// Template text with the `source` line replaced when a pin is given.
fn render_template(name: &str, source: Option<&str>) -> Result<String, CliError> {
    let src = template_source(name)
        .ok_or_else(|| format!("unknown template '{name}' (expected: minimal, rust, gui)"))?;
    let Some(pin) = source else {
        return Ok(src.to_owned());
    };
    let pin = SourcePin::parse(pin).map_err(CoreError::from)?;
    let rendered: Vec<String> = src
        .lines()
        .map(|line| {
            if line.starts_with("source = ") {
                format!("source = \"{pin}\"")
            } else {
                line.to_owned()
            }
        })
        .collect();
    Ok(rendered.join("\n") + "\n")
}

fn write_atomic(dest: &Path, content: &str) -> Result<(), CliError> {
    let dir = dest
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .map_or_else(|| PathBuf::from("."), Path::to_path_buf);
    let mut tmp = NamedTempFile::new_in(&dir).map_err(|e| format!("write temp file: {e}"))?;
    tmp.write_all(content.as_bytes())
        .map_err(|e| format!("write temp file: {e}"))?;
    tmp.as_file()
        .sync_all()
        .map_err(|e| format!("fsync temp file: {e}"))?;
    tmp.persist(dest)
        .map_err(|e| format!("persist manifest: {}", e.error))?;
    Ok(())
}

pub fn run(template: &str, source: Option<&str>, force: bool, json: bool) -> Result<u8, CliError> {
    let dest = Path::new(DEST_MANIFEST);
    if dest.exists() && !force {
        return Err(format!("refusing to overwrite existing ./{DEST_MANIFEST} (pass --force)").into());
    }

    let content = render_template(template, source)?;
    parse_manifest_str(&content)
        .and_then(|m| m.normalize())
        .map_err(CoreError::from)?;
    write_atomic(dest, &content)?;

    if json {
        let payload = serde_json::json!({
            "status": "written",
            "path": format!("./{DEST_MANIFEST}"),
            "template": template,
        });
        println!("{}", json_pretty(&payload)?);
    } else {
        println!("wrote ./{DEST_MANIFEST} from template '{template}'");
    }
    Ok(EXIT_SUCCESS)
}
