//! CLI subprocess integration tests.
//!
//! These tests invoke the `devpin` binary as a subprocess and verify
//! exit codes, stdout content, and JSON output stability.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};

const INDEX: &str = r#"
index_version = 1

[packages.sqlite]
version = "3.45.1"
deps = ["zlib"]

[packages.zlib]
version = "1.3.1"

[packages.rust]
version = "1.75.0"
platforms = ["x86_64-linux"]

[packages.libX11]
version = "1.8.7"

[packages.libXcursor]
version = "1.2.1"
deps = ["libX11"]

[packages.libXrandr]
version = "1.5.4"
deps = ["libX11"]
"#;

fn devpin_bin() -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_devpin"));
    cmd.env_remove("DEVPIN_LOG");
    cmd
}

fn temp_store() -> tempfile::TempDir {
    let store = tempfile::tempdir().unwrap();
    let index = store
        .path()
        .join("indexes/nixos/nixpkgs/nixos-unstable.toml");
    fs::create_dir_all(index.parent().unwrap()).unwrap();
    fs::write(index, INDEX).unwrap();
    store
}

fn write_manifest(dir: &Path, packages: &str, extra: &str) -> PathBuf {
    let path = dir.join("devpin.toml");
    fs::write(
        &path,
        format!(
            r#"manifest_version = 1
source = "nixos/nixpkgs/nixos-unstable"
system = "x86_64-linux"

[shells.default]
packages = [{packages}]
{extra}
"#
        ),
    )
    .unwrap();
    path
}

fn run(store: &Path, args: &[&str]) -> Output {
    devpin_bin()
        .arg("--store")
        .arg(store)
        .args(args)
        .output()
        .unwrap()
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

fn stderr(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).into_owned()
}

#[test]
fn cli_version_exits_zero() {
    let output = devpin_bin().arg("--version").output().unwrap();
    assert!(output.status.success(), "devpin --version must exit 0");
    assert!(stdout(&output).contains("devpin"));
}

#[test]
fn cli_help_lists_commands() {
    let output = devpin_bin().arg("--help").output().unwrap();
    assert!(output.status.success());
    let out = stdout(&output);
    for cmd in ["shell", "resolve", "env", "lock", "inspect"] {
        assert!(out.contains(cmd), "help must list '{cmd}'");
    }
}

#[test]
fn cli_shell_prints_activation_script() {
    let store = temp_store();
    let project = tempfile::tempdir().unwrap();
    let manifest = write_manifest(
        project.path(),
        r#""sqlite""#,
        "[shells.default.env]\nDATABASE_URL = \"sqlite://./database.db\"\n\
         [shells.default.aliases]\ndev = \"cargo watch -x run\"\n",
    );

    let output = run(store.path(), &["shell", &manifest.to_string_lossy()]);
    assert!(output.status.success(), "stderr: {}", stderr(&output));
    let script = stdout(&output);
    assert!(script.contains("export DATABASE_URL='sqlite://./database.db'"));
    assert!(script.contains("alias dev='cargo watch -x run'"));
    assert!(script.contains("export PATH="));
}

#[test]
fn cli_shell_output_is_deterministic() {
    let store = temp_store();
    let project = tempfile::tempdir().unwrap();
    let manifest = write_manifest(project.path(), r#""sqlite", "libXcursor""#, "");
    let args = ["shell", &*manifest.to_string_lossy()];

    let first = run(store.path(), &args);
    let second = run(store.path(), &args);
    assert!(first.status.success(), "stderr: {}", stderr(&first));
    assert_eq!(first.stdout, second.stdout);
}

#[test]
fn cli_env_lists_shared_library_once() {
    let store = temp_store();
    let project = tempfile::tempdir().unwrap();
    let manifest = write_manifest(
        project.path(),
        r#""libXcursor", "libXrandr""#,
        "[shells.default.path_vars.LD_LIBRARY_PATH]\nkind = \"lib\"\n",
    );

    let output = devpin_bin()
        .arg("--store")
        .arg(store.path())
        .args(["--json", "env", &manifest.to_string_lossy()])
        .env("LD_LIBRARY_PATH", "/usr/lib")
        .output()
        .unwrap();
    assert!(output.status.success(), "stderr: {}", stderr(&output));

    let vars: serde_json::Value = serde_json::from_str(&stdout(&output)).unwrap();
    let value = vars["LD_LIBRARY_PATH"].as_str().unwrap();
    assert!(value.starts_with("/usr/lib:"));
    assert_eq!(
        value
            .split(':')
            .filter(|e| e.contains("-libX11-1.8.7/"))
            .count(),
        1
    );
}

#[test]
fn cli_resolve_json_lists_artifacts() {
    let store = temp_store();
    let project = tempfile::tempdir().unwrap();
    let manifest = write_manifest(project.path(), r#""sqlite""#, "");

    let output = run(
        store.path(),
        &["--json", "resolve", &manifest.to_string_lossy()],
    );
    assert!(output.status.success(), "stderr: {}", stderr(&output));
    let json: serde_json::Value = serde_json::from_str(&stdout(&output)).unwrap();
    let artifacts = json["artifacts"].as_array().unwrap();
    assert_eq!(artifacts.len(), 2);
    assert_eq!(json["requested"][0], "sqlite");
    assert_eq!(json["platform"], "x86_64-linux");
}

#[test]
fn cli_missing_package_exits_3() {
    let store = temp_store();
    let project = tempfile::tempdir().unwrap();
    let manifest = write_manifest(project.path(), r#""nonexistent""#, "");

    let output = run(store.path(), &["shell", &manifest.to_string_lossy()]);
    assert_eq!(output.status.code(), Some(3));
    assert!(stdout(&output).is_empty(), "no script on failure");
    assert!(stderr(&output).contains("nonexistent"));
}

#[test]
fn cli_malformed_manifest_exits_2() {
    let store = temp_store();
    let project = tempfile::tempdir().unwrap();
    let manifest = project.path().join("devpin.toml");
    fs::write(&manifest, "manifest_version = 1\n[shells.default]\n").unwrap();

    let output = run(store.path(), &["shell", &manifest.to_string_lossy()]);
    assert_eq!(output.status.code(), Some(2));
    assert!(stderr(&output).starts_with("error:"));
}

#[test]
fn cli_unsupported_platform_exits_4() {
    let store = temp_store();
    let project = tempfile::tempdir().unwrap();
    let manifest = write_manifest(project.path(), r#""rust""#, "");

    let output = run(
        store.path(),
        &[
            "shell",
            &manifest.to_string_lossy(),
            "--system",
            "aarch64-darwin",
        ],
    );
    assert_eq!(output.status.code(), Some(4));
}

#[test]
fn cli_missing_index_exits_5() {
    let store = tempfile::tempdir().unwrap();
    let project = tempfile::tempdir().unwrap();
    let manifest = write_manifest(project.path(), r#""sqlite""#, "");

    let output = run(store.path(), &["shell", &manifest.to_string_lossy()]);
    assert_eq!(output.status.code(), Some(5));
}

#[test]
fn cli_lock_then_check() {
    let store = temp_store();
    let project = tempfile::tempdir().unwrap();
    let manifest = write_manifest(project.path(), r#""sqlite""#, "");
    let manifest_arg = manifest.to_string_lossy().into_owned();

    let output = run(store.path(), &["--json", "lock", &manifest_arg]);
    assert!(output.status.success(), "stderr: {}", stderr(&output));
    let json: serde_json::Value = serde_json::from_str(&stdout(&output)).unwrap();
    assert_eq!(json["status"], "written");
    assert_eq!(json["shells"]["default"], 2);
    assert!(project.path().join("devpin.lock").exists());

    let output = run(store.path(), &["--json", "lock", &manifest_arg, "--check"]);
    assert!(output.status.success(), "stderr: {}", stderr(&output));

    let output = run(store.path(), &["shell", &manifest_arg, "--locked"]);
    assert!(output.status.success(), "stderr: {}", stderr(&output));
}

#[test]
fn cli_lock_check_detects_drift() {
    let store = temp_store();
    let project = tempfile::tempdir().unwrap();
    let manifest = write_manifest(project.path(), r#""sqlite""#, "");
    let manifest_arg = manifest.to_string_lossy().into_owned();

    let output = run(store.path(), &["lock", &manifest_arg]);
    assert!(output.status.success(), "stderr: {}", stderr(&output));

    write_manifest(project.path(), r#""sqlite", "libX11""#, "");
    let output = run(store.path(), &["lock", &manifest_arg, "--check"]);
    assert_eq!(output.status.code(), Some(1));
    assert!(stderr(&output).contains("drift"));

    let output = run(store.path(), &["shell", &manifest_arg, "--locked"]);
    assert!(!output.status.success());
}

#[test]
fn cli_locked_without_lock_file_fails() {
    let store = temp_store();
    let project = tempfile::tempdir().unwrap();
    let manifest = write_manifest(project.path(), r#""sqlite""#, "");

    let output = run(
        store.path(),
        &["shell", &manifest.to_string_lossy(), "--locked"],
    );
    assert_eq!(output.status.code(), Some(1));
    assert!(stderr(&output).contains("devpin lock"));
}

#[test]
fn cli_inspect_json() {
    let store = temp_store();
    let project = tempfile::tempdir().unwrap();
    let manifest = write_manifest(project.path(), r#""sqlite", "sqlite""#, "");

    let output = run(
        store.path(),
        &["--json", "inspect", &manifest.to_string_lossy()],
    );
    assert!(output.status.success(), "stderr: {}", stderr(&output));
    let json: serde_json::Value = serde_json::from_str(&stdout(&output)).unwrap();
    assert_eq!(json["lock"]["status"], "unlocked");
    assert_eq!(
        json["manifest"]["shells"]["default"]["packages"]
            .as_array()
            .unwrap()
            .len(),
        1
    );
    assert_eq!(json["declaration_id"].as_str().unwrap().len(), 64);
}

#[test]
fn cli_init_writes_manifest() {
    let project = tempfile::tempdir().unwrap();
    let output = devpin_bin()
        .current_dir(project.path())
        .args(["init", "--template", "rust"])
        .output()
        .unwrap();
    assert!(output.status.success(), "stderr: {}", stderr(&output));
    assert!(project.path().join("devpin.toml").exists());

    let again = devpin_bin()
        .current_dir(project.path())
        .args(["init"])
        .output()
        .unwrap();
    assert!(!again.status.success());
    assert!(stderr(&again).contains("--force"));
}

#[test]
fn cli_completions_bash() {
    let output = devpin_bin().args(["completions", "bash"]).output().unwrap();
    assert!(output.status.success());
    assert!(stdout(&output).contains("devpin"));
}

#[test]
fn cli_man_pages_written() {
    let dir = tempfile::tempdir().unwrap();
    let output = devpin_bin()
        .args(["man-pages", &dir.path().to_string_lossy()])
        .output()
        .unwrap();
    assert!(output.status.success());
    assert!(dir.path().join("devpin.1").exists());
    assert!(dir.path().join("devpin-shell.1").exists());
}
