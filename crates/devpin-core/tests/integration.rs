use devpin_core::{CoreError, Engine, ErrorKind, EvalOptions, InheritedEnv};
use devpin_schema::{LockError, Platform, SourcePin};
use devpin_store::{ObjectStore, StoreError, StoreLayout};
use std::fs;
use std::path::{Path, PathBuf};

const SOURCE: &str = "nixos/nixpkgs/nixos-unstable";
const RUST_OVERLAY: &str = "oxalica/rust-overlay/master";

const INDEX: &str = r#"
index_version = 1

[packages.sqlite]
version = "3.45.1"
deps = ["zlib"]

[packages.zlib]
version = "1.3.1"

[packages.rust]
version = "1.75.0"
platforms = ["x86_64-linux", "aarch64-linux", "aarch64-darwin"]

[packages.stableToolchain]
alias = "rust"

[packages.libX11]
version = "1.8.7"

[packages.libXcursor]
version = "1.2.1"
deps = ["libX11"]

[packages.libXrandr]
version = "1.5.4"
deps = ["libX11"]
"#;

const OVERLAY: &str = r#"
overlay_version = 1

[packages.rust]
version = "1.79.0"
platforms = ["x86_64-linux", "aarch64-linux", "aarch64-darwin"]
"#;

fn pin(s: &str) -> SourcePin {
    SourcePin::parse(s).unwrap()
}

fn seed_store(store: &Path) {
    let layout = StoreLayout::new(store);
    let index = layout.index_file(&pin(SOURCE));
    fs::create_dir_all(index.parent().unwrap()).unwrap();
    fs::write(index, INDEX).unwrap();
    let overlay = layout.overlay_file(&pin(RUST_OVERLAY));
    fs::create_dir_all(overlay.parent().unwrap()).unwrap();
    fs::write(overlay, OVERLAY).unwrap();
}

fn write_manifest(dir: &Path, overlays: &[&str], packages: &[&str], extra: &str) -> PathBuf {
    let quote = |items: &[&str]| {
        items
            .iter()
            .map(|p| format!("\"{p}\""))
            .collect::<Vec<_>>()
            .join(", ")
    };
    let content = format!(
        r#"
manifest_version = 1
source = "{SOURCE}"
overlays = [{}]
system = "x86_64-linux"

[shells.default]
packages = [{}]
{extra}
"#,
        quote(overlays),
        quote(packages),
    );
    let path = dir.join("devpin.toml");
    fs::write(&path, content).unwrap();
    path
}

fn setup() -> (tempfile::TempDir, tempfile::TempDir, Engine) {
    let store = tempfile::tempdir().unwrap();
    let project = tempfile::tempdir().unwrap();
    seed_store(store.path());
    let engine = Engine::new(store.path());
    (store, project, engine)
}

fn evaluate(engine: &Engine, manifest: &Path) -> Result<devpin_core::Evaluation, CoreError> {
    engine.evaluate(manifest, &EvalOptions::default(), &InheritedEnv::new())
}

#[test]
fn sqlite_with_plain_assignment() {
    let (_store, project, engine) = setup();
    let manifest = write_manifest(
        project.path(),
        &[],
        &["sqlite"],
        "[shells.default.env]\nDATABASE_URL = \"sqlite://./database.db\"\n",
    );

    let eval = evaluate(&engine, &manifest).unwrap();
    let sqlite: Vec<_> = eval
        .resolution
        .artifacts
        .values()
        .filter(|a| a.name() == "sqlite")
        .collect();
    assert_eq!(sqlite.len(), 1);
    assert!(eval
        .script
        .render()
        .contains("export DATABASE_URL='sqlite://./database.db'\n"));
}

#[test]
fn overlay_changes_toolchain_path() {
    let (_store, project, engine) = setup();
    let plain = write_manifest(project.path(), &[], &["stableToolchain"], "");
    let without = evaluate(&engine, &plain).unwrap();

    let overlaid = write_manifest(project.path(), &[RUST_OVERLAY], &["stableToolchain"], "");
    let with = evaluate(&engine, &overlaid).unwrap();

    let a = without.resolution.get("stableToolchain").unwrap();
    let b = with.resolution.get("stableToolchain").unwrap();
    assert_ne!(a.path, b.path);
    assert_eq!(b.version, "1.79.0");
    assert_ne!(without.identity.env_id, with.identity.env_id);
}

#[test]
fn shared_libx11_listed_once() {
    let (_store, project, engine) = setup();
    let manifest = write_manifest(
        project.path(),
        &[],
        &["libXcursor", "libXrandr"],
        "[shells.default.path_vars.LD_LIBRARY_PATH]\nkind = \"lib\"\n",
    );

    let eval = evaluate(&engine, &manifest).unwrap();
    let x11 = eval.resolution.get("libX11").unwrap();
    assert_eq!(
        eval.resolution
            .artifacts
            .values()
            .filter(|a| a.name() == "libX11")
            .count(),
        1
    );

    let lib = x11.path.join("lib").to_string_lossy().into_owned();
    let value = &eval
        .variables
        .iter()
        .find(|v| v.name == "LD_LIBRARY_PATH")
        .unwrap()
        .value;
    assert_eq!(value.split(':').filter(|e| *e == lib).count(), 1);
}

#[test]
fn evaluation_is_deterministic_across_engines() {
    let (store, project, engine) = setup();
    let manifest = write_manifest(
        project.path(),
        &[RUST_OVERLAY],
        &["sqlite", "rust", "libXcursor"],
        "",
    );
    let first = evaluate(&engine, &manifest).unwrap();
    let second = evaluate(&Engine::new(store.path()), &manifest).unwrap();

    assert_eq!(first.identity, second.identity);
    assert_eq!(first.resolution.artifacts, second.resolution.artifacts);
    assert_eq!(first.script.render(), second.script.render());
}

#[test]
fn artifact_paths_live_under_store() {
    let (store, project, engine) = setup();
    let manifest = write_manifest(project.path(), &[], &["zlib"], "");
    let eval = evaluate(&engine, &manifest).unwrap();
    let zlib = eval.resolution.get("zlib").unwrap();
    assert!(zlib.path.is_absolute());
    assert!(zlib
        .path
        .starts_with(StoreLayout::new(store.path()).artifacts_dir()));
}

#[test]
fn missing_package_produces_no_script() {
    let (_store, project, engine) = setup();
    let manifest = write_manifest(project.path(), &[], &["sqlite", "nonexistent"], "");
    let err = evaluate(&engine, &manifest).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::UnresolvedDependency);
    assert!(err.to_string().contains("nonexistent"));
}

#[test]
fn platform_override_rejects_unsupported_package() {
    let (_store, project, engine) = setup();
    let manifest = write_manifest(project.path(), &[], &["rust"], "");
    let options = EvalOptions {
        system: Some(Platform::parse("x86_64-darwin").unwrap()),
        ..EvalOptions::default()
    };
    let err = engine
        .evaluate(&manifest, &options, &InheritedEnv::new())
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::PlatformUnsupported);
}

#[test]
fn missing_source_pin_is_malformed() {
    let (_store, project, engine) = setup();
    let manifest = project.path().join("devpin.toml");
    fs::write(
        &manifest,
        "manifest_version = 1\n[shells.default]\npackages = [\"sqlite\"]\n",
    )
    .unwrap();
    let err = evaluate(&engine, &manifest).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::MalformedSpec);
}

#[test]
fn unknown_index_is_store_error() {
    let (_store, project, engine) = setup();
    let manifest = project.path().join("devpin.toml");
    fs::write(
        &manifest,
        "manifest_version = 1\nsource = \"nobody/nothing/v0\"\n[shells.default]\npackages = []\n",
    )
    .unwrap();
    let err = evaluate(&engine, &manifest).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Store);
}

#[test]
fn dangling_placeholder_is_rejected() {
    let (_store, project, engine) = setup();
    let manifest = write_manifest(
        project.path(),
        &[],
        &["sqlite"],
        "[shells.default.env]\nPYTHONHOME = \"@{python}\"\n",
    );
    let err = evaluate(&engine, &manifest).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::UnresolvedDependency);
}

#[test]
fn inherited_path_is_preserved() {
    let (_store, project, engine) = setup();
    let manifest = write_manifest(project.path(), &[], &["sqlite"], "");
    let env = InheritedEnv::new().with("PATH", "/usr/bin:/bin");
    let eval = engine
        .evaluate(&manifest, &EvalOptions::default(), &env)
        .unwrap();
    let path = &eval.variables.iter().find(|v| v.name == "PATH").unwrap().value;
    assert!(path.ends_with(":/usr/bin:/bin"));
    assert_eq!(env.get("PATH"), Some("/usr/bin:/bin"));
}

#[test]
fn snapshots_are_copied_into_object_store() {
    let (store, project, engine) = setup();
    let manifest = write_manifest(project.path(), &[RUST_OVERLAY], &["rust"], "");
    let eval = evaluate(&engine, &manifest).unwrap();

    let objects = ObjectStore::new(StoreLayout::new(store.path()));
    assert!(objects.exists(&eval.lock.source.digest));
    assert!(objects.exists(&eval.lock.overlays[0].digest));
}

#[test]
fn mutated_pin_is_rejected() {
    let (store, project, engine) = setup();
    let manifest = write_manifest(project.path(), &[], &["zlib"], "");
    evaluate(&engine, &manifest).unwrap();

    let index = StoreLayout::new(store.path()).index_file(&pin(SOURCE));
    fs::write(index, INDEX.replace("1.3.1", "1.3.2")).unwrap();

    let err = evaluate(&engine, &manifest).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Store);
    assert!(matches!(
        err,
        CoreError::Index(devpin_index::IndexError::Store(StoreError::PinMutated { .. }))
    ));
}

#[test]
fn lock_then_locked_evaluation() {
    let (_store, project, engine) = setup();
    let manifest = write_manifest(project.path(), &[RUST_OVERLAY], &["sqlite", "rust"], "");

    let lock = engine.lock(&manifest, None).unwrap();
    assert!(project.path().join("devpin.lock").exists());
    assert_eq!(lock.shells["default"].len(), 3);

    let options = EvalOptions {
        locked: true,
        ..EvalOptions::default()
    };
    let eval = engine
        .evaluate(&manifest, &options, &InheritedEnv::new())
        .unwrap();
    assert_eq!(eval.identity.env_id.as_str(), lock.env_id);

    engine.check_lock(&manifest, None).unwrap();
}

#[test]
fn locked_evaluation_detects_package_drift() {
    let (_store, project, engine) = setup();
    let manifest = write_manifest(project.path(), &[], &["sqlite"], "");
    engine.lock(&manifest, None).unwrap();

    write_manifest(project.path(), &[], &["sqlite", "libX11"], "");
    let options = EvalOptions {
        locked: true,
        ..EvalOptions::default()
    };
    let err = engine
        .evaluate(&manifest, &options, &InheritedEnv::new())
        .unwrap_err();
    assert!(matches!(err, CoreError::Lock(LockError::ManifestDrift(_))));

    let err = engine.check_lock(&manifest, None).unwrap_err();
    assert!(matches!(err, CoreError::Lock(LockError::ManifestDrift(_))));
}

#[test]
fn locked_evaluation_detects_overlay_drift() {
    let (_store, project, engine) = setup();
    let manifest = write_manifest(project.path(), &[], &["rust"], "");
    engine.lock(&manifest, None).unwrap();

    write_manifest(project.path(), &[RUST_OVERLAY], &["rust"], "");
    let err = engine.check_lock(&manifest, None).unwrap_err();
    assert!(matches!(err, CoreError::Lock(LockError::ManifestDrift(_))));
}

#[test]
fn manifest_platform_change_is_lock_drift() {
    let (_store, project, engine) = setup();
    let manifest = write_manifest(project.path(), &[], &["rust"], "");
    let lock = engine.lock(&manifest, None).unwrap();
    assert_eq!(lock.system.to_string(), "x86_64-linux");

    let content = fs::read_to_string(&manifest).unwrap();
    fs::write(
        &manifest,
        content.replace("system = \"x86_64-linux\"", "system = \"aarch64-linux\""),
    )
    .unwrap();

    let err = engine.check_lock(&manifest, None).unwrap_err();
    assert!(matches!(err, CoreError::Lock(LockError::ManifestDrift(_))));
    assert!(err.to_string().contains("platform changed"));

    let options = EvalOptions {
        locked: true,
        ..EvalOptions::default()
    };
    let err = engine
        .evaluate(&manifest, &options, &InheritedEnv::new())
        .unwrap_err();
    assert!(matches!(err, CoreError::Lock(LockError::ManifestDrift(_))));
}

#[test]
fn manifest_without_system_checks_against_locked_platform() {
    let (_store, project, engine) = setup();
    let manifest = write_manifest(project.path(), &[], &["rust"], "");
    let content = fs::read_to_string(&manifest).unwrap();
    fs::write(&manifest, content.replace("system = \"x86_64-linux\"\n", "")).unwrap();

    let target = Platform::parse("aarch64-darwin").unwrap();
    let lock = engine.lock(&manifest, Some(&target)).unwrap();
    assert_eq!(lock.system, target);

    engine.check_lock(&manifest, None).unwrap();
    let options = EvalOptions {
        locked: true,
        ..EvalOptions::default()
    };
    let eval = engine
        .evaluate(&manifest, &options, &InheritedEnv::new())
        .unwrap();
    assert_eq!(eval.resolution.platform, target);
}

#[test]
fn tampered_lock_fails_integrity() {
    let (_store, project, engine) = setup();
    let manifest = write_manifest(project.path(), &[], &["sqlite"], "");
    engine.lock(&manifest, None).unwrap();

    let lock_path = project.path().join("devpin.lock");
    let content = fs::read_to_string(&lock_path).unwrap();
    fs::write(&lock_path, content.replace("3.45.1", "3.46.0")).unwrap();

    let err = engine.check_lock(&manifest, None).unwrap_err();
    assert!(matches!(
        err,
        CoreError::Lock(LockError::EnvIdMismatch { .. })
    ));
}

#[test]
fn multiple_shells_are_locked_together() {
    let (_store, project, engine) = setup();
    let manifest = write_manifest(
        project.path(),
        &[],
        &["sqlite"],
        "[shells.gui]\npackages = [\"libXcursor\"]\n",
    );
    let lock = engine.lock(&manifest, None).unwrap();
    assert_eq!(lock.shells.len(), 2);

    let options = EvalOptions {
        shell: Some("gui".to_owned()),
        locked: true,
        ..EvalOptions::default()
    };
    let eval = engine
        .evaluate(&manifest, &options, &InheritedEnv::new())
        .unwrap();
    assert_eq!(eval.shell, "gui");
    assert!(eval.resolution.contains("libX11"));
}
