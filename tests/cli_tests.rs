use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;
use std::io::Write;
use tempfile::{NamedTempFile, TempDir};

fn endpoint_list() -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    write!(
        file,
        r#"[
            {{"path": "/search", "methods": ["GET", "POST"], "parameters": [{{"name": "q", "type": "string"}}]}},
            {{"path": "/health", "methods": ["GET"]}}
        ]"#
    )
    .unwrap();
    file
}

/// Dry-run extracts and plans, then exits 0 without sending anything.
#[test]
fn test_dry_run_prints_plan() {
    let list = endpoint_list();
    let out = TempDir::new().unwrap();

    cargo_bin_cmd!("sqlprobe")
        .args(["--base-url", "http://127.0.0.1:9", "--endpoints"])
        .arg(list.path())
        .arg("-o")
        .arg(out.path().join("results"))
        .arg("--dry-run")
        .assert()
        .success()
        .stdout(predicate::str::contains(
            "[DRY RUN] Would fuzz 2 endpoint(s) with 10 task(s) against http://127.0.0.1:9",
        ));

    assert!(!out.path().join("results").exists());
}

/// Source directories are walked for framework routes.
#[test]
fn test_dry_run_from_source_tree() {
    let src = TempDir::new().unwrap();
    std::fs::write(
        src.path().join("server.js"),
        "app.get('/api/data', (req, res) => res.send(req.query.filter));\n",
    )
    .unwrap();

    cargo_bin_cmd!("sqlprobe")
        .args(["--base-url", "http://localhost:3000", "--source"])
        .arg(src.path())
        .arg("--dry-run")
        .assert()
        .success()
        .stdout(predicate::str::contains("Would fuzz 1 endpoint(s) with 5 task(s)"));
}

/// A config file supplies defaults that flags override.
#[test]
fn test_config_file_with_override() {
    let list = endpoint_list();
    let mut config = NamedTempFile::new().unwrap();
    write!(
        config,
        r#"{{"baseUrl": "http://from-config:8000", "endpointFiles": ["{}"], "maxWorkers": 2}}"#,
        list.path().display()
    )
    .unwrap();

    cargo_bin_cmd!("sqlprobe")
        .arg("--config")
        .arg(config.path())
        .args(["--base-url", "http://override:9000", "--dry-run"])
        .assert()
        .success()
        .stdout(predicate::str::contains("against http://override:9000"));
}

/// Running with no arguments should fail (clap requires a base URL or config).
#[test]
fn test_no_args_shows_error() {
    cargo_bin_cmd!("sqlprobe")
        .assert()
        .failure();
}

#[test]
fn test_zero_workers_rejected() {
    let list = endpoint_list();
    cargo_bin_cmd!("sqlprobe")
        .args(["--base-url", "http://localhost", "-t", "0", "--endpoints"])
        .arg(list.path())
        .assert()
        .code(1)
        .stderr(predicate::str::contains("max_workers"));
}

#[test]
fn test_missing_sources_rejected() {
    cargo_bin_cmd!("sqlprobe")
        .args(["--base-url", "http://localhost", "--dry-run"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("no endpoint sources"));
}

/// Vendored dependencies are never walked; extra names come from `--ignore-dir`.
#[test]
fn test_dry_run_skips_ignored_dirs() {
    let src = TempDir::new().unwrap();
    std::fs::write(src.path().join("server.js"), "app.get('/real', h);\n").unwrap();
    let vendored = src.path().join("node_modules").join("express");
    std::fs::create_dir_all(&vendored).unwrap();
    std::fs::write(vendored.join("demo.js"), "app.get('/vendored-demo', h);\n").unwrap();
    let build = src.path().join("build");
    std::fs::create_dir_all(&build).unwrap();
    std::fs::write(build.join("bundle.js"), "app.get('/bundled', h);\n").unwrap();

    cargo_bin_cmd!("sqlprobe")
        .args(["--base-url", "http://localhost:3000", "--source"])
        .arg(src.path())
        .args(["--ignore-dir", "build", "--dry-run"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Would fuzz 1 endpoint(s)"));
}
