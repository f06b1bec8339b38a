use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

fn crm_binary() -> PathBuf {
    let mut path = std::env::current_exe().unwrap();
    path.pop(); // remove test binary name
    path.pop(); // remove deps/
    path.push("crm");
    path
}

fn setup_test_env() -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    let config_dir = root.join("config");
    fs::create_dir_all(&config_dir).unwrap();
    fs::create_dir_all(root.join("data")).unwrap();

    let exports = root.join("exports");
    fs::create_dir_all(&exports).unwrap();
    fs::write(
        exports.join("lps.json"),
        r#"{"pages": [
            {"id": "lp-1", "properties": {"Name": {"type": "title", "title": [{"plain_text": "Acme Pension"}]}}},
            {"id": "lp-2", "properties": {"Name": {"type": "title", "title": [{"plain_text": "Beta Insurance"}]}}}
        ]}"#,
    )
    .unwrap();
    fs::write(
        exports.join("people.csv"),
        "Name,Email\nAna Ruiz,ana@acme.pe\n",
    )
    .unwrap();

    let config_content = format!(
        r#"[db]
path = "{root}/data/crm.sqlite"

[server]
bind = "127.0.0.1:7341"

[import]
export_dir = "{root}/exports"

[import.patterns]
people = ["**/people*.csv"]

[logging]
filter = "warn"
"#,
        root = root.display()
    );

    let config_path = config_dir.join("crm.toml");
    fs::write(&config_path, config_content).unwrap();

    (tmp, config_path)
}

fn run_crm(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let binary = crm_binary();
    let output = Command::new(&binary)
        .arg("--config")
        .arg(config_path.to_str().unwrap())
        .args(args)
        .output()
        .unwrap_or_else(|e| panic!("Failed to run crm binary at {:?}: {}", binary, e));

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    let success = output.status.success();
    (stdout, stderr, success)
}

/// Value printed next to `label:` by `crm stats`.
fn stat(stdout: &str, label: &str) -> Option<i64> {
    let prefix = format!("{}:", label);
    stdout
        .lines()
        .map(str::trim)
        .find(|line| line.starts_with(&prefix))
        .and_then(|line| line[prefix.len()..].trim().parse().ok())
}

fn exports_dir(config_path: &Path) -> PathBuf {
    config_path.parent().unwrap().parent().unwrap().join("exports")
}

#[test]
fn test_init_creates_database() {
    let (_tmp, config_path) = setup_test_env();

    let (stdout, stderr, success) = run_crm(&config_path, &["init"]);
    assert!(success, "init failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("initialized"));
}

#[test]
fn test_init_idempotent() {
    let (_tmp, config_path) = setup_test_env();

    let (_, _, success1) = run_crm(&config_path, &["init"]);
    assert!(success1, "First init failed");

    let (_, _, success2) = run_crm(&config_path, &["init"]);
    assert!(success2, "Second init failed (not idempotent)");
}

#[test]
fn test_import_file() {
    let (_tmp, config_path) = setup_test_env();
    run_crm(&config_path, &["init"]);

    let file = exports_dir(&config_path).join("lps.json");
    let (stdout, stderr, success) =
        run_crm(&config_path, &["import", "lps", file.to_str().unwrap()]);
    assert!(success, "import failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("imported: 2"));
    assert!(stdout.contains("ok"));

    // Unchanged file is skipped; --force re-imports as updates.
    let (stdout, _, _) = run_crm(&config_path, &["import", "lps", file.to_str().unwrap()]);
    assert!(stdout.contains("unchanged"));
    let (stdout, _, success) =
        run_crm(&config_path, &["import", "lps", file.to_str().unwrap(), "--force"]);
    assert!(success);
    assert!(stdout.contains("updated: 2"));
}

#[test]
fn test_import_dry_run() {
    let (_tmp, config_path) = setup_test_env();
    run_crm(&config_path, &["init"]);

    let file = exports_dir(&config_path).join("lps.json");
    let (stdout, _, success) = run_crm(
        &config_path,
        &["import", "lps", file.to_str().unwrap(), "--dry-run"],
    );
    assert!(success);
    assert!(stdout.contains("(dry-run)"));

    let (stdout, _, _) = run_crm(&config_path, &["stats"]);
    assert_eq!(stat(&stdout, "LPs"), Some(0));
}

#[test]
fn test_import_all_and_stats() {
    let (_tmp, config_path) = setup_test_env();
    run_crm(&config_path, &["init"]);

    let (stdout, stderr, success) = run_crm(&config_path, &["import", "all"]);
    assert!(success, "import all failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("import notion lps"));
    assert!(stdout.contains("import csv people"));
    assert!(stdout.contains("2 export(s) processed"));

    let (stdout, _, success) = run_crm(&config_path, &["stats"]);
    assert!(success);
    assert_eq!(stat(&stdout, "LPs"), Some(2));
    assert_eq!(stat(&stdout, "People"), Some(1));
    assert!(stdout.contains("notion:lps"));
}

#[test]
fn test_exports_listing() {
    let (_tmp, config_path) = setup_test_env();

    let (stdout, stderr, success) = run_crm(&config_path, &["exports"]);
    assert!(success, "exports failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("lps.json"));
    assert!(stdout.contains("people.csv"));
    assert!(stdout.contains("2 file(s)"));
}

#[test]
fn test_funnel_refresh() {
    let (_tmp, config_path) = setup_test_env();
    run_crm(&config_path, &["init"]);

    let (stdout, stderr, success) = run_crm(&config_path, &["funnel", "refresh"]);
    assert!(success, "refresh failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("interest records created: 0"));
    assert!(stdout.contains("ok"));
}

#[test]
fn test_import_rejects_unknown_kind() {
    let (_tmp, config_path) = setup_test_env();
    run_crm(&config_path, &["init"]);

    let file = exports_dir(&config_path).join("lps.json");
    let (_, stderr, success) =
        run_crm(&config_path, &["import", "contacts", file.to_str().unwrap()]);
    assert!(!success);
    assert!(stderr.contains("unknown import kind"));
}

#[test]
fn test_import_person_links_requires_csv() {
    let (_tmp, config_path) = setup_test_env();
    run_crm(&config_path, &["init"]);

    let file = exports_dir(&config_path).join("lps.json");
    let (_, stderr, success) =
        run_crm(&config_path, &["import", "person-links", file.to_str().unwrap()]);
    assert!(!success);
    assert!(stderr.contains("CSV"));
}

#[test]
fn test_missing_config_fails() {
    let tmp = TempDir::new().unwrap();
    let missing = tmp.path().join("nope.toml");
    let (_, stderr, success) = run_crm(&missing, &["init"]);
    assert!(!success);
    assert!(stderr.contains("Failed to read config file"));
}
