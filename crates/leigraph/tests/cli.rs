use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use tempfile::TempDir;

const MINIMAL_TABLE: &str = r#"
[[registration.entities]]
schema = "Organization"
key = { prefix = "lei", fields = ["id"] }
properties = { name = { field = "name", required = true } }

[[relationship.relationships]]
schema = "Relationship"
key = { prefix = "rel", fields = ["parent", "child", "type"] }
source = { prefix = "lei", fields = ["parent"] }
target = { prefix = "lei", fields = ["child"] }
label = { field = "type" }
"#;

fn fixture(name: &str) -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("../leigraph-parser/tests/data")
        .join(name)
}

fn toml_path(path: &Path) -> String {
    format!("{:?}", path.display().to_string())
}

fn write_config(dir: &TempDir, registration: &Path) -> PathBuf {
    let mapping = dir.path().join("mapping.toml");
    fs::write(&mapping, MINIMAL_TABLE).expect("write mapping");

    let config = format!(
        r#"
dataset = "cli-test"

[sources]
registration = [{registration}]
relationships = [{relationships}]

[output]
fragments = {fragments}
export_dir = {export}

[mapping]
path = {mapping}
"#,
        registration = toml_path(registration),
        relationships = toml_path(&fixture("minimal_relationships.csv")),
        fragments = toml_path(&dir.path().join("fragments.json")),
        export = toml_path(&dir.path().join("export")),
        mapping = toml_path(&mapping),
    );
    let path = dir.path().join("leigraph.toml");
    fs::write(&path, config).expect("write config");
    path
}

fn leigraph(config: &Path, args: &[&str]) -> std::process::Output {
    Command::new(env!("CARGO_BIN_EXE_leigraph"))
        .arg("--config")
        .arg(config)
        .args(args)
        .env("RUST_LOG", "info")
        .env_remove("LEIGRAPH_PREFIX")
        .output()
        .expect("run leigraph")
}

#[test]
fn dry_run_executes_every_stage() {
    let dir = TempDir::new().expect("temp dir");
    let config = write_config(&dir, &fixture("minimal_registration.csv"));

    let output = leigraph(&config, &["run", "--dry-run"]);
    assert!(
        output.status.success(),
        "stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );

    let export = fs::read_to_string(dir.path().join("export/entities.ftm.json"))
        .expect("export written");
    assert_eq!(export.lines().count(), 2);
    assert!(export.contains(r#""id":"lei-LEI1""#));
    assert!(export.contains(r#""label":"branch""#));

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("leidata/entities.ftm.json"), "stdout: {stdout}");
}

#[test]
fn missing_source_exits_with_no_input_status() {
    let dir = TempDir::new().expect("temp dir");
    let config = write_config(&dir, &dir.path().join("absent.csv"));

    let output = leigraph(&config, &["map"]);
    assert_eq!(output.status.code(), Some(66));
    assert!(!dir.path().join("fragments.json").exists());
}

#[test]
fn malformed_source_exits_with_data_error_status() {
    let dir = TempDir::new().expect("temp dir");
    let config = write_config(&dir, &fixture("malformed.xml"));

    let output = leigraph(&config, &["map"]);
    assert_eq!(output.status.code(), Some(65));
}

#[test]
fn invalid_config_exits_with_config_status() {
    let dir = TempDir::new().expect("temp dir");
    let config = dir.path().join("leigraph.toml");
    fs::write(&config, "[publish]\nunknown = 1\n").expect("write config");

    let output = leigraph(&config, &["aggregate"]);
    assert_eq!(output.status.code(), Some(78));
}
