//! CLI integration tests for doc-pg-migrate.
//!
//! These tests verify command-line argument parsing, help output,
//! exit codes, and the commands that never touch a database.

use assert_cmd::Command;
use predicates::prelude::*;
use std::io::Write;
use std::path::Path;
use tempfile::TempDir;

/// Get a command for the doc-pg-migrate binary.
fn cmd() -> Command {
    Command::cargo_bin("doc-pg-migrate").unwrap()
}

/// Write a config with a JSON source at `source` and two entities.
fn write_config(dir: &Path, source: &Path) -> std::path::PathBuf {
    let config = format!(
        r#"
target:
  database: infinity
source:
  type: json
  path: {}
prompt:
  mode: headless
entities:
  - name: bots
    fields:
      - name: BotID
        source: botID
        dest: bot_id
        type: String
        unique: true
      - name: Tags
        source: tags
        dest: "-"
        type: String
        to_list: true
        default: "{{}}"
  - name: reviews
    options:
      ignore_fk_error: true
    fields:
      - name: BotID
        source: botID
        dest: bot_id
        type: String
        foreign_key: bots,bot_id
"#,
        source.display()
    );
    let path = dir.join("config.yaml");
    std::fs::write(&path, config).unwrap();
    path
}

fn write_source(dir: &Path) -> std::path::PathBuf {
    let path = dir.join("backup.json");
    std::fs::write(
        &path,
        r#"{
  "bots": [{"botID": "1", "tags": "a, b"}, {"botID": "2"}],
  "reviews": [{"botID": "1"}, {"botID": "404"}]
}"#,
    )
    .unwrap();
    path
}

// =============================================================================
// Help and Version Tests
// =============================================================================

#[test]
fn test_help_shows_all_commands() {
    cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("run"))
        .stdout(predicate::str::contains("backup"))
        .stdout(predicate::str::contains("migrate"))
        .stdout(predicate::str::contains("check"));
}

#[test]
fn test_run_subcommand_help() {
    cmd()
        .args(["run", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("--dry-run"))
        .stdout(predicate::str::contains("--backup"))
        .stdout(predicate::str::contains("--schema-only"))
        .stdout(predicate::str::contains("--source"))
        .stdout(predicate::str::contains("mongo"));
}

#[test]
fn test_backup_subcommand_help() {
    cmd()
        .args(["backup", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("--from"))
        .stdout(predicate::str::contains("--to"))
        .stdout(predicate::str::contains("[default: backup.out.json]"));
}

#[test]
fn test_version_flag() {
    cmd()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("doc-pg-migrate"));
}

// =============================================================================
// Global Flags Tests
// =============================================================================

#[test]
fn test_global_flags_exist() {
    cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("--output-json"))
        .stdout(predicate::str::contains("--log-format"))
        .stdout(predicate::str::contains("--verbosity"))
        .stdout(predicate::str::contains("[default: config.yaml]"));
}

#[test]
fn test_invalid_verbosity_exits_with_code_1() {
    cmd()
        .args(["--verbosity", "loud", "check"])
        .assert()
        .code(1);
}

// =============================================================================
// Exit Code Tests
// =============================================================================

#[test]
fn test_missing_config_exits_with_code_7() {
    // Missing file is an IO error (code 7), not config error (code 1)
    cmd()
        .args(["--config", "nonexistent_config_file.yaml", "check"])
        .assert()
        .code(7);
}

#[test]
fn test_invalid_yaml_exits_with_code_1() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "invalid: yaml: content: [").unwrap();

    cmd()
        .args(["--config", file.path().to_str().unwrap(), "check"])
        .assert()
        .code(1);
}

#[test]
fn test_missing_target_database_exits_with_code_1() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "target:").unwrap();
    writeln!(file, "  database: \"\"").unwrap();

    cmd()
        .args(["--config", file.path().to_str().unwrap(), "check"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("target.database is required"));
}

#[test]
fn test_unknown_selected_entity_exits_with_code_1() {
    let dir = TempDir::new().unwrap();
    let source = write_source(dir.path());
    let config = write_config(dir.path(), &source);

    cmd()
        .args(["--config", config.to_str().unwrap()])
        .args(["run", "--dry-run", "--backup", "ghosts"])
        .assert()
        .code(1);
}

#[test]
fn test_unknown_source_exits_with_code_1() {
    let dir = TempDir::new().unwrap();
    let source = write_source(dir.path());
    let config = write_config(dir.path(), &source);

    cmd()
        .args(["--config", config.to_str().unwrap()])
        .args(["run", "--dry-run", "--source", "couchdb"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("Unknown source 'couchdb'"));
}

#[test]
fn test_mongo_source_needs_its_config_section() {
    let dir = TempDir::new().unwrap();
    let source = write_source(dir.path());
    let config = write_config(dir.path(), &source);

    cmd()
        .args(["--config", config.to_str().unwrap()])
        .args(["backup", "--from", "mongo", "--to", "json"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("source 'mongo' needs"));
}

// =============================================================================
// Check Tests
// =============================================================================

#[test]
fn test_check_prints_ddl() {
    let dir = TempDir::new().unwrap();
    let source = write_source(dir.path());
    let config = write_config(dir.path(), &source);

    cmd()
        .args(["--config", config.to_str().unwrap(), "check"])
        .assert()
        .success()
        .stdout(predicate::str::contains("-- bots"))
        .stdout(predicate::str::contains("CREATE TABLE"))
        .stdout(predicate::str::contains("ADD COLUMN \"bot_id\""))
        .stdout(predicate::str::contains("Configuration OK: 2 entities"));
}

#[test]
fn test_check_output_json() {
    let dir = TempDir::new().unwrap();
    let source = write_source(dir.path());
    let config = write_config(dir.path(), &source);

    cmd()
        .args(["--config", config.to_str().unwrap(), "--output-json", "check"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"bots\": ["))
        .stdout(predicate::str::contains("\"reviews\": ["));
}

// =============================================================================
// Dry Run Tests
// =============================================================================

#[test]
fn test_dry_run_copies_into_memory() {
    let dir = TempDir::new().unwrap();
    let source = write_source(dir.path());
    let config = write_config(dir.path(), &source);

    cmd()
        .args(["--config", config.to_str().unwrap(), "--verbosity", "error"])
        .args(["run", "--dry-run"])
        .assert()
        .success()
        .stdout(predicate::str::contains("DROP SCHEMA IF EXISTS"))
        .stdout(predicate::str::contains("Dry run completed!"))
        .stdout(predicate::str::contains("reviews: 1 inserted, 0 skipped, 1 ignored"));
}

#[test]
fn test_dry_run_output_json() {
    let dir = TempDir::new().unwrap();
    let source = write_source(dir.path());
    let config = write_config(dir.path(), &source);

    cmd()
        .args(["--config", config.to_str().unwrap(), "--output-json"])
        .args(["run", "--dry-run", "--backup", "bots"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"target\": \"memory\""))
        .stdout(predicate::str::contains("\"selective\": true"))
        .stdout(predicate::str::contains("\"rows_inserted\": 2"));
}

#[test]
fn test_dry_run_schema_only_inserts_nothing() {
    let dir = TempDir::new().unwrap();
    let source = write_source(dir.path());
    let config = write_config(dir.path(), &source);

    cmd()
        .args(["--config", config.to_str().unwrap(), "--output-json"])
        .args(["run", "--dry-run", "--schema-only"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"schema_only\": true"))
        .stdout(predicate::str::contains("\"rows_inserted\": 0"));
}

// =============================================================================
// Backup Tests
// =============================================================================

#[test]
fn test_backup_json_to_json() {
    let dir = TempDir::new().unwrap();
    let source = write_source(dir.path());
    let config = write_config(dir.path(), &source);
    let out = dir.path().join("dump.json");

    cmd()
        .args(["--config", config.to_str().unwrap()])
        .args(["backup", "--from", "json", "--to", "json", "--to-path"])
        .arg(&out)
        .assert()
        .success()
        .stdout(predicate::str::contains("bots: 2 records"));

    let written: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&out).unwrap()).unwrap();
    assert_eq!(written["reviews"][1]["botID"], "404");
}

#[test]
fn test_backup_into_its_own_source_is_refused() {
    let dir = TempDir::new().unwrap();
    let source = write_source(dir.path());
    let config = write_config(dir.path(), &source);

    cmd()
        .args(["--config", config.to_str().unwrap()])
        .args(["backup", "--from", "json", "--to", "json", "--to-path"])
        .arg(&source)
        .assert()
        .code(1);
}

// =============================================================================
// No Subcommand Tests
// =============================================================================

#[test]
fn test_no_subcommand_shows_help() {
    cmd()
        .assert()
        .failure()
        .stderr(predicate::str::contains("Usage:"));
}
