//! CLI integration tests using assert_cmd
//!
//! Tests the full CLI binary with real command-line arguments.

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use tempfile::TempDir;

#[test]
fn test_cli_help() {
    Command::cargo_bin("rulecc")
        .unwrap()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("rulecc"))
        .stdout(predicate::str::contains("--output"));
}

#[test]
fn test_cli_compiles_to_default_output_path() {
    let temp_dir = TempDir::new().unwrap();
    let input_path = temp_dir.path().join("rules.yaml");
    fs::write(
        &input_path,
        "root:\n  users:\n    $uid:\n      \".read/write\": \"auth.uid == $uid\"\n",
    )
    .unwrap();

    Command::cargo_bin("rulecc")
        .unwrap()
        .arg(&input_path)
        .assert()
        .success();

    let output_path = temp_dir.path().join("rules.json");
    let output = fs::read_to_string(&output_path).unwrap();
    let parsed: serde_json::Value = serde_json::from_str(&output).unwrap();
    let uid_node = &parsed["rules"]["users"]["$uid"];
    assert_eq!(uid_node[".read"], "auth.uid == $uid");
    assert_eq!(uid_node[".write"], "auth.uid == $uid");
}

#[test]
fn test_cli_explicit_output_path() {
    let temp_dir = TempDir::new().unwrap();
    let input_path = temp_dir.path().join("rules.yaml");
    fs::write(&input_path, "root:\n  foo: string\n").unwrap();
    let output_path = temp_dir.path().join("compiled.json");

    Command::cargo_bin("rulecc")
        .unwrap()
        .arg(&input_path)
        .arg("-o")
        .arg(&output_path)
        .assert()
        .success();

    assert!(output_path.exists());
}

#[test]
fn test_cli_writes_firecrypt_sibling() {
    let temp_dir = TempDir::new().unwrap();
    let input_path = temp_dir.path().join("rules.yaml");
    fs::write(
        &input_path,
        "root:\n  users:\n    $uid:\n      ssn:\n        \".value\": \"encrypted[#-#-.] string\"\n",
    )
    .unwrap();

    Command::cargo_bin("rulecc")
        .unwrap()
        .arg(&input_path)
        .assert()
        .success();

    let firecrypt_path = temp_dir.path().join("rules_firecrypt.json");
    let output = fs::read_to_string(&firecrypt_path).unwrap();
    let parsed: serde_json::Value = serde_json::from_str(&output).unwrap();
    assert!(parsed["rules"]["users"]["$uid"]["ssn"][".encrypt"].is_object());
}

#[test]
fn test_cli_fails_on_invalid_document() {
    let temp_dir = TempDir::new().unwrap();
    let input_path = temp_dir.path().join("rules.yaml");
    fs::write(&input_path, "root:\n  foo: \"bogusIdentifier\"\n").unwrap();

    Command::cargo_bin("rulecc")
        .unwrap()
        .arg(&input_path)
        .assert()
        .failure()
        .stderr(predicate::str::is_empty().not());
}

#[test]
fn test_cli_fails_on_missing_file() {
    Command::cargo_bin("rulecc")
        .unwrap()
        .arg("/nonexistent/path/rules.yaml")
        .assert()
        .failure();
}
