// SPDX-License-Identifier: MIT OR Apache-2.0

use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;
use ragsift::embedding::PassageStore;
use serde_json::Value;
use std::fs;
use std::path::Path;
use tempfile::TempDir;

const ENTRIES: &str = "\
law/contract.txt\tA contract is an agreement between parties.
law/contract.txt\tContracts bind the parties that sign them, once formed.
law/tort.txt\tA tort is a civil wrong.
law/lease.txt\tA lease grants the use of property for a term.
";

fn write_config(root: &Path) {
    fs::write(
        root.join(".ragsiftrc.toml"),
        r#"
[embeddings]
provider = "dummy"
dimension = 8

[generation]
provider = "echo"
prompt_template = "{query}|{context}"
"#,
    )
    .unwrap();
}

fn setup() -> TempDir {
    let dir = TempDir::new().unwrap();
    write_config(dir.path());
    fs::write(dir.path().join("entries.tsv"), ENTRIES).unwrap();

    let mut cmd = cargo_bin_cmd!("ragsift");
    cmd.current_dir(dir.path())
        .args(["index", "entries.tsv"])
        .env("NO_COLOR", "1")
        .assert()
        .success();
    dir
}

fn ask_json(dir: &Path, extra: &[&str]) -> Value {
    let mut cmd = cargo_bin_cmd!("ragsift");
    let assert = cmd
        .current_dir(dir)
        .args(["--format", "json", "ask", "what is a contract?"])
        .args(extra)
        .assert()
        .success();
    let stdout = String::from_utf8(assert.get_output().stdout.clone()).unwrap();
    serde_json::from_str(&stdout).unwrap()
}

fn selected_sources(payload: &Value) -> Vec<String> {
    payload["selected"]
        .as_array()
        .unwrap()
        .iter()
        .map(|c| c["source_id"].as_str().unwrap().to_string())
        .collect()
}

#[test]
fn ask_keeps_rank_order_up_to_max_results() {
    let dir = setup();
    let payload = ask_json(dir.path(), &["--max-results", "2"]);

    assert_eq!(
        selected_sources(&payload),
        vec!["law/contract.txt", "law/contract.txt"]
    );
    assert_eq!(
        payload["answer"],
        "what is a contract?|A contract is an agreement between parties. \
         Contracts bind the parties that sign them, once formed."
    );
    assert_eq!(payload["stats"]["embedded"], 2);
}

#[test]
fn ask_zero_threshold_keeps_longest_duplicate() {
    let dir = setup();
    // Zero vectors are all "duplicates" at threshold 0, so one slot survives
    // and the longest passage ends up in it.
    let payload = ask_json(dir.path(), &["--threshold", "0", "--max-results", "3"]);

    assert_eq!(selected_sources(&payload), vec!["law/contract.txt"]);
    assert_eq!(
        payload["selected"][0]["text"],
        "Contracts bind the parties that sign them, once formed."
    );
    assert_eq!(payload["stats"]["replaced"], 1);
    assert_eq!(payload["stats"]["discarded"], 2);
}

#[test]
fn ask_text_output_lists_passages() {
    let dir = setup();
    let mut cmd = cargo_bin_cmd!("ragsift");
    cmd.current_dir(dir.path())
        .env("NO_COLOR", "1")
        .args(["ask", "lease terms", "-m", "1"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Answer"))
        .stdout(predicate::str::contains("[1] law/contract.txt (distance 0.0000)"));
}

#[test]
fn ask_rejects_out_of_range_threshold() {
    let dir = setup();
    let mut cmd = cargo_bin_cmd!("ragsift");
    cmd.current_dir(dir.path())
        .args(["ask", "anything", "--threshold", "1.5"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Invalid configuration"));
}

#[test]
fn ask_without_index_fails() {
    let dir = TempDir::new().unwrap();
    write_config(dir.path());

    let mut cmd = cargo_bin_cmd!("ragsift");
    cmd.current_dir(dir.path())
        .args(["ask", "anything", "--path"])
        .arg(dir.path())
        .assert()
        .failure()
        .stderr(predicate::str::contains("No index found"));
}

#[test]
fn ask_from_subdirectory_reads_index_root_config() {
    let dir = setup();
    fs::write(
        dir.path().join(".ragsiftrc.toml"),
        r#"
default_format = "json"

[embeddings]
provider = "dummy"
dimension = 8

[generation]
provider = "echo"
prompt_template = "{query}|{context}"
"#,
    )
    .unwrap();
    let nested = dir.path().join("docs").join("notes");
    fs::create_dir_all(&nested).unwrap();

    let mut cmd = cargo_bin_cmd!("ragsift");
    let assert = cmd
        .current_dir(&nested)
        .args(["ask", "what is a tort?"])
        .assert()
        .success();
    let stdout = String::from_utf8(assert.get_output().stdout.clone()).unwrap();
    let payload: Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(payload["query"], "what is a tort?");
}

#[test]
fn ask_rejects_index_from_other_model() {
    let dir = setup();
    let store = PassageStore::open_default(dir.path()).unwrap();
    store.set_meta("model", "bge-small").unwrap();

    let mut cmd = cargo_bin_cmd!("ragsift");
    cmd.current_dir(dir.path())
        .args(["ask", "what is a contract?"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("rebuild with --force"));
}
