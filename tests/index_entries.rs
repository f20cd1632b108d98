// SPDX-License-Identifier: MIT OR Apache-2.0

use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;
use ragsift::embedding::PassageStore;
use serde_json::Value;
use std::fs;
use std::path::Path;
use tempfile::TempDir;

fn write_dummy_config(root: &Path) {
    fs::write(
        root.join(".ragsiftrc.toml"),
        "[embeddings]\nprovider = \"dummy\"\ndimension = 4\n",
    )
    .unwrap();
}

fn run_index_json(root: &Path, extra_args: &[&str]) -> Value {
    let mut cmd = cargo_bin_cmd!("ragsift");
    let assert = cmd
        .current_dir(root)
        .args(["--format", "json", "--compact", "index", "entries.tsv"])
        .args(extra_args)
        .assert()
        .success();
    let stdout = String::from_utf8(assert.get_output().stdout.clone()).unwrap();
    serde_json::from_str(stdout.trim()).unwrap()
}

#[test]
fn index_creates_passage_store() {
    let dir = TempDir::new().unwrap();
    write_dummy_config(dir.path());
    fs::write(dir.path().join("entries.tsv"), "a.txt\talpha\nb.txt\tbeta\n").unwrap();

    let summary = run_index_json(dir.path(), &[]);
    assert_eq!(summary["inserted"], 2);
    assert_eq!(summary["model"], "dummy");

    let store = PassageStore::open_default(dir.path()).unwrap();
    assert_eq!(store.count_passages().unwrap(), 2);
    assert_eq!(store.dimension().unwrap(), Some(4));
}

#[test]
fn index_skips_unchanged_entries() {
    let dir = TempDir::new().unwrap();
    write_dummy_config(dir.path());
    fs::write(dir.path().join("entries.tsv"), "a.txt\talpha\n").unwrap();
    run_index_json(dir.path(), &[]);

    fs::write(dir.path().join("entries.tsv"), "a.txt\talpha\nc.txt\tgamma\n").unwrap();
    let summary = run_index_json(dir.path(), &[]);
    assert_eq!(summary["inserted"], 1);
    assert_eq!(summary["skipped"], 1);
    assert_eq!(summary["passages"], 2);
}

#[test]
fn index_force_rebuilds() {
    let dir = TempDir::new().unwrap();
    write_dummy_config(dir.path());
    fs::write(dir.path().join("entries.tsv"), "a.txt\talpha\nb.txt\tbeta\n").unwrap();
    run_index_json(dir.path(), &[]);

    fs::write(dir.path().join("entries.tsv"), "c.txt\tgamma\n").unwrap();
    let summary = run_index_json(dir.path(), &["--force"]);
    assert_eq!(summary["inserted"], 1);
    assert_eq!(summary["passages"], 1);
}

#[test]
fn index_reports_malformed_line() {
    let dir = TempDir::new().unwrap();
    write_dummy_config(dir.path());
    fs::write(dir.path().join("entries.tsv"), "a.txt\talpha\nno tab here\n").unwrap();

    let mut cmd = cargo_bin_cmd!("ragsift");
    cmd.current_dir(dir.path())
        .args(["index", "entries.tsv"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("line 2"));
}

#[test]
fn completions_are_generated() {
    let mut cmd = cargo_bin_cmd!("ragsift");
    cmd.args(["completions", "bash"])
        .assert()
        .success()
        .stdout(predicate::str::contains("ragsift"));
}
