#![allow(missing_docs)]

mod support;

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use assert_cmd::cargo::cargo_bin_cmd;
use sombra_traverse::{structure::Graph, TraversalSource};
use support::modern;
use tempfile::TempDir;

fn fixtures(dir: &Path) -> (PathBuf, PathBuf) {
    let graph: Arc<dyn Graph> = modern();
    let g = TraversalSource::new(graph);
    let graph_path = dir.join("modern.jsonl");
    g.write(&graph_path)
        .expect("locator")
        .iterate()
        .expect("write graph");

    let bytecode = g
        .v([])
        .has_label(["person"])
        .out(["knows"])
        .values(["name"])
        .bytecode()
        .to_wire()
        .expect("wire form");
    let bytecode_path = dir.join("friends.json");
    fs::write(&bytecode_path, bytecode).expect("write bytecode");
    (graph_path, bytecode_path)
}

#[test]
fn run_prints_results_as_text() {
    let dir = TempDir::new().expect("tempdir");
    let (graph, bytecode) = fixtures(dir.path());
    let output = cargo_bin_cmd!("sombra-traverse")
        .env_remove("SOMBRA_TRAVERSAL_CONFIG")
        .arg("run")
        .arg("--graph")
        .arg(&graph)
        .arg("--bytecode")
        .arg(&bytecode)
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let mut lines: Vec<String> = String::from_utf8(output)
        .expect("utf8")
        .lines()
        .map(str::to_owned)
        .collect();
    lines.sort();
    assert_eq!(lines, vec!["josh", "vadas"]);
}

#[test]
fn run_emits_json() {
    let dir = TempDir::new().expect("tempdir");
    let (graph, bytecode) = fixtures(dir.path());
    let output = cargo_bin_cmd!("sombra-traverse")
        .env_remove("SOMBRA_TRAVERSAL_CONFIG")
        .args(["--format", "json", "run"])
        .arg("--graph")
        .arg(&graph)
        .arg("--bytecode")
        .arg(&bytecode)
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let json: serde_json::Value = serde_json::from_slice(&output).expect("valid json");
    let items = json.as_array().expect("array");
    assert_eq!(items.len(), 2);
    assert!(items.iter().all(|item| item["t"] == "String"));
}

#[test]
fn run_can_save_the_mutated_graph() {
    let dir = TempDir::new().expect("tempdir");
    let g = TraversalSource::empty();
    let bytecode_path = dir.path().join("add.json");
    fs::write(
        &bytecode_path,
        g.add_v("person").bytecode().to_wire().expect("wire"),
    )
    .expect("write bytecode");
    let saved = dir.path().join("saved.jsonl");

    cargo_bin_cmd!("sombra-traverse")
        .env_remove("SOMBRA_TRAVERSAL_CONFIG")
        .arg("run")
        .arg("--bytecode")
        .arg(&bytecode_path)
        .arg("--save")
        .arg(&saved)
        .assert()
        .success();
    let contents = fs::read_to_string(&saved).expect("saved graph");
    assert_eq!(contents.lines().count(), 1);
    assert!(contents.contains("\"person\""));
}

#[test]
fn explain_honors_the_config_file() {
    let dir = TempDir::new().expect("tempdir");
    let (_, bytecode) = fixtures(dir.path());
    let config = dir.path().join("traversal.toml");
    fs::write(&config, "lazy_barriers = false\n").expect("write config");

    let output = cargo_bin_cmd!("sombra-traverse")
        .args(["explain", "--bytecode"])
        .arg(&bytecode)
        .arg("--config")
        .arg(&config)
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let text = String::from_utf8(output).expect("utf8");
    let final_line = text
        .lines()
        .find(|line| line.starts_with("Final Traversal"))
        .expect("final line");
    assert!(final_line.contains("GraphStep(vertex,[])[~label=person]"));
    assert!(!final_line.contains("BarrierStep"));
}

#[test]
fn missing_graph_file_fails_with_code() {
    let dir = TempDir::new().expect("tempdir");
    let (_, bytecode) = fixtures(dir.path());
    let output = cargo_bin_cmd!("sombra-traverse")
        .env_remove("SOMBRA_TRAVERSAL_CONFIG")
        .arg("run")
        .arg("--graph")
        .arg(dir.path().join("absent.jsonl"))
        .arg("--bytecode")
        .arg(&bytecode)
        .assert()
        .failure()
        .get_output()
        .stderr
        .clone();
    let stderr = String::from_utf8(output).expect("utf8");
    assert!(stderr.contains("[ResourceMissing]"));
    assert!(stderr.contains("absent.jsonl"));
}
