//! Integration tests for the fieldmark binary.

use assert_cmd::Command;
use predicates::prelude::*;
use serde_json::{Value, json};
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Workspace with a config file, a template and one layout.
struct Fixture {
    dir: TempDir,
}

impl Fixture {
    fn new() -> Self {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("config.json"), r#"{"llm": {"api_key_env": "FIELDMARK_CLI_TEST_UNSET"}}"#).unwrap();
        fs::write(
            dir.path().join("template.json"),
            json!({
                "template_name": "purchase",
                "fields": [
                    {"field_name": "contract_number", "field_type": "text"},
                    {"field_name": "party_a", "field_type": "text"},
                    {"field_name": "contract_name", "field_type": "text"}
                ]
            })
            .to_string(),
        )
        .unwrap();
        let fixture = Self { dir };
        fixture.write_layout("contract.json", "HT-2024-17");
        fixture
    }

    fn path(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    fn write_layout(&self, name: &str, number: &str) -> PathBuf {
        let path = self.path(name);
        fs::write(
            &path,
            json!([[
                {"text": format!("合同编号：{}", number), "bbox": [50, 80, 250, 92]},
                {"text": "甲方：北京星河科技有限公司", "bbox": [50, 110, 320, 122]}
            ]])
            .to_string(),
        )
        .unwrap();
        path
    }

    /// Command rooted in the fixture directory with its config file.
    fn cli(&self) -> Command {
        let mut cmd = Command::new(env!("CARGO_BIN_EXE_fieldmark"));
        cmd.current_dir(self.dir.path())
            .env_remove("DASHSCOPE_API_KEY")
            .arg("--config")
            .arg(self.path("config.json"));
        cmd
    }

    fn process(&self) -> Command {
        let mut cmd = self.cli();
        cmd.arg("process")
            .arg("--template")
            .arg(self.path("template.json"))
            .arg("--layout")
            .arg(self.path("contract.json"));
        cmd
    }
}

fn read_json(path: &Path) -> Value {
    serde_json::from_str(&fs::read_to_string(path).unwrap()).unwrap()
}

#[test]
fn test_process_outputs_json_results() {
    let fixture = Fixture::new();

    let assert = fixture.process().assert().success();
    let output: Value = serde_json::from_slice(&assert.get_output().stdout).unwrap();

    let results = output["results"].as_array().unwrap();
    assert_eq!(results.len(), 3);
    assert_eq!(results[0]["field_name"], "contract_number");
    assert_eq!(results[0]["value"], "HT-2024-17");
    assert_eq!(results[0]["strategy"], "keyword_offset");
    assert_eq!(results[1]["value"], "北京星河科技有限公司");
    assert_eq!(results[2]["strategy"], "template_coordinates");
}

#[test]
fn test_process_csv_to_file() {
    let fixture = Fixture::new();
    let out = fixture.path("out.csv");

    fixture
        .process()
        .args(["--format", "csv", "--output"])
        .arg(&out)
        .assert()
        .success()
        .stdout(predicate::str::contains("Output written to"));

    let csv = fs::read_to_string(&out).unwrap();
    assert!(csv.starts_with("field_name,field_type,value,page_number"));
    assert!(csv.contains("contract_number,text,HT-2024-17,1,"));
}

#[test]
fn test_off_mode_uses_template_defaults() {
    let fixture = Fixture::new();

    fixture
        .process()
        .args(["--mode", "off", "--format", "text"])
        .assert()
        .success()
        .stdout(predicate::str::contains("template_coordinates"))
        .stdout(predicate::str::contains("keyword_offset").not());
}

#[test]
fn test_unknown_mode_rejected() {
    let fixture = Fixture::new();

    fixture
        .process()
        .args(["--mode", "guess"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("unknown mode"));
}

#[test]
fn test_llm_mode_without_key_falls_back() {
    let fixture = Fixture::new();

    fixture
        .process()
        .args(["--mode", "matching-llm"])
        .assert()
        .success()
        .stdout(predicate::str::contains("HT-2024-17"))
        .stderr(predicate::str::contains("fell back to matching"));
}

#[test]
fn test_missing_layout_fails() {
    let fixture = Fixture::new();

    fixture
        .cli()
        .arg("process")
        .arg("--template")
        .arg(fixture.path("template.json"))
        .arg("--layout")
        .arg(fixture.path("nope.json"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("Layout file not found"));
}

#[test]
fn test_annotations_append_then_skip_existing() {
    let fixture = Fixture::new();
    let annotations = fixture.path("annotations.json");

    for _ in 0..2 {
        fixture
            .process()
            .arg("--annotations")
            .arg(&annotations)
            .assert()
            .success()
            .stderr(predicate::str::contains("3 annotation(s) added"));
    }
    assert_eq!(read_json(&annotations).as_array().unwrap().len(), 6);

    fixture
        .process()
        .arg("--annotations")
        .arg(&annotations)
        .args(["--policy", "skip-existing"])
        .assert()
        .success()
        .stderr(predicate::str::contains("0 annotation(s) added"));

    let stored = read_json(&annotations);
    assert_eq!(stored.as_array().unwrap().len(), 6);
    assert_eq!(stored[0]["label"], "合同编号");
    assert_eq!(stored[0]["document_id"], "contract");
}

#[test]
fn test_batch_with_summary_and_failures() {
    let fixture = Fixture::new();
    fs::create_dir(fixture.path("layouts")).unwrap();
    fixture.write_layout("layouts/a.json", "HT-1");
    fixture.write_layout("layouts/b.json", "HT-2");
    fs::write(fixture.path("layouts/broken.json"), "\"not a layout\"").unwrap();
    let out_dir = fixture.path("out");

    fixture
        .cli()
        .arg("batch")
        .arg(format!("{}/*.json", fixture.path("layouts").display()))
        .arg("--template")
        .arg(fixture.path("template.json"))
        .arg("--output-dir")
        .arg(&out_dir)
        .args(["-j", "2", "--summary", "--continue-on-error"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Found 3 layouts"))
        .stdout(predicate::str::contains("Failed files:"));

    assert_eq!(read_json(&out_dir.join("a.json"))["results"][0]["value"], "HT-1");
    assert_eq!(read_json(&out_dir.join("b.json"))["results"][0]["value"], "HT-2");
    assert!(!out_dir.join("broken.json").exists());

    let summary = fs::read_to_string(out_dir.join("summary.csv")).unwrap();
    let lines: Vec<&str> = summary.lines().collect();
    assert_eq!(lines.len(), 4);
    assert!(lines[1].starts_with("a.json,success,a,3,2,0,"));
    assert!(lines[2].starts_with("b.json,success,b,3,2,0,"));
    assert!(lines[3].starts_with("broken.json,error,"));
}

#[test]
fn test_batch_stops_on_first_error() {
    let fixture = Fixture::new();
    fs::create_dir(fixture.path("layouts")).unwrap();
    fs::write(fixture.path("layouts/broken.json"), "[]").unwrap();

    fixture
        .cli()
        .arg("batch")
        .arg(format!("{}/*.json", fixture.path("layouts").display()))
        .arg("--template")
        .arg(fixture.path("template.json"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("no extractable text"));
}

#[test]
fn test_config_init_set_get() {
    let dir = TempDir::new().unwrap();
    let config = dir.path().join("nested/config.json");
    let cli = || {
        let mut cmd = Command::new(env!("CARGO_BIN_EXE_fieldmark"));
        cmd.arg("--config").arg(&config);
        cmd
    };

    cli().args(["config", "init"]).assert().success();
    cli().args(["config", "init"]).assert().failure().stderr(predicate::str::contains("--force"));

    cli()
        .args(["config", "set", "llm.trust_coordinates", "true"])
        .assert()
        .success();
    cli()
        .args(["config", "get", "llm.trust_coordinates"])
        .assert()
        .success()
        .stdout("true\n");

    cli()
        .args(["config", "set", "matching.no_such_key", "1"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Configuration key not found"));
    cli()
        .args(["config", "set", "matching.line_merge_ratio", "\"wide\""])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Invalid value"));

    assert_eq!(read_json(&config)["llm"]["trust_coordinates"], true);
}
