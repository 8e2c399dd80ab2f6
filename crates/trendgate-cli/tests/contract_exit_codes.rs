#![allow(deprecated)]
use assert_cmd::Command;
use predicates::prelude::*;
use serde_json::Value;
use std::fs;
use std::path::Path;
use tempfile::tempdir;

const CONFIG: &str = r#"
version: 1
database: metrics.db
baseline:
  reference_branch: main
  max_builds: 10
  max_age_days: 30
quality_gate:
  mode: soft
  thresholds:
    - metric: coverage.lines
      mode: no-regression
      tolerance: 0.5
"#;

fn trendgate(dir: &Path) -> Command {
    let mut cmd = Command::cargo_bin("trendgate").unwrap();
    cmd.current_dir(dir);
    for var in [
        "GITHUB_SHA",
        "GITHUB_REF_NAME",
        "GITHUB_RUN_ID",
        "GITHUB_RUN_NUMBER",
        "GITHUB_REPOSITORY",
        "TRENDGATE_CONFIG",
        "TRENDGATE_DATABASE",
    ] {
        cmd.env_remove(var);
    }
    cmd
}

fn record_main(dir: &Path, run: u32, coverage: f64) {
    trendgate(dir)
        .args(["record", "--branch", "main", "--run-id"])
        .arg(format!("{}", 1000 + run))
        .arg("--run-number")
        .arg(run.to_string())
        .arg("--commit")
        .arg(format!("sha{}", run))
        .arg("--metric")
        .arg(format!("coverage.lines={}", coverage))
        .arg("--metric")
        .arg("build.status=success")
        .assert()
        .success()
        .stdout(predicate::str::contains("recorded build"));
}

fn seeded_workspace() -> tempfile::TempDir {
    let dir = tempdir().unwrap();
    fs::write(dir.path().join("trendgate.yaml"), CONFIG).unwrap();
    for (run, cov) in [(1, 80.0), (2, 82.0), (3, 81.0)] {
        record_main(dir.path(), run, cov);
    }
    dir
}

#[test]
fn version_exits_zero() {
    let dir = tempdir().unwrap();
    trendgate(dir.path())
        .arg("version")
        .assert()
        .code(0)
        .stdout(predicate::str::contains(env!("CARGO_PKG_VERSION")));
}

#[test]
fn hard_gate_regression_exits_one_and_writes_outputs() {
    let dir = seeded_workspace();
    trendgate(dir.path())
        .args([
            "gate",
            "--mode",
            "hard",
            "--metric",
            "coverage.lines=70",
            "--json",
            "out/gate.json",
            "--markdown",
            "out/comment.md",
        ])
        .assert()
        .code(1)
        .stdout(predicate::str::contains("quality gate: fail"));

    let json: Value =
        serde_json::from_str(&fs::read_to_string(dir.path().join("out/gate.json")).unwrap())
            .unwrap();
    assert_eq!(json["status"], "fail");
    assert_eq!(json["mode"], "hard");
    assert_eq!(json["failing_metrics"][0], "coverage.lines");
    assert_eq!(json["metrics"][0]["baseline_median"], 81.0);

    let comment = fs::read_to_string(dir.path().join("out/comment.md")).unwrap();
    assert!(comment.contains("Quality gate failed"));
    assert!(comment.contains("coverage.lines"));
}

#[test]
fn soft_gate_regression_exits_zero() {
    let dir = seeded_workspace();
    trendgate(dir.path())
        .args(["gate", "--metric", "coverage.lines=70"])
        .assert()
        .code(0)
        .stdout(predicate::str::contains("quality gate: fail (mode soft"));
}

#[test]
fn gate_without_history_is_inconclusive() {
    let dir = tempdir().unwrap();
    fs::write(dir.path().join("trendgate.yaml"), CONFIG).unwrap();
    trendgate(dir.path())
        .args(["gate", "--mode", "hard", "--metric", "coverage.lines=70"])
        .assert()
        .code(0)
        .stdout(predicate::str::contains("quality gate: unknown"));
}

#[test]
fn gate_with_record_excludes_itself_from_baseline() {
    let dir = seeded_workspace();
    let args = [
        "gate",
        "--mode",
        "hard",
        "--record",
        "--branch",
        "main",
        "--run-id",
        "2000",
        "--commit",
        "sha-head",
        "--metric",
        "coverage.lines=81",
        "--json",
        "gate.json",
    ];
    trendgate(dir.path()).args(args).assert().code(0);

    let json: Value =
        serde_json::from_str(&fs::read_to_string(dir.path().join("gate.json")).unwrap()).unwrap();
    assert_eq!(json["status"], "pass");
    assert_eq!(json["baseline_info"]["builds_considered"], 3);
}

#[test]
fn explicit_missing_config_is_a_user_error() {
    let dir = tempdir().unwrap();
    trendgate(dir.path())
        .args(["record", "--config", "nope.yaml", "--metric", "coverage.lines=1"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("validation.config_missing"));
}

#[test]
fn malformed_input_is_a_collection_error() {
    let dir = tempdir().unwrap();
    fs::write(dir.path().join("metrics.json"), "{not json").unwrap();
    trendgate(dir.path())
        .args([
            "record",
            "--input",
            "metrics.json",
            "--branch",
            "main",
            "--commit",
            "abc",
            "--run-id",
            "1",
        ])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("collection.invalid_input"));
}

#[test]
fn record_without_commit_is_a_user_error() {
    let dir = tempdir().unwrap();
    trendgate(dir.path())
        .args([
            "record",
            "--branch",
            "main",
            "--run-id",
            "1",
            "--metric",
            "coverage.lines=80",
        ])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("validation.missing_field"));
}

#[test]
fn corrupted_database_is_an_infrastructure_error() {
    let dir = tempdir().unwrap();
    fs::write(
        dir.path().join("garbage.db"),
        "this is definitely not a sqlite database, just some bytes padded out to a page. ".repeat(20),
    )
    .unwrap();
    trendgate(dir.path())
        .args(["report", "--database", "garbage.db"])
        .assert()
        .code(3)
        .stderr(predicate::str::contains("storage.corrupted"));
}

#[test]
fn report_writes_html() {
    let dir = seeded_workspace();
    trendgate(dir.path())
        .args(["report", "--out", "site/index.html", "--repository", "acme/widgets"])
        .assert()
        .code(0)
        .stdout(predicate::str::contains("wrote report"));

    let html = fs::read_to_string(dir.path().join("site/index.html")).unwrap();
    assert!(html.contains("acme/widgets"));
    assert!(html.contains("coverage.lines"));
    assert!(html.contains("trendgate-data"));
}

#[test]
fn report_defaults_to_reference_branch() {
    let dir = seeded_workspace();
    trendgate(dir.path())
        .args([
            "gate",
            "--record",
            "--branch",
            "feature/login",
            "--run-id",
            "3000",
            "--commit",
            "sha-pr",
            "--metric",
            "coverage.lines=81",
            "--metric",
            "pr.only=7",
        ])
        .assert()
        .code(0);

    trendgate(dir.path())
        .args(["report", "--out", "main.html"])
        .assert()
        .code(0);
    let html = fs::read_to_string(dir.path().join("main.html")).unwrap();
    assert!(html.contains("<dt>Branch</dt><dd>main</dd>"));
    assert!(html.contains("<dt>Builds</dt><dd>3</dd>"));
    assert!(!html.contains("pr.only"));

    trendgate(dir.path())
        .args(["report", "--all-branches", "--out", "all.html"])
        .assert()
        .code(0);
    let html = fs::read_to_string(dir.path().join("all.html")).unwrap();
    assert!(html.contains("<dt>Branch</dt><dd>all branches</dd>"));
    assert!(html.contains("<dt>Builds</dt><dd>4</dd>"));
    assert!(html.contains("pr.only"));
}

#[test]
fn remote_database_round_trips_through_file_url() {
    let dir = tempdir().unwrap();
    let bucket = dir.path().join("bucket");
    let url = format!("file://{}/metrics.db", bucket.display());

    for run in 1..=2u32 {
        trendgate(dir.path())
            .args(["record", "--database", url.as_str(), "--branch", "main", "--commit"])
            .arg(format!("sha{}", run))
            .arg("--run-id")
            .arg(run.to_string())
            .args(["--metric", "coverage.lines=80"])
            .assert()
            .success();
    }
    assert!(bucket.join("metrics.db").exists());

    trendgate(dir.path())
        .args(["report", "--database", url.as_str(), "--out", "r.html"])
        .assert()
        .success();
}
