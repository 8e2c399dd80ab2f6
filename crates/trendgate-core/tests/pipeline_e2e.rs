use chrono::{Duration, TimeZone, Utc};
use trendgate_core::baseline::{build_samples, BaselineWindow};
use trendgate_core::collect::parse_collected;
use trendgate_core::config::parse_config;
use trendgate_core::gate::{evaluate_quality_gate, render_markdown_comment, GateStatus};
use trendgate_core::model::BuildContext;
use trendgate_core::storage::{MetricsStore, SqliteStore};

const CONFIG: &str = r#"
version: 1
baseline:
  reference_branch: main
  max_builds: 5
  max_age_days: 30
quality_gate:
  mode: hard
  thresholds:
    - metric: coverage.lines
      mode: no-regression
    - metric: binary.size
      mode: max
      target: 2000000
    - metric: tests.count
      mode: delta-max-drop
      max_drop_percent: 10
      severity: warning
"#;

fn ctx(branch: &str, run: u64, days_ago: i64) -> BuildContext {
    BuildContext {
        commit_sha: format!("sha-{}", run),
        branch: branch.into(),
        run_id: format!("{}", 9000 + run),
        run_number: run,
        timestamp: Utc.with_ymd_and_hms(2024, 8, 31, 0, 0, 0).unwrap() - Duration::days(days_ago),
    }
}

#[test]
fn record_history_then_gate_a_pull_request() -> anyhow::Result<()> {
    let cfg = parse_config(CONFIG)?;
    let registry = cfg.registry()?;
    let store = SqliteStore::memory()?;

    for (run, cov) in [(1u64, 80.0), (2, 82.0), (3, 81.0)] {
        let json = format!(
            r#"[{{"name":"coverage.lines","value":{}}},{{"name":"binary.size","value":1500000}},{{"name":"tests.count","value":200}},{{"name":"build.status","value":"success"}}]"#,
            cov
        );
        store.record_run(&ctx("main", run, 10 - run as i64), &parse_collected(&json, &registry)?)?;
    }

    let pr_json = r#"[
        {"name": "coverage.lines", "value": 79.0},
        {"name": "binary.size", "value": 1600000},
        {"name": "tests.count", "value": 150},
        {"name": "build.status", "value": "success"}
    ]"#;
    let collected = parse_collected(pr_json, &registry)?;
    let pr = ctx("feature/login", 4, 0);
    let recorded = store.record_run(&pr, &collected)?;

    let samples = build_samples(
        &collected,
        &store,
        &cfg.baseline,
        pr.timestamp,
        Some(recorded.build_id),
    )?;
    assert_eq!(samples.len(), 3);
    let cov = samples.iter().find(|s| s.name == "coverage.lines").unwrap();
    assert_eq!(cov.baseline_values, vec![81.0, 82.0, 80.0]);
    assert_eq!(cov.unit.as_deref(), Some("%"));

    let result = evaluate_quality_gate(&samples, &cfg.quality_gate, cfg.baseline.info(&samples));
    assert_eq!(result.status, GateStatus::Fail);
    assert_eq!(result.failing_metrics, vec!["coverage.lines".to_string()]);
    let tests = result.metrics.iter().find(|m| m.name == "tests.count").unwrap();
    assert_eq!(tests.status, GateStatus::Fail);
    assert!(!tests.is_blocking);
    assert!(result.blocks_build());
    assert_eq!(result.baseline_info.builds_considered, 3);

    let md = render_markdown_comment(&result);
    assert!(md.contains("Quality gate failed"));
    assert!(md.contains("tests.count (warning)"));

    let json = serde_json::to_value(&result)?;
    assert_eq!(json["mode"], "hard");
    assert_eq!(json["summary"]["failed"], 2);
    Ok(())
}

#[test]
fn first_run_has_no_baseline_and_is_inconclusive() -> anyhow::Result<()> {
    let cfg = parse_config(CONFIG)?;
    let store = SqliteStore::memory()?;
    let collected = parse_collected(
        r#"[{"name":"coverage.lines","value":75}]"#,
        &cfg.registry()?,
    )?;
    let samples = build_samples(
        &collected,
        &store,
        &BaselineWindow::default(),
        Utc::now(),
        None,
    )?;
    let result = evaluate_quality_gate(&samples, &cfg.quality_gate, cfg.baseline.info(&samples));
    assert_eq!(result.status, GateStatus::Unknown);
    assert_eq!(
        result.metrics[0].message.as_deref(),
        Some("baseline not available")
    );
    assert!(!result.blocks_build());
    assert!(store.list_builds(None)?.is_empty());
    Ok(())
}
