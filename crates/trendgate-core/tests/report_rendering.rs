use chrono::{Duration, TimeZone, Utc};
use trendgate_core::model::{BuildContext, CollectedMetric, MetricSpec, MetricValue};
use trendgate_core::report::{build_report, build_report_data, ReportOptions, TrendDirection};
use trendgate_core::storage::SqliteStore;

fn ctx(branch: &str, run: u64) -> BuildContext {
    BuildContext {
        commit_sha: format!("c0ffee{:02}", run),
        branch: branch.into(),
        run_id: run.to_string(),
        run_number: run,
        timestamp: Utc.with_ymd_and_hms(2024, 5, 1, 9, 0, 0).unwrap() + Duration::days(run as i64),
    }
}

fn options() -> ReportOptions {
    ReportOptions {
        repository: Some("acme/widgets".into()),
        branch: None,
        generated_at: Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap(),
        fill_gaps: true,
    }
}

#[test]
fn hostile_strings_are_escaped_everywhere() -> anyhow::Result<()> {
    let store = SqliteStore::memory()?;
    let hostile = r#"<script>alert("x")</script>"#;
    let mut c = ctx("main", 1);
    c.branch = hostile.into();
    c.commit_sha = hostile.into();
    store.record_run(
        &c,
        &[
            CollectedMetric {
                definition: MetricSpec::numeric(hostile)
                    .with_unit(hostile)
                    .with_description(hostile),
                value: MetricValue::Numeric(1.0),
            },
            CollectedMetric::label("build.status", hostile),
        ],
    )?;

    let mut opts = options();
    opts.repository = Some(hostile.into());
    let html = build_report(&store, &opts)?;

    assert!(!html.contains(hostile));
    assert!(html.contains("&lt;script&gt;alert(&quot;x&quot;)&lt;/script&gt;"));
    assert_eq!(html.matches("<script").count(), 1);
    Ok(())
}

#[test]
fn trend_statistics_follow_recorded_history() -> anyhow::Result<()> {
    let store = SqliteStore::memory()?;
    for (run, value) in [(1u64, 85.0), (2, 90.0), (3, 88.0)] {
        store.record_run(&ctx("main", run), &[CollectedMetric::numeric("coverage.lines", value)])?;
    }
    let data = build_report_data(&store, &options())?;
    let stats = &data.metrics[0].stats;
    assert_eq!(stats.trend_direction, Some(TrendDirection::Up));
    assert!((stats.trend_percent.unwrap() - 3.53).abs() < 0.01);
    assert_eq!(stats.latest, Some(88.0));
    assert!(data.metrics[0].sparse);

    let html = build_report(&store, &options())?;
    assert!(html.contains("limited data available (3 builds)"));
    assert!(html.contains("↑ +3.53%"));
    Ok(())
}

#[test]
fn ten_builds_are_not_sparse() -> anyhow::Result<()> {
    let store = SqliteStore::memory()?;
    for run in 1..=10u64 {
        store.record_run(&ctx("main", run), &[CollectedMetric::numeric("m", run as f64)])?;
    }
    let data = build_report_data(&store, &options())?;
    assert!(!data.metrics[0].sparse);
    let html = build_report(&store, &options())?;
    assert!(!html.contains("limited data available"));
    Ok(())
}

#[test]
fn empty_store_renders_no_data_notice() -> anyhow::Result<()> {
    let store = SqliteStore::memory()?;
    let html = build_report(&store, &options())?;
    assert!(html.contains("No data"));
    assert!(html.contains("<dt>Builds</dt><dd>0</dd>"));
    Ok(())
}
