//! Trend report: summary statistics and charts per stored metric, rendered into a single
//! self-contained HTML document.

pub mod chart;
pub mod html;
pub mod stats;

use std::collections::HashMap;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::errors::{Error, Result};
use crate::model::{BuildRecord, DataPoint, TimeSeriesData};
use crate::storage::MetricsStore;

pub use chart::{build_chart, ChartConfig, ChartKind};
pub use html::render_html;
pub use stats::{summarize, SummaryStats, TrendDirection};

/// Series with fewer recorded values than this get a "limited data" notice.
pub const SPARSE_THRESHOLD: usize = 10;

/// Points that carry a value; gap slots from [`align_to_builds`] do not count.
pub fn recorded_points(series: &TimeSeriesData) -> usize {
    series
        .data_points
        .iter()
        .filter(|p| p.value.is_some())
        .count()
}

pub fn is_sparse(series: &TimeSeriesData) -> bool {
    recorded_points(series) < SPARSE_THRESHOLD
}

#[derive(Debug, Clone)]
pub struct ReportOptions {
    pub repository: Option<String>,
    /// Restrict the report to one branch; all branches when `None`.
    pub branch: Option<String>,
    pub generated_at: DateTime<Utc>,
    /// Align every series to the build list so skipped builds show as gaps.
    pub fill_gaps: bool,
}

impl Default for ReportOptions {
    fn default() -> Self {
        Self {
            repository: None,
            branch: None,
            generated_at: Utc::now(),
            fill_gaps: true,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct MetricReport {
    pub series: TimeSeriesData,
    pub stats: SummaryStats,
    pub chart: ChartConfig,
    pub sparse: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReportData {
    pub repository: Option<String>,
    pub branch: Option<String>,
    pub generated_at: DateTime<Utc>,
    pub build_count: usize,
    pub first_build: Option<DateTime<Utc>>,
    pub last_build: Option<DateTime<Utc>>,
    pub metrics: Vec<MetricReport>,
}

type BuildKey<'a> = (DateTime<Utc>, u64, &'a str);

/// Re-slot `series` onto `builds`: one point per build, `value: None` where the build did not
/// record the metric. Points whose build is outside `builds` are dropped.
pub fn align_to_builds(series: &TimeSeriesData, builds: &[BuildRecord]) -> TimeSeriesData {
    let recorded: HashMap<BuildKey<'_>, &DataPoint> = series
        .data_points
        .iter()
        .map(|p| ((p.timestamp, p.run_number, p.commit_sha.as_str()), p))
        .collect();

    let data_points = builds
        .iter()
        .map(|b| {
            let ctx = &b.context;
            let key = (ctx.timestamp, ctx.run_number, ctx.commit_sha.as_str());
            match recorded.get(&key) {
                Some(p) => (*p).clone(),
                None => DataPoint {
                    timestamp: ctx.timestamp,
                    value: None,
                    commit_sha: ctx.commit_sha.clone(),
                    branch: ctx.branch.clone(),
                    run_number: ctx.run_number,
                },
            }
        })
        .collect();

    TimeSeriesData {
        data_points,
        ..series.clone()
    }
}

/// Derive everything the renderer needs from the store.
pub fn build_report_data<S>(store: &S, options: &ReportOptions) -> Result<ReportData>
where
    S: MetricsStore + ?Sized,
{
    let builds = store.list_builds(options.branch.as_deref())?;
    let definitions = store.list_definitions()?;
    tracing::debug!(
        builds = builds.len(),
        metrics = definitions.len(),
        branch = options.branch.as_deref().unwrap_or("*"),
        "deriving report"
    );

    let mut metrics = Vec::with_capacity(definitions.len());
    for definition in &definitions {
        let mut series = store.query_time_series(&definition.name)?;
        if let Some(branch) = options.branch.as_deref() {
            series.data_points.retain(|p| p.branch == branch);
        }
        if options.fill_gaps {
            series = align_to_builds(&series, &builds);
        }
        if series.data_points.iter().all(|p| p.value.is_none()) {
            continue;
        }
        metrics.push(MetricReport {
            stats: summarize(&series),
            chart: build_chart(&series),
            sparse: is_sparse(&series),
            series,
        });
    }

    Ok(ReportData {
        repository: options.repository.clone(),
        branch: options.branch.clone(),
        generated_at: options.generated_at,
        build_count: builds.len(),
        first_build: builds.first().map(|b| b.context.timestamp),
        last_build: builds.last().map(|b| b.context.timestamp),
        metrics,
    })
}

/// Render the full HTML report for everything in `store`.
pub fn build_report<S>(store: &S, options: &ReportOptions) -> Result<String>
where
    S: MetricsStore + ?Sized,
{
    let data = build_report_data(store, options)?;
    render_html(&data)
}

/// Write a rendered report, creating parent directories as needed.
pub fn write_report(path: &Path, html: &str) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| {
            Error::report(format!("failed to create {}: {}", parent.display(), e))
        })?;
    }
    std::fs::write(path, html)
        .map_err(|e| Error::report(format!("failed to write {}: {}", path.display(), e)))?;
    tracing::info!(path = %path.display(), bytes = html.len(), "wrote report");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{BuildContext, CollectedMetric, MetricType, MetricValue};
    use crate::storage::SqliteStore;
    use chrono::TimeZone;

    fn ctx(branch: &str, day: u32) -> BuildContext {
        BuildContext {
            commit_sha: format!("sha{}", day),
            branch: branch.into(),
            run_id: format!("run{}", day),
            run_number: u64::from(day),
            timestamp: Utc.with_ymd_and_hms(2024, 4, day, 10, 0, 0).unwrap(),
        }
    }

    fn seeded() -> SqliteStore {
        let store = SqliteStore::memory().unwrap();
        store
            .record_run(&ctx("main", 1), &[CollectedMetric::numeric("cov", 80.0)])
            .unwrap();
        store
            .record_run(&ctx("main", 2), &[CollectedMetric::label("build.status", "success")])
            .unwrap();
        store
            .record_run(&ctx("feature", 3), &[CollectedMetric::numeric("cov", 10.0)])
            .unwrap();
        store
            .record_run(&ctx("main", 4), &[CollectedMetric::numeric("cov", 84.0)])
            .unwrap();
        store
    }

    fn options(branch: Option<&str>, fill_gaps: bool) -> ReportOptions {
        ReportOptions {
            repository: Some("acme/widgets".into()),
            branch: branch.map(String::from),
            generated_at: Utc.with_ymd_and_hms(2024, 4, 30, 0, 0, 0).unwrap(),
            fill_gaps,
        }
    }

    #[test]
    fn gaps_are_inserted_for_builds_without_the_metric() {
        let data = build_report_data(&seeded(), &options(Some("main"), true)).unwrap();
        assert_eq!(data.build_count, 3);
        let cov = data.metrics.iter().find(|m| m.series.metric_name == "cov").unwrap();
        let values: Vec<_> = cov.series.data_points.iter().map(|p| p.numeric()).collect();
        assert_eq!(values, vec![Some(80.0), None, Some(84.0)]);
        assert_eq!(cov.chart.dataset.data, vec![Some(80.0), None, Some(84.0)]);
        assert!(cov.sparse);
        assert!((cov.stats.trend_percent.unwrap() - 5.0).abs() < 1e-9);
    }

    #[test]
    fn without_gap_filling_only_recorded_points_remain() {
        let data = build_report_data(&seeded(), &options(None, false)).unwrap();
        let cov = data.metrics.iter().find(|m| m.series.metric_name == "cov").unwrap();
        assert_eq!(cov.series.data_points.len(), 3);
        assert_eq!(data.build_count, 4);
    }

    #[test]
    fn metrics_absent_from_the_branch_are_omitted() {
        let store = seeded();
        store
            .record_run(&ctx("feature", 5), &[CollectedMetric::numeric("only.feature", 1.0)])
            .unwrap();
        let data = build_report_data(&store, &options(Some("main"), true)).unwrap();
        assert!(data.metrics.iter().all(|m| m.series.metric_name != "only.feature"));
        let status = data
            .metrics
            .iter()
            .find(|m| m.series.metric_name == "build.status")
            .unwrap();
        assert_eq!(status.series.metric_type, MetricType::Label);
        assert_eq!(status.chart.kind, ChartKind::Bar);
    }

    #[test]
    fn alignment_preserves_recorded_values() {
        let builds = vec![BuildRecord {
            id: 1,
            context: ctx("main", 1),
        }];
        let series = TimeSeriesData {
            metric_name: "cov".into(),
            metric_type: MetricType::Numeric,
            unit: None,
            description: None,
            data_points: vec![DataPoint {
                timestamp: ctx("main", 1).timestamp,
                value: Some(MetricValue::Numeric(1.5)),
                commit_sha: "sha1".into(),
                branch: "main".into(),
                run_number: 1,
            }],
        };
        let aligned = align_to_builds(&series, &builds);
        assert_eq!(aligned.data_points, series.data_points);
    }

    #[test]
    fn sparse_boundary() {
        let mut series = TimeSeriesData {
            metric_name: "m".into(),
            metric_type: MetricType::Numeric,
            unit: None,
            description: None,
            data_points: Vec::new(),
        };
        for day in 1..=9 {
            series.data_points.push(DataPoint {
                timestamp: ctx("main", day).timestamp,
                value: Some(MetricValue::Numeric(1.0)),
                commit_sha: "s".into(),
                branch: "main".into(),
                run_number: u64::from(day),
            });
        }
        assert!(is_sparse(&series));
        series.data_points.push(series.data_points[0].clone());
        assert!(!is_sparse(&series));
    }

    #[test]
    fn gap_slots_do_not_count_towards_sparseness() {
        let store = SqliteStore::memory().unwrap();
        for day in 1..=12 {
            let mut collected = vec![CollectedMetric::numeric("steady", f64::from(day))];
            if day == 3 || day == 9 {
                collected.push(CollectedMetric::numeric("rare", 1.0));
            }
            store.record_run(&ctx("main", day), &collected).unwrap();
        }

        let data = build_report_data(&store, &options(Some("main"), true)).unwrap();
        let rare = data.metrics.iter().find(|m| m.series.metric_name == "rare").unwrap();
        assert_eq!(rare.series.data_points.len(), 12);
        assert_eq!(recorded_points(&rare.series), 2);
        assert!(rare.sparse);
        let steady = data.metrics.iter().find(|m| m.series.metric_name == "steady").unwrap();
        assert!(!steady.sparse);

        let html = render_html(&data).unwrap();
        assert!(html.contains("limited data available (2 builds)"));
        assert!(!html.contains("limited data available (12 builds)"));
    }

    #[test]
    fn write_report_creates_parent_directories() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/out/report.html");
        write_report(&path, "<!DOCTYPE html>").unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "<!DOCTYPE html>");
    }
}
