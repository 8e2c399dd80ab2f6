//! Persisted time-series store.
//!
//! Three relations: builds, metric definitions (unique by name) and metric values (one per
//! metric and build). [`MetricsStore`] is the contract the sample builder and report derivation
//! depend on; [`SqliteStore`] is the embedded implementation. Moving the database file between
//! CI runs (local disk, object storage) is the caller's transport concern.

pub mod schema;
pub mod store;

pub use store::{RecordedRun, SqliteStore};

use chrono::{DateTime, SecondsFormat, Utc};

use crate::errors::Result;
use crate::model::{
    BuildContext, BuildId, BuildRecord, MetricDefinition, MetricId, MetricSpec, MetricValue,
    MetricValueRecord, TimeSeriesData,
};

/// Baseline lookup for one metric.
#[derive(Debug, Clone)]
pub struct BaselineQuery<'a> {
    pub metric: &'a str,
    pub branch: &'a str,
    pub max_builds: u32,
    pub max_age_days: u32,
    /// Reference instant for the age window.
    pub as_of: DateTime<Utc>,
    /// Build whose value must never enter its own baseline.
    pub exclude_build: Option<BuildId>,
}

impl<'a> BaselineQuery<'a> {
    pub fn new(metric: &'a str, branch: &'a str, max_builds: u32, max_age_days: u32) -> Self {
        Self {
            metric,
            branch,
            max_builds,
            max_age_days,
            as_of: Utc::now(),
            exclude_build: None,
        }
    }

    pub fn as_of(mut self, as_of: DateTime<Utc>) -> Self {
        self.as_of = as_of;
        self
    }

    pub fn excluding(mut self, build: Option<BuildId>) -> Self {
        self.exclude_build = build;
        self
    }

    /// Oldest build timestamp still inside the window.
    pub fn cutoff(&self) -> DateTime<Utc> {
        self.as_of - chrono::Duration::days(i64::from(self.max_age_days))
    }
}

/// Query/insert contract of the metrics store.
pub trait MetricsStore {
    /// Insert a build context. Fails with a validation error when identifying fields are blank.
    fn record_build(&self, context: &BuildContext) -> Result<BuildId>;

    /// Find-or-create a definition by name. The stored definition wins: a differing unit or
    /// description is ignored, a differing type is a validation error.
    fn upsert_definition(&self, spec: &MetricSpec) -> Result<MetricDefinition>;

    /// Insert one value. The value variant must match the definition type.
    fn record_value(
        &self,
        metric_id: MetricId,
        build_id: BuildId,
        value: &MetricValue,
    ) -> Result<MetricValueRecord>;

    /// Up to `max_builds` numeric values of `metric` on `branch` inside the age window,
    /// **most recent first**. Unknown metrics yield an empty list.
    fn query_baseline(&self, query: &BaselineQuery<'_>) -> Result<Vec<f64>>;

    /// Full history of `metric`, ascending by build timestamp. Not-found error for unknown names.
    fn query_time_series(&self, metric: &str) -> Result<TimeSeriesData>;

    /// All definitions, ordered by name.
    fn list_definitions(&self) -> Result<Vec<MetricDefinition>>;

    /// Recorded builds, ascending by timestamp, optionally restricted to one branch.
    fn list_builds(&self, branch: Option<&str>) -> Result<Vec<BuildRecord>>;
}

pub(crate) fn encode_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

pub(crate) fn decode_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|t| t.with_timezone(&Utc))
}
