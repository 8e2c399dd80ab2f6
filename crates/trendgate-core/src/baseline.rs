//! Sample builder: joins the current run's collected values with their historical baseline.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::{codes, Error, Result};
use crate::model::{BuildId, CollectedMetric, MetricSample, MetricType};
use crate::storage::{BaselineQuery, MetricsStore};

pub const DEFAULT_REFERENCE_BRANCH: &str = "main";
pub const DEFAULT_MAX_BUILDS: u32 = 20;
pub const DEFAULT_MAX_AGE_DAYS: u32 = 90;

/// Which history counts as the baseline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BaselineWindow {
    pub reference_branch: String,
    pub max_builds: u32,
    pub max_age_days: u32,
}

impl Default for BaselineWindow {
    fn default() -> Self {
        Self {
            reference_branch: DEFAULT_REFERENCE_BRANCH.to_string(),
            max_builds: DEFAULT_MAX_BUILDS,
            max_age_days: DEFAULT_MAX_AGE_DAYS,
        }
    }
}

impl BaselineWindow {
    pub fn validate(&self) -> Result<()> {
        if self.reference_branch.trim().is_empty() {
            return Err(Error::missing_field("baseline.reference_branch"));
        }
        if self.max_builds == 0 {
            return Err(Error::invalid_field(
                codes::INVALID_WINDOW,
                "baseline.max_builds",
                "max_builds must be at least 1",
            ));
        }
        if self.max_age_days == 0 {
            return Err(Error::invalid_field(
                codes::INVALID_WINDOW,
                "baseline.max_age_days",
                "max_age_days must be at least 1",
            ));
        }
        Ok(())
    }

    pub fn info(&self, samples: &[MetricSample]) -> BaselineInfo {
        BaselineInfo {
            reference_branch: self.reference_branch.clone(),
            builds_considered: builds_considered(samples),
            max_builds: self.max_builds,
            max_age_days: self.max_age_days,
        }
    }
}

/// Baseline provenance reported alongside a gate result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BaselineInfo {
    pub reference_branch: String,
    pub builds_considered: usize,
    pub max_builds: u32,
    pub max_age_days: u32,
}

/// Build one sample per numeric collected metric.
///
/// Label metrics are skipped. A metric without history still yields a sample with an empty
/// baseline so the evaluator can report "baseline not available". `current_build` is excluded
/// from every baseline, so recording the run before gating it cannot leak its own value in.
pub fn build_samples<S>(
    collected: &[CollectedMetric],
    store: &S,
    window: &BaselineWindow,
    as_of: DateTime<Utc>,
    current_build: Option<BuildId>,
) -> Result<Vec<MetricSample>>
where
    S: MetricsStore + ?Sized,
{
    let mut seen = HashSet::new();
    let mut samples = Vec::new();

    for metric in collected {
        let name = metric.definition.name.as_str();
        if !seen.insert(name) {
            return Err(Error::invalid_field(
                codes::DUPLICATE_METRIC,
                name,
                format!("metric `{}` was collected twice for one run", name),
            ));
        }
        if metric.definition.metric_type != MetricType::Numeric {
            continue;
        }

        let pull_request_value = match metric.value.as_numeric() {
            Some(v) if v.is_finite() => Some(v),
            other => {
                tracing::warn!(metric = name, value = ?other, "no usable current value");
                None
            }
        };

        let query = BaselineQuery::new(
            name,
            &window.reference_branch,
            window.max_builds,
            window.max_age_days,
        )
        .as_of(as_of)
        .excluding(current_build);
        let baseline_values = store.query_baseline(&query)?;

        samples.push(MetricSample {
            name: name.to_string(),
            unit: metric.definition.unit.clone(),
            metric_type: MetricType::Numeric,
            baseline_values,
            pull_request_value,
        });
    }

    Ok(samples)
}

/// Largest baseline among the samples; reporting only, never used for gating.
pub fn builds_considered(samples: &[MetricSample]) -> usize {
    samples
        .iter()
        .map(|s| s.baseline_values.len())
        .max()
        .unwrap_or(0)
}
