//! Quality-gate evaluation.
//!
//! Pure functions over already-built samples. Missing data is never an error here: a metric
//! without a current value, a baseline or a threshold is reported with status `unknown`.

pub mod comment;

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::baseline::BaselineInfo;
use crate::errors::{codes, Error, Result};
use crate::model::MetricSample;

pub use comment::render_markdown_comment;

/// Tolerance used by `no-regression` when none is configured (absolute units).
pub const DEFAULT_TOLERANCE: f64 = 0.5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ThresholdMode {
    Min,
    Max,
    NoRegression,
    DeltaMaxDrop,
}

impl ThresholdMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ThresholdMode::Min => "min",
            ThresholdMode::Max => "max",
            ThresholdMode::NoRegression => "no-regression",
            ThresholdMode::DeltaMaxDrop => "delta-max-drop",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Warning,
    #[default]
    Blocking,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, Hash)]
#[serde(rename_all = "lowercase")]
pub enum GateMode {
    Off,
    #[default]
    Soft,
    Hard,
}

impl GateMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            GateMode::Off => "off",
            GateMode::Soft => "soft",
            GateMode::Hard => "hard",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GateStatus {
    Pass,
    Fail,
    Unknown,
}

impl GateStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            GateStatus::Pass => "pass",
            GateStatus::Fail => "fail",
            GateStatus::Unknown => "unknown",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ThresholdConfig {
    pub metric: String,
    pub mode: ThresholdMode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tolerance: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_drop_percent: Option<f64>,
    #[serde(default)]
    pub severity: Severity,
}

impl ThresholdConfig {
    pub fn new(metric: impl Into<String>, mode: ThresholdMode) -> Self {
        Self {
            metric: metric.into(),
            mode,
            target: None,
            tolerance: None,
            max_drop_percent: None,
            severity: Severity::Blocking,
        }
    }

    pub fn with_target(mut self, target: f64) -> Self {
        self.target = Some(target);
        self
    }

    pub fn with_tolerance(mut self, tolerance: f64) -> Self {
        self.tolerance = Some(tolerance);
        self
    }

    pub fn with_max_drop_percent(mut self, percent: f64) -> Self {
        self.max_drop_percent = Some(percent);
        self
    }

    pub fn warning(mut self) -> Self {
        self.severity = Severity::Warning;
        self
    }

    /// Config-time checks. The evaluator itself tolerates incomplete thresholds (`unknown`).
    pub fn validate(&self) -> Result<()> {
        let field = |name: &str| format!("quality_gate.thresholds[{}].{}", self.metric, name);
        if self.metric.trim().is_empty() {
            return Err(Error::missing_field("quality_gate.thresholds[].metric"));
        }
        match self.mode {
            ThresholdMode::Min | ThresholdMode::Max => match self.target {
                Some(t) if t.is_finite() => {}
                _ => {
                    return Err(Error::invalid_field(
                        codes::INVALID_THRESHOLD,
                        field("target"),
                        format!("{} threshold needs a finite target", self.mode.as_str()),
                    ))
                }
            },
            ThresholdMode::NoRegression => {
                if self.tolerance.is_some_and(|t| !t.is_finite() || t < 0.0) {
                    return Err(Error::invalid_field(
                        codes::INVALID_THRESHOLD,
                        field("tolerance"),
                        "tolerance must be a non-negative number",
                    ));
                }
            }
            ThresholdMode::DeltaMaxDrop => match self.max_drop_percent {
                Some(p) if p.is_finite() && p >= 0.0 => {}
                _ => {
                    return Err(Error::invalid_field(
                        codes::INVALID_THRESHOLD,
                        field("max_drop_percent"),
                        "delta-max-drop threshold needs a non-negative max_drop_percent",
                    ))
                }
            },
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct QualityGateConfig {
    pub mode: GateMode,
    pub thresholds: Vec<ThresholdConfig>,
}

impl QualityGateConfig {
    pub fn validate(&self) -> Result<()> {
        let mut seen = HashSet::new();
        for t in &self.thresholds {
            t.validate()?;
            if !seen.insert(t.metric.as_str()) {
                return Err(Error::invalid_field(
                    codes::INVALID_THRESHOLD,
                    "quality_gate.thresholds",
                    format!("metric `{}` has more than one threshold", t.metric),
                ));
            }
        }
        Ok(())
    }
}

/// Verdict of a single threshold check.
#[derive(Debug, Clone, PartialEq)]
pub struct ThresholdOutcome {
    pub status: GateStatus,
    pub message: String,
}

impl ThresholdOutcome {
    fn new(status: GateStatus, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricEvaluationResult {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
    pub status: GateStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub threshold_mode: Option<ThresholdMode>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub baseline_median: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pull_request_value: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub absolute_delta: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub relative_delta_percent: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub is_blocking: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GateSummary {
    pub total: usize,
    pub evaluated: usize,
    pub passed: usize,
    pub failed: usize,
    pub unknown: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityGateResult {
    pub status: GateStatus,
    pub mode: GateMode,
    pub metrics: Vec<MetricEvaluationResult>,
    pub failing_metrics: Vec<String>,
    pub summary: GateSummary,
    pub baseline_info: BaselineInfo,
}

impl QualityGateResult {
    /// Only a hard gate with a failing verdict fails the CI job.
    pub fn blocks_build(&self) -> bool {
        self.mode == GateMode::Hard && self.status == GateStatus::Fail
    }
}

/// Median of `values`; `None` for an empty slice.
pub fn median(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        Some((sorted[mid - 1] + sorted[mid]) / 2.0)
    } else {
        Some(sorted[mid])
    }
}

/// Apply one threshold to a current value and its baseline median.
pub fn evaluate_threshold(threshold: &ThresholdConfig, current: f64, median: f64) -> ThresholdOutcome {
    match threshold.mode {
        ThresholdMode::Min => match threshold.target {
            None => ThresholdOutcome::new(GateStatus::Unknown, "target not specified"),
            Some(target) if current >= target => ThresholdOutcome::new(
                GateStatus::Pass,
                format!("{} meets minimum {}", fmt_value(current), fmt_value(target)),
            ),
            Some(target) => ThresholdOutcome::new(
                GateStatus::Fail,
                format!("{} is below minimum {}", fmt_value(current), fmt_value(target)),
            ),
        },
        ThresholdMode::Max => match threshold.target {
            None => ThresholdOutcome::new(GateStatus::Unknown, "target not specified"),
            Some(target) if current <= target => ThresholdOutcome::new(
                GateStatus::Pass,
                format!("{} within maximum {}", fmt_value(current), fmt_value(target)),
            ),
            Some(target) => ThresholdOutcome::new(
                GateStatus::Fail,
                format!("{} exceeds maximum {}", fmt_value(current), fmt_value(target)),
            ),
        },
        ThresholdMode::NoRegression => {
            let tolerance = threshold.tolerance.unwrap_or(DEFAULT_TOLERANCE);
            let floor = median - tolerance;
            if current >= floor {
                ThresholdOutcome::new(
                    GateStatus::Pass,
                    format!(
                        "no regression against baseline {} (tolerance {})",
                        fmt_value(median),
                        fmt_value(tolerance)
                    ),
                )
            } else {
                ThresholdOutcome::new(
                    GateStatus::Fail,
                    format!(
                        "regressed to {} from baseline {} (tolerance {})",
                        fmt_value(current),
                        fmt_value(median),
                        fmt_value(tolerance)
                    ),
                )
            }
        }
        ThresholdMode::DeltaMaxDrop => {
            let Some(limit) = threshold.max_drop_percent else {
                return ThresholdOutcome::new(GateStatus::Unknown, "max drop percent not specified");
            };
            if median == 0.0 {
                return ThresholdOutcome::new(
                    GateStatus::Unknown,
                    "percentage drop undefined for a zero baseline",
                );
            }
            if median < 0.0 {
                return ThresholdOutcome::new(
                    GateStatus::Unknown,
                    "percentage drop undefined for a negative baseline",
                );
            }
            let drop = (median - current) / median * 100.0;
            if drop <= limit {
                ThresholdOutcome::new(
                    GateStatus::Pass,
                    format!("drop {:.2}% within limit {:.2}%", drop.max(0.0), limit),
                )
            } else {
                ThresholdOutcome::new(
                    GateStatus::Fail,
                    format!("dropped {:.2}% (limit {:.2}%)", drop, limit),
                )
            }
        }
    }
}

/// Evaluate one sample against its (optional) threshold.
pub fn evaluate_sample(
    sample: &MetricSample,
    threshold: Option<&ThresholdConfig>,
) -> MetricEvaluationResult {
    let baseline_median = median(&sample.baseline_values);
    let mut result = MetricEvaluationResult {
        name: sample.name.clone(),
        unit: sample.unit.clone(),
        status: GateStatus::Unknown,
        threshold_mode: threshold.map(|t| t.mode),
        baseline_median,
        pull_request_value: sample.pull_request_value,
        absolute_delta: None,
        relative_delta_percent: None,
        message: None,
        is_blocking: threshold.is_some_and(|t| t.severity != Severity::Warning),
    };

    let (current, median) = match (sample.pull_request_value, baseline_median) {
        (None, _) => {
            result.message = Some("value not available".into());
            return result;
        }
        (_, None) => {
            result.message = Some("baseline not available".into());
            return result;
        }
        (Some(current), Some(median)) => (current, median),
    };

    let delta = current - median;
    result.absolute_delta = Some(delta);
    if median != 0.0 {
        result.relative_delta_percent = Some(delta / median * 100.0);
    }

    match threshold {
        None => result.message = Some("no threshold configured".into()),
        Some(t) => {
            let outcome = evaluate_threshold(t, current, median);
            result.status = outcome.status;
            result.message = Some(outcome.message);
        }
    }
    result
}

/// Evaluate all samples and derive the aggregate verdict.
pub fn evaluate_quality_gate(
    samples: &[MetricSample],
    config: &QualityGateConfig,
    baseline_info: BaselineInfo,
) -> QualityGateResult {
    if config.mode == GateMode::Off {
        let metrics: Vec<_> = samples
            .iter()
            .map(|s| MetricEvaluationResult {
                name: s.name.clone(),
                unit: s.unit.clone(),
                status: GateStatus::Unknown,
                threshold_mode: None,
                baseline_median: median(&s.baseline_values),
                pull_request_value: s.pull_request_value,
                absolute_delta: None,
                relative_delta_percent: None,
                message: Some("quality gate disabled".into()),
                is_blocking: false,
            })
            .collect();
        return QualityGateResult {
            status: GateStatus::Unknown,
            mode: GateMode::Off,
            summary: GateSummary {
                total: metrics.len(),
                unknown: metrics.len(),
                ..GateSummary::default()
            },
            metrics,
            failing_metrics: Vec::new(),
            baseline_info,
        };
    }

    let thresholds: HashMap<&str, &ThresholdConfig> = config
        .thresholds
        .iter()
        .map(|t| (t.metric.as_str(), t))
        .collect();
    for t in &config.thresholds {
        if !samples.iter().any(|s| s.name == t.metric) {
            tracing::debug!(metric = %t.metric, "threshold has no matching sample");
        }
    }

    let metrics: Vec<_> = samples
        .iter()
        .map(|s| evaluate_sample(s, thresholds.get(s.name.as_str()).copied()))
        .collect();

    let mut summary = GateSummary {
        total: metrics.len(),
        ..GateSummary::default()
    };
    for m in &metrics {
        match m.status {
            GateStatus::Pass => summary.passed += 1,
            GateStatus::Fail => summary.failed += 1,
            GateStatus::Unknown => summary.unknown += 1,
        }
        if m.threshold_mode.is_some() && m.status != GateStatus::Unknown {
            summary.evaluated += 1;
        }
    }

    let failing_metrics: Vec<String> = metrics
        .iter()
        .filter(|m| m.is_blocking && m.status == GateStatus::Fail)
        .map(|m| m.name.clone())
        .collect();

    let status = if config.thresholds.is_empty() {
        GateStatus::Unknown
    } else if !failing_metrics.is_empty() {
        GateStatus::Fail
    } else if summary.evaluated > 0 {
        GateStatus::Pass
    } else {
        GateStatus::Unknown
    };

    QualityGateResult {
        status,
        mode: config.mode,
        metrics,
        failing_metrics,
        summary,
        baseline_info,
    }
}

/// Compact human formatting: at most two decimals, trailing zeros trimmed.
pub fn fmt_value(v: f64) -> String {
    let s = format!("{:.2}", v);
    let s = s.trim_end_matches('0').trim_end_matches('.');
    if s == "-0" {
        "0".to_string()
    } else {
        s.to_string()
    }
}
