//! Data model shared by the store, sample builder, gate evaluator and report derivation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::{codes, Error, Result};

pub type BuildId = i64;
pub type MetricId = i64;

/// Identifying metadata of one CI run. Immutable once recorded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuildContext {
    pub commit_sha: String,
    pub branch: String,
    pub run_id: String,
    pub run_number: u64,
    pub timestamp: DateTime<Utc>,
}

impl BuildContext {
    pub fn validate(&self) -> Result<()> {
        for (field, value) in [
            ("commit_sha", &self.commit_sha),
            ("branch", &self.branch),
            ("run_id", &self.run_id),
        ] {
            if value.trim().is_empty() {
                return Err(Error::missing_field(field));
            }
        }
        Ok(())
    }
}

/// A recorded build together with its store id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuildRecord {
    pub id: BuildId,
    #[serde(flatten)]
    pub context: BuildContext,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MetricType {
    Numeric,
    Label,
}

impl MetricType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MetricType::Numeric => "numeric",
            MetricType::Label => "label",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "numeric" => Some(MetricType::Numeric),
            "label" => Some(MetricType::Label),
            _ => None,
        }
    }
}

impl std::fmt::Display for MetricType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a collector (or the registry) says about a metric, before it has a store id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricSpec {
    pub name: String,
    #[serde(rename = "type")]
    pub metric_type: MetricType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl MetricSpec {
    pub fn numeric(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            metric_type: MetricType::Numeric,
            unit: None,
            description: None,
        }
    }

    pub fn label(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            metric_type: MetricType::Label,
            unit: None,
            description: None,
        }
    }

    pub fn with_unit(mut self, unit: impl Into<String>) -> Self {
        self.unit = Some(unit.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

/// A stored metric definition. `name` is unique across the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricDefinition {
    pub id: MetricId,
    pub name: String,
    #[serde(rename = "type")]
    pub metric_type: MetricType,
    pub unit: Option<String>,
    pub description: Option<String>,
}

/// One measurement. The variant must agree with the definition's [`MetricType`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "lowercase")]
pub enum MetricValue {
    Numeric(f64),
    Label(String),
}

impl MetricValue {
    pub fn metric_type(&self) -> MetricType {
        match self {
            MetricValue::Numeric(_) => MetricType::Numeric,
            MetricValue::Label(_) => MetricType::Label,
        }
    }

    pub fn as_numeric(&self) -> Option<f64> {
        match self {
            MetricValue::Numeric(v) => Some(*v),
            MetricValue::Label(_) => None,
        }
    }

    pub fn as_label(&self) -> Option<&str> {
        match self {
            MetricValue::Numeric(_) => None,
            MetricValue::Label(s) => Some(s),
        }
    }

    /// Checks the value is storable: finite numbers, non-blank labels.
    pub fn validate(&self, metric: &str) -> Result<()> {
        match self {
            MetricValue::Numeric(v) if !v.is_finite() => Err(Error::invalid_field(
                codes::NON_FINITE_VALUE,
                metric,
                format!("metric `{}` has non-finite value {}", metric, v),
            )),
            MetricValue::Label(s) if s.trim().is_empty() => Err(Error::invalid_field(
                codes::MISSING_FIELD,
                metric,
                format!("metric `{}` has an empty label", metric),
            )),
            _ => Ok(()),
        }
    }
}

impl std::fmt::Display for MetricValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MetricValue::Numeric(v) => write!(f, "{}", v),
            MetricValue::Label(s) => f.write_str(s),
        }
    }
}

/// A stored measurement row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricValueRecord {
    pub metric_id: MetricId,
    pub build_id: BuildId,
    pub value: MetricValue,
    pub collected_at: DateTime<Utc>,
}

/// A collector's output for the current run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectedMetric {
    pub definition: MetricSpec,
    pub value: MetricValue,
}

impl CollectedMetric {
    pub fn numeric(name: impl Into<String>, value: f64) -> Self {
        Self {
            definition: MetricSpec::numeric(name),
            value: MetricValue::Numeric(value),
        }
    }

    pub fn label(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            definition: MetricSpec::label(name),
            value: MetricValue::Label(value.into()),
        }
    }
}

/// Comparison-ready view of one numeric metric: current value plus its baseline window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricSample {
    pub name: String,
    pub unit: Option<String>,
    #[serde(rename = "type")]
    pub metric_type: MetricType,
    /// Most recent first.
    pub baseline_values: Vec<f64>,
    pub pull_request_value: Option<f64>,
}

/// One point of a metric's history. `value == None` marks a build that did not record the metric.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataPoint {
    pub timestamp: DateTime<Utc>,
    pub value: Option<MetricValue>,
    pub commit_sha: String,
    pub branch: String,
    pub run_number: u64,
}

impl DataPoint {
    pub fn numeric(&self) -> Option<f64> {
        self.value.as_ref().and_then(MetricValue::as_numeric)
    }

    pub fn label(&self) -> Option<&str> {
        self.value.as_ref().and_then(MetricValue::as_label)
    }
}

/// History of one metric, ascending by timestamp.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeSeriesData {
    pub metric_name: String,
    pub metric_type: MetricType,
    pub unit: Option<String>,
    pub description: Option<String>,
    pub data_points: Vec<DataPoint>,
}

impl TimeSeriesData {
    pub fn empty(definition: &MetricDefinition) -> Self {
        Self {
            metric_name: definition.name.clone(),
            metric_type: definition.metric_type,
            unit: definition.unit.clone(),
            description: definition.description.clone(),
            data_points: Vec::new(),
        }
    }
}
