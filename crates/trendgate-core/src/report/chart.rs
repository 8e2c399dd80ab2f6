//! Chart-ready structures derived from a time series.
//!
//! The shape follows the usual charting-library layout (type, labels, one dataset, scales) so the
//! embedded JSON can be fed to a client-side renderer unchanged. The HTML report draws its own
//! SVG from the same structure.

use std::collections::BTreeMap;

use chrono::SecondsFormat;
use serde::{Deserialize, Serialize};

use crate::model::{MetricType, TimeSeriesData};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChartKind {
    Line,
    Bar,
}

/// Provenance of one line-chart slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PointMeta {
    pub commit_sha: String,
    pub run_number: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dataset {
    pub label: String,
    /// One slot per label; `None` is a gap.
    pub data: Vec<Option<f64>>,
    pub span_gaps: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Axis {
    #[serde(rename = "type")]
    pub scale: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time_unit: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub step_size: Option<f64>,
    pub begin_at_zero: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scales {
    pub x: Axis,
    pub y: Axis,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChartConfig {
    #[serde(rename = "type")]
    pub kind: ChartKind,
    /// RFC 3339 timestamps for line charts, distinct label values for bar charts.
    pub labels: Vec<String>,
    pub dataset: Dataset,
    /// Line charts only: index-aligned with `labels`, `None` for gap slots.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub meta: Vec<Option<PointMeta>>,
    pub scales: Scales,
}

fn axis_title(series: &TimeSeriesData) -> String {
    match series.unit.as_deref().filter(|u| !u.is_empty()) {
        Some(unit) => format!("{} ({})", series.metric_name, unit),
        None => series.metric_name.clone(),
    }
}

pub fn build_chart(series: &TimeSeriesData) -> ChartConfig {
    match series.metric_type {
        MetricType::Numeric => line_chart(series),
        MetricType::Label => bar_chart(series),
    }
}

fn line_chart(series: &TimeSeriesData) -> ChartConfig {
    let mut labels = Vec::with_capacity(series.data_points.len());
    let mut data = Vec::with_capacity(series.data_points.len());
    let mut meta = Vec::with_capacity(series.data_points.len());

    for point in &series.data_points {
        labels.push(point.timestamp.to_rfc3339_opts(SecondsFormat::Secs, true));
        let value = point.numeric().filter(|v| v.is_finite());
        data.push(value);
        meta.push(value.map(|_| PointMeta {
            commit_sha: point.commit_sha.clone(),
            run_number: point.run_number,
        }));
    }

    ChartConfig {
        kind: ChartKind::Line,
        labels,
        dataset: Dataset {
            label: series.metric_name.clone(),
            data,
            span_gaps: false,
        },
        meta,
        scales: Scales {
            x: Axis {
                scale: "time".into(),
                time_unit: Some("day".into()),
                ..Axis::default()
            },
            y: Axis {
                scale: "linear".into(),
                title: Some(axis_title(series)),
                ..Axis::default()
            },
        },
    }
}

fn bar_chart(series: &TimeSeriesData) -> ChartConfig {
    let mut counts: BTreeMap<&str, u64> = BTreeMap::new();
    for label in series.data_points.iter().filter_map(|p| p.label()) {
        *counts.entry(label).or_default() += 1;
    }

    ChartConfig {
        kind: ChartKind::Bar,
        labels: counts.keys().map(|k| k.to_string()).collect(),
        dataset: Dataset {
            label: series.metric_name.clone(),
            data: counts.values().map(|&c| Some(c as f64)).collect(),
            span_gaps: false,
        },
        meta: Vec::new(),
        scales: Scales {
            x: Axis {
                scale: "category".into(),
                ..Axis::default()
            },
            y: Axis {
                scale: "linear".into(),
                title: Some("occurrences".into()),
                step_size: Some(1.0),
                begin_at_zero: true,
                ..Axis::default()
            },
        },
    }
}
