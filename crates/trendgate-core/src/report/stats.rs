use serde::{Deserialize, Serialize};

use crate::model::{MetricType, TimeSeriesData};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrendDirection {
    Up,
    Down,
    Stable,
}

impl TrendDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            TrendDirection::Up => "up",
            TrendDirection::Down => "down",
            TrendDirection::Stable => "stable",
        }
    }

    fn arrow(&self) -> &'static str {
        match self {
            TrendDirection::Up => "↑",
            TrendDirection::Down => "↓",
            TrendDirection::Stable => "→",
        }
    }
}

/// Headline numbers for one series. Every field is `None` for label series and for series
/// without a single numeric value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SummaryStats {
    pub latest: Option<f64>,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub average: Option<f64>,
    pub trend_direction: Option<TrendDirection>,
    pub trend_percent: Option<f64>,
}

impl SummaryStats {
    /// "↑ 3.53%" style label, or `None` when the trend is undetermined.
    pub fn trend_label(&self) -> Option<String> {
        let dir = self.trend_direction?;
        let pct = self.trend_percent?;
        Some(format!("{} {:+.2}%", dir.arrow(), pct))
    }
}

pub fn summarize(series: &TimeSeriesData) -> SummaryStats {
    if series.metric_type != MetricType::Numeric {
        return SummaryStats::default();
    }
    let values: Vec<f64> = series
        .data_points
        .iter()
        .filter_map(|p| p.numeric())
        .filter(|v| v.is_finite())
        .collect();
    let (Some(&first), Some(&last)) = (values.first(), values.last()) else {
        return SummaryStats::default();
    };

    let min = values.iter().copied().fold(f64::INFINITY, f64::min);
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let average = values.iter().sum::<f64>() / values.len() as f64;

    let trend_percent = if values.len() >= 2 && first != 0.0 {
        Some((last - first) / first * 100.0)
    } else {
        None
    };
    let trend_direction = trend_percent.map(|p| {
        if p > 0.0 {
            TrendDirection::Up
        } else if p < 0.0 {
            TrendDirection::Down
        } else {
            TrendDirection::Stable
        }
    });

    SummaryStats {
        latest: Some(last),
        min: Some(min),
        max: Some(max),
        average: Some(average),
        trend_direction,
        trend_percent,
    }
}
