//! Build-metric history, baseline quality gate and trend report.
//!
//! Pipeline: collected values are recorded in a [`storage::MetricsStore`], joined with their
//! reference-branch history by [`baseline::build_samples`], judged by
//! [`gate::evaluate_quality_gate`], and rendered over time by [`report::build_report`].

pub mod baseline;
pub mod collect;
pub mod config;
pub mod errors;
pub mod gate;
pub mod model;
pub mod registry;
pub mod report;
pub mod sanitize;
pub mod storage;

pub use errors::{Error, Result};
