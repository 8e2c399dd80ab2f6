use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::baseline::BaselineWindow;
use crate::errors::{codes, Error, Result};
use crate::gate::QualityGateConfig;
use crate::model::MetricSpec;
use crate::registry::MetricRegistry;

pub const SUPPORTED_CONFIG_VERSION: u32 = 1;
pub const DEFAULT_CONFIG_PATH: &str = "trendgate.yaml";
pub const DEFAULT_DATABASE: &str = ".trendgate/metrics.db";
pub const DEFAULT_REPORT_OUTPUT: &str = "trendgate-report.html";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ReportSettings {
    pub repository: Option<String>,
    pub output: PathBuf,
    pub fill_gaps: bool,
    /// Restrict the report to one branch; defaults to `baseline.reference_branch`.
    pub branch: Option<String>,
    /// Report every branch instead. Pull-request runs recorded with `gate --record` then mix
    /// into the trends and leave gaps in the reference-branch series.
    pub all_branches: bool,
}

impl Default for ReportSettings {
    fn default() -> Self {
        Self {
            repository: None,
            output: PathBuf::from(DEFAULT_REPORT_OUTPUT),
            fill_gaps: true,
            branch: None,
            all_branches: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub version: u32,
    /// Local path or object-store URL of the metrics database.
    pub database: String,
    pub baseline: BaselineWindow,
    pub quality_gate: QualityGateConfig,
    pub report: ReportSettings,
    pub metrics: Vec<MetricSpec>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            version: SUPPORTED_CONFIG_VERSION,
            database: DEFAULT_DATABASE.to_string(),
            baseline: BaselineWindow::default(),
            quality_gate: QualityGateConfig::default(),
            report: ReportSettings::default(),
            metrics: Vec::new(),
        }
    }
}

impl Config {
    pub fn validate(&self) -> Result<()> {
        if self.version != SUPPORTED_CONFIG_VERSION {
            return Err(Error::invalid_field(
                codes::UNSUPPORTED_VERSION,
                "version",
                format!(
                    "unsupported config version {} (supported: {})",
                    self.version, SUPPORTED_CONFIG_VERSION
                ),
            ));
        }
        if self.database.trim().is_empty() {
            return Err(Error::missing_field("database"));
        }
        self.baseline.validate()?;
        self.quality_gate.validate()?;
        self.registry()?;
        Ok(())
    }

    /// Branch the report is restricted to; `None` means all branches.
    pub fn report_branch(&self) -> Option<String> {
        if self.report.all_branches {
            return None;
        }
        Some(
            self.report
                .branch
                .clone()
                .unwrap_or_else(|| self.baseline.reference_branch.clone()),
        )
    }

    /// Built-in registry overlaid with the `metrics` section.
    pub fn registry(&self) -> Result<MetricRegistry> {
        MetricRegistry::with_entries(&self.metrics)
    }
}

pub fn parse_config(raw: &str) -> Result<Config> {
    let cfg: Config = serde_yaml::from_str(raw).map_err(|e| {
        Error::validation(codes::CONFIG_PARSE, format!("failed to parse YAML: {}", e))
    })?;
    cfg.validate()?;
    Ok(cfg)
}

/// Load and validate a config file.
///
/// A missing file yields defaults when `explicit` is false (the implicit default path), and a
/// validation error when the user named the file.
pub fn load_config(path: &Path, explicit: bool) -> Result<Config> {
    let raw = match std::fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound && !explicit => {
            tracing::debug!(path = %path.display(), "no config file, using defaults");
            return Ok(Config::default());
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(Error::invalid_field(
                codes::CONFIG_MISSING,
                path.display().to_string(),
                format!("config file {} does not exist", path.display()),
            ));
        }
        Err(e) => {
            return Err(Error::validation(
                codes::CONFIG_PARSE,
                format!("failed to read config {}: {}", path.display(), e),
            ))
        }
    };
    parse_config(&raw)
}
