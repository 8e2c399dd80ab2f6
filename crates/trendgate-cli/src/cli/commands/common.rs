use std::io::Read;
use std::path::{Path, PathBuf};

use chrono::Utc;
use trendgate_core::collect::{parse_assignment, parse_collected};
use trendgate_core::config::{load_config, Config, DEFAULT_CONFIG_PATH};
use trendgate_core::model::{BuildContext, CollectedMetric};
use trendgate_core::registry::MetricRegistry;
use trendgate_core::{Error, Result};

use crate::cli::args::{BuildArgs, CommonArgs};

pub fn load(common: &CommonArgs) -> Result<Config> {
    let (path, explicit) = match &common.config {
        Some(path) => (path.clone(), true),
        None => (PathBuf::from(DEFAULT_CONFIG_PATH), false),
    };
    let mut cfg = load_config(&path, explicit)?;
    if let Some(db) = &common.database {
        cfg.database = db.clone();
    }
    Ok(cfg)
}

impl BuildArgs {
    /// Run identity from flags / CI environment. Not validated here: the store validates on
    /// insert, and a gate that does not record needs only the timestamp.
    pub fn context(&self) -> BuildContext {
        BuildContext {
            commit_sha: self.commit.clone().unwrap_or_default(),
            branch: self.branch.clone().unwrap_or_default(),
            run_id: self.run_id.clone().unwrap_or_default(),
            run_number: self.run_number,
            timestamp: self.timestamp.unwrap_or_else(Utc::now),
        }
    }

    /// `--input` document followed by `--metric` assignments.
    pub fn collected(&self, registry: &MetricRegistry) -> Result<Vec<CollectedMetric>> {
        let mut collected = match &self.input {
            Some(path) => parse_collected(&read_input(path)?, registry)?,
            None => Vec::new(),
        };
        for arg in &self.metrics {
            collected.push(parse_assignment(arg, registry)?);
        }
        if collected.is_empty() {
            return Err(Error::collection(
                "input",
                "no metrics given; pass --input FILE or --metric NAME=VALUE",
            ));
        }
        tracing::debug!(count = collected.len(), "collected metrics");
        Ok(collected)
    }
}

fn read_input(path: &Path) -> Result<String> {
    let label = path.display().to_string();
    if path.as_os_str() == "-" {
        let mut buf = String::new();
        std::io::stdin()
            .read_to_string(&mut buf)
            .map_err(|e| Error::collection(label, format!("failed to read stdin: {}", e)))?;
        return Ok(buf);
    }
    std::fs::read_to_string(path)
        .map_err(|e| Error::collection(label, format!("failed to read input: {}", e)))
}

/// Write a command output file, creating parent directories.
pub fn write_output(path: &Path, contents: &str) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .map_err(|e| Error::report(format!("failed to create {}: {}", parent.display(), e)))?;
    }
    std::fs::write(path, contents)
        .map_err(|e| Error::report(format!("failed to write {}: {}", path.display(), e)))
}
