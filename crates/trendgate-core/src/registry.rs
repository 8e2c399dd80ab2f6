//! Known metric definitions handed to the collection layer.
//!
//! The registry is an immutable value built once from the built-in table plus config entries.
//! Nothing in the store, gate or report reads it; it only fills in type/unit/description for
//! collected values that omit them.

use std::collections::BTreeMap;

use crate::errors::{codes, Error, Result};
use crate::model::MetricSpec;

#[derive(Debug, Clone, Default)]
pub struct MetricRegistry {
    entries: BTreeMap<String, MetricSpec>,
}

impl MetricRegistry {
    /// Registry with the definitions every project gets without configuration.
    pub fn builtin() -> Self {
        let defaults = [
            MetricSpec::numeric("coverage.lines")
                .with_unit("%")
                .with_description("Line coverage of the test suite"),
            MetricSpec::numeric("coverage.branches")
                .with_unit("%")
                .with_description("Branch coverage of the test suite"),
            MetricSpec::numeric("build.duration")
                .with_unit("s")
                .with_description("Wall-clock duration of the build step"),
            MetricSpec::numeric("binary.size")
                .with_unit("bytes")
                .with_description("Size of the release artifact"),
            MetricSpec::numeric("tests.count")
                .with_unit("count")
                .with_description("Number of executed tests"),
            MetricSpec::label("build.status").with_description("Outcome of the build step"),
        ];
        Self {
            entries: defaults
                .into_iter()
                .map(|spec| (spec.name.clone(), spec))
                .collect(),
        }
    }

    /// Built-ins overlaid with `extra`; config entries replace built-ins of the same name.
    pub fn with_entries(extra: &[MetricSpec]) -> Result<Self> {
        let mut registry = Self::builtin();
        let mut seen = std::collections::HashSet::new();
        for spec in extra {
            if spec.name.trim().is_empty() {
                return Err(Error::invalid_field(
                    codes::INVALID_REGISTRY,
                    "metrics[].name",
                    "metric registry entries need a non-blank name",
                ));
            }
            if !seen.insert(spec.name.as_str()) {
                return Err(Error::invalid_field(
                    codes::INVALID_REGISTRY,
                    "metrics",
                    format!("metric `{}` is declared twice", spec.name),
                ));
            }
            registry.entries.insert(spec.name.clone(), spec.clone());
        }
        Ok(registry)
    }

    pub fn get(&self, name: &str) -> Option<&MetricSpec> {
        self.entries.get(name)
    }
}
