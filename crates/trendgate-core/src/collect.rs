//! Collection input contract.
//!
//! Collectors hand the pipeline a JSON array of `{name, type?, unit?, description?, value}`
//! objects. How they produced the values is not our concern; we only resolve each entry against
//! the [`MetricRegistry`] and reject values whose shape contradicts the metric type.

use serde::Deserialize;

use crate::errors::{Error, Result};
use crate::model::{CollectedMetric, MetricSpec, MetricType, MetricValue};
use crate::registry::MetricRegistry;

const INPUT_SOURCE: &str = "collector input";

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawCollected {
    name: String,
    #[serde(default, rename = "type")]
    metric_type: Option<MetricType>,
    #[serde(default)]
    unit: Option<String>,
    #[serde(default)]
    description: Option<String>,
    value: serde_json::Value,
}

/// Parse a collector JSON document into collected metrics.
pub fn parse_collected(json: &str, registry: &MetricRegistry) -> Result<Vec<CollectedMetric>> {
    let raw: Vec<RawCollected> = serde_json::from_str(json)
        .map_err(|e| Error::collection(INPUT_SOURCE, format!("invalid JSON: {}", e)))?;

    raw.into_iter()
        .map(|entry| resolve(entry, registry))
        .collect()
}

/// Parse a `name=value` pair as given on the command line. Numbers become numeric metrics
/// unless the registry declares the metric as a label.
pub fn parse_assignment(arg: &str, registry: &MetricRegistry) -> Result<CollectedMetric> {
    let (name, value) = arg.split_once('=').ok_or_else(|| {
        Error::collection(arg, "expected NAME=VALUE (e.g. coverage.lines=81.4)")
    })?;
    let name = name.trim();
    let value = value.trim();

    let json_value = match value.parse::<f64>() {
        Ok(n) if registry.get(name).map(|s| s.metric_type) != Some(MetricType::Label) => {
            serde_json::Number::from_f64(n)
                .map(serde_json::Value::Number)
                .ok_or_else(|| Error::collection(name, format!("`{}` is not a finite number", value)))?
        }
        _ => serde_json::Value::String(value.to_string()),
    };

    resolve(
        RawCollected {
            name: name.to_string(),
            metric_type: None,
            unit: None,
            description: None,
            value: json_value,
        },
        registry,
    )
}

fn resolve(entry: RawCollected, registry: &MetricRegistry) -> Result<CollectedMetric> {
    let name = entry.name.trim().to_string();
    if name.is_empty() {
        return Err(Error::collection(INPUT_SOURCE, "metric entry without a name"));
    }
    let known = registry.get(&name);

    let metric_type = match (entry.metric_type, known) {
        (Some(t), _) => t,
        (None, Some(spec)) => spec.metric_type,
        (None, None) => match &entry.value {
            serde_json::Value::Number(_) => MetricType::Numeric,
            serde_json::Value::String(_) => MetricType::Label,
            other => {
                return Err(Error::collection(
                    &name,
                    format!("cannot infer metric type from value {}", other),
                ))
            }
        },
    };

    let value = match (metric_type, entry.value) {
        (MetricType::Numeric, serde_json::Value::Number(n)) => {
            MetricValue::Numeric(n.as_f64().ok_or_else(|| {
                Error::collection(&name, format!("value {} is not representable as f64", n))
            })?)
        }
        (MetricType::Label, serde_json::Value::String(s)) => MetricValue::Label(s),
        (t, other) => {
            return Err(Error::collection(
                &name,
                format!("{} metric cannot take value {}", t, other),
            ))
        }
    };

    let definition = MetricSpec {
        unit: entry.unit.or_else(|| known.and_then(|s| s.unit.clone())),
        description: entry
            .description
            .or_else(|| known.and_then(|s| s.description.clone())),
        name,
        metric_type,
    };

    Ok(CollectedMetric { definition, value })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_fills_type_and_unit() {
        let reg = MetricRegistry::builtin();
        let got = parse_collected(
            r#"[{"name": "coverage.lines", "value": 81.4}, {"name": "build.status", "value": "success"}]"#,
            &reg,
        )
        .unwrap();
        assert_eq!(got[0].definition.unit.as_deref(), Some("%"));
        assert_eq!(got[0].value, MetricValue::Numeric(81.4));
        assert_eq!(got[1].definition.metric_type, MetricType::Label);
    }

    #[test]
    fn unknown_metric_type_is_inferred_from_value() {
        let reg = MetricRegistry::default();
        let got = parse_collected(r#"[{"name": "warnings", "value": 3}]"#, &reg).unwrap();
        assert_eq!(got[0].definition.metric_type, MetricType::Numeric);
    }

    #[test]
    fn mismatched_value_is_a_collection_error() {
        let reg = MetricRegistry::builtin();
        let err = parse_collected(r#"[{"name": "coverage.lines", "value": "high"}]"#, &reg)
            .unwrap_err();
        assert_eq!(err.code(), "collection.invalid_input");
        assert!(err.to_string().contains("coverage.lines"));
    }

    #[test]
    fn malformed_json_is_a_collection_error() {
        let err = parse_collected("{not json", &MetricRegistry::builtin()).unwrap_err();
        assert_eq!(err.code(), "collection.invalid_input");
        assert!(!err.is_retryable());
    }

    #[test]
    fn assignments_respect_registry_label_types() {
        let reg = MetricRegistry::with_entries(&[MetricSpec::label("release")]).unwrap();
        let m = parse_assignment("release=2024", &reg).unwrap();
        assert_eq!(m.value, MetricValue::Label("2024".into()));

        let n = parse_assignment("binary.size = 1024", &reg).unwrap();
        assert_eq!(n.value, MetricValue::Numeric(1024.0));
        assert_eq!(n.definition.unit.as_deref(), Some("bytes"));

        assert!(parse_assignment("no-equals-sign", &reg).is_err());
    }
}
