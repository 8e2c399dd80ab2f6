use trendgate_core::baseline::build_samples;
use trendgate_core::gate::{evaluate_quality_gate, fmt_value, render_markdown_comment, GateStatus};
use trendgate_core::Error;

use super::common;
use crate::cli::args::GateArgs;
use crate::exit_codes::{GATE_FAILED, SUCCESS};
use crate::transport::DatabaseHandle;

pub async fn run(args: GateArgs) -> anyhow::Result<i32> {
    let mut cfg = common::load(&args.common)?;
    if let Some(mode) = args.mode {
        cfg.quality_gate.mode = mode.into();
    }
    if let Some(branch) = &args.reference_branch {
        cfg.baseline.reference_branch = branch.clone();
    }
    cfg.baseline.validate()?;

    let registry = cfg.registry()?;
    let collected = args.build.collected(&registry)?;
    let context = args.build.context();
    if args.record {
        context.validate()?;
    }

    let mut db = DatabaseHandle::checkout(&cfg.database).await?;
    let samples = {
        let store = db.open()?;
        let current = if args.record {
            Some(store.record_run(&context, &collected)?.build_id)
        } else {
            None
        };
        build_samples(&collected, &store, &cfg.baseline, context.timestamp, current)?
    };
    if args.record {
        db.publish().await?;
    }

    let result = evaluate_quality_gate(&samples, &cfg.quality_gate, cfg.baseline.info(&samples));

    if let Some(path) = &args.json {
        let json = serde_json::to_string_pretty(&result)
            .map_err(|e| Error::report(format!("failed to serialize gate result: {}", e)))?;
        common::write_output(path, &json)?;
    }
    if let Some(path) = &args.markdown {
        common::write_output(path, &render_markdown_comment(&result))?;
    }

    let s = &result.summary;
    println!(
        "quality gate: {} (mode {}, {} evaluated, {} passed, {} failed, {} unknown)",
        result.status.as_str(),
        result.mode.as_str(),
        s.evaluated,
        s.passed,
        s.failed,
        s.unknown
    );
    for m in result.metrics.iter().filter(|m| m.status == GateStatus::Fail) {
        println!(
            "  {} {}: {} (baseline {})",
            if m.is_blocking { "FAIL" } else { "WARN" },
            m.name,
            m.message.as_deref().unwrap_or(""),
            m.baseline_median.map(fmt_value).unwrap_or_else(|| "n/a".into())
        );
    }

    if result.blocks_build() {
        tracing::warn!(failing = ?result.failing_metrics, "hard quality gate failed");
        Ok(GATE_FAILED)
    } else {
        Ok(SUCCESS)
    }
}
