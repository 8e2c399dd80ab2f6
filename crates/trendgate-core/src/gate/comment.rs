use super::{fmt_value, GateMode, GateStatus, MetricEvaluationResult, QualityGateResult};
use crate::sanitize::escape_markdown_cell;

fn icon(status: GateStatus) -> &'static str {
    match status {
        GateStatus::Pass => "✅",
        GateStatus::Fail => "❌",
        GateStatus::Unknown => "❔",
    }
}

fn headline(result: &QualityGateResult) -> String {
    match (result.mode, result.status) {
        (GateMode::Off, _) => "Quality gate disabled".to_string(),
        (_, GateStatus::Pass) => "Quality gate passed".to_string(),
        (GateMode::Hard, GateStatus::Fail) => "Quality gate failed".to_string(),
        (_, GateStatus::Fail) => "Quality gate failed (soft mode, build not blocked)".to_string(),
        (_, GateStatus::Unknown) => "Quality gate inconclusive".to_string(),
    }
}

fn with_unit(value: Option<f64>, unit: Option<&str>) -> String {
    match (value, unit) {
        (None, _) => "n/a".to_string(),
        (Some(v), Some(u)) if !u.is_empty() => format!("{} {}", fmt_value(v), u),
        (Some(v), _) => fmt_value(v),
    }
}

fn delta_cell(m: &MetricEvaluationResult) -> String {
    match (m.absolute_delta, m.relative_delta_percent) {
        (None, _) => "n/a".to_string(),
        (Some(abs), Some(rel)) => format!("{:+.2} ({:+.2}%)", abs, rel),
        (Some(abs), None) => format!("{:+.2}", abs),
    }
}

/// Markdown rendering of a gate result, suitable for a pull-request comment.
pub fn render_markdown_comment(result: &QualityGateResult) -> String {
    let mut out = String::new();
    let s = &result.summary;

    out.push_str(&format!("## {} {}\n", icon(result.status), headline(result)));
    out.push('\n');
    out.push_str(&format!(
        "Mode: `{}` · {} metrics · {} evaluated · {} passed · {} failed · {} unknown\n",
        result.mode.as_str(),
        s.total,
        s.evaluated,
        s.passed,
        s.failed,
        s.unknown
    ));
    let b = &result.baseline_info;
    out.push_str(&format!(
        "Baseline: `{}`, last {} builds within {} days ({} considered)\n",
        escape_markdown_cell(&b.reference_branch),
        b.max_builds,
        b.max_age_days,
        b.builds_considered
    ));
    out.push('\n');

    if result.metrics.is_empty() {
        out.push_str("_No numeric metrics were collected for this run._\n");
        return out;
    }

    out.push_str("| | Metric | Baseline (median) | Current | Delta | Details |\n");
    out.push_str("|---|---|---|---|---|---|\n");
    for m in &result.metrics {
        let unit = m.unit.as_deref();
        let name = if m.is_blocking || m.threshold_mode.is_none() {
            escape_markdown_cell(&m.name)
        } else {
            format!("{} (warning)", escape_markdown_cell(&m.name))
        };
        out.push_str(&format!(
            "| {} | {} | {} | {} | {} | {} |\n",
            icon(m.status),
            name,
            escape_markdown_cell(&with_unit(m.baseline_median, unit)),
            escape_markdown_cell(&with_unit(m.pull_request_value, unit)),
            delta_cell(m),
            escape_markdown_cell(m.message.as_deref().unwrap_or(""))
        ));
    }

    if !result.failing_metrics.is_empty() {
        let names: Vec<String> = result
            .failing_metrics
            .iter()
            .map(|n| format!("`{}`", n.replace('`', "'")))
            .collect();
        out.push('\n');
        out.push_str(&format!("**Blocking failures:** {}\n", names.join(", ")));
    }
    out
}
