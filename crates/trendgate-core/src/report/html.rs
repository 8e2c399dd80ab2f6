//! Self-contained HTML rendering: inline CSS, inline SVG charts, no external resources.

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::chart::{ChartConfig, ChartKind, PointMeta};
use super::stats::SummaryStats;
use super::{recorded_points, MetricReport, ReportData};
use crate::errors::{Error, Result};
use crate::gate::fmt_value;
use crate::sanitize::{escape_html, escape_json_for_script};

const WIDTH: f64 = 720.0;
const HEIGHT: f64 = 240.0;
const MARGIN_LEFT: f64 = 64.0;
const MARGIN_RIGHT: f64 = 16.0;
const MARGIN_TOP: f64 = 16.0;
const MARGIN_BOTTOM: f64 = 36.0;

const STYLE: &str = r#"
body { font-family: -apple-system, BlinkMacSystemFont, "Segoe UI", Helvetica, Arial, sans-serif; margin: 2rem auto; max-width: 800px; color: #1f2328; }
h1 { font-size: 1.6rem; margin-bottom: 0.25rem; }
dl.meta { display: grid; grid-template-columns: max-content auto; gap: 0.2rem 1rem; font-size: 0.9rem; color: #57606a; }
dl.meta dt { font-weight: 600; }
section.metric { border: 1px solid #d0d7de; border-radius: 6px; padding: 1rem; margin: 1.5rem 0; }
section.metric h2 { font-size: 1.15rem; margin: 0 0 0.25rem 0; font-family: ui-monospace, monospace; }
p.description { margin: 0 0 0.5rem 0; color: #57606a; }
table.stats { border-collapse: collapse; font-size: 0.9rem; margin-bottom: 0.75rem; }
table.stats th, table.stats td { border: 1px solid #d0d7de; padding: 0.25rem 0.6rem; text-align: right; }
.notice { background: #fff8c5; border: 1px solid #d4a72c; border-radius: 6px; padding: 0.5rem 0.75rem; }
svg { display: block; width: 100%; height: auto; }
svg .axis { stroke: #8c959f; stroke-width: 1; }
svg .line { fill: none; stroke: #0969da; stroke-width: 2; }
svg .point { fill: #0969da; }
svg .bar { fill: #8250df; }
svg text { font-size: 11px; fill: #57606a; }
"#;

#[derive(Serialize)]
struct Payload<'a> {
    repository: Option<String>,
    branch: Option<String>,
    generated_at: String,
    build_count: usize,
    metrics: Vec<PayloadMetric<'a>>,
}

#[derive(Serialize)]
struct PayloadMetric<'a> {
    name: String,
    unit: Option<String>,
    description: Option<String>,
    sparse: bool,
    stats: &'a SummaryStats,
    chart: ChartConfig,
}

fn esc_opt(s: Option<&str>) -> Option<String> {
    s.map(escape_html)
}

/// Copy of `chart` with every user-influenced string entity-escaped.
fn escaped_chart(chart: &ChartConfig) -> ChartConfig {
    let mut out = chart.clone();
    if out.kind == ChartKind::Bar {
        out.labels = out.labels.iter().map(|l| escape_html(l)).collect();
    }
    out.dataset.label = escape_html(&out.dataset.label);
    out.scales.y.title = esc_opt(out.scales.y.title.as_deref());
    for meta in out.meta.iter_mut().flatten() {
        meta.commit_sha = escape_html(&meta.commit_sha);
    }
    out
}

fn payload_json(data: &ReportData) -> Result<String> {
    let payload = Payload {
        repository: esc_opt(data.repository.as_deref()),
        branch: esc_opt(data.branch.as_deref()),
        generated_at: data.generated_at.to_rfc3339(),
        build_count: data.build_count,
        metrics: data
            .metrics
            .iter()
            .map(|m| PayloadMetric {
                name: escape_html(&m.series.metric_name),
                unit: esc_opt(m.series.unit.as_deref()),
                description: esc_opt(m.series.description.as_deref()),
                sparse: m.sparse,
                stats: &m.stats,
                chart: escaped_chart(&m.chart),
            })
            .collect(),
    };
    let json = serde_json::to_string(&payload)
        .map_err(|e| Error::report(format!("failed to serialize chart data: {}", e)))?;
    Ok(escape_json_for_script(&json))
}

fn day(ts: &DateTime<Utc>) -> String {
    ts.format("%Y-%m-%d").to_string()
}

fn short_sha(sha: &str) -> &str {
    match sha.char_indices().nth(8) {
        Some((idx, _)) => &sha[..idx],
        None => sha,
    }
}

fn stat_cell(v: Option<f64>) -> String {
    v.map(fmt_value).unwrap_or_else(|| "n/a".to_string())
}

/// Render the report document.
pub fn render_html(data: &ReportData) -> Result<String> {
    let mut out = String::with_capacity(16 * 1024);
    let title = match data.repository.as_deref() {
        Some(repo) => format!("Build metrics: {}", escape_html(repo)),
        None => "Build metrics".to_string(),
    };

    out.push_str("<!DOCTYPE html>\n");
    out.push_str("<html lang=\"en\">\n");
    out.push_str("<head>\n");
    out.push_str("<meta charset=\"utf-8\">\n");
    out.push_str("<meta name=\"viewport\" content=\"width=device-width, initial-scale=1\">\n");
    out.push_str(&format!("<title>{}</title>\n", title));
    out.push_str(&format!("<style>{}</style>\n", STYLE));
    out.push_str("</head>\n");
    out.push_str("<body>\n");
    out.push_str(&format!("<h1>{}</h1>\n", title));

    out.push_str("<dl class=\"meta\">\n");
    if let Some(repo) = data.repository.as_deref() {
        out.push_str(&format!("<dt>Repository</dt><dd>{}</dd>\n", escape_html(repo)));
    }
    out.push_str(&format!(
        "<dt>Branch</dt><dd>{}</dd>\n",
        data.branch
            .as_deref()
            .map(escape_html)
            .unwrap_or_else(|| "all branches".to_string())
    ));
    out.push_str(&format!(
        "<dt>Generated</dt><dd>{}</dd>\n",
        data.generated_at.format("%Y-%m-%d %H:%M UTC")
    ));
    out.push_str(&format!("<dt>Builds</dt><dd>{}</dd>\n", data.build_count));
    if let (Some(first), Some(last)) = (&data.first_build, &data.last_build) {
        out.push_str(&format!("<dt>Date range</dt><dd>{} to {}</dd>\n", day(first), day(last)));
    }
    out.push_str("</dl>\n");

    if data.metrics.is_empty() {
        out.push_str("<p class=\"notice\">No data: no metrics have been recorded yet.</p>\n");
    }
    for (idx, metric) in data.metrics.iter().enumerate() {
        render_metric(&mut out, idx, metric);
    }

    out.push_str(&format!(
        "<script type=\"application/json\" id=\"trendgate-data\">{}</script>\n",
        payload_json(data)?
    ));
    out.push_str("</body>\n");
    out.push_str("</html>\n");
    Ok(out)
}

fn render_metric(out: &mut String, idx: usize, metric: &MetricReport) {
    let series = &metric.series;
    let name = escape_html(&series.metric_name);
    out.push_str(&format!(
        "<section class=\"metric\" id=\"metric-{}\" data-metric=\"{}\">\n",
        idx,
        name
    ));
    match series.unit.as_deref() {
        Some(unit) => out.push_str(&format!(
            "<h2>{} <small>({})</small></h2>\n",
            name,
            escape_html(unit)
        )),
        None => out.push_str(&format!("<h2>{}</h2>\n", name)),
    }
    if let Some(desc) = series.description.as_deref() {
        out.push_str(&format!("<p class=\"description\">{}</p>\n", escape_html(desc)));
    }

    if metric.chart.kind == ChartKind::Line {
        let s = &metric.stats;
        out.push_str("<table class=\"stats\">\n");
        out.push_str("<tr><th>Latest</th><th>Min</th><th>Max</th><th>Average</th><th>Trend</th></tr>\n");
        out.push_str(&format!(
            "<tr><td>{}</td><td>{}</td><td>{}</td><td>{}</td><td>{}</td></tr>\n",
            stat_cell(s.latest),
            stat_cell(s.min),
            stat_cell(s.max),
            stat_cell(s.average),
            s.trend_label().unwrap_or_else(|| "n/a".to_string())
        ));
        out.push_str("</table>\n");
    }

    if metric.sparse {
        out.push_str(&format!(
            "<p class=\"notice\">limited data available ({} builds)</p>\n",
            recorded_points(series)
        ));
    }

    match metric.chart.kind {
        ChartKind::Line => render_line_svg(out, &metric.chart),
        ChartKind::Bar => render_bar_svg(out, &metric.chart),
    }
    out.push_str("</section>\n");
}

fn svg_open(out: &mut String, label: &str) {
    out.push_str(&format!(
        "<svg viewBox=\"0 0 {} {}\" role=\"img\" aria-label=\"{}\" xmlns=\"http://www.w3.org/2000/svg\">\n",
        WIDTH,
        HEIGHT,
        escape_html(label)
    ));
    let bottom = HEIGHT - MARGIN_BOTTOM;
    out.push_str(&format!(
        "<line class=\"axis\" x1=\"{l}\" y1=\"{t}\" x2=\"{l}\" y2=\"{b}\"/><line class=\"axis\" x1=\"{l}\" y1=\"{b}\" x2=\"{r}\" y2=\"{b}\"/>\n",
        l = MARGIN_LEFT,
        t = MARGIN_TOP,
        b = bottom,
        r = WIDTH - MARGIN_RIGHT
    ));
}

fn render_line_svg(out: &mut String, chart: &ChartConfig) {
    let values: Vec<f64> = chart.dataset.data.iter().flatten().copied().collect();
    if values.is_empty() {
        return;
    }
    let mut lo = values.iter().copied().fold(f64::INFINITY, f64::min);
    let mut hi = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    if (hi - lo).abs() < f64::EPSILON {
        let pad = if lo == 0.0 { 1.0 } else { lo.abs() * 0.05 };
        lo -= pad;
        hi += pad;
    }

    let plot_w = WIDTH - MARGIN_LEFT - MARGIN_RIGHT;
    let plot_h = HEIGHT - MARGIN_TOP - MARGIN_BOTTOM;
    let n = chart.dataset.data.len();
    let x_at = |i: usize| {
        if n <= 1 {
            MARGIN_LEFT + plot_w / 2.0
        } else {
            MARGIN_LEFT + plot_w * i as f64 / (n - 1) as f64
        }
    };
    let y_at = |v: f64| MARGIN_TOP + plot_h * (1.0 - (v - lo) / (hi - lo));

    svg_open(out, &chart.dataset.label);

    let mut path = String::new();
    let mut pen_down = false;
    for (i, slot) in chart.dataset.data.iter().enumerate() {
        match slot {
            Some(v) => {
                path.push_str(&format!(
                    "{}{:.1},{:.1} ",
                    if pen_down { "L" } else { "M" },
                    x_at(i),
                    y_at(*v)
                ));
                pen_down = true;
            }
            None => pen_down = false,
        }
    }
    out.push_str(&format!("<path class=\"line\" d=\"{}\"/>\n", path.trim_end()));

    for (i, slot) in chart.dataset.data.iter().enumerate() {
        let Some(v) = slot else { continue };
        let when = chart
            .labels
            .get(i)
            .and_then(|l| l.get(..10))
            .unwrap_or("");
        let provenance = match chart.meta.get(i).and_then(Option::as_ref) {
            Some(PointMeta {
                commit_sha,
                run_number,
            }) => format!(" · {} #{}", escape_html(short_sha(commit_sha)), run_number),
            None => String::new(),
        };
        out.push_str(&format!(
            "<circle class=\"point\" cx=\"{:.1}\" cy=\"{:.1}\" r=\"3\"><title>{} · {}{}</title></circle>\n",
            x_at(i),
            y_at(*v),
            escape_html(when),
            fmt_value(*v),
            provenance
        ));
    }

    let bottom = HEIGHT - MARGIN_BOTTOM;
    out.push_str(&format!(
        "<text x=\"{:.1}\" y=\"{:.1}\" text-anchor=\"end\">{}</text>\n",
        MARGIN_LEFT - 6.0,
        MARGIN_TOP + 4.0,
        fmt_value(hi)
    ));
    out.push_str(&format!(
        "<text x=\"{:.1}\" y=\"{:.1}\" text-anchor=\"end\">{}</text>\n",
        MARGIN_LEFT - 6.0,
        bottom,
        fmt_value(lo)
    ));
    if let (Some(first), Some(last)) = (chart.labels.first(), chart.labels.last()) {
        out.push_str(&format!(
            "<text x=\"{:.1}\" y=\"{:.1}\">{}</text>\n",
            MARGIN_LEFT,
            HEIGHT - 12.0,
            escape_html(first.get(..10).unwrap_or(first))
        ));
        out.push_str(&format!(
            "<text x=\"{:.1}\" y=\"{:.1}\" text-anchor=\"end\">{}</text>\n",
            WIDTH - MARGIN_RIGHT,
            HEIGHT - 12.0,
            escape_html(last.get(..10).unwrap_or(last))
        ));
    }
    out.push_str("</svg>\n");
}

fn render_bar_svg(out: &mut String, chart: &ChartConfig) {
    let counts: Vec<f64> = chart.dataset.data.iter().map(|c| c.unwrap_or(0.0)).collect();
    let max = counts.iter().copied().fold(0.0, f64::max);
    if counts.is_empty() || max <= 0.0 {
        return;
    }

    let plot_w = WIDTH - MARGIN_LEFT - MARGIN_RIGHT;
    let plot_h = HEIGHT - MARGIN_TOP - MARGIN_BOTTOM;
    let slot = plot_w / counts.len() as f64;
    let bar_w = slot * 0.7;
    let bottom = HEIGHT - MARGIN_BOTTOM;

    svg_open(out, &chart.dataset.label);
    for (i, (label, count)) in chart.labels.iter().zip(&counts).enumerate() {
        let h = plot_h * count / max;
        let x = MARGIN_LEFT + slot * i as f64 + (slot - bar_w) / 2.0;
        let label = escape_html(label);
        out.push_str(&format!(
            "<rect class=\"bar\" x=\"{:.1}\" y=\"{:.1}\" width=\"{:.1}\" height=\"{:.1}\"><title>{}: {}</title></rect>\n",
            x,
            bottom - h,
            bar_w,
            h,
            label,
            count
        ));
        out.push_str(&format!(
            "<text x=\"{:.1}\" y=\"{:.1}\" text-anchor=\"middle\">{}</text>\n",
            x + bar_w / 2.0,
            HEIGHT - 12.0,
            label
        ));
    }
    out.push_str("</svg>\n");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{DataPoint, MetricType, MetricValue, TimeSeriesData};
    use crate::report::{build_chart, is_sparse, summarize};
    use chrono::TimeZone;

    fn report(name: &str, values: &[Option<f64>]) -> MetricReport {
        let series = TimeSeriesData {
            metric_name: name.into(),
            metric_type: MetricType::Numeric,
            unit: Some("%".into()),
            description: Some("Line coverage".into()),
            data_points: values
                .iter()
                .enumerate()
                .map(|(i, v)| DataPoint {
                    timestamp: Utc.with_ymd_and_hms(2024, 3, 1 + i as u32, 0, 0, 0).unwrap(),
                    value: v.map(MetricValue::Numeric),
                    commit_sha: "0123456789abcdef".into(),
                    branch: "main".into(),
                    run_number: i as u64 + 1,
                })
                .collect(),
        };
        MetricReport {
            stats: summarize(&series),
            chart: build_chart(&series),
            sparse: is_sparse(&series),
            series,
        }
    }

    fn data(metrics: Vec<MetricReport>) -> ReportData {
        ReportData {
            repository: Some("acme/widgets".into()),
            branch: Some("main".into()),
            generated_at: Utc.with_ymd_and_hms(2024, 3, 31, 12, 0, 0).unwrap(),
            build_count: 3,
            first_build: Some(Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap()),
            last_build: Some(Utc.with_ymd_and_hms(2024, 3, 3, 0, 0, 0).unwrap()),
            metrics,
        }
    }

    #[test]
    fn document_is_self_contained() {
        let html = render_html(&data(vec![report("cov", &[Some(80.0), Some(82.0)])])).unwrap();
        assert!(html.starts_with("<!DOCTYPE html>"));
        assert!(html.contains("<svg"));
        assert!(html.contains("id=\"trendgate-data\""));
        assert!(!html.contains("<script src"));
        assert!(!html.contains("<link"));
        assert!(html.contains("2024-03-01 to 2024-03-03"));
        assert!(html.contains("<dt>Repository</dt><dd>acme/widgets</dd>"));
    }

    #[test]
    fn gaps_break_the_line_path() {
        let html = render_html(&data(vec![report("cov", &[Some(1.0), None, Some(3.0)])])).unwrap();
        let path_line = html.lines().find(|l| l.starts_with("<path")).unwrap();
        assert_eq!(path_line.matches('M').count(), 2);
        assert!(!path_line.contains('L'));
    }

    #[test]
    fn sparse_and_empty_notices() {
        let html = render_html(&data(vec![report("cov", &[Some(1.0), Some(2.0)])])).unwrap();
        assert!(html.contains("limited data available (2 builds)"));

        let empty = render_html(&data(vec![])).unwrap();
        assert!(empty.contains("No data"));
        assert!(!empty.contains("<section"));
    }

    #[test]
    fn embedded_json_parses_back() {
        let html = render_html(&data(vec![report("a&b", &[Some(1.0)])])).unwrap();
        let start = html.find("id=\"trendgate-data\">").unwrap() + "id=\"trendgate-data\">".len();
        let end = html[start..].find("</script>").unwrap() + start;
        let payload: serde_json::Value = serde_json::from_str(&html[start..end]).unwrap();
        assert_eq!(payload["metrics"][0]["name"], "a&amp;b");
        assert_eq!(payload["metrics"][0]["chart"]["type"], "line");
        assert_eq!(payload["build_count"], 3);
    }

    #[test]
    fn short_sha_handles_short_input() {
        assert_eq!(short_sha("abc"), "abc");
        assert_eq!(short_sha("0123456789"), "01234567");
    }
}
