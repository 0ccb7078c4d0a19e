//! Terminal rendering of run reports

use colored::Colorize;

use crate::runner::RunReport;
use crate::strategy::presets;

fn metric_color(value: f64) -> String {
    let text = format!("{value:.3}");
    if value >= 0.7 {
        text.green().to_string()
    } else if value >= 0.4 {
        text.yellow().to_string()
    } else {
        text.red().to_string()
    }
}

/// One line per variant and K, plus failure details
pub fn render_report(report: &RunReport) -> String {
    let mut out = String::new();
    out.push_str(&format!("\n{} {}\n", "Run".bold(), report.run_id.cyan()));
    if report.interrupted {
        out.push_str(&format!("{}\n", "Interrupted: resume with --run-id to finish".yellow()));
    }

    for variant in &report.variants {
        let counts = format!(
            "{} ok / {} failed / {} total",
            variant.succeeded, variant.failed, variant.total
        );
        let counts = if variant.failed > 0 {
            counts.red().to_string()
        } else {
            counts.green().to_string()
        };
        out.push_str(&format!("\n{}  {}\n", variant.variant_id.bold(), counts));

        for (k, m) in &variant.metrics {
            out.push_str(&format!(
                "  @{:<3} ndcg {}  recall {}  mrr {}  map {}  hit {}\n",
                k,
                metric_color(m.ndcg),
                metric_color(m.recall),
                metric_color(m.mrr),
                metric_color(m.map),
                metric_color(m.hit_rate),
            ));
        }
        out.push_str(&format!(
            "  latency ms  p50 {:.1}  p95 {:.1}  p99 {:.1}\n",
            variant.latency_ms.p50, variant.latency_ms.p95, variant.latency_ms.p99
        ));
        for failure in &variant.failed_queries {
            out.push_str(&format!("  {} {}: {}\n", "✗".red(), failure.query_id, failure.error));
        }
    }
    out
}

/// Preset names with their stage chains
pub fn render_presets() -> String {
    let mut out = String::new();
    for name in presets::preset_names() {
        let chain = presets::preset(name).map(|d| d.describe()).unwrap_or_default();
        let description = presets::preset_description(name).unwrap_or_default();
        out.push_str(&format!("{:<16} {}\n{:<16} {}\n", name.bold(), description, "", chain.dimmed()));
    }
    out
}
