use std::fmt::Write as _;
use std::io::Write;

use serde::Serialize;

use crate::accumulator::{AccumulatorStore, ResourceTotals};
use crate::error::{Result, StatusError};
use crate::status::NodeStatus;

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NodeReport {
    pub name: String,
    #[serde(flatten)]
    pub status: NodeStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SkippedNode {
    pub name: String,
    pub reason: String,
}

/// Outcome of one aggregation run.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Report {
    pub nodes: Vec<NodeReport>,
    pub skipped: Vec<SkippedNode>,
    pub totals: ResourceTotals,
}

/// Render a figure with at most three decimals and no trailing zeros.
pub fn fmt_amount(v: f64) -> String {
    let s = format!("{v:.3}");
    let s = s.trim_end_matches('0').trim_end_matches('.');
    if s == "-0" {
        "0".to_string()
    } else {
        s.to_string()
    }
}

pub fn render_text(report: &Report, per_node: bool) -> String {
    let t = &report.totals;
    let mut out = String::new();

    if per_node && !report.nodes.is_empty() {
        out.push_str("🖥️ Nodes:\n");
        for n in &report.nodes {
            let _ = writeln!(
                out,
                "  {}  reserved {} cores / {} GiB, used {} cores / {} GiB",
                n.name,
                fmt_amount(n.status.reserved_cpu),
                fmt_amount(n.status.reserved_mem_gi),
                fmt_amount(n.status.used_cpu),
                fmt_amount(n.status.used_mem_gi),
            );
        }
        out.push('\n');
    }

    let _ = writeln!(out, "📊 Total ({} nodes)", report.nodes.len());
    out.push_str("-----------------------------------\n");
    out.push_str("📦 CPU:\n");
    let _ = writeln!(out, "  Reserved:    {} cores", fmt_amount(t.reserved_cpu));
    let _ = writeln!(out, "  Used:        {} cores", fmt_amount(t.used_cpu));
    out.push('\n');
    out.push_str("💾 Memory:\n");
    let _ = writeln!(out, "  Reserved:    {} GiB", fmt_amount(t.reserved_mem_gi));
    let _ = writeln!(out, "  Used:        {} GiB", fmt_amount(t.used_mem_gi));

    if !report.skipped.is_empty() {
        out.push('\n');
        let _ = writeln!(out, "⚠️ Skipped {} node(s):", report.skipped.len());
        for s in &report.skipped {
            let _ = writeln!(out, "  {}: {}", s.name, s.reason);
        }
    }
    out
}

pub fn render_json(report: &Report) -> String {
    // Report holds only plain numbers and strings.
    serde_json::to_string_pretty(report).unwrap_or_default() + "\n"
}

/// Prints the final summary and clears the accumulator state.
pub struct Reporter {
    pub format: OutputFormat,
    pub per_node: bool,
    pub keep_state: bool,
}

impl Reporter {
    pub async fn publish(
        &self,
        report: &Report,
        store: &AccumulatorStore,
        out: &mut (dyn Write + Send),
    ) -> Result<()> {
        let body = match self.format {
            OutputFormat::Text => render_text(report, self.per_node),
            OutputFormat::Json => render_json(report),
        };
        out.write_all(body.as_bytes())
            .and_then(|_| out.flush())
            .map_err(|e| StatusError::io("write", "<stdout>", e))?;

        if self.keep_state {
            tracing::info!(dir = %store.dir().display(), "keeping accumulator state");
            return Ok(());
        }
        store.reset().await
    }
}
