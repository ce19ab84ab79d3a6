//! Output formatting for CLI commands.

#![allow(clippy::format_push_string)]

use std::fmt::Write;

use serde::Serialize;

use crate::core::{QueryResponse, Severity, SourceStatus};
use crate::llm::prompt::evidence_label;
use crate::retrieval::StrategyConfig;

/// Evidence bodies are cut to this many characters in text output.
const TEXT_PREVIEW_CHARS: usize = 160;

/// Output format for CLI commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    /// Human-readable text.
    #[default]
    Text,
    /// Pretty-printed JSON.
    Json,
}

impl OutputFormat {
    /// Parses a format name; anything unrecognized falls back to text.
    #[must_use]
    pub fn parse(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "json" => Self::Json,
            _ => Self::Text,
        }
    }

    /// Serializes a value as pretty JSON.
    #[must_use]
    pub fn to_json<T: Serialize + ?Sized>(self, value: &T) -> String {
        serde_json::to_string_pretty(value)
            .map(|mut s| {
                s.push('\n');
                s
            })
            .unwrap_or_else(|e| format!("{{\"error\": \"serialization failed: {e}\"}}\n"))
    }
}

fn preview(text: &str) -> String {
    let flat = text.split_whitespace().collect::<Vec<_>>().join(" ");
    match flat.char_indices().nth(TEXT_PREVIEW_CHARS) {
        Some((idx, _)) => format!("{}...", &flat[..idx]),
        None => flat,
    }
}

/// Serialized name of a unit enum variant.
fn wire_name<T: Serialize>(value: &T) -> String {
    serde_json::to_value(value)
        .ok()
        .and_then(|v| v.as_str().map(str::to_string))
        .unwrap_or_default()
}

/// Formats a query response as text.
#[must_use]
pub fn format_response(response: &QueryResponse) -> String {
    let mut out = format!(
        "Status: {} (strategy: {}, {:.2}s)\n",
        response.status,
        response.strategy,
        response.elapsed.as_secs_f64()
    );

    if let Some(error) = &response.error {
        out.push_str(&format!("Error [{}]: {}\n", error.kind, error.summary));
    }

    if let Some(answer) = &response.answer {
        out.push_str(&format!(
            "\nAnswer (confidence {:.2}, {}/{} claims supported):\n{}\n",
            answer.confidence, answer.claims_supported, answer.claims_total, answer.text
        ));
        let flagged: Vec<_> = answer.flagged_at_least(Severity::Low).collect();
        if !flagged.is_empty() {
            out.push_str("\nFlagged claims:\n");
            for claim in flagged {
                out.push_str(&format!(
                    "  [{}] {}: {}\n",
                    claim.severity, claim.reason, claim.claim
                ));
            }
        }
    }

    if !response.evidence.is_empty() {
        out.push_str(&format!("\nEvidence ({}):\n", response.evidence.len()));
        for (rank, scored) in response.evidence.iter().enumerate() {
            let item = &scored.item;
            let _ = writeln!(
                out,
                "  [{}] {:.3} {} {} | {}",
                evidence_label(rank),
                scored.normalized_score,
                item.source,
                item.external_id,
                item.title
            );
            let body = preview(&item.body);
            if !body.is_empty() {
                let _ = writeln!(out, "       {body}");
            }
        }
    }

    let failing: Vec<_> = response
        .sources
        .iter()
        .filter(|s| s.status != SourceStatus::Ok)
        .collect();
    if !failing.is_empty() {
        out.push_str("\nDegraded sources:\n");
        for report in failing {
            let _ = writeln!(
                out,
                "  {} ({}){}{}",
                report.source,
                wire_name(&report.status),
                if report.required { " required" } else { "" },
                report
                    .summary
                    .as_deref()
                    .map(|s| format!(": {s}"))
                    .unwrap_or_default()
            );
        }
    }

    if let Some(trace) = &response.swarm {
        let _ = writeln!(
            out,
            "\nSwarm: {} sub-queries, {} hand-offs{}",
            trace.sub_queries.len(),
            trace.handoffs.len(),
            if trace.exhausted { ", hand-off depth exhausted" } else { "" }
        );
        for handoff in &trace.handoffs {
            let _ = writeln!(
                out,
                "  {} -> {} (depth {}): {}",
                handoff.from, handoff.to, handoff.depth, handoff.sub_query
            );
        }
    }

    for warning in &response.warnings {
        let _ = writeln!(out, "Warning: {}", warning.kind());
    }

    out
}

/// Formats the strategy table as text.
#[must_use]
pub fn format_strategies(table: &[StrategyConfig]) -> String {
    let mut out = format!(
        "{:<14} {:>5} {:>9} {:>10} {:>6}  {:<14} {:<9} families\n",
        "strategy", "cap", "timeout", "deadline", "total", "required", "synthesis"
    );
    for row in table {
        let families: Vec<&str> = row.families.iter().map(|f| f.as_str()).collect();
        let _ = writeln!(
            out,
            "{:<14} {:>5} {:>8}ms {:>8}ms {:>6}  {:<14} {:<9} {}{}",
            row.name.as_str(),
            row.per_source_cap,
            row.per_source_timeout.as_millis(),
            row.deadline.as_millis(),
            row.total_cap,
            wire_name(&row.required),
            wire_name(&row.synthesis),
            families.join(","),
            if row.multi_agent { " (multi-agent)" } else { "" }
        );
    }
    out
}
