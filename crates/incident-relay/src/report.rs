//! Markdown rendering of the incident comment.
//!
//! Rendering is pure and deterministic: the same alert, windows and evidence
//! always produce byte-identical text.

use std::fmt::Write as _;

use chrono::SecondsFormat;

use crate::evidence::{Evidence, IncidentWindows, LogLine, LogSection};
use crate::webhooks::AlertEvent;

/// Marker shown for a section with nothing in it.
pub const EMPTY_SECTION_MARKER: &str = "_No logs in window._";

/// Default cap on the raw payload attachment, in characters.
pub const DEFAULT_PAYLOAD_MAX_CHARS: usize = 6000;

const MAX_FAILURE_REASON_CHARS: usize = 200;

/// Longest prefix of `text` holding at most `max_chars` characters.
#[must_use]
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

/// Renders incident reports.
#[derive(Debug, Clone)]
pub struct ReportComposer {
    mention_handle: String,
    payload_max_chars: usize,
}

impl ReportComposer {
    #[must_use]
    pub fn new(mention_handle: &str, payload_max_chars: usize) -> Self {
        Self {
            mention_handle: mention_handle.trim().trim_start_matches('@').to_string(),
            payload_max_chars,
        }
    }

    /// Render the full comment body.
    #[must_use]
    pub fn render(&self, alert: &AlertEvent, windows: &IncidentWindows, evidence: &Evidence) -> String {
        let mut out = String::new();

        if self.mention_handle.is_empty() {
            let _ = writeln!(out, "Incident: {}\n", alert.condition);
        } else {
            let _ = writeln!(out, "Paging @{}: {}\n", self.mention_handle, alert.condition);
        }

        let _ = writeln!(
            out,
            "**Incident window:** `{} – {}` (±{}m)",
            windows.incident.start_rfc3339(),
            windows.incident.end_rfc3339(),
            windows.window_min
        );
        let _ = writeln!(
            out,
            "**Tail window:** `{} – {}` ({}m before trigger)",
            windows.tail.start_rfc3339(),
            windows.tail.end_rfc3339(),
            windows.pre_min
        );
        let _ = writeln!(
            out,
            "**Affected services:** `{}`",
            services_list(&alert.affected_services)
        );
        if let Some(url) = &alert.incident_url {
            let _ = writeln!(out, "**Incident:** {url}");
        }

        for section in evidence.sections() {
            out.push('\n');
            render_section(&mut out, section);
        }

        out.push('\n');
        self.render_payload(&mut out, &alert.raw_payload);
        out
    }

    fn render_payload(&self, out: &mut String, raw: &str) {
        let mut payload = truncate_chars(raw, self.payload_max_chars).to_string();
        if payload.len() < raw.len() {
            payload.push_str("\n…(payload truncated)…");
        }
        let fence = fence_for(&payload);
        let _ = write!(
            out,
            "<details><summary>Raw webhook payload</summary>\n\n{fence}json\n{payload}\n{fence}\n</details>"
        );
    }
}

/// Deduplicated, insertion-ordered service list.
fn services_list(services: &[String]) -> String {
    let mut seen: Vec<&str> = Vec::new();
    for service in services {
        if !seen.contains(&service.as_str()) {
            seen.push(service);
        }
    }
    if seen.is_empty() {
        "unknown".to_string()
    } else {
        seen.join(", ")
    }
}

fn render_section(out: &mut String, section: &LogSection) {
    let _ = writeln!(out, "**{}:**", section.category.title());

    if section.lines.is_empty() {
        if let Some(reason) = &section.failure {
            let reason = truncate_chars(reason, MAX_FAILURE_REASON_CHARS).replace('\n', " ");
            let _ = writeln!(out, "{EMPTY_SECTION_MARKER} (log query failed: {reason})");
        } else if section.dropped_count > 0 {
            let _ = writeln!(
                out,
                "_{} line(s) omitted to fit the report size limit._",
                section.dropped_count
            );
        } else {
            let _ = writeln!(out, "{EMPTY_SECTION_MARKER}");
        }
        return;
    }

    let entries = section
        .lines
        .iter()
        .enumerate()
        .map(|(i, line)| format_line(i + 1, line))
        .collect::<Vec<_>>()
        .join("\n\n");
    let fence = fence_for(&entries);
    let _ = writeln!(out, "{fence}\n{entries}\n{fence}");

    if section.truncated {
        let _ = writeln!(out, "… {} more line(s) omitted", section.dropped_count);
    }
}

fn format_line(index: usize, line: &LogLine) -> String {
    let mut row = format!(
        "{index:02} {} {} svc={}",
        line.timestamp.to_rfc3339_opts(SecondsFormat::AutoSi, true),
        line.severity,
        line.service.as_deref().unwrap_or("unknown")
    );
    if let Some(status) = line.http_status {
        let _ = write!(row, " status={status}");
    }
    if let Some(method) = &line.method {
        let _ = write!(row, " {method}");
    }
    if let Some(url) = &line.url {
        let _ = write!(row, " {url}");
    }
    if !line.body.is_empty() {
        row.push('\n');
        row.push_str(&line.body);
    }
    row
}

/// A backtick fence longer than any backtick run inside `content`.
fn fence_for(content: &str) -> String {
    let mut longest = 0;
    let mut run = 0;
    for c in content.chars() {
        if c == '`' {
            run += 1;
            longest = longest.max(run);
        } else {
            run = 0;
        }
    }
    "`".repeat((longest + 1).max(3))
}
