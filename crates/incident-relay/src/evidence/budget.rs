//! Line and character budgets for the rendered report.
//!
//! Lines are allocated in priority order (tail, anomalies, container errors)
//! and kept oldest-first. Characters are then reclaimed from the lowest
//! priority section first, newest line first, re-rendering once per batch of
//! cuts.

use super::Evidence;
use crate::report::truncate_chars;

/// Appended when the rendered text itself has to be cut.
pub const TRUNCATION_MARKER: &str = "\n…(truncated)…";

/// Size ceiling for one report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Budget {
    /// Log lines across all three sections
    pub max_lines: usize,
    /// Characters of rendered text
    pub max_chars: usize,
}

/// Allocate `max_lines` across the sections in priority order.
///
/// Earlier sections take up to their natural size; whatever remains cascades
/// to the next one.
pub fn apply_line_budget(evidence: &mut Evidence, max_lines: usize) {
    let mut remaining = max_lines;
    for section in evidence.sections_mut() {
        let keep = section.lines.len().min(remaining);
        section.shrink_to(keep);
        remaining -= keep;
    }
}

/// Drop the newest line of the lowest-priority non-empty section, returning
/// the character length of its body.
fn drop_lowest_priority_line(evidence: &mut Evidence) -> Option<usize> {
    for section in evidence.sections_mut().into_iter().rev() {
        if let Some(line) = section.lines.pop() {
            section.truncated = true;
            section.dropped_count += 1;
            return Some(line.body.chars().count());
        }
    }
    None
}

/// Drop lines in priority order until their bodies add up to `excess`
/// characters.
///
/// A body never renders shorter than itself, so the batch never removes more
/// lines than the overshoot requires. Returns `false` if nothing was left to
/// drop.
fn drop_lines_covering(evidence: &mut Evidence, excess: usize) -> bool {
    let mut reclaimed = 0;
    let mut dropped = false;
    while !dropped || reclaimed < excess {
        match drop_lowest_priority_line(evidence) {
            Some(chars) => {
                reclaimed += chars;
                dropped = true;
            }
            None => return dropped,
        }
    }
    true
}

/// Enforce both budgets, returning the trimmed evidence and its final text.
///
/// `render` must be deterministic; it is called again after each batch of
/// cuts. The returned text is guaranteed to be at most `budget.max_chars`
/// characters even when the fixed parts of the report alone exceed it.
pub fn fit_to_budget<F>(mut evidence: Evidence, budget: Budget, render: F) -> (Evidence, String)
where
    F: Fn(&Evidence) -> String,
{
    apply_line_budget(&mut evidence, budget.max_lines);

    loop {
        let text = render(&evidence);
        let chars = text.chars().count();
        if chars <= budget.max_chars {
            return (evidence, text);
        }
        if !drop_lines_covering(&mut evidence, chars - budget.max_chars) {
            return (evidence, clamp_chars(&text, budget.max_chars));
        }
    }
}

/// Cut `text` to `max_chars` characters, ending with [`TRUNCATION_MARKER`]
/// when there is room for it.
#[must_use]
pub fn clamp_chars(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let marker_len = TRUNCATION_MARKER.chars().count();
    if max_chars <= marker_len {
        return truncate_chars(text, max_chars).to_string();
    }
    let mut out = truncate_chars(text, max_chars - marker_len).to_string();
    out.push_str(TRUNCATION_MARKER);
    out
}
