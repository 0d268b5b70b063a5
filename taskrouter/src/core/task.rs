//! Parsing of routing lines into [`RoutedTask`] values.
//!
//! A routing line is either `"<Agent>: <instruction>"` or the `DONE` sentinel
//! followed by an optional summary on the following lines. Parsing happens once
//! at the boundary; downstream code only sees the tagged value.

use std::sync::LazyLock;

use regex::Regex;

use crate::core::types::RouteError;

/// Literal marker that finalizes a workflow.
pub const DONE_MARKER: &str = "DONE";

static INSTRUCTION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)^(\w+):\s*(.+)$").expect("valid instruction regex"));

/// A routing line after parsing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoutedTask {
    /// Delegate `text` to the agent named `agent` (display name, not yet resolved).
    Instruction { agent: String, text: String },
    /// Finalize the workflow with an optional summary.
    Complete { summary: Option<String> },
}

/// Parse a raw routing line.
///
/// Leading and trailing whitespace is ignored. The `DONE` marker is matched
/// case-insensitively; anything else must follow the instruction grammar.
pub fn parse_task(raw: &str) -> Result<RoutedTask, RouteError> {
    let task = raw.trim();

    if starts_with_done(task) {
        let summary = task
            .split_once('\n')
            .map(|(_, rest)| rest.trim())
            .filter(|rest| !rest.is_empty())
            .map(str::to_string);
        return Ok(RoutedTask::Complete { summary });
    }

    let captures = INSTRUCTION_RE
        .captures(task)
        .ok_or_else(|| RouteError::InputFormat {
            raw: raw.to_string(),
        })?;
    Ok(RoutedTask::Instruction {
        agent: captures[1].to_string(),
        text: captures[2].to_string(),
    })
}

fn starts_with_done(task: &str) -> bool {
    task.get(..DONE_MARKER.len())
        .is_some_and(|head| head.eq_ignore_ascii_case(DONE_MARKER))
}
