use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::scanner::ScanOptions;
use crate::splitter::{split_statements_with, StatementSpan};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionMode {
    All,
    Selection,
    #[default]
    Smart,
}

impl ExecutionMode {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::All => "all",
            Self::Selection => "selection",
            Self::Smart => "smart",
        }
    }
}

impl fmt::Display for ExecutionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown execution mode `{0}` (expected all, selection or smart)")]
pub struct ParseExecutionModeError(String);

impl FromStr for ExecutionMode {
    type Err = ParseExecutionModeError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "all" => Ok(Self::All),
            "selection" => Ok(Self::Selection),
            "smart" => Ok(Self::Smart),
            _ => Err(ParseExecutionModeError(value.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetSource {
    Empty,
    Full,
    Selection,
    Statement,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionTarget {
    pub query: String,
    pub source: TargetSource,
}

impl ExecutionTarget {
    fn new(query: &str, source: TargetSource) -> Self {
        Self {
            query: query.to_string(),
            source,
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.source == TargetSource::Empty
    }
}

/// Decides what an "execute" command runs. `selection_start` doubles as the
/// cursor offset; offsets are bytes and are clamped into the text.
#[must_use]
pub fn pick_execution_target(
    full_text: &str,
    selection_start: usize,
    selection_end: usize,
    mode: ExecutionMode,
) -> ExecutionTarget {
    pick_execution_target_with(
        full_text,
        selection_start,
        selection_end,
        mode,
        ScanOptions::default(),
    )
}

#[must_use]
pub fn pick_execution_target_with(
    full_text: &str,
    selection_start: usize,
    selection_end: usize,
    mode: ExecutionMode,
    options: ScanOptions,
) -> ExecutionTarget {
    let trimmed = full_text.trim();
    if mode == ExecutionMode::All {
        let source = if trimmed.is_empty() {
            TargetSource::Empty
        } else {
            TargetSource::Full
        };
        return ExecutionTarget::new(trimmed, source);
    }

    let start = floor_char_boundary(full_text, selection_start.min(selection_end));
    let end = floor_char_boundary(full_text, selection_start.max(selection_end));
    let selected = full_text[start..end].trim();
    if !selected.is_empty() {
        return ExecutionTarget::new(selected, TargetSource::Selection);
    }

    let statements = split_statements_with(full_text, options);
    match statement_at_cursor(&statements, selection_start) {
        Some(statement) => ExecutionTarget::new(&statement.query, TargetSource::Statement),
        None => ExecutionTarget::new(trimmed, TargetSource::Full),
    }
}

/// Statement containing the cursor (inclusive bounds), else the nearest one
/// ending before it, else the first.
#[must_use]
pub fn statement_at_cursor(statements: &[StatementSpan], cursor: usize) -> Option<&StatementSpan> {
    statements
        .iter()
        .find(|span| span.start <= cursor && cursor <= span.end)
        .or_else(|| statements.iter().rev().find(|span| span.end <= cursor))
        .or_else(|| statements.first())
}

fn floor_char_boundary(text: &str, offset: usize) -> usize {
    let mut offset = offset.min(text.len());
    while !text.is_char_boundary(offset) {
        offset -= 1;
    }
    offset
}
