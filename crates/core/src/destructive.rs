use std::fmt;
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::scanner::{mask, ScanOptions};
use crate::splitter::{split_statements_with, StatementSpan};

pub const DEFAULT_PREVIEW_CHARS: usize = 140;

static UPDATE_RE: OnceLock<Regex> = OnceLock::new();
static DELETE_RE: OnceLock<Regex> = OnceLock::new();
static WHERE_RE: OnceLock<Regex> = OnceLock::new();

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum DestructiveKind {
    Update,
    Delete,
}

impl DestructiveKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Update => "UPDATE",
            Self::Delete => "DELETE",
        }
    }
}

impl fmt::Display for DestructiveKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DestructiveFinding {
    /// 1-based position of the statement in the script.
    pub statement_index: usize,
    #[serde(rename = "type")]
    pub kind: DestructiveKind,
    pub preview: String,
    pub query: String,
}

/// Flags `UPDATE`/`DELETE FROM` statements that have no `WHERE` outside of
/// quotes and comments.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatementAuditor {
    options: ScanOptions,
    preview_chars: usize,
}

impl Default for StatementAuditor {
    fn default() -> Self {
        Self::new(ScanOptions::default())
    }
}

impl StatementAuditor {
    #[must_use]
    pub fn new(options: ScanOptions) -> Self {
        Self {
            options,
            preview_chars: DEFAULT_PREVIEW_CHARS,
        }
    }

    #[must_use]
    pub fn with_preview_chars(mut self, preview_chars: usize) -> Self {
        self.preview_chars = preview_chars;
        self
    }

    #[must_use]
    pub fn scan_options(&self) -> ScanOptions {
        self.options
    }

    #[must_use]
    pub fn audit(&self, sql: &str) -> Vec<DestructiveFinding> {
        let mut statements = split_statements_with(sql, self.options);
        if statements.is_empty() {
            let trimmed = sql.trim();
            if trimmed.is_empty() {
                return Vec::new();
            }
            let start = sql.len() - sql.trim_start().len();
            statements.push(StatementSpan {
                query: trimmed.to_string(),
                start,
                end: start + trimmed.len(),
            });
        }

        statements
            .iter()
            .enumerate()
            .filter_map(|(index, statement)| {
                let kind = self.classify(&statement.query)?;
                log::debug!("statement {} is an unguarded {kind}", index + 1);
                Some(DestructiveFinding {
                    statement_index: index + 1,
                    kind,
                    preview: preview(&statement.query, self.preview_chars),
                    query: statement.query.clone(),
                })
            })
            .collect()
    }

    /// Returns the verb when `statement` is an `UPDATE` or `DELETE FROM`
    /// lacking a `WHERE` token.
    #[must_use]
    pub fn classify(&self, statement: &str) -> Option<DestructiveKind> {
        let normalized = normalize_for_matching(statement, self.options);
        let kind = if update_re().is_match(&normalized) {
            DestructiveKind::Update
        } else if delete_re().is_match(&normalized) {
            DestructiveKind::Delete
        } else {
            return None;
        };

        if where_re().is_match(&normalized) {
            None
        } else {
            Some(kind)
        }
    }
}

#[must_use]
pub fn find_unsafe_statements(sql: &str) -> Vec<DestructiveFinding> {
    StatementAuditor::default().audit(sql)
}

/// Masked, whitespace-collapsed, uppercased form used for keyword matching.
#[must_use]
pub fn normalize_for_matching(statement: &str, options: ScanOptions) -> String {
    mask(statement, options)
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_uppercase()
}

fn preview(query: &str, max_chars: usize) -> String {
    query
        .lines()
        .next()
        .unwrap_or_default()
        .trim_end()
        .chars()
        .take(max_chars)
        .collect()
}

fn update_re() -> &'static Regex {
    UPDATE_RE.get_or_init(|| Regex::new(r"^UPDATE\b").expect("update pattern is valid"))
}

fn delete_re() -> &'static Regex {
    DELETE_RE.get_or_init(|| Regex::new(r"^DELETE\s+FROM\b").expect("delete pattern is valid"))
}

fn where_re() -> &'static Regex {
    WHERE_RE.get_or_init(|| Regex::new(r"\bWHERE\b").expect("where pattern is valid"))
}
