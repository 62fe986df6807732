use serde::{Deserialize, Serialize};

use crate::scanner::{ScanOptions, Scanner};

/// One top-level statement. `query` is the trimmed text and always equals
/// `source[start..end]`; the terminating `;`, when present, is included.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatementSpan {
    pub query: String,
    pub start: usize,
    pub end: usize,
}

#[must_use]
pub fn split_statements(sql: &str) -> Vec<StatementSpan> {
    split_statements_with(sql, ScanOptions::default())
}

#[must_use]
pub fn split_statements_with(sql: &str, options: ScanOptions) -> Vec<StatementSpan> {
    let mut spans = Vec::new();
    let mut segment_start = 0;

    for scanned in Scanner::new(sql, options) {
        if scanned.is_code() && scanned.ch == ';' {
            push_segment(sql, segment_start, scanned.offset, scanned.end(), &mut spans);
            segment_start = scanned.end();
        }
    }
    push_segment(sql, segment_start, sql.len(), sql.len(), &mut spans);

    spans
}

fn push_segment(
    sql: &str,
    start: usize,
    body_end: usize,
    end: usize,
    spans: &mut Vec<StatementSpan>,
) {
    if sql[start..body_end].trim().is_empty() {
        return;
    }

    let raw = &sql[start..end];
    let without_leading = raw.trim_start();
    let query = without_leading.trim_end();
    let span_start = start + (raw.len() - without_leading.len());

    spans.push(StatementSpan {
        query: query.to_string(),
        start: span_start,
        end: span_start + query.len(),
    });
}
