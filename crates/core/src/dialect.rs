//! MySQL to PostgreSQL rewrites offered as retry candidates after a failed
//! query. Nothing here is authoritative: callers treat a second failure as
//! final.

use std::borrow::Cow;
use std::sync::OnceLock;

use regex::Regex;

use crate::scanner::{Region, Role, ScanOptions, Scanner};

static RELATION_RE: OnceLock<Regex> = OnceLock::new();

fn relation_re() -> &'static Regex {
    RELATION_RE.get_or_init(|| {
        Regex::new(r#"(?i)\brelation\s+((?:["`]?[^\s"`.]+["`]?\.)+["`]?[^\s"`.]+["`]?)"#)
            .expect("relation pattern is valid")
    })
}

#[must_use]
pub fn translate_mysql_to_postgres(sql: &str) -> Cow<'_, str> {
    translate_mysql_to_postgres_with(sql, ScanOptions::default())
}

/// Rewrites `` `name` `` identifiers as `"name"`, doubling embedded `"`.
/// Dollar-quoted bodies, strings and comments are copied verbatim.
#[must_use]
pub fn translate_mysql_to_postgres_with(sql: &str, options: ScanOptions) -> Cow<'_, str> {
    if !sql.contains('`') {
        return Cow::Borrowed(sql);
    }

    let mut output = String::with_capacity(sql.len() + 8);
    for scanned in Scanner::new(sql, options.with_dollar_quotes()) {
        match (scanned.region, scanned.role, scanned.ch) {
            (Region::Backticked, Role::Open | Role::Close, _) => output.push('"'),
            (Region::Backticked, Role::Body, '"') => output.push_str("\"\""),
            (_, _, ch) => output.push(ch),
        }
    }
    Cow::Owned(output)
}

/// Drops a `qualifier.`, `` `qualifier`. `` or `"qualifier".` prefix in front
/// of any identifier. Plain regex substitution; quotes are not respected.
#[must_use]
pub fn strip_qualifier<'a>(sql: &'a str, qualifier: &str) -> Cow<'a, str> {
    let qualifier = qualifier.trim();
    if qualifier.is_empty() {
        return Cow::Borrowed(sql);
    }

    let escaped = regex::escape(qualifier);
    let pattern = format!(r#"(?:`{escaped}`|"{escaped}"|\b{escaped})\s*\.\s*([`"\p{{L}}_])"#);
    match Regex::new(&pattern) {
        Ok(re) => re.replace_all(sql, "${1}"),
        Err(err) => {
            log::debug!("cannot build qualifier pattern for `{qualifier}`: {err}");
            Cow::Borrowed(sql)
        }
    }
}

/// True when the error names a relation whose schema part is `database`,
/// e.g. `relation "app.users" does not exist`.
#[must_use]
pub fn error_names_qualified_relation(error_message: &str, database: &str) -> bool {
    let prefix = format!("{}.", database.trim().to_lowercase());
    relation_re().captures_iter(error_message).any(|captures| {
        let relation: String = captures[1]
            .chars()
            .filter(|ch| *ch != '"' && *ch != '`')
            .collect();
        relation.to_lowercase().starts_with(&prefix)
    })
}

#[must_use]
pub fn build_retry_candidates(
    query: &str,
    error_message: &str,
    active_database: Option<&str>,
) -> Vec<String> {
    build_retry_candidates_with(query, error_message, active_database, ScanOptions::default())
}

/// Alternate queries worth retrying after `query` failed with
/// `error_message`. Deduplicated, in preference order, never equal to the
/// original.
#[must_use]
pub fn build_retry_candidates_with(
    query: &str,
    error_message: &str,
    active_database: Option<&str>,
    options: ScanOptions,
) -> Vec<String> {
    let translated = translate_mysql_to_postgres_with(query, options);
    let mut candidates = Vec::new();

    if query.contains('`') {
        candidates.push(translated.to_string());
    }

    if let Some(database) = active_database.filter(|database| !database.trim().is_empty()) {
        if error_names_qualified_relation(error_message, database) {
            candidates.push(strip_qualifier(&translated, database).into_owned());
        }
    }

    let mut unique: Vec<String> = Vec::with_capacity(candidates.len());
    for candidate in candidates {
        if candidate != query && !unique.contains(&candidate) {
            unique.push(candidate);
        }
    }
    log::debug!("built {} retry candidate(s)", unique.len());
    unique
}
