use std::collections::{HashMap, HashSet};

use crate::charclass::{is_identifier_part, is_identifier_start};
use crate::scanner::{ScanOptions, ScannedChar, Scanner};

/// A `:name` placeholder found in code. `start..end` covers the colon and
/// the name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Placeholder<'a> {
    pub name: &'a str,
    pub start: usize,
    pub end: usize,
}

/// Placeholders outside quotes and comments, in source order. A colon next to
/// another colon (`::` casts) never starts a placeholder.
#[must_use]
pub fn find_placeholders(sql: &str, options: ScanOptions) -> Vec<Placeholder<'_>> {
    let scanned: Vec<ScannedChar> = Scanner::new(sql, options).collect();
    let mut placeholders = Vec::new();
    let mut index = 0;

    while index < scanned.len() {
        let current = scanned[index];
        let prev_is_colon = index > 0 && scanned[index - 1].ch == ':';
        let starts_name = scanned
            .get(index + 1)
            .is_some_and(|next| next.is_code() && is_identifier_start(next.ch));

        if !current.is_code() || current.ch != ':' || prev_is_colon || !starts_name {
            index += 1;
            continue;
        }

        let mut name_end = index + 1;
        while scanned
            .get(name_end)
            .is_some_and(|c| c.is_code() && is_identifier_part(c.ch))
        {
            name_end += 1;
        }

        let end = scanned.get(name_end).map_or(sql.len(), |c| c.offset);
        placeholders.push(Placeholder {
            name: &sql[current.end()..end],
            start: current.offset,
            end,
        });
        index = name_end;
    }

    placeholders
}

#[must_use]
pub fn extract_parameter_names(sql: &str) -> Vec<String> {
    extract_parameter_names_with(sql, ScanOptions::default())
}

/// Unique placeholder names in first-occurrence order.
#[must_use]
pub fn extract_parameter_names_with(sql: &str, options: ScanOptions) -> Vec<String> {
    let mut seen = HashSet::new();
    find_placeholders(sql, options)
        .into_iter()
        .filter(|placeholder| seen.insert(placeholder.name))
        .map(|placeholder| placeholder.name.to_string())
        .collect()
}

#[must_use]
pub fn apply_parameters(sql: &str, values: &HashMap<String, String>) -> String {
    apply_parameters_with(sql, values, ScanOptions::default())
}

/// Replaces bound placeholders with their values verbatim; unbound ones are
/// left untouched, colon included.
#[must_use]
pub fn apply_parameters_with(
    sql: &str,
    values: &HashMap<String, String>,
    options: ScanOptions,
) -> String {
    let mut output = String::with_capacity(sql.len());
    let mut copied_to = 0;

    for placeholder in find_placeholders(sql, options) {
        let Some(value) = values.get(placeholder.name) else {
            continue;
        };
        output.push_str(&sql[copied_to..placeholder.start]);
        output.push_str(value);
        copied_to = placeholder.end;
    }
    output.push_str(&sql[copied_to..]);

    output
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::{apply_parameters, extract_parameter_names, find_placeholders, Placeholder};
    use crate::scanner::ScanOptions;

    fn values(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(name, value)| ((*name).to_string(), (*value).to_string()))
            .collect()
    }

    #[test]
    fn extracts_names_in_first_occurrence_order() {
        assert_eq!(
            extract_parameter_names("SELECT * FROM t WHERE id = :id AND name = :name"),
            vec!["id", "name"]
        );
        assert_eq!(
            extract_parameter_names("SELECT :b, :a, :b, :a_1"),
            vec!["b", "a", "a_1"]
        );
    }

    #[test]
    fn double_colon_casts_are_not_parameters() {
        assert!(extract_parameter_names("SELECT x::int").is_empty());
        assert!(extract_parameter_names("SELECT x:::y").is_empty());
        assert_eq!(extract_parameter_names("SELECT :a::text"), vec!["a"]);
    }

    #[test]
    fn quoted_and_commented_placeholders_are_ignored() {
        let sql = "SELECT ':a', \":b\", `:c` -- :d\n/* :e */ FROM t WHERE x = :f # :g";
        assert_eq!(extract_parameter_names(sql), vec!["f"]);
    }

    #[test]
    fn colon_must_be_followed_by_identifier_start() {
        assert!(extract_parameter_names("SELECT :1, : a, 'x':").is_empty());
        assert_eq!(extract_parameter_names("SELECT :_tmp"), vec!["_tmp"]);
    }

    #[test]
    fn placeholders_carry_byte_ranges() {
        let sql = "é = :name;";
        assert_eq!(
            find_placeholders(sql, ScanOptions::default()),
            vec![Placeholder {
                name: "name",
                start: 5,
                end: 10,
            }]
        );
    }

    #[test]
    fn applies_bound_values() {
        assert_eq!(
            apply_parameters("WHERE id = :id", &values(&[("id", "5")])),
            "WHERE id = 5"
        );
        assert_eq!(
            apply_parameters("a = :x OR b = :x", &values(&[("x", "'q'")])),
            "a = 'q' OR b = 'q'"
        );
    }

    #[test]
    fn unbound_placeholders_are_left_verbatim() {
        assert_eq!(
            apply_parameters("WHERE a = :id AND b = :missing", &values(&[("id", "1")])),
            "WHERE a = 1 AND b = :missing"
        );
    }

    #[test]
    fn substitution_preserves_quotes_comments_and_casts() {
        let sql = "SELECT ':id', :id::int -- :id\nFROM t";
        assert_eq!(
            apply_parameters(sql, &values(&[("id", "42"), ("int", "oops")])),
            "SELECT ':id', 42::int -- :id\nFROM t"
        );
    }

    #[test]
    fn longest_identifier_is_matched() {
        assert_eq!(
            apply_parameters(":id_2 :id", &values(&[("id", "1")])),
            ":id_2 1"
        );
    }
}
