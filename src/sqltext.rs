//! Lightweight textual SQL inspection.
//!
//! Shared by the linter, the retry loop, and the templating layer. These
//! helpers scan the raw query text with keyword patterns instead of a full
//! parser: the pipeline only needs table references, join clauses, and
//! predicate spans, and must keep working on drafts a parser would reject.
//!
//! Known limits: comma-separated table lists after `FROM` yield only the
//! first table, and clause boundaries ignore parenthesis nesting. Derived
//! tables (`FROM (SELECT ...) x`) are skipped entirely.

use std::sync::LazyLock;

use compact_str::CompactString;
use indexmap::IndexMap;
use regex::Regex;
use smallvec::SmallVec;

/// Table references extracted from one query.
pub type TableList = SmallVec<[TableRef; 4]>;

/// A table referenced after `FROM` or `JOIN`, with its alias when present.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableRef {
    pub table: CompactString,
    pub alias: Option<CompactString>
}

/// Regex for a table token after FROM or JOIN with an optional alias.
/// Matches: `FROM fact_invoice inv`, `JOIN documents AS d`, `FROM vendors`
static TABLE_REF_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(FROM|JOIN)\s+([A-Za-z_][A-Za-z0-9_.]*)(?:\s+(?:AS\s+)?([A-Za-z_][A-Za-z0-9_]*))?"
    )
    .expect("valid regex")
});

/// Regex for the start of a join clause including its modifier prefix.
/// Matches: `JOIN`, `LEFT JOIN`, `FULL OUTER JOIN`
static JOIN_START_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:(?:LEFT|RIGHT|INNER|FULL|CROSS)\s+(?:OUTER\s+)?)?JOIN\b")
        .expect("valid regex")
});

/// Regex for the keywords terminating a join clause.
static JOIN_BOUNDARY_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(?:WHERE|ORDER|GROUP)\b").expect("valid regex"));

/// Regex for the ON keyword of a join predicate.
static ON_KEYWORD_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bON\b").expect("valid regex"));

/// Regex for the keywords terminating an ON predicate span.
static ON_BOUNDARY_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(?:(?:LEFT|RIGHT|INNER|FULL|CROSS)\s+(?:OUTER\s+)?JOIN|JOIN|WHERE|GROUP\s+BY|ORDER\s+BY|HAVING|LIMIT|UNION)\b"
    )
    .expect("valid regex")
});

/// Regex for common-table-expression names: `name AS (`.
static CTE_NAME_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b([A-Za-z_][A-Za-z0-9_]*)\s+AS\s*\(").expect("valid regex")
});

/// Keywords that must not be mistaken for a table alias.
const NON_ALIAS_KEYWORDS: &[&str] = &[
    "WHERE", "ON", "JOIN", "LEFT", "RIGHT", "INNER", "OUTER", "FULL", "CROSS", "NATURAL",
    "LATERAL", "GROUP", "ORDER", "LIMIT", "HAVING", "UNION", "SET", "USING", "AND", "OR",
    "SELECT", "AS",
];

/// Extract every table referenced after FROM or JOIN, in query order.
pub fn referenced_tables(query: &str) -> TableList {
    let mut tables = TableList::new();
    for cap in TABLE_REF_REGEX.captures_iter(query) {
        let Some(table) = cap.get(2) else {
            continue;
        };
        let alias = cap
            .get(3)
            .map(|m| m.as_str())
            .filter(|a| !is_keyword(a))
            .map(CompactString::from);
        tables.push(TableRef {
            table: CompactString::from(table.as_str()),
            alias
        });
    }
    tables
}

/// The first table named after FROM; the primary target of the query.
pub fn target_table(query: &str) -> Option<CompactString> {
    TABLE_REF_REGEX
        .captures_iter(query)
        .find(|cap| cap.get(1).is_some_and(|k| k.as_str().eq_ignore_ascii_case("FROM")))
        .and_then(|cap| cap.get(2).map(|m| CompactString::from(m.as_str())))
}

/// Map every alias (and every bare table name) to its table.
///
/// Later definitions win, which matches how duplicated aliases shadow in
/// hand-written SQL. Keys are stored lowercase.
pub fn alias_map(query: &str) -> IndexMap<CompactString, CompactString> {
    let mut map = IndexMap::new();
    for table_ref in referenced_tables(query) {
        let table = table_ref.table.clone();
        map.insert(lowercase(&table_ref.table), table.clone());
        if let Some(alias) = table_ref.alias {
            map.insert(lowercase(&alias), table);
        }
    }
    map
}

/// Extract each join clause: from the JOIN keyword to the next
/// JOIN/WHERE/ORDER/GROUP boundary (or end of query).
pub fn join_clauses(query: &str) -> Vec<String> {
    let starts: Vec<_> = JOIN_START_REGEX.find_iter(query).collect();
    let mut clauses = Vec::with_capacity(starts.len());

    for (idx, m) in starts.iter().enumerate() {
        // Clause text starts at the JOIN token itself, not its modifier.
        let clause_start = m.end() - "JOIN".len();
        let next_join = starts.get(idx + 1).map(|n| n.start());
        let next_boundary = JOIN_BOUNDARY_REGEX
            .find_at(query, m.end())
            .map(|b| b.start());
        let end = match (next_join, next_boundary) {
            (Some(j), Some(b)) => j.min(b),
            (Some(j), None) => j,
            (None, Some(b)) => b,
            (None, None) => query.len()
        };
        let clause = query[clause_start..end].trim();
        if !clause.is_empty() {
            clauses.push(clause.to_string());
        }
    }

    clauses
}

/// Byte spans of each join predicate: from just after the ON keyword to
/// the next clause boundary.
pub fn on_spans(query: &str) -> Vec<(usize, usize)> {
    ON_KEYWORD_REGEX
        .find_iter(query)
        .map(|m| {
            let end = ON_BOUNDARY_REGEX
                .find_at(query, m.end())
                .map_or(query.len(), |b| b.start());
            (m.end(), end)
        })
        .collect()
}

/// Names defined by `WITH name AS (...)`; aliases resolving to these are
/// skipped by schema-aware checks.
pub fn cte_names(query: &str) -> Vec<CompactString> {
    CTE_NAME_REGEX
        .captures_iter(query)
        .filter_map(|cap| cap.get(1))
        .map(|m| lowercase(m.as_str()))
        .collect()
}

/// Blank out single-quoted literal contents while preserving byte offsets.
pub fn mask_string_literals(query: &str) -> String {
    let mut masked = String::with_capacity(query.len());
    let mut in_literal = false;
    for ch in query.chars() {
        if ch == '\'' {
            in_literal = !in_literal;
            masked.push('\'');
        } else if in_literal {
            // One space per byte keeps downstream match offsets valid.
            for _ in 0..ch.len_utf8() {
                masked.push(' ');
            }
        } else {
            masked.push(ch);
        }
    }
    masked
}

/// Whether `word` occurs as a whole identifier token in `text`.
///
/// Splits on anything outside `[A-Za-z0-9_]`, so `documents` does not
/// match inside `documents_archive` or `a.documents_log`.
pub fn contains_word(text: &str, word: &str) -> bool {
    text.split(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
        .any(|token| token == word)
}

/// Whitespace-and-case-insensitive containment check.
///
/// Used for guard detection, where `NULLIF( x ->> 'value' , '' )` and
/// `NULLIF(x->>'value','')` must compare equal.
pub fn contains_normalized(haystack: &str, needle: &str) -> bool {
    squash(haystack).contains(&squash(needle))
}

fn squash(text: &str) -> String {
    text.chars()
        .filter(|c| !c.is_whitespace())
        .map(|c| c.to_ascii_lowercase())
        .collect()
}

fn lowercase(text: &str) -> CompactString {
    CompactString::from(text.to_ascii_lowercase())
}

fn is_keyword(token: &str) -> bool {
    NON_ALIAS_KEYWORDS
        .iter()
        .any(|k| k.eq_ignore_ascii_case(token))
}
