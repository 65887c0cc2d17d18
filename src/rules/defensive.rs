//! Casting rules for JSON-extracted values.
//!
//! Extracted fields hold whatever the extraction layer produced, including
//! empty strings and free-form dates. A bare cast of `expr->>'value'`
//! aborts the whole query on the first malformed row, so every cast has to
//! pass through the documented guard forms checked here.
//!
//! Detection is pattern-based and covers the parenthesized canonical form
//! `(alias.column->>'value')::type`. Casts written without parentheses and
//! predicates split mid-token across lines are known false negatives.

use std::sync::LazyLock;

use regex::Regex;

use super::{Issue, LintContext, Rule, RuleCategory, RuleInfo, Severity};
use crate::sqltext::contains_normalized;

/// Types whose failed cast aborts a join lookup.
const REFERENCE_TYPES: &[&str] = &[
    "uuid", "text", "varchar", "int", "integer", "bigint", "smallint",
];

/// Types in the numeric cast family.
const NUMERIC_TYPES: &[&str] = &[
    "numeric", "decimal", "int", "integer", "bigint", "smallint", "real", "float", "float4",
    "float8", "double", "money",
];

/// Types in the date cast family.
const DATE_TYPES: &[&str] = &["date", "timestamp", "timestamptz"];

/// Regex for a parenthesized JSON extraction cast:
/// `(alias.column->>'value')::type`
static EXTRACT_CAST_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\(\s*([A-Za-z_]\w*(?:\.[A-Za-z_]\w*)?)\s*->>\s*'value'\s*\)\s*::\s*([A-Za-z]\w*)"
    )
    .expect("valid regex")
});

/// Regex for date arithmetic against a bare extracted field:
/// `CURRENT_DATE - alias.column->>'value'`
static DATE_ARITH_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(CURRENT_DATE|NOW\(\)|CURRENT_TIMESTAMP)\s*-\s*\(?\s*([A-Za-z_]\w*(?:\.[A-Za-z_]\w*)?)\s*->>\s*'value'"
    )
    .expect("valid regex")
});

/// The guard text a join predicate must contain for one extracted column.
pub(crate) fn join_guard(column_expr: &str) -> String {
    format!("NULLIF({}->>'value','')", column_expr)
}

/// Reference casts in join predicates without an empty-string guard
pub struct ReferenceJoinGuard;

impl Rule for ReferenceJoinGuard {
    fn info(&self) -> RuleInfo {
        RuleInfo {
            id:       "CAST001",
            name:     "Unguarded reference join cast",
            severity: Severity::Critical,
            category: RuleCategory::Casting
        }
    }

    fn check(&self, ctx: &LintContext) -> Vec<Issue> {
        let mut issues = Vec::new();
        for &(start, end) in &ctx.on_spans {
            let span = &ctx.query[start..end];
            for cap in EXTRACT_CAST_REGEX.captures_iter(span) {
                let Some(whole) = cap.get(0) else {
                    continue;
                };
                if ctx.in_literal(start + whole.start()) {
                    continue;
                }
                let ty = cap[2].to_ascii_lowercase();
                if !REFERENCE_TYPES.contains(&ty.as_str()) {
                    continue;
                }
                let col = cap[1].to_string();
                if contains_normalized(span, &join_guard(&col)) {
                    continue;
                }
                let info = self.info();
                issues.push(Issue {
                    rule_id: info.id,
                    rule_name: info.name,
                    message: format!(
                        "Join predicate casts {}->>'value' to {} without an empty-string guard; \
                         the first empty extracted value aborts the query",
                        col, ty
                    ),
                    severity: info.severity,
                    category: info.category,
                    location: Some(cap[0].to_string()),
                    suggestion: Some(format!(
                        "Guard the predicate: NULLIF({col}->>'value','') IS NOT NULL AND \
                         ... = ({col}->>'value')::{ty}"
                    ))
                });
            }
        }
        issues
    }
}

/// Numeric casts of extracted values outside join predicates
pub struct NumericCastGuard;

impl Rule for NumericCastGuard {
    fn info(&self) -> RuleInfo {
        RuleInfo {
            id:       "CAST002",
            name:     "Unguarded numeric cast",
            severity: Severity::Critical,
            category: RuleCategory::Casting
        }
    }

    fn check(&self, ctx: &LintContext) -> Vec<Issue> {
        let mut issues = Vec::new();
        // The patterns need the quoted 'value' key, which masking blanks,
        // so matching runs on the raw text and literal hits are filtered
        // by position instead.
        for cap in EXTRACT_CAST_REGEX.captures_iter(ctx.query) {
            let Some(whole) = cap.get(0) else {
                continue;
            };
            if ctx.in_literal(whole.start()) {
                continue;
            }
            let ty = cap[2].to_ascii_lowercase();
            if !NUMERIC_TYPES.contains(&ty.as_str()) {
                continue;
            }
            // Reference-typed casts inside join predicates belong to CAST001.
            if ctx.in_on_span(whole.start()) && REFERENCE_TYPES.contains(&ty.as_str()) {
                continue;
            }
            let col = cap[1].to_string();
            let info = self.info();
            issues.push(Issue {
                rule_id: info.id,
                rule_name: info.name,
                message: format!(
                    "Numeric cast of {}->>'value' fails on empty extracted values",
                    col
                ),
                severity: info.severity,
                category: info.category,
                location: Some(whole.as_str().to_string()),
                suggestion: Some(format!("NULLIF({col}->>'value','')::{ty}"))
            });
        }
        issues
    }
}

/// Date casts and date arithmetic without explicit format parsing
pub struct ExplicitDateParse {
    date_format: String
}

impl ExplicitDateParse {
    pub fn new(date_format: impl Into<String>) -> Self {
        Self {
            date_format: date_format.into()
        }
    }
}

impl Rule for ExplicitDateParse {
    fn info(&self) -> RuleInfo {
        RuleInfo {
            id:       "CAST003",
            name:     "Implicit date parsing",
            severity: Severity::Critical,
            category: RuleCategory::Casting
        }
    }

    fn check(&self, ctx: &LintContext) -> Vec<Issue> {
        let mut issues = Vec::new();
        let mut cast_sites: Vec<(usize, usize)> = Vec::new();

        for cap in EXTRACT_CAST_REGEX.captures_iter(ctx.query) {
            let Some(whole) = cap.get(0) else {
                continue;
            };
            if ctx.in_literal(whole.start()) {
                continue;
            }
            let ty = cap[2].to_ascii_lowercase();
            if !DATE_TYPES.contains(&ty.as_str()) {
                continue;
            }
            cast_sites.push((whole.start(), whole.end()));
            let col = cap[1].to_string();
            let info = self.info();
            issues.push(Issue {
                rule_id: info.id,
                rule_name: info.name,
                message: format!(
                    "Bare ::{} cast of {}->>'value' depends on the session date format \
                     and fails on empty values",
                    ty, col
                ),
                severity: info.severity,
                category: info.category,
                location: Some(whole.as_str().to_string()),
                suggestion: Some(format!(
                    "TO_DATE(NULLIF({col}->>'value',''),'{}')",
                    self.date_format
                ))
            });
        }

        for cap in DATE_ARITH_REGEX.captures_iter(ctx.query) {
            let (Some(whole), Some(col_match)) = (cap.get(0), cap.get(2)) else {
                continue;
            };
            if ctx.in_literal(whole.start()) {
                continue;
            }
            // Already reported through the cast check above.
            if cast_sites
                .iter()
                .any(|&(s, e)| col_match.start() >= s && col_match.start() < e)
            {
                continue;
            }
            let col = col_match.as_str();
            let info = self.info();
            issues.push(Issue {
                rule_id: info.id,
                rule_name: info.name,
                message: format!(
                    "Date arithmetic against bare {}->>'value' relies on implicit parsing",
                    col
                ),
                severity: info.severity,
                category: info.category,
                location: Some(whole.as_str().to_string()),
                suggestion: Some(format!(
                    "{} - TO_DATE(NULLIF({col}->>'value',''),'{}')",
                    cap[1].to_ascii_uppercase(),
                    self.date_format
                ))
            });
        }

        issues
    }
}
