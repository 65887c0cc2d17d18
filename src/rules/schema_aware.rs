//! Schema-aware rules; they act only when a snapshot is supplied.
//!
//! Alias resolution is best-effort: a qualifier that cannot be resolved to
//! a known table (subquery aliases, unknown tables) produces no issue.

use std::{collections::HashSet, sync::LazyLock};

use regex::Regex;

use super::{Issue, LintContext, Rule, RuleCategory, RuleInfo, Severity};
use crate::schema::{ColumnDescriptor, SchemaSnapshot};

/// Regex for qualified column references: `alias.column`
static QUALIFIED_COLUMN_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b([A-Za-z_]\w*)\.([A-Za-z_]\w*)").expect("valid regex"));

/// Check that qualified columns exist on their resolved table
pub struct ColumnNotInSchema;

impl Rule for ColumnNotInSchema {
    fn info(&self) -> RuleInfo {
        RuleInfo {
            id:       "SCHEMA001",
            name:     "Column not in schema",
            severity: Severity::Critical,
            category: RuleCategory::Schema
        }
    }

    fn check(&self, ctx: &LintContext) -> Vec<Issue> {
        let Some(schema) = ctx.schema else {
            return vec![];
        };

        let mut seen: HashSet<(String, String)> = HashSet::new();
        let mut issues = Vec::new();

        // Scan the masked text so literals like 'a.b' are never mistaken
        // for column references.
        for cap in QUALIFIED_COLUMN_REGEX.captures_iter(&ctx.masked) {
            let alias = cap[1].to_ascii_lowercase();
            let column = cap[2].to_string();

            if ctx.ctes.iter().any(|cte| cte == alias.as_str()) {
                continue;
            }
            let Some(table) = ctx.aliases.get(alias.as_str()) else {
                continue;
            };
            let Some(columns) = lookup_table(schema, table) else {
                continue;
            };
            if columns
                .iter()
                .any(|c| c.column.eq_ignore_ascii_case(&column))
            {
                continue;
            }
            if !seen.insert((table.to_string(), column.clone())) {
                continue;
            }

            let known: Vec<&str> = columns.iter().take(5).map(|c| c.column.as_str()).collect();
            let info = self.info();
            issues.push(Issue {
                rule_id: info.id,
                rule_name: info.name,
                message: format!("Column '{}' does not exist on table '{}'", column, table),
                severity: info.severity,
                category: info.category,
                location: Some(format!("{}.{}", &cap[1], column)),
                suggestion: Some(format!("Known columns: {}", known.join(", ")))
            });
        }

        issues
    }
}

fn lookup_table<'a>(schema: &'a SchemaSnapshot, table: &str) -> Option<&'a Vec<ColumnDescriptor>> {
    schema.get(table).or_else(|| {
        schema
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(table))
            .map(|(_, columns)| columns)
    })
}
