//! Join-structure rules.

use std::collections::HashSet;

use compact_str::CompactString;

use super::{Issue, LintContext, Rule, RuleCategory, RuleInfo, Severity};
use crate::{config::ConventionsConfig, sqltext::contains_word};

/// Naming conventions tying a fact table to its parent document record.
#[derive(Debug, Clone)]
pub struct JoinPolicy {
    pub fact_prefix:  String,
    pub parent_table: String,
    pub parent_key:   String
}

impl JoinPolicy {
    pub fn from_config(conventions: &ConventionsConfig) -> Self {
        Self {
            fact_prefix:  conventions.fact_prefix.clone(),
            parent_table: conventions.parent_table.clone(),
            parent_key:   conventions.parent_key.clone()
        }
    }
}

impl Default for JoinPolicy {
    fn default() -> Self {
        Self::from_config(&ConventionsConfig::default())
    }
}

/// Fact-table queries must join their parent document record.
///
/// Rows in `fact_*` tables only make sense relative to the batch/document
/// they were extracted from; a query that skips the parent join silently
/// mixes rows across documents. There is no mechanical rewrite for this:
/// choosing the join shape needs knowledge of the report's intent, so the
/// fixer never touches it.
pub struct ParentDocumentJoin {
    policy: JoinPolicy
}

impl ParentDocumentJoin {
    pub fn new(policy: JoinPolicy) -> Self {
        Self {
            policy
        }
    }

    fn has_parent_join(&self, ctx: &LintContext) -> bool {
        let parent = self.policy.parent_table.to_ascii_lowercase();
        let key = self.policy.parent_key.to_ascii_lowercase();
        ctx.join_clauses.iter().any(|clause| {
            let lower = clause.to_ascii_lowercase();
            contains_word(&lower, &parent) && contains_word(&lower, &key)
        })
    }
}

impl Rule for ParentDocumentJoin {
    fn info(&self) -> RuleInfo {
        RuleInfo {
            id:       "JOIN001",
            name:     "Missing parent document join",
            severity: Severity::Critical,
            category: RuleCategory::Joins
        }
    }

    fn check(&self, ctx: &LintContext) -> Vec<Issue> {
        let prefix = self.policy.fact_prefix.to_ascii_lowercase();
        let mut seen: HashSet<CompactString> = HashSet::new();
        let mut issues = Vec::new();

        for table_ref in &ctx.tables {
            let table = table_ref.table.to_ascii_lowercase();
            if !table.starts_with(&prefix) || !seen.insert(table.clone()) {
                continue;
            }
            if self.has_parent_join(ctx) {
                continue;
            }
            let from_name = table_ref
                .alias
                .as_deref()
                .unwrap_or(table_ref.table.as_str());
            let info = self.info();
            issues.push(Issue {
                rule_id: info.id,
                rule_name: info.name,
                message: format!(
                    "'{}' is read without a join to '{}' on '{}'; rows cannot be tied to \
                     their source document",
                    table_ref.table, self.policy.parent_table, self.policy.parent_key
                ),
                severity: info.severity,
                category: info.category,
                location: Some(table_ref.table.to_string()),
                suggestion: Some(format!(
                    "JOIN {parent} ON {parent}.id = {from_name}.{key}",
                    parent = self.policy.parent_table,
                    key = self.policy.parent_key
                ))
            });
        }

        issues
    }
}
