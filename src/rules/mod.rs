//! Defensive rule engine for generated SQL.
//!
//! This module provides a parallel rule execution engine that checks a
//! query against the defensive conventions for JSON-extracted values.
//! Rules are implemented as types that implement the [`Rule`] trait.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────┐     ┌──────────────┐     ┌─────────────┐
//! │  Query text │────▶│    Linter    │────▶│   Issues    │
//! └─────────────┘     └──────────────┘     └─────────────┘
//!                            │
//!                     ┌──────┴──────┐
//!                     │   Rules     │
//!                     │  (parallel) │
//!                     └─────────────┘
//! ```
//!
//! The [`Linter`] pre-extracts one [`LintContext`] per query (tables,
//! aliases, join predicate spans) and executes all enabled rules in
//! parallel using [`rayon`].
//!
//! # Rules
//!
//! | Rule | Checks | Mechanically fixable |
//! |------|--------|----------------------|
//! | `CAST001` | reference casts in join predicates carry a NULLIF guard | yes |
//! | `CAST002` | numeric casts pass through NULLIF | yes |
//! | `CAST003` | date casts and date arithmetic parse explicitly via TO_DATE | yes |
//! | `JOIN001` | fact tables join their parent document record | no |
//! | `SCHEMA001` | qualified columns exist on the resolved table (needs schema) | no |
//!
//! # Configuration
//!
//! Rules can be disabled or have their severity overridden via
//! [`RulesConfig`]:
//!
//! ```toml
//! [rules]
//! disabled = ["SCHEMA001"]
//!
//! [rules.severity]
//! CAST002 = "medium"
//! ```

pub mod defensive;
pub mod joins;
pub mod schema_aware;
mod types;

use compact_str::CompactString;
use indexmap::IndexMap;
pub use joins::JoinPolicy;
use rayon::prelude::*;
pub use types::{Issue, LintReport, RuleCategory, RuleInfo, Severity};

use crate::{
    config::{ConventionsConfig, RulesConfig},
    schema::SchemaSnapshot,
    sqltext::{
        TableList, alias_map, cte_names, join_clauses, mask_string_literals, on_spans,
        referenced_tables
    }
};

/// Pre-extracted view of one query, shared by all rules.
pub struct LintContext<'a> {
    /// Raw query text
    pub query:        &'a str,
    /// Query text with string-literal contents blanked
    pub masked:       String,
    /// Tables referenced after FROM/JOIN
    pub tables:       TableList,
    /// Lowercased alias (or table name) to table
    pub aliases:      IndexMap<CompactString, CompactString>,
    /// Join clauses as extracted text
    pub join_clauses: Vec<String>,
    /// Byte spans of join predicates
    pub on_spans:     Vec<(usize, usize)>,
    /// Lowercased common-table-expression names
    pub ctes:         Vec<CompactString>,
    /// Snapshot for schema-aware rules, when available
    pub schema:       Option<&'a SchemaSnapshot>
}

impl<'a> LintContext<'a> {
    pub fn new(query: &'a str, schema: Option<&'a SchemaSnapshot>) -> Self {
        Self {
            query,
            masked: mask_string_literals(query),
            tables: referenced_tables(query),
            aliases: alias_map(query),
            join_clauses: join_clauses(query),
            on_spans: on_spans(query),
            ctes: cte_names(query),
            schema
        }
    }

    /// Whether a byte offset falls inside any join predicate span.
    pub fn in_on_span(&self, pos: usize) -> bool {
        self.on_spans.iter().any(|&(start, end)| pos >= start && pos < end)
    }

    /// Whether the byte at `pos` sits inside a string literal.
    ///
    /// Masking replaces literal contents with spaces at the same offsets,
    /// so any byte that differs between the raw and masked text was inside
    /// a literal. Pattern matches always begin on a non-space byte, which
    /// makes this check exact for match start positions.
    pub fn in_literal(&self, pos: usize) -> bool {
        self.masked.as_bytes().get(pos) != self.query.as_bytes().get(pos)
    }
}

/// Trait for implementing defensive SQL rules.
///
/// Rules are stateless checkers that examine a single query view and
/// return any issues found. They must be `Send + Sync` for parallel
/// execution.
pub trait Rule: Send + Sync {
    /// Returns metadata about this rule.
    fn info(&self) -> RuleInfo;

    /// Checks a query and returns any issues found.
    fn check(&self, ctx: &LintContext<'_>) -> Vec<Issue>;
}

/// Parallel rule execution engine.
///
/// Construction decides the rule set; [`lint`](Self::lint) itself is a
/// pure function of the query text and the optional schema snapshot, so
/// two calls with the same input always yield the same issues.
pub struct Linter {
    rules:          Vec<Box<dyn Rule>>,
    severity_cache: std::collections::HashMap<&'static str, Severity>
}

impl Default for Linter {
    fn default() -> Self {
        Self::new()
    }
}

impl Linter {
    /// Create a linter with the default conventions and all rules enabled
    pub fn new() -> Self {
        Self::with_config(&ConventionsConfig::default(), &RulesConfig::default())
    }

    /// Create a linter from configuration
    pub fn with_config(conventions: &ConventionsConfig, rules_config: &RulesConfig) -> Self {
        let all_rules: Vec<Box<dyn Rule>> = vec![
            Box::new(defensive::ReferenceJoinGuard),
            Box::new(defensive::NumericCastGuard),
            Box::new(defensive::ExplicitDateParse::new(
                conventions.date_format.clone()
            )),
            Box::new(joins::ParentDocumentJoin::new(JoinPolicy::from_config(
                conventions
            ))),
            Box::new(schema_aware::ColumnNotInSchema),
        ];

        // Filter out disabled rules
        let rules: Vec<Box<dyn Rule>> = all_rules
            .into_iter()
            .filter(|r| {
                !rules_config
                    .disabled
                    .iter()
                    .any(|d| d.eq_ignore_ascii_case(r.info().id))
            })
            .collect();

        // Build severity override cache
        let mut severity_cache = std::collections::HashMap::new();
        for rule in &rules {
            let rule_id = rule.info().id;
            if let Some(sev_str) = rules_config.severity.get(rule_id)
                && let Some(sev) = parse_severity(sev_str)
            {
                severity_cache.insert(rule_id, sev);
            }
        }

        Self {
            rules,
            severity_cache
        }
    }

    /// Lint one query, optionally against a schema snapshot.
    ///
    /// Passing `None` skips schema-aware rules entirely; that is also the
    /// degradation path when a schema lookup failed upstream.
    pub fn lint(&self, query: &str, schema: Option<&SchemaSnapshot>) -> Vec<Issue> {
        let ctx = LintContext::new(query, schema);

        let mut issues: Vec<Issue> = self
            .rules
            .par_iter()
            .flat_map(|rule| rule.check(&ctx))
            .collect();

        // Apply severity overrides
        for issue in &mut issues {
            if let Some(&severity) = self.severity_cache.get(issue.rule_id) {
                issue.severity = severity;
            }
        }

        // Sort by severity (critical first) then by rule id
        issues.sort_by(|a, b| {
            b.severity
                .cmp(&a.severity)
                .then_with(|| a.rule_id.cmp(b.rule_id))
        });

        issues
    }

    /// Lint and wrap the result for presentation.
    pub fn report(&self, query: &str, schema: Option<&SchemaSnapshot>) -> LintReport {
        LintReport::new(self.lint(query, schema), self.rules.len())
    }

    pub fn rules_count(&self) -> usize {
        self.rules.len()
    }
}

/// Parse severity string to enum
fn parse_severity(s: &str) -> Option<Severity> {
    match s.to_lowercase().as_str() {
        "critical" => Some(Severity::Critical),
        "medium" => Some(Severity::Medium),
        _ => None
    }
}
