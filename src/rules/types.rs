//! Type definitions for the defensive rule system.
//!
//! This module defines the core types used throughout the rule engine:
//! - [`Severity`] - Issue severity levels (Medium, Critical)
//! - [`RuleCategory`] - Rule categories (Casting, Joins, Schema)
//! - [`Issue`] - Individual findings with context
//! - [`LintReport`] - Complete lint results for one query

use serde::Serialize;

/// Severity level of a lint issue.
///
/// Ordered from lowest to highest severity for sorting purposes.
/// Exit codes are determined by the highest severity issue found.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub enum Severity {
    /// Advisory finding; the query may still run (exit code 1)
    Medium,
    /// Likely runtime failure or wrong results; blocks caching (exit code 2)
    Critical
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Medium => write!(f, "MEDIUM"),
            Self::Critical => write!(f, "CRITICAL")
        }
    }
}

/// Category of a rule for grouping and filtering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RuleCategory {
    /// Unsafe casts of JSON-extracted values
    Casting,
    /// Join-structure requirements
    Joins,
    /// Checks requiring schema metadata
    Schema
}

impl std::fmt::Display for RuleCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Casting => write!(f, "Casting"),
            Self::Joins => write!(f, "Joins"),
            Self::Schema => write!(f, "Schema")
        }
    }
}

/// A single issue found in a query.
///
/// Contains all context needed to display, filter, and mechanically fix
/// the finding, including the originating rule and an optional rewrite
/// suggestion.
#[derive(Debug, Clone, Serialize)]
pub struct Issue {
    /// Unique rule identifier (e.g., "CAST001", "JOIN001")
    pub rule_id:    &'static str,
    /// Human-readable rule name
    pub rule_name:  &'static str,
    /// Detailed description of the issue
    pub message:    String,
    /// Severity level of this issue
    pub severity:   Severity,
    /// Category for grouping issues
    pub category:   RuleCategory,
    /// Offending fragment of the query, when one can be named
    pub location:   Option<String>,
    /// Optional suggestion for fixing the issue
    pub suggestion: Option<String>
}

impl Issue {
    /// One-line rendering for repair prompts and attempt records.
    pub fn summary(&self) -> String {
        match &self.suggestion {
            Some(s) => format!("{}: {} (suggestion: {})", self.rule_id, self.message, s),
            None => format!("{}: {}", self.rule_id, self.message)
        }
    }
}

/// Metadata about a rule for identification and configuration.
#[derive(Debug, Clone)]
pub struct RuleInfo {
    /// Unique rule identifier (e.g., "CAST001")
    pub id:       &'static str,
    /// Human-readable rule name
    pub name:     &'static str,
    /// Default severity level
    pub severity: Severity,
    /// Rule category
    pub category: RuleCategory
}

/// Complete lint results for one query.
#[derive(Debug, Clone, Serialize)]
pub struct LintReport {
    /// All issues found
    pub issues:      Vec<Issue>,
    /// Number of rules executed
    pub rules_count: usize
}

impl LintReport {
    pub fn new(issues: Vec<Issue>, rules_count: usize) -> Self {
        Self {
            issues,
            rules_count
        }
    }

    pub fn critical_count(&self) -> usize {
        self.issues
            .iter()
            .filter(|i| i.severity == Severity::Critical)
            .count()
    }

    pub fn medium_count(&self) -> usize {
        self.issues
            .iter()
            .filter(|i| i.severity == Severity::Medium)
            .count()
    }

    pub fn has_critical(&self) -> bool {
        self.critical_count() > 0
    }
}
