//! Mechanical rewriting of fixable casting issues.
//!
//! The fixer is driven by an enumerated pattern table: each entry names
//! the rule it resolves, a detection regex, and the rewrite applied at
//! every matching site. Entries run in a fixed order so compound
//! expressions resolve deterministically:
//!
//! | Resolves | Detects | Rewrites to |
//! |----------|---------|-------------|
//! | `CAST003` | `(x->>'value')::date` | `TO_DATE(NULLIF(x->>'value',''),'<fmt>')` |
//! | `CAST002` | `(x->>'value')::numeric` | `NULLIF(x->>'value','')::numeric` |
//! | `CAST002` | `(x->>'value')::int` outside join predicates | NULLIF form |
//! | `CAST003` | `CURRENT_DATE - (x->>'value')` | explicit `TO_DATE` form |
//! | `CAST003` | `CURRENT_DATE - x->>'value'` | explicit `TO_DATE` form |
//! | `CAST001` | `a.id = (x->>'value')::uuid` in a join predicate | guard conjunct prepended |
//! | `CAST001` | mirrored orientation of the above | guard conjunct prepended |
//!
//! `fix` is idempotent: every rewrite produces text its own entry can no
//! longer match, and the join-guard entries skip predicates that already
//! contain the guard. `JOIN001` and `SCHEMA001` are never rewritten.
//!
//! Known false negatives: casts written without the canonical
//! parentheses, predicates split mid-token across lines, and casts buried
//! in aliased sub-selects. Those surface as lint issues and flow back to
//! the generation service instead.

use std::sync::LazyLock;

use regex::{Captures, Regex};
use serde::Serialize;

use crate::{config::ConventionsConfig, sqltext::{contains_normalized, on_spans}};

/// Outcome of one fix pass.
#[derive(Debug, Clone, Serialize)]
pub struct FixOutcome {
    /// Rewritten query (identical to the input when nothing matched)
    pub fixed_query:   String,
    /// Human-readable description of each applied rewrite
    pub applied_fixes: Vec<String>
}

impl FixOutcome {
    pub fn changed(&self) -> bool {
        !self.applied_fixes.is_empty()
    }
}

/// Where a pattern entry may fire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Scope {
    Anywhere,
    /// Skip sites inside join predicates; the join-guard entries own those
    OutsideOn,
    /// Only sites inside join predicates
    InsideOn
}

/// One row of the pattern table.
struct FixPattern {
    issue_id:               &'static str,
    summary:                &'static str,
    scope:                  Scope,
    /// Skip a site when its join predicate already carries the guard
    requires_missing_guard: bool,
    pattern:                &'static LazyLock<Regex>,
    rewrite:                fn(&Captures<'_>, &str) -> String
}

static DATE_CAST_FIX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\(\s*(?P<col>[A-Za-z_]\w*(?:\.[A-Za-z_]\w*)?)\s*->>\s*'value'\s*\)\s*::\s*(?P<ty>date|timestamptz|timestamp)\b"
    )
    .expect("valid regex")
});

static NUMERIC_CAST_FIX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\(\s*(?P<col>[A-Za-z_]\w*(?:\.[A-Za-z_]\w*)?)\s*->>\s*'value'\s*\)\s*::\s*(?P<ty>numeric|decimal|real|float8|float4|float|double|money)\b"
    )
    .expect("valid regex")
});

static INT_CAST_FIX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\(\s*(?P<col>[A-Za-z_]\w*(?:\.[A-Za-z_]\w*)?)\s*->>\s*'value'\s*\)\s*::\s*(?P<ty>integer|int|bigint|smallint)\b"
    )
    .expect("valid regex")
});

static DATE_ARITH_PAREN_FIX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(?P<anchor>CURRENT_DATE|NOW\(\)|CURRENT_TIMESTAMP)\s*-\s*\(\s*(?P<col>[A-Za-z_]\w*(?:\.[A-Za-z_]\w*)?)\s*->>\s*'value'\s*\)"
    )
    .expect("valid regex")
});

static DATE_ARITH_BARE_FIX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(?P<anchor>CURRENT_DATE|NOW\(\)|CURRENT_TIMESTAMP)\s*-\s*(?P<col>[A-Za-z_]\w*(?:\.[A-Za-z_]\w*)?)\s*->>\s*'value'"
    )
    .expect("valid regex")
});

static JOIN_CAST_LEFT_FIX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)(?P<lhs>[A-Za-z_]\w*(?:\.[A-Za-z_]\w*)?)\s*=\s*\(\s*(?P<col>[A-Za-z_]\w*(?:\.[A-Za-z_]\w*)?)\s*->>\s*'value'\s*\)\s*::\s*(?P<ty>uuid|text|varchar|integer|int|bigint|smallint)\b"
    )
    .expect("valid regex")
});

static JOIN_CAST_RIGHT_FIX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\(\s*(?P<col>[A-Za-z_]\w*(?:\.[A-Za-z_]\w*)?)\s*->>\s*'value'\s*\)\s*::\s*(?P<ty>uuid|text|varchar|integer|int|bigint|smallint)\s*=\s*(?P<rhs>[A-Za-z_]\w*(?:\.[A-Za-z_]\w*)?)"
    )
    .expect("valid regex")
});

/// The pattern table, in application order.
static PATTERNS: &[FixPattern] = &[
    FixPattern {
        issue_id:               "CAST003",
        summary:                "parsed date cast explicitly",
        scope:                  Scope::Anywhere,
        requires_missing_guard: false,
        pattern:                &DATE_CAST_FIX,
        rewrite:                rewrite_date_cast
    },
    FixPattern {
        issue_id:               "CAST002",
        summary:                "guarded numeric cast with NULLIF",
        scope:                  Scope::Anywhere,
        requires_missing_guard: false,
        pattern:                &NUMERIC_CAST_FIX,
        rewrite:                rewrite_numeric_cast
    },
    FixPattern {
        issue_id:               "CAST002",
        summary:                "guarded integer cast with NULLIF",
        scope:                  Scope::OutsideOn,
        requires_missing_guard: false,
        pattern:                &INT_CAST_FIX,
        rewrite:                rewrite_numeric_cast
    },
    FixPattern {
        issue_id:               "CAST003",
        summary:                "parsed date arithmetic explicitly",
        scope:                  Scope::Anywhere,
        requires_missing_guard: false,
        pattern:                &DATE_ARITH_PAREN_FIX,
        rewrite:                rewrite_date_arith
    },
    FixPattern {
        issue_id:               "CAST003",
        summary:                "parsed date arithmetic explicitly",
        scope:                  Scope::Anywhere,
        requires_missing_guard: false,
        pattern:                &DATE_ARITH_BARE_FIX,
        rewrite:                rewrite_date_arith
    },
    FixPattern {
        issue_id:               "CAST001",
        summary:                "added empty-string guard to join cast",
        scope:                  Scope::InsideOn,
        requires_missing_guard: true,
        pattern:                &JOIN_CAST_LEFT_FIX,
        rewrite:                rewrite_join_guard_left
    },
    FixPattern {
        issue_id:               "CAST001",
        summary:                "added empty-string guard to join cast",
        scope:                  Scope::InsideOn,
        requires_missing_guard: true,
        pattern:                &JOIN_CAST_RIGHT_FIX,
        rewrite:                rewrite_join_guard_right
    },
];

fn rewrite_date_cast(cap: &Captures<'_>, date_format: &str) -> String {
    format!(
        "TO_DATE(NULLIF({}->>'value',''),'{}')",
        &cap["col"], date_format
    )
}

fn rewrite_numeric_cast(cap: &Captures<'_>, _date_format: &str) -> String {
    format!("NULLIF({}->>'value','')::{}", &cap["col"], &cap["ty"])
}

fn rewrite_date_arith(cap: &Captures<'_>, date_format: &str) -> String {
    format!(
        "{} - TO_DATE(NULLIF({}->>'value',''),'{}')",
        &cap["anchor"], &cap["col"], date_format
    )
}

fn rewrite_join_guard_left(cap: &Captures<'_>, _date_format: &str) -> String {
    let col = &cap["col"];
    format!(
        "NULLIF({col}->>'value','') IS NOT NULL AND {} = ({col}->>'value')::{}",
        &cap["lhs"], &cap["ty"]
    )
}

fn rewrite_join_guard_right(cap: &Captures<'_>, _date_format: &str) -> String {
    let col = &cap["col"];
    format!(
        "NULLIF({col}->>'value','') IS NOT NULL AND ({col}->>'value')::{} = {}",
        &cap["ty"], &cap["rhs"]
    )
}

/// Deterministic rewriter for the casting rules.
pub struct AutoFixer {
    date_format: String
}

impl Default for AutoFixer {
    fn default() -> Self {
        Self::new()
    }
}

impl AutoFixer {
    /// Create a fixer with the default date format convention
    pub fn new() -> Self {
        Self::with_config(&ConventionsConfig::default())
    }

    pub fn with_config(conventions: &ConventionsConfig) -> Self {
        Self {
            date_format: conventions.date_format.clone()
        }
    }

    /// Apply every pattern entry once, in table order.
    ///
    /// Running `fix` on its own output is a no-op.
    pub fn fix(&self, query: &str) -> FixOutcome {
        let mut current = query.to_string();
        let mut applied = Vec::new();

        for entry in PATTERNS {
            current = self.apply_entry(&current, entry, &mut applied);
        }

        FixOutcome {
            fixed_query:   current,
            applied_fixes: applied
        }
    }

    fn apply_entry(&self, query: &str, entry: &FixPattern, applied: &mut Vec<String>) -> String {
        let spans = on_spans(query);
        let mut out = String::with_capacity(query.len());
        let mut last = 0;

        for cap in entry.pattern.captures_iter(query) {
            let Some(whole) = cap.get(0) else {
                continue;
            };
            let covering_span = spans
                .iter()
                .find(|&&(start, end)| whole.start() >= start && whole.start() < end);

            let in_scope = match entry.scope {
                Scope::Anywhere => true,
                Scope::OutsideOn => covering_span.is_none(),
                Scope::InsideOn => covering_span.is_some()
            };
            if !in_scope {
                continue;
            }

            if entry.requires_missing_guard
                && let Some(&(start, end)) = covering_span
                && contains_normalized(
                    &query[start..end],
                    &format!("NULLIF({}->>'value','')", &cap["col"])
                )
            {
                continue;
            }

            out.push_str(&query[last..whole.start()]);
            out.push_str(&(entry.rewrite)(&cap, &self.date_format));
            last = whole.end();
            applied.push(format!(
                "{}: {} ({})",
                entry.issue_id,
                entry.summary,
                whole.as_str().trim()
            ));
        }

        out.push_str(&query[last..]);
        out
    }
}
