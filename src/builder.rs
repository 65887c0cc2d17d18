//! Draft pipeline: generate, lint, fix, and repair until clean.
//!
//! A draft goes through a fixed sequence before anyone may execute or
//! cache it: lint the generated SQL, apply mechanical fixes, lint
//! again, and if critical issues survive, hand them back to the
//! generator for at most [`MAX_REPAIR_ROUNDS`] repair rounds. Whatever
//! criticals remain after the last round are returned in the outcome,
//! never dropped; the caller decides whether to run anyway.
//!
//! Medium findings do not trigger repair rounds. They ride along in
//! [`DraftOutcome::unresolved`] as advisories.

use serde::Serialize;
use tracing::{debug, info};

use crate::{
    error::AppResult,
    fixer::AutoFixer,
    llm::{GenerationContext, QueryGenerator},
    rules::{Issue, Linter, Severity},
    schema::{SchemaSnapshot, snapshot_summary}
};

/// Repair prompts allowed after the initial draft.
pub const MAX_REPAIR_ROUNDS: u32 = 2;

/// What the pipeline produced for one request.
#[derive(Debug, Clone, Serialize)]
pub struct DraftOutcome {
    /// Final query text after fixing and any repair rounds
    pub query:         String,
    /// Issues still present in the final text, criticals first
    pub unresolved:    Vec<Issue>,
    /// Every mechanical rewrite applied, in order
    pub fixes_applied: Vec<String>,
    /// Everything the linter flagged along the way, per round
    pub issues_found:  Vec<String>,
    /// Repair rounds consumed (0 when the first draft fixed clean)
    pub rounds:        u32
}

impl DraftOutcome {
    /// True when no critical issue survived the pipeline.
    pub fn is_clean(&self) -> bool {
        !self
            .unresolved
            .iter()
            .any(|issue| issue.severity == Severity::Critical)
    }
}

/// Runs natural-language requests through generate-lint-fix-repair.
pub struct TemplateBuilder<'a> {
    generator:   &'a dyn QueryGenerator,
    linter:      &'a Linter,
    fixer:       &'a AutoFixer,
    date_format: String
}

impl<'a> TemplateBuilder<'a> {
    pub fn new(
        generator: &'a dyn QueryGenerator,
        linter: &'a Linter,
        fixer: &'a AutoFixer,
        date_format: impl Into<String>
    ) -> Self {
        Self {
            generator,
            linter,
            fixer,
            date_format: date_format.into()
        }
    }

    /// Draft a query for `request` and sanitize it.
    ///
    /// # Errors
    ///
    /// Fails only when the generation service fails; lint findings are
    /// never an error, they are data in the outcome.
    pub async fn build(
        &self,
        request: &str,
        schema: Option<&SchemaSnapshot>
    ) -> AppResult<DraftOutcome> {
        let summary = schema.map(snapshot_summary).unwrap_or_default();

        info!("drafting query");
        let context =
            GenerationContext::draft(request, summary.clone(), self.date_format.clone());
        let mut current = self.generator.generate(&context).await?;

        let mut fixes_applied = Vec::new();
        let mut issues_found = Vec::new();
        let mut rounds = 0;

        loop {
            let found = self.linter.lint(&current, schema);
            issues_found.extend(found.iter().map(Issue::summary));

            let outcome = self.fixer.fix(&current);
            if outcome.changed() {
                debug!(round = rounds, fixes = outcome.applied_fixes.len(), "applied fixes");
                fixes_applied.extend(outcome.applied_fixes);
            }
            current = outcome.fixed_query;

            let remaining = self.linter.lint(&current, schema);
            let criticals = remaining
                .iter()
                .filter(|issue| issue.severity == Severity::Critical)
                .count();

            if criticals == 0 {
                info!(rounds, "draft clean");
                return Ok(DraftOutcome {
                    query: current,
                    unresolved: remaining,
                    fixes_applied,
                    issues_found,
                    rounds
                });
            }
            if rounds == MAX_REPAIR_ROUNDS {
                info!(rounds, criticals, "repair budget spent, surfacing remaining issues");
                return Ok(DraftOutcome {
                    query: current,
                    unresolved: remaining,
                    fixes_applied,
                    issues_found,
                    rounds
                });
            }

            rounds += 1;
            debug!(round = rounds, criticals, "re-prompting for repair");
            let rendered: Vec<String> = remaining
                .iter()
                .filter(|issue| issue.severity == Severity::Critical)
                .map(Issue::summary)
                .collect();
            let repair = GenerationContext::repair(
                current,
                rendered,
                summary.clone(),
                self.date_format.clone()
            );
            current = self.generator.generate(&repair).await?;
        }
    }
}
