use std::sync::Mutex;

use async_trait::async_trait;
use sql_query_sentinel::{
    builder::{MAX_REPAIR_ROUNDS, TemplateBuilder},
    error::AppResult,
    fixer::AutoFixer,
    llm::{GenerationContext, GenerationTask, QueryGenerator},
    rules::Linter,
    schema::snapshot_from_ddl
};

/// Hands out canned drafts in order and records every context it saw.
struct ScriptedGenerator {
    drafts: Mutex<Vec<String>>,
    tasks:  Mutex<Vec<String>>
}

impl ScriptedGenerator {
    fn new(drafts: Vec<&str>) -> Self {
        Self {
            drafts: Mutex::new(drafts.iter().rev().map(|s| s.to_string()).collect()),
            tasks:  Mutex::new(Vec::new())
        }
    }

    fn task_labels(&self) -> Vec<String> {
        self.tasks.lock().unwrap().clone()
    }
}

#[async_trait]
impl QueryGenerator for ScriptedGenerator {
    async fn generate(&self, context: &GenerationContext) -> AppResult<String> {
        let label = match &context.task {
            GenerationTask::Draft {
                ..
            } => "draft",
            GenerationTask::Repair {
                ..
            } => "repair",
            GenerationTask::Correct {
                ..
            } => "correct"
        };
        self.tasks.lock().unwrap().push(label.to_string());
        let next = self.drafts.lock().unwrap().pop();
        Ok(next.unwrap_or_else(|| "SELECT 1".to_string()))
    }
}

const CLEAN_QUERY: &str =
    "SELECT i.id FROM fact_invoice i JOIN documents d ON d.id = i.document_id";

fn builder<'a>(
    generator: &'a ScriptedGenerator,
    linter: &'a Linter,
    fixer: &'a AutoFixer
) -> TemplateBuilder<'a> {
    TemplateBuilder::new(generator, linter, fixer, "MM/DD/YYYY")
}

#[tokio::test]
async fn test_clean_first_draft_needs_no_repair() {
    let generator = ScriptedGenerator::new(vec![CLEAN_QUERY]);
    let linter = Linter::new();
    let fixer = AutoFixer::new();

    let outcome = builder(&generator, &linter, &fixer)
        .build("invoice ids with their documents", None)
        .await
        .unwrap();

    assert!(outcome.is_clean());
    assert_eq!(outcome.rounds, 0);
    assert_eq!(outcome.query, CLEAN_QUERY);
    assert_eq!(generator.task_labels(), vec!["draft"]);
}

#[tokio::test]
async fn test_fixable_issues_resolved_without_repair_round() {
    // Draft has a bare date cast and an unguarded numeric cast; both are
    // mechanically fixable, so no repair prompt is needed.
    let generator = ScriptedGenerator::new(vec![
        "SELECT (i.due_date->>'value')::date, (i.amount->>'value')::numeric \
         FROM fact_invoice i JOIN documents d ON d.id = i.document_id",
    ]);
    let linter = Linter::new();
    let fixer = AutoFixer::new();

    let outcome = builder(&generator, &linter, &fixer)
        .build("due dates and amounts", None)
        .await
        .unwrap();

    assert!(outcome.is_clean());
    assert_eq!(outcome.rounds, 0);
    assert_eq!(outcome.fixes_applied.len(), 2);
    assert!(outcome.query.contains("TO_DATE(NULLIF(i.due_date->>'value','')"));
    assert!(outcome.query.contains("NULLIF(i.amount->>'value','')::numeric"));
}

// Three criticals in the first draft: the auto-fix pass resolves the date
// and numeric casts, the remaining join issue takes one repair round.
#[tokio::test]
async fn test_join_issue_resolved_by_one_repair_round() {
    let generator = ScriptedGenerator::new(vec![
        "SELECT (i.due_date->>'value')::date, (i.amount->>'value')::numeric FROM fact_invoice i",
        "SELECT TO_DATE(NULLIF(i.due_date->>'value',''),'MM/DD/YYYY'), \
         NULLIF(i.amount->>'value','')::numeric \
         FROM fact_invoice i JOIN documents d ON d.id = i.document_id",
    ]);
    let linter = Linter::new();
    let fixer = AutoFixer::new();

    let outcome = builder(&generator, &linter, &fixer)
        .build("due dates and amounts per document", None)
        .await
        .unwrap();

    assert!(outcome.is_clean());
    assert!(outcome.unresolved.is_empty());
    assert_eq!(outcome.rounds, 1);
    assert_eq!(outcome.fixes_applied.len(), 2);
    assert_eq!(generator.task_labels(), vec!["draft", "repair"]);
}

#[tokio::test]
async fn test_unresolved_issues_survive_the_budget() {
    // Every draft misses the parent join; after the repair budget the
    // outcome still carries the critical instead of dropping it.
    let generator = ScriptedGenerator::new(vec![
        "SELECT id FROM fact_invoice",
        "SELECT id FROM fact_invoice",
        "SELECT id FROM fact_invoice",
    ]);
    let linter = Linter::new();
    let fixer = AutoFixer::new();

    let outcome = builder(&generator, &linter, &fixer)
        .build("all invoice ids", None)
        .await
        .unwrap();

    assert!(!outcome.is_clean());
    assert_eq!(outcome.rounds, MAX_REPAIR_ROUNDS);
    assert!(outcome.unresolved.iter().any(|i| i.rule_id == "JOIN001"));
    assert_eq!(generator.task_labels(), vec!["draft", "repair", "repair"]);
}

#[tokio::test]
async fn test_schema_context_enables_column_check() {
    let ddl = r#"
        CREATE TABLE fact_invoice (
            id UUID PRIMARY KEY,
            document_id UUID,
            amount JSONB
        );
        CREATE TABLE documents (id UUID PRIMARY KEY);
    "#;
    let schema = snapshot_from_ddl(ddl).unwrap();

    // The draft references a column the schema does not have; repairs keep
    // returning it, so the outcome surfaces the schema issue.
    let generator = ScriptedGenerator::new(vec![
        "SELECT i.vendor_name FROM fact_invoice i JOIN documents d ON d.id = i.document_id",
        "SELECT i.vendor_name FROM fact_invoice i JOIN documents d ON d.id = i.document_id",
        "SELECT i.vendor_name FROM fact_invoice i JOIN documents d ON d.id = i.document_id",
    ]);
    let linter = Linter::new();
    let fixer = AutoFixer::new();

    let outcome = builder(&generator, &linter, &fixer)
        .build("vendor names", Some(&schema))
        .await
        .unwrap();

    assert!(!outcome.is_clean());
    assert!(outcome.unresolved.iter().any(|i| i.rule_id == "SCHEMA001"));
}

#[tokio::test]
async fn test_repair_prompt_names_the_remaining_issues() {
    let generator = ScriptedGenerator::new(vec![
        "SELECT id FROM fact_invoice",
        CLEAN_QUERY,
    ]);
    let linter = Linter::new();
    let fixer = AutoFixer::new();

    let outcome = builder(&generator, &linter, &fixer)
        .build("invoice ids", None)
        .await
        .unwrap();

    assert!(outcome.is_clean());
    assert_eq!(outcome.rounds, 1);
    // The lint trail records what drove the repair round.
    assert!(outcome.issues_found.iter().any(|i| i.starts_with("JOIN001")));
}
