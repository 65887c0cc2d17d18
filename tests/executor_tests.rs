use std::{
    sync::{
        Mutex,
        atomic::{AtomicU32, Ordering}
    },
    time::Duration
};

use async_trait::async_trait;
use sql_query_sentinel::{
    error::{AppResult, generation_error},
    executor::{
        Database, DatabaseError, ErrorClassifier, FinalStatus, MAX_ATTEMPTS, QueryExecutor,
        QueryRows, RetryDecision, SessionState
    },
    fixer::AutoFixer,
    llm::{GenerationContext, QueryGenerator},
    rules::Linter,
    schema::{Catalog, RawColumn, SchemaCache}
};

/// Fails the first `failures` executions, then succeeds with one row.
struct FlakyDatabase {
    failures: u32,
    calls:    AtomicU32
}

impl FlakyDatabase {
    fn new(failures: u32) -> Self {
        Self {
            failures,
            calls: AtomicU32::new(0)
        }
    }

    fn call_count(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Database for FlakyDatabase {
    async fn execute(&self, _sql: &str) -> Result<QueryRows, DatabaseError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if call <= self.failures {
            Err(DatabaseError {
                message: format!("column \"nonexistent\" does not exist (call {})", call),
                code:    Some("42703".to_string())
            })
        } else {
            Ok(vec![serde_json::json!({"total": 42})])
        }
    }
}

struct StubCatalog;

#[async_trait]
impl Catalog for StubCatalog {
    async fn fetch_columns(&self, _table: &str) -> AppResult<Vec<RawColumn>> {
        Ok(vec![
            RawColumn {
                name:      "id".to_string(),
                data_type: "uuid".to_string()
            },
            RawColumn {
                name:      "document_id".to_string(),
                data_type: "uuid".to_string()
            },
            RawColumn {
                name:      "amount".to_string(),
                data_type: "jsonb".to_string()
            },
        ])
    }
}

/// Returns scripted corrections in order, recording each context.
struct ScriptedGenerator {
    corrections: Mutex<Vec<String>>,
    seen_errors: Mutex<Vec<String>>
}

impl ScriptedGenerator {
    fn new(corrections: Vec<&str>) -> Self {
        Self {
            corrections: Mutex::new(corrections.iter().rev().map(|s| s.to_string()).collect()),
            seen_errors: Mutex::new(Vec::new())
        }
    }
}

#[async_trait]
impl QueryGenerator for ScriptedGenerator {
    async fn generate(&self, context: &GenerationContext) -> AppResult<String> {
        let prompt = context.to_prompt();
        self.seen_errors.lock().unwrap().push(prompt);
        let next = self.corrections.lock().unwrap().pop();
        Ok(next.unwrap_or_else(|| "SELECT 1".to_string()))
    }
}

/// Records every table the executor asks about.
struct RecordingCatalog {
    asked: Mutex<Vec<String>>
}

impl RecordingCatalog {
    fn new() -> Self {
        Self {
            asked: Mutex::new(Vec::new())
        }
    }
}

#[async_trait]
impl Catalog for RecordingCatalog {
    async fn fetch_columns(&self, table: &str) -> AppResult<Vec<RawColumn>> {
        self.asked.lock().unwrap().push(table.to_string());
        StubCatalog.fetch_columns(table).await
    }
}

/// Generator whose service is down.
struct OfflineGenerator;

#[async_trait]
impl QueryGenerator for OfflineGenerator {
    async fn generate(&self, _context: &GenerationContext) -> AppResult<String> {
        Err(generation_error("Ollama API error 503: model offline"))
    }
}

struct NeverRetry;

impl ErrorClassifier for NeverRetry {
    fn classify(&self, _error: &DatabaseError) -> RetryDecision {
        RetryDecision::Terminal
    }
}

fn fresh_cache() -> SchemaCache {
    SchemaCache::new(Duration::from_secs(300))
}

const CORRECTION: &str =
    "SELECT i.amount FROM fact_invoice i JOIN documents d ON d.id = i.document_id";

#[tokio::test]
async fn test_first_attempt_success() {
    let database = FlakyDatabase::new(0);
    let generator = ScriptedGenerator::new(vec![]);
    let linter = Linter::new();
    let fixer = AutoFixer::new();
    let cache = fresh_cache();
    let executor = QueryExecutor::new(
        &database, &StubCatalog, &generator, &linter, &fixer, &cache, "MM/DD/YYYY"
    );

    let session = executor.run("SELECT 1").await;
    assert!(session.succeeded());
    assert_eq!(session.final_state(), SessionState::Succeeded);
    assert_eq!(session.attempts.len(), 1);
    assert!(session.attempts[0].succeeded);
    match &session.final_status {
        FinalStatus::Succeeded {
            query_text,
            rows
        } => {
            assert_eq!(query_text, "SELECT 1");
            assert_eq!(rows.len(), 1);
        }
        FinalStatus::FailedTerminal {
            ..
        } => panic!("session should have succeeded")
    }
}

#[tokio::test]
async fn test_recovers_after_two_failures() {
    let database = FlakyDatabase::new(2);
    let generator = ScriptedGenerator::new(vec![CORRECTION, CORRECTION]);
    let linter = Linter::new();
    let fixer = AutoFixer::new();
    let cache = fresh_cache();
    let executor = QueryExecutor::new(
        &database, &StubCatalog, &generator, &linter, &fixer, &cache, "MM/DD/YYYY"
    );

    let session = executor
        .run("SELECT nonexistent FROM fact_invoice i JOIN documents d ON d.id = i.document_id")
        .await;
    assert!(session.succeeded());
    assert_eq!(session.attempts.len(), 3);
    assert!(!session.attempts[0].succeeded);
    assert!(!session.attempts[1].succeeded);
    assert!(session.attempts[2].succeeded);
    // The query that finally worked is the last correction.
    match &session.final_status {
        FinalStatus::Succeeded {
            query_text, ..
        } => assert_eq!(query_text, CORRECTION),
        FinalStatus::FailedTerminal {
            ..
        } => panic!("session should have succeeded")
    }
}

#[tokio::test]
async fn test_budget_exhaustion_is_terminal() {
    let database = FlakyDatabase::new(u32::MAX);
    let generator = ScriptedGenerator::new(vec![CORRECTION; 10]);
    let linter = Linter::new();
    let fixer = AutoFixer::new();
    let cache = fresh_cache();
    let executor = QueryExecutor::new(
        &database, &StubCatalog, &generator, &linter, &fixer, &cache, "MM/DD/YYYY"
    );

    let session = executor.run(CORRECTION).await;
    assert!(!session.succeeded());
    assert_eq!(session.final_state(), SessionState::FailedTerminal);
    // Exactly five executions happen; a sixth never does.
    assert_eq!(session.attempts.len(), MAX_ATTEMPTS as usize);
    assert_eq!(database.call_count(), MAX_ATTEMPTS);
    match &session.final_status {
        FinalStatus::FailedTerminal {
            last_error
        } => {
            assert!(last_error.contains("5 attempts"));
            assert!(last_error.contains("does not exist"));
        }
        FinalStatus::Succeeded {
            ..
        } => panic!("session should have failed")
    }
}

#[tokio::test]
async fn test_attempts_are_numbered_sequentially() {
    let database = FlakyDatabase::new(u32::MAX);
    let generator = ScriptedGenerator::new(vec![CORRECTION; 10]);
    let linter = Linter::new();
    let fixer = AutoFixer::new();
    let cache = fresh_cache();
    let executor = QueryExecutor::new(
        &database, &StubCatalog, &generator, &linter, &fixer, &cache, "MM/DD/YYYY"
    );

    let session = executor.run(CORRECTION).await;
    for (index, attempt) in session.attempts.iter().enumerate() {
        assert_eq!(attempt.attempt_number, index as u32 + 1);
        assert!(attempt.error.is_some());
    }
}

#[tokio::test]
async fn test_correction_prompt_carries_database_error() {
    let database = FlakyDatabase::new(1);
    let generator = ScriptedGenerator::new(vec![CORRECTION]);
    let linter = Linter::new();
    let fixer = AutoFixer::new();
    let cache = fresh_cache();
    let executor = QueryExecutor::new(
        &database, &StubCatalog, &generator, &linter, &fixer, &cache, "MM/DD/YYYY"
    );

    let session = executor.run(CORRECTION).await;
    assert!(session.succeeded());
    let prompts = generator.seen_errors.lock().unwrap();
    assert_eq!(prompts.len(), 1);
    assert!(prompts[0].contains("does not exist"));
    assert!(prompts[0].contains("42703"));
    // Schema context from the catalog rides along.
    assert!(prompts[0].contains("fact_invoice"));
}

#[tokio::test]
async fn test_corrected_query_is_fixed_before_execution() {
    let database = FlakyDatabase::new(1);
    // Correction still carries a bare date cast; the fixer must rewrite it
    // before the next attempt.
    let generator = ScriptedGenerator::new(vec![
        "SELECT (i.due_date->>'value')::date FROM fact_invoice i \
         JOIN documents d ON d.id = i.document_id",
    ]);
    let linter = Linter::new();
    let fixer = AutoFixer::new();
    let cache = fresh_cache();
    let executor = QueryExecutor::new(
        &database, &StubCatalog, &generator, &linter, &fixer, &cache, "MM/DD/YYYY"
    );

    let session = executor.run(CORRECTION).await;
    assert!(session.succeeded());
    let second = &session.attempts[1];
    assert!(second.query_text.contains("TO_DATE(NULLIF(i.due_date->>'value','')"));
}

#[tokio::test]
async fn test_schema_context_skips_cte_names() {
    let database = FlakyDatabase::new(1);
    let catalog = RecordingCatalog::new();
    let generator = ScriptedGenerator::new(vec![CORRECTION]);
    let linter = Linter::new();
    let fixer = AutoFixer::new();
    let cache = fresh_cache();
    let executor = QueryExecutor::new(
        &database, &catalog, &generator, &linter, &fixer, &cache, "MM/DD/YYYY"
    );

    let session = executor
        .run(
            "WITH recent AS (SELECT d.id FROM documents d) \
             SELECT i.amount FROM fact_invoice i JOIN recent ON recent.id = i.document_id"
        )
        .await;
    assert!(session.succeeded());
    let asked = catalog.asked.lock().unwrap();
    assert!(asked.iter().any(|t| t == "fact_invoice"));
    assert!(!asked.iter().any(|t| t == "recent"));
}

#[tokio::test]
async fn test_correction_failure_keeps_concrete_error() {
    let database = FlakyDatabase::new(u32::MAX);
    let generator = OfflineGenerator;
    let linter = Linter::new();
    let fixer = AutoFixer::new();
    let cache = fresh_cache();
    let executor = QueryExecutor::new(
        &database, &StubCatalog, &generator, &linter, &fixer, &cache, "MM/DD/YYYY"
    );

    let session = executor.run(CORRECTION).await;
    assert!(!session.succeeded());
    assert_eq!(session.attempts.len(), 1);
    match &session.final_status {
        FinalStatus::FailedTerminal {
            last_error
        } => assert!(last_error.contains("model offline")),
        FinalStatus::Succeeded {
            ..
        } => panic!("session should have failed")
    }
}

#[tokio::test]
async fn test_terminal_classification_stops_session_early() {
    let database = FlakyDatabase::new(u32::MAX);
    let generator = ScriptedGenerator::new(vec![CORRECTION; 10]);
    let linter = Linter::new();
    let fixer = AutoFixer::new();
    let cache = fresh_cache();
    let executor = QueryExecutor::new(
        &database, &StubCatalog, &generator, &linter, &fixer, &cache, "MM/DD/YYYY"
    )
    .with_classifier(Box::new(NeverRetry));

    let session = executor.run(CORRECTION).await;
    assert!(!session.succeeded());
    assert_eq!(session.attempts.len(), 1);
    assert_eq!(database.call_count(), 1);
}
