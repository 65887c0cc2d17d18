//! Self-correcting query execution with a bounded retry budget.
//!
//! A [`RetrySession`] runs one query to completion: execute, and on
//! failure gather schema context, ask the generator for a corrected
//! query, sanitize it through the linter and fixer, and execute again.
//! The budget is five executions; corrections do not consume it.
//! Attempts are strictly sequential, never parallel, because each
//! correction feeds on the previous error.
//!
//! # Session States
//!
//! | State | Meaning |
//! |-------|---------|
//! | `DRAFTED` | Query accepted, nothing executed yet |
//! | `EXECUTING` | An attempt is in flight |
//! | `SUCCEEDED` | The database returned rows |
//! | `FAILED_RETRYABLE` | Attempt failed, a corrected attempt follows |
//! | `FAILED_TERMINAL` | No further attempts will be made |
//!
//! Whether a failure is worth another attempt goes through the
//! [`ErrorClassifier`] seam. The default policy retries everything and
//! lets the budget be the only terminal condition, since gateway error
//! text is too irregular to whitelist reliably.

use std::{fmt, time::Duration};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::{
    error::{AppResult, budget_exhausted_error, error_message, gateway_error, http_error},
    fixer::AutoFixer,
    llm::{GenerationContext, QueryGenerator},
    rules::{Issue, Linter},
    schema::{Catalog, RawColumn, SchemaCache, SchemaSnapshot, snapshot_summary},
    sqltext::{cte_names, referenced_tables, target_table}
};

/// Hard ceiling on executions per session. Corrections between attempts
/// are free; only round-trips to the database count.
pub const MAX_ATTEMPTS: u32 = 5;

/// Rows as returned by the query gateway, one JSON object per row.
pub type QueryRows = Vec<serde_json::Value>;

/// A failure reported by the database, kept structured so retry
/// policies can inspect it.
#[derive(Debug, Clone, Serialize)]
pub struct DatabaseError {
    pub message: String,
    /// SQLSTATE or gateway-specific code, when one was reported
    pub code:    Option<String>
}

impl fmt::Display for DatabaseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.code {
            Some(code) => write!(f, "[{}] {}", code, self.message),
            None => write!(f, "{}", self.message)
        }
    }
}

/// Something that can run SQL and hand back rows.
#[async_trait]
pub trait Database: Send + Sync {
    async fn execute(&self, sql: &str) -> Result<QueryRows, DatabaseError>;
}

/// Verdict on a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Worth a corrected attempt, budget permitting
    Retry,
    /// Stop the session now
    Terminal
}

/// Policy seam deciding which database failures deserve another
/// corrected attempt.
pub trait ErrorClassifier: Send + Sync {
    fn classify(&self, error: &DatabaseError) -> RetryDecision;
}

/// Default policy: every failure is retryable, including timeouts; the
/// attempt budget is the only terminal condition.
pub struct RetryAllErrors;

impl ErrorClassifier for RetryAllErrors {
    fn classify(&self, _error: &DatabaseError) -> RetryDecision {
        RetryDecision::Retry
    }
}

/// Lifecycle of a session, also used for log and output labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionState {
    Drafted,
    Executing,
    Succeeded,
    FailedRetryable,
    FailedTerminal
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Drafted => "DRAFTED",
            Self::Executing => "EXECUTING",
            Self::Succeeded => "SUCCEEDED",
            Self::FailedRetryable => "FAILED_RETRYABLE",
            Self::FailedTerminal => "FAILED_TERMINAL"
        };
        write!(f, "{}", label)
    }
}

/// One execution, recorded whether it succeeded or not.
#[derive(Debug, Clone, Serialize)]
pub struct ExecutionAttempt {
    /// 1-based position within the session
    pub attempt_number: u32,
    /// Exact text sent to the database
    pub query_text:     String,
    /// Lint findings in this query when it was produced by a correction
    pub issues_found:   Vec<String>,
    pub error:          Option<String>,
    pub succeeded:      bool
}

/// How a session ended.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum FinalStatus {
    Succeeded {
        /// The query text that actually worked
        query_text: String,
        rows:       QueryRows
    },
    FailedTerminal {
        last_error: String
    }
}

/// Complete record of one execution session.
#[derive(Debug, Clone, Serialize)]
pub struct RetrySession {
    pub max_attempts: u32,
    pub attempts:     Vec<ExecutionAttempt>,
    pub final_status: FinalStatus
}

impl RetrySession {
    pub fn succeeded(&self) -> bool {
        matches!(self.final_status, FinalStatus::Succeeded { .. })
    }

    pub fn final_state(&self) -> SessionState {
        match self.final_status {
            FinalStatus::Succeeded { .. } => SessionState::Succeeded,
            FinalStatus::FailedTerminal { .. } => SessionState::FailedTerminal
        }
    }
}

/// Drives a query through the execute-correct loop.
///
/// Holds borrowed collaborators so tests can swap any of them for
/// scripted stubs.
pub struct QueryExecutor<'a> {
    database:    &'a dyn Database,
    catalog:     &'a dyn Catalog,
    generator:   &'a dyn QueryGenerator,
    linter:      &'a Linter,
    fixer:       &'a AutoFixer,
    schema:      &'a SchemaCache,
    classifier:  Box<dyn ErrorClassifier>,
    date_format: String
}

impl<'a> QueryExecutor<'a> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        database: &'a dyn Database,
        catalog: &'a dyn Catalog,
        generator: &'a dyn QueryGenerator,
        linter: &'a Linter,
        fixer: &'a AutoFixer,
        schema: &'a SchemaCache,
        date_format: impl Into<String>
    ) -> Self {
        Self {
            database,
            catalog,
            generator,
            linter,
            fixer,
            schema,
            classifier: Box::new(RetryAllErrors),
            date_format: date_format.into()
        }
    }

    /// Replace the retry policy.
    pub fn with_classifier(mut self, classifier: Box<dyn ErrorClassifier>) -> Self {
        self.classifier = classifier;
        self
    }

    /// Run `initial_query` to completion within the attempt budget.
    ///
    /// The returned session always carries the full attempt history;
    /// inspect [`RetrySession::final_status`] for the outcome.
    pub async fn run(&self, initial_query: &str) -> RetrySession {
        info!(state = %SessionState::Drafted, "starting execution session");

        let mut attempts = Vec::new();
        let mut current = initial_query.to_string();
        let mut pending_issues: Vec<String> = Vec::new();
        let mut last_error = String::new();

        for attempt_number in 1..=MAX_ATTEMPTS {
            debug!(
                state = %SessionState::Executing,
                attempt = attempt_number,
                "executing query"
            );

            match self.database.execute(&current).await {
                Ok(rows) => {
                    attempts.push(ExecutionAttempt {
                        attempt_number,
                        query_text: current.clone(),
                        issues_found: std::mem::take(&mut pending_issues),
                        error: None,
                        succeeded: true
                    });
                    info!(
                        state = %SessionState::Succeeded,
                        attempt = attempt_number,
                        rows = rows.len(),
                        "query succeeded"
                    );
                    return RetrySession {
                        max_attempts: MAX_ATTEMPTS,
                        attempts,
                        final_status: FinalStatus::Succeeded {
                            query_text: current,
                            rows
                        }
                    };
                }
                Err(db_error) => {
                    last_error = db_error.to_string();
                    attempts.push(ExecutionAttempt {
                        attempt_number,
                        query_text: current.clone(),
                        issues_found: std::mem::take(&mut pending_issues),
                        error: Some(last_error.clone()),
                        succeeded: false
                    });

                    if self.classifier.classify(&db_error) == RetryDecision::Terminal {
                        warn!(
                            state = %SessionState::FailedTerminal,
                            attempt = attempt_number,
                            error = %db_error,
                            "error classified terminal"
                        );
                        return RetrySession {
                            max_attempts: MAX_ATTEMPTS,
                            attempts,
                            final_status: FinalStatus::FailedTerminal {
                                last_error
                            }
                        };
                    }
                    if attempt_number == MAX_ATTEMPTS {
                        break;
                    }

                    warn!(
                        state = %SessionState::FailedRetryable,
                        attempt = attempt_number,
                        error = %db_error,
                        "attempt failed, correcting"
                    );
                    match self.correct(&current, &db_error).await {
                        Ok((corrected, issues)) => {
                            current = corrected;
                            pending_issues = issues;
                        }
                        Err(e) => {
                            let detail = error_message(&e);
                            warn!(
                                state = %SessionState::FailedTerminal,
                                error = %detail,
                                "correction failed"
                            );
                            return RetrySession {
                                max_attempts: MAX_ATTEMPTS,
                                attempts,
                                final_status: FinalStatus::FailedTerminal {
                                    last_error: detail
                                }
                            };
                        }
                    }
                }
            }
        }

        let exhausted = error_message(&budget_exhausted_error(MAX_ATTEMPTS, &last_error));
        warn!(state = %SessionState::FailedTerminal, "{}", exhausted);
        RetrySession {
            max_attempts: MAX_ATTEMPTS,
            attempts,
            final_status: FinalStatus::FailedTerminal {
                last_error: exhausted
            }
        }
    }

    /// Produce a corrected query for a failed attempt.
    ///
    /// Gathers schema context for the tables in the failing query, asks
    /// the generator to rewrite it against the reported error, then
    /// sanitizes the rewrite through the fixer and records what the
    /// linter still finds.
    async fn correct(
        &self,
        query: &str,
        db_error: &DatabaseError
    ) -> AppResult<(String, Vec<String>)> {
        let snapshot = self.schema_context(query).await?;
        let summary = if snapshot.is_empty() {
            String::new()
        } else {
            snapshot_summary(&snapshot)
        };

        let context = GenerationContext::correct(
            query,
            db_error.to_string(),
            summary,
            self.date_format.clone()
        );
        let draft = self.generator.generate(&context).await?;

        let outcome = self.fixer.fix(&draft);
        if outcome.changed() {
            debug!(fixes = outcome.applied_fixes.len(), "auto-fixed corrected query");
        }

        let schema_ref = (!snapshot.is_empty()).then_some(&snapshot);
        let issues = self.linter.lint(&outcome.fixed_query, schema_ref);
        let notes = issues.iter().map(Issue::summary).collect();
        Ok((outcome.fixed_query, notes))
    }

    /// Describe every table the query touches.
    ///
    /// A metadata failure on the target table aborts the correction; a
    /// failure on any other table degrades to partial context.
    async fn schema_context(&self, query: &str) -> AppResult<SchemaSnapshot> {
        let target = target_table(query);
        // Already lowercased by extraction.
        let ctes = cte_names(query);

        let mut snapshot = SchemaSnapshot::new();
        for table_ref in referenced_tables(query) {
            let name = table_ref.table.as_str();
            let lower = name.to_ascii_lowercase();
            if snapshot.contains_key(name) || ctes.iter().any(|cte| cte.as_str() == lower.as_str()) {
                continue;
            }
            match self.schema.describe(name, self.catalog).await {
                Ok(columns) => {
                    snapshot.insert(name.to_string(), columns);
                }
                Err(e) => {
                    if target.as_deref() == Some(name) {
                        return Err(e);
                    }
                    warn!(table = name, error = %e, "no metadata for joined table, continuing");
                }
            }
        }
        Ok(snapshot)
    }
}

#[derive(Serialize)]
struct QueryRequest<'a> {
    sql: &'a str
}

#[derive(Deserialize)]
struct QueryResponse {
    #[serde(default)]
    rows: Vec<serde_json::Value>
}

#[derive(Deserialize)]
struct GatewayError {
    error: String,
    #[serde(default)]
    code:  Option<String>
}

#[derive(Serialize)]
struct ColumnsRequest<'a> {
    table: &'a str
}

#[derive(Deserialize)]
struct ColumnsResponse {
    #[serde(default)]
    columns: Vec<ColumnRow>
}

#[derive(Deserialize)]
struct ColumnRow {
    column_name: String,
    data_type:   String
}

/// Query gateway speaking JSON over HTTP.
///
/// `POST {base_url}/query` executes SQL, `POST {base_url}/columns`
/// serves column metadata, which also makes this the live [`Catalog`].
pub struct HttpDatabase {
    base_url: String,
    client:   reqwest::Client
}

impl HttpDatabase {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            base_url: base_url.into(),
            client
        }
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base_url.trim_end_matches('/'), path)
    }
}

#[async_trait]
impl Database for HttpDatabase {
    async fn execute(&self, sql: &str) -> Result<QueryRows, DatabaseError> {
        let response = self
            .client
            .post(self.endpoint("query"))
            .json(&QueryRequest {
                sql
            })
            .send()
            .await
            .map_err(|e| DatabaseError {
                message: if e.is_timeout() {
                    format!("Query timeout: {}", e)
                } else {
                    format!("Query transport error: {}", e)
                },
                code:    None
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(match serde_json::from_str::<GatewayError>(&body) {
                Ok(gw) => DatabaseError {
                    message: gw.error,
                    code:    gw.code
                },
                Err(_) => DatabaseError {
                    message: format!("Gateway responded {}: {}", status, body),
                    code:    None
                }
            });
        }

        let result: QueryResponse = response.json().await.map_err(|e| DatabaseError {
            message: format!("Malformed gateway response: {}", e),
            code:    None
        })?;
        Ok(result.rows)
    }
}

#[async_trait]
impl Catalog for HttpDatabase {
    async fn fetch_columns(&self, table: &str) -> AppResult<Vec<RawColumn>> {
        let response = self
            .client
            .post(self.endpoint("columns"))
            .json(&ColumnsRequest {
                table
            })
            .send()
            .await
            .map_err(http_error)?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(Vec::new());
        }
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(gateway_error(format!("Catalog responded {}: {}", status, body)));
        }

        let result: ColumnsResponse = response.json().await.map_err(http_error)?;
        Ok(result
            .columns
            .into_iter()
            .map(|col| RawColumn {
                name:      col.column_name,
                data_type: col.data_type
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_database_error_display() {
        let with_code = DatabaseError {
            message: String::from("relation does not exist"),
            code:    Some(String::from("42P01"))
        };
        assert_eq!(with_code.to_string(), "[42P01] relation does not exist");

        let bare = DatabaseError {
            message: String::from("timeout"),
            code:    None
        };
        assert_eq!(bare.to_string(), "timeout");
    }

    #[test]
    fn test_default_classifier_retries_timeouts() {
        let error = DatabaseError {
            message: String::from("Query timeout: deadline exceeded"),
            code:    None
        };
        assert_eq!(RetryAllErrors.classify(&error), RetryDecision::Retry);
    }

    #[test]
    fn test_session_state_labels() {
        assert_eq!(SessionState::FailedRetryable.to_string(), "FAILED_RETRYABLE");
        assert_eq!(SessionState::Succeeded.to_string(), "SUCCEEDED");
    }
}
