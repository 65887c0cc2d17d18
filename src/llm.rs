//! Generation service integrations for SQL drafting and correction.
//!
//! This module provides a unified interface for the LLM providers that
//! draft, repair, and correct queries. It handles authentication, request
//! formatting, response parsing, and automatic retry with exponential
//! backoff. The pipeline only ever sees the [`QueryGenerator`] trait, so
//! everything above this module stays deterministic under a stubbed
//! generator.
//!
//! Every prompt restates the defensive conventions with worked examples;
//! the linter still checks each response, the primer just raises the hit
//! rate of the first draft.
//!
//! # Supported Providers
//!
//! | Provider | Endpoint | Authentication |
//! |----------|----------|----------------|
//! | OpenAI | `api.openai.com` | Bearer token |
//! | Anthropic | `api.anthropic.com` | x-api-key header |
//! | Ollama | Local (configurable) | None |
//!
//! # Retry Behavior
//!
//! The client automatically retries on transient errors:
//! - Connection timeouts
//! - Rate limiting (429)
//! - Server errors (5xx)
//!
//! Retry delays use exponential backoff with configurable parameters.
//! This network-level budget is independent of the pipeline's 5-attempt
//! execution budget.
//!
//! # Example
//!
//! ```
//! use std::time::Duration;
//!
//! use sql_query_sentinel::{
//!     config::RetryConfig,
//!     llm::{LlmClient, LlmProvider}
//! };
//!
//! let provider = LlmProvider::Ollama {
//!     base_url: "http://localhost:11434".into(),
//!     model:    "llama3.2".into()
//! };
//!
//! let client =
//!     LlmClient::with_retry_config(provider, RetryConfig::default(), Duration::from_secs(30));
//! ```

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::time::sleep;
use tracing::warn;

use crate::{
    config::RetryConfig,
    error::{AppResult, error_message, generation_error, http_error}
};

/// What the generation service is being asked to produce.
#[derive(Debug, Clone)]
pub enum GenerationTask {
    /// First draft from a natural-language report description
    Draft {
        request: String
    },
    /// Rewrite of a draft that still carries lint issues
    Repair {
        query:  String,
        issues: Vec<String>
    },
    /// Correction of a query the database rejected
    Correct {
        query: String,
        error: String
    }
}

/// Everything a generator call needs: schema context, conventions, task.
#[derive(Debug, Clone)]
pub struct GenerationContext {
    /// Schema excerpt for the tables in play (may be empty)
    pub schema_summary: String,
    /// Canonical date format restated in the rules primer
    pub date_format:    String,
    pub task:           GenerationTask
}

impl GenerationContext {
    pub fn draft(request: impl Into<String>, schema_summary: String, date_format: String) -> Self {
        Self {
            schema_summary,
            date_format,
            task: GenerationTask::Draft {
                request: request.into()
            }
        }
    }

    pub fn repair(
        query: impl Into<String>,
        issues: Vec<String>,
        schema_summary: String,
        date_format: String
    ) -> Self {
        Self {
            schema_summary,
            date_format,
            task: GenerationTask::Repair {
                query: query.into(),
                issues
            }
        }
    }

    pub fn correct(
        query: impl Into<String>,
        error: impl Into<String>,
        schema_summary: String,
        date_format: String
    ) -> Self {
        Self {
            schema_summary,
            date_format,
            task: GenerationTask::Correct {
                query: query.into(),
                error: error.into()
            }
        }
    }

    /// Assemble the full prompt: primer, schema excerpt, task.
    pub fn to_prompt(&self) -> String {
        let mut prompt = rules_primer(&self.date_format);
        if !self.schema_summary.is_empty() {
            prompt.push('\n');
            prompt.push_str(&self.schema_summary);
        }
        prompt.push('\n');
        match &self.task {
            GenerationTask::Draft {
                request
            } => {
                prompt.push_str(&format!(
                    "Write a single PostgreSQL SELECT statement for this report request:\n\
                     {request}\n\nReturn only the SQL statement, no explanation."
                ));
            }
            GenerationTask::Repair {
                query,
                issues
            } => {
                prompt.push_str(&format!(
                    "This draft violates the rules above:\n{query}\n\nIssues:\n"
                ));
                for issue in issues {
                    prompt.push_str(&format!("- {issue}\n"));
                }
                prompt.push_str(
                    "\nRewrite the query so every issue is resolved. \
                     Return only the SQL statement."
                );
            }
            GenerationTask::Correct {
                query,
                error
            } => {
                prompt.push_str(&format!(
                    "The database rejected this query:\n{query}\n\n\
                     Error: {error}\n\n\
                     Rewrite the query to fix the error while keeping the rules above. \
                     Return only the SQL statement."
                ));
            }
        }
        prompt
    }
}

/// The defensive conventions restated in every prompt, with worked
/// examples.
fn rules_primer(date_format: &str) -> String {
    format!(
        "You write PostgreSQL for a database of OCR-extracted documents. Most business \
         fields are JSON objects; the extracted text lives under ->>'value' and may be \
         empty or malformed. These rules are non-negotiable:\n\
         1. Guard reference casts in join predicates.\n\
         \x20  Bad:  JOIN purchase_orders po ON po.id = (inv.po_number->>'value')::uuid\n\
         \x20  Good: JOIN purchase_orders po ON NULLIF(inv.po_number->>'value','') \
         IS NOT NULL AND po.id = (inv.po_number->>'value')::uuid\n\
         2. Pass numeric casts through NULLIF.\n\
         \x20  Bad:  (inv.amount->>'value')::numeric\n\
         \x20  Good: NULLIF(inv.amount->>'value','')::numeric\n\
         3. Parse dates explicitly, never cast them.\n\
         \x20  Bad:  (inv.due_date->>'value')::date\n\
         \x20  Good: TO_DATE(NULLIF(inv.due_date->>'value',''),'{date_format}')\n\
         4. Join every fact table to its parent documents record.\n\
         \x20  Example: JOIN documents d ON d.id = inv.document_id\n"
    )
}

/// Strip markdown fences and surrounding prose from generated SQL.
pub fn extract_sql(raw: &str) -> String {
    let trimmed = raw.trim();
    let Some(start) = trimmed.find("```") else {
        return trimmed.to_string();
    };
    let body = &trimmed[start + 3..];
    let body = body
        .strip_prefix("sql")
        .or_else(|| body.strip_prefix("SQL"))
        .unwrap_or(body);
    let body = match body.find("```") {
        Some(end) => &body[..end],
        None => body
    };
    body.trim().to_string()
}

/// Narrow seam between the pipeline and the generation service.
///
/// Implementations receive a context and return SQL text; everything
/// else (prompting, transport, retries) is their concern. Tests drive
/// the pipeline with scripted implementations.
#[async_trait]
pub trait QueryGenerator: Send + Sync {
    /// Produce SQL text for the given context.
    async fn generate(&self, context: &GenerationContext) -> AppResult<String>;
}

/// LLM provider configuration with authentication credentials.
#[derive(Debug, Clone)]
pub enum LlmProvider {
    /// OpenAI API (GPT-4, GPT-3.5, etc.)
    OpenAI {
        /// API key (sk-...)
        api_key: String,
        /// Model identifier (e.g., "gpt-4", "gpt-3.5-turbo")
        model:   String
    },
    /// Anthropic API (Claude models)
    Anthropic {
        /// API key
        api_key: String,
        /// Model identifier (e.g., "claude-sonnet-4-20250514")
        model:   String
    },
    /// Local Ollama instance
    Ollama {
        /// Base URL (e.g., "http://localhost:11434")
        base_url: String,
        /// Model name (e.g., "llama3.2", "codellama")
        model:    String
    }
}

/// HTTP client for generation service communication with retry support.
///
/// Handles provider-specific request formatting and response parsing.
/// Automatically retries transient failures with exponential backoff.
pub struct LlmClient {
    provider:     LlmProvider,
    client:       reqwest::Client,
    retry_config: RetryConfig
}

#[derive(Serialize)]
struct OpenAIRequest {
    model:    String,
    messages: Vec<OpenAIRequestMessage>
}

#[derive(Serialize)]
struct OpenAIRequestMessage {
    role:    String,
    content: String
}

#[derive(Deserialize)]
struct OpenAIResponse {
    choices: Vec<OpenAIChoice>
}

#[derive(Deserialize)]
struct OpenAIChoice {
    message: OpenAIResponseMessage
}

#[derive(Deserialize)]
struct OpenAIResponseMessage {
    content: String
}

#[derive(Serialize)]
struct AnthropicRequest {
    model:      String,
    max_tokens: u32,
    messages:   Vec<AnthropicMessage>
}

#[derive(Serialize)]
struct AnthropicMessage {
    role:    String,
    content: String
}

#[derive(Deserialize)]
struct AnthropicResponse {
    content: Vec<AnthropicContent>
}

#[derive(Deserialize)]
struct AnthropicContent {
    text: String
}

#[derive(Serialize)]
struct OllamaRequest {
    model:  String,
    prompt: String,
    stream: bool
}

#[derive(Deserialize)]
struct OllamaResponse {
    response: String
}

impl LlmClient {
    /// Create new client with default retry configuration and timeout
    pub fn new(provider: LlmProvider) -> Self {
        Self::with_retry_config(provider, RetryConfig::default(), Duration::from_secs(30))
    }

    /// Create new client with custom retry configuration and timeout
    pub fn with_retry_config(
        provider: LlmProvider,
        retry_config: RetryConfig,
        timeout: Duration
    ) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            provider,
            client,
            retry_config
        }
    }

    async fn call_with_retry(&self, prompt: &str) -> AppResult<String> {
        let mut last_error = None;
        let mut delay = self.retry_config.initial_delay_ms;
        for attempt in 0..=self.retry_config.max_retries {
            if attempt > 0 {
                warn!(
                    attempt = attempt + 1,
                    max = self.retry_config.max_retries + 1,
                    delay_ms = delay,
                    "retrying generation request"
                );
                sleep(Duration::from_millis(delay)).await;
                delay = ((delay as f64 * self.retry_config.backoff_factor) as u64)
                    .min(self.retry_config.max_delay_ms);
            }
            match self.call_provider(prompt).await {
                Ok(result) => return Ok(result),
                Err(e) => {
                    if self.is_retryable_error(&e) {
                        last_error = Some(e);
                        continue;
                    }
                    return Err(e);
                }
            }
        }
        Err(last_error.unwrap_or_else(|| generation_error("All retry attempts failed")))
    }

    fn is_retryable_error(&self, error: &masterror::AppError) -> bool {
        let msg = error_message(error).to_lowercase();
        msg.contains("timeout")
            || msg.contains("connection")
            || msg.contains("429")
            || msg.contains("rate limit")
            || msg.contains("500")
            || msg.contains("502")
            || msg.contains("503")
            || msg.contains("504")
    }

    async fn call_provider(&self, prompt: &str) -> AppResult<String> {
        match &self.provider {
            LlmProvider::OpenAI {
                api_key,
                model
            } => self.call_openai(api_key, model, prompt).await,
            LlmProvider::Anthropic {
                api_key,
                model
            } => self.call_anthropic(api_key, model, prompt).await,
            LlmProvider::Ollama {
                base_url,
                model
            } => self.call_ollama(base_url, model, prompt).await
        }
    }

    async fn call_openai(&self, api_key: &str, model: &str, prompt: &str) -> AppResult<String> {
        let request = OpenAIRequest {
            model:    model.to_string(),
            messages: vec![OpenAIRequestMessage {
                role:    String::from("user"),
                content: prompt.to_string()
            }]
        };
        let response = self
            .client
            .post("https://api.openai.com/v1/chat/completions")
            .header("Authorization", format!("Bearer {}", api_key))
            .json(&request)
            .send()
            .await
            .map_err(http_error)?;
        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(generation_error(format!(
                "OpenAI API error {}: {}",
                status, text
            )));
        }
        let result: OpenAIResponse = response.json().await.map_err(http_error)?;
        result
            .choices
            .first()
            .map(|c| c.message.content.clone())
            .ok_or_else(|| generation_error("Empty response from OpenAI"))
    }

    async fn call_anthropic(&self, api_key: &str, model: &str, prompt: &str) -> AppResult<String> {
        let request = AnthropicRequest {
            model:      model.to_string(),
            max_tokens: 4096,
            messages:   vec![AnthropicMessage {
                role:    String::from("user"),
                content: prompt.to_string()
            }]
        };
        let response = self
            .client
            .post("https://api.anthropic.com/v1/messages")
            .header("x-api-key", api_key)
            .header("anthropic-version", "2023-06-01")
            .json(&request)
            .send()
            .await
            .map_err(http_error)?;
        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(generation_error(format!(
                "Anthropic API error {}: {}",
                status, text
            )));
        }
        let result: AnthropicResponse = response.json().await.map_err(http_error)?;
        result
            .content
            .first()
            .map(|c| c.text.clone())
            .ok_or_else(|| generation_error("Empty response from Anthropic"))
    }

    async fn call_ollama(&self, base_url: &str, model: &str, prompt: &str) -> AppResult<String> {
        let request = OllamaRequest {
            model:  model.to_string(),
            prompt: prompt.to_string(),
            stream: false
        };
        let url = format!("{}/api/generate", base_url.trim_end_matches('/'));
        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(http_error)?;
        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(generation_error(format!(
                "Ollama API error {}: {}",
                status, text
            )));
        }
        let result: OllamaResponse = response.json().await.map_err(http_error)?;
        Ok(result.response)
    }
}

#[async_trait]
impl QueryGenerator for LlmClient {
    async fn generate(&self, context: &GenerationContext) -> AppResult<String> {
        let raw = self.call_with_retry(&context.to_prompt()).await?;
        Ok(extract_sql(&raw))
    }
}
