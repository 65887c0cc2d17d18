//! Helper functions for CLI operations.
//!
//! This module provides utility functions used throughout the CLI
//! application for tasks such as reading input, calculating exit codes,
//! building the generation client, and managing configuration defaults.

use std::{
    fs::read_to_string,
    io::{self, Read},
    time::Duration
};

use indicatif::{ProgressBar, ProgressStyle};

use super::convert::convert_format;
use crate::{
    cli::{GenerationArgs, OutputArgs, Provider},
    config::Config,
    error::{AppResult, config_error, file_read_error},
    llm::{LlmClient, LlmProvider},
    output::OutputOptions,
    rules::{LintReport, Severity},
    schema::{SchemaSnapshot, snapshot_from_ddl}
};

/// Calculates the process exit code from lint findings.
///
/// - `0` - No issues found
/// - `1` - Medium issues only
/// - `2` - At least one critical issue
///
/// # Example
///
/// ```
/// use sql_query_sentinel::{app::calculate_exit_code, rules::LintReport};
///
/// let report = LintReport::new(vec![], 5);
/// assert_eq!(calculate_exit_code(&report), 0);
/// ```
pub fn calculate_exit_code(report: &LintReport) -> i32 {
    if report.issues.iter().any(|i| i.severity == Severity::Critical) {
        2
    } else if report.issues.iter().any(|i| i.severity == Severity::Medium) {
        1
    } else {
        0
    }
}

/// Reads query or request text from a file or stdin.
///
/// Supports reading from a file path or from standard input when the
/// path is "-".
///
/// # Errors
///
/// Returns an error if the file cannot be read or stdin fails.
pub fn read_text_input(path: &str) -> AppResult<String> {
    if path == "-" {
        let mut buffer = String::new();
        io::stdin()
            .read_to_string(&mut buffer)
            .map_err(|e| file_read_error("stdin", e))?;
        Ok(buffer)
    } else {
        read_to_string(path).map_err(|e| file_read_error(path, e))
    }
}

/// Loads an optional DDL file into a schema snapshot.
///
/// Commands that accept `--schema` pass the path through here; `None`
/// disables the schema-aware checks rather than failing.
///
/// # Errors
///
/// Returns an error if the file cannot be read or the DDL fails to
/// parse.
pub fn load_schema(path: Option<&str>) -> AppResult<Option<SchemaSnapshot>> {
    match path {
        Some(path) => {
            let ddl = read_to_string(path).map_err(|e| file_read_error(path, e))?;
            Ok(Some(snapshot_from_ddl(&ddl)?))
        }
        None => Ok(None)
    }
}

/// Creates output options from CLI output arguments.
pub fn create_output_options(args: &OutputArgs) -> OutputOptions {
    OutputOptions {
        format:  convert_format(args.output_format.clone()),
        colored: !args.no_color,
        verbose: args.verbose
    }
}

/// Builds an LLM provider configuration from CLI parameters.
///
/// For cloud providers (OpenAI, Anthropic) an API key is required.
///
/// # Errors
///
/// Returns an error if a cloud provider is selected without an API key.
pub fn build_llm_provider(
    provider: Provider,
    api_key: Option<String>,
    model: String,
    ollama_url: String
) -> AppResult<LlmProvider> {
    match provider {
        Provider::OpenAI => {
            let key = api_key.ok_or_else(|| {
                config_error("API key required for OpenAI (use --api-key or LLM_API_KEY)")
            })?;
            Ok(LlmProvider::OpenAI {
                api_key: key,
                model
            })
        }
        Provider::Anthropic => {
            let key = api_key.ok_or_else(|| {
                config_error("API key required for Anthropic (use --api-key or LLM_API_KEY)")
            })?;
            Ok(LlmProvider::Anthropic {
                api_key: key,
                model
            })
        }
        Provider::Ollama => Ok(LlmProvider::Ollama {
            base_url: ollama_url,
            model
        })
    }
}

/// Gets the effective model name from available sources.
///
/// Resolves the model name in order of precedence: explicit CLI value,
/// configuration file, provider default.
pub fn get_effective_model(
    model: Option<String>,
    config_model: Option<String>,
    provider: &Provider
) -> String {
    model
        .or(config_model)
        .unwrap_or_else(|| provider.default_model().to_string())
}

/// Gets the effective Ollama URL from available sources.
///
/// Uses the config URL if the provided URL is the default localhost,
/// otherwise uses the explicitly provided URL.
pub fn get_effective_ollama_url(url: String, config_url: Option<String>) -> String {
    if url == "http://localhost:11434" {
        config_url.unwrap_or(url)
    } else {
        url
    }
}

/// Assembles the generation client from CLI arguments and configuration.
///
/// # Errors
///
/// Returns an error if a cloud provider is selected without an API key.
pub fn build_generator(args: &GenerationArgs, config: &Config) -> AppResult<LlmClient> {
    let api_key = args.api_key.clone().or(config.llm.api_key.clone());
    let ollama_url =
        get_effective_ollama_url(args.ollama_url.clone(), config.llm.ollama_url.clone());
    let model = get_effective_model(args.model.clone(), config.llm.model.clone(), &args.provider);
    let provider = build_llm_provider(args.provider.clone(), api_key, model, ollama_url)?;
    Ok(LlmClient::with_retry_config(
        provider,
        config.retry.clone(),
        Duration::from_secs(config.llm.timeout_secs)
    ))
}

/// Spawns a steady-tick spinner for long-running pipeline stages.
pub fn progress_spinner(message: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.green} {msg}") {
        pb.set_style(style);
    }
    pb.set_message(message.to_string());
    pb.enable_steady_tick(Duration::from_millis(100));
    pb
}
