//! Run command execution.
//!
//! This module wires the execution retry loop to its live
//! collaborators: the HTTP query gateway (which doubles as the schema
//! catalog), the generation client for corrections, and the
//! linter/fixer pair that sanitizes every corrected query.

use std::time::Duration;

use super::{
    helpers::{build_generator, create_output_options, progress_spinner, read_text_input},
    types::{CommandOutput, RunParams}
};
use crate::{
    config::Config,
    error::{AppResult, config_error},
    executor::{HttpDatabase, QueryExecutor},
    fixer::AutoFixer,
    output::format_session,
    rules::Linter,
    schema::SchemaCache
};

/// Executes one query with self-correcting retries.
///
/// The session runs until the database returns rows, the retry policy
/// stops it, or the attempt budget is spent. The full attempt history
/// is rendered either way; the exit code is `0` only when the session
/// succeeded.
///
/// # Errors
///
/// Returns an error if the query file cannot be read, no gateway URL is
/// configured, or the generation client cannot be built. Execution
/// failures are not errors; they are recorded in the session.
pub async fn run_execute(params: RunParams, config: &Config) -> AppResult<CommandOutput> {
    let query = read_text_input(&params.query_path)?;
    let opts = create_output_options(&params.output);

    let base_url = params
        .database_url
        .clone()
        .or(config.database.base_url.clone())
        .ok_or_else(|| {
            config_error("Query gateway URL required (use --database-url or DATABASE_URL)")
        })?;

    let database = HttpDatabase::new(base_url, Duration::from_secs(config.database.timeout_secs));
    let generator = build_generator(&params.generation, config)?;
    let linter = Linter::with_config(&config.conventions, &config.rules);
    let fixer = AutoFixer::with_config(&config.conventions);
    let schema_cache = SchemaCache::new(Duration::from_secs(config.schema.cache_ttl_secs));

    let executor = QueryExecutor::new(
        &database,
        &database,
        &generator,
        &linter,
        &fixer,
        &schema_cache,
        config.conventions.date_format.clone()
    );

    let pb = progress_spinner("Executing query...");
    let session = executor.run(query.trim()).await;
    pb.finish_and_clear();

    let exit_code = if session.succeeded() { 0 } else { 2 };
    Ok(CommandOutput {
        exit_code,
        stdout: vec![format_session(&session, &opts)]
    })
}
