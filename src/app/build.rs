//! Build command execution.
//!
//! This module contains the `run_build` function that drives the full
//! drafting pipeline: generation, linting, mechanical fixes, and
//! bounded repair rounds against the generation service.

use super::{
    helpers::{build_generator, create_output_options, load_schema, progress_spinner, read_text_input},
    types::{BuildParams, BuildResult, CommandOutput}
};
use crate::{
    builder::TemplateBuilder,
    config::Config,
    error::AppResult,
    fixer::AutoFixer,
    output::format_draft_outcome,
    rules::Linter
};

/// Drafts a validated query from a natural-language request.
///
/// The request text is read from a file or stdin and handed to the
/// drafting pipeline together with optional DDL-derived schema context.
/// The exit code is `0` when the draft came out free of critical
/// issues and `2` otherwise; unresolved findings are always rendered,
/// never dropped.
///
/// # Errors
///
/// Returns an error if input files cannot be read, the DDL fails to
/// parse, the generation client cannot be built, or the generation
/// service fails.
///
/// # Example
///
/// ```no_run
/// use sql_query_sentinel::{
///     app::{BuildParams, run_build},
///     cli::{Format, GenerationArgs, OutputArgs, Provider},
///     config::Config
/// };
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let params = BuildParams {
///     request_path: "request.txt".to_string(),
///     schema_path:  Some("schema.sql".to_string()),
///     generation:   GenerationArgs {
///         provider:   Provider::Ollama,
///         api_key:    None,
///         model:      None,
///         ollama_url: "http://localhost:11434".to_string()
///     },
///     output:       OutputArgs {
///         output_format: Format::Text,
///         verbose:       false,
///         no_color:      false
///     }
/// };
///
/// let config = Config::default();
/// let result = run_build(params, &config).await?;
/// println!("Exit code: {}", result.output.exit_code);
/// # Ok(())
/// # }
/// ```
pub async fn run_build(params: BuildParams, config: &Config) -> AppResult<BuildResult> {
    let request = read_text_input(&params.request_path)?;
    let schema = load_schema(params.schema_path.as_deref())?;
    let opts = create_output_options(&params.output);

    let generator = build_generator(&params.generation, config)?;
    let linter = Linter::with_config(&config.conventions, &config.rules);
    let fixer = AutoFixer::with_config(&config.conventions);
    let builder = TemplateBuilder::new(
        &generator,
        &linter,
        &fixer,
        config.conventions.date_format.clone()
    );

    let pb = progress_spinner("Drafting query...");
    let outcome = builder.build(request.trim(), schema.as_ref()).await?;
    pb.finish_and_clear();

    let exit_code = if outcome.is_clean() { 0 } else { 2 };
    let clean_query = outcome.is_clean().then(|| outcome.query.clone());

    Ok(BuildResult {
        output: CommandOutput {
            exit_code,
            stdout: vec![format_draft_outcome(&outcome, &opts)]
        },
        clean_query
    })
}
