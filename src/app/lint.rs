//! Lint command execution.

use super::{
    helpers::{calculate_exit_code, create_output_options, load_schema, read_text_input},
    types::{CommandOutput, LintParams}
};
use crate::{config::Config, error::AppResult, output::format_lint_report, rules::Linter};

/// Lints one query against the defensive rules.
///
/// Reads the query (file or stdin), optionally parses a DDL file to
/// enable the schema-aware checks, and renders the report in the
/// requested format.
///
/// # Errors
///
/// Returns an error if the query or DDL file cannot be read, or if the
/// DDL fails to parse. Lint findings are not errors; they drive the
/// exit code instead.
pub fn run_lint(params: LintParams, config: &Config) -> AppResult<CommandOutput> {
    let query = read_text_input(&params.query_path)?;
    let schema = load_schema(params.schema_path.as_deref())?;
    let opts = create_output_options(&params.output);

    let linter = Linter::with_config(&config.conventions, &config.rules);
    let report = linter.report(&query, schema.as_ref());
    let exit_code = calculate_exit_code(&report);

    Ok(CommandOutput {
        exit_code,
        stdout: vec![format_lint_report(&report, &opts)]
    })
}
