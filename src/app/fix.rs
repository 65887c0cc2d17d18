//! Fix command execution.

use super::{
    helpers::{create_output_options, read_text_input},
    types::{CommandOutput, FixParams}
};
use crate::{config::Config, error::AppResult, fixer::AutoFixer, output::format_fix_outcome};

/// Applies mechanical fixes to one query.
///
/// Only pattern-fixable violations are rewritten. Anything the fixer
/// cannot resolve, like a missing parent join, is left for `lint` to
/// report and a human or the generation service to repair.
///
/// # Errors
///
/// Returns an error if the query file cannot be read.
pub fn run_fix(params: FixParams, config: &Config) -> AppResult<CommandOutput> {
    let query = read_text_input(&params.query_path)?;
    let opts = create_output_options(&params.output);

    let fixer = AutoFixer::with_config(&config.conventions);
    let outcome = fixer.fix(&query);

    Ok(CommandOutput {
        exit_code: 0,
        stdout:    vec![format_fix_outcome(&outcome, &opts)]
    })
}
