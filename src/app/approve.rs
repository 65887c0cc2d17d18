//! Approve and forget command execution.

use super::{
    convert::convert_trigger,
    helpers::{create_output_options, read_text_input},
    types::{ApproveParams, ApproveResult, CommandOutput}
};
use crate::{
    config::Config,
    error::AppResult,
    output::format_template,
    template::{FileTemplateStore, TemplateStore, approve_and_cache}
};

/// Approves a concrete query and caches it as the agent's template.
///
/// The query is parameterized for the given trigger and written to the
/// per-agent store, replacing any previously cached template.
///
/// # Errors
///
/// Returns an error if the query file cannot be read or the template
/// cannot be persisted.
pub fn run_approve(params: ApproveParams, config: &Config) -> AppResult<ApproveResult> {
    let query = read_text_input(&params.query_path)?;
    let opts = create_output_options(&params.output);

    let store = FileTemplateStore::new(config.templates.dir.clone());
    let template = approve_and_cache(
        query.trim(),
        convert_trigger(params.trigger),
        &params.agent,
        &store
    )?;

    Ok(ApproveResult {
        output: CommandOutput {
            exit_code: 0,
            stdout:    vec![format_template(&template, &opts)]
        },
        template
    })
}

/// Removes an agent's cached template, if one exists.
///
/// Removing a template that does not exist is not an error; the store
/// treats it as already gone.
///
/// # Errors
///
/// Returns an error only when the store fails to delete an existing
/// template file.
pub fn run_forget(agent: &str, config: &Config) -> AppResult<CommandOutput> {
    let store = FileTemplateStore::new(config.templates.dir.clone());
    store.remove(agent)?;
    Ok(CommandOutput {
        exit_code: 0,
        stdout:    vec![format!("Removed cached template for agent '{}'.", agent)]
    })
}
