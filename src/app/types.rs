//! Application types for CLI commands.
//!
//! Each subcommand has a params struct carrying everything its `run_*`
//! function needs, so command logic stays testable without argument
//! parsing. Results come back as a [`CommandOutput`] ready for printing.

use crate::{
    cli::{GenerationArgs, OutputArgs, Trigger},
    template::QueryTemplate
};

/// Parameters for the lint command.
#[derive(Debug, Clone)]
pub struct LintParams {
    /// Path to query file or "-" for stdin input.
    pub query_path:  String,
    /// Optional DDL file enabling schema-aware checks.
    pub schema_path: Option<String>,
    pub output:      OutputArgs
}

/// Parameters for the fix command.
#[derive(Debug, Clone)]
pub struct FixParams {
    /// Path to query file or "-" for stdin input.
    pub query_path: String,
    pub output:     OutputArgs
}

/// Parameters for the build command.
#[derive(Debug, Clone)]
pub struct BuildParams {
    /// Path to the natural-language request file or "-" for stdin.
    pub request_path: String,
    /// Optional DDL file providing schema context for the draft.
    pub schema_path:  Option<String>,
    pub generation:   GenerationArgs,
    pub output:       OutputArgs
}

/// Parameters for the run command.
#[derive(Debug, Clone)]
pub struct RunParams {
    /// Path to query file or "-" for stdin input.
    pub query_path:   String,
    /// Query gateway base URL; falls back to configuration.
    pub database_url: Option<String>,
    pub generation:   GenerationArgs,
    pub output:       OutputArgs
}

/// Parameters for the approve command.
#[derive(Debug, Clone)]
pub struct ApproveParams {
    /// Path to query file or "-" for stdin input.
    pub query_path: String,
    /// Agent that owns the cached template.
    pub agent:      String,
    /// Literal shape to parameterize.
    pub trigger:    Trigger,
    pub output:     OutputArgs
}

/// Output from CLI command execution.
///
/// Represents the final output ready for display, including the exit
/// code and all lines to be printed to stdout.
///
/// # Example
///
/// ```
/// use sql_query_sentinel::app::CommandOutput;
///
/// let output = CommandOutput {
///     exit_code: 0,
///     stdout:    vec!["Lint complete.".to_string()]
/// };
/// ```
#[derive(Debug, Clone)]
pub struct CommandOutput {
    /// Exit code for the process (0=clean, 1=medium issues, 2=critical).
    pub exit_code: i32,
    /// Lines to print to stdout.
    pub stdout:    Vec<String>
}

/// Result of the build command: the draft outcome rendered for display
/// plus the template-ready query text when the draft came out clean.
#[derive(Debug, Clone)]
pub struct BuildResult {
    pub output:      CommandOutput,
    /// Present when no critical issues survived the pipeline
    pub clean_query: Option<String>
}

/// Result of approving a query: the cached template and display output.
#[derive(Debug, Clone)]
pub struct ApproveResult {
    pub output:   CommandOutput,
    pub template: QueryTemplate
}
