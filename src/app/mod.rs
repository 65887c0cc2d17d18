//! CLI application layer.
//!
//! Thin orchestration between parsed CLI arguments and the library
//! pipeline. Each subcommand has a `run_*` function taking a params
//! struct and the loaded configuration, returning a [`CommandOutput`]
//! with the exit code and rendered stdout. The binary in `main.rs` does
//! nothing but dispatch and print.

pub mod approve;
pub mod build;
pub mod convert;
pub mod execute;
pub mod fix;
pub mod helpers;
pub mod lint;
pub mod types;

pub use approve::{run_approve, run_forget};
pub use build::run_build;
pub use convert::{convert_format, convert_trigger};
pub use execute::run_execute;
pub use fix::run_fix;
pub use helpers::calculate_exit_code;
pub use lint::run_lint;
pub use types::{
    ApproveParams, ApproveResult, BuildParams, BuildResult, CommandOutput, FixParams, LintParams,
    RunParams
};
