//! # SQL Query Sentinel
//!
//! Defensive SQL drafting, validation, and self-correcting execution.
//!
//! `sql-sentinel` targets databases populated by document extraction
//! (OCR), where most business fields are JSON objects whose extracted
//! text lives under `->>'value'` and may be empty or malformed. A bare
//! cast of such a value is a runtime failure waiting for the first bad
//! scan. The tool drafts queries through an LLM, lints them against a
//! small set of non-negotiable defensive rules, mechanically fixes what
//! is fixable, executes with bounded self-correcting retries, and
//! caches approved queries as parameterized templates.
//!
//! # Pipeline
//!
//! 1. **Build** - An LLM drafts SQL from a natural-language request;
//!    the draft is linted, auto-fixed, and re-prompted for repair at
//!    most twice. Unresolved critical issues are surfaced, never
//!    dropped.
//! 2. **Run** - The query executes against the HTTP query gateway with
//!    a budget of five attempts. Each failure feeds schema context and
//!    the database error back to the LLM for a corrected query, which
//!    is linted and fixed before the next attempt.
//! 3. **Approve** - A query that earned user approval is parameterized
//!    (`{month}`, `{year}`, `{start_date}`, `{end_date}`) and cached
//!    per agent for repeated execution.
//!
//! `lint` and `fix` expose the middle of the pipeline for offline use
//! without any service credentials.
//!
//! # Quick Start
//!
//! ```bash
//! # Offline lint against the defensive rules
//! sql-sentinel lint -q query.sql -s schema.sql
//!
//! # Mechanically fix what is fixable
//! sql-sentinel fix -q query.sql
//!
//! # Draft a validated query from a request
//! echo "total overdue amount per vendor for March 2025" | \
//!     sql-sentinel build -r - -s schema.sql
//!
//! # Execute with self-correcting retries
//! export DATABASE_URL="http://localhost:8080"
//! sql-sentinel run -q query.sql
//!
//! # Cache an approved query as a template
//! sql-sentinel approve -q query.sql --agent reports-7 --trigger month_year
//! ```
//!
//! # Configuration
//!
//! Configuration is loaded from (in order of precedence):
//!
//! 1. Command-line arguments
//! 2. Environment variables (`LLM_API_KEY`, `DATABASE_URL`, etc.)
//! 3. `.sql-sentinel.toml` in current directory
//! 4. `~/.config/sql-sentinel/config.toml`
//!
//! ## Example Configuration
//!
//! ```toml
//! [rules]
//! # Disable specific rules by ID
//! disabled = ["SCHEMA001"]
//!
//! # Override default severity levels
//! [rules.severity]
//! CAST002 = "medium"   # Demote to advisory
//!
//! [llm]
//! provider = "ollama"
//! model = "llama3.2"
//! timeout_secs = 30
//!
//! [database]
//! base_url = "http://localhost:8080"
//! timeout_secs = 30
//!
//! [conventions]
//! fact_prefix = "fact_"
//! parent_table = "documents"
//! parent_key = "document_id"
//! date_format = "MM/DD/YYYY"
//! ```
//!
//! # Rules
//!
//! | ID | Name | Default severity | Auto-fixable |
//! |----|------|------------------|--------------|
//! | CAST001 | Unguarded reference join cast | Critical | yes |
//! | CAST002 | Unguarded numeric cast | Critical | yes |
//! | CAST003 | Implicit date parsing | Critical | yes |
//! | JOIN001 | Missing parent document join | Critical | no |
//! | SCHEMA001 | Column not in schema | Critical | no |
//!
//! JOIN001 is never mechanically fixed because the correct join key
//! cannot be inferred from query text alone; the build and run
//! pipelines resolve it by re-prompting with schema context.
//!
//! # Exit Codes
//!
//! The process exit code reflects the worst finding or outcome:
//!
//! - `0` - Success, no issues
//! - `1` - Medium issues found (after severity demotion)
//! - `2` - Critical issues found, or the execution session failed
//!
//! # Output Formats
//!
//! - `text` - Human-readable colored output (default)
//! - `json` - Structured JSON for programmatic processing
//! - `yaml` - YAML format for configuration management
//!
//! # Modules
//!
//! - [`sql_query_sentinel::rules`] - Defensive rule engine
//! - [`sql_query_sentinel::fixer`] - Pattern-table auto-fixer
//! - [`sql_query_sentinel::builder`] - Draft pipeline
//! - [`sql_query_sentinel::executor`] - Execution retry loop
//! - [`sql_query_sentinel::schema`] - Introspection, classification, cache
//! - [`sql_query_sentinel::template`] - Query templating and persistence
//! - [`sql_query_sentinel::llm`] - Generation service integrations
//! - [`sql_query_sentinel::config`] - Configuration loading
//! - [`sql_query_sentinel::output`] - Result formatting
//! - [`sql_query_sentinel::error`] - Error types and constructors

use std::process;

use clap::Parser;
use sql_query_sentinel::{
    app::{
        self, ApproveParams, BuildParams, CommandOutput, FixParams, LintParams, RunParams
    },
    cli::{Cli, Commands},
    config::Config,
    error::{AppResult, error_message}
};
use tokio::main;
use tracing_subscriber::EnvFilter;

#[main]
async fn main() {
    init_tracing();
    match run().await {
        Ok(code) => process::exit(code),
        Err(e) => {
            eprintln!("Error: {}", error_message(&e));
            process::exit(1);
        }
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

async fn run() -> AppResult<i32> {
    let cli = Cli::parse();
    let config = Config::load()?;

    let output = match cli.command {
        Commands::Lint {
            query,
            schema,
            output
        } => app::run_lint(
            LintParams {
                query_path: query.display().to_string(),
                schema_path: schema.map(|p| p.display().to_string()),
                output
            },
            &config
        )?,
        Commands::Fix {
            query,
            output
        } => app::run_fix(
            FixParams {
                query_path: query.display().to_string(),
                output
            },
            &config
        )?,
        Commands::Build {
            request,
            schema,
            generation,
            output
        } => {
            app::run_build(
                BuildParams {
                    request_path: request.display().to_string(),
                    schema_path: schema.map(|p| p.display().to_string()),
                    generation,
                    output
                },
                &config
            )
            .await?
            .output
        }
        Commands::Run {
            query,
            database_url,
            generation,
            output
        } => {
            app::run_execute(
                RunParams {
                    query_path: query.display().to_string(),
                    database_url,
                    generation,
                    output
                },
                &config
            )
            .await?
        }
        Commands::Approve {
            query,
            agent,
            trigger,
            output
        } => {
            app::run_approve(
                ApproveParams {
                    query_path: query.display().to_string(),
                    agent,
                    trigger,
                    output
                },
                &config
            )?
            .output
        }
        Commands::Forget {
            agent
        } => app::run_forget(&agent, &config)?
    };

    print_output(&output);
    Ok(output.exit_code)
}

fn print_output(output: &CommandOutput) {
    for line in &output.stdout {
        println!("{}", line);
    }
}
