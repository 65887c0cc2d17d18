use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

/// SQL Query Sentinel - Draft, validate, and execute defensive SQL over
/// OCR-extracted data
#[derive(Parser, Debug)]
#[command(name = "sql-sentinel")]
#[command(version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Check a query against the defensive rules
    Lint {
        /// Path to SQL query file (use - for stdin)
        #[arg(short, long)]
        query: PathBuf,

        /// Path to DDL file enabling schema-aware checks
        #[arg(short, long)]
        schema: Option<PathBuf>,

        #[command(flatten)]
        output: OutputArgs
    },

    /// Apply mechanical fixes for fixable rule violations
    Fix {
        /// Path to SQL query file (use - for stdin)
        #[arg(short, long)]
        query: PathBuf,

        #[command(flatten)]
        output: OutputArgs
    },

    /// Draft a validated query from a natural-language request
    Build {
        /// Path to the request text file (use - for stdin)
        #[arg(short, long)]
        request: PathBuf,

        /// Path to DDL file providing schema context
        #[arg(short, long)]
        schema: Option<PathBuf>,

        #[command(flatten)]
        generation: GenerationArgs,

        #[command(flatten)]
        output: OutputArgs
    },

    /// Execute a query with self-correcting retries
    Run {
        /// Path to SQL query file (use - for stdin)
        #[arg(short, long)]
        query: PathBuf,

        /// Query gateway base URL
        #[arg(short, long, env = "DATABASE_URL")]
        database_url: Option<String>,

        #[command(flatten)]
        generation: GenerationArgs,

        #[command(flatten)]
        output: OutputArgs
    },

    /// Approve a query and cache it as a parameterized template
    Approve {
        /// Path to SQL query file (use - for stdin)
        #[arg(short, long)]
        query: PathBuf,

        /// Agent that owns the cached template
        #[arg(short, long)]
        agent: String,

        /// Literal shape to parameterize
        #[arg(short, long, value_enum)]
        trigger: Trigger,

        #[command(flatten)]
        output: OutputArgs
    },

    /// Remove an agent's cached template
    Forget {
        /// Agent whose template should be removed
        #[arg(short, long)]
        agent: String
    }
}

/// Generation service options shared by drafting commands
#[derive(Args, Debug, Clone)]
pub struct GenerationArgs {
    /// LLM provider to use
    #[arg(short, long, value_enum, default_value = "ollama")]
    pub provider: Provider,

    /// API key for OpenAI or Anthropic
    #[arg(short, long, env = "LLM_API_KEY")]
    pub api_key: Option<String>,

    /// Model name
    #[arg(short, long)]
    pub model: Option<String>,

    /// Ollama base URL
    #[arg(long, default_value = "http://localhost:11434")]
    pub ollama_url: String
}

/// Output options shared by all commands
#[derive(Args, Debug, Clone)]
pub struct OutputArgs {
    /// Output format
    #[arg(short = 'f', long, value_enum, default_value = "text")]
    pub output_format: Format,

    /// Enable verbose output with per-attempt query text
    #[arg(short, long)]
    pub verbose: bool,

    /// Disable colored output
    #[arg(long)]
    pub no_color: bool
}

#[derive(Debug, Clone, ValueEnum)]
pub enum Provider {
    OpenAI,
    Anthropic,
    Ollama
}

impl Provider {
    /// Get default model for provider
    pub fn default_model(&self) -> &str {
        match self {
            Self::OpenAI => "gpt-4",
            Self::Anthropic => "claude-sonnet-4-20250514",
            Self::Ollama => "llama3.2"
        }
    }
}

#[derive(Debug, Clone, ValueEnum)]
#[value(rename_all = "snake_case")]
pub enum Trigger {
    MonthYear,
    Year,
    DateRange
}

#[derive(Debug, Clone, ValueEnum)]
pub enum Format {
    Text,
    Json,
    Yaml
}
