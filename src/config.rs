//! Configuration loading and management.
//!
//! Configuration is loaded from multiple sources with the following precedence
//! (highest to lowest):
//!
//! 1. Command-line arguments
//! 2. Environment variables
//! 3. `.sql-sentinel.toml` in current directory
//! 4. `~/.config/sql-sentinel/config.toml`
//! 5. Default values
//!
//! # Configuration File Format
//!
//! ```toml
//! [llm]
//! provider = "ollama"          # openai, anthropic, ollama
//! model = "llama3.2"
//! api_key = "sk-..."           # or use LLM_API_KEY env var
//! ollama_url = "http://localhost:11434"
//! timeout_secs = 30
//!
//! [retry]
//! max_retries = 3
//! initial_delay_ms = 1000
//! max_delay_ms = 30000
//! backoff_factor = 2.0
//!
//! [rules]
//! disabled = ["SCHEMA001"]
//!
//! [rules.severity]
//! CAST002 = "medium"
//!
//! [database]
//! base_url = "http://localhost:8080"
//! timeout_secs = 30
//!
//! [schema]
//! cache_ttl_secs = 300
//!
//! [templates]
//! dir = ".sql-sentinel/templates"
//!
//! [conventions]
//! fact_prefix = "fact_"
//! parent_table = "documents"
//! parent_key = "document_id"
//! date_format = "MM/DD/YYYY"
//! ```
//!
//! # Environment Variables
//!
//! | Variable | Description |
//! |----------|-------------|
//! | `LLM_API_KEY` | API key for OpenAI/Anthropic |
//! | `LLM_PROVIDER` | Provider name |
//! | `LLM_MODEL` | Model identifier |
//! | `OLLAMA_URL` | Ollama base URL |
//! | `DATABASE_URL` | Query gateway base URL |

use std::{collections::HashMap, env, fs, path::PathBuf};

use serde::Deserialize;

use crate::error::{AppResult, config_error};

/// Application configuration
#[derive(Debug, Clone, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub llm:         LlmConfig,
    #[serde(default)]
    pub retry:       RetryConfig,
    #[serde(default)]
    pub rules:       RulesConfig,
    #[serde(default)]
    pub database:    DatabaseConfig,
    #[serde(default)]
    pub schema:      SchemaConfig,
    #[serde(default)]
    pub templates:   TemplatesConfig,
    #[serde(default)]
    pub conventions: ConventionsConfig
}

/// Rules configuration
#[derive(Debug, Clone, Deserialize, Default)]
pub struct RulesConfig {
    /// Disabled rule IDs
    #[serde(default)]
    pub disabled: Vec<String>,
    /// Severity overrides (rule_id -> severity)
    #[serde(default)]
    pub severity: HashMap<String, String>
}

/// LLM provider configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LlmConfig {
    pub provider:     Option<String>,
    pub api_key:      Option<String>,
    pub model:        Option<String>,
    pub ollama_url:   Option<String>,
    /// Per-request timeout for generation calls
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider:     None,
            api_key:      None,
            model:        None,
            ollama_url:   Some(String::from("http://localhost:11434")),
            timeout_secs: default_timeout_secs()
        }
    }
}

/// Retry configuration for generation-service network calls.
///
/// This budget covers transient HTTP failures only and is independent of
/// the 5-attempt execution budget in the retry loop.
#[derive(Debug, Clone, Deserialize)]
pub struct RetryConfig {
    pub max_retries:      u32,
    pub initial_delay_ms: u64,
    pub max_delay_ms:     u64,
    pub backoff_factor:   f64
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries:      3,
            initial_delay_ms: 1000,
            max_delay_ms:     30000,
            backoff_factor:   2.0
        }
    }
}

/// Query gateway configuration
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub base_url:     Option<String>,
    /// Per-request timeout for execution calls
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            base_url:     None,
            timeout_secs: default_timeout_secs()
        }
    }
}

/// Schema cache configuration
#[derive(Debug, Clone, Deserialize)]
pub struct SchemaConfig {
    /// Seconds before a cached table snapshot is re-fetched
    pub cache_ttl_secs: u64
}

impl Default for SchemaConfig {
    fn default() -> Self {
        Self {
            cache_ttl_secs: 300
        }
    }
}

/// Template store configuration
#[derive(Debug, Clone, Deserialize)]
pub struct TemplatesConfig {
    /// Directory holding one JSON template document per agent
    pub dir: PathBuf
}

impl Default for TemplatesConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from(".sql-sentinel/templates")
        }
    }
}

/// Fact-table join conventions used by the parent-join rule and the
/// date-format convention used by fix rewrites.
#[derive(Debug, Clone, Deserialize)]
pub struct ConventionsConfig {
    pub fact_prefix:  String,
    pub parent_table: String,
    pub parent_key:   String,
    pub date_format:  String
}

impl Default for ConventionsConfig {
    fn default() -> Self {
        Self {
            fact_prefix:  String::from("fact_"),
            parent_table: String::from("documents"),
            parent_key:   String::from("document_id"),
            date_format:  String::from("MM/DD/YYYY")
        }
    }
}

fn default_timeout_secs() -> u64 {
    30
}

impl Config {
    /// Load configuration from file and environment
    ///
    /// Priority (highest to lowest):
    /// 1. Environment variables
    /// 2. Config file in current directory (.sql-sentinel.toml)
    /// 3. Config file in home directory (~/.config/sql-sentinel/config.toml)
    /// 4. Default values
    pub fn load() -> AppResult<Self> {
        let mut config = Self::default();

        // Try to load from home directory config
        if let Some(home) = env::var_os("HOME") {
            let home_config = PathBuf::from(home)
                .join(".config")
                .join("sql-sentinel")
                .join("config.toml");

            if home_config.exists() {
                let content = fs::read_to_string(&home_config)
                    .map_err(|e| config_error(format!("Failed to read config file: {}", e)))?;
                config = toml::from_str(&content)
                    .map_err(|e| config_error(format!("Invalid config file: {}", e)))?;
            }
        }

        // Try to load from current directory config (overrides home config)
        let local_config = PathBuf::from(".sql-sentinel.toml");
        if local_config.exists() {
            let content = fs::read_to_string(&local_config)
                .map_err(|e| config_error(format!("Failed to read config file: {}", e)))?;
            config = toml::from_str(&content)
                .map_err(|e| config_error(format!("Invalid config file: {}", e)))?;
        }

        // Override with environment variables
        if let Ok(api_key) = env::var("LLM_API_KEY") {
            config.llm.api_key = Some(api_key);
        }

        if let Ok(provider) = env::var("LLM_PROVIDER") {
            config.llm.provider = Some(provider);
        }

        if let Ok(model) = env::var("LLM_MODEL") {
            config.llm.model = Some(model);
        }

        if let Ok(url) = env::var("OLLAMA_URL") {
            config.llm.ollama_url = Some(url);
        }

        if let Ok(url) = env::var("DATABASE_URL") {
            config.database.base_url = Some(url);
        }

        Ok(config)
    }
}
