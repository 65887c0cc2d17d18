//! Turns an approved concrete query into a reusable parameterized
//! template.
//!
//! Templating is lexical. Each trigger type names a literal shape to
//! find and the placeholders to put in its place:
//!
//! | Trigger | Finds | Becomes |
//! |---------|-------|---------|
//! | `month_year` | `02/%/2025` style month filters | `{month}/%/{year}` |
//! | `year` | bare 4-digit year tokens | `{year}` |
//! | `date_range` | first and second quoted date literals | `'{start_date}'`, `'{end_date}'` |
//!
//! The `parameters` set is re-derived from the substituted text, so it
//! always equals the placeholders actually present in `base_query`.
//!
//! Year templating has no semantic check: a 4-digit constant that is
//! not a year (a threshold in a HAVING clause, say) gets rewritten too.
//! Templates are reviewed at approval time, which is where such a
//! mis-substitution is expected to be caught.
//!
//! Templates persist one per agent. Re-approval overwrites, agent
//! deletion removes, and writes go through a temp file plus rename so a
//! crashed write never leaves a torn template behind.

use std::{
    collections::BTreeSet,
    fmt, fs, io,
    path::{Path, PathBuf},
    sync::LazyLock,
    time::{SystemTime, UNIX_EPOCH}
};

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::{
    error::{AppResult, template_error},
    sqltext::{join_clauses, referenced_tables}
};

static MONTH_FILTER_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(\d{1,2})(/[%\d]{1,2}/)(\d{4})\b").expect("valid regex"));

static YEAR_TOKEN_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(?:19|20)\d{2}\b").expect("valid regex"));

static DATE_LITERAL_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"'\d{1,2}/\d{1,2}/\d{4}'").expect("valid regex"));

static PLACEHOLDER_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{([a-z_]+)\}").expect("valid regex"));

/// Which literal shape gets parameterized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerType {
    MonthYear,
    Year,
    DateRange
}

impl fmt::Display for TriggerType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::MonthYear => "month_year",
            Self::Year => "year",
            Self::DateRange => "date_range"
        };
        write!(f, "{}", label)
    }
}

/// A parameterized query plus the structural metadata extracted from it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryTemplate {
    pub id:         String,
    pub trigger:    TriggerType,
    pub base_query: String,
    /// Exactly the placeholder tokens present in `base_query`
    pub parameters: BTreeSet<String>,
    /// Tables referenced after FROM/JOIN, in order of appearance
    pub tables:     Vec<String>,
    /// Full join clauses, from each JOIN keyword to the next boundary
    pub joins:      Vec<String>,
    /// Unix seconds
    pub created_at: u64
}

/// Parameterize a concrete query for the given trigger.
pub fn templatize(query: &str, trigger: TriggerType) -> QueryTemplate {
    let base_query = match trigger {
        TriggerType::MonthYear => MONTH_FILTER_REGEX
            .replace_all(query, "{month}${2}{year}")
            .into_owned(),
        TriggerType::Year => YEAR_TOKEN_REGEX.replace_all(query, "{year}").into_owned(),
        TriggerType::DateRange => substitute_date_range(query)
    };

    let parameters = PLACEHOLDER_REGEX
        .captures_iter(&base_query)
        .filter_map(|cap| cap.get(1))
        .map(|m| m.as_str().to_string())
        .collect();

    let tables = referenced_tables(&base_query)
        .iter()
        .map(|table_ref| table_ref.table.to_string())
        .collect();
    let joins = join_clauses(&base_query);

    QueryTemplate {
        id: Uuid::new_v4().to_string(),
        trigger,
        base_query,
        parameters,
        tables,
        joins,
        created_at: unix_now()
    }
}

/// Replace the first two quoted date literals, positionally.
fn substitute_date_range(query: &str) -> String {
    let mut result = String::with_capacity(query.len());
    let mut last = 0;
    for (index, found) in DATE_LITERAL_REGEX.find_iter(query).take(2).enumerate() {
        result.push_str(&query[last..found.start()]);
        result.push_str(if index == 0 {
            "'{start_date}'"
        } else {
            "'{end_date}'"
        });
        last = found.end();
    }
    result.push_str(&query[last..]);
    result
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| d.as_secs())
}

/// Per-agent template persistence. One template per agent,
/// last write wins.
pub trait TemplateStore: Send + Sync {
    fn get(&self, agent_id: &str) -> AppResult<Option<QueryTemplate>>;
    fn put(&self, agent_id: &str, template: &QueryTemplate) -> AppResult<()>;
    fn remove(&self, agent_id: &str) -> AppResult<()>;
}

/// Templatize an approved query and persist it for `agent_id`.
pub fn approve_and_cache(
    query: &str,
    trigger: TriggerType,
    agent_id: &str,
    store: &dyn TemplateStore
) -> AppResult<QueryTemplate> {
    let template = templatize(query, trigger);
    store.put(agent_id, &template)?;
    info!(
        agent = agent_id,
        template = %template.id,
        parameters = template.parameters.len(),
        "template cached"
    );
    Ok(template)
}

/// JSON-file store, one file per agent under a fixed directory.
pub struct FileTemplateStore {
    dir: PathBuf
}

impl FileTemplateStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into()
        }
    }

    fn path_for(&self, agent_id: &str) -> PathBuf {
        self.dir.join(format!("{}.json", sanitize_agent_id(agent_id)))
    }
}

/// Agent ids become file names, so anything outside `[A-Za-z0-9_-]`
/// is replaced.
fn sanitize_agent_id(agent_id: &str) -> String {
    let sanitized: String = agent_id
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();
    if sanitized.is_empty() {
        String::from("agent")
    } else {
        sanitized
    }
}

impl TemplateStore for FileTemplateStore {
    fn get(&self, agent_id: &str) -> AppResult<Option<QueryTemplate>> {
        let path = self.path_for(agent_id);
        let content = match fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(template_error(format!(
                    "Failed to read template '{}': {}",
                    path.display(),
                    e
                )));
            }
        };
        let template = serde_json::from_str(&content).map_err(|e| {
            template_error(format!("Corrupt template '{}': {}", path.display(), e))
        })?;
        Ok(Some(template))
    }

    fn put(&self, agent_id: &str, template: &QueryTemplate) -> AppResult<()> {
        fs::create_dir_all(&self.dir).map_err(|e| {
            template_error(format!(
                "Failed to create template directory '{}': {}",
                self.dir.display(),
                e
            ))
        })?;

        let path = self.path_for(agent_id);
        let json = serde_json::to_string_pretty(template)
            .map_err(|e| template_error(format!("Failed to serialize template: {}", e)))?;
        write_atomic(&path, &json)
    }

    fn remove(&self, agent_id: &str) -> AppResult<()> {
        let path = self.path_for(agent_id);
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(template_error(format!(
                "Failed to remove template '{}': {}",
                path.display(),
                e
            )))
        }
    }
}

/// Write through a sibling temp file and rename into place.
fn write_atomic(path: &Path, content: &str) -> AppResult<()> {
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, content).map_err(|e| {
        template_error(format!("Failed to write '{}': {}", tmp.display(), e))
    })?;
    fs::rename(&tmp, path).map_err(|e| {
        template_error(format!(
            "Failed to move template into place at '{}': {}",
            path.display(),
            e
        ))
    })
}
