use colored::Colorize;

use crate::{
    builder::DraftOutcome,
    executor::{FinalStatus, RetrySession},
    fixer::FixOutcome,
    rules::{LintReport, Severity},
    template::QueryTemplate
};

/// Output format for results
#[derive(Debug, Clone, Copy, Default)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
    Yaml
}

/// Output options
#[derive(Debug, Clone)]
pub struct OutputOptions {
    pub format:  OutputFormat,
    pub colored: bool,
    pub verbose: bool
}

impl Default for OutputOptions {
    fn default() -> Self {
        Self {
            format:  OutputFormat::Text,
            colored: true,
            verbose: false
        }
    }
}

/// Format a lint report based on output options
pub fn format_lint_report(report: &LintReport, opts: &OutputOptions) -> String {
    match opts.format {
        OutputFormat::Json => serde_json::to_string_pretty(report).unwrap_or_default(),
        OutputFormat::Yaml => serde_yaml::to_string(report).unwrap_or_default(),
        OutputFormat::Text => format_lint_text(report, opts)
    }
}

/// Format a fix outcome based on output options
pub fn format_fix_outcome(outcome: &FixOutcome, opts: &OutputOptions) -> String {
    match opts.format {
        OutputFormat::Json => serde_json::to_string_pretty(outcome).unwrap_or_default(),
        OutputFormat::Yaml => serde_yaml::to_string(outcome).unwrap_or_default(),
        OutputFormat::Text => {
            let mut out = String::new();
            if outcome.applied_fixes.is_empty() {
                out.push_str("No fixable patterns found.\n");
            } else {
                let header = format!("Applied {} fix(es):", outcome.applied_fixes.len());
                push_line(&mut out, &header, opts, |s| s.bold().to_string());
                for fix in &outcome.applied_fixes {
                    out.push_str(&format!("  - {}\n", fix));
                }
                out.push('\n');
            }
            out.push_str(&outcome.fixed_query);
            out.push('\n');
            out
        }
    }
}

/// Format a draft pipeline outcome based on output options
pub fn format_draft_outcome(outcome: &DraftOutcome, opts: &OutputOptions) -> String {
    match opts.format {
        OutputFormat::Json => serde_json::to_string_pretty(outcome).unwrap_or_default(),
        OutputFormat::Yaml => serde_yaml::to_string(outcome).unwrap_or_default(),
        OutputFormat::Text => {
            let mut out = String::new();
            let status = if outcome.is_clean() {
                format!("Draft clean after {} repair round(s)", outcome.rounds)
            } else {
                format!(
                    "Draft still carries {} unresolved issue(s) after {} repair round(s)",
                    outcome.unresolved.len(),
                    outcome.rounds
                )
            };
            push_line(&mut out, &status, opts, |s| {
                if outcome.is_clean() {
                    s.green().bold().to_string()
                } else {
                    s.red().bold().to_string()
                }
            });

            if !outcome.fixes_applied.is_empty() {
                out.push_str("Fixes applied:\n");
                for fix in &outcome.fixes_applied {
                    out.push_str(&format!("  - {}\n", fix));
                }
            }
            for issue in &outcome.unresolved {
                out.push_str(&format!(
                    "  [{}] {}\n",
                    severity_label(issue.severity, opts),
                    issue.summary()
                ));
            }
            out.push('\n');
            out.push_str(&outcome.query);
            out.push('\n');
            out
        }
    }
}

/// Format an execution session based on output options
pub fn format_session(session: &RetrySession, opts: &OutputOptions) -> String {
    match opts.format {
        OutputFormat::Json => serde_json::to_string_pretty(session).unwrap_or_default(),
        OutputFormat::Yaml => serde_yaml::to_string(session).unwrap_or_default(),
        OutputFormat::Text => format_session_text(session, opts)
    }
}

/// Format a cached template based on output options
pub fn format_template(template: &QueryTemplate, opts: &OutputOptions) -> String {
    match opts.format {
        OutputFormat::Json => serde_json::to_string_pretty(template).unwrap_or_default(),
        OutputFormat::Yaml => serde_yaml::to_string(template).unwrap_or_default(),
        OutputFormat::Text => {
            let mut out = String::new();
            push_line(&mut out, "=== Query Template ===", opts, |s| s.bold().to_string());
            out.push_str(&format!("Id:         {}\n", template.id));
            out.push_str(&format!("Trigger:    {}\n", template.trigger));
            let params: Vec<&str> = template.parameters.iter().map(|s| s.as_str()).collect();
            out.push_str(&format!("Parameters: {}\n", params.join(", ")));
            let tables: Vec<&str> = template.tables.iter().map(|s| s.as_str()).collect();
            out.push_str(&format!("Tables:     {}\n", tables.join(", ")));
            for join in &template.joins {
                out.push_str(&format!("Join:       {}\n", join));
            }
            out.push('\n');
            out.push_str(&template.base_query);
            out.push('\n');
            out
        }
    }
}

fn format_lint_text(report: &LintReport, opts: &OutputOptions) -> String {
    let mut out = String::new();

    if report.issues.is_empty() {
        let line = format!("No issues found ({} rules checked)", report.rules_count);
        push_line(&mut out, &line, opts, |s| s.green().to_string());
        return out;
    }

    let header = format!(
        "Found {} issue(s) ({} critical, {} medium):",
        report.issues.len(),
        report.critical_count(),
        report.medium_count()
    );
    push_line(&mut out, &header, opts, |s| s.bold().to_string());
    out.push('\n');

    for issue in &report.issues {
        out.push_str(&format!(
            "[{}] {} {}\n",
            severity_label(issue.severity, opts),
            issue.rule_id,
            issue.rule_name
        ));
        out.push_str(&format!("  {}\n", issue.message));
        if let Some(location) = &issue.location {
            out.push_str(&format!("  at: {}\n", location));
        }
        if let Some(suggestion) = &issue.suggestion {
            out.push_str(&format!("  suggestion: {}\n", suggestion));
        }
        out.push('\n');
    }
    out
}

fn format_session_text(session: &RetrySession, opts: &OutputOptions) -> String {
    let mut out = String::new();
    push_line(&mut out, "=== Execution Session ===", opts, |s| s.bold().to_string());

    for attempt in &session.attempts {
        let verdict = if attempt.succeeded {
            if opts.colored {
                "SUCCEEDED".green().to_string()
            } else {
                String::from("SUCCEEDED")
            }
        } else if opts.colored {
            "FAILED".red().to_string()
        } else {
            String::from("FAILED")
        };
        out.push_str(&format!(
            "Attempt {}/{}: {}\n",
            attempt.attempt_number, session.max_attempts, verdict
        ));
        if let Some(error) = &attempt.error {
            out.push_str(&format!("  error: {}\n", error));
        }
        for issue in &attempt.issues_found {
            out.push_str(&format!("  lint: {}\n", issue));
        }
        if opts.verbose {
            out.push_str(&format!("  query: {}\n", attempt.query_text));
        }
    }

    out.push('\n');
    match &session.final_status {
        FinalStatus::Succeeded {
            query_text,
            rows
        } => {
            let line = format!("Final: SUCCEEDED ({} row(s))", rows.len());
            push_line(&mut out, &line, opts, |s| s.green().bold().to_string());
            out.push_str(query_text);
            out.push('\n');
        }
        FinalStatus::FailedTerminal {
            last_error
        } => {
            push_line(&mut out, "Final: FAILED_TERMINAL", opts, |s| s.red().bold().to_string());
            out.push_str(&format!("  {}\n", last_error));
        }
    }
    out
}

fn severity_label(severity: Severity, opts: &OutputOptions) -> String {
    if !opts.colored {
        return severity.to_string();
    }
    match severity {
        Severity::Critical => severity.to_string().red().bold().to_string(),
        Severity::Medium => severity.to_string().yellow().to_string()
    }
}

fn push_line(out: &mut String, line: &str, opts: &OutputOptions, paint: impl Fn(&str) -> String) {
    if opts.colored {
        out.push_str(&paint(line));
    } else {
        out.push_str(line);
    }
    out.push('\n');
}
