use clap::Parser;
use sql_query_sentinel::cli::{Cli, Commands, Format, Provider, Trigger};

#[test]
fn test_provider_default_model_openai() {
    assert_eq!(Provider::OpenAI.default_model(), "gpt-4");
}

#[test]
fn test_provider_default_model_anthropic() {
    assert_eq!(Provider::Anthropic.default_model(), "claude-sonnet-4-20250514");
}

#[test]
fn test_provider_default_model_ollama() {
    assert_eq!(Provider::Ollama.default_model(), "llama3.2");
}

#[test]
fn test_format_variants() {
    let _text = Format::Text;
    let _json = Format::Json;
    let _yaml = Format::Yaml;
}

#[test]
fn test_trigger_variants() {
    let _month_year = Trigger::MonthYear;
    let _year = Trigger::Year;
    let _date_range = Trigger::DateRange;
}

#[test]
fn test_parse_lint_command() {
    let cli = Cli::try_parse_from(["sql-sentinel", "lint", "-q", "query.sql"]).unwrap();
    match cli.command {
        Commands::Lint {
            query,
            schema,
            ..
        } => {
            assert_eq!(query.to_str(), Some("query.sql"));
            assert!(schema.is_none());
        }
        _ => panic!("expected lint command")
    }
}

#[test]
fn test_parse_lint_with_schema_and_format() {
    let cli = Cli::try_parse_from([
        "sql-sentinel", "lint", "-q", "query.sql", "-s", "schema.sql", "-f", "json",
    ])
    .unwrap();
    match cli.command {
        Commands::Lint {
            schema,
            output,
            ..
        } => {
            assert_eq!(schema.unwrap().to_str(), Some("schema.sql"));
            assert!(matches!(output.output_format, Format::Json));
        }
        _ => panic!("expected lint command")
    }
}

#[test]
fn test_parse_fix_command() {
    let cli = Cli::try_parse_from(["sql-sentinel", "fix", "-q", "-"]).unwrap();
    match cli.command {
        Commands::Fix {
            query, ..
        } => assert_eq!(query.to_str(), Some("-")),
        _ => panic!("expected fix command")
    }
}

#[test]
fn test_parse_build_defaults_to_ollama() {
    let cli = Cli::try_parse_from(["sql-sentinel", "build", "-r", "request.txt"]).unwrap();
    match cli.command {
        Commands::Build {
            generation, ..
        } => {
            assert!(matches!(generation.provider, Provider::Ollama));
            assert_eq!(generation.ollama_url, "http://localhost:11434");
        }
        _ => panic!("expected build command")
    }
}

#[test]
fn test_parse_run_with_database_url() {
    let cli = Cli::try_parse_from([
        "sql-sentinel", "run", "-q", "query.sql", "-d", "http://localhost:8080",
    ])
    .unwrap();
    match cli.command {
        Commands::Run {
            database_url, ..
        } => assert_eq!(database_url.as_deref(), Some("http://localhost:8080")),
        _ => panic!("expected run command")
    }
}

#[test]
fn test_parse_approve_command() {
    let cli = Cli::try_parse_from([
        "sql-sentinel", "approve", "-q", "query.sql", "-a", "reports-7", "-t", "month_year",
    ])
    .unwrap();
    match cli.command {
        Commands::Approve {
            agent,
            trigger,
            ..
        } => {
            assert_eq!(agent, "reports-7");
            assert!(matches!(trigger, Trigger::MonthYear));
        }
        _ => panic!("expected approve command")
    }
}

#[test]
fn test_parse_forget_command() {
    let cli = Cli::try_parse_from(["sql-sentinel", "forget", "-a", "reports-7"]).unwrap();
    match cli.command {
        Commands::Forget {
            agent
        } => assert_eq!(agent, "reports-7"),
        _ => panic!("expected forget command")
    }
}

#[test]
fn test_approve_rejects_unknown_trigger() {
    let result = Cli::try_parse_from([
        "sql-sentinel", "approve", "-q", "query.sql", "-a", "reports-7", "-t", "weekly",
    ]);
    assert!(result.is_err());
}

#[test]
fn test_lint_requires_query() {
    assert!(Cli::try_parse_from(["sql-sentinel", "lint"]).is_err());
}
