use sql_query_sentinel::template::{
    FileTemplateStore, TemplateStore, TriggerType, approve_and_cache, templatize
};
use tempfile::TempDir;

const MONTH_QUERY: &str =
    "SELECT SUM(NULLIF(i.amount->>'value','')::numeric) \
     FROM fact_invoice i JOIN documents d ON d.id = i.document_id \
     WHERE i.invoice_date->>'value' LIKE '02/%/2025'";

#[test]
fn test_month_year_trigger() {
    let template = templatize(MONTH_QUERY, TriggerType::MonthYear);
    assert!(template.base_query.contains("LIKE '{month}/%/{year}'"));
    assert!(!template.base_query.contains("02/%/2025"));

    let params: Vec<&str> = template.parameters.iter().map(|s| s.as_str()).collect();
    assert_eq!(params, vec!["month", "year"]);
}

#[test]
fn test_month_year_with_concrete_day() {
    let template = templatize(
        "SELECT * FROM t WHERE d->>'value' = '03/15/2025'",
        TriggerType::MonthYear
    );
    // The day component rides along untouched between the placeholders.
    assert!(template.base_query.contains("'{month}/15/{year}'"));
}

#[test]
fn test_year_trigger_replaces_every_year_token() {
    let template = templatize(
        "SELECT * FROM fact_invoice WHERE fiscal_year = 2025 OR fiscal_year = 2024",
        TriggerType::Year
    );
    assert!(!template.base_query.contains("2025"));
    assert!(!template.base_query.contains("2024"));
    assert_eq!(template.parameters.len(), 1);
    assert!(template.parameters.contains("year"));
}

// Documented limitation of the lexical transform: a 4-digit constant that
// is not a year is rewritten too.
#[test]
fn test_year_trigger_catches_incidental_tokens() {
    let template = templatize(
        "SELECT * FROM t WHERE yr = 2025 HAVING COUNT(*) > 1999",
        TriggerType::Year
    );
    assert!(template.base_query.contains("COUNT(*) > {year}"));
}

#[test]
fn test_date_range_trigger_is_positional() {
    let template = templatize(
        "SELECT * FROM t WHERE d BETWEEN '01/01/2025' AND '03/31/2025'",
        TriggerType::DateRange
    );
    assert!(
        template
            .base_query
            .contains("BETWEEN '{start_date}' AND '{end_date}'")
    );
    let params: Vec<&str> = template.parameters.iter().map(|s| s.as_str()).collect();
    assert_eq!(params, vec!["end_date", "start_date"]);
}

#[test]
fn test_date_range_third_literal_untouched() {
    let template = templatize(
        "SELECT * FROM t WHERE d BETWEEN '01/01/2025' AND '03/31/2025' OR d = '07/04/2025'",
        TriggerType::DateRange
    );
    assert!(template.base_query.contains("'07/04/2025'"));
}

#[test]
fn test_parameters_equal_placeholders_present() {
    // No matching literal means no placeholders and no parameters.
    let query = "SELECT id FROM documents";
    let template = templatize(query, TriggerType::MonthYear);
    assert_eq!(template.base_query, query);
    assert!(template.parameters.is_empty());
}

#[test]
fn test_tables_and_joins_extracted() {
    let template = templatize(MONTH_QUERY, TriggerType::MonthYear);
    assert_eq!(template.tables, vec!["fact_invoice", "documents"]);
    assert_eq!(template.joins.len(), 1);
    assert!(template.joins[0].starts_with("JOIN documents"));
    assert!(!template.joins[0].contains("WHERE"));
}

#[test]
fn test_approve_and_cache_persists_per_agent() {
    let dir = TempDir::new().unwrap();
    let store = FileTemplateStore::new(dir.path());

    let template =
        approve_and_cache(MONTH_QUERY, TriggerType::MonthYear, "reports-7", &store).unwrap();

    let loaded = store.get("reports-7").unwrap().expect("template should persist");
    assert_eq!(loaded.id, template.id);
    assert_eq!(loaded.base_query, template.base_query);
    assert_eq!(loaded.parameters, template.parameters);
    assert_eq!(loaded.tables, template.tables);
}

#[test]
fn test_reapproval_overwrites() {
    let dir = TempDir::new().unwrap();
    let store = FileTemplateStore::new(dir.path());

    let first =
        approve_and_cache(MONTH_QUERY, TriggerType::MonthYear, "reports-7", &store).unwrap();
    let second = approve_and_cache(
        "SELECT * FROM fact_invoice WHERE y = 2025",
        TriggerType::Year,
        "reports-7",
        &store
    )
    .unwrap();

    let loaded = store.get("reports-7").unwrap().unwrap();
    assert_eq!(loaded.id, second.id);
    assert_ne!(loaded.id, first.id);
    assert!(loaded.parameters.contains("year"));
    assert!(!loaded.parameters.contains("month"));
}

#[test]
fn test_remove_deletes_template() {
    let dir = TempDir::new().unwrap();
    let store = FileTemplateStore::new(dir.path());

    approve_and_cache(MONTH_QUERY, TriggerType::MonthYear, "reports-7", &store).unwrap();
    store.remove("reports-7").unwrap();
    assert!(store.get("reports-7").unwrap().is_none());
}

#[test]
fn test_remove_missing_template_is_not_an_error() {
    let dir = TempDir::new().unwrap();
    let store = FileTemplateStore::new(dir.path());
    assert!(store.remove("never-existed").is_ok());
}

#[test]
fn test_get_missing_template_is_none() {
    let dir = TempDir::new().unwrap();
    let store = FileTemplateStore::new(dir.path());
    assert!(store.get("reports-7").unwrap().is_none());
}

#[test]
fn test_agents_do_not_share_templates() {
    let dir = TempDir::new().unwrap();
    let store = FileTemplateStore::new(dir.path());

    approve_and_cache(MONTH_QUERY, TriggerType::MonthYear, "agent-a", &store).unwrap();
    approve_and_cache(
        "SELECT * FROM fact_invoice WHERE y = 2025",
        TriggerType::Year,
        "agent-b",
        &store
    )
    .unwrap();

    let a = store.get("agent-a").unwrap().unwrap();
    let b = store.get("agent-b").unwrap().unwrap();
    assert!(a.parameters.contains("month"));
    assert!(b.parameters.contains("year"));
}
