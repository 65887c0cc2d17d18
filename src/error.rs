pub use masterror::{AppError, AppResult};

/// Render the concrete message carried by an error.
///
/// `AppError`'s `Display` prints only the generic status text; the
/// detail lives in the `message` field. Every user-facing surface goes
/// through here so attempt counts, paths, and database errors survive.
pub fn error_message(err: &AppError) -> String {
    match err.message.as_deref() {
        Some(message) => message.to_string(),
        None => err.to_string()
    }
}

/// Create file read error
pub fn file_read_error(path: &str, source: std::io::Error) -> AppError {
    AppError::internal(format!("Failed to read file '{}': {}", path, source))
}

/// Create DDL parse error with optional position info
pub fn ddl_parse_error(message: impl Into<String>) -> AppError {
    let msg = message.into();
    AppError::bad_request(format_sql_error("Schema DDL parse error", &msg))
}

/// Create schema lookup error for a table missing from the catalog
pub fn schema_lookup_error(table: &str, detail: impl Into<String>) -> AppError {
    AppError::bad_request(format!(
        "Schema lookup failed for table '{}': {}",
        table,
        detail.into()
    ))
}

/// Create generation service error
pub fn generation_error(message: impl Into<String>) -> AppError {
    AppError::service(message.into())
}

/// Create query gateway error for a non-success response
pub fn gateway_error(message: impl Into<String>) -> AppError {
    AppError::service(message.into())
}

/// Create HTTP error
pub fn http_error(err: reqwest::Error) -> AppError {
    let msg = if err.is_timeout() {
        format!("Request timeout: {}", err)
    } else if err.is_connect() {
        format!("Connection failed: {}", err)
    } else if err.is_status() {
        format!("HTTP error {}: {}", err.status().unwrap_or_default(), err)
    } else {
        err.to_string()
    };
    AppError::service(msg)
}

/// Create config error
pub fn config_error(message: impl Into<String>) -> AppError {
    AppError::bad_request(message.into())
}

/// Create template persistence error
pub fn template_error(message: impl Into<String>) -> AppError {
    AppError::internal(message.into())
}

/// Create the terminal error for an exhausted execution budget.
///
/// Always carries the last concrete database error so the caller never
/// sees a bare "gave up" without the reason.
pub fn budget_exhausted_error(attempts: u32, last_error: &str) -> AppError {
    AppError::internal(format!(
        "Execution budget exhausted after {} attempts; last error: {}",
        attempts, last_error
    ))
}

/// Format SQL error with position highlighting
fn format_sql_error(prefix: &str, message: &str) -> String {
    // sqlparser format: "... at Line: X, Column Y"
    if let Some(pos) = extract_position(message) {
        format!(
            "{} at line {}, column {}:\n  {}",
            prefix, pos.line, pos.column, message
        )
    } else {
        format!("{}:\n  {}", prefix, message)
    }
}

struct SqlPosition {
    line:   usize,
    column: usize
}

fn extract_position(message: &str) -> Option<SqlPosition> {
    let line_marker = "Line: ";
    let col_marker = ", Column ";

    if let Some(line_start) = message.find(line_marker) {
        let line_num_start = line_start + line_marker.len();
        if let Some(col_start) = message[line_num_start..].find(col_marker) {
            let line_str = &message[line_num_start..line_num_start + col_start];
            let col_num_start = line_num_start + col_start + col_marker.len();

            let col_end = message[col_num_start..]
                .find(|c: char| !c.is_ascii_digit())
                .unwrap_or(message.len() - col_num_start);

            let col_str = &message[col_num_start..col_num_start + col_end];

            if let (Ok(line), Ok(column)) = (line_str.parse(), col_str.parse()) {
                return Some(SqlPosition { line, column });
            }
        }
    }

    None
}
