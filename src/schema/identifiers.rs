use crate::ValidationError;

/// Columns every data table carries for bookkeeping
pub const RESERVED_COLUMNS: &[&str] = &["_id", "_crawled_at"];

/// Bookkeeping tables a crawl must never write records into
pub const RESERVED_TABLES: &[&str] = &["crawl_jobs", "crawl_logs", "notifications"];

const MAX_TABLE_NAME_LEN: usize = 63;

/// Maps a JSON field name onto a safe column name
///
/// Characters outside `[A-Za-z0-9_]` become `_`, a leading digit gets a `_`
/// prefix, and names colliding with the bookkeeping columns are suffixed.
pub fn sanitize_column_name(name: &str) -> String {
    let mut sanitized: String = name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .collect();

    if sanitized.is_empty() || sanitized.starts_with(|c: char| c.is_ascii_digit()) {
        sanitized.insert(0, '_');
    }

    while RESERVED_COLUMNS
        .iter()
        .any(|reserved| reserved.eq_ignore_ascii_case(&sanitized))
    {
        sanitized.push('_');
    }

    sanitized
}

/// Checks a user-supplied table name against the identifier allow-list
pub fn validate_table_name(name: &str) -> Result<(), ValidationError> {
    let invalid = || ValidationError::TableName(name.to_string());

    let mut chars = name.chars();
    let first = chars.next().ok_or_else(invalid)?;
    if !(first.is_ascii_alphabetic() || first == '_') {
        return Err(invalid());
    }
    if !chars.all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(invalid());
    }
    if name.len() > MAX_TABLE_NAME_LEN {
        return Err(invalid());
    }

    let lower = name.to_ascii_lowercase();
    if lower.starts_with("sqlite_") || RESERVED_TABLES.contains(&lower.as_str()) {
        return Err(invalid());
    }

    Ok(())
}

/// Double-quotes an identifier for interpolation into SQL
pub fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}
