//! SQL identifier validation and quoting.
//!
//! Every table or column name that ends up in dynamically constructed SQL
//! must pass through here first. The identifier regex is the source of truth
//! for what we accept; everything else fails with `InvalidIdentifier`.

use crate::errors::{CoreError, CoreResult};
use regex::Regex;
use std::sync::LazyLock;

static IDENTIFIER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").unwrap());

/// Columns arriving from peers are held to a stricter rule: no leading
/// underscore exemption, just alphanumerics and underscores.
static COLUMN_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_]+$").unwrap());

/// Validate a table or column name for use in dynamically built SQL.
pub fn validate_identifier(name: &str) -> CoreResult<()> {
    if IDENTIFIER_RE.is_match(name) {
        Ok(())
    } else {
        Err(CoreError::InvalidIdentifier(name.to_string()))
    }
}

/// Validate a column name received over the peer wire.
pub fn validate_column(name: &str) -> CoreResult<()> {
    if COLUMN_RE.is_match(name) {
        Ok(())
    } else {
        Err(CoreError::InvalidIdentifier(name.to_string()))
    }
}

/// Quote an identifier for direct inclusion in SQL: double-quote it and
/// double any embedded double quotes. Validates first, so the escaping is
/// belt-and-braces on top of the regex.
pub fn quote_identifier(name: &str) -> CoreResult<String> {
    validate_identifier(name)?;
    Ok(format!("\"{}\"", name.replace('"', "\"\"")))
}
