//! Query cleaning.
//!
//! Queries are cleaned with the same allow-list the ingestion pipeline
//! applies to chunk text, so both sides share one alphabet.

use std::sync::LazyLock;

use regex::Regex;

/// Anything outside word characters, whitespace and `. , ! ? ; : - ( ) "`.
static DISALLOWED: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"[^\w\s.,!?;:\-()"]"#).expect("valid regex"));

static WHITESPACE_RUN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+").expect("valid regex"));

/// Apply the conservative allow-list and collapse whitespace.
///
/// The result has no leading or trailing whitespace and no runs of more than
/// one space. Cleaning is idempotent.
pub fn clean(text: &str) -> String {
    let kept = DISALLOWED.replace_all(text, "");
    WHITESPACE_RUN.replace_all(&kept, " ").trim().to_string()
}
