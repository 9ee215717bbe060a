//! INI-style unit file lexer
//!
//! Parses a single unit file into an ordered list of (section, key, value)
//! directives. Ordering and repetition are preserved because systemd gives
//! repeated keys additive semantics, and an empty `Key=` resets the list
//! accumulated so far; the drop-in merger honours both.

use std::path::Path;

/// One `Key=Value` occurrence inside a `[Section]`.
///
/// An empty `value` is meaningful: it is the "reset" marker that clears
/// every previously accumulated value for the key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Directive {
    pub section: String,
    pub key: String,
    pub value: String,
}

#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error("directive '{0}' appears before any section header")]
    DirectiveOutsideSection(String),

    #[error("malformed section header: {0}")]
    BadSectionHeader(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Parse unit file content into an ordered directive list.
pub fn parse_file(content: &str) -> Result<Vec<Directive>, ParseError> {
    let mut directives = Vec::new();
    let mut section: Option<String> = None;

    let mut lines = content.lines();
    while let Some(line) = lines.next() {
        // Join continuation lines: strip the trailing backslash and the
        // leading whitespace of the next line.
        let mut logical = line.to_string();
        while logical.ends_with('\\') {
            logical.pop();
            match lines.next() {
                Some(next) => logical.push_str(next.trim_start()),
                None => break,
            }
        }

        let trimmed = logical.trim_start();
        if trimmed.is_empty() || trimmed.starts_with('#') || trimmed.starts_with(';') {
            continue;
        }

        if trimmed.starts_with('[') {
            let name = trimmed
                .trim_end()
                .strip_prefix('[')
                .and_then(|s| s.strip_suffix(']'))
                .ok_or_else(|| ParseError::BadSectionHeader(trimmed.to_string()))?;
            section = Some(name.to_string());
            continue;
        }

        // The leftmost '=' splits key from value. Lines without one are
        // tolerated and skipped, matching systemd's lenient loader.
        let Some(pos) = trimmed.find('=') else {
            log::debug!("skipping line without '=': {}", trimmed);
            continue;
        };

        let (key, value) = trimmed.split_at(pos);
        let key = key.trim().to_string();
        // Leading whitespace of the value is trimmed; trailing whitespace is
        // preserved for quoted command lines.
        let value = value[1..].trim_start().to_string();

        let Some(section) = section.clone() else {
            return Err(ParseError::DirectiveOutsideSection(key));
        };

        directives.push(Directive {
            section,
            key,
            value,
        });
    }

    Ok(directives)
}

/// Parse a unit file from disk.
pub async fn parse_unit_file(path: &Path) -> Result<Vec<Directive>, ParseError> {
    let content = tokio::fs::read_to_string(path).await?;
    parse_file(&content)
}

/// Convert "yes/true/1/on" to bool
pub fn string_to_bool(s: &str) -> bool {
    matches!(s.to_lowercase().as_str(), "yes" | "true" | "1" | "on")
}
