//! Line-protocol serialization for the time-series target.
//!
//! A pure function of the record and the target's schema version. Keys and
//! values are sanitized: a configured "nasty" substring is replaced, then
//! spaces and commas are backslash-escaped. Single-quoted input is
//! unwrapped; double-quoted input is an intentional string literal and
//! passes through untouched.

use nagflux_core::Record;
use tracing::error;

use crate::version::version_at_least;

/// Oldest line-protocol dialect this formatter can emit.
const MIN_LINE_VERSION: &str = "0.9";

/// Input-scrubbing rules applied before escaping.
#[derive(Debug, Clone, Default)]
pub struct Sanitize {
    pub nasty_string: String,
    pub nasty_string_to_replace: String,
}

impl Sanitize {
    pub fn new(nasty_string: impl Into<String>, nasty_string_to_replace: impl Into<String>) -> Self {
        Self {
            nasty_string: nasty_string.into(),
            nasty_string_to_replace: nasty_string_to_replace.into(),
        }
    }

    pub fn apply(&self, input: &str) -> String {
        // Double-quoted input is already a string literal.
        if input.len() >= 2 && input.starts_with('"') && input.ends_with('"') {
            return input.to_string();
        }
        let input = input
            .strip_prefix('\'')
            .and_then(|s| s.strip_suffix('\''))
            .unwrap_or(input);
        let replaced = if self.nasty_string.is_empty() {
            input.to_string()
        } else {
            input.replace(&self.nasty_string, &self.nasty_string_to_replace)
        };
        let mut escaped = String::with_capacity(replaced.len());
        for c in replaced.chars() {
            if c == ' ' || c == ',' {
                escaped.push('\\');
            }
            escaped.push(c);
        }
        escaped
    }
}

/// Serialize one record as a line-protocol line, newline-terminated.
///
/// Records without fields cannot be expressed and yield nothing, as does
/// an unsupported schema version.
pub fn format_line(record: &Record, version: &str, sanitize: &Sanitize) -> Option<String> {
    if !version_at_least(version, MIN_LINE_VERSION) {
        error!(version, "unsupported line-protocol schema version");
        return None;
    }
    if record.fields.is_empty() {
        return None;
    }

    let mut line = sanitize.apply(&record.table);
    for (key, value) in &record.tags {
        line.push(',');
        line.push_str(&sanitize.apply(key));
        line.push('=');
        line.push_str(&sanitize.apply(value));
    }
    line.push(' ');
    let mut first = true;
    for (key, value) in &record.fields {
        if !first {
            line.push(',');
        }
        first = false;
        line.push_str(&sanitize.apply(key));
        line.push('=');
        line.push_str(&sanitize.apply(value));
    }
    line.push(' ');
    line.push_str(&record.timestamp);
    line.push('\n');
    Some(line)
}
