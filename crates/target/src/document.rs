//! Bulk index-action serialization for the document-index target.
//!
//! Each record becomes one action line plus one document line. The index
//! name carries a `YYYY.MM` suffix derived from the record timestamp so
//! old data can be dropped by index.

use chrono::{DateTime, Utc};
use nagflux_core::Record;
use serde_json::{Map, Value, json};
use tracing::error;

use crate::version::version_at_least;

/// Oldest document-index schema this formatter can emit.
const MIN_DOCUMENT_VERSION: &str = "2.0";

/// Serialize one record as an index action plus document, each
/// newline-terminated. Unsupported schema versions and unparsable
/// timestamps yield nothing.
pub fn format_bulk(record: &Record, version: &str, index: &str) -> Option<String> {
    if !version_at_least(version, MIN_DOCUMENT_VERSION) {
        error!(version, "unsupported document-index schema version");
        return None;
    }
    let millis = record.timestamp_millis()?;
    let timestamp = DateTime::<Utc>::from_timestamp_millis(millis as i64)?;

    let action = json!({
        "index": {
            "_index": format!("{index}-{}", timestamp.format("%Y.%m")),
        }
    });

    let mut document = Map::new();
    document.insert("timestamp".to_string(), Value::from(millis));
    document.insert("table".to_string(), Value::from(record.table.as_str()));
    for (key, value) in &record.tags {
        document.insert(key.clone(), Value::from(value.as_str()));
    }
    for (key, value) in &record.fields {
        let parsed = value
            .parse::<f64>()
            .ok()
            .and_then(serde_json::Number::from_f64)
            .map(Value::Number)
            .unwrap_or_else(|| Value::from(value.as_str()));
        document.insert(key.clone(), parsed);
    }

    Some(format!("{action}\n{}\n", Value::Object(document)))
}
