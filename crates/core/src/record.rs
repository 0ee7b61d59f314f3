//! The in-flight unit of monitoring data.
//!
//! A [`Record`] is produced by a collector, optionally enriched by the
//! Livestatus cache, and consumed by the sender-workers of every target its
//! [`TargetFilter`] admits. Records carry their timestamp as decimal text
//! (milliseconds since epoch) because that is how every downstream wants it
//! serialized; [`Record::timestamp_millis`] parses it back when a numeric
//! view is needed.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::RecordError;

/// The kind of downstream target a queue delivers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetKind {
    /// Line-protocol time-series database.
    Influx,
    /// Document-index search engine.
    Elastic,
}

impl std::fmt::Display for TargetKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TargetKind::Influx => write!(f, "influx"),
            TargetKind::Elastic => write!(f, "elastic"),
        }
    }
}

/// Which targets may accept a record.
///
/// `None` is the empty sentinel: a record carrying it reaches no target.
/// Collectors that leave the filter unspecified default it to `All`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetFilter {
    #[default]
    All,
    Influx,
    Elastic,
    None,
}

impl TargetFilter {
    /// Parse a filter name as written in collector input.
    ///
    /// The empty string maps to `None`; callers that want the unspecified
    /// case to mean "everything" chain [`TargetFilter::or_all`]. Unknown
    /// names also map to `None` so a typo never widens delivery.
    pub fn parse(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "all" => TargetFilter::All,
            "influx" | "influxdb" => TargetFilter::Influx,
            "elastic" | "elasticsearch" => TargetFilter::Elastic,
            _ => TargetFilter::None,
        }
    }

    /// Replace the empty sentinel with `All`.
    pub fn or_all(self) -> Self {
        match self {
            TargetFilter::None => TargetFilter::All,
            other => other,
        }
    }

    /// Whether a record carrying this filter may enter a queue of `kind`.
    pub fn admits(&self, kind: TargetKind) -> bool {
        match self {
            TargetFilter::All => true,
            TargetFilter::Influx => kind == TargetKind::Influx,
            TargetFilter::Elastic => kind == TargetKind::Elastic,
            TargetFilter::None => false,
        }
    }
}

/// The unit of in-flight data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    /// Logical measurement / index bucket. Never empty on a valid record.
    pub table: String,
    /// Milliseconds since epoch, as decimal text.
    pub timestamp: String,
    /// Which targets may accept this record.
    #[serde(default)]
    pub filter: TargetFilter,
    /// Indexed dimensions.
    #[serde(default)]
    pub tags: BTreeMap<String, String>,
    /// Numeric / string values.
    #[serde(default)]
    pub fields: BTreeMap<String, String>,
}

impl Record {
    pub fn new(table: impl Into<String>, timestamp: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            timestamp: timestamp.into(),
            filter: TargetFilter::All,
            tags: BTreeMap::new(),
            fields: BTreeMap::new(),
        }
    }

    pub fn with_filter(mut self, filter: TargetFilter) -> Self {
        self.filter = filter;
        self
    }

    pub fn tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.insert(key.into(), value.into());
        self
    }

    pub fn field(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }

    /// The timestamp as milliseconds since epoch.
    pub fn timestamp_millis(&self) -> Option<u64> {
        self.timestamp.parse::<u64>().ok()
    }

    /// Check the record invariants: non-empty table, numeric timestamp,
    /// no empty tag or field keys.
    pub fn validate(&self) -> Result<(), RecordError> {
        if self.table.is_empty() {
            return Err(RecordError::EmptyTable);
        }
        if self.timestamp_millis().is_none() {
            return Err(RecordError::invalid_timestamp(&self.timestamp));
        }
        if self.tags.keys().any(|k| k.is_empty()) {
            return Err(RecordError::EmptyKey { section: "tags" });
        }
        if self.fields.keys().any(|k| k.is_empty()) {
            return Err(RecordError::EmptyKey { section: "fields" });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filter_parse_known_names() {
        assert_eq!(TargetFilter::parse("all"), TargetFilter::All);
        assert_eq!(TargetFilter::parse("Influx"), TargetFilter::Influx);
        assert_eq!(TargetFilter::parse("elasticsearch"), TargetFilter::Elastic);
        assert_eq!(TargetFilter::parse(""), TargetFilter::None);
        assert_eq!(TargetFilter::parse("bogus"), TargetFilter::None);
    }

    #[test]
    fn empty_filter_defaults_to_all() {
        assert_eq!(TargetFilter::parse("").or_all(), TargetFilter::All);
        assert_eq!(
            TargetFilter::parse("influx").or_all(),
            TargetFilter::Influx
        );
    }

    #[test]
    fn filter_admission() {
        assert!(TargetFilter::All.admits(TargetKind::Influx));
        assert!(TargetFilter::All.admits(TargetKind::Elastic));
        assert!(TargetFilter::Influx.admits(TargetKind::Influx));
        assert!(!TargetFilter::Influx.admits(TargetKind::Elastic));
        assert!(!TargetFilter::Elastic.admits(TargetKind::Influx));
        assert!(!TargetFilter::None.admits(TargetKind::Influx));
        assert!(!TargetFilter::None.admits(TargetKind::Elastic));
    }

    #[test]
    fn validate_accepts_well_formed_record() {
        let record = Record::new("cpu", "1700000000000")
            .tag("host", "srvA")
            .field("value", "0.42");
        assert!(record.validate().is_ok());
        assert_eq!(record.timestamp_millis(), Some(1_700_000_000_000));
    }

    #[test]
    fn validate_rejects_empty_table() {
        let record = Record::new("", "1700000000000");
        assert!(matches!(record.validate(), Err(RecordError::EmptyTable)));
    }

    #[test]
    fn validate_rejects_non_numeric_timestamp() {
        let record = Record::new("cpu", "yesterday");
        assert!(matches!(
            record.validate(),
            Err(RecordError::InvalidTimestamp { .. })
        ));
        let negative = Record::new("cpu", "-5");
        assert!(negative.validate().is_err());
    }

    #[test]
    fn validate_rejects_empty_keys() {
        let record = Record::new("cpu", "0").tag("", "x");
        assert!(matches!(
            record.validate(),
            Err(RecordError::EmptyKey { section: "tags" })
        ));
        let record = Record::new("cpu", "0").field("", "x");
        assert!(matches!(
            record.validate(),
            Err(RecordError::EmptyKey { section: "fields" })
        ));
    }
}
