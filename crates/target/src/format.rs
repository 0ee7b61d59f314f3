//! Per-target record serialization.
//!
//! Each sender pool owns one formatter; the underlying serializers are
//! pure functions of the record and the target's schema parameters.

use nagflux_core::Record;

use crate::document::format_bulk;
use crate::line::{Sanitize, format_line};

/// Serializes records for one target. Output is newline-terminated;
/// `None` means the record cannot be expressed for this target and is
/// dropped.
pub trait RecordFormatter: Send + Sync {
    fn format(&self, record: &Record) -> Option<String>;
}

/// Line-protocol formatter.
#[derive(Debug, Clone)]
pub struct InfluxFormatter {
    version: String,
    sanitize: Sanitize,
}

impl InfluxFormatter {
    pub fn new(version: impl Into<String>, sanitize: Sanitize) -> Self {
        Self {
            version: version.into(),
            sanitize,
        }
    }
}

impl RecordFormatter for InfluxFormatter {
    fn format(&self, record: &Record) -> Option<String> {
        format_line(record, &self.version, &self.sanitize)
    }
}

/// Bulk document formatter.
#[derive(Debug, Clone)]
pub struct ElasticFormatter {
    version: String,
    index: String,
}

impl ElasticFormatter {
    pub fn new(version: impl Into<String>, index: impl Into<String>) -> Self {
        Self {
            version: version.into(),
            index: index.into(),
        }
    }
}

impl RecordFormatter for ElasticFormatter {
    fn format(&self, record: &Record) -> Option<String> {
        format_bulk(record, &self.version, &self.index)
    }
}
