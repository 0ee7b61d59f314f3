//! # nagflux-target
//!
//! The output side of the pipeline: per-target sender-worker pools with
//! batching, retry, quarantine and on-disk spill, the HTTP connectors for
//! the line-protocol and document-index backends, and the pure per-target
//! record serializers.

pub mod connector;
pub mod document;
pub mod dump;
pub mod error;
pub mod format;
pub mod line;
pub mod version;
pub mod worker;

pub use connector::{ElasticConnector, InfluxConnector, TargetConnector};
pub use document::format_bulk;
pub use error::SendError;
pub use format::{ElasticFormatter, InfluxFormatter, RecordFormatter};
pub use line::{Sanitize, format_line};
pub use worker::{SenderConfig, SenderPool};
