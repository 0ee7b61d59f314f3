//! # nagflux-collector
//!
//! The input side of the pipeline: the Nagios spool-file scanner and its
//! parser-worker pool, and the external CSV (textfile) collector. Both
//! tick over a directory, respect the process-wide pause flag, and fan
//! parsed records out through the per-target result queues.

pub mod error;
pub mod files;
pub mod spool;
pub mod textfile;

pub use error::CollectError;
pub use files::{DIRECTORY_SCAN_INTERVAL, MIN_FILE_AGE};
pub use spool::{SpoolCollector, SpoolCollectorConfig, perfdata::PerfdataParser};
pub use textfile::{TextfileCollector, TextfileCollectorConfig};
