//! # nagflux-core
//!
//! Shared building blocks of the nagflux ingestion pipeline: the [`Record`]
//! data model, the per-target result queues with their filtered fan-out,
//! the process-wide pause controller, and the metrics collector.

pub mod error;
pub mod metrics;
pub mod pause;
pub mod queues;
pub mod record;

pub use error::RecordError;
pub use metrics::{MetricsCollector, PrometheusExporter};
pub use pause::PauseState;
pub use queues::{ENQUEUE_TIMEOUT, ResultQueues, TargetReceiver};
pub use record::{Record, TargetFilter, TargetKind};
