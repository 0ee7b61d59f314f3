//! # nagflux
//!
//! Long-running ingestion bridge from Nagios monitoring data (spool files,
//! a user CSV drop directory, Livestatus metadata) into time-series and
//! document-index backends.

pub mod config;
pub mod metrics_server;
pub mod pipeline;

pub use config::Config;
pub use metrics_server::MetricsServer;
pub use pipeline::Pipeline;
