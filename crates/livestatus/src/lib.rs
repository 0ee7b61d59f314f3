//! # nagflux-livestatus
//!
//! Connector to a Livestatus socket (TCP or local stream, CSV reply
//! protocol) and the refresh-on-interval cache that supplies host/service
//! downtime and custom-variable metadata to the parser-workers.

pub mod cache;
pub mod connector;
pub mod error;

pub use cache::{
    CacheBuilder, CacheEntry, CacheReader, DEFAULT_REFRESH_INTERVAL, DowntimeInterval, Snapshot,
};
pub use connector::{ConnectionType, Connector, FIELD_SEPARATOR, collect_rows};
pub use error::LivestatusError;
