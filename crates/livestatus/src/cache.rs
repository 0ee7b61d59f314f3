//! Refresh-on-interval cache of host/service metadata.
//!
//! The builder periodically issues a small fixed set of queries (hosts and
//! services with downtimes, custom variables), assembles a fresh immutable
//! [`Snapshot`], and swaps it in atomically. Readers take one load and get
//! a consistent view; there is no locking on the read path. A failed
//! refresh leaves the previous snapshot in place.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::connector::{Connector, collect_rows};
use crate::error::LivestatusError;

/// Default refresh interval, comparable to the collectors' directory tick.
pub const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_secs(5);

/// One scheduled downtime, in epoch seconds. `end_secs == 0` means open.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DowntimeInterval {
    pub start_secs: u64,
    pub end_secs: u64,
}

impl DowntimeInterval {
    pub fn contains(&self, at_secs: u64) -> bool {
        at_secs >= self.start_secs && (self.end_secs == 0 || at_secs <= self.end_secs)
    }
}

/// Cached metadata of one host or service.
#[derive(Debug, Clone, Default)]
pub struct CacheEntry {
    pub downtimes: Vec<DowntimeInterval>,
    pub custom_vars: BTreeMap<String, String>,
}

/// Immutable, internally consistent view of the monitoring host's metadata.
///
/// Keyed by `(host, service)`; the host-level entry uses an empty service
/// name.
#[derive(Debug, Default)]
pub struct Snapshot {
    entries: HashMap<(String, String), CacheEntry>,
}

impl Snapshot {
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn lookup(&self, host: &str, service: &str) -> Option<&CacheEntry> {
        self.entries
            .get(&(host.to_string(), service.to_string()))
    }

    /// Whether `(host, service)` is inside a scheduled downtime at `at_secs`.
    ///
    /// A host-level downtime covers the host's services as well.
    pub fn in_downtime(&self, host: &str, service: &str, at_secs: u64) -> bool {
        let service_hit = self
            .lookup(host, service)
            .is_some_and(|e| e.downtimes.iter().any(|d| d.contains(at_secs)));
        if service_hit {
            return true;
        }
        !service.is_empty()
            && self
                .lookup(host, "")
                .is_some_and(|e| e.downtimes.iter().any(|d| d.contains(at_secs)))
    }

    pub fn custom_vars(&self, host: &str, service: &str) -> Option<&BTreeMap<String, String>> {
        self.lookup(host, service).map(|e| &e.custom_vars)
    }

    /// Record a scheduled downtime. Host-level downtimes use an empty
    /// service name.
    pub fn add_downtime(&mut self, host: &str, service: &str, interval: DowntimeInterval) {
        self.entry_mut(host, service).downtimes.push(interval);
    }

    /// Merge custom variables into an entry.
    pub fn add_custom_vars(
        &mut self,
        host: &str,
        service: &str,
        vars: impl IntoIterator<Item = (String, String)>,
    ) {
        self.entry_mut(host, service).custom_vars.extend(vars);
    }

    fn entry_mut(&mut self, host: &str, service: &str) -> &mut CacheEntry {
        self.entries
            .entry((host.to_string(), service.to_string()))
            .or_default()
    }
}

/// Cheap clone-able handle giving readers the current snapshot.
#[derive(Clone)]
pub struct CacheReader {
    current: Arc<ArcSwap<Snapshot>>,
}

impl CacheReader {
    /// A reader whose snapshot is permanently empty. Used when no
    /// livestatus endpoint is configured; every lookup misses and records
    /// flow through unenriched.
    pub fn empty() -> Self {
        Self {
            current: Arc::new(ArcSwap::from_pointee(Snapshot::default())),
        }
    }

    /// One consistent view; never blocks on the builder.
    pub fn current(&self) -> Arc<Snapshot> {
        self.current.load_full()
    }
}

/// Owns the refresh loop and the current snapshot.
pub struct CacheBuilder {
    current: Arc<ArcSwap<Snapshot>>,
    quit: CancellationToken,
    handle: JoinHandle<()>,
}

impl CacheBuilder {
    /// Start the refresh loop. The first refresh runs immediately.
    pub fn spawn(connector: Connector, refresh_interval: Duration) -> Self {
        let current = Arc::new(ArcSwap::from_pointee(Snapshot::default()));
        let quit = CancellationToken::new();
        let handle = tokio::spawn(run_refresh_loop(
            connector,
            refresh_interval,
            current.clone(),
            quit.clone(),
        ));
        Self {
            current,
            quit,
            handle,
        }
    }

    pub fn reader(&self) -> CacheReader {
        CacheReader {
            current: self.current.clone(),
        }
    }

    /// Stop the refresh loop and wait for it to acknowledge.
    pub async fn stop(self) {
        self.quit.cancel();
        let _ = self.handle.await;
        debug!("livestatus cache builder stopped");
    }
}

async fn run_refresh_loop(
    connector: Connector,
    refresh_interval: Duration,
    current: Arc<ArcSwap<Snapshot>>,
    quit: CancellationToken,
) {
    let mut tick = tokio::time::interval(refresh_interval);
    tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    loop {
        tokio::select! {
            _ = quit.cancelled() => break,
            _ = tick.tick() => {
                match build_snapshot(&connector).await {
                    Ok(snapshot) => {
                        debug!(entries = snapshot.entries.len(), "livestatus snapshot refreshed");
                        current.store(Arc::new(snapshot));
                    }
                    Err(error) => {
                        warn!(
                            address = %connector.address(),
                            error = %error,
                            "livestatus refresh failed, keeping previous snapshot"
                        );
                    }
                }
            }
        }
    }
}

fn downtime_query(for_services: bool, now_secs: i64) -> String {
    let columns = if for_services {
        "host_name service_display_name start_time end_time"
    } else {
        "host_name start_time end_time"
    };
    format!(
        "GET downtimes\nColumns: {columns}\nFilter: is_service = {}\nFilter: end_time > {now_secs}\nOutputFormat: csv\nColumnHeaders: off\n",
        if for_services { 1 } else { 0 },
    )
}

const HOST_CUSTOM_VARS_QUERY: &str =
    "GET hosts\nColumns: name custom_variables\nOutputFormat: csv\nColumnHeaders: off\n";
const SERVICE_CUSTOM_VARS_QUERY: &str =
    "GET services\nColumns: host_name display_name custom_variables\nOutputFormat: csv\nColumnHeaders: off\n";

async fn build_snapshot(connector: &Connector) -> Result<Snapshot, LivestatusError> {
    let now_secs = chrono::Utc::now().timestamp();
    let mut snapshot = Snapshot::default();

    for row in collect_rows(connector, downtime_query(false, now_secs)).await? {
        let [host, start, end] = row.as_slice() else {
            warn!(?row, "malformed host downtime row");
            continue;
        };
        if let Some(interval) = parse_interval(start, end) {
            snapshot.add_downtime(host, "", interval);
        }
    }

    for row in collect_rows(connector, downtime_query(true, now_secs)).await? {
        let [host, service, start, end] = row.as_slice() else {
            warn!(?row, "malformed service downtime row");
            continue;
        };
        if let Some(interval) = parse_interval(start, end) {
            snapshot.add_downtime(host, service, interval);
        }
    }

    for row in collect_rows(connector, HOST_CUSTOM_VARS_QUERY).await? {
        let [host, vars] = row.as_slice() else {
            continue;
        };
        snapshot.add_custom_vars(host, "", parse_custom_vars(vars));
    }

    for row in collect_rows(connector, SERVICE_CUSTOM_VARS_QUERY).await? {
        let [host, service, vars] = row.as_slice() else {
            continue;
        };
        snapshot.add_custom_vars(host, service, parse_custom_vars(vars));
    }

    Ok(snapshot)
}

fn parse_interval(start: &str, end: &str) -> Option<DowntimeInterval> {
    Some(DowntimeInterval {
        start_secs: start.parse().ok()?,
        end_secs: end.parse().unwrap_or(0),
    })
}

/// Custom variables arrive as `NAME|value` pairs joined by `,`.
fn parse_custom_vars(raw: &str) -> BTreeMap<String, String> {
    raw.split(',')
        .filter_map(|pair| {
            let (name, value) = pair.split_once('|')?;
            if name.is_empty() {
                return None;
            }
            Some((name.to_string(), value.to_string()))
        })
        .collect()
}
