//! Spool parser-workers.
//!
//! Each worker drains the shared job channel, parses the file into
//! records, enriches them from the current Livestatus snapshot and fans
//! them out. The worker is the sole deleter of a file it consumed.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use nagflux_core::{Record, ResultQueues};
use nagflux_livestatus::{CacheReader, Snapshot};
use tokio::io::AsyncReadExt;
use tokio::sync::{Mutex, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::perfdata::PerfdataParser;

pub(crate) struct WorkerContext {
    pub jobs: Arc<Mutex<mpsc::Receiver<PathBuf>>>,
    pub parser: Arc<PerfdataParser>,
    pub cache: CacheReader,
    pub results: ResultQueues,
    pub file_buffer_size: usize,
    pub quit: CancellationToken,
}

pub(crate) async fn run_worker(worker_id: usize, ctx: WorkerContext) {
    loop {
        let job = {
            let mut jobs = ctx.jobs.lock().await;
            tokio::select! {
                _ = ctx.quit.cancelled() => None,
                job = jobs.recv() => job,
            }
        };
        let Some(path) = job else {
            break;
        };
        if !process_file(&path, &ctx).await {
            break;
        }
    }
    debug!(worker_id, "spool worker stopped");
}

/// Consume one spool file. Returns `false` when quit interrupted the
/// fan-out; the file is then left in place for the next run.
async fn process_file(path: &Path, ctx: &WorkerContext) -> bool {
    let content = match read_with_capacity(path, ctx.file_buffer_size).await {
        Ok(content) => content,
        Err(error) if error.kind() == std::io::ErrorKind::NotFound => {
            // Enqueued twice across scans and already consumed.
            debug!(file = %path.display(), "spool file already gone");
            return true;
        }
        Err(error) => {
            warn!(
                file = %path.display(),
                error = %error,
                "could not read spool file, leaving it in place"
            );
            return true;
        }
    };

    let snapshot = ctx.cache.current();
    let mut records = ctx.parser.parse_content(&content);
    if records.is_empty() {
        warn!(file = %path.display(), "spool file produced no records");
    }
    for record in &mut records {
        enrich(record, &snapshot, ctx.parser.hostcheck_alias());
    }
    for record in records {
        if !ctx.results.offer(record, &ctx.quit).await {
            return false;
        }
    }

    if let Err(error) = tokio::fs::remove_file(path).await {
        warn!(file = %path.display(), error = %error, "could not delete spool file");
    }
    true
}

async fn read_with_capacity(path: &Path, capacity: usize) -> std::io::Result<String> {
    let file = tokio::fs::File::open(path).await?;
    let mut reader = tokio::io::BufReader::with_capacity(capacity, file);
    let mut content = String::new();
    reader.read_to_string(&mut content).await?;
    Ok(content)
}

/// Attach Livestatus metadata to a parsed record. A cache miss changes
/// nothing; the record is never held back.
fn enrich(record: &mut Record, snapshot: &Snapshot, hostcheck_alias: &str) {
    let Some(host) = record.tags.get("host").cloned() else {
        return;
    };
    let service_tag = record.tags.get("service").cloned().unwrap_or_default();
    // Host checks are cached under the empty service name.
    let service = if service_tag == hostcheck_alias {
        String::new()
    } else {
        service_tag
    };

    if let Some(millis) = record.timestamp_millis()
        && snapshot.in_downtime(&host, &service, millis / 1000)
    {
        record
            .tags
            .insert("downtime".to_string(), "true".to_string());
    }

    if let Some(vars) = snapshot.custom_vars(&host, &service) {
        for (name, value) in vars {
            record
                .tags
                .entry(name.clone())
                .or_insert_with(|| value.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nagflux_core::TargetFilter;

    fn snapshot_with_downtime() -> Snapshot {
        let mut snapshot = Snapshot::default();
        snapshot.add_downtime(
            "srvA",
            "ping",
            nagflux_livestatus::DowntimeInterval {
                start_secs: 10,
                end_secs: 20,
            },
        );
        snapshot.add_custom_vars(
            "srvA",
            "ping",
            [("ENV".to_string(), "prod".to_string())],
        );
        snapshot
    }

    #[test]
    fn enrich_marks_downtime_and_merges_custom_vars() {
        let snapshot = snapshot_with_downtime();
        let mut record = Record::new("metrics", "15000")
            .with_filter(TargetFilter::All)
            .tag("host", "srvA")
            .tag("service", "ping");

        enrich(&mut record, &snapshot, "hostcheck");
        assert_eq!(record.tags.get("downtime").map(String::as_str), Some("true"));
        assert_eq!(record.tags.get("ENV").map(String::as_str), Some("prod"));
    }

    #[test]
    fn enrich_misses_silently() {
        let snapshot = snapshot_with_downtime();
        let mut record = Record::new("metrics", "15000")
            .tag("host", "unknown")
            .tag("service", "ping");
        let before = record.clone();

        enrich(&mut record, &snapshot, "hostcheck");
        assert_eq!(record, before);
    }

    #[test]
    fn enrich_does_not_mark_outside_the_interval() {
        let snapshot = snapshot_with_downtime();
        let mut record = Record::new("metrics", "25000")
            .tag("host", "srvA")
            .tag("service", "ping");

        enrich(&mut record, &snapshot, "hostcheck");
        assert!(!record.tags.contains_key("downtime"));
    }

    #[test]
    fn enrich_never_overrides_parsed_tags() {
        let mut snapshot = Snapshot::default();
        snapshot.add_custom_vars(
            "srvA",
            "ping",
            [("host".to_string(), "imposter".to_string())],
        );
        let mut record = Record::new("metrics", "0")
            .tag("host", "srvA")
            .tag("service", "ping");

        enrich(&mut record, &snapshot, "hostcheck");
        assert_eq!(record.tags.get("host").map(String::as_str), Some("srvA"));
    }
}
