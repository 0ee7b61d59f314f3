//! Nagios spool-file collection: a scanner feeding a shared job channel
//! and a pool of parser-workers draining it.

mod scanner;
mod worker;

pub mod perfdata;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use nagflux_core::{ENQUEUE_TIMEOUT, MetricsCollector, PauseState, ResultQueues, TargetFilter};
use nagflux_livestatus::CacheReader;
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::files::{DIRECTORY_SCAN_INTERVAL, MIN_FILE_AGE};
use perfdata::PerfdataParser;

/// Capacity of the shared job channel between scanner and workers.
const JOB_CHANNEL_CAPACITY: usize = 100;

#[derive(Debug, Clone)]
pub struct SpoolCollectorConfig {
    pub spool_directory: PathBuf,
    /// Number of parser-workers sharing the job channel.
    pub workers: usize,
    /// Read-buffer capacity of each worker, in bytes.
    pub file_buffer_size: usize,
    /// Measurement / index bucket for spool records.
    pub table: String,
    /// Service name given to host checks.
    pub hostcheck_alias: String,
    /// Which targets plain spool records address.
    pub default_filter: TargetFilter,
    pub scan_interval: Duration,
    pub min_file_age: Duration,
    pub enqueue_timeout: Duration,
}

impl SpoolCollectorConfig {
    pub fn new(spool_directory: impl Into<PathBuf>) -> Self {
        Self {
            spool_directory: spool_directory.into(),
            workers: 4,
            file_buffer_size: 8192,
            table: "metrics".to_string(),
            hostcheck_alias: "hostcheck".to_string(),
            default_filter: TargetFilter::All,
            scan_interval: DIRECTORY_SCAN_INTERVAL,
            min_file_age: MIN_FILE_AGE,
            enqueue_timeout: ENQUEUE_TIMEOUT,
        }
    }
}

/// Scanner plus parser-worker pool over one spool directory.
pub struct SpoolCollector {
    scanner_quit: CancellationToken,
    scanner: JoinHandle<()>,
    worker_quit: CancellationToken,
    workers: Vec<JoinHandle<()>>,
}

impl SpoolCollector {
    pub fn spawn(
        config: SpoolCollectorConfig,
        results: ResultQueues,
        cache: CacheReader,
        pause: Arc<PauseState>,
        metrics: Arc<MetricsCollector>,
    ) -> Self {
        let (jobs_tx, jobs_rx) = mpsc::channel::<PathBuf>(JOB_CHANNEL_CAPACITY);
        let jobs_rx = Arc::new(Mutex::new(jobs_rx));
        let parser = Arc::new(PerfdataParser::new(
            &config.table,
            &config.hostcheck_alias,
            config.default_filter,
        ));

        let scanner_quit = CancellationToken::new();
        let scanner = tokio::spawn(scanner::run_scanner(scanner::ScannerContext {
            spool_directory: config.spool_directory.clone(),
            jobs: jobs_tx,
            pause,
            metrics,
            scan_interval: config.scan_interval,
            min_file_age: config.min_file_age,
            enqueue_timeout: config.enqueue_timeout,
            quit: scanner_quit.clone(),
        }));

        let worker_quit = CancellationToken::new();
        let workers = (0..config.workers.max(1))
            .map(|worker_id| {
                tokio::spawn(worker::run_worker(
                    worker_id,
                    worker::WorkerContext {
                        jobs: jobs_rx.clone(),
                        parser: parser.clone(),
                        cache: cache.clone(),
                        results: results.clone(),
                        file_buffer_size: config.file_buffer_size,
                        quit: worker_quit.clone(),
                    },
                ))
            })
            .collect();

        Self {
            scanner_quit,
            scanner,
            worker_quit,
            workers,
        }
    }

    /// Stop producing first, then the workers. A file whose fan-out was
    /// interrupted stays on disk and is re-ingested on the next run.
    pub async fn stop(self) {
        self.scanner_quit.cancel();
        let _ = self.scanner.await;
        self.worker_quit.cancel();
        for worker in self.workers {
            let _ = worker.await;
        }
        debug!("spool collector stopped");
    }
}
