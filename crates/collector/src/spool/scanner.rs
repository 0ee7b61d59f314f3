//! Spool-directory scanner.
//!
//! Ticks on a fixed interval, skips while the pipeline is paused, gauges
//! the directory and feeds ready file paths into the shared job channel.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use nagflux_core::{MetricsCollector, PauseState};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::files;

pub(crate) struct ScannerContext {
    pub spool_directory: PathBuf,
    pub jobs: mpsc::Sender<PathBuf>,
    pub pause: Arc<PauseState>,
    pub metrics: Arc<MetricsCollector>,
    pub scan_interval: Duration,
    pub min_file_age: Duration,
    pub enqueue_timeout: Duration,
    pub quit: CancellationToken,
}

pub(crate) async fn run_scanner(ctx: ScannerContext) {
    let mut tick = tokio::time::interval(ctx.scan_interval);
    tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    loop {
        tokio::select! {
            _ = ctx.quit.cancelled() => break,
            _ = tick.tick() => {
                if !scan_once(&ctx).await {
                    break;
                }
            }
        }
    }
    debug!("spool scanner stopped");
}

/// One scan pass. Returns `false` when the scanner should shut down.
async fn scan_once(ctx: &ScannerContext) -> bool {
    if ctx.pause.is_any_target_on_pause() {
        debug!("spool scanner paused");
        return true;
    }

    let scan = match files::scan_directory(&ctx.spool_directory, ctx.min_file_age) {
        Ok(scan) => scan,
        Err(error) => {
            warn!(
                directory = %ctx.spool_directory.display(),
                error = %error,
                "failed to read spool directory"
            );
            return true;
        }
    };
    ctx.metrics.set_spool_files_on_disk(scan.total as u64);

    for path in scan.ready {
        tokio::select! {
            _ = ctx.quit.cancelled() => return false,
            sent = tokio::time::timeout(ctx.enqueue_timeout, ctx.jobs.send(path)) => {
                match sent {
                    Ok(Ok(())) => {}
                    Ok(Err(_)) => return false,
                    Err(_) => warn!("could not enqueue spool file, job channel full"),
                }
            }
        }
    }
    true
}
