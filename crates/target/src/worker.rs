//! Sender-worker pools.
//!
//! Every target runs N identical workers over its result queue. A worker
//! probes the target until it is alive and its schema exists, then serves:
//! it batches incoming records, flushes on size, on idle timeout and on
//! shutdown, retries transient failures with interruptible waits, isolates
//! malformed lines into the quarantine file, and spills everything still
//! pending to the dump file when quit arrives.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use nagflux_core::{MetricsCollector, PauseState, Record, TargetReceiver};
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::connector::TargetConnector;
use crate::dump;
use crate::format::RecordFormatter;

#[derive(Debug, Clone)]
pub struct SenderConfig {
    /// Buffered lines that force a flush.
    pub max_batch_size: usize,
    /// Idle time that forces a flush.
    pub data_timeout: Duration,
    /// Base path of the on-disk spill; the quarantine adds `-errors`.
    pub dump_file: PathBuf,
    /// Interruptible wait between retries of a transient failure.
    pub retry_wait: Duration,
    /// Wait between probes of an unhealthy target.
    pub rescan_wait: Duration,
    /// Per-receive budget while draining the queue at shutdown.
    pub shutdown_drain: Duration,
    /// How long a target may be unhealthy before it pauses the collectors.
    pub pause_grace: Duration,
    /// Passes over a failing buffer before it is quarantined.
    pub flush_passes: u32,
}

impl SenderConfig {
    pub fn new(dump_file: impl Into<PathBuf>) -> Self {
        Self {
            max_batch_size: 10_000,
            data_timeout: Duration::from_secs(20),
            dump_file: dump_file.into(),
            retry_wait: Duration::from_secs(10),
            rescan_wait: Duration::from_secs(30),
            shutdown_drain: Duration::from_millis(200),
            pause_grace: Duration::from_secs(5),
            flush_passes: 3,
        }
    }
}

/// The sender-workers of one target.
pub struct SenderPool {
    quit: CancellationToken,
    workers: Vec<JoinHandle<()>>,
}

impl SenderPool {
    pub fn spawn(
        connector: Arc<dyn TargetConnector>,
        formatter: Arc<dyn RecordFormatter>,
        receiver: TargetReceiver,
        workers: usize,
        config: SenderConfig,
        pause: Arc<PauseState>,
        metrics: Arc<MetricsCollector>,
    ) -> Self {
        let quit = CancellationToken::new();
        let rx = Arc::new(Mutex::new(receiver.rx));
        let workers = (0..workers.max(1))
            .map(|worker_id| {
                let ctx = WorkerContext {
                    worker_id,
                    connector: connector.clone(),
                    formatter: formatter.clone(),
                    rx: rx.clone(),
                    config: config.clone(),
                    pause: pause.clone(),
                    metrics: metrics.clone(),
                    quit: quit.clone(),
                };
                tokio::spawn(run_worker(ctx))
            })
            .collect();
        Self { quit, workers }
    }

    /// Signal quit and wait for every worker's final flush or spill.
    pub async fn stop(self) {
        self.quit.cancel();
        for worker in self.workers {
            let _ = worker.await;
        }
    }
}

struct WorkerContext {
    worker_id: usize,
    connector: Arc<dyn TargetConnector>,
    formatter: Arc<dyn RecordFormatter>,
    rx: Arc<Mutex<mpsc::Receiver<Record>>>,
    config: SenderConfig,
    pause: Arc<PauseState>,
    metrics: Arc<MetricsCollector>,
    quit: CancellationToken,
}

async fn run_worker(ctx: WorkerContext) {
    let mut buffer: Vec<String> = Vec::new();

    // Probe until the target is usable.
    let mut unhealthy_since: Option<Instant> = None;
    loop {
        if ctx.quit.is_cancelled() {
            spill_pending(&ctx, std::mem::take(&mut buffer)).await;
            return;
        }
        if !ctx.connector.is_alive().await {
            warn!(
                target_name = ctx.connector.target_name(),
                "target not reachable, waiting"
            );
            if !wait_rescan_or_quit(&ctx, &mut unhealthy_since, &mut buffer).await {
                return;
            }
            continue;
        }
        if !ctx.connector.schema_exists().await {
            warn!(
                target_name = ctx.connector.target_name(),
                "target schema missing, waiting"
            );
            if !wait_rescan_or_quit(&ctx, &mut unhealthy_since, &mut buffer).await {
                return;
            }
            continue;
        }
        break;
    }
    ctx.pause.set_pause(ctx.connector.target_name(), false);
    info!(
        target_name = ctx.connector.target_name(),
        worker_id = ctx.worker_id,
        "target ready"
    );

    // Serve until quit or until the producers hang up.
    loop {
        tokio::select! {
            _ = ctx.quit.cancelled() => {
                shutdown_flush(&ctx, &mut buffer).await;
                break;
            }
            received = recv_shared(&ctx.rx) => {
                match received {
                    Some(record) => {
                        if let Some(line) = ctx.formatter.format(&record) {
                            buffer.push(line);
                        }
                        if buffer.len() >= ctx.config.max_batch_size
                            && !flush(&ctx, &mut buffer).await
                        {
                            break;
                        }
                    }
                    None => {
                        let _ = flush(&ctx, &mut buffer).await;
                        break;
                    }
                }
            }
            _ = tokio::time::sleep(ctx.config.data_timeout) => {
                if !flush(&ctx, &mut buffer).await {
                    break;
                }
            }
        }
    }
    debug!(
        target_name = ctx.connector.target_name(),
        worker_id = ctx.worker_id,
        "sender worker stopped"
    );
}

async fn recv_shared(rx: &Mutex<mpsc::Receiver<Record>>) -> Option<Record> {
    rx.lock().await.recv().await
}

/// Wait for the next probe of an unhealthy target, raising the pause flag
/// once the grace interval has passed. Returns `false` when quit arrived;
/// everything pending is spilled first.
async fn wait_rescan_or_quit(
    ctx: &WorkerContext,
    unhealthy_since: &mut Option<Instant>,
    buffer: &mut Vec<String>,
) -> bool {
    let since = unhealthy_since.get_or_insert_with(Instant::now);
    if since.elapsed() >= ctx.config.pause_grace {
        ctx.pause.set_pause(ctx.connector.target_name(), true);
    }
    tokio::select! {
        _ = ctx.quit.cancelled() => {
            spill_pending(ctx, std::mem::take(buffer)).await;
            false
        }
        _ = tokio::time::sleep(ctx.config.rescan_wait) => true,
    }
}

/// Flush the buffer to the target. Returns `false` when quit interrupted
/// a retry wait; the worker must exit, pending records are already
/// spilled.
async fn flush(ctx: &WorkerContext, buffer: &mut Vec<String>) -> bool {
    if buffer.is_empty() {
        return true;
    }
    let started = Instant::now();
    let payload: String = buffer.concat();
    let mut outcome = ctx.connector.send(&payload).await;

    if outcome.is_err() {
        let mut passes_left = ctx.config.flush_passes;
        loop {
            match &outcome {
                Ok(()) => break,
                Err(error) if error.is_malformed() => {
                    isolate_bad_lines(ctx, buffer).await;
                    outcome = Ok(());
                    break;
                }
                Err(_) if passes_left == 0 => break,
                Err(error) => {
                    passes_left -= 1;
                    warn!(
                        target_name = ctx.connector.target_name(),
                        error = %error,
                        passes_left,
                        "send failed, retrying"
                    );
                    if !wait_retry_or_quit(ctx).await {
                        spill_pending(ctx, std::mem::take(buffer)).await;
                        return false;
                    }
                    outcome = ctx.connector.send(&payload).await;
                }
            }
        }
        if let Err(error) = outcome {
            warn!(
                target_name = ctx.connector.target_name(),
                error = %error,
                lines = buffer.len(),
                "send kept failing, quarantining the batch"
            );
            dump::append_or_warn(
                &dump::errors_path(&ctx.config.dump_file),
                Some(&format!("undeliverable after retries: {error}")),
                buffer,
            );
            buffer.clear();
            ctx.metrics.record_send_duration(
                ctx.connector.target_name(),
                started.elapsed().as_millis() as u64,
            );
            return true;
        }
    }

    ctx.metrics
        .record_bytes_sent(ctx.connector.target_name(), payload.len() as u64);
    ctx.metrics.record_send_duration(
        ctx.connector.target_name(),
        started.elapsed().as_millis() as u64,
    );
    buffer.clear();
    true
}

/// Resend a rejected batch line by line; lines the target still rejects
/// go to the quarantine file, the rest are considered delivered.
async fn isolate_bad_lines(ctx: &WorkerContext, buffer: &[String]) {
    let mut bad = Vec::new();
    for line in buffer {
        if ctx.connector.send(line).await.is_err() {
            bad.push(line.clone());
        }
    }
    if bad.is_empty() {
        return;
    }
    warn!(
        target_name = ctx.connector.target_name(),
        lines = bad.len(),
        "quarantining lines the target rejects"
    );
    dump::append_or_warn(
        &dump::errors_path(&ctx.config.dump_file),
        Some("rejected by the target"),
        &bad,
    );
}

/// Interruptible retry backoff. Returns `false` on quit.
async fn wait_retry_or_quit(ctx: &WorkerContext) -> bool {
    tokio::select! {
        _ = ctx.quit.cancelled() => false,
        _ = tokio::time::sleep(ctx.config.retry_wait) => true,
    }
}

/// Quit arrived while serving: pull everything still queued into the
/// buffer, try one last send, and spill to the dump file if it fails.
async fn shutdown_flush(ctx: &WorkerContext, buffer: &mut Vec<String>) {
    buffer.extend(drain_queue(ctx).await);
    if buffer.is_empty() {
        return;
    }
    let payload: String = buffer.concat();
    match ctx.connector.send(&payload).await {
        Ok(()) => {
            ctx.metrics
                .record_bytes_sent(ctx.connector.target_name(), payload.len() as u64);
            buffer.clear();
        }
        Err(error) => {
            warn!(
                target_name = ctx.connector.target_name(),
                error = %error,
                "final flush failed, saving pending records to disk"
            );
            dump::append_or_warn(&ctx.config.dump_file, None, buffer);
            buffer.clear();
        }
    }
}

/// Spill the given lines plus whatever the queue still holds to the dump
/// file. Used on quit while the target is known unusable.
async fn spill_pending(ctx: &WorkerContext, mut lines: Vec<String>) {
    lines.extend(drain_queue(ctx).await);
    if lines.is_empty() {
        return;
    }
    warn!(
        target_name = ctx.connector.target_name(),
        lines = lines.len(),
        file = %ctx.config.dump_file.display(),
        "saving pending records to disk"
    );
    dump::append_or_warn(&ctx.config.dump_file, None, &lines);
}

/// Read the result queue until it stays empty for the drain budget.
async fn drain_queue(ctx: &WorkerContext) -> Vec<String> {
    let mut lines = Vec::new();
    loop {
        let received = {
            let mut rx = ctx.rx.lock().await;
            tokio::time::timeout(ctx.config.shutdown_drain, rx.recv()).await
        };
        match received {
            Ok(Some(record)) => {
                if let Some(line) = ctx.formatter.format(&record) {
                    lines.push(line);
                }
            }
            Ok(None) | Err(_) => break,
        }
    }
    lines
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SendError;
    use async_trait::async_trait;
    use nagflux_core::{ResultQueues, TargetKind};
    use std::sync::Mutex as StdMutex;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    /// Scriptable stand-in for a downstream endpoint.
    struct MockConnector {
        alive: AtomicBool,
        schema: AtomicBool,
        /// Payloads accepted by the endpoint.
        sent: StdMutex<Vec<String>>,
        /// Substring the endpoint rejects as malformed.
        reject_containing: StdMutex<Option<String>>,
        /// Fail every send with a transient error while set.
        fail_transient: AtomicBool,
        send_calls: AtomicUsize,
    }

    impl MockConnector {
        fn healthy() -> Self {
            Self {
                alive: AtomicBool::new(true),
                schema: AtomicBool::new(true),
                sent: StdMutex::new(Vec::new()),
                reject_containing: StdMutex::new(None),
                fail_transient: AtomicBool::new(false),
                send_calls: AtomicUsize::new(0),
            }
        }

        fn down() -> Self {
            let mock = Self::healthy();
            mock.alive.store(false, Ordering::SeqCst);
            mock
        }

        fn sent(&self) -> Vec<String> {
            self.sent.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl TargetConnector for MockConnector {
        fn target_name(&self) -> &str {
            "mock"
        }

        async fn is_alive(&self) -> bool {
            self.alive.load(Ordering::SeqCst)
        }

        async fn schema_exists(&self) -> bool {
            self.schema.load(Ordering::SeqCst)
        }

        async fn send(&self, payload: &str) -> Result<(), SendError> {
            self.send_calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_transient.load(Ordering::SeqCst) {
                return Err(SendError::HttpStatus {
                    status: reqwest::StatusCode::INTERNAL_SERVER_ERROR,
                });
            }
            let reject = self.reject_containing.lock().unwrap().clone();
            if let Some(needle) = reject
                && payload.contains(&needle)
            {
                return Err(SendError::Rejected);
            }
            self.sent.lock().unwrap().push(payload.to_string());
            Ok(())
        }
    }

    /// Formatter used in tests: `table value… timestamp`.
    struct PlainFormatter;

    impl RecordFormatter for PlainFormatter {
        fn format(&self, record: &Record) -> Option<String> {
            let value = record.fields.get("value")?;
            Some(format!("{} {} {}\n", record.table, value, record.timestamp))
        }
    }

    fn test_config(dir: &tempfile::TempDir) -> SenderConfig {
        let mut config = SenderConfig::new(dir.path().join("mock.dump"));
        config.data_timeout = Duration::from_millis(100);
        config.retry_wait = Duration::from_millis(50);
        config.rescan_wait = Duration::from_millis(50);
        config.shutdown_drain = Duration::from_millis(50);
        config.pause_grace = Duration::from_millis(10);
        config
    }

    fn record(table: &str, value: &str) -> Record {
        Record::new(table, "1700000000000").field("value", value)
    }

    fn pool(
        connector: Arc<MockConnector>,
        config: SenderConfig,
        workers: usize,
        pause: Arc<PauseState>,
    ) -> (SenderPool, nagflux_core::ResultQueues) {
        let specs = vec![("mock".to_string(), TargetKind::Influx, 64)];
        let (queues, mut receivers) = ResultQueues::bounded(&specs);
        let pool = SenderPool::spawn(
            connector,
            Arc::new(PlainFormatter),
            receivers.remove(0),
            workers,
            config,
            pause,
            Arc::new(MetricsCollector::new()),
        );
        (pool, queues)
    }

    async fn offer_all(queues: &nagflux_core::ResultQueues, records: Vec<Record>) {
        let quit = CancellationToken::new();
        for record in records {
            assert!(queues.offer(record, &quit).await);
        }
    }

    async fn wait_until<F: Fn() -> bool>(condition: F) -> bool {
        for _ in 0..100 {
            if condition() {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        false
    }

    #[tokio::test]
    async fn idle_timeout_flushes_the_batch() {
        let dir = tempfile::tempdir().unwrap();
        let connector = Arc::new(MockConnector::healthy());
        let (pool, queues) = pool(
            connector.clone(),
            test_config(&dir),
            1,
            Arc::new(PauseState::new()),
        );

        offer_all(&queues, vec![record("cpu", "1"), record("cpu", "2")]).await;
        assert!(wait_until(|| !connector.sent().is_empty()).await);
        assert_eq!(
            connector.sent()[0],
            "cpu 1 1700000000000\ncpu 2 1700000000000\n"
        );

        pool.stop().await;
    }

    #[tokio::test]
    async fn full_batch_flushes_without_waiting() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = test_config(&dir);
        config.max_batch_size = 3;
        config.data_timeout = Duration::from_secs(3600);
        let connector = Arc::new(MockConnector::healthy());
        let (pool, queues) = pool(connector.clone(), config, 1, Arc::new(PauseState::new()));

        offer_all(
            &queues,
            vec![record("a", "1"), record("b", "2"), record("c", "3")],
        )
        .await;
        assert!(wait_until(|| !connector.sent().is_empty()).await);
        assert_eq!(connector.sent()[0].lines().count(), 3);

        pool.stop().await;
    }

    #[tokio::test]
    async fn rejected_batch_is_isolated_line_by_line() {
        let dir = tempfile::tempdir().unwrap();
        let connector = Arc::new(MockConnector::healthy());
        *connector.reject_containing.lock().unwrap() = Some("bad".to_string());
        let (pool, queues) = pool(
            connector.clone(),
            test_config(&dir),
            1,
            Arc::new(PauseState::new()),
        );

        offer_all(
            &queues,
            vec![record("cpu", "1"), record("bad", "2"), record("cpu", "3")],
        )
        .await;

        let errors_file = dump::errors_path(&dir.path().join("mock.dump"));
        assert!(wait_until(|| errors_file.exists()).await);

        // The two good lines were delivered individually.
        let sent = connector.sent();
        assert!(sent.contains(&"cpu 1 1700000000000\n".to_string()));
        assert!(sent.contains(&"cpu 3 1700000000000\n".to_string()));

        // The bad line sits in quarantine behind a one-line marker.
        let content = std::fs::read_to_string(&errors_file).unwrap();
        assert_eq!(content, "# rejected by the target\nbad 2 1700000000000\n");

        // One batch attempt plus three single-line resends, no batch retry.
        assert_eq!(connector.send_calls.load(Ordering::SeqCst), 4);

        pool.stop().await;
    }

    #[tokio::test]
    async fn unreachable_target_spills_queue_on_quit() {
        let dir = tempfile::tempdir().unwrap();
        let connector = Arc::new(MockConnector::down());
        let (pool, queues) = pool(
            connector.clone(),
            test_config(&dir),
            1,
            Arc::new(PauseState::new()),
        );

        let records: Vec<Record> = (0..8).map(|i| record("cpu", &i.to_string())).collect();
        offer_all(&queues, records).await;
        tokio::time::sleep(Duration::from_millis(100)).await;

        pool.stop().await;

        let dump_file = dir.path().join("mock.dump");
        let content = std::fs::read_to_string(&dump_file).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 8);
        for (i, line) in lines.iter().enumerate() {
            assert_eq!(*line, format!("cpu {i} 1700000000000"));
        }

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = std::fs::metadata(&dump_file).unwrap().permissions().mode();
            assert_eq!(mode & 0o777, 0o600);
        }

        // Nothing was ever delivered.
        assert!(connector.sent().is_empty());
    }

    #[tokio::test]
    async fn unhealthy_target_raises_the_pause_flag_and_ready_clears_it() {
        let dir = tempfile::tempdir().unwrap();
        let connector = Arc::new(MockConnector::down());
        let pause = Arc::new(PauseState::new());
        let (pool, _queues) = pool(connector.clone(), test_config(&dir), 1, pause.clone());

        assert!(wait_until(|| pause.is_any_target_on_pause()).await);

        connector.alive.store(true, Ordering::SeqCst);
        assert!(wait_until(|| !pause.is_any_target_on_pause()).await);

        pool.stop().await;
    }

    #[tokio::test]
    async fn transient_failures_retry_then_quarantine() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = test_config(&dir);
        config.flush_passes = 2;
        let connector = Arc::new(MockConnector::healthy());
        connector.fail_transient.store(true, Ordering::SeqCst);
        let (pool, queues) = pool(connector.clone(), config, 1, Arc::new(PauseState::new()));

        offer_all(&queues, vec![record("cpu", "1")]).await;

        let errors_file = dump::errors_path(&dir.path().join("mock.dump"));
        assert!(wait_until(|| errors_file.exists()).await);
        let content = std::fs::read_to_string(&errors_file).unwrap();
        assert!(content.contains("cpu 1 1700000000000"));
        // Initial attempt plus two retry passes.
        assert_eq!(connector.send_calls.load(Ordering::SeqCst), 3);

        pool.stop().await;
    }

    #[tokio::test]
    async fn quit_during_retry_wait_spills_buffer_and_queue() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = test_config(&dir);
        config.retry_wait = Duration::from_secs(3600);
        let connector = Arc::new(MockConnector::healthy());
        connector.fail_transient.store(true, Ordering::SeqCst);
        let (pool, queues) = pool(connector.clone(), config, 1, Arc::new(PauseState::new()));

        offer_all(&queues, vec![record("cpu", "1")]).await;
        // Wait for the flush to enter its retry wait, then queue more.
        assert!(
            wait_until(|| connector.send_calls.load(Ordering::SeqCst) >= 1).await
        );
        offer_all(&queues, vec![record("cpu", "2")]).await;

        pool.stop().await;

        let content = std::fs::read_to_string(dir.path().join("mock.dump")).unwrap();
        assert!(content.contains("cpu 1 1700000000000"));
        assert!(content.contains("cpu 2 1700000000000"));
    }

    #[tokio::test]
    async fn graceful_quit_sends_the_remaining_queue() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = test_config(&dir);
        config.data_timeout = Duration::from_secs(3600);
        let connector = Arc::new(MockConnector::healthy());
        let (pool, queues) = pool(connector.clone(), config, 1, Arc::new(PauseState::new()));

        offer_all(&queues, vec![record("cpu", "1"), record("cpu", "2")]).await;
        tokio::time::sleep(Duration::from_millis(100)).await;
        pool.stop().await;

        // Everything reached the target; nothing was spilled.
        let all_sent: String = connector.sent().concat();
        assert!(all_sent.contains("cpu 1 1700000000000"));
        assert!(all_sent.contains("cpu 2 1700000000000"));
        assert!(!dir.path().join("mock.dump").exists());
    }
}
