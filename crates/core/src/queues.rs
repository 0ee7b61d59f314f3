//! Per-target result queues and the fan-out that feeds them.
//!
//! The fan-out is not one channel with many consumers: every target owns a
//! bounded queue, and filter evaluation decides which queues receive a copy
//! of a record. Back-pressure is therefore per target; a slow target can
//! only lose its own copies.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::record::{Record, TargetKind};

/// How long an offer may wait on a full queue before the copy is dropped.
pub const ENQUEUE_TIMEOUT: Duration = Duration::from_secs(60);

/// A target's identity plus the sending half of its queue.
#[derive(Debug, Clone)]
struct TargetQueue {
    name: String,
    kind: TargetKind,
    tx: mpsc::Sender<Record>,
}

/// The receiving half of one target's queue, handed to its sender pool.
pub struct TargetReceiver {
    pub name: String,
    pub kind: TargetKind,
    pub rx: mpsc::Receiver<Record>,
}

/// Write-broadcast over all configured target queues.
///
/// Cheap to clone; every collector and parser-worker holds one.
#[derive(Debug, Clone)]
pub struct ResultQueues {
    queues: Arc<Vec<TargetQueue>>,
    enqueue_timeout: Duration,
}

impl ResultQueues {
    /// Build one bounded queue per `(name, kind, capacity)` spec.
    pub fn bounded(specs: &[(String, TargetKind, usize)]) -> (Self, Vec<TargetReceiver>) {
        let mut queues = Vec::with_capacity(specs.len());
        let mut receivers = Vec::with_capacity(specs.len());
        for (name, kind, capacity) in specs {
            let (tx, rx) = mpsc::channel(*capacity);
            queues.push(TargetQueue {
                name: name.clone(),
                kind: *kind,
                tx,
            });
            receivers.push(TargetReceiver {
                name: name.clone(),
                kind: *kind,
                rx,
            });
        }
        (
            Self {
                queues: Arc::new(queues),
                enqueue_timeout: ENQUEUE_TIMEOUT,
            },
            receivers,
        )
    }

    /// Override the back-pressure timeout. Used by tests; production keeps
    /// [`ENQUEUE_TIMEOUT`].
    pub fn with_enqueue_timeout(mut self, timeout: Duration) -> Self {
        self.enqueue_timeout = timeout;
        self
    }

    pub fn is_empty(&self) -> bool {
        self.queues.is_empty()
    }

    pub fn len(&self) -> usize {
        self.queues.len()
    }

    /// Offer a record to every queue its filter admits.
    ///
    /// Each copy goes through a three-way select: accepted, cancelled by
    /// `quit`, or timed out. A timeout drops that target's copy with a
    /// warning; the remaining targets are still offered. Returns `false`
    /// only when `quit` fired, in which case the caller should stop
    /// producing.
    pub async fn offer(&self, record: Record, quit: &CancellationToken) -> bool {
        for queue in self.queues.iter() {
            if !record.filter.admits(queue.kind) {
                continue;
            }
            tokio::select! {
                _ = quit.cancelled() => return false,
                sent = tokio::time::timeout(self.enqueue_timeout, queue.tx.send(record.clone())) => {
                    match sent {
                        Ok(Ok(())) => {}
                        Ok(Err(_)) => {
                            warn!(target_name = %queue.name, "result queue closed, dropping record copy");
                        }
                        Err(_) => {
                            warn!(
                                target_name = %queue.name,
                                timeout_secs = self.enqueue_timeout.as_secs(),
                                "result queue full, dropping record copy"
                            );
                        }
                    }
                }
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::TargetFilter;

    fn specs() -> Vec<(String, TargetKind, usize)> {
        vec![
            ("influx".to_string(), TargetKind::Influx, 8),
            ("elastic".to_string(), TargetKind::Elastic, 8),
        ]
    }

    #[tokio::test]
    async fn offer_broadcasts_to_all_admitted_targets() {
        let (queues, mut receivers) = ResultQueues::bounded(&specs());
        let quit = CancellationToken::new();

        let record = Record::new("cpu", "1700000000000").tag("host", "srvA");
        assert!(queues.offer(record.clone(), &quit).await);

        for receiver in &mut receivers {
            let got = receiver.rx.try_recv().expect("copy missing");
            assert_eq!(got, record);
        }
    }

    #[tokio::test]
    async fn narrowing_the_filter_removes_exactly_the_other_copies() {
        let (queues, mut receivers) = ResultQueues::bounded(&specs());
        let quit = CancellationToken::new();

        let record = Record::new("cpu", "0").with_filter(TargetFilter::Influx);
        assert!(queues.offer(record.clone(), &quit).await);

        assert!(receivers[0].rx.try_recv().is_ok());
        assert!(receivers[1].rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn sentinel_filter_reaches_no_target() {
        let (queues, mut receivers) = ResultQueues::bounded(&specs());
        let quit = CancellationToken::new();

        let record = Record::new("cpu", "0").with_filter(TargetFilter::None);
        assert!(queues.offer(record, &quit).await);

        assert!(receivers[0].rx.try_recv().is_err());
        assert!(receivers[1].rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn full_queue_drops_only_that_copy_after_timeout() {
        let specs = vec![
            ("influx".to_string(), TargetKind::Influx, 1),
            ("elastic".to_string(), TargetKind::Elastic, 8),
        ];
        let (queues, mut receivers) = ResultQueues::bounded(&specs);
        let queues = queues.with_enqueue_timeout(Duration::from_millis(50));
        let quit = CancellationToken::new();

        // Fill the influx queue; nobody is draining it.
        assert!(queues.offer(Record::new("a", "0"), &quit).await);
        // The second offer times out on influx but still lands on elastic.
        assert!(queues.offer(Record::new("b", "0"), &quit).await);

        assert_eq!(receivers[0].rx.try_recv().unwrap().table, "a");
        assert!(receivers[0].rx.try_recv().is_err());
        assert_eq!(receivers[1].rx.try_recv().unwrap().table, "a");
        assert_eq!(receivers[1].rx.try_recv().unwrap().table, "b");
    }

    #[tokio::test]
    async fn cancelled_offer_reports_quit() {
        let specs = vec![("influx".to_string(), TargetKind::Influx, 1)];
        let (queues, _receivers) = ResultQueues::bounded(&specs);
        let quit = CancellationToken::new();

        assert!(queues.offer(Record::new("a", "0"), &quit).await);
        quit.cancel();
        // Queue is full and quit already fired: the offer must give up.
        assert!(!queues.offer(Record::new("b", "0"), &quit).await);
    }
}
