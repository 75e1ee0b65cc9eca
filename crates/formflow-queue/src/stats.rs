use std::sync::atomic::{AtomicU64, Ordering};

use metrics::gauge;
use serde::{Deserialize, Serialize};

/// Running counters kept by an ingestion buffer, readable without a metrics exporter.
#[derive(Debug, Default)]
pub struct BufferStats {
    enqueued: AtomicU64,
    written_synchronously: AtomicU64,
    batches_flushed: AtomicU64,
    batches_failed: AtomicU64,
    submissions_flushed: AtomicU64,
    submissions_dropped: AtomicU64,
    queue_depth: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BufferStatsSnapshot {
    pub enqueued: u64,
    pub written_synchronously: u64,
    pub batches_flushed: u64,
    pub batches_failed: u64,
    pub submissions_flushed: u64,
    pub submissions_dropped: u64,
    /// Submissions waiting in the queue when last sampled.
    pub queue_depth: u64,
}

impl BufferStatsSnapshot {
    /// Submissions that reached storage by either path.
    pub fn persisted(&self) -> u64 {
        self.submissions_flushed + self.written_synchronously
    }
}

impl BufferStats {
    pub(crate) fn record_enqueued(&self) {
        self.enqueued.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_synchronous_write(&self) {
        self.written_synchronously.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_flush(&self, size: usize) {
        self.batches_flushed.fetch_add(1, Ordering::Relaxed);
        self.submissions_flushed
            .fetch_add(size as u64, Ordering::Relaxed);
    }

    pub(crate) fn record_failure(&self, size: usize) {
        self.batches_failed.fetch_add(1, Ordering::Relaxed);
        self.submissions_dropped
            .fetch_add(size as u64, Ordering::Relaxed);
    }

    /// Sampled by producers after a send and by the consumer after each receive.
    pub(crate) fn record_queue_depth(&self, depth: usize) {
        self.queue_depth.store(depth as u64, Ordering::Relaxed);
        gauge!("formflow_queue_depth").set(depth as f64);
    }

    pub fn snapshot(&self) -> BufferStatsSnapshot {
        BufferStatsSnapshot {
            enqueued: self.enqueued.load(Ordering::Relaxed),
            written_synchronously: self.written_synchronously.load(Ordering::Relaxed),
            batches_flushed: self.batches_flushed.load(Ordering::Relaxed),
            batches_failed: self.batches_failed.load(Ordering::Relaxed),
            submissions_flushed: self.submissions_flushed.load(Ordering::Relaxed),
            submissions_dropped: self.submissions_dropped.load(Ordering::Relaxed),
            queue_depth: self.queue_depth.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_reflects_recorded_events() {
        let stats = BufferStats::default();
        stats.record_enqueued();
        stats.record_enqueued();
        stats.record_flush(2);
        stats.record_synchronous_write();
        stats.record_failure(5);

        let snap = stats.snapshot();
        assert_eq!(snap.enqueued, 2);
        assert_eq!(snap.batches_flushed, 1);
        assert_eq!(snap.submissions_dropped, 5);
        assert_eq!(snap.persisted(), 3);
    }
}
