//! Bounded ingestion buffer with size- and time-triggered batch flushes.
//!
//! Producers call [`IngestionBuffer::enqueue`], which never waits for queue space:
//! when the queue is full the submission is written synchronously instead. A
//! single background task owns the pending batch and hands it to the
//! [`BatchWriter`] when it reaches `batch_size` or when the flush interval ticks.
//!
//! Submissions that take the synchronous path may reach storage before earlier
//! submissions still waiting in the queue.

use std::sync::Arc;
use std::time::Duration;

use metrics::counter;
use parking_lot::RwLock;
use tokio::sync::mpsc::{self, error::TrySendError, Receiver, Sender};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use formflow_core::{
    FormFlowError, IngestConfig, ResponseId, Result, Submission, SubmissionDraft, SubmissionStore,
    Validate,
};

use crate::stats::{BufferStats, BufferStatsSnapshot};
use crate::writer::BatchWriter;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferConfig {
    pub queue_capacity: usize,
    pub batch_size: usize,
    pub flush_interval: Duration,
}

impl BufferConfig {
    pub fn validate(&self) -> Result<()> {
        if self.queue_capacity == 0 || self.batch_size == 0 {
            return Err(FormFlowError::Config(
                "queue_capacity and batch_size must be > 0".into(),
            ));
        }
        if self.flush_interval.is_zero() {
            return Err(FormFlowError::Config("flush_interval must be > 0".into()));
        }
        Ok(())
    }
}

impl Default for BufferConfig {
    fn default() -> Self {
        Self::from(&IngestConfig::default())
    }
}

impl From<&IngestConfig> for BufferConfig {
    fn from(config: &IngestConfig) -> Self {
        Self {
            queue_capacity: config.queue_capacity,
            batch_size: config.batch_size,
            flush_interval: config.flush_interval(),
        }
    }
}

/// How an accepted submission was handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnqueueOutcome {
    Queued,
    /// The queue was full and the submission was written before returning.
    WrittenSynchronously,
}

pub struct IngestionBuffer {
    sender: RwLock<Option<Sender<Submission>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
    store: Arc<dyn SubmissionStore>,
    stats: Arc<BufferStats>,
    config: BufferConfig,
}

impl std::fmt::Debug for IngestionBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IngestionBuffer")
            .field("config", &self.config)
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl IngestionBuffer {
    /// Creates the buffer and spawns its consumer on the current tokio runtime.
    pub fn new(store: Arc<dyn SubmissionStore>, config: BufferConfig) -> Result<Self> {
        config.validate()?;

        let (sender, receiver) = mpsc::channel(config.queue_capacity);
        let stats = Arc::new(BufferStats::default());
        let writer = BatchWriter::new(store.clone(), stats.clone());
        let worker = tokio::spawn(run_consumer(
            receiver,
            writer,
            stats.clone(),
            config.batch_size,
            config.flush_interval,
        ));

        info!(
            "Ingestion buffer started (queue_capacity={}, batch_size={}, flush_interval={:?})",
            config.queue_capacity, config.batch_size, config.flush_interval
        );

        Ok(Self {
            sender: RwLock::new(Some(sender)),
            worker: Mutex::new(Some(worker)),
            store,
            stats,
            config,
        })
    }

    pub fn config(&self) -> &BufferConfig {
        &self.config
    }

    pub fn stats(&self) -> BufferStatsSnapshot {
        self.stats.snapshot()
    }

    pub fn is_closed(&self) -> bool {
        self.sender.read().is_none()
    }

    /// Submissions waiting in the queue, not counting the batch being assembled.
    pub fn queue_depth(&self) -> usize {
        self.sender
            .read()
            .as_ref()
            .map(|s| s.max_capacity() - s.capacity())
            .unwrap_or(0)
    }

    /// Validates a draft, assigns its response id and enqueues it.
    pub async fn submit(&self, draft: SubmissionDraft) -> Result<ResponseId> {
        let submission = draft.into_submission()?;
        let response_id = submission.response_id;
        self.enqueue(submission).await?;
        Ok(response_id)
    }

    /// Queues the submission without waiting for space, or writes it directly when
    /// the queue is full. Malformed submissions are rejected before either path.
    pub async fn enqueue(&self, submission: Submission) -> Result<EnqueueOutcome> {
        submission.validate()?;

        let sender = self
            .sender
            .read()
            .clone()
            .ok_or(FormFlowError::BufferClosed)?;

        match sender.try_send(submission) {
            Ok(()) => {
                self.stats.record_enqueued();
                counter!("formflow_submissions_enqueued").increment(1);
                self.stats
                    .record_queue_depth(sender.max_capacity() - sender.capacity());
                Ok(EnqueueOutcome::Queued)
            }
            Err(TrySendError::Full(submission)) => {
                warn!(
                    "Ingestion queue full ({} slots), writing submission {} synchronously",
                    self.config.queue_capacity, submission.response_id
                );
                counter!("formflow_submissions_fallback").increment(1);
                self.store.insert_submission(&submission).await?;
                self.stats.record_synchronous_write();
                Ok(EnqueueOutcome::WrittenSynchronously)
            }
            Err(TrySendError::Closed(_)) => Err(FormFlowError::BufferClosed),
        }
    }

    /// Stops accepting submissions and waits until everything already accepted
    /// has been flushed. Later calls return immediately.
    pub async fn close(&self) {
        let sender = self.sender.write().take();
        if sender.is_none() {
            debug!("Ingestion buffer already closed");
        }
        drop(sender);

        let worker = self.worker.lock().await.take();
        if let Some(worker) = worker {
            if let Err(e) = worker.await {
                error!("Ingestion worker ended abnormally: {}", e);
            }
            let stats = self.stats.snapshot();
            info!(
                "Ingestion buffer closed: {} flushed in {} batches, {} written synchronously, {} dropped",
                stats.submissions_flushed,
                stats.batches_flushed,
                stats.written_synchronously,
                stats.submissions_dropped
            );
        }
    }
}

async fn run_consumer(
    mut receiver: Receiver<Submission>,
    writer: BatchWriter,
    stats: Arc<BufferStats>,
    batch_size: usize,
    flush_interval: Duration,
) {
    let mut batch: Vec<Submission> = Vec::with_capacity(batch_size);
    let mut ticker = time::interval_at(Instant::now() + flush_interval, flush_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            received = receiver.recv() => match received {
                Some(submission) => {
                    stats.record_queue_depth(receiver.len());
                    batch.push(submission);
                    if batch.len() >= batch_size {
                        writer.flush(&mut batch).await;
                    }
                }
                None => {
                    // Every sender is gone: flush what is left and stop.
                    stats.record_queue_depth(0);
                    writer.flush(&mut batch).await;
                    break;
                }
            },
            _ = ticker.tick() => {
                if !batch.is_empty() {
                    debug!("Flush interval elapsed with {} pending submissions", batch.len());
                    writer.flush(&mut batch).await;
                }
            }
        }
    }
}
