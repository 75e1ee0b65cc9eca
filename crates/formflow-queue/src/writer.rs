use std::sync::Arc;
use std::time::Instant;

use metrics::{counter, histogram};
use tracing::{error, info};

use formflow_core::{Submission, SubmissionStore};

use crate::stats::BufferStats;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushOutcome {
    Empty,
    Written(usize),
    /// The store rejected the batch; nothing from it was kept.
    Dropped(usize),
}

/// Hands accumulated batches to the store as one transaction each.
#[derive(Clone)]
pub struct BatchWriter {
    store: Arc<dyn SubmissionStore>,
    stats: Arc<BufferStats>,
}

impl BatchWriter {
    pub fn new(store: Arc<dyn SubmissionStore>, stats: Arc<BufferStats>) -> Self {
        Self { store, stats }
    }

    /// Writes `batch` and clears it once the store has answered, whatever the answer.
    pub async fn flush(&self, batch: &mut Vec<Submission>) -> FlushOutcome {
        if batch.is_empty() {
            return FlushOutcome::Empty;
        }

        let size = batch.len();
        let start = Instant::now();
        let result = self.store.insert_submission_batch(batch).await;
        histogram!("formflow_batch_flush_seconds").record(start.elapsed());
        histogram!("formflow_batch_size").record(size as f64);

        let outcome = match result {
            Ok(()) => {
                counter!("formflow_batches_flushed").increment(1);
                self.stats.record_flush(size);
                info!("Flushed batch of {} submissions", size);
                FlushOutcome::Written(size)
            }
            Err(e) => {
                counter!("formflow_batches_failed").increment(1);
                counter!("formflow_submissions_dropped").increment(size as u64);
                self.stats.record_failure(size);
                let ids: Vec<String> = batch.iter().map(|s| s.response_id.to_string()).collect();
                error!(
                    "Dropping batch of {} submissions after write failure: {} (response ids: {})",
                    size,
                    e,
                    ids.join(", ")
                );
                FlushOutcome::Dropped(size)
            }
        };

        batch.clear();
        outcome
    }
}
