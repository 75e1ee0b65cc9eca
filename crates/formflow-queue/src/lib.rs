pub mod buffer;
pub mod stats;
pub mod writer;

pub use buffer::{BufferConfig, EnqueueOutcome, IngestionBuffer};
pub use stats::{BufferStats, BufferStatsSnapshot};
pub use writer::{BatchWriter, FlushOutcome};
