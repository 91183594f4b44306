//! Error types shared by both benchmarks.
//!
//! Every variant is terminal: nothing in the crate retries. The binaries
//! print the error to stderr and exit non-zero.

use thiserror::Error;

/// Errors that abort a benchmark run
#[derive(Debug, Error)]
pub enum BenchError {
    /// A telemetry line failed to parse or a required field had the wrong type
    #[error("bad record at index {index}: {reason}")]
    InvalidRecord { index: u64, reason: String },

    /// A worker process or task reported failure
    #[error("worker {ordinal} failed: {reason}")]
    WorkerFailed { ordinal: usize, reason: String },

    /// A worker task panicked
    #[error("worker {ordinal} panicked")]
    WorkerPanicked { ordinal: usize },

    #[error("failed to build thread pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),

    #[error("failed to start async runtime: {0}")]
    Runtime(#[source] std::io::Error),

    #[error("failed to spawn worker process: {0}")]
    Spawn(#[source] std::io::Error),

    #[error("failed to encode result: {0}")]
    Encode(#[source] serde_json::Error),

    /// The `shard` run mode received a payload it could not decode
    #[error("invalid shard task: {0}")]
    InvalidTask(#[source] serde_json::Error),
}

/// Result type for benchmark operations
pub type Result<T> = std::result::Result<T, BenchError>;
