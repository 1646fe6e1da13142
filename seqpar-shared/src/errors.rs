//! Error taxonomy for ordered parallel processing.
//!
//! The taxonomy is narrow on purpose: a run either drains its input and output
//! completely, or it reports the one condition that stopped it.

use thiserror::Error;

/// Result alias used across seqpar crates.
pub type SeqparResult<T> = Result<T, SeqparError>;

#[derive(Debug, Error)]
pub enum SeqparError {
    /// Invalid processor or logging configuration, rejected before any task starts.
    #[error("configuration error: {0}")]
    Config(String),

    /// The caller's cancellation token fired before input and output were drained.
    #[error("processing cancelled before input and output were fully drained")]
    Cancelled,

    /// A transform call panicked on a worker task.
    #[error("worker panicked: {0}")]
    WorkerPanicked(String),

    /// The output consumer went away before every result was forwarded.
    #[error("output sink closed before all results were forwarded")]
    SinkClosed,

    #[error("internal error: {0}")]
    Internal(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl SeqparError {
    /// True when the run stopped because the caller asked it to.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, SeqparError::Cancelled)
    }
}
