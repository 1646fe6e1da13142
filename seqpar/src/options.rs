//! Processor configuration.

use seqpar_shared::errors::{SeqparError, SeqparResult};
use serde::{Deserialize, Serialize};

/// Buffer sizes below this still produce correct output but tend to
/// serialize the workers behind the flusher.
pub const RECOMMENDED_MIN_BUFFER_SIZE: usize = 100;

pub const DEFAULT_BUFFER_SIZE: usize = 512;

/// Options for an [`OrderedProcessor`](crate::OrderedProcessor) run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessorOptions {
    /// Number of worker tasks applying the transform concurrently.
    pub workers: usize,
    /// Capacity of each internal queue. Bounds the number of jobs in flight.
    pub buffer_size: usize,
    /// Run each transform call on tokio's blocking pool instead of inline on
    /// the worker task.
    pub blocking_transform: bool,
}

impl Default for ProcessorOptions {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            buffer_size: DEFAULT_BUFFER_SIZE,
            blocking_transform: false,
        }
    }
}

fn default_workers() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

impl ProcessorOptions {
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    pub fn with_buffer_size(mut self, buffer_size: usize) -> Self {
        self.buffer_size = buffer_size;
        self
    }

    pub fn with_blocking_transform(mut self, blocking: bool) -> Self {
        self.blocking_transform = blocking;
        self
    }

    /// Parse options from JSON. Missing fields take their defaults.
    pub fn from_json(json: &str) -> SeqparResult<Self> {
        serde_json::from_str(json)
            .map_err(|e| SeqparError::Config(format!("invalid processor options: {}", e)))
    }

    /// Reject configurations that could never drain.
    ///
    /// With zero workers nothing ever claims a job from the worker queue, and
    /// a zero-capacity queue cannot hold the job the flusher waits on.
    pub fn sanitize(&self) -> SeqparResult<()> {
        if self.workers == 0 {
            return Err(SeqparError::Config(
                "workers must be at least 1".to_string(),
            ));
        }
        if self.buffer_size == 0 {
            return Err(SeqparError::Config(
                "buffer_size must be at least 1".to_string(),
            ));
        }
        if self.buffer_size < RECOMMENDED_MIN_BUFFER_SIZE {
            tracing::warn!(
                buffer_size = self.buffer_size,
                recommended = RECOMMENDED_MIN_BUFFER_SIZE,
                "Small buffer_size limits worker throughput"
            );
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        let options = ProcessorOptions::default();
        assert!(options.workers >= 1);
        assert_eq!(options.buffer_size, DEFAULT_BUFFER_SIZE);
        assert!(options.sanitize().is_ok());
    }

    #[test]
    fn test_zero_workers_rejected() {
        let result = ProcessorOptions::default().with_workers(0).sanitize();
        assert!(matches!(result, Err(SeqparError::Config(_))));
        assert!(result.unwrap_err().to_string().contains("workers"));
    }

    #[test]
    fn test_zero_buffer_rejected() {
        let result = ProcessorOptions::default().with_buffer_size(0).sanitize();
        assert!(matches!(result, Err(SeqparError::Config(_))));
    }

    #[test]
    fn test_small_buffer_accepted() {
        let options = ProcessorOptions::default().with_buffer_size(1);
        assert!(options.sanitize().is_ok());
    }

    #[test]
    fn test_from_json_fills_defaults() {
        let options = ProcessorOptions::from_json(r#"{"workers": 3}"#).unwrap();
        assert_eq!(options.workers, 3);
        assert_eq!(options.buffer_size, DEFAULT_BUFFER_SIZE);
        assert!(!options.blocking_transform);
    }

    #[test]
    fn test_from_json_rejects_garbage() {
        let result = ProcessorOptions::from_json("workers = 3");
        assert!(matches!(result, Err(SeqparError::Config(_))));
    }
}
