//! Order-preserving parallel processing.
//!
//! This module provides the processing pipeline and its building blocks:
//! - Cancellation-aware iteration over any closable source
//! - One-shot completion signals linking a job's worker and flusher halves
//! - A processor that fans jobs out to workers and fans results back in
//!   input order
//!
//! ## Architecture
//!
//! ```text
//! source → feeder → (queue A → workers) + (queue B → flusher) → sink
//!
//! - Feeder: wraps each item in a job, pushes it to queue A then queue B
//! - Workers: apply the transform to jobs from queue A, fire completion
//! - Flusher: awaits jobs from queue B in order, forwards their outputs
//! ```
//!
//! Every blocking point races the run's cancellation token, so a single
//! cancellation stops all tasks within one blocking cycle.
//!
//! ## Example
//!
//! ```ignore
//! use seqpar::{OrderedProcessor, ProcessorOptions};
//! use tokio::sync::mpsc;
//! use tokio_util::sync::CancellationToken;
//!
//! let options = ProcessorOptions::default().with_workers(8);
//! let processor = OrderedProcessor::new(options, |x: u64| x * x)?;
//!
//! let (in_tx, in_rx) = mpsc::channel(512);
//! let (out_tx, mut out_rx) = mpsc::channel(512);
//! let token = CancellationToken::new();
//! let metrics = processor.process(in_rx, out_tx, &token).await?;
//! println!("flushed {} jobs", metrics.jobs_flushed);
//! ```

mod channel;
mod iter;
mod job;
mod metrics;
mod processor;

pub use channel::{ItemSink, ItemSource, SendOutcome, send_cancellable};
pub use iter::ChanIterator;
pub use job::{Completer, Completion, WaitOutcome, completion_pair};
pub use metrics::{ProcessMetrics, ProcessorMetricsStorage};
pub use processor::{OrderedProcessor, Transform, process};
