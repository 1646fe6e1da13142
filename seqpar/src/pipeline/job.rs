//! Job records tracking one input item through the processor.
//!
//! A job is split at creation into two halves that travel on separate queues:
//!
//! ```text
//! feeder ──► WorkerJob  ──► queue A ──► worker  ── complete() ──┐
//!       └──► PendingJob ──► queue B ──► flusher ◄── wait() ─────┘
//! ```
//!
//! The completion signal is the only link between the halves. The worker
//! half owns the input and writes the output exactly once; the pending half
//! observes that write in queue-B order.

use super::metrics::ProcessorMetricsStorage;
use std::sync::Arc;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;

/// Allocate a job for `input` with sequence number `seq`.
pub(crate) fn split<A, B>(
    seq: u64,
    input: A,
    metrics: Arc<ProcessorMetricsStorage>,
) -> (WorkerJob<A, B>, PendingJob<B>) {
    let (completer, completion) = completion_pair();
    metrics.job_created();
    let worker = WorkerJob {
        seq,
        input,
        completer,
    };
    let pending = PendingJob {
        seq,
        completion,
        _guard: InFlightGuard { metrics },
    };
    (worker, pending)
}

/// Worker-facing half: input plus the write side of the completion signal.
pub(crate) struct WorkerJob<A, B> {
    pub(crate) seq: u64,
    pub(crate) input: A,
    pub(crate) completer: Completer<B>,
}

/// Flusher-facing half: read side of the completion signal.
pub(crate) struct PendingJob<B> {
    pub(crate) seq: u64,
    pub(crate) completion: Completion<B>,
    _guard: InFlightGuard,
}

struct InFlightGuard {
    metrics: Arc<ProcessorMetricsStorage>,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.metrics.job_released();
    }
}

/// Create a connected one-shot completion signal.
pub fn completion_pair<B>() -> (Completer<B>, Completion<B>) {
    let (tx, rx) = oneshot::channel();
    (
        Completer { tx },
        Completion {
            rx: Some(rx),
            value: None,
            fired: false,
        },
    )
}

/// Write side of a completion signal. Firing consumes it.
#[derive(Debug)]
pub struct Completer<B> {
    tx: oneshot::Sender<B>,
}

impl<B> Completer<B> {
    /// Store the output and fire the signal.
    ///
    /// A completion whose observer is already gone is silently discarded.
    pub fn complete(self, output: B) {
        let _ = self.tx.send(output);
    }
}

/// Result of waiting on a [`Completion`].
#[derive(Debug, PartialEq, Eq)]
pub enum WaitOutcome<B> {
    Ready(B),
    /// The token fired before the signal did.
    Cancelled,
    /// The completer was dropped without firing, or the value was already taken.
    Abandoned,
}

/// Read side of a completion signal.
#[derive(Debug)]
pub struct Completion<B> {
    rx: Option<oneshot::Receiver<B>>,
    value: Option<B>,
    fired: bool,
}

impl<B> Completion<B> {
    /// Whether the signal has fired. Keeps returning true once it has,
    /// including after the value was taken by [`wait`](Self::wait).
    ///
    /// Takes `&mut self` because observing a fired signal moves the value
    /// out of the one-shot receiver into this completion, where a later
    /// `wait` picks it up.
    pub fn is_fired(&mut self) -> bool {
        if self.fired {
            return true;
        }
        if let Some(rx) = self.rx.as_mut()
            && let Ok(value) = rx.try_recv()
        {
            self.value = Some(value);
            self.fired = true;
            self.rx = None;
        }
        self.fired
    }

    /// Wait until the signal fires or `token` is cancelled.
    pub async fn wait(&mut self, token: &CancellationToken) -> WaitOutcome<B> {
        if let Some(value) = self.value.take() {
            return WaitOutcome::Ready(value);
        }
        let Some(rx) = self.rx.as_mut() else {
            return WaitOutcome::Abandoned;
        };

        let received = tokio::select! {
            biased;
            _ = token.cancelled() => return WaitOutcome::Cancelled,
            received = rx => received,
        };
        self.rx = None;
        match received {
            Ok(value) => {
                self.fired = true;
                WaitOutcome::Ready(value)
            }
            Err(_) => WaitOutcome::Abandoned,
        }
    }
}
