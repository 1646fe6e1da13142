//! Ordered parallel processor.
//!
//! One feeder, N workers and one flusher run as tokio tasks around two bounded
//! queues that receive the halves of every job in the same order:
//!
//! ```text
//!             ┌──► queue A (flume, multi-consumer) ──► worker × N ─┐
//! source ─► feeder                                         complete()
//!             └──► queue B (mpsc, single consumer) ──► flusher ◄───┘ ─► sink
//! ```
//!
//! Workers consume queue A in whatever order they win it. The flusher consumes
//! queue B strictly in insertion order and waits on each job's completion
//! signal before forwarding its output, which is what keeps output ordered.

use super::channel::{ItemSink, ItemSource, SendOutcome, send_cancellable};
use super::iter::ChanIterator;
use super::job::{self, PendingJob, WaitOutcome, WorkerJob};
use super::metrics::{ProcessMetrics, ProcessorMetricsStorage};
use crate::options::ProcessorOptions;
use parking_lot::Mutex;
use seqpar_shared::errors::{SeqparError, SeqparResult};
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc;
use tokio::task::{JoinError, JoinSet};
use tokio_util::sync::CancellationToken;

/// Shared, concurrently callable transform.
pub type Transform<A, B> = Arc<dyn Fn(A) -> B + Send + Sync>;

/// How each task finished when it did not fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TaskExit {
    /// `drained` is true when the source closed normally.
    Feeder { drained: bool },
    Worker,
    /// `drained` is true when queue B closed normally.
    Flusher { drained: bool },
}

/// Applies a transform to every item of a source on a bounded pool of
/// workers, forwarding results to a sink in input order.
///
/// The processor is reusable: each [`process`](Self::process) call is an
/// independent run with its own queues and metrics.
pub struct OrderedProcessor<A, B> {
    options: ProcessorOptions,
    transform: Transform<A, B>,
    current: Mutex<Arc<ProcessorMetricsStorage>>,
}

impl<A, B> OrderedProcessor<A, B>
where
    A: Send + 'static,
    B: Send + 'static,
{
    /// Create a processor, rejecting options that could never drain.
    pub fn new<F>(options: ProcessorOptions, transform: F) -> SeqparResult<Self>
    where
        F: Fn(A) -> B + Send + Sync + 'static,
    {
        options.sanitize()?;
        Ok(Self {
            options,
            transform: Arc::new(transform),
            current: Mutex::new(Arc::new(ProcessorMetricsStorage::new())),
        })
    }

    pub fn options(&self) -> &ProcessorOptions {
        &self.options
    }

    /// Live metrics of the most recent run.
    pub fn metrics(&self) -> ProcessMetrics {
        self.current.lock().snapshot(0)
    }

    /// Drain `source` through the workers into `sink`, preserving order.
    ///
    /// Returns metrics only when the source closed and every result reached
    /// the sink. Otherwise reports the condition that stopped the run:
    /// [`SeqparError::Cancelled`] when `token` fired,
    /// [`SeqparError::WorkerPanicked`] when the transform panicked, or
    /// [`SeqparError::SinkClosed`] when the output consumer went away.
    ///
    /// `sink` is dropped when the run ends. Dropping the returned future
    /// aborts every task of the run.
    pub async fn process<S, K>(
        &self,
        source: S,
        sink: K,
        token: &CancellationToken,
    ) -> SeqparResult<ProcessMetrics>
    where
        S: ItemSource<Item = A> + 'static,
        K: ItemSink<Item = B> + 'static,
    {
        let start = Instant::now();
        let metrics = Arc::new(ProcessorMetricsStorage::new());
        *self.current.lock() = Arc::clone(&metrics);

        let ProcessorOptions {
            workers,
            buffer_size,
            blocking_transform,
        } = self.options;

        tracing::debug!(
            workers,
            buffer_size,
            blocking_transform,
            "Starting ordered processor"
        );

        // Fatal conditions cancel the run without touching the caller's token.
        let run_token = token.child_token();
        let (work_tx, work_rx) = flume::bounded::<WorkerJob<A, B>>(buffer_size);
        let (order_tx, order_rx) = mpsc::channel::<PendingJob<B>>(buffer_size);

        let mut tasks = JoinSet::new();
        for worker_id in 0..workers {
            tasks.spawn(run_worker(
                worker_id,
                work_rx.clone(),
                Arc::clone(&self.transform),
                blocking_transform,
                run_token.clone(),
                Arc::clone(&metrics),
            ));
        }
        drop(work_rx);
        tasks.spawn(run_feeder(
            source,
            work_tx,
            order_tx,
            run_token.clone(),
            Arc::clone(&metrics),
        ));
        tasks.spawn(run_flusher(
            order_rx,
            sink,
            run_token.clone(),
            Arc::clone(&metrics),
        ));

        let mut input_drained = false;
        let mut output_drained = false;
        let mut failure: Option<SeqparError> = None;

        while let Some(joined) = tasks.join_next().await {
            let exit = match joined {
                Ok(exit) => exit,
                Err(e) => Err(join_error(e)),
            };
            match exit {
                Ok(TaskExit::Feeder { drained }) => input_drained = drained,
                Ok(TaskExit::Flusher { drained }) => output_drained = drained,
                Ok(TaskExit::Worker) => {}
                Err(e) => {
                    run_token.cancel();
                    if failure.is_none() {
                        failure = Some(e);
                    }
                }
            }
        }

        let elapsed_ms = start.elapsed().as_millis();
        if let Some(err) = failure {
            tracing::warn!(error = %err, elapsed_ms, "Ordered processor failed");
            return Err(err);
        }
        if input_drained && output_drained {
            let snapshot = metrics.snapshot(elapsed_ms);
            tracing::debug!(
                jobs = snapshot.jobs_flushed,
                peak_in_flight = snapshot.peak_in_flight,
                elapsed_ms,
                "Ordered processor drained"
            );
            return Ok(snapshot);
        }
        if token.is_cancelled() {
            tracing::debug!(
                input_drained,
                output_drained,
                elapsed_ms,
                "Ordered processor cancelled"
            );
            return Err(SeqparError::Cancelled);
        }
        Err(SeqparError::Internal(format!(
            "processor stopped early (input_drained={}, output_drained={})",
            input_drained, output_drained
        )))
    }

    /// Run every item of `items` through the processor and collect the
    /// results in input order.
    pub async fn map_all<I>(&self, items: I, token: &CancellationToken) -> SeqparResult<Vec<B>>
    where
        I: IntoIterator<Item = A>,
    {
        let (in_tx, in_rx) = mpsc::unbounded_channel();
        for item in items {
            in_tx
                .send(item)
                .map_err(|_| SeqparError::Internal("input queue closed".into()))?;
        }
        drop(in_tx);

        let (out_tx, mut out_rx) = mpsc::unbounded_channel();
        self.process(in_rx, out_tx, token).await?;

        let mut results = Vec::new();
        while let Some(result) = out_rx.recv().await {
            results.push(result);
        }
        Ok(results)
    }
}

/// One-shot form of [`OrderedProcessor::process`].
pub async fn process<A, B, S, K, F>(
    source: S,
    sink: K,
    transform: F,
    workers: usize,
    buffer_size: usize,
    token: &CancellationToken,
) -> SeqparResult<ProcessMetrics>
where
    A: Send + 'static,
    B: Send + 'static,
    S: ItemSource<Item = A> + 'static,
    K: ItemSink<Item = B> + 'static,
    F: Fn(A) -> B + Send + Sync + 'static,
{
    let options = ProcessorOptions::default()
        .with_workers(workers)
        .with_buffer_size(buffer_size);
    OrderedProcessor::new(options, transform)?
        .process(source, sink, token)
        .await
}

/// Pull items from the source and hand each job to queue A, then queue B.
async fn run_feeder<S, A, B>(
    source: S,
    mut work_tx: flume::Sender<WorkerJob<A, B>>,
    mut order_tx: mpsc::Sender<PendingJob<B>>,
    token: CancellationToken,
    metrics: Arc<ProcessorMetricsStorage>,
) -> SeqparResult<TaskExit>
where
    S: ItemSource<Item = A>,
    A: Send,
    B: Send,
{
    let mut it = ChanIterator::new(source);
    let mut seq = 0u64;

    while let Some(input) = it.next(&token).await {
        let (work, pending) = job::split(seq, input, Arc::clone(&metrics));
        seq += 1;

        // Queue A first: workers never wait on the flusher, but the flusher
        // waits on workers, so a job must be claimable before it is awaited.
        if send_cancellable(&mut work_tx, work, &token).await != SendOutcome::Sent {
            return Ok(TaskExit::Feeder { drained: false });
        }
        if send_cancellable(&mut order_tx, pending, &token).await != SendOutcome::Sent {
            return Ok(TaskExit::Feeder { drained: false });
        }
    }

    let drained = it.closed();
    tracing::debug!(jobs = seq, drained, "Feeder finished");
    Ok(TaskExit::Feeder { drained })
}

/// Claim jobs from queue A, apply the transform and fire each completion.
async fn run_worker<A, B>(
    worker_id: usize,
    queue: flume::Receiver<WorkerJob<A, B>>,
    transform: Transform<A, B>,
    blocking: bool,
    token: CancellationToken,
    metrics: Arc<ProcessorMetricsStorage>,
) -> SeqparResult<TaskExit>
where
    A: Send + 'static,
    B: Send + 'static,
{
    let mut it = ChanIterator::new(queue);

    while let Some(job) = it.next(&token).await {
        let WorkerJob {
            seq,
            input,
            completer,
        } = job;

        let output = if blocking {
            let transform = Arc::clone(&transform);
            let handle = tokio::task::spawn_blocking(move || transform(input));
            tokio::select! {
                biased;
                _ = token.cancelled() => break,
                joined = handle => joined.map_err(|e| {
                    if e.is_panic() {
                        panic_message(e.into_panic())
                    } else {
                        e.to_string()
                    }
                }),
            }
        } else {
            std::panic::catch_unwind(AssertUnwindSafe(|| transform(input)))
                .map_err(panic_message)
        };

        match output {
            Ok(output) => {
                metrics.job_completed();
                completer.complete(output);
                tracing::trace!(worker_id, seq, "Job completed");
            }
            Err(message) => {
                token.cancel();
                tracing::error!(worker_id, seq, %message, "Transform panicked");
                return Err(SeqparError::WorkerPanicked(format!(
                    "job {}: {}",
                    seq, message
                )));
            }
        }
    }

    tracing::debug!(worker_id, "Worker finished");
    Ok(TaskExit::Worker)
}

/// Release outputs to the sink in queue-B order.
async fn run_flusher<K, B>(
    queue: mpsc::Receiver<PendingJob<B>>,
    mut sink: K,
    token: CancellationToken,
    metrics: Arc<ProcessorMetricsStorage>,
) -> SeqparResult<TaskExit>
where
    K: ItemSink<Item = B>,
    B: Send,
{
    let mut it = ChanIterator::new(queue);

    while let Some(mut job) = it.next(&token).await {
        let output = match job.completion.wait(&token).await {
            WaitOutcome::Ready(output) => output,
            WaitOutcome::Cancelled => return Ok(TaskExit::Flusher { drained: false }),
            WaitOutcome::Abandoned => {
                // Only a failed worker drops a completer; it reports the cause.
                tracing::debug!(seq = job.seq, "Job abandoned, stopping flusher");
                token.cancel();
                return Ok(TaskExit::Flusher { drained: false });
            }
        };

        match send_cancellable(&mut sink, output, &token).await {
            SendOutcome::Sent => {
                metrics.job_flushed();
                tracing::trace!(seq = job.seq, "Job flushed");
            }
            SendOutcome::Cancelled => return Ok(TaskExit::Flusher { drained: false }),
            SendOutcome::Closed => {
                token.cancel();
                return Err(SeqparError::SinkClosed);
            }
        }
    }

    let drained = it.closed();
    tracing::debug!(drained, "Flusher finished");
    Ok(TaskExit::Flusher { drained })
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&'static str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

fn join_error(err: JoinError) -> SeqparError {
    if err.is_panic() {
        SeqparError::WorkerPanicked(panic_message(err.into_panic()))
    } else {
        SeqparError::Internal(format!("processor task failed: {}", err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn options(workers: usize, buffer_size: usize) -> ProcessorOptions {
        ProcessorOptions::default()
            .with_workers(workers)
            .with_buffer_size(buffer_size)
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_squares_in_input_order() {
        let processor = OrderedProcessor::new(options(4, 16), |x: u64| {
            // Earlier items take longer so completion order is reversed.
            std::thread::sleep(Duration::from_millis((6 - x) * 10));
            x * x
        })
        .unwrap();

        let results = processor
            .map_all(vec![1, 2, 3, 4, 5], &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(results, vec![1, 4, 9, 16, 25]);
    }

    #[tokio::test]
    async fn test_zero_workers_rejected() {
        let result = OrderedProcessor::new(options(0, 16), |x: u8| x);
        assert!(matches!(result, Err(SeqparError::Config(_))));
    }

    #[tokio::test]
    async fn test_metrics_after_drain() {
        let processor = OrderedProcessor::new(options(2, 8), |x: u32| x + 1).unwrap();
        let (in_tx, in_rx) = mpsc::channel(8);
        let (out_tx, mut out_rx) = mpsc::channel(8);

        let producer = tokio::spawn(async move {
            for i in 0..20 {
                in_tx.send(i).await.unwrap();
            }
        });
        let consumer = tokio::spawn(async move {
            let mut seen = Vec::new();
            while let Some(v) = out_rx.recv().await {
                seen.push(v);
            }
            seen
        });

        let metrics = processor
            .process(in_rx, out_tx, &CancellationToken::new())
            .await
            .unwrap();
        producer.await.unwrap();
        let seen = consumer.await.unwrap();

        assert_eq!(seen, (1..=20).collect::<Vec<_>>());
        assert_eq!(metrics.jobs_created, 20);
        assert_eq!(metrics.jobs_completed, 20);
        assert_eq!(metrics.jobs_flushed, 20);
        assert_eq!(metrics.in_flight, 0);
        assert_eq!(processor.metrics().jobs_flushed, 20);
    }

    #[tokio::test]
    async fn test_panicking_transform_reported() {
        let processor = OrderedProcessor::new(options(3, 8), |x: u32| {
            if x == 7 {
                panic!("cannot handle seven");
            }
            x
        })
        .unwrap();

        let token = CancellationToken::new();
        let result = processor.map_all(0..100, &token).await;

        match result {
            Err(SeqparError::WorkerPanicked(message)) => {
                assert!(message.contains("cannot handle seven"));
            }
            other => panic!("expected worker panic, got {:?}", other.map(|v| v.len())),
        }
        assert!(!token.is_cancelled());
    }

    #[tokio::test]
    async fn test_blocking_transform_panic_reported() {
        let processor = OrderedProcessor::new(
            options(2, 8).with_blocking_transform(true),
            |x: u32| {
                if x == 3 {
                    panic!("blocking failure");
                }
                x
            },
        )
        .unwrap();

        let result = processor.map_all(0..10, &CancellationToken::new()).await;
        assert!(matches!(result, Err(SeqparError::WorkerPanicked(_))));
    }

    #[tokio::test]
    async fn test_sink_closed_reported() {
        let processor = OrderedProcessor::new(options(2, 8), |x: u32| x).unwrap();
        let (in_tx, in_rx) = mpsc::unbounded_channel();
        for i in 0..10 {
            in_tx.send(i).unwrap();
        }
        drop(in_tx);
        let (out_tx, out_rx) = mpsc::channel::<u32>(1);
        drop(out_rx);

        let result = processor
            .process(in_rx, out_tx, &CancellationToken::new())
            .await;
        assert!(matches!(result, Err(SeqparError::SinkClosed)));
    }

    #[tokio::test]
    async fn test_processor_is_reusable() {
        let processor = OrderedProcessor::new(options(2, 4), |s: String| s.len()).unwrap();
        let token = CancellationToken::new();

        let first = processor
            .map_all(vec!["a".to_string(), "bb".to_string()], &token)
            .await
            .unwrap();
        let second = processor
            .map_all(vec!["ccc".to_string()], &token)
            .await
            .unwrap();

        assert_eq!(first, vec![1, 2]);
        assert_eq!(second, vec![3]);
        assert_eq!(processor.metrics().jobs_flushed, 1);
    }

    #[test]
    fn test_panic_message_payloads() {
        assert_eq!(panic_message(Box::new("static")), "static");
        assert_eq!(panic_message(Box::new(String::from("owned"))), "owned");
        assert_eq!(panic_message(Box::new(5u8)), "non-string panic payload");
    }
}
