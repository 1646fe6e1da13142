//! seqpar-digest: SHA-256 of every input line, computed in parallel and
//! printed in input order.

use anyhow::Context;
use clap::Parser;
use seqpar::{
    CancellationToken, LoggingOptions, OrderedProcessor, ProcessorOptions, SeqparError,
    init_logging,
};
use sha2::{Digest, Sha256};
use std::io::BufRead;
use std::path::PathBuf;
use tokio::io::{AsyncWriteExt, BufWriter};
use tokio::sync::{mpsc, oneshot};

/// Exit status after an interrupted run (128 + SIGINT).
const EXIT_INTERRUPTED: i32 = 130;

#[derive(Parser, Debug)]
#[command(
    name = "seqpar-digest",
    version,
    about = "Hash input lines in parallel, preserving input order"
)]
struct Args {
    /// Read lines from this file instead of stdin
    #[arg(long)]
    input: Option<PathBuf>,

    /// JSON file with processor options
    #[arg(long)]
    config: Option<PathBuf>,

    /// Number of hashing workers (overrides config)
    #[arg(long)]
    workers: Option<usize>,

    /// Internal queue capacity (overrides config)
    #[arg(long)]
    buffer_size: Option<usize>,

    /// Write logs to a daily-rolled file in this directory instead of stderr
    #[arg(long)]
    log_dir: Option<PathBuf>,
}

fn digest_line(line: String) -> String {
    let digest = Sha256::digest(line.as_bytes());
    format!("{}  {}", hex::encode(digest), line)
}

async fn load_options(args: &Args) -> anyhow::Result<ProcessorOptions> {
    let mut options = match &args.config {
        Some(path) => {
            let json = tokio::fs::read_to_string(path)
                .await
                .with_context(|| format!("failed to read config {}", path.display()))?;
            ProcessorOptions::from_json(&json)?
        }
        None => ProcessorOptions::default(),
    };
    if let Some(workers) = args.workers {
        options = options.with_workers(workers);
    }
    if let Some(buffer_size) = args.buffer_size {
        options = options.with_buffer_size(buffer_size);
    }
    Ok(options)
}

fn open_input(input: Option<&PathBuf>) -> anyhow::Result<Box<dyn BufRead + Send>> {
    match input {
        Some(path) => {
            let file = std::fs::File::open(path)
                .with_context(|| format!("failed to open {}", path.display()))?;
            Ok(Box::new(std::io::BufReader::new(file)))
        }
        None => Ok(Box::new(std::io::BufReader::new(std::io::stdin()))),
    }
}

/// Feed input lines into `line_tx` from a dedicated thread.
///
/// A read parked on tokio's blocking pool keeps the runtime alive until it
/// returns, so an interrupted run would wait for the next line or EOF. A
/// plain thread is left behind at exit instead. The read result is reported
/// on the returned channel once the input ends.
fn spawn_reader(
    input: Box<dyn BufRead + Send>,
    line_tx: mpsc::Sender<String>,
    token: CancellationToken,
) -> std::io::Result<oneshot::Receiver<std::io::Result<()>>> {
    let (done_tx, done_rx) = oneshot::channel();
    std::thread::Builder::new()
        .name("seqpar-digest-reader".to_string())
        .spawn(move || {
            let mut result = Ok(());
            for line in input.lines() {
                if token.is_cancelled() {
                    break;
                }
                match line {
                    Ok(line) => {
                        if line_tx.blocking_send(line).is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        result = Err(e);
                        break;
                    }
                }
            }
            let _ = done_tx.send(result);
        })?;
    Ok(done_rx)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let _log_guard = init_logging(&LoggingOptions {
        log_dir: args.log_dir.clone(),
        ..Default::default()
    })?;

    let options = load_options(&args).await?;
    let buffer_size = options.buffer_size;
    let processor = OrderedProcessor::new(options, digest_line)?;

    let token = CancellationToken::new();
    let interrupt = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Interrupted, cancelling");
            interrupt.cancel();
        }
    });

    let (line_tx, line_rx) = mpsc::channel::<String>(buffer_size);
    let (out_tx, mut out_rx) = mpsc::channel::<String>(buffer_size);

    let input = open_input(args.input.as_ref())?;
    let reader = spawn_reader(input, line_tx, token.clone())?;

    let writer = tokio::spawn(async move {
        let mut stdout = BufWriter::new(tokio::io::stdout());
        while let Some(line) = out_rx.recv().await {
            stdout.write_all(line.as_bytes()).await?;
            stdout.write_all(b"\n").await?;
        }
        stdout.flush().await?;
        Ok::<(), std::io::Error>(())
    });

    let result = processor.process(line_rx, out_tx, &token).await;
    // Stop the reader at its next line when the run ended before the input did.
    token.cancel();

    writer
        .await
        .context("writer task failed")?
        .context("failed to write output")?;

    match result {
        Ok(metrics) => {
            // The source closed, so the reader has already reported.
            reader
                .await
                .context("reader thread exited without reporting")?
                .context("failed to read input")?;
            tracing::info!(
                lines = metrics.jobs_flushed,
                elapsed_ms = metrics.total_duration_ms,
                "Digest complete"
            );
            Ok(())
        }
        Err(SeqparError::Cancelled) => std::process::exit(EXIT_INTERRUPTED),
        Err(e) => Err(e.into()),
    }
}
