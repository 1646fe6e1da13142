//! seqpar: order-preserving parallel processing on tokio.
//!
//! Feed items through a bounded pool of workers and receive the results in
//! the order the items arrived, with backpressure from a slow consumer and a
//! single cancellation token for the whole run.

pub mod logging;
pub mod options;
pub mod pipeline;

pub use logging::{LoggingOptions, init_logging};
pub use options::ProcessorOptions;
pub use pipeline::{
    ChanIterator, ItemSink, ItemSource, OrderedProcessor, ProcessMetrics, Transform, process,
};
pub use seqpar_shared::errors::{SeqparError, SeqparResult};
pub use tokio_util::sync::CancellationToken;
