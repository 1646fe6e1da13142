//! Cancellation-aware iteration over an [`ItemSource`].

use super::channel::ItemSource;
use futures::Stream;
use tokio_util::sync::CancellationToken;

/// Pull-based adapter that drains a source until it closes or a token fires.
///
/// Records which of the two ended iteration: [`closed`](Self::closed) is true
/// only after the source itself reported closure. Single consumer per instance.
pub struct ChanIterator<S> {
    source: S,
    closed: bool,
}

impl<S> ChanIterator<S> {
    pub fn new(source: S) -> Self {
        Self {
            source,
            closed: false,
        }
    }

    /// Whether the source was drained to closure.
    ///
    /// Stays false when iteration stopped because of cancellation or because
    /// the consumer stopped pulling.
    pub fn closed(&self) -> bool {
        self.closed
    }

    pub fn into_inner(self) -> S {
        self.source
    }

    /// Pull the next item.
    ///
    /// Returns `None` when the source is closed or `token` is cancelled,
    /// whichever is observed first. Cancellation wins a tie.
    pub async fn next(&mut self, token: &CancellationToken) -> Option<S::Item>
    where
        S: ItemSource,
    {
        if self.closed || token.is_cancelled() {
            return None;
        }

        let item = tokio::select! {
            biased;
            _ = token.cancelled() => return None,
            item = self.source.recv() => item,
        };
        if item.is_none() {
            self.closed = true;
        }
        item
    }

    /// Lazy stream view over [`next`](Self::next).
    ///
    /// Dropping the stream early leaves the source undrained and
    /// [`closed`](Self::closed) false. The iterator can be streamed again.
    pub fn iterate<'a>(
        &'a mut self,
        token: &'a CancellationToken,
    ) -> impl Stream<Item = S::Item> + 'a
    where
        S: ItemSource,
    {
        let this = self;
        async_stream::stream! {
            while let Some(item) = this.next(token).await {
                yield item;
            }
        }
    }
}
