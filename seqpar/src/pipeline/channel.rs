//! Source and sink seams for the processor.
//!
//! The processor never owns the caller's channels beyond draining the source
//! and feeding the sink. Any queue-like type can take part by implementing
//! [`ItemSource`] or [`ItemSink`].

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// A closable producer of items.
///
/// `recv` resolves to `None` once the owner has closed the source and every
/// buffered item has been handed out.
#[async_trait]
pub trait ItemSource: Send {
    type Item: Send;

    async fn recv(&mut self) -> Option<Self::Item>;
}

/// A consumer accepting one item at a time, in order.
///
/// `send` gives the item back when the receiving side has gone away.
#[async_trait]
pub trait ItemSink: Send {
    type Item: Send;

    async fn send(&mut self, item: Self::Item) -> Result<(), Self::Item>;
}

#[async_trait]
impl<T: Send> ItemSource for mpsc::Receiver<T> {
    type Item = T;

    async fn recv(&mut self) -> Option<T> {
        mpsc::Receiver::recv(self).await
    }
}

#[async_trait]
impl<T: Send> ItemSource for mpsc::UnboundedReceiver<T> {
    type Item = T;

    async fn recv(&mut self) -> Option<T> {
        mpsc::UnboundedReceiver::recv(self).await
    }
}

#[async_trait]
impl<T: Send> ItemSource for flume::Receiver<T> {
    type Item = T;

    async fn recv(&mut self) -> Option<T> {
        self.recv_async().await.ok()
    }
}

#[async_trait]
impl<T: Send> ItemSink for mpsc::Sender<T> {
    type Item = T;

    async fn send(&mut self, item: T) -> Result<(), T> {
        mpsc::Sender::send(self, item).await.map_err(|e| e.0)
    }
}

#[async_trait]
impl<T: Send> ItemSink for mpsc::UnboundedSender<T> {
    type Item = T;

    async fn send(&mut self, item: T) -> Result<(), T> {
        mpsc::UnboundedSender::send(self, item).map_err(|e| e.0)
    }
}

#[async_trait]
impl<T: Send> ItemSink for flume::Sender<T> {
    type Item = T;

    async fn send(&mut self, item: T) -> Result<(), T> {
        self.send_async(item).await.map_err(|e| e.into_inner())
    }
}

/// How a cancellable send ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    Sent,
    Cancelled,
    /// The receiving side is gone; the item was dropped.
    Closed,
}

/// Send `item`, abandoning the send as soon as `token` fires.
pub async fn send_cancellable<K>(
    sink: &mut K,
    item: K::Item,
    token: &CancellationToken,
) -> SendOutcome
where
    K: ItemSink + ?Sized,
{
    if token.is_cancelled() {
        return SendOutcome::Cancelled;
    }
    tokio::select! {
        biased;
        _ = token.cancelled() => SendOutcome::Cancelled,
        sent = sink.send(item) => match sent {
            Ok(()) => SendOutcome::Sent,
            Err(_) => SendOutcome::Closed,
        },
    }
}
