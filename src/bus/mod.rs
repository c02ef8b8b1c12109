//! The topic-based message bus is an external collaborator, run and operated
//! outside this crate: this module defines only the interface consumed from it
//! — publish, subscribe, request/reply with a reply-count of one — plus
//! two concrete backends: [`memory::InMemoryBus`] for tests/single-process
//! dev, and [`nats::NatsBus`] for a real deployment. Both implement the
//! same [`Bus`] trait, the same shape `zhubby-moltis`'s gateway takes with
//! its `Arc<dyn MessageCoordinator>` for cross-instance communication.

pub mod memory;
pub mod messages;
#[cfg(feature = "nats")]
pub mod nats;

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;
use tokio::sync::mpsc;

#[derive(Debug, Error)]
pub enum BusError {
    #[error("bus subscription closed")]
    Closed,
    #[error("request timed out waiting for a reply")]
    Timeout,
    #[error("bus backend error: {0}")]
    Backend(String),
}

/// One delivery on a subscription. `reply` is set when the publisher is
/// awaiting a response via [`Bus::request`] (used for `rooms.<publicUrl>`).
#[derive(Debug, Clone)]
pub struct BusMessage {
    pub subject: String,
    pub payload: Bytes,
    pub reply: Option<String>,
}

pub struct BusSubscription {
    subject: String,
    receiver: mpsc::UnboundedReceiver<BusMessage>,
}

impl BusSubscription {
    pub fn new(subject: String, receiver: mpsc::UnboundedReceiver<BusMessage>) -> Self {
        Self { subject, receiver }
    }

    pub fn subject(&self) -> &str {
        &self.subject
    }

    pub async fn recv(&mut self) -> Option<BusMessage> {
        self.receiver.recv().await
    }

    /// Adapts this subscription into a `Stream`, for bridging into an
    /// actix actor via `Context::add_stream`.
    pub fn into_stream(self) -> impl futures::Stream<Item = BusMessage> {
        futures::stream::unfold(self.receiver, |mut rx| async move {
            rx.recv().await.map(|msg| (msg, rx))
        })
    }
}

#[async_trait]
pub trait Bus: Send + Sync {
    async fn publish(&self, subject: &str, payload: Bytes) -> Result<(), BusError>;
    async fn subscribe(&self, subject: &str) -> Result<BusSubscription, BusError>;
    async fn request(&self, subject: &str, payload: Bytes, timeout: Duration) -> Result<Bytes, BusError>;
}

/// A single-consumer publish queue, so a synchronous actix actor context
/// can fire bus publishes without blocking, while still preserving FIFO
/// order per publisher.
#[derive(Clone)]
pub struct BusPublisher {
    tx: mpsc::UnboundedSender<(String, Bytes)>,
}

impl BusPublisher {
    pub fn spawn(bus: std::sync::Arc<dyn Bus>) -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<(String, Bytes)>();
        tokio::spawn(async move {
            while let Some((subject, payload)) = rx.recv().await {
                if let Err(err) = bus.publish(&subject, payload).await {
                    tracing::warn!(%subject, error = %err, "bus publish failed");
                }
            }
        });
        Self { tx }
    }

    /// Best-effort, fire-and-forget publish: pings, `rs.event`, `rs.stop`
    /// and broadcasts never wait on a reply.
    pub fn publish(&self, subject: impl Into<String>, payload: Bytes) {
        if self.tx.send((subject.into(), payload)).is_err() {
            tracing::warn!("bus publisher task is gone; dropping message");
        }
    }

    pub fn publish_json(&self, subject: impl Into<String>, value: &impl serde::Serialize) {
        match serde_json::to_vec(value) {
            Ok(bytes) => self.publish(subject, Bytes::from(bytes)),
            Err(err) => tracing::error!(error = %err, "failed to serialize bus payload"),
        }
    }
}
