//! Production bus backend on top of `async-nats`. Our bus subjects map
//! directly onto NATS subjects, and NATS's own reply-subject convention is
//! exactly the `max: 1 reply` request semantics the `rooms.<publicUrl>`
//! exchange needs, so there's no protocol to invent here beyond wiring the
//! crate's API to [`Bus`].

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use tokio::sync::mpsc;

use super::{Bus, BusError, BusMessage, BusSubscription};

pub struct NatsBus {
    client: async_nats::Client,
}

impl NatsBus {
    pub async fn connect(url: &str) -> Result<Self, BusError> {
        let client = async_nats::connect(url)
            .await
            .map_err(|err| BusError::Backend(err.to_string()))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Bus for NatsBus {
    async fn publish(&self, subject: &str, payload: Bytes) -> Result<(), BusError> {
        self.client
            .publish(subject.to_string(), payload)
            .await
            .map_err(|err| BusError::Backend(err.to_string()))
    }

    async fn subscribe(&self, subject: &str) -> Result<BusSubscription, BusError> {
        let mut sub = self
            .client
            .subscribe(subject.to_string())
            .await
            .map_err(|err| BusError::Backend(err.to_string()))?;

        let (tx, rx) = mpsc::unbounded_channel();
        let subject_owned = subject.to_string();
        tokio::spawn(async move {
            while let Some(msg) = sub.next().await {
                let delivered = BusMessage {
                    subject: msg.subject.to_string(),
                    payload: msg.payload,
                    reply: msg.reply.map(|r| r.to_string()),
                };
                if tx.send(delivered).is_err() {
                    break;
                }
            }
            tracing::debug!(subject = %subject_owned, "nats subscription ended");
        });
        Ok(BusSubscription::new(subject.to_string(), rx))
    }

    async fn request(&self, subject: &str, payload: Bytes, timeout: Duration) -> Result<Bytes, BusError> {
        match tokio::time::timeout(timeout, self.client.request(subject.to_string(), payload)).await {
            Ok(Ok(msg)) => Ok(msg.payload),
            Ok(Err(err)) => Err(BusError::Backend(err.to_string())),
            Err(_) => Err(BusError::Timeout),
        }
    }
}
