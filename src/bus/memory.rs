//! In-process bus used for tests and single-binary development. Multiple
//! `InMemoryBus` handles cloned from the same root share one registry, so
//! a test can stand up several simulated room servers and a discovery
//! node talking to each other without a real NATS instance.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::mpsc;

use super::{Bus, BusError, BusMessage, BusSubscription};

#[derive(Default)]
struct Registry {
    subscribers: HashMap<String, Vec<mpsc::UnboundedSender<BusMessage>>>,
}

impl Registry {
    fn deliver(&mut self, msg: BusMessage) {
        if let Some(subs) = self.subscribers.get_mut(&msg.subject) {
            subs.retain(|tx| tx.send(msg.clone()).is_ok());
        }
    }
}

#[derive(Clone)]
pub struct InMemoryBus {
    registry: Arc<Mutex<Registry>>,
}

impl InMemoryBus {
    pub fn new() -> Self {
        Self {
            registry: Arc::new(Mutex::new(Registry::default())),
        }
    }
}

impl Default for InMemoryBus {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Bus for InMemoryBus {
    async fn publish(&self, subject: &str, payload: Bytes) -> Result<(), BusError> {
        self.registry.lock().unwrap().deliver(BusMessage {
            subject: subject.to_string(),
            payload,
            reply: None,
        });
        Ok(())
    }

    async fn subscribe(&self, subject: &str) -> Result<BusSubscription, BusError> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.registry
            .lock()
            .unwrap()
            .subscribers
            .entry(subject.to_string())
            .or_default()
            .push(tx);
        Ok(BusSubscription::new(subject.to_string(), rx))
    }

    async fn request(&self, subject: &str, payload: Bytes, timeout: Duration) -> Result<Bytes, BusError> {
        let inbox = format!("_INBOX.{:016x}", fastrand::u64(..));
        let mut reply_sub = self.subscribe(&inbox).await?;

        self.registry.lock().unwrap().deliver(BusMessage {
            subject: subject.to_string(),
            payload,
            reply: Some(inbox),
        });

        match tokio::time::timeout(timeout, reply_sub.recv()).await {
            Ok(Some(msg)) => Ok(msg.payload),
            Ok(None) => Err(BusError::Closed),
            Err(_) => Err(BusError::Timeout),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn publish_fans_out_to_every_subscriber() {
        let bus = InMemoryBus::new();
        let mut a = bus.subscribe("ping").await.unwrap();
        let mut b = bus.subscribe("ping").await.unwrap();
        bus.publish("ping", Bytes::from_static(b"1")).await.unwrap();
        assert_eq!(a.recv().await.unwrap().payload, Bytes::from_static(b"1"));
        assert_eq!(b.recv().await.unwrap().payload, Bytes::from_static(b"1"));
    }

    #[tokio::test]
    async fn request_reply_round_trips() {
        let bus = InMemoryBus::new();
        let responder = bus.clone();
        let mut incoming = bus.subscribe("rooms.rs-a").await.unwrap();
        tokio::spawn(async move {
            let msg = incoming.recv().await.unwrap();
            let reply = msg.reply.unwrap();
            responder
                .publish(&reply, Bytes::from_static(b"{}"))
                .await
                .unwrap();
        });
        let resp = bus
            .request("rooms.rs-a", Bytes::new(), Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(resp, Bytes::from_static(b"{}"));
    }

    #[tokio::test]
    async fn request_times_out_without_a_responder() {
        let bus = InMemoryBus::new();
        let err = bus
            .request("rooms.nobody", Bytes::new(), Duration::from_millis(50))
            .await
            .unwrap_err();
        assert!(matches!(err, BusError::Timeout));
    }
}
