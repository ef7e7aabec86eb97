//! In-process bus
//!
//! Delivers every published payload to every live subscription, the
//! publisher's own included, like Redis pub/sub does. Lets several hubs in
//! one process form a cluster, and can simulate an outage.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

use super::{BusBackend, BusError, BusStream};

type Subscribers = HashMap<String, Vec<mpsc::UnboundedSender<String>>>;

/// Bus backed by in-memory channels
#[derive(Debug, Clone)]
pub struct InMemoryBus {
    subscribers: Arc<Mutex<Subscribers>>,
    available: Arc<AtomicBool>,
}

impl Default for InMemoryBus {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryBus {
    pub fn new() -> Self {
        Self {
            subscribers: Arc::new(Mutex::new(HashMap::new())),
            available: Arc::new(AtomicBool::new(true)),
        }
    }

    /// Drop every subscription and refuse traffic until [`restore`](Self::restore)
    pub fn sever(&self) {
        self.available.store(false, Ordering::SeqCst);
        self.lock().clear();
    }

    /// Accept traffic again
    pub fn restore(&self) {
        self.available.store(true, Ordering::SeqCst);
    }

    /// Number of live subscriptions on `topic`
    pub fn subscriber_count(&self, topic: &str) -> usize {
        self.lock()
            .get(topic)
            .map(|subs| subs.iter().filter(|tx| !tx.is_closed()).count())
            .unwrap_or(0)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Subscribers> {
        self.subscribers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn ensure_available(&self) -> Result<(), BusError> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(BusError::Unavailable("in-memory bus severed".to_string()))
        }
    }
}

#[async_trait]
impl BusBackend for InMemoryBus {
    async fn publish(&self, topic: &str, payload: String) -> Result<(), BusError> {
        self.ensure_available()?;

        let mut subscribers = self.lock();
        if let Some(subs) = subscribers.get_mut(topic) {
            subs.retain(|tx| tx.send(payload.clone()).is_ok());
        }
        Ok(())
    }

    async fn subscribe(&self, topic: &str) -> Result<BusStream, BusError> {
        self.ensure_available()?;

        let (tx, rx) = mpsc::unbounded_channel();
        self.lock().entry(topic.to_string()).or_default().push(tx);

        let stream = futures_util::stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|payload| (payload, rx))
        });
        Ok(Box::pin(stream))
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}
