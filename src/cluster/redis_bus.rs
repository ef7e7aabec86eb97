//! Redis pub/sub bus

use async_trait::async_trait;
use futures_util::StreamExt;
use redis::aio::MultiplexedConnection;
use redis::AsyncCommands;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

use super::{BusBackend, BusError, BusStream};

/// Bus over Redis `PUBLISH` / `SUBSCRIBE`
///
/// Publishing reuses one multiplexed connection, re-opened lazily after a
/// failure but no sooner than `backoff` after it. Each subscription gets
/// its own pub/sub connection.
pub struct RedisBus {
    client: redis::Client,
    publisher: Mutex<PublisherState>,
    backoff: Duration,
}

#[derive(Default)]
struct PublisherState {
    connection: Option<MultiplexedConnection>,
    last_failure: Option<Instant>,
}

impl RedisBus {
    /// Create a bus for the server at `url` (e.g. `redis://localhost:6379`)
    ///
    /// Only validates the URL; no connection is made until first use.
    pub fn new(url: &str, backoff: Duration) -> Result<Self, BusError> {
        Ok(Self {
            client: redis::Client::open(url)?,
            publisher: Mutex::new(PublisherState::default()),
            backoff,
        })
    }
}

#[async_trait]
impl BusBackend for RedisBus {
    async fn publish(&self, topic: &str, payload: String) -> Result<(), BusError> {
        let mut state = self.publisher.lock().await;

        let mut connection = match state.connection.take() {
            Some(connection) => connection,
            None => {
                if let Some(failed_at) = state.last_failure {
                    if failed_at.elapsed() < self.backoff {
                        return Err(BusError::Unavailable(
                            "redis publisher backing off".to_string(),
                        ));
                    }
                }
                match self.client.get_multiplexed_async_connection().await {
                    Ok(connection) => {
                        tracing::info!("Redis publisher connected");
                        connection
                    }
                    Err(e) => {
                        state.last_failure = Some(Instant::now());
                        return Err(e.into());
                    }
                }
            }
        };

        let result: redis::RedisResult<i64> = connection.publish(topic, payload).await;
        match result {
            Ok(receivers) => {
                tracing::trace!(topic = %topic, receivers, "Published to redis");
                state.connection = Some(connection);
                state.last_failure = None;
                Ok(())
            }
            Err(e) => {
                state.last_failure = Some(Instant::now());
                Err(e.into())
            }
        }
    }

    async fn subscribe(&self, topic: &str) -> Result<BusStream, BusError> {
        let mut pubsub = self.client.get_async_pubsub().await?;
        pubsub.subscribe(topic).await?;

        let stream = pubsub.into_on_message().filter_map(|msg| async move {
            match msg.get_payload::<String>() {
                Ok(payload) => Some(payload),
                Err(e) => {
                    tracing::warn!(error = %e, "Dropping non-text redis message");
                    None
                }
            }
        });
        Ok(Box::pin(stream))
    }

    fn name(&self) -> &'static str {
        "redis"
    }
}
