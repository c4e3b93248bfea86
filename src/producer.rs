//! JetStream producer for transaction events.
//!
//! Events go through a file-backed stream so they survive broker
//! restarts and wait for the verification consumer. The producer
//! connects lazily and keeps its client behind a mutex: before each
//! publish it checks the connection, rebuilds it (stream declaration
//! included) when absent or no longer live, then makes exactly one
//! delivery attempt. On any failure the state is torn down so the next
//! call starts from scratch; retrying a failed event is the caller's
//! decision, not this module's.

use async_nats::connection::State;
use async_nats::jetstream::{self, stream::StorageType};
use async_nats::{Client, ConnectOptions};
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::debug;

use crate::config::QueueConfig;
use crate::error::SideEffectError;
use crate::types::TransactionEnvelope;

struct PublisherState {
    client: Client,
    jetstream: jetstream::Context,
}

/// Producer for publishing accepted transactions to the event queue.
pub struct EventProducer {
    url: String,
    stream: String,
    subject: String,
    publish_timeout: Duration,
    state: Mutex<Option<PublisherState>>,
}

impl EventProducer {
    /// Create a producer. No connection is made until the first publish.
    pub fn new(config: &QueueConfig) -> Self {
        Self {
            url: config.url.clone(),
            stream: config.stream.clone(),
            subject: config.subject.clone(),
            publish_timeout: Duration::from_millis(config.publish_timeout_ms),
            state: Mutex::new(None),
        }
    }

    /// Publish one transaction event and wait for the broker to confirm
    /// it is stored in the stream.
    pub async fn publish(&self, envelope: &TransactionEnvelope) -> Result<(), SideEffectError> {
        let payload = serde_json::to_vec(envelope)
            .map_err(|e| SideEffectError::Broker(format!("serialize event: {e}")))?;

        let mut guard = self.state.lock().await;
        self.ensure_connected(&mut guard).await?;
        let Some(state) = guard.as_ref() else {
            return Err(SideEffectError::Broker(
                "publisher state missing after connect".to_string(),
            ));
        };

        let attempt = tokio::time::timeout(self.publish_timeout, async {
            let ack_future = state
                .jetstream
                .publish(self.subject.clone(), payload.into())
                .await
                .map_err(|e| SideEffectError::Broker(format!("publish: {e}")))?;
            // Second await is the broker confirming the write.
            ack_future
                .await
                .map_err(|e| SideEffectError::Broker(format!("publish ack: {e}")))
        })
        .await;

        match attempt {
            Ok(Ok(ack)) => {
                debug!(
                    transaction_id = envelope.transaction_id,
                    stream = %ack.stream,
                    sequence = ack.sequence,
                    "Published transaction event"
                );
                Ok(())
            }
            Ok(Err(e)) => {
                *guard = None;
                Err(e)
            }
            Err(_) => {
                *guard = None;
                Err(SideEffectError::Broker(format!(
                    "publish timed out after {:?}",
                    self.publish_timeout
                )))
            }
        }
    }

    /// Rebuild the connection unless the current one is live. The stream
    /// is re-declared on every rebuild; `get_or_create` makes that safe.
    async fn ensure_connected(
        &self,
        state: &mut Option<PublisherState>,
    ) -> Result<(), SideEffectError> {
        let live = matches!(
            state.as_ref(),
            Some(s) if s.client.connection_state() == State::Connected
        );
        if live {
            return Ok(());
        }

        *state = None;
        let client = ConnectOptions::new()
            .connection_timeout(self.publish_timeout)
            .connect(&self.url)
            .await
            .map_err(|e| SideEffectError::Broker(format!("connect {}: {e}", self.url)))?;

        let jetstream = jetstream::new(client.clone());
        jetstream
            .get_or_create_stream(jetstream::stream::Config {
                name: self.stream.clone(),
                subjects: vec![self.subject.clone()],
                storage: StorageType::File,
                ..Default::default()
            })
            .await
            .map_err(|e| SideEffectError::Broker(format!("stream {}: {e}", self.stream)))?;

        *state = Some(PublisherState { client, jetstream });
        Ok(())
    }

    /// Subject events are published under.
    pub fn subject(&self) -> &str {
        &self.subject
    }

    #[cfg(test)]
    pub(crate) async fn has_state(&self) -> bool {
        self.state.lock().await.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::FeatureVector;
    use std::collections::HashMap;

    fn unreachable_producer() -> EventProducer {
        // Port 1 is never listening, so connects fail fast.
        EventProducer::new(&QueueConfig {
            url: "nats://127.0.0.1:1".to_string(),
            publish_timeout_ms: 500,
            ..QueueConfig::default()
        })
    }

    #[tokio::test]
    async fn test_failed_publish_tears_down_state() {
        let producer = unreachable_producer();
        let envelope = TransactionEnvelope::new(1, FeatureVector::from_named(&HashMap::new()));

        let err = producer.publish(&envelope).await.unwrap_err();
        assert!(matches!(err, SideEffectError::Broker(_)));
        assert!(!producer.has_state().await);

        // The next call rebuilds from scratch rather than reusing a
        // half-broken connection, and fails the same way here.
        assert!(producer.publish(&envelope).await.is_err());
        assert!(!producer.has_state().await);
    }

    #[test]
    fn test_subject_accessor() {
        let producer = unreachable_producer();
        assert_eq!(producer.subject(), "transactions.ingested");
    }

    // Publishing against a live broker is exercised by deployment
    // smoke tests; everything here stays broker-free.
}
