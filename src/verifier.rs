//! Verification consumer for the transaction event queue.
//!
//! Drains the durable stream the producer feeds and confirms each event
//! against the database. The ack protocol is the whole point here:
//!
//! * stored transaction: acknowledge
//! * unknown transaction: warn and acknowledge, so one bad event cannot
//!   wedge the queue
//! * malformed payload or a failed database check: negative-acknowledge
//!   with a delay, letting the broker redeliver later
//!
//! Prefetch is bounded by `max_ack_pending`, which keeps memory flat no
//! matter how deep the stream backlog is.

use async_nats::jetstream::{self, consumer::pull, consumer::AckPolicy, stream::StorageType, AckKind};
use futures::StreamExt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::config::QueueConfig;
use crate::metrics::PipelineMetrics;
use crate::store::TransactionStore;
use crate::types::TransactionEnvelope;

/// What an event turned out to be once checked against the database.
#[derive(Debug, PartialEq, Eq)]
pub enum Verdict {
    /// The referenced transaction is stored
    Confirmed(i64),
    /// The event is well formed but no such transaction exists
    Missing(i64),
    /// The event could not be checked; carries the reason
    Failed(String),
}

/// Decode one event payload and check it against the store.
pub async fn assess(store: &TransactionStore, payload: &[u8]) -> Verdict {
    let envelope: TransactionEnvelope = match serde_json::from_slice(payload) {
        Ok(envelope) => envelope,
        Err(e) => return Verdict::Failed(format!("malformed event payload: {e}")),
    };

    match store.transaction_exists(envelope.transaction_id).await {
        Ok(true) => Verdict::Confirmed(envelope.transaction_id),
        Ok(false) => Verdict::Missing(envelope.transaction_id),
        Err(e) => Verdict::Failed(format!(
            "existence check for {}: {e}",
            envelope.transaction_id
        )),
    }
}

/// Long-running consumer binding a durable pull subscription.
pub struct VerificationConsumer {
    store: Arc<TransactionStore>,
    config: QueueConfig,
    metrics: Arc<PipelineMetrics>,
}

impl VerificationConsumer {
    pub fn new(
        store: Arc<TransactionStore>,
        config: QueueConfig,
        metrics: Arc<PipelineMetrics>,
    ) -> Self {
        Self {
            store,
            config,
            metrics,
        }
    }

    /// Connect, bind the durable consumer and process events until the
    /// message stream ends.
    pub async fn run(&self) -> anyhow::Result<()> {
        let client = async_nats::connect(&self.config.url).await?;
        info!("Connected to NATS at {}", self.config.url);

        let jetstream = jetstream::new(client);
        let stream = jetstream
            .get_or_create_stream(jetstream::stream::Config {
                name: self.config.stream.clone(),
                subjects: vec![self.config.subject.clone()],
                storage: StorageType::File,
                ..Default::default()
            })
            .await?;

        let consumer = stream
            .get_or_create_consumer(
                &self.config.durable_name,
                pull::Config {
                    durable_name: Some(self.config.durable_name.clone()),
                    ack_policy: AckPolicy::Explicit,
                    max_ack_pending: self.config.max_ack_pending,
                    ..Default::default()
                },
            )
            .await?;

        info!(
            stream = %self.config.stream,
            durable = %self.config.durable_name,
            max_ack_pending = self.config.max_ack_pending,
            "Verification consumer bound"
        );

        let mut messages = consumer.messages().await?;
        while let Some(next) = messages.next().await {
            let message = match next {
                Ok(message) => message,
                Err(e) => {
                    error!(error = %e, "Failed to pull message");
                    continue;
                }
            };
            self.handle(message).await;
        }

        info!("Event stream ended; verification consumer stopping");
        Ok(())
    }

    async fn handle(&self, message: jetstream::Message) {
        match assess(&self.store, &message.payload).await {
            Verdict::Confirmed(transaction_id) => {
                self.metrics.record_event_verified();
                debug!(transaction_id, "Transaction event verified");
                if let Err(e) = message.ack().await {
                    warn!(transaction_id, error = %e, "Ack failed; event will be redelivered");
                }
            }
            Verdict::Missing(transaction_id) => {
                self.metrics.record_event_missing();
                warn!(
                    transaction_id,
                    "Event references a transaction that is not stored; dropping it"
                );
                // Acked on purpose: redelivery cannot make the row appear,
                // and an unacked poison event would stall the consumer.
                if let Err(e) = message.ack().await {
                    warn!(transaction_id, error = %e, "Ack failed; event will be redelivered");
                }
            }
            Verdict::Failed(reason) => {
                self.metrics.record_event_requeued();
                error!(reason = %reason, "Verification failed; requeueing for redelivery");
                let delay = Duration::from_millis(self.config.nak_delay_ms);
                if let Err(e) = message.ack_with(AckKind::Nak(Some(delay))).await {
                    warn!(error = %e, "Nak failed; broker will redeliver after ack_wait");
                }
            }
        }
    }
}
