use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::warn;

use super::consumer::{ConsumerLoop, MessageHandler};
use super::{publish_with_retry, topics};
use crate::config::PipelineConfig;
use crate::domain::ports::{BrokerMessage, BrokerRef};
use crate::domain::transaction::{Transaction, TransactionStatus};
use crate::error::{LedgerError, Result};

const CONSUMER_GROUP: &str = "settlement-orchestrator";

/// The saga coordinator. Runs two unsynchronized consumption loops:
///
/// - loop A takes accepted transactions, validates them, and either forwards
///   them toward the balance stage or records them directly as failed;
/// - loop B relays balance outcomes onto the `ledger` topic, so that failed
///   validations and balance outcomes converge on one consumer contract for
///   the history recorder.
pub struct SettlementOrchestrator {
    broker: BrokerRef,
    config: PipelineConfig,
}

impl SettlementOrchestrator {
    pub fn new(broker: BrokerRef, config: PipelineConfig) -> Self {
        Self { broker, config }
    }

    /// Spawns both loops; each handle resolves when its loop stops, with an
    /// error if the loop died on a broker failure.
    pub fn spawn(
        &self,
        shutdown: watch::Receiver<bool>,
    ) -> (JoinHandle<Result<()>>, JoinHandle<Result<()>>) {
        let loop_a = ConsumerLoop::new(
            Arc::clone(&self.broker),
            topics::TRANSACTIONS,
            CONSUMER_GROUP,
            self.config.worker_pool_size,
            Arc::new(TransactionHandler {
                broker: Arc::clone(&self.broker),
                config: self.config.clone(),
            }),
        );
        let loop_b = ConsumerLoop::new(
            Arc::clone(&self.broker),
            topics::TRANSACTIONS_STATUS,
            CONSUMER_GROUP,
            self.config.worker_pool_size,
            Arc::new(StatusRelayHandler {
                broker: Arc::clone(&self.broker),
                config: self.config.clone(),
            }),
        );
        (
            tokio::spawn(loop_a.run(shutdown.clone())),
            tokio::spawn(loop_b.run(shutdown)),
        )
    }
}

async fn record_failure(
    broker: &BrokerRef,
    config: &PipelineConfig,
    transaction: &Transaction,
    error: String,
) -> Result<()> {
    let failed = transaction.resolved(TransactionStatus::Failed, Some(error));
    let payload = serde_json::to_vec(&failed)?;
    publish_with_retry(
        broker,
        topics::LEDGER,
        BrokerMessage::new(failed.key(), payload),
        config.publish_retries,
        config.retry_backoff,
    )
    .await
}

/// Loop A: validation and forwarding.
pub(crate) struct TransactionHandler {
    pub(crate) broker: BrokerRef,
    pub(crate) config: PipelineConfig,
}

#[async_trait]
impl MessageHandler for TransactionHandler {
    async fn handle(&self, message: BrokerMessage) -> Result<()> {
        let transaction: Transaction = serde_json::from_slice(&message.value)?;

        if let Err(err) = transaction.validate() {
            warn!(id = %transaction.id, %err, "transaction failed validation");
            // The record carries the bare reason, not the display prefix.
            let reason = match err {
                LedgerError::Validation(reason) => reason,
                other => other.to_string(),
            };
            return record_failure(&self.broker, &self.config, &transaction, reason).await;
        }

        // Forward the untouched payload, same key, toward the balance stage.
        let forward = BrokerMessage::new(message.key, message.value);
        if let Err(err) = self
            .broker
            .publish(topics::ACCOUNT_BALANCE_UPDATES, forward)
            .await
        {
            warn!(id = %transaction.id, %err, "forward to balance stage failed");
            return record_failure(&self.broker, &self.config, &transaction, err.to_string())
                .await;
        }
        Ok(())
    }
}

/// Loop B: passes balance outcomes through to the ledger topic unchanged.
pub(crate) struct StatusRelayHandler {
    pub(crate) broker: BrokerRef,
    pub(crate) config: PipelineConfig,
}

#[async_trait]
impl MessageHandler for StatusRelayHandler {
    async fn handle(&self, message: BrokerMessage) -> Result<()> {
        // Deserialize to reject malformed payloads before they reach history.
        let _: Transaction = serde_json::from_slice(&message.value)?;
        publish_with_retry(
            &self.broker,
            topics::LEDGER,
            BrokerMessage::new(message.key, message.value),
            self.config.publish_retries,
            self.config.retry_backoff,
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::transaction::TransactionType;
    use crate::infrastructure::in_memory::InMemoryBroker;
    use chrono::Utc;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;
    use uuid::Uuid;

    fn transaction(amount: Decimal) -> Transaction {
        Transaction {
            id: Uuid::new_v4(),
            account_id: Uuid::new_v4(),
            amount,
            transaction_type: TransactionType::Debit,
            details: String::new(),
            accepted_at: Utc::now(),
            status: None,
            error: None,
            processed_at: None,
        }
    }

    fn message_for(tx: &Transaction) -> BrokerMessage {
        BrokerMessage::new(tx.key(), serde_json::to_vec(tx).unwrap())
    }

    fn handler(broker: &Arc<InMemoryBroker>) -> TransactionHandler {
        TransactionHandler {
            broker: broker.clone(),
            config: PipelineConfig::default(),
        }
    }

    #[tokio::test]
    async fn test_valid_transaction_forwarded_untouched() {
        let broker = Arc::new(InMemoryBroker::new());
        let tx = transaction(dec!(10.0));
        let message = message_for(&tx);

        handler(&broker).handle(message.clone()).await.unwrap();

        let forwarded = broker.topic_messages(topics::ACCOUNT_BALANCE_UPDATES).await;
        assert_eq!(forwarded.len(), 1);
        assert_eq!(forwarded[0].key, message.key);
        assert_eq!(forwarded[0].value, message.value);
        assert!(broker.topic_messages(topics::LEDGER).await.is_empty());
    }

    #[tokio::test]
    async fn test_invalid_amount_bypasses_balance_stage() {
        let broker = Arc::new(InMemoryBroker::new());
        let tx = transaction(dec!(-10.0));

        handler(&broker).handle(message_for(&tx)).await.unwrap();

        assert!(
            broker
                .topic_messages(topics::ACCOUNT_BALANCE_UPDATES)
                .await
                .is_empty()
        );
        let recorded = broker.topic_messages(topics::LEDGER).await;
        assert_eq!(recorded.len(), 1);

        let failed: Transaction = serde_json::from_slice(&recorded[0].value).unwrap();
        assert_eq!(failed.id, tx.id);
        assert_eq!(failed.status, Some(TransactionStatus::Failed));
        assert_eq!(failed.error.as_deref(), Some("invalid transaction amount"));
        assert!(failed.processed_at.is_some());
    }

    #[tokio::test]
    async fn test_zero_amount_rejected() {
        let broker = Arc::new(InMemoryBroker::new());
        handler(&broker)
            .handle(message_for(&transaction(dec!(0.0))))
            .await
            .unwrap();
        assert_eq!(broker.topic_messages(topics::LEDGER).await.len(), 1);
    }

    #[tokio::test]
    async fn test_malformed_payload_is_handler_error() {
        let broker = Arc::new(InMemoryBroker::new());
        let result = handler(&broker)
            .handle(BrokerMessage::new(b"k".to_vec(), b"not json".to_vec()))
            .await;
        assert!(result.is_err());
        assert!(broker.topic_messages(topics::LEDGER).await.is_empty());
    }

    #[tokio::test]
    async fn test_status_relay_passes_events_through() {
        let broker = Arc::new(InMemoryBroker::new());
        let event = transaction(dec!(10.0)).resolved(TransactionStatus::Success, None);
        let message = BrokerMessage::new(event.key(), serde_json::to_vec(&event).unwrap());

        let relay = StatusRelayHandler {
            broker: broker.clone(),
            config: PipelineConfig::default(),
        };
        relay.handle(message.clone()).await.unwrap();

        let relayed = broker.topic_messages(topics::LEDGER).await;
        assert_eq!(relayed.len(), 1);
        assert_eq!(relayed[0].key, message.key);
        assert_eq!(relayed[0].value, message.value);
    }
}
