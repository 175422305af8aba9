use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::debug;
use uuid::Uuid;

use super::consumer::{ConsumerLoop, MessageHandler};
use super::topics;
use crate::config::PipelineConfig;
use crate::domain::ports::{BrokerMessage, BrokerRef, HistoryStoreRef};
use crate::domain::transaction::{LedgerRecord, Transaction};
use crate::error::Result;

const CONSUMER_GROUP: &str = "history-recorder";

/// Terminal stage: appends every resolved transaction to the audit trail.
///
/// The store is append-only; there is no update or delete path. The read
/// operations below are the only query surface over recorded history.
pub struct HistoryRecorder {
    broker: BrokerRef,
    store: HistoryStoreRef,
    config: PipelineConfig,
}

impl HistoryRecorder {
    pub fn new(broker: BrokerRef, store: HistoryStoreRef, config: PipelineConfig) -> Self {
        Self {
            broker,
            store,
            config,
        }
    }

    pub fn spawn(&self, shutdown: watch::Receiver<bool>) -> JoinHandle<Result<()>> {
        let consumer = ConsumerLoop::new(
            Arc::clone(&self.broker),
            topics::LEDGER,
            CONSUMER_GROUP,
            self.config.worker_pool_size,
            Arc::new(RecordHandler {
                store: Arc::clone(&self.store),
            }),
        );
        tokio::spawn(consumer.run(shutdown))
    }

    /// All records for an account, newest acceptance first.
    pub async fn account_history(&self, account_id: Uuid) -> Result<Vec<LedgerRecord>> {
        self.store.for_account(account_id).await
    }

    /// All records for a transaction id, newest acceptance first.
    pub async fn transaction_history(&self, transaction_id: Uuid) -> Result<Vec<LedgerRecord>> {
        self.store.for_transaction(transaction_id).await
    }
}

pub(crate) struct RecordHandler {
    pub(crate) store: HistoryStoreRef,
}

#[async_trait]
impl MessageHandler for RecordHandler {
    async fn handle(&self, message: BrokerMessage) -> Result<()> {
        let transaction: Transaction = serde_json::from_slice(&message.value)?;
        let record = LedgerRecord::try_from(transaction)?;
        debug!(id = %record.id, status = ?record.status, "recording ledger entry");
        self.store.append(record).await
    }
}
