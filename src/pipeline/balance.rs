use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, warn};

use super::consumer::{ConsumerLoop, MessageHandler};
use super::{publish_with_retry, topics};
use crate::config::PipelineConfig;
use crate::domain::ports::{AccountStoreRef, BrokerMessage, BrokerRef};
use crate::domain::transaction::{Transaction, TransactionStatus};
use crate::error::{LedgerError, Result};

const CONSUMER_GROUP: &str = "balance-ledger";

/// Applies balance updates under optimistic concurrency.
///
/// Each message runs a read-compute-write sequence with no in-process lock:
/// the account row is read with its version token, the new balance computed,
/// and the write accepted by the store only if the token is unchanged. A
/// conflict means another writer got there first; it is retried a bounded
/// number of times with backoff, then reported as a failure.
pub struct BalanceLedgerEngine {
    broker: BrokerRef,
    accounts: AccountStoreRef,
    config: PipelineConfig,
}

impl BalanceLedgerEngine {
    pub fn new(broker: BrokerRef, accounts: AccountStoreRef, config: PipelineConfig) -> Self {
        Self {
            broker,
            accounts,
            config,
        }
    }

    pub fn spawn(&self, shutdown: watch::Receiver<bool>) -> JoinHandle<Result<()>> {
        let consumer = ConsumerLoop::new(
            Arc::clone(&self.broker),
            topics::ACCOUNT_BALANCE_UPDATES,
            CONSUMER_GROUP,
            self.config.worker_pool_size,
            Arc::new(BalanceUpdateHandler {
                broker: Arc::clone(&self.broker),
                accounts: Arc::clone(&self.accounts),
                config: self.config.clone(),
            }),
        );
        tokio::spawn(consumer.run(shutdown))
    }
}

pub(crate) struct BalanceUpdateHandler {
    pub(crate) broker: BrokerRef,
    pub(crate) accounts: AccountStoreRef,
    pub(crate) config: PipelineConfig,
}

impl BalanceUpdateHandler {
    /// One read-compute-write attempt against the current version token.
    async fn apply_once(&self, transaction: &Transaction) -> Result<()> {
        let account = self
            .accounts
            .get(transaction.account_id)
            .await?
            .ok_or_else(|| {
                LedgerError::NotFound(format!("account {}", transaction.account_id))
            })?;
        let new_balance =
            account.balance_after(transaction.transaction_type, transaction.amount);
        self.accounts
            .compare_and_update(account.id, account.version, new_balance)
            .await
    }

    async fn apply(&self, transaction: &Transaction) -> Result<()> {
        let mut delay = self.config.retry_backoff;
        for attempt in 0..=self.config.conflict_retries {
            match self.apply_once(transaction).await {
                Err(err) if err.is_conflict() && attempt < self.config.conflict_retries => {
                    warn!(
                        id = %transaction.id,
                        account = %transaction.account_id,
                        attempt,
                        "version conflict on balance write, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    delay *= 2;
                }
                other => return other,
            }
        }
        unreachable!("apply loop always returns")
    }
}

#[async_trait]
impl MessageHandler for BalanceUpdateHandler {
    async fn handle(&self, message: BrokerMessage) -> Result<()> {
        let transaction: Transaction = serde_json::from_slice(&message.value)?;

        let event = match self.apply(&transaction).await {
            Ok(()) => transaction.resolved(TransactionStatus::Success, None),
            Err(err) => {
                warn!(id = %transaction.id, %err, "balance update failed");
                transaction.resolved(TransactionStatus::Failed, Some(err.to_string()))
            }
        };

        let payload = serde_json::to_vec(&event)?;
        if let Err(err) = publish_with_retry(
            &self.broker,
            topics::TRANSACTIONS_STATUS,
            BrokerMessage::new(message.key, payload),
            self.config.publish_retries,
            self.config.retry_backoff,
        )
        .await
        {
            // The mutation already committed; dropping the event here leaves
            // the transaction unresolved in history. Logged loudly.
            error!(id = %event.id, %err, "dropping status event after publish retries");
        }
        Ok(())
    }
}
