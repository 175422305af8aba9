use async_trait::async_trait;
use rust_decimal::Decimal;
use std::sync::Arc;
use uuid::Uuid;

use super::account::Account;
use super::transaction::LedgerRecord;
use crate::error::Result;

/// A message on a broker topic. The key is an ordering hint: the broker
/// guarantees order only within a partition, and all events for one logical
/// transaction use its id as the key so they land on the same partition.
#[derive(Debug, Clone, PartialEq)]
pub struct BrokerMessage {
    pub key: Vec<u8>,
    pub value: Vec<u8>,
    /// Position within the topic log, assigned on publish.
    pub offset: u64,
}

impl BrokerMessage {
    pub fn new(key: Vec<u8>, value: Vec<u8>) -> Self {
        Self {
            key,
            value,
            offset: 0,
        }
    }
}

/// Durable, partitioned, append-only topic log with consumer-group offset
/// tracking. Fetch and commit are split so that committing only after a
/// message has been handed off yields at-least-once delivery.
#[async_trait]
pub trait MessageBroker: Send + Sync {
    async fn publish(&self, topic: &str, message: BrokerMessage) -> Result<()>;

    /// Blocks until the next unfetched message for this group is available.
    async fn fetch(&self, topic: &str, group: &str) -> Result<BrokerMessage>;

    /// Marks everything up to and including `offset` as handled for this
    /// group. A crash before commit causes redelivery of the message.
    async fn commit(&self, topic: &str, group: &str, offset: u64) -> Result<()>;
}

/// Store of account rows. The balance is mutated exclusively through
/// [`AccountStore::compare_and_update`]; there is no unconditional write.
#[async_trait]
pub trait AccountStore: Send + Sync {
    async fn create(&self, account: Account) -> Result<()>;
    async fn get(&self, id: Uuid) -> Result<Option<Account>>;
    async fn list(&self) -> Result<Vec<Account>>;

    /// Conditional balance write: succeeds only if the stored version still
    /// equals `expected_version`, in which case the balance is replaced and
    /// the version incremented atomically. A mismatch is reported as
    /// [`crate::error::LedgerError::ConcurrencyConflict`].
    async fn compare_and_update(
        &self,
        id: Uuid,
        expected_version: u64,
        new_balance: Decimal,
    ) -> Result<()>;
}

/// Read-only account lookup consumed by intake. Kept separate from
/// [`AccountStore`] because in production it fronts another service's API.
#[async_trait]
pub trait AccountDirectory: Send + Sync {
    async fn lookup(&self, id: Uuid) -> Result<Option<Account>>;
}

/// Append-only audit trail of resolved transactions.
#[async_trait]
pub trait HistoryStore: Send + Sync {
    async fn append(&self, record: LedgerRecord) -> Result<()>;

    /// All records for an account, newest acceptance first.
    async fn for_account(&self, account_id: Uuid) -> Result<Vec<LedgerRecord>>;

    /// All records for a transaction id, newest acceptance first. A list
    /// rather than an option to leave room for re-submission history.
    async fn for_transaction(&self, transaction_id: Uuid) -> Result<Vec<LedgerRecord>>;
}

pub type BrokerRef = Arc<dyn MessageBroker>;
pub type AccountStoreRef = Arc<dyn AccountStore>;
pub type AccountDirectoryRef = Arc<dyn AccountDirectory>;
pub type HistoryStoreRef = Arc<dyn HistoryStore>;
