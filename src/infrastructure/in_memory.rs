use async_trait::async_trait;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock, watch};
use uuid::Uuid;

use crate::domain::account::Account;
use crate::domain::ports::{
    AccountDirectory, AccountStore, BrokerMessage, HistoryStore, MessageBroker,
};
use crate::domain::transaction::LedgerRecord;
use crate::error::{LedgerError, Result};

/// Per-(topic, group) consumption state.
#[derive(Default, Clone, Copy)]
struct Cursor {
    /// Next log position this group will fetch.
    next_fetch: usize,
    /// Everything below this position has been committed.
    committed: usize,
}

#[derive(Default)]
struct BrokerState {
    topics: HashMap<String, Vec<BrokerMessage>>,
    cursors: HashMap<(String, String), Cursor>,
}

/// In-memory broker with topic-log semantics: append-only per-topic logs,
/// per-group fetch cursors, and committed offsets. Each topic behaves as a
/// single partition, so log order is publish order; message keys are carried
/// for parity with a partitioned production adapter.
#[derive(Clone)]
pub struct InMemoryBroker {
    state: Arc<Mutex<BrokerState>>,
    /// Bumped on every publish so blocked fetchers re-check their topic.
    publishes: watch::Sender<u64>,
}

impl Default for InMemoryBroker {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryBroker {
    pub fn new() -> Self {
        let (publishes, _) = watch::channel(0);
        Self {
            state: Arc::new(Mutex::new(BrokerState::default())),
            publishes,
        }
    }

    /// Snapshot of a topic's log, for assertions in tests and draining checks.
    pub async fn topic_messages(&self, topic: &str) -> Vec<BrokerMessage> {
        let state = self.state.lock().await;
        state.topics.get(topic).cloned().unwrap_or_default()
    }
}

#[async_trait]
impl MessageBroker for InMemoryBroker {
    async fn publish(&self, topic: &str, mut message: BrokerMessage) -> Result<()> {
        let mut state = self.state.lock().await;
        let log = state.topics.entry(topic.to_string()).or_default();
        message.offset = log.len() as u64;
        log.push(message);
        drop(state);
        self.publishes.send_modify(|n| *n += 1);
        Ok(())
    }

    async fn fetch(&self, topic: &str, group: &str) -> Result<BrokerMessage> {
        loop {
            // Subscribe before checking the log so a publish racing with the
            // check still flips the watch and wakes us.
            let mut publishes = self.publishes.subscribe();
            {
                let mut state = self.state.lock().await;
                let position = state
                    .cursors
                    .get(&(topic.to_string(), group.to_string()))
                    .copied()
                    .unwrap_or_default()
                    .next_fetch;
                if let Some(message) = state.topics.get(topic).and_then(|log| log.get(position)) {
                    let message = message.clone();
                    state
                        .cursors
                        .entry((topic.to_string(), group.to_string()))
                        .or_default()
                        .next_fetch = position + 1;
                    return Ok(message);
                }
            }
            publishes
                .changed()
                .await
                .map_err(|_| LedgerError::Broker("broker closed".to_string()))?;
        }
    }

    async fn commit(&self, topic: &str, group: &str, offset: u64) -> Result<()> {
        let mut state = self.state.lock().await;
        let cursor = state
            .cursors
            .entry((topic.to_string(), group.to_string()))
            .or_default();
        cursor.committed = cursor.committed.max(offset as usize + 1);
        Ok(())
    }
}

/// Thread-safe in-memory account store. The balance is only writable through
/// the version-guarded conditional update, mirroring a relational
/// `UPDATE ... WHERE id = ? AND version = ?`.
#[derive(Default, Clone)]
pub struct InMemoryAccountStore {
    accounts: Arc<RwLock<HashMap<Uuid, Account>>>,
}

impl InMemoryAccountStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AccountStore for InMemoryAccountStore {
    async fn create(&self, account: Account) -> Result<()> {
        let mut accounts = self.accounts.write().await;
        if accounts
            .values()
            .any(|a| a.account_number == account.account_number)
        {
            return Err(LedgerError::Storage(format!(
                "account number {} already exists",
                account.account_number
            )));
        }
        accounts.insert(account.id, account);
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<Account>> {
        let accounts = self.accounts.read().await;
        Ok(accounts.get(&id).cloned())
    }

    async fn list(&self) -> Result<Vec<Account>> {
        let accounts = self.accounts.read().await;
        Ok(accounts.values().cloned().collect())
    }

    async fn compare_and_update(
        &self,
        id: Uuid,
        expected_version: u64,
        new_balance: Decimal,
    ) -> Result<()> {
        let mut accounts = self.accounts.write().await;
        let account = accounts
            .get_mut(&id)
            .ok_or_else(|| LedgerError::NotFound(format!("account {id}")))?;
        if account.version != expected_version {
            return Err(LedgerError::ConcurrencyConflict);
        }
        account.balance = new_balance;
        account.version += 1;
        Ok(())
    }
}

#[async_trait]
impl AccountDirectory for InMemoryAccountStore {
    async fn lookup(&self, id: Uuid) -> Result<Option<Account>> {
        self.get(id).await
    }
}

/// Append-only in-memory history store. No update or delete path exists.
#[derive(Default, Clone)]
pub struct InMemoryHistoryStore {
    records: Arc<RwLock<Vec<LedgerRecord>>>,
}

impl InMemoryHistoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn sorted_desc(mut records: Vec<LedgerRecord>) -> Vec<LedgerRecord> {
        records.sort_by(|a, b| b.accepted_at.cmp(&a.accepted_at));
        records
    }
}

#[async_trait]
impl HistoryStore for InMemoryHistoryStore {
    async fn append(&self, record: LedgerRecord) -> Result<()> {
        let mut records = self.records.write().await;
        records.push(record);
        Ok(())
    }

    async fn for_account(&self, account_id: Uuid) -> Result<Vec<LedgerRecord>> {
        let records = self.records.read().await;
        Ok(Self::sorted_desc(
            records
                .iter()
                .filter(|r| r.account_id == account_id)
                .cloned()
                .collect(),
        ))
    }

    async fn for_transaction(&self, transaction_id: Uuid) -> Result<Vec<LedgerRecord>> {
        let records = self.records.read().await;
        Ok(Self::sorted_desc(
            records
                .iter()
                .filter(|r| r.id == transaction_id)
                .cloned()
                .collect(),
        ))
    }
}
