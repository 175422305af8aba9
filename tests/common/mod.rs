use rust_decimal::Decimal;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use uuid::Uuid;

use ledgerflow::config::PipelineConfig;
use ledgerflow::domain::account::{Account, AccountType};
use ledgerflow::domain::ports::AccountStore;
use ledgerflow::domain::transaction::LedgerRecord;
use ledgerflow::error::Result;
use ledgerflow::infrastructure::in_memory::{
    InMemoryAccountStore, InMemoryBroker, InMemoryHistoryStore,
};
use ledgerflow::pipeline::balance::BalanceLedgerEngine;
use ledgerflow::pipeline::history::HistoryRecorder;
use ledgerflow::pipeline::intake::TransactionIntake;
use ledgerflow::pipeline::orchestrator::SettlementOrchestrator;

/// Full pipeline wired over the in-memory adapters, with every stage
/// running on its own tasks.
pub struct Pipeline {
    pub broker: Arc<InMemoryBroker>,
    pub accounts: Arc<InMemoryAccountStore>,
    pub intake: TransactionIntake,
    pub recorder: HistoryRecorder,
    stop: watch::Sender<bool>,
    handles: Vec<JoinHandle<Result<()>>>,
}

impl Pipeline {
    pub fn start() -> Self {
        Self::start_with(PipelineConfig {
            worker_pool_size: 2,
            retry_backoff: Duration::from_millis(1),
            ..PipelineConfig::default()
        })
    }

    pub fn start_with(config: PipelineConfig) -> Self {
        let broker: Arc<InMemoryBroker> = Arc::new(InMemoryBroker::new());
        let accounts = Arc::new(InMemoryAccountStore::new());
        let history = Arc::new(InMemoryHistoryStore::new());

        let (stop, shutdown) = watch::channel(false);
        let (loop_a, loop_b) =
            SettlementOrchestrator::new(broker.clone(), config.clone()).spawn(shutdown.clone());
        let engine = BalanceLedgerEngine::new(broker.clone(), accounts.clone(), config.clone())
            .spawn(shutdown.clone());
        let recorder = HistoryRecorder::new(broker.clone(), history, config);
        let recording = recorder.spawn(shutdown);

        Self {
            intake: TransactionIntake::new(accounts.clone(), broker.clone()),
            broker,
            accounts,
            recorder,
            stop,
            handles: vec![loop_a, loop_b, engine, recording],
        }
    }

    pub async fn seed_account(&self, balance: Decimal, version: u64) -> Uuid {
        let mut account = Account::new(format!("ACC-{}", Uuid::new_v4()), AccountType::Checking);
        account.balance = balance;
        account.version = version;
        let id = account.id;
        self.accounts.create(account).await.unwrap();
        id
    }

    /// Polls history until the account has at least `count` records.
    /// Panics if the pipeline has not drained within five seconds.
    pub async fn wait_for_records(&self, account_id: Uuid, count: usize) -> Vec<LedgerRecord> {
        tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                let records = self.recorder.account_history(account_id).await.unwrap();
                if records.len() >= count {
                    return records;
                }
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap_or_else(|_| panic!("timed out waiting for {count} ledger records"))
    }

    /// Stops every loop and checks none of them died on a broker error.
    pub async fn shutdown(self) {
        self.stop.send(true).unwrap();
        for handle in self.handles {
            handle.await.unwrap().unwrap();
        }
    }
}
