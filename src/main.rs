use clap::Parser;
use miette::{IntoDiagnostic, Result, miette};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

use ledgerflow::config::PipelineConfig;
use ledgerflow::domain::account::{Account, AccountType};
use ledgerflow::domain::ports::AccountStore;
use ledgerflow::domain::transaction::{TransactionRequest, TransactionType};
use ledgerflow::infrastructure::in_memory::{
    InMemoryAccountStore, InMemoryBroker, InMemoryHistoryStore,
};
use ledgerflow::pipeline::balance::BalanceLedgerEngine;
use ledgerflow::pipeline::history::HistoryRecorder;
use ledgerflow::pipeline::intake::TransactionIntake;
use ledgerflow::pipeline::orchestrator::SettlementOrchestrator;

/// Runs the full settlement pipeline in-process over the in-memory adapters
/// and prints the resulting account state and ledger history.
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Workers per consumption loop
    #[arg(long, default_value_t = 5, value_parser = clap::value_parser!(u64).range(1..=64))]
    workers: u64,

    /// Number of sample transactions to push through the pipeline
    #[arg(long, default_value_t = 8)]
    transactions: u32,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = PipelineConfig {
        worker_pool_size: cli.workers as usize,
        ..PipelineConfig::default()
    };

    let broker = Arc::new(InMemoryBroker::new());
    let accounts = Arc::new(InMemoryAccountStore::new());
    let history_store = Arc::new(InMemoryHistoryStore::new());

    let account = Account::new("ACC-0001", AccountType::Checking);
    let account_id = account.id;
    accounts.create(account).await.into_diagnostic()?;

    let (stop, shutdown) = watch::channel(false);
    let (loop_a, loop_b) =
        SettlementOrchestrator::new(broker.clone(), config.clone()).spawn(shutdown.clone());
    let engine =
        BalanceLedgerEngine::new(broker.clone(), accounts.clone(), config.clone())
            .spawn(shutdown.clone());
    let recorder = HistoryRecorder::new(broker.clone(), history_store.clone(), config.clone());
    let recording = recorder.spawn(shutdown.clone());

    let intake = TransactionIntake::new(accounts.clone(), broker.clone());
    for i in 0..cli.transactions {
        let amount = if i % 4 == 3 {
            // Exercise the validation-failure path.
            dec!(-5.0)
        } else {
            Decimal::from(10 + i)
        };
        let transaction_type = if i % 2 == 0 {
            TransactionType::Credit
        } else {
            TransactionType::Debit
        };
        intake
            .submit(TransactionRequest {
                account_id,
                amount: Some(amount),
                transaction_type: Some(transaction_type),
                details: Some(format!("demo transaction {i}")),
            })
            .await
            .into_diagnostic()?;
    }

    // Every accepted transaction must eventually get a terminal record.
    let expected = cli.transactions as usize;
    tokio::time::timeout(Duration::from_secs(10), async {
        loop {
            let recorded = recorder.account_history(account_id).await?;
            if recorded.len() >= expected {
                return Ok::<_, ledgerflow::error::LedgerError>(());
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .map_err(|_| miette!("pipeline did not drain within 10s"))?
    .into_diagnostic()?;

    let _ = stop.send(true);
    for handle in [loop_a, loop_b, engine, recording] {
        handle.await.into_diagnostic()?.into_diagnostic()?;
    }

    for account in accounts.list().await.into_diagnostic()? {
        println!(
            "account {} balance {} (version {})",
            account.account_number, account.balance, account.version
        );
    }
    for record in recorder
        .account_history(account_id)
        .await
        .into_diagnostic()?
    {
        println!(
            "{} {:?} {} status={:?} error={}",
            record.id,
            record.transaction_type,
            record.amount,
            record.status,
            record.error.as_deref().unwrap_or("-"),
        );
    }

    Ok(())
}
