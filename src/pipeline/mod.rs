//! The settlement pipeline: independent stages wired together only through
//! broker topics. Intake publishes accepted transactions; the orchestrator
//! validates and routes them; the balance engine mutates account state under
//! optimistic concurrency; the history recorder writes the terminal record.

pub mod balance;
pub mod consumer;
pub mod history;
pub mod intake;
pub mod orchestrator;

use std::time::Duration;
use tracing::warn;

use crate::domain::ports::{BrokerMessage, BrokerRef};
use crate::error::Result;

/// Topic names are part of the external contract and fixed.
pub mod topics {
    pub const TRANSACTIONS: &str = "transactions";
    pub const ACCOUNT_BALANCE_UPDATES: &str = "account-balance-updates";
    pub const TRANSACTIONS_STATUS: &str = "transactions-status";
    pub const LEDGER: &str = "ledger";
}

/// Publish with a bounded retry and doubling backoff.
///
/// Used for forwarding already-resolved outcomes, where giving up means a
/// transaction never reaches history; the caller decides whether exhaustion
/// is an error or is logged and dropped.
pub(crate) async fn publish_with_retry(
    broker: &BrokerRef,
    topic: &str,
    message: BrokerMessage,
    retries: u32,
    backoff: Duration,
) -> Result<()> {
    let mut delay = backoff;
    for attempt in 0..=retries {
        match broker.publish(topic, message.clone()).await {
            Ok(()) => return Ok(()),
            Err(err) if attempt < retries => {
                warn!(%topic, attempt, %err, "publish failed, retrying");
                tokio::time::sleep(delay).await;
                delay *= 2;
            }
            Err(err) => return Err(err),
        }
    }
    unreachable!("publish retry loop always returns")
}
