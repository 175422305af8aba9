use chrono::Utc;
use tracing::info;
use uuid::Uuid;

use super::topics;
use crate::domain::ports::{AccountDirectoryRef, BrokerMessage, BrokerRef};
use crate::domain::transaction::{Transaction, TransactionRequest};
use crate::error::{LedgerError, Result};

/// Front door of the pipeline.
///
/// Validates the request shape, confirms the account is active, stamps the
/// transaction identity and acceptance time, and publishes exactly one
/// message to the `transactions` topic. A publish failure is surfaced to the
/// caller; there is no local retry at this stage.
pub struct TransactionIntake {
    directory: AccountDirectoryRef,
    broker: BrokerRef,
}

impl TransactionIntake {
    pub fn new(directory: AccountDirectoryRef, broker: BrokerRef) -> Self {
        Self { directory, broker }
    }

    pub async fn submit(&self, request: TransactionRequest) -> Result<Transaction> {
        let amount = request
            .amount
            .ok_or_else(|| LedgerError::Validation("transaction amount is required".to_string()))?;
        let transaction_type = request
            .transaction_type
            .ok_or_else(|| LedgerError::Validation("transaction type is required".to_string()))?;

        let account = self
            .directory
            .lookup(request.account_id)
            .await?
            .ok_or_else(|| LedgerError::NotFound(format!("account {}", request.account_id)))?;
        if !account.is_active() {
            return Err(LedgerError::Validation("account is not active".to_string()));
        }

        let transaction = Transaction {
            id: Uuid::new_v4(),
            account_id: account.id,
            amount,
            transaction_type,
            details: request.details.unwrap_or_default(),
            accepted_at: Utc::now(),
            status: None,
            error: None,
            processed_at: None,
        };

        let payload = serde_json::to_vec(&transaction)?;
        self.broker
            .publish(
                topics::TRANSACTIONS,
                BrokerMessage::new(transaction.key(), payload),
            )
            .await?;

        info!(id = %transaction.id, account = %transaction.account_id, "transaction accepted");
        Ok(transaction)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::account::{Account, AccountStatus, AccountType};
    use crate::domain::ports::AccountStore;
    use crate::domain::transaction::TransactionType;
    use crate::infrastructure::in_memory::{InMemoryAccountStore, InMemoryBroker};
    use rust_decimal_macros::dec;
    use std::sync::Arc;

    async fn setup(status: AccountStatus) -> (TransactionIntake, Arc<InMemoryBroker>, Uuid) {
        let accounts = Arc::new(InMemoryAccountStore::new());
        let mut account = Account::new("ACC-100", AccountType::Checking);
        account.status = status;
        let account_id = account.id;
        accounts.create(account).await.unwrap();

        let broker = Arc::new(InMemoryBroker::new());
        let intake = TransactionIntake::new(accounts, broker.clone());
        (intake, broker, account_id)
    }

    fn request(account_id: Uuid) -> TransactionRequest {
        TransactionRequest {
            account_id,
            amount: Some(dec!(25.0)),
            transaction_type: Some(TransactionType::Credit),
            details: Some("top up".to_string()),
        }
    }

    #[tokio::test]
    async fn test_submit_publishes_once_keyed_by_transaction_id() {
        let (intake, broker, account_id) = setup(AccountStatus::Active).await;

        let accepted = intake.submit(request(account_id)).await.unwrap();
        assert_eq!(accepted.account_id, account_id);
        assert!(accepted.status.is_none());

        let published = broker.topic_messages(topics::TRANSACTIONS).await;
        assert_eq!(published.len(), 1);
        assert_eq!(published[0].key, accepted.id.to_string().into_bytes());

        let on_wire: Transaction = serde_json::from_slice(&published[0].value).unwrap();
        assert_eq!(on_wire, accepted);
    }

    #[tokio::test]
    async fn test_submit_rejects_missing_amount_and_type() {
        let (intake, broker, account_id) = setup(AccountStatus::Active).await;

        let mut no_amount = request(account_id);
        no_amount.amount = None;
        assert!(matches!(
            intake.submit(no_amount).await,
            Err(LedgerError::Validation(_))
        ));

        let mut no_type = request(account_id);
        no_type.transaction_type = None;
        assert!(matches!(
            intake.submit(no_type).await,
            Err(LedgerError::Validation(_))
        ));

        assert!(broker.topic_messages(topics::TRANSACTIONS).await.is_empty());
    }

    #[tokio::test]
    async fn test_submit_rejects_unknown_account() {
        let (intake, _, _) = setup(AccountStatus::Active).await;
        let result = intake.submit(request(Uuid::new_v4())).await;
        assert!(matches!(result, Err(LedgerError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_submit_rejects_inactive_account() {
        let (intake, broker, account_id) = setup(AccountStatus::Suspended).await;
        let result = intake.submit(request(account_id)).await;
        assert!(matches!(result, Err(LedgerError::Validation(_))));
        assert!(broker.topic_messages(topics::TRANSACTIONS).await.is_empty());
    }

    #[tokio::test]
    async fn test_submit_accepts_negative_amount() {
        // Amount sign is checked downstream so the rejection still reaches
        // history as a failed record; intake only verifies presence.
        let (intake, _, account_id) = setup(AccountStatus::Active).await;
        let mut negative = request(account_id);
        negative.amount = Some(dec!(-10.0));
        assert!(intake.submit(negative).await.is_ok());
    }
}
