use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::LedgerError;

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "lowercase")]
pub enum TransactionType {
    Credit,
    Debit,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "lowercase")]
pub enum TransactionStatus {
    Success,
    Failed,
}

/// A money movement as it travels the pipeline.
///
/// Created once at intake and carried through every stage as the message
/// payload. Stages never edit a transaction in place: resolution produces a
/// stamped copy via [`Transaction::resolved`], leaving `id` and the intake
/// fields untouched.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    pub id: Uuid,
    pub account_id: Uuid,
    pub amount: Decimal,
    pub transaction_type: TransactionType,
    #[serde(default)]
    pub details: String,
    pub accepted_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub status: Option<TransactionStatus>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub processed_at: Option<DateTime<Utc>>,
}

impl Transaction {
    /// Amount must be a positive quantity. Runs at the orchestrator, not at
    /// intake, so a bad amount still reaches history as a failed record.
    pub fn validate(&self) -> Result<(), LedgerError> {
        if self.amount <= Decimal::ZERO {
            return Err(LedgerError::Validation(
                "invalid transaction amount".to_string(),
            ));
        }
        Ok(())
    }

    /// Returns a copy stamped with the outcome and the processing time.
    pub fn resolved(&self, status: TransactionStatus, error: Option<String>) -> Self {
        Self {
            status: Some(status),
            error,
            processed_at: Some(Utc::now()),
            ..self.clone()
        }
    }

    /// Broker message key: all events for one transaction share a partition.
    pub fn key(&self) -> Vec<u8> {
        self.id.to_string().into_bytes()
    }
}

/// The inbound request shape accepted by intake.
///
/// Amount and type are optional so that a missing field surfaces as a typed
/// bad-request instead of a deserialization failure.
#[derive(Debug, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct TransactionRequest {
    pub account_id: Uuid,
    pub amount: Option<Decimal>,
    pub transaction_type: Option<TransactionType>,
    #[serde(default)]
    pub details: Option<String>,
}

/// Terminal, immutable form of a transaction as kept by the history store.
///
/// Unlike [`Transaction`], the status is required: only resolved records may
/// enter history. There is no update or delete path; corrections would be
/// modeled as new compensating records.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
#[serde(rename_all = "camelCase")]
pub struct LedgerRecord {
    pub id: Uuid,
    pub account_id: Uuid,
    pub amount: Decimal,
    pub transaction_type: TransactionType,
    #[serde(default)]
    pub details: String,
    pub accepted_at: DateTime<Utc>,
    pub status: TransactionStatus,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub processed_at: Option<DateTime<Utc>>,
}

impl TryFrom<Transaction> for LedgerRecord {
    type Error = LedgerError;

    fn try_from(tx: Transaction) -> Result<Self, Self::Error> {
        let status = tx.status.ok_or_else(|| {
            LedgerError::Validation(format!("transaction {} has no resolution status", tx.id))
        })?;
        Ok(Self {
            id: tx.id,
            account_id: tx.account_id,
            amount: tx.amount,
            transaction_type: tx.transaction_type,
            details: tx.details,
            accepted_at: tx.accepted_at,
            status,
            error: tx.error,
            processed_at: tx.processed_at,
        })
    }
}
