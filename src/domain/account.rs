use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::transaction::TransactionType;

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "lowercase")]
pub enum AccountStatus {
    Active,
    Suspended,
    Closed,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "lowercase")]
pub enum AccountType {
    Savings,
    Checking,
}

/// A customer account holding the one piece of shared mutable state in the
/// system: the balance.
///
/// `version` is the optimistic-concurrency token. It increases by one on
/// every committed balance write, and the store only accepts a write whose
/// expected version matches the stored one. No other mutation path exists.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
#[serde(rename_all = "camelCase")]
pub struct Account {
    pub id: Uuid,
    pub account_number: String,
    pub account_type: AccountType,
    pub status: AccountStatus,
    pub balance: Decimal,
    pub version: u64,
}

impl Account {
    pub fn new(account_number: impl Into<String>, account_type: AccountType) -> Self {
        Self {
            id: Uuid::new_v4(),
            account_number: account_number.into(),
            account_type,
            status: AccountStatus::Active,
            balance: Decimal::ZERO,
            version: 0,
        }
    }

    /// New balance after applying a movement. Credits add, debits subtract;
    /// there is no balance floor, a debit may take the account negative.
    pub fn balance_after(&self, transaction_type: TransactionType, amount: Decimal) -> Decimal {
        match transaction_type {
            TransactionType::Credit => self.balance + amount,
            TransactionType::Debit => self.balance - amount,
        }
    }

    pub fn is_active(&self) -> bool {
        self.status == AccountStatus::Active
    }
}
