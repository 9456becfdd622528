use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::{ProtocolError, Result};

/// Record of one executed transfer, append-only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferRecord {
    pub transaction_id: String,
    pub from_account: String,
    pub to_account: String,
    pub amount: f64,
    pub currency: String,
    pub memo: String,
    pub created_at: DateTime<Utc>,
}

/// Executes value transfers between external accounts and reports a
/// transaction id back to the caller.
///
/// `balance` and `transfer` are separate calls; a balance check followed by a
/// transfer is not atomic from the caller's side. `transfer` re-checks under
/// its own lock, so the race degrades to `InsufficientBalance`, never a
/// negative balance.
#[derive(Clone)]
pub struct SettlementService {
    accounts: Arc<RwLock<HashMap<String, f64>>>,
    transactions: Arc<RwLock<Vec<TransferRecord>>>,
    currency: String,
}

impl SettlementService {
    pub fn new(currency: impl Into<String>) -> Self {
        Self {
            accounts: Arc::new(RwLock::new(HashMap::new())),
            transactions: Arc::new(RwLock::new(Vec::new())),
            currency: currency.into(),
        }
    }

    /// Fund an account. Used to seed demo and test balances.
    pub async fn credit(&self, account: &str, amount: f64) -> Result<f64> {
        if amount <= 0.0 {
            return Err(ProtocolError::Validation(
                "Credit amount must be greater than 0".to_string(),
            ));
        }
        let mut accounts = self.accounts.write().await;
        let balance = accounts.entry(account.to_string()).or_insert(0.0);
        *balance += amount;
        Ok(*balance)
    }

    /// Current balance; unknown accounts read as zero.
    pub async fn balance(&self, account: &str) -> f64 {
        let accounts = self.accounts.read().await;
        accounts.get(account).copied().unwrap_or(0.0)
    }

    /// Move `amount` from one account to another.
    pub async fn transfer(
        &self,
        from_account: &str,
        to_account: &str,
        amount: f64,
        memo: impl Into<String>,
    ) -> Result<String> {
        if amount <= 0.0 {
            return Err(ProtocolError::Validation(
                "Transfer amount must be greater than 0".to_string(),
            ));
        }

        let mut accounts = self.accounts.write().await;
        let available = accounts.get(from_account).copied().unwrap_or(0.0);
        if available < amount {
            return Err(ProtocolError::InsufficientBalance {
                available,
                required: amount,
            });
        }

        *accounts.entry(from_account.to_string()).or_insert(0.0) -= amount;
        *accounts.entry(to_account.to_string()).or_insert(0.0) += amount;

        let record = TransferRecord {
            transaction_id: format!("txn_{}", Uuid::new_v4()),
            from_account: from_account.to_string(),
            to_account: to_account.to_string(),
            amount,
            currency: self.currency.clone(),
            memo: memo.into(),
            created_at: Utc::now(),
        };
        let transaction_id = record.transaction_id.clone();

        tracing::info!(
            from = from_account,
            to = to_account,
            amount,
            %transaction_id,
            "transfer settled"
        );

        self.transactions.write().await.push(record);
        Ok(transaction_id)
    }

    /// Every transfer executed so far, in order.
    pub async fn transactions(&self) -> Vec<TransferRecord> {
        self.transactions.read().await.clone()
    }
}
