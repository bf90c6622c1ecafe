//! Ledger error types.
//!
//! Every ledger operation fails with one of these kinds. Precondition errors
//! are raised before any mutation; store errors are raised from inside a unit
//! of work, which is then rolled back.

use tally_shared::types::{AccountId, CategoryId};
use thiserror::Error;

/// Errors that can occur during ledger operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LedgerError {
    // ========== Validation Errors ==========
    /// Amount must be strictly positive.
    #[error("Amount must be positive, got {0}")]
    InvalidAmount(i64),

    /// Malformed or self-referencing transfer.
    #[error("Invalid transfer: {0}")]
    InvalidTransfer(String),

    /// Malformed query parameters.
    #[error("Validation error: {0}")]
    Validation(String),

    // ========== Lookup Errors ==========
    /// Account not found.
    #[error("Account not found: {0}")]
    AccountNotFound(AccountId),

    /// Category not found.
    #[error("Category not found: {0}")]
    CategoryNotFound(CategoryId),

    // ========== Balance Errors ==========
    /// Source balance does not cover the debit.
    #[error("Insufficient funds in account {account_id}: balance {balance}, requested {requested}")]
    InsufficientFunds {
        /// The debited account.
        account_id: AccountId,
        /// Balance observed when the debit was attempted.
        balance: i64,
        /// Amount that was requested.
        requested: i64,
    },

    /// Crediting the account would overflow its balance.
    #[error("Crediting {amount} would overflow the balance of account {account_id}")]
    BalanceOverflow {
        /// The credited account.
        account_id: AccountId,
        /// Amount that was requested.
        amount: i64,
    },

    // ========== Concurrency Errors ==========
    /// The store detected a conflicting concurrent modification.
    #[error("Concurrent modification detected, please retry")]
    ConcurrentModification,

    /// Conflicts persisted through the whole retry budget.
    #[error("Transfer gave up after {attempts} conflicting attempts")]
    ConcurrencyConflict {
        /// Attempts made before giving up.
        attempts: u32,
    },

    /// The caller's deadline passed before the commit point.
    #[error("Deadline exceeded before the operation completed")]
    DeadlineExceeded,

    // ========== Storage Errors ==========
    /// Underlying store failure.
    #[error("Storage error: {0}")]
    Storage(String),
}

impl LedgerError {
    /// Returns the error code for API responses.
    #[must_use]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::InvalidAmount(_) => "INVALID_AMOUNT",
            Self::InvalidTransfer(_) => "INVALID_TRANSFER",
            Self::Validation(_) => "VALIDATION_ERROR",
            Self::AccountNotFound(_) => "ACCOUNT_NOT_FOUND",
            Self::CategoryNotFound(_) => "CATEGORY_NOT_FOUND",
            Self::InsufficientFunds { .. } => "INSUFFICIENT_FUNDS",
            Self::BalanceOverflow { .. } => "BALANCE_OVERFLOW",
            Self::ConcurrentModification => "CONCURRENT_MODIFICATION",
            Self::ConcurrencyConflict { .. } => "CONCURRENCY_CONFLICT",
            Self::DeadlineExceeded => "DEADLINE_EXCEEDED",
            Self::Storage(_) => "STORAGE_ERROR",
        }
    }

    /// Returns the HTTP status code for this error.
    #[must_use]
    pub fn http_status_code(&self) -> u16 {
        match self {
            // 400 Bad Request - validation errors
            Self::InvalidAmount(_)
            | Self::InvalidTransfer(_)
            | Self::Validation(_)
            | Self::BalanceOverflow { .. } => 400,

            // 404 Not Found
            Self::AccountNotFound(_) | Self::CategoryNotFound(_) => 404,

            // 409 Conflict - concurrency errors
            Self::ConcurrentModification | Self::ConcurrencyConflict { .. } => 409,

            // 422 Unprocessable - well-formed but not executable
            Self::InsufficientFunds { .. } => 422,

            // 504 Gateway Timeout
            Self::DeadlineExceeded => 504,

            // 500 Internal Server Error
            Self::Storage(_) => 500,
        }
    }

    /// Returns true if this error is retryable.
    ///
    /// Only store-level conflicts are retried. An exhausted budget is final.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::ConcurrentModification)
    }
}
