//! Ledger transfer engine.
//!
//! This module implements the consistency core:
//! - Domain types for accounts, transfers and history queries
//! - Error types for ledger operations
//! - Precondition validation and date-bound parsing
//! - Storage traits (`AccountStore`, `TransactionLedger`, `LedgerStore`)
//! - `TransferEngine` for atomic, retried transfers and top-ups
//! - `MutationQuery` for range-filtered history
//! - An in-memory store implementing the storage traits

pub mod engine;
pub mod error;
pub mod lock;
pub mod memory;
pub mod query;
pub mod retry;
pub mod store;
pub mod types;
pub mod validation;

#[cfg(test)]
mod engine_props;

pub use engine::TransferEngine;
pub use error::LedgerError;
pub use lock::lock_order;
pub use memory::{InMemoryLedgerStore, InMemoryUnit};
pub use query::MutationQuery;
pub use retry::RetryPolicy;
pub use store::{AccountStore, LedgerStore, LedgerUnit, TransactionLedger};
pub use types::{
    Account, MutationFilter, MutationParams, NewTransfer, TransferRecord, TransferRequest,
};
