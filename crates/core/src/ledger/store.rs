//! Storage traits for the ledger.
//!
//! `AccountStore` and `TransactionLedger` are the two collaborators of the
//! transfer engine. `LedgerStore::begin` opens a `LedgerUnit`, an atomic unit
//! of work in which balance adjustments and ledger appends either all become
//! visible at `commit` or none do.

use async_trait::async_trait;
use tally_shared::types::AccountId;

use super::error::LedgerError;
use super::types::{Account, MutationFilter, NewTransfer, TransferRecord};

/// Owns account balance state.
#[async_trait]
pub trait AccountStore: Send + Sync {
    /// Loads an account.
    ///
    /// # Errors
    ///
    /// Returns `AccountNotFound` if no such account exists.
    async fn get_by_id(&self, id: AccountId) -> Result<Account, LedgerError>;

    /// Applies `balance += delta` as one atomic read-modify-write and returns
    /// the new balance.
    ///
    /// A result below zero is rejected and the stored balance is left as is.
    ///
    /// # Errors
    ///
    /// Returns `AccountNotFound`, `InsufficientFunds`, or a store error.
    async fn adjust_balance(&self, id: AccountId, delta: i64) -> Result<i64, LedgerError>;
}

/// Append-only store of transfer records.
#[async_trait]
pub trait TransactionLedger: Send + Sync {
    /// Appends a record. The store assigns the ID.
    ///
    /// # Errors
    ///
    /// Returns a store error, or `CategoryNotFound` for a dangling category.
    async fn append(&self, transfer: NewTransfer) -> Result<TransferRecord, LedgerError>;

    /// Returns the records matching `filter`, most recent first, with the
    /// limit applied after ordering.
    ///
    /// # Errors
    ///
    /// Returns a store error.
    async fn query(&self, filter: &MutationFilter) -> Result<Vec<TransferRecord>, LedgerError>;
}

/// One atomic unit of work.
///
/// Dropping a unit without committing discards its changes.
#[async_trait]
pub trait LedgerUnit: AccountStore + TransactionLedger + Sized {
    /// Takes the exclusive lock on an account for the rest of the unit and
    /// returns its current state, or `None` if it does not exist.
    async fn lock_account(&self, id: AccountId) -> Result<Option<Account>, LedgerError>;

    /// Makes every change in the unit durable at once.
    async fn commit(self) -> Result<(), LedgerError>;

    /// Discards every change in the unit.
    async fn rollback(self) -> Result<(), LedgerError>;
}

/// A store that can open units of work.
#[async_trait]
pub trait LedgerStore: AccountStore + TransactionLedger {
    /// Unit type produced by `begin`.
    type Unit: LedgerUnit + 'static;

    /// Opens a new unit of work.
    async fn begin(&self) -> Result<Self::Unit, LedgerError>;
}
