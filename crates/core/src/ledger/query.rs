//! Transaction history queries.

use std::sync::Arc;

use tally_shared::types::AccountId;
use tokio::time::{Instant, timeout_at};
use tracing::{debug, instrument};

use super::error::LedgerError;
use super::store::TransactionLedger;
use super::types::{MutationParams, TransferRecord};
use super::validation::resolve_mutation_filter;

/// Lists the transfers an account took part in.
#[derive(Debug)]
pub struct MutationQuery<L> {
    ledger: Arc<L>,
}

impl<L> Clone for MutationQuery<L> {
    fn clone(&self) -> Self {
        Self {
            ledger: Arc::clone(&self.ledger),
        }
    }
}

impl<L: TransactionLedger> MutationQuery<L> {
    /// Creates a query over a ledger.
    #[must_use]
    pub const fn new(ledger: Arc<L>) -> Self {
        Self { ledger }
    }

    /// Returns the account's transfers on either side, most recent first.
    ///
    /// Bounds are inclusive. The limit applies after ordering. An unknown
    /// account yields an empty list.
    ///
    /// # Errors
    ///
    /// Returns `Validation` for malformed parameters, or a store error.
    #[instrument(skip(self))]
    pub async fn list(
        &self,
        account_id: AccountId,
        params: &MutationParams,
    ) -> Result<Vec<TransferRecord>, LedgerError> {
        let filter = resolve_mutation_filter(account_id, params)?;
        let records = self.ledger.query(&filter).await?;
        debug!(count = records.len(), "mutations listed");
        Ok(records)
    }

    /// Like [`list`](Self::list), bounded by a deadline.
    ///
    /// # Errors
    ///
    /// As for `list`, plus `DeadlineExceeded`.
    pub async fn list_before(
        &self,
        account_id: AccountId,
        params: &MutationParams,
        deadline: Instant,
    ) -> Result<Vec<TransferRecord>, LedgerError> {
        timeout_at(deadline, self.list(account_id, params))
            .await
            .unwrap_or(Err(LedgerError::DeadlineExceeded))
    }
}
