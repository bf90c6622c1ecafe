//! Transfer engine.
//!
//! A transfer validates its request, opens a unit of work, locks both
//! accounts in ascending ID order, debits, credits, appends one ledger record
//! and commits. Any failure before commit rolls the unit back. Store conflicts
//! restart the whole unit under the retry policy.

use std::future::Future;
use std::sync::Arc;

use tally_shared::types::AccountId;
use tokio::time::{Instant, sleep, timeout_at};
use tracing::{debug, error, info, instrument, warn};

use super::error::LedgerError;
use super::lock::lock_order;
use super::retry::RetryPolicy;
use super::store::{AccountStore, LedgerStore, LedgerUnit, TransactionLedger};
use super::types::{NewTransfer, TransferRecord, TransferRequest};
use super::validation::{
    checked_credit, ensure_sufficient_funds, validate_amount, validate_transfer,
};

/// Balances seen under lock and the legs this unit has applied so far.
#[derive(Debug, Clone, Copy)]
struct Observed {
    from: AccountId,
    from_balance: i64,
    to: AccountId,
    to_balance: i64,
    amount: i64,
    debited: bool,
    credited: bool,
}

impl Observed {
    /// Uncommitted balance changes, per account, made by this unit.
    fn applied(&self) -> impl Iterator<Item = (AccountId, i64, i64)> {
        let debit = self
            .debited
            .then_some((self.from, self.from_balance, -self.amount));
        let credit = self
            .credited
            .then_some((self.to, self.to_balance, self.amount));
        debit.into_iter().chain(credit)
    }
}

/// Executes transfers and top-ups against a [`LedgerStore`].
#[derive(Debug)]
pub struct TransferEngine<S> {
    store: Arc<S>,
    policy: RetryPolicy,
}

impl<S> Clone for TransferEngine<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            policy: self.policy,
        }
    }
}

impl<S: LedgerStore> TransferEngine<S> {
    /// Creates an engine with the default retry policy.
    #[must_use]
    pub fn new(store: Arc<S>) -> Self {
        Self::with_policy(store, RetryPolicy::default())
    }

    /// Creates an engine with an explicit retry policy.
    #[must_use]
    pub const fn with_policy(store: Arc<S>, policy: RetryPolicy) -> Self {
        Self { store, policy }
    }

    /// Returns the underlying store.
    #[must_use]
    pub const fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Returns the retry policy.
    #[must_use]
    pub const fn policy(&self) -> RetryPolicy {
        self.policy
    }

    /// Moves `amount` from one account to another and records it.
    ///
    /// # Errors
    ///
    /// Returns `InvalidAmount` or `InvalidTransfer` before touching the store,
    /// `AccountNotFound` or `InsufficientFunds` after locking,
    /// `ConcurrencyConflict` once the retry budget is spent, or `Storage`.
    #[instrument(skip(self, request), fields(from = %request.from_account_id, to = %request.to_account_id, amount = request.amount))]
    pub async fn transfer(&self, request: TransferRequest) -> Result<TransferRecord, LedgerError> {
        self.run_transfer(&request, None).await
    }

    /// Like [`transfer`](Self::transfer), but gives up with
    /// `DeadlineExceeded` if `deadline` passes before the commit point.
    ///
    /// The commit itself is never interrupted.
    ///
    /// # Errors
    ///
    /// As for `transfer`, plus `DeadlineExceeded`.
    #[instrument(skip(self, request, deadline), fields(from = %request.from_account_id, to = %request.to_account_id, amount = request.amount))]
    pub async fn transfer_before(
        &self,
        request: TransferRequest,
        deadline: Instant,
    ) -> Result<TransferRecord, LedgerError> {
        self.run_transfer(&request, Some(deadline)).await
    }

    /// Credits an account without a counterparty and returns the new balance.
    ///
    /// No ledger record is written.
    ///
    /// # Errors
    ///
    /// Returns `InvalidAmount`, `AccountNotFound`, `ConcurrencyConflict`, or
    /// `Storage`.
    #[instrument(skip(self))]
    pub async fn top_up(&self, account_id: AccountId, amount: i64) -> Result<i64, LedgerError> {
        validate_amount(amount)?;
        let balance = self
            .with_retry(None, || self.store.adjust_balance(account_id, amount))
            .await?;
        info!(%account_id, amount, balance, "account topped up");
        Ok(balance)
    }

    async fn run_transfer(
        &self,
        request: &TransferRequest,
        deadline: Option<Instant>,
    ) -> Result<TransferRecord, LedgerError> {
        validate_transfer(request)?;

        let record = self
            .with_retry(deadline, || self.attempt(request, deadline))
            .await?;

        info!(transfer_id = %record.id, "transfer committed");
        Ok(record)
    }

    /// Runs `op` until it succeeds, fails with a non-retryable error, or the
    /// retry budget or deadline runs out.
    async fn with_retry<T, F, Fut>(
        &self,
        deadline: Option<Instant>,
        mut op: F,
    ) -> Result<T, LedgerError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, LedgerError>>,
    {
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            match op().await {
                Ok(value) => return Ok(value),
                Err(err) if err.is_retryable() => {
                    if !self.policy.allows_retry(attempt) {
                        warn!(attempts = attempt, "retry budget exhausted");
                        return Err(LedgerError::ConcurrencyConflict { attempts: attempt });
                    }
                    let delay = self.policy.backoff(attempt);
                    if deadline.is_some_and(|d| Instant::now() + delay >= d) {
                        return Err(LedgerError::DeadlineExceeded);
                    }
                    warn!(attempt, ?delay, error = %err, "conflict, retrying");
                    sleep(delay).await;
                }
                Err(err) => return Err(err),
            }
        }
    }

    async fn attempt(
        &self,
        request: &TransferRequest,
        deadline: Option<Instant>,
    ) -> Result<TransferRecord, LedgerError> {
        let unit = within(deadline, self.store.begin()).await?;

        let mut observed = None;
        let staged = within(deadline, stage(&unit, request, &mut observed))
            .await
            .and_then(|record| {
                if deadline.is_some_and(|d| Instant::now() >= d) {
                    Err(LedgerError::DeadlineExceeded)
                } else {
                    Ok(record)
                }
            });

        match staged {
            Ok(record) => {
                // Past this point the unit is never retried, so a record is
                // appended at most once.
                unit.commit().await.map_err(|err| {
                    error!(error = %err, "commit failed");
                    LedgerError::Storage(format!("commit failed: {err}"))
                })?;
                Ok(record)
            }
            Err(err) => {
                debug!(error = %err, "rolling back transfer");
                if let Err(rollback_err) = unit.rollback().await {
                    error!(error = %rollback_err, "rollback failed");
                }
                if let Some(observed) = observed.filter(|o| o.debited) {
                    self.verify_rolled_back(observed).await;
                }
                Err(err)
            }
        }
    }

    /// Re-reads the accounts this unit changed and warns if a change
    /// outlived the rollback.
    ///
    /// The row locks are already released, so other commits may have moved
    /// the balance since; only a balance that sits exactly at the seen value
    /// plus this unit's delta is reported as a leak.
    async fn verify_rolled_back(&self, observed: Observed) {
        for (id, seen, delta) in observed.applied() {
            match self.store.get_by_id(id).await {
                Ok(account) if account.balance == seen => {}
                Ok(account) if seen.checked_add(delta) == Some(account.balance) => warn!(
                    account_id = %id,
                    seen,
                    delta,
                    actual = account.balance,
                    "uncommitted change survived rollback"
                ),
                Ok(account) => debug!(
                    account_id = %id,
                    seen,
                    actual = account.balance,
                    "balance moved concurrently after rollback"
                ),
                Err(err) => warn!(account_id = %id, error = %err, "could not re-read balance after rollback"),
            }
        }
    }
}

/// Performs every step of a transfer inside `unit`, short of committing.
async fn stage<U: LedgerUnit>(
    unit: &U,
    request: &TransferRequest,
    observed: &mut Option<Observed>,
) -> Result<TransferRecord, LedgerError> {
    let from = request.from_account_id;
    let to = request.to_account_id;

    let [first, second] = lock_order(from, to);
    let first_account = unit.lock_account(first).await?;
    let second_account = unit.lock_account(second).await?;
    let (source, destination) = if first == from {
        (first_account, second_account)
    } else {
        (second_account, first_account)
    };

    let source = source.ok_or(LedgerError::AccountNotFound(from))?;
    let destination = destination.ok_or(LedgerError::AccountNotFound(to))?;
    ensure_sufficient_funds(from, source.balance, request.amount)?;
    checked_credit(to, destination.balance, request.amount)?;

    let progress = observed.insert(Observed {
        from,
        from_balance: source.balance,
        to,
        to_balance: destination.balance,
        amount: request.amount,
        debited: false,
        credited: false,
    });

    unit.adjust_balance(from, -request.amount).await?;
    progress.debited = true;
    unit.adjust_balance(to, request.amount).await?;
    progress.credited = true;
    unit.append(NewTransfer::from(request)).await
}

async fn within<T>(
    deadline: Option<Instant>,
    fut: impl Future<Output = Result<T, LedgerError>>,
) -> Result<T, LedgerError> {
    match deadline {
        Some(deadline) => timeout_at(deadline, fut)
            .await
            .unwrap_or(Err(LedgerError::DeadlineExceeded)),
        None => fut.await,
    }
}
