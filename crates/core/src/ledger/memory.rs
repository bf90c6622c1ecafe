//! In-memory ledger store.
//!
//! Committed state lives behind async read/write locks. Each account also has
//! its own mutex, the row lock, held by a unit of work from `lock_account`
//! until the unit ends. A unit works on private copies of the accounts it has
//! locked and publishes them, together with its staged records, in one step
//! at commit. Dropping or rolling back a unit discards the copies.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use tally_shared::types::{AccountId, TransferId};
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};

use super::error::LedgerError;
use super::store::{AccountStore, LedgerStore, LedgerUnit, TransactionLedger};
use super::types::{Account, MutationFilter, NewTransfer, TransferRecord};

#[derive(Debug, Default)]
struct Inner {
    accounts: RwLock<HashMap<AccountId, Account>>,
    row_locks: RwLock<HashMap<AccountId, Arc<Mutex<()>>>>,
    transfers: RwLock<Vec<TransferRecord>>,
    last_account_id: AtomicI64,
    last_transfer_id: AtomicI64,
}

impl Inner {
    async fn row_lock(&self, id: AccountId) -> Option<Arc<Mutex<()>>> {
        self.row_locks.read().await.get(&id).cloned()
    }

    async fn committed(&self, id: AccountId) -> Result<Account, LedgerError> {
        self.accounts
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or(LedgerError::AccountNotFound(id))
    }

    fn next_transfer(&self, transfer: NewTransfer) -> TransferRecord {
        let id = self.last_transfer_id.fetch_add(1, Ordering::SeqCst) + 1;
        TransferRecord {
            id: TransferId::new(id),
            category_id: transfer.category_id,
            from_account_id: transfer.from_account_id,
            to_account_id: transfer.to_account_id,
            amount: transfer.amount,
            created_at: transfer.created_at.unwrap_or_else(Utc::now),
        }
    }
}

/// Applies `delta` to an account, refusing overflow and negative results.
fn apply_delta(account: &mut Account, delta: i64) -> Result<i64, LedgerError> {
    let next = account
        .balance
        .checked_add(delta)
        .ok_or(LedgerError::BalanceOverflow {
            account_id: account.id,
            amount: delta,
        })?;
    if next < 0 {
        return Err(LedgerError::InsufficientFunds {
            account_id: account.id,
            balance: account.balance,
            requested: delta.saturating_neg(),
        });
    }
    account.balance = next;
    Ok(next)
}

fn select(records: impl Iterator<Item = TransferRecord>, filter: &MutationFilter) -> Vec<TransferRecord> {
    let mut matched: Vec<TransferRecord> = records.filter(|r| filter.matches(r)).collect();
    matched.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
    if let Some(limit) = filter.limit {
        matched.truncate(usize::try_from(limit).unwrap_or(usize::MAX));
    }
    matched
}

/// A [`LedgerStore`] kept entirely in process memory.
#[derive(Debug, Clone, Default)]
pub struct InMemoryLedgerStore {
    inner: Arc<Inner>,
}

impl InMemoryLedgerStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an account with an opening balance.
    pub async fn open_account(&self, name: impl Into<String>, balance: i64) -> Account {
        let id = AccountId::new(self.inner.last_account_id.fetch_add(1, Ordering::SeqCst) + 1);
        let account = Account {
            id,
            name: name.into(),
            balance: balance.max(0),
        };
        self.inner
            .row_locks
            .write()
            .await
            .insert(id, Arc::new(Mutex::new(())));
        self.inner
            .accounts
            .write()
            .await
            .insert(id, account.clone());
        account
    }

    /// Sum of all committed balances.
    pub async fn total_balance(&self) -> i128 {
        self.inner
            .accounts
            .read()
            .await
            .values()
            .map(|a| i128::from(a.balance))
            .sum()
    }

    /// Every committed record, in append order.
    pub async fn transfers(&self) -> Vec<TransferRecord> {
        self.inner.transfers.read().await.clone()
    }
}

#[async_trait]
impl AccountStore for InMemoryLedgerStore {
    async fn get_by_id(&self, id: AccountId) -> Result<Account, LedgerError> {
        self.inner.committed(id).await
    }

    async fn adjust_balance(&self, id: AccountId, delta: i64) -> Result<i64, LedgerError> {
        let lock = self
            .inner
            .row_lock(id)
            .await
            .ok_or(LedgerError::AccountNotFound(id))?;
        let _row = lock.lock().await;

        let mut accounts = self.inner.accounts.write().await;
        let account = accounts
            .get_mut(&id)
            .ok_or(LedgerError::AccountNotFound(id))?;
        apply_delta(account, delta)
    }
}

#[async_trait]
impl TransactionLedger for InMemoryLedgerStore {
    async fn append(&self, transfer: NewTransfer) -> Result<TransferRecord, LedgerError> {
        let record = self.inner.next_transfer(transfer);
        self.inner.transfers.write().await.push(record.clone());
        Ok(record)
    }

    async fn query(&self, filter: &MutationFilter) -> Result<Vec<TransferRecord>, LedgerError> {
        let transfers = self.inner.transfers.read().await;
        Ok(select(transfers.iter().cloned(), filter))
    }
}

#[async_trait]
impl LedgerStore for InMemoryLedgerStore {
    type Unit = InMemoryUnit;

    async fn begin(&self) -> Result<Self::Unit, LedgerError> {
        Ok(InMemoryUnit {
            inner: Arc::clone(&self.inner),
            state: Mutex::new(UnitState::default()),
        })
    }
}

#[derive(Debug, Default)]
struct UnitState {
    held: HashMap<AccountId, OwnedMutexGuard<()>>,
    working: HashMap<AccountId, Account>,
    staged: Vec<TransferRecord>,
}

/// Unit of work over an [`InMemoryLedgerStore`].
#[derive(Debug)]
pub struct InMemoryUnit {
    inner: Arc<Inner>,
    state: Mutex<UnitState>,
}

impl InMemoryUnit {
    /// Locks `id` into `state` if it is not held yet.
    async fn acquire(&self, state: &mut UnitState, id: AccountId) -> Result<bool, LedgerError> {
        if state.working.contains_key(&id) {
            return Ok(true);
        }
        let Some(lock) = self.inner.row_lock(id).await else {
            return Ok(false);
        };
        let guard = lock.lock_owned().await;
        let account = self.inner.committed(id).await?;
        state.held.insert(id, guard);
        state.working.insert(id, account);
        Ok(true)
    }
}

#[async_trait]
impl AccountStore for InMemoryUnit {
    async fn get_by_id(&self, id: AccountId) -> Result<Account, LedgerError> {
        if let Some(account) = self.state.lock().await.working.get(&id) {
            return Ok(account.clone());
        }
        self.inner.committed(id).await
    }

    async fn adjust_balance(&self, id: AccountId, delta: i64) -> Result<i64, LedgerError> {
        let mut state = self.state.lock().await;
        if !self.acquire(&mut state, id).await? {
            return Err(LedgerError::AccountNotFound(id));
        }
        let account = state
            .working
            .get_mut(&id)
            .ok_or(LedgerError::AccountNotFound(id))?;
        apply_delta(account, delta)
    }
}

#[async_trait]
impl TransactionLedger for InMemoryUnit {
    async fn append(&self, transfer: NewTransfer) -> Result<TransferRecord, LedgerError> {
        let record = self.inner.next_transfer(transfer);
        self.state.lock().await.staged.push(record.clone());
        Ok(record)
    }

    async fn query(&self, filter: &MutationFilter) -> Result<Vec<TransferRecord>, LedgerError> {
        let state = self.state.lock().await;
        let committed = self.inner.transfers.read().await;
        Ok(select(
            committed.iter().chain(state.staged.iter()).cloned(),
            filter,
        ))
    }
}

#[async_trait]
impl LedgerUnit for InMemoryUnit {
    async fn lock_account(&self, id: AccountId) -> Result<Option<Account>, LedgerError> {
        let mut state = self.state.lock().await;
        if !self.acquire(&mut state, id).await? {
            return Ok(None);
        }
        Ok(state.working.get(&id).cloned())
    }

    async fn commit(self) -> Result<(), LedgerError> {
        let state = self.state.into_inner();
        let mut accounts = self.inner.accounts.write().await;
        let mut transfers = self.inner.transfers.write().await;
        accounts.extend(state.working);
        transfers.extend(state.staged);
        // Row locks are released when `state.held` drops, after publishing.
        drop(transfers);
        drop(accounts);
        drop(state.held);
        Ok(())
    }

    async fn rollback(self) -> Result<(), LedgerError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_adjust_balance_rejects_negative_result() {
        let store = InMemoryLedgerStore::new();
        let account = store.open_account("a", 50).await;

        assert_eq!(store.adjust_balance(account.id, -20).await, Ok(30));
        let err = store.adjust_balance(account.id, -31).await.unwrap_err();
        assert_eq!(
            err,
            LedgerError::InsufficientFunds {
                account_id: account.id,
                balance: 30,
                requested: 31
            }
        );
        assert_eq!(store.get_by_id(account.id).await.unwrap().balance, 30);
    }

    #[tokio::test]
    async fn test_adjust_balance_rejects_overflow() {
        let store = InMemoryLedgerStore::new();
        let account = store.open_account("a", i64::MAX - 1).await;

        assert_eq!(
            store.adjust_balance(account.id, 2).await,
            Err(LedgerError::BalanceOverflow {
                account_id: account.id,
                amount: 2
            })
        );
        assert_eq!(store.get_by_id(account.id).await.unwrap().balance, i64::MAX - 1);
    }

    #[tokio::test]
    async fn test_adjust_unknown_account() {
        let store = InMemoryLedgerStore::new();
        assert_eq!(
            store.adjust_balance(AccountId::new(42), 1).await,
            Err(LedgerError::AccountNotFound(AccountId::new(42)))
        );
    }

    #[tokio::test]
    async fn test_unit_changes_invisible_until_commit() {
        let store = InMemoryLedgerStore::new();
        let a = store.open_account("a", 100).await;

        let unit = store.begin().await.unwrap();
        unit.lock_account(a.id).await.unwrap();
        unit.adjust_balance(a.id, -40).await.unwrap();
        assert_eq!(unit.get_by_id(a.id).await.unwrap().balance, 60);
        assert_eq!(store.get_by_id(a.id).await.unwrap().balance, 100);

        unit.commit().await.unwrap();
        assert_eq!(store.get_by_id(a.id).await.unwrap().balance, 60);
    }

    #[tokio::test]
    async fn test_dropped_unit_discards_changes_and_releases_lock() {
        let store = InMemoryLedgerStore::new();
        let a = store.open_account("a", 100).await;
        let b = store.open_account("b", 0).await;

        {
            let unit = store.begin().await.unwrap();
            unit.adjust_balance(a.id, -100).await.unwrap();
            unit.adjust_balance(b.id, 100).await.unwrap();
            unit.append(NewTransfer {
                category_id: None,
                from_account_id: a.id,
                to_account_id: b.id,
                amount: 100,
                created_at: None,
            })
            .await
            .unwrap();
        }

        assert_eq!(store.get_by_id(a.id).await.unwrap().balance, 100);
        assert_eq!(store.get_by_id(b.id).await.unwrap().balance, 0);
        assert!(store.transfers().await.is_empty());
        // Lock was released with the unit.
        assert_eq!(store.adjust_balance(a.id, 1).await, Ok(101));
    }

    #[tokio::test]
    async fn test_lock_unknown_account_returns_none() {
        let store = InMemoryLedgerStore::new();
        let unit = store.begin().await.unwrap();
        assert_eq!(unit.lock_account(AccountId::new(5)).await, Ok(None));
    }

    #[tokio::test]
    async fn test_transfer_ids_increase() {
        let store = InMemoryLedgerStore::new();
        let a = store.open_account("a", 0).await;
        let b = store.open_account("b", 0).await;
        let mut last = 0;
        for _ in 0..3 {
            let record = store
                .append(NewTransfer {
                    category_id: None,
                    from_account_id: a.id,
                    to_account_id: b.id,
                    amount: 1,
                    created_at: None,
                })
                .await
                .unwrap();
            assert!(record.id.into_inner() > last);
            last = record.id.into_inner();
        }
    }
}
