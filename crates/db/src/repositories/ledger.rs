//! Durable ledger store backed by SeaORM.
//!
//! Implements the core storage traits over a database connection. A unit of
//! work is one database transaction; account rows are locked with
//! `SELECT ... FOR UPDATE` and balances move through a conditional update, so
//! the `balance >= 0` invariant holds even without the row lock.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, Utc};
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, ConnectionTrait, DatabaseBackend,
    DatabaseConnection, DatabaseTransaction, DbErr, EntityTrait, QueryFilter, QueryOrder,
    QuerySelect, RuntimeErr, Set, SqlErr, TransactionTrait,
};
use tally_core::ledger::{
    Account, AccountStore, LedgerError, LedgerStore, LedgerUnit, MutationFilter, NewTransfer,
    TransactionLedger, TransferRecord,
};
use tally_shared::types::{AccountId, CategoryId, TransferId};
use tracing::{debug, warn};

use crate::entities::{accounts, transfers};

/// PostgreSQL: serialization_failure, deadlock_detected, lock_not_available.
/// SQLite: SQLITE_BUSY, SQLITE_LOCKED, SQLITE_BUSY_SNAPSHOT.
const CONFLICT_CODES: &[&str] = &["40001", "40P01", "55P03", "5", "6", "517"];

/// Default wait for a row lock.
pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(2);

/// Maps a database error to a ledger error.
///
/// Lock and serialization conflicts become the retryable
/// `ConcurrentModification`; anything else is `Storage`.
pub fn classify_db_error(err: DbErr) -> LedgerError {
    let code = match &err {
        DbErr::Exec(RuntimeErr::SqlxError(sqlx::Error::Database(db)))
        | DbErr::Query(RuntimeErr::SqlxError(sqlx::Error::Database(db)))
        | DbErr::Conn(RuntimeErr::SqlxError(sqlx::Error::Database(db))) => {
            db.code().map(|c| c.into_owned())
        }
        _ => None,
    };

    match code {
        Some(code) if CONFLICT_CODES.contains(&code.as_str()) => {
            debug!(%code, "database conflict");
            LedgerError::ConcurrentModification
        }
        _ => LedgerError::Storage(err.to_string()),
    }
}

fn to_db_time(ts: DateTime<Utc>) -> DateTime<FixedOffset> {
    ts.fixed_offset()
}

fn to_account(model: accounts::Model) -> Account {
    Account {
        id: AccountId::new(model.id),
        name: model.name,
        balance: model.balance,
    }
}

fn to_record(model: transfers::Model) -> TransferRecord {
    TransferRecord {
        id: TransferId::new(model.id),
        category_id: model.category_id.map(CategoryId::new),
        from_account_id: AccountId::new(model.from_account_id),
        to_account_id: AccountId::new(model.to_account_id),
        amount: model.amount,
        created_at: model.created_at.with_timezone(&Utc),
    }
}

async fn fetch_account<C: ConnectionTrait>(
    conn: &C,
    id: AccountId,
) -> Result<Option<accounts::Model>, LedgerError> {
    accounts::Entity::find_by_id(id.into_inner())
        .one(conn)
        .await
        .map_err(classify_db_error)
}

/// `UPDATE accounts SET balance = balance + delta WHERE id = ? AND <stays in range>`.
///
/// Zero affected rows are disambiguated by re-reading the row.
async fn apply_delta<C: ConnectionTrait>(
    conn: &C,
    id: AccountId,
    delta: i64,
) -> Result<i64, LedgerError> {
    let mut update = accounts::Entity::update_many()
        .col_expr(
            accounts::Column::Balance,
            Expr::col(accounts::Column::Balance).add(delta),
        )
        .col_expr(
            accounts::Column::UpdatedAt,
            Expr::value(to_db_time(Utc::now())),
        )
        .filter(accounts::Column::Id.eq(id.into_inner()));

    update = if delta < 0 {
        update.filter(accounts::Column::Balance.gte(delta.saturating_neg()))
    } else {
        // SQLite silently widens overflowing integers to REAL.
        update.filter(accounts::Column::Balance.lte(i64::MAX - delta))
    };

    let result = update.exec(conn).await.map_err(classify_db_error)?;
    let current = fetch_account(conn, id)
        .await?
        .ok_or(LedgerError::AccountNotFound(id))?;

    if result.rows_affected == 0 {
        if delta < 0 {
            return Err(LedgerError::InsufficientFunds {
                account_id: id,
                balance: current.balance,
                requested: delta.saturating_neg(),
            });
        }
        return Err(LedgerError::BalanceOverflow {
            account_id: id,
            amount: delta,
        });
    }

    Ok(current.balance)
}

async fn insert_transfer<C: ConnectionTrait>(
    conn: &C,
    transfer: NewTransfer,
) -> Result<TransferRecord, LedgerError> {
    let created_at = transfer.created_at.unwrap_or_else(Utc::now);
    let model = transfers::ActiveModel {
        category_id: Set(transfer.category_id.map(CategoryId::into_inner)),
        from_account_id: Set(transfer.from_account_id.into_inner()),
        to_account_id: Set(transfer.to_account_id.into_inner()),
        amount: Set(transfer.amount),
        created_at: Set(to_db_time(created_at)),
        ..Default::default()
    };

    match model.insert(conn).await {
        Ok(model) => Ok(to_record(model)),
        Err(err) => match (err.sql_err(), transfer.category_id) {
            (Some(SqlErr::ForeignKeyConstraintViolation(_)), Some(category_id)) => {
                Err(LedgerError::CategoryNotFound(category_id))
            }
            _ => Err(classify_db_error(err)),
        },
    }
}

async fn select_transfers<C: ConnectionTrait>(
    conn: &C,
    filter: &MutationFilter,
) -> Result<Vec<TransferRecord>, LedgerError> {
    let account_id = filter.account_id.into_inner();
    let mut query = transfers::Entity::find().filter(
        Condition::any()
            .add(transfers::Column::FromAccountId.eq(account_id))
            .add(transfers::Column::ToAccountId.eq(account_id)),
    );

    if let Some(start) = filter.start {
        query = query.filter(transfers::Column::CreatedAt.gte(to_db_time(start)));
    }
    if let Some(end) = filter.end {
        query = query.filter(transfers::Column::CreatedAt.lte(to_db_time(end)));
    }

    let rows = query
        .order_by_desc(transfers::Column::CreatedAt)
        .order_by_desc(transfers::Column::Id)
        .limit(filter.limit)
        .all(conn)
        .await
        .map_err(classify_db_error)?;

    Ok(rows.into_iter().map(to_record).collect())
}

/// [`LedgerStore`] over a SeaORM connection.
#[derive(Debug, Clone)]
pub struct SeaLedgerStore {
    db: DatabaseConnection,
    lock_timeout: Duration,
}

impl SeaLedgerStore {
    /// Creates a store with the default lock timeout.
    #[must_use]
    pub const fn new(db: DatabaseConnection) -> Self {
        Self {
            db,
            lock_timeout: DEFAULT_LOCK_TIMEOUT,
        }
    }

    /// Sets how long a unit waits for a row lock (PostgreSQL only).
    #[must_use]
    pub const fn with_lock_timeout(mut self, lock_timeout: Duration) -> Self {
        self.lock_timeout = lock_timeout;
        self
    }

    /// Returns the underlying connection.
    #[must_use]
    pub const fn connection(&self) -> &DatabaseConnection {
        &self.db
    }

    /// Opens a transaction whose row-lock waits are bounded by `lock_timeout`.
    async fn begin_txn(&self) -> Result<DatabaseTransaction, LedgerError> {
        let txn = self.db.begin().await.map_err(classify_db_error)?;

        if txn.get_database_backend() == DatabaseBackend::Postgres {
            let millis = self.lock_timeout.as_millis().max(1);
            txn.execute_unprepared(&format!("SET LOCAL lock_timeout = '{millis}ms'"))
                .await
                .map_err(classify_db_error)?;
        }

        Ok(txn)
    }
}

#[async_trait]
impl AccountStore for SeaLedgerStore {
    async fn get_by_id(&self, id: AccountId) -> Result<Account, LedgerError> {
        fetch_account(&self.db, id)
            .await?
            .map(to_account)
            .ok_or(LedgerError::AccountNotFound(id))
    }

    async fn adjust_balance(&self, id: AccountId, delta: i64) -> Result<i64, LedgerError> {
        let txn = self.begin_txn().await?;
        match apply_delta(&txn, id, delta).await {
            Ok(balance) => {
                txn.commit().await.map_err(classify_db_error)?;
                Ok(balance)
            }
            Err(err) => {
                if let Err(rollback_err) = txn.rollback().await {
                    warn!(account_id = %id, error = %rollback_err, "rollback of balance adjustment failed");
                }
                Err(err)
            }
        }
    }
}

#[async_trait]
impl TransactionLedger for SeaLedgerStore {
    async fn append(&self, transfer: NewTransfer) -> Result<TransferRecord, LedgerError> {
        insert_transfer(&self.db, transfer).await
    }

    async fn query(&self, filter: &MutationFilter) -> Result<Vec<TransferRecord>, LedgerError> {
        select_transfers(&self.db, filter).await
    }
}

#[async_trait]
impl LedgerStore for SeaLedgerStore {
    type Unit = SeaLedgerUnit;

    async fn begin(&self) -> Result<Self::Unit, LedgerError> {
        let txn = self.begin_txn().await?;
        Ok(SeaLedgerUnit { txn })
    }
}

/// Unit of work over one database transaction.
///
/// Dropping the unit without committing rolls the transaction back.
#[derive(Debug)]
pub struct SeaLedgerUnit {
    txn: DatabaseTransaction,
}

#[async_trait]
impl AccountStore for SeaLedgerUnit {
    async fn get_by_id(&self, id: AccountId) -> Result<Account, LedgerError> {
        fetch_account(&self.txn, id)
            .await?
            .map(to_account)
            .ok_or(LedgerError::AccountNotFound(id))
    }

    async fn adjust_balance(&self, id: AccountId, delta: i64) -> Result<i64, LedgerError> {
        apply_delta(&self.txn, id, delta).await
    }
}

#[async_trait]
impl TransactionLedger for SeaLedgerUnit {
    async fn append(&self, transfer: NewTransfer) -> Result<TransferRecord, LedgerError> {
        insert_transfer(&self.txn, transfer).await
    }

    async fn query(&self, filter: &MutationFilter) -> Result<Vec<TransferRecord>, LedgerError> {
        select_transfers(&self.txn, filter).await
    }
}

#[async_trait]
impl LedgerUnit for SeaLedgerUnit {
    async fn lock_account(&self, id: AccountId) -> Result<Option<Account>, LedgerError> {
        // FOR UPDATE is dropped by the SQLite query builder; there the
        // transaction holds the whole database instead.
        let account = accounts::Entity::find_by_id(id.into_inner())
            .lock_exclusive()
            .one(&self.txn)
            .await
            .map_err(classify_db_error)?;
        Ok(account.map(to_account))
    }

    async fn commit(self) -> Result<(), LedgerError> {
        self.txn.commit().await.map_err(classify_db_error)
    }

    async fn rollback(self) -> Result<(), LedgerError> {
        self.txn.rollback().await.map_err(classify_db_error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_non_database_errors_are_storage() {
        let err = classify_db_error(DbErr::Custom("boom".into()));
        assert!(matches!(err, LedgerError::Storage(_)));
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_record_mapping_normalizes_to_utc() {
        let created_at = DateTime::parse_from_rfc3339("2026-03-01T10:00:00+02:00").unwrap();
        let record = to_record(transfers::Model {
            id: 4,
            category_id: None,
            from_account_id: 1,
            to_account_id: 2,
            amount: 10,
            created_at,
        });
        assert_eq!(record.created_at.to_rfc3339(), "2026-03-01T08:00:00+00:00");
        assert_eq!(record.category_id, None);
    }
}
