//! Integration tests for SeaLedgerStore and the transfer engine over SQLite.

mod common;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use futures::future::join_all;
use tally_core::ledger::{
    Account, AccountStore, LedgerError, LedgerStore, LedgerUnit, MutationFilter, MutationParams,
    MutationQuery, NewTransfer, TransactionLedger, TransferEngine, TransferRecord,
    TransferRequest,
};
use tally_db::repositories::ledger::SeaLedgerUnit;
use tally_db::{CategoryRepository, SeaLedgerStore, repositories::CreateCategoryInput};
use tally_shared::types::{AccountId, CategoryId};

use common::{account_with_balance, sqlite_db};

fn request(from: AccountId, to: AccountId, amount: i64) -> TransferRequest {
    TransferRequest {
        from_account_id: from,
        to_account_id: to,
        amount,
        category_id: None,
    }
}

fn at(day: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, day, 12, 0, 0).unwrap()
}

async fn balance(store: &SeaLedgerStore, id: AccountId) -> i64 {
    store.get_by_id(id).await.unwrap().balance
}

// ========== AccountStore ==========

#[tokio::test]
async fn test_adjust_balance_conditional_update() {
    let db = sqlite_db().await;
    let store = SeaLedgerStore::new(db.clone());
    let x = account_with_balance(&db, "x", 100).await;

    assert_eq!(store.adjust_balance(x, -60).await, Ok(40));
    assert_eq!(
        store.adjust_balance(x, -41).await,
        Err(LedgerError::InsufficientFunds {
            account_id: x,
            balance: 40,
            requested: 41
        })
    );
    assert_eq!(balance(&store, x).await, 40);
}

#[tokio::test]
async fn test_adjust_balance_unknown_account() {
    let db = sqlite_db().await;
    let store = SeaLedgerStore::new(db);
    let ghost = AccountId::new(404);

    assert_eq!(
        store.adjust_balance(ghost, 10).await,
        Err(LedgerError::AccountNotFound(ghost))
    );
    assert_eq!(
        store.get_by_id(ghost).await,
        Err(LedgerError::AccountNotFound(ghost))
    );
}

#[tokio::test]
async fn test_adjust_balance_refuses_overflow() {
    let db = sqlite_db().await;
    let store = SeaLedgerStore::new(db.clone());
    let x = account_with_balance(&db, "x", i64::MAX - 5).await;

    assert_eq!(
        store.adjust_balance(x, 6).await,
        Err(LedgerError::BalanceOverflow {
            account_id: x,
            amount: 6
        })
    );
    assert_eq!(balance(&store, x).await, i64::MAX - 5);
}

// ========== Units of work ==========

#[tokio::test]
async fn test_unit_rollback_discards_everything() {
    let db = sqlite_db().await;
    let store = SeaLedgerStore::new(db.clone());
    let x = account_with_balance(&db, "x", 100).await;
    let y = account_with_balance(&db, "y", 0).await;

    let unit = store.begin().await.unwrap();
    unit.lock_account(x).await.unwrap();
    unit.adjust_balance(x, -100).await.unwrap();
    unit.adjust_balance(y, 100).await.unwrap();
    unit.append(NewTransfer {
        category_id: None,
        from_account_id: x,
        to_account_id: y,
        amount: 100,
        created_at: None,
    })
    .await
    .unwrap();
    unit.rollback().await.unwrap();

    assert_eq!(balance(&store, x).await, 100);
    assert_eq!(balance(&store, y).await, 0);
    let history = store.query(&MutationFilter::for_account(x)).await.unwrap();
    assert!(history.is_empty());
}

#[tokio::test]
async fn test_lock_unknown_account_returns_none() {
    let db = sqlite_db().await;
    let store = SeaLedgerStore::new(db);
    let unit = store.begin().await.unwrap();
    assert_eq!(unit.lock_account(AccountId::new(9)).await, Ok(None));
}

// ========== TransactionLedger ==========

#[tokio::test]
async fn test_append_assigns_increasing_ids() {
    let db = sqlite_db().await;
    let store = SeaLedgerStore::new(db.clone());
    let x = account_with_balance(&db, "x", 0).await;
    let y = account_with_balance(&db, "y", 0).await;

    let mut last = 0;
    for _ in 0..3 {
        let record = store
            .append(NewTransfer {
                category_id: None,
                from_account_id: x,
                to_account_id: y,
                amount: 1,
                created_at: None,
            })
            .await
            .unwrap();
        assert!(record.id.into_inner() > last);
        last = record.id.into_inner();
    }
}

#[tokio::test]
async fn test_append_with_unknown_category() {
    let db = sqlite_db().await;
    let store = SeaLedgerStore::new(db.clone());
    let x = account_with_balance(&db, "x", 0).await;
    let y = account_with_balance(&db, "y", 0).await;

    let result = store
        .append(NewTransfer {
            category_id: Some(CategoryId::new(77)),
            from_account_id: x,
            to_account_id: y,
            amount: 1,
            created_at: None,
        })
        .await;
    assert_eq!(result, Err(LedgerError::CategoryNotFound(CategoryId::new(77))));
}

#[tokio::test]
async fn test_history_ordering_and_bounds() {
    let db = sqlite_db().await;
    let store = Arc::new(SeaLedgerStore::new(db.clone()));
    let x = account_with_balance(&db, "x", 0).await;
    let y = account_with_balance(&db, "y", 0).await;
    let z = account_with_balance(&db, "z", 0).await;

    for (day, amount) in [(1, 10), (2, 20), (3, 30)] {
        store
            .append(NewTransfer {
                category_id: None,
                from_account_id: x,
                to_account_id: y,
                amount,
                created_at: Some(at(day)),
            })
            .await
            .unwrap();
    }
    // Unrelated transfer never shows up in x's history.
    store
        .append(NewTransfer {
            category_id: None,
            from_account_id: y,
            to_account_id: z,
            amount: 99,
            created_at: Some(at(2)),
        })
        .await
        .unwrap();

    let query = MutationQuery::new(Arc::clone(&store));
    let amounts = |records: Vec<TransferRecord>| records.iter().map(|r| r.amount).collect::<Vec<_>>();

    let all = query.list(x, &MutationParams::default()).await.unwrap();
    assert_eq!(amounts(all), vec![30, 20, 10]);

    let from_t2 = MutationParams {
        start_date: Some("2026-03-02".into()),
        ..MutationParams::default()
    };
    assert_eq!(amounts(query.list(x, &from_t2).await.unwrap()), vec![30, 20]);

    let until_t2 = MutationParams {
        end_date: Some("2026-03-02".into()),
        ..MutationParams::default()
    };
    assert_eq!(amounts(query.list(x, &until_t2).await.unwrap()), vec![20, 10]);

    let latest = MutationParams {
        limit: Some(1),
        ..MutationParams::default()
    };
    assert_eq!(amounts(query.list(x, &latest).await.unwrap()), vec![30]);

    // y sees both sides.
    assert_eq!(
        amounts(query.list(y, &MutationParams::default()).await.unwrap()),
        vec![30, 99, 20, 10]
    );
}

#[tokio::test]
async fn test_same_timestamp_ties_broken_by_id() {
    let db = sqlite_db().await;
    let store = Arc::new(SeaLedgerStore::new(db.clone()));
    let x = account_with_balance(&db, "x", 0).await;
    let y = account_with_balance(&db, "y", 0).await;

    for amount in [1, 2, 3] {
        store
            .append(NewTransfer {
                category_id: None,
                from_account_id: x,
                to_account_id: y,
                amount,
                created_at: Some(at(5)),
            })
            .await
            .unwrap();
    }

    let records = store.query(&MutationFilter::for_account(x)).await.unwrap();
    let amounts: Vec<i64> = records.iter().map(|r| r.amount).collect();
    assert_eq!(amounts, vec![3, 2, 1]);
}

// ========== TransferEngine over SQLite ==========

#[tokio::test]
async fn test_engine_transfer_end_to_end() {
    let db = sqlite_db().await;
    let store = Arc::new(SeaLedgerStore::new(db.clone()));
    let x = account_with_balance(&db, "x", 500).await;
    let y = account_with_balance(&db, "y", 0).await;
    let category = CategoryRepository::new(db.clone())
        .create_category(CreateCategoryInput {
            name: "rent".into(),
            description: None,
        })
        .await
        .unwrap();

    let engine = TransferEngine::new(Arc::clone(&store));
    let mut req = request(x, y, 200);
    req.category_id = Some(CategoryId::new(category.id));
    let record = engine.transfer(req).await.unwrap();

    assert_eq!(record.category_id, Some(CategoryId::new(category.id)));
    assert_eq!(balance(&store, x).await, 300);
    assert_eq!(balance(&store, y).await, 200);

    let history = store.query(&MutationFilter::for_account(y)).await.unwrap();
    assert_eq!(history, vec![record]);
}

#[tokio::test]
async fn test_engine_unknown_category_rolls_back() {
    let db = sqlite_db().await;
    let store = Arc::new(SeaLedgerStore::new(db.clone()));
    let x = account_with_balance(&db, "x", 500).await;
    let y = account_with_balance(&db, "y", 0).await;

    let engine = TransferEngine::new(Arc::clone(&store));
    let mut req = request(x, y, 200);
    req.category_id = Some(CategoryId::new(31));

    assert_eq!(
        engine.transfer(req).await,
        Err(LedgerError::CategoryNotFound(CategoryId::new(31)))
    );
    assert_eq!(balance(&store, x).await, 500);
    assert_eq!(balance(&store, y).await, 0);
}

#[tokio::test]
async fn test_engine_insufficient_funds() {
    let db = sqlite_db().await;
    let store = Arc::new(SeaLedgerStore::new(db.clone()));
    let x = account_with_balance(&db, "x", 50).await;
    let y = account_with_balance(&db, "y", 0).await;
    let engine = TransferEngine::new(Arc::clone(&store));

    let err = engine.transfer(request(x, y, 80)).await.unwrap_err();
    assert_eq!(err.error_code(), "INSUFFICIENT_FUNDS");
    assert_eq!(balance(&store, x).await, 50);
    assert!(store.query(&MutationFilter::for_account(x)).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_engine_top_up() {
    let db = sqlite_db().await;
    let store = Arc::new(SeaLedgerStore::new(db.clone()));
    let x = account_with_balance(&db, "x", 0).await;
    let engine = TransferEngine::new(Arc::clone(&store));

    assert_eq!(engine.top_up(x, 250).await, Ok(250));
    assert_eq!(engine.top_up(x, 50).await, Ok(300));
    assert!(store.query(&MutationFilter::for_account(x)).await.unwrap().is_empty());
}

// ========== Failure injection ==========

/// Store whose units fail on ledger append, after both balance legs.
#[derive(Debug, Clone)]
struct FailingAppendStore(SeaLedgerStore);

#[derive(Debug)]
struct FailingAppendUnit(SeaLedgerUnit);

#[async_trait]
impl AccountStore for FailingAppendStore {
    async fn get_by_id(&self, id: AccountId) -> Result<Account, LedgerError> {
        self.0.get_by_id(id).await
    }

    async fn adjust_balance(&self, id: AccountId, delta: i64) -> Result<i64, LedgerError> {
        self.0.adjust_balance(id, delta).await
    }
}

#[async_trait]
impl TransactionLedger for FailingAppendStore {
    async fn append(&self, transfer: NewTransfer) -> Result<TransferRecord, LedgerError> {
        self.0.append(transfer).await
    }

    async fn query(&self, filter: &MutationFilter) -> Result<Vec<TransferRecord>, LedgerError> {
        self.0.query(filter).await
    }
}

#[async_trait]
impl LedgerStore for FailingAppendStore {
    type Unit = FailingAppendUnit;

    async fn begin(&self) -> Result<Self::Unit, LedgerError> {
        Ok(FailingAppendUnit(self.0.begin().await?))
    }
}

#[async_trait]
impl AccountStore for FailingAppendUnit {
    async fn get_by_id(&self, id: AccountId) -> Result<Account, LedgerError> {
        self.0.get_by_id(id).await
    }

    async fn adjust_balance(&self, id: AccountId, delta: i64) -> Result<i64, LedgerError> {
        self.0.adjust_balance(id, delta).await
    }
}

#[async_trait]
impl TransactionLedger for FailingAppendUnit {
    async fn append(&self, _transfer: NewTransfer) -> Result<TransferRecord, LedgerError> {
        Err(LedgerError::Storage("injected append failure".into()))
    }

    async fn query(&self, filter: &MutationFilter) -> Result<Vec<TransferRecord>, LedgerError> {
        self.0.query(filter).await
    }
}

#[async_trait]
impl LedgerUnit for FailingAppendUnit {
    async fn lock_account(&self, id: AccountId) -> Result<Option<Account>, LedgerError> {
        self.0.lock_account(id).await
    }

    async fn commit(self) -> Result<(), LedgerError> {
        self.0.commit().await
    }

    async fn rollback(self) -> Result<(), LedgerError> {
        self.0.rollback().await
    }
}

#[tokio::test]
async fn test_append_failure_leaves_balances_untouched() {
    let db = sqlite_db().await;
    let inner = SeaLedgerStore::new(db.clone());
    let x = account_with_balance(&db, "x", 100).await;
    let y = account_with_balance(&db, "y", 0).await;
    let engine = TransferEngine::new(Arc::new(FailingAppendStore(inner.clone())));

    let err = engine.transfer(request(x, y, 100)).await.unwrap_err();

    assert!(matches!(err, LedgerError::Storage(_)));
    assert_eq!(balance(&inner, x).await, 100);
    assert_eq!(balance(&inner, y).await, 0);
    assert!(inner.query(&MutationFilter::for_account(x)).await.unwrap().is_empty());
}

// ========== Concurrency ==========

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_transfers_sqlite() {
    const N: i64 = 25;
    const AMOUNT: i64 = 4;

    let db = sqlite_db().await;
    let store = Arc::new(SeaLedgerStore::new(db.clone()));
    let x = account_with_balance(&db, "x", N * AMOUNT).await;
    let y = account_with_balance(&db, "y", 0).await;
    let engine = TransferEngine::new(Arc::clone(&store));

    let handles: Vec<_> = (0..N)
        .map(|_| {
            let engine = engine.clone();
            tokio::spawn(async move { engine.transfer(request(x, y, AMOUNT)).await })
        })
        .collect();
    for result in join_all(handles).await {
        result.unwrap().unwrap();
    }

    assert_eq!(balance(&store, x).await, 0);
    assert_eq!(balance(&store, y).await, N * AMOUNT);
    let history = store.query(&MutationFilter::for_account(x)).await.unwrap();
    assert_eq!(history.len(), usize::try_from(N).unwrap());
}
