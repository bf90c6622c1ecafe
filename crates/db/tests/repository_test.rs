//! Integration tests for the account and category repositories.

mod common;

use tally_core::ledger::{NewTransfer, TransactionLedger};
use tally_db::repositories::{
    AccountError, CategoryError, CreateCategoryInput, UpdateCategoryInput,
};
use tally_db::{AccountRepository, CategoryRepository, SeaLedgerStore};
use tally_shared::types::{AccountId, CategoryId};

use common::{account_with_balance, sqlite_db};

#[tokio::test]
async fn test_account_create_and_get() {
    let db = sqlite_db().await;
    let repo = AccountRepository::new(db);

    let created = repo.create_account("  Savings ").await.unwrap();
    assert_eq!(created.name, "Savings");
    assert_eq!(created.balance, 0);

    let fetched = repo.get_account(AccountId::new(created.id)).await.unwrap();
    assert_eq!(fetched, created);
}

#[tokio::test]
async fn test_account_create_rejects_blank_name() {
    let db = sqlite_db().await;
    let repo = AccountRepository::new(db);
    assert!(matches!(
        repo.create_account("   ").await,
        Err(AccountError::InvalidName(_))
    ));
}

#[tokio::test]
async fn test_account_list_and_rename() {
    let db = sqlite_db().await;
    let repo = AccountRepository::new(db);
    let a = repo.create_account("a").await.unwrap();
    repo.create_account("b").await.unwrap();

    let renamed = repo
        .rename_account(AccountId::new(a.id), "alpha")
        .await
        .unwrap();
    assert_eq!(renamed.name, "alpha");

    let names: Vec<String> = repo
        .list_accounts()
        .await
        .unwrap()
        .into_iter()
        .map(|a| a.name)
        .collect();
    assert_eq!(names, vec!["alpha", "b"]);
}

#[tokio::test]
async fn test_account_get_missing() {
    let db = sqlite_db().await;
    let repo = AccountRepository::new(db);
    assert!(matches!(
        repo.get_account(AccountId::new(5)).await,
        Err(AccountError::NotFound(id)) if id == AccountId::new(5)
    ));
    assert!(repo.find_account_by_id(AccountId::new(5)).await.unwrap().is_none());
}

#[tokio::test]
async fn test_account_delete_refused_while_referenced() {
    let db = sqlite_db().await;
    let repo = AccountRepository::new(db.clone());
    let x = account_with_balance(&db, "x", 0).await;
    let y = account_with_balance(&db, "y", 0).await;
    let z = account_with_balance(&db, "z", 0).await;

    SeaLedgerStore::new(db.clone())
        .append(NewTransfer {
            category_id: None,
            from_account_id: x,
            to_account_id: y,
            amount: 1,
            created_at: None,
        })
        .await
        .unwrap();

    assert!(matches!(
        repo.delete_account(y).await,
        Err(AccountError::HasTransfers { count: 1, .. })
    ));
    repo.delete_account(z).await.unwrap();
    assert!(repo.find_account_by_id(z).await.unwrap().is_none());
}

#[tokio::test]
async fn test_category_crud() {
    let db = sqlite_db().await;
    let repo = CategoryRepository::new(db);

    let created = repo
        .create_category(CreateCategoryInput {
            name: "groceries".into(),
            description: Some("food".into()),
        })
        .await
        .unwrap();
    let id = CategoryId::new(created.id);

    let updated = repo
        .update_category(
            id,
            UpdateCategoryInput {
                name: Some("food".into()),
                description: Some(None),
            },
        )
        .await
        .unwrap();
    assert_eq!(updated.name, "food");
    assert_eq!(updated.description, None);

    assert_eq!(repo.list_categories().await.unwrap().len(), 1);
    repo.delete_category(id).await.unwrap();
    assert!(matches!(
        repo.get_category(id).await,
        Err(CategoryError::NotFound(_))
    ));
}

#[tokio::test]
async fn test_category_delete_refused_while_referenced() {
    let db = sqlite_db().await;
    let repo = CategoryRepository::new(db.clone());
    let x = account_with_balance(&db, "x", 0).await;
    let y = account_with_balance(&db, "y", 0).await;
    let category = repo
        .create_category(CreateCategoryInput {
            name: "rent".into(),
            description: None,
        })
        .await
        .unwrap();
    let id = CategoryId::new(category.id);

    SeaLedgerStore::new(db.clone())
        .append(NewTransfer {
            category_id: Some(id),
            from_account_id: x,
            to_account_id: y,
            amount: 1,
            created_at: None,
        })
        .await
        .unwrap();

    assert!(matches!(
        repo.delete_category(id).await,
        Err(CategoryError::InUse { count: 1, .. })
    ));
}
