//! Account repository for account management.
//!
//! Balances are never written here. New accounts open at zero and every later
//! change goes through the ledger store.

use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, DatabaseConnection, DbErr, EntityTrait,
    PaginatorTrait, QueryFilter, QueryOrder, Set, SqlErr,
};
use tally_shared::types::AccountId;

use crate::entities::{accounts, transfers};

/// Maximum length of an account name.
pub const MAX_NAME_LEN: usize = 255;

/// Error types for account operations.
#[derive(Debug, thiserror::Error)]
pub enum AccountError {
    /// Account not found.
    #[error("Account not found: {0}")]
    NotFound(AccountId),

    /// Name is empty or too long.
    #[error("Invalid account name: {0}")]
    InvalidName(String),

    /// Cannot delete account because transfers reference it.
    #[error("Cannot delete account {id}: referenced by {count} transfers")]
    HasTransfers {
        /// The account ID.
        id: AccountId,
        /// Number of referencing transfers.
        count: u64,
    },

    /// Database error.
    #[error("Database error: {0}")]
    Database(#[from] DbErr),
}

pub(crate) fn validate_name(name: &str) -> Result<String, String> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err("name must not be empty".to_string());
    }
    if trimmed.chars().count() > MAX_NAME_LEN {
        return Err(format!("name must be at most {MAX_NAME_LEN} characters"));
    }
    Ok(trimmed.to_string())
}

/// True if `err` is a foreign-key violation, such as deleting a row that a
/// transfer still references.
pub(crate) fn is_foreign_key_violation(err: &DbErr) -> bool {
    matches!(err.sql_err(), Some(SqlErr::ForeignKeyConstraintViolation(_)))
}

/// Account repository for CRUD operations.
#[derive(Debug, Clone)]
pub struct AccountRepository {
    db: DatabaseConnection,
}

impl AccountRepository {
    /// Creates a new account repository.
    #[must_use]
    pub const fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    /// Creates an account with a zero balance.
    ///
    /// # Errors
    ///
    /// Returns `InvalidName` or a database error.
    pub async fn create_account(&self, name: &str) -> Result<accounts::Model, AccountError> {
        let name = validate_name(name).map_err(AccountError::InvalidName)?;
        let now = Utc::now().fixed_offset();

        let account = accounts::ActiveModel {
            name: Set(name),
            balance: Set(0),
            created_at: Set(now),
            updated_at: Set(now),
            ..Default::default()
        };

        Ok(account.insert(&self.db).await?)
    }

    /// Finds an account by ID.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn find_account_by_id(
        &self,
        id: AccountId,
    ) -> Result<Option<accounts::Model>, AccountError> {
        Ok(accounts::Entity::find_by_id(id.into_inner())
            .one(&self.db)
            .await?)
    }

    /// Loads an account that must exist.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` or a database error.
    pub async fn get_account(&self, id: AccountId) -> Result<accounts::Model, AccountError> {
        self.find_account_by_id(id)
            .await?
            .ok_or(AccountError::NotFound(id))
    }

    /// Lists all accounts by ID.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn list_accounts(&self) -> Result<Vec<accounts::Model>, AccountError> {
        Ok(accounts::Entity::find()
            .order_by_asc(accounts::Column::Id)
            .all(&self.db)
            .await?)
    }

    /// Changes an account's display name.
    ///
    /// # Errors
    ///
    /// Returns `NotFound`, `InvalidName`, or a database error.
    pub async fn rename_account(
        &self,
        id: AccountId,
        name: &str,
    ) -> Result<accounts::Model, AccountError> {
        let name = validate_name(name).map_err(AccountError::InvalidName)?;
        let account = self.get_account(id).await?;

        let mut active: accounts::ActiveModel = account.into();
        active.name = Set(name);
        active.updated_at = Set(Utc::now().fixed_offset());

        Ok(active.update(&self.db).await?)
    }

    /// Deletes an account that no transfer references.
    ///
    /// # Errors
    ///
    /// Returns `NotFound`, `HasTransfers`, or a database error.
    pub async fn delete_account(&self, id: AccountId) -> Result<(), AccountError> {
        self.get_account(id).await?;

        let count = self.count_transfers(id).await?;
        if count > 0 {
            return Err(AccountError::HasTransfers { id, count });
        }

        match accounts::Entity::delete_by_id(id.into_inner())
            .exec(&self.db)
            .await
        {
            Ok(_) => Ok(()),
            Err(err) => Err(self.delete_failed(id, err).await),
        }
    }

    async fn count_transfers(&self, id: AccountId) -> Result<u64, DbErr> {
        transfers::Entity::find()
            .filter(
                Condition::any()
                    .add(transfers::Column::FromAccountId.eq(id.into_inner()))
                    .add(transfers::Column::ToAccountId.eq(id.into_inner())),
            )
            .count(&self.db)
            .await
    }

    /// A transfer committed between the count and the delete trips the
    /// foreign key; report it like any other referenced account.
    async fn delete_failed(&self, id: AccountId, err: DbErr) -> AccountError {
        if !is_foreign_key_violation(&err) {
            return AccountError::Database(err);
        }
        match self.count_transfers(id).await {
            Ok(count) => AccountError::HasTransfers {
                id,
                count: count.max(1),
            },
            Err(err) => AccountError::Database(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("Alice", Ok("Alice".to_string()))]
    #[case("  Bob  ", Ok("Bob".to_string()))]
    #[case("", Err(()))]
    #[case("   ", Err(()))]
    fn test_validate_name(#[case] input: &str, #[case] expected: Result<String, ()>) {
        assert_eq!(validate_name(input).map_err(|_| ()), expected);
    }

    async fn sqlite_db() -> DatabaseConnection {
        use sea_orm_migration::MigratorTrait;

        let mut options = sea_orm::ConnectOptions::new("sqlite::memory:");
        options.max_connections(1).min_connections(1).sqlx_logging(false);
        let db = sea_orm::Database::connect(options).await.unwrap();
        crate::migration::Migrator::up(&db, None).await.unwrap();
        db
    }

    #[tokio::test]
    async fn test_delete_tripping_foreign_key_is_has_transfers() {
        let db = sqlite_db().await;
        let repo = AccountRepository::new(db.clone());
        let a = repo.create_account("a").await.unwrap();
        let b = repo.create_account("b").await.unwrap();
        transfers::ActiveModel {
            category_id: Set(None),
            from_account_id: Set(a.id),
            to_account_id: Set(b.id),
            amount: Set(5),
            created_at: Set(Utc::now().fixed_offset()),
            ..Default::default()
        }
        .insert(&db)
        .await
        .unwrap();

        // The delete a racing transfer would hit after the count came back zero.
        let err = accounts::Entity::delete_by_id(a.id)
            .exec(&db)
            .await
            .unwrap_err();
        assert!(is_foreign_key_violation(&err));

        let id = AccountId::new(a.id);
        assert!(matches!(
            repo.delete_failed(id, err).await,
            AccountError::HasTransfers { id: got, count: 1 } if got == id
        ));
        assert!(matches!(
            repo.delete_failed(id, DbErr::Custom("boom".into())).await,
            AccountError::Database(_)
        ));
    }

    #[test]
    fn test_validate_name_length() {
        let long = "x".repeat(MAX_NAME_LEN + 1);
        assert!(validate_name(&long).is_err());
        assert!(validate_name(&long[1..]).is_ok());
    }
}
