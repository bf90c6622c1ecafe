//! Transaction category repository.

use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, DbErr, EntityTrait, PaginatorTrait,
    QueryFilter, QueryOrder, Set,
};
use tally_shared::types::CategoryId;

use super::account::{is_foreign_key_violation, validate_name};
use crate::entities::{transaction_categories, transfers};

/// Error types for category operations.
#[derive(Debug, thiserror::Error)]
pub enum CategoryError {
    /// Category not found.
    #[error("Category not found: {0}")]
    NotFound(CategoryId),

    /// Name is empty or too long.
    #[error("Invalid category name: {0}")]
    InvalidName(String),

    /// Cannot delete category because transfers reference it.
    #[error("Cannot delete category {id}: referenced by {count} transfers")]
    InUse {
        /// The category ID.
        id: CategoryId,
        /// Number of referencing transfers.
        count: u64,
    },

    /// Database error.
    #[error("Database error: {0}")]
    Database(#[from] DbErr),
}

/// Input for creating a category.
#[derive(Debug, Clone)]
pub struct CreateCategoryInput {
    /// Category name.
    pub name: String,
    /// Optional description.
    pub description: Option<String>,
}

/// Input for updating a category.
#[derive(Debug, Clone, Default)]
pub struct UpdateCategoryInput {
    /// New name.
    pub name: Option<String>,
    /// New description; `Some(None)` clears it.
    pub description: Option<Option<String>>,
}

/// Category repository for CRUD operations.
#[derive(Debug, Clone)]
pub struct CategoryRepository {
    db: DatabaseConnection,
}

impl CategoryRepository {
    /// Creates a new category repository.
    #[must_use]
    pub const fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    /// Creates a category.
    ///
    /// # Errors
    ///
    /// Returns `InvalidName` or a database error.
    pub async fn create_category(
        &self,
        input: CreateCategoryInput,
    ) -> Result<transaction_categories::Model, CategoryError> {
        let name = validate_name(&input.name).map_err(CategoryError::InvalidName)?;

        let category = transaction_categories::ActiveModel {
            name: Set(name),
            description: Set(input.description),
            created_at: Set(Utc::now().fixed_offset()),
            ..Default::default()
        };

        Ok(category.insert(&self.db).await?)
    }

    /// Loads a category that must exist.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` or a database error.
    pub async fn get_category(
        &self,
        id: CategoryId,
    ) -> Result<transaction_categories::Model, CategoryError> {
        transaction_categories::Entity::find_by_id(id.into_inner())
            .one(&self.db)
            .await?
            .ok_or(CategoryError::NotFound(id))
    }

    /// Lists all categories by ID.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn list_categories(
        &self,
    ) -> Result<Vec<transaction_categories::Model>, CategoryError> {
        Ok(transaction_categories::Entity::find()
            .order_by_asc(transaction_categories::Column::Id)
            .all(&self.db)
            .await?)
    }

    /// Updates a category.
    ///
    /// # Errors
    ///
    /// Returns `NotFound`, `InvalidName`, or a database error.
    pub async fn update_category(
        &self,
        id: CategoryId,
        input: UpdateCategoryInput,
    ) -> Result<transaction_categories::Model, CategoryError> {
        let category = self.get_category(id).await?;
        let mut active: transaction_categories::ActiveModel = category.into();

        if let Some(name) = input.name {
            active.name = Set(validate_name(&name).map_err(CategoryError::InvalidName)?);
        }
        if let Some(description) = input.description {
            active.description = Set(description);
        }

        Ok(active.update(&self.db).await?)
    }

    /// Deletes a category that no transfer references.
    ///
    /// # Errors
    ///
    /// Returns `NotFound`, `InUse`, or a database error.
    pub async fn delete_category(&self, id: CategoryId) -> Result<(), CategoryError> {
        self.get_category(id).await?;

        let count = self.count_transfers(id).await?;
        if count > 0 {
            return Err(CategoryError::InUse { id, count });
        }

        match transaction_categories::Entity::delete_by_id(id.into_inner())
            .exec(&self.db)
            .await
        {
            Ok(_) => Ok(()),
            Err(err) => Err(self.delete_failed(id, err).await),
        }
    }

    async fn count_transfers(&self, id: CategoryId) -> Result<u64, DbErr> {
        transfers::Entity::find()
            .filter(transfers::Column::CategoryId.eq(id.into_inner()))
            .count(&self.db)
            .await
    }

    /// Maps a delete that lost a race with a categorized transfer to `InUse`.
    async fn delete_failed(&self, id: CategoryId, err: DbErr) -> CategoryError {
        if !is_foreign_key_violation(&err) {
            return CategoryError::Database(err);
        }
        match self.count_transfers(id).await {
            Ok(count) => CategoryError::InUse {
                id,
                count: count.max(1),
            },
            Err(err) => CategoryError::Database(err),
        }
    }
}
