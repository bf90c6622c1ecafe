//! Transaction category routes.

use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::get,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::info;

use crate::{
    AppState,
    error::ApiError,
    extract::{JsonBody, PathParam},
};
use tally_db::{
    CategoryRepository,
    entities::transaction_categories,
    repositories::{CreateCategoryInput, UpdateCategoryInput},
};
use tally_shared::types::CategoryId;

/// Creates the category routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/categories", get(list_categories).post(create_category))
        .route(
            "/categories/{category_id}",
            get(get_category)
                .patch(update_category)
                .delete(delete_category),
        )
}

/// Request body for creating a category.
#[derive(Debug, Deserialize)]
pub struct CreateCategoryRequest {
    /// Category name.
    pub name: String,
    /// Optional description.
    pub description: Option<String>,
}

/// Request body for updating a category.
///
/// An explicit `"description": null` clears the description.
#[derive(Debug, Deserialize)]
pub struct UpdateCategoryRequest {
    /// New name.
    pub name: Option<String>,
    /// New description.
    #[serde(default, with = "double_option")]
    pub description: Option<Option<String>>,
}

mod double_option {
    use serde::{Deserialize, Deserializer};

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Option<String>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        Option::<String>::deserialize(deserializer).map(Some)
    }
}

/// Response for a category.
#[derive(Debug, Serialize)]
pub struct CategoryResponse {
    /// Category ID.
    pub id: i64,
    /// Category name.
    pub name: String,
    /// Optional description.
    pub description: Option<String>,
    /// Creation timestamp.
    pub created_at: String,
}

impl From<transaction_categories::Model> for CategoryResponse {
    fn from(model: transaction_categories::Model) -> Self {
        Self {
            id: model.id,
            name: model.name,
            description: model.description,
            created_at: model.created_at.to_rfc3339(),
        }
    }
}

/// GET `/categories` - List categories.
async fn list_categories(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    let repo = CategoryRepository::new((*state.db).clone());
    let categories: Vec<CategoryResponse> = repo
        .list_categories()
        .await?
        .into_iter()
        .map(CategoryResponse::from)
        .collect();

    Ok(Json(json!({ "categories": categories })))
}

/// POST `/categories` - Create a category.
async fn create_category(
    State(state): State<AppState>,
    JsonBody(payload): JsonBody<CreateCategoryRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let repo = CategoryRepository::new((*state.db).clone());
    let category = repo
        .create_category(CreateCategoryInput {
            name: payload.name,
            description: payload.description,
        })
        .await?;

    info!(category_id = category.id, "Category created");
    Ok((StatusCode::CREATED, Json(CategoryResponse::from(category))))
}

/// GET `/categories/{category_id}` - Get a category.
async fn get_category(
    State(state): State<AppState>,
    PathParam(category_id): PathParam<CategoryId>,
) -> Result<impl IntoResponse, ApiError> {
    let repo = CategoryRepository::new((*state.db).clone());
    Ok(Json(CategoryResponse::from(
        repo.get_category(category_id).await?,
    )))
}

/// PATCH `/categories/{category_id}` - Update a category.
async fn update_category(
    State(state): State<AppState>,
    PathParam(category_id): PathParam<CategoryId>,
    JsonBody(payload): JsonBody<UpdateCategoryRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let repo = CategoryRepository::new((*state.db).clone());
    let category = repo
        .update_category(
            category_id,
            UpdateCategoryInput {
                name: payload.name,
                description: payload.description,
            },
        )
        .await?;
    Ok(Json(CategoryResponse::from(category)))
}

/// DELETE `/categories/{category_id}` - Delete an unreferenced category.
async fn delete_category(
    State(state): State<AppState>,
    PathParam(category_id): PathParam<CategoryId>,
) -> Result<impl IntoResponse, ApiError> {
    let repo = CategoryRepository::new((*state.db).clone());
    repo.delete_category(category_id).await?;

    info!(%category_id, "Category deleted");
    Ok(StatusCode::NO_CONTENT)
}
