//! Error responses.
//!
//! Handler failures, including malformed bodies, query strings and paths
//! read through [`crate::extract`], leave the API as
//! `{"error": code, "message": text}`. Storage and internal failures are
//! logged and answered with a generic message.

use axum::{
    Json,
    extract::rejection::{JsonRejection, PathRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use tally_core::ledger::LedgerError;
use tally_db::repositories::{AccountError, CategoryError};
use tally_shared::AppError;
use tracing::error;

/// Error returned by handlers.
#[derive(Debug)]
pub enum ApiError {
    /// Ledger operation failed.
    Ledger(LedgerError),
    /// CRUD or identity failure.
    App(AppError),
    /// The request could not be read.
    Rejected {
        /// Status chosen by the extractor.
        status: StatusCode,
        /// What was wrong with the request.
        message: String,
    },
}

macro_rules! impl_from_rejection {
    ($($rejection:ty),*) => {
        $(
            impl From<$rejection> for ApiError {
                fn from(rejection: $rejection) -> Self {
                    Self::Rejected {
                        status: rejection.status(),
                        message: rejection.body_text(),
                    }
                }
            }
        )*
    };
}

impl_from_rejection!(JsonRejection, QueryRejection, PathRejection);

impl From<LedgerError> for ApiError {
    fn from(err: LedgerError) -> Self {
        Self::Ledger(err)
    }
}

impl From<AppError> for ApiError {
    fn from(err: AppError) -> Self {
        Self::App(err)
    }
}

impl From<AccountError> for ApiError {
    fn from(err: AccountError) -> Self {
        Self::App(match err {
            AccountError::NotFound(_) => AppError::NotFound(err.to_string()),
            AccountError::InvalidName(msg) => AppError::Validation(msg),
            AccountError::HasTransfers { .. } => AppError::Conflict(err.to_string()),
            AccountError::Database(e) => AppError::Database(e.to_string()),
        })
    }
}

impl From<CategoryError> for ApiError {
    fn from(err: CategoryError) -> Self {
        Self::App(match err {
            CategoryError::NotFound(_) => AppError::NotFound(err.to_string()),
            CategoryError::InvalidName(msg) => AppError::Validation(msg),
            CategoryError::InUse { .. } => AppError::Conflict(err.to_string()),
            CategoryError::Database(e) => AppError::Database(e.to_string()),
        })
    }
}

impl ApiError {
    fn parts(&self) -> (u16, &'static str, String) {
        match self {
            Self::Ledger(e) => (e.http_status_code(), e.error_code(), e.to_string()),
            Self::App(e) => (e.status_code(), e.error_code(), e.to_string()),
            Self::Rejected { status, message } => {
                (status.as_u16(), "INVALID_REQUEST", message.clone())
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, message) = self.parts();
        let status = StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

        let message = if status.is_server_error() && status != StatusCode::GATEWAY_TIMEOUT {
            error!(error = %message, code, "request failed");
            "An error occurred".to_string()
        } else {
            message
        };

        (
            status,
            Json(json!({
                "error": code.to_ascii_lowercase(),
                "message": message
            })),
        )
            .into_response()
    }
}
