//! Unified error handling with Sentry integration.
//!
//! Provides a unified `AppError` type that captures server-side errors to
//! Sentry before responding to the client. All route handlers return
//! `Result<T, AppError>`.
//!
//! Every error response has the same JSON shape:
//!
//! ```json
//! {"error": {"code": "validation_error", "message": "quantity must be at least 1"}}
//! ```

use axum::{
    Json,
    extract::rejection::{JsonRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;

use cartwheel_core::ValidationError;

use crate::db::RepositoryError;
use crate::services::{AuthError, CartError, OrderError, SequenceError};

/// Application-level error type for the storefront.
#[derive(Debug, Error)]
pub enum AppError {
    /// Request body or parameters failed domain validation.
    #[error("{0}")]
    Validation(#[from] ValidationError),

    /// Request body could not be parsed.
    #[error("{0}")]
    InvalidBody(String),

    /// No or invalid credentials.
    #[error("Unauthenticated: {0}")]
    Unauthenticated(#[from] AuthError),

    /// Authenticated but not allowed.
    #[error("Forbidden")]
    Forbidden,

    /// Resource not found.
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    /// A sequence counter ran out for the day.
    #[error("Sequence exhausted: {0}")]
    SequenceExhausted(SequenceError),

    /// Storage failed.
    #[error("Storage error: {0}")]
    Storage(RepositoryError),

    /// Rate limited.
    #[error("Rate limited")]
    RateLimited,

    /// Internal server error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<RepositoryError> for AppError {
    fn from(e: RepositoryError) -> Self {
        match e {
            RepositoryError::Validation(v) => Self::Validation(v),
            RepositoryError::Conflict(what) => Self::Conflict(what),
            RepositoryError::NotFound => Self::NotFound("resource".to_owned()),
            other => Self::Storage(other),
        }
    }
}

impl From<CartError> for AppError {
    fn from(e: CartError) -> Self {
        match e {
            CartError::Validation(v) => Self::Validation(v),
            CartError::Storage(s) => s.into(),
        }
    }
}

impl From<SequenceError> for AppError {
    fn from(e: SequenceError) -> Self {
        match e {
            SequenceError::Storage(s) => s.into(),
            exhausted @ SequenceError::Exhausted { .. } => Self::SequenceExhausted(exhausted),
        }
    }
}

impl From<OrderError> for AppError {
    fn from(e: OrderError) -> Self {
        match e {
            OrderError::Validation(v) => Self::Validation(v),
            OrderError::NotFound(number) => Self::NotFound(format!("order {number}")),
            OrderError::Conflict(what) => Self::Conflict(what),
            OrderError::Sequence(s) => s.into(),
            OrderError::Storage(s) => s.into(),
        }
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        Self::InvalidBody(rejection.body_text())
    }
}

impl From<QueryRejection> for AppError {
    fn from(rejection: QueryRejection) -> Self {
        Self::InvalidBody(rejection.body_text())
    }
}

#[derive(Serialize)]
struct ErrorBody<'a> {
    error: ErrorDetail<'a>,
}

#[derive(Serialize)]
struct ErrorDetail<'a> {
    code: &'a str,
    message: String,
}

impl AppError {
    /// Stable machine-readable code.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation(_) | Self::InvalidBody(_) => "validation_error",
            Self::Unauthenticated(_) => "unauthenticated",
            Self::Forbidden => "forbidden",
            Self::NotFound(_) => "not_found",
            Self::Conflict(_) => "conflict",
            Self::SequenceExhausted(_) => "sequence_exhausted",
            Self::Storage(e) if e.is_transient() => "storage_unavailable",
            Self::RateLimited => "rate_limited",
            Self::Storage(_) | Self::Internal(_) => "internal_error",
        }
    }

    #[must_use]
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Validation(_) | Self::InvalidBody(_) => StatusCode::BAD_REQUEST,
            Self::Unauthenticated(_) => StatusCode::UNAUTHORIZED,
            Self::Forbidden => StatusCode::FORBIDDEN,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::SequenceExhausted(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Storage(e) if e.is_transient() => StatusCode::SERVICE_UNAVAILABLE,
            Self::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            Self::Storage(_) | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    const fn is_server_error(&self) -> bool {
        matches!(
            self,
            Self::Storage(_) | Self::SequenceExhausted(_) | Self::Internal(_)
        )
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        // Capture server errors to Sentry
        if self.is_server_error() {
            let event_id = sentry::capture_error(&self);
            tracing::error!(
                error = %self,
                sentry_event_id = %event_id,
                "Request error"
            );
        }

        // Don't expose internal error details to clients
        let message = match &self {
            Self::Storage(e) if e.is_transient() => {
                "Storage is temporarily unavailable, please retry".to_owned()
            }
            Self::Storage(_) | Self::Internal(_) => "Internal server error".to_owned(),
            Self::SequenceExhausted(_) => {
                "No more order numbers are available today".to_owned()
            }
            Self::Unauthenticated(_) => "Authentication required".to_owned(),
            Self::Forbidden => "Admin access required".to_owned(),
            Self::RateLimited => "Too many requests, slow down".to_owned(),
            _ => self.to_string(),
        };

        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code(),
                message,
            },
        };
        (self.status(), Json(body)).into_response()
    }
}

/// Result type alias for `AppError`.
pub type Result<T> = std::result::Result<T, AppError>;

/// Set the Sentry user context from an identity.
///
/// Call this after successful authentication to associate errors with users.
pub fn set_sentry_user(client_id: &impl ToString) {
    sentry::configure_scope(|scope| {
        scope.set_user(Some(sentry::User {
            id: Some(client_id.to_string()),
            ..Default::default()
        }));
    });
}

/// Add a breadcrumb for shopper actions.
///
/// Breadcrumbs appear in Sentry error reports to show the trail of actions
/// leading up to an error.
///
/// # Example
///
/// ```rust,ignore
/// add_breadcrumb("cart", "Added item", Some(&[("product_ref", "1001")]));
/// ```
pub fn add_breadcrumb(category: &str, message: &str, data: Option<&[(&str, &str)]>) {
    let mut breadcrumb = sentry::Breadcrumb {
        category: Some(category.to_string()),
        message: Some(message.to_string()),
        level: sentry::Level::Info,
        ..Default::default()
    };

    if let Some(pairs) = data {
        for (key, value) in pairs {
            breadcrumb.data.insert(
                (*key).to_string(),
                serde_json::Value::String((*value).to_string()),
            );
        }
    }

    sentry::add_breadcrumb(breadcrumb);
}
