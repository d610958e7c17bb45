use crate::models::GiftStatus;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use std::fmt;

/// Errors raised by the analysis pipeline, the stores and the HTTP layer.
#[derive(Debug)]
pub enum AppError {
    /// Query or connection failure.
    Database(sqlx::Error),
    NotFound(String),
    /// Invalid input from the caller.
    BadRequest(String),
    /// The text-generation API failed, timed out or returned nothing usable.
    Generation(String),
    Internal(String),
    Unauthorized(String),
    /// Gift status change outside pending -> suggested -> sent | declined.
    InvalidGiftTransition { from: GiftStatus, to: GiftStatus },
    WithContext {
        source: Box<AppError>,
        context: String,
    },
}

impl AppError {
    /// HTTP status for this error. Context wrappers report their source's status.
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::Database(_) | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Generation(_) => StatusCode::BAD_GATEWAY,
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::InvalidGiftTransition { .. } => StatusCode::CONFLICT,
            AppError::WithContext { source, .. } => source.status_code(),
        }
    }

    /// Innermost error, past any context wrappers.
    pub fn root(&self) -> &AppError {
        match self {
            AppError::WithContext { source, .. } => source.root(),
            other => other,
        }
    }

    /// Message returned to API callers. Server-side details stay in the logs.
    fn public_message(&self) -> String {
        match self.root() {
            AppError::Database(_) => "Database error".to_string(),
            AppError::Internal(_) => "Internal server error".to_string(),
            AppError::Generation(_) => "Text generation service error".to_string(),
            AppError::Unauthorized(_) => "Unauthorized".to_string(),
            other => other.to_string(),
        }
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Database(e) => write!(f, "Database error: {}", e),
            AppError::NotFound(msg) => write!(f, "Not found: {}", msg),
            AppError::BadRequest(msg) => write!(f, "Bad request: {}", msg),
            AppError::Generation(msg) => write!(f, "Text generation error: {}", msg),
            AppError::Internal(msg) => write!(f, "Internal error: {}", msg),
            AppError::Unauthorized(msg) => write!(f, "Unauthorized: {}", msg),
            AppError::InvalidGiftTransition { from, to } => {
                write!(f, "gift status cannot move from {} to {}", from, to)
            }
            AppError::WithContext { source, context } => write!(f, "{}: {}", context, source),
        }
    }
}

impl std::error::Error for AppError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            AppError::Database(e) => Some(e),
            AppError::WithContext { source, .. } => Some(source.as_ref()),
            _ => None,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!("{}", self);
        } else if status == StatusCode::UNAUTHORIZED {
            tracing::warn!("{}", self);
        }

        let body = Json(json!({
            "success": false,
            "error": self.public_message(),
        }));
        (status, body).into_response()
    }
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        AppError::Database(err)
    }
}

impl From<reqwest::Error> for AppError {
    fn from(err: reqwest::Error) -> Self {
        AppError::Generation(err.to_string())
    }
}

/// Attaches a description of the failed step, like `anyhow::Context`.
pub trait ResultExt<T> {
    fn context(self, context: impl Into<String>) -> Result<T, AppError>;

    /// Lazy variant, the message is only built on error.
    fn with_context<F>(self, f: F) -> Result<T, AppError>
    where
        F: FnOnce() -> String;
}

impl<T, E> ResultExt<T> for Result<T, E>
where
    E: Into<AppError>,
{
    fn context(self, context: impl Into<String>) -> Result<T, AppError> {
        self.with_context(|| context.into())
    }

    fn with_context<F>(self, f: F) -> Result<T, AppError>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| AppError::WithContext {
            source: Box::new(e.into()),
            context: f(),
        })
    }
}
