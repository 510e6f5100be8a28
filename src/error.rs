use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Provider '{provider}' failed: {message}")]
    Provider { provider: String, message: String },

    #[error("Provider '{0}' timed out")]
    ProviderTimeout(String),

    #[error("All providers failed")]
    AllProvidersFailed,

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    pub fn provider(provider: &str, message: impl Into<String>) -> Self {
        AppError::Provider {
            provider: provider.to_string(),
            message: message.into(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            AppError::Database(e) => {
                tracing::error!("Database error: {e}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
            // Single-provider failures are recovered inside a run; one
            // reaching the response layer means it was the only provider.
            AppError::Provider { .. } | AppError::ProviderTimeout(_) => (
                StatusCode::SERVICE_UNAVAILABLE,
                "No results right now, try again shortly".to_string(),
            ),
            AppError::AllProvidersFailed => (
                StatusCode::SERVICE_UNAVAILABLE,
                "No results right now, try again shortly".to_string(),
            ),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            AppError::Internal(msg) => {
                tracing::error!("Internal error: {msg}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
        };

        let body = axum::Json(json!({ "error": message }));
        (status, body).into_response()
    }
}
