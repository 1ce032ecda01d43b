use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use std::fmt;

/// Application-specific error types.
#[derive(Debug)]
pub enum AppError {
    /// Database-related errors.
    DatabaseError(sqlx::Error),
    /// Resource not found error.
    NotFound(String),
    /// Bad request error (invalid input).
    BadRequest(String),
    /// No funding source covers the requested unlock.
    InsufficientCredits {
        /// Credits the unlock requires.
        required: i64,
        /// Current wallet balance.
        balance: i64,
    },
    /// The HR account has no wallet row (setup/configuration bug).
    WalletNotFound,
    /// Error interacting with an external API.
    ExternalApiError(String),
    /// Internal server error.
    InternalError(String),
    /// Unauthorized access error.
    Unauthorized(String),
    /// Error with context chain for better debugging.
    WithContext {
        /// The underlying source of the error.
        source: Box<AppError>,
        /// Additional context message.
        context: String,
    },
}

impl fmt::Display for AppError {
    /// Formats the error for display.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::DatabaseError(e) => write!(f, "Database error: {}", e),
            AppError::NotFound(msg) => write!(f, "Not found: {}", msg),
            AppError::BadRequest(msg) => write!(f, "Bad request: {}", msg),
            AppError::InsufficientCredits { required, balance } => write!(
                f,
                "Insufficient credits. You need {} credits but have {}.",
                required, balance
            ),
            AppError::WalletNotFound => {
                write!(f, "Wallet not found. Please contact support.")
            }
            AppError::ExternalApiError(msg) => write!(f, "External API error: {}", msg),
            AppError::InternalError(msg) => write!(f, "Internal error: {}", msg),
            AppError::Unauthorized(msg) => write!(f, "Unauthorized: {}", msg),
            AppError::WithContext { source, context } => {
                write!(f, "{}: {}", context, source)
            }
        }
    }
}

impl std::error::Error for AppError {
    /// Returns the underlying source error, if any.
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            AppError::DatabaseError(e) => Some(e),
            AppError::WithContext { source, .. } => Some(source.as_ref()),
            _ => None,
        }
    }
}

impl IntoResponse for AppError {
    /// Converts the error into an HTTP response.
    ///
    /// Maps each error variant to an appropriate HTTP status code and JSON body.
    /// Domain failures (`InsufficientCredits`, `WalletNotFound`) carry the
    /// structured fields the mobile clients render.
    fn into_response(self) -> Response {
        let (status, body) = match &self {
            AppError::InsufficientCredits { required, balance } => (
                StatusCode::BAD_REQUEST,
                Json(json!({
                    "error": format!(
                        "Insufficient credits. You need {} credits but have {}.",
                        required, balance
                    ),
                    "required_credits": required,
                    "current_balance": balance,
                })),
            ),
            AppError::WalletNotFound => (
                StatusCode::BAD_REQUEST,
                Json(json!({
                    "error": "Wallet not found. Please contact support.",
                })),
            ),
            AppError::DatabaseError(e) => {
                tracing::error!("Database error: {:?}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(json!({ "error": "Database error" })),
                )
            }
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, Json(json!({ "error": msg }))),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, Json(json!({ "error": msg }))),
            AppError::ExternalApiError(msg) => {
                tracing::error!("External API error: {}", msg);
                (
                    StatusCode::BAD_GATEWAY,
                    Json(json!({ "error": "External service error" })),
                )
            }
            AppError::InternalError(msg) => {
                tracing::error!("Internal error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(json!({ "error": "Internal server error" })),
                )
            }
            AppError::Unauthorized(msg) => {
                tracing::warn!("Unauthorized access: {}", msg);
                (
                    StatusCode::UNAUTHORIZED,
                    Json(json!({ "error": "Unauthorized" })),
                )
            }
            AppError::WithContext { source, context } => {
                // Log full context chain for debugging
                tracing::error!("Error with context: {} -> {}", context, source);
                // Delegate to underlying error's response
                return source.clone().into_response();
            }
        };

        (status, body).into_response()
    }
}

// Make AppError cloneable for WithContext variant
impl Clone for AppError {
    /// Clones the error.
    ///
    /// Note: `sqlx::Error` is not cloneable, so `DatabaseError` is simplified to `RowNotFound` during cloning.
    fn clone(&self) -> Self {
        match self {
            AppError::DatabaseError(_e) => AppError::DatabaseError(sqlx::Error::RowNotFound), // Simplified clone
            AppError::NotFound(msg) => AppError::NotFound(msg.clone()),
            AppError::BadRequest(msg) => AppError::BadRequest(msg.clone()),
            AppError::InsufficientCredits { required, balance } => AppError::InsufficientCredits {
                required: *required,
                balance: *balance,
            },
            AppError::WalletNotFound => AppError::WalletNotFound,
            AppError::ExternalApiError(msg) => AppError::ExternalApiError(msg.clone()),
            AppError::InternalError(msg) => AppError::InternalError(msg.clone()),
            AppError::Unauthorized(msg) => AppError::Unauthorized(msg.clone()),
            AppError::WithContext { source, context } => AppError::WithContext {
                source: source.clone(),
                context: context.clone(),
            },
        }
    }
}

impl From<sqlx::Error> for AppError {
    /// Converts a `sqlx::Error` into an `AppError`.
    fn from(err: sqlx::Error) -> Self {
        AppError::DatabaseError(err)
    }
}

impl From<reqwest::Error> for AppError {
    /// Converts a `reqwest::Error` into an `AppError`.
    fn from(err: reqwest::Error) -> Self {
        AppError::ExternalApiError(err.to_string())
    }
}

/// Extension trait for adding context to errors.
/// Similar to `anyhow::Context` but for our `AppError` type.
pub trait ResultExt<T> {
    /// Add context to an error.
    ///
    /// # Arguments
    ///
    /// * `context` - The context message to add.
    fn context(self, context: impl Into<String>) -> Result<T, AppError>;

    /// Add context lazily (only evaluated on error).
    ///
    /// # Arguments
    ///
    /// * `f` - A closure that produces the context message.
    #[allow(dead_code)]
    fn with_context<F>(self, f: F) -> Result<T, AppError>
    where
        F: FnOnce() -> String;
}

impl<T> ResultExt<T> for Result<T, AppError> {
    fn context(self, context: impl Into<String>) -> Result<T, AppError> {
        self.map_err(|e| AppError::WithContext {
            source: Box::new(e),
            context: context.into(),
        })
    }

    fn with_context<F>(self, f: F) -> Result<T, AppError>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| AppError::WithContext {
            source: Box::new(e),
            context: f(),
        })
    }
}

/// Extension for sqlx::Error to add context
impl<T> ResultExt<T> for Result<T, sqlx::Error> {
    fn context(self, context: impl Into<String>) -> Result<T, AppError> {
        self.map_err(|e| AppError::WithContext {
            source: Box::new(AppError::DatabaseError(e)),
            context: context.into(),
        })
    }

    fn with_context<F>(self, f: F) -> Result<T, AppError>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| AppError::WithContext {
            source: Box::new(AppError::DatabaseError(e)),
            context: f(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn response_json(err: AppError) -> (StatusCode, serde_json::Value) {
        let response = err.into_response();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn insufficient_credits_response_carries_structured_fields() {
        let (status, body) = response_json(AppError::InsufficientCredits {
            required: 10,
            balance: 3,
        })
        .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(
            body["error"],
            "Insufficient credits. You need 10 credits but have 3."
        );
        assert_eq!(body["required_credits"], 10);
        assert_eq!(body["current_balance"], 3);
    }

    #[tokio::test]
    async fn wallet_not_found_is_a_bad_request_with_support_message() {
        let (status, body) = response_json(AppError::WalletNotFound).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Wallet not found. Please contact support.");
    }

    #[tokio::test]
    async fn status_codes_match_error_variants() {
        let cases = [
            (
                AppError::NotFound("Candidate not found".to_string()),
                StatusCode::NOT_FOUND,
            ),
            (
                AppError::BadRequest("bad".to_string()),
                StatusCode::BAD_REQUEST,
            ),
            (
                AppError::Unauthorized("nope".to_string()),
                StatusCode::UNAUTHORIZED,
            ),
            (
                AppError::InternalError("boom".to_string()),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
            (
                AppError::ExternalApiError("down".to_string()),
                StatusCode::BAD_GATEWAY,
            ),
        ];

        for (err, expected) in cases {
            let (status, _) = response_json(err).await;
            assert_eq!(status, expected);
        }
    }

    #[tokio::test]
    async fn with_context_delegates_to_the_source_response() {
        let err = AppError::WithContext {
            source: Box::new(AppError::InsufficientCredits {
                required: 10,
                balance: 0,
            }),
            context: "Unlock failed".to_string(),
        };

        let (status, body) = response_json(err).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["required_credits"], 10);
    }
}
