use {
    axum::{
        Json,
        extract::rejection::JsonRejection,
        http::StatusCode,
        response::{IntoResponse, Response},
    },
    custodian_vault::VaultError,
    tracing::{error, warn},
};

/// Error returned by route handlers, rendered as `{"error": "..."}`.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }
}

impl From<VaultError> for ApiError {
    fn from(err: VaultError) -> Self {
        // Only validation errors echo their detail; everything else gets a
        // fixed message so callers learn nothing about keys or ownership.
        let (status, message) = match &err {
            VaultError::Validation(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            VaultError::Base64(_) => (StatusCode::BAD_REQUEST, err.to_string()),
            VaultError::Unauthorized(reason) => {
                warn!(reason = %reason, "request rejected");
                (StatusCode::UNAUTHORIZED, "unauthorized".to_string())
            },
            VaultError::Unavailable(reason) => {
                warn!(reason = %reason, "authorization service unavailable");
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    "authorization service unavailable".to_string(),
                )
            },
            VaultError::NotFound(what) => (StatusCode::NOT_FOUND, format!("not found: {what}")),
            VaultError::NoActiveKey
            | VaultError::Crypto(_)
            | VaultError::Authentication
            | VaultError::Unwrap
            | VaultError::Storage(_) => {
                error!(error = %err, "vault operation failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal error".to_string(),
                )
            },
        };
        Self { status, message }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::bad_request(rejection.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(serde_json::json!({ "error": self.message })),
        )
            .into_response()
    }
}
