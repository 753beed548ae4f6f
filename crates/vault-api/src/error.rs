use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Redirect, Response},
};
use tracing::error;
use vault_crypto::CodecError;
use vault_types::api::ErrorBody;

/// Errors a request can end in.
///
/// Authorization failures are reported as `NotFound` so a caller cannot tell
/// a foreign file from a missing one. Login and registration form errors are
/// not here: those handlers re-render their form instead.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("{0}")]
    Validation(String),

    #[error("upload exceeds the size limit")]
    PayloadTooLarge,

    /// No valid session. Answered with a redirect to the given login page.
    #[error("authentication required")]
    Unauthenticated { login: &'static str },

    #[error("not found")]
    NotFound,

    #[error("stored file could not be decrypted")]
    Decryption(#[from] CodecError),

    #[error("file content is not valid UTF-8")]
    Encoding(#[from] std::string::FromUtf8Error),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match &self {
            AppError::Unauthenticated { login } => return Redirect::to(login).into_response(),
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::PayloadTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            AppError::NotFound => StatusCode::NOT_FOUND,
            AppError::Decryption(_) | AppError::Encoding(_) => {
                error!("Request failed: {}", self);
                StatusCode::INTERNAL_SERVER_ERROR
            }
            AppError::Internal(e) => {
                error!("Request failed: {:#}", e);
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };

        let message = match &self {
            AppError::Internal(_) => "internal server error".to_string(),
            other => other.to_string(),
        };

        (status, Json(ErrorBody { error: message })).into_response()
    }
}
