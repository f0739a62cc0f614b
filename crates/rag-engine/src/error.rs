use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

/// Error taxonomy for the engine, matching the error kinds enumerated in
/// the external-interfaces error design: per-file ingestion errors never
/// escape `build_or_update_index`, request-level errors surface to the
/// client as a single `error` event.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error("empty document: {0}")]
    EmptyDocument(String),

    #[error("parse failed: {0}")]
    ParseFailed(String),

    #[error("embedder protocol error: {0}")]
    EmbedderProtocol(String),

    #[error("backend unavailable: {0}")]
    BackendUnavailable(String),

    #[error("unknown model: {0}")]
    ModelUnknown(String),

    #[error("generation failed: {0}")]
    GenerationFailed(String),

    #[error("storage corrupt: {0}")]
    StorageCorrupt(String),

    #[error("cancelled")]
    Cancelled,

    #[error("storage error: {0}")]
    Storage(#[from] sqlx::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("config error: {0}")]
    Config(#[from] config::ConfigError),
}

impl EngineError {
    /// Human-readable message suitable for the streaming transport's
    /// `error` event (§4.14). Never leaks internal error chains.
    pub fn client_message(&self) -> String {
        self.to_string()
    }
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
    message: String,
}

impl IntoResponse for EngineError {
    fn into_response(self) -> Response {
        let (status, kind) = match &self {
            EngineError::BadRequest(_) => (StatusCode::BAD_REQUEST, "BadRequest"),
            EngineError::UnsupportedFormat(_) => (StatusCode::UNPROCESSABLE_ENTITY, "UnsupportedFormat"),
            EngineError::EmptyDocument(_) => (StatusCode::UNPROCESSABLE_ENTITY, "EmptyDocument"),
            EngineError::ParseFailed(_) => (StatusCode::UNPROCESSABLE_ENTITY, "ParseFailed"),
            EngineError::EmbedderProtocol(_) => (StatusCode::BAD_GATEWAY, "EmbedderProtocol"),
            EngineError::BackendUnavailable(_) => (StatusCode::SERVICE_UNAVAILABLE, "BackendUnavailable"),
            EngineError::ModelUnknown(_) => (StatusCode::NOT_FOUND, "ModelUnknown"),
            EngineError::GenerationFailed(_) => (StatusCode::BAD_GATEWAY, "GenerationFailed"),
            EngineError::StorageCorrupt(_) => (StatusCode::INTERNAL_SERVER_ERROR, "StorageCorrupt"),
            EngineError::Cancelled => (StatusCode::REQUEST_TIMEOUT, "Cancelled"),
            EngineError::Storage(_) => (StatusCode::INTERNAL_SERVER_ERROR, "Storage"),
            EngineError::Io(_) => (StatusCode::INTERNAL_SERVER_ERROR, "Io"),
            EngineError::Config(_) => (StatusCode::INTERNAL_SERVER_ERROR, "Config"),
        };

        if status.is_server_error() {
            tracing::error!(kind, "{}", self);
        } else {
            tracing::warn!(kind, "{}", self);
        }

        let body = Json(ErrorBody {
            error: kind.to_string(),
            message: self.to_string(),
        });

        (status, body).into_response()
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;
