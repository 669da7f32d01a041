//! Structured error responses for the API layer.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use colloquy_core::{ColloquyError, PipelineError, ProviderError, StorageError};
use serde::{Deserialize, Serialize};

/// Error categories exposed to API consumers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    InvalidInput,
    EntityNotFound,
    ProviderUnavailable,
    RateLimited,
    PipelineFailed,
    StorageFailed,
    Internal,
}

impl ErrorCode {
    fn status(self) -> StatusCode {
        match self {
            ErrorCode::InvalidInput => StatusCode::BAD_REQUEST,
            ErrorCode::EntityNotFound => StatusCode::NOT_FOUND,
            ErrorCode::ProviderUnavailable => StatusCode::BAD_GATEWAY,
            ErrorCode::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            ErrorCode::PipelineFailed => StatusCode::BAD_GATEWAY,
            ErrorCode::StorageFailed => StatusCode::INTERNAL_SERVER_ERROR,
            ErrorCode::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// A structured API error: a category plus a human-readable detail.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiError {
    pub code: ErrorCode,
    pub detail: String,
}

impl ApiError {
    pub fn new(code: ErrorCode, detail: impl Into<String>) -> Self {
        Self {
            code,
            detail: detail.into(),
        }
    }

    pub fn invalid_input(detail: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidInput, detail)
    }

    pub fn not_found(detail: impl Into<String>) -> Self {
        Self::new(ErrorCode::EntityNotFound, detail)
    }

    pub fn internal(detail: impl Into<String>) -> Self {
        Self::new(ErrorCode::Internal, detail)
    }
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}: {}", self.code, self.detail)
    }
}

impl std::error::Error for ApiError {}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.code.status();
        if status.is_server_error() {
            tracing::error!(code = ?self.code, detail = %self.detail, "request failed");
        } else {
            tracing::debug!(code = ?self.code, detail = %self.detail, "request rejected");
        }
        (status, Json(self)).into_response()
    }
}

impl From<ColloquyError> for ApiError {
    fn from(err: ColloquyError) -> Self {
        let detail = err.to_string();
        let code = match &err {
            ColloquyError::Storage(storage_err) => match storage_err {
                StorageError::ConversationNotFound { .. }
                | StorageError::RunNotFound { .. }
                | StorageError::StepNotFound { .. }
                | StorageError::MessageNotFound { .. } => ErrorCode::EntityNotFound,
                _ => ErrorCode::StorageFailed,
            },
            ColloquyError::Provider(ProviderError::RateLimited { .. }) => ErrorCode::RateLimited,
            ColloquyError::Provider(ProviderError::MissingApiKey { .. })
            | ColloquyError::Provider(ProviderError::NotRegistered { .. }) => {
                ErrorCode::ProviderUnavailable
            }
            ColloquyError::Provider(_) => ErrorCode::ProviderUnavailable,
            ColloquyError::Pipeline(PipelineError::EmptyPipeline) => ErrorCode::InvalidInput,
            ColloquyError::Pipeline(_) => ErrorCode::PipelineFailed,
            ColloquyError::Routing(_) => ErrorCode::ProviderUnavailable,
            ColloquyError::Lattice(_) => ErrorCode::Internal,
            ColloquyError::Orchestrator(_) => ErrorCode::Internal,
            ColloquyError::Config(_) => ErrorCode::Internal,
        };
        Self::new(code, detail)
    }
}

/// Result alias for handlers.
pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_maps_to_404() {
        let err: ApiError = ColloquyError::Storage(StorageError::RunNotFound {
            id: colloquy_core::new_entity_id(),
        })
        .into();
        assert_eq!(err.code, ErrorCode::EntityNotFound);
        assert_eq!(err.code.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_stage_failure_maps_to_bad_gateway() {
        let err: ApiError = ColloquyError::Pipeline(PipelineError::StageFailed {
            stage: 1,
            role: "researcher".to_string(),
            provider: "perplexity".to_string(),
            error_type: "request_failed".to_string(),
            message: "upstream exploded".to_string(),
        })
        .into();
        assert_eq!(err.code, ErrorCode::PipelineFailed);
        assert_eq!(err.code.status(), StatusCode::BAD_GATEWAY);
        assert!(err.detail.contains("perplexity"));
    }

    #[test]
    fn test_error_code_serializes_screaming_snake() {
        let json = serde_json::to_string(&ErrorCode::EntityNotFound).expect("serialize");
        assert_eq!(json, "\"ENTITY_NOT_FOUND\"");
    }
}
