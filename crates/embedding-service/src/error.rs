//! Request-level errors and their HTTP representation.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use crate::cache::CacheError;

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error(transparent)]
    Load(#[from] CacheError),

    #[error("Inference failed: {0:#}")]
    Inference(anyhow::Error),

    #[error("{0}")]
    BadRequest(String),
}

/// Error response body
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
    pub error_description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
}

impl ServiceError {
    fn status(&self) -> StatusCode {
        match self {
            Self::Load(_) | Self::Inference(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
        }
    }

    fn code(&self) -> &'static str {
        match self {
            Self::Load(_) => "model_load_failed",
            Self::Inference(_) => "inference_failed",
            Self::BadRequest(_) => "invalid_request",
        }
    }
}

/// The error's message followed by each of its causes.
fn describe(err: &dyn std::error::Error) -> String {
    let mut description = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        description.push_str(": ");
        description.push_str(&cause.to_string());
        source = cause.source();
    }
    description
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!("{}", describe(&self));
        } else {
            tracing::debug!("Rejected request: {}", self);
        }

        let model = match &self {
            Self::Load(CacheError::Load { name, .. }) => Some(name.clone()),
            _ => None,
        };

        let body = ErrorBody {
            error: self.code().to_string(),
            error_description: describe(&self),
            model,
        };
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ModelKind;

    fn load_error() -> ServiceError {
        ServiceError::Load(CacheError::Load {
            kind: ModelKind::Embed,
            name: "org/broken".to_string(),
            source: anyhow::anyhow!("weights not found").context("Failed to read model.safetensors"),
        })
    }

    #[test]
    fn test_description_lists_each_cause_once() {
        let description = describe(&load_error());

        assert_eq!(
            description,
            "Failed to load embed model 'org/broken': Failed to read model.safetensors: weights not found"
        );
        assert_eq!(description.matches("weights not found").count(), 1);
    }

    #[test]
    fn test_status_and_code() {
        let err = load_error();
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.code(), "model_load_failed");

        let err = ServiceError::BadRequest("too many texts".to_string());
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
        assert_eq!(describe(&err), "too many texts");
    }
}
