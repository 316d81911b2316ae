use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::{json, Value};
use thiserror::Error;

use crate::matching::pipeline::MatchError;

/// Application-level error type.
/// Implements `IntoResponse` so Axum handlers can return `Result<T, AppError>`.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Payload too large: {0}")]
    PayloadTooLarge(String),

    #[error("Inference service unavailable: {message}")]
    ServiceUnavailable {
        message: String,
        available_models: Vec<String>,
    },

    #[error("Inference timed out: {0}")]
    Timeout(String),

    #[error("Inference error: {0}")]
    Upstream(String),

    #[error("Internal server error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl From<MatchError> for AppError {
    fn from(e: MatchError) -> Self {
        match e {
            MatchError::ServiceDown { reason } => AppError::ServiceUnavailable {
                message: reason,
                available_models: vec![],
            },
            MatchError::NoSuitableModel { message, installed } => AppError::ServiceUnavailable {
                message,
                available_models: installed,
            },
            MatchError::Timeout { after } => AppError::Timeout(format!(
                "Analysis timed out after {}s. Try again with a shorter resume or job description, \
                or verify the inference service is running.",
                after.as_secs()
            )),
            MatchError::Transport(message) => AppError::Upstream(message),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message, details): (StatusCode, &str, String, Option<Value>) =
            match &self {
                AppError::Validation(msg) => {
                    (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg.clone(), None)
                }
                AppError::PayloadTooLarge(msg) => (
                    StatusCode::PAYLOAD_TOO_LARGE,
                    "PAYLOAD_TOO_LARGE",
                    msg.clone(),
                    None,
                ),
                AppError::ServiceUnavailable {
                    message,
                    available_models,
                } => {
                    tracing::warn!("Inference service unavailable: {message}");
                    (
                        StatusCode::SERVICE_UNAVAILABLE,
                        "INFERENCE_UNAVAILABLE",
                        message.clone(),
                        Some(json!({ "availableModels": available_models })),
                    )
                }
                AppError::Timeout(msg) => {
                    tracing::warn!("Inference timeout: {msg}");
                    (StatusCode::GATEWAY_TIMEOUT, "INFERENCE_TIMEOUT", msg.clone(), None)
                }
                AppError::Upstream(msg) => {
                    tracing::error!("Inference error: {msg}");
                    (StatusCode::BAD_GATEWAY, "INFERENCE_ERROR", msg.clone(), None)
                }
                AppError::Internal(e) => {
                    tracing::error!("Internal error: {e:?}");
                    (
                        StatusCode::INTERNAL_SERVER_ERROR,
                        "INTERNAL_ERROR",
                        "An internal server error occurred".to_string(),
                        None,
                    )
                }
            };

        let mut error = json!({
            "code": code,
            "message": message
        });
        if let Some(details) = details {
            error["details"] = details;
        }

        (status, Json(json!({ "error": error }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_no_suitable_model_maps_to_503_with_models() {
        let err: AppError = MatchError::NoSuitableModel {
            message: "pull a model".to_string(),
            installed: vec!["qwen2".to_string()],
        }
        .into();
        match &err {
            AppError::ServiceUnavailable {
                available_models, ..
            } => assert_eq!(available_models, &vec!["qwen2".to_string()]),
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(err.into_response().status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[test]
    fn test_timeout_maps_to_504() {
        let err: AppError = MatchError::Timeout {
            after: Duration::from_secs(1200),
        }
        .into();
        assert!(err.to_string().contains("shorter resume"));
        assert_eq!(err.into_response().status(), StatusCode::GATEWAY_TIMEOUT);
    }

    #[test]
    fn test_transport_maps_to_502() {
        let err: AppError = MatchError::Transport("connection reset".to_string()).into();
        assert_eq!(err.into_response().status(), StatusCode::BAD_GATEWAY);
    }

    #[test]
    fn test_validation_maps_to_400() {
        let response = AppError::Validation("empty".to_string()).into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_payload_too_large_maps_to_413() {
        let response = AppError::PayloadTooLarge("limit".to_string()).into_response();
        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    }
}
