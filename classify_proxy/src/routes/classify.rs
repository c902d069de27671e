use crate::{
    classification::ClassifyOutcome, inference::InferenceError, server::SharedState,
};
use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use cattle_api::{codes, ApiError, ClassificationRequest, DEFAULT_TOP_K};
use serde::Deserialize;
use std::time::Instant;
use thiserror::Error;
use tracing::instrument;

// Loosely typed so a wrong field type is a validation failure, not a decoding one.
#[derive(Debug, Deserialize)]
pub struct ClassifyPayload {
    #[serde(rename = "imageBase64")]
    image_base64: Option<serde_json::Value>,
    #[serde(rename = "topK")]
    top_k: Option<serde_json::Value>,
}

#[derive(Error, Debug)]
pub enum ClassifyError {
    #[error("{0}")]
    BadRequest(String),
    #[error("Request body exceeds the configured limit")]
    PayloadTooLarge,
    #[error(transparent)]
    Inference(#[from] InferenceError),
}

impl ClassifyError {
    fn outcome(&self) -> &'static str {
        match self {
            ClassifyError::BadRequest(_) | ClassifyError::PayloadTooLarge => "invalid",
            ClassifyError::Inference(InferenceError::NotConfigured) => "not_configured",
            ClassifyError::Inference(InferenceError::Timeout(_)) => "timeout",
            ClassifyError::Inference(_) => "failed",
        }
    }
}

impl IntoResponse for ClassifyError {
    fn into_response(self) -> Response {
        let (status, error) = match self {
            ClassifyError::BadRequest(message) => {
                (StatusCode::BAD_REQUEST, ApiError::new(codes::BAD_REQUEST, message))
            }
            ClassifyError::PayloadTooLarge => (
                StatusCode::PAYLOAD_TOO_LARGE,
                ApiError::new(codes::PAYLOAD_TOO_LARGE, "Image payload is too large"),
            ),
            ClassifyError::Inference(InferenceError::NotConfigured) => (
                StatusCode::SERVICE_UNAVAILABLE,
                ApiError::new(
                    codes::MODEL_NOT_CONFIGURED,
                    "Model backend not configured. Set INFERENCE_URL (and optionally INFERENCE_API_KEY) for the server.",
                ),
            ),
            ClassifyError::Inference(InferenceError::Timeout(err)) => {
                tracing::error!("/api/classify backend timeout: {:?}", err);
                (
                    StatusCode::GATEWAY_TIMEOUT,
                    ApiError::new(
                        codes::BACKEND_TIMEOUT,
                        "Inference backend did not respond in time",
                    ),
                )
            }
            ClassifyError::Inference(err) => {
                tracing::error!("/api/classify error: {:?}", err);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ApiError::new(codes::INTERNAL_ERROR, "Unexpected server error"),
                )
            }
        };
        (status, Json(error)).into_response()
    }
}

impl From<JsonRejection> for ClassifyError {
    fn from(rejection: JsonRejection) -> Self {
        if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE {
            ClassifyError::PayloadTooLarge
        } else {
            ClassifyError::BadRequest(format!("Invalid JSON body: {}", rejection.body_text()))
        }
    }
}

pub fn validate(
    payload: ClassifyPayload,
    max_top_k: u32,
) -> Result<ClassificationRequest, ClassifyError> {
    let image_base64 = match payload.image_base64 {
        Some(serde_json::Value::String(image)) if !image.is_empty() => image,
        _ => {
            return Err(ClassifyError::BadRequest(
                "imageBase64 is required".to_string(),
            ))
        }
    };

    let top_k = match payload.top_k {
        None | Some(serde_json::Value::Null) => DEFAULT_TOP_K,
        Some(value) => value
            .as_u64()
            .filter(|k| (1..=u64::from(max_top_k)).contains(k))
            .map(|k| k as u32)
            .ok_or_else(|| {
                ClassifyError::BadRequest(format!(
                    "topK must be an integer between 1 and {}",
                    max_top_k
                ))
            })?,
    };

    Ok(ClassificationRequest::new(image_base64, top_k))
}

#[instrument(skip(state, payload))]
pub async fn classify(
    State(state): State<SharedState>,
    payload: Result<Json<ClassifyPayload>, JsonRejection>,
) -> Result<Response, ClassifyError> {
    let backend = state.classification_service.backend_name();
    let started = Instant::now();

    let result = handle(&state, payload).await;

    match &result {
        Ok(ClassifyOutcome::Classified(response)) => {
            state.metrics.record_request(backend, "classified");
            state
                .metrics
                .record_classification_duration(started.elapsed().as_millis() as u64, backend);
            tracing::info!(
                "Classified image with {} ({} predictions, {}ms)",
                response.model,
                response.predictions.len(),
                response.latency_ms
            );
        }
        Ok(ClassifyOutcome::Passthrough { status, .. }) => {
            state.metrics.record_request(backend, "passthrough");
            tracing::warn!("Relaying backend error status {}", status);
        }
        Err(err) => state.metrics.record_request(backend, err.outcome()),
    }

    let response = match result? {
        ClassifyOutcome::Classified(response) => (StatusCode::OK, Json(response)).into_response(),
        ClassifyOutcome::Passthrough { status, body } => (
            StatusCode::from_u16(status).unwrap_or(StatusCode::BAD_GATEWAY),
            Json(body),
        )
            .into_response(),
    };

    Ok(response)
}

async fn handle(
    state: &SharedState,
    payload: Result<Json<ClassifyPayload>, JsonRejection>,
) -> Result<ClassifyOutcome, ClassifyError> {
    let Json(payload) = payload?;
    let request = validate(payload, state.classify_config.max_top_k)?;

    Ok(state.classification_service.classify(request).await?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn payload(value: serde_json::Value) -> ClassifyPayload {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_validate_defaults_top_k() {
        let request = validate(payload(json!({ "imageBase64": "data:image/png;base64,AA" })), 50)
            .unwrap();

        assert_eq!(request.top_k, 5);
    }

    #[test]
    fn test_validate_rejects_missing_or_non_string_image() {
        for body in [
            json!({}),
            json!({ "imageBase64": "" }),
            json!({ "imageBase64": 42 }),
            json!({ "imageBase64": null, "topK": 3 }),
        ] {
            let result = validate(payload(body), 50);
            assert!(matches!(result, Err(ClassifyError::BadRequest(_))));
        }
    }

    #[test]
    fn test_validate_bounds_top_k() {
        let image = "data:image/png;base64,AA";
        for top_k in [json!(0), json!(51), json!(-1), json!(2.5), json!("3")] {
            let result = validate(payload(json!({ "imageBase64": image, "topK": top_k })), 50);
            assert!(matches!(result, Err(ClassifyError::BadRequest(_))));
        }

        let request = validate(payload(json!({ "imageBase64": image, "topK": 50 })), 50).unwrap();
        assert_eq!(request.top_k, 50);
    }
}
