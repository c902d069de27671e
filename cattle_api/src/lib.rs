use serde::{Deserialize, Serialize};

pub const CLASSIFY_PATH: &str = "/api/classify";

pub const DEFAULT_TOP_K: u32 = 5;

pub const SIMULATED_MODEL: &str = "simulated-model/v1";

// Reported when a backend omits its model name.
pub const EXTERNAL_MODEL: &str = "external";

pub mod codes {
    pub const BAD_REQUEST: &str = "BAD_REQUEST";
    pub const INTERNAL_ERROR: &str = "INTERNAL_ERROR";
    pub const MODEL_NOT_CONFIGURED: &str = "MODEL_NOT_CONFIGURED";
    pub const BACKEND_TIMEOUT: &str = "BACKEND_TIMEOUT";
    pub const PAYLOAD_TOO_LARGE: &str = "PAYLOAD_TOO_LARGE";
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassificationRequest {
    pub image_base64: String,
    #[serde(default = "default_top_k")]
    pub top_k: u32,
}

fn default_top_k() -> u32 {
    DEFAULT_TOP_K
}

impl ClassificationRequest {
    pub fn new(image_base64: impl Into<String>, top_k: u32) -> Self {
        Self {
            image_base64: image_base64.into(),
            top_k,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawBreedPrediction")]
pub struct BreedPrediction {
    pub label: String,
    pub confidence: f64,
}

// Some backends name the class `breed`. When both are present `label` wins.
#[derive(Deserialize)]
struct RawBreedPrediction {
    label: Option<String>,
    breed: Option<String>,
    confidence: f64,
}

impl TryFrom<RawBreedPrediction> for BreedPrediction {
    type Error = String;

    fn try_from(raw: RawBreedPrediction) -> Result<Self, Self::Error> {
        let label = raw
            .label
            .or(raw.breed)
            .ok_or_else(|| "missing field `label`".to_string())?;

        Ok(Self {
            label,
            confidence: raw.confidence,
        })
    }
}

impl BreedPrediction {
    pub fn new(label: impl Into<String>, confidence: f64) -> Self {
        Self {
            label: label.into(),
            confidence,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassificationResponse {
    pub model: String,
    pub latency_ms: u64,
    pub predictions: Vec<BreedPrediction>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiError {
    pub code: String,
    pub message: String,
}

impl ApiError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }

    pub fn is_not_configured(&self) -> bool {
        self.code == codes::MODEL_NOT_CONFIGURED
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_request_defaults_top_k() {
        let request: ClassificationRequest =
            serde_json::from_value(json!({ "imageBase64": "data:image/png;base64,AAAA" }))
                .unwrap();

        assert_eq!(request.top_k, DEFAULT_TOP_K);
        assert_eq!(request.image_base64, "data:image/png;base64,AAAA");
    }

    #[test]
    fn test_request_serializes_camel_case() {
        let request = ClassificationRequest::new("data:image/png;base64,AAAA", 3);
        let value = serde_json::to_value(&request).unwrap();

        assert_eq!(
            value,
            json!({ "imageBase64": "data:image/png;base64,AAAA", "topK": 3 })
        );
    }

    #[test]
    fn test_prediction_accepts_breed_alias() {
        let prediction: BreedPrediction =
            serde_json::from_value(json!({ "breed": "Gir", "confidence": 0.4 })).unwrap();

        assert_eq!(prediction, BreedPrediction::new("Gir", 0.4));
    }

    #[test]
    fn test_prediction_prefers_label_over_breed() {
        let prediction: BreedPrediction = serde_json::from_value(
            json!({ "label": "Gir", "breed": "gir_cattle", "confidence": 0.4 }),
        )
        .unwrap();

        assert_eq!(prediction, BreedPrediction::new("Gir", 0.4));
    }

    #[test]
    fn test_prediction_without_label_is_rejected() {
        let result = serde_json::from_value::<BreedPrediction>(json!({ "confidence": 0.4 }));

        assert!(result.unwrap_err().to_string().contains("label"));
    }

    #[test]
    fn test_response_uses_latency_ms_field() {
        let response = ClassificationResponse {
            model: SIMULATED_MODEL.to_string(),
            latency_ms: 800,
            predictions: vec![BreedPrediction::new("Fake Breed 1", 0.78)],
        };
        let value = serde_json::to_value(&response).unwrap();

        assert_eq!(value["latencyMs"], 800);
        assert_eq!(value["predictions"][0]["label"], "Fake Breed 1");
    }
}
