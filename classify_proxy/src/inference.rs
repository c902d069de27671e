use crate::config::InferenceConfig;
use async_trait::async_trait;
use cattle_api::{BreedPrediction, ClassificationRequest, SIMULATED_MODEL};
use serde::Deserialize;
use std::{sync::Arc, time::Duration};
use thiserror::Error;
use tokio::time::sleep;
use tracing::instrument;

#[derive(Error, Debug)]
pub enum InferenceError {
    #[error("Inference backend is not configured")]
    NotConfigured,
    #[error("Inference backend timed out: {0}")]
    Timeout(#[source] reqwest::Error),
    #[error("Inference request failed: {0}")]
    Request(#[source] reqwest::Error),
    #[error("Inference backend returned a malformed body: {0}")]
    MalformedBody(#[from] serde_json::Error),
    #[error("Failed to build HTTP client: {0}")]
    ClientBuild(#[source] reqwest::Error),
}

impl From<reqwest::Error> for InferenceError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            InferenceError::Timeout(err)
        } else {
            InferenceError::Request(err)
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackendPredictions {
    pub model: Option<String>,
    pub latency_ms: Option<f64>,
    pub predictions: Option<Vec<BreedPrediction>>,
}

#[derive(Debug, Clone)]
pub enum BackendReply {
    Classified(BackendPredictions),
    // non-2xx, relayed untouched
    Rejected {
        status: u16,
        body: serde_json::Value,
    },
}

#[async_trait]
pub trait InferenceBackend: Send + Sync + 'static {
    async fn classify(&self, request: &ClassificationRequest)
        -> Result<BackendReply, InferenceError>;

    fn name(&self) -> &'static str;
}

pub struct HttpInferenceBackend {
    client: reqwest::Client,
    url: String,
    api_key: Option<String>,
}

impl HttpInferenceBackend {
    pub fn new(
        url: impl Into<String>,
        api_key: Option<String>,
        timeout: Duration,
    ) -> Result<Self, InferenceError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(InferenceError::ClientBuild)?;

        Ok(Self {
            client,
            url: url.into(),
            api_key,
        })
    }
}

#[async_trait]
impl InferenceBackend for HttpInferenceBackend {
    #[instrument(skip(self, request), fields(url = %self.url, top_k = request.top_k))]
    async fn classify(
        &self,
        request: &ClassificationRequest,
    ) -> Result<BackendReply, InferenceError> {
        let mut builder = self.client.post(&self.url).json(request);
        if let Some(api_key) = &self.api_key {
            builder = builder.bearer_auth(api_key);
        }

        let response = builder.send().await?;
        let status = response.status();
        let body = response.bytes().await?;

        if status.is_success() {
            let predictions: BackendPredictions = serde_json::from_slice(&body)?;
            tracing::debug!(
                "Backend answered {} with {} predictions",
                status,
                predictions.predictions.as_ref().map_or(0, Vec::len)
            );
            Ok(BackendReply::Classified(predictions))
        } else {
            tracing::warn!("Backend rejected classification with {}", status);
            let body: serde_json::Value = serde_json::from_slice(&body)?;
            Ok(BackendReply::Rejected {
                status: status.as_u16(),
                body,
            })
        }
    }

    fn name(&self) -> &'static str {
        "http"
    }
}

fn canned_predictions() -> [BreedPrediction; 3] {
    [
        BreedPrediction::new("Fake Breed 1", 0.78),
        BreedPrediction::new("Fake Breed 2", 0.12),
        BreedPrediction::new("Fake Breed 3", 0.05),
    ]
}

pub struct SimulatedBackend {
    latency: Duration,
}

impl SimulatedBackend {
    pub fn new(latency: Duration) -> Self {
        Self { latency }
    }
}

#[async_trait]
impl InferenceBackend for SimulatedBackend {
    async fn classify(
        &self,
        request: &ClassificationRequest,
    ) -> Result<BackendReply, InferenceError> {
        tracing::warn!(
            "Inference URL not set, simulating a model response. Set INFERENCE_URL to your model's endpoint."
        );
        sleep(self.latency).await;

        let predictions = canned_predictions()
            .into_iter()
            .take(request.top_k as usize)
            .collect();

        Ok(BackendReply::Classified(BackendPredictions {
            model: Some(SIMULATED_MODEL.to_string()),
            latency_ms: Some(self.latency.as_millis() as f64),
            predictions: Some(predictions),
        }))
    }

    fn name(&self) -> &'static str {
        "simulated"
    }
}

pub struct UnconfiguredBackend;

#[async_trait]
impl InferenceBackend for UnconfiguredBackend {
    async fn classify(
        &self,
        _request: &ClassificationRequest,
    ) -> Result<BackendReply, InferenceError> {
        Err(InferenceError::NotConfigured)
    }

    fn name(&self) -> &'static str {
        "unconfigured"
    }
}

pub fn backend_from_config(
    config: &InferenceConfig,
) -> Result<Arc<dyn InferenceBackend>, InferenceError> {
    match &config.url {
        Some(url) => {
            tracing::info!("Forwarding classifications to {}", url);
            let backend = HttpInferenceBackend::new(
                url.clone(),
                config.api_key.clone(),
                Duration::from_millis(config.timeout_ms),
            )?;
            Ok(Arc::new(backend))
        }
        None if config.simulate_when_unconfigured => {
            tracing::warn!("No inference URL configured, serving simulated predictions");
            Ok(Arc::new(SimulatedBackend::new(Duration::from_millis(
                config.simulated_latency_ms,
            ))))
        }
        None => {
            tracing::warn!("No inference URL configured, classification is disabled");
            Ok(Arc::new(UnconfiguredBackend))
        }
    }
}
