use crate::inference::{BackendPredictions, BackendReply, InferenceBackend, InferenceError};
use cattle_api::{ClassificationRequest, ClassificationResponse, EXTERNAL_MODEL};
use std::{
    sync::Arc,
    time::{Duration, Instant},
};
use tracing::instrument;

#[derive(Debug, Clone)]
pub enum ClassifyOutcome {
    Classified(ClassificationResponse),
    Passthrough {
        status: u16,
        body: serde_json::Value,
    },
}

#[derive(Clone)]
pub struct ClassificationService {
    backend: Arc<dyn InferenceBackend>,
}

impl ClassificationService {
    pub fn new(backend: Arc<dyn InferenceBackend>) -> Self {
        Self { backend }
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    #[instrument(skip(self, request), fields(backend = self.backend.name(), top_k = request.top_k))]
    pub async fn classify(
        &self,
        request: ClassificationRequest,
    ) -> Result<ClassifyOutcome, InferenceError> {
        let started = Instant::now();
        let reply = self.backend.classify(&request).await?;

        match reply {
            BackendReply::Classified(raw) => Ok(ClassifyOutcome::Classified(normalize(
                raw,
                request.top_k,
                started.elapsed(),
            ))),
            BackendReply::Rejected { status, body } => {
                Ok(ClassifyOutcome::Passthrough { status, body })
            }
        }
    }
}

pub fn normalize(raw: BackendPredictions, top_k: u32, elapsed: Duration) -> ClassificationResponse {
    let mut predictions = raw.predictions.unwrap_or_default();
    predictions.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));
    predictions.truncate(top_k as usize);

    let latency_ms = match raw.latency_ms {
        Some(ms) if ms.is_finite() && ms >= 0.0 => ms.round() as u64,
        _ => elapsed.as_millis() as u64,
    };

    ClassificationResponse {
        model: raw.model.unwrap_or_else(|| EXTERNAL_MODEL.to_string()),
        latency_ms,
        predictions,
    }
}
