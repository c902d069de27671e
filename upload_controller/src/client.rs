use async_trait::async_trait;
use cattle_api::{ClassificationRequest, ClassificationResponse, CLASSIFY_PATH};
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;
use tracing::instrument;

#[derive(Error, Debug)]
pub enum ClientError {
    #[error("Classification request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("Failed to decode classification response: {0}")]
    MalformedResponse(#[source] reqwest::Error),
    #[error("Failed to build HTTP client: {0}")]
    ClientBuild(#[source] reqwest::Error),
}

#[derive(Debug, Clone, PartialEq)]
pub enum ClassifyReply {
    Classified(ClassificationResponse),
    Rejected {
        status: u16,
        code: Option<String>,
        message: Option<String>,
    },
}

// Error bodies may be relayed from the backend verbatim, so nothing is required.
#[derive(Debug, Default, Deserialize)]
struct ErrorBody {
    code: Option<String>,
    message: Option<String>,
}

#[async_trait]
pub trait ClassifyClient: Send + Sync + 'static {
    async fn classify(&self, request: &ClassificationRequest)
        -> Result<ClassifyReply, ClientError>;
}

#[derive(Debug, Clone)]
pub struct HttpClassifyClient {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpClassifyClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, ClientError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(ClientError::ClientBuild)?;

        Ok(Self {
            client,
            endpoint: format!("{}{}", base_url.trim_end_matches('/'), CLASSIFY_PATH),
        })
    }
}

#[async_trait]
impl ClassifyClient for HttpClassifyClient {
    #[instrument(skip(self, request), fields(endpoint = %self.endpoint))]
    async fn classify(
        &self,
        request: &ClassificationRequest,
    ) -> Result<ClassifyReply, ClientError> {
        let response = self.client.post(&self.endpoint).json(request).send().await?;
        let status = response.status();

        if status.is_success() {
            let body = response
                .json::<ClassificationResponse>()
                .await
                .map_err(ClientError::MalformedResponse)?;
            return Ok(ClassifyReply::Classified(body));
        }

        let body = response.json::<ErrorBody>().await.unwrap_or_default();
        Ok(ClassifyReply::Rejected {
            status: status.as_u16(),
            code: body.code,
            message: body.message,
        })
    }
}
