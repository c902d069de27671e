use crate::{
    acquisition::{load_image, AcquisitionError, ImageSource, InputModality, PasteEvent},
    client::{ClassifyClient, ClassifyReply, ClientError},
    paste::PasteSubscription,
    view::ResultsView,
};
use cattle_api::{codes, BreedPrediction, ClassificationRequest, DEFAULT_TOP_K};
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::Arc;
use tokio::{
    sync::broadcast::{self, error::RecvError},
    task::JoinSet,
};
use tracing::instrument;

pub mod messages {
    pub const NOT_AN_IMAGE: &str = "Please upload an image file.";
    pub const UNREADABLE_FILE: &str = "Could not read the selected file.";
    pub const CLASSIFICATION_FAILED: &str = "Failed to classify the image.";
    pub const NETWORK_ERROR: &str = "Network error while classifying the image.";
    pub const NOT_CONFIGURED: &str =
        "Model backend not configured. Set INFERENCE_URL (and optionally INFERENCE_API_KEY) for the server.";
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    Idle,
    Classifying,
    Success,
    Error,
    NotConfigured,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Session {
    pub status: Status,
    // data URI
    pub image: Option<String>,
    pub predictions: Option<Vec<BreedPrediction>>,
    pub error: Option<String>,
}

impl Default for Session {
    fn default() -> Self {
        Self {
            status: Status::Idle,
            image: None,
            predictions: None,
            error: None,
        }
    }
}

struct Inner {
    session: Session,
    // Bumped by every classification, local failure and reset. A reply is
    // applied only if no newer action happened while it was in flight.
    generation: u64,
}

pub struct UploadController<C> {
    client: Arc<C>,
    inner: Arc<Mutex<Inner>>,
    top_k: u32,
}

impl<C> Clone for UploadController<C> {
    fn clone(&self) -> Self {
        Self {
            client: self.client.clone(),
            inner: self.inner.clone(),
            top_k: self.top_k,
        }
    }
}

impl<C: ClassifyClient> UploadController<C> {
    pub fn new(client: C) -> Self {
        Self {
            client: Arc::new(client),
            inner: Arc::new(Mutex::new(Inner {
                session: Session::default(),
                generation: 0,
            })),
            top_k: DEFAULT_TOP_K,
        }
    }

    pub fn with_top_k(mut self, top_k: u32) -> Self {
        self.top_k = top_k;
        self
    }

    pub fn snapshot(&self) -> Session {
        self.inner.lock().session.clone()
    }

    pub fn status(&self) -> Status {
        self.inner.lock().session.status
    }

    pub fn view(&self) -> ResultsView {
        ResultsView::from_session(&self.inner.lock().session)
    }

    pub fn reset(&self) {
        let mut inner = self.inner.lock();
        inner.generation += 1;
        inner.session = Session::default();
        tracing::debug!("Session reset");
    }

    // Only the first file is used.
    #[instrument(skip(self, files), fields(count = files.len()))]
    pub async fn on_files(&self, modality: InputModality, files: Vec<ImageSource>) {
        let Some(source) = files.into_iter().next() else {
            return;
        };
        self.acquire(modality, source).await;
    }

    pub async fn on_paste(&self, event: PasteEvent) {
        match event.into_image() {
            Some(source) => self.acquire(InputModality::Paste, source).await,
            None => tracing::debug!("Ignoring paste without image content"),
        }
    }

    // Each paste is handled in its own task so a new paste is acquired while
    // an older one is still classifying. The tasks live in the listener's
    // JoinSet and are aborted along with it.
    pub fn subscribe_paste(
        &self,
        mut paste_rx: broadcast::Receiver<PasteEvent>,
    ) -> PasteSubscription {
        let controller = self.clone();
        let handle = tokio::spawn(async move {
            let mut in_flight = JoinSet::new();
            loop {
                tokio::select! {
                    received = paste_rx.recv() => match received {
                        Ok(event) => {
                            let controller = controller.clone();
                            in_flight.spawn(async move { controller.on_paste(event).await });
                        }
                        Err(RecvError::Lagged(skipped)) => {
                            tracing::warn!("Paste listener lagged, skipped {} events", skipped);
                        }
                        Err(RecvError::Closed) => break,
                    },
                    Some(joined) = in_flight.join_next(), if !in_flight.is_empty() => {
                        if let Err(err) = joined {
                            tracing::error!("Paste handler failed: {:?}", err);
                        }
                    }
                }
            }
            while in_flight.join_next().await.is_some() {}
            tracing::debug!("Paste listener stopped");
        });

        PasteSubscription::new(handle)
    }

    async fn acquire(&self, modality: InputModality, source: ImageSource) {
        match load_image(source).await {
            Ok(image) => {
                tracing::debug!(
                    "Acquired {} ({} bytes) via {:?}",
                    image.mime,
                    image.data.len(),
                    modality
                );
                self.classify(image.to_data_url()).await;
            }
            Err(err) => {
                tracing::warn!("Rejected image from {:?}: {}", modality, err);
                let message = match err {
                    AcquisitionError::NotAnImage(_) => messages::NOT_AN_IMAGE,
                    AcquisitionError::Read { .. } => messages::UNREADABLE_FILE,
                };
                self.fail_locally(message);
            }
        }
    }

    fn fail_locally(&self, message: &str) {
        let mut inner = self.inner.lock();
        inner.generation += 1;
        inner.session.status = Status::Error;
        inner.session.error = Some(message.to_string());
    }

    pub async fn classify(&self, data_url: String) {
        let generation = {
            let mut inner = self.inner.lock();
            inner.generation += 1;
            inner.session = Session {
                status: Status::Classifying,
                image: Some(data_url.clone()),
                predictions: None,
                error: None,
            };
            inner.generation
        };

        let request = ClassificationRequest::new(data_url, self.top_k);
        let result = self.client.classify(&request).await;

        let mut inner = self.inner.lock();
        if inner.generation != generation {
            tracing::debug!(
                "Discarding stale classification {} (current is {})",
                generation,
                inner.generation
            );
            return;
        }
        apply_reply(&mut inner.session, result);
    }
}

fn apply_reply(session: &mut Session, result: Result<ClassifyReply, ClientError>) {
    match result {
        Ok(ClassifyReply::Classified(response)) => {
            session.predictions = Some(response.predictions);
            session.status = Status::Success;
        }
        Ok(ClassifyReply::Rejected {
            status: 503,
            code: Some(code),
            ..
        }) if code == codes::MODEL_NOT_CONFIGURED => {
            session.status = Status::NotConfigured;
            session.error = Some(messages::NOT_CONFIGURED.to_string());
        }
        Ok(ClassifyReply::Rejected {
            status, message, ..
        }) => {
            tracing::warn!("Classification rejected with status {}", status);
            session.status = Status::Error;
            session.error = Some(
                message
                    .filter(|m| !m.is_empty())
                    .unwrap_or_else(|| messages::CLASSIFICATION_FAILED.to_string()),
            );
        }
        Err(err) => {
            tracing::error!("Classification call failed: {:?}", err);
            session.status = Status::Error;
            session.error = Some(messages::NETWORK_ERROR.to_string());
        }
    }
}
