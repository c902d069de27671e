use crate::{
    classification::ClassificationService,
    config::{ClassifyConfig, Config},
    inference::backend_from_config,
    routes::api_routes,
    telemetry::Metrics,
};
use axum::{extract::DefaultBodyLimit, Router};
use axum_otel_metrics::HttpMetricsLayerBuilder;
use std::sync::Arc;
use tokio::{net::TcpListener, sync::broadcast::Receiver, task::JoinHandle};

#[derive(Clone)]
pub struct SharedState {
    pub classification_service: ClassificationService,
    pub classify_config: ClassifyConfig,
    pub metrics: Arc<Metrics>,
}

impl SharedState {
    pub fn new(
        classification_service: ClassificationService,
        classify_config: ClassifyConfig,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            classification_service,
            classify_config,
            metrics,
        }
    }
}

pub fn build_router(state: SharedState, body_limit_bytes: usize) -> Router {
    Router::new()
        .merge(api_routes())
        .with_state(state)
        .layer(DefaultBodyLimit::max(body_limit_bytes))
}

pub struct HttpServer {
    router: Router,
    listener: TcpListener,
}

impl HttpServer {
    pub async fn new(config: &Config) -> anyhow::Result<Self> {
        let addr = config.server.get_address();

        let backend = backend_from_config(&config.inference)?;
        let metrics = Arc::new(Metrics::new()?);
        let metrics_layer = HttpMetricsLayerBuilder::new().build();

        let app_state = SharedState::new(
            ClassificationService::new(backend),
            config.classify.clone(),
            metrics,
        );

        let router = build_router(app_state, config.server.body_limit_bytes).layer(metrics_layer);

        let listener = TcpListener::bind(addr).await?;

        Ok(Self { router, listener })
    }

    pub async fn run(
        self,
        shutdown_rx: Receiver<()>,
    ) -> anyhow::Result<JoinHandle<anyhow::Result<()>>> {
        tracing::info!("Starting classify proxy on {}", self.listener.local_addr()?);

        let listener = self.listener;
        let router = self.router;
        let server_handle = tokio::spawn({
            let mut shutdown_rx = shutdown_rx.resubscribe();
            async move {
                axum::serve(listener, router)
                    .with_graceful_shutdown(async move {
                        shutdown_rx.recv().await.ok();
                    })
                    .await?;
                Ok(())
            }
        });

        Ok(server_handle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inference::{BackendReply, InferenceBackend, InferenceError, SimulatedBackend};
    use crate::inference::UnconfiguredBackend;
    use async_trait::async_trait;
    use axum::{
        body::{to_bytes, Body},
        http::{header, Request, StatusCode},
    };
    use cattle_api::{
        codes, ApiError, ClassificationRequest, ClassificationResponse, SIMULATED_MODEL,
    };
    use serde_json::json;
    use std::time::{Duration, Instant};
    use tower::ServiceExt;
    use wiremock::{matchers::method, Mock, MockServer, ResponseTemplate};

    struct FailingBackend;

    #[async_trait]
    impl InferenceBackend for FailingBackend {
        async fn classify(
            &self,
            _request: &ClassificationRequest,
        ) -> Result<BackendReply, InferenceError> {
            Err(InferenceError::MalformedBody(
                serde_json::from_str::<serde_json::Value>("{").unwrap_err(),
            ))
        }

        fn name(&self) -> &'static str {
            "failing"
        }
    }

    fn router_with(backend: Arc<dyn InferenceBackend>, body_limit_bytes: usize) -> Router {
        let state = SharedState::new(
            ClassificationService::new(backend),
            ClassifyConfig::default(),
            Arc::new(Metrics::new().unwrap()),
        );
        build_router(state, body_limit_bytes)
    }

    fn simulated_router(latency_ms: u64) -> Router {
        router_with(
            Arc::new(SimulatedBackend::new(Duration::from_millis(latency_ms))),
            1024 * 1024,
        )
    }

    fn classify_request(body: serde_json::Value) -> Request<Body> {
        Request::post(cattle_api::CLASSIFY_PATH)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn read_json<T: serde::de::DeserializeOwned>(response: axum::response::Response) -> T {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_missing_image_is_bad_request() {
        let response = simulated_router(0)
            .oneshot(classify_request(json!({ "topK": 3 })))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let error: ApiError = read_json(response).await;
        assert_eq!(error.code, codes::BAD_REQUEST);
        assert_eq!(error.message, "imageBase64 is required");
    }

    #[tokio::test]
    async fn test_malformed_json_is_bad_request() {
        let request = Request::post(cattle_api::CLASSIFY_PATH)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from("{\"imageBase64\":"))
            .unwrap();

        let response = simulated_router(0).oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let error: ApiError = read_json(response).await;
        assert_eq!(error.code, codes::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_oversized_body_is_rejected() {
        let router = router_with(Arc::new(SimulatedBackend::new(Duration::ZERO)), 64);
        let image = format!("data:image/png;base64,{}", "A".repeat(256));

        let response = router
            .oneshot(classify_request(json!({ "imageBase64": image })))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
        let error: ApiError = read_json(response).await;
        assert_eq!(error.code, codes::PAYLOAD_TOO_LARGE);
    }

    #[tokio::test]
    async fn test_simulated_classification() {
        let started = Instant::now();
        let response = simulated_router(20)
            .oneshot(classify_request(json!({ "imageBase64": "data:image/jpeg;base64,/9j/" })))
            .await
            .unwrap();

        assert!(started.elapsed() >= Duration::from_millis(20));
        assert_eq!(response.status(), StatusCode::OK);
        let body: ClassificationResponse = read_json(response).await;
        assert_eq!(body.model, SIMULATED_MODEL);
        assert_eq!(body.latency_ms, 20);
        assert_eq!(body.predictions.len(), 3);
        assert_eq!(body.predictions[0].label, "Fake Breed 1");
        assert_eq!(body.predictions[0].confidence, 0.78);
    }

    #[tokio::test]
    async fn test_simulated_classification_respects_top_k_and_is_deterministic() {
        let router = simulated_router(0);
        let body = json!({ "imageBase64": "data:image/jpeg;base64,/9j/", "topK": 1 });

        let first: ClassificationResponse = read_json(
            router
                .clone()
                .oneshot(classify_request(body.clone()))
                .await
                .unwrap(),
        )
        .await;
        let second: ClassificationResponse =
            read_json(router.oneshot(classify_request(body)).await.unwrap()).await;

        assert_eq!(first.predictions.len(), 1);
        assert_eq!(first.predictions, second.predictions);
    }

    #[tokio::test]
    async fn test_unconfigured_backend_reports_503() {
        let router = router_with(Arc::new(UnconfiguredBackend), 1024);

        let response = router
            .oneshot(classify_request(json!({ "imageBase64": "data:image/png;base64,AA" })))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        let error: ApiError = read_json(response).await;
        assert!(error.is_not_configured());
    }

    #[tokio::test]
    async fn test_internal_failure_hides_cause() {
        let router = router_with(Arc::new(FailingBackend), 1024);

        let response = router
            .oneshot(classify_request(json!({ "imageBase64": "data:image/png;base64,AA" })))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let error: ApiError = read_json(response).await;
        assert_eq!(
            error,
            ApiError::new(codes::INTERNAL_ERROR, "Unexpected server error")
        );
    }

    #[tokio::test]
    async fn test_backend_errors_pass_through_unmodified() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500).set_body_json(json!({
                "code": "INTERNAL_ERROR",
                "message": "boom",
                "detail": { "gpu": 0 }
            })))
            .mount(&server)
            .await;

        let backend = crate::inference::HttpInferenceBackend::new(
            server.uri(),
            None,
            Duration::from_secs(5),
        )
        .unwrap();
        let response = router_with(Arc::new(backend), 1024 * 1024)
            .oneshot(classify_request(json!({ "imageBase64": "data:image/png;base64,AA" })))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body: serde_json::Value = read_json(response).await;
        assert_eq!(
            body,
            json!({ "code": "INTERNAL_ERROR", "message": "boom", "detail": { "gpu": 0 } })
        );
    }

    #[tokio::test]
    async fn test_real_backend_is_normalized() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "predictions": [
                    { "label": "Gir", "confidence": 0.6 },
                    { "label": "Sahiwal", "confidence": 0.3 },
                    { "label": "Jersey", "confidence": 0.1 }
                ]
            })))
            .mount(&server)
            .await;

        let backend = crate::inference::HttpInferenceBackend::new(
            server.uri(),
            None,
            Duration::from_secs(5),
        )
        .unwrap();
        let response = router_with(Arc::new(backend), 1024 * 1024)
            .oneshot(classify_request(json!({
                "imageBase64": "data:image/png;base64,AA",
                "topK": 2
            })))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body: ClassificationResponse = read_json(response).await;
        assert_eq!(body.model, cattle_api::EXTERNAL_MODEL);
        assert_eq!(body.predictions.len(), 2);
        assert_eq!(body.predictions[0].label, "Gir");
    }

    #[tokio::test]
    async fn test_backend_timeout_maps_to_504() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({ "predictions": [] }))
                    .set_delay(Duration::from_millis(500)),
            )
            .mount(&server)
            .await;

        let backend = crate::inference::HttpInferenceBackend::new(
            server.uri(),
            None,
            Duration::from_millis(50),
        )
        .unwrap();
        let response = router_with(Arc::new(backend), 1024 * 1024)
            .oneshot(classify_request(json!({ "imageBase64": "data:image/png;base64,AA" })))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::GATEWAY_TIMEOUT);
        let error: ApiError = read_json(response).await;
        assert_eq!(error.code, codes::BACKEND_TIMEOUT);
    }

    #[tokio::test]
    async fn test_health_reports_backend() {
        let response = simulated_router(0)
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body: serde_json::Value = read_json(response).await;
        assert_eq!(body, json!({ "status": "Available", "backend": "simulated" }));
    }
}
