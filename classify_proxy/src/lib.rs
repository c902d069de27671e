mod classification;
mod inference;
mod routes;
mod server;
mod telemetry;

pub mod app;
pub mod config;

pub use app::start_app;
pub use classification::{normalize, ClassificationService, ClassifyOutcome};
pub use inference::{
    backend_from_config, BackendPredictions, BackendReply, HttpInferenceBackend, InferenceBackend,
    InferenceError, SimulatedBackend, UnconfiguredBackend,
};
pub use server::{build_router, HttpServer, SharedState};
pub use telemetry::Metrics;
