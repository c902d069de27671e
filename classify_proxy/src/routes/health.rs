use crate::server::SharedState;
use axum::{extract::State, response::Json};
use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize)]
pub struct Health {
    status: String,
    backend: String,
}

pub async fn healthcheck(State(state): State<SharedState>) -> Json<Health> {
    Json(Health {
        status: "Available".into(),
        backend: state.classification_service.backend_name().into(),
    })
}
