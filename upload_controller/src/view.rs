use crate::controller::{Session, Status};
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PredictionRow {
    pub label: String,
    pub percent: u32,
    // never empty, so tiny scores stay visible
    pub bar_value: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ResultsView {
    Idle,
    Classifying,
    Error {
        message: String,
    },
    NotConfigured {
        message: String,
    },
    Success {
        top_label: Option<String>,
        rows: Vec<PredictionRow>,
    },
}

pub fn confidence_percent(confidence: f64) -> u32 {
    (confidence * 100.0).round().clamp(0.0, 100.0) as u32
}

impl ResultsView {
    pub fn from_session(session: &Session) -> Self {
        let message = || session.error.clone().unwrap_or_default();

        match session.status {
            Status::Idle => ResultsView::Idle,
            Status::Classifying => ResultsView::Classifying,
            Status::Error => ResultsView::Error { message: message() },
            Status::NotConfigured => ResultsView::NotConfigured { message: message() },
            Status::Success => {
                let predictions = session.predictions.as_deref().unwrap_or_default();
                let rows = predictions
                    .iter()
                    .map(|prediction| {
                        let percent = confidence_percent(prediction.confidence);
                        PredictionRow {
                            label: prediction.label.clone(),
                            percent,
                            bar_value: percent.max(1),
                        }
                    })
                    .collect();

                ResultsView::Success {
                    top_label: predictions.first().map(|p| p.label.clone()),
                    rows,
                }
            }
        }
    }
}
