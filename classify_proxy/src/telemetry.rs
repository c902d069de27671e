use opentelemetry::{
    global,
    metrics::{Counter, Histogram, MeterProvider},
    KeyValue,
};
use prometheus::Registry;
use std::collections::HashSet;

pub struct Metrics {
    request_counter: Counter<u64>,
    classification_duration: Histogram<u64>,
    pub registry: Registry,
}

impl Metrics {
    pub fn new() -> anyhow::Result<Self> {
        let registry = Registry::new();
        let exporter = opentelemetry_prometheus::exporter()
            .with_registry(registry.clone())
            .build()
            .map_err(|e| anyhow::anyhow!("failed to build prometheus exporter: {}", e))?;

        let provider = opentelemetry_sdk::metrics::SdkMeterProvider::builder()
            .with_reader(exporter)
            .build();

        let meter = provider.meter("classify_proxy");
        global::set_meter_provider(provider);

        let request_counter = meter
            .u64_counter("classification_requests_total")
            .with_description("Total number of classification requests by outcome")
            .build();

        // Simulated calls sit at 800ms, real models anywhere up to the timeout.
        let boundaries = generate_boundaries((50, 250, 1000, 5000, 30000));

        let classification_duration = meter
            .u64_histogram("classification_duration_ms")
            .with_boundaries(boundaries)
            .with_description("Duration of classification requests in milliseconds")
            .build();

        Ok(Metrics {
            request_counter,
            classification_duration,
            registry,
        })
    }

    pub fn record_request(&self, backend: &str, outcome: &str) {
        let attributes = vec![
            KeyValue::new("backend", backend.to_string()),
            KeyValue::new("outcome", outcome.to_string()),
        ];
        self.request_counter.add(1, &attributes);
    }

    pub fn record_classification_duration(&self, duration_ms: u64, backend: &str) {
        let attributes = vec![KeyValue::new("backend", backend.to_string())];
        self.classification_duration.record(duration_ms, &attributes);
    }
}

fn generate_boundaries(parts: (i32, i32, i32, i32, i32)) -> Vec<f64> {
    let first_step: usize = 50;
    let middle_step: usize = 250;
    let end_step: usize = 1000;
    let tail_step: usize = 5000;
    let first_part = (parts.0..=parts.1).step_by(first_step);
    let middle_part = (parts.1..=parts.2).step_by(middle_step);
    let end_part = (parts.2..=parts.3).step_by(end_step);
    let tail_part = (parts.3..=parts.4).step_by(tail_step);

    let mut seen = HashSet::new();
    first_part
        .chain(middle_part)
        .chain(end_part)
        .chain(tail_part)
        .filter(|&x| seen.insert(x))
        .map(|x| x as f64)
        .collect()
}
