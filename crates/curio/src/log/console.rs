//! Console logging backend.

use super::{MetricLogger, Metrics};

/// Logger that prints metrics via tracing.
#[derive(Default)]
pub struct ConsoleLogger;

impl ConsoleLogger {
    pub fn new() -> Self {
        Self
    }
}

impl MetricLogger for ConsoleLogger {
    fn log_scalar(&self, name: &str, value: f64, step: u64) {
        tracing::info!("Step {}: {} = {:.4}", step, name, value);
    }

    fn log_metrics(&self, metrics: &Metrics, step: u64) {
        // One line per call, keys in sorted order
        let fields: Vec<String> = metrics
            .iter()
            .map(|(key, value)| format!("{}={:.4}", key, value))
            .collect();
        tracing::info!("Step {}: {}", step, fields.join(", "));
    }
}
