//! Console logging backend.

use super::stats::Stats;
use super::MetricLogger;

/// Logger that prints metrics via tracing.
pub struct ConsoleLogger;

impl Default for ConsoleLogger {
    fn default() -> Self {
        Self::new()
    }
}

impl ConsoleLogger {
    pub fn new() -> Self {
        Self
    }
}

impl MetricLogger for ConsoleLogger {
    fn record_tabular(&self, name: &str, value: f64, step: u64) {
        tracing::info!("Epoch {}: {} = {:.4}", step, name, value);
    }

    fn record_dict(&self, stats: &Stats, step: u64) {
        if stats.is_empty() {
            return;
        }
        // One line per dict; BTreeMap keeps the keys sorted
        let body = stats
            .iter()
            .map(|(key, value)| format!("{}={:.4}", key, value))
            .collect::<Vec<_>>()
            .join(", ");

        tracing::info!("Epoch {}: {}", step, body);
    }

    fn add_histogram(&self, name: &str, values: &[f64], step: u64) {
        let (min, max) = values
            .iter()
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
                (lo.min(*v), hi.max(*v))
            });
        tracing::debug!(
            epoch = step,
            samples = values.len(),
            min,
            max,
            "histogram {}",
            name
        );
    }
}
