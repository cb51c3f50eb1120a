//! Metric logger traits and composites.

use super::stats::Stats;
use std::collections::BTreeMap;
use std::sync::Mutex;

/// Trait for recording training metrics to various backends.
///
/// A logger is created once by the caller and shared with every component
/// that reports metrics. `step` is the training epoch the value belongs to.
pub trait MetricLogger: Send + Sync {
    /// Record a single scalar (e.g. loss, mean reward).
    fn record_tabular(&self, name: &str, value: f64, step: u64);

    /// Record a set of named scalars, typically produced by [`super::create_stats`].
    fn record_dict(&self, stats: &Stats, step: u64) {
        for (name, value) in stats {
            self.record_tabular(name, *value, step);
        }
    }

    /// Record the raw distribution of a batch of samples.
    fn add_histogram(&self, name: &str, values: &[f64], step: u64);

    /// Close the logger and flush any pending writes.
    fn close(&self) {}
}

/// A logger that does nothing (default).
pub struct NoOpLogger;

impl MetricLogger for NoOpLogger {
    fn record_tabular(&self, _name: &str, _value: f64, _step: u64) {}
    fn add_histogram(&self, _name: &str, _values: &[f64], _step: u64) {}
}

/// A composite logger that dispatches to multiple backends.
pub struct CompositeLogger {
    loggers: Vec<Box<dyn MetricLogger>>,
}

impl CompositeLogger {
    pub fn new(loggers: Vec<Box<dyn MetricLogger>>) -> Self {
        Self { loggers }
    }

    pub fn add(&mut self, logger: Box<dyn MetricLogger>) {
        self.loggers.push(logger);
    }
}

impl MetricLogger for CompositeLogger {
    fn record_tabular(&self, name: &str, value: f64, step: u64) {
        for logger in &self.loggers {
            logger.record_tabular(name, value, step);
        }
    }

    fn record_dict(&self, stats: &Stats, step: u64) {
        for logger in &self.loggers {
            logger.record_dict(stats, step);
        }
    }

    fn add_histogram(&self, name: &str, values: &[f64], step: u64) {
        for logger in &self.loggers {
            logger.add_histogram(name, values, step);
        }
    }

    fn close(&self) {
        for logger in &self.loggers {
            logger.close();
        }
    }
}

/// Keeps the latest value of every scalar and every histogram in memory.
#[derive(Default)]
pub struct MemoryLogger {
    scalars: Mutex<BTreeMap<String, (u64, f64)>>,
    histograms: Mutex<BTreeMap<String, (u64, Vec<f64>)>>,
}

impl MemoryLogger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Latest value recorded under `name`.
    pub fn scalar(&self, name: &str) -> Option<f64> {
        self.scalars
            .lock()
            .ok()
            .and_then(|s| s.get(name).map(|(_, v)| *v))
    }

    /// Latest histogram samples recorded under `name`.
    pub fn histogram(&self, name: &str) -> Option<Vec<f64>> {
        self.histograms
            .lock()
            .ok()
            .and_then(|h| h.get(name).map(|(_, v)| v.clone()))
    }

    pub fn scalar_names(&self) -> Vec<String> {
        self.scalars
            .lock()
            .map(|s| s.keys().cloned().collect())
            .unwrap_or_default()
    }

    pub fn histogram_names(&self) -> Vec<String> {
        self.histograms
            .lock()
            .map(|h| h.keys().cloned().collect())
            .unwrap_or_default()
    }
}

impl MetricLogger for MemoryLogger {
    fn record_tabular(&self, name: &str, value: f64, step: u64) {
        if let Ok(mut scalars) = self.scalars.lock() {
            scalars.insert(name.to_string(), (step, value));
        }
    }

    fn add_histogram(&self, name: &str, values: &[f64], step: u64) {
        if let Ok(mut histograms) = self.histograms.lock() {
            histograms.insert(name.to_string(), (step, values.to_vec()));
        }
    }
}
