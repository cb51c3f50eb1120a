//! TensorBoard logging backend.

use super::stats::Stats;
use super::MetricLogger;
use std::path::Path;
use std::sync::Mutex;
use tensorboard_rs::summary_writer::SummaryWriter;

const HISTOGRAM_BUCKETS: usize = 30;

/// Logger that writes to TensorBoard event files.
pub struct TensorBoardLogger {
    writer: Mutex<SummaryWriter>,
}

impl TensorBoardLogger {
    pub fn new(log_dir: impl AsRef<Path>) -> Self {
        let writer = SummaryWriter::new(log_dir.as_ref());
        Self {
            writer: Mutex::new(writer),
        }
    }
}

/// Equal-width bucket limits and counts over `values`.
fn bucketize(values: &[f64], min: f64, max: f64) -> (Vec<f64>, Vec<f64>) {
    let width = ((max - min) / HISTOGRAM_BUCKETS as f64).max(f64::EPSILON);
    let limits: Vec<f64> = (1..=HISTOGRAM_BUCKETS)
        .map(|i| min + width * i as f64)
        .collect();
    let mut counts = vec![0.0; HISTOGRAM_BUCKETS];
    for v in values {
        let idx = (((v - min) / width) as usize).min(HISTOGRAM_BUCKETS - 1);
        counts[idx] += 1.0;
    }
    (limits, counts)
}

impl MetricLogger for TensorBoardLogger {
    fn record_tabular(&self, name: &str, value: f64, step: u64) {
        if let Ok(mut writer) = self.writer.lock() {
            writer.add_scalar(name, value as f32, step as usize);
            let _ = writer.flush();
        }
    }

    fn record_dict(&self, stats: &Stats, step: u64) {
        if let Ok(mut writer) = self.writer.lock() {
            for (name, value) in stats {
                writer.add_scalar(name, *value as f32, step as usize);
            }
            let _ = writer.flush();
        }
    }

    fn add_histogram(&self, name: &str, values: &[f64], step: u64) {
        if values.is_empty() {
            return;
        }
        let min = values.iter().copied().fold(f64::INFINITY, f64::min);
        let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let sum: f64 = values.iter().sum();
        let sum_squares: f64 = values.iter().map(|v| v * v).sum();
        let (limits, counts) = bucketize(values, min, max);

        if let Ok(mut writer) = self.writer.lock() {
            writer.add_histogram_raw(
                name,
                min,
                max,
                values.len() as f64,
                sum,
                sum_squares,
                &limits,
                &counts,
                step as usize,
            );
            let _ = writer.flush();
        }
    }

    fn close(&self) {
        if let Ok(mut writer) = self.writer.lock() {
            let _ = writer.flush();
        }
    }
}
