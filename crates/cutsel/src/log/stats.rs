//! Summary statistics over batches of samples.

use std::collections::BTreeMap;

/// Named scalar statistics, ordered by name.
pub type Stats = BTreeMap<String, f64>;

/// Summarize `values` as `{name} Mean`, `Std`, `Max`, `Min` and `Median`.
///
/// A single sample is reported as-is under `name`. Empty input yields no
/// entries. Std is the population standard deviation.
pub fn create_stats(name: &str, values: &[f64]) -> Stats {
    let mut stats = Stats::new();
    match values.len() {
        0 => {}
        1 => {
            stats.insert(name.to_string(), values[0]);
        }
        n => {
            let mean = values.iter().sum::<f64>() / n as f64;
            let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n as f64;
            let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
            let min = values.iter().copied().fold(f64::INFINITY, f64::min);

            stats.insert(format!("{name} Mean"), mean);
            stats.insert(format!("{name} Std"), var.sqrt());
            stats.insert(format!("{name} Max"), max);
            stats.insert(format!("{name} Min"), min);
            stats.insert(format!("{name} Median"), median(values));
        }
    }
    stats
}

/// Median with the midpoint convention for even lengths. NaNs sort last.
pub fn median(values: &[f64]) -> f64 {
    if values.is_empty() {
        return f64::NAN;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    } else {
        sorted[mid]
    }
}

pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return f64::NAN;
    }
    values.iter().sum::<f64>() / values.len() as f64
}
