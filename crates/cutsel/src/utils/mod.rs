//! Utility functions.

/// Seed libtorch's global generator (parameter init, stochastic decoding).
///
/// No-op without the `torch` feature.
pub fn set_seed(seed: u64) {
    #[cfg(feature = "torch")]
    tch::manual_seed(seed as i64);
    #[cfg(not(feature = "torch"))]
    let _ = seed;
}
