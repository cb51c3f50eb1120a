//! Policy-only evaluation against a solver environment.

mod stats;
#[cfg(feature = "torch")]
mod evaluator;

pub use stats::{evaluation_stats, EvaluationResult};
#[cfg(feature = "torch")]
pub use evaluator::{CutSelectAgent, Evaluator};
