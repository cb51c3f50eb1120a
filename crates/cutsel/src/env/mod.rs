//! Environment traits.
//!
//! The solver itself lives outside this crate. `CutSelectEnv` is the opaque
//! stepper the evaluator drives, and `CutSelector` is the callback the solver
//! uses to ask the learned policy which cuts to keep.

mod traits;

pub use traits::{CutSelectEnv, CutSelector, EnvStepInfo};
