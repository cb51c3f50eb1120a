//! # cutsel
//!
//! Policy-gradient training core for learned cutting-plane selection in
//! mixed-integer programming solvers.
//!
//! ## Overview
//!
//! cutsel provides:
//! - A streaming feature normalizer (`RunningMeanStd`)
//! - Aggregation of parallel rollout results into flat training batches
//! - REINFORCE updates for the cut-ranking (pointer) policy with `no_baseline`,
//!   exponential-moving-average or learned value baselines - requires `torch` feature
//! - A hierarchical extension that also trains a cut-percentage policy - requires `torch` feature
//! - Policy-only evaluation rollouts against a solver environment - requires `torch` feature
//!
//! The solver environment, the networks and the metric/checkpoint sinks are
//! collaborators supplied by the caller through the traits in [`env`],
//! [`policy`], [`log`] and [`checkpoint`].
//!
//! ## Features
//!
//! - `default` - Data handling, normalization, statistics, checkpoints and logging
//! - `torch` - Trainers, evaluator and model traits (requires libtorch)
//! - `tensorboard` - TensorBoard metric backend
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use cutsel::prelude::*;
//! use std::sync::Arc;
//!
//! let config = TrainerConfig::default().with_baseline(BaselineType::Simple);
//! let logger: Arc<dyn MetricLogger> = Arc::new(ConsoleLogger::new());
//! let sink = Box::new(CheckpointManager::new(CheckpointConfig::new("./checkpoints")));
//! let mut trainer = ReinforceTrainer::new(pointer_net, None, config, logger, sink)?;
//!
//! for epoch in 1..=trainer.config().num_epochs {
//!     let results = collect_rollouts(&trainer); // external workers
//!     let stats = trainer.train(&results, epoch)?;
//! }
//! ```

pub mod checkpoint;
pub mod data;
pub mod env;
pub mod eval;
pub mod log;
pub mod normalizer;
pub mod training;
pub mod utils;

// Model collaborators are tensor-valued
#[cfg(feature = "torch")]
pub mod policy;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::data::{
        EpisodeInfo, EpisodeResult, HighLevelDataset, LowLevelDataset, TrainingBatch,
    };
    pub use crate::env::{CutSelectEnv, CutSelector, EnvStepInfo};
    pub use crate::eval::{evaluation_stats, EvaluationResult};
    pub use crate::normalizer::RunningMeanStd;
    pub use crate::training::{
        BaselineType, DecodeType, EmaBaseline, HierarchyConfig, HighLevelBuffer, LrDecayConfig,
        OptimizerKind, RewardType, TrainerConfig, TrajectoryAggregator,
    };

    // Checkpoint exports
    pub use crate::checkpoint::{
        CheckpointConfig, CheckpointManager, CheckpointMetadata, CheckpointSink, CheckpointState,
        MemoryCheckpointSink, NormalizerSnapshot,
    };

    // Logging exports
    #[cfg(feature = "tensorboard")]
    pub use crate::log::TensorBoardLogger;
    pub use crate::log::{
        create_stats, CompositeLogger, ConsoleLogger, MemoryLogger, MetricLogger, NoOpLogger,
        Stats,
    };

    #[cfg(feature = "torch")]
    pub use crate::eval::{CutSelectAgent, Evaluator};
    #[cfg(feature = "torch")]
    pub use crate::policy::{
        CutPercentPolicy, HasVarStore, PointerOutput, PointerPolicy, ValueModel,
    };
    #[cfg(feature = "torch")]
    pub use crate::training::{HierarchicalTrainer, ReinforceTrainer};
}

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Error types for the library
#[derive(Debug, thiserror::Error)]
pub enum CutselError {
    #[error("Shape mismatch: expected {expected:?}, got {actual:?}")]
    ShapeMismatch {
        expected: Vec<usize>,
        actual: Vec<usize>,
    },

    #[error("Inconsistent batch: {0}")]
    InconsistentBatch(String),

    #[error("Empty batch: {0}")]
    EmptyBatch(&'static str),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Training error: {0}")]
    TrainingError(String),

    #[error("Environment error: {0}")]
    Env(#[from] anyhow::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] bincode::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[cfg(feature = "torch")]
    #[error("Tensor error: {0}")]
    TensorError(#[from] tch::TchError),
}

pub type Result<T> = core::result::Result<T, CutselError>;

#[cfg(all(test, feature = "torch"))]
pub(crate) mod testing;
