//! Checkpointing of trainer state.
//!
//! Provides:
//! - `CheckpointSink` trait receiving one state blob per training call
//! - `CheckpointState` for the policy weights and normalizer statistics
//! - `CheckpointManager` for a rotating directory of checkpoint files with
//!   JSON metadata sidecars
//! - `MemoryCheckpointSink` for in-process use

mod manager;
mod state;

pub use manager::{CheckpointConfig, CheckpointManager, CheckpointMetadata};
pub use state::{CheckpointSink, CheckpointState, MemoryCheckpointSink, NormalizerSnapshot};
