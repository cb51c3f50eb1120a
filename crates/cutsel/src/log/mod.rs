//! Metrics sink.
//!
//! Provides:
//! - `MetricLogger` trait for composable backends (scalars, stat dicts, histograms)
//! - `ConsoleLogger` for lightweight tracing output
//! - `MemoryLogger` for in-process inspection
//! - `TensorBoardLogger` for visualization (optional)
//! - `CompositeLogger` for multi-backend logging
//! - `create_stats` for mean/std/max/min/median summaries

mod console;
mod logger;
mod stats;
#[cfg(feature = "tensorboard")]
mod tensorboard;

pub use console::ConsoleLogger;
pub use logger::{CompositeLogger, MemoryLogger, MetricLogger, NoOpLogger};
pub use stats::{create_stats, mean, median, Stats};
#[cfg(feature = "tensorboard")]
pub use tensorboard::TensorBoardLogger;
