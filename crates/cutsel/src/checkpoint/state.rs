//! Checkpoint state and sink definitions.

use crate::Result;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Destination for per-epoch training state.
///
/// Trainers call [`CheckpointSink::save`] once per training call, after every
/// mini-batch update of that call has completed.
pub trait CheckpointSink: Send {
    /// Persist the state blob for `epoch`.
    fn save(&mut self, epoch: u64, state: &CheckpointState) -> Result<()>;
}

/// Serialized running normalizer statistics.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct NormalizerSnapshot {
    pub mean: Vec<f64>,
    pub var: Vec<f64>,
    pub count: f64,
    pub epsilon: f64,
}

impl NormalizerSnapshot {
    pub fn std(&self) -> Vec<f64> {
        self.var.iter().map(|v| v.sqrt()).collect()
    }
}

/// Complete training checkpoint state.
///
/// Network weights are stored as opaque byte blobs produced by the model's
/// variable store, keyed by component name.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct CheckpointState {
    /// Training epoch number
    pub epoch: u64,
    /// Serialized pointer (cut-ranking) policy weights
    pub pointer_net: Vec<u8>,
    /// Serialized cut-percentage policy weights (hierarchical training only)
    pub cutsel_percent_net: Option<Vec<u8>>,
    /// Feature normalizer statistics (when feature normalization is enabled)
    pub normalizer: Option<NormalizerSnapshot>,
    /// Timestamp when checkpoint was created
    pub timestamp: String,
    /// cutsel version
    pub version: String,
}

impl CheckpointState {
    /// Create a new checkpoint state.
    pub fn new(epoch: u64, pointer_net: Vec<u8>) -> Self {
        Self {
            epoch,
            pointer_net,
            cutsel_percent_net: None,
            normalizer: None,
            timestamp: unix_timestamp(),
            version: crate::VERSION.to_string(),
        }
    }

    /// Set the high-level policy weights.
    pub fn with_cutsel_percent_net(mut self, weights: Vec<u8>) -> Self {
        self.cutsel_percent_net = Some(weights);
        self
    }

    /// Set normalizer statistics.
    pub fn with_normalizer(mut self, snapshot: NormalizerSnapshot) -> Self {
        self.normalizer = Some(snapshot);
        self
    }

    /// Names of the components present in this blob.
    pub fn components(&self) -> Vec<&'static str> {
        let mut names = vec!["pointer_net"];
        if self.cutsel_percent_net.is_some() {
            names.push("cutsel_percent_net");
        }
        if self.normalizer.is_some() {
            names.extend(["mean", "std", "epsilon"]);
        }
        names
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(bincode::serialize(self)?)
    }

    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        Ok(bincode::deserialize(data)?)
    }
}

/// Sink that keeps every saved state in memory.
#[derive(Default)]
pub struct MemoryCheckpointSink {
    states: BTreeMap<u64, CheckpointState>,
}

impl MemoryCheckpointSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, epoch: u64) -> Option<&CheckpointState> {
        self.states.get(&epoch)
    }

    pub fn latest(&self) -> Option<&CheckpointState> {
        self.states.values().next_back()
    }

    pub fn epochs(&self) -> Vec<u64> {
        self.states.keys().copied().collect()
    }
}

impl CheckpointSink for MemoryCheckpointSink {
    fn save(&mut self, epoch: u64, state: &CheckpointState) -> Result<()> {
        self.states.insert(epoch, state.clone());
        Ok(())
    }
}

/// Seconds since the Unix epoch as a string.
fn unix_timestamp() -> String {
    use std::time::{SystemTime, UNIX_EPOCH};
    let duration = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default();
    format!("{}", duration.as_secs())
}
