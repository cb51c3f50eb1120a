//! File-backed checkpoint sink with rotation.

use super::state::{CheckpointSink, CheckpointState};
use crate::Result;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

const CHECKPOINT_PREFIX: &str = "checkpoint_epoch_";
const CHECKPOINT_EXT: &str = ".bin";
const METADATA_EXT: &str = "json";

/// Human-readable summary written next to each checkpoint file.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct CheckpointMetadata {
    pub epoch: u64,
    pub timestamp: String,
    pub version: String,
    pub components: Vec<String>,
}

impl From<&CheckpointState> for CheckpointMetadata {
    fn from(state: &CheckpointState) -> Self {
        Self {
            epoch: state.epoch,
            timestamp: state.timestamp.clone(),
            version: state.version.clone(),
            components: state.components().iter().map(|c| c.to_string()).collect(),
        }
    }
}

/// Configuration for checkpoint management.
#[derive(Clone, Debug)]
pub struct CheckpointConfig {
    /// Directory to store checkpoints
    pub checkpoint_dir: PathBuf,
    /// Persist every N epochs (1 = every training call)
    pub save_every: u64,
    /// Keep only the last N checkpoints (0 = keep all)
    pub keep_last: usize,
}

impl Default for CheckpointConfig {
    fn default() -> Self {
        Self {
            checkpoint_dir: PathBuf::from("checkpoints"),
            save_every: 1,
            keep_last: 0,
        }
    }
}

impl CheckpointConfig {
    /// Create a new config with the given directory.
    pub fn new(checkpoint_dir: impl Into<PathBuf>) -> Self {
        Self {
            checkpoint_dir: checkpoint_dir.into(),
            ..Default::default()
        }
    }

    /// Set save frequency.
    pub fn save_every(mut self, epochs: u64) -> Self {
        self.save_every = epochs.max(1);
        self
    }

    /// Set number of checkpoints to keep.
    pub fn keep_last(mut self, n: usize) -> Self {
        self.keep_last = n;
        self
    }
}

/// Writes one bincode file per epoch into a directory.
///
/// # Example
///
/// ```ignore
/// let config = CheckpointConfig::new("./checkpoints").keep_last(3);
/// let mut manager = CheckpointManager::new(config);
///
/// // Handed to a trainer as its sink, or used directly:
/// manager.save(epoch, &state)?;
///
/// // To resume:
/// if let Some(state) = manager.load_latest()? {
///     trainer.load_checkpoint(&state)?;
/// }
/// ```
pub struct CheckpointManager {
    config: CheckpointConfig,
}

impl CheckpointManager {
    /// Create a new checkpoint manager.
    pub fn new(config: CheckpointConfig) -> Self {
        if let Err(e) = fs::create_dir_all(&config.checkpoint_dir) {
            tracing::warn!("Failed to create checkpoint directory: {}", e);
        }

        Self { config }
    }

    /// Get the checkpoint directory path.
    pub fn checkpoint_dir(&self) -> &Path {
        &self.config.checkpoint_dir
    }

    /// Path of the checkpoint file for `epoch`.
    pub fn path_for(&self, epoch: u64) -> PathBuf {
        self.config
            .checkpoint_dir
            .join(format!("{CHECKPOINT_PREFIX}{epoch:06}{CHECKPOINT_EXT}"))
    }

    /// Path of the JSON metadata file for `epoch`.
    pub fn metadata_path_for(&self, epoch: u64) -> PathBuf {
        self.path_for(epoch).with_extension(METADATA_EXT)
    }

    /// Read the metadata written alongside the checkpoint for `epoch`.
    pub fn load_metadata(&self, epoch: u64) -> Result<CheckpointMetadata> {
        let file = fs::File::open(self.metadata_path_for(epoch))?;
        Ok(serde_json::from_reader(file)?)
    }

    /// Load the latest checkpoint, or None if the directory holds none.
    pub fn load_latest(&self) -> Result<Option<CheckpointState>> {
        match self.list_checkpoints()?.pop() {
            Some(path) => {
                let state = self.load_from_path(&path)?;
                tracing::info!(path = %path.display(), epoch = state.epoch, "Loaded checkpoint");
                Ok(Some(state))
            }
            None => Ok(None),
        }
    }

    /// Load a specific checkpoint file.
    pub fn load_from_path(&self, path: impl AsRef<Path>) -> Result<CheckpointState> {
        let data = fs::read(path.as_ref())?;
        CheckpointState::from_bytes(&data)
    }

    /// List all checkpoint files in epoch order.
    pub fn list_checkpoints(&self) -> Result<Vec<PathBuf>> {
        let entries = match fs::read_dir(&self.config.checkpoint_dir) {
            Ok(e) => e,
            Err(_) => return Ok(Vec::new()),
        };

        let mut checkpoints: Vec<PathBuf> = entries
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| {
                p.file_name()
                    .and_then(|n| n.to_str())
                    .map(|n| n.starts_with(CHECKPOINT_PREFIX) && n.ends_with(CHECKPOINT_EXT))
                    .unwrap_or(false)
            })
            .collect();

        checkpoints.sort();
        Ok(checkpoints)
    }

    /// Remove old checkpoints, keeping only the last N.
    fn cleanup_old_checkpoints(&self) -> Result<()> {
        let mut checkpoints = self.list_checkpoints()?;

        while checkpoints.len() > self.config.keep_last {
            let old = checkpoints.remove(0);
            let _ = fs::remove_file(old.with_extension(METADATA_EXT));
            if let Err(e) = fs::remove_file(&old) {
                tracing::warn!(path = %old.display(), "Failed to remove old checkpoint: {}", e);
            } else {
                tracing::debug!(path = %old.display(), "Removed old checkpoint");
            }
        }

        Ok(())
    }
}

impl CheckpointSink for CheckpointManager {
    fn save(&mut self, epoch: u64, state: &CheckpointState) -> Result<()> {
        if epoch % self.config.save_every != 0 {
            return Ok(());
        }

        let path = self.path_for(epoch);
        fs::write(&path, state.to_bytes()?)?;
        let metadata = serde_json::to_vec_pretty(&CheckpointMetadata::from(state))?;
        fs::write(self.metadata_path_for(epoch), metadata)?;
        tracing::info!(
            path = %path.display(),
            epoch,
            components = ?state.components(),
            "Saved checkpoint"
        );

        if self.config.keep_last > 0 {
            self.cleanup_old_checkpoints()?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_checkpoint_config_builder() {
        let config = CheckpointConfig::new("./test").save_every(0).keep_last(10);

        assert_eq!(config.checkpoint_dir, PathBuf::from("./test"));
        assert_eq!(config.save_every, 1);
        assert_eq!(config.keep_last, 10);
    }

    #[test]
    fn test_save_respects_frequency() {
        let dir = tempdir().unwrap();
        let mut manager = CheckpointManager::new(CheckpointConfig::new(dir.path()).save_every(5));
        let state = CheckpointState::new(0, vec![1, 2, 3]);

        manager.save(3, &state).unwrap();
        assert!(manager.list_checkpoints().unwrap().is_empty());

        manager.save(5, &state).unwrap();
        manager.save(10, &state).unwrap();
        assert_eq!(manager.list_checkpoints().unwrap().len(), 2);
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempdir().unwrap();
        let mut manager = CheckpointManager::new(CheckpointConfig::new(dir.path()));

        manager
            .save(10, &CheckpointState::new(10, vec![1, 2, 3, 4, 5]))
            .unwrap();
        assert!(manager.path_for(10).exists());

        let loaded = manager.load_latest().unwrap().unwrap();
        assert_eq!(loaded.epoch, 10);
        assert_eq!(loaded.pointer_net, vec![1, 2, 3, 4, 5]);

        let metadata = manager.load_metadata(10).unwrap();
        assert_eq!(metadata.epoch, 10);
        assert_eq!(metadata.components, vec!["pointer_net".to_string()]);
        assert_eq!(metadata.version, crate::VERSION);
    }

    #[test]
    fn test_load_latest_empty_dir() {
        let dir = tempdir().unwrap();
        let manager = CheckpointManager::new(CheckpointConfig::new(dir.path()));
        assert!(manager.load_latest().unwrap().is_none());
    }

    #[test]
    fn test_cleanup_old_checkpoints() {
        let dir = tempdir().unwrap();
        let mut manager = CheckpointManager::new(CheckpointConfig::new(dir.path()).keep_last(2));

        for epoch in 1..=5 {
            manager
                .save(epoch, &CheckpointState::new(epoch, vec![1]))
                .unwrap();
        }

        let checkpoints = manager.list_checkpoints().unwrap();
        assert_eq!(checkpoints.len(), 2);
        assert!(checkpoints[0]
            .to_string_lossy()
            .contains("checkpoint_epoch_000004"));
        assert!(checkpoints[1]
            .to_string_lossy()
            .contains("checkpoint_epoch_000005"));
        assert!(!manager.metadata_path_for(1).exists());
        assert!(manager.metadata_path_for(5).exists());
    }

    #[test]
    fn test_load_from_path_rejects_garbage() {
        let dir = tempdir().unwrap();
        let manager = CheckpointManager::new(CheckpointConfig::new(dir.path()));

        let path = dir.path().join("custom_checkpoint.bin");
        fs::write(&path, [9u8, 8, 7]).unwrap();

        assert!(manager.load_from_path(&path).is_err());
    }
}
