//! Replay buffer for the high-level (cut-percentage) policy.

use crate::data::HighLevelDataset;
use crate::Result;
use ndarray::Array2;

/// Append-only storage of `(state, action, reward)` triples.
///
/// The hierarchical trainer calls [`HighLevelBuffer::replace`] with every
/// batch it sees and [`HighLevelBuffer::clear`] after each high-level update.
#[derive(Clone, Debug, Default)]
pub struct HighLevelBuffer {
    states: Vec<Array2<f32>>,
    actions: Vec<f64>,
    neg_rewards: Vec<f64>,
}

impl HighLevelBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append every sample of `data`.
    pub fn extend(&mut self, data: &HighLevelDataset) -> Result<()> {
        data.validate()?;
        self.states.extend(data.states.iter().cloned());
        self.actions.extend(data.actions.iter().copied());
        self.neg_rewards.extend(data.neg_rewards.iter().copied());
        Ok(())
    }

    /// Discard current contents and store the samples of `datasets` in order.
    ///
    /// On a validation error the buffer is left empty.
    pub fn replace<'a>(
        &mut self,
        datasets: impl IntoIterator<Item = &'a HighLevelDataset>,
    ) -> Result<()> {
        self.clear();
        for data in datasets {
            if let Err(e) = self.extend(data) {
                self.clear();
                return Err(e);
            }
        }
        Ok(())
    }

    pub fn clear(&mut self) {
        self.states.clear();
        self.actions.clear();
        self.neg_rewards.clear();
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    pub fn states(&self) -> &[Array2<f32>] {
        &self.states
    }

    pub fn actions(&self) -> &[f64] {
        &self.actions
    }

    pub fn neg_rewards(&self) -> &[f64] {
        &self.neg_rewards
    }
}
