//! Model collaborator interfaces.
//!
//! The network architectures are supplied by the caller; the trainers only
//! need:
//! - `PointerPolicy` - the low-level model ranking cuts
//! - `CutPercentPolicy` - the high-level model choosing the fraction of cuts
//! - `ValueModel` - an optional learned baseline

use crate::training::DecodeType;
use crate::Result;
use ndarray::Array2;
use std::collections::BTreeMap;
use std::io::Cursor;
use tch::{nn, Device, Tensor};

/// Trait for models that have a VarStore for optimization
pub trait HasVarStore {
    /// Get mutable reference to the VarStore
    fn var_store_mut(&mut self) -> &mut nn::VarStore;

    /// Get reference to the VarStore
    fn var_store(&self) -> &nn::VarStore;
}

/// Output of [`PointerPolicy::logprobs`].
pub struct PointerOutput {
    /// Probability distribution over the candidate cuts at each decoding position
    pub position_probs: Vec<Tensor>,
    /// Summed log-probability of the recorded action sequence (scalar)
    pub log_prob: Tensor,
}

/// Low-level cut-ranking policy.
///
/// States are `[n_cuts, 1, embedding_dim]` feature tensors.
pub trait PointerPolicy: HasVarStore + Send {
    /// Dimension of a single cut feature vector
    fn embedding_dim(&self) -> usize;

    /// Log-probability of selecting `action` (in order) when `sel_cuts_num`
    /// cuts are to be kept.
    fn logprobs(&self, state: &Tensor, sel_cuts_num: usize, action: &[i64]) -> PointerOutput;

    /// Choose `sel_cuts_num` cut indices.
    fn decode(&self, state: &Tensor, sel_cuts_num: usize, decode_type: DecodeType) -> Vec<i64>;
}

/// High-level policy deciding what fraction of cuts to keep.
pub trait CutPercentPolicy: HasVarStore + Send {
    /// Log-probability of `action` plus named diagnostic scalars.
    fn log_prob(&self, state: &Tensor, action: &Tensor) -> (Tensor, BTreeMap<String, Tensor>);
}

/// Learned state-value baseline.
pub trait ValueModel: HasVarStore + Send {
    /// Scalar value estimate for a state.
    fn forward(&self, state: &Tensor) -> Tensor;
}

/// Serialize every variable of `vs`.
pub fn save_weights(vs: &nn::VarStore) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    vs.save_to_stream(&mut buf)?;
    Ok(buf)
}

/// Restore variables previously written by [`save_weights`].
pub fn load_weights(vs: &mut nn::VarStore, data: &[u8]) -> Result<()> {
    vs.load_from_stream(Cursor::new(data))?;
    Ok(())
}

/// `n_cuts x D` host features as a `[n_cuts, 1, D]` tensor on `device`.
pub fn state_tensor(state: &Array2<f32>, device: Device) -> Tensor {
    let (n, d) = state.dim();
    let data: Vec<f32> = state.iter().copied().collect();
    Tensor::from_slice(&data)
        .reshape([n as i64, 1, d as i64])
        .to_device(device)
}
