use super::Distribution;
use crate::thread_safe_sequential::{ThreadSafeSequential, build_sequential};
use candle_core::{Device, Error, Result, Tensor};
use candle_nn::VarBuilder;
use candle_nn::ops::{log_softmax, softmax};
use rand::distr::Distribution as RandDistribution;
use rand::distr::weighted::WeightedIndex;

/// Categorical policy over a discrete action space. Actions are one-hot
/// encoded so that log probabilities reduce to a masked sum over the
/// log-softmax of the logits.
#[derive(Debug)]
pub struct CategoricalDistribution {
    action_size: usize,
    logits: ThreadSafeSequential,
    device: Device,
}

impl CategoricalDistribution {
    pub fn new(action_size: usize, logits: ThreadSafeSequential, device: Device) -> Self {
        Self {
            action_size,
            logits,
            device,
        }
    }

    pub fn build(
        input_dim: usize,
        action_size: usize,
        layers: &[usize],
        vb: &VarBuilder,
        device: Device,
        prefix: &str,
    ) -> Result<Self> {
        let logits = build_sequential(input_dim, layers, vb, prefix)?;
        Ok(Self {
            action_size,
            logits,
            device,
        })
    }
}

impl Distribution for CategoricalDistribution {
    fn get_action(&self, observation: &Tensor) -> Result<(Tensor, Tensor)> {
        let logits = self.logits.forward(observation)?;
        let action_probs: Vec<f32> = softmax(&logits, 1)?.squeeze(0)?.to_vec1()?;
        let weights = WeightedIndex::new(&action_probs).map_err(Error::wrap)?;
        let action_idx = crate::rng::RNG.with_borrow_mut(|rng| weights.sample(rng));
        let mut action_mask: Vec<f32> = vec![0.0; self.action_size];
        action_mask[action_idx] = 1.;
        let action = Tensor::from_vec(action_mask, self.action_size, &self.device)?.detach();
        let log_probs = log_softmax(&logits, 1)?;
        let logp = action.unsqueeze(0)?.mul(&log_probs)?.sum(1)?;
        Ok((action, logp))
    }

    fn log_probs(&self, states: &Tensor, actions: &Tensor) -> Result<Tensor> {
        let logits = self.logits.forward(states)?;
        let log_probs = log_softmax(&logits, 1)?;
        actions.mul(&log_probs)?.sum(1)
    }

    fn entropy(&self, states: &Tensor) -> Result<Tensor> {
        let logits = self.logits.forward(states)?;
        let log_probs = log_softmax(&logits, 1)?;
        let probs = softmax(&logits, 1)?;
        probs.mul(&log_probs)?.sum(1)?.neg()
    }
}
