use crate::policies::ValueFunction;
use candle_core::{Device, Error, Result, Tensor};
use derive_more::{Deref, DerefMut};
use rand::seq::SliceRandom;

/// Experience collected from a single environment (or a single agent of a
/// parallel environment). `last_state` holds the observation after the final
/// transition and is used to bootstrap the advantage estimate.
#[derive(Debug, Default, Clone)]
pub struct RolloutBuffer {
    pub states: Vec<Tensor>,
    pub actions: Vec<Tensor>,
    pub rewards: Vec<f32>,
    pub dones: Vec<bool>,
    pub logps: Vec<f32>,
    pub last_state: Option<Tensor>,
}

impl RolloutBuffer {
    pub fn push_step(&mut self, state: Tensor, action: Tensor, reward: f32, done: bool, logp: f32) {
        self.states.push(state);
        self.actions.push(action);
        self.rewards.push(reward);
        self.dones.push(done);
        self.logps.push(logp);
    }

    pub fn set_last_state(&mut self, state: Tensor) {
        self.last_state = Some(state);
    }

    pub fn len(&self) -> usize {
        self.rewards.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rewards.is_empty()
    }

    pub fn total_reward(&self) -> f32 {
        self.rewards.iter().sum()
    }

    pub fn episodes(&self) -> usize {
        self.dones.iter().filter(|d| **d).count()
    }

    pub fn sample_point(&self, index: usize) -> (&Tensor, &Tensor, f32) {
        (&self.states[index], &self.actions[index], self.logps[index])
    }
}

#[derive(Deref, DerefMut, Debug)]
pub struct Advantages(pub Vec<f32>);

#[derive(Deref, DerefMut, Debug)]
pub struct Returns(pub Vec<f32>);

/// Value predictions made before the current round of updates, pooled in the
/// same order as [`Advantages`]. The clipped value loss penalizes moving too
/// far away from them.
#[derive(Deref, DerefMut, Debug)]
pub struct ValuesOld(pub Vec<f32>);

impl Advantages {
    pub fn normalize(&mut self) {
        let mean = self.0.iter().sum::<f32>() / self.0.len() as f32;
        let variance =
            self.0.iter().map(|x| (*x - mean).powi(2)).sum::<f32>() / self.0.len() as f32;
        let std = variance.sqrt() + 1e-8;
        for x in self.0.iter_mut() {
            *x = (*x - mean) / std;
        }
    }
}

/// Generalized advantage estimation over a set of rollout buffers.
///
/// Values for each buffer are computed in one forward pass over
/// `states ++ last_state`, then the reverse recursion
/// `delta_t = r_t + gamma (1 - done_t) V(s_{t+1}) - V(s_t)`,
/// `gae_t = delta_t + gamma lambda (1 - done_t) gae_{t+1}`
/// produces the advantages; returns are `gae_t + V(s_t)`. The outputs are
/// pooled across buffers in buffer order, which keeps bootstrap values from
/// ever crossing a buffer boundary.
pub fn calculate_advantages_and_returns(
    rollouts: &[RolloutBuffer],
    value_fn: &impl ValueFunction,
    gamma: f32,
    lambda: f32,
) -> Result<(Advantages, Returns, ValuesOld)> {
    let mut advantages = vec![];
    let mut returns = vec![];
    let mut values_old = vec![];
    for rollout in rollouts {
        let last_state = rollout
            .last_state
            .as_ref()
            .ok_or_else(|| Error::Msg("rollout buffer is missing its bootstrap state".into()))?;
        let mut states: Vec<&Tensor> = rollout.states.iter().collect();
        states.push(last_state);
        let stacked = Tensor::stack(&states, 0)?;
        let values: Vec<f32> = value_fn.calculate_values(&stacked)?.to_vec1()?;
        let total_steps = rollout.len();
        let mut gaes = vec![0f32; total_steps];
        let mut last_gae = 0f32;
        for i in (0..total_steps).rev() {
            let not_done = if rollout.dones[i] { 0f32 } else { 1f32 };
            let delta = rollout.rewards[i] + not_done * gamma * values[i + 1] - values[i];
            last_gae = delta + not_done * gamma * lambda * last_gae;
            gaes[i] = last_gae;
        }
        for i in 0..total_steps {
            returns.push(gaes[i] + values[i]);
        }
        advantages.extend_from_slice(&gaes);
        values_old.extend_from_slice(&values[..total_steps]);
    }
    Ok((
        Advantages(advantages),
        Returns(returns),
        ValuesOld(values_old),
    ))
}

pub struct RolloutBatch {
    pub observations: Tensor,
    pub actions: Tensor,
    pub returns: Tensor,
    pub advantages: Tensor,
    pub logp_old: Tensor,
    pub values_old: Tensor,
}

/// Yields shuffled fixed size minibatches drawn across all pooled rollout
/// buffers. A trailing batch smaller than `sample_size` is dropped.
pub struct RolloutBatchIterator<'a> {
    rollouts: &'a [RolloutBuffer],
    advantages: &'a Advantages,
    returns: &'a Returns,
    values_old: &'a ValuesOld,
    // (buffer index, step index, pooled index)
    indices: Vec<(usize, usize, usize)>,
    current: usize,
    sample_size: usize,
    device: Device,
}

impl<'a> RolloutBatchIterator<'a> {
    pub fn new(
        rollouts: &'a [RolloutBuffer],
        advantages: &'a Advantages,
        returns: &'a Returns,
        values_old: &'a ValuesOld,
        sample_size: usize,
        device: Device,
    ) -> Self {
        let mut indices = vec![];
        let mut offset = 0;
        for (rollout_idx, rollout) in rollouts.iter().enumerate() {
            for step_idx in 0..rollout.len() {
                indices.push((rollout_idx, step_idx, offset + step_idx));
            }
            offset += rollout.len();
        }
        crate::rng::RNG.with_borrow_mut(|rng| indices.shuffle(rng));
        Self {
            rollouts,
            advantages,
            returns,
            values_old,
            indices,
            current: 0,
            sample_size,
            device,
        }
    }
}

impl<'a> Iterator for RolloutBatchIterator<'a> {
    type Item = Result<RolloutBatch>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.current + self.sample_size > self.indices.len() {
            return None;
        }
        let batch_indices = &self.indices[self.current..self.current + self.sample_size];
        self.current += self.sample_size;
        let mut states = vec![];
        let mut actions = vec![];
        let mut advantages = vec![];
        let mut returns = vec![];
        let mut logps = vec![];
        let mut values_old = vec![];
        for (rollout_idx, step_idx, pooled_idx) in batch_indices {
            let (state, action, logp) = self.rollouts[*rollout_idx].sample_point(*step_idx);
            states.push(state);
            actions.push(action);
            logps.push(logp);
            advantages.push(self.advantages[*pooled_idx]);
            returns.push(self.returns[*pooled_idx]);
            values_old.push(self.values_old[*pooled_idx]);
        }
        let batch = (|| {
            Ok(RolloutBatch {
                observations: Tensor::stack(&states, 0)?,
                actions: Tensor::stack(&actions, 0)?,
                returns: Tensor::from_slice(&returns, returns.len(), &self.device)?,
                advantages: Tensor::from_slice(&advantages, advantages.len(), &self.device)?,
                logp_old: Tensor::from_slice(&logps, logps.len(), &self.device)?,
                values_old: Tensor::from_slice(&values_old, values_old.len(), &self.device)?,
            })
        })();
        Some(batch)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use candle_core::{Device, Result, Tensor};

    // value of a state is its single feature
    struct IdentityValues;

    impl ValueFunction for IdentityValues {
        fn calculate_values(&self, observation: &Tensor) -> Result<Tensor> {
            observation.squeeze(1)
        }
    }

    fn buffer_from(values: &[f32], rewards: &[f32], dones: &[bool], last: f32) -> RolloutBuffer {
        let device = Device::Cpu;
        let mut buffer = RolloutBuffer::default();
        for i in 0..rewards.len() {
            let state = Tensor::from_slice(&[values[i]], 1, &device).unwrap();
            let action = Tensor::from_slice(&[0f32], 1, &device).unwrap();
            buffer.push_step(state, action, rewards[i], dones[i], 0.);
        }
        buffer.set_last_state(Tensor::from_slice(&[last], 1, &device).unwrap());
        buffer
    }

    #[test]
    fn gae_matches_hand_computed_values() -> Result<()> {
        let buffer = buffer_from(&[1., 2., 3.], &[1., 1., 1.], &[false, false, false], 4.);
        let (advantages, returns, values_old) =
            calculate_advantages_and_returns(&[buffer], &IdentityValues, 0.5, 0.5)?;
        let expected_adv = [1.125f32, 0.5, 0.];
        let expected_ret = [2.125f32, 2.5, 3.];
        for i in 0..3 {
            assert!((advantages[i] - expected_adv[i]).abs() < 1e-6);
            assert!((returns[i] - expected_ret[i]).abs() < 1e-6);
            assert!((values_old[i] - (i + 1) as f32).abs() < 1e-6);
        }
        Ok(())
    }

    #[test]
    fn gae_resets_at_episode_boundary() -> Result<()> {
        let buffer = buffer_from(&[1., 2., 3.], &[1., 1., 1.], &[false, true, false], 4.);
        let (advantages, returns, _) =
            calculate_advantages_and_returns(&[buffer], &IdentityValues, 0.5, 0.5)?;
        let expected_adv = [0.75f32, -1., 0.];
        let expected_ret = [1.75f32, 1., 3.];
        for i in 0..3 {
            assert!((advantages[i] - expected_adv[i]).abs() < 1e-6);
            assert!((returns[i] - expected_ret[i]).abs() < 1e-6);
        }
        Ok(())
    }

    #[test]
    fn normalized_advantages_have_zero_mean_unit_std() {
        let mut advantages = Advantages(vec![1., 2., 3., 4., 5.]);
        advantages.normalize();
        let mean = advantages.iter().sum::<f32>() / 5.;
        let var = advantages.iter().map(|x| (x - mean).powi(2)).sum::<f32>() / 5.;
        assert!(mean.abs() < 1e-6);
        assert!((var.sqrt() - 1.).abs() < 1e-3);
    }

    #[test]
    fn batch_iterator_covers_pool_without_partial_batches() -> Result<()> {
        let buffers = vec![
            buffer_from(&[0.; 5], &[0.; 5], &[false; 5], 0.),
            buffer_from(&[0.; 5], &[0.; 5], &[false; 5], 0.),
        ];
        let (advantages, returns, values_old) =
            calculate_advantages_and_returns(&buffers, &IdentityValues, 0.99, 0.95)?;
        let batches: Vec<_> =
            RolloutBatchIterator::new(&buffers, &advantages, &returns, &values_old, 4, Device::Cpu)
                .collect::<Result<_>>()?;
        // 10 samples, batches of 4, trailing 2 dropped
        assert_eq!(batches.len(), 2);
        for batch in &batches {
            assert_eq!(batch.observations.dims(), &[4, 1]);
            assert_eq!(batch.advantages.dims(), &[4]);
        }
        Ok(())
    }
}
