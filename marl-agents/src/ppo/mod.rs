pub mod hooks;

use crate::ppo::hooks::{HookResult, PPOBatchData, PPOHooksTrait};
use candle_core::{Device, Result, Tensor};
use marl_core::{
    agents::Agent,
    checkpoint::Checkpointable,
    distributions::Distribution,
    policies::{LearningModule, PolicyValuesLosses, ValueFunction},
    tensors::{Logp, LogpDiff, PolicyLoss, ValueLoss, ValuesPred},
    utils::rollout_buffer::{
        Advantages, Returns, RolloutBatchIterator, RolloutBuffer, ValuesOld,
        calculate_advantages_and_returns,
    },
};
use std::ops::Deref;
use std::path::Path;

macro_rules! process_hook_result {
    ($hook_res:expr) => {
        match $hook_res? {
            HookResult::Continue => {}
            HookResult::Break => return Ok(()),
        }
    };
}

pub trait PPOLearningModule: LearningModule<Losses = PolicyValuesLosses> + ValueFunction {}

impl<LM: LearningModule<Losses = PolicyValuesLosses> + ValueFunction> PPOLearningModule for LM {}

/// Clipped surrogate policy optimization over pooled rollout buffers.
///
/// Each call to [`Agent::learn`] estimates advantages once, then runs
/// `num_epochs` shuffled minibatch passes over the pool. The value loss is
/// optionally clipped against the pre update value predictions and an entropy
/// bonus keeps the policy from collapsing early.
pub struct PPO<D: Distribution, LM: PPOLearningModule> {
    pub distribution: D,
    pub learning_module: LM,
    pub hooks: Box<dyn PPOHooksTrait<D, LM>>,
    pub clip_range: f32,
    pub value_clip_range: Option<f32>,
    pub gamma: f32,
    pub lambda: f32,
    pub entropy_coef: f64,
    pub num_epochs: usize,
    pub sample_size: usize,
    pub normalize_advantage: bool,
    pub device: Device,
}

impl<D: Distribution, LM: PPOLearningModule> PPO<D, LM> {
    fn value_loss(&self, batch_returns: &Tensor, values_pred: &ValuesPred, values_old: &Tensor) -> Result<ValueLoss> {
        let unclipped = batch_returns.sub(values_pred)?.sqr()?;
        let loss = match self.value_clip_range {
            Some(clip) => {
                let clipped_pred =
                    (values_old + (values_pred.deref() - values_old)?.clamp(-clip, clip)?)?;
                let clipped = batch_returns.sub(&clipped_pred)?.sqr()?;
                Tensor::maximum(&unclipped, &clipped)?.mean_all()?
            }
            None => unclipped.mean_all()?,
        };
        Ok(ValueLoss(loss))
    }

    fn batching_loop(&mut self, batch_iter: &mut RolloutBatchIterator) -> Result<()> {
        loop {
            let Some(batch) = batch_iter.next() else {
                return Ok(());
            };
            let batch = batch?;
            let logp = Logp(
                self.distribution
                    .log_probs(&batch.observations, &batch.actions)?,
            );
            let values_pred =
                ValuesPred(self.learning_module.calculate_values(&batch.observations)?);
            let mut value_loss = self.value_loss(&batch.returns, &values_pred, &batch.values_old)?;
            let logp_diff = LogpDiff((logp.deref() - &batch.logp_old)?);
            let ratio = logp_diff.exp()?;
            let clip_adv = (ratio.clamp(1. - self.clip_range, 1. + self.clip_range)?
                * &batch.advantages)?;
            let surrogate = Tensor::minimum(&(&ratio * &batch.advantages)?, &clip_adv)?
                .neg()?
                .mean_all()?;
            let mut policy_loss = PolicyLoss(if self.entropy_coef > 0. {
                let entropy = self.distribution.entropy(&batch.observations)?.mean_all()?;
                (surrogate - (entropy * self.entropy_coef)?)?
            } else {
                surrogate
            });
            // kl(old || new) ~ E[(r - 1) - log r], computed outside the graph
            let approx_kl = ((ratio.detach() - 1.)? - logp_diff.detach())?
                .mean_all()?
                .to_scalar::<f32>()?;
            tracing::debug!(approx_kl, "processed batch");
            let ppo_data = PPOBatchData {
                logp,
                values_pred,
                logp_diff,
                ratio,
                approx_kl,
            };
            let hook_result = self.hooks.batch_hook(
                &mut self.learning_module,
                &self.distribution,
                &batch,
                &mut policy_loss,
                &mut value_loss,
                &ppo_data,
            )?;
            self.learning_module.update(PolicyValuesLosses {
                policy_loss,
                value_loss,
            })?;
            match hook_result {
                HookResult::Break => return Ok(()),
                HookResult::Continue => {}
            }
        }
    }

    fn epoch_loop(
        &mut self,
        rollouts: &[RolloutBuffer],
        advantages: &Advantages,
        returns: &Returns,
        values_old: &ValuesOld,
    ) -> Result<()> {
        for _ in 0..self.num_epochs {
            let mut batch_iter = RolloutBatchIterator::new(
                rollouts,
                advantages,
                returns,
                values_old,
                self.sample_size,
                self.device.clone(),
            );
            self.batching_loop(&mut batch_iter)?;
            let epoch_hook_res =
                self.hooks
                    .epoch_hook(&mut self.learning_module, &self.distribution, rollouts);
            process_hook_result!(epoch_hook_res);
        }
        Ok(())
    }
}

impl<D: Distribution, LM: PPOLearningModule> Agent for PPO<D, LM> {
    type Dist = D;

    fn distribution(&self) -> &Self::Dist {
        &self.distribution
    }

    fn learn(&mut self, mut rollouts: Vec<RolloutBuffer>) -> Result<()> {
        let (mut advantages, mut returns, values_old) = calculate_advantages_and_returns(
            &rollouts,
            &self.learning_module,
            self.gamma,
            self.lambda,
        )?;
        if self.normalize_advantage {
            advantages.normalize();
        }
        let before_learning_hook_res = self.hooks.before_learning_hook(
            &mut self.learning_module,
            &self.distribution,
            &mut rollouts,
            &mut advantages,
            &mut returns,
        );
        process_hook_result!(before_learning_hook_res);
        self.epoch_loop(&rollouts, &advantages, &returns, &values_old)
    }
}

impl<D: Distribution, LM: PPOLearningModule + Checkpointable> Checkpointable for PPO<D, LM> {
    fn save(&self, dir: &Path) -> Result<()> {
        self.learning_module.save(dir)
    }

    fn restore(&mut self, dir: &Path) -> Result<()> {
        self.learning_module.restore(dir)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::ppo::hooks::EmptyPPOHooks;
    use candle_core::DType;

    struct DummyDist;

    impl Distribution for DummyDist {
        fn get_action(&self, _observation: &Tensor) -> Result<(Tensor, Tensor)> {
            unimplemented!()
        }

        fn log_probs(&self, _states: &Tensor, _actions: &Tensor) -> Result<Tensor> {
            unimplemented!()
        }

        fn entropy(&self, _states: &Tensor) -> Result<Tensor> {
            unimplemented!()
        }
    }

    struct DummyModule;

    impl LearningModule for DummyModule {
        type Losses = PolicyValuesLosses;

        fn update(&mut self, _losses: PolicyValuesLosses) -> Result<()> {
            Ok(())
        }
    }

    impl ValueFunction for DummyModule {
        fn calculate_values(&self, states: &Tensor) -> Result<Tensor> {
            Tensor::zeros(states.dim(0)?, DType::F32, states.device())
        }
    }

    fn ppo(value_clip_range: Option<f32>) -> PPO<DummyDist, DummyModule> {
        PPO {
            distribution: DummyDist,
            learning_module: DummyModule,
            hooks: Box::new(EmptyPPOHooks),
            clip_range: 0.2,
            value_clip_range,
            gamma: 0.99,
            lambda: 0.95,
            entropy_coef: 0.,
            num_epochs: 1,
            sample_size: 2,
            normalize_advantage: false,
            device: Device::Cpu,
        }
    }

    #[test]
    fn clipped_value_loss_limits_the_update() -> Result<()> {
        let device = Device::Cpu;
        let returns = Tensor::from_slice(&[1f32, 1.], 2, &device)?;
        let values_pred = ValuesPred(Tensor::from_slice(&[1f32, 1.], 2, &device)?);
        let values_old = Tensor::zeros(2, DType::F32, &device)?;

        let unclipped = ppo(None).value_loss(&returns, &values_pred, &values_old)?;
        assert!(unclipped.to_scalar::<f32>()?.abs() < 1e-6);

        // predictions may only move 0.1 from the old values, so the clipped
        // branch keeps a (1 - 0.1)^2 error alive
        let clipped = ppo(Some(0.1)).value_loss(&returns, &values_pred, &values_old)?;
        assert!((clipped.to_scalar::<f32>()? - 0.81).abs() < 1e-6);
        Ok(())
    }
}
