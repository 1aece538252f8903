use crate::ppo::PPOLearningModule;
use candle_core::{Result, Tensor};
use marl_core::{
    distributions::Distribution,
    tensors::{Logp, LogpDiff, PolicyLoss, ValueLoss, ValuesPred},
    utils::rollout_buffer::{Advantages, Returns, RolloutBatch, RolloutBuffer},
};

pub enum HookResult {
    Continue,
    Break,
}

/// Intermediate per batch quantities, handed to the batch hook before the
/// losses are applied.
pub struct PPOBatchData {
    pub logp: Logp,
    pub values_pred: ValuesPred,
    pub logp_diff: LogpDiff,
    pub ratio: Tensor,
    pub approx_kl: f32,
}

pub trait PPOHooksTrait<D: Distribution, LM: PPOLearningModule> {
    fn before_learning_hook(
        &mut self,
        learning_module: &mut LM,
        distribution: &D,
        rollout_buffers: &mut Vec<RolloutBuffer>,
        advantages: &mut Advantages,
        returns: &mut Returns,
    ) -> Result<HookResult>;

    /// Called after every pass over the pooled rollout data. `Break` stops
    /// the remaining epochs, which is how KL based early stopping plugs in.
    fn epoch_hook(
        &mut self,
        learning_module: &mut LM,
        distribution: &D,
        rollout_buffers: &[RolloutBuffer],
    ) -> Result<HookResult>;

    fn batch_hook(
        &mut self,
        learning_module: &mut LM,
        distribution: &D,
        rollout_batch: &RolloutBatch,
        policy_loss: &mut PolicyLoss,
        value_loss: &mut ValueLoss,
        data: &PPOBatchData,
    ) -> Result<HookResult>;
}

pub struct EmptyPPOHooks;

impl<D: Distribution, LM: PPOLearningModule> PPOHooksTrait<D, LM> for EmptyPPOHooks {
    fn before_learning_hook(
        &mut self,
        _learning_module: &mut LM,
        _distribution: &D,
        _rollout_buffers: &mut Vec<RolloutBuffer>,
        _advantages: &mut Advantages,
        _returns: &mut Returns,
    ) -> Result<HookResult> {
        Ok(HookResult::Continue)
    }

    fn epoch_hook(
        &mut self,
        _learning_module: &mut LM,
        _distribution: &D,
        _rollout_buffers: &[RolloutBuffer],
    ) -> Result<HookResult> {
        Ok(HookResult::Continue)
    }

    fn batch_hook(
        &mut self,
        _learning_module: &mut LM,
        _distribution: &D,
        _rollout_batch: &RolloutBatch,
        _policy_loss: &mut PolicyLoss,
        _value_loss: &mut ValueLoss,
        _data: &PPOBatchData,
    ) -> Result<HookResult> {
        Ok(HookResult::Continue)
    }
}

/// Stops the epoch loop once the mean approximate KL of a batch exceeds
/// `target_kl`, the usual guard against destructively large policy updates.
pub struct KLDivergenceGuard {
    pub target_kl: f32,
    tripped: bool,
}

impl KLDivergenceGuard {
    pub fn new(target_kl: f32) -> Self {
        Self {
            target_kl,
            tripped: false,
        }
    }
}

impl<D: Distribution, LM: PPOLearningModule> PPOHooksTrait<D, LM> for KLDivergenceGuard {
    fn before_learning_hook(
        &mut self,
        _learning_module: &mut LM,
        _distribution: &D,
        _rollout_buffers: &mut Vec<RolloutBuffer>,
        _advantages: &mut Advantages,
        _returns: &mut Returns,
    ) -> Result<HookResult> {
        self.tripped = false;
        Ok(HookResult::Continue)
    }

    fn epoch_hook(
        &mut self,
        _learning_module: &mut LM,
        _distribution: &D,
        _rollout_buffers: &[RolloutBuffer],
    ) -> Result<HookResult> {
        if self.tripped {
            Ok(HookResult::Break)
        } else {
            Ok(HookResult::Continue)
        }
    }

    fn batch_hook(
        &mut self,
        _learning_module: &mut LM,
        _distribution: &D,
        _rollout_batch: &RolloutBatch,
        _policy_loss: &mut PolicyLoss,
        _value_loss: &mut ValueLoss,
        data: &PPOBatchData,
    ) -> Result<HookResult> {
        if data.approx_kl > self.target_kl {
            tracing::info!(
                approx_kl = data.approx_kl,
                target_kl = self.target_kl,
                "stopping epoch early"
            );
            self.tripped = true;
            Ok(HookResult::Break)
        } else {
            Ok(HookResult::Continue)
        }
    }
}
