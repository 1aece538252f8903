pub mod normalizer;

use crate::utils::evaluator::Evaluator;
use candle_core::{Result, Tensor};
use marl_core::{
    distributions::Distribution,
    env::Env,
    env_pools::{SequentialStepHooks, StepTransition},
};
use normalizer::EnvNormalizer;

/// Runs observation/reward normalization and periodic evaluation from one
/// lockstep hook.
pub struct EvaluatorNormalizer<E: Env> {
    pub evaluator: Evaluator<E>,
    pub normalizer: EnvNormalizer,
}

impl<E: Env> SequentialStepHooks for EvaluatorNormalizer<E> {
    fn step_hook(
        &mut self,
        distr: &dyn Distribution,
        transitions: &mut Vec<StepTransition>,
    ) -> Result<bool> {
        self.evaluator.step_hook(distr, transitions)?;
        self.normalizer.step_hook(distr, transitions)
    }

    fn post_rollout_hook(&mut self, last_states: &mut Vec<Tensor>) -> Result<bool> {
        self.normalizer.post_rollout_hook(last_states)
    }
}
