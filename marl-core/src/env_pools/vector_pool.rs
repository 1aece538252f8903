use super::{EnvPool, SequentialStepHooks, run_rollout, single_step_env};
use crate::{
    distributions::Distribution,
    env::{Env, EnvironmentDescription, RolloutMode},
    rng,
    utils::rollout_buffer::RolloutBuffer,
};
use candle_core::{Result, Tensor};
use rayon::iter::{IntoParallelIterator, ParallelIterator};

/// In-process vectorized environments.
///
/// Step bound rollouts advance every environment in lockstep so that
/// [`SequentialStepHooks`] observe one whole step across the vector at a
/// time; environment states persist between rollouts. Episode bound rollouts
/// have no lockstep requirement and run each environment to its episode
/// boundary in parallel with rayon.
pub struct VecEnvPool<E: Env> {
    pub envs: Vec<E>,
    pub states: Vec<Tensor>,
    pub hooks: Option<Box<dyn SequentialStepHooks>>,
}

impl<E: Env> VecEnvPool<E> {
    pub fn new(envs: Vec<E>, hooks: Option<Box<dyn SequentialStepHooks>>) -> Self {
        Self {
            envs,
            states: vec![],
            hooks,
        }
    }

    fn ensure_states(&mut self) -> Result<()> {
        if self.states.len() != self.envs.len() {
            self.states = self
                .envs
                .iter_mut()
                .map(|env| env.reset(rng::next_seed()))
                .collect::<Result<Vec<_>>>()?;
        }
        Ok(())
    }

    fn lockstep_rollout(
        &mut self,
        distr: &dyn Distribution,
        n_steps: usize,
    ) -> Result<Vec<RolloutBuffer>> {
        self.ensure_states()?;
        let num_envs = self.envs.len();
        let mut buffers = vec![RolloutBuffer::default(); num_envs];
        for _ in 0..n_steps {
            let mut transitions = Vec::with_capacity(num_envs);
            for (env, state) in self.envs.iter_mut().zip(&self.states) {
                transitions.push(single_step_env(distr, state, env)?);
            }
            let stop = match &mut self.hooks {
                Some(hooks) => hooks.step_hook(distr, &mut transitions)?,
                None => false,
            };
            for (env_idx, transition) in transitions.into_iter().enumerate() {
                buffers[env_idx].push_step(
                    self.states[env_idx].clone(),
                    transition.action,
                    transition.reward,
                    transition.done,
                    transition.logp,
                );
                self.states[env_idx] = transition.next_state;
            }
            if stop {
                break;
            }
        }
        if let Some(hooks) = &mut self.hooks {
            hooks.post_rollout_hook(&mut self.states)?;
        }
        for (buffer, state) in buffers.iter_mut().zip(&self.states) {
            buffer.set_last_state(state.clone());
        }
        Ok(buffers)
    }
}

impl<E: Env + Send> EnvPool for VecEnvPool<E> {
    fn num_envs(&self) -> usize {
        self.envs.len()
    }

    fn env_description(&self) -> EnvironmentDescription {
        self.envs[0].env_description()
    }

    fn collect_rollouts(
        &mut self,
        distr: &dyn Distribution,
        mode: RolloutMode,
    ) -> Result<Vec<RolloutBuffer>> {
        match mode {
            RolloutMode::StepBound { n_steps } => self.lockstep_rollout(distr, n_steps),
            RolloutMode::EpisodeBound { .. } => {
                let seeds: Vec<u64> = (0..self.envs.len()).map(|_| rng::next_seed()).collect();
                let results = self
                    .envs
                    .iter_mut()
                    .zip(seeds)
                    .collect::<Vec<_>>()
                    .into_par_iter()
                    .map(|(env, seed)| {
                        rng::reseed(seed);
                        run_rollout(distr, env, mode, None)
                    })
                    .collect::<Result<Vec<_>>>()?;
                let mut buffers = Vec::with_capacity(results.len());
                self.states.clear();
                for (buffer, last_state) in results {
                    buffers.push(buffer);
                    self.states.push(last_state);
                }
                Ok(buffers)
            }
        }
    }
}
