use super::{EnvPool, run_rollout};
use crate::{
    distributions::Distribution,
    env::{Env, EnvironmentDescription, RolloutMode},
    rng,
    utils::rollout_buffer::RolloutBuffer,
};
use candle_core::{Error, Result, Tensor};
use crossbeam::channel;

/// One worker thread per environment. Workers run whole rollouts
/// concurrently against the shared distribution and report back over a
/// channel; environment states persist between rollouts. Threads are scoped
/// to the collection call, so no environment ever outlives its pool.
pub struct ThreadEnvPool<E: Env> {
    pub envs: Vec<E>,
    pub states: Vec<Option<Tensor>>,
}

impl<E: Env> ThreadEnvPool<E> {
    pub fn new(envs: Vec<E>) -> Self {
        let states = envs.iter().map(|_| None).collect();
        Self { envs, states }
    }
}

impl<E: Env + Send> EnvPool for ThreadEnvPool<E> {
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
        let num_envs = self.envs.len();
        // worker threads start with a fresh thread local rng, so seed them
        // from the pool's stream to keep resets distinct and reproducible
        let seeds: Vec<u64> = (0..num_envs).map(|_| rng::next_seed()).collect();
        let mut results: Vec<Option<RolloutBuffer>> = (0..num_envs).map(|_| None).collect();
        std::thread::scope(|scope| -> Result<()> {
            let (result_tx, result_rx) = channel::unbounded();
            for (env_idx, (env, state)) in
                self.envs.iter_mut().zip(self.states.iter_mut()).enumerate()
            {
                let result_tx = result_tx.clone();
                let initial_state = state.take();
                let seed = seeds[env_idx];
                scope.spawn(move || {
                    rng::reseed(seed);
                    let rollout = run_rollout(distr, env, mode, initial_state);
                    let _ = result_tx.send((env_idx, rollout));
                });
            }
            drop(result_tx);
            while let Ok((env_idx, rollout)) = result_rx.recv() {
                let (buffer, last_state) = rollout?;
                results[env_idx] = Some(buffer);
                self.states[env_idx] = Some(last_state);
            }
            Ok(())
        })?;
        results
            .into_iter()
            .map(|buffer| {
                buffer.ok_or_else(|| Error::Msg("rollout worker dropped its result".into()))
            })
            .collect()
    }
}
