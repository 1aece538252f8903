use super::EnvPool;
use crate::{
    distributions::Distribution,
    env::{EnvironmentDescription, ParallelEnv, RolloutMode},
    rng,
    utils::rollout_buffer::RolloutBuffer,
};
use candle_core::{Result, Tensor};
use rayon::iter::{IntoParallelIterator, ParallelIterator};

/// Vectorized multi agent environments.
///
/// Every step all agents of an environment act at once against the shared
/// distribution. Each (env, agent) pair fills its own rollout buffer and the
/// buffers are flattened env-major, agent-minor, which pools the experience
/// of all agents for a shared-parameter update downstream: the learner never
/// needs to know the samples came from different agents.
pub struct ParallelVecEnvPool<E: ParallelEnv> {
    pub envs: Vec<E>,
    pub states: Vec<Option<Vec<Tensor>>>,
}

impl<E: ParallelEnv> ParallelVecEnvPool<E> {
    pub fn new(envs: Vec<E>) -> Self {
        let states = envs.iter().map(|_| None).collect();
        Self { envs, states }
    }

    pub fn num_agents(&self) -> usize {
        self.envs[0].num_agents()
    }
}

fn run_parallel_rollout<E: ParallelEnv>(
    distr: &dyn Distribution,
    env: &mut E,
    mode: RolloutMode,
    initial_states: Option<Vec<Tensor>>,
) -> Result<(Vec<RolloutBuffer>, Vec<Tensor>)> {
    let num_agents = env.num_agents();
    let mut states = match initial_states {
        Some(states) => states,
        None => env.reset(rng::next_seed())?,
    };
    let mut buffers = vec![RolloutBuffer::default(); num_agents];
    let mut steps = 0;
    loop {
        let mut actions = Vec::with_capacity(num_agents);
        let mut logps = Vec::with_capacity(num_agents);
        for state in &states {
            let (action, logp) = distr.get_action(&state.unsqueeze(0)?)?;
            logps.push(logp.squeeze(0)?.to_scalar::<f32>()?);
            actions.push(action);
        }
        let snapshots = env.step(&actions)?;
        // parallel env semantics: one agent ending the episode ends it for
        // everyone, and the whole environment resets
        let done = snapshots.iter().any(|snapshot| snapshot.done());
        for (agent_idx, (action, logp)) in actions.into_iter().zip(logps).enumerate() {
            buffers[agent_idx].push_step(
                states[agent_idx].clone(),
                action,
                snapshots[agent_idx].reward,
                done,
                logp,
            );
        }
        states = if done {
            env.reset(rng::next_seed())?
        } else {
            snapshots.into_iter().map(|snapshot| snapshot.state).collect()
        };
        steps += 1;
        match mode {
            RolloutMode::StepBound { n_steps } => {
                if steps >= n_steps {
                    break;
                }
            }
            RolloutMode::EpisodeBound { n_steps } => {
                if steps >= n_steps && done {
                    break;
                }
            }
        }
    }
    for (buffer, state) in buffers.iter_mut().zip(&states) {
        buffer.set_last_state(state.clone());
    }
    Ok((buffers, states))
}

impl<E: ParallelEnv + Send> EnvPool for ParallelVecEnvPool<E> {
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
        let seeds: Vec<u64> = (0..self.envs.len()).map(|_| rng::next_seed()).collect();
        let results = self
            .envs
            .iter_mut()
            .zip(self.states.iter_mut())
            .zip(seeds)
            .collect::<Vec<_>>()
            .into_par_iter()
            .map(|((env, state), seed)| {
                rng::reseed(seed);
                run_parallel_rollout(distr, env, mode, state.take())
            })
            .collect::<Result<Vec<_>>>()?;
        let mut buffers = vec![];
        for ((buffer_group, last_states), state) in results.into_iter().zip(&mut self.states) {
            buffers.extend(buffer_group);
            *state = Some(last_states);
        }
        Ok(buffers)
    }
}
