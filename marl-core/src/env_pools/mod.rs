pub mod parallel_pool;
pub mod thread_pool;
pub mod vector_pool;

use crate::{
    distributions::Distribution,
    env::{Env, EnvironmentDescription, RolloutMode},
    rng,
    utils::rollout_buffer::RolloutBuffer,
};
use candle_core::{Result, Tensor};
use enum_dispatch::enum_dispatch;
use thread_pool::ThreadEnvPool;
use vector_pool::VecEnvPool;

/// A set of environments that can be rolled out against a policy.
#[enum_dispatch]
pub trait EnvPool {
    fn num_envs(&self) -> usize;

    fn env_description(&self) -> EnvironmentDescription;

    /// Collects one rollout buffer per environment (per agent for parallel
    /// envs) according to `mode`.
    fn collect_rollouts(
        &mut self,
        distr: &dyn Distribution,
        mode: RolloutMode,
    ) -> Result<Vec<RolloutBuffer>>;
}

#[enum_dispatch(EnvPool)]
pub enum EnvPoolKind<E: Env + Send> {
    Sequential(VecEnvPool<E>),
    Threaded(ThreadEnvPool<E>),
}

/// One transition of a lockstep step, handed to [`SequentialStepHooks`]
/// before it is recorded. Hooks may rewrite the next observation and the
/// reward, which is how observation/reward normalization plugs in.
pub struct StepTransition {
    pub next_state: Tensor,
    pub action: Tensor,
    pub reward: f32,
    pub logp: f32,
    pub done: bool,
}

pub trait SequentialStepHooks {
    /// Called after every lockstep step with one transition per env.
    /// Returning `true` ends the rollout early.
    fn step_hook(
        &mut self,
        distr: &dyn Distribution,
        transitions: &mut Vec<StepTransition>,
    ) -> Result<bool>;

    /// Called once after the rollout with the bootstrap observations.
    fn post_rollout_hook(&mut self, last_states: &mut Vec<Tensor>) -> Result<bool>;
}

pub struct EmptySequentialStepHooks;

impl SequentialStepHooks for EmptySequentialStepHooks {
    fn step_hook(
        &mut self,
        _distr: &dyn Distribution,
        _transitions: &mut Vec<StepTransition>,
    ) -> Result<bool> {
        Ok(false)
    }

    fn post_rollout_hook(&mut self, _last_states: &mut Vec<Tensor>) -> Result<bool> {
        Ok(false)
    }
}

pub fn single_step_env(
    distr: &dyn Distribution,
    state: &Tensor,
    env: &mut impl Env,
) -> Result<StepTransition> {
    let (action, logp) = distr.get_action(&state.unsqueeze(0)?)?;
    let snapshot = env.step(&action)?;
    let done = snapshot.done();
    let next_state = if done {
        env.reset(rng::next_seed())?
    } else {
        snapshot.state
    };
    let logp: f32 = logp.squeeze(0)?.to_scalar()?;
    Ok(StepTransition {
        next_state,
        action,
        reward: snapshot.reward,
        logp,
        done,
    })
}

/// Runs a whole rollout against one environment. Resumes from
/// `initial_state` when given, otherwise resets first. Returns the filled
/// buffer and the state the environment was left in.
pub fn run_rollout(
    distr: &dyn Distribution,
    env: &mut impl Env,
    mode: RolloutMode,
    initial_state: Option<Tensor>,
) -> Result<(RolloutBuffer, Tensor)> {
    let mut buffer = RolloutBuffer::default();
    let mut state = match initial_state {
        Some(state) => state,
        None => env.reset(rng::next_seed())?,
    };
    match mode {
        RolloutMode::StepBound { n_steps } => {
            for _ in 0..n_steps {
                let transition = single_step_env(distr, &state, env)?;
                buffer.push_step(
                    state,
                    transition.action,
                    transition.reward,
                    transition.done,
                    transition.logp,
                );
                state = transition.next_state;
            }
        }
        RolloutMode::EpisodeBound { n_steps } => loop {
            let transition = single_step_env(distr, &state, env)?;
            let done = transition.done;
            buffer.push_step(
                state,
                transition.action,
                transition.reward,
                transition.done,
                transition.logp,
            );
            state = transition.next_state;
            if buffer.len() >= n_steps && done {
                break;
            }
        },
    }
    buffer.set_last_state(state.clone());
    Ok((buffer, state))
}

#[cfg(test)]
pub(crate) mod test {
    use super::*;
    use crate::env::{SnapShot, Space};
    use candle_core::{DType, Device};

    pub struct FixedDistribution;

    impl Distribution for FixedDistribution {
        fn get_action(&self, observation: &Tensor) -> Result<(Tensor, Tensor)> {
            let device = observation.device();
            let action = Tensor::from_slice(&[1f32, 0.], 2, device)?;
            let logp = Tensor::zeros(1, DType::F32, device)?;
            Ok((action, logp))
        }

        fn log_probs(&self, states: &Tensor, _actions: &Tensor) -> Result<Tensor> {
            Tensor::zeros(states.dim(0)?, DType::F32, states.device())
        }

        fn entropy(&self, states: &Tensor) -> Result<Tensor> {
            Tensor::zeros(states.dim(0)?, DType::F32, states.device())
        }
    }

    // truncates every `episode_len` steps, observation is the step counter
    struct EpisodeEnv {
        t: usize,
        episode_len: usize,
    }

    impl EpisodeEnv {
        fn new(episode_len: usize) -> Self {
            Self { t: 0, episode_len }
        }

        fn observation(&self) -> Result<Tensor> {
            Tensor::from_slice(&[self.t as f32], 1, &Device::Cpu)
        }
    }

    impl Env for EpisodeEnv {
        fn reset(&mut self, _seed: u64) -> Result<Tensor> {
            self.t = 0;
            self.observation()
        }

        fn step(&mut self, _action: &Tensor) -> Result<SnapShot> {
            self.t += 1;
            Ok(SnapShot {
                state: self.observation()?,
                reward: 1.,
                terminated: false,
                truncated: self.t == self.episode_len,
            })
        }

        fn env_description(&self) -> EnvironmentDescription {
            EnvironmentDescription::new(Space::continuous_from_dims(vec![1]), Space::Discrete(2))
        }
    }

    #[test]
    fn step_bound_collects_exactly_n_steps() -> Result<()> {
        let mut env = EpisodeEnv::new(3);
        let (buffer, last_state) =
            run_rollout(&FixedDistribution, &mut env, RolloutMode::StepBound { n_steps: 5 }, None)?;
        assert_eq!(buffer.len(), 5);
        assert_eq!(buffer.dones, vec![false, false, true, false, false]);
        // the env was reset mid-rollout, so the bootstrap state is post-reset
        let last: Vec<f32> = last_state.to_vec1()?;
        assert_eq!(last[0], 2.);
        Ok(())
    }

    #[test]
    fn episode_bound_stops_on_an_episode_boundary() -> Result<()> {
        let mut env = EpisodeEnv::new(3);
        let (buffer, _) = run_rollout(
            &FixedDistribution,
            &mut env,
            RolloutMode::EpisodeBound { n_steps: 4 },
            None,
        )?;
        // episodes end at steps 3 and 6; the first boundary past n_steps wins
        assert_eq!(buffer.len(), 6);
        assert_eq!(buffer.dones.last(), Some(&true));
        Ok(())
    }

    // records the seed handed to every reset
    struct SeedEnv {
        inner: EpisodeEnv,
        seeds: Vec<u64>,
    }

    impl SeedEnv {
        fn new(episode_len: usize) -> Self {
            Self {
                inner: EpisodeEnv::new(episode_len),
                seeds: vec![],
            }
        }
    }

    impl Env for SeedEnv {
        fn reset(&mut self, seed: u64) -> Result<Tensor> {
            self.seeds.push(seed);
            self.inner.reset(seed)
        }

        fn step(&mut self, action: &Tensor) -> Result<SnapShot> {
            self.inner.step(action)
        }

        fn env_description(&self) -> EnvironmentDescription {
            self.inner.env_description()
        }
    }

    fn episode_bound_reset_seeds(seed: u64) -> Result<Vec<u64>> {
        rng::reseed(seed);
        let mut pool = vector_pool::VecEnvPool::new(vec![SeedEnv::new(3), SeedEnv::new(3)], None);
        pool.collect_rollouts(&FixedDistribution, RolloutMode::EpisodeBound { n_steps: 3 })?;
        Ok(pool.envs.iter().map(|env| env.seeds[0]).collect())
    }

    #[test]
    fn episode_bound_workers_derive_seeds_from_the_caller_rng() -> Result<()> {
        let first = episode_bound_reset_seeds(42)?;
        let again = episode_bound_reset_seeds(42)?;
        let other = episode_bound_reset_seeds(7)?;
        // every env gets its own stream, reproducible from the user seed
        assert_ne!(first[0], first[1]);
        assert_eq!(first, again);
        assert_ne!(first, other);
        Ok(())
    }

    #[test]
    fn lockstep_pool_persists_states_between_rollouts() -> Result<()> {
        let mut pool = vector_pool::VecEnvPool::new(
            vec![EpisodeEnv::new(10), EpisodeEnv::new(10)],
            None,
        );
        let mode = RolloutMode::StepBound { n_steps: 4 };
        pool.collect_rollouts(&FixedDistribution, mode)?;
        let buffers = pool.collect_rollouts(&FixedDistribution, mode)?;
        assert_eq!(buffers.len(), 2);
        // the second rollout resumes from step 4 instead of resetting
        let first_obs: Vec<f32> = buffers[0].states[0].to_vec1()?;
        assert_eq!(first_obs[0], 4.);
        Ok(())
    }
}
