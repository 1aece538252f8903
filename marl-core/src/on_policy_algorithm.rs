use crate::{
    Algorithm,
    agents::Agent,
    checkpoint::{Checkpointable, Checkpointer},
    env::RolloutMode,
    env_pools::EnvPool,
    utils::rollout_buffer::RolloutBuffer,
};
use candle_core::Result;

macro_rules! break_on_hook_res {
    ($hook_res:expr) => {
        if $hook_res {
            break;
        }
    };
}

#[derive(Debug, Clone, Copy)]
pub enum LearningSchedule {
    RolloutBound {
        total_rollouts: usize,
        current_rollout: usize,
        current_step: usize,
    },
    TotalStepBound {
        total_steps: usize,
        current_step: usize,
    },
}

impl LearningSchedule {
    pub fn total_step_bound(total_steps: usize) -> Self {
        Self::TotalStepBound {
            total_steps,
            current_step: 0,
        }
    }

    pub fn rollout_bound(total_rollouts: usize) -> Self {
        Self::RolloutBound {
            total_rollouts,
            current_rollout: 0,
            current_step: 0,
        }
    }

    pub fn current_step(&self) -> usize {
        match self {
            Self::RolloutBound { current_step, .. } => *current_step,
            Self::TotalStepBound { current_step, .. } => *current_step,
        }
    }

    /// Accounts for one finished rollout, returning whether the schedule is
    /// exhausted.
    pub fn advance(&mut self, rollout_steps: usize) -> bool {
        match self {
            Self::RolloutBound {
                total_rollouts,
                current_rollout,
                current_step,
            } => {
                *current_rollout += 1;
                *current_step += rollout_steps;
                current_rollout >= total_rollouts
            }
            Self::TotalStepBound {
                total_steps,
                current_step,
            } => {
                *current_step += rollout_steps;
                current_step >= total_steps
            }
        }
    }

    /// Skips ahead to `step`, used when resuming from a checkpoint.
    pub fn fast_forward(&mut self, step: usize) {
        match self {
            Self::RolloutBound { current_step, .. } => *current_step = step,
            Self::TotalStepBound { current_step, .. } => *current_step = step,
        }
    }
}

pub trait OnPolicyAlgorithmHooks {
    fn init_hook(&mut self) -> bool;

    fn post_rollout_hook(&mut self, rollouts: &mut [RolloutBuffer]) -> bool;

    fn post_training_hook(&mut self) -> bool;

    fn shutdown_hook(&mut self) -> Result<()>;
}

pub struct DefaultOnPolicyAlgorithmHooks {
    rollout_idx: usize,
}

impl DefaultOnPolicyAlgorithmHooks {
    pub fn new() -> Self {
        Self { rollout_idx: 0 }
    }
}

impl Default for DefaultOnPolicyAlgorithmHooks {
    fn default() -> Self {
        Self::new()
    }
}

impl OnPolicyAlgorithmHooks for DefaultOnPolicyAlgorithmHooks {
    fn init_hook(&mut self) -> bool {
        false
    }

    fn post_rollout_hook(&mut self, rollouts: &mut [RolloutBuffer]) -> bool {
        let total_reward: f32 = rollouts.iter().map(|r| r.total_reward()).sum();
        let episodes: usize = rollouts.iter().map(|r| r.episodes()).sum();
        tracing::info!(
            rollout = self.rollout_idx,
            episodes,
            total_reward,
            avg_episode_reward = total_reward / episodes.max(1) as f32,
            "rollout finished"
        );
        self.rollout_idx += 1;
        false
    }

    fn post_training_hook(&mut self) -> bool {
        false
    }

    fn shutdown_hook(&mut self) -> Result<()> {
        Ok(())
    }
}

pub struct OnPolicyAlgorithm<P: EnvPool, A: Agent, H: OnPolicyAlgorithmHooks> {
    pub env_pool: P,
    pub agent: A,
    pub rollout_mode: RolloutMode,
    pub schedule: LearningSchedule,
    pub hooks: H,
    pub checkpointer: Option<Checkpointer>,
}

impl<P: EnvPool, A: Agent + Checkpointable, H: OnPolicyAlgorithmHooks> OnPolicyAlgorithm<P, A, H> {
    /// Restores the newest checkpoint (when checkpointing is configured),
    /// fast-forwards the schedule to it and resumes training.
    pub fn resume(&mut self) -> Result<()> {
        if let Some(checkpointer) = &self.checkpointer
            && let Some(step) = checkpointer.saver.restore_latest(&mut self.agent)?
        {
            self.schedule.fast_forward(step);
        }
        self.train()
    }
}

impl<P: EnvPool, A: Agent + Checkpointable, H: OnPolicyAlgorithmHooks> Algorithm
    for OnPolicyAlgorithm<P, A, H>
{
    fn train(&mut self) -> Result<()> {
        if self.hooks.init_hook() {
            return Ok(());
        }
        loop {
            // rollout phase
            let distribution = self.agent.distribution();
            let mut rollouts = self
                .env_pool
                .collect_rollouts(distribution, self.rollout_mode)?;
            let rollout_steps: usize = rollouts.iter().map(|r| r.len()).sum();
            break_on_hook_res!(self.hooks.post_rollout_hook(&mut rollouts));
            let exhausted = self.schedule.advance(rollout_steps);
            if let Some(checkpointer) = &mut self.checkpointer {
                checkpointer.maybe_save(self.schedule.current_step(), &self.agent)?;
            }

            // learning phase
            self.agent.learn(rollouts)?;
            break_on_hook_res!(self.hooks.post_training_hook());
            if exhausted {
                break;
            }
        }
        if let Some(checkpointer) = &mut self.checkpointer {
            checkpointer.save_now(self.schedule.current_step(), &self.agent)?;
        }
        self.hooks.shutdown_hook()
    }
}
