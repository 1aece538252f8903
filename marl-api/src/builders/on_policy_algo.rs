use crate::builders::{
    env::{EnvBuilderTrait, ParallelEnvBuilderTrait},
    env_pool::{EnvPoolBuilder, ParallelEnvPoolBuilder},
    ippo::IPPOBuilder,
    ppo::PPOBuilder,
};
use candle_core::{Device, Result};
use marl_agents::{ippo::IPPO, ppo::PPO};
use marl_core::{
    checkpoint::{Checkpointer, Saver},
    distributions::DistributionKind,
    env::RolloutMode,
    env_pools::{EnvPool, EnvPoolKind, parallel_pool::ParallelVecEnvPool},
    on_policy_algorithm::{DefaultOnPolicyAlgorithmHooks, LearningSchedule, OnPolicyAlgorithm},
    policies::actor_critic::ActorCriticKind,
    rng,
};
use std::path::PathBuf;

pub type PPOAlgorithm<E> = OnPolicyAlgorithm<
    EnvPoolKind<E>,
    PPO<DistributionKind, ActorCriticKind>,
    DefaultOnPolicyAlgorithmHooks,
>;

pub type IPPOAlgorithm<E> = OnPolicyAlgorithm<
    ParallelVecEnvPool<E>,
    IPPO<DistributionKind, ActorCriticKind>,
    DefaultOnPolicyAlgorithmHooks,
>;

pub struct CheckpointOptions {
    pub dir: PathBuf,
    pub save_freq: usize,
}

pub struct OnPolicyAlgorithmBuilder {
    pub device: Device,
    pub n_steps: usize,
    pub learning_schedule: LearningSchedule,
    pub seed: Option<u64>,
    pub checkpoint: Option<CheckpointOptions>,
}

impl Default for OnPolicyAlgorithmBuilder {
    fn default() -> Self {
        Self {
            device: Device::Cpu,
            n_steps: 2048,
            learning_schedule: LearningSchedule::total_step_bound(100_000),
            seed: None,
            checkpoint: None,
        }
    }
}

impl OnPolicyAlgorithmBuilder {
    pub fn set_learning_schedule(&mut self, learning_schedule: LearningSchedule) {
        self.learning_schedule = learning_schedule;
    }

    pub fn set_n_steps(&mut self, n_steps: usize) {
        self.n_steps = n_steps;
    }

    pub fn set_seed(&mut self, seed: u64) {
        self.seed = Some(seed);
    }

    pub fn set_checkpointing(&mut self, dir: impl Into<PathBuf>, save_freq: usize) {
        self.checkpoint = Some(CheckpointOptions {
            dir: dir.into(),
            save_freq,
        });
    }

    fn checkpointer(&self) -> Result<Option<Checkpointer>> {
        self.checkpoint
            .as_ref()
            .map(|options| Ok(Checkpointer::new(Saver::new(options.dir.clone())?, options.save_freq)))
            .transpose()
    }

    pub fn build_ppo<EB: EnvBuilderTrait>(
        &self,
        env_builder: EB,
        ppo_builder: PPOBuilder,
        pool_builder: EnvPoolBuilder,
    ) -> Result<PPOAlgorithm<EB::Env>>
    where
        EB::Env: Send,
    {
        if let Some(seed) = self.seed {
            rng::reseed(seed);
        }
        let env_pool = pool_builder.build(&env_builder, &self.device)?;
        let env_description = env_pool.env_description();
        let agent = ppo_builder.build(&self.device, &env_description)?;
        Ok(OnPolicyAlgorithm {
            env_pool,
            agent,
            rollout_mode: RolloutMode::StepBound {
                n_steps: self.n_steps,
            },
            schedule: self.learning_schedule,
            hooks: DefaultOnPolicyAlgorithmHooks::new(),
            checkpointer: self.checkpointer()?,
        })
    }

    pub fn build_ippo<EB: ParallelEnvBuilderTrait>(
        &self,
        env_builder: EB,
        ippo_builder: IPPOBuilder,
        pool_builder: ParallelEnvPoolBuilder,
    ) -> Result<IPPOAlgorithm<EB::Env>>
    where
        EB::Env: Send,
    {
        if let Some(seed) = self.seed {
            rng::reseed(seed);
        }
        let env_pool = pool_builder.build(&env_builder, &self.device)?;
        let env_description = env_pool.env_description();
        let num_agents = env_pool.num_agents();
        let agent = ippo_builder.build(&self.device, &env_description, num_agents)?;
        Ok(OnPolicyAlgorithm {
            env_pool,
            agent,
            rollout_mode: RolloutMode::StepBound {
                n_steps: self.n_steps,
            },
            schedule: self.learning_schedule,
            hooks: DefaultOnPolicyAlgorithmHooks::new(),
            checkpointer: self.checkpointer()?,
        })
    }
}
