use crate::builders::env::{EnvBuilderTrait, ParallelEnvBuilderTrait};
use candle_core::{Device, Result};
use marl_core::env_pools::{
    EnvPoolKind, SequentialStepHooks, parallel_pool::ParallelVecEnvPool,
    thread_pool::ThreadEnvPool, vector_pool::VecEnvPool,
};

pub enum PoolKind {
    Sequential,
    SequentialWithHooks { hooks: Box<dyn SequentialStepHooks> },
    Threaded,
}

pub struct EnvPoolBuilder {
    pub pool_kind: PoolKind,
    pub n_envs: usize,
}

impl Default for EnvPoolBuilder {
    fn default() -> Self {
        Self {
            pool_kind: PoolKind::Sequential,
            n_envs: 16,
        }
    }
}

impl EnvPoolBuilder {
    pub fn build<EB: EnvBuilderTrait>(
        self,
        env_builder: &EB,
        device: &Device,
    ) -> Result<EnvPoolKind<EB::Env>>
    where
        EB::Env: Send,
    {
        let envs = (0..self.n_envs)
            .map(|_| env_builder.build_env(device))
            .collect::<Result<Vec<_>>>()?;
        Ok(match self.pool_kind {
            PoolKind::Sequential => EnvPoolKind::Sequential(VecEnvPool::new(envs, None)),
            PoolKind::SequentialWithHooks { hooks } => {
                EnvPoolKind::Sequential(VecEnvPool::new(envs, Some(hooks)))
            }
            PoolKind::Threaded => EnvPoolKind::Threaded(ThreadEnvPool::new(envs)),
        })
    }
}

pub struct ParallelEnvPoolBuilder {
    pub n_envs: usize,
}

impl Default for ParallelEnvPoolBuilder {
    fn default() -> Self {
        Self { n_envs: 8 }
    }
}

impl ParallelEnvPoolBuilder {
    pub fn build<EB: ParallelEnvBuilderTrait>(
        &self,
        env_builder: &EB,
        device: &Device,
    ) -> Result<ParallelVecEnvPool<EB::Env>> {
        let envs = (0..self.n_envs)
            .map(|_| env_builder.build_env(device))
            .collect::<Result<Vec<_>>>()?;
        Ok(ParallelVecEnvPool::new(envs))
    }
}
