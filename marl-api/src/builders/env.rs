use candle_core::{Device, Result};
use marl_core::env::{Env, ParallelEnv};

pub trait EnvBuilderTrait: Sync + Send + 'static {
    type Env: Env;

    fn build_env(&self, device: &Device) -> Result<Self::Env>;
}

impl<E: Env, F: Sync + Send + 'static> EnvBuilderTrait for F
where
    F: Fn(&Device) -> Result<E>,
{
    type Env = E;

    fn build_env(&self, device: &Device) -> Result<Self::Env> {
        (self)(device)
    }
}

pub trait ParallelEnvBuilderTrait: Sync + Send + 'static {
    type Env: ParallelEnv;

    fn build_env(&self, device: &Device) -> Result<Self::Env>;
}

pub struct ParallelEnvBuilder<F>(pub F);

impl<E: ParallelEnv, F: Sync + Send + 'static> ParallelEnvBuilderTrait for ParallelEnvBuilder<F>
where
    F: Fn(&Device) -> Result<E>,
{
    type Env = E;

    fn build_env(&self, device: &Device) -> Result<Self::Env> {
        (self.0)(device)
    }
}
