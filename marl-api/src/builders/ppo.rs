use crate::builders::policies::PolicyBuilder;
use candle_core::{Device, Result};
use marl_agents::ppo::{
    PPO,
    hooks::{EmptyPPOHooks, PPOHooksTrait},
};
use marl_core::{
    distributions::DistributionKind, env::EnvironmentDescription,
    policies::actor_critic::ActorCriticKind,
};

pub struct PPOBuilder {
    pub policy: PolicyBuilder,
    pub hooks: Box<dyn PPOHooksTrait<DistributionKind, ActorCriticKind>>,
    pub clip_range: f32,
    pub value_clip_range: Option<f32>,
    pub gamma: f32,
    pub lambda: f32,
    pub entropy_coef: f64,
    pub num_epochs: usize,
    pub sample_size: usize,
    pub normalize_advantage: bool,
}

impl Default for PPOBuilder {
    fn default() -> Self {
        Self {
            policy: PolicyBuilder::default(),
            hooks: Box::new(EmptyPPOHooks),
            clip_range: 0.2,
            value_clip_range: None,
            gamma: 0.99,
            lambda: 0.95,
            entropy_coef: 0.01,
            num_epochs: 10,
            sample_size: 64,
            normalize_advantage: true,
        }
    }
}

impl PPOBuilder {
    pub fn build(
        self,
        device: &Device,
        env_description: &EnvironmentDescription,
    ) -> Result<PPO<DistributionKind, ActorCriticKind>> {
        let (distribution, learning_module) = self.policy.build(device, env_description)?;
        Ok(PPO {
            distribution,
            learning_module,
            hooks: self.hooks,
            clip_range: self.clip_range,
            value_clip_range: self.value_clip_range,
            gamma: self.gamma,
            lambda: self.lambda,
            entropy_coef: self.entropy_coef,
            num_epochs: self.num_epochs,
            sample_size: self.sample_size,
            normalize_advantage: self.normalize_advantage,
            device: device.clone(),
        })
    }
}
