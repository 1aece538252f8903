use crate::builders::ppo::PPOBuilder;
use candle_core::{Device, Result};
use marl_agents::ippo::IPPO;
use marl_core::{
    distributions::DistributionKind, env::EnvironmentDescription,
    policies::actor_critic::ActorCriticKind,
};

#[derive(Default)]
pub struct IPPOBuilder {
    pub ppo: PPOBuilder,
}

impl IPPOBuilder {
    pub fn build(
        self,
        device: &Device,
        env_description: &EnvironmentDescription,
        num_agents: usize,
    ) -> Result<IPPO<DistributionKind, ActorCriticKind>> {
        let ppo = self.ppo.build(device, env_description)?;
        Ok(IPPO::new(ppo, num_agents))
    }
}
