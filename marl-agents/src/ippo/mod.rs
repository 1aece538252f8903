use crate::ppo::{PPO, PPOLearningModule};
use candle_core::Result;
use marl_core::{
    agents::Agent, checkpoint::Checkpointable, distributions::Distribution,
    utils::rollout_buffer::RolloutBuffer,
};
use std::path::Path;

/// Independent PPO with parameter sharing.
///
/// Every agent of a parallel environment acts through the same policy and
/// value networks, and the per agent rollout buffers are pooled into a single
/// PPO update. Advantages are still estimated per buffer, so bootstrap values
/// never leak between agents.
pub struct IPPO<D: Distribution, LM: PPOLearningModule> {
    pub ppo: PPO<D, LM>,
    pub num_agents: usize,
}

impl<D: Distribution, LM: PPOLearningModule> IPPO<D, LM> {
    pub fn new(ppo: PPO<D, LM>, num_agents: usize) -> Self {
        Self { ppo, num_agents }
    }
}

impl<D: Distribution, LM: PPOLearningModule> Agent for IPPO<D, LM> {
    type Dist = D;

    fn distribution(&self) -> &Self::Dist {
        self.ppo.distribution()
    }

    fn learn(&mut self, rollouts: Vec<RolloutBuffer>) -> Result<()> {
        // buffers arrive env major, agent minor
        let num_envs = rollouts.len() / self.num_agents;
        for agent_idx in 0..self.num_agents {
            let agent_reward: f32 = rollouts
                .iter()
                .skip(agent_idx)
                .step_by(self.num_agents)
                .map(|rollout| rollout.total_reward())
                .sum();
            tracing::info!(
                agent = agent_idx,
                mean_reward = agent_reward / num_envs.max(1) as f32,
                "agent rollout reward"
            );
        }
        self.ppo.learn(rollouts)
    }
}

impl<D: Distribution, LM: PPOLearningModule + Checkpointable> Checkpointable for IPPO<D, LM> {
    fn save(&self, dir: &Path) -> Result<()> {
        self.ppo.save(dir)
    }

    fn restore(&mut self, dir: &Path) -> Result<()> {
        self.ppo.restore(dir)
    }
}
