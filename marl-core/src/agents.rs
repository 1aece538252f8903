use crate::{distributions::Distribution, utils::rollout_buffer::RolloutBuffer};
use candle_core::Result;

pub trait Agent {
    type Dist: Distribution;

    /// Retrieves the underlying distribution
    fn distribution(&self) -> &Self::Dist;

    /// Runs a round of learning on the rollout buffers collected
    fn learn(&mut self, rollouts: Vec<RolloutBuffer>) -> Result<()>;
}
