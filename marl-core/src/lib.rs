pub mod agents;
pub mod checkpoint;
pub mod distributions;
pub mod env;
pub mod env_pools;
pub mod on_policy_algorithm;
pub mod policies;
pub mod rng;
pub mod tensors;
pub mod thread_safe_sequential;
pub mod utils;

use candle_core::Result;

pub trait Algorithm {
    fn train(&mut self) -> Result<()>;
}
