pub mod distribution;
pub mod env;
pub mod env_pool;
pub mod ippo;
pub mod on_policy_algo;
pub mod policies;
pub mod ppo;
