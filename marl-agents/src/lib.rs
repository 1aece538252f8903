pub mod ippo;
pub mod ppo;
