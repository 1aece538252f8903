pub mod clip_grad;
pub mod rollout_buffer;
