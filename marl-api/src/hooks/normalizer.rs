use crate::utils::running_mean::RunningMeanStd;
use candle_core::{DType, Device, Error, Result, Tensor, safetensors::BufferedSafetensors};
use marl_core::{
    distributions::Distribution,
    env_pools::{SequentialStepHooks, StepTransition},
};
use safetensors::serialize;
use std::fs;
use std::path::Path;

const STATS_FILE: &str = "normalizer.safetensors";

#[derive(Debug, Clone)]
pub struct NormalizerOptions {
    pub epsilon: f32,
    pub gamma: f32,
    pub clip_obs: f32,
    pub clip_rew: f32,
}

impl Default for NormalizerOptions {
    fn default() -> Self {
        Self {
            epsilon: 1e-8,
            gamma: 0.99,
            clip_obs: 10.,
            clip_rew: 10.,
        }
    }
}

impl NormalizerOptions {
    pub fn build(self, obs_size: usize, n_envs: usize, device: Device) -> Result<EnvNormalizer> {
        EnvNormalizer::new(obs_size, n_envs, self, device)
    }
}

/// Keeps running mean/std statistics of observations and discounted returns
/// and rewrites each lockstep transition with the normalized values. The
/// statistics can be persisted next to the model weights so a restored agent
/// sees the same input scaling it was trained with.
pub struct EnvNormalizer {
    pub obs_rms: RunningMeanStd,
    pub ret_rms: RunningMeanStd,
    pub returns: Tensor,
    pub options: NormalizerOptions,
    device: Device,
}

impl EnvNormalizer {
    pub fn new(
        obs_size: usize,
        n_envs: usize,
        options: NormalizerOptions,
        device: Device,
    ) -> Result<Self> {
        let obs_rms = RunningMeanStd::new(obs_size, device.clone())?;
        let ret_rms = RunningMeanStd::new((), device.clone())?;
        let returns = Tensor::zeros(n_envs, DType::F32, &device)?;
        Ok(Self {
            obs_rms,
            ret_rms,
            returns,
            options,
            device,
        })
    }

    pub fn normalize_obs(&self, obs: &Tensor) -> Result<Tensor> {
        let eps = Tensor::full(self.options.epsilon, (), &self.device)?;
        let normalized = obs
            .broadcast_sub(&self.obs_rms.mean)?
            .broadcast_div(&self.obs_rms.var.broadcast_add(&eps)?.sqrt()?)?;
        normalized.clamp(-self.options.clip_obs, self.options.clip_obs)
    }

    pub fn normalize_rew(&self, rew: &Tensor) -> Result<Tensor> {
        let eps = Tensor::full(self.options.epsilon, (), &self.device)?;
        let normalized = rew.broadcast_div(&self.ret_rms.var.broadcast_add(&eps)?.sqrt()?)?;
        normalized.clamp(-self.options.clip_rew, self.options.clip_rew)
    }

    pub fn save(&self, dir: &Path) -> Result<()> {
        let obs_count = Tensor::full(self.obs_rms.count, (), &self.device)?;
        let ret_count = Tensor::full(self.ret_rms.count, (), &self.device)?;
        let data = [
            ("obs_mean", &self.obs_rms.mean),
            ("obs_var", &self.obs_rms.var),
            ("obs_count", &obs_count),
            ("ret_mean", &self.ret_rms.mean),
            ("ret_var", &self.ret_rms.var),
            ("ret_count", &ret_count),
        ];
        let encoded = serialize(data, None).map_err(Error::wrap)?;
        fs::write(dir.join(STATS_FILE), encoded).map_err(Error::wrap)
    }

    pub fn load(&mut self, dir: &Path) -> Result<()> {
        let encoded = fs::read(dir.join(STATS_FILE)).map_err(Error::wrap)?;
        let tensors = BufferedSafetensors::new(encoded)?;
        self.obs_rms.mean = tensors.load("obs_mean", &self.device)?;
        self.obs_rms.var = tensors.load("obs_var", &self.device)?;
        self.obs_rms.count = tensors.load("obs_count", &self.device)?.to_scalar()?;
        self.ret_rms.mean = tensors.load("ret_mean", &self.device)?;
        self.ret_rms.var = tensors.load("ret_var", &self.device)?;
        self.ret_rms.count = tensors.load("ret_count", &self.device)?.to_scalar()?;
        Ok(())
    }
}

impl SequentialStepHooks for EnvNormalizer {
    fn step_hook(
        &mut self,
        _distr: &dyn Distribution,
        transitions: &mut Vec<StepTransition>,
    ) -> Result<bool> {
        let num_envs = transitions.len();
        let obs: Vec<_> = transitions
            .iter()
            .map(|transition| transition.next_state.clone())
            .collect();
        let obs = Tensor::stack(&obs, 0)?;
        self.obs_rms.update(&obs)?;
        let obs = self.normalize_obs(&obs)?;
        for (env_idx, obs) in obs.chunk(num_envs, 0)?.into_iter().enumerate() {
            transitions[env_idx].next_state = obs.squeeze(0)?;
        }

        let rewards: Vec<f32> = transitions
            .iter()
            .map(|transition| transition.reward)
            .collect();
        let rewards = Tensor::from_slice(&rewards, num_envs, &self.device)?;
        self.returns = ((&self.returns * self.options.gamma as f64)? + &rewards)?;
        self.ret_rms.update(&self.returns)?;
        let normalized: Vec<f32> = self.normalize_rew(&rewards)?.to_vec1()?;
        for (env_idx, transition) in transitions.iter_mut().enumerate() {
            transition.reward = normalized[env_idx];
        }

        // an episode end resets that env's discounted return accumulator
        let not_done: Vec<f32> = transitions
            .iter()
            .map(|transition| if transition.done { 0. } else { 1. })
            .collect();
        self.returns = self
            .returns
            .mul(&Tensor::from_slice(&not_done, num_envs, &self.device)?)?;
        Ok(false)
    }

    fn post_rollout_hook(&mut self, last_states: &mut Vec<Tensor>) -> Result<bool> {
        let num_envs = last_states.len();
        let final_obs = Tensor::stack(last_states.as_slice(), 0)?;
        self.obs_rms.update(&final_obs)?;
        let final_obs = self.normalize_obs(&final_obs)?;
        for (env_idx, obs) in final_obs.chunk(num_envs, 0)?.into_iter().enumerate() {
            last_states[env_idx] = obs.squeeze(0)?;
        }
        Ok(false)
    }
}
