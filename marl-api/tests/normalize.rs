use candle_core::{DType, Device, Error, Result, Tensor};
use marl_api::hooks::normalizer::NormalizerOptions;
use marl_core::{
    distributions::Distribution,
    env_pools::{SequentialStepHooks, StepTransition},
};

struct FixedDistribution;

impl Distribution for FixedDistribution {
    fn get_action(&self, observation: &Tensor) -> Result<(Tensor, Tensor)> {
        let device = observation.device();
        let action = Tensor::from_slice(&[1f32, 0.], 2, device)?;
        let logp = Tensor::zeros(1, DType::F32, device)?;
        Ok((action, logp))
    }

    fn log_probs(&self, states: &Tensor, _actions: &Tensor) -> Result<Tensor> {
        Tensor::zeros(states.dim(0)?, DType::F32, states.device())
    }

    fn entropy(&self, states: &Tensor) -> Result<Tensor> {
        Tensor::zeros(states.dim(0)?, DType::F32, states.device())
    }
}

fn transition(obs: f32, reward: f32, done: bool, device: &Device) -> Result<StepTransition> {
    Ok(StepTransition {
        next_state: Tensor::from_slice(&[obs], 1, device)?,
        action: Tensor::from_slice(&[1f32, 0.], 2, device)?,
        reward,
        logp: 0.,
        done,
    })
}

#[test]
fn normalizer_rewrites_and_clips_transitions() -> Result<()> {
    let device = Device::Cpu;
    let mut normalizer = NormalizerOptions::default().build(1, 2, device.clone())?;
    for step in 0..50 {
        let mut transitions = vec![
            transition(step as f32, 1., false, &device)?,
            transition(-(step as f32), 1., false, &device)?,
        ];
        normalizer.step_hook(&FixedDistribution, &mut transitions)?;
        for transition in &transitions {
            let obs: Vec<f32> = transition.next_state.to_vec1()?;
            assert!(obs[0].abs() <= normalizer.options.clip_obs);
            assert!(transition.reward.abs() <= normalizer.options.clip_rew);
        }
    }
    // the observation stream is symmetric, so the running mean stays at zero
    let mean: Vec<f32> = normalizer.obs_rms.mean.to_vec1()?;
    assert!(mean[0].abs() < 1e-4);
    Ok(())
}

#[test]
fn done_resets_the_return_accumulator() -> Result<()> {
    let device = Device::Cpu;
    let mut normalizer = NormalizerOptions::default().build(1, 1, device.clone())?;
    let mut transitions = vec![transition(1., 5., true, &device)?];
    normalizer.step_hook(&FixedDistribution, &mut transitions)?;
    let returns: Vec<f32> = normalizer.returns.to_vec1()?;
    assert_eq!(returns[0], 0.);
    Ok(())
}

#[test]
fn normalizer_stats_roundtrip() -> Result<()> {
    let device = Device::Cpu;
    let dir = tempfile::tempdir().map_err(Error::wrap)?;
    let mut normalizer = NormalizerOptions::default().build(1, 2, device.clone())?;
    for step in 0..10 {
        let mut transitions = vec![
            transition(step as f32, 0.5, false, &device)?,
            transition(step as f32 * 2., 1.5, false, &device)?,
        ];
        normalizer.step_hook(&FixedDistribution, &mut transitions)?;
    }
    normalizer.save(dir.path())?;

    let mut restored = NormalizerOptions::default().build(1, 2, device.clone())?;
    restored.load(dir.path())?;
    let mean: Vec<f32> = normalizer.obs_rms.mean.to_vec1()?;
    let restored_mean: Vec<f32> = restored.obs_rms.mean.to_vec1()?;
    assert_eq!(mean, restored_mean);
    assert_eq!(normalizer.obs_rms.count, restored.obs_rms.count);
    assert_eq!(
        normalizer.ret_rms.var.to_scalar::<f32>()?,
        restored.ret_rms.var.to_scalar::<f32>()?
    );
    Ok(())
}
