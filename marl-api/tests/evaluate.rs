use candle_core::{DType, Device, Result, Tensor};
use marl_api::{
    hooks::{EvaluatorNormalizer, normalizer::NormalizerOptions},
    test_utils::LineWorld,
    utils::evaluator::EvaluatorOptions,
};
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

fn transitions(n_envs: usize, device: &Device) -> Result<Vec<StepTransition>> {
    (0..n_envs)
        .map(|env_idx| {
            Ok(StepTransition {
                next_state: Tensor::from_slice(&[env_idx as f32], 1, device)?,
                action: Tensor::from_slice(&[1f32, 0.], 2, device)?,
                reward: 1.,
                logp: 0.,
                done: false,
            })
        })
        .collect()
}

#[test]
fn evaluator_fires_every_eval_freq_steps() -> Result<()> {
    let device = Device::Cpu;
    let mut evaluator = EvaluatorOptions {
        eval_episodes: 2,
        eval_freq: 4,
    }
    .build(LineWorld::new(&device));

    evaluator.step_hook(&FixedDistribution, &mut transitions(2, &device)?)?;
    assert!(evaluator.history.is_empty());
    evaluator.step_hook(&FixedDistribution, &mut transitions(2, &device)?)?;
    assert_eq!(evaluator.history.len(), 1);
    // the step counter resets after an evaluation
    evaluator.step_hook(&FixedDistribution, &mut transitions(2, &device)?)?;
    assert_eq!(evaluator.history.len(), 1);
    evaluator.step_hook(&FixedDistribution, &mut transitions(2, &device)?)?;
    assert_eq!(evaluator.history.len(), 2);

    // the fixed policy always walks away from the goal, paying -1 per step
    // until the episode truncates
    for mean_episode_reward in &evaluator.history {
        assert_eq!(*mean_episode_reward, -50.);
    }
    Ok(())
}

#[test]
fn combined_hook_evaluates_and_normalizes() -> Result<()> {
    let device = Device::Cpu;
    let mut hook = EvaluatorNormalizer {
        evaluator: EvaluatorOptions {
            eval_episodes: 1,
            eval_freq: 2,
        }
        .build(LineWorld::new(&device)),
        normalizer: NormalizerOptions::default().build(1, 2, device.clone())?,
    };

    let mut batch = transitions(2, &device)?;
    batch[0].reward = 100.;
    hook.step_hook(&FixedDistribution, &mut batch)?;

    assert_eq!(hook.evaluator.history.len(), 1);
    // the normalizer still rewrote the rewards behind the evaluator
    assert!(batch[0].reward.abs() <= hook.normalizer.options.clip_rew);
    Ok(())
}
