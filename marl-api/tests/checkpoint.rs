use candle_core::{Device, Error, Result, Tensor};
use marl_api::builders::ppo::PPOBuilder;
use marl_core::{
    checkpoint::Saver,
    distributions::Distribution,
    env::{EnvironmentDescription, Space},
    policies::ValueFunction,
};

fn description() -> EnvironmentDescription {
    EnvironmentDescription::new(Space::continuous_from_dims(vec![3]), Space::Discrete(2))
}

#[test]
fn checkpoint_roundtrip_restores_weights() -> Result<()> {
    let device = Device::Cpu;
    let dir = tempfile::tempdir().map_err(Error::wrap)?;
    let saver = Saver::new(dir.path())?;

    let agent = PPOBuilder::default().build(&device, &description())?;
    let obs = Tensor::from_slice(&[0.1f32, -0.4, 0.7], (1, 3), &device)?;
    let actions = Tensor::from_slice(&[0f32, 1.], (1, 2), &device)?;
    let values_before: Vec<f32> = agent.learning_module.calculate_values(&obs)?.to_vec1()?;
    let logps_before: Vec<f32> = agent.distribution.log_probs(&obs, &actions)?.to_vec1()?;
    saver.save_step(42, &agent)?;

    // a freshly built agent has different random weights until restored
    let mut restored = PPOBuilder::default().build(&device, &description())?;
    assert_eq!(saver.restore_latest(&mut restored)?, Some(42));
    let values_after: Vec<f32> = restored.learning_module.calculate_values(&obs)?.to_vec1()?;
    let logps_after: Vec<f32> = restored.distribution.log_probs(&obs, &actions)?.to_vec1()?;
    for (before, after) in values_before.iter().zip(&values_after) {
        assert!((before - after).abs() < 1e-6);
    }
    for (before, after) in logps_before.iter().zip(&logps_after) {
        assert!((before - after).abs() < 1e-6);
    }
    Ok(())
}
