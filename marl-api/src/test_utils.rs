use candle_core::{Device, Result, Tensor};
use marl_core::env::{Env, EnvironmentDescription, ParallelEnv, SnapShot, Space};

/// One dimensional corridor. Stepping right pays 1, stepping left pays -1,
/// the episode ends at the goal or after `max_steps`. Easy enough that a few
/// rollouts of PPO solve it.
pub struct LineWorld {
    device: Device,
    position: i64,
    goal: i64,
    steps: usize,
    max_steps: usize,
}

impl LineWorld {
    pub fn new(device: &Device) -> Self {
        Self {
            device: device.clone(),
            position: 0,
            goal: 5,
            steps: 0,
            max_steps: 50,
        }
    }

    fn observation(&self) -> Result<Tensor> {
        Tensor::from_slice(&[self.position as f32], 1, &self.device)
    }
}

impl Env for LineWorld {
    fn reset(&mut self, _seed: u64) -> Result<Tensor> {
        self.position = 0;
        self.steps = 0;
        self.observation()
    }

    fn step(&mut self, action: &Tensor) -> Result<SnapShot> {
        let action: Vec<f32> = action.to_vec1()?;
        let right = action[1] > action[0];
        self.position += if right { 1 } else { -1 };
        self.steps += 1;
        Ok(SnapShot {
            state: self.observation()?,
            reward: if right { 1. } else { -1. },
            terminated: self.position >= self.goal,
            truncated: self.steps >= self.max_steps,
        })
    }

    fn env_description(&self) -> EnvironmentDescription {
        EnvironmentDescription::new(Space::continuous_from_dims(vec![1]), Space::Discrete(2))
    }
}

/// Two dimensional point chasing the origin under continuous control. Reward
/// is the negative distance to the origin.
pub struct PointMass {
    device: Device,
    position: [f32; 2],
    steps: usize,
    max_steps: usize,
}

impl PointMass {
    pub fn new(device: &Device) -> Self {
        Self {
            device: device.clone(),
            position: [0., 0.],
            steps: 0,
            max_steps: 32,
        }
    }

    fn observation(&self) -> Result<Tensor> {
        Tensor::from_slice(&self.position, 2, &self.device)
    }
}

impl Env for PointMass {
    fn reset(&mut self, seed: u64) -> Result<Tensor> {
        let angle = (seed % 628) as f32 / 100.;
        self.position = [angle.cos(), angle.sin()];
        self.steps = 0;
        self.observation()
    }

    fn step(&mut self, action: &Tensor) -> Result<SnapShot> {
        let action: Vec<f32> = action.to_vec1()?;
        for (pos, act) in self.position.iter_mut().zip(&action) {
            *pos = (*pos + 0.1 * act.clamp(-1., 1.)).clamp(-2., 2.);
        }
        self.steps += 1;
        let distance = (self.position[0].powi(2) + self.position[1].powi(2)).sqrt();
        Ok(SnapShot {
            state: self.observation()?,
            reward: -distance,
            terminated: false,
            truncated: self.steps >= self.max_steps,
        })
    }

    fn env_description(&self) -> EnvironmentDescription {
        EnvironmentDescription::new(
            Space::continuous_from_dims(vec![2]),
            Space::continuous_from_dims(vec![2]),
        )
    }
}

/// Two agent guessing game. Each agent privately observes a sign and is paid
/// for picking the matching action, so the shared policy has to map both
/// observations correctly at once. Episodes truncate after a fixed number of
/// steps.
pub struct EchoTeam {
    device: Device,
    signs: [f32; 2],
    steps: usize,
    episode_len: usize,
}

impl EchoTeam {
    pub fn new(device: &Device) -> Self {
        Self {
            device: device.clone(),
            signs: [1., -1.],
            steps: 0,
            episode_len: 8,
        }
    }

    fn observations(&self) -> Result<Vec<Tensor>> {
        self.signs
            .iter()
            .map(|sign| Tensor::from_slice(&[*sign], 1, &self.device))
            .collect()
    }
}

impl ParallelEnv for EchoTeam {
    fn num_agents(&self) -> usize {
        2
    }

    fn reset(&mut self, seed: u64) -> Result<Vec<Tensor>> {
        for (agent_idx, sign) in self.signs.iter_mut().enumerate() {
            *sign = if (seed >> agent_idx) & 1 == 0 { -1. } else { 1. };
        }
        self.steps = 0;
        self.observations()
    }

    fn step(&mut self, actions: &[Tensor]) -> Result<Vec<SnapShot>> {
        self.steps += 1;
        let truncated = self.steps >= self.episode_len;
        let states = self.observations()?;
        actions
            .iter()
            .zip(states)
            .zip(self.signs)
            .map(|((action, state), sign)| {
                let action: Vec<f32> = action.to_vec1()?;
                let picked_positive = action[1] > action[0];
                let correct = picked_positive == (sign > 0.);
                Ok(SnapShot {
                    state,
                    reward: if correct { 1. } else { -1. },
                    terminated: false,
                    truncated,
                })
            })
            .collect()
    }

    fn env_description(&self) -> EnvironmentDescription {
        EnvironmentDescription::new(Space::continuous_from_dims(vec![1]), Space::Discrete(2))
    }
}
