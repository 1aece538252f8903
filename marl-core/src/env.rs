use candle_core::{Result, Tensor};

#[derive(Debug, Clone)]
pub enum Space {
    Discrete(usize),
    Continuous {
        min: Option<Tensor>,
        max: Option<Tensor>,
        size: usize,
    },
}

impl Space {
    pub fn continuous_from_dims(dims: Vec<usize>) -> Self {
        Self::Continuous {
            min: None,
            max: None,
            size: dims.iter().product(),
        }
    }

    pub fn size(&self) -> usize {
        match &self {
            Self::Discrete(size) => *size,
            Self::Continuous { size, .. } => *size,
        }
    }
}

#[derive(Debug, Clone)]
pub struct EnvironmentDescription {
    pub observation_space: Space,
    pub action_space: Space,
}

impl EnvironmentDescription {
    pub fn new(observation_space: Space, action_space: Space) -> Self {
        Self {
            observation_space,
            action_space,
        }
    }

    pub fn action_size(&self) -> usize {
        self.action_space.size()
    }

    pub fn observation_size(&self) -> usize {
        self.observation_space.size()
    }
}

/// Result of stepping an environment once.
#[derive(Debug, Clone)]
pub struct SnapShot {
    pub state: Tensor,
    pub reward: f32,
    pub terminated: bool,
    pub truncated: bool,
}

impl SnapShot {
    pub fn done(&self) -> bool {
        self.terminated || self.truncated
    }
}

pub trait Env {
    fn reset(&mut self, seed: u64) -> Result<Tensor>;
    fn step(&mut self, action: &Tensor) -> Result<SnapShot>;
    fn env_description(&self) -> EnvironmentDescription;
}

/// A multi agent environment where every agent acts at once. Agents are
/// homogeneous: they share one observation/action space and, downstream, one
/// policy. `step` takes one action per agent and returns one snapshot per
/// agent, in agent order.
pub trait ParallelEnv {
    fn num_agents(&self) -> usize;
    fn reset(&mut self, seed: u64) -> Result<Vec<Tensor>>;
    fn step(&mut self, actions: &[Tensor]) -> Result<Vec<SnapShot>>;
    fn env_description(&self) -> EnvironmentDescription;
}

#[derive(Debug, Clone, Copy)]
pub enum RolloutMode {
    /// Collect exactly `n_steps` transitions per environment.
    StepBound { n_steps: usize },
    /// Collect at least `n_steps` transitions, stopping at an episode end.
    EpisodeBound { n_steps: usize },
}
