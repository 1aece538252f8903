use super::{LearningModule, OptimizerWithMaxGrad, PolicyValuesLosses, ValueFunction};
use crate::checkpoint::Checkpointable;
use crate::thread_safe_sequential::ThreadSafeSequential;
use candle_core::{Result, Tensor};
use std::path::Path;

/// Actor critic with separate optimizers for the policy and value
/// parameters. The two losses never mix gradients.
#[derive(Debug)]
pub struct DecoupledActorCritic {
    pub value_net: ThreadSafeSequential,
    pub policy_optimizer: OptimizerWithMaxGrad,
    pub value_optimizer: OptimizerWithMaxGrad,
}

impl LearningModule for DecoupledActorCritic {
    type Losses = PolicyValuesLosses;

    fn update(&mut self, losses: Self::Losses) -> Result<()> {
        self.policy_optimizer.backward_step(&losses.policy_loss)?;
        self.value_optimizer.backward_step(&losses.value_loss)?;
        Ok(())
    }
}

impl ValueFunction for DecoupledActorCritic {
    fn calculate_values(&self, observation: &Tensor) -> Result<Tensor> {
        self.value_net.forward(observation)?.squeeze(1)
    }
}

/// Actor critic with one optimizer over all parameters. The value loss is
/// scaled by `value_coef` and added to the policy loss, the shared parameter
/// update used when policy and value trunk live in the same network.
pub struct SharedActorCritic {
    pub value_net: ThreadSafeSequential,
    pub optimizer: OptimizerWithMaxGrad,
    pub value_coef: f64,
}

impl LearningModule for SharedActorCritic {
    type Losses = PolicyValuesLosses;

    fn update(&mut self, losses: Self::Losses) -> Result<()> {
        let loss = losses
            .policy_loss
            .add(&(losses.value_loss.0 * self.value_coef)?)?;
        self.optimizer.backward_step(&loss)?;
        Ok(())
    }
}

impl ValueFunction for SharedActorCritic {
    fn calculate_values(&self, observation: &Tensor) -> Result<Tensor> {
        self.value_net.forward(observation)?.squeeze(1)
    }
}

pub enum ActorCriticKind {
    Decoupled(DecoupledActorCritic),
    Shared(SharedActorCritic),
}

impl LearningModule for ActorCriticKind {
    type Losses = PolicyValuesLosses;

    fn update(&mut self, losses: Self::Losses) -> Result<()> {
        match self {
            Self::Decoupled(decoupled) => decoupled.update(losses),
            Self::Shared(shared) => shared.update(losses),
        }
    }
}

impl ValueFunction for ActorCriticKind {
    fn calculate_values(&self, observation: &Tensor) -> Result<Tensor> {
        match self {
            Self::Decoupled(decoupled) => decoupled.calculate_values(observation),
            Self::Shared(shared) => shared.calculate_values(observation),
        }
    }
}

const POLICY_WEIGHTS: &str = "policy.safetensors";
const VALUE_WEIGHTS: &str = "value.safetensors";
const SHARED_WEIGHTS: &str = "model.safetensors";

impl Checkpointable for ActorCriticKind {
    fn save(&self, dir: &Path) -> Result<()> {
        match self {
            Self::Decoupled(decoupled) => {
                decoupled
                    .policy_optimizer
                    .varmap
                    .save(dir.join(POLICY_WEIGHTS))?;
                decoupled
                    .value_optimizer
                    .varmap
                    .save(dir.join(VALUE_WEIGHTS))?;
            }
            Self::Shared(shared) => {
                shared.optimizer.varmap.save(dir.join(SHARED_WEIGHTS))?;
            }
        }
        Ok(())
    }

    fn restore(&mut self, dir: &Path) -> Result<()> {
        match self {
            Self::Decoupled(decoupled) => {
                decoupled
                    .policy_optimizer
                    .varmap
                    .load(dir.join(POLICY_WEIGHTS))?;
                decoupled
                    .value_optimizer
                    .varmap
                    .load(dir.join(VALUE_WEIGHTS))?;
            }
            Self::Shared(shared) => {
                shared.optimizer.varmap.load(dir.join(SHARED_WEIGHTS))?;
            }
        }
        Ok(())
    }
}
