use crate::builders::distribution::DistributionBuilder;
use candle_core::{DType, Device, Result};
use candle_nn::{AdamW, Optimizer, ParamsAdamW, VarBuilder, VarMap};
use marl_core::{
    distributions::DistributionKind,
    env::EnvironmentDescription,
    policies::{
        OptimizerWithMaxGrad,
        actor_critic::{ActorCriticKind, DecoupledActorCritic, SharedActorCritic},
    },
    thread_safe_sequential::build_sequential,
};

pub enum PolicyType {
    /// One optimizer over policy and value parameters, value loss scaled by
    /// `value_coef`.
    Shared {
        value_layers: Vec<usize>,
        max_grad_norm: Option<f32>,
        value_coef: f64,
    },
    /// Separate varmaps and optimizers for the policy and the critic.
    Decoupled {
        value_layers: Vec<usize>,
        policy_max_grad_norm: Option<f32>,
        value_max_grad_norm: Option<f32>,
    },
}

impl Default for PolicyType {
    fn default() -> Self {
        Self::Decoupled {
            value_layers: vec![64, 64],
            policy_max_grad_norm: None,
            value_max_grad_norm: None,
        }
    }
}

impl PolicyType {
    pub fn shared() -> Self {
        Self::Shared {
            value_layers: vec![64, 64],
            max_grad_norm: None,
            value_coef: 0.5,
        }
    }
}

pub struct PolicyBuilder {
    pub policy_type: PolicyType,
    pub distribution: DistributionBuilder,
    pub learning_rate: f64,
}

impl Default for PolicyBuilder {
    fn default() -> Self {
        Self {
            policy_type: PolicyType::default(),
            distribution: DistributionBuilder::default(),
            learning_rate: 3e-4,
        }
    }
}

impl PolicyBuilder {
    pub fn build(
        &self,
        device: &Device,
        env_description: &EnvironmentDescription,
    ) -> Result<(DistributionKind, ActorCriticKind)> {
        let input_size = env_description.observation_size();
        let optimizer_params = ParamsAdamW {
            lr: self.learning_rate,
            weight_decay: 0.01,
            ..Default::default()
        };
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, device);
        let distribution = self.distribution.build(&vb, device, env_description)?;
        match &self.policy_type {
            PolicyType::Shared {
                value_layers,
                max_grad_norm,
                value_coef,
            } => {
                let value_layers = &[&value_layers[..], &[1]].concat();
                let value_net = build_sequential(input_size, value_layers, &vb, "value")?;
                let optimizer = AdamW::new(varmap.all_vars(), optimizer_params)?;
                let optimizer = OptimizerWithMaxGrad::new(optimizer, *max_grad_norm, varmap);
                let learning_module = ActorCriticKind::Shared(SharedActorCritic {
                    value_net,
                    optimizer,
                    value_coef: *value_coef,
                });
                Ok((distribution, learning_module))
            }
            PolicyType::Decoupled {
                value_layers,
                policy_max_grad_norm,
                value_max_grad_norm,
            } => {
                let critic_varmap = VarMap::new();
                let critic_vb = VarBuilder::from_varmap(&critic_varmap, DType::F32, device);
                let value_layers = &[&value_layers[..], &[1]].concat();
                let value_net = build_sequential(input_size, value_layers, &critic_vb, "value")?;
                let policy_optimizer = AdamW::new(varmap.all_vars(), optimizer_params.clone())?;
                let value_optimizer = AdamW::new(critic_varmap.all_vars(), optimizer_params)?;
                let learning_module = ActorCriticKind::Decoupled(DecoupledActorCritic {
                    value_net,
                    policy_optimizer: OptimizerWithMaxGrad::new(
                        policy_optimizer,
                        *policy_max_grad_norm,
                        varmap,
                    ),
                    value_optimizer: OptimizerWithMaxGrad::new(
                        value_optimizer,
                        *value_max_grad_norm,
                        critic_varmap,
                    ),
                });
                Ok((distribution, learning_module))
            }
        }
    }
}
