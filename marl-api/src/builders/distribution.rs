use candle_core::{Device, Result};
use candle_nn::VarBuilder;
use marl_core::{
    distributions::{
        DistributionKind, categorical_distribution::CategoricalDistribution,
        diagonal_distribution::DiagGaussianDistribution,
    },
    env::{EnvironmentDescription, Space},
};

pub enum DistributionType {
    /// Pick categorical or diagonal Gaussian from the action space.
    Dynamic,
    Categorical,
    DiagGaussian,
}

pub struct DistributionBuilder {
    pub hidden_layers: Vec<usize>,
    pub distribution_type: DistributionType,
}

impl Default for DistributionBuilder {
    fn default() -> Self {
        Self {
            hidden_layers: vec![64, 64],
            distribution_type: DistributionType::Dynamic,
        }
    }
}

impl DistributionBuilder {
    fn build_categorical(
        &self,
        vb: &VarBuilder,
        device: &Device,
        env_description: &EnvironmentDescription,
    ) -> Result<DistributionKind> {
        let action_size = env_description.action_size();
        let layers = &[&self.hidden_layers[..], &[action_size]].concat();
        let distr = CategoricalDistribution::build(
            env_description.observation_size(),
            action_size,
            layers,
            vb,
            device.clone(),
            "policy",
        )?;
        Ok(DistributionKind::Categorical(distr))
    }

    fn build_diag_gaussian(
        &self,
        vb: &VarBuilder,
        env_description: &EnvironmentDescription,
    ) -> Result<DistributionKind> {
        let action_size = env_description.action_size();
        let layers = &[&self.hidden_layers[..], &[action_size]].concat();
        let log_std = vb.get(action_size, "log_std")?;
        let distr = DiagGaussianDistribution::build(
            env_description.observation_size(),
            layers,
            vb,
            log_std,
            "policy",
        )?;
        Ok(DistributionKind::DiagGaussian(distr))
    }

    pub fn build(
        &self,
        vb: &VarBuilder,
        device: &Device,
        env_description: &EnvironmentDescription,
    ) -> Result<DistributionKind> {
        match self.distribution_type {
            DistributionType::Categorical => self.build_categorical(vb, device, env_description),
            DistributionType::DiagGaussian => self.build_diag_gaussian(vb, env_description),
            DistributionType::Dynamic => match env_description.action_space {
                Space::Discrete(..) => self.build_categorical(vb, device, env_description),
                Space::Continuous { .. } => self.build_diag_gaussian(vb, env_description),
            },
        }
    }
}
