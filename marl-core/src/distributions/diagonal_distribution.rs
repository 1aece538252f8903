use super::Distribution;
use crate::thread_safe_sequential::{ThreadSafeSequential, build_sequential};
use candle_core::{Result, Tensor};
use candle_nn::VarBuilder;
use std::f32;

/// Diagonal Gaussian policy for continuous action spaces. The mean comes from
/// an MLP, the log standard deviation is a free learned parameter shared
/// across states.
#[derive(Debug)]
pub struct DiagGaussianDistribution {
    mu_net: ThreadSafeSequential,
    log_std: Tensor,
}

impl DiagGaussianDistribution {
    pub fn new(mu_net: ThreadSafeSequential, log_std: Tensor) -> Self {
        Self { mu_net, log_std }
    }

    pub fn build(
        input_dim: usize,
        layers: &[usize],
        vb: &VarBuilder,
        log_std: Tensor,
        prefix: &str,
    ) -> Result<Self> {
        let mu_net = build_sequential(input_dim, layers, vb, prefix)?;
        Ok(Self { mu_net, log_std })
    }

    fn logp_from_batch(&self, mu: &Tensor, actions: &Tensor) -> Result<Tensor> {
        let std = self.log_std.exp()?.broadcast_as(mu.shape())?;
        let var = std.sqr()?;
        let log_sqrt_2pi = f32::ln(f32::sqrt(2f32 * f32::consts::PI));
        let log_sqrt_2pi = Tensor::full(log_sqrt_2pi, mu.shape(), mu.device())?;
        let log_probs = ((((actions - mu)?.sqr()? / (2. * var)?)?.neg()?
            - &self.log_std.broadcast_as(mu.shape())?)?
            - log_sqrt_2pi)?;
        log_probs.sum(1)
    }
}

impl Distribution for DiagGaussianDistribution {
    fn get_action(&self, observation: &Tensor) -> Result<(Tensor, Tensor)> {
        let mu = self.mu_net.forward(observation)?;
        let std = self.log_std.exp()?.unsqueeze(0)?;
        let noise = Tensor::randn(0f32, 1., self.log_std.shape(), self.log_std.device())?;
        let action = (&mu + std.broadcast_mul(&noise.unsqueeze(0)?)?)?;
        let logp = self.logp_from_batch(&mu, &action)?;
        Ok((action.squeeze(0)?.detach(), logp))
    }

    fn log_probs(&self, states: &Tensor, actions: &Tensor) -> Result<Tensor> {
        let mu = self.mu_net.forward(states)?;
        self.logp_from_batch(&mu, actions)
    }

    fn entropy(&self, states: &Tensor) -> Result<Tensor> {
        // state independent for a diagonal Gaussian, broadcast per row
        let batch = states.dim(0)?;
        let log_2pi_plus_1_div_2 = Tensor::full(
            0.5 * ((2. * f32::consts::PI).ln() + 1.),
            self.log_std.shape(),
            self.log_std.device(),
        )?;
        let entropy = log_2pi_plus_1_div_2.add(&self.log_std)?.sum_all()?;
        entropy.broadcast_as((batch,))
    }
}
