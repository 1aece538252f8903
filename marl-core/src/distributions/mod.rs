pub mod categorical_distribution;
pub mod diagonal_distribution;

use candle_core::{Result, Tensor};
use categorical_distribution::CategoricalDistribution;
use diagonal_distribution::DiagGaussianDistribution;
use enum_dispatch::enum_dispatch;

#[enum_dispatch]
pub trait Distribution: Sync {
    /// Samples an action for a single observation of shape `(1, obs_size)`.
    /// Returns the action and its log probability of shape `(1,)`.
    fn get_action(&self, observation: &Tensor) -> Result<(Tensor, Tensor)>;

    /// Log probabilities of `actions` under the current policy, one per row
    /// of `states`.
    fn log_probs(&self, states: &Tensor, actions: &Tensor) -> Result<Tensor>;

    /// Per state entropy of the action distribution, shape `(batch,)`.
    fn entropy(&self, states: &Tensor) -> Result<Tensor>;
}

#[enum_dispatch(Distribution)]
pub enum DistributionKind {
    Categorical(CategoricalDistribution),
    DiagGaussian(DiagGaussianDistribution),
}
