use candle_core::{Result, Tensor};
use candle_nn::{Activation, Module, Sequential, VarBuilder, linear, seq};
use derive_more::Deref;
use std::fmt;

#[derive(Deref)]
pub struct ThreadSafeSequential(pub Sequential);

// SAFETY: ThreadSafeSequential will only contain Linear and Relu layers, both
// of which are Sync.
unsafe impl Sync for ThreadSafeSequential {}
unsafe impl Send for ThreadSafeSequential {}

impl Default for ThreadSafeSequential {
    fn default() -> Self {
        Self(seq())
    }
}

impl fmt::Debug for ThreadSafeSequential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ThreadSafeSequential")
    }
}

impl ThreadSafeSequential {
    pub fn forward(&self, xs: &Tensor) -> Result<Tensor> {
        self.0.forward(xs)
    }
}

/// Builds an MLP with Relu activations between the hidden layers and a bare
/// linear output layer. `layers` contains every layer size including the
/// output dimension.
pub fn build_sequential(
    input_dim: usize,
    layers: &[usize],
    vb: &VarBuilder,
    prefix: &str,
) -> Result<ThreadSafeSequential> {
    let mut last_dim = input_dim;
    let mut nn = seq();
    let num_layers = layers.len();
    for (layer_idx, layer_size) in layers.iter().enumerate() {
        let layer_pp = format!("{prefix}{layer_idx}");
        nn = nn.add(linear(last_dim, *layer_size, vb.pp(layer_pp))?);
        if layer_idx != num_layers - 1 {
            nn = nn.add(Activation::Relu);
        }
        last_dim = *layer_size;
    }
    Ok(ThreadSafeSequential(nn))
}
