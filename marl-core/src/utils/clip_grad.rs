use candle_core::{Result, Tensor, backprop::GradStore};
use candle_nn::VarMap;

/// Backpropagates `loss` and rescales the gradients so that their global L2
/// norm does not exceed `max_norm`.
pub fn clip_grad(loss: &Tensor, varmap: &VarMap, max_norm: f32) -> Result<GradStore> {
    let mut grad_store = loss.backward()?;
    let all_vars = varmap.all_vars();
    let mut total_norm_squared = 0.0f32;
    let mut clipped_ids = vec![];
    for var in all_vars.iter() {
        let id = var.id();
        if let Some(grad) = grad_store.get_id(id) {
            clipped_ids.push(id);
            total_norm_squared += grad.sqr()?.sum_all()?.to_scalar::<f32>()?;
        }
    }
    let total_norm = total_norm_squared.sqrt();
    if total_norm > max_norm {
        let clip_coef = max_norm / (total_norm + 1e-6);
        for var in all_vars.iter().filter(|v| clipped_ids.contains(&v.id())) {
            let old_grad = grad_store
                .get_id(var.id())
                .expect("gradient disappeared from the store");
            let coef = Tensor::full(clip_coef, old_grad.shape(), old_grad.device())?;
            let new_grad = old_grad.broadcast_mul(&coef)?;
            grad_store.insert(var.as_tensor(), new_grad);
        }
    }
    Ok(grad_store)
}
