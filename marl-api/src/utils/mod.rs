pub mod evaluator;
pub mod running_mean;
