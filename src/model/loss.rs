use crate::common::*;

/// Mean squared error averaged over every element.
pub fn mse_loss(x: &Tensor, y: &Tensor) -> Tensor {
    x.mse_loss(y, Reduction::Mean)
}

const BCE_EPSILON: f64 = 1e-12;

/// Binary cross entropy between probabilities and targets, averaged over every element.
///
/// Probabilities are kept at least `1e-12` away from 0 and 1 inside the logs.
/// Unlike the libtorch kernel, NaN probabilities yield a NaN loss instead of an error.
pub fn bce_loss(prob: &Tensor, target: &Tensor) -> Tensor {
    let log_p = prob.clamp_min(BCE_EPSILON).log();
    let log_not_p = (prob.neg() + 1.0).clamp_min(BCE_EPSILON).log();
    let likelihood = target * log_p + (target.neg() + 1.0) * log_not_p;
    likelihood.mean(Kind::Float).neg()
}
