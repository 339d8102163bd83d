pub mod least_squares;
pub mod linalg;

pub use least_squares::{
    FitParameter, FitQuality, LeastSquaresError, LeastSquaresFit, LeastSquaresProblem,
    MinimizerSettings, ParameterBounds, ParametricModel, Termination, minimize,
};
pub use linalg::{LuDecomposition, LuError, lu_factorize, lu_invert, lu_solve};

use faer::Mat;

pub type DenseMatrix = Mat<f64>;

fn kahan_add(sum: &mut f64, correction: &mut f64, value: f64) {
    let corrected = value - *correction;
    let next = *sum + corrected;
    *correction = (next - *sum) - corrected;
    *sum = next;
}

pub fn stable_sum(values: &[f64]) -> f64 {
    let mut sum = 0.0;
    let mut correction = 0.0;

    for &value in values {
        kahan_add(&mut sum, &mut correction, value);
    }

    sum
}

pub fn stable_weighted_sum(values: &[f64], weights: &[f64]) -> Option<f64> {
    if values.len() != weights.len() {
        return None;
    }

    let mut sum = 0.0;
    let mut correction = 0.0;
    for (&value, &weight) in values.iter().zip(weights) {
        kahan_add(&mut sum, &mut correction, value * weight);
    }

    Some(sum)
}

/// `Σ(wᵢ·vᵢ) / Σwᵢ`, or `None` when the shapes differ or the total weight is zero.
pub fn stable_weighted_mean(values: &[f64], weights: &[f64]) -> Option<f64> {
    if values.len() != weights.len() {
        return None;
    }

    let total_weight = stable_sum(weights);
    if total_weight == 0.0 {
        return None;
    }

    let weighted_sum = stable_weighted_sum(values, weights)?;
    Some(weighted_sum / total_weight)
}

#[cfg(test)]
mod tests {
    use super::{stable_sum, stable_weighted_mean, stable_weighted_sum};

    #[test]
    fn stable_sum_reduces_order_loss_for_large_and_small_values() {
        let input = [1.0e16, 1.0, -1.0e16];
        assert_eq!(stable_sum(&input), 0.0);
    }

    #[test]
    fn stable_weighted_sum_validates_shape() {
        assert_eq!(stable_weighted_sum(&[1.0, 2.0], &[0.25]), None);
        let weighted = stable_weighted_sum(&[2.0, 4.0], &[0.5, 0.5]).expect("sum");
        assert!((weighted - 3.0).abs() < 1.0e-12);
    }

    #[test]
    fn stable_weighted_mean_requires_non_zero_total_weight() {
        assert_eq!(stable_weighted_mean(&[1.0, 2.0], &[0.0, 0.0]), None);
        let mean = stable_weighted_mean(&[10.0, 20.0, 40.0], &[1.0, 2.0, 1.0]).expect("mean");
        assert!((mean - 22.5).abs() < 1.0e-12);
    }
}
