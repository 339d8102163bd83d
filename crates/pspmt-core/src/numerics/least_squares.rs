//! Bounded Levenberg-Marquardt least squares.
//!
//! Steps solve `(A + λ·diag A) δ = Jᵀ W r` with `A = Jᵀ W J`. Parameters sitting
//! on a bound whose gradient points outward are frozen for that iteration, and
//! every trial point is projected back onto the bounds.

use super::{DenseMatrix, lu_factorize, lu_invert};
use serde::{Deserialize, Serialize};

pub trait ParametricModel {
    fn parameter_names(&self) -> &[&'static str];

    fn parameter_count(&self) -> usize {
        self.parameter_names().len()
    }

    fn evaluate(&self, x: f64, parameters: &[f64]) -> f64;
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ParameterBounds {
    pub lower: f64,
    pub upper: f64,
}

impl ParameterBounds {
    /// Orders the two limits, so `new(5.0, 1.0)` spans `[1, 5]`.
    pub fn new(first: f64, second: f64) -> Self {
        Self {
            lower: first.min(second),
            upper: first.max(second),
        }
    }

    pub fn around(center: f64, half_width: f64) -> Self {
        Self::new(center - half_width, center + half_width)
    }

    pub fn contains(&self, value: f64) -> bool {
        value >= self.lower && value <= self.upper
    }

    pub fn clamp(&self, value: f64) -> f64 {
        value.max(self.lower).min(self.upper)
    }

    pub fn is_degenerate(&self) -> bool {
        self.lower == self.upper
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FitParameter {
    pub value: f64,
    pub bounds: Option<ParameterBounds>,
    pub fixed: bool,
}

impl FitParameter {
    pub fn free(value: f64) -> Self {
        Self {
            value,
            bounds: None,
            fixed: false,
        }
    }

    /// A bounded parameter. A seed outside the bounds starts from the nearest limit.
    pub fn bounded(value: f64, bounds: ParameterBounds) -> Self {
        let bounds = ParameterBounds::new(bounds.lower, bounds.upper);
        Self {
            value: bounds.clamp(value),
            bounds: Some(bounds),
            fixed: false,
        }
    }

    pub fn fixed(value: f64) -> Self {
        Self {
            value,
            bounds: None,
            fixed: true,
        }
    }

    /// Collapsed bounds pin the parameter just like an explicit fix.
    pub fn is_free(&self) -> bool {
        !self.fixed && !self.bounds.is_some_and(|bounds| bounds.is_degenerate())
    }

    fn project(&self, value: f64) -> f64 {
        match self.bounds {
            Some(bounds) => bounds.clamp(value),
            None => value,
        }
    }

    fn at_lower(&self, value: f64) -> bool {
        self.bounds.is_some_and(|bounds| value <= bounds.lower)
    }

    fn at_upper(&self, value: f64) -> bool {
        self.bounds.is_some_and(|bounds| value >= bounds.upper)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MinimizerSettings {
    pub max_iterations: usize,
    pub chi_square_tolerance: f64,
    pub step_tolerance: f64,
    pub initial_damping: f64,
    pub max_damping: f64,
    /// Relative step of the central-difference Jacobian.
    pub derivative_step: f64,
}

impl Default for MinimizerSettings {
    fn default() -> Self {
        Self {
            max_iterations: 500,
            chi_square_tolerance: 1.0e-10,
            step_tolerance: 1.0e-10,
            initial_damping: 1.0e-3,
            max_damping: 1.0e12,
            derivative_step: 1.0e-6,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Termination {
    ChiSquareTolerance,
    StepTolerance,
    /// Damping exceeded its ceiling without finding a downhill step.
    Stagnation,
    MaxIterations,
    NonFinite,
}

impl Termination {
    pub const fn is_converged(self) -> bool {
        matches!(
            self,
            Self::ChiSquareTolerance | Self::StepTolerance | Self::Stagnation
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FitQuality {
    pub chi_square: f64,
    pub degrees_of_freedom: usize,
    pub iterations: usize,
    pub termination: Termination,
    /// Free parameters that finished on one of their bounds.
    #[serde(default)]
    pub bounded_parameters: usize,
}

impl FitQuality {
    pub const fn converged(&self) -> bool {
        self.termination.is_converged()
    }

    /// A converged termination says nothing about a parameter held on its
    /// bound; the minimum there is only the constrained one.
    pub const fn is_bound_limited(&self) -> bool {
        self.bounded_parameters > 0
    }

    pub fn reduced_chi_square(&self) -> Option<f64> {
        (self.degrees_of_freedom > 0).then(|| self.chi_square / self.degrees_of_freedom as f64)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LeastSquaresFit {
    pub parameters: Vec<f64>,
    /// One entry per parameter, zero for fixed ones. `None` when the normal
    /// matrix could not be inverted.
    pub uncertainties: Option<Vec<f64>>,
    pub quality: FitQuality,
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum LeastSquaresError {
    #[error("abscissa and ordinate lengths differ: {x} vs {y}")]
    LengthMismatch { x: usize, y: usize },
    #[error("model expects {expected} parameters, got {actual}")]
    ParameterCountMismatch { expected: usize, actual: usize },
    #[error("sigma length {actual} does not match {expected} points")]
    SigmaLengthMismatch { expected: usize, actual: usize },
    #[error("sigma at point {index} is not positive")]
    NonPositiveSigma { index: usize },
    #[error("{points} points cannot constrain {free} free parameters")]
    InsufficientPoints { points: usize, free: usize },
}

#[derive(Debug, Clone)]
pub struct LeastSquaresProblem<'a, M: ParametricModel> {
    model: &'a M,
    x: &'a [f64],
    y: &'a [f64],
    sigma: Option<&'a [f64]>,
    parameters: Vec<FitParameter>,
}

impl<'a, M: ParametricModel> LeastSquaresProblem<'a, M> {
    pub fn new(
        model: &'a M,
        x: &'a [f64],
        y: &'a [f64],
        parameters: Vec<FitParameter>,
    ) -> Result<Self, LeastSquaresError> {
        if x.len() != y.len() {
            return Err(LeastSquaresError::LengthMismatch {
                x: x.len(),
                y: y.len(),
            });
        }
        if parameters.len() != model.parameter_count() {
            return Err(LeastSquaresError::ParameterCountMismatch {
                expected: model.parameter_count(),
                actual: parameters.len(),
            });
        }

        Ok(Self {
            model,
            x,
            y,
            sigma: None,
            parameters,
        })
    }

    pub fn with_sigma(mut self, sigma: &'a [f64]) -> Result<Self, LeastSquaresError> {
        if sigma.len() != self.y.len() {
            return Err(LeastSquaresError::SigmaLengthMismatch {
                expected: self.y.len(),
                actual: sigma.len(),
            });
        }
        if let Some(index) = sigma.iter().position(|value| !(*value > 0.0)) {
            return Err(LeastSquaresError::NonPositiveSigma { index });
        }

        self.sigma = Some(sigma);
        Ok(self)
    }

    pub fn parameters(&self) -> &[FitParameter] {
        &self.parameters
    }

    pub fn free_parameter_count(&self) -> usize {
        self.parameters.iter().filter(|p| p.is_free()).count()
    }

    fn weight(&self, index: usize) -> f64 {
        self.sigma
            .map_or(1.0, |sigma| 1.0 / (sigma[index] * sigma[index]))
    }

    fn chi_square(&self, values: &[f64]) -> f64 {
        self.x
            .iter()
            .zip(self.y)
            .enumerate()
            .map(|(index, (&x, &y))| {
                let residual = y - self.model.evaluate(x, values);
                self.weight(index) * residual * residual
            })
            .sum()
    }

    fn jacobian(&self, values: &[f64], free: &[usize], relative_step: f64) -> DenseMatrix {
        let mut jacobian = DenseMatrix::zeros(self.x.len(), free.len());
        let mut shifted = values.to_vec();

        for (column, &parameter) in free.iter().enumerate() {
            let step = relative_step * values[parameter].abs().max(1.0);
            shifted[parameter] = values[parameter] + step;
            let forward: Vec<f64> = self
                .x
                .iter()
                .map(|&x| self.model.evaluate(x, &shifted))
                .collect();
            shifted[parameter] = values[parameter] - step;
            for (row, &x) in self.x.iter().enumerate() {
                let backward = self.model.evaluate(x, &shifted);
                jacobian[(row, column)] = (forward[row] - backward) / (2.0 * step);
            }
            shifted[parameter] = values[parameter];
        }

        jacobian
    }

    /// Normal matrix `JᵀWJ` and gradient `JᵀWr` at `values`.
    fn normal_equations(&self, values: &[f64], jacobian: &DenseMatrix) -> (DenseMatrix, Vec<f64>) {
        let columns = jacobian.ncols();
        let mut normal = DenseMatrix::zeros(columns, columns);
        let mut gradient = vec![0.0; columns];

        for (row, (&x, &y)) in self.x.iter().zip(self.y).enumerate() {
            let weight = self.weight(row);
            let residual = y - self.model.evaluate(x, values);
            for lhs in 0..columns {
                let weighted = weight * jacobian[(row, lhs)];
                gradient[lhs] += weighted * residual;
                for rhs in lhs..columns {
                    normal[(lhs, rhs)] += weighted * jacobian[(row, rhs)];
                }
            }
        }
        for lhs in 0..columns {
            for rhs in 0..lhs {
                normal[(lhs, rhs)] = normal[(rhs, lhs)];
            }
        }

        (normal, gradient)
    }

    fn uncertainties(
        &self,
        values: &[f64],
        free: &[usize],
        chi_square: f64,
        ndf: usize,
        relative_step: f64,
    ) -> Option<Vec<f64>> {
        let mut errors = vec![0.0; values.len()];
        if free.is_empty() {
            return Some(errors);
        }

        let jacobian = self.jacobian(values, free, relative_step);
        let (normal, _) = self.normal_equations(values, &jacobian);
        let covariance = lu_invert(&normal).ok()?;
        let scale = match (self.sigma, ndf) {
            (None, ndf) if ndf > 0 => (chi_square / ndf as f64).sqrt(),
            _ => 1.0,
        };

        for (column, &parameter) in free.iter().enumerate() {
            let variance = covariance[(column, column)];
            if !variance.is_finite() {
                return None;
            }
            errors[parameter] = variance.max(0.0).sqrt() * scale;
        }
        Some(errors)
    }
}

pub fn minimize<M: ParametricModel>(
    problem: &LeastSquaresProblem<'_, M>,
    settings: &MinimizerSettings,
) -> Result<LeastSquaresFit, LeastSquaresError> {
    let free: Vec<usize> = problem
        .parameters
        .iter()
        .enumerate()
        .filter(|(_, parameter)| parameter.is_free())
        .map(|(index, _)| index)
        .collect();
    let points = problem.x.len();
    if points <= free.len() {
        return Err(LeastSquaresError::InsufficientPoints {
            points,
            free: free.len(),
        });
    }
    let degrees_of_freedom = points - free.len();

    let mut values: Vec<f64> = problem
        .parameters
        .iter()
        .map(|parameter| match parameter.bounds {
            Some(bounds) if parameter.is_free() || bounds.is_degenerate() => {
                bounds.clamp(parameter.value)
            }
            _ => parameter.value,
        })
        .collect();
    let mut chi_square = problem.chi_square(&values);
    let finish = |values: Vec<f64>, chi_square: f64, iterations: usize, termination: Termination| {
        let uncertainties = if chi_square.is_finite() {
            problem.uncertainties(
                &values,
                &free,
                chi_square,
                degrees_of_freedom,
                settings.derivative_step,
            )
        } else {
            None
        };
        let bounded_parameters = free
            .iter()
            .filter(|&&index| {
                let parameter = &problem.parameters[index];
                parameter.at_lower(values[index]) || parameter.at_upper(values[index])
            })
            .count();
        LeastSquaresFit {
            parameters: values,
            uncertainties,
            quality: FitQuality {
                chi_square,
                degrees_of_freedom,
                iterations,
                termination,
                bounded_parameters,
            },
        }
    };

    if !chi_square.is_finite() {
        return Ok(finish(values, chi_square, 0, Termination::NonFinite));
    }
    if free.is_empty() || chi_square == 0.0 {
        return Ok(finish(values, chi_square, 0, Termination::ChiSquareTolerance));
    }

    let mut damping = settings.initial_damping;
    for iteration in 1..=settings.max_iterations {
        let jacobian = problem.jacobian(&values, &free, settings.derivative_step);
        let (normal, gradient) = problem.normal_equations(&values, &jacobian);
        if gradient.iter().any(|value| !value.is_finite()) {
            return Ok(finish(values, chi_square, iteration, Termination::NonFinite));
        }

        let active: Vec<usize> = (0..free.len())
            .filter(|&column| {
                let parameter = &problem.parameters[free[column]];
                let value = values[free[column]];
                !((parameter.at_lower(value) && gradient[column] < 0.0)
                    || (parameter.at_upper(value) && gradient[column] > 0.0))
            })
            .collect();
        if active.is_empty() {
            return Ok(finish(values, chi_square, iteration, Termination::StepTolerance));
        }

        loop {
            let damped = DenseMatrix::from_fn(active.len(), active.len(), |row, col| {
                let entry = normal[(active[row], active[col])];
                if row == col {
                    let scale = if entry > 0.0 { entry } else { 1.0 };
                    entry + damping * scale
                } else {
                    entry
                }
            });
            let rhs: Vec<f64> = active.iter().map(|&column| gradient[column]).collect();

            let trial = lu_factorize(&damped).and_then(|lu| lu.solve(&rhs)).ok().map(|delta| {
                let mut trial = values.clone();
                for (slot, &column) in active.iter().enumerate() {
                    let parameter = free[column];
                    trial[parameter] =
                        problem.parameters[parameter].project(values[parameter] + delta[slot]);
                }
                trial
            });

            if let Some(trial) = trial {
                let trial_chi_square = problem.chi_square(&trial);
                if trial_chi_square.is_finite() && trial_chi_square < chi_square {
                    let step_norm = euclidean_distance(&trial, &values);
                    let parameter_norm = values.iter().map(|v| v * v).sum::<f64>().sqrt();
                    let improvement = chi_square - trial_chi_square;
                    let previous = chi_square;

                    values = trial;
                    chi_square = trial_chi_square;
                    damping = (damping / 10.0).max(f64::MIN_POSITIVE);

                    if chi_square == 0.0
                        || improvement <= settings.chi_square_tolerance * previous
                    {
                        return Ok(finish(
                            values,
                            chi_square,
                            iteration,
                            Termination::ChiSquareTolerance,
                        ));
                    }
                    if step_norm
                        <= settings.step_tolerance * (parameter_norm + settings.step_tolerance)
                    {
                        return Ok(finish(
                            values,
                            chi_square,
                            iteration,
                            Termination::StepTolerance,
                        ));
                    }
                    break;
                }
            }

            damping *= 10.0;
            if damping > settings.max_damping {
                return Ok(finish(values, chi_square, iteration, Termination::Stagnation));
            }
        }
    }

    Ok(finish(
        values,
        chi_square,
        settings.max_iterations,
        Termination::MaxIterations,
    ))
}

fn euclidean_distance(lhs: &[f64], rhs: &[f64]) -> f64 {
    lhs.iter()
        .zip(rhs)
        .map(|(a, b)| (a - b) * (a - b))
        .sum::<f64>()
        .sqrt()
}

#[cfg(test)]
mod tests {
    use super::{
        FitParameter, LeastSquaresError, LeastSquaresProblem, MinimizerSettings,
        ParameterBounds, ParametricModel, Termination, minimize,
    };

    #[derive(Debug)]
    struct Constant;

    impl ParametricModel for Constant {
        fn parameter_names(&self) -> &[&'static str] {
            &["level"]
        }

        fn evaluate(&self, _x: f64, parameters: &[f64]) -> f64 {
            parameters[0]
        }
    }

    #[derive(Debug)]
    struct Line;

    impl ParametricModel for Line {
        fn parameter_names(&self) -> &[&'static str] {
            &["intercept", "slope"]
        }

        fn evaluate(&self, x: f64, parameters: &[f64]) -> f64 {
            parameters[0] + parameters[1] * x
        }
    }

    #[derive(Debug)]
    struct Decay;

    impl ParametricModel for Decay {
        fn parameter_names(&self) -> &[&'static str] {
            &["amplitude", "tau", "offset"]
        }

        fn evaluate(&self, x: f64, parameters: &[f64]) -> f64 {
            parameters[0] * (-x / parameters[1]).exp() + parameters[2]
        }
    }

    #[derive(Debug)]
    struct Broken;

    impl ParametricModel for Broken {
        fn parameter_names(&self) -> &[&'static str] {
            &["value"]
        }

        fn evaluate(&self, _x: f64, _parameters: &[f64]) -> f64 {
            f64::NAN
        }
    }

    #[test]
    fn line_fit_recovers_exact_parameters() {
        let x: Vec<f64> = (0..20).map(f64::from).collect();
        let y: Vec<f64> = x.iter().map(|x| 3.0 - 0.5 * x).collect();
        let problem = LeastSquaresProblem::new(
            &Line,
            &x,
            &y,
            vec![FitParameter::free(0.0), FitParameter::free(1.0)],
        )
        .expect("problem should be valid");

        let fit = minimize(&problem, &MinimizerSettings::default()).expect("fit should run");
        assert!(fit.quality.converged());
        assert_eq!(fit.quality.degrees_of_freedom, 18);
        assert!((fit.parameters[0] - 3.0).abs() < 1.0e-8);
        assert!((fit.parameters[1] + 0.5).abs() < 1.0e-8);
    }

    #[test]
    fn exponential_decay_converges_from_a_rough_seed() {
        let x: Vec<f64> = (0..200).map(f64::from).collect();
        let y: Vec<f64> = x.iter().map(|x| 400.0 * (-x / 25.0).exp() + 10.0).collect();
        let problem = LeastSquaresProblem::new(
            &Decay,
            &x,
            &y,
            vec![
                FitParameter::bounded(300.0, ParameterBounds::new(100.0, 800.0)),
                FitParameter::bounded(40.0, ParameterBounds::new(5.0, 100.0)),
                FitParameter::free(0.0),
            ],
        )
        .expect("problem should be valid");

        let fit = minimize(&problem, &MinimizerSettings::default()).expect("fit should run");
        assert!(fit.quality.converged(), "termination {:?}", fit.quality.termination);
        assert!((fit.parameters[0] - 400.0).abs() < 1.0e-4);
        assert!((fit.parameters[1] - 25.0).abs() < 1.0e-6);
        assert!((fit.parameters[2] - 10.0).abs() < 1.0e-5);
        assert!(!fit.quality.is_bound_limited());
    }

    #[test]
    fn parameter_pushed_outward_stays_on_its_bound() {
        let x = [0.0, 1.0, 2.0, 3.0];
        let y = [5.0; 4];
        let problem = LeastSquaresProblem::new(
            &Constant,
            &x,
            &y,
            vec![FitParameter::bounded(1.0, ParameterBounds::new(3.0, 0.0))],
        )
        .expect("problem should be valid");

        let fit = minimize(&problem, &MinimizerSettings::default()).expect("fit should run");
        assert!(fit.quality.converged());
        assert_eq!(fit.parameters[0], 3.0);
        assert!((fit.quality.chi_square - 16.0).abs() < 1.0e-12);
        assert_eq!(fit.quality.bounded_parameters, 1);
        assert!(fit.quality.is_bound_limited());
    }

    #[test]
    fn fixed_and_collapsed_parameters_do_not_move() {
        let x: Vec<f64> = (0..10).map(f64::from).collect();
        let y: Vec<f64> = x.iter().map(|x| 1.0 + 2.0 * x).collect();
        let problem = LeastSquaresProblem::new(
            &Line,
            &x,
            &y,
            vec![
                FitParameter::bounded(1.0, ParameterBounds::new(1.0, 1.0)),
                FitParameter::free(0.0),
            ],
        )
        .expect("problem should be valid");
        assert_eq!(problem.free_parameter_count(), 1);

        let fit = minimize(&problem, &MinimizerSettings::default()).expect("fit should run");
        assert_eq!(fit.parameters[0], 1.0);
        assert!((fit.parameters[1] - 2.0).abs() < 1.0e-8);
        // A collapsed range pins the parameter without counting as bound-limited.
        assert_eq!(fit.quality.bounded_parameters, 0);
        let errors = fit.uncertainties.expect("uncertainties should exist");
        assert_eq!(errors[0], 0.0);

        let fixed = LeastSquaresProblem::new(
            &Line,
            &x,
            &y,
            vec![FitParameter::fixed(0.5), FitParameter::free(0.0)],
        )
        .expect("problem should be valid");
        let fit = minimize(&fixed, &MinimizerSettings::default()).expect("fit should run");
        assert_eq!(fit.parameters[0], 0.5);
        assert_eq!(fit.quality.degrees_of_freedom, 9);
    }

    #[test]
    fn weighted_constant_fit_reports_error_of_the_mean() {
        let x = [0.0, 1.0, 2.0, 3.0];
        let y = [1.0, 2.0, 3.0, 4.0];
        let sigma = [2.0; 4];
        let problem =
            LeastSquaresProblem::new(&Constant, &x, &y, vec![FitParameter::free(0.0)])
                .expect("problem should be valid")
                .with_sigma(&sigma)
                .expect("sigma should be valid");

        let fit = minimize(&problem, &MinimizerSettings::default()).expect("fit should run");
        assert!((fit.parameters[0] - 2.5).abs() < 1.0e-8);
        let errors = fit.uncertainties.expect("uncertainties should exist");
        assert!((errors[0] - 1.0).abs() < 1.0e-6);
    }

    #[test]
    fn unweighted_errors_scale_with_reduced_chi_square() {
        let x = [0.0, 1.0, 2.0, 3.0];
        let y = [1.0, 2.0, 3.0, 4.0];
        let problem = LeastSquaresProblem::new(&Constant, &x, &y, vec![FitParameter::free(0.0)])
            .expect("problem should be valid");

        let fit = minimize(&problem, &MinimizerSettings::default()).expect("fit should run");
        let errors = fit.uncertainties.expect("uncertainties should exist");
        let expected = 0.5 * (5.0_f64 / 3.0).sqrt();
        assert!((errors[0] - expected).abs() < 1.0e-6);
        assert!((fit.quality.reduced_chi_square().expect("ndf > 0") - 5.0 / 3.0).abs() < 1.0e-8);
    }

    #[test]
    fn too_few_points_are_rejected() {
        let x = [0.0, 1.0];
        let y = [1.0, 2.0];
        let problem = LeastSquaresProblem::new(
            &Line,
            &x,
            &y,
            vec![FitParameter::free(0.0), FitParameter::free(0.0)],
        )
        .expect("problem should be valid");

        let error = minimize(&problem, &MinimizerSettings::default())
            .expect_err("two points cannot fit two parameters with ndf > 0");
        assert_eq!(error, LeastSquaresError::InsufficientPoints { points: 2, free: 2 });
    }

    #[test]
    fn problem_construction_validates_shapes() {
        let error = LeastSquaresProblem::new(&Line, &[0.0, 1.0], &[1.0], vec![])
            .expect_err("length mismatch should fail");
        assert_eq!(error, LeastSquaresError::LengthMismatch { x: 2, y: 1 });

        let error = LeastSquaresProblem::new(&Line, &[0.0], &[1.0], vec![FitParameter::free(0.0)])
            .expect_err("parameter count mismatch should fail");
        assert_eq!(
            error,
            LeastSquaresError::ParameterCountMismatch {
                expected: 2,
                actual: 1
            }
        );

        let problem =
            LeastSquaresProblem::new(&Constant, &[0.0], &[1.0], vec![FitParameter::free(0.0)])
                .expect("problem should be valid");
        let error = problem
            .with_sigma(&[0.0])
            .expect_err("zero sigma should fail");
        assert_eq!(error, LeastSquaresError::NonPositiveSigma { index: 0 });
    }

    #[test]
    fn non_finite_model_output_stops_without_converging() {
        let x = [0.0, 1.0, 2.0];
        let y = [1.0, 1.0, 1.0];
        let problem = LeastSquaresProblem::new(&Broken, &x, &y, vec![FitParameter::free(1.0)])
            .expect("problem should be valid");

        let fit = minimize(&problem, &MinimizerSettings::default()).expect("fit should run");
        assert_eq!(fit.quality.termination, Termination::NonFinite);
        assert!(!fit.quality.converged());
        assert!(fit.uncertainties.is_none());
    }
}
