mod model;

pub use model::{DynodeParameters, DynodePulse};

use super::anode::fit_setup_error;
use super::estimator::{EstimatorSettings, FitSeed, estimate_seed};
use crate::common::config::{DynodeFitSettings, PipelineConfig};
use crate::domain::{ChannelRole, FitResult, FitWindow, PspmtError, PspmtResult, Waveform};
use crate::numerics::{
    FitParameter, FitQuality, LeastSquaresProblem, MinimizerSettings, ParameterBounds, minimize,
};
use serde::{Deserialize, Serialize};
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DynodeFitResult {
    #[serde(flatten)]
    pub parameters: DynodeParameters,
    pub uncertainties: Option<DynodeParameters>,
    pub quality: FitQuality,
}

impl DynodeFitResult {
    /// Orders the two decay components so `fast_decay <= slow_decay`.
    pub fn into_canonical(self) -> Self {
        if !self.parameters.is_mirrored() {
            return self;
        }
        Self {
            parameters: self.parameters.mirrored(),
            uncertainties: self.uncertainties.map(|sigma| DynodeParameters {
                fast_decay: sigma.slow_decay,
                slow_decay: sigma.fast_decay,
                ..sigma
            }),
            quality: self.quality,
        }
    }

    pub fn is_reliable(&self) -> bool {
        self.quality.converged()
    }

    pub fn into_reliable(self) -> FitResult<Self> {
        if self.is_reliable() {
            return Ok(self);
        }
        Err(PspmtError::fit_did_not_converge(
            "FIT.DYNODE_NOT_CONVERGED",
            format!(
                "dynode fit stopped with {:?} after {} iterations (best effort: amplitude {:.3}, rise {:.3})",
                self.quality.termination,
                self.quality.iterations,
                self.parameters.amplitude,
                self.parameters.rise_time,
            ),
        ))
    }
}

#[derive(Debug, Clone, Copy)]
pub struct DynodeFitter<'a> {
    estimator: &'a EstimatorSettings,
    settings: &'a DynodeFitSettings,
    minimizer: &'a MinimizerSettings,
}

impl<'a> DynodeFitter<'a> {
    pub fn new(config: &'a PipelineConfig) -> Self {
        Self {
            estimator: &config.estimator,
            settings: &config.dynode,
            minimizer: &config.fit,
        }
    }

    pub fn fit(&self, waveform: &Waveform, window: FitWindow) -> PspmtResult<DynodeFitResult> {
        let seed = estimate_seed(waveform, self.estimator)?;
        let parameters = self.initial_parameters(waveform, &seed);

        let (times, amplitudes) = waveform.windowed(window);
        let problem = LeastSquaresProblem::new(&DynodePulse, &times, &amplitudes, parameters)
            .map_err(|error| fit_setup_error(ChannelRole::DynodeSum, error))?;
        let fit = minimize(&problem, self.minimizer)
            .map_err(|error| fit_setup_error(ChannelRole::DynodeSum, error))?;

        let raw = DynodeFitResult {
            parameters: DynodeParameters::from_slice(&fit.parameters),
            uncertainties: fit
                .uncertainties
                .as_deref()
                .map(DynodeParameters::from_slice),
            quality: fit.quality,
        };
        let mirrored = raw.parameters.is_mirrored();
        let result = raw.into_canonical();
        debug!(
            converged = result.is_reliable(),
            mirrored,
            iterations = result.quality.iterations,
            chi_square = result.quality.chi_square,
            amplitude = result.parameters.amplitude,
            fast_fraction = result.parameters.fast_fraction,
            "dynode fit finished"
        );
        Ok(result)
    }

    /// Baseline minus the lowest sample from `peak + offset` onward; zero when
    /// the trace ends before that point.
    fn undershoot_seed(&self, waveform: &Waveform, seed: &FitSeed) -> f64 {
        let start = seed.peak_index + self.settings.undershoot_search_offset;
        let minimum = waveform
            .samples()
            .iter()
            .skip(start)
            .map(|sample| sample.amplitude)
            .fold(seed.baseline_level, f64::min);
        seed.baseline_level - minimum
    }

    fn initial_parameters(&self, waveform: &Waveform, seed: &FitSeed) -> Vec<FitParameter> {
        let settings = self.settings;
        let amplitude = seed.peak_amplitude - seed.baseline_level;
        let undershoot = self.undershoot_seed(waveform, seed);

        vec![
            FitParameter::bounded(
                amplitude,
                ParameterBounds::new(
                    settings.amplitude_lower_factor * amplitude,
                    settings.amplitude_upper_factor * amplitude,
                ),
            ),
            FitParameter::bounded(
                seed.peak_position,
                ParameterBounds::around(seed.peak_position, settings.peak_position_margin),
            ),
            FitParameter::bounded(settings.fast_decay, settings.fast_decay_bounds),
            FitParameter::bounded(settings.slow_decay, settings.slow_decay_bounds),
            FitParameter::bounded(settings.rise_time, settings.rise_time_bounds),
            FitParameter::bounded(
                undershoot,
                ParameterBounds::new(0.0, undershoot + settings.undershoot_margin),
            ),
            FitParameter::bounded(
                settings.undershoot_recovery_time,
                settings.undershoot_recovery_bounds,
            ),
            FitParameter::bounded(settings.fast_fraction, settings.fast_fraction_bounds),
            FitParameter::bounded(
                seed.baseline_level,
                ParameterBounds::around(seed.baseline_level, settings.baseline_margin),
            ),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::{DynodeFitResult, DynodeFitter, DynodeParameters};
    use crate::common::config::PipelineConfig;
    use crate::domain::{FitWindow, PspmtErrorCategory, Waveform};
    use crate::modules::estimator::{EstimatorSettings, estimate_seed};
    use crate::numerics::{FitQuality, Termination};

    fn truth() -> DynodeParameters {
        DynodeParameters {
            amplitude: 800.0,
            peak_position: 100.0,
            fast_decay: 18.0,
            slow_decay: 45.0,
            rise_time: 3.0,
            undershoot_amplitude: 25.0,
            undershoot_recovery_time: 450.0,
            fast_fraction: 0.6,
            baseline: 200.0,
        }
    }

    fn trace(length: usize) -> Waveform {
        let parameters = truth();
        let amplitudes: Vec<f64> = (0..length)
            .map(|index| parameters.evaluate(index as f64))
            .collect();
        Waveform::from_amplitudes(&amplitudes)
    }

    #[test]
    fn undershoot_seed_reads_the_late_minimum() {
        let config = PipelineConfig::default();
        let fitter = DynodeFitter::new(&config);
        let waveform = trace(1200);
        let seed = estimate_seed(&waveform, &EstimatorSettings::default()).expect("seed");

        let undershoot = fitter.undershoot_seed(&waveform, &seed);
        let last = waveform.samples().last().expect("non-empty").amplitude;
        assert!((undershoot - (200.0 - last)).abs() < 1.0e-9);
        assert!(undershoot > 15.0 && undershoot < 25.0);
    }

    #[test]
    fn short_trace_has_no_undershoot_seed() {
        let config = PipelineConfig::default();
        let fitter = DynodeFitter::new(&config);
        let waveform = trace(150);
        let seed = estimate_seed(&waveform, &EstimatorSettings::default()).expect("seed");

        assert_eq!(fitter.undershoot_seed(&waveform, &seed), 0.0);
    }

    #[test]
    fn fraction_seed_is_kept_above_one() {
        let config = PipelineConfig::default();
        let fitter = DynodeFitter::new(&config);
        let waveform = trace(1200);
        let seed = estimate_seed(&waveform, &EstimatorSettings::default()).expect("seed");

        let parameters = fitter.initial_parameters(&waveform, &seed);
        assert_eq!(parameters.len(), 9);
        assert_eq!(parameters[7].value, 2.0);
        assert_eq!(parameters[2].value, 20.0);
        assert_eq!(parameters[6].value, 500.0);
    }

    #[test]
    fn empty_trace_is_insufficient() {
        let config = PipelineConfig::default();
        let fitter = DynodeFitter::new(&config);
        let error = fitter
            .fit(&Waveform::default(), FitWindow::new(0.0, 10.0))
            .expect_err("empty trace should fail");
        assert_eq!(error.category(), PspmtErrorCategory::InsufficientSamples);
    }

    #[test]
    fn swapped_components_are_put_back_in_order() {
        let truth = truth();
        let swapped = DynodeParameters {
            fast_decay: 45.0,
            slow_decay: 18.0,
            fast_fraction: 0.4,
            ..truth
        };
        for t in [90.0, 101.0, 130.0, 400.0] {
            assert!((swapped.evaluate(t) - truth.evaluate(t)).abs() < 1.0e-9);
        }
        let sigma = DynodeParameters {
            fast_decay: 0.5,
            slow_decay: 0.2,
            fast_fraction: 0.01,
            ..truth
        };
        let result = DynodeFitResult {
            parameters: swapped,
            uncertainties: Some(sigma),
            quality: FitQuality {
                chi_square: 0.0,
                degrees_of_freedom: 100,
                iterations: 3,
                termination: Termination::ChiSquareTolerance,
                bounded_parameters: 0,
            },
        }
        .into_canonical();

        assert_eq!(result.parameters.fast_decay, 18.0);
        assert_eq!(result.parameters.slow_decay, 45.0);
        assert!((result.parameters.fast_fraction - 0.6).abs() < 1.0e-12);
        let uncertainties = result.uncertainties.expect("uncertainties kept");
        assert_eq!(uncertainties.fast_decay, 0.2);
        assert_eq!(uncertainties.slow_decay, 0.5);
        assert_eq!(uncertainties.fast_fraction, 0.01);
    }

    #[test]
    fn fit_from_a_swapped_seed_reports_the_fast_component_first() {
        let mut config = PipelineConfig::default();
        config.dynode.fast_decay = 45.0;
        config.dynode.slow_decay = 18.0;
        config.dynode.fast_fraction = 0.4;
        let fitter = DynodeFitter::new(&config);
        let waveform = trace(1200);

        let result = fitter
            .fit(&waveform, FitWindow::full(&waveform))
            .expect("fit should run");

        let parameters = result.parameters;
        assert!(parameters.fast_decay <= parameters.slow_decay, "{parameters:?}");
        assert!((parameters.fast_decay - 18.0).abs() < 0.05 * 18.0, "{parameters:?}");
        assert!((parameters.slow_decay - 45.0).abs() < 0.05 * 45.0, "{parameters:?}");
        assert!((parameters.fast_fraction - 0.6).abs() < 0.05 * 0.6, "{parameters:?}");
    }
}
