mod model;

pub use model::{AnodeParameters, AnodePulse};

use super::calibration::{RiseTimeCalibrationMap, RiseTimeSeed, SeedSource};
use super::estimator::{EstimatorSettings, FitSeed, estimate_seed};
use super::rise_power::RisePowerTable;
use crate::common::config::{AnodeFitSettings, PipelineConfig, PriorAxisConvention};
use crate::domain::{
    ChannelRole, EventPosition, FitResult, FitWindow, PositionAxis, PspmtError, PspmtResult,
    Waveform,
};
use crate::numerics::{
    FitParameter, FitQuality, LeastSquaresError, LeastSquaresProblem, MinimizerSettings,
    ParameterBounds, minimize,
};
use serde::{Deserialize, Serialize};
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnodeFitResult {
    pub channel: ChannelRole,
    #[serde(flatten)]
    pub parameters: AnodeParameters,
    pub uncertainties: Option<AnodeParameters>,
    pub quality: FitQuality,
    pub rise_time_seed: RiseTimeSeed,
    /// Expected rise power from the position model, when one was applied.
    pub rise_power_prior: Option<f64>,
    /// Ended on a bound with residuals well above the baseline noise.
    #[serde(default)]
    pub pinned_at_bound: bool,
}

impl AnodeFitResult {
    pub fn is_reliable(&self) -> bool {
        self.quality.converged() && !self.pinned_at_bound
    }

    /// Passes a converged fit through and turns any other into `FitDidNotConverge`.
    pub fn into_reliable(self) -> FitResult<Self> {
        if self.is_reliable() {
            return Ok(self);
        }
        Err(PspmtError::fit_did_not_converge(
            "FIT.ANODE_NOT_CONVERGED",
            format!(
                "{} fit stopped with {:?}{} after {} iterations (best effort: amplitude {:.3}, rise {:.3}, power {:.3})",
                self.channel,
                self.quality.termination,
                if self.pinned_at_bound { " on a bound" } else { "" },
                self.quality.iterations,
                self.parameters.amplitude,
                self.parameters.rise_time_constant,
                self.parameters.rise_power,
            ),
        ))
    }
}

/// Fits the six-parameter anode pulse. One fitter serves both passes: with no
/// map the rise time is seeded from the onset estimate, and with no position
/// the rise-power prior is replaced by wide default bounds.
#[derive(Debug, Clone, Copy)]
pub struct AnodeFitter<'a> {
    estimator: &'a EstimatorSettings,
    settings: &'a AnodeFitSettings,
    minimizer: &'a MinimizerSettings,
    rise_power: &'a RisePowerTable,
}

impl<'a> AnodeFitter<'a> {
    pub fn new(config: &'a PipelineConfig) -> Self {
        Self {
            estimator: &config.estimator,
            settings: &config.anode,
            minimizer: &config.fit,
            rise_power: &config.rise_power,
        }
    }

    pub fn fit(
        &self,
        waveform: &Waveform,
        window: FitWindow,
        channel: ChannelRole,
        position: Option<EventPosition>,
        map: Option<&RiseTimeCalibrationMap>,
    ) -> PspmtResult<AnodeFitResult> {
        if !channel.is_anode() {
            return Err(PspmtError::invalid_channel(
                "FIT.ANODE_CHANNEL",
                format!("channel '{channel}' is not an anode"),
            ));
        }

        let seed = estimate_seed(waveform, self.estimator)?;
        let rise_time_seed = self.rise_time_seed(&seed, channel, position, map);
        let rise_power_prior = match position {
            Some(position) => Some(
                self.rise_power
                    .evaluate(channel, self.prior_coordinate(channel, position))?,
            ),
            None => None,
        };

        let parameters = self.initial_parameters(&seed, rise_time_seed, rise_power_prior);
        let (times, amplitudes) = waveform.windowed(window);
        let problem = LeastSquaresProblem::new(&AnodePulse, &times, &amplitudes, parameters)
            .map_err(|error| fit_setup_error(channel, error))?;
        let fit = minimize(&problem, self.minimizer)
            .map_err(|error| fit_setup_error(channel, error))?;

        let pinned_at_bound = self.is_pinned(&fit.quality, &seed);
        let result = AnodeFitResult {
            channel,
            parameters: AnodeParameters::from_slice(&fit.parameters),
            uncertainties: fit
                .uncertainties
                .as_deref()
                .map(AnodeParameters::from_slice),
            quality: fit.quality,
            rise_time_seed,
            rise_power_prior,
            pinned_at_bound,
        };
        debug!(
            channel = %channel,
            converged = result.is_reliable(),
            bounded_parameters = result.quality.bounded_parameters,
            iterations = result.quality.iterations,
            chi_square = result.quality.chi_square,
            rise_time = result.parameters.rise_time_constant,
            rise_power = result.parameters.rise_power,
            seed_source = ?rise_time_seed.source,
            "anode fit finished"
        );
        Ok(result)
    }

    fn rise_time_seed(
        &self,
        seed: &FitSeed,
        channel: ChannelRole,
        position: Option<EventPosition>,
        map: Option<&RiseTimeCalibrationMap>,
    ) -> RiseTimeSeed {
        if let (Some(position), Some(map)) = (position, map) {
            let seeded = map.seed(channel, position.x, position.y);
            if seeded.is_fallback() {
                debug!(
                    channel = %channel,
                    x = position.x,
                    y = position.y,
                    fallback = seeded.value,
                    "calibration map has no rise time for this cell"
                );
            }
            return seeded;
        }

        let onset = seed.onset_rise_time();
        if onset > 0.0 {
            RiseTimeSeed {
                value: onset,
                source: SeedSource::OnsetEstimate,
            }
        } else {
            debug!(
                channel = %channel,
                fallback = self.settings.degenerate_rise_time,
                "onset coincides with the peak"
            );
            RiseTimeSeed {
                value: self.settings.degenerate_rise_time,
                source: SeedSource::DegenerateOnset,
            }
        }
    }

    fn is_pinned(&self, quality: &FitQuality, seed: &FitSeed) -> bool {
        let Some(ratio) = self.settings.pinned_fit_noise_ratio else {
            return false;
        };
        let noise = (seed.baseline_rms * seed.baseline_rms).max(f64::MIN_POSITIVE);
        quality.is_bound_limited()
            && quality
                .reduced_chi_square()
                .is_some_and(|reduced| reduced > ratio * noise)
    }

    fn prior_coordinate(&self, channel: ChannelRole, position: EventPosition) -> f64 {
        match self.settings.prior_axis {
            PriorAxisConvention::AlwaysX => position.x,
            PriorAxisConvention::ChannelAxis => {
                position.along(channel.axis().unwrap_or(PositionAxis::X))
            }
        }
    }

    fn initial_parameters(
        &self,
        seed: &FitSeed,
        rise_time: RiseTimeSeed,
        rise_power_prior: Option<f64>,
    ) -> Vec<FitParameter> {
        let settings = self.settings;
        let amplitude = seed.peak_amplitude - seed.baseline_level;

        let decay = if settings.fix_decay_constant {
            FitParameter::fixed(settings.decay_constant)
        } else {
            FitParameter::bounded(seed.estimated_decay_width, settings.decay_constant_bounds)
        };
        let rise_power = match rise_power_prior {
            Some(expected) => FitParameter::bounded(
                expected,
                ParameterBounds::around(expected, settings.rise_power_tolerance),
            ),
            None => FitParameter::bounded(
                settings.unconstrained_rise_power,
                settings.unconstrained_rise_power_bounds,
            ),
        };

        vec![
            FitParameter::bounded(
                amplitude,
                ParameterBounds::new(
                    settings.amplitude_lower_factor * amplitude,
                    settings.amplitude_upper_factor * seed.peak_amplitude,
                ),
            ),
            FitParameter::bounded(
                seed.peak_position,
                ParameterBounds::around(seed.peak_position, settings.peak_position_margin),
            ),
            decay,
            FitParameter::bounded(
                rise_time.value,
                ParameterBounds::around(
                    rise_time.value,
                    settings.rise_time_tolerance * rise_time.value.abs(),
                ),
            ),
            rise_power,
            FitParameter::bounded(
                seed.baseline_level,
                ParameterBounds::around(
                    seed.baseline_level,
                    settings.baseline_rms_margin * seed.baseline_rms,
                ),
            ),
        ]
    }
}

pub(crate) fn fit_setup_error(channel: ChannelRole, error: LeastSquaresError) -> PspmtError {
    match error {
        LeastSquaresError::InsufficientPoints { .. } => PspmtError::insufficient_samples(
            "FIT.WINDOW_TOO_SHORT",
            format!("{channel} fit window: {error}"),
        ),
        other => PspmtError::internal("FIT.PROBLEM_SETUP", format!("{channel} fit: {other}")),
    }
}
