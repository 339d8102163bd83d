//! Baseline and peak estimation used to seed the pulse fits.

use crate::common::constants::{BASELINE_SAMPLES, DECAY_CONSTANT, ONSET_THRESHOLD_SIGMA};
use crate::domain::{PspmtError, PspmtResult, Waveform};
use crate::numerics::stable_sum;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EstimatorSettings {
    pub baseline_samples: usize,
    pub onset_threshold_sigma: f64,
    /// Replaces the scanned decay width when set.
    pub decay_width_override: Option<f64>,
}

impl Default for EstimatorSettings {
    fn default() -> Self {
        Self {
            baseline_samples: BASELINE_SAMPLES,
            onset_threshold_sigma: ONSET_THRESHOLD_SIGMA,
            decay_width_override: Some(DECAY_CONSTANT),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FitSeed {
    pub baseline_level: f64,
    pub baseline_rms: f64,
    pub peak_amplitude: f64,
    pub peak_position: f64,
    pub peak_index: usize,
    pub rise_onset_position: f64,
    pub estimated_decay_width: f64,
}

impl FitSeed {
    /// Onset-to-peak distance, the raw rise-time estimate.
    pub fn onset_rise_time(&self) -> f64 {
        self.peak_position - self.rise_onset_position
    }
}

pub fn estimate_seed(waveform: &Waveform, settings: &EstimatorSettings) -> PspmtResult<FitSeed> {
    let samples = waveform.samples();
    let Some(first) = samples.first() else {
        return Err(PspmtError::insufficient_samples(
            "SEED.EMPTY_TRACE",
            "cannot seed a fit from an empty trace",
        ));
    };

    let window = settings.baseline_samples.clamp(1, samples.len());
    let baseline: Vec<f64> = samples[..window].iter().map(|s| s.amplitude).collect();
    let baseline_level = stable_sum(&baseline) / window as f64;
    let squared: Vec<f64> = baseline
        .iter()
        .map(|value| (value - baseline_level) * (value - baseline_level))
        .collect();
    let baseline_rms = (stable_sum(&squared) / window as f64).sqrt();

    let threshold = baseline_level + settings.onset_threshold_sigma * baseline_rms;
    let mut peak_index = 0;
    let mut peak_amplitude = first.amplitude;
    let mut onset = None;
    for (index, sample) in samples.iter().enumerate() {
        if sample.amplitude > peak_amplitude {
            peak_amplitude = sample.amplitude;
            peak_index = index;
        }
        if onset.is_none() && sample.amplitude > threshold {
            onset = Some(sample.time);
        }
    }
    let peak_position = samples[peak_index].time;
    // A flat trace never crosses the threshold; the onset then collapses onto the peak.
    let rise_onset_position = onset.map_or(peak_position, |time| time.min(peak_position));

    let estimated_decay_width = match settings.decay_width_override {
        Some(width) => width,
        None => scan_decay_width(waveform, peak_index, baseline_level).unwrap_or(DECAY_CONSTANT),
    };

    Ok(FitSeed {
        baseline_level,
        baseline_rms,
        peak_amplitude,
        peak_position,
        peak_index,
        rise_onset_position,
        estimated_decay_width,
    })
}

/// Distance from the peak to the first sample at or below the 1/e level.
fn scan_decay_width(waveform: &Waveform, peak_index: usize, baseline_level: f64) -> Option<f64> {
    let samples = waveform.samples();
    let peak = samples.get(peak_index)?;
    let level = baseline_level + (peak.amplitude - baseline_level) / std::f64::consts::E;

    samples[peak_index..]
        .iter()
        .find(|sample| sample.amplitude <= level)
        .map(|sample| sample.time - peak.time)
        .filter(|width| *width > 0.0)
}
