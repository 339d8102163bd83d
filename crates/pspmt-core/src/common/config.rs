//! Pipeline configuration.
//!
//! Every section defaults to the production values, so an empty JSON object is
//! a complete configuration and a partial document only overrides what it names.

use super::constants::{
    DECAY_CONSTANT, FALLBACK_RISE_TIME, POSITION_MAX, POSITION_MIN, REGION_OF_INTEREST_MAX,
    REGION_OF_INTEREST_MIN, RISE_POWER_HIST_BINS, RISE_POWER_HIST_MAX, RISE_POWER_HIST_MIN,
    SOURCE_MAP_BINS, TARGET_MAP_BINS,
};
use crate::modules::estimator::EstimatorSettings;
use crate::modules::rise_power::RisePowerTable;
use crate::modules::selection::SelectionCriteria;
use crate::numerics::{MinimizerSettings, ParameterBounds};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PipelineConfig {
    pub estimator: EstimatorSettings,
    pub anode: AnodeFitSettings,
    pub dynode: DynodeFitSettings,
    pub calibration: CalibrationSettings,
    pub aggregation: AggregationSettings,
    pub selection: SelectionCriteria,
    pub rise_power: RisePowerTable,
    pub fit: MinimizerSettings,
}

/// Which position coordinate feeds the rise-power prior of an anode channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PriorAxisConvention {
    /// x for the X anodes, y for the Y anodes.
    #[default]
    ChannelAxis,
    /// x for every anode, as the first calibration campaign did.
    AlwaysX,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AnodeFitSettings {
    pub decay_constant: f64,
    pub fix_decay_constant: bool,
    /// Only used when the decay constant floats, seeded from the estimator's width.
    pub decay_constant_bounds: ParameterBounds,
    pub amplitude_lower_factor: f64,
    pub amplitude_upper_factor: f64,
    pub peak_position_margin: f64,
    pub rise_time_tolerance: f64,
    pub rise_power_tolerance: f64,
    pub baseline_rms_margin: f64,
    pub prior_axis: PriorAxisConvention,
    /// Rise-power seed and bounds used when no position is available.
    pub unconstrained_rise_power: f64,
    pub unconstrained_rise_power_bounds: ParameterBounds,
    /// Rise-time seed used when the onset estimate is not positive.
    pub degenerate_rise_time: f64,
    /// When set, a fit that ends with a parameter on its bound and a reduced
    /// chi-square above this multiple of the baseline variance is unreliable.
    pub pinned_fit_noise_ratio: Option<f64>,
}

impl Default for AnodeFitSettings {
    fn default() -> Self {
        Self {
            decay_constant: DECAY_CONSTANT,
            fix_decay_constant: true,
            decay_constant_bounds: ParameterBounds::new(1.0, 200.0),
            amplitude_lower_factor: 0.5,
            amplitude_upper_factor: 1.2,
            peak_position_margin: 30.0,
            rise_time_tolerance: 0.10,
            rise_power_tolerance: 0.05,
            baseline_rms_margin: 5.0,
            prior_axis: PriorAxisConvention::ChannelAxis,
            unconstrained_rise_power: 2.0,
            unconstrained_rise_power_bounds: ParameterBounds::new(1.0, 4.0),
            degenerate_rise_time: FALLBACK_RISE_TIME,
            pinned_fit_noise_ratio: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DynodeFitSettings {
    pub fast_decay: f64,
    pub slow_decay: f64,
    pub rise_time: f64,
    pub undershoot_recovery_time: f64,
    pub fast_fraction: f64,
    pub undershoot_search_offset: usize,
    pub amplitude_lower_factor: f64,
    pub amplitude_upper_factor: f64,
    pub peak_position_margin: f64,
    pub fast_decay_bounds: ParameterBounds,
    pub slow_decay_bounds: ParameterBounds,
    pub rise_time_bounds: ParameterBounds,
    pub undershoot_margin: f64,
    pub undershoot_recovery_bounds: ParameterBounds,
    pub fast_fraction_bounds: ParameterBounds,
    pub baseline_margin: f64,
}

impl Default for DynodeFitSettings {
    fn default() -> Self {
        Self {
            fast_decay: 20.0,
            slow_decay: 40.0,
            rise_time: 3.0,
            undershoot_recovery_time: 500.0,
            fast_fraction: 2.0,
            undershoot_search_offset: 100,
            amplitude_lower_factor: 0.5,
            amplitude_upper_factor: 2.5,
            peak_position_margin: 50.0,
            fast_decay_bounds: ParameterBounds::new(1.0, 100.0),
            slow_decay_bounds: ParameterBounds::new(10.0, 200.0),
            rise_time_bounds: ParameterBounds::new(0.5, 20.0),
            undershoot_margin: 300.0,
            undershoot_recovery_bounds: ParameterBounds::new(50.0, 1000.0),
            fast_fraction_bounds: ParameterBounds::new(0.0, 50.0),
            baseline_margin: 100.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CalibrationSettings {
    pub target_bins: usize,
    pub fallback_rise_time: f64,
}

impl Default for CalibrationSettings {
    fn default() -> Self {
        Self {
            target_bins: TARGET_MAP_BINS,
            fallback_rise_time: FALLBACK_RISE_TIME,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RisePowerRange {
    pub label: String,
    pub low: f64,
    pub high: f64,
}

impl RisePowerRange {
    pub fn new(label: impl Into<String>, low: f64, high: f64) -> Self {
        Self {
            label: label.into(),
            low,
            high,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AggregationSettings {
    pub position_min: f64,
    pub position_max: f64,
    /// Bins per axis of the dense position grids (hit counts, 2-D profiles, scatter x).
    pub position_bins: usize,
    pub profile_bins: usize,
    pub decay_bins: usize,
    pub decay_max: f64,
    pub rise_bins: usize,
    pub rise_max: f64,
    pub rise_power_bins: usize,
    pub rise_power_min: f64,
    pub rise_power_max: f64,
    pub region_min: f64,
    pub region_max: f64,
    pub region_bins: usize,
    pub rise_power_ranges: Vec<RisePowerRange>,
    /// Starting point of the quartic trend fit: offset, linear, quadratic, cubic, quartic, center.
    pub polynomial_seed: [f64; 6],
}

impl Default for AggregationSettings {
    fn default() -> Self {
        Self {
            position_min: POSITION_MIN,
            position_max: POSITION_MAX,
            position_bins: SOURCE_MAP_BINS,
            profile_bins: 100,
            decay_bins: 200,
            decay_max: 200.0,
            rise_bins: 100,
            rise_max: 100.0,
            rise_power_bins: RISE_POWER_HIST_BINS,
            rise_power_min: RISE_POWER_HIST_MIN,
            rise_power_max: RISE_POWER_HIST_MAX,
            region_min: REGION_OF_INTEREST_MIN,
            region_max: REGION_OF_INTEREST_MAX,
            region_bins: 300,
            rise_power_ranges: vec![
                RisePowerRange::new("1.0-1.1", 1.0, 1.1),
                RisePowerRange::new("1.0-1.5", 1.0, 1.5),
                RisePowerRange::new("1.0-2.0", 1.0, 2.0),
                RisePowerRange::new("2.0-3.0", 2.0, 3.0),
                RisePowerRange::new("3.0-4.0", 3.0, 4.0),
            ],
            polynomial_seed: [5.0, -20.0, 25.0, -20.0, 15.0, 0.25],
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read pipeline config '{}': {source}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse pipeline config '{}': {source}", path.display())]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
}

pub fn load_pipeline_config(config_path: impl AsRef<Path>) -> Result<PipelineConfig, ConfigError> {
    let config_path = config_path.as_ref();
    let source = fs::read_to_string(config_path).map_err(|source| ConfigError::Read {
        path: config_path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&source).map_err(|source| ConfigError::Parse {
        path: config_path.to_path_buf(),
        source,
    })
}
