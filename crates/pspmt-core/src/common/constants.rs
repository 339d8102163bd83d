//! Production calibration constants for the PSPMT shape analysis.
//!
//! Values the fitters and calibration stages fall back to when no
//! configuration override is supplied.

/// Decay constant held fixed in the anode fit. The forward 1/e scan from the
/// peak proved unstable on detector traces, so this constant replaces it.
pub const DECAY_CONSTANT: f64 = 28.0;
pub const FALLBACK_RISE_TIME: f64 = 3.0;

pub const BASELINE_SAMPLES: usize = 20;
pub const ONSET_THRESHOLD_SIGMA: f64 = 10.0;

pub const POSITION_MIN: f64 = 0.0;
pub const POSITION_MAX: f64 = 0.5;
pub const REGION_OF_INTEREST_MIN: f64 = 0.1;
pub const REGION_OF_INTEREST_MAX: f64 = 0.4;

pub const SOURCE_MAP_BINS: usize = 500;
pub const TARGET_MAP_BINS: usize = 50;

pub const RISE_POWER_HIST_BINS: usize = 3000;
pub const RISE_POWER_HIST_MIN: f64 = 1.0;
pub const RISE_POWER_HIST_MAX: f64 = 4.0;

pub const RISE_TIME_MAP_SUFFIX: &str = "_rise_time_map";

#[cfg(test)]
mod tests {
    use super::{
        POSITION_MAX, POSITION_MIN, REGION_OF_INTEREST_MAX, REGION_OF_INTEREST_MIN,
        SOURCE_MAP_BINS, TARGET_MAP_BINS,
    };

    #[test]
    fn region_of_interest_sits_inside_position_range() {
        assert!(POSITION_MIN < REGION_OF_INTEREST_MIN);
        assert!(REGION_OF_INTEREST_MAX < POSITION_MAX);
    }

    #[test]
    fn source_grid_rebins_evenly_into_target_grid() {
        assert_eq!(SOURCE_MAP_BINS % TARGET_MAP_BINS, 0);
    }
}
