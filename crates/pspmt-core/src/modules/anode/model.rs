use crate::numerics::ParametricModel;
use serde::{Deserialize, Serialize};

pub(crate) const ANODE_PARAMETER_NAMES: [&str; 6] = [
    "amplitude",
    "peakPosition",
    "decayConstant",
    "riseTimeConstant",
    "risePower",
    "baseline",
];

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnodeParameters {
    pub amplitude: f64,
    pub peak_position: f64,
    pub decay_constant: f64,
    pub rise_time_constant: f64,
    pub rise_power: f64,
    pub baseline: f64,
}

impl AnodeParameters {
    pub fn to_array(&self) -> [f64; 6] {
        [
            self.amplitude,
            self.peak_position,
            self.decay_constant,
            self.rise_time_constant,
            self.rise_power,
            self.baseline,
        ]
    }

    pub(crate) fn from_slice(values: &[f64]) -> Self {
        Self {
            amplitude: values[0],
            peak_position: values[1],
            decay_constant: values[2],
            rise_time_constant: values[3],
            rise_power: values[4],
            baseline: values[5],
        }
    }

    /// Model value at sample time `t`.
    pub fn evaluate(&self, t: f64) -> f64 {
        AnodePulse.evaluate(t, &self.to_array())
    }
}

/// Causal rise-then-decay pulse with a tunable rise curvature:
/// `baseline + A·(1 − exp(−(T/τr)^p))·exp(−T/τd)` for `T = t − t0 > 0`.
#[derive(Debug, Clone, Copy, Default)]
pub struct AnodePulse;

impl ParametricModel for AnodePulse {
    fn parameter_names(&self) -> &[&'static str] {
        &ANODE_PARAMETER_NAMES
    }

    fn evaluate(&self, t: f64, parameters: &[f64]) -> f64 {
        let [amplitude, peak_position, decay, rise, power, baseline] = [
            parameters[0],
            parameters[1],
            parameters[2],
            parameters[3],
            parameters[4],
            parameters[5],
        ];
        let elapsed = t - peak_position;
        if elapsed <= 0.0 {
            return baseline;
        }
        let rising = 1.0 - (-(elapsed / rise).powf(power)).exp();
        baseline + amplitude * rising * (-elapsed / decay).exp()
    }
}
