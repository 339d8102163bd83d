use crate::numerics::ParametricModel;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DynodeParameters {
    pub amplitude: f64,
    pub peak_position: f64,
    pub fast_decay: f64,
    pub slow_decay: f64,
    pub rise_time: f64,
    pub undershoot_amplitude: f64,
    pub undershoot_recovery_time: f64,
    pub fast_fraction: f64,
    pub baseline: f64,
}

impl DynodeParameters {
    pub fn to_array(&self) -> [f64; 9] {
        [
            self.amplitude,
            self.peak_position,
            self.fast_decay,
            self.slow_decay,
            self.rise_time,
            self.undershoot_amplitude,
            self.undershoot_recovery_time,
            self.fast_fraction,
            self.baseline,
        ]
    }

    pub(crate) fn from_slice(values: &[f64]) -> Self {
        Self {
            amplitude: values[0],
            peak_position: values[1],
            fast_decay: values[2],
            slow_decay: values[3],
            rise_time: values[4],
            undershoot_amplitude: values[5],
            undershoot_recovery_time: values[6],
            fast_fraction: values[7],
            baseline: values[8],
        }
    }

    pub fn evaluate(&self, t: f64) -> f64 {
        DynodePulse.evaluate(t, &self.to_array())
    }

    /// `(f, a, b)` and `(1 - f, b, a)` trace the same pulse.
    pub fn is_mirrored(&self) -> bool {
        self.fast_decay > self.slow_decay
    }

    pub(crate) fn mirrored(self) -> Self {
        Self {
            fast_decay: self.slow_decay,
            slow_decay: self.fast_decay,
            fast_fraction: 1.0 - self.fast_fraction,
            ..self
        }
    }
}

/// Rising edge times a fast/slow double-exponential decay, minus a slowly
/// recovering undershoot.
#[derive(Debug, Clone, Copy, Default)]
pub struct DynodePulse;

impl ParametricModel for DynodePulse {
    fn parameter_names(&self) -> &[&'static str] {
        &[
            "amplitude",
            "peakPosition",
            "fastDecay",
            "slowDecay",
            "riseTime",
            "undershootAmplitude",
            "undershootRecoveryTime",
            "fastFraction",
            "baseline",
        ]
    }

    fn evaluate(&self, t: f64, parameters: &[f64]) -> f64 {
        let p = DynodeParameters::from_slice(parameters);
        let elapsed = t - p.peak_position;
        if elapsed < 0.0 {
            return p.baseline;
        }
        let rising = 1.0 - (-elapsed / p.rise_time).exp();
        let decay = p.fast_fraction * (-elapsed / p.fast_decay).exp()
            + (1.0 - p.fast_fraction) * (-elapsed / p.slow_decay).exp();
        let undershoot =
            p.undershoot_amplitude * (1.0 - (-elapsed / p.undershoot_recovery_time).exp());
        p.baseline + p.amplitude * rising * decay - undershoot
    }
}
