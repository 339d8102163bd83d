//! Per-channel quartic model of the rise-power exponent versus position.

use crate::common::constants::{REGION_OF_INTEREST_MAX, REGION_OF_INTEREST_MIN};
use crate::domain::{ChannelRole, PspmtError, PspmtResult};
use crate::numerics::ParametricModel;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// `offset + linear·u + quadratic·u² + cubic·u³ + quartic·u⁴` with `u = position − center`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RisePowerPolynomial {
    pub offset: f64,
    pub linear: f64,
    pub quadratic: f64,
    pub cubic: f64,
    pub quartic: f64,
    pub center: f64,
}

impl RisePowerPolynomial {
    pub const fn new(
        offset: f64,
        linear: f64,
        quadratic: f64,
        cubic: f64,
        quartic: f64,
        center: f64,
    ) -> Self {
        Self {
            offset,
            linear,
            quadratic,
            cubic,
            quartic,
            center,
        }
    }

    pub fn from_parameters(parameters: &[f64; 6]) -> Self {
        let [offset, linear, quadratic, cubic, quartic, center] = *parameters;
        Self::new(offset, linear, quadratic, cubic, quartic, center)
    }

    pub fn to_parameters(&self) -> [f64; 6] {
        [
            self.offset,
            self.linear,
            self.quadratic,
            self.cubic,
            self.quartic,
            self.center,
        ]
    }

    /// Evaluates without a domain check.
    pub fn value_at(&self, position: f64) -> f64 {
        let u = position - self.center;
        self.offset + u * (self.linear + u * (self.quadratic + u * (self.cubic + u * self.quartic)))
    }
}

/// Channel to coefficient table. Serializes as `{ "xa": {..}, "xb": {..}, .. }`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RisePowerTable {
    channels: BTreeMap<ChannelRole, RisePowerPolynomial>,
}

impl Default for RisePowerTable {
    fn default() -> Self {
        Self::production()
    }
}

impl RisePowerTable {
    pub fn empty() -> Self {
        Self {
            channels: BTreeMap::new(),
        }
    }

    /// Coefficients calibrated on the detector's commissioning data.
    pub fn production() -> Self {
        let mut table = Self::empty();
        table.insert(
            ChannelRole::AnodeXA,
            RisePowerPolynomial::new(1.178, 0.1166, 7.657, 31.42, 1222.0, 0.2509),
        );
        table.insert(
            ChannelRole::AnodeXB,
            RisePowerPolynomial::new(1.177, 0.1157, 8.094, 33.55, 1201.0, 0.2511),
        );
        table.insert(
            ChannelRole::AnodeYA,
            RisePowerPolynomial::new(1.178, 0.1174, 7.860, 32.89, 1212.0, 0.2510),
        );
        table.insert(
            ChannelRole::AnodeYB,
            RisePowerPolynomial::new(1.178, 0.1177, 7.531, 33.51, 1235.0, 0.2512),
        );
        table
    }

    pub fn insert(&mut self, channel: ChannelRole, polynomial: RisePowerPolynomial) {
        self.channels.insert(channel, polynomial);
    }

    pub fn polynomial(&self, channel: ChannelRole) -> Option<&RisePowerPolynomial> {
        self.channels.get(&channel)
    }

    pub fn channels(&self) -> impl Iterator<Item = (ChannelRole, &RisePowerPolynomial)> {
        self.channels.iter().map(|(channel, polynomial)| (*channel, polynomial))
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    /// Entries of `other` replace the ones already present.
    pub fn overlay(&mut self, other: &RisePowerTable) {
        for (channel, polynomial) in other.channels() {
            self.insert(channel, *polynomial);
        }
    }

    /// Expected rise power for `channel` at a 1-D `position` inside [0.1, 0.4].
    pub fn evaluate(&self, channel: ChannelRole, position: f64) -> PspmtResult<f64> {
        if !channel.is_anode() {
            return Err(PspmtError::invalid_channel(
                "MODEL.RISE_POWER_CHANNEL",
                format!("channel '{channel}' has no rise-power model"),
            ));
        }
        let polynomial = self.polynomial(channel).ok_or_else(|| {
            PspmtError::invalid_channel(
                "MODEL.RISE_POWER_CHANNEL",
                format!("no rise-power coefficients configured for channel '{channel}'"),
            )
        })?;
        if !(REGION_OF_INTEREST_MIN..=REGION_OF_INTEREST_MAX).contains(&position) {
            return Err(PspmtError::out_of_domain(
                "MODEL.RISE_POWER_DOMAIN",
                format!(
                    "position {position} outside [{REGION_OF_INTEREST_MIN}, {REGION_OF_INTEREST_MAX}]"
                ),
            ));
        }

        Ok(polynomial.value_at(position))
    }
}

/// The quartic as a fit model with a floating center, used to re-derive coefficients.
#[derive(Debug, Clone, Copy, Default)]
pub struct QuarticTrend;

impl ParametricModel for QuarticTrend {
    fn parameter_names(&self) -> &[&'static str] {
        &["offset", "linear", "quadratic", "cubic", "quartic", "center"]
    }

    fn evaluate(&self, x: f64, parameters: &[f64]) -> f64 {
        RisePowerPolynomial::new(
            parameters[0],
            parameters[1],
            parameters[2],
            parameters[3],
            parameters[4],
            parameters[5],
        )
        .value_at(x)
    }
}
