//! Event qualification ahead of the fits.

use crate::common::constants::{
    POSITION_MAX, POSITION_MIN, REGION_OF_INTEREST_MAX, REGION_OF_INTEREST_MIN,
};
use crate::domain::{ChannelRole, EventInput};
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SelectionCriteria {
    pub high_gain_valid: i32,
    pub low_gain_valid: i32,
    /// Exclusive QDC window on the high-gain sum.
    pub qdc_min: f64,
    pub qdc_max: f64,
    /// Inclusive position window applied to gated events.
    pub position_min: f64,
    pub position_max: f64,
    pub require_all_channels: bool,
}

impl Default for SelectionCriteria {
    fn default() -> Self {
        Self {
            high_gain_valid: 1,
            low_gain_valid: 0,
            qdc_min: 10_000.0,
            qdc_max: 50_000.0,
            position_min: REGION_OF_INTEREST_MIN,
            position_max: REGION_OF_INTEREST_MAX,
            require_all_channels: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Rejection {
    NotSelected,
    HighGainInvalid,
    LowGainFired,
    QdcOutOfRange,
    PositionOutOfRange,
    MissingChannel(ChannelRole),
    InvalidTrace(ChannelRole),
}

impl Rejection {
    /// Stable key used when counting rejections.
    pub fn key(&self) -> String {
        match self {
            Self::NotSelected => "notSelected".to_string(),
            Self::HighGainInvalid => "highGainInvalid".to_string(),
            Self::LowGainFired => "lowGainFired".to_string(),
            Self::QdcOutOfRange => "qdcOutOfRange".to_string(),
            Self::PositionOutOfRange => "positionOutOfRange".to_string(),
            Self::MissingChannel(channel) => format!("missingChannel.{channel}"),
            Self::InvalidTrace(channel) => format!("invalidTrace.{channel}"),
        }
    }
}

impl Display for Rejection {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.key())
    }
}

impl SelectionCriteria {
    /// First reason the event fails, if any. Without gate inputs the upstream
    /// `selected` flag is trusted and only the calibration position range is enforced.
    pub fn qualify(&self, event: &EventInput) -> Result<(), Rejection> {
        if !event.selected {
            return Err(Rejection::NotSelected);
        }

        match event.gate {
            Some(gate) => {
                if gate.high_gain_valid != self.high_gain_valid {
                    return Err(Rejection::HighGainInvalid);
                }
                if gate.low_gain_valid != self.low_gain_valid {
                    return Err(Rejection::LowGainFired);
                }
                if !(gate.high_gain_qdc > self.qdc_min && gate.high_gain_qdc < self.qdc_max) {
                    return Err(Rejection::QdcOutOfRange);
                }
                if !event.position.within(self.position_min, self.position_max) {
                    return Err(Rejection::PositionOutOfRange);
                }
            }
            None => {
                if !event.position.within(POSITION_MIN, POSITION_MAX) {
                    return Err(Rejection::PositionOutOfRange);
                }
            }
        }

        if self.require_all_channels {
            for channel in ChannelRole::ALL {
                match event.trace(channel) {
                    None => return Err(Rejection::MissingChannel(channel)),
                    Some(trace) if !trace.valid || trace.samples.is_empty() => {
                        return Err(Rejection::InvalidTrace(channel));
                    }
                    Some(_) => {}
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::{Rejection, SelectionCriteria};
    use crate::domain::{ChannelRole, EventInput, EventPosition, GateInputs, TraceInput};

    fn event(x: f64, y: f64, gate: Option<GateInputs>) -> EventInput {
        EventInput {
            event_number: 1,
            position: EventPosition::new(x, y),
            selected: true,
            gate,
            traces: ChannelRole::ALL
                .into_iter()
                .map(|channel| TraceInput {
                    channel,
                    valid: true,
                    samples: vec![0.0; 8],
                })
                .collect(),
        }
    }

    fn good_gate() -> GateInputs {
        GateInputs {
            high_gain_valid: 1,
            low_gain_valid: 0,
            high_gain_qdc: 20_000.0,
        }
    }

    #[test]
    fn gated_event_inside_every_window_qualifies() {
        let criteria = SelectionCriteria::default();
        assert_eq!(criteria.qualify(&event(0.1, 0.4, Some(good_gate()))), Ok(()));
    }

    #[test]
    fn gate_checks_report_the_first_failure() {
        let criteria = SelectionCriteria::default();

        let mut gate = good_gate();
        gate.low_gain_valid = 1;
        assert_eq!(
            criteria.qualify(&event(0.2, 0.2, Some(gate))),
            Err(Rejection::LowGainFired)
        );

        let mut gate = good_gate();
        gate.high_gain_qdc = 50_000.0;
        assert_eq!(
            criteria.qualify(&event(0.2, 0.2, Some(gate))),
            Err(Rejection::QdcOutOfRange)
        );

        assert_eq!(
            criteria.qualify(&event(0.45, 0.2, Some(good_gate()))),
            Err(Rejection::PositionOutOfRange)
        );
    }

    #[test]
    fn ungated_events_trust_the_upstream_flag() {
        let criteria = SelectionCriteria::default();
        assert_eq!(criteria.qualify(&event(0.45, 0.05, None)), Ok(()));
        assert_eq!(
            criteria.qualify(&event(0.6, 0.2, None)),
            Err(Rejection::PositionOutOfRange)
        );

        let mut rejected = event(0.2, 0.2, None);
        rejected.selected = false;
        assert_eq!(criteria.qualify(&rejected), Err(Rejection::NotSelected));
    }

    #[test]
    fn every_channel_must_be_present_and_valid() {
        let criteria = SelectionCriteria::default();

        let mut missing = event(0.2, 0.2, None);
        missing.traces.retain(|trace| trace.channel != ChannelRole::DynodeSum);
        assert_eq!(
            criteria.qualify(&missing),
            Err(Rejection::MissingChannel(ChannelRole::DynodeSum))
        );

        let mut invalid = event(0.2, 0.2, None);
        invalid.traces[1].valid = false;
        let rejection = criteria.qualify(&invalid).expect_err("invalid trace");
        assert_eq!(rejection, Rejection::InvalidTrace(ChannelRole::AnodeXB));
        assert_eq!(rejection.key(), "invalidTrace.xb");
    }
}
