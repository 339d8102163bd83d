pub mod errors;

pub use errors::{FitResult, PspmtError, PspmtErrorCategory, PspmtResult, Severity};

use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

/// Readout channel of the PSPMT. The four anodes encode position, the dynode
/// carries the summed timing/energy signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ChannelRole {
    #[serde(rename = "xa")]
    AnodeXA,
    #[serde(rename = "xb")]
    AnodeXB,
    #[serde(rename = "ya")]
    AnodeYA,
    #[serde(rename = "yb")]
    AnodeYB,
    #[serde(rename = "dynode")]
    DynodeSum,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PositionAxis {
    X,
    Y,
}

pub const ANODE_SUBTYPE: &str = "anode_high";
pub const DYNODE_SUBTYPE: &str = "dynode_high";

impl ChannelRole {
    pub const ALL: [ChannelRole; 5] = [
        Self::AnodeXA,
        Self::AnodeXB,
        Self::AnodeYA,
        Self::AnodeYB,
        Self::DynodeSum,
    ];

    pub const ANODES: [ChannelRole; 4] = [
        Self::AnodeXA,
        Self::AnodeXB,
        Self::AnodeYA,
        Self::AnodeYB,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::AnodeXA => "xa",
            Self::AnodeXB => "xb",
            Self::AnodeYA => "ya",
            Self::AnodeYB => "yb",
            Self::DynodeSum => "dynode",
        }
    }

    pub const fn is_anode(self) -> bool {
        !matches!(self, Self::DynodeSum)
    }

    /// Position axis the channel is read out along; `None` for the dynode.
    pub const fn axis(self) -> Option<PositionAxis> {
        match self {
            Self::AnodeXA | Self::AnodeXB => Some(PositionAxis::X),
            Self::AnodeYA | Self::AnodeYB => Some(PositionAxis::Y),
            Self::DynodeSum => None,
        }
    }

    /// Number of free-or-fixed parameters of the pulse model fitted to this channel.
    pub const fn parameter_count(self) -> usize {
        if self.is_anode() { 6 } else { 9 }
    }

    /// Digitizer channel number of the high-gain anode readout.
    pub const fn hardware_channel(self) -> Option<u32> {
        match self {
            Self::AnodeXA => Some(4),
            Self::AnodeYB => Some(5),
            Self::AnodeYA => Some(6),
            Self::AnodeXB => Some(7),
            Self::DynodeSum => None,
        }
    }

    pub fn from_key(key: &str) -> PspmtResult<Self> {
        Self::ALL
            .into_iter()
            .find(|role| role.as_str().eq_ignore_ascii_case(key.trim()))
            .ok_or_else(|| {
                PspmtError::invalid_channel(
                    "INPUT.CHANNEL_KEY",
                    format!("unrecognized channel key '{}'", key),
                )
            })
    }

    /// Resolves a device entry of the decoded event into a channel role.
    pub fn from_device(subtype: &str, channel_number: u32) -> Option<Self> {
        match subtype {
            DYNODE_SUBTYPE => Some(Self::DynodeSum),
            ANODE_SUBTYPE => Self::ANODES
                .into_iter()
                .find(|role| role.hardware_channel() == Some(channel_number)),
            _ => None,
        }
    }
}

impl Display for ChannelRole {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str((*self).as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EventPosition {
    pub x: f64,
    pub y: f64,
}

impl EventPosition {
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub const fn along(&self, axis: PositionAxis) -> f64 {
        match axis {
            PositionAxis::X => self.x,
            PositionAxis::Y => self.y,
        }
    }

    pub fn within(&self, low: f64, high: f64) -> bool {
        (low..=high).contains(&self.x) && (low..=high).contains(&self.y)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TraceSample {
    pub time: f64,
    pub amplitude: f64,
}

/// Digitized trace of one channel in one event. Times are sample indices
/// (1 sample per ns).
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Waveform {
    samples: Vec<TraceSample>,
}

impl Waveform {
    pub fn from_amplitudes(amplitudes: &[f64]) -> Self {
        Self {
            samples: amplitudes
                .iter()
                .enumerate()
                .map(|(index, &amplitude)| TraceSample {
                    time: index as f64,
                    amplitude,
                })
                .collect(),
        }
    }

    pub fn from_samples(samples: Vec<TraceSample>) -> Self {
        Self { samples }
    }

    pub fn samples(&self) -> &[TraceSample] {
        &self.samples
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Splits the samples inside `window` into abscissa and ordinate vectors.
    pub fn windowed(&self, window: FitWindow) -> (Vec<f64>, Vec<f64>) {
        self.samples
            .iter()
            .filter(|sample| window.contains(sample.time))
            .map(|sample| (sample.time, sample.amplitude))
            .unzip()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FitWindow {
    pub start: f64,
    pub end: f64,
}

impl FitWindow {
    pub const fn new(start: f64, end: f64) -> Self {
        Self { start, end }
    }

    /// Window spanning `[0, N]` where `N` is the number of samples.
    pub fn full(waveform: &Waveform) -> Self {
        Self::new(0.0, waveform.len() as f64)
    }

    pub fn contains(&self, time: f64) -> bool {
        time >= self.start && time <= self.end
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TraceInput {
    pub channel: ChannelRole,
    #[serde(default = "default_true")]
    pub valid: bool,
    pub samples: Vec<f64>,
}

impl TraceInput {
    pub fn waveform(&self) -> Waveform {
        Waveform::from_amplitudes(&self.samples)
    }
}

/// High-gain / low-gain summary flags decoded alongside the traces.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GateInputs {
    pub high_gain_valid: i32,
    pub low_gain_valid: i32,
    pub high_gain_qdc: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventInput {
    pub event_number: u64,
    pub position: EventPosition,
    #[serde(default = "default_true")]
    pub selected: bool,
    #[serde(default)]
    pub gate: Option<GateInputs>,
    #[serde(default)]
    pub traces: Vec<TraceInput>,
}

impl EventInput {
    pub fn trace(&self, channel: ChannelRole) -> Option<&TraceInput> {
        self.traces.iter().find(|trace| trace.channel == channel)
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct EventBatch {
    #[serde(default)]
    pub events: Vec<EventInput>,
}

fn default_true() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::{ChannelRole, EventBatch, FitWindow, PositionAxis, PspmtErrorCategory, Waveform};

    #[test]
    fn channel_keys_round_trip_and_reject_unknown_names() {
        for role in ChannelRole::ALL {
            assert_eq!(ChannelRole::from_key(role.as_str()).expect("known key"), role);
        }
        assert_eq!(ChannelRole::from_key(" XA ").expect("case-insensitive"), ChannelRole::AnodeXA);

        let error = ChannelRole::from_key("xc").expect_err("unknown key should fail");
        assert_eq!(error.category(), PspmtErrorCategory::InvalidChannel);
    }

    #[test]
    fn device_entries_resolve_to_roles() {
        assert_eq!(ChannelRole::from_device("anode_high", 4), Some(ChannelRole::AnodeXA));
        assert_eq!(ChannelRole::from_device("anode_high", 7), Some(ChannelRole::AnodeXB));
        assert_eq!(ChannelRole::from_device("anode_high", 6), Some(ChannelRole::AnodeYA));
        assert_eq!(ChannelRole::from_device("anode_high", 5), Some(ChannelRole::AnodeYB));
        assert_eq!(ChannelRole::from_device("anode_high", 9), None);
        assert_eq!(ChannelRole::from_device("dynode_high", 0), Some(ChannelRole::DynodeSum));
        assert_eq!(ChannelRole::from_device("anode_low", 4), None);
    }

    #[test]
    fn roles_know_their_model_shape() {
        assert_eq!(ChannelRole::AnodeYA.axis(), Some(PositionAxis::Y));
        assert_eq!(ChannelRole::AnodeXB.axis(), Some(PositionAxis::X));
        assert_eq!(ChannelRole::DynodeSum.axis(), None);
        assert_eq!(ChannelRole::AnodeXA.parameter_count(), 6);
        assert_eq!(ChannelRole::DynodeSum.parameter_count(), 9);
    }

    #[test]
    fn windowed_samples_are_inclusive() {
        let waveform = Waveform::from_amplitudes(&[1.0, 2.0, 3.0, 4.0, 5.0]);
        let (times, amplitudes) = waveform.windowed(FitWindow::new(1.0, 3.0));
        assert_eq!(times, vec![1.0, 2.0, 3.0]);
        assert_eq!(amplitudes, vec![2.0, 3.0, 4.0]);

        let (all_times, _) = waveform.windowed(FitWindow::full(&waveform));
        assert_eq!(all_times.len(), 5);
    }

    #[test]
    fn event_batch_parses_with_defaults() {
        let batch: EventBatch = serde_json::from_str(
            r#"{
                "events": [
                    {
                        "eventNumber": 7,
                        "position": { "x": 0.2, "y": 0.3 },
                        "traces": [ { "channel": "xa", "samples": [1.0, 2.0] } ]
                    }
                ]
            }"#,
        )
        .expect("batch should parse");

        let event = &batch.events[0];
        assert_eq!(event.event_number, 7);
        assert!(event.selected);
        assert!(event.gate.is_none());
        let trace = event.trace(ChannelRole::AnodeXA).expect("xa trace");
        assert!(trace.valid);
        assert_eq!(trace.waveform().len(), 2);
        assert!(event.trace(ChannelRole::DynodeSum).is_none());
    }
}
