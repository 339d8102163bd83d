use super::{ChannelRiseTimeMap, RiseTimeCalibrationMap};
use crate::common::constants::RISE_TIME_MAP_SUFFIX;
use crate::domain::{ChannelRole, PspmtError, PspmtResult};
use crate::modules::aggregator::histogram::Axis;
use crate::modules::serialization::write_json_artifact;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::ErrorKind;
use std::path::Path;
use tracing::{info, warn};

pub const CALIBRATION_MAP_ARTIFACT: &str = "rise_time_maps.json";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RiseTimeMapArtifact {
    pub fallback: f64,
    pub maps: Vec<ChannelMapArtifact>,
}

/// One channel grid. `cells[ix][iy]`, `null` where no fit contributed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelMapArtifact {
    pub id: String,
    pub x_bins: usize,
    pub x_min: f64,
    pub x_max: f64,
    pub y_bins: usize,
    pub y_min: f64,
    pub y_max: f64,
    pub cells: Vec<Vec<Option<f64>>>,
}

impl ChannelMapArtifact {
    fn from_map(channel: ChannelRole, map: &ChannelRiseTimeMap) -> Self {
        let x_axis = map.x_axis();
        let y_axis = map.y_axis();
        Self {
            id: format!("{}{}", channel.as_str(), RISE_TIME_MAP_SUFFIX),
            x_bins: x_axis.bins(),
            x_min: x_axis.low(),
            x_max: x_axis.high(),
            y_bins: y_axis.bins(),
            y_min: y_axis.low(),
            y_max: y_axis.high(),
            cells: map
                .cells()
                .chunks(y_axis.bins())
                .map(|column| column.to_vec())
                .collect(),
        }
    }

    fn channel(&self) -> PspmtResult<ChannelRole> {
        let key = self.id.strip_suffix(RISE_TIME_MAP_SUFFIX).ok_or_else(|| {
            PspmtError::invalid_channel(
                "CALIBRATION.MAP_ID",
                format!("map id '{}' does not end in '{RISE_TIME_MAP_SUFFIX}'", self.id),
            )
        })?;
        ChannelRole::from_key(key)
    }

    fn into_map(self) -> PspmtResult<(ChannelRole, ChannelRiseTimeMap)> {
        let channel = self.channel()?;
        let x_axis = Axis::new(self.x_bins, self.x_min, self.x_max)?;
        let y_axis = Axis::new(self.y_bins, self.y_min, self.y_max)?;
        if self.cells.len() != self.x_bins
            || self.cells.iter().any(|column| column.len() != self.y_bins)
        {
            return Err(PspmtError::input_validation(
                "CALIBRATION.GRID_SHAPE",
                format!("map '{}' cells do not match its bin counts", self.id),
            ));
        }
        let cells = self.cells.into_iter().flatten().collect();
        Ok((channel, ChannelRiseTimeMap::from_cells(x_axis, y_axis, cells)?))
    }
}

impl RiseTimeMapArtifact {
    pub fn from_map(map: &RiseTimeCalibrationMap) -> Self {
        Self {
            fallback: map.fallback(),
            maps: map
                .channels()
                .map(|(channel, grid)| ChannelMapArtifact::from_map(channel, grid))
                .collect(),
        }
    }

    /// Rebuilds the map. The caller's `fallback` takes precedence over the recorded one.
    pub fn into_map(self, fallback: f64) -> PspmtResult<RiseTimeCalibrationMap> {
        let mut map = RiseTimeCalibrationMap::new(fallback);
        for entry in self.maps {
            let (channel, grid) = entry.into_map()?;
            map.insert(channel, grid);
        }
        Ok(map)
    }
}

pub fn save_calibration_map(path: &Path, map: &RiseTimeCalibrationMap) -> PspmtResult<()> {
    write_json_artifact(path, &RiseTimeMapArtifact::from_map(map))
        .map_err(|error| PspmtError::io_system("IO.CALIBRATION_MAP_WRITE", error.to_string()))
}

/// Loads a map artifact. A missing file is not an error: it is logged as a
/// warning and an empty map is returned, so every lookup yields `fallback`.
pub fn load_calibration_map(path: &Path, fallback: f64) -> PspmtResult<RiseTimeCalibrationMap> {
    let source = match fs::read_to_string(path) {
        Ok(source) => source,
        Err(error) if error.kind() == ErrorKind::NotFound => {
            let unavailable = PspmtError::calibration_map_unavailable(
                "IO.CALIBRATION_MAP",
                format!(
                    "calibration map '{}' not found; rise-time seeds fall back to {fallback}",
                    path.display()
                ),
            );
            warn!("{}", unavailable.diagnostic_line());
            return Ok(RiseTimeCalibrationMap::new(fallback));
        }
        Err(error) => {
            return Err(PspmtError::io_system(
                "IO.CALIBRATION_MAP_READ",
                format!("failed to read calibration map '{}': {error}", path.display()),
            ));
        }
    };

    let artifact: RiseTimeMapArtifact = serde_json::from_str(&source).map_err(|error| {
        PspmtError::input_validation(
            "INPUT.CALIBRATION_MAP",
            format!("failed to parse calibration map '{}': {error}", path.display()),
        )
    })?;
    let map = artifact.into_map(fallback)?;
    info!(
        path = %path.display(),
        channels = map.channels().count(),
        "loaded calibration map"
    );
    Ok(map)
}
