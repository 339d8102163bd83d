//! Position-dependent rise-time calibration.
//!
//! A map is built once from the pass-1 rise-time profiles, frozen, and then
//! handed by reference to the pass-2 anode fits.

mod persistence;

pub use persistence::{
    CALIBRATION_MAP_ARTIFACT, ChannelMapArtifact, RiseTimeMapArtifact, load_calibration_map,
    save_calibration_map,
};

use super::aggregator::histogram::{Axis, Profile2D};
use crate::common::constants::FALLBACK_RISE_TIME;
use crate::domain::{ChannelRole, PspmtError, PspmtResult};
use crate::numerics::{stable_sum, stable_weighted_mean};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Where an anode fit's rise-time seed came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SeedSource {
    CalibrationMap,
    /// A map was supplied but had no data for the addressed cell.
    CalibrationFallback,
    OnsetEstimate,
    /// The onset estimate was not positive and the configured default was used.
    DegenerateOnset,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RiseTimeSeed {
    pub value: f64,
    pub source: SeedSource,
}

impl RiseTimeSeed {
    pub const fn is_fallback(&self) -> bool {
        matches!(
            self.source,
            SeedSource::CalibrationFallback | SeedSource::DegenerateOnset
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MapStatistics {
    pub populated_cells: usize,
    pub mean: f64,
    pub rms: f64,
    pub min: f64,
    pub max: f64,
}

/// One channel's coarse grid of entries-weighted mean rise times.
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelRiseTimeMap {
    x_axis: Axis,
    y_axis: Axis,
    cells: Vec<Option<f64>>,
}

impl ChannelRiseTimeMap {
    pub fn from_cells(x_axis: Axis, y_axis: Axis, cells: Vec<Option<f64>>) -> PspmtResult<Self> {
        if cells.len() != x_axis.bins() * y_axis.bins() {
            return Err(PspmtError::input_validation(
                "CALIBRATION.GRID_SHAPE",
                format!(
                    "{} cells do not fill a {}x{} grid",
                    cells.len(),
                    x_axis.bins(),
                    y_axis.bins()
                ),
            ));
        }
        Ok(Self {
            x_axis,
            y_axis,
            cells,
        })
    }

    /// Groups contiguous source cells into `target_bins` per axis. Each target
    /// cell holds `Σ(meanᵢ·entriesᵢ) / Σentriesᵢ` over its group, or nothing
    /// when the group has no entries.
    pub fn rebin(profile: &Profile2D, target_bins: usize) -> PspmtResult<Self> {
        let source_x = profile.x_axis();
        let source_y = profile.y_axis();
        if target_bins == 0
            || source_x.bins() % target_bins != 0
            || source_y.bins() % target_bins != 0
        {
            return Err(PspmtError::input_validation(
                "CALIBRATION.REBIN_FACTOR",
                format!(
                    "cannot rebin a {}x{} grid into {target_bins}x{target_bins}",
                    source_x.bins(),
                    source_y.bins()
                ),
            ));
        }
        let factor_x = source_x.bins() / target_bins;
        let factor_y = source_y.bins() / target_bins;
        let x_axis = Axis::new(target_bins, source_x.low(), source_x.high())?;
        let y_axis = Axis::new(target_bins, source_y.low(), source_y.high())?;

        let mut cells = Vec::with_capacity(target_bins * target_bins);
        let mut means = Vec::with_capacity(factor_x * factor_y);
        let mut weights = Vec::with_capacity(factor_x * factor_y);
        for tx in 0..target_bins {
            for ty in 0..target_bins {
                means.clear();
                weights.clear();
                for sx in tx * factor_x..(tx + 1) * factor_x {
                    for sy in ty * factor_y..(ty + 1) * factor_y {
                        let Some(bin) = profile.bin(sx, sy) else {
                            continue;
                        };
                        if let Some(mean) = bin.mean() {
                            means.push(mean);
                            weights.push(bin.entries);
                        }
                    }
                }
                cells.push(stable_weighted_mean(&means, &weights));
            }
        }

        Self::from_cells(x_axis, y_axis, cells)
    }

    pub fn x_axis(&self) -> &Axis {
        &self.x_axis
    }

    pub fn y_axis(&self) -> &Axis {
        &self.y_axis
    }

    pub fn cell(&self, ix: usize, iy: usize) -> Option<f64> {
        if ix >= self.x_axis.bins() || iy >= self.y_axis.bins() {
            return None;
        }
        self.cells[ix * self.y_axis.bins() + iy]
    }

    pub fn cells(&self) -> &[Option<f64>] {
        &self.cells
    }

    /// Measured rise time of the cell containing `(x, y)`. Positions beyond
    /// the grid edges address the edge cells; non-positive cells count as empty.
    pub fn value_at(&self, x: f64, y: f64) -> Option<f64> {
        let ix = self.x_axis.clamped_bin(x)?;
        let iy = self.y_axis.clamped_bin(y)?;
        self.cell(ix, iy).filter(|value| *value > 0.0)
    }

    pub fn statistics(&self) -> Option<MapStatistics> {
        let populated: Vec<f64> = self.cells.iter().flatten().copied().collect();
        if populated.is_empty() {
            return None;
        }
        let count = populated.len() as f64;
        let mean = stable_sum(&populated) / count;
        let squares: Vec<f64> = populated.iter().map(|value| value * value).collect();
        let rms = (stable_sum(&squares) / count - mean * mean).max(0.0).sqrt();
        let min = populated.iter().copied().fold(f64::INFINITY, f64::min);
        let max = populated.iter().copied().fold(f64::NEG_INFINITY, f64::max);

        Some(MapStatistics {
            populated_cells: populated.len(),
            mean,
            rms,
            min,
            max,
        })
    }
}

/// Per-channel rise-time maps plus the value handed out where no map applies.
#[derive(Debug, Clone, PartialEq)]
pub struct RiseTimeCalibrationMap {
    channels: BTreeMap<ChannelRole, ChannelRiseTimeMap>,
    fallback: f64,
}

impl Default for RiseTimeCalibrationMap {
    fn default() -> Self {
        Self::new(FALLBACK_RISE_TIME)
    }
}

impl RiseTimeCalibrationMap {
    pub fn new(fallback: f64) -> Self {
        Self {
            channels: BTreeMap::new(),
            fallback,
        }
    }

    pub fn insert(&mut self, channel: ChannelRole, map: ChannelRiseTimeMap) {
        self.channels.insert(channel, map);
    }

    pub fn channel(&self, channel: ChannelRole) -> Option<&ChannelRiseTimeMap> {
        self.channels.get(&channel)
    }

    pub fn channels(&self) -> impl Iterator<Item = (ChannelRole, &ChannelRiseTimeMap)> {
        self.channels.iter().map(|(channel, map)| (*channel, map))
    }

    /// A map with no channel grids, as left behind by a missing artifact.
    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    pub const fn fallback(&self) -> f64 {
        self.fallback
    }

    pub fn lookup(&self, channel: ChannelRole, x: f64, y: f64) -> f64 {
        self.seed(channel, x, y).value
    }

    /// Rise-time seed for `(channel, x, y)`, tagged so a fallback value stays
    /// distinguishable from a measured one.
    pub fn seed(&self, channel: ChannelRole, x: f64, y: f64) -> RiseTimeSeed {
        match self
            .channels
            .get(&channel)
            .and_then(|map| map.value_at(x, y))
        {
            Some(value) => RiseTimeSeed {
                value,
                source: SeedSource::CalibrationMap,
            },
            None => RiseTimeSeed {
                value: self.fallback,
                source: SeedSource::CalibrationFallback,
            },
        }
    }

    pub fn statistics(&self) -> Vec<(ChannelRole, Option<MapStatistics>)> {
        self.channels
            .iter()
            .map(|(channel, map)| (*channel, map.statistics()))
            .collect()
    }
}
