//! Per-channel position accumulators over the fitted anode parameters, and
//! their end-of-run summaries.

pub mod histogram;

use self::histogram::{Axis, Histogram1D, Histogram2D, Profile1D, Profile2D, ProfilePoint};
use super::pipeline::EventRecord;
use super::rise_power::{QuarticTrend, RisePowerPolynomial};
use crate::common::config::{AggregationSettings, RisePowerRange};
use crate::domain::{ChannelRole, EventPosition, PspmtResult};
use crate::numerics::{
    FitParameter, FitQuality, LeastSquaresProblem, MinimizerSettings, ParametricModel, minimize,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, warn};

/// Binned views of one anode channel.
#[derive(Debug, Clone, PartialEq)]
pub struct PositionHistogramSet {
    pub decay_vs_x: Histogram2D,
    pub decay_vs_y: Histogram2D,
    pub rise_vs_x: Histogram2D,
    pub rise_vs_y: Histogram2D,
    pub decay_profile_x: Profile1D,
    pub decay_profile_y: Profile1D,
    pub rise_profile_x: Profile1D,
    pub rise_profile_y: Profile1D,
    pub decay_map: Profile2D,
    pub rise_time_map: Profile2D,
    pub rise_power_map: Profile2D,
    pub hit_counts: Histogram2D,
    pub rise_power: Histogram1D,
    /// Rise power over the region of interest only.
    pub filtered_rise_power: Profile2D,
}

impl PositionHistogramSet {
    pub fn new(settings: &AggregationSettings) -> PspmtResult<Self> {
        let position = Axis::new(
            settings.position_bins,
            settings.position_min,
            settings.position_max,
        )?;
        let profile = Axis::new(
            settings.profile_bins,
            settings.position_min,
            settings.position_max,
        )?;
        let decay = Axis::new(settings.decay_bins, 0.0, settings.decay_max)?;
        let rise = Axis::new(settings.rise_bins, 0.0, settings.rise_max)?;
        let power = Axis::new(
            settings.rise_power_bins,
            settings.rise_power_min,
            settings.rise_power_max,
        )?;
        let region = Axis::new(settings.region_bins, settings.region_min, settings.region_max)?;

        Ok(Self {
            decay_vs_x: Histogram2D::new(position, decay),
            decay_vs_y: Histogram2D::new(position, decay),
            rise_vs_x: Histogram2D::new(position, rise),
            rise_vs_y: Histogram2D::new(position, rise),
            decay_profile_x: Profile1D::new(profile),
            decay_profile_y: Profile1D::new(profile),
            rise_profile_x: Profile1D::new(profile),
            rise_profile_y: Profile1D::new(profile),
            decay_map: Profile2D::new(position, position),
            rise_time_map: Profile2D::new(position, position),
            rise_power_map: Profile2D::new(position, position),
            hit_counts: Histogram2D::new(position, position),
            rise_power: Histogram1D::new(power),
            filtered_rise_power: Profile2D::new(region, region),
        })
    }

    fn fill(
        &mut self,
        position: EventPosition,
        decay: f64,
        rise: f64,
        power: f64,
        settings: &AggregationSettings,
    ) {
        let EventPosition { x, y } = position;
        self.decay_vs_x.fill(x, decay);
        self.decay_vs_y.fill(y, decay);
        self.rise_vs_x.fill(x, rise);
        self.rise_vs_y.fill(y, rise);
        self.decay_profile_x.fill(x, decay);
        self.decay_profile_y.fill(y, decay);
        self.rise_profile_x.fill(x, rise);
        self.rise_profile_y.fill(y, rise);
        self.decay_map.fill(x, y, decay);
        self.rise_time_map.fill(x, y, rise);
        self.rise_power_map.fill(x, y, power);
        self.hit_counts.fill(x, y);
        self.rise_power.fill(power);
        if position.within(settings.region_min, settings.region_max) {
            self.filtered_rise_power.fill(x, y, power);
        }
    }

    fn merge(&mut self, other: &PositionHistogramSet) -> PspmtResult<()> {
        self.decay_vs_x.merge(&other.decay_vs_x)?;
        self.decay_vs_y.merge(&other.decay_vs_y)?;
        self.rise_vs_x.merge(&other.rise_vs_x)?;
        self.rise_vs_y.merge(&other.rise_vs_y)?;
        self.decay_profile_x.merge(&other.decay_profile_x)?;
        self.decay_profile_y.merge(&other.decay_profile_y)?;
        self.rise_profile_x.merge(&other.rise_profile_x)?;
        self.rise_profile_y.merge(&other.rise_profile_y)?;
        self.decay_map.merge(&other.decay_map)?;
        self.rise_time_map.merge(&other.rise_time_map)?;
        self.rise_power_map.merge(&other.rise_power_map)?;
        self.hit_counts.merge(&other.hit_counts)?;
        self.rise_power.merge(&other.rise_power)?;
        self.filtered_rise_power.merge(&other.filtered_rise_power)
    }

    /// Hit counts over the whole grid against those inside the region of interest.
    pub fn region_statistics(&self, region_min: f64, region_max: f64) -> RegionStatistics {
        let total_events = self.hit_counts.entries();
        let x_axis = self.hit_counts.x_axis();
        let y_axis = self.hit_counts.y_axis();
        let inclusive = |axis: &Axis| {
            match (axis.clamped_bin(region_min), axis.clamped_bin(region_max)) {
                (Some(low), Some(high)) => low..high + 1,
                _ => 0..0,
            }
        };
        let filtered_events = self.hit_counts.sum_over(inclusive(x_axis), inclusive(y_axis));

        RegionStatistics {
            total_events,
            filtered_events,
            percentage: percentage(filtered_events, total_events),
            outside_grid: self.hit_counts.outside(),
        }
    }

    pub fn range_statistics(&self, range: &RisePowerRange) -> RangeStatistics {
        let bins = self.rise_power.axis().bin_range(range.low, range.high);
        let count = self.rise_power.integral(bins);
        RangeStatistics {
            label: range.label.clone(),
            low: range.low,
            high: range.high,
            count,
            percentage: percentage(count, self.rise_power.entries()),
        }
    }
}

fn percentage(count: f64, total: u64) -> f64 {
    if total == 0 {
        0.0
    } else {
        100.0 * count / total as f64
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegionStatistics {
    pub total_events: u64,
    pub filtered_events: f64,
    pub percentage: f64,
    /// Hits whose position fell off the binned grid.
    pub outside_grid: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RangeStatistics {
    pub label: String,
    pub low: f64,
    pub high: f64,
    pub count: f64,
    pub percentage: f64,
}

/// Rise-power polynomial re-fitted from the region-of-interest x projection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DerivedPolynomial {
    pub coefficients: RisePowerPolynomial,
    pub uncertainties: Option<RisePowerPolynomial>,
    pub quality: FitQuality,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelSummary {
    pub channel: ChannelRole,
    pub region: RegionStatistics,
    pub rise_power_ranges: Vec<RangeStatistics>,
    /// Fits with a rise power below or above the histogrammed range.
    pub rise_power_underflow: f64,
    pub rise_power_overflow: f64,
    pub decay_profile_x: Vec<ProfilePoint>,
    pub decay_profile_y: Vec<ProfilePoint>,
    pub rise_profile_x: Vec<ProfilePoint>,
    pub rise_profile_y: Vec<ProfilePoint>,
    pub rise_power_profile_x: Vec<ProfilePoint>,
    pub polynomial: Option<DerivedPolynomial>,
}

/// Accumulates every anode fit of a pass. Partial aggregators built over
/// disjoint event subsets can be merged into one.
#[derive(Debug, Clone, PartialEq)]
pub struct PositionAggregator {
    settings: AggregationSettings,
    channels: BTreeMap<ChannelRole, PositionHistogramSet>,
    records: u64,
}

impl PositionAggregator {
    pub fn new(settings: &AggregationSettings) -> PspmtResult<Self> {
        let mut channels = BTreeMap::new();
        for channel in ChannelRole::ANODES {
            channels.insert(channel, PositionHistogramSet::new(settings)?);
        }
        Ok(Self {
            settings: settings.clone(),
            channels,
            records: 0,
        })
    }

    pub fn settings(&self) -> &AggregationSettings {
        &self.settings
    }

    pub const fn records(&self) -> u64 {
        self.records
    }

    pub fn accumulate(&mut self, record: &EventRecord) {
        self.records += 1;
        for (channel, fit) in &record.anodes {
            let Some(set) = self.channels.get_mut(channel) else {
                continue;
            };
            set.fill(
                record.position,
                fit.parameters.decay_constant,
                fit.parameters.rise_time_constant,
                fit.parameters.rise_power,
                &self.settings,
            );
        }
    }

    pub fn merge(&mut self, other: &PositionAggregator) -> PspmtResult<()> {
        for (channel, set) in &other.channels {
            match self.channels.get_mut(channel) {
                Some(existing) => existing.merge(set)?,
                None => {
                    self.channels.insert(*channel, set.clone());
                }
            }
        }
        self.records += other.records;
        Ok(())
    }

    pub fn channel(&self, channel: ChannelRole) -> Option<&PositionHistogramSet> {
        self.channels.get(&channel)
    }

    /// Dense rise-time profile the calibration map is rebinned from.
    pub fn rise_time_profile(&self, channel: ChannelRole) -> Option<&Profile2D> {
        self.channels.get(&channel).map(|set| &set.rise_time_map)
    }

    pub fn finalize(&self, minimizer: &MinimizerSettings) -> Vec<ChannelSummary> {
        self.channels
            .iter()
            .map(|(channel, set)| self.summarize(*channel, set, minimizer))
            .collect()
    }

    fn summarize(
        &self,
        channel: ChannelRole,
        set: &PositionHistogramSet,
        minimizer: &MinimizerSettings,
    ) -> ChannelSummary {
        let settings = &self.settings;
        let rise_power_profile_x = set.filtered_rise_power.profile_x().points();
        let polynomial = self.fit_polynomial(channel, &rise_power_profile_x, minimizer);

        ChannelSummary {
            channel,
            region: set.region_statistics(settings.region_min, settings.region_max),
            rise_power_ranges: settings
                .rise_power_ranges
                .iter()
                .map(|range| set.range_statistics(range))
                .collect(),
            rise_power_underflow: set.rise_power.underflow(),
            rise_power_overflow: set.rise_power.overflow(),
            decay_profile_x: set.decay_profile_x.points(),
            decay_profile_y: set.decay_profile_y.points(),
            rise_profile_x: set.rise_profile_x.points(),
            rise_profile_y: set.rise_profile_y.points(),
            rise_power_profile_x,
            polynomial,
        }
    }

    fn fit_polynomial(
        &self,
        channel: ChannelRole,
        points: &[ProfilePoint],
        minimizer: &MinimizerSettings,
    ) -> Option<DerivedPolynomial> {
        let trend = QuarticTrend;
        if points.len() <= trend.parameter_count() {
            warn!(
                channel = %channel,
                points = points.len(),
                "too few populated bins to re-derive the rise-power polynomial"
            );
            return None;
        }

        let x: Vec<f64> = points.iter().map(|point| point.center).collect();
        let y: Vec<f64> = points.iter().map(|point| point.mean).collect();
        // Single-entry bins carry no spread; give them the tightest measured error.
        let floor = points
            .iter()
            .map(|point| point.error)
            .filter(|error| *error > 0.0)
            .fold(f64::INFINITY, f64::min);
        let floor = if floor.is_finite() { floor } else { 1.0 };
        let sigma: Vec<f64> = points
            .iter()
            .map(|point| if point.error > 0.0 { point.error } else { floor })
            .collect();
        let parameters = self
            .settings
            .polynomial_seed
            .iter()
            .map(|value| FitParameter::free(*value))
            .collect();

        let fit = LeastSquaresProblem::new(&trend, &x, &y, parameters)
            .and_then(|problem| problem.with_sigma(&sigma))
            .and_then(|problem| minimize(&problem, minimizer));
        let fit = match fit {
            Ok(fit) => fit,
            Err(error) => {
                warn!(channel = %channel, %error, "rise-power polynomial fit could not be set up");
                return None;
            }
        };
        if !fit.quality.converged() {
            warn!(
                channel = %channel,
                termination = ?fit.quality.termination,
                "rise-power polynomial fit did not converge"
            );
            return None;
        }

        let coefficients = polynomial_from(&fit.parameters);
        debug!(channel = %channel, ?coefficients, "rise-power polynomial re-derived");
        Some(DerivedPolynomial {
            coefficients,
            uncertainties: fit.uncertainties.as_deref().map(polynomial_from),
            quality: fit.quality,
        })
    }
}

fn polynomial_from(values: &[f64]) -> RisePowerPolynomial {
    RisePowerPolynomial::new(values[0], values[1], values[2], values[3], values[4], values[5])
}
