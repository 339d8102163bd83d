//! Fixed-width binned accumulators.
//!
//! Bin `i` of an axis covers `[low + i·w, low + (i+1)·w)`; values below `low`
//! or at/above `high` land in underflow/overflow and never in a bin.

use crate::domain::{PspmtError, PspmtResult};
use crate::numerics::stable_sum;
use serde::{Deserialize, Serialize};
use std::ops::Range;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Axis {
    bins: usize,
    low: f64,
    high: f64,
}

impl Axis {
    pub fn new(bins: usize, low: f64, high: f64) -> PspmtResult<Self> {
        if bins == 0 || !low.is_finite() || !high.is_finite() || high <= low {
            return Err(PspmtError::input_validation(
                "HIST.AXIS",
                format!("invalid axis: {bins} bins over [{low}, {high})"),
            ));
        }
        Ok(Self { bins, low, high })
    }

    pub const fn bins(&self) -> usize {
        self.bins
    }

    pub const fn low(&self) -> f64 {
        self.low
    }

    pub const fn high(&self) -> f64 {
        self.high
    }

    pub fn width(&self) -> f64 {
        (self.high - self.low) / self.bins as f64
    }

    /// Unbounded bin coordinate; negative for underflow, `>= bins` for overflow.
    pub fn raw_index(&self, value: f64) -> Option<i64> {
        if !value.is_finite() {
            return None;
        }
        let scaled = self.bins as f64 * (value - self.low) / (self.high - self.low);
        Some(scaled.floor() as i64)
    }

    pub fn find_bin(&self, value: f64) -> Option<usize> {
        self.raw_index(value)
            .filter(|index| (0..self.bins as i64).contains(index))
            .map(|index| index as usize)
    }

    /// Bin holding `value`, with values beyond the edges pinned to the first or last bin.
    pub fn clamped_bin(&self, value: f64) -> Option<usize> {
        self.raw_index(value)
            .map(|index| index.clamp(0, self.bins as i64 - 1) as usize)
    }

    /// Bins from the one holding `low` up to, not including, the one holding `high`.
    pub fn bin_range(&self, low: f64, high: f64) -> Range<usize> {
        let clamp = |value: f64| {
            self.raw_index(value)
                .map_or(0, |index| index.clamp(0, self.bins as i64) as usize)
        };
        let start = clamp(low);
        let end = clamp(high).max(start);
        start..end
    }

    pub fn bin_center(&self, bin: usize) -> f64 {
        self.low + (bin as f64 + 0.5) * self.width()
    }

    fn ensure_same(&self, other: &Axis, what: &str) -> PspmtResult<()> {
        if self != other {
            return Err(PspmtError::input_validation(
                "HIST.MERGE_SHAPE",
                format!("cannot merge {what} with different binning"),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Histogram1D {
    axis: Axis,
    counts: Vec<f64>,
    underflow: f64,
    overflow: f64,
    entries: u64,
}

impl Histogram1D {
    pub fn new(axis: Axis) -> Self {
        Self {
            axis,
            counts: vec![0.0; axis.bins()],
            underflow: 0.0,
            overflow: 0.0,
            entries: 0,
        }
    }

    pub fn axis(&self) -> &Axis {
        &self.axis
    }

    pub fn fill(&mut self, value: f64) {
        self.entries += 1;
        match self.axis.raw_index(value) {
            Some(index) if index < 0 => self.underflow += 1.0,
            Some(index) if index >= self.axis.bins() as i64 => self.overflow += 1.0,
            Some(index) => self.counts[index as usize] += 1.0,
            None => {}
        }
    }

    pub fn content(&self, bin: usize) -> f64 {
        self.counts.get(bin).copied().unwrap_or(0.0)
    }

    /// Every fill, including under/overflow and non-finite values.
    pub const fn entries(&self) -> u64 {
        self.entries
    }

    pub fn underflow(&self) -> f64 {
        self.underflow
    }

    pub fn overflow(&self) -> f64 {
        self.overflow
    }

    pub fn integral(&self, bins: Range<usize>) -> f64 {
        let end = bins.end.min(self.counts.len());
        let start = bins.start.min(end);
        stable_sum(&self.counts[start..end])
    }

    pub fn merge(&mut self, other: &Histogram1D) -> PspmtResult<()> {
        self.axis.ensure_same(&other.axis, "histograms")?;
        for (lhs, rhs) in self.counts.iter_mut().zip(&other.counts) {
            *lhs += rhs;
        }
        self.underflow += other.underflow;
        self.overflow += other.overflow;
        self.entries += other.entries;
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Histogram2D {
    x_axis: Axis,
    y_axis: Axis,
    counts: Vec<f64>,
    outside: f64,
    entries: u64,
}

impl Histogram2D {
    pub fn new(x_axis: Axis, y_axis: Axis) -> Self {
        Self {
            x_axis,
            y_axis,
            counts: vec![0.0; x_axis.bins() * y_axis.bins()],
            outside: 0.0,
            entries: 0,
        }
    }

    pub fn x_axis(&self) -> &Axis {
        &self.x_axis
    }

    pub fn y_axis(&self) -> &Axis {
        &self.y_axis
    }

    pub fn fill(&mut self, x: f64, y: f64) {
        self.entries += 1;
        match (self.x_axis.find_bin(x), self.y_axis.find_bin(y)) {
            (Some(ix), Some(iy)) => self.counts[ix * self.y_axis.bins() + iy] += 1.0,
            _ => self.outside += 1.0,
        }
    }

    pub fn content(&self, ix: usize, iy: usize) -> f64 {
        if ix >= self.x_axis.bins() || iy >= self.y_axis.bins() {
            return 0.0;
        }
        self.counts[ix * self.y_axis.bins() + iy]
    }

    pub const fn entries(&self) -> u64 {
        self.entries
    }

    /// Fills that landed outside the binned area on either axis.
    pub fn outside(&self) -> f64 {
        self.outside
    }

    /// Total content over the inclusive bin rectangle `x_bins × y_bins`.
    pub fn sum_over(&self, x_bins: Range<usize>, y_bins: Range<usize>) -> f64 {
        let mut cells = Vec::new();
        for ix in x_bins.start..x_bins.end.min(self.x_axis.bins()) {
            for iy in y_bins.start..y_bins.end.min(self.y_axis.bins()) {
                let value = self.counts[ix * self.y_axis.bins() + iy];
                if value != 0.0 {
                    cells.push(value);
                }
            }
        }
        stable_sum(&cells)
    }

    pub fn merge(&mut self, other: &Histogram2D) -> PspmtResult<()> {
        self.x_axis.ensure_same(&other.x_axis, "histograms")?;
        self.y_axis.ensure_same(&other.y_axis, "histograms")?;
        for (lhs, rhs) in self.counts.iter_mut().zip(&other.counts) {
            *lhs += rhs;
        }
        self.outside += other.outside;
        self.entries += other.entries;
        Ok(())
    }
}

/// Running moments of the values filled into one profile bin.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct BinStatistics {
    pub entries: f64,
    pub sum: f64,
    pub sum_squares: f64,
}

impl BinStatistics {
    fn add(&mut self, value: f64) {
        self.entries += 1.0;
        self.sum += value;
        self.sum_squares += value * value;
    }

    fn absorb(&mut self, other: &BinStatistics) {
        self.entries += other.entries;
        self.sum += other.sum;
        self.sum_squares += other.sum_squares;
    }

    pub fn is_empty(&self) -> bool {
        self.entries == 0.0
    }

    pub fn mean(&self) -> Option<f64> {
        (!self.is_empty()).then(|| self.sum / self.entries)
    }

    pub fn spread(&self) -> f64 {
        match self.mean() {
            Some(mean) => (self.sum_squares / self.entries - mean * mean).max(0.0).sqrt(),
            None => 0.0,
        }
    }

    /// Error on the mean; zero below two entries.
    pub fn error(&self) -> f64 {
        if self.entries < 2.0 {
            0.0
        } else {
            self.spread() / self.entries.sqrt()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfilePoint {
    pub center: f64,
    pub mean: f64,
    pub error: f64,
    pub entries: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Profile1D {
    axis: Axis,
    bins: Vec<BinStatistics>,
    entries: u64,
}

impl Profile1D {
    pub fn new(axis: Axis) -> Self {
        Self {
            axis,
            bins: vec![BinStatistics::default(); axis.bins()],
            entries: 0,
        }
    }

    pub fn axis(&self) -> &Axis {
        &self.axis
    }

    pub fn fill(&mut self, x: f64, value: f64) {
        self.entries += 1;
        if let Some(bin) = self.axis.find_bin(x) {
            self.bins[bin].add(value);
        }
    }

    pub fn bin(&self, bin: usize) -> Option<&BinStatistics> {
        self.bins.get(bin)
    }

    pub const fn entries(&self) -> u64 {
        self.entries
    }

    /// Populated bins as (center, mean, error, entries).
    pub fn points(&self) -> Vec<ProfilePoint> {
        self.bins
            .iter()
            .enumerate()
            .filter_map(|(bin, statistics)| {
                statistics.mean().map(|mean| ProfilePoint {
                    center: self.axis.bin_center(bin),
                    mean,
                    error: statistics.error(),
                    entries: statistics.entries,
                })
            })
            .collect()
    }

    pub fn merge(&mut self, other: &Profile1D) -> PspmtResult<()> {
        self.axis.ensure_same(&other.axis, "profiles")?;
        for (lhs, rhs) in self.bins.iter_mut().zip(&other.bins) {
            lhs.absorb(rhs);
        }
        self.entries += other.entries;
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Profile2D {
    x_axis: Axis,
    y_axis: Axis,
    bins: Vec<BinStatistics>,
    entries: u64,
}

impl Profile2D {
    pub fn new(x_axis: Axis, y_axis: Axis) -> Self {
        Self {
            x_axis,
            y_axis,
            bins: vec![BinStatistics::default(); x_axis.bins() * y_axis.bins()],
            entries: 0,
        }
    }

    pub fn x_axis(&self) -> &Axis {
        &self.x_axis
    }

    pub fn y_axis(&self) -> &Axis {
        &self.y_axis
    }

    pub fn fill(&mut self, x: f64, y: f64, value: f64) {
        self.entries += 1;
        if let (Some(ix), Some(iy)) = (self.x_axis.find_bin(x), self.y_axis.find_bin(y)) {
            self.bins[ix * self.y_axis.bins() + iy].add(value);
        }
    }

    pub fn bin(&self, ix: usize, iy: usize) -> Option<&BinStatistics> {
        if ix >= self.x_axis.bins() || iy >= self.y_axis.bins() {
            return None;
        }
        self.bins.get(ix * self.y_axis.bins() + iy)
    }

    pub const fn entries(&self) -> u64 {
        self.entries
    }

    pub fn populated_bins(&self) -> usize {
        self.bins.iter().filter(|bin| !bin.is_empty()).count()
    }

    /// Collapses the y axis, pooling the moments of every bin in each column.
    pub fn profile_x(&self) -> Profile1D {
        let mut projection = Profile1D::new(self.x_axis);
        for ix in 0..self.x_axis.bins() {
            for iy in 0..self.y_axis.bins() {
                projection.bins[ix].absorb(&self.bins[ix * self.y_axis.bins() + iy]);
            }
        }
        projection.entries = self.entries;
        projection
    }

    pub fn merge(&mut self, other: &Profile2D) -> PspmtResult<()> {
        self.x_axis.ensure_same(&other.x_axis, "profiles")?;
        self.y_axis.ensure_same(&other.y_axis, "profiles")?;
        for (lhs, rhs) in self.bins.iter_mut().zip(&other.bins) {
            lhs.absorb(rhs);
        }
        self.entries += other.entries;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::{Axis, Histogram1D, Histogram2D, Profile1D, Profile2D};
    use crate::domain::PspmtErrorCategory;

    fn axis(bins: usize, low: f64, high: f64) -> Axis {
        Axis::new(bins, low, high).expect("axis should be valid")
    }

    #[test]
    fn bins_are_half_open() {
        let axis = axis(10, 0.0, 1.0);
        assert_eq!(axis.find_bin(0.0), Some(0));
        assert_eq!(axis.find_bin(0.15), Some(1));
        assert_eq!(axis.find_bin(0.999), Some(9));
        assert_eq!(axis.find_bin(1.0), None);
        assert_eq!(axis.find_bin(-0.01), None);
        assert_eq!(axis.clamped_bin(1.0), Some(9));
        assert_eq!(axis.clamped_bin(-3.0), Some(0));
        assert_eq!(axis.clamped_bin(f64::NAN), None);
        assert!((axis.bin_center(2) - 0.25).abs() < 1.0e-12);
    }

    #[test]
    fn invalid_axes_are_rejected() {
        for (bins, low, high) in [(0, 0.0, 1.0), (5, 1.0, 1.0), (5, 0.0, f64::NAN)] {
            let error = Axis::new(bins, low, high).expect_err("axis should be rejected");
            assert_eq!(error.category(), PspmtErrorCategory::InputValidation);
        }
    }

    #[test]
    fn position_grids_agree_on_region_edges() {
        let fine = axis(500, 0.0, 0.5);
        let coarse = axis(50, 0.0, 0.5);
        for position in [0.1, 0.15, 0.2, 0.3, 0.4] {
            let fine_bin = fine.find_bin(position).expect("inside");
            let coarse_bin = coarse.find_bin(position).expect("inside");
            assert_eq!(fine_bin / 10, coarse_bin, "position {position}");
        }
        assert_eq!(fine.find_bin(0.1), Some(100));
        assert_eq!(fine.find_bin(0.4), Some(400));
    }

    #[test]
    fn bin_range_stops_before_the_upper_value_bin() {
        let axis = axis(3000, 1.0, 4.0);
        assert_eq!(axis.bin_range(1.0, 1.1), 0..100);
        assert_eq!(axis.bin_range(2.0, 3.0), 1000..2000);
        assert_eq!(axis.bin_range(3.0, 4.0), 2000..3000);
        assert_eq!(axis.bin_range(0.0, 9.0), 0..3000);
    }

    #[test]
    fn histogram_counts_entries_including_overflow() {
        let mut histogram = Histogram1D::new(axis(4, 0.0, 4.0));
        for value in [0.5, 1.5, 1.7, 3.9, 4.0, -1.0] {
            histogram.fill(value);
        }
        assert_eq!(histogram.entries(), 6);
        assert_eq!(histogram.content(1), 2.0);
        assert_eq!(histogram.overflow(), 1.0);
        assert_eq!(histogram.underflow(), 1.0);
        assert_eq!(histogram.integral(0..4), 4.0);
        assert_eq!(histogram.integral(1..2), 2.0);
    }

    #[test]
    fn histogram_2d_sums_rectangles() {
        let mut histogram = Histogram2D::new(axis(5, 0.0, 0.5), axis(5, 0.0, 0.5));
        histogram.fill(0.05, 0.05);
        histogram.fill(0.25, 0.25);
        histogram.fill(0.25, 0.26);
        histogram.fill(0.6, 0.1);

        assert_eq!(histogram.entries(), 4);
        assert_eq!(histogram.outside(), 1.0);
        assert_eq!(histogram.content(2, 2), 2.0);
        assert_eq!(histogram.sum_over(0..5, 0..5), 3.0);
        assert_eq!(histogram.sum_over(1..5, 1..5), 2.0);
    }

    #[test]
    fn profile_reports_mean_and_error_of_mean() {
        let mut profile = Profile1D::new(axis(2, 0.0, 2.0));
        for value in [1.0, 2.0, 3.0, 4.0] {
            profile.fill(0.5, value);
        }
        profile.fill(1.5, 7.0);

        let points = profile.points();
        assert_eq!(points.len(), 2);
        assert_eq!(points[0].mean, 2.5);
        let spread = 1.25_f64.sqrt();
        assert!((points[0].error - spread / 2.0).abs() < 1.0e-12);
        assert_eq!(points[1].mean, 7.0);
        assert_eq!(points[1].error, 0.0);
    }

    #[test]
    fn profile_x_pools_moments_across_y() {
        let mut profile = Profile2D::new(axis(2, 0.0, 1.0), axis(2, 0.0, 1.0));
        profile.fill(0.25, 0.25, 1.0);
        profile.fill(0.25, 0.75, 3.0);
        profile.fill(0.75, 0.75, 5.0);

        let projection = profile.profile_x();
        let points = projection.points();
        assert_eq!(points.len(), 2);
        assert_eq!(points[0].mean, 2.0);
        assert_eq!(points[0].entries, 2.0);
        assert_eq!(points[1].mean, 5.0);
        assert_eq!(profile.populated_bins(), 3);
    }

    #[test]
    fn merge_matches_filling_a_single_accumulator() {
        let x = axis(10, 0.0, 0.5);
        let mut combined = Profile2D::new(x, x);
        let mut left = Profile2D::new(x, x);
        let mut right = Profile2D::new(x, x);
        let fills = [(0.12, 0.31, 2.0), (0.12, 0.31, 4.0), (0.44, 0.02, 1.5)];
        for (index, &(px, py, value)) in fills.iter().enumerate() {
            combined.fill(px, py, value);
            if index % 2 == 0 {
                left.fill(px, py, value);
            } else {
                right.fill(px, py, value);
            }
        }
        left.merge(&right).expect("same binning should merge");
        assert_eq!(left, combined);

        let mut other = Profile2D::new(axis(5, 0.0, 0.5), x);
        let error = other.merge(&combined).expect_err("shapes differ");
        assert_eq!(error.category(), PspmtErrorCategory::InputValidation);
    }
}
