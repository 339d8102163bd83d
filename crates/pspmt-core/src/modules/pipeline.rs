//! The two-pass rise-time calibration loop.
//!
//! Pass 1 fits every qualifying event with onset-seeded rise times and
//! aggregates the results. The dense rise-time profiles are rebinned into a
//! calibration map, which is frozen and handed to pass 2 by reference.

use super::aggregator::{ChannelSummary, PositionAggregator};
use super::anode::{AnodeFitResult, AnodeFitter};
use super::calibration::{
    CALIBRATION_MAP_ARTIFACT, ChannelRiseTimeMap, RiseTimeCalibrationMap, SeedSource,
    save_calibration_map,
};
use super::dynode::{DynodeFitResult, DynodeFitter};
use super::rise_power::RisePowerTable;
use super::serialization::{ArtifactError, write_json_artifact};
use crate::common::config::PipelineConfig;
use crate::domain::{
    ChannelRole, EventInput, EventPosition, FitWindow, PspmtError, PspmtErrorCategory,
    PspmtResult,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

pub const PASS1_EVENTS_ARTIFACT: &str = "pass1_events.json";
pub const PASS2_EVENTS_ARTIFACT: &str = "pass2_events.json";
pub const POSITION_ANALYSIS_ARTIFACT: &str = "position_fit_analysis.json";
pub const RISE_POWER_ARTIFACT: &str = "rise_power_polynomials.json";

/// Fit results of one qualifying event. Channels whose fit failed are absent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventRecord {
    pub event_number: u64,
    pub position: EventPosition,
    pub anodes: BTreeMap<ChannelRole, AnodeFitResult>,
    pub dynode: Option<DynodeFitResult>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SeedSourceCounts {
    pub calibration_map: u64,
    pub calibration_fallback: u64,
    pub onset_estimate: u64,
    pub degenerate_onset: u64,
}

impl SeedSourceCounts {
    fn record(&mut self, source: SeedSource) {
        match source {
            SeedSource::CalibrationMap => self.calibration_map += 1,
            SeedSource::CalibrationFallback => self.calibration_fallback += 1,
            SeedSource::OnsetEstimate => self.onset_estimate += 1,
            SeedSource::DegenerateOnset => self.degenerate_onset += 1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PassStatistics {
    pub events: u64,
    pub qualified: u64,
    pub records: u64,
    pub anode_fits: u64,
    pub dynode_fits: u64,
    /// Kept anode fits with a free parameter left on its bound.
    #[serde(default)]
    pub bound_limited_fits: u64,
    /// Rejected events per selection reason.
    pub rejections: BTreeMap<String, u64>,
    /// Dropped (event, channel) fits per error category.
    pub channel_failures: BTreeMap<String, u64>,
    pub seed_sources: SeedSourceCounts,
}

impl PassStatistics {
    fn record_failure(&mut self, category: PspmtErrorCategory) {
        *self
            .channel_failures
            .entry(category.as_str().to_string())
            .or_default() += 1;
    }

    pub fn failures(&self) -> u64 {
        self.channel_failures.values().sum()
    }
}

#[derive(Debug, Clone)]
pub struct PassOutput {
    pub records: Vec<EventRecord>,
    pub aggregator: PositionAggregator,
    pub statistics: PassStatistics,
}

#[derive(Debug, Clone)]
pub struct CalibrationRun {
    pub pass1_records: Vec<EventRecord>,
    pub pass1_statistics: PassStatistics,
    pub map: RiseTimeCalibrationMap,
    pub pass2: PassOutput,
    pub summaries: Vec<ChannelSummary>,
    /// Configured coefficients with every successfully re-derived channel replaced.
    pub polynomials: RisePowerTable,
}

#[derive(Debug, Clone)]
pub struct CalibrationPipeline {
    config: PipelineConfig,
}

impl CalibrationPipeline {
    pub fn new(config: PipelineConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Fits every qualifying event once. Per-channel failures are logged,
    /// counted and dropped; only failures outside the per-fit taxonomy abort.
    pub fn run_pass(
        &self,
        events: &[EventInput],
        map: Option<&RiseTimeCalibrationMap>,
    ) -> PspmtResult<PassOutput> {
        let anode_fitter = AnodeFitter::new(&self.config);
        let dynode_fitter = DynodeFitter::new(&self.config);
        let mut aggregator = PositionAggregator::new(&self.config.aggregation)?;
        let mut statistics = PassStatistics::default();
        let mut records = Vec::new();

        for event in events {
            statistics.events += 1;
            if let Err(rejection) = self.config.selection.qualify(event) {
                debug!(event = event.event_number, %rejection, "event rejected");
                *statistics.rejections.entry(rejection.key()).or_default() += 1;
                continue;
            }
            statistics.qualified += 1;

            let mut anodes = BTreeMap::new();
            for channel in ChannelRole::ANODES {
                let Some(trace) = event.trace(channel).filter(|trace| trace.valid) else {
                    continue;
                };
                let waveform = trace.waveform();
                let fit = anode_fitter
                    .fit(
                        &waveform,
                        FitWindow::full(&waveform),
                        channel,
                        Some(event.position),
                        map,
                    )
                    .and_then(AnodeFitResult::into_reliable);
                match fit {
                    Ok(fit) => {
                        statistics.anode_fits += 1;
                        if fit.quality.is_bound_limited() {
                            statistics.bound_limited_fits += 1;
                        }
                        statistics.seed_sources.record(fit.rise_time_seed.source);
                        anodes.insert(channel, fit);
                    }
                    Err(error) => {
                        skip_channel(&mut statistics, event.event_number, channel, error)?;
                    }
                }
            }

            let dynode = match event
                .trace(ChannelRole::DynodeSum)
                .filter(|trace| trace.valid)
            {
                Some(trace) => {
                    let waveform = trace.waveform();
                    match dynode_fitter
                        .fit(&waveform, FitWindow::full(&waveform))
                        .and_then(DynodeFitResult::into_reliable)
                    {
                        Ok(fit) => {
                            statistics.dynode_fits += 1;
                            Some(fit)
                        }
                        Err(error) => {
                            skip_channel(
                                &mut statistics,
                                event.event_number,
                                ChannelRole::DynodeSum,
                                error,
                            )?;
                            None
                        }
                    }
                }
                None => None,
            };

            if anodes.is_empty() {
                debug!(event = event.event_number, "no anode fit survived, event skipped");
                continue;
            }
            let record = EventRecord {
                event_number: event.event_number,
                position: event.position,
                anodes,
                dynode,
            };
            aggregator.accumulate(&record);
            records.push(record);
        }

        statistics.records = records.len() as u64;
        info!(
            calibrated = map.is_some(),
            events = statistics.events,
            qualified = statistics.qualified,
            records = statistics.records,
            anode_fits = statistics.anode_fits,
            dynode_fits = statistics.dynode_fits,
            failures = statistics.failures(),
            fallback_seeds = statistics.seed_sources.calibration_fallback,
            "fit pass finished"
        );
        if statistics.bound_limited_fits > 0 {
            warn!(
                calibrated = map.is_some(),
                bound_limited = statistics.bound_limited_fits,
                anode_fits = statistics.anode_fits,
                "anode fits kept with a parameter on its bound"
            );
        }
        Ok(PassOutput {
            records,
            aggregator,
            statistics,
        })
    }

    /// Rebins each anode's dense rise-time profile onto the target grid.
    /// Channels that never received a fit are left out and fall back on lookup.
    pub fn build_map(
        &self,
        aggregator: &PositionAggregator,
    ) -> PspmtResult<RiseTimeCalibrationMap> {
        let settings = &self.config.calibration;
        let mut map = RiseTimeCalibrationMap::new(settings.fallback_rise_time);
        for channel in ChannelRole::ANODES {
            let Some(profile) = aggregator
                .rise_time_profile(channel)
                .filter(|profile| profile.populated_bins() > 0)
            else {
                warn!(channel = %channel, "no pass-1 rise times, channel map left empty");
                continue;
            };
            map.insert(channel, ChannelRiseTimeMap::rebin(profile, settings.target_bins)?);
        }

        for (channel, statistics) in map.statistics() {
            if let Some(statistics) = statistics {
                info!(
                    channel = %channel,
                    populated_cells = statistics.populated_cells,
                    mean = statistics.mean,
                    rms = statistics.rms,
                    min = statistics.min,
                    max = statistics.max,
                    "rise-time calibration map built"
                );
            }
        }
        Ok(map)
    }

    pub fn run_calibration(&self, events: &[EventInput]) -> PspmtResult<CalibrationRun> {
        let PassOutput {
            records: pass1_records,
            aggregator,
            statistics: pass1_statistics,
        } = self.run_pass(events, None)?;
        let map = self.build_map(&aggregator)?;
        drop(aggregator);

        let pass2 = self.run_pass(events, Some(&map))?;
        let summaries = pass2.aggregator.finalize(&self.config.fit);
        let mut polynomials = self.config.rise_power.clone();
        polynomials.overlay(&derived_polynomials(&summaries));

        Ok(CalibrationRun {
            pass1_records,
            pass1_statistics,
            map,
            pass2,
            summaries,
            polynomials,
        })
    }
}

fn skip_channel(
    statistics: &mut PassStatistics,
    event_number: u64,
    channel: ChannelRole,
    error: PspmtError,
) -> PspmtResult<()> {
    if !error.category().is_recoverable() {
        return Err(error);
    }
    warn!(
        event = event_number,
        channel = %channel,
        "{}",
        error.diagnostic_line()
    );
    statistics.record_failure(error.category());
    Ok(())
}

/// Table of the polynomials the aggregator managed to re-fit.
pub fn derived_polynomials(summaries: &[ChannelSummary]) -> RisePowerTable {
    let mut table = RisePowerTable::empty();
    for summary in summaries {
        if let Some(derived) = &summary.polynomial {
            table.insert(summary.channel, derived.coefficients);
        }
    }
    table
}

fn artifact_error(error: ArtifactError) -> PspmtError {
    PspmtError::io_system("IO.ARTIFACT_WRITE", error.to_string())
}

pub fn ensure_output_dir(output_dir: &Path) -> PspmtResult<()> {
    fs::create_dir_all(output_dir).map_err(|error| {
        PspmtError::io_system(
            "IO.OUTPUT_DIRECTORY",
            format!(
                "failed to create output directory '{}': {error}",
                output_dir.display()
            ),
        )
    })
}

pub fn write_event_records(path: &Path, records: &[EventRecord]) -> PspmtResult<()> {
    write_json_artifact(path, records).map_err(artifact_error)
}

pub fn write_position_analysis(path: &Path, summaries: &[ChannelSummary]) -> PspmtResult<()> {
    write_json_artifact(path, summaries).map_err(artifact_error)
}

pub fn write_rise_power_table(path: &Path, table: &RisePowerTable) -> PspmtResult<()> {
    write_json_artifact(path, table).map_err(artifact_error)
}

impl CalibrationRun {
    /// Writes every artifact of the run into `output_dir` and returns their paths.
    pub fn write_artifacts(&self, output_dir: &Path) -> PspmtResult<Vec<PathBuf>> {
        ensure_output_dir(output_dir)?;
        let pass1 = output_dir.join(PASS1_EVENTS_ARTIFACT);
        let maps = output_dir.join(CALIBRATION_MAP_ARTIFACT);
        let pass2 = output_dir.join(PASS2_EVENTS_ARTIFACT);
        let analysis = output_dir.join(POSITION_ANALYSIS_ARTIFACT);
        let polynomials = output_dir.join(RISE_POWER_ARTIFACT);

        write_event_records(&pass1, &self.pass1_records)?;
        save_calibration_map(&maps, &self.map)?;
        write_event_records(&pass2, &self.pass2.records)?;
        write_position_analysis(&analysis, &self.summaries)?;
        write_rise_power_table(&polynomials, &self.polynomials)?;

        Ok(vec![pass1, maps, pass2, analysis, polynomials])
    }
}
