use super::CliError;
use super::helpers::{ensure_parent_dir, load_config, load_events, print_written};
use pspmt_core::modules::calibration::{
    CALIBRATION_MAP_ARTIFACT, load_calibration_map, save_calibration_map,
};
use pspmt_core::modules::pipeline::{
    CalibrationPipeline, PASS1_EVENTS_ARTIFACT, PASS2_EVENTS_ARTIFACT, POSITION_ANALYSIS_ARTIFACT,
    RISE_POWER_ARTIFACT, derived_polynomials, ensure_output_dir, write_event_records,
    write_position_analysis, write_rise_power_table,
};
use std::path::PathBuf;

#[derive(clap::Args)]
pub(super) struct CalibrateArgs {
    /// Decoded event batch (JSON)
    #[arg(long)]
    events: PathBuf,

    /// Directory receiving every artifact of the run
    #[arg(long, default_value = "calibration-output")]
    output_dir: PathBuf,

    /// Pipeline configuration overrides (JSON)
    #[arg(long)]
    config: Option<PathBuf>,
}

#[derive(clap::Args)]
pub(super) struct FitArgs {
    /// Decoded event batch (JSON)
    #[arg(long)]
    events: PathBuf,

    /// Directory receiving the event records and position analysis
    #[arg(long, default_value = "fit-output")]
    output_dir: PathBuf,

    /// Rise-time map artifact seeding the anode fits
    #[arg(long)]
    maps: Option<PathBuf>,

    /// Pipeline configuration overrides (JSON)
    #[arg(long)]
    config: Option<PathBuf>,
}

#[derive(clap::Args)]
pub(super) struct BuildMapsArgs {
    /// Decoded event batch (JSON)
    #[arg(long)]
    events: PathBuf,

    /// Rise-time map artifact path
    #[arg(long, default_value = CALIBRATION_MAP_ARTIFACT)]
    output: PathBuf,

    /// Pipeline configuration overrides (JSON)
    #[arg(long)]
    config: Option<PathBuf>,
}

pub(super) fn run_calibrate_command(args: CalibrateArgs) -> Result<i32, CliError> {
    let config = load_config(args.config.as_deref())?;
    let events = load_events(&args.events)?;
    let pipeline = CalibrationPipeline::new(config);

    let run = pipeline.run_calibration(&events)?;
    let written = run.write_artifacts(&args.output_dir)?;
    print_written(&written);
    println!(
        "pass 1: {} records, pass 2: {} records ({} fallback seeds)",
        run.pass1_records.len(),
        run.pass2.records.len(),
        run.pass2.statistics.seed_sources.calibration_fallback
    );
    Ok(0)
}

pub(super) fn run_fit_command(args: FitArgs) -> Result<i32, CliError> {
    let config = load_config(args.config.as_deref())?;
    let events = load_events(&args.events)?;
    let map = args
        .maps
        .as_deref()
        .map(|path| load_calibration_map(path, config.calibration.fallback_rise_time))
        .transpose()?;
    let pipeline = CalibrationPipeline::new(config);

    let output = pipeline.run_pass(&events, map.as_ref())?;
    let summaries = output.aggregator.finalize(&pipeline.config().fit);
    let mut polynomials = pipeline.config().rise_power.clone();
    polynomials.overlay(&derived_polynomials(&summaries));

    ensure_output_dir(&args.output_dir)?;
    let records_name = if map.is_some() {
        PASS2_EVENTS_ARTIFACT
    } else {
        PASS1_EVENTS_ARTIFACT
    };
    let records = args.output_dir.join(records_name);
    let analysis = args.output_dir.join(POSITION_ANALYSIS_ARTIFACT);
    let table = args.output_dir.join(RISE_POWER_ARTIFACT);
    write_event_records(&records, &output.records)?;
    write_position_analysis(&analysis, &summaries)?;
    write_rise_power_table(&table, &polynomials)?;

    print_written(&[records, analysis, table]);
    println!(
        "{} of {} events recorded",
        output.statistics.records, output.statistics.events
    );
    Ok(0)
}

pub(super) fn run_build_maps_command(args: BuildMapsArgs) -> Result<i32, CliError> {
    let config = load_config(args.config.as_deref())?;
    let events = load_events(&args.events)?;
    let pipeline = CalibrationPipeline::new(config);

    let pass1 = pipeline.run_pass(&events, None)?;
    let map = pipeline.build_map(&pass1.aggregator)?;
    ensure_parent_dir(&args.output)?;
    save_calibration_map(&args.output, &map)?;

    print_written(&[&args.output]);
    Ok(0)
}
