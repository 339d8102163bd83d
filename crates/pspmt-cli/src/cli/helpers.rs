use super::CliError;
use anyhow::Context;
use pspmt_core::common::config::{ConfigError, PipelineConfig, load_pipeline_config};
use pspmt_core::domain::{EventBatch, EventInput, PspmtError};
use std::fs;
use std::path::Path;
use tracing_subscriber::EnvFilter;

/// Installs the stderr fmt subscriber. A second call in the same process keeps
/// the subscriber already installed.
pub(super) fn init_tracing(directive: &str) -> Result<(), CliError> {
    let filter = EnvFilter::try_new(directive).map_err(|error| {
        CliError::Usage(format!("invalid --log-level '{directive}': {error}"))
    })?;
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
    Ok(())
}

pub(super) fn load_config(path: Option<&Path>) -> Result<PipelineConfig, CliError> {
    let Some(path) = path else {
        return Ok(PipelineConfig::default());
    };
    load_pipeline_config(path).map_err(|error| {
        let mapped = match &error {
            ConfigError::Read { .. } => {
                PspmtError::io_system("IO.PIPELINE_CONFIG", error.to_string())
            }
            ConfigError::Parse { .. } => {
                PspmtError::input_validation("INPUT.PIPELINE_CONFIG", error.to_string())
            }
        };
        CliError::Compute(mapped)
    })
}

pub(super) fn load_events(path: &Path) -> Result<Vec<EventInput>, CliError> {
    let source = fs::read_to_string(path).map_err(|error| {
        CliError::Compute(PspmtError::io_system(
            "IO.EVENT_BATCH",
            format!("failed to read event batch '{}': {error}", path.display()),
        ))
    })?;
    let batch: EventBatch = serde_json::from_str(&source).map_err(|error| {
        CliError::Compute(PspmtError::input_validation(
            "INPUT.EVENT_BATCH",
            format!("failed to parse event batch '{}': {error}", path.display()),
        ))
    })?;
    tracing::info!(
        path = %path.display(),
        events = batch.events.len(),
        "event batch loaded"
    );
    Ok(batch.events)
}

pub(super) fn ensure_parent_dir(path: &Path) -> Result<(), CliError> {
    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create directory '{}'", parent.display()))?;
    }
    Ok(())
}

pub(super) fn print_written(paths: &[impl AsRef<Path>]) {
    for path in paths {
        println!("wrote {}", path.as_ref().display());
    }
}
