pub mod common;
pub mod domain;
pub mod modules;
pub mod numerics;

pub use common::config::{ConfigError, PipelineConfig, load_pipeline_config};
pub use domain::{
    ChannelRole, EventBatch, EventInput, EventPosition, FitResult, FitWindow, PspmtError,
    PspmtErrorCategory, PspmtResult, Waveform,
};
pub use modules::anode::{AnodeFitResult, AnodeFitter, AnodeParameters};
pub use modules::calibration::{RiseTimeCalibrationMap, load_calibration_map, save_calibration_map};
pub use modules::dynode::{DynodeFitResult, DynodeFitter, DynodeParameters};
pub use modules::pipeline::{CalibrationPipeline, CalibrationRun, EventRecord, PassOutput};
pub use modules::rise_power::{RisePowerPolynomial, RisePowerTable};
