pub mod aggregator;
pub mod anode;
pub mod calibration;
pub mod dynode;
pub mod estimator;
pub mod pipeline;
pub mod rise_power;
pub mod selection;
pub mod serialization;
