//! SolarSage Engine - Pipeline Stages
//!
//! The four stages of a pipeline run. Forecasting and deciding are pure
//! functions; classification and execution sit behind traits so that the
//! random demo behaviour stays isolated from the rest of the system.
//!
//! - [`Classifier`]: panel frame to dust level and confidence
//! - [`Forecaster`]: dust level and location to power and money lost
//! - [`DecisionEngine`]: observation and forecast to a cleaning priority
//! - [`Executor`]: decision to an execution result

pub mod classifier;
pub mod decision;
pub mod executor;
pub mod forecast;

pub use classifier::{
    brightness_dust_level, BrightnessClassifier, Classification, Classifier,
    DirectoryFrameSource, FrameSource, SimulatedClassifier,
};
pub use decision::DecisionEngine;
pub use executor::{ExecutionEstimator, ExecutionRequest, Executor, SimulatedEstimator};
pub use forecast::{Forecaster, LocationLookup, LocationTable, BUILTIN_LOCATIONS};
