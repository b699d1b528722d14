//! SolarSage Core - Entity Types
//!
//! Data structures shared by every SolarSage crate: identifiers, enums,
//! pipeline records, errors, configuration and health types.
//! This crate contains no pipeline logic.

mod config;
mod entities;
mod enums;
mod error;
mod health;
mod identity;

pub use config::{
    EconomicsConfig, HistoryConfig, PanelConfig, PanelPosition, SimRange, SimulationConfig,
    SolarSageConfig, StoreConfig, TimeoutConfig,
};
pub use entities::{
    clamp_unit, Assessment, CleaningMetrics, CostBenefit, Decision, EconomicFactors,
    ExecutionResult, Forecast, HistoryEntry, PanelObservation, PanelState, PipelineResult,
    StoreCounters, SystemLogEntry, SystemStats, FORECAST_HOURS,
};
pub use enums::{
    CleaningPriority, ExecutionStatus, LogLevel, PanelStatus, PipelineStage, PriorityParseError,
    RecordKind, RiskCategory,
};
pub use error::{
    ClassifierError, ConfigError, ExecutionError, PipelineError, SolarSageError, SolarSageResult,
    StorageError, StorageResult,
};
pub use health::{HealthCheck, HealthReport, HealthStatus};
pub use identity::{
    compute_frame_hash, frame_ref, DecisionId, FrameHash, LogId, ObservationId, PanelId,
    PanelIdError, RecordId, Timestamp,
};
