//! SolarSage Pipeline - Orchestration
//!
//! Runs the classify, forecast, decide and execute stages for one panel at a
//! time per panel, persists every run, and answers queries over the stored
//! history.
//!
//! - [`Orchestrator`]: triggers and queries
//! - [`PanelLocks`]: per-panel leases, released on drop
//! - [`Scheduler`]: periodic sweep over the roster
//! - [`telemetry::init_tracing`]: subscriber setup for binaries

pub mod lock;
pub mod orchestrator;
pub mod registry;
pub mod scheduler;
pub mod telemetry;

pub use lock::{LeaseInfo, PanelLease, PanelLocks};
pub use orchestrator::{Orchestrator, ReconcileReport, TriggerRequest};
pub use registry::PanelRegistry;
pub use scheduler::{Scheduler, SweepMetrics, SweepSnapshot};
