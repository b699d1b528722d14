//! Error types for SolarSage operations

use crate::{DecisionId, PanelId, PipelineStage, RecordKind};
use std::time::Duration;
use thiserror::Error;

/// Storage layer errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StorageError {
    #[error("Record not found: {kind:?} {id}")]
    NotFound { kind: RecordKind, id: String },

    #[error("Duplicate {kind:?} record: {id}")]
    Duplicate { kind: RecordKind, id: String },

    #[error("Execution result for {decision_id} has no stored decision")]
    MissingDecision { decision_id: DecisionId },

    #[error("Insert failed for {kind:?}: {reason}")]
    InsertFailed { kind: RecordKind, reason: String },

    #[error("Storage backend error: {reason}")]
    Backend { reason: String },

    #[error("Serialization failed for {kind:?}: {reason}")]
    Serialization { kind: RecordKind, reason: String },

    #[error("Storage lock poisoned")]
    LockPoisoned,
}

/// Errors reported by a classifier.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ClassifierError {
    #[error("Classifier unavailable: {reason}")]
    Unavailable { reason: String },

    #[error("Invalid classifier reading for {field}: {value}")]
    InvalidReading { field: String, value: String },

    #[error("No frame available for panel {panel_id}")]
    FrameMissing { panel_id: PanelId },
}

/// Executor errors. Every one of them becomes a FAILED execution result.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ExecutionError {
    #[error("Unknown cleaning priority code: {code}")]
    UnknownPriority { code: String },

    #[error("Execution estimator failed: {reason}")]
    EstimatorFailed { reason: String },

    #[error("Estimator reported invalid {field}: {value}")]
    InvalidMetrics { field: String, value: String },
}

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid config value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },
}

/// Errors returned by a pipeline trigger or query. Always carries the panel.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum PipelineError {
    #[error("Panel {panel_id} already has a pipeline run in flight")]
    PanelBusy { panel_id: PanelId },

    #[error("Classification failed for panel {panel_id}: {source}")]
    ClassificationFailed {
        panel_id: PanelId,
        source: ClassifierError,
    },

    #[error("Panel {panel_id} timed out in {stage} after {after:?}")]
    Timeout {
        panel_id: PanelId,
        stage: PipelineStage,
        after: Duration,
    },

    #[error("Store error for panel {panel_id}: {source}")]
    Store {
        panel_id: PanelId,
        source: StorageError,
    },

    #[error("Execution of decision {decision_id} for panel {panel_id} failed: {source}")]
    ExecutionFailed {
        panel_id: PanelId,
        decision_id: DecisionId,
        source: ExecutionError,
    },

    #[error("Trigger for panel {panel_id} was cancelled before classification")]
    Cancelled { panel_id: PanelId },

    #[error("No decision recorded{}", panel_suffix(.panel_id))]
    NotFound { panel_id: Option<PanelId> },
}

fn panel_suffix(panel_id: &Option<PanelId>) -> String {
    match panel_id {
        Some(id) => format!(" for panel {}", id),
        None => String::new(),
    }
}

impl PipelineError {
    /// Panel the error concerns, if any.
    pub fn panel_id(&self) -> Option<&PanelId> {
        match self {
            PipelineError::PanelBusy { panel_id }
            | PipelineError::ClassificationFailed { panel_id, .. }
            | PipelineError::Timeout { panel_id, .. }
            | PipelineError::Store { panel_id, .. }
            | PipelineError::ExecutionFailed { panel_id, .. }
            | PipelineError::Cancelled { panel_id } => Some(panel_id),
            PipelineError::NotFound { panel_id } => panel_id.as_ref(),
        }
    }

    /// `PanelBusy` is a control signal rather than a failure.
    pub fn is_busy(&self) -> bool {
        matches!(self, PipelineError::PanelBusy { .. })
    }
}

/// Master error type for all SolarSage errors.
#[derive(Debug, Error)]
pub enum SolarSageError {
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Classifier error: {0}")]
    Classifier(#[from] ClassifierError),

    #[error("Execution error: {0}")]
    Execution(#[from] ExecutionError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    #[error("Pipeline error: {0}")]
    Pipeline(#[from] PipelineError),
}

/// Result type alias for SolarSage operations.
pub type SolarSageResult<T> = Result<T, SolarSageError>;

/// Result type alias for store operations.
pub type StorageResult<T> = Result<T, StorageError>;

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::RecordId;

    fn panel() -> PanelId {
        PanelId::new("panel_01").unwrap()
    }

    #[test]
    fn test_storage_error_display_duplicate() {
        let err = StorageError::Duplicate {
            kind: RecordKind::Decision,
            id: "abc".to_string(),
        };
        let msg = format!("{}", err);
        assert!(msg.contains("Duplicate"));
        assert!(msg.contains("Decision"));
        assert!(msg.contains("abc"));
    }

    #[test]
    fn test_pipeline_error_display_timeout() {
        let err = PipelineError::Timeout {
            panel_id: panel(),
            stage: PipelineStage::Classify,
            after: Duration::from_millis(1500),
        };
        let msg = format!("{}", err);
        assert!(msg.contains("panel_01"));
        assert!(msg.contains("classify"));
        assert!(msg.contains("1.5s"));
    }

    #[test]
    fn test_pipeline_error_not_found_display() {
        let any = PipelineError::NotFound { panel_id: None };
        assert_eq!(any.to_string(), "No decision recorded");

        let one = PipelineError::NotFound {
            panel_id: Some(panel()),
        };
        assert!(one.to_string().ends_with("for panel panel_01"));
    }

    #[test]
    fn test_pipeline_error_carries_panel() {
        let err = PipelineError::ExecutionFailed {
            panel_id: panel(),
            decision_id: DecisionId::now_v7(),
            source: ExecutionError::UnknownPriority {
                code: "SPRAY".to_string(),
            },
        };
        assert_eq!(err.panel_id(), Some(&panel()));
        assert!(!err.is_busy());
        assert!(PipelineError::PanelBusy { panel_id: panel() }.is_busy());
    }

    #[test]
    fn test_solarsage_error_from_variants() {
        let storage = SolarSageError::from(StorageError::LockPoisoned);
        assert!(matches!(storage, SolarSageError::Storage(_)));

        let classifier = SolarSageError::from(ClassifierError::Unavailable {
            reason: "offline".to_string(),
        });
        assert!(matches!(classifier, SolarSageError::Classifier(_)));

        let execution = SolarSageError::from(ExecutionError::EstimatorFailed {
            reason: "sensor".to_string(),
        });
        assert!(matches!(execution, SolarSageError::Execution(_)));

        let config = SolarSageError::from(ConfigError::InvalidValue {
            field: "panels".to_string(),
            reason: "empty".to_string(),
        });
        assert!(matches!(config, SolarSageError::Config(_)));

        let pipeline = SolarSageError::from(PipelineError::Cancelled { panel_id: panel() });
        assert!(matches!(pipeline, SolarSageError::Pipeline(_)));
    }
}
