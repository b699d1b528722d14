//! Enum types for SolarSage records

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ============================================================================
// CLEANING PRIORITY
// ============================================================================

/// Verdict of the decision engine.
///
/// The wire form (`EXECUTE_IMMEDIATE`, ...) is what actuators receive.
/// Any other code is rejected by [`CleaningPriority::from_db_str`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CleaningPriority {
    /// Clean now
    ExecuteImmediate,
    /// Clean at the next convenient window
    ScheduleCleaning,
    /// Keep observing
    ContinueMonitoring,
}

impl CleaningPriority {
    pub const ALL: [CleaningPriority; 3] = [
        CleaningPriority::ExecuteImmediate,
        CleaningPriority::ScheduleCleaning,
        CleaningPriority::ContinueMonitoring,
    ];

    /// Convert to database/wire string representation.
    pub fn as_db_str(&self) -> &'static str {
        match self {
            CleaningPriority::ExecuteImmediate => "EXECUTE_IMMEDIATE",
            CleaningPriority::ScheduleCleaning => "SCHEDULE_CLEANING",
            CleaningPriority::ContinueMonitoring => "CONTINUE_MONITORING",
        }
    }

    /// Parse from database/wire string representation. Codes match exactly.
    pub fn from_db_str(s: &str) -> Result<Self, PriorityParseError> {
        match s {
            "EXECUTE_IMMEDIATE" => Ok(CleaningPriority::ExecuteImmediate),
            "SCHEDULE_CLEANING" => Ok(CleaningPriority::ScheduleCleaning),
            "CONTINUE_MONITORING" => Ok(CleaningPriority::ContinueMonitoring),
            _ => Err(PriorityParseError(s.to_string())),
        }
    }
}

impl fmt::Display for CleaningPriority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_db_str())
    }
}

impl FromStr for CleaningPriority {
    type Err = PriorityParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_db_str(s)
    }
}

/// Error when parsing an invalid priority code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PriorityParseError(pub String);

impl fmt::Display for PriorityParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Invalid cleaning priority: {}", self.0)
    }
}

impl std::error::Error for PriorityParseError {}

// ============================================================================
// EXECUTION STATUS
// ============================================================================

/// Outcome of the executor stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExecutionStatus {
    Executed,
    Scheduled,
    Monitoring,
    Failed,
}

impl ExecutionStatus {
    pub fn as_db_str(&self) -> &'static str {
        match self {
            ExecutionStatus::Executed => "EXECUTED",
            ExecutionStatus::Scheduled => "SCHEDULED",
            ExecutionStatus::Monitoring => "MONITORING",
            ExecutionStatus::Failed => "FAILED",
        }
    }
}

impl fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_db_str())
    }
}

// ============================================================================
// PANEL STATUS
// ============================================================================

/// Derived condition of a panel, from its latest observation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PanelStatus {
    Clean,
    ModerateDust,
    NeedsCleaning,
    Unknown,
}

impl PanelStatus {
    /// Dust level below which a panel counts as clean.
    pub const CLEAN_BELOW: f64 = 0.3;
    /// Dust level at or above which a panel needs cleaning.
    pub const NEEDS_CLEANING_FROM: f64 = 0.6;

    /// Classify a normalized dust level in [0, 1].
    pub fn from_dust_level(dust_level: f64) -> Self {
        if dust_level.is_nan() {
            PanelStatus::Unknown
        } else if dust_level < Self::CLEAN_BELOW {
            PanelStatus::Clean
        } else if dust_level < Self::NEEDS_CLEANING_FROM {
            PanelStatus::ModerateDust
        } else {
            PanelStatus::NeedsCleaning
        }
    }

    pub fn as_db_str(&self) -> &'static str {
        match self {
            PanelStatus::Clean => "clean",
            PanelStatus::ModerateDust => "moderate_dust",
            PanelStatus::NeedsCleaning => "needs_cleaning",
            PanelStatus::Unknown => "unknown",
        }
    }
}

impl fmt::Display for PanelStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_db_str())
    }
}

// ============================================================================
// RISK CATEGORY
// ============================================================================

/// Coarse risk bucket for a dust percentage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RiskCategory {
    Low,
    Moderate,
    High,
    Critical,
}

impl RiskCategory {
    /// Bucket a dust percentage in [0, 100].
    pub fn from_dust_pct(dust_pct: f64) -> Self {
        if dust_pct > 75.0 {
            RiskCategory::Critical
        } else if dust_pct > 55.0 {
            RiskCategory::High
        } else if dust_pct > 30.0 {
            RiskCategory::Moderate
        } else {
            RiskCategory::Low
        }
    }
}

// ============================================================================
// RECORD KINDS / STAGES / LOG LEVELS
// ============================================================================

/// Record set discriminator used in storage errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RecordKind {
    Observation,
    Decision,
    Execution,
    SystemLog,
}

/// Pipeline stage, used to attribute timeouts and log entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStage {
    Classify,
    Forecast,
    Decide,
    PersistDecision,
    Execute,
    PersistExecution,
}

impl fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PipelineStage::Classify => "classify",
            PipelineStage::Forecast => "forecast",
            PipelineStage::Decide => "decide",
            PipelineStage::PersistDecision => "persist_decision",
            PipelineStage::Execute => "execute",
            PipelineStage::PersistExecution => "persist_execution",
        };
        f.write_str(name)
    }
}

/// Severity of a system log entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogLevel {
    Info,
    Warning,
    Error,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_priority_db_str_roundtrip() {
        for priority in CleaningPriority::ALL {
            assert_eq!(
                CleaningPriority::from_db_str(priority.as_db_str()).unwrap(),
                priority
            );
        }
    }

    #[test]
    fn test_priority_rejects_unknown_code() {
        let err = CleaningPriority::from_db_str("spray_now").unwrap_err();
        assert_eq!(err.0, "spray_now");
        assert!(err.to_string().contains("spray_now"));

        assert!(CleaningPriority::from_db_str("execute_immediate").is_err());
        assert!(CleaningPriority::from_db_str(" SCHEDULE_CLEANING").is_err());
    }

    #[test]
    fn test_priority_serde_uses_wire_codes() {
        let json = serde_json::to_string(&CleaningPriority::ScheduleCleaning).unwrap();
        assert_eq!(json, "\"SCHEDULE_CLEANING\"");
        assert!(serde_json::from_str::<CleaningPriority>("\"SPRAY\"").is_err());
    }

    #[test]
    fn test_panel_status_thresholds() {
        assert_eq!(PanelStatus::from_dust_level(0.0), PanelStatus::Clean);
        assert_eq!(PanelStatus::from_dust_level(0.29), PanelStatus::Clean);
        assert_eq!(PanelStatus::from_dust_level(0.3), PanelStatus::ModerateDust);
        assert_eq!(PanelStatus::from_dust_level(0.59), PanelStatus::ModerateDust);
        assert_eq!(PanelStatus::from_dust_level(0.6), PanelStatus::NeedsCleaning);
        assert_eq!(PanelStatus::from_dust_level(f64::NAN), PanelStatus::Unknown);
    }

    #[test]
    fn test_risk_category_buckets() {
        assert_eq!(RiskCategory::from_dust_pct(80.0), RiskCategory::Critical);
        assert_eq!(RiskCategory::from_dust_pct(75.0), RiskCategory::High);
        assert_eq!(RiskCategory::from_dust_pct(56.0), RiskCategory::High);
        assert_eq!(RiskCategory::from_dust_pct(31.0), RiskCategory::Moderate);
        assert_eq!(RiskCategory::from_dust_pct(30.0), RiskCategory::Low);
    }

    #[test]
    fn test_execution_status_serde() {
        let json = serde_json::to_string(&ExecutionStatus::Failed).unwrap();
        assert_eq!(json, "\"FAILED\"");
    }
}
