//! Record types produced by a pipeline run

use crate::{
    CleaningPriority, DecisionId, ExecutionStatus, LogId, LogLevel, ObservationId, PanelId,
    PanelStatus, RecordId, RiskCategory, Timestamp,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Number of hourly slots in a generation forecast.
pub const FORECAST_HOURS: usize = 48;

// ============================================================================
// OBSERVATION
// ============================================================================

/// One classification of one panel. Immutable once created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PanelObservation {
    pub observation_id: ObservationId,
    pub panel_id: PanelId,
    pub timestamp: Timestamp,
    /// Normalized obstruction in [0, 1]
    pub dust_level: f64,
    /// Classifier confidence in [0, 1]
    pub confidence: f64,
    /// Reference to the analysed frame (path, URL or content hash)
    pub image_ref: String,
}

impl PanelObservation {
    /// Create an observation stamped now. Inputs are clamped into [0, 1].
    pub fn new(panel_id: PanelId, dust_level: f64, confidence: f64, image_ref: String) -> Self {
        Self {
            observation_id: ObservationId::now_v7(),
            panel_id,
            timestamp: Utc::now(),
            dust_level: clamp_unit(dust_level),
            confidence: clamp_unit(confidence),
            image_ref,
        }
    }

    /// Dust level expressed as a percentage.
    pub fn dust_pct(&self) -> f64 {
        self.dust_level * 100.0
    }

    pub fn status(&self) -> PanelStatus {
        PanelStatus::from_dust_level(self.dust_level)
    }
}

/// Clamp into [0, 1], mapping NaN to 0.
pub fn clamp_unit(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}

// ============================================================================
// FORECAST
// ============================================================================

/// Money side of a forecast.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EconomicFactors {
    pub daily_loss_usd: f64,
    pub weekly_loss_usd: f64,
    pub cleaning_cost_usd: f64,
}

/// Power-loss estimate for a panel at a location. Stored with its Decision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Forecast {
    pub location: String,
    /// Daily generation capacity used for the estimate
    pub capacity_kwh: f64,
    /// False when the location was not in the table and the default capacity was used
    pub location_known: bool,
    pub daily_power_loss_kwh: f64,
    /// In [0, 100]
    pub loss_percentage: f64,
    pub economic: EconomicFactors,
    /// Expected generation per hour over the next 48 hours
    pub hourly_generation: Vec<f64>,
}

// ============================================================================
// DECISION
// ============================================================================

/// Cost/benefit breakdown of a cleaning decision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CostBenefit {
    pub investment: f64,
    pub weekly_savings: f64,
    pub roi_pct: f64,
    /// `None` when the panel loses nothing, i.e. cleaning never pays back
    pub payback_days: Option<f64>,
}

/// Scores and verdict computed by the decision engine, before a run stamps it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Assessment {
    pub environmental_risk: f64,
    pub economic_viability: f64,
    pub combined_score: f64,
    pub confidence: f64,
    pub priority: CleaningPriority,
    pub risk_category: RiskCategory,
    pub low_confidence: bool,
    pub cost_benefit: CostBenefit,
}

/// The persisted verdict of one pipeline run. Immutable once written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Decision {
    pub decision_id: DecisionId,
    pub panel_id: PanelId,
    pub observation_id: ObservationId,
    pub timestamp: Timestamp,
    /// In [0, 100]
    pub environmental_risk: f64,
    /// In [0, 100]
    pub economic_viability: f64,
    /// In [0, 100]
    pub combined_score: f64,
    /// Decision confidence in [0, 100]
    pub confidence: f64,
    pub priority: CleaningPriority,
    pub risk_category: RiskCategory,
    /// Classifier confidence was below the configured threshold
    pub low_confidence: bool,
    pub cost_benefit: CostBenefit,
    pub forecast: Forecast,
}

impl Decision {
    /// Stamp an assessment with a fresh id and the current time.
    pub fn from_assessment(
        observation: &PanelObservation,
        assessment: Assessment,
        forecast: Forecast,
    ) -> Self {
        Self {
            decision_id: DecisionId::now_v7(),
            panel_id: observation.panel_id.clone(),
            observation_id: observation.observation_id,
            timestamp: Utc::now(),
            environmental_risk: assessment.environmental_risk,
            economic_viability: assessment.economic_viability,
            combined_score: assessment.combined_score,
            confidence: assessment.confidence,
            priority: assessment.priority,
            risk_category: assessment.risk_category,
            low_confidence: assessment.low_confidence,
            cost_benefit: assessment.cost_benefit,
            forecast,
        }
    }

    /// Replace the id, keeping everything else. Used when an id collides in the store.
    pub fn with_fresh_id(mut self) -> Self {
        self.decision_id = DecisionId::now_v7();
        self
    }
}

// ============================================================================
// EXECUTION
// ============================================================================

/// Quantities reported for a performed cleaning.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct CleaningMetrics {
    pub water_used_l: f64,
    pub cost_usd: f64,
    pub power_recovery_kwh: f64,
    /// In [0, 100]
    pub success_rate: f64,
}

/// Outcome of executing a Decision. Written exactly once per Decision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub decision_id: DecisionId,
    pub panel_id: PanelId,
    pub timestamp: Timestamp,
    pub status: ExecutionStatus,
    pub water_used_l: f64,
    pub cost_usd: f64,
    pub power_recovery_kwh: f64,
    pub success_rate: f64,
    /// Present iff `status == Failed`
    pub error: Option<String>,
}

impl ExecutionResult {
    /// A result with the given status and metrics.
    pub fn completed(
        decision_id: DecisionId,
        panel_id: PanelId,
        status: ExecutionStatus,
        metrics: CleaningMetrics,
    ) -> Self {
        Self {
            decision_id,
            panel_id,
            timestamp: Utc::now(),
            status,
            water_used_l: metrics.water_used_l,
            cost_usd: metrics.cost_usd,
            power_recovery_kwh: metrics.power_recovery_kwh,
            success_rate: metrics.success_rate,
            error: None,
        }
    }

    /// A FAILED result with all quantities zero.
    pub fn failed(decision_id: DecisionId, panel_id: PanelId, error: impl Into<String>) -> Self {
        Self {
            decision_id,
            panel_id,
            timestamp: Utc::now(),
            status: ExecutionStatus::Failed,
            water_used_l: 0.0,
            cost_usd: 0.0,
            power_recovery_kwh: 0.0,
            success_rate: 0.0,
            error: Some(error.into()),
        }
    }

    pub fn is_failed(&self) -> bool {
        self.status == ExecutionStatus::Failed
    }
}

// ============================================================================
// COMPOSED VIEWS
// ============================================================================

/// Complete record of one pipeline run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineResult {
    pub observation: PanelObservation,
    pub decision: Decision,
    pub execution: ExecutionResult,
}

/// One run in a panel's history. `execution` is `None` only while its write is outstanding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub observation: PanelObservation,
    pub decision: Decision,
    pub execution: Option<ExecutionResult>,
}

impl HistoryEntry {
    /// Convert to a complete result, if the execution has been recorded.
    pub fn into_complete(self) -> Option<PipelineResult> {
        let HistoryEntry {
            observation,
            decision,
            execution,
        } = self;
        execution.map(|execution| PipelineResult {
            observation,
            decision,
            execution,
        })
    }
}

/// Derived state of a roster panel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PanelState {
    pub panel_id: PanelId,
    pub status: PanelStatus,
    pub dust_level: Option<f64>,
    pub last_observed: Option<Timestamp>,
    /// Time of the latest EXECUTED cleaning; `None` means never
    pub last_cleaned: Option<Timestamp>,
}

impl PanelState {
    /// State of a panel with no recorded observation.
    pub fn unknown(panel_id: PanelId) -> Self {
        Self {
            panel_id,
            status: PanelStatus::Unknown,
            dust_level: None,
            last_observed: None,
            last_cleaned: None,
        }
    }
}

// ============================================================================
// OPERATIONAL LOG / STATS
// ============================================================================

/// Append-only operational log entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemLogEntry {
    pub log_id: LogId,
    pub timestamp: Timestamp,
    pub level: LogLevel,
    /// Emitting component, e.g. `orchestrator`
    pub component: String,
    pub message: String,
    pub details: serde_json::Value,
}

impl SystemLogEntry {
    pub fn new(
        level: LogLevel,
        component: impl Into<String>,
        message: impl Into<String>,
        details: serde_json::Value,
    ) -> Self {
        Self {
            log_id: LogId::now_v7(),
            timestamp: Utc::now(),
            level,
            component: component.into(),
            message: message.into(),
            details,
        }
    }
}

/// Aggregate counters computed by a store.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct StoreCounters {
    pub total_analyses: u64,
    pub total_decisions: u64,
    pub total_cleanings: u64,
    pub water_used_total_l: f64,
    pub dust_level_sum: f64,
    pub decisions_by_priority: BTreeMap<CleaningPriority, u64>,
}

/// System-wide statistics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemStats {
    pub total_panels: usize,
    pub total_analyses: u64,
    pub total_decisions: u64,
    pub total_cleanings: u64,
    pub water_used_total_l: f64,
    /// `None` when nothing has been observed yet
    pub avg_dust_level: Option<f64>,
    pub decisions_by_priority: BTreeMap<CleaningPriority, u64>,
}

impl SystemStats {
    pub fn from_counters(total_panels: usize, counters: StoreCounters) -> Self {
        let avg_dust_level = if counters.total_analyses > 0 {
            Some(counters.dust_level_sum / counters.total_analyses as f64)
        } else {
            None
        };
        Self {
            total_panels,
            total_analyses: counters.total_analyses,
            total_decisions: counters.total_decisions,
            total_cleanings: counters.total_cleanings,
            water_used_total_l: counters.water_used_total_l,
            avg_dust_level,
            decisions_by_priority: counters.decisions_by_priority,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn panel() -> PanelId {
        PanelId::new("panel_01").unwrap()
    }

    #[test]
    fn test_observation_clamps_inputs() {
        let obs = PanelObservation::new(panel(), 1.4, f64::NAN, "img".to_string());
        assert_eq!(obs.dust_level, 1.0);
        assert_eq!(obs.confidence, 0.0);
        assert_eq!(obs.status(), PanelStatus::NeedsCleaning);
    }

    #[test]
    fn test_failed_execution_zeroes_metrics() {
        let result = ExecutionResult::failed(DecisionId::now_v7(), panel(), "boom");
        assert!(result.is_failed());
        assert_eq!(result.water_used_l, 0.0);
        assert_eq!(result.cost_usd, 0.0);
        assert_eq!(result.error.as_deref(), Some("boom"));
    }

    #[test]
    fn test_history_entry_into_complete() {
        let obs = PanelObservation::new(panel(), 0.5, 0.9, "img".to_string());
        let forecast = Forecast {
            location: "Pune".to_string(),
            capacity_kwh: 27.2,
            location_known: true,
            daily_power_loss_kwh: 0.0,
            loss_percentage: 0.0,
            economic: EconomicFactors {
                daily_loss_usd: 0.0,
                weekly_loss_usd: 0.0,
                cleaning_cost_usd: 24.5,
            },
            hourly_generation: vec![0.0; FORECAST_HOURS],
        };
        let assessment = Assessment {
            environmental_risk: 60.0,
            economic_viability: 25.0,
            combined_score: 40.75,
            confidence: 77.225,
            priority: CleaningPriority::ContinueMonitoring,
            risk_category: RiskCategory::Moderate,
            low_confidence: false,
            cost_benefit: CostBenefit {
                investment: 24.5,
                weekly_savings: 0.0,
                roi_pct: 0.0,
                payback_days: None,
            },
        };
        let decision = Decision::from_assessment(&obs, assessment, forecast);
        assert_eq!(decision.observation_id, obs.observation_id);

        let pending = HistoryEntry {
            observation: obs.clone(),
            decision: decision.clone(),
            execution: None,
        };
        assert!(pending.into_complete().is_none());

        let done = HistoryEntry {
            observation: obs,
            decision: decision.clone(),
            execution: Some(ExecutionResult::completed(
                decision.decision_id,
                decision.panel_id.clone(),
                ExecutionStatus::Monitoring,
                CleaningMetrics::default(),
            )),
        };
        assert!(done.into_complete().is_some());
    }

    #[test]
    fn test_stats_average_absent_without_observations() {
        let stats = SystemStats::from_counters(4, StoreCounters::default());
        assert_eq!(stats.total_panels, 4);
        assert!(stats.avg_dust_level.is_none());

        let counters = StoreCounters {
            total_analyses: 2,
            dust_level_sum: 1.0,
            ..StoreCounters::default()
        };
        let stats = SystemStats::from_counters(4, counters);
        assert_eq!(stats.avg_dust_level, Some(0.5));
    }
}
