//! Decision execution
//!
//! The executor receives the priority as its wire code, the way a remote
//! actuator would, and turns it into an [`ExecutionResult`]. Metrics for a
//! performed cleaning come from an [`ExecutionEstimator`].

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use solarsage_core::{
    CleaningMetrics, CleaningPriority, Decision, DecisionId, ExecutionError, ExecutionResult,
    ExecutionStatus, PanelId, SimRange, SimulationConfig,
};
use std::sync::{Arc, Mutex};

/// Command sent to the executor for one decision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionRequest {
    pub decision_id: DecisionId,
    pub panel_id: PanelId,
    pub priority_code: String,
}

impl From<&Decision> for ExecutionRequest {
    fn from(decision: &Decision) -> Self {
        Self {
            decision_id: decision.decision_id,
            panel_id: decision.panel_id.clone(),
            priority_code: decision.priority.as_db_str().to_string(),
        }
    }
}

/// Source of the quantities reported for an immediate cleaning.
pub trait ExecutionEstimator: Send + Sync {
    fn estimate(&self, request: &ExecutionRequest) -> Result<CleaningMetrics, ExecutionError>;
}

/// Draws metrics uniformly from the configured simulation ranges.
pub struct SimulatedEstimator {
    config: SimulationConfig,
    rng: Mutex<StdRng>,
}

impl SimulatedEstimator {
    /// Seeded from `config.seed` when present.
    pub fn new(config: SimulationConfig) -> Self {
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        Self {
            config,
            rng: Mutex::new(rng),
        }
    }
}

fn sample(rng: &mut StdRng, range: SimRange) -> f64 {
    if range.max > range.min {
        rng.random_range(range.min..=range.max)
    } else {
        range.min
    }
}

impl ExecutionEstimator for SimulatedEstimator {
    fn estimate(&self, _request: &ExecutionRequest) -> Result<CleaningMetrics, ExecutionError> {
        let mut rng = self
            .rng
            .lock()
            .map_err(|_| ExecutionError::EstimatorFailed {
                reason: "simulation rng poisoned".to_string(),
            })?;
        Ok(CleaningMetrics {
            water_used_l: sample(&mut rng, self.config.water_used_l),
            cost_usd: sample(&mut rng, self.config.cost_usd),
            power_recovery_kwh: sample(&mut rng, self.config.power_recovery_kwh),
            success_rate: sample(&mut rng, self.config.success_rate),
        })
    }
}

/// Turns execution requests into results.
#[derive(Clone)]
pub struct Executor {
    estimator: Arc<dyn ExecutionEstimator>,
}

impl Executor {
    pub fn new(estimator: Arc<dyn ExecutionEstimator>) -> Self {
        Self { estimator }
    }

    pub fn simulated(config: SimulationConfig) -> Self {
        Self::new(Arc::new(SimulatedEstimator::new(config)))
    }

    /// Execute a request. Any error means the run's result is recorded as FAILED.
    pub fn execute(&self, request: &ExecutionRequest) -> Result<ExecutionResult, ExecutionError> {
        let priority = CleaningPriority::from_db_str(&request.priority_code).map_err(|e| {
            ExecutionError::UnknownPriority { code: e.0 }
        })?;

        let (status, metrics) = match priority {
            CleaningPriority::ExecuteImmediate => {
                let metrics = self.estimator.estimate(request)?;
                validate_metrics(&metrics)?;
                (ExecutionStatus::Executed, metrics)
            }
            CleaningPriority::ScheduleCleaning => {
                (ExecutionStatus::Scheduled, CleaningMetrics::default())
            }
            CleaningPriority::ContinueMonitoring => {
                (ExecutionStatus::Monitoring, CleaningMetrics::default())
            }
        };

        tracing::debug!(
            decision_id = %request.decision_id,
            panel_id = %request.panel_id,
            status = %status,
            "execution completed"
        );

        Ok(ExecutionResult::completed(
            request.decision_id,
            request.panel_id.clone(),
            status,
            metrics,
        ))
    }
}

fn validate_metrics(metrics: &CleaningMetrics) -> Result<(), ExecutionError> {
    let quantities = [
        ("water_used_l", metrics.water_used_l),
        ("cost_usd", metrics.cost_usd),
        ("power_recovery_kwh", metrics.power_recovery_kwh),
    ];
    for (field, value) in quantities {
        if !(value >= 0.0) || !value.is_finite() {
            return Err(invalid_metric(field, value));
        }
    }
    if !(0.0..=100.0).contains(&metrics.success_rate) {
        return Err(invalid_metric("success_rate", metrics.success_rate));
    }
    Ok(())
}

fn invalid_metric(field: &str, value: f64) -> ExecutionError {
    ExecutionError::InvalidMetrics {
        field: field.to_string(),
        value: value.to_string(),
    }
}
