//! SolarSage Test Utilities
//!
//! Shared test infrastructure for the SolarSage workspace:
//! - Scripted classifiers and estimators
//! - A store wrapper that fails or stalls selected writes
//! - Proptest generators for readings and ids
//! - Fixtures for the reference deployment
//! - Assertions over pipeline outcomes

pub use solarsage_core::{
    CleaningMetrics, CleaningPriority, ClassifierError, Decision, DecisionId, ExecutionError,
    ExecutionResult, ExecutionStatus, HistoryEntry, PanelId, PanelObservation, PipelineError,
    PipelineResult, RecordKind, SolarSageConfig, StorageError, StorageResult, StoreCounters,
    SystemLogEntry, Timestamp,
};
pub use solarsage_engine::{Classification, Classifier, ExecutionEstimator, ExecutionRequest};
pub use solarsage_storage::{DecisionStore, InMemoryDecisionStore};

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

// ============================================================================
// SCRIPTED CLASSIFIER
// ============================================================================

#[derive(Debug, Clone)]
enum Script {
    Reading { dust_level: f64, confidence: f64 },
    Fail(ClassifierError),
}

/// Classifier that returns a fixed reading (or error), optionally after a delay.
#[derive(Debug)]
pub struct ScriptedClassifier {
    script: Script,
    delay: Option<Duration>,
    calls: AtomicUsize,
}

impl ScriptedClassifier {
    pub fn fixed(dust_level: f64, confidence: f64) -> Self {
        Self {
            script: Script::Reading {
                dust_level,
                confidence,
            },
            delay: None,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn failing(error: ClassifierError) -> Self {
        Self {
            script: Script::Fail(error),
            delay: None,
            calls: AtomicUsize::new(0),
        }
    }

    /// Sleep this long before answering.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Number of classify calls started so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Classifier for ScriptedClassifier {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn classify(&self, panel_id: &PanelId) -> Result<Classification, ClassifierError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        match &self.script {
            Script::Reading {
                dust_level,
                confidence,
            } => Ok(Classification {
                dust_level: *dust_level,
                confidence: *confidence,
                image_ref: format!("scripted://{}/{}", panel_id, call),
            }),
            Script::Fail(error) => Err(error.clone()),
        }
    }
}

// ============================================================================
// ESTIMATORS
// ============================================================================

/// Always reports the same metrics.
#[derive(Debug, Clone, Copy)]
pub struct FixedEstimator(pub CleaningMetrics);

impl FixedEstimator {
    /// Mid-range figures of the default simulation.
    pub fn typical() -> Self {
        Self(CleaningMetrics {
            water_used_l: 12.5,
            cost_usd: 4.0,
            power_recovery_kwh: 3.2,
            success_rate: 95.0,
        })
    }
}

impl ExecutionEstimator for FixedEstimator {
    fn estimate(&self, _request: &ExecutionRequest) -> Result<CleaningMetrics, ExecutionError> {
        Ok(self.0)
    }
}

/// Always fails, like an actuator that never answers.
#[derive(Debug, Clone)]
pub struct FailingEstimator {
    reason: String,
}

impl FailingEstimator {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

impl ExecutionEstimator for FailingEstimator {
    fn estimate(&self, _request: &ExecutionRequest) -> Result<CleaningMetrics, ExecutionError> {
        Err(ExecutionError::EstimatorFailed {
            reason: self.reason.clone(),
        })
    }
}

// ============================================================================
// FLAKY STORE
// ============================================================================

/// Wraps a real store and injects failures into writes.
///
/// Failure budgets count down: `fail_execution_writes(2)` fails the next two
/// execution writes and lets the third through. Reads always pass through.
pub struct FlakyStore {
    inner: Arc<dyn DecisionStore>,
    decision_failures: AtomicUsize,
    decision_collisions: AtomicUsize,
    execution_failures: AtomicUsize,
    write_delay: Option<Duration>,
    ping_down: AtomicBool,
}

impl FlakyStore {
    pub fn new(inner: Arc<dyn DecisionStore>) -> Self {
        Self {
            inner,
            decision_failures: AtomicUsize::new(0),
            decision_collisions: AtomicUsize::new(0),
            execution_failures: AtomicUsize::new(0),
            write_delay: None,
            ping_down: AtomicBool::new(false),
        }
    }

    /// Backed by a fresh in-memory store.
    pub fn in_memory() -> Self {
        Self::new(Arc::new(InMemoryDecisionStore::new()))
    }

    pub fn fail_decision_writes(self, count: usize) -> Self {
        self.decision_failures.store(count, Ordering::SeqCst);
        self
    }

    /// Report the next `count` decision writes as id collisions.
    pub fn collide_decision_ids(self, count: usize) -> Self {
        self.decision_collisions.store(count, Ordering::SeqCst);
        self
    }

    pub fn fail_execution_writes(self, count: usize) -> Self {
        self.execution_failures.store(count, Ordering::SeqCst);
        self
    }

    /// Delay every decision and execution write.
    pub fn with_write_delay(mut self, delay: Duration) -> Self {
        self.write_delay = Some(delay);
        self
    }

    pub fn set_ping_down(&self, down: bool) {
        self.ping_down.store(down, Ordering::SeqCst);
    }

    pub fn inner(&self) -> &Arc<dyn DecisionStore> {
        &self.inner
    }

    async fn stall(&self) {
        if let Some(delay) = self.write_delay {
            tokio::time::sleep(delay).await;
        }
    }
}

/// Take one unit from a failure budget; `true` if this call should fail.
fn consume(budget: &AtomicUsize) -> bool {
    budget
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok()
}

fn injected(kind: RecordKind) -> StorageError {
    StorageError::InsertFailed {
        kind,
        reason: "injected failure".to_string(),
    }
}

#[async_trait]
impl DecisionStore for FlakyStore {
    fn backend_name(&self) -> &'static str {
        "flaky"
    }

    async fn record_decision(
        &self,
        observation: &PanelObservation,
        decision: &Decision,
    ) -> StorageResult<()> {
        self.stall().await;
        if consume(&self.decision_collisions) {
            return Err(StorageError::Duplicate {
                kind: RecordKind::Decision,
                id: decision.decision_id.to_string(),
            });
        }
        if consume(&self.decision_failures) {
            return Err(injected(RecordKind::Decision));
        }
        self.inner.record_decision(observation, decision).await
    }

    async fn record_execution(&self, result: &ExecutionResult) -> StorageResult<()> {
        self.stall().await;
        if consume(&self.execution_failures) {
            return Err(injected(RecordKind::Execution));
        }
        self.inner.record_execution(result).await
    }

    async fn append_log(&self, entry: &SystemLogEntry) -> StorageResult<()> {
        self.inner.append_log(entry).await
    }

    async fn decision_get(&self, decision_id: DecisionId) -> StorageResult<Option<Decision>> {
        self.inner.decision_get(decision_id).await
    }

    async fn execution_get(
        &self,
        decision_id: DecisionId,
    ) -> StorageResult<Option<ExecutionResult>> {
        self.inner.execution_get(decision_id).await
    }

    async fn latest_complete(
        &self,
        panel_id: Option<&PanelId>,
    ) -> StorageResult<Option<PipelineResult>> {
        self.inner.latest_complete(panel_id).await
    }

    async fn history(&self, panel_id: &PanelId, limit: usize) -> StorageResult<Vec<HistoryEntry>> {
        self.inner.history(panel_id, limit).await
    }

    async fn latest_observation(
        &self,
        panel_id: &PanelId,
    ) -> StorageResult<Option<PanelObservation>> {
        self.inner.latest_observation(panel_id).await
    }

    async fn last_cleaned(&self, panel_id: &PanelId) -> StorageResult<Option<Timestamp>> {
        self.inner.last_cleaned(panel_id).await
    }

    async fn decisions_without_execution(&self) -> StorageResult<Vec<Decision>> {
        self.inner.decisions_without_execution().await
    }

    async fn counters(&self) -> StorageResult<StoreCounters> {
        self.inner.counters().await
    }

    async fn recent_logs(&self, limit: usize) -> StorageResult<Vec<SystemLogEntry>> {
        self.inner.recent_logs(limit).await
    }

    async fn ping(&self) -> StorageResult<()> {
        if self.ping_down.load(Ordering::SeqCst) {
            return Err(StorageError::Backend {
                reason: "injected outage".to_string(),
            });
        }
        self.inner.ping().await
    }
}

// ============================================================================
// PROPTEST GENERATORS
// ============================================================================

pub mod generators {
    //! Proptest strategies for SolarSage inputs.

    use super::*;
    use proptest::prelude::*;

    pub fn arb_dust_level() -> impl Strategy<Value = f64> {
        0.0f64..=1.0
    }

    pub fn arb_confidence() -> impl Strategy<Value = f64> {
        0.0f64..=1.0
    }

    /// Readings outside [0, 1], which must be clamped.
    pub fn arb_out_of_range_level() -> impl Strategy<Value = f64> {
        prop_oneof![-10.0f64..-0.0001, 1.0001f64..10.0]
    }

    pub fn arb_panel_id() -> impl Strategy<Value = PanelId> {
        "panel_[0-9]{2}".prop_filter_map("valid panel id", |s| PanelId::new(s).ok())
    }

    pub fn arb_priority() -> impl Strategy<Value = CleaningPriority> {
        prop_oneof![
            Just(CleaningPriority::ExecuteImmediate),
            Just(CleaningPriority::ScheduleCleaning),
            Just(CleaningPriority::ContinueMonitoring),
        ]
    }

    pub fn arb_classification() -> impl Strategy<Value = Classification> {
        (arb_dust_level(), arb_confidence(), "[a-z0-9]{8}").prop_map(
            |(dust_level, confidence, tag)| Classification {
                dust_level,
                confidence,
                image_ref: format!("sim://{}", tag),
            },
        )
    }

    pub fn arb_observation() -> impl Strategy<Value = PanelObservation> {
        (arb_panel_id(), arb_classification()).prop_map(|(panel_id, c)| {
            PanelObservation::new(panel_id, c.dust_level, c.confidence, c.image_ref)
        })
    }
}

// ============================================================================
// TEST FIXTURES
// ============================================================================

pub mod fixtures {
    //! Common configurations and records.

    use super::*;
    use solarsage_core::StoreConfig;

    /// Dust level of the reference Bengaluru reading.
    pub const BENGALURU_DUST: f64 = 0.785;
    /// Dust level that, at a high electricity rate, triggers an immediate cleaning.
    pub const HEAVY_DUST: f64 = 0.9;
    pub const LIGHT_DUST: f64 = 0.2;

    pub fn panel(id: &str) -> PanelId {
        PanelId::new(id).unwrap_or_else(|e| panic!("bad fixture panel id: {}", e))
    }

    /// The four-panel Bengaluru roster on an in-memory store, with short
    /// timeouts and a seeded simulation.
    pub fn bengaluru_config() -> SolarSageConfig {
        let mut config = SolarSageConfig::default_roster();
        config.store = StoreConfig::Memory;
        config.timeouts.classify_ms = 500;
        config.timeouts.store_ms = 500;
        config.simulation.seed = Some(7);
        config
    }

    /// Like [`bengaluru_config`], with electricity expensive enough that
    /// heavy dust pays back within days.
    pub fn immediate_config() -> SolarSageConfig {
        let mut config = bengaluru_config();
        config.economics.electricity_rate = 1.0;
        config
    }

    pub fn observation_for(panel_id: &str, dust_level: f64) -> PanelObservation {
        PanelObservation::new(
            panel(panel_id),
            dust_level,
            0.9,
            format!("fixture://{}", panel_id),
        )
    }

    pub fn memory_store() -> Arc<dyn DecisionStore> {
        Arc::new(InMemoryDecisionStore::new())
    }
}

// ============================================================================
// CUSTOM ASSERTIONS
// ============================================================================

pub mod assertions {
    //! Assertions over pipeline outcomes.

    use super::*;

    /// Assert the trigger failed with `PanelBusy` for `panel_id`.
    #[track_caller]
    pub fn assert_busy<T: std::fmt::Debug>(result: &Result<T, PipelineError>, panel_id: &PanelId) {
        match result {
            Err(PipelineError::PanelBusy { panel_id: p }) => assert_eq!(p, panel_id),
            other => panic!("Expected PanelBusy for {}, got: {:?}", panel_id, other),
        }
    }

    /// Assert a run is internally consistent: one panel, one decision id.
    #[track_caller]
    pub fn assert_run_consistent(result: &PipelineResult) {
        let panel_id = &result.observation.panel_id;
        assert_eq!(&result.decision.panel_id, panel_id, "decision panel");
        assert_eq!(&result.execution.panel_id, panel_id, "execution panel");
        assert_eq!(
            result.decision.observation_id, result.observation.observation_id,
            "decision must reference its observation"
        );
        assert_eq!(
            result.execution.decision_id, result.decision.decision_id,
            "execution must reference its decision"
        );
    }

    /// Assert the execution status matches the decided priority.
    #[track_caller]
    pub fn assert_status_matches_priority(result: &PipelineResult) {
        let expected = match result.decision.priority {
            CleaningPriority::ExecuteImmediate => ExecutionStatus::Executed,
            CleaningPriority::ScheduleCleaning => ExecutionStatus::Scheduled,
            CleaningPriority::ContinueMonitoring => ExecutionStatus::Monitoring,
        };
        assert_eq!(result.execution.status, expected);
        if expected != ExecutionStatus::Executed {
            assert_eq!(result.execution.water_used_l, 0.0);
            assert_eq!(result.execution.cost_usd, 0.0);
        }
    }

    /// Assert the store holds nothing at all for `panel_id`.
    pub async fn assert_no_records(store: &dyn DecisionStore, panel_id: &PanelId) {
        let history = store
            .history(panel_id, 100)
            .await
            .unwrap_or_else(|e| panic!("history failed: {}", e));
        assert!(history.is_empty(), "expected no records, got {:?}", history);
    }
}

// ============================================================================
// TESTS
// ============================================================================
