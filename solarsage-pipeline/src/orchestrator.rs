//! Pipeline orchestrator.
//!
//! One trigger runs the four stages for one panel under that panel's lease:
//!
//! ```text
//! lease -> classify -> forecast -> decide -> persist decision -> execute -> persist result
//! ```
//!
//! The observation and decision are written together before anything is
//! executed. The execution result is written after; if that write fails a
//! single compensating FAILED write is attempted, and whatever is still
//! missing is picked up by [`Orchestrator::reconcile`].

use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use serde_json::json;
use solarsage_core::{
    Assessment, Decision, ExecutionResult, Forecast, HealthCheck, HealthReport, HistoryConfig,
    HistoryEntry, LogLevel, PanelId, PanelObservation, PanelState, PanelStatus, PipelineError,
    PipelineResult, PipelineStage, RecordKind, SolarSageConfig, SolarSageResult, StorageError,
    SystemLogEntry, SystemStats, TimeoutConfig,
};
use solarsage_engine::{
    Classification, Classifier, DecisionEngine, ExecutionRequest, Executor, Forecaster,
    LocationLookup,
};
use solarsage_storage::DecisionStore;
use tokio::sync::watch;
use tokio::time::timeout;
use tracing::{debug, error, info, info_span, warn, Instrument};

use crate::lock::PanelLocks;
use crate::registry::PanelRegistry;

/// Attempts at writing a decision before giving up on id collisions.
const MAX_DECISION_ID_ATTEMPTS: usize = 3;

const COMPONENT: &str = "orchestrator";

/// Input of one pipeline run.
#[derive(Debug, Clone)]
pub struct TriggerRequest {
    pub panel_id: PanelId,
    /// Overrides the roster location for this run
    pub location: Option<String>,
    /// `true` on this channel before classification starts cancels the run
    pub cancel: Option<watch::Receiver<bool>>,
}

impl TriggerRequest {
    pub fn new(panel_id: PanelId) -> Self {
        Self {
            panel_id,
            location: None,
            cancel: None,
        }
    }

    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }

    pub fn with_cancel(mut self, cancel: watch::Receiver<bool>) -> Self {
        self.cancel = Some(cancel);
        self
    }

    fn is_cancelled(&self) -> bool {
        self.cancel.as_ref().is_some_and(|rx| *rx.borrow())
    }
}

/// Outcome of [`Orchestrator::reconcile`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReconcileReport {
    pub pending: usize,
    pub resolved: usize,
    pub failed: usize,
}

/// Runs pipeline triggers and answers queries over stored runs.
pub struct Orchestrator {
    classifier: Arc<dyn Classifier>,
    forecaster: Forecaster,
    engine: DecisionEngine,
    executor: Executor,
    store: Arc<dyn DecisionStore>,
    registry: PanelRegistry,
    locks: PanelLocks,
    timeouts: TimeoutConfig,
    history: HistoryConfig,
}

impl Orchestrator {
    /// Build from configuration, with the simulated executor.
    pub fn new(
        config: &SolarSageConfig,
        classifier: Arc<dyn Classifier>,
        store: Arc<dyn DecisionStore>,
    ) -> Self {
        Self {
            classifier,
            forecaster: Forecaster::from_config(config),
            engine: DecisionEngine::new(config.model_confidence_threshold),
            executor: Executor::simulated(config.simulation.clone()),
            store,
            registry: PanelRegistry::from_config(config),
            locks: PanelLocks::new(),
            timeouts: config.timeouts.clone(),
            history: config.history.clone(),
        }
    }

    pub fn with_executor(mut self, executor: Executor) -> Self {
        self.executor = executor;
        self
    }

    pub fn registry(&self) -> &PanelRegistry {
        &self.registry
    }

    pub fn locks(&self) -> &PanelLocks {
        &self.locks
    }

    pub fn store(&self) -> &Arc<dyn DecisionStore> {
        &self.store
    }

    // ========================================================================
    // TRIGGER
    // ========================================================================

    /// Run the pipeline once for a panel.
    pub async fn trigger(&self, request: TriggerRequest) -> Result<PipelineResult, PipelineError> {
        let panel_id = request.panel_id.clone();
        let span = info_span!("pipeline_run", panel_id = %panel_id);
        async move {
            let started = Instant::now();
            let outcome = self.run(request).await;
            let elapsed_ms = started.elapsed().as_millis() as u64;
            self.record_outcome(&panel_id, &outcome, elapsed_ms).await;
            outcome
        }
        .instrument(span)
        .await
    }

    async fn run(&self, request: TriggerRequest) -> Result<PipelineResult, PipelineError> {
        let panel_id = request.panel_id.clone();
        let _lease = self.locks.acquire(&panel_id)?;

        if request.is_cancelled() {
            return Err(PipelineError::Cancelled { panel_id });
        }

        let classification = self.classify(&panel_id).await?;
        let observation = PanelObservation::new(
            panel_id.clone(),
            classification.dust_level,
            classification.confidence,
            classification.image_ref,
        );
        if observation.confidence < self.engine.confidence_threshold() {
            warn!(
                confidence = observation.confidence,
                threshold = self.engine.confidence_threshold(),
                "low-confidence classification"
            );
        }

        let location = request
            .location
            .unwrap_or_else(|| self.registry.location_for(&panel_id).to_string());
        let (forecast, lookup) = self.forecaster.forecast(observation.dust_level, &location);
        if let LocationLookup::Fallback { city } = &lookup {
            warn!(
                stage = %PipelineStage::Forecast,
                location = %location,
                capacity_kwh = forecast.capacity_kwh,
                "InvalidLocation: unknown city, using default capacity"
            );
            self.log(
                LogLevel::Warning,
                "forecaster",
                format!("InvalidLocation: {}", city),
                json!({
                    "panel_id": panel_id,
                    "location": location,
                    "capacity_kwh": forecast.capacity_kwh,
                }),
            )
            .await;
        }

        let assessment = self.engine.assess(&observation, &forecast);
        let decision = self.persist_decision(&observation, assessment, forecast).await?;
        debug!(
            decision_id = %decision.decision_id,
            priority = %decision.priority,
            combined_score = decision.combined_score,
            "decision persisted"
        );

        let request = ExecutionRequest::from(&decision);
        let (execution, execution_error) = match self.executor.execute(&request) {
            Ok(result) => (result, None),
            Err(e) => {
                error!(decision_id = %decision.decision_id, error = %e, "executor failed");
                let failed = ExecutionResult::failed(
                    decision.decision_id,
                    panel_id.clone(),
                    e.to_string(),
                );
                (failed, Some(e))
            }
        };
        let execution = self.persist_execution(&decision, execution).await?;

        if let Some(source) = execution_error {
            return Err(PipelineError::ExecutionFailed {
                panel_id,
                decision_id: decision.decision_id,
                source,
            });
        }

        Ok(PipelineResult {
            observation,
            decision,
            execution,
        })
    }

    async fn classify(&self, panel_id: &PanelId) -> Result<Classification, PipelineError> {
        let after = self.timeouts.classify();
        match timeout(after, self.classifier.classify(panel_id)).await {
            Err(_) => Err(PipelineError::Timeout {
                panel_id: panel_id.clone(),
                stage: PipelineStage::Classify,
                after,
            }),
            Ok(result) => result
                .and_then(Classification::validate)
                .map_err(|source| PipelineError::ClassificationFailed {
                    panel_id: panel_id.clone(),
                    source,
                }),
        }
    }

    /// Run a store call under the store timeout.
    async fn store_call<T, F>(
        &self,
        panel_id: &PanelId,
        stage: PipelineStage,
        call: F,
    ) -> Result<T, PipelineError>
    where
        F: Future<Output = Result<T, StorageError>>,
    {
        let after = self.timeouts.store();
        match timeout(after, call).await {
            Err(_) => Err(PipelineError::Timeout {
                panel_id: panel_id.clone(),
                stage,
                after,
            }),
            Ok(result) => result.map_err(|source| PipelineError::Store {
                panel_id: panel_id.clone(),
                source,
            }),
        }
    }

    async fn persist_decision(
        &self,
        observation: &PanelObservation,
        assessment: Assessment,
        forecast: Forecast,
    ) -> Result<Decision, PipelineError> {
        let panel_id = &observation.panel_id;
        let mut decision = Decision::from_assessment(observation, assessment, forecast);
        let mut attempt = 1;
        loop {
            let outcome = {
                let write = self.store.record_decision(observation, &decision);
                self.store_call(panel_id, PipelineStage::PersistDecision, write)
                    .await
            };
            match outcome {
                Ok(()) => return Ok(decision),
                Err(PipelineError::Store {
                    source:
                        StorageError::Duplicate {
                            kind: RecordKind::Decision,
                            ..
                        },
                    ..
                }) if attempt < MAX_DECISION_ID_ATTEMPTS => {
                    warn!(decision_id = %decision.decision_id, attempt, "decision id collision, regenerating");
                    decision = decision.with_fresh_id();
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn persist_execution(
        &self,
        decision: &Decision,
        result: ExecutionResult,
    ) -> Result<ExecutionResult, PipelineError> {
        let panel_id = &decision.panel_id;
        let write = self.store.record_execution(&result);
        let err = match self
            .store_call(panel_id, PipelineStage::PersistExecution, write)
            .await
        {
            Ok(()) => return Ok(result),
            Err(e) => e,
        };

        error!(decision_id = %decision.decision_id, error = %err, "execution write failed, compensating");
        let compensation = ExecutionResult::failed(
            decision.decision_id,
            panel_id.clone(),
            format!("execution write failed: {}", err),
        );
        let write = self.store.record_execution(&compensation);
        match self
            .store_call(panel_id, PipelineStage::PersistExecution, write)
            .await
        {
            Ok(()) => {
                self.log(
                    LogLevel::Warning,
                    COMPONENT,
                    "compensating FAILED result recorded",
                    json!({ "panel_id": panel_id, "decision_id": decision.decision_id }),
                )
                .await;
            }
            Err(e) => {
                error!(
                    decision_id = %decision.decision_id,
                    error = %e,
                    "compensating write failed, leaving decision for reconcile"
                );
            }
        }
        Err(err)
    }

    async fn record_outcome(
        &self,
        panel_id: &PanelId,
        outcome: &Result<PipelineResult, PipelineError>,
        elapsed_ms: u64,
    ) {
        match outcome {
            Ok(result) => {
                info!(
                    decision_id = %result.decision.decision_id,
                    priority = %result.decision.priority,
                    status = %result.execution.status,
                    elapsed_ms,
                    "pipeline run completed"
                );
                self.log(
                    LogLevel::Info,
                    COMPONENT,
                    "pipeline run completed",
                    json!({
                        "panel_id": panel_id,
                        "decision_id": result.decision.decision_id,
                        "priority": result.decision.priority,
                        "status": result.execution.status,
                        "dust_level": result.observation.dust_level,
                        "combined_score": result.decision.combined_score,
                        "low_confidence": result.decision.low_confidence,
                        "elapsed_ms": elapsed_ms,
                    }),
                )
                .await;
            }
            Err(e) if e.is_busy() => {
                debug!("trigger skipped, panel busy");
                self.log(
                    LogLevel::Info,
                    COMPONENT,
                    "trigger skipped: panel busy",
                    json!({ "panel_id": panel_id }),
                )
                .await;
            }
            Err(e) => {
                let level = match e {
                    PipelineError::Cancelled { .. } => LogLevel::Warning,
                    _ => LogLevel::Error,
                };
                if level == LogLevel::Error {
                    error!(error = %e, elapsed_ms, "pipeline run failed");
                } else {
                    warn!(error = %e, elapsed_ms, "pipeline run cancelled");
                }
                self.log(
                    level,
                    COMPONENT,
                    "pipeline run failed",
                    json!({
                        "panel_id": panel_id,
                        "error": e.to_string(),
                        "elapsed_ms": elapsed_ms,
                    }),
                )
                .await;
            }
        }
    }

    /// Best-effort system log append. Failures only reach tracing.
    async fn log(
        &self,
        level: LogLevel,
        component: &str,
        message: impl Into<String>,
        details: serde_json::Value,
    ) {
        let entry = SystemLogEntry::new(level, component, message, details);
        match timeout(self.timeouts.store(), self.store.append_log(&entry)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!(error = %e, "system log write failed"),
            Err(_) => warn!("system log write timed out"),
        }
    }

    // ========================================================================
    // MAINTENANCE
    // ========================================================================

    /// Write FAILED results for decisions that never got one.
    ///
    /// Decisions whose panel currently holds a lease are skipped; their run
    /// may still be writing.
    pub async fn reconcile(&self) -> SolarSageResult<ReconcileReport> {
        let pending = self.store.decisions_without_execution().await?;
        let mut report = ReconcileReport {
            pending: pending.len(),
            ..ReconcileReport::default()
        };
        for decision in pending {
            if self.locks.is_held(&decision.panel_id) {
                continue;
            }
            let failed = ExecutionResult::failed(
                decision.decision_id,
                decision.panel_id.clone(),
                "reconciled: execution result was never recorded",
            );
            match self.store.record_execution(&failed).await {
                Ok(()) => report.resolved += 1,
                // written in the meantime
                Err(StorageError::Duplicate { .. }) => {}
                Err(e) => {
                    warn!(decision_id = %decision.decision_id, error = %e, "reconcile write failed");
                    report.failed += 1;
                }
            }
        }
        if report.pending > 0 {
            info!(
                pending = report.pending,
                resolved = report.resolved,
                failed = report.failed,
                "reconcile finished"
            );
            self.log(
                LogLevel::Warning,
                COMPONENT,
                "reconciled decisions without execution",
                json!(report),
            )
            .await;
        }
        Ok(report)
    }

    /// Component health: store reachability, classifier, lease table.
    pub async fn health(&self) -> HealthReport {
        let started = Instant::now();
        let store_check = match timeout(self.timeouts.store(), self.store.ping()).await {
            Ok(Ok(())) => HealthCheck::healthy("store"),
            Ok(Err(e)) => HealthCheck::unhealthy("store", e.to_string()),
            Err(_) => HealthCheck::unhealthy(
                "store",
                format!("ping timed out after {:?}", self.timeouts.store()),
            ),
        }
        .with_response_time(started.elapsed().as_millis() as u64)
        .with_detail("backend", json!(self.store.backend_name()));

        let classifier_check = HealthCheck::healthy("classifier")
            .with_detail("name", json!(self.classifier.name()))
            .with_detail("timeout_ms", json!(self.timeouts.classify_ms));

        let lease_check = HealthCheck::healthy("leases")
            .with_detail("in_flight", json!(self.locks.in_flight()))
            .with_detail("roster_size", json!(self.registry.len()));

        HealthReport::from_checks(vec![store_check, classifier_check, lease_check])
    }

    // ========================================================================
    // QUERIES
    // ========================================================================

    /// Most recent complete run, for one panel or any panel.
    pub async fn latest_decision(
        &self,
        panel_id: Option<&PanelId>,
    ) -> SolarSageResult<PipelineResult> {
        self.store
            .latest_complete(panel_id)
            .await?
            .ok_or_else(|| {
                PipelineError::NotFound {
                    panel_id: panel_id.cloned(),
                }
                .into()
            })
    }

    /// Derived state of every roster panel.
    pub async fn list_panels(&self) -> SolarSageResult<Vec<PanelState>> {
        let mut states = Vec::with_capacity(self.registry.len());
        for panel_id in self.registry.panel_ids() {
            let observation = self.store.latest_observation(panel_id).await?;
            let last_cleaned = self.store.last_cleaned(panel_id).await?;
            let state = match observation {
                Some(observation) => PanelState {
                    panel_id: panel_id.clone(),
                    status: observation.status(),
                    dust_level: Some(observation.dust_level),
                    last_observed: Some(observation.timestamp),
                    last_cleaned,
                },
                None => PanelState {
                    status: PanelStatus::Unknown,
                    last_cleaned,
                    ..PanelState::unknown(panel_id.clone())
                },
            };
            states.push(state);
        }
        Ok(states)
    }

    /// Runs for a panel, most recent first. The limit is clamped to the configured bounds.
    pub async fn history(
        &self,
        panel_id: &PanelId,
        limit: Option<usize>,
    ) -> SolarSageResult<Vec<HistoryEntry>> {
        let limit = self.history.clamp(limit);
        Ok(self.store.history(panel_id, limit).await?)
    }

    pub async fn stats(&self) -> SolarSageResult<SystemStats> {
        let counters = self.store.counters().await?;
        Ok(SystemStats::from_counters(self.registry.len(), counters))
    }

    /// System log, most recent first. The limit is clamped like history.
    pub async fn logs(&self, limit: Option<usize>) -> SolarSageResult<Vec<SystemLogEntry>> {
        let limit = self.history.clamp(limit);
        Ok(self.store.recent_logs(limit).await?)
    }
}
