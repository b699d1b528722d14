//! SolarSage Storage - Decision Store
//!
//! Append-only persistence for pipeline runs: observations, decisions,
//! execution results and the system log. Two backends implement the same
//! [`DecisionStore`] contract:
//!
//! - [`InMemoryDecisionStore`] for tests and ephemeral runs
//! - [`LmdbDecisionStore`] for durable storage via heed
//!
//! Both enforce the same write rules. An observation and its decision are
//! written together or not at all. An execution result is rejected unless
//! its decision exists and has no result yet.

use async_trait::async_trait;
use solarsage_core::{
    Decision, DecisionId, ExecutionResult, ExecutionStatus, HistoryEntry, PanelId,
    PanelObservation, PipelineResult, RecordKind, StorageError, StorageResult, StoreConfig,
    StoreCounters, SystemLogEntry, Timestamp,
};
use std::sync::Arc;

mod lmdb;
mod memory;

pub use lmdb::{LmdbDecisionStore, LmdbError};
pub use memory::InMemoryDecisionStore;

/// Persistence contract for pipeline records.
///
/// All records are append-only. "Most recent" means the greatest
/// `(timestamp, decision_id)` pair, so ties on the clock still have a
/// stable order.
#[async_trait]
pub trait DecisionStore: Send + Sync {
    /// Backend name for logs and health reports.
    fn backend_name(&self) -> &'static str;

    // ========================================================================
    // WRITES
    // ========================================================================

    /// Persist an observation and the decision made from it, atomically.
    ///
    /// Fails with `Duplicate` if either id is already present.
    async fn record_decision(
        &self,
        observation: &PanelObservation,
        decision: &Decision,
    ) -> StorageResult<()>;

    /// Persist the single execution result of a stored decision.
    ///
    /// Fails with `MissingDecision` if the decision is absent and with
    /// `Duplicate` if a result is already recorded.
    async fn record_execution(&self, result: &ExecutionResult) -> StorageResult<()>;

    async fn append_log(&self, entry: &SystemLogEntry) -> StorageResult<()>;

    // ========================================================================
    // READS
    // ========================================================================

    async fn decision_get(&self, decision_id: DecisionId) -> StorageResult<Option<Decision>>;

    async fn execution_get(
        &self,
        decision_id: DecisionId,
    ) -> StorageResult<Option<ExecutionResult>>;

    /// Most recent complete run, for one panel or across all panels.
    async fn latest_complete(
        &self,
        panel_id: Option<&PanelId>,
    ) -> StorageResult<Option<PipelineResult>>;

    /// Runs for a panel, most recent first, at most `limit`.
    async fn history(&self, panel_id: &PanelId, limit: usize) -> StorageResult<Vec<HistoryEntry>>;

    async fn latest_observation(
        &self,
        panel_id: &PanelId,
    ) -> StorageResult<Option<PanelObservation>>;

    /// Time of the latest EXECUTED result for a panel.
    async fn last_cleaned(&self, panel_id: &PanelId) -> StorageResult<Option<Timestamp>>;

    /// Decisions that have no execution result yet, oldest first.
    async fn decisions_without_execution(&self) -> StorageResult<Vec<Decision>>;

    async fn counters(&self) -> StorageResult<StoreCounters>;

    /// Log entries, most recent first, at most `limit`.
    async fn recent_logs(&self, limit: usize) -> StorageResult<Vec<SystemLogEntry>>;

    /// Cheap reachability check.
    async fn ping(&self) -> StorageResult<()>;
}

/// Open the backend selected by configuration.
pub fn open_store(config: &StoreConfig) -> StorageResult<Arc<dyn DecisionStore>> {
    match config {
        StoreConfig::Memory => Ok(Arc::new(InMemoryDecisionStore::new())),
        StoreConfig::Lmdb { path, max_size_mb } => {
            let store = LmdbDecisionStore::open(path, *max_size_mb)?;
            Ok(Arc::new(store))
        }
    }
}

// ============================================================================
// SHARED RULES
// ============================================================================

/// Ordering key for "most recent".
pub(crate) fn recency(decision: &Decision) -> (Timestamp, DecisionId) {
    (decision.timestamp, decision.decision_id)
}

/// Structural checks shared by both backends before a decision write.
pub(crate) fn check_decision_pair(
    observation: &PanelObservation,
    decision: &Decision,
) -> StorageResult<()> {
    if decision.observation_id != observation.observation_id {
        return Err(StorageError::InsertFailed {
            kind: RecordKind::Decision,
            reason: format!(
                "decision {} references observation {}, got {}",
                decision.decision_id, decision.observation_id, observation.observation_id
            ),
        });
    }
    if decision.panel_id != observation.panel_id {
        return Err(StorageError::InsertFailed {
            kind: RecordKind::Decision,
            reason: format!(
                "decision panel {} does not match observation panel {}",
                decision.panel_id, observation.panel_id
            ),
        });
    }
    Ok(())
}

/// Checks an execution result against its stored decision.
pub(crate) fn check_execution(
    result: &ExecutionResult,
    decision: Option<&Decision>,
    existing: Option<&ExecutionResult>,
) -> StorageResult<()> {
    let decision = decision.ok_or(StorageError::MissingDecision {
        decision_id: result.decision_id,
    })?;
    if existing.is_some() {
        return Err(StorageError::Duplicate {
            kind: RecordKind::Execution,
            id: result.decision_id.to_string(),
        });
    }
    if decision.panel_id != result.panel_id {
        return Err(StorageError::InsertFailed {
            kind: RecordKind::Execution,
            reason: format!(
                "execution panel {} does not match decision panel {}",
                result.panel_id, decision.panel_id
            ),
        });
    }
    Ok(())
}

/// Accumulates counters from a scan over the record sets.
#[derive(Default)]
pub(crate) struct CounterBuilder {
    counters: StoreCounters,
}

impl CounterBuilder {
    pub(crate) fn observation(&mut self, observation: &PanelObservation) {
        self.counters.total_analyses += 1;
        self.counters.dust_level_sum += observation.dust_level;
    }

    pub(crate) fn decision(&mut self, decision: &Decision) {
        self.counters.total_decisions += 1;
        *self
            .counters
            .decisions_by_priority
            .entry(decision.priority)
            .or_insert(0) += 1;
    }

    pub(crate) fn execution(&mut self, result: &ExecutionResult) {
        if result.status == ExecutionStatus::Executed {
            self.counters.total_cleanings += 1;
        }
        self.counters.water_used_total_l += result.water_used_l;
    }

    pub(crate) fn finish(self) -> StoreCounters {
        self.counters
    }
}
