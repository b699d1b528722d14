//! In-memory Decision Store.

use crate::{check_decision_pair, check_execution, recency, CounterBuilder, DecisionStore};
use async_trait::async_trait;
use solarsage_core::{
    Decision, DecisionId, ExecutionResult, ExecutionStatus, HistoryEntry, ObservationId,
    PanelId, PanelObservation, PipelineResult, RecordKind, StorageError, StorageResult,
    StoreCounters, SystemLogEntry, Timestamp,
};
use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

#[derive(Default)]
struct Records {
    observations: HashMap<ObservationId, PanelObservation>,
    decisions: HashMap<DecisionId, Decision>,
    by_panel: HashMap<PanelId, Vec<DecisionId>>,
    executions: HashMap<DecisionId, ExecutionResult>,
    logs: Vec<SystemLogEntry>,
}

impl Records {
    /// Decisions for a panel (or all panels), most recent first.
    fn decisions_desc(&self, panel_id: Option<&PanelId>) -> Vec<&Decision> {
        let mut decisions: Vec<&Decision> = match panel_id {
            Some(panel_id) => self
                .by_panel
                .get(panel_id)
                .map(|ids| ids.iter().filter_map(|id| self.decisions.get(id)).collect())
                .unwrap_or_default(),
            None => self.decisions.values().collect(),
        };
        decisions.sort_by(|a, b| recency(b).cmp(&recency(a)));
        decisions
    }

    fn observation_for(&self, decision: &Decision) -> StorageResult<PanelObservation> {
        self.observations
            .get(&decision.observation_id)
            .cloned()
            .ok_or_else(|| StorageError::NotFound {
                kind: RecordKind::Observation,
                id: decision.observation_id.to_string(),
            })
    }
}

/// Decision Store held in process memory. All record sets sit behind one
/// lock, so a decision write is atomic with its observation.
#[derive(Default)]
pub struct InMemoryDecisionStore {
    records: RwLock<Records>,
}

impl InMemoryDecisionStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> StorageResult<RwLockReadGuard<'_, Records>> {
        self.records.read().map_err(|_| StorageError::LockPoisoned)
    }

    fn write(&self) -> StorageResult<RwLockWriteGuard<'_, Records>> {
        self.records.write().map_err(|_| StorageError::LockPoisoned)
    }

    pub fn decision_count(&self) -> usize {
        self.read().map(|r| r.decisions.len()).unwrap_or(0)
    }

    pub fn execution_count(&self) -> usize {
        self.read().map(|r| r.executions.len()).unwrap_or(0)
    }
}

#[async_trait]
impl DecisionStore for InMemoryDecisionStore {
    fn backend_name(&self) -> &'static str {
        "memory"
    }

    async fn record_decision(
        &self,
        observation: &PanelObservation,
        decision: &Decision,
    ) -> StorageResult<()> {
        check_decision_pair(observation, decision)?;
        let mut records = self.write()?;
        if records.decisions.contains_key(&decision.decision_id) {
            return Err(StorageError::Duplicate {
                kind: RecordKind::Decision,
                id: decision.decision_id.to_string(),
            });
        }
        if records.observations.contains_key(&observation.observation_id) {
            return Err(StorageError::Duplicate {
                kind: RecordKind::Observation,
                id: observation.observation_id.to_string(),
            });
        }
        records
            .observations
            .insert(observation.observation_id, observation.clone());
        records
            .decisions
            .insert(decision.decision_id, decision.clone());
        records
            .by_panel
            .entry(decision.panel_id.clone())
            .or_default()
            .push(decision.decision_id);
        Ok(())
    }

    async fn record_execution(&self, result: &ExecutionResult) -> StorageResult<()> {
        let mut records = self.write()?;
        check_execution(
            result,
            records.decisions.get(&result.decision_id),
            records.executions.get(&result.decision_id),
        )?;
        records.executions.insert(result.decision_id, result.clone());
        Ok(())
    }

    async fn append_log(&self, entry: &SystemLogEntry) -> StorageResult<()> {
        self.write()?.logs.push(entry.clone());
        Ok(())
    }

    async fn decision_get(&self, decision_id: DecisionId) -> StorageResult<Option<Decision>> {
        Ok(self.read()?.decisions.get(&decision_id).cloned())
    }

    async fn execution_get(
        &self,
        decision_id: DecisionId,
    ) -> StorageResult<Option<ExecutionResult>> {
        Ok(self.read()?.executions.get(&decision_id).cloned())
    }

    async fn latest_complete(
        &self,
        panel_id: Option<&PanelId>,
    ) -> StorageResult<Option<PipelineResult>> {
        let records = self.read()?;
        for decision in records.decisions_desc(panel_id) {
            if let Some(execution) = records.executions.get(&decision.decision_id) {
                return Ok(Some(PipelineResult {
                    observation: records.observation_for(decision)?,
                    decision: decision.clone(),
                    execution: execution.clone(),
                }));
            }
        }
        Ok(None)
    }

    async fn history(&self, panel_id: &PanelId, limit: usize) -> StorageResult<Vec<HistoryEntry>> {
        let records = self.read()?;
        records
            .decisions_desc(Some(panel_id))
            .into_iter()
            .take(limit)
            .map(|decision| {
                Ok(HistoryEntry {
                    observation: records.observation_for(decision)?,
                    decision: decision.clone(),
                    execution: records.executions.get(&decision.decision_id).cloned(),
                })
            })
            .collect()
    }

    async fn latest_observation(
        &self,
        panel_id: &PanelId,
    ) -> StorageResult<Option<PanelObservation>> {
        let records = self.read()?;
        Ok(records
            .observations
            .values()
            .filter(|o| &o.panel_id == panel_id)
            .max_by_key(|o| (o.timestamp, o.observation_id))
            .cloned())
    }

    async fn last_cleaned(&self, panel_id: &PanelId) -> StorageResult<Option<Timestamp>> {
        let records = self.read()?;
        Ok(records
            .executions
            .values()
            .filter(|e| &e.panel_id == panel_id && e.status == ExecutionStatus::Executed)
            .map(|e| e.timestamp)
            .max())
    }

    async fn decisions_without_execution(&self) -> StorageResult<Vec<Decision>> {
        let records = self.read()?;
        let mut pending: Vec<Decision> = records
            .decisions
            .values()
            .filter(|d| !records.executions.contains_key(&d.decision_id))
            .cloned()
            .collect();
        pending.sort_by_key(recency);
        Ok(pending)
    }

    async fn counters(&self) -> StorageResult<StoreCounters> {
        let records = self.read()?;
        let mut builder = CounterBuilder::default();
        records.observations.values().for_each(|o| builder.observation(o));
        records.decisions.values().for_each(|d| builder.decision(d));
        records.executions.values().for_each(|e| builder.execution(e));
        Ok(builder.finish())
    }

    async fn recent_logs(&self, limit: usize) -> StorageResult<Vec<SystemLogEntry>> {
        let records = self.read()?;
        Ok(records.logs.iter().rev().take(limit).cloned().collect())
    }

    async fn ping(&self) -> StorageResult<()> {
        self.read().map(|_| ())
    }
}
