//! LMDB-backed Decision Store.
//!
//! Uses heed with one named database per record set. Values are JSON.
//!
//! | database       | key                                      | value            |
//! |----------------|------------------------------------------|------------------|
//! | `observations` | observation id (16 bytes)                | PanelObservation |
//! | `decisions`    | decision id (16 bytes)                   | Decision         |
//! | `panel_index`  | panel id, `0x00`, micros (8 BE), id (16) | empty            |
//! | `executions`   | decision id (16 bytes)                   | ExecutionResult  |
//! | `logs`         | log id (16 bytes, time ordered)          | SystemLogEntry   |
//!
//! Every write happens in a single write transaction, so an observation
//! and its decision land together or not at all.

use std::path::Path;

use async_trait::async_trait;
use heed::types::Bytes;
use heed::{Database, Env, EnvOpenOptions, RoTxn, RwTxn};
use serde::de::DeserializeOwned;
use serde::Serialize;
use solarsage_core::{
    Decision, DecisionId, ExecutionResult, ExecutionStatus, HistoryEntry, PanelId,
    PanelObservation, PipelineResult, RecordId, RecordKind, StorageError, StorageResult,
    StoreCounters, SystemLogEntry, Timestamp,
};

use uuid::Uuid;

use crate::{check_decision_pair, check_execution, recency, CounterBuilder, DecisionStore};

/// Error type for LMDB environment operations.
#[derive(Debug, thiserror::Error)]
pub enum LmdbError {
    #[error("Failed to open LMDB environment: {0}")]
    EnvOpen(String),

    #[error("Failed to open database {name}: {reason}")]
    DbOpen { name: &'static str, reason: String },

    #[error("Transaction error: {0}")]
    Transaction(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<LmdbError> for StorageError {
    fn from(e: LmdbError) -> Self {
        StorageError::Backend {
            reason: e.to_string(),
        }
    }
}

fn txn_err(e: heed::Error) -> StorageError {
    LmdbError::Transaction(e.to_string()).into()
}

const PANEL_KEY_SEPARATOR: u8 = 0x00;
const MAX_DBS: u32 = 5;

type RawDb = Database<Bytes, Bytes>;

/// Durable Decision Store.
pub struct LmdbDecisionStore {
    env: Env,
    observations: RawDb,
    decisions: RawDb,
    panel_index: RawDb,
    executions: RawDb,
    logs: RawDb,
}

impl LmdbDecisionStore {
    /// Open (or create) a store in `path`, with a map of `max_size_mb` megabytes.
    pub fn open<P: AsRef<Path>>(path: P, max_size_mb: usize) -> Result<Self, LmdbError> {
        std::fs::create_dir_all(&path)?;

        // SAFETY: the environment is opened once per path by this process.
        let env = unsafe {
            EnvOpenOptions::new()
                .map_size(max_size_mb * 1024 * 1024)
                .max_dbs(MAX_DBS)
                .open(path.as_ref())
        }
        .map_err(|e| LmdbError::EnvOpen(e.to_string()))?;

        let mut wtxn = env
            .write_txn()
            .map_err(|e| LmdbError::Transaction(e.to_string()))?;
        let mut create = |name: &'static str| -> Result<RawDb, LmdbError> {
            env.create_database(&mut wtxn, Some(name))
                .map_err(|e| LmdbError::DbOpen {
                    name,
                    reason: e.to_string(),
                })
        };
        let observations = create("observations")?;
        let decisions = create("decisions")?;
        let panel_index = create("panel_index")?;
        let executions = create("executions")?;
        let logs = create("logs")?;
        wtxn.commit()
            .map_err(|e| LmdbError::Transaction(e.to_string()))?;

        tracing::debug!(path = %path.as_ref().display(), max_size_mb, "opened LMDB decision store");

        Ok(Self {
            env,
            observations,
            decisions,
            panel_index,
            executions,
            logs,
        })
    }

    fn read_txn(&self) -> StorageResult<RoTxn<'_>> {
        self.env.read_txn().map_err(txn_err)
    }

    fn write_txn(&self) -> StorageResult<RwTxn<'_>> {
        self.env.write_txn().map_err(txn_err)
    }
}

// ============================================================================
// KEYS AND VALUES
// ============================================================================

fn id_key<I: RecordId>(id: &I) -> [u8; 16] {
    *id.as_uuid().as_bytes()
}

fn panel_prefix(panel_id: &PanelId) -> Vec<u8> {
    let mut key = Vec::with_capacity(panel_id.as_str().len() + 1);
    key.extend_from_slice(panel_id.as_str().as_bytes());
    key.push(PANEL_KEY_SEPARATOR);
    key
}

/// Sign-flipped so that byte order matches numeric order for negative times too.
fn time_key(ts: &Timestamp) -> [u8; 8] {
    let micros = ts.timestamp_micros();
    ((micros as u64) ^ (1u64 << 63)).to_be_bytes()
}

fn panel_key(decision: &Decision) -> Vec<u8> {
    let mut key = panel_prefix(&decision.panel_id);
    key.extend_from_slice(&time_key(&decision.timestamp));
    key.extend_from_slice(&id_key(&decision.decision_id));
    key
}

/// Decision id from the tail of a panel index key.
fn decision_id_from_panel_key(key: &[u8]) -> StorageResult<DecisionId> {
    let start = key.len().checked_sub(16).ok_or_else(|| StorageError::Backend {
        reason: "panel index key too short".to_string(),
    })?;
    let mut bytes = [0u8; 16];
    bytes.copy_from_slice(&key[start..]);
    Ok(DecisionId::new(Uuid::from_bytes(bytes)))
}

fn encode<T: Serialize>(kind: RecordKind, value: &T) -> StorageResult<Vec<u8>> {
    serde_json::to_vec(value).map_err(|e| StorageError::Serialization {
        kind,
        reason: e.to_string(),
    })
}

fn decode<T: DeserializeOwned>(kind: RecordKind, bytes: &[u8]) -> StorageResult<T> {
    serde_json::from_slice(bytes).map_err(|e| StorageError::Serialization {
        kind,
        reason: e.to_string(),
    })
}

fn get<T: DeserializeOwned>(
    db: &RawDb,
    txn: &RoTxn<'_>,
    kind: RecordKind,
    key: &[u8],
) -> StorageResult<Option<T>> {
    match db.get(txn, key).map_err(txn_err)? {
        Some(bytes) => decode(kind, bytes).map(Some),
        None => Ok(None),
    }
}

fn scan<T: DeserializeOwned>(db: &RawDb, txn: &RoTxn<'_>, kind: RecordKind) -> StorageResult<Vec<T>> {
    let mut out = Vec::new();
    for item in db.iter(txn).map_err(txn_err)? {
        let (_, bytes) = item.map_err(txn_err)?;
        out.push(decode(kind, bytes)?);
    }
    Ok(out)
}

impl LmdbDecisionStore {
    fn decision(&self, txn: &RoTxn<'_>, id: DecisionId) -> StorageResult<Option<Decision>> {
        get(&self.decisions, txn, RecordKind::Decision, &id_key(&id))
    }

    fn execution(
        &self,
        txn: &RoTxn<'_>,
        id: DecisionId,
    ) -> StorageResult<Option<ExecutionResult>> {
        get(&self.executions, txn, RecordKind::Execution, &id_key(&id))
    }

    fn observation_for(&self, txn: &RoTxn<'_>, decision: &Decision) -> StorageResult<PanelObservation> {
        get(
            &self.observations,
            txn,
            RecordKind::Observation,
            &id_key(&decision.observation_id),
        )?
        .ok_or_else(|| StorageError::NotFound {
            kind: RecordKind::Observation,
            id: decision.observation_id.to_string(),
        })
    }

    /// Decision ids for a panel, most recent first.
    fn panel_decision_ids(&self, txn: &RoTxn<'_>, panel_id: &PanelId) -> StorageResult<Vec<DecisionId>> {
        let prefix = panel_prefix(panel_id);
        let mut ids = Vec::new();
        for item in self
            .panel_index
            .rev_prefix_iter(txn, &prefix)
            .map_err(txn_err)?
        {
            let (key, _) = item.map_err(txn_err)?;
            ids.push(decision_id_from_panel_key(key)?);
        }
        Ok(ids)
    }

    /// Decisions for a panel (or all panels), most recent first.
    fn decisions_desc(&self, txn: &RoTxn<'_>, panel_id: Option<&PanelId>) -> StorageResult<Vec<Decision>> {
        let mut decisions = match panel_id {
            Some(panel_id) => {
                let mut out = Vec::new();
                for id in self.panel_decision_ids(txn, panel_id)? {
                    if let Some(decision) = self.decision(txn, id)? {
                        out.push(decision);
                    }
                }
                out
            }
            None => scan::<Decision>(&self.decisions, txn, RecordKind::Decision)?,
        };
        decisions.sort_by(|a, b| recency(b).cmp(&recency(a)));
        Ok(decisions)
    }

    fn put_new(
        db: &RawDb,
        txn: &mut RwTxn<'_>,
        kind: RecordKind,
        key: &[u8],
        value: &[u8],
        id: String,
    ) -> StorageResult<()> {
        if db.get(txn, key).map_err(txn_err)?.is_some() {
            return Err(StorageError::Duplicate { kind, id });
        }
        db.put(txn, key, value).map_err(txn_err)
    }
}

#[async_trait]
impl DecisionStore for LmdbDecisionStore {
    fn backend_name(&self) -> &'static str {
        "lmdb"
    }

    async fn record_decision(
        &self,
        observation: &PanelObservation,
        decision: &Decision,
    ) -> StorageResult<()> {
        check_decision_pair(observation, decision)?;
        let observation_bytes = encode(RecordKind::Observation, observation)?;
        let decision_bytes = encode(RecordKind::Decision, decision)?;

        let mut wtxn = self.write_txn()?;
        Self::put_new(
            &self.decisions,
            &mut wtxn,
            RecordKind::Decision,
            &id_key(&decision.decision_id),
            &decision_bytes,
            decision.decision_id.to_string(),
        )?;
        Self::put_new(
            &self.observations,
            &mut wtxn,
            RecordKind::Observation,
            &id_key(&observation.observation_id),
            &observation_bytes,
            observation.observation_id.to_string(),
        )?;
        self.panel_index
            .put(&mut wtxn, &panel_key(decision), &[])
            .map_err(txn_err)?;
        // dropping an uncommitted txn aborts it, so the early returns above write nothing
        wtxn.commit().map_err(txn_err)
    }

    async fn record_execution(&self, result: &ExecutionResult) -> StorageResult<()> {
        let bytes = encode(RecordKind::Execution, result)?;
        let mut wtxn = self.write_txn()?;
        let key = id_key(&result.decision_id);
        let decision: Option<Decision> =
            get(&self.decisions, &wtxn, RecordKind::Decision, &key)?;
        let existing: Option<ExecutionResult> =
            get(&self.executions, &wtxn, RecordKind::Execution, &key)?;
        check_execution(result, decision.as_ref(), existing.as_ref())?;
        self.executions
            .put(&mut wtxn, &key, &bytes)
            .map_err(txn_err)?;
        wtxn.commit().map_err(txn_err)
    }

    async fn append_log(&self, entry: &SystemLogEntry) -> StorageResult<()> {
        let bytes = encode(RecordKind::SystemLog, entry)?;
        let mut wtxn = self.write_txn()?;
        Self::put_new(
            &self.logs,
            &mut wtxn,
            RecordKind::SystemLog,
            &id_key(&entry.log_id),
            &bytes,
            entry.log_id.to_string(),
        )?;
        wtxn.commit().map_err(txn_err)
    }

    async fn decision_get(&self, decision_id: DecisionId) -> StorageResult<Option<Decision>> {
        let rtxn = self.read_txn()?;
        self.decision(&rtxn, decision_id)
    }

    async fn execution_get(
        &self,
        decision_id: DecisionId,
    ) -> StorageResult<Option<ExecutionResult>> {
        let rtxn = self.read_txn()?;
        self.execution(&rtxn, decision_id)
    }

    async fn latest_complete(
        &self,
        panel_id: Option<&PanelId>,
    ) -> StorageResult<Option<PipelineResult>> {
        let rtxn = self.read_txn()?;
        for decision in self.decisions_desc(&rtxn, panel_id)? {
            if let Some(execution) = self.execution(&rtxn, decision.decision_id)? {
                let observation = self.observation_for(&rtxn, &decision)?;
                return Ok(Some(PipelineResult {
                    observation,
                    decision,
                    execution,
                }));
            }
        }
        Ok(None)
    }

    async fn history(&self, panel_id: &PanelId, limit: usize) -> StorageResult<Vec<HistoryEntry>> {
        let rtxn = self.read_txn()?;
        let mut entries = Vec::new();
        for decision in self.decisions_desc(&rtxn, Some(panel_id))?.into_iter().take(limit) {
            entries.push(HistoryEntry {
                observation: self.observation_for(&rtxn, &decision)?,
                execution: self.execution(&rtxn, decision.decision_id)?,
                decision,
            });
        }
        Ok(entries)
    }

    async fn latest_observation(
        &self,
        panel_id: &PanelId,
    ) -> StorageResult<Option<PanelObservation>> {
        let rtxn = self.read_txn()?;
        match self.decisions_desc(&rtxn, Some(panel_id))?.first() {
            Some(decision) => self.observation_for(&rtxn, decision).map(Some),
            None => Ok(None),
        }
    }

    async fn last_cleaned(&self, panel_id: &PanelId) -> StorageResult<Option<Timestamp>> {
        let rtxn = self.read_txn()?;
        let mut latest = None;
        for id in self.panel_decision_ids(&rtxn, panel_id)? {
            if let Some(result) = self.execution(&rtxn, id)? {
                if result.status == ExecutionStatus::Executed {
                    latest = latest.max(Some(result.timestamp));
                }
            }
        }
        Ok(latest)
    }

    async fn decisions_without_execution(&self) -> StorageResult<Vec<Decision>> {
        let rtxn = self.read_txn()?;
        let mut pending = Vec::new();
        for decision in scan::<Decision>(&self.decisions, &rtxn, RecordKind::Decision)? {
            if self
                .executions
                .get(&rtxn, &id_key(&decision.decision_id))
                .map_err(txn_err)?
                .is_none()
            {
                pending.push(decision);
            }
        }
        pending.sort_by_key(recency);
        Ok(pending)
    }

    async fn counters(&self) -> StorageResult<StoreCounters> {
        let rtxn = self.read_txn()?;
        let mut builder = CounterBuilder::default();
        for o in scan::<PanelObservation>(&self.observations, &rtxn, RecordKind::Observation)? {
            builder.observation(&o);
        }
        for d in scan::<Decision>(&self.decisions, &rtxn, RecordKind::Decision)? {
            builder.decision(&d);
        }
        for e in scan::<ExecutionResult>(&self.executions, &rtxn, RecordKind::Execution)? {
            builder.execution(&e);
        }
        Ok(builder.finish())
    }

    async fn recent_logs(&self, limit: usize) -> StorageResult<Vec<SystemLogEntry>> {
        let rtxn = self.read_txn()?;
        let mut out = Vec::new();
        for item in self.logs.rev_iter(&rtxn).map_err(txn_err)?.take(limit) {
            let (_, bytes) = item.map_err(txn_err)?;
            out.push(decode(RecordKind::SystemLog, bytes)?);
        }
        Ok(out)
    }

    async fn ping(&self) -> StorageResult<()> {
        let rtxn = self.read_txn()?;
        self.decisions.len(&rtxn).map(|_| ()).map_err(txn_err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contract;
    use crate::test_support::{run, scheduled};
    use solarsage_core::CleaningPriority;

    fn open_temp() -> (tempfile::TempDir, LmdbDecisionStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = LmdbDecisionStore::open(dir.path(), 16).unwrap();
        (dir, store)
    }

    #[tokio::test]
    async fn test_round_trip() {
        let (_dir, store) = open_temp();
        contract::round_trip(&store).await;
    }

    #[tokio::test]
    async fn test_rejects_duplicates_and_orphans() {
        let (_dir, store) = open_temp();
        contract::rejects_duplicates_and_orphans(&store).await;
    }

    #[tokio::test]
    async fn test_failed_pair_write_leaves_nothing() {
        let (_dir, store) = open_temp();
        contract::failed_pair_write_leaves_nothing(&store).await;
    }

    #[tokio::test]
    async fn test_history_is_most_recent_first() {
        let (_dir, store) = open_temp();
        contract::history_is_most_recent_first(&store).await;
    }

    #[tokio::test]
    async fn test_counters_and_last_cleaned() {
        let (_dir, store) = open_temp();
        contract::counters_and_last_cleaned(&store).await;
    }

    #[tokio::test]
    async fn test_logs_most_recent_first() {
        let (_dir, store) = open_temp();
        contract::logs_most_recent_first(&store).await;
    }

    #[tokio::test]
    async fn test_records_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let (obs, decision) = run("panel_01", 0.7, CleaningPriority::ScheduleCleaning);
        {
            let store = LmdbDecisionStore::open(dir.path(), 16).unwrap();
            store.record_decision(&obs, &decision).await.unwrap();
            store.record_execution(&scheduled(&decision)).await.unwrap();
        }
        let store = LmdbDecisionStore::open(dir.path(), 16).unwrap();
        let latest = store
            .latest_complete(Some(&decision.panel_id))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(latest.decision, decision);
        assert_eq!(latest.observation, obs);
    }

    #[test]
    fn test_time_key_orders_like_time() {
        let early = chrono::DateTime::from_timestamp_micros(-5).unwrap();
        let late = chrono::DateTime::from_timestamp_micros(5).unwrap();
        assert!(time_key(&early) < time_key(&late));
    }

    #[test]
    fn test_panel_keys_do_not_overlap() {
        let (_, a) = run("panel_1", 0.5, CleaningPriority::ContinueMonitoring);
        let (_, b) = run("panel_10", 0.5, CleaningPriority::ContinueMonitoring);
        assert!(!panel_key(&b).starts_with(&panel_prefix(&a.panel_id)));
        assert_eq!(decision_id_from_panel_key(&panel_key(&a)).unwrap(), a.decision_id);
    }
}

#[cfg(test)]
mod prop_tests {
    use super::*;
    use proptest::prelude::*;

    // roughly +/- 30 years around the epoch, in microseconds
    const SPAN_MICROS: i64 = 1_000_000_000_000_000;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        #[test]
        fn prop_time_key_preserves_order(
            a in -SPAN_MICROS..SPAN_MICROS,
            b in -SPAN_MICROS..SPAN_MICROS,
        ) {
            let ta = chrono::DateTime::from_timestamp_micros(a).unwrap();
            let tb = chrono::DateTime::from_timestamp_micros(b).unwrap();
            prop_assert_eq!(time_key(&ta).cmp(&time_key(&tb)), a.cmp(&b));
        }
    }
}
