//! Per-panel leases.
//!
//! At most one pipeline run per panel. Acquisition never waits: a second
//! caller gets `PanelBusy` straight away. The lease is released when the
//! [`PanelLease`] guard drops, which covers early returns, timeouts and
//! dropped futures alike.

use chrono::Utc;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use solarsage_core::{PanelId, PipelineError, Timestamp};
use std::sync::Arc;

/// Bookkeeping for a held lease.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeaseInfo {
    pub acquired_at: Timestamp,
    /// Monotonic per-table counter, distinguishes successive leases on one panel
    pub generation: u64,
}

#[derive(Debug, Default)]
struct LeaseTable {
    held: DashMap<PanelId, LeaseInfo>,
    generation: std::sync::atomic::AtomicU64,
}

/// Lease table shared by every trigger of one orchestrator.
#[derive(Debug, Clone, Default)]
pub struct PanelLocks {
    table: Arc<LeaseTable>,
}

impl PanelLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take the lease for `panel_id`, or fail with `PanelBusy`.
    pub fn acquire(&self, panel_id: &PanelId) -> Result<PanelLease, PipelineError> {
        match self.table.held.entry(panel_id.clone()) {
            Entry::Occupied(_) => Err(PipelineError::PanelBusy {
                panel_id: panel_id.clone(),
            }),
            Entry::Vacant(slot) => {
                let generation = self
                    .table
                    .generation
                    .fetch_add(1, std::sync::atomic::Ordering::Relaxed);
                slot.insert(LeaseInfo {
                    acquired_at: Utc::now(),
                    generation,
                });
                Ok(PanelLease {
                    table: Arc::clone(&self.table),
                    panel_id: panel_id.clone(),
                    generation,
                })
            }
        }
    }

    pub fn is_held(&self, panel_id: &PanelId) -> bool {
        self.table.held.contains_key(panel_id)
    }

    pub fn lease_info(&self, panel_id: &PanelId) -> Option<LeaseInfo> {
        self.table.held.get(panel_id).map(|info| info.clone())
    }

    /// Number of runs currently in flight.
    pub fn in_flight(&self) -> usize {
        self.table.held.len()
    }
}

/// RAII guard for a panel lease.
#[derive(Debug)]
pub struct PanelLease {
    table: Arc<LeaseTable>,
    panel_id: PanelId,
    generation: u64,
}

impl PanelLease {
    pub fn panel_id(&self) -> &PanelId {
        &self.panel_id
    }
}

impl Drop for PanelLease {
    fn drop(&mut self) {
        // only remove our own entry
        self.table
            .held
            .remove_if(&self.panel_id, |_, info| info.generation == self.generation);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn panel(id: &str) -> PanelId {
        PanelId::new(id).unwrap()
    }

    #[test]
    fn test_second_acquire_is_busy() {
        let locks = PanelLocks::new();
        let p = panel("panel_01");
        let lease = locks.acquire(&p).unwrap();
        assert_eq!(lease.panel_id(), &p);
        let err = locks.acquire(&p).unwrap_err();
        assert_eq!(err, PipelineError::PanelBusy { panel_id: p.clone() });
        assert!(locks.is_held(&p));
        assert_eq!(locks.in_flight(), 1);
    }

    #[test]
    fn test_drop_releases() {
        let locks = PanelLocks::new();
        let p = panel("panel_01");
        {
            let _lease = locks.acquire(&p).unwrap();
        }
        assert!(!locks.is_held(&p));
        assert!(locks.acquire(&p).is_ok());
    }

    #[test]
    fn test_distinct_panels_do_not_contend() {
        let locks = PanelLocks::new();
        let _a = locks.acquire(&panel("panel_01")).unwrap();
        let _b = locks.acquire(&panel("panel_02")).unwrap();
        assert_eq!(locks.in_flight(), 2);
    }

    #[test]
    fn test_clones_share_the_table() {
        let locks = PanelLocks::new();
        let other = locks.clone();
        let p = panel("panel_03");
        let first = locks.acquire(&p).unwrap();
        assert!(other.acquire(&p).is_err());
        let generation = locks.lease_info(&p).unwrap().generation;
        drop(first);
        let _second = other.acquire(&p).unwrap();
        assert!(locks.lease_info(&p).unwrap().generation > generation);
    }
}
