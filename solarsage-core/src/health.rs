//! Health report types
//!
//! A [`HealthReport`] is assembled by the orchestrator from one
//! [`HealthCheck`] per component (store, classifier, lease table).

use crate::Timestamp;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Health status for a component, ordered from best to worst.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
    /// Not yet checked
    Unknown,
}

/// Result of checking one component.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthCheck {
    pub status: HealthStatus,
    pub component: String,
    pub message: Option<String>,
    pub response_time_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub details: BTreeMap<String, serde_json::Value>,
}

impl HealthCheck {
    fn with_status(status: HealthStatus, component: String, message: Option<String>) -> Self {
        Self {
            status,
            component,
            message,
            response_time_ms: None,
            details: BTreeMap::new(),
        }
    }

    pub fn healthy(component: impl Into<String>) -> Self {
        Self::with_status(HealthStatus::Healthy, component.into(), None)
    }

    pub fn degraded(component: impl Into<String>, message: impl Into<String>) -> Self {
        Self::with_status(
            HealthStatus::Degraded,
            component.into(),
            Some(message.into()),
        )
    }

    pub fn unhealthy(component: impl Into<String>, message: impl Into<String>) -> Self {
        Self::with_status(
            HealthStatus::Unhealthy,
            component.into(),
            Some(message.into()),
        )
    }

    pub fn with_response_time(mut self, ms: u64) -> Self {
        self.response_time_ms = Some(ms);
        self
    }

    pub fn with_detail(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.details.insert(key.into(), value);
        self
    }
}

/// Aggregate health of a running system.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthReport {
    /// Worst status among the checks; `Unknown` when there are none
    pub status: HealthStatus,
    pub checked_at: Timestamp,
    pub checks: Vec<HealthCheck>,
}

impl HealthReport {
    pub fn from_checks(checks: Vec<HealthCheck>) -> Self {
        let status = checks
            .iter()
            .map(|c| c.status)
            .max()
            .unwrap_or(HealthStatus::Unknown);
        Self {
            status,
            checked_at: Utc::now(),
            checks,
        }
    }

    pub fn is_healthy(&self) -> bool {
        self.status == HealthStatus::Healthy
    }

    pub fn check(&self, component: &str) -> Option<&HealthCheck> {
        self.checks.iter().find(|c| c.component == component)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_report_takes_worst_status() {
        let report = HealthReport::from_checks(vec![
            HealthCheck::healthy("store").with_response_time(3),
            HealthCheck::degraded("classifier", "slow"),
        ]);
        assert_eq!(report.status, HealthStatus::Degraded);
        assert!(!report.is_healthy());
        assert_eq!(report.check("store").and_then(|c| c.response_time_ms), Some(3));
    }

    #[test]
    fn test_empty_report_is_unknown() {
        let report = HealthReport::from_checks(Vec::new());
        assert_eq!(report.status, HealthStatus::Unknown);
    }

    #[test]
    fn test_details_serialize_only_when_present() {
        let bare = serde_json::to_value(HealthCheck::healthy("leases")).unwrap();
        assert!(bare.get("details").is_none());

        let with = HealthCheck::healthy("leases").with_detail("in_flight", serde_json::json!(2));
        let json = serde_json::to_value(with).unwrap();
        assert_eq!(json["details"]["in_flight"], 2);
    }
}
