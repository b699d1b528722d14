//! End-to-end runs through the orchestrator on the in-memory store.

use std::sync::Arc;

use solarsage_core::{
    CleaningPriority, ExecutionStatus, LogLevel, PanelStatus, PipelineError, RiskCategory,
    SolarSageConfig, SolarSageError,
};
use solarsage_engine::Executor;
use solarsage_pipeline::{Orchestrator, TriggerRequest};
use solarsage_test_utils::assertions::{assert_run_consistent, assert_status_matches_priority};
use solarsage_test_utils::fixtures::{self, panel, BENGALURU_DUST, HEAVY_DUST, LIGHT_DUST};
use solarsage_test_utils::{FixedEstimator, ScriptedClassifier};

fn orchestrator(config: &SolarSageConfig, classifier: ScriptedClassifier) -> Orchestrator {
    Orchestrator::new(config, Arc::new(classifier), fixtures::memory_store())
        .with_executor(Executor::new(Arc::new(FixedEstimator::typical())))
}

fn close(a: f64, b: f64) -> bool {
    (a - b).abs() < 0.01
}

#[tokio::test]
async fn bengaluru_reading_schedules_cleaning() {
    let config = fixtures::bengaluru_config();
    let orch = orchestrator(&config, ScriptedClassifier::fixed(BENGALURU_DUST, 0.92));

    let result = orch
        .trigger(TriggerRequest::new(panel("panel_01")))
        .await
        .unwrap();

    assert_run_consistent(&result);
    assert_status_matches_priority(&result);
    let decision = &result.decision;
    assert_eq!(decision.priority, CleaningPriority::ScheduleCleaning);
    assert_eq!(decision.risk_category, RiskCategory::Critical);
    assert!(close(decision.environmental_risk, 94.2));
    assert_eq!(decision.economic_viability, 70.0);
    assert!(close(decision.combined_score, 80.89));
    assert!(close(decision.confidence, 89.267));
    assert!(!decision.low_confidence);
    assert!(decision.forecast.location_known);
    assert_eq!(decision.forecast.capacity_kwh, 28.5);
    assert_eq!(result.execution.status, ExecutionStatus::Scheduled);
    assert_eq!(result.execution.power_recovery_kwh, 0.0);
}

#[tokio::test]
async fn heavy_dust_with_expensive_power_executes_immediately() {
    let config = fixtures::immediate_config();
    let orch = orchestrator(&config, ScriptedClassifier::fixed(HEAVY_DUST, 0.95));
    let p = panel("panel_02");

    let result = orch.trigger(TriggerRequest::new(p.clone())).await.unwrap();

    assert_eq!(result.decision.priority, CleaningPriority::ExecuteImmediate);
    assert!(result.decision.combined_score > 85.0);
    assert_eq!(result.execution.status, ExecutionStatus::Executed);
    assert_eq!(result.execution.water_used_l, 12.5);
    assert_eq!(result.execution.success_rate, 95.0);

    let states = orch.list_panels().await.unwrap();
    let state = states.iter().find(|s| s.panel_id == p).unwrap();
    assert_eq!(state.status, PanelStatus::NeedsCleaning);
    assert_eq!(state.last_cleaned, Some(result.execution.timestamp));
}

#[tokio::test]
async fn light_dust_keeps_monitoring() {
    let config = fixtures::bengaluru_config();
    let orch = orchestrator(&config, ScriptedClassifier::fixed(LIGHT_DUST, 0.9));

    let result = orch
        .trigger(TriggerRequest::new(panel("panel_03")))
        .await
        .unwrap();

    assert_eq!(result.decision.priority, CleaningPriority::ContinueMonitoring);
    assert_eq!(result.decision.risk_category, RiskCategory::Low);
    assert_eq!(result.execution.status, ExecutionStatus::Monitoring);
    assert_eq!(result.observation.status(), PanelStatus::Clean);
}

#[tokio::test]
async fn out_of_range_readings_are_clamped() {
    let config = fixtures::bengaluru_config();
    let orch = orchestrator(&config, ScriptedClassifier::fixed(1.7, -0.2));

    let result = orch
        .trigger(TriggerRequest::new(panel("panel_01")))
        .await
        .unwrap();

    assert_eq!(result.observation.dust_level, 1.0);
    assert_eq!(result.observation.confidence, 0.0);
    assert!(result.decision.low_confidence);
}

#[tokio::test]
async fn low_confidence_is_flagged_but_not_blocking() {
    let config = fixtures::bengaluru_config();
    let orch = orchestrator(&config, ScriptedClassifier::fixed(BENGALURU_DUST, 0.5));

    let result = orch
        .trigger(TriggerRequest::new(panel("panel_01")))
        .await
        .unwrap();

    assert!(result.decision.low_confidence);
    assert_eq!(result.decision.priority, CleaningPriority::ScheduleCleaning);
}

#[tokio::test]
async fn unknown_location_falls_back_and_logs() {
    let config = fixtures::bengaluru_config();
    let orch = orchestrator(&config, ScriptedClassifier::fixed(BENGALURU_DUST, 0.9));

    let result = orch
        .trigger(TriggerRequest::new(panel("panel_01")).with_location("Atlantis"))
        .await
        .unwrap();

    assert!(!result.decision.forecast.location_known);
    assert_eq!(result.decision.forecast.capacity_kwh, 26.0);
    assert_eq!(result.decision.forecast.location, "Atlantis");

    let logs = orch.logs(None).await.unwrap();
    let warning = logs
        .iter()
        .find(|e| e.message.starts_with("InvalidLocation"))
        .unwrap();
    assert_eq!(warning.level, LogLevel::Warning);
    assert_eq!(warning.details["location"], "Atlantis");
}

#[tokio::test]
async fn panels_outside_the_roster_are_accepted() {
    let config = fixtures::bengaluru_config();
    let orch = orchestrator(&config, ScriptedClassifier::fixed(0.5, 0.9));
    let stranger = panel("panel_77");

    let result = orch
        .trigger(TriggerRequest::new(stranger.clone()))
        .await
        .unwrap();
    assert_eq!(result.decision.forecast.location, "Bengaluru, India");

    let history = orch.history(&stranger, None).await.unwrap();
    assert_eq!(history.len(), 1);
    // not part of the roster listing
    let states = orch.list_panels().await.unwrap();
    assert!(states.iter().all(|s| s.panel_id != stranger));
}

#[tokio::test]
async fn history_is_most_recent_first_and_clamped() {
    let mut config = fixtures::bengaluru_config();
    config.history.max_limit = 3;
    let orch = orchestrator(&config, ScriptedClassifier::fixed(0.5, 0.9));
    let p = panel("panel_01");

    let mut ids = Vec::new();
    for _ in 0..5 {
        let result = orch.trigger(TriggerRequest::new(p.clone())).await.unwrap();
        ids.push(result.decision.decision_id);
    }

    let history = orch.history(&p, Some(100)).await.unwrap();
    assert_eq!(history.len(), 3);
    assert_eq!(history[0].decision.decision_id, ids[4]);
    assert_eq!(history[2].decision.decision_id, ids[2]);
    assert!(history.iter().all(|h| h.execution.is_some()));

    assert_eq!(orch.history(&p, Some(0)).await.unwrap().len(), 1);
    assert!(orch.history(&panel("panel_04"), None).await.unwrap().is_empty());
}

#[tokio::test]
async fn latest_decision_tracks_the_newest_complete_run() {
    let config = fixtures::bengaluru_config();
    let orch = orchestrator(&config, ScriptedClassifier::fixed(0.5, 0.9));

    match orch.latest_decision(None).await {
        Err(SolarSageError::Pipeline(PipelineError::NotFound { panel_id: None })) => {}
        other => panic!("expected NotFound, got {:?}", other),
    }

    let first = orch
        .trigger(TriggerRequest::new(panel("panel_01")))
        .await
        .unwrap();
    let second = orch
        .trigger(TriggerRequest::new(panel("panel_02")))
        .await
        .unwrap();

    let any = orch.latest_decision(None).await.unwrap();
    assert_eq!(any.decision.decision_id, second.decision.decision_id);

    let one = orch.latest_decision(Some(&panel("panel_01"))).await.unwrap();
    assert_eq!(one.decision.decision_id, first.decision.decision_id);
    assert_eq!(one.execution.decision_id, first.decision.decision_id);

    assert!(orch.latest_decision(Some(&panel("panel_03"))).await.is_err());
}

#[tokio::test]
async fn list_panels_reports_unobserved_panels_as_unknown() {
    let config = fixtures::bengaluru_config();
    let orch = orchestrator(&config, ScriptedClassifier::fixed(BENGALURU_DUST, 0.9));
    orch.trigger(TriggerRequest::new(panel("panel_01")))
        .await
        .unwrap();

    let states = orch.list_panels().await.unwrap();
    assert_eq!(states.len(), 4);
    assert_eq!(states[0].panel_id, panel("panel_01"));
    assert_eq!(states[0].status, PanelStatus::NeedsCleaning);
    assert_eq!(states[0].dust_level, Some(BENGALURU_DUST));
    assert!(states[0].last_observed.is_some());
    // scheduled, not cleaned
    assert!(states[0].last_cleaned.is_none());

    for state in &states[1..] {
        assert_eq!(state.status, PanelStatus::Unknown);
        assert!(state.dust_level.is_none());
    }
}

#[tokio::test]
async fn stats_aggregate_all_runs() {
    let config = fixtures::immediate_config();
    let heavy = orchestrator(&config, ScriptedClassifier::fixed(HEAVY_DUST, 0.9));
    for id in ["panel_01", "panel_02"] {
        heavy.trigger(TriggerRequest::new(panel(id))).await.unwrap();
    }

    let stats = heavy.stats().await.unwrap();
    assert_eq!(stats.total_panels, 4);
    assert_eq!(stats.total_analyses, 2);
    assert_eq!(stats.total_decisions, 2);
    assert_eq!(stats.total_cleanings, 2);
    assert!(close(stats.water_used_total_l, 25.0));
    assert!(close(stats.avg_dust_level.unwrap(), HEAVY_DUST));
    assert_eq!(
        stats.decisions_by_priority.get(&CleaningPriority::ExecuteImmediate),
        Some(&2)
    );

    let empty = orchestrator(&config, ScriptedClassifier::fixed(0.1, 0.9));
    let stats = empty.stats().await.unwrap();
    assert_eq!(stats.total_analyses, 0);
    assert!(stats.avg_dust_level.is_none());
}

#[tokio::test]
async fn completed_runs_are_logged() {
    let config = fixtures::bengaluru_config();
    let orch = orchestrator(&config, ScriptedClassifier::fixed(0.5, 0.9));
    let result = orch
        .trigger(TriggerRequest::new(panel("panel_01")))
        .await
        .unwrap();

    let logs = orch.logs(Some(1)).await.unwrap();
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0].level, LogLevel::Info);
    assert_eq!(logs[0].component, "orchestrator");
    assert_eq!(
        logs[0].details["decision_id"],
        result.decision.decision_id.to_string()
    );
}

#[tokio::test]
async fn health_is_green_on_a_fresh_store() {
    let config = fixtures::bengaluru_config();
    let orch = orchestrator(&config, ScriptedClassifier::fixed(0.5, 0.9));

    let report = orch.health().await;
    assert!(report.is_healthy());
    let store = report.check("store").unwrap();
    assert_eq!(store.details["backend"], "memory");
    assert_eq!(report.check("classifier").unwrap().details["name"], "scripted");
    assert_eq!(report.check("leases").unwrap().details["in_flight"], 0);
}
