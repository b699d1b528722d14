//! Fuzz test for the priority-code boundary
//!
//! The executor receives priority codes as wire strings. Any string must
//! either map to exactly one priority (and the matching execution status)
//! or be rejected with `UnknownPriority`, never panic.
//!
//! Run with: cargo +nightly fuzz run priority_fuzz -- -max_total_time=60

#![no_main]

use libfuzzer_sys::fuzz_target;
use solarsage_core::{
    CleaningPriority, DecisionId, ExecutionError, ExecutionStatus, PanelId, RecordId,
    SimulationConfig,
};
use solarsage_engine::{ExecutionRequest, Executor};

fuzz_target!(|data: &[u8]| {
    let Ok(code) = std::str::from_utf8(data) else {
        return;
    };
    let Ok(panel_id) = PanelId::new("panel_01") else {
        return;
    };

    let parsed = CleaningPriority::from_db_str(code);
    if let Ok(priority) = parsed {
        // only the exact wire form parses
        assert_eq!(code, priority.as_db_str());
    }

    let executor = Executor::simulated(SimulationConfig {
        seed: Some(1),
        ..SimulationConfig::default()
    });
    let request = ExecutionRequest {
        decision_id: DecisionId::now_v7(),
        panel_id,
        priority_code: code.to_string(),
    };

    match (executor.execute(&request), parsed) {
        (Ok(result), Ok(priority)) => {
            let expected = match priority {
                CleaningPriority::ExecuteImmediate => ExecutionStatus::Executed,
                CleaningPriority::ScheduleCleaning => ExecutionStatus::Scheduled,
                CleaningPriority::ContinueMonitoring => ExecutionStatus::Monitoring,
            };
            assert_eq!(result.status, expected);
            assert!((0.0..=100.0).contains(&result.success_rate));
        }
        (Err(ExecutionError::UnknownPriority { .. }), Err(_)) => {}
        (outcome, parsed) => panic!("executor {:?} disagrees with parser {:?}", outcome, parsed),
    }
});
