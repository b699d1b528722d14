//! Fuzz test for frame classification and scoring
//!
//! Any byte buffer is a grayscale frame. The dust level derived from it must
//! stay in [0, 1], and the forecast and decision built on it must be finite,
//! with scores in [0, 100].
//!
//! Run with: cargo +nightly fuzz run frame_fuzz -- -max_total_time=60

#![no_main]

use libfuzzer_sys::fuzz_target;
use solarsage_core::{PanelId, PanelObservation, SolarSageConfig};
use solarsage_engine::{brightness_dust_level, DecisionEngine, Forecaster};

fuzz_target!(|data: &[u8]| {
    let Some(dust_level) = brightness_dust_level(data) else {
        assert!(data.is_empty());
        return;
    };
    assert!((0.0..=1.0).contains(&dust_level));

    let config = SolarSageConfig::default_roster();
    let (forecast, _) = Forecaster::from_config(&config).forecast(dust_level, "Bengaluru, India");
    assert!(forecast.daily_power_loss_kwh.is_finite());
    assert!(forecast.hourly_generation.iter().all(|h| h.is_finite() && *h >= 0.0));

    let Ok(panel_id) = PanelId::new("panel_01") else {
        return;
    };
    let observation = PanelObservation::new(panel_id, dust_level, 0.85, String::new());
    let assessment = DecisionEngine::default().assess(&observation, &forecast);
    assert!((0.0..=100.0).contains(&assessment.combined_score));
    assert!((0.0..=100.0).contains(&assessment.confidence));
});
