//! Fuzz test for configuration parsing
//!
//! Arbitrary TOML must either parse or fail with a `ConfigError`. A config
//! that parses must validate without panicking, and a valid one must
//! produce usable timeouts and history bounds.
//!
//! Run with: cargo +nightly fuzz run config_fuzz -- -max_total_time=60

#![no_main]

use libfuzzer_sys::fuzz_target;
use solarsage_core::SolarSageConfig;

fuzz_target!(|data: &[u8]| {
    let Ok(input) = std::str::from_utf8(data) else {
        return;
    };
    let Ok(config) = SolarSageConfig::from_toml_str(input) else {
        return;
    };
    if config.validate().is_ok() {
        assert!(!config.panels.is_empty());
        assert!(!config.timeouts.classify().is_zero());
        assert!(!config.timeouts.store().is_zero());
        let limit = config.history.clamp(None);
        assert!(limit >= 1 && limit <= config.history.max_limit.max(1));
    }
});
