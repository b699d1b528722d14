//! Configuration types
//!
//! Loaded from a TOML file (`--config` or `SOLARSAGE_CONFIG`), with a few
//! environment overrides for deployment knobs. Every section except the panel
//! roster has defaults matching the reference deployment.

use crate::{ConfigError, PanelId};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::time::Duration;

// ============================================================================
// SECTIONS
// ============================================================================

/// Mounting position of a panel on the sprayer rail.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PanelPosition {
    pub x: i32,
    pub y: i32,
}

/// One roster entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PanelConfig {
    pub panel_id: PanelId,
    /// Location used for forecasting; falls back to `default_location`
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub position: Option<PanelPosition>,
}

/// Electricity price and cleaning cost.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct EconomicsConfig {
    /// USD per kWh
    pub electricity_rate: f64,
    /// USD per cleaning
    pub cleaning_cost_usd: f64,
}

impl Default for EconomicsConfig {
    fn default() -> Self {
        Self {
            electricity_rate: 0.12,
            cleaning_cost_usd: 24.50,
        }
    }
}

/// Bounds on the pipeline's suspension points.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct TimeoutConfig {
    pub classify_ms: u64,
    pub store_ms: u64,
}

impl TimeoutConfig {
    pub fn classify(&self) -> Duration {
        Duration::from_millis(self.classify_ms)
    }

    pub fn store(&self) -> Duration {
        Duration::from_millis(self.store_ms)
    }
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            classify_ms: 5000,
            store_ms: 2000,
        }
    }
}

/// Inclusive value range for a simulated quantity.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SimRange {
    pub min: f64,
    pub max: f64,
}

impl SimRange {
    pub const fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    pub fn contains(&self, value: f64) -> bool {
        value >= self.min && value <= self.max
    }
}

/// Ranges the simulated executor draws from for an immediate cleaning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct SimulationConfig {
    pub water_used_l: SimRange,
    pub cost_usd: SimRange,
    pub power_recovery_kwh: SimRange,
    pub success_rate: SimRange,
    /// Fixed seed for reproducible runs; random when absent
    pub seed: Option<u64>,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            water_used_l: SimRange::new(14.0, 18.0),
            cost_usd: SimRange::new(22.0, 27.0),
            power_recovery_kwh: SimRange::new(3.5, 5.5),
            success_rate: SimRange::new(90.0, 98.0),
            seed: None,
        }
    }
}

/// History query bounds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct HistoryConfig {
    pub default_limit: usize,
    pub max_limit: usize,
}

impl HistoryConfig {
    /// Clamp a requested limit into `[1, max_limit]`, using the default when absent.
    pub fn clamp(&self, requested: Option<usize>) -> usize {
        requested
            .unwrap_or(self.default_limit)
            .clamp(1, self.max_limit.max(1))
    }
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            default_limit: 10,
            max_limit: 100,
        }
    }
}

/// Which Decision Store backend to open.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase", deny_unknown_fields)]
pub enum StoreConfig {
    Memory,
    Lmdb { path: PathBuf, max_size_mb: usize },
}

impl Default for StoreConfig {
    fn default() -> Self {
        StoreConfig::Lmdb {
            path: PathBuf::from("./data/solarsage"),
            max_size_mb: 256,
        }
    }
}

// ============================================================================
// MASTER CONFIG
// ============================================================================

/// Master configuration struct.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SolarSageConfig {
    /// Panel roster (REQUIRED)
    pub panels: Vec<PanelConfig>,

    #[serde(default = "default_location")]
    pub default_location: String,
    #[serde(default = "default_capacity_kwh")]
    pub default_capacity_kwh: f64,
    /// Extra or overriding daily capacities (kWh/day) by city name
    #[serde(default)]
    pub locations: BTreeMap<String, f64>,

    #[serde(default)]
    pub economics: EconomicsConfig,
    #[serde(default)]
    pub timeouts: TimeoutConfig,
    #[serde(default)]
    pub simulation: SimulationConfig,
    #[serde(default)]
    pub history: HistoryConfig,
    #[serde(default)]
    pub store: StoreConfig,

    #[serde(default = "default_schedule_interval_secs")]
    pub schedule_interval_secs: u64,
    /// Classifier confidence below this is flagged on the decision
    #[serde(default = "default_model_confidence_threshold")]
    pub model_confidence_threshold: f64,
}

fn default_location() -> String {
    "Bengaluru, India".to_string()
}

fn default_capacity_kwh() -> f64 {
    26.0
}

fn default_schedule_interval_secs() -> u64 {
    3600
}

fn default_model_confidence_threshold() -> f64 {
    0.8
}

impl SolarSageConfig {
    /// The reference deployment: four panels in Bengaluru, in-memory store.
    pub fn default_roster() -> Self {
        let panels = (1..=4)
            .filter_map(|n| PanelId::new(format!("panel_{:02}", n)).ok())
            .enumerate()
            .map(|(i, panel_id)| PanelConfig {
                panel_id,
                location: None,
                position: Some(PanelPosition {
                    x: 45 * (i as i32 + 1),
                    y: 90,
                }),
            })
            .collect();

        Self {
            panels,
            default_location: default_location(),
            default_capacity_kwh: default_capacity_kwh(),
            locations: BTreeMap::new(),
            economics: EconomicsConfig::default(),
            timeouts: TimeoutConfig::default(),
            simulation: SimulationConfig::default(),
            history: HistoryConfig::default(),
            store: StoreConfig::Memory,
            schedule_interval_secs: default_schedule_interval_secs(),
            model_confidence_threshold: default_model_confidence_threshold(),
        }
    }

    /// Load `path` if given, otherwise start from [`Self::default_roster`].
    /// Env overrides and validation apply either way.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(path) => Self::load_from(path),
            None => {
                let mut config = Self::default_roster();
                config.apply_env_overrides();
                config.validate()?;
                Ok(config)
            }
        }
    }

    /// Load a specific file, apply env overrides, validate.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let mut config = Self::from_path(path)?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_toml_str(&contents)
    }

    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        let config: SolarSageConfig = toml::from_str(contents)?;
        Ok(config)
    }

    /// Apply deployment overrides from environment variables.
    ///
    /// - `SOLARSAGE_STORE_PATH`: switch to an LMDB store at this path
    /// - `SOLARSAGE_CLASSIFY_TIMEOUT_MS`: classifier timeout
    /// - `SOLARSAGE_STORE_TIMEOUT_MS`: store write timeout
    pub fn apply_env_overrides(&mut self) {
        if let Ok(path) = std::env::var("SOLARSAGE_STORE_PATH") {
            let max_size_mb = match &self.store {
                StoreConfig::Lmdb { max_size_mb, .. } => *max_size_mb,
                StoreConfig::Memory => 256,
            };
            self.store = StoreConfig::Lmdb {
                path: PathBuf::from(path),
                max_size_mb,
            };
        }
        if let Some(ms) = env_u64("SOLARSAGE_CLASSIFY_TIMEOUT_MS") {
            self.timeouts.classify_ms = ms;
        }
        if let Some(ms) = env_u64("SOLARSAGE_STORE_TIMEOUT_MS") {
            self.timeouts.store_ms = ms;
        }
    }

    pub fn schedule_interval(&self) -> Duration {
        Duration::from_secs(self.schedule_interval_secs)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.panels.is_empty() {
            return Err(invalid("panels", "roster must contain at least one panel"));
        }
        let mut seen = HashSet::new();
        for panel in &self.panels {
            if !seen.insert(&panel.panel_id) {
                return Err(invalid(
                    "panels",
                    format!("duplicate panel id {}", panel.panel_id),
                ));
            }
        }

        if self.default_location.trim().is_empty() {
            return Err(invalid("default_location", "must not be empty"));
        }
        if !(self.default_capacity_kwh > 0.0) {
            return Err(invalid("default_capacity_kwh", "must be > 0"));
        }
        for (city, capacity) in &self.locations {
            if !(*capacity > 0.0) {
                return Err(invalid(
                    format!("locations.{}", city),
                    "capacity must be > 0",
                ));
            }
        }

        if !(self.economics.electricity_rate >= 0.0) {
            return Err(invalid("economics.electricity_rate", "must be >= 0"));
        }
        if !(self.economics.cleaning_cost_usd > 0.0) {
            return Err(invalid("economics.cleaning_cost_usd", "must be > 0"));
        }

        if self.timeouts.classify_ms == 0 {
            return Err(invalid("timeouts.classify_ms", "must be > 0"));
        }
        if self.timeouts.store_ms == 0 {
            return Err(invalid("timeouts.store_ms", "must be > 0"));
        }

        let ranges = [
            ("simulation.water_used_l", self.simulation.water_used_l),
            ("simulation.cost_usd", self.simulation.cost_usd),
            ("simulation.power_recovery_kwh", self.simulation.power_recovery_kwh),
            ("simulation.success_rate", self.simulation.success_rate),
        ];
        for (field, range) in ranges {
            if !(range.min >= 0.0) || !(range.max >= range.min) {
                return Err(invalid(field, "requires 0 <= min <= max"));
            }
        }
        if self.simulation.success_rate.max > 100.0 {
            return Err(invalid("simulation.success_rate", "max must be <= 100"));
        }

        if self.history.max_limit == 0 {
            return Err(invalid("history.max_limit", "must be > 0"));
        }
        if self.history.default_limit == 0 || self.history.default_limit > self.history.max_limit
        {
            return Err(invalid(
                "history.default_limit",
                "must be in [1, history.max_limit]",
            ));
        }

        if let StoreConfig::Lmdb { path, max_size_mb } = &self.store {
            if path.as_os_str().is_empty() {
                return Err(invalid("store.path", "must not be empty"));
            }
            if *max_size_mb == 0 {
                return Err(invalid("store.max_size_mb", "must be > 0"));
            }
        }

        if self.schedule_interval_secs == 0 {
            return Err(invalid("schedule_interval_secs", "must be > 0"));
        }
        if !(0.0..=1.0).contains(&self.model_confidence_threshold) {
            return Err(invalid(
                "model_confidence_threshold",
                "must be between 0.0 and 1.0",
            ));
        }

        Ok(())
    }
}

fn invalid(field: impl Into<String>, reason: impl Into<String>) -> ConfigError {
    ConfigError::InvalidValue {
        field: field.into(),
        reason: reason.into(),
    }
}

fn env_u64(key: &str) -> Option<u64> {
    std::env::var(key).ok().and_then(|s| s.trim().parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
        [[panels]]
        panel_id = "panel_01"
        location = "Chennai, India"

        [[panels]]
        panel_id = "panel_02"
        position = { x = 90, y = 90 }
    "#;

    #[test]
    fn test_default_roster_is_valid() {
        let config = SolarSageConfig::default_roster();
        config.validate().unwrap();
        assert_eq!(config.panels.len(), 4);
        assert_eq!(config.panels[0].panel_id.as_str(), "panel_01");
        assert_eq!(config.panels[3].panel_id.as_str(), "panel_04");
        assert_eq!(config.store, StoreConfig::Memory);
    }

    #[test]
    fn test_minimal_toml_gets_defaults() {
        let config = SolarSageConfig::from_toml_str(MINIMAL).unwrap();
        config.validate().unwrap();
        assert_eq!(config.panels.len(), 2);
        assert_eq!(config.economics.electricity_rate, 0.12);
        assert_eq!(config.economics.cleaning_cost_usd, 24.50);
        assert_eq!(config.timeouts.classify(), Duration::from_millis(5000));
        assert_eq!(config.history.default_limit, 10);
        assert_eq!(config.default_capacity_kwh, 26.0);
    }

    #[test]
    fn test_load_without_path_uses_default_roster() {
        let config = SolarSageConfig::load(None).unwrap();
        assert_eq!(config.panels.len(), 4);
        assert_eq!(config.default_location, "Bengaluru, India");
    }

    #[test]
    fn test_load_with_path_validates() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("solarsage.toml");
        std::fs::write(&path, MINIMAL).unwrap();
        let config = SolarSageConfig::load(Some(&path)).unwrap();
        assert_eq!(config.panels[0].location.as_deref(), Some("Chennai, India"));

        std::fs::write(&path, "panels = []\n").unwrap();
        assert!(matches!(
            SolarSageConfig::load(Some(&path)),
            Err(ConfigError::InvalidValue { .. })
        ));
    }

    #[test]
    fn test_unknown_fields_rejected() {
        let toml = format!("{}\nbogus = 1\n", MINIMAL);
        assert!(matches!(
            SolarSageConfig::from_toml_str(&toml),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_store_section_parses() {
        let toml = format!(
            "{}\n[store]\nkind = \"lmdb\"\npath = \"/var/lib/solarsage\"\nmax_size_mb = 64\n",
            MINIMAL
        );
        let config = SolarSageConfig::from_toml_str(&toml).unwrap();
        assert_eq!(
            config.store,
            StoreConfig::Lmdb {
                path: PathBuf::from("/var/lib/solarsage"),
                max_size_mb: 64
            }
        );
    }

    #[test]
    fn test_validate_rejects_duplicate_panels() {
        let mut config = SolarSageConfig::default_roster();
        let dup = config.panels[0].clone();
        config.panels.push(dup);
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("duplicate panel id panel_01"));
    }

    #[test]
    fn test_validate_rejects_inverted_range() {
        let mut config = SolarSageConfig::default_roster();
        config.simulation.cost_usd = SimRange::new(30.0, 20.0);
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("simulation.cost_usd"));
    }

    #[test]
    fn test_validate_rejects_zero_timeout() {
        let mut config = SolarSageConfig::default_roster();
        config.timeouts.store_ms = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_empty_roster() {
        let mut config = SolarSageConfig::default_roster();
        config.panels.clear();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_history_clamp() {
        let history = HistoryConfig::default();
        assert_eq!(history.clamp(None), 10);
        assert_eq!(history.clamp(Some(0)), 1);
        assert_eq!(history.clamp(Some(5000)), 100);
        assert_eq!(history.clamp(Some(25)), 25);
    }

    #[test]
    fn test_from_path_reads_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("solarsage.toml");
        std::fs::write(&path, MINIMAL).unwrap();
        let config = SolarSageConfig::from_path(&path).unwrap();
        assert_eq!(config.panels.len(), 2);

        let missing = SolarSageConfig::from_path(&dir.path().join("nope.toml"));
        assert!(matches!(missing, Err(ConfigError::Io(_))));
    }
}
