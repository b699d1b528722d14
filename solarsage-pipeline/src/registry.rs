//! Panel roster.

use solarsage_core::{PanelConfig, PanelId, SolarSageConfig};

/// The configured panels and where they are.
#[derive(Debug, Clone)]
pub struct PanelRegistry {
    panels: Vec<PanelConfig>,
    default_location: String,
}

impl PanelRegistry {
    pub fn new(panels: Vec<PanelConfig>, default_location: impl Into<String>) -> Self {
        Self {
            panels,
            default_location: default_location.into(),
        }
    }

    pub fn from_config(config: &SolarSageConfig) -> Self {
        Self::new(config.panels.clone(), config.default_location.clone())
    }

    pub fn panels(&self) -> &[PanelConfig] {
        &self.panels
    }

    pub fn panel_ids(&self) -> impl Iterator<Item = &PanelId> {
        self.panels.iter().map(|p| &p.panel_id)
    }

    pub fn len(&self) -> usize {
        self.panels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.panels.is_empty()
    }

    pub fn contains(&self, panel_id: &PanelId) -> bool {
        self.get(panel_id).is_some()
    }

    pub fn get(&self, panel_id: &PanelId) -> Option<&PanelConfig> {
        self.panels.iter().find(|p| &p.panel_id == panel_id)
    }

    /// Configured location of a panel. Panels outside the roster, or without
    /// a location of their own, get the default location.
    pub fn location_for(&self, panel_id: &PanelId) -> &str {
        self.get(panel_id)
            .and_then(|p| p.location.as_deref())
            .unwrap_or(&self.default_location)
    }
}
