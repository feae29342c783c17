use serde::{Deserialize, Serialize};

/// Tunables for the save engine.
///
/// `fallback_radius` and `plant_precision` were picked empirically for a
/// scene scale of roughly one unit per metre; confirm them against your
/// own scenes before relying on them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SaveConfig {
    /// Maximum number of save slots kept in the store. Oldest evicted first.
    #[serde(default = "default_max_slots")]
    pub max_slots: usize,
    /// Radius for nearest-neighbour matching of scene objects whose
    /// identity key no longer resolves.
    #[serde(default = "default_fallback_radius")]
    pub fallback_radius: f32,
    /// Decimal places used when deriving plant identities from positions.
    #[serde(default = "default_plant_precision")]
    pub plant_precision: usize,
    /// Ticks to wait after a scene finishes loading before the first
    /// restore stage runs.
    #[serde(default = "default_settle_ticks")]
    pub settle_ticks: u32,
    /// Number of inventory slots the player carries.
    #[serde(default = "default_inventory_slots")]
    pub inventory_slots: usize,
    /// Write a save slot every time a scene unloads. When false, unloading
    /// only folds the scene into the in-memory working record.
    #[serde(default = "default_autosave_on_unload")]
    pub autosave_on_unload: bool,
}

fn default_max_slots() -> usize { 3 }
fn default_fallback_radius() -> f32 { 5.0 }
fn default_plant_precision() -> usize { 2 }
fn default_settle_ticks() -> u32 { 1 }
fn default_inventory_slots() -> usize { 24 }
fn default_autosave_on_unload() -> bool { true }

impl Default for SaveConfig {
    fn default() -> Self {
        Self {
            max_slots:       default_max_slots(),
            fallback_radius: default_fallback_radius(),
            plant_precision: default_plant_precision(),
            settle_ticks:    default_settle_ticks(),
            inventory_slots: default_inventory_slots(),
            autosave_on_unload: default_autosave_on_unload(),
        }
    }
}

impl SaveConfig {
    /// Load from the data/ directory.
    /// In tests, use SaveConfig::default_test().
    pub fn load(data_dir: &str) -> anyhow::Result<Self> {
        let path = format!("{data_dir}/save/save_config.json");
        let content = std::fs::read_to_string(&path)
            .map_err(|e| anyhow::anyhow!("Cannot read {path}: {e}"))?;
        let config: SaveConfig = serde_json::from_str(&content)?;
        if config.max_slots == 0 {
            anyhow::bail!("{path}: max_slots must be at least 1");
        }
        if config.fallback_radius < 0.0 {
            anyhow::bail!("{path}: fallback_radius must not be negative");
        }
        Ok(config)
    }

    /// Config with hardcoded defaults for use in tests.
    /// Settles immediately so tests step through stages one tick each.
    pub fn default_test() -> Self {
        Self {
            settle_ticks: 0,
            inventory_slots: 8,
            ..Self::default()
        }
    }
}
