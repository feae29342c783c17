//! Save records — the full mutable world as human-readable JSON.
//!
//! A SaveRecord is built once per save and never mutated after it is
//! written; the next save supersedes it. Each domain keeps its own record
//! shape so a scene can replace its own contribution without touching
//! what other scenes wrote.

use crate::{
    types::{ItemName, SceneId, Transform, Vec3},
    world::MarketOffer,
};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};

pub const RECORD_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SaveRecord {
    #[serde(default = "default_version")]
    pub version:          u32,
    pub save_timestamp:   String,
    pub scene_identifier: SceneId,
    pub player_state:     Option<PlayerState>,
    #[serde(default)]
    pub world_items:      Vec<WorldItemRecord>,
    #[serde(default)]
    pub plants:           Vec<PlantRecord>,
    #[serde(default)]
    pub inventory:        InventoryRecord,
    #[serde(default)]
    pub container:        Option<ContainerRecord>,
    #[serde(default)]
    pub market:           Option<MarketRecord>,
    #[serde(default)]
    pub scene_objects:    Vec<SceneObjectRecord>,
    /// Scenes whose world items this record (or an ancestor) has captured.
    #[serde(default)]
    pub captured_scenes:  BTreeSet<SceneId>,
}

fn default_version() -> u32 { RECORD_VERSION }

impl SaveRecord {
    /// A record with nothing captured yet. Restoring it only resets the
    /// inventory.
    pub fn empty(scene: impl Into<SceneId>) -> Self {
        Self {
            version:          RECORD_VERSION,
            save_timestamp:   String::new(),
            scene_identifier: scene.into(),
            player_state:     None,
            world_items:      Vec::new(),
            plants:           Vec::new(),
            inventory:        InventoryRecord::default(),
            container:        None,
            market:           None,
            scene_objects:    Vec::new(),
            captured_scenes:  BTreeSet::new(),
        }
    }

    pub fn has_captured(&self, scene: &str) -> bool {
        self.captured_scenes.contains(scene)
    }

    pub fn plants_in<'a>(&'a self, scene: &'a str) -> impl Iterator<Item = &'a PlantRecord> {
        self.plants.iter().filter(move |p| p.scene == scene)
    }

    pub fn scene_objects_in<'a>(
        &'a self,
        scene: &'a str,
    ) -> impl Iterator<Item = &'a SceneObjectRecord> {
        self.scene_objects.iter().filter(move |o| o.scene == scene)
    }

    pub fn is_plant_collected(&self, scene: &str, plant_id: &str) -> bool {
        self.plants_in(scene).any(|p| p.plant_id == plant_id && p.is_collected)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerState {
    pub position: Vec3,
    pub rotation: Vec3,
    pub scene:    SceneId,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorldItemRecord {
    pub item:     ItemName,
    pub position: Vec3,
    pub rotation: Vec3,
    pub scale:    Vec3,
    pub quantity: u32,
    pub scene:    SceneId,
}

impl WorldItemRecord {
    pub fn transform(&self) -> Transform {
        Transform { position: self.position, rotation: self.rotation, scale: self.scale }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlantRecord {
    pub item:         ItemName,
    pub position:     Vec3,
    pub rotation:     Vec3,
    pub scale:        Vec3,
    pub scene:        SceneId,
    pub plant_id:     String,
    pub is_collected: bool,
}

impl PlantRecord {
    pub fn transform(&self) -> Transform {
        Transform { position: self.position, rotation: self.rotation, scale: self.scale }
    }
}

/// Collapse plant records to one per (scene, plant_id), keeping first-seen
/// order. A collected record anywhere in a group marks the survivor
/// collected.
pub fn normalize_plants(records: &[PlantRecord]) -> Vec<PlantRecord> {
    let collected: HashSet<(&str, &str)> = records
        .iter()
        .filter(|p| p.is_collected)
        .map(|p| (p.scene.as_str(), p.plant_id.as_str()))
        .collect();

    let mut seen: HashSet<(&str, &str)> = HashSet::new();
    let mut out = Vec::with_capacity(records.len());
    for record in records {
        let key = (record.scene.as_str(), record.plant_id.as_str());
        if !seen.insert(key) {
            continue;
        }
        let mut survivor = record.clone();
        survivor.is_collected = collected.contains(&key);
        out.push(survivor);
    }
    out
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotEntry {
    pub item:     ItemName,
    pub quantity: u32,
    pub slot:     usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventoryRecord {
    pub entries: Vec<SlotEntry>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerRecord {
    pub entries: Vec<SlotEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarketRecord {
    pub balance: u64,
    pub offers:  Vec<MarketOffer>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateEntry {
    /// `<TypeName>.<field>`
    pub key:   String,
    pub value: serde_json::Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SceneObjectRecord {
    pub key:       String,
    pub position:  Vec3,
    pub rotation:  Vec3,
    pub scale:     Vec3,
    pub scene:     SceneId,
    pub state:     Vec<StateEntry>,
}

impl SceneObjectRecord {
    pub fn transform(&self) -> Transform {
        Transform { position: self.position, rotation: self.rotation, scale: self.scale }
    }

    /// Capability type names that contributed to this record.
    pub fn type_names(&self) -> BTreeSet<&str> {
        self.state
            .iter()
            .filter_map(|e| e.key.split_once('.').map(|(t, _)| t))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plant(id: &str, collected: bool) -> PlantRecord {
        PlantRecord {
            item:         "Tomato".into(),
            position:     Vec3::ZERO,
            rotation:     Vec3::ZERO,
            scale:        Vec3::ONE,
            scene:        "Farm".into(),
            plant_id:     id.into(),
            is_collected: collected,
        }
    }

    #[test]
    fn collected_duplicate_wins() {
        let records = vec![plant("A", false), plant("B", false), plant("A", true)];
        let normalized = normalize_plants(&records);
        assert_eq!(normalized.len(), 2);
        assert_eq!(normalized[0].plant_id, "A");
        assert!(normalized[0].is_collected);
        assert!(!normalized[1].is_collected);
    }

    #[test]
    fn record_without_optional_fields_still_parses() {
        let json = r#"{
            "save_timestamp": "2024-01-01 00:00:00",
            "scene_identifier": "Farm",
            "player_state": null
        }"#;
        let record: SaveRecord = serde_json::from_str(json).unwrap();
        assert_eq!(record.version, RECORD_VERSION);
        assert!(record.plants.is_empty());
        assert!(record.market.is_none());
    }
}
