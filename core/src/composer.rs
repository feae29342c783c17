//! Snapshot composer — live world to SaveRecord.
//!
//! RULE: Composing replaces the *current scene's* contribution to every
//! domain and never touches another scene's. Scenes load one at a time and
//! each must be able to save on its own.
//!
//! Domain passes, each self-contained:
//!   1. Player transform
//!   2. Loose world items (plant-attached items excluded)
//!   3. Plants (collected entries are permanent)
//!   4. Inventory (non-empty slots)
//!   5. Container (kept from the previous record if absent here)
//!   6. Market (same rule as the container)
//!   7. Generic scene objects, grouped per entity

use crate::{
    config::SaveConfig,
    error::SaveError,
    identity::{plant_identity, resolve_entity},
    snapshot::{
        normalize_plants, ContainerRecord, InventoryRecord, MarketRecord, PlantRecord,
        PlayerState, SaveRecord, SceneObjectRecord, SlotEntry, StateEntry, WorldItemRecord,
        RECORD_VERSION,
    },
    world::{Scene, SlotGrid, World},
};
use std::collections::HashSet;

pub struct SnapshotComposer {
    config: SaveConfig,
}

impl SnapshotComposer {
    pub fn new(config: SaveConfig) -> Self {
        Self { config }
    }

    /// Build the record superseding `previous` from the live `world`.
    pub fn compose(&self, world: &World, previous: &SaveRecord, timestamp: String) -> SaveRecord {
        let scene = &world.scene;
        let mut record = previous.clone();
        record.version = RECORD_VERSION;
        record.save_timestamp = timestamp;
        record.scene_identifier = scene.id.clone();

        record.player_state = self.harvest_player(scene, previous);
        record.world_items = self.harvest_world_items(scene, previous);
        record.plants = self.harvest_plants(scene, previous);
        record.inventory = InventoryRecord { entries: harvest_slots(&world.inventory) };
        if let Some(container) = &scene.container {
            record.container = Some(ContainerRecord { entries: harvest_slots(&container.slots) });
        }
        if let Some(market) = &scene.market {
            record.market = Some(MarketRecord {
                balance: market.balance,
                offers:  market.offers.clone(),
            });
        }
        record.scene_objects = self.harvest_scene_objects(scene, previous);
        record.captured_scenes.insert(scene.id.clone());

        log::info!(
            "composed save '{}' for scene '{}': {} world items, {} plants, {} scene objects",
            record.save_timestamp,
            scene.id,
            record.world_items.iter().filter(|w| w.scene == scene.id).count(),
            record.plants.len(),
            record.scene_objects.iter().filter(|o| o.scene == scene.id).count(),
        );
        record
    }

    fn harvest_player(&self, scene: &Scene, previous: &SaveRecord) -> Option<PlayerState> {
        match scene.player() {
            Some(player) => Some(PlayerState {
                position: player.transform.position,
                rotation: player.transform.rotation,
                scene:    scene.id.clone(),
            }),
            None => {
                let err = SaveError::MissingEntity { what: "player", scene: scene.id.clone() };
                log::warn!("{err}; keeping previous player state");
                previous.player_state.clone()
            }
        }
    }

    fn harvest_world_items(&self, scene: &Scene, previous: &SaveRecord) -> Vec<WorldItemRecord> {
        let mut items: Vec<WorldItemRecord> = previous
            .world_items
            .iter()
            .filter(|w| w.scene != scene.id)
            .cloned()
            .collect();
        items.extend(scene.loose_world_items().map(|(entity, item)| WorldItemRecord {
            item:     item.item.clone(),
            position: entity.transform.position,
            rotation: entity.transform.rotation,
            scale:    entity.transform.scale,
            quantity: item.quantity,
            scene:    scene.id.clone(),
        }));
        items
    }

    fn harvest_plants(&self, scene: &Scene, previous: &SaveRecord) -> Vec<PlantRecord> {
        // Keep everything from other scenes, and this scene's collected
        // entries. This scene's uncollected entries are re-derived below.
        let mut plants: Vec<PlantRecord> = previous
            .plants
            .iter()
            .filter(|p| p.scene != scene.id || p.is_collected)
            .cloned()
            .collect();

        let mut taken: HashSet<String> = plants
            .iter()
            .filter(|p| p.scene == scene.id)
            .map(|p| p.plant_id.clone())
            .collect();

        for (entity, plant) in scene.plants() {
            let plant_id =
                plant_identity(&plant.item, entity.transform.position, self.config.plant_precision);
            if !taken.insert(plant_id.clone()) {
                log::debug!("plant '{plant_id}' already recorded, skipping duplicate");
                continue;
            }
            plants.push(PlantRecord {
                item:         plant.item.clone(),
                position:     entity.transform.position,
                rotation:     entity.transform.rotation,
                scale:        entity.transform.scale,
                scene:        scene.id.clone(),
                plant_id,
                is_collected: false,
            });
        }

        normalize_plants(&plants)
    }

    fn harvest_scene_objects(
        &self,
        scene:    &Scene,
        previous: &SaveRecord,
    ) -> Vec<SceneObjectRecord> {
        let mut objects: Vec<SceneObjectRecord> = previous
            .scene_objects
            .iter()
            .filter(|o| o.scene != scene.id)
            .cloned()
            .collect();

        let mut keys: HashSet<String> = HashSet::new();
        for entity in scene.entities().filter(|e| !e.capabilities.is_empty()) {
            let key = resolve_entity(scene, entity);
            if !keys.insert(key.clone()) {
                // Both records are kept; restore tells them apart by position.
                log::warn!("scene '{}': identity key '{key}' is not unique", scene.id);
            }

            let mut state = Vec::new();
            for capability in &entity.capabilities {
                let type_name = capability.type_name();
                for (field, value) in capability.collect_state().iter() {
                    state.push(StateEntry {
                        key:   format!("{type_name}.{field}"),
                        value: value.clone(),
                    });
                }
            }

            objects.push(SceneObjectRecord {
                key,
                position: entity.transform.position,
                rotation: entity.transform.rotation,
                scale:    entity.transform.scale,
                scene:    scene.id.clone(),
                state,
            });
        }
        objects
    }
}

fn harvest_slots(grid: &SlotGrid) -> Vec<SlotEntry> {
    grid.occupied()
        .map(|(slot, stack)| SlotEntry {
            item:     stack.item.clone(),
            quantity: stack.quantity,
            slot,
        })
        .collect()
}
