//! The save engine — the single entry point the game talks to.
//!
//! Owns the store, the composer, the restore orchestrator, and the
//! session's *working record*: the SaveRecord seeded by the last load and
//! updated by every capture. Switching scenes captures the outgoing scene
//! into the working record and restores the incoming scene from it, so
//! scenes keep their state for the whole session even between saves.
//!
//! RULES:
//!   - Nothing is a global. Store, catalog, config and clock are handed in
//!     at construction.
//!   - While a restore is running, queued, or waiting on a scene switch,
//!     captures and saves are suppressed. A half-restored scene must never
//!     be written back.
//!   - After a load that needs a scene switch, the scene being left is not
//!     captured; the loaded record wins.
//!   - Harvesting a plant marks it collected in the working record at
//!     once, so no reload can bring it back.

use crate::{
    catalog::{ItemCatalog, StaticCatalog},
    clock::{ManualClock, SaveClock, SystemClock},
    composer::SnapshotComposer,
    config::SaveConfig,
    error::{SaveError, SaveResult},
    event::{RestoreHooks, SceneEvent},
    identity::plant_identity,
    restore::{RestoreOrchestrator, RestoreReport, RestoreStage},
    snapshot::{PlantRecord, SaveRecord},
    store::SaveStore,
    types::{EntityId, SceneId},
    world::{EntityKind, World},
};
use std::rc::Rc;

/// What the caller must do after asking for a load.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadOutcome {
    /// The save belongs to the current scene; restore stages are queued.
    Restoring { timestamp: String },
    /// The save belongs to another scene. Switch to it; the restore runs
    /// when that scene reports `FinishedLoading`.
    SceneSwitchRequired { timestamp: String, scene: SceneId },
}

pub struct SaveEngine {
    config:        SaveConfig,
    store:         SaveStore,
    catalog:       Rc<dyn ItemCatalog>,
    composer:      SnapshotComposer,
    orchestrator:  RestoreOrchestrator,
    clock:         Box<dyn SaveClock>,
    working:       SaveRecord,
    pending_scene: Option<SceneId>,
}

impl SaveEngine {
    pub fn new(
        config:  SaveConfig,
        store:   SaveStore,
        catalog: Rc<dyn ItemCatalog>,
        clock:   Box<dyn SaveClock>,
    ) -> Self {
        Self {
            composer:      SnapshotComposer::new(config.clone()),
            orchestrator:  RestoreOrchestrator::new(config.clone(), Rc::clone(&catalog)),
            working:       SaveRecord::empty(""),
            pending_scene: None,
            config,
            store,
            catalog,
            clock,
        }
    }

    /// Engine on the local wall clock. The store must already be migrated.
    pub fn build(config: SaveConfig, store: SaveStore, catalog: Rc<dyn ItemCatalog>) -> Self {
        Self::new(config, store, catalog, Box::new(SystemClock))
    }

    /// Fully wired engine for tests: in-memory store, test catalog,
    /// deterministic clock, zero settle delay.
    pub fn build_test() -> SaveResult<Self> {
        Self::build_test_with(SaveConfig::default_test())
    }

    pub fn build_test_with(config: SaveConfig) -> SaveResult<Self> {
        let store = SaveStore::in_memory(config.max_slots)?;
        store.migrate()?;
        Ok(Self::new(
            config,
            store,
            Rc::new(StaticCatalog::default_test()),
            Box::new(ManualClock::starting_epoch()),
        ))
    }

    pub fn config(&self) -> &SaveConfig {
        &self.config
    }

    pub fn store(&self) -> &SaveStore {
        &self.store
    }

    pub fn catalog(&self) -> &dyn ItemCatalog {
        self.catalog.as_ref()
    }

    pub fn working_record(&self) -> &SaveRecord {
        &self.working
    }

    pub fn is_restoring(&self) -> bool {
        self.orchestrator.is_busy()
    }

    pub fn restore_stage(&self) -> Option<RestoreStage> {
        self.orchestrator.current_stage()
    }

    /// Scene a cross-scene load is waiting for, if any.
    pub fn pending_scene(&self) -> Option<&str> {
        self.pending_scene.as_deref()
    }

    // ── Save ───────────────────────────────────────────────────

    /// Fold the current scene into the working record without writing a
    /// slot. Returns false when suppressed by a running or pending restore.
    pub fn capture(&mut self, world: &World) -> bool {
        if self.restore_in_flight() {
            log::info!("capture of '{}' suppressed: restore in progress", world.scene.id);
            return false;
        }
        let timestamp = self.working.save_timestamp.clone();
        self.working = self.composer.compose(world, &self.working, timestamp);
        true
    }

    /// Compose and persist a new save. Returns its timestamp, or `None`
    /// when suppressed by a running or pending restore.
    pub fn save(&mut self, world: &World) -> SaveResult<Option<String>> {
        if self.restore_in_flight() {
            log::info!("save suppressed: restore in progress");
            return Ok(None);
        }
        let timestamp = self.clock.now();
        let record = self.composer.compose(world, &self.working, timestamp.clone());
        self.store.save(&record)?;
        self.working = record;
        Ok(Some(timestamp))
    }

    /// A cross-scene load waiting for its scene counts as a restore; the
    /// working record already holds the loaded save.
    fn restore_in_flight(&self) -> bool {
        self.orchestrator.is_busy() || self.pending_scene.is_some()
    }

    // ── Load ───────────────────────────────────────────────────

    pub fn load(&mut self, timestamp: &str, world: &World) -> SaveResult<LoadOutcome> {
        let record = self.store.load(timestamp)?;
        let scene = record.scene_identifier.clone();
        self.working = record;

        if scene == world.scene.id {
            self.pending_scene = None;
            self.orchestrator.request(self.working.clone());
            log::info!("loading '{timestamp}' into current scene '{scene}'");
            Ok(LoadOutcome::Restoring { timestamp: timestamp.to_string() })
        } else {
            log::info!("loading '{timestamp}' needs scene switch '{}' -> '{scene}'", world.scene.id);
            self.pending_scene = Some(scene.clone());
            Ok(LoadOutcome::SceneSwitchRequired { timestamp: timestamp.to_string(), scene })
        }
    }

    /// Load the newest save. `None` when the store is empty.
    pub fn load_latest(&mut self, world: &World) -> SaveResult<Option<LoadOutcome>> {
        match self.store.list_timestamps()?.last() {
            Some(ts) => self.load(ts, world).map(Some),
            None => Ok(None),
        }
    }

    pub fn list_saves(&self) -> SaveResult<Vec<String>> {
        self.store.list_timestamps()
    }

    pub fn delete_save(&self, timestamp: &str) -> SaveResult<bool> {
        self.store.delete(timestamp)
    }

    // ── Scene lifecycle ────────────────────────────────────────

    pub fn handle_event(&mut self, event: &SceneEvent, world: &World) -> SaveResult<()> {
        match event {
            SceneEvent::AboutToUnload { scene } => {
                if *scene != world.scene.id {
                    log::warn!("unload signal for '{scene}' but '{}' is active", world.scene.id);
                    return Ok(());
                }
                if let Some(target) = &self.pending_scene {
                    // The working record now holds a loaded save; the scene
                    // being left must not be folded into it.
                    log::debug!("leaving '{scene}' for loaded save in '{target}'; not captured");
                    return Ok(());
                }
                if self.config.autosave_on_unload {
                    self.save(world)?;
                } else {
                    self.capture(world);
                }
            }
            SceneEvent::FinishedLoading { scene } => {
                let awaited = self.pending_scene.as_deref() == Some(scene.as_str());
                if awaited {
                    self.pending_scene = None;
                }
                if awaited || self.working.has_captured(scene) {
                    self.orchestrator.request(self.working.clone());
                } else {
                    log::debug!("scene '{scene}' has no saved state; nothing to restore");
                }
            }
        }
        Ok(())
    }

    /// Advance any running restore by one stage.
    pub fn tick(&mut self, world: &mut World, hooks: &mut dyn RestoreHooks) -> Option<RestoreReport> {
        self.orchestrator.tick(world, hooks)
    }

    /// Run every queued restore to completion.
    pub fn finish_restores(
        &mut self,
        world: &mut World,
        hooks: &mut dyn RestoreHooks,
    ) -> Vec<RestoreReport> {
        self.orchestrator.run_until_idle(world, hooks)
    }

    // ── Consumables ────────────────────────────────────────────

    /// Harvest a live plant: despawn it, put its produce in the inventory,
    /// and record it as collected in the working record.
    pub fn harvest_plant(&mut self, world: &mut World, entity: EntityId) -> SaveResult<PlantRecord> {
        let scene_id = world.scene.id.clone();
        let (item, transform) = match world.scene.get(entity).map(|e| (&e.kind, e.transform)) {
            Some((EntityKind::Plant(p), transform)) if p.harvestable => (p.item.clone(), transform),
            _ => {
                return Err(SaveError::MissingEntity { what: "harvestable plant", scene: scene_id });
            }
        };
        let Some(stack_limit) = self.catalog.lookup(&item).map(|def| def.stack_limit()) else {
            return Err(SaveError::MissingItemDefinition { item });
        };

        let plant_id = plant_identity(&item, transform.position, self.config.plant_precision);
        let collected = PlantRecord {
            item:         item.clone(),
            position:     transform.position,
            rotation:     transform.rotation,
            scale:        transform.scale,
            scene:        scene_id.clone(),
            plant_id:     plant_id.clone(),
            is_collected: true,
        };

        world.scene.despawn(entity);
        if world.inventory.add(&item, 1, stack_limit).is_none() {
            log::warn!("inventory full; harvested '{item}' was not stored");
        }

        self.working
            .plants
            .retain(|p| !(p.scene == scene_id && p.plant_id == plant_id));
        self.working.plants.push(collected.clone());
        log::info!("plant '{plant_id}' in '{scene_id}' collected");
        Ok(collected)
    }
}
