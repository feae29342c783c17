//! The restoration orchestrator — SaveRecord back into a fresh scene.
//!
//! STAGE ORDER (fixed, one stage per tick, never reordered):
//!   0. Settle               wait `settle_ticks` for scene construction
//!   1. Clear transient      despawn loose world items
//!   2. Restore player       only on an exact scene match
//!   3. Restore world items  skip ones that duplicate a live plant identity
//!   4. Restore objects      exact key, then nearest-neighbour fallback
//!   5. Reconcile plants     after objects, so plot flags are already right
//!   6. Restore inventory
//!   7. Restore container
//!   8. Restore market
//!
//! RULES:
//!   - A stage that cannot find its target logs, records an issue, and
//!     lets the next stage run. Nothing here aborts a restore.
//!   - Restores never interleave: a second request queues until the
//!     active one reaches Done.
//!   - There is no rollback. A restore cut short by a scene switch leaves
//!     whatever stages already ran.

use crate::{
    catalog::ItemCatalog,
    config::SaveConfig,
    error::SaveError,
    event::{DataChannel, RestoreHooks},
    fallback::match_record,
    identity::{plant_identity, resolve_entity},
    saveable::StateMap,
    snapshot::{normalize_plants, SaveRecord, SceneObjectRecord, SlotEntry},
    types::{EntityId, SceneId, Vec3},
    world::{EntityKind, ItemStack, Plant, SlotGrid, WorldItem, World},
};
use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};
use std::rc::Rc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RestoreStage {
    Settle,
    ClearTransient,
    RestorePlayer,
    RestoreWorldItems,
    RestoreSceneObjects,
    ReconcilePlants,
    RestoreInventory,
    RestoreContainer,
    RestoreMarket,
    Done,
}

impl RestoreStage {
    fn next(self) -> Self {
        match self {
            Self::Settle              => Self::ClearTransient,
            Self::ClearTransient      => Self::RestorePlayer,
            Self::RestorePlayer       => Self::RestoreWorldItems,
            Self::RestoreWorldItems   => Self::RestoreSceneObjects,
            Self::RestoreSceneObjects => Self::ReconcilePlants,
            Self::ReconcilePlants     => Self::RestoreInventory,
            Self::RestoreInventory    => Self::RestoreContainer,
            Self::RestoreContainer    => Self::RestoreMarket,
            Self::RestoreMarket       => Self::Done,
            Self::Done                => Self::Done,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Settle              => "settle",
            Self::ClearTransient      => "clear_transient",
            Self::RestorePlayer       => "restore_player",
            Self::RestoreWorldItems   => "restore_world_items",
            Self::RestoreSceneObjects => "restore_scene_objects",
            Self::ReconcilePlants     => "reconcile_plants",
            Self::RestoreInventory    => "restore_inventory",
            Self::RestoreContainer    => "restore_container",
            Self::RestoreMarket       => "restore_market",
            Self::Done                => "done",
        }
    }
}

/// What one restore did. Recoverable problems land in `issues`.
#[derive(Debug, Default)]
pub struct RestoreReport {
    pub timestamp:            String,
    pub scene:                SceneId,
    pub stages_run:           Vec<RestoreStage>,
    pub world_items_cleared:  usize,
    pub world_items_spawned:  usize,
    pub world_items_skipped:  usize,
    pub objects_exact:        usize,
    pub objects_fallback:     usize,
    pub objects_unmatched:    usize,
    pub plants_spawned:       usize,
    pub plants_removed:       usize,
    /// True when a scene switch cut the restore short.
    pub abandoned:            bool,
    pub issues:               Vec<SaveError>,
}

impl RestoreReport {
    pub fn completed(&self) -> bool {
        !self.abandoned && self.stages_run.last() == Some(&RestoreStage::RestoreMarket)
    }
}

struct RestoreOperation {
    record:      SaveRecord,
    stage:       RestoreStage,
    settle_left: u32,
    /// Scene the restore started in; fixed when Settle ends.
    scene:       Option<SceneId>,
    report:      RestoreReport,
}

pub struct RestoreOrchestrator {
    config:  SaveConfig,
    catalog: Rc<dyn ItemCatalog>,
    queue:   VecDeque<SaveRecord>,
    active:  Option<RestoreOperation>,
}

impl RestoreOrchestrator {
    pub fn new(config: SaveConfig, catalog: Rc<dyn ItemCatalog>) -> Self {
        Self { config, catalog, queue: VecDeque::new(), active: None }
    }

    /// Queue a restore. Starts on the next tick if nothing is running.
    pub fn request(&mut self, record: SaveRecord) {
        if self.active.is_some() {
            log::debug!(
                "restore of '{}' queued behind active restore",
                record.save_timestamp
            );
        }
        self.queue.push_back(record);
    }

    /// True while a restore is running or waiting to run.
    pub fn is_busy(&self) -> bool {
        self.active.is_some() || !self.queue.is_empty()
    }

    pub fn current_stage(&self) -> Option<RestoreStage> {
        self.active.as_ref().map(|op| op.stage)
    }

    pub fn queued(&self) -> usize {
        self.queue.len()
    }

    /// Advance by one tick. Returns the report when a restore finishes.
    pub fn tick(
        &mut self,
        world: &mut World,
        hooks: &mut dyn RestoreHooks,
    ) -> Option<RestoreReport> {
        if self.active.is_none() {
            let record = self.queue.pop_front()?;
            self.active = Some(RestoreOperation {
                report: RestoreReport {
                    timestamp: record.save_timestamp.clone(),
                    scene:     world.scene.id.clone(),
                    ..RestoreReport::default()
                },
                record,
                stage:       RestoreStage::Settle,
                settle_left: self.config.settle_ticks,
                scene:       None,
            });
        }
        let op = self.active.as_mut()?;

        if op.stage == RestoreStage::Settle {
            if op.settle_left > 0 {
                op.settle_left -= 1;
                return None;
            }
            op.scene = Some(world.scene.id.clone());
            op.report.scene = world.scene.id.clone();
            op.stage = op.stage.next();
        }

        if op.scene.as_deref() != Some(world.scene.id.as_str()) {
            log::warn!(
                "restore of '{}' abandoned at {}: scene changed to '{}'",
                op.record.save_timestamp,
                op.stage.name(),
                world.scene.id
            );
            op.report.abandoned = true;
            return self.active.take().map(|op| op.report);
        }

        let stage = op.stage;
        log::debug!("restore '{}': stage {}", op.record.save_timestamp, stage.name());
        op.run_stage(stage, world, self.catalog.as_ref(), &self.config, hooks);
        op.report.stages_run.push(stage);
        op.stage = stage.next();

        if op.stage != RestoreStage::Done {
            return None;
        }
        let report = self.active.take()?.report;
        log::info!(
            "restore '{}' into '{}' done: {} items, {} exact + {} fallback objects, {} plants spawned, {} issues",
            report.timestamp,
            report.scene,
            report.world_items_spawned,
            report.objects_exact,
            report.objects_fallback,
            report.plants_spawned,
            report.issues.len(),
        );
        Some(report)
    }

    /// Tick until every queued restore has finished. For tests and tooling;
    /// the game advances restores one tick per frame instead.
    pub fn run_until_idle(
        &mut self,
        world: &mut World,
        hooks: &mut dyn RestoreHooks,
    ) -> Vec<RestoreReport> {
        let mut reports = Vec::new();
        while self.is_busy() {
            if let Some(report) = self.tick(world, hooks) {
                reports.push(report);
            }
        }
        reports
    }
}

impl RestoreOperation {
    fn run_stage(
        &mut self,
        stage:   RestoreStage,
        world:   &mut World,
        catalog: &dyn ItemCatalog,
        config:  &SaveConfig,
        hooks:   &mut dyn RestoreHooks,
    ) {
        match stage {
            RestoreStage::Settle | RestoreStage::Done => {}
            RestoreStage::ClearTransient      => self.clear_transient(world),
            RestoreStage::RestorePlayer       => self.restore_player(world),
            RestoreStage::RestoreWorldItems   => self.restore_world_items(world, catalog, config),
            RestoreStage::RestoreSceneObjects => self.restore_scene_objects(world, config),
            RestoreStage::ReconcilePlants     => self.reconcile_plants(world, catalog, config),
            RestoreStage::RestoreInventory    => self.restore_inventory(world, catalog, hooks),
            RestoreStage::RestoreContainer    => self.restore_container(world, catalog, hooks),
            RestoreStage::RestoreMarket       => self.restore_market(world, hooks),
        }
    }

    fn issue(&mut self, err: SaveError) {
        log::warn!("restore '{}': {err}", self.record.save_timestamp);
        self.report.issues.push(err);
    }

    // ── 1. Clear transient ─────────────────────────────────────

    fn clear_transient(&mut self, world: &mut World) {
        let scene = &mut world.scene;
        if !self.record.has_captured(&scene.id) {
            log::debug!("scene '{}' never captured; keeping authored world items", scene.id);
            return;
        }
        let doomed: Vec<EntityId> = scene.loose_world_items().map(|(e, _)| e.id).collect();
        for id in doomed {
            scene.despawn(id);
            self.report.world_items_cleared += 1;
        }
    }

    // ── 2. Player ──────────────────────────────────────────────

    fn restore_player(&mut self, world: &mut World) {
        let Some(state) = &self.record.player_state else {
            log::debug!("no player state saved");
            return;
        };
        if state.scene != world.scene.id {
            log::debug!(
                "player saved in '{}', current scene '{}'; position not applied",
                state.scene,
                world.scene.id
            );
            return;
        }
        let (position, rotation) = (state.position, state.rotation);
        match world.scene.player_mut() {
            Some(player) => {
                player.transform.position = position;
                player.transform.rotation = rotation;
            }
            None => {
                let scene = world.scene.id.clone();
                self.issue(SaveError::MissingEntity { what: "player", scene });
            }
        }
    }

    // ── 3. World items ─────────────────────────────────────────

    fn restore_world_items(
        &mut self,
        world:   &mut World,
        catalog: &dyn ItemCatalog,
        config:  &SaveConfig,
    ) {
        let scene_id = world.scene.id.clone();
        let plants: Vec<_> = self.record.plants_in(&scene_id).cloned().collect();
        let live_plant_ids: HashSet<String> = normalize_plants(&plants)
            .into_iter()
            .filter(|p| !p.is_collected)
            .map(|p| p.plant_id)
            .collect();

        let mut missing = Vec::new();
        for item in self.record.world_items.iter().filter(|w| w.scene == scene_id) {
            let as_plant = plant_identity(&item.item, item.position, config.plant_precision);
            if live_plant_ids.contains(&as_plant) {
                self.report.world_items_skipped += 1;
                continue;
            }
            let Some(def) = catalog.lookup(&item.item) else {
                missing.push(item.item.clone());
                continue;
            };
            world.scene.spawn(
                def.representation.clone(),
                None,
                item.transform(),
                EntityKind::WorldItem(WorldItem {
                    item:     item.item.clone(),
                    quantity: item.quantity,
                }),
            );
            self.report.world_items_spawned += 1;
        }
        for item in missing {
            self.issue(SaveError::MissingItemDefinition { item });
        }
    }

    // ── 4. Scene objects ───────────────────────────────────────

    fn restore_scene_objects(&mut self, world: &mut World, config: &SaveConfig) {
        let scene_id = world.scene.id.clone();
        let records: Vec<&SceneObjectRecord> = self.record.scene_objects_in(&scene_id).collect();
        let mut claimed = vec![false; records.len()];

        struct Target {
            entity:   EntityId,
            key:      String,
            position: Vec3,
            types:    BTreeSet<&'static str>,
        }
        let scene = &world.scene;
        let targets: Vec<Target> = scene
            .entities()
            .filter(|e| !e.capabilities.is_empty())
            .map(|e| Target {
                entity:   e.id,
                key:      resolve_entity(scene, e),
                position: e.transform.position,
                types:    e.capabilities.iter().map(|c| c.type_name()).collect(),
            })
            .collect();

        // Exact keys first for everyone, so a fallback search can never
        // steal a record that another entity matches by key.
        let mut assigned: Vec<Option<usize>> = targets
            .iter()
            .map(|t| {
                let hit = records
                    .iter()
                    .enumerate()
                    .position(|(i, r)| !claimed[i] && r.key == t.key);
                if let Some(i) = hit {
                    claimed[i] = true;
                }
                hit
            })
            .collect();
        self.report.objects_exact = assigned.iter().filter(|a| a.is_some()).count();

        for (target, slot) in targets.iter().zip(assigned.iter_mut()) {
            if slot.is_some() {
                continue;
            }
            match match_record(
                &records,
                &claimed,
                target.position,
                &target.types,
                config.fallback_radius,
            ) {
                Some(i) => {
                    log::debug!(
                        "'{}' matched saved '{}' by position",
                        target.key,
                        records[i].key
                    );
                    claimed[i] = true;
                    *slot = Some(i);
                    self.report.objects_fallback += 1;
                }
                None => {
                    log::debug!("'{}' has no saved state; keeping defaults", target.key);
                    self.report.objects_unmatched += 1;
                }
            }
        }

        for (target, slot) in targets.iter().zip(assigned) {
            let (Some(i), Some(entity)) = (slot, world.scene.get_mut(target.entity)) else {
                continue;
            };
            let record = records[i];
            entity.transform = record.transform();
            for capability in entity.capabilities.iter_mut() {
                let prefix = format!("{}.", capability.type_name());
                let subset: StateMap = record
                    .state
                    .iter()
                    .filter_map(|e| {
                        e.key
                            .strip_prefix(&prefix)
                            .map(|field| (field.to_string(), e.value.clone()))
                    })
                    .collect();
                capability.apply_state(&subset);
            }
        }
    }

    // ── 5. Plants ──────────────────────────────────────────────

    fn reconcile_plants(
        &mut self,
        world:   &mut World,
        catalog: &dyn ItemCatalog,
        config:  &SaveConfig,
    ) {
        let scene = &mut world.scene;
        let recorded: Vec<_> = self.record.plants_in(&scene.id).cloned().collect();
        let plants = normalize_plants(&recorded);

        // Several live plants can round to one identity.
        let mut live: HashMap<String, Vec<EntityId>> = HashMap::new();
        for (e, p) in scene.plants() {
            live.entry(plant_identity(&p.item, e.transform.position, config.plant_precision))
                .or_default()
                .push(e.id);
        }

        // Authored plants the player already harvested.
        for plant in plants.iter().filter(|p| p.is_collected) {
            for id in live.remove(&plant.plant_id).unwrap_or_default() {
                scene.despawn(id);
                self.report.plants_removed += 1;
            }
        }

        let mut missing = Vec::new();
        for plant in plants.iter().filter(|p| !p.is_collected) {
            if live.contains_key(&plant.plant_id) {
                continue;
            }
            let Some(def) = catalog.lookup(&plant.item) else {
                missing.push(plant.item.clone());
                continue;
            };
            let id = scene.spawn(
                def.representation.clone(),
                None,
                plant.transform(),
                EntityKind::Plant(Plant { item: plant.item.clone(), harvestable: true }),
            );
            // The produce hangs off the plant, so it never counts as loose.
            scene.spawn(
                def.display_name.clone(),
                Some(id),
                plant.transform(),
                EntityKind::WorldItem(WorldItem { item: plant.item.clone(), quantity: 1 }),
            );
            live.insert(plant.plant_id.clone(), vec![id]);
            self.report.plants_spawned += 1;
        }
        for item in missing {
            self.issue(SaveError::MissingItemDefinition { item });
        }
    }

    // ── 6–8. Inventory, container, market ──────────────────────

    fn restore_inventory(
        &mut self,
        world:   &mut World,
        catalog: &dyn ItemCatalog,
        hooks:   &mut dyn RestoreHooks,
    ) {
        let missing = refill(&mut world.inventory, &self.record.inventory.entries, catalog);
        for item in missing {
            self.issue(SaveError::MissingItemDefinition { item });
        }
        hooks.data_changed(DataChannel::Inventory);
    }

    fn restore_container(
        &mut self,
        world:   &mut World,
        catalog: &dyn ItemCatalog,
        hooks:   &mut dyn RestoreHooks,
    ) {
        let Some(container) = world.scene.container.as_mut() else {
            log::debug!("no container in scene '{}'", world.scene.id);
            return;
        };
        let Some(saved) = &self.record.container else {
            log::debug!("no container state saved");
            return;
        };
        let missing = refill(&mut container.slots, &saved.entries, catalog);
        for item in missing {
            self.issue(SaveError::MissingItemDefinition { item });
        }
        hooks.data_changed(DataChannel::Container);
    }

    fn restore_market(&mut self, world: &mut World, hooks: &mut dyn RestoreHooks) {
        let Some(market) = world.scene.market.as_mut() else {
            log::debug!("no market in scene '{}'", world.scene.id);
            return;
        };
        let Some(saved) = &self.record.market else {
            log::debug!("no market state saved");
            return;
        };
        market.balance = saved.balance;
        market.offers = saved.offers.clone();
        hooks.data_changed(DataChannel::Market);
    }
}

/// Clear `grid` and refill it from `entries`, keeping each entry in its
/// saved slot when that slot exists and is free. Returns item names the
/// catalog no longer knows; those entries are dropped.
fn refill(grid: &mut SlotGrid, entries: &[SlotEntry], catalog: &dyn ItemCatalog) -> Vec<String> {
    grid.clear();
    let mut missing = Vec::new();
    for entry in entries.iter().filter(|e| e.quantity > 0) {
        if catalog.lookup(&entry.item).is_none() {
            missing.push(entry.item.clone());
            continue;
        }
        let stack = ItemStack::new(entry.item.clone(), entry.quantity);
        let slot = if entry.slot < grid.len() && grid.get(entry.slot).is_none() {
            Some(entry.slot)
        } else {
            grid.first_free()
        };
        match slot {
            Some(s) => {
                if s != entry.slot {
                    log::warn!("'{}' moved from slot {} to {s}", entry.item, entry.slot);
                }
                grid.set(s, Some(stack));
            }
            None => log::warn!("no free slot for '{}' x{}; dropped", entry.item, entry.quantity),
        }
    }
    missing
}
