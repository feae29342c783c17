//! The live world the save engine reads from and writes into.
//!
//! A `Scene` is recreated from scratch every time it loads, so entity handles
//! are only meaningful inside one scene instance. The inventory travels with
//! the player and outlives scene switches.

use crate::{
    rng::MarketRng,
    saveable::Saveable,
    types::{EntityId, ItemName, SceneId, Transform},
};
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::collections::BTreeMap;
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemStack {
    pub item:     ItemName,
    pub quantity: u32,
}

impl ItemStack {
    pub fn new(item: impl Into<ItemName>, quantity: u32) -> Self {
        Self { item: item.into(), quantity }
    }
}

/// Fixed-size slot storage shared by the inventory and containers.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SlotGrid {
    slots: Vec<Option<ItemStack>>,
}

pub type Inventory = SlotGrid;

impl SlotGrid {
    pub fn new(size: usize) -> Self {
        Self { slots: vec![None; size] }
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.iter().all(Option::is_none)
    }

    pub fn get(&self, slot: usize) -> Option<&ItemStack> {
        self.slots.get(slot).and_then(Option::as_ref)
    }

    /// Put `stack` into `slot`. Returns false when the slot is out of range.
    pub fn set(&mut self, slot: usize, stack: Option<ItemStack>) -> bool {
        match self.slots.get_mut(slot) {
            Some(s) => {
                *s = stack;
                true
            }
            None => false,
        }
    }

    pub fn clear(&mut self) {
        self.slots.iter_mut().for_each(|s| *s = None);
    }

    pub fn first_free(&self) -> Option<usize> {
        self.slots.iter().position(Option::is_none)
    }

    /// Non-empty slots with their index, in slot order.
    pub fn occupied(&self) -> impl Iterator<Item = (usize, &ItemStack)> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(i, s)| s.as_ref().map(|stack| (i, stack)))
            .filter(|(_, stack)| stack.quantity > 0)
    }

    /// Merge into a stack of the same item with room for `quantity` under
    /// `stack_limit`, else take the first free slot. Returns the slot used,
    /// or `None` when nothing fits.
    pub fn add(&mut self, item: &str, quantity: u32, stack_limit: u32) -> Option<usize> {
        if quantity > stack_limit {
            return None;
        }
        for (i, slot) in self.slots.iter_mut().enumerate() {
            let Some(stack) = slot.as_mut().filter(|st| st.item == item) else {
                continue;
            };
            if let Some(merged) = stack.quantity.checked_add(quantity).filter(|q| *q <= stack_limit) {
                stack.quantity = merged;
                return Some(i);
            }
        }
        let i = self.first_free()?;
        self.slots[i] = Some(ItemStack::new(item, quantity));
        Some(i)
    }

    pub fn total_of(&self, item: &str) -> u32 {
        self.occupied()
            .filter(|(_, s)| s.item == item)
            .map(|(_, s)| s.quantity)
            .sum()
    }
}

/// A storage or brewing container placed in a scene.
#[derive(Debug, Clone, PartialEq)]
pub struct Container {
    pub name:  String,
    pub slots: SlotGrid,
}

impl Container {
    pub fn new(name: impl Into<String>, size: usize) -> Self {
        Self { name: name.into(), slots: SlotGrid::new(size) }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarketOffer {
    pub item:       ItemName,
    pub unit_price: u32,
    pub stock:      u32,
}

/// The shop: the player's coin balance plus the offers on display.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Market {
    pub balance: u64,
    pub offers:  Vec<MarketOffer>,
}

impl Market {
    pub fn new(balance: u64) -> Self {
        Self { balance, offers: Vec::new() }
    }

    /// Roll a fresh set of offers from `pool`. Only called when the shop
    /// opens for a new day; restoring a save never calls this.
    pub fn restock(&mut self, pool: &[&str], count: usize, rng: &mut MarketRng) {
        self.offers.clear();
        if pool.is_empty() {
            return;
        }
        let mut remaining: Vec<&str> = pool.to_vec();
        for _ in 0..count.min(pool.len()) {
            let pick = rng.next_below(remaining.len() as u64) as usize;
            let item = remaining.swap_remove(pick);
            self.offers.push(MarketOffer {
                item:       item.to_string(),
                unit_price: 5 + rng.next_below(46) as u32, // 5..=50
                stock:      1 + rng.next_below(10) as u32, // 1..=10
            });
        }
        log::debug!("market restocked with {} offers", self.offers.len());
    }
}

// ── Entities ───────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub struct WorldItem {
    pub item:     ItemName,
    pub quantity: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Plant {
    pub item:        ItemName,
    pub harvestable: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum EntityKind {
    Player,
    WorldItem(WorldItem),
    Plant(Plant),
    Prop,
}

pub struct Entity {
    pub id:           EntityId,
    pub name:         String,
    pub parent:       Option<EntityId>,
    pub transform:    Transform,
    pub kind:         EntityKind,
    pub capabilities: Vec<Box<dyn Saveable>>,
}

impl fmt::Debug for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let caps: Vec<&str> = self.capabilities.iter().map(|c| c.type_name()).collect();
        f.debug_struct("Entity")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("parent", &self.parent)
            .field("transform", &self.transform)
            .field("kind", &self.kind)
            .field("capabilities", &caps)
            .finish()
    }
}

impl Entity {
    /// First capability of concrete type `T`.
    pub fn capability<T: Any>(&self) -> Option<&T> {
        self.capabilities
            .iter()
            .find_map(|c| c.as_any().downcast_ref::<T>())
    }
}

/// One loaded instance of a scene.
#[derive(Debug)]
pub struct Scene {
    pub id:        SceneId,
    entities:      BTreeMap<EntityId, Entity>,
    next_id:       EntityId,
    pub container: Option<Container>,
    pub market:    Option<Market>,
}

impl Scene {
    pub fn new(id: impl Into<SceneId>) -> Self {
        Self {
            id:        id.into(),
            entities:  BTreeMap::new(),
            next_id:   1,
            container: None,
            market:    None,
        }
    }

    pub fn spawn(
        &mut self,
        name:      impl Into<String>,
        parent:    Option<EntityId>,
        transform: Transform,
        kind:      EntityKind,
    ) -> EntityId {
        self.spawn_with(name, parent, transform, kind, Vec::new())
    }

    pub fn spawn_with(
        &mut self,
        name:         impl Into<String>,
        parent:       Option<EntityId>,
        transform:    Transform,
        kind:         EntityKind,
        capabilities: Vec<Box<dyn Saveable>>,
    ) -> EntityId {
        let id = self.next_id;
        self.next_id += 1;
        self.entities.insert(id, Entity {
            id,
            name: name.into(),
            parent,
            transform,
            kind,
            capabilities,
        });
        id
    }

    /// Remove an entity and everything parented under it.
    /// Returns the number of entities removed.
    pub fn despawn(&mut self, id: EntityId) -> usize {
        if !self.entities.contains_key(&id) {
            return 0;
        }
        let mut doomed = vec![id];
        let mut i = 0;
        while i < doomed.len() {
            let current = doomed[i];
            doomed.extend(
                self.entities
                    .values()
                    .filter(|e| e.parent == Some(current))
                    .map(|e| e.id),
            );
            i += 1;
        }
        for d in &doomed {
            self.entities.remove(d);
        }
        doomed.len()
    }

    pub fn get(&self, id: EntityId) -> Option<&Entity> {
        self.entities.get(&id)
    }

    pub fn get_mut(&mut self, id: EntityId) -> Option<&mut Entity> {
        self.entities.get_mut(&id)
    }

    /// All live entities in handle (creation) order.
    pub fn entities(&self) -> impl Iterator<Item = &Entity> {
        self.entities.values()
    }

    pub fn ids(&self) -> Vec<EntityId> {
        self.entities.keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    pub fn player(&self) -> Option<&Entity> {
        self.entities.values().find(|e| e.kind == EntityKind::Player)
    }

    pub fn player_mut(&mut self) -> Option<&mut Entity> {
        self.entities.values_mut().find(|e| e.kind == EntityKind::Player)
    }

    /// True when any ancestor of `id` is a plant. The plant entity itself
    /// does not count.
    pub fn is_part_of_plant(&self, id: EntityId) -> bool {
        let mut current = self.entities.get(&id).and_then(|e| e.parent);
        while let Some(pid) = current {
            let Some(parent) = self.entities.get(&pid) else { break };
            if matches!(parent.kind, EntityKind::Plant(_)) {
                return true;
            }
            current = parent.parent;
        }
        false
    }

    /// Pickable world items, excluding those attached to a plant.
    pub fn loose_world_items(&self) -> impl Iterator<Item = (&Entity, &WorldItem)> {
        self.entities.values().filter_map(move |e| match &e.kind {
            EntityKind::WorldItem(w) if !self.is_part_of_plant(e.id) => Some((e, w)),
            _ => None,
        })
    }

    pub fn plants(&self) -> impl Iterator<Item = (&Entity, &Plant)> {
        self.entities.values().filter_map(|e| match &e.kind {
            EntityKind::Plant(p) => Some((e, p)),
            _ => None,
        })
    }

    /// Root-to-leaf entity names.
    pub fn path(&self, id: EntityId) -> Vec<&str> {
        let mut names = Vec::new();
        let mut current = Some(id);
        while let Some(cid) = current {
            let Some(e) = self.entities.get(&cid) else { break };
            names.push(e.name.as_str());
            current = e.parent;
        }
        names.reverse();
        names
    }
}

/// Everything mutable the player can see: the active scene plus the
/// inventory that follows the player between scenes.
#[derive(Debug)]
pub struct World {
    pub scene:     Scene,
    pub inventory: Inventory,
}

impl World {
    pub fn new(scene: Scene, inventory_slots: usize) -> Self {
        Self { scene, inventory: Inventory::new(inventory_slots) }
    }

    /// Swap in a freshly instantiated scene. Returns the one being unloaded.
    pub fn enter_scene(&mut self, scene: Scene) -> Scene {
        std::mem::replace(&mut self.scene, scene)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Vec3;

    #[test]
    fn despawn_takes_children_with_it() {
        let mut scene = Scene::new("Farm");
        let plant = scene.spawn(
            "TomatoPlant",
            None,
            Transform::default(),
            EntityKind::Plant(Plant { item: "Tomato".into(), harvestable: true }),
        );
        let fruit = scene.spawn(
            "Tomato",
            Some(plant),
            Transform::default(),
            EntityKind::WorldItem(WorldItem { item: "Tomato".into(), quantity: 1 }),
        );
        scene.spawn("Rock", None, Transform::at(Vec3::new(1.0, 0.0, 0.0)), EntityKind::Prop);

        assert!(scene.is_part_of_plant(fruit));
        assert_eq!(scene.loose_world_items().count(), 0);
        assert_eq!(scene.despawn(plant), 2);
        assert_eq!(scene.len(), 1);
    }

    #[test]
    fn slot_grid_merges_same_item() {
        let mut grid = SlotGrid::new(3);
        assert_eq!(grid.add("Stone", 2, 99), Some(0));
        assert_eq!(grid.add("Seed_Basil", 1, 99), Some(1));
        assert_eq!(grid.add("Stone", 3, 99), Some(0));
        assert_eq!(grid.total_of("Stone"), 5);
        assert_eq!(grid.occupied().count(), 2);
    }

    #[test]
    fn slot_grid_respects_stack_limit() {
        let mut grid = SlotGrid::new(3);
        assert_eq!(grid.add("Watering_Can", 1, 1), Some(0));
        assert_eq!(grid.add("Watering_Can", 1, 1), Some(1));
        assert_eq!(grid.add("Stone", 98, 99), Some(2));
        assert_eq!(grid.add("Stone", 2, 99), None, "full stack, no free slot");
        assert_eq!(grid.add("Stone", 1, 99), Some(2));
        assert_eq!(grid.get(2), Some(&ItemStack::new("Stone", 99)));
        assert_eq!(grid.add("Tonic", 5, 3), None, "larger than one stack");
    }

    #[test]
    fn slot_grid_add_never_overflows() {
        let mut grid = SlotGrid::new(2);
        grid.set(0, Some(ItemStack::new("Stone", u32::MAX - 1)));
        assert_eq!(grid.add("Stone", 5, u32::MAX), Some(1));
        assert_eq!(grid.get(0), Some(&ItemStack::new("Stone", u32::MAX - 1)));
        assert_eq!(grid.get(1), Some(&ItemStack::new("Stone", 5)));
    }
}
