//! Item-type catalog.
//!
//! The catalog is owned by the game, not by the save engine. The engine only
//! looks definitions up by name when it has to respawn something.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ItemDefinition {
    pub name:         String,
    pub display_name: String,
    #[serde(default = "default_stackable")]
    pub stackable:    bool,
    #[serde(default = "default_max_stack")]
    pub max_stack:    u32,
    #[serde(default)]
    pub plantable:    bool,
    #[serde(default)]
    pub dryable:      bool,
    /// Name given to entities spawned for this item type.
    pub representation: String,
}

fn default_stackable() -> bool { true }
fn default_max_stack() -> u32 { 99 }

impl ItemDefinition {
    /// Most units one inventory slot may hold.
    pub fn stack_limit(&self) -> u32 {
        if self.stackable {
            self.max_stack.max(1)
        } else {
            1
        }
    }
}

/// Lookup-by-name access to item definitions.
pub trait ItemCatalog {
    fn lookup(&self, name: &str) -> Option<&ItemDefinition>;
}

#[derive(Debug, Clone, Deserialize)]
struct ItemCatalogFile {
    items: Vec<ItemDefinition>,
}

/// Catalog backed by a map, loaded once at startup.
#[derive(Debug, Clone, Default)]
pub struct StaticCatalog {
    items: HashMap<String, ItemDefinition>,
}

impl StaticCatalog {
    pub fn new(items: impl IntoIterator<Item = ItemDefinition>) -> Self {
        Self {
            items: items.into_iter().map(|i| (i.name.clone(), i)).collect(),
        }
    }

    /// Load from `{data_dir}/items/item_catalog.json`.
    pub fn load(data_dir: &str) -> anyhow::Result<Self> {
        let path = format!("{data_dir}/items/item_catalog.json");
        let content = std::fs::read_to_string(&path)
            .map_err(|e| anyhow::anyhow!("Cannot read {path}: {e}"))?;
        let file: ItemCatalogFile = serde_json::from_str(&content)?;
        Ok(Self::new(file.items))
    }

    /// Small hardcoded catalog for tests.
    pub fn default_test() -> Self {
        let crop = |name: &str| ItemDefinition {
            name:           name.into(),
            display_name:   name.replace('_', " "),
            stackable:      true,
            max_stack:      99,
            plantable:      true,
            dryable:        true,
            representation: format!("{name}Plant"),
        };
        let good = |name: &str, stackable: bool| ItemDefinition {
            name:           name.into(),
            display_name:   name.replace('_', " "),
            stackable,
            max_stack:      if stackable { 99 } else { 1 },
            plantable:      false,
            dryable:        false,
            representation: format!("{name}Pickup"),
        };
        Self::new([
            crop("Tomato"),
            crop("Basil"),
            crop("Lavender"),
            good("Seed_Tomato", true),
            good("Seed_Basil", true),
            good("Stone", true),
            good("Watering_Can", false),
            good("Tonic", true),
        ])
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

impl ItemCatalog for StaticCatalog {
    fn lookup(&self, name: &str) -> Option<&ItemDefinition> {
        self.items.get(name)
    }
}
