//! The Saveable contract and the scene-placed objects that implement it.
//!
//! RULE: Entities expose their persisted state only through this trait.
//! The save engine never reaches into an entity's fields directly.

use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;
use std::any::Any;
use std::collections::BTreeMap;

/// Flat key/value state contributed by one capability.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StateMap(BTreeMap<String, Value>);

impl StateMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `value` under `key`. A value that cannot be represented as
    /// JSON is dropped with a warning, which restores it as a default.
    pub fn insert<T: Serialize>(&mut self, key: &str, value: T) {
        match serde_json::to_value(value) {
            Ok(v) => {
                self.0.insert(key.to_string(), v);
            }
            Err(e) => log::warn!("state field '{key}' not serializable, skipped: {e}"),
        }
    }

    pub fn with<T: Serialize>(mut self, key: &str, value: T) -> Self {
        self.insert(key, value);
        self
    }

    pub fn insert_raw(&mut self, key: String, value: Value) {
        self.0.insert(key, value);
    }

    /// Typed read. `None` when the key is absent or the stored value does not
    /// parse as `T`; the caller keeps its construction default either way.
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let raw = self.0.get(key)?;
        match T::deserialize(raw) {
            Ok(v) => Some(v),
            Err(e) => {
                log::warn!("state field '{key}' has unexpected value {raw}: {e}");
                None
            }
        }
    }

    pub fn raw(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<(String, Value)> for StateMap {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// The contract every stateful scene object must fulfill.
pub trait Saveable: Send {
    /// Stable type name; qualifies this capability's keys in scene records.
    fn type_name(&self) -> &'static str;

    /// Explicit identity. Preferred over the hierarchy path when present
    /// and non-empty.
    fn save_id(&self) -> Option<&str> {
        None
    }

    /// Must not mutate anything. Omitted keys restore as defaults.
    fn collect_state(&self) -> StateMap;

    /// Apply whatever keys are present and parse; leave the rest alone.
    /// Called at most once per restore, but must tolerate repeats.
    fn apply_state(&mut self, state: &StateMap);

    /// For downcasting in tests and tooling only.
    fn as_any(&self) -> &dyn Any;
}

// ── Farm plot ──────────────────────────────────────────────────

/// A tillable patch of soil. Plant reconciliation runs after these flags
/// are restored so that spawned plants land on prepared plots.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FarmPlot {
    pub save_id:  Option<String>,
    pub prepared: bool,
    pub occupied: bool,
    pub watered:  bool,
}

impl FarmPlot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_id(id: impl Into<String>) -> Self {
        Self { save_id: Some(id.into()), ..Self::default() }
    }
}

impl Saveable for FarmPlot {
    fn type_name(&self) -> &'static str { "FarmPlot" }

    fn save_id(&self) -> Option<&str> {
        self.save_id.as_deref()
    }

    fn collect_state(&self) -> StateMap {
        StateMap::new()
            .with("prepared", self.prepared)
            .with("occupied", self.occupied)
            .with("watered", self.watered)
    }

    fn apply_state(&mut self, state: &StateMap) {
        if let Some(v) = state.get("prepared") { self.prepared = v; }
        if let Some(v) = state.get("occupied") { self.occupied = v; }
        if let Some(v) = state.get("watered")  { self.watered = v; }
    }

    fn as_any(&self) -> &dyn Any { self }
}

// ── Drying rack ────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq)]
pub struct DryingRack {
    pub save_id:  Option<String>,
    /// Item currently hanging on the rack, if any.
    pub item:     Option<String>,
    /// Drying progress in [0, 1].
    pub progress: f32,
}

impl DryingRack {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Saveable for DryingRack {
    fn type_name(&self) -> &'static str { "DryingRack" }

    fn save_id(&self) -> Option<&str> {
        self.save_id.as_deref()
    }

    fn collect_state(&self) -> StateMap {
        let mut state = StateMap::new().with("progress", self.progress);
        if let Some(item) = &self.item {
            state.insert("item", item);
        }
        state
    }

    fn apply_state(&mut self, state: &StateMap) {
        // An absent item key means the rack was empty when saved.
        self.item = state.get("item");
        if let Some(p) = state.get::<f32>("progress") {
            self.progress = p.clamp(0.0, 1.0);
        }
    }

    fn as_any(&self) -> &dyn Any { self }
}

// ── Switch ─────────────────────────────────────────────────────

/// Anything with a single on/off state: lamps, gates, levers.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Switch {
    pub on: bool,
}

impl Saveable for Switch {
    fn type_name(&self) -> &'static str { "Switch" }

    fn collect_state(&self) -> StateMap {
        StateMap::new().with("on", self.on)
    }

    fn apply_state(&mut self, state: &StateMap) {
        if let Some(v) = state.get("on") { self.on = v; }
    }

    fn as_any(&self) -> &dyn Any { self }
}
