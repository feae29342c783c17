//! Durable identity keys for entities that are recreated on every load.
//!
//! Resolution order:
//!   1. An explicit, non-empty `save_id` on any capability, verbatim.
//!   2. The root-to-leaf name path in the scene hierarchy.
//!
//! Path keys are best-effort: renaming or reparenting an object between
//! sessions changes its key. The fallback matcher's radius search is what
//! rescues those objects on restore.

use crate::{
    saveable::Saveable,
    types::{EntityId, Vec3},
    world::{Entity, Scene},
};
use uuid::Uuid;

pub const PATH_SEPARATOR: &str = "/";

/// First explicit id declared by any capability.
pub fn explicit_id(capabilities: &[Box<dyn Saveable>]) -> Option<&str> {
    capabilities
        .iter()
        .filter_map(|c| c.save_id())
        .find(|id| !id.trim().is_empty())
}

pub fn resolve_entity(scene: &Scene, entity: &Entity) -> String {
    match explicit_id(&entity.capabilities) {
        Some(id) => id.to_string(),
        None => scene.path(entity.id).join(PATH_SEPARATOR),
    }
}

/// Key for a live entity, or `None` if the handle is stale.
pub fn resolve(scene: &Scene, id: EntityId) -> Option<String> {
    scene.get(id).map(|e| resolve_entity(scene, e))
}

/// Mint a fresh explicit id for an object that should keep its identity
/// across hierarchy changes.
pub fn generate_save_id() -> String {
    Uuid::new_v4().to_string()
}

/// Identity of a plant: item type plus position rounded to `precision`
/// decimals, which absorbs float jitter between sessions.
pub fn plant_identity(item: &str, position: Vec3, precision: usize) -> String {
    format!(
        "{item}_{}_{}_{}",
        fmt_coord(position.x, precision),
        fmt_coord(position.y, precision),
        fmt_coord(position.z, precision),
    )
}

fn fmt_coord(v: f32, precision: usize) -> String {
    let s = format!("{v:.precision$}");
    // -0.001 rounds to "-0.00"; fold it into "0.00" so the sign of a
    // vanishing coordinate never splits one plant into two identities.
    match s.strip_prefix('-') {
        Some(rest) if rest.chars().all(|c| c == '0' || c == '.') => rest.to_string(),
        _ => s,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        saveable::{FarmPlot, Switch},
        types::Transform,
        world::EntityKind,
    };

    #[test]
    fn plant_identity_matches_documented_format() {
        let id = plant_identity("Tomato", Vec3::new(10.0, 0.0, 5.0), 2);
        assert_eq!(id, "Tomato_10.00_0.00_5.00");
    }

    #[test]
    fn jitter_and_negative_zero_collapse() {
        let a = plant_identity("Basil", Vec3::new(1.0, -0.0001, 2.0), 2);
        let b = plant_identity("Basil", Vec3::new(1.0004, 0.0, 1.9999), 2);
        assert_eq!(a, b);
    }

    #[test]
    fn explicit_id_beats_path() {
        let mut scene = Scene::new("Farm");
        let root = scene.spawn("Field", None, Transform::default(), EntityKind::Prop);
        let plot = scene.spawn_with(
            "Plot",
            Some(root),
            Transform::default(),
            EntityKind::Prop,
            vec![Box::new(Switch::default()), Box::new(FarmPlot::with_id("plot-7"))],
        );
        let lamp = scene.spawn_with(
            "Lamp",
            Some(root),
            Transform::default(),
            EntityKind::Prop,
            vec![Box::new(Switch::default())],
        );

        assert_eq!(resolve(&scene, plot).as_deref(), Some("plot-7"));
        assert_eq!(resolve(&scene, lamp).as_deref(), Some("Field/Lamp"));
    }

    #[test]
    fn blank_explicit_id_is_ignored() {
        let mut scene = Scene::new("Farm");
        let plot = scene.spawn_with(
            "Plot",
            None,
            Transform::default(),
            EntityKind::Prop,
            vec![Box::new(FarmPlot::with_id("   "))],
        );
        assert_eq!(resolve(&scene, plot).as_deref(), Some("Plot"));
    }

    #[test]
    fn generated_ids_are_unique() {
        assert_ne!(generate_save_id(), generate_save_id());
    }
}
