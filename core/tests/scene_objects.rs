//! Generic scene-object state: identity keys, the position fallback, and
//! per-capability state routing.

use worldsave_core::{
    engine::SaveEngine,
    event::NoHooks,
    restore::RestoreReport,
    saveable::{DryingRack, FarmPlot, Saveable, Switch},
    types::{EntityId, Transform, Vec3},
    world::{EntityKind, Scene, World},
};

// ── Test helpers ────────────────────────────────────────────────────────────

fn base_scene() -> Scene {
    let mut scene = Scene::new("Farm");
    scene.spawn("Player", None, Transform::default(), EntityKind::Player);
    scene
}

fn spawn_prop(
    scene:  &mut Scene,
    name:   &str,
    parent: Option<EntityId>,
    at:     Vec3,
    caps:   Vec<Box<dyn Saveable>>,
) -> EntityId {
    scene.spawn_with(name, parent, Transform::at(at), EntityKind::Prop, caps)
}

fn find(world: &World, name: &str) -> EntityId {
    world
        .scene
        .entities()
        .find(|e| e.name == name)
        .map(|e| e.id)
        .unwrap_or_else(|| panic!("no entity named {name}"))
}

fn cap<T: 'static>(world: &World, name: &str) -> T
where
    T: Clone,
{
    world
        .scene
        .get(find(world, name))
        .and_then(|e| e.capability::<T>())
        .cloned()
        .unwrap_or_else(|| panic!("{name} lacks the capability"))
}

/// Save `before`, swap in `after` as the freshly loaded scene, restore.
fn save_and_restore(before: Scene, after: Scene) -> (World, RestoreReport) {
    let mut engine = SaveEngine::build_test().expect("test engine");
    let mut world = World::new(before, 8);
    let ts = engine.save(&world).unwrap().unwrap();

    world.enter_scene(after);
    engine.load(&ts, &world).unwrap();
    let mut reports = engine.finish_restores(&mut world, &mut NoHooks);
    assert_eq!(reports.len(), 1);
    (world, reports.remove(0))
}

fn tilled_plot(id: &str) -> Box<dyn Saveable> {
    Box::new(FarmPlot { prepared: true, occupied: true, watered: false, ..FarmPlot::with_id(id) })
}

fn lamp(on: bool) -> Box<dyn Saveable> {
    Box::new(Switch { on })
}

// ── Tests ────────────────────────────────────────────────────────────────────

/// An explicit save id survives a reshuffled hierarchy.
#[test]
fn explicit_id_matches_across_hierarchy_changes() {
    let mut before = base_scene();
    let field = before.spawn("Field", None, Transform::default(), EntityKind::Prop);
    spawn_prop(&mut before, "Plot", Some(field), Vec3::new(10.0, 0.0, 5.0), vec![tilled_plot("plot-1")]);

    let mut after = base_scene();
    let farmland = after.spawn("Farmland", None, Transform::default(), EntityKind::Prop);
    let rows = after.spawn("Rows", Some(farmland), Transform::default(), EntityKind::Prop);
    spawn_prop(
        &mut after,
        "Plot",
        Some(rows),
        Vec3::new(30.0, 0.0, 30.0),
        vec![Box::new(FarmPlot::with_id("plot-1"))],
    );

    let (world, report) = save_and_restore(before, after);

    assert_eq!(report.objects_exact, 1);
    assert_eq!(report.objects_fallback, 0);
    let plot: FarmPlot = cap(&world, "Plot");
    assert!(plot.prepared && plot.occupied && !plot.watered);
    let transform = world.scene.get(find(&world, "Plot")).unwrap().transform;
    assert_eq!(transform.position, Vec3::new(10.0, 0.0, 5.0), "saved transform applied");
}

#[test]
fn hierarchy_path_matches_when_there_is_no_explicit_id() {
    let mut before = base_scene();
    let yard = before.spawn("Yard", None, Transform::default(), EntityKind::Prop);
    spawn_prop(&mut before, "Lamp", Some(yard), Vec3::new(3.0, 2.0, 0.0), vec![lamp(true)]);

    let mut after = base_scene();
    let yard = after.spawn("Yard", None, Transform::default(), EntityKind::Prop);
    spawn_prop(&mut after, "Lamp", Some(yard), Vec3::new(3.0, 2.0, 0.0), vec![lamp(false)]);

    let (world, report) = save_and_restore(before, after);

    assert_eq!(report.objects_exact, 1);
    assert!(cap::<Switch>(&world, "Lamp").on);
}

/// A renamed object within the fallback radius inherits its saved state.
#[test]
fn renamed_object_within_radius_is_matched_by_position() {
    let mut before = base_scene();
    spawn_prop(&mut before, "Lamp", None, Vec3::new(3.0, 2.0, 0.0), vec![lamp(true)]);

    let mut after = base_scene();
    spawn_prop(&mut after, "Lantern", None, Vec3::new(4.5, 2.0, 0.0), vec![lamp(false)]);

    let (world, report) = save_and_restore(before, after);

    assert_eq!(report.objects_exact, 0);
    assert_eq!(report.objects_fallback, 1);
    assert!(cap::<Switch>(&world, "Lantern").on);
}

/// Beyond the radius nothing matches and the object keeps its defaults.
#[test]
fn object_beyond_radius_keeps_defaults() {
    let mut before = base_scene();
    spawn_prop(&mut before, "Lamp", None, Vec3::new(3.0, 2.0, 0.0), vec![lamp(true)]);

    let mut after = base_scene();
    spawn_prop(&mut after, "Lantern", None, Vec3::new(9.0, 2.0, 0.0), vec![lamp(false)]);

    let (world, report) = save_and_restore(before, after);

    assert_eq!(report.objects_unmatched, 1);
    assert!(!cap::<Switch>(&world, "Lantern").on);
    let transform = world.scene.get(find(&world, "Lantern")).unwrap().transform;
    assert_eq!(transform.position, Vec3::new(9.0, 2.0, 0.0), "unmatched objects are not moved");
}

/// A record already claimed by an exact key is not up for grabs in the
/// fallback pass, even when it is the nearest one.
#[test]
fn fallback_never_steals_an_exact_match() {
    let mut before = base_scene();
    spawn_prop(&mut before, "LampA", None, Vec3::new(0.0, 0.0, 0.0), vec![lamp(true)]);
    spawn_prop(&mut before, "LampB", None, Vec3::new(4.0, 0.0, 0.0), vec![lamp(false)]);

    let mut after = base_scene();
    // Spawned before LampA so it is considered first.
    spawn_prop(&mut after, "LampC", None, Vec3::new(0.5, 0.0, 0.0), vec![lamp(false)]);
    spawn_prop(&mut after, "LampA", None, Vec3::new(0.0, 0.0, 0.0), vec![lamp(false)]);

    let (world, report) = save_and_restore(before, after);

    assert_eq!(report.objects_exact, 1);
    assert_eq!(report.objects_fallback, 1);
    assert!(cap::<Switch>(&world, "LampA").on);
    assert!(!cap::<Switch>(&world, "LampC").on, "LampC falls back to LampB's record");
    let c = world.scene.get(find(&world, "LampC")).unwrap().transform;
    assert_eq!(c.position, Vec3::new(4.0, 0.0, 0.0));
}

/// Each capability on one entity gets only its own keys.
#[test]
fn multiple_capabilities_on_one_entity_restore_independently() {
    let caps = |on: bool, item: Option<&str>, progress: f32| -> Vec<Box<dyn Saveable>> {
        vec![
            Box::new(Switch { on }),
            Box::new(DryingRack { save_id: None, item: item.map(str::to_string), progress }),
        ]
    };
    let mut before = base_scene();
    spawn_prop(&mut before, "Shed", None, Vec3::new(6.0, 0.0, 6.0), caps(true, Some("Lavender"), 0.75));
    let mut after = base_scene();
    spawn_prop(&mut after, "Shed", None, Vec3::new(6.0, 0.0, 6.0), caps(false, None, 0.0));

    let (world, report) = save_and_restore(before, after);

    assert_eq!(report.objects_exact, 1);
    assert!(cap::<Switch>(&world, "Shed").on);
    let rack: DryingRack = cap(&world, "Shed");
    assert_eq!(rack.item.as_deref(), Some("Lavender"));
    assert!((rack.progress - 0.75).abs() < f32::EPSILON);
}

#[test]
fn state_keys_are_qualified_by_capability_type() {
    let mut engine = SaveEngine::build_test().unwrap();
    let mut scene = base_scene();
    spawn_prop(&mut scene, "Plot", None, Vec3::ZERO, vec![tilled_plot("plot-9")]);
    let world = World::new(scene, 8);

    let ts = engine.save(&world).unwrap().unwrap();
    let record = engine.store().load(&ts).unwrap();

    assert_eq!(record.scene_objects.len(), 1);
    let object = &record.scene_objects[0];
    assert_eq!(object.key, "plot-9");
    let keys: Vec<&str> = object.state.iter().map(|e| e.key.as_str()).collect();
    assert_eq!(keys, vec!["FarmPlot.occupied", "FarmPlot.prepared", "FarmPlot.watered"]);
}

/// Objects without saved state are left alone and do not count as issues.
#[test]
fn objects_added_after_the_save_keep_their_defaults() {
    let before = base_scene();
    let mut after = base_scene();
    spawn_prop(&mut after, "NewLamp", None, Vec3::ZERO, vec![lamp(true)]);

    let (world, report) = save_and_restore(before, after);

    assert_eq!(report.objects_unmatched, 1);
    assert!(report.issues.is_empty());
    assert!(cap::<Switch>(&world, "NewLamp").on);
}
