//! Restore sequencing: fixed stage order, one stage per tick, queueing,
//! suppression of saves mid-restore, and recoverable failures.

use std::rc::Rc;
use worldsave_core::{
    catalog::StaticCatalog,
    clock::ManualClock,
    config::SaveConfig,
    engine::SaveEngine,
    error::SaveError,
    event::{NoHooks, RecordingHooks},
    restore::RestoreStage,
    snapshot::{InventoryRecord, SaveRecord, SlotEntry, WorldItemRecord},
    store::SaveStore,
    types::{Transform, Vec3},
    world::{EntityKind, ItemStack, Scene, World},
};

// ── Test helpers ────────────────────────────────────────────────────────────

fn farm() -> Scene {
    let mut scene = Scene::new("Farm");
    scene.spawn("Player", None, Transform::default(), EntityKind::Player);
    scene
}

fn engine_with_settle(settle_ticks: u32) -> SaveEngine {
    let _ = env_logger::builder().is_test(true).try_init();
    SaveEngine::build_test_with(SaveConfig { settle_ticks, ..SaveConfig::default_test() })
        .expect("test engine")
}

const STAGES: [RestoreStage; 8] = [
    RestoreStage::ClearTransient,
    RestoreStage::RestorePlayer,
    RestoreStage::RestoreWorldItems,
    RestoreStage::RestoreSceneObjects,
    RestoreStage::ReconcilePlants,
    RestoreStage::RestoreInventory,
    RestoreStage::RestoreContainer,
    RestoreStage::RestoreMarket,
];

// ── Tests ────────────────────────────────────────────────────────────────────

#[test]
fn stages_run_in_fixed_order_one_per_tick() {
    let mut engine = engine_with_settle(0);
    let mut world = World::new(farm(), 8);
    let ts = engine.save(&world).unwrap().unwrap();
    engine.load(&ts, &world).unwrap();

    let mut hooks = NoHooks;
    for (i, expected_next) in STAGES.iter().enumerate().skip(1) {
        assert!(engine.tick(&mut world, &mut hooks).is_none(), "tick {i} finished early");
        assert_eq!(engine.restore_stage(), Some(*expected_next), "after tick {i}");
    }
    let report = engine.tick(&mut world, &mut hooks).expect("last tick reports");

    assert_eq!(report.stages_run, STAGES.to_vec());
    assert!(report.completed());
    assert!(!engine.is_restoring());
    assert_eq!(engine.restore_stage(), None);
}

#[test]
fn settle_ticks_delay_the_first_stage() {
    let mut engine = engine_with_settle(2);
    let mut world = World::new(farm(), 8);
    let ts = engine.save(&world).unwrap().unwrap();
    engine.load(&ts, &world).unwrap();

    for _ in 0..2 {
        assert!(engine.tick(&mut world, &mut NoHooks).is_none());
        assert_eq!(engine.restore_stage(), Some(RestoreStage::Settle));
    }
    engine.tick(&mut world, &mut NoHooks);
    assert_eq!(engine.restore_stage(), Some(RestoreStage::RestorePlayer));
}

/// A half-restored world must never be written back.
#[test]
fn saves_and_captures_are_suppressed_while_restoring() {
    let mut engine = engine_with_settle(0);
    let mut world = World::new(farm(), 8);
    let ts = engine.save(&world).unwrap().unwrap();

    engine.load(&ts, &world).unwrap();
    assert!(engine.is_restoring(), "queued counts as busy");
    assert_eq!(engine.save(&world).unwrap(), None);

    engine.tick(&mut world, &mut NoHooks);
    assert_eq!(engine.save(&world).unwrap(), None);
    assert!(!engine.capture(&world));
    assert_eq!(engine.list_saves().unwrap(), vec![ts]);

    engine.finish_restores(&mut world, &mut NoHooks);
    assert!(engine.save(&world).unwrap().is_some());
}

/// A second request waits for the first; restores never interleave.
#[test]
fn second_load_queues_behind_the_first() {
    let mut engine = engine_with_settle(0);
    let mut world = World::new(farm(), 8);
    world.scene.player_mut().unwrap().transform.position = Vec3::new(1.0, 0.0, 0.0);
    let first = engine.save(&world).unwrap().unwrap();
    world.scene.player_mut().unwrap().transform.position = Vec3::new(2.0, 0.0, 0.0);
    let second = engine.save(&world).unwrap().unwrap();

    engine.load(&first, &world).unwrap();
    engine.tick(&mut world, &mut NoHooks);
    engine.load(&second, &world).unwrap();
    assert_eq!(engine.restore_stage(), Some(RestoreStage::RestorePlayer));

    let reports = engine.finish_restores(&mut world, &mut NoHooks);

    let order: Vec<&str> = reports.iter().map(|r| r.timestamp.as_str()).collect();
    assert_eq!(order, vec![first.as_str(), second.as_str()]);
    assert!(reports.iter().all(|r| r.completed()));
    assert_eq!(world.scene.player().unwrap().transform.position, Vec3::new(2.0, 0.0, 0.0));
}

/// No player in the scene: recorded as an issue, later stages still run.
#[test]
fn missing_player_is_reported_and_restore_continues() {
    let mut engine = engine_with_settle(0);
    let mut world = World::new(farm(), 8);
    world.inventory.add("Seed_Basil", 4, 99);
    let ts = engine.save(&world).unwrap().unwrap();

    world.enter_scene(Scene::new("Farm"));
    world.inventory.clear();
    engine.load(&ts, &world).unwrap();
    let reports = engine.finish_restores(&mut world, &mut NoHooks);

    let report = &reports[0];
    assert!(report.completed());
    assert!(matches!(
        report.issues.as_slice(),
        [SaveError::MissingEntity { what: "player", .. }]
    ));
    assert_eq!(world.inventory.total_of("Seed_Basil"), 4);
}

/// Items the catalog no longer knows are skipped one by one; the rest of
/// the record still restores.
#[test]
fn unknown_items_are_skipped_not_fatal() {
    let mut engine = engine_with_settle(0);
    let mut world = World::new(farm(), 8);

    let mut record = SaveRecord::empty("Farm");
    record.save_timestamp = "2024-06-01 12:00:00".into();
    record.captured_scenes.insert("Farm".into());
    record.world_items = vec![
        WorldItemRecord {
            item:     "Mystery_Fruit".into(),
            position: Vec3::new(1.0, 0.0, 1.0),
            rotation: Vec3::ZERO,
            scale:    Vec3::ONE,
            quantity: 1,
            scene:    "Farm".into(),
        },
        WorldItemRecord {
            item:     "Stone".into(),
            position: Vec3::new(2.0, 0.0, 1.0),
            rotation: Vec3::ZERO,
            scale:    Vec3::ONE,
            quantity: 3,
            scene:    "Farm".into(),
        },
    ];
    record.inventory = InventoryRecord {
        entries: vec![
            SlotEntry { item: "Mystery_Fruit".into(), quantity: 2, slot: 0 },
            SlotEntry { item: "Tonic".into(), quantity: 1, slot: 1 },
        ],
    };
    engine.store().save(&record).unwrap();

    engine.load(&record.save_timestamp, &world).unwrap();
    let reports = engine.finish_restores(&mut world, &mut NoHooks);
    let report = &reports[0];

    assert!(report.completed());
    let missing: Vec<&SaveError> = report
        .issues
        .iter()
        .filter(|e| matches!(e, SaveError::MissingItemDefinition { item } if item == "Mystery_Fruit"))
        .collect();
    assert_eq!(missing.len(), 2, "one per domain: {:?}", report.issues);
    assert!(report.issues.iter().all(SaveError::is_recoverable));

    assert_eq!(report.world_items_spawned, 1);
    assert_eq!(world.inventory.get(0), None);
    assert_eq!(world.inventory.get(1), Some(&ItemStack::new("Tonic", 1)));
}

/// A scene switch mid-restore abandons the rest of the sequence.
#[test]
fn scene_switch_abandons_the_restore() {
    let mut engine = engine_with_settle(0);
    let mut world = World::new(farm(), 8);
    world.inventory.add("Stone", 1, 99);
    let ts = engine.save(&world).unwrap().unwrap();
    world.inventory.clear();

    engine.load(&ts, &world).unwrap();
    engine.tick(&mut world, &mut NoHooks);
    world.enter_scene(Scene::new("Village"));

    let report = engine.tick(&mut world, &mut NoHooks).expect("abandon reports");
    assert!(report.abandoned);
    assert!(!report.completed());
    assert_eq!(report.stages_run, vec![RestoreStage::ClearTransient]);
    assert!(!engine.is_restoring());
    assert!(world.inventory.is_empty(), "inventory stage never ran");
}

#[test]
fn damaged_save_fails_to_load_without_touching_the_world() {
    let mut engine = engine_with_settle(0);
    let world = World::new(farm(), 8);
    let ts = engine.save(&world).unwrap().unwrap();
    engine.store().put_value(&ts, "{ not json").unwrap();

    let err = engine.load(&ts, &world).unwrap_err();
    assert!(matches!(err, SaveError::CorruptData { .. }));
    assert!(!engine.is_restoring());

    let err = engine.load("1999-01-01 00:00:00", &world).unwrap_err();
    assert!(matches!(err, SaveError::NotFound { .. }));
}

/// The engine accepts any catalog and clock implementation.
#[test]
fn engine_runs_on_injected_collaborators() {
    let config = SaveConfig::default_test();
    let store = SaveStore::in_memory(config.max_slots).unwrap();
    store.migrate().unwrap();
    let catalog = Rc::new(StaticCatalog::default_test());
    let clock = ManualClock::new(
        chrono::NaiveDate::from_ymd_opt(2030, 5, 17)
            .and_then(|d| d.and_hms_opt(8, 30, 0))
            .unwrap(),
        chrono::Duration::minutes(5),
    );
    let mut engine = SaveEngine::new(config, store, catalog, Box::new(clock));
    let mut world = World::new(farm(), 8);

    let first = engine.save(&world).unwrap().unwrap();
    let second = engine.save(&world).unwrap().unwrap();
    assert_eq!(first, "2030-05-17 08:30:00");
    assert_eq!(second, "2030-05-17 08:35:00");

    engine.load(&second, &world).unwrap();
    let mut hooks = RecordingHooks::default();
    assert_eq!(engine.finish_restores(&mut world, &mut hooks).len(), 1);
}
