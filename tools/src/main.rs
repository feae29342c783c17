//! save-inspector: headless tooling for world save stores.
//!
//! Usage:
//!   save-inspector --db saves.db --list
//!   save-inspector --db saves.db --show "2024-01-01 00:00:00" [--json]
//!   save-inspector --db saves.db --delete "2024-01-01 00:00:00"
//!   save-inspector --demo --cycles 3 [--db demo.db] [--data-dir ./data]
//!   save-inspector --db saves.db --ipc-mode

use anyhow::Result;
use chrono::{Duration, Local};
use std::collections::BTreeMap;
use std::env;
use std::io::{self, BufRead, Write};
use std::rc::Rc;
use worldsave_core::{
    catalog::{ItemCatalog, ItemDefinition, StaticCatalog},
    clock::ManualClock,
    config::SaveConfig,
    engine::SaveEngine,
    event::{RecordingHooks, SceneEvent},
    rng::MarketRng,
    saveable::{DryingRack, FarmPlot, Saveable, Switch},
    snapshot::SaveRecord,
    store::SaveStore,
    types::{Transform, Vec3},
    world::{Container, EntityKind, Market, Plant, Scene, World, WorldItem},
};

#[derive(serde::Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum IpcCommand {
    List,
    Show { timestamp: String },
    Delete { timestamp: String },
    Quit,
}

/// Per-scene counts for one save, as printed by `--show` and `show`.
#[derive(serde::Serialize)]
struct SaveSummary {
    timestamp:       String,
    version:         u32,
    scene:           String,
    player_scene:    Option<String>,
    inventory_slots: usize,
    container_slots: Option<usize>,
    market_offers:   Option<usize>,
    scenes:          BTreeMap<String, SceneSummary>,
}

#[derive(serde::Serialize, Default)]
struct SceneSummary {
    world_items:      usize,
    plants_growing:   usize,
    plants_collected: usize,
    scene_objects:    usize,
}

fn main() -> Result<()> {
    env_logger::init();

    let args: Vec<String> = env::args().collect();
    let db = flag_value(&args, "--db").unwrap_or(":memory:");
    let data_dir = flag_value(&args, "--data-dir").unwrap_or("./data");
    let cycles = parse_arg(&args, "--cycles", 3u32);
    let as_json = args.iter().any(|a| a == "--json");
    let ipc_mode = args.iter().any(|a| a == "--ipc-mode");

    let config = load_config(data_dir);
    let store = if db == ":memory:" {
        SaveStore::in_memory(config.max_slots)?
    } else {
        SaveStore::open(db, config.max_slots)?
    };
    store.migrate()?;

    if ipc_mode {
        return run_ipc_loop(&store);
    }

    if args.iter().any(|a| a == "--demo") {
        println!("save-inspector: demo");
        println!("  db:        {db}");
        println!("  data_dir:  {data_dir}");
        println!("  cycles:    {cycles}");
        println!();
        return run_demo(config, store, data_dir, cycles);
    }

    if let Some(ts) = flag_value(&args, "--show") {
        let record = store.load(ts)?;
        if as_json {
            println!("{}", serde_json::to_string_pretty(&record)?);
        } else {
            print_summary(&summarize(&record));
        }
        return Ok(());
    }

    if let Some(ts) = flag_value(&args, "--delete") {
        if store.delete(ts)? {
            println!("deleted '{ts}'");
        } else {
            println!("no save '{ts}'");
        }
        return Ok(());
    }

    // --list is the default action.
    let saves = store.list_timestamps()?;
    println!("=== SAVES ({} of {} slots) ===", saves.len(), store.max_slots());
    for ts in saves.iter().rev() {
        match store.load(ts) {
            Ok(record) => println!("  {ts}  scene: {}", record.scene_identifier),
            Err(e) => println!("  {ts}  UNREADABLE: {e}"),
        }
    }
    Ok(())
}

fn load_config(data_dir: &str) -> SaveConfig {
    SaveConfig::load(data_dir).unwrap_or_else(|e| {
        log::warn!("{e}; using built-in defaults");
        SaveConfig::default()
    })
}

fn run_ipc_loop(store: &SaveStore) -> Result<()> {
    let stdin = io::stdin();
    let mut stdout = io::stdout();
    let mut handle = stdin.lock();
    let mut buffer = String::new();

    loop {
        buffer.clear();
        let bytes_read = handle.read_line(&mut buffer)?;
        if bytes_read == 0 {
            break; // EOF
        }

        let cmd: IpcCommand = match serde_json::from_str(&buffer) {
            Ok(c) => c,
            Err(e) => {
                let err_json = serde_json::json!({ "error": e.to_string() });
                writeln!(stdout, "{}", err_json)?;
                stdout.flush()?;
                continue;
            }
        };

        let reply = match cmd {
            IpcCommand::Quit => break,
            IpcCommand::List => serde_json::json!({ "saves": store.list_timestamps()? }),
            IpcCommand::Show { timestamp } => match store.load(&timestamp) {
                Ok(record) => serde_json::to_value(summarize(&record))?,
                Err(e) => serde_json::json!({ "error": e.to_string() }),
            },
            IpcCommand::Delete { timestamp } => {
                serde_json::json!({ "deleted": store.delete(&timestamp)? })
            }
        };
        writeln!(stdout, "{}", reply)?;
        stdout.flush()?;
    }
    Ok(())
}

fn summarize(record: &SaveRecord) -> SaveSummary {
    let mut scenes: BTreeMap<String, SceneSummary> = BTreeMap::new();
    for item in &record.world_items {
        scenes.entry(item.scene.clone()).or_default().world_items += 1;
    }
    for plant in &record.plants {
        let entry = scenes.entry(plant.scene.clone()).or_default();
        if plant.is_collected {
            entry.plants_collected += 1;
        } else {
            entry.plants_growing += 1;
        }
    }
    for object in &record.scene_objects {
        scenes.entry(object.scene.clone()).or_default().scene_objects += 1;
    }

    SaveSummary {
        timestamp:       record.save_timestamp.clone(),
        version:         record.version,
        scene:           record.scene_identifier.clone(),
        player_scene:    record.player_state.as_ref().map(|p| p.scene.clone()),
        inventory_slots: record.inventory.entries.len(),
        container_slots: record.container.as_ref().map(|c| c.entries.len()),
        market_offers:   record.market.as_ref().map(|m| m.offers.len()),
        scenes,
    }
}

fn print_summary(summary: &SaveSummary) {
    println!("=== SAVE {} ===", summary.timestamp);
    println!("  version:     {}", summary.version);
    println!("  scene:       {}", summary.scene);
    println!("  player in:   {}", summary.player_scene.as_deref().unwrap_or("(none)"));
    println!("  inventory:   {} stacks", summary.inventory_slots);
    if let Some(n) = summary.container_slots {
        println!("  container:   {n} stacks");
    }
    if let Some(n) = summary.market_offers {
        println!("  market:      {n} offers");
    }
    for (scene, s) in &summary.scenes {
        println!(
            "  [{scene}] items: {} | plants: {} growing, {} collected | objects: {}",
            s.world_items, s.plants_growing, s.plants_collected, s.scene_objects
        );
    }
}

// ── Demo ───────────────────────────────────────────────────────

fn demo_farm() -> Scene {
    let mut scene = Scene::new("Farm");
    scene.spawn("Player", None, Transform::default(), EntityKind::Player);
    let field = scene.spawn("Field", None, Transform::default(), EntityKind::Prop);
    for (i, x) in [2.0f32, 6.0, 10.0].into_iter().enumerate() {
        let plot: Vec<Box<dyn Saveable>> = vec![Box::new(FarmPlot::with_id(format!("plot-{i}")))];
        scene.spawn_with(format!("Plot{i}"), Some(field), Transform::at(Vec3::new(x, 0.0, 5.0)), EntityKind::Prop, plot);
    }
    let shed: Vec<Box<dyn Saveable>> = vec![Box::new(Switch::default()), Box::new(DryingRack::new())];
    scene.spawn_with("Shed", None, Transform::at(Vec3::new(-3.0, 0.0, 8.0)), EntityKind::Prop, shed);
    scene.container = Some(Container::new("BrewingBarrel", 6));
    scene
}

fn demo_village(day: u64) -> Scene {
    let mut scene = Scene::new("Village");
    scene.spawn("Player", None, Transform::at(Vec3::new(40.0, 0.0, 40.0)), EntityKind::Player);
    let mut market = Market::new(200);
    market.restock(&["Seed_Tomato", "Seed_Basil", "Tonic", "Watering_Can"], 3, &mut MarketRng::for_day(7, day));
    scene.market = Some(market);
    scene
}

fn travel(engine: &mut SaveEngine, world: &mut World, next: Scene, hooks: &mut RecordingHooks) -> Result<()> {
    let leaving = world.scene.id.clone();
    let arriving = next.id.clone();
    engine.handle_event(&SceneEvent::AboutToUnload { scene: leaving }, world)?;
    world.enter_scene(next);
    engine.handle_event(&SceneEvent::FinishedLoading { scene: arriving }, world)?;
    for report in engine.finish_restores(world, hooks) {
        log::info!(
            "restored '{}' into '{}': {} stages, {} issues",
            report.timestamp,
            report.scene,
            report.stages_run.len(),
            report.issues.len()
        );
    }
    Ok(())
}

fn run_demo(config: SaveConfig, store: SaveStore, data_dir: &str, cycles: u32) -> Result<()> {
    let catalog = StaticCatalog::load(data_dir).unwrap_or_else(|e| {
        log::warn!("{e}; using built-in test catalog");
        StaticCatalog::default_test()
    });
    let seed_stack = catalog.lookup("Seed_Tomato").map_or(1, ItemDefinition::stack_limit);
    let clock = ManualClock::new(Local::now().naive_local(), Duration::seconds(1));
    let slots = config.inventory_slots;
    let mut engine = SaveEngine::new(config, store, Rc::new(catalog), Box::new(clock));
    let mut hooks = RecordingHooks::default();

    let mut world = World::new(demo_farm(), slots);
    for x in [2.0f32, 6.0, 10.0] {
        world.scene.spawn(
            "TomatoPlant",
            None,
            Transform::at(Vec3::new(x, 0.0, 5.0)),
            EntityKind::Plant(Plant { item: "Tomato".into(), harvestable: true }),
        );
    }
    world.scene.spawn(
        "StonePickup",
        None,
        Transform::at(Vec3::new(1.0, 0.0, 1.0)),
        EntityKind::WorldItem(WorldItem { item: "Stone".into(), quantity: 2 }),
    );
    world.inventory.add("Seed_Tomato", 3, seed_stack);
    engine.save(&world)?;

    let first_plant = world.scene.plants().map(|(e, _)| e.id).next();
    if let Some(id) = first_plant {
        let harvested = engine.harvest_plant(&mut world, id)?;
        println!("harvested {}", harvested.plant_id);
    }

    for day in 1..=u64::from(cycles) {
        travel(&mut engine, &mut world, demo_village(day), &mut hooks)?;
        let farm = demo_farm();
        travel(&mut engine, &mut world, farm, &mut hooks)?;
        println!(
            "day {day}: {} plants growing in Farm, {} loose items",
            world.scene.plants().count(),
            world.scene.loose_world_items().count()
        );
    }

    let last = engine.save(&world)?;
    println!();
    println!("=== DEMO SUMMARY ===");
    println!("  saves kept:  {:?}", engine.list_saves()?);
    println!("  ui refreshes: {}", hooks.notified.len());
    if let Some(ts) = last {
        print_summary(&summarize(&engine.store().load(&ts)?));
    }
    Ok(())
}

fn flag_value<'a>(args: &'a [String], flag: &str) -> Option<&'a str> {
    args.windows(2)
        .find(|w| w[0] == flag)
        .map(|w| w[1].as_str())
}

fn parse_arg<T: std::str::FromStr + Copy>(args: &[String], flag: &str, default: T) -> T {
    args.windows(2)
        .find(|w| w[0] == flag)
        .and_then(|w| w[1].parse().ok())
        .unwrap_or(default)
}
