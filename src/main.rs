//! Rustscape Replication Demo
//!
//! Spawns a small world and runs the replication tick loop, logging the
//! frames built for each receiver until Ctrl+C or SIGTERM.

use anyhow::Result;
use rand::Rng;
use tokio::signal;
use tokio::sync::broadcast;
use tracing::{debug, info};
use tracing_subscriber::{fmt, EnvFilter};

use rustscape_replication::config::ReplicationConfig;
use rustscape_replication::game::{HighGuid, ObjectGuid, ReplicaWorld, WorldEntity, WorldSettings};
use rustscape_replication::update::fields::unit::NpcFlags;
use rustscape_replication::update::fields::AreaTriggerShape;
use rustscape_replication::update::ViewerFlags;
use rustscape_replication::VERSION;

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();

    // Initialize logging
    init_logging();

    info!("Rustscape replication demo v{}", VERSION);

    // Load configuration
    let config = ReplicationConfig::load().await?;
    info!(
        "Configuration loaded from: {}",
        config.config_path.display()
    );
    if config.debug {
        debug!(config = ?config, "Debug mode enabled");
    }

    let world = ReplicaWorld::new(WorldSettings::from_config(&config));
    populate(&world, config.map_id)?;
    info!("{}", world.info());

    // Create shutdown channel
    let (shutdown_tx, mut shutdown_rx) = broadcast::channel::<()>(1);
    tokio::spawn(wait_for_shutdown(shutdown_tx));

    world
        .run(&mut shutdown_rx, simulate, |receiver, packet| {
            debug!(receiver = %receiver, size = packet.len(), "Frame ready");
        })
        .await;

    info!("Shutdown complete. Goodbye!");
    Ok(())
}

/// Initialize the logging/tracing system
///
/// `RUSTSCAPE_LOG_FORMAT=json` switches to JSON lines.
fn init_logging() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,rustscape_replication=debug"));

    let builder = fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .with_level(true);

    match std::env::var("RUSTSCAPE_LOG_FORMAT").as_deref() {
        Ok("json") => builder.json().init(),
        _ => builder.init(),
    }
}

const HERO: ObjectGuid = ObjectGuid::new((HighGuid::Player as u64) << 58, 1);
const COMPANION: ObjectGuid = ObjectGuid::new((HighGuid::Player as u64) << 58, 2);

/// A player and a party member watching a creature, an item and an area trigger
fn populate(world: &ReplicaWorld, map_id: u16) -> Result<()> {
    let creature = ObjectGuid::create(HighGuid::Creature, map_id, 3100, 1);
    let sword = ObjectGuid::create(HighGuid::Item, map_id, 2589, 1);
    let trigger = ObjectGuid::create(HighGuid::AreaTrigger, map_id, 7800, 1);

    world.spawn_player(HERO, "Hero")?;
    world.spawn_player(COMPANION, "Companion")?;

    let mut boar = WorldEntity::new_creature(creature);
    if let Some(unit) = boar.unit_mut() {
        unit.modify(|u| &mut u.max_health).set(120);
        unit.modify(|u| &mut u.health).set(120);
        unit.modify(|u| &mut u.level).set(5);
        unit.modify(|u| &mut u.npc_flags)
            .set((NpcFlags::GOSSIP | NpcFlags::VENDOR).bits());
    }
    world.spawn(boar);

    world.spawn(WorldEntity::new_item(sword, HERO));

    let mut totem = WorldEntity::new_area_trigger(trigger, HERO);
    if let Some(area_trigger) = totem.area_trigger_mut() {
        area_trigger.set_shape(AreaTriggerShape::Sphere {
            radius: 8.0,
            radius_target: 8.0,
        });
        area_trigger.modify(|a| &mut a.duration).set(30_000);
    }
    world.spawn(totem);

    world.add_receiver(HERO);
    world.add_receiver(COMPANION);
    world.with_relations(|relations| {
        relations.relate(HERO, COMPANION, ViewerFlags::PARTY_MEMBER);
        relations.relate(COMPANION, HERO, ViewerFlags::PARTY_MEMBER);
        relations.hide_gossip(creature, COMPANION);
    });
    Ok(())
}

/// Random field churn so every tick has something to replicate
fn simulate(world: &ReplicaWorld, tick: u64) {
    let mut rng = rand::thread_rng();
    let creature = ObjectGuid::create(HighGuid::Creature, world.settings.map_id, 3100, 1);

    world.with_entity_mut(creature, |boar| {
        if let Some(unit) = boar.unit_mut() {
            let health = rng.gen_range(0..=*unit.max_health.get());
            unit.modify(|u| &mut u.health).set(health);
        }
    });

    if tick % 5 == 0 {
        world.with_entity_mut(HERO, |hero| {
            if let Some(player) = hero.player_mut() {
                let slot = rng.gen_range(0..player.quest_log.len());
                player
                    .modify_at(|p| &mut p.quest_log, slot)
                    .modify(|q| &mut q.quest_id)
                    .set(rng.gen_range(1..30_000));
            }
        });
    }
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn wait_for_shutdown(shutdown_tx: broadcast::Sender<()>) {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating shutdown...");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating shutdown...");
        }
    }

    // Signal all tasks to shut down
    let _ = shutdown_tx.send(());
}
