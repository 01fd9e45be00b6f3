//! Grid physics testbed
//!
//! Runs a headless scenario against the grid engine: a hull of voxels falls
//! onto a ground plane, gains a lit deck and loses a corner on the way down, and
//! its published transforms are logged as it settles.

mod cli;
mod config;

use anyhow::{Context, Result};
use clap::Parser;
use glam::{IVec3, Quat, Vec3};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;
use voxship_physics::rapier3d::prelude::{ColliderBuilder, Vector};
use voxel::{MemoryStorage, VoxelPayload, VoxelTypeId};
use voxship_physics::{GridEngine, GridId, SpawnPose};

const HULL: VoxelTypeId = VoxelTypeId(1);
const DECK: VoxelTypeId = VoxelTypeId(2);
const LANTERN: VoxelTypeId = VoxelTypeId(4);

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let args = cli::Args::parse();
    let physics = config::load_physics(args.config.as_deref())?;
    let catalog = config::load_catalog(args.catalog.as_deref())?;
    let hull = catalog.get(HULL).context("catalog has no hull voxel (id 1)")?;
    let deck = catalog.get(DECK).context("catalog has no deck voxel (id 2)")?;
    let lantern = catalog.get(LANTERN).context("catalog has no lantern voxel (id 4)")?;

    tracing::info!(
        ticks = args.ticks,
        size = args.size,
        types = catalog.len(),
        "starting testbed"
    );

    let storage = Arc::new(MemoryStorage::new());
    let engine = GridEngine::new(physics, storage.clone());
    engine.add_static_collider(
        ColliderBuilder::cuboid(200.0, 0.5, 200.0)
            .translation(Vector::new(0.0, -0.5, 0.0))
            .build(),
    );

    let size = args.size.max(1);
    let cells = (0..size).flat_map(|x| {
        (0..size).flat_map(move |y| (0..size).map(move |z| IVec3::new(x, y, z)))
    });
    let pose = SpawnPose::new(Vec3::new(0.0, args.height, 0.0), Quat::from_rotation_y(0.3));
    let id = engine.spawn_with_voxels(pose, cells.map(|p| (p, engine.voxel(hull.clone()))))?;

    for tick in 1..=args.ticks {
        if tick == args.ticks / 4 {
            let mut planks = Vec::new();
            for x in 0..size {
                for z in 0..size {
                    planks.push((IVec3::new(x, size, z), engine.voxel(deck.clone())));
                }
            }
            planks.push((
                IVec3::new(0, size + 1, 0),
                engine.voxel(lantern.clone()).with_payload(VoxelPayload::Signal { power: 15 }),
            ));
            let added = engine.import_voxels(id, planks)?;
            tracing::info!(added, "laid deck");
        }
        if tick == args.ticks / 2 {
            let corner = IVec3::splat(size - 1);
            if let Ok(removed) = engine.remove_voxel(id, corner) {
                tracing::info!(kind = %removed.type_id(), ?corner, "removed corner");
            }
        }

        let report = engine.tick(tick);
        if report.failed_rebuilds > 0 {
            tracing::warn!(tick, failed = report.failed_rebuilds, "rebuild failed");
        }
        if args.log_every > 0 && tick % args.log_every == 0 {
            log_grid(&engine, id, tick)?;
        }
    }

    log_grid(&engine, id, args.ticks)?;
    tracing::info!(
        stored = storage.len(),
        bodies = engine.body_count(),
        "testbed finished"
    );
    for grid in engine.grid_ids() {
        engine.destroy(grid)?;
    }
    Ok(())
}

fn log_grid(engine: &GridEngine, id: GridId, tick: u64) -> Result<()> {
    let transform = engine.current_transform(id)?;
    let velocity = engine.linear_velocity(id)?;
    tracing::info!(
        tick,
        grid = %id,
        position = ?transform.position,
        speed = velocity.length(),
        mass = engine.mass(id)?,
        sleeping = engine.is_sleeping(id)?,
        "grid state"
    );
    Ok(())
}
