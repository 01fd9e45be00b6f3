//! Invariants checked over seeded random edit sequences

use glam::{DVec3, IVec3, Quat, Vec3};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::HashMap;
use std::sync::Arc;
use voxel::{MemoryStorage, StorageFrame, VoxelType};
use voxship_physics::{GridEngine, GridError, GridId, PhysicsConfig, SpawnPose};

fn random_position(rng: &mut StdRng) -> IVec3 {
    IVec3::new(
        rng.random_range(-4..=4),
        rng.random_range(-4..=4),
        rng.random_range(-4..=4),
    )
}

/// Mass and centroid recomputed from scratch in f64
fn expected(voxels: &HashMap<IVec3, f32>) -> (f32, Vec3) {
    let mass: f64 = voxels.values().map(|m| f64::from(*m)).sum();
    let weighted = voxels.iter().fold(DVec3::ZERO, |acc, (p, m)| {
        acc + (p.as_dvec3() + DVec3::splat(0.5)) * f64::from(*m)
    });
    (mass as f32, (weighted / mass).as_vec3())
}

#[test]
fn test_mass_and_centroid_track_random_edits() {
    let kinds = [
        Arc::new(VoxelType::solid(1, "stone")),
        Arc::new(VoxelType::solid(2, "iron")),
    ];
    let masses = [1.0, 2.5];

    for seed in 0..8 {
        let mut rng = StdRng::seed_from_u64(seed);
        let engine = GridEngine::new(PhysicsConfig::weightless(), Arc::new(MemoryStorage::new()));
        let id = engine
            .spawn(SpawnPose::at(Vec3::ZERO), engine.voxel(kinds[0].clone()))
            .unwrap();
        let mut model = HashMap::from([(IVec3::ZERO, engine.config().voxel_mass)]);

        for step in 0..60u64 {
            let position = random_position(&mut rng);
            if rng.random_bool(0.6) {
                let which = rng.random_range(0..kinds.len());
                let mut voxel = engine.voxel(kinds[which].clone());
                voxel.mass = masses[which];
                match engine.add_voxel(id, position, voxel) {
                    Ok(()) => {
                        model.insert(position, masses[which]);
                    }
                    Err(err) => assert_eq!(err, GridError::Occupied { position }),
                }
            } else {
                match engine.remove_voxel(id, position) {
                    Ok(_) => {
                        model.remove(&position);
                    }
                    Err(GridError::Vacant { .. }) => assert!(!model.contains_key(&position)),
                    Err(GridError::LastVoxel) => assert_eq!(model.len(), 1),
                    Err(err) => panic!("unexpected error {err}"),
                }
            }

            engine.tick(step + 1);
            let (mass, centroid) = expected(&model);
            let actual_mass = engine.mass(id).unwrap();
            let actual_centroid = engine.centroid(id).unwrap();
            assert!((actual_mass - mass).abs() < 1e-6 * mass.max(1.0), "seed {seed} step {step}");
            assert!(
                actual_centroid.abs_diff_eq(centroid, 1e-6),
                "seed {seed} step {step}: {actual_centroid} != {centroid}"
            );
            assert_eq!(engine.voxel_map(id).unwrap().len(), model.len());
        }
    }
}

#[test]
fn test_world_local_round_trip_inside_bounds() {
    let mut rng = StdRng::seed_from_u64(42);
    let engine = GridEngine::new(PhysicsConfig::weightless(), Arc::new(MemoryStorage::new()));
    let kind = Arc::new(VoxelType::solid(1, "stone"));

    let voxels: Vec<_> = (0..40)
        .map(|_| random_position(&mut rng))
        .collect::<std::collections::HashSet<_>>()
        .into_iter()
        .map(|p| (p, engine.voxel(kind.clone())))
        .collect();
    let rotation = Quat::from_euler(glam::EulerRot::XYZ, 0.3, 1.1, -0.7);
    let id = engine
        .spawn_with_voxels(SpawnPose::new(Vec3::new(120.0, -40.0, 33.0), rotation), voxels)
        .unwrap();

    let frame = engine.frame(id).unwrap();
    let bounds = frame.world_aabb();
    for _ in 0..500 {
        let t = Vec3::new(rng.random(), rng.random(), rng.random());
        let p = bounds.min + (bounds.max - bounds.min) * t;
        let back = frame.local_to_world(frame.world_to_local(p));
        assert!(back.abs_diff_eq(p, 1e-3), "{p} came back as {back}");
    }
}

#[test]
fn test_storage_round_trip_for_every_voxel() {
    let storage = Arc::new(MemoryStorage::new());
    let engine = GridEngine::new(PhysicsConfig::weightless(), storage.clone());
    let kind = Arc::new(VoxelType::solid(9, "glass"));
    let id = engine
        .spawn_with_voxels(
            SpawnPose::new(Vec3::new(-3.0, 8.0, 1.0), Quat::from_rotation_z(0.4)),
            (0..5).map(|x| (IVec3::new(x, x % 2, -x), engine.voxel(kind.clone()))),
        )
        .unwrap();
    let frame = engine.frame(id).unwrap();

    for local in engine.voxel_map(id).unwrap().positions() {
        let storage_pos = frame.local_to_storage(local);
        assert_eq!(frame.storage_to_local(storage_pos), local);
        assert_eq!(storage.get(storage_pos).map(|k| k.0), Some(9));
        assert_eq!(engine.grid_at_storage(storage_pos), Some((id, local)));

        let corner = frame.storage_to_world(storage_pos);
        assert!(frame.local_to_world(local.as_vec3()).abs_diff_eq(corner, 1e-3));
        assert_eq!(frame.world_to_storage(frame.voxel_center(local)), storage_pos);
    }
}

#[test]
fn test_regions_never_overlap() {
    let storage = Arc::new(MemoryStorage::new());
    let engine = GridEngine::new(PhysicsConfig::weightless(), storage.clone());
    let kind = Arc::new(VoxelType::solid(1, "stone"));

    let ids: Vec<GridId> = (0..6)
        .map(|i| {
            engine
                .spawn(SpawnPose::at(Vec3::new(i as f32 * 3.0, 0.0, 0.0)), engine.voxel(kind.clone()))
                .unwrap()
        })
        .collect();

    let origins: Vec<IVec3> = ids
        .iter()
        .map(|id| engine.frame(*id).unwrap().local_to_storage(IVec3::ZERO))
        .collect();
    for (i, a) in origins.iter().enumerate() {
        for b in &origins[i + 1..] {
            assert!((a.x - b.x).abs() >= engine.config().region_size);
        }
    }

    // A released region is handed to the next grid
    engine.destroy(ids[2]).unwrap();
    assert!(!storage.remove(origins[2]));
    let reused = engine.spawn(SpawnPose::at(Vec3::ZERO), engine.voxel(kind)).unwrap();
    assert_eq!(engine.frame(reused).unwrap().local_to_storage(IVec3::ZERO), origins[2]);
}
