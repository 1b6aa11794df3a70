//! World tick benchmarks for gridwar_core.
//!
//! Run with: `cargo bench -p gridwar_core`

// Benchmark binaries don't need docs on macro-generated functions
#![allow(missing_docs)]

use criterion::{black_box, criterion_group, criterion_main, BatchSize, Criterion};
use gridwar_core::commands::Command;
use gridwar_core::math::Point3;
use gridwar_core::world::{SimConfig, World};
use gridwar_test_utils::fixtures::{spawn_row, two_player_world_with};

const STEP: f64 = 1.0 / 60.0;

/// Swordsmen and archers, `per_side` each, marching at each other.
fn battle(per_side: usize) -> World {
    let config = SimConfig {
        base_population: 1000,
        ..SimConfig::default()
    };
    let mut world = two_player_world_with(config);
    for row in 0..per_side / 25 {
        let z = row as f32 * 1.5;
        spawn_row(&mut world, 1, "swordsman", 25, Point3::ground(0.0, z));
        spawn_row(&mut world, 2, "archer", 25, Point3::ground(0.0, 60.0 + z));
    }
    for id in world.objects().unit_ids() {
        let owner = world.objects().owner_of(id).unwrap_or(1);
        let target = if owner == 1 { 60.0 } else { 0.0 };
        let _ = world.issue_command(owner, id, Command::move_to(Point3::ground(18.0, target)));
    }
    world
}

pub fn world_tick_benchmark(c: &mut Criterion) {
    c.bench_function("world_tick_500_units", |b| {
        b.iter_batched(
            || battle(250),
            |mut world| {
                for _ in 0..10 {
                    black_box(world.update(STEP).ok());
                }
            },
            BatchSize::LargeInput,
        )
    });

    c.bench_function("state_hash_500_units", |b| {
        let world = battle(250);
        b.iter(|| black_box(world.state_hash()));
    });
}

criterion_group!(benches, world_tick_benchmark);
criterion_main!(benches);
