//! Determinism testing utilities.
//!
//! Provides a harness for verifying that the world produces identical
//! results given identical inputs.
//!
//! # Testing Strategy
//!
//! Replays and lockstep hosts need two worlds fed the same commands to stay
//! identical. Sources of divergence include:
//!
//! - **HashMap iteration order**: Rust's default hasher is randomized.
//!   The core keeps every collection in a `BTreeMap` and visits ids in order.
//!
//! - **Fractional accumulators**: Income and gather progress use
//!   [`gridwar_core::math::Fixed`] so rounding never depends on history.
//!
//! - **System randomness**: The core has none; hosts that want randomness
//!   must feed it in as commands.
//!
//! # Test Levels
//!
//! 1. **Unit tests**: Individual subsystems inside `gridwar_core`
//! 2. **Property tests**: Random command streams still hash identically
//! 3. **Integration tests**: Full matches are reproducible
//! 4. **Parallel tests**: N worlds on N threads all match

use std::hash::{Hash, Hasher};
use std::thread;

use gridwar_core::hash::StableHasher;
use gridwar_core::world::World;

/// Fixed step used by the helpers, in seconds.
pub const STEP: f64 = 1.0 / 60.0;

/// Result of a determinism test.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeterminismResult {
    /// Whether all runs produced identical results.
    pub is_deterministic: bool,
    /// Hashes from each run.
    pub hashes: Vec<u64>,
    /// Number of ticks simulated.
    pub ticks: u64,
}

impl DeterminismResult {
    fn from_hashes(hashes: Vec<u64>, ticks: u64) -> Self {
        Self {
            is_deterministic: hashes.windows(2).all(|w| w[0] == w[1]),
            hashes,
            ticks,
        }
    }

    /// Get all unique hashes (should be 1 for a deterministic world).
    #[must_use]
    pub fn unique_hashes(&self) -> Vec<u64> {
        let mut unique: Vec<u64> = self.hashes.clone();
        unique.sort_unstable();
        unique.dedup();
        unique
    }

    /// Assert that every run matched, with a detailed error message.
    ///
    /// # Panics
    ///
    /// Panics if the runs produced different hashes.
    pub fn assert_deterministic(&self) {
        if !self.is_deterministic {
            let unique = self.unique_hashes();
            panic!(
                "World is non-deterministic!\n\
                 Runs: {}\n\
                 Ticks: {}\n\
                 Unique hashes: {} (expected 1)\n\
                 All hashes: {:?}",
                self.hashes.len(),
                self.ticks,
                unique.len(),
                self.hashes
            );
        }
    }
}

/// Run a state machine multiple times and verify determinism.
///
/// # Arguments
///
/// * `runs` - Number of times to run
/// * `ticks` - Number of ticks per run
/// * `setup` - Creates the initial state
/// * `step` - Advances the state by one tick
/// * `hash` - Computes the state hash
pub fn verify_determinism<S, Setup, Step, HashFn>(
    runs: usize,
    ticks: u64,
    setup: Setup,
    step: Step,
    hash: HashFn,
) -> DeterminismResult
where
    Setup: Fn() -> S,
    Step: Fn(&mut S, u64),
    HashFn: Fn(&S) -> u64,
{
    let hashes = (0..runs)
        .map(|_| {
            let mut state = setup();
            for tick in 0..ticks {
                step(&mut state, tick);
            }
            hash(&state)
        })
        .collect();
    DeterminismResult::from_hashes(hashes, ticks)
}

/// Advance a world `ticks` fixed steps, calling `script` before each tick
/// so tests can issue commands at chosen ticks.
///
/// # Panics
///
/// Panics if a tick fails.
pub fn run_world<F>(world: &mut World, ticks: u64, mut script: F)
where
    F: FnMut(&mut World, u64),
{
    for tick in 0..ticks {
        script(world, tick);
        world.update(STEP).expect("tick failed");
    }
}

/// Build and run a world `runs` times, returning every final hash.
pub fn verify_world_determinism<Setup, Script>(
    runs: usize,
    ticks: u64,
    setup: Setup,
    script: Script,
) -> DeterminismResult
where
    Setup: Fn() -> World,
    Script: Fn(&mut World, u64),
{
    verify_determinism(
        runs,
        ticks,
        setup,
        |world, tick| {
            script(world, tick);
            world.update(STEP).expect("tick failed");
        },
        World::state_hash,
    )
}

/// Run N worlds on scoped threads and collect their final hashes.
///
/// # Panics
///
/// Panics if a worker thread panics.
pub fn run_parallel_worlds<Setup, Script>(
    setup: Setup,
    script: Script,
    num_worlds: usize,
    ticks: u64,
) -> DeterminismResult
where
    Setup: Fn() -> World + Sync,
    Script: Fn(&mut World, u64) + Sync,
{
    let hashes = thread::scope(|s| {
        let handles: Vec<_> = (0..num_worlds)
            .map(|_| {
                s.spawn(|| {
                    let mut world = setup();
                    run_world(&mut world, ticks, &script);
                    world.state_hash()
                })
            })
            .collect();

        handles
            .into_iter()
            .map(|h| h.join().expect("world thread panicked"))
            .collect()
    });
    DeterminismResult::from_hashes(hashes, ticks)
}

/// Compare two runs tick by tick and return the first tick whose hashes
/// differ.
///
/// # Panics
///
/// Panics if a tick fails.
pub fn find_first_divergence<Setup, Script>(
    setup: Setup,
    script: Script,
    ticks: u64,
) -> Option<u64>
where
    Setup: Fn() -> World,
    Script: Fn(&mut World, u64),
{
    let mut a = setup();
    let mut b = setup();
    for tick in 0..ticks {
        script(&mut a, tick);
        script(&mut b, tick);
        a.update(STEP).expect("tick failed");
        b.update(STEP).expect("tick failed");
        let (ha, hb) = (a.state_hash(), b.state_hash());
        if ha != hb {
            tracing::warn!(tick, left = ha, right = hb, "worlds diverged");
            return Some(tick);
        }
    }
    None
}

/// Hash any hashable value with the stable FNV-1a hasher.
#[must_use]
pub fn compute_hash<T: Hash>(value: &T) -> u64 {
    let mut hasher = StableHasher::new();
    value.hash(&mut hasher);
    hasher.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{skirmish_battle, two_player_world};
    use gridwar_core::commands::Command;
    use gridwar_core::math::Point3;

    #[test]
    fn test_verify_determinism_simple() {
        let result = verify_determinism(3, 10, || 0_u64, |s, t| *s += t, compute_hash);
        result.assert_deterministic();
        assert_eq!(result.unique_hashes().len(), 1);
    }

    #[test]
    fn test_empty_world_determinism() {
        verify_world_determinism(3, 60, two_player_world, |_, _| {}).assert_deterministic();
    }

    #[test]
    fn test_battle_determinism() {
        let script = |world: &mut World, tick: u64| {
            if tick == 0 {
                for id in 1..=4 {
                    let _ = world.issue_command(1, id, Command::move_to(Point3::ground(3.0, 20.0)));
                }
            }
        };
        verify_world_determinism(3, 300, || skirmish_battle(4), script).assert_deterministic();
        assert_eq!(find_first_divergence(|| skirmish_battle(4), script, 300), None);
    }

    #[test]
    fn test_parallel_worlds_match() {
        run_parallel_worlds(|| skirmish_battle(3), |_, _| {}, 4, 120).assert_deterministic();
    }
}
