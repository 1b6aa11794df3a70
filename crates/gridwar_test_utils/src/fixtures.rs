//! Test fixtures and helpers.
//!
//! Pre-built worlds and matches for consistent testing. Everything here uses
//! the built-in skirmish catalog, so unit and building names are `worker`,
//! `swordsman`, `archer`, `town_hall`, `barracks`, `house` and friends.

use fixed::types::I32F32;
use gridwar_core::components::{EntityId, Player, PlayerId};
use gridwar_core::data::Catalog;
use gridwar_core::economy::resource_map;
use gridwar_core::game::{Game, GameAssets};
use gridwar_core::map::MapData;
use gridwar_core::math::Point3;
use gridwar_core::settings::{GameSettings, PlayerSettings};
use gridwar_core::world::{SimConfig, World};
use serde::Deserialize;

/// Create a fixed-point number from an integer.
#[must_use]
pub fn fixed(n: i32) -> I32F32 {
    I32F32::from_num(n)
}

/// Create a fixed-point number from a float (for tests only).
#[must_use]
pub fn fixed_f(n: f64) -> I32F32 {
    I32F32::from_num(n)
}

/// A player holding 1000 gold, wood and food.
#[must_use]
pub fn rich_player(id: PlayerId, name: &str) -> Player {
    let mut player = Player::new(id, name, "skirmish", false);
    player.resources = resource_map(&[("gold", 1000), ("wood", 1000), ("food", 1000)]);
    player
}

/// Empty skirmish world with rich players 1 ("Red") and 2 ("Blue").
#[must_use]
pub fn two_player_world() -> World {
    two_player_world_with(SimConfig::default())
}

/// Same as [`two_player_world`] with custom constants.
#[must_use]
pub fn two_player_world_with(config: SimConfig) -> World {
    let mut world = World::new(config, Catalog::skirmish(), 1.0);
    world.add_player(rich_player(1, "Red"));
    world.add_player(rich_player(2, "Blue"));
    world
}

/// Spawn `count` units of one type in a row along +x starting at `origin`.
///
/// # Panics
///
/// Panics if a spawn fails (unknown type, population cap).
pub fn spawn_row(
    world: &mut World,
    player: PlayerId,
    unit_type: &str,
    count: usize,
    origin: Point3,
) -> Vec<EntityId> {
    (0..count)
        .map(|i| {
            let at = origin + Point3::ground(i as f32 * 1.5, 0.0);
            world
                .spawn_unit(player, unit_type, at)
                .expect("fixture spawn failed")
        })
        .collect()
}

/// Two players facing each other with a line of swordsmen each, 20 units apart.
#[must_use]
pub fn skirmish_battle(per_side: usize) -> World {
    let mut world = two_player_world();
    spawn_row(&mut world, 1, "swordsman", per_side, Point3::ground(0.0, 0.0));
    spawn_row(&mut world, 2, "swordsman", per_side, Point3::ground(0.0, 20.0));
    world
}

/// Seats for a human-vs-human skirmish.
#[must_use]
pub fn skirmish_settings() -> GameSettings {
    GameSettings::default()
        .with_player(PlayerSettings::human("Red", "skirmish"))
        .with_player(PlayerSettings::human("Blue", "skirmish"))
}

/// A started two-player skirmish match on the default field.
///
/// # Panics
///
/// Panics if the match cannot be created.
#[must_use]
pub fn started_game() -> Game {
    let mut game =
        Game::new_game(skirmish_settings(), GameAssets::skirmish()).expect("fixture game");
    game.start().expect("fixture start");
    game
}

/// An all-ground two-faction map.
#[must_use]
pub fn flat_map(width: u32, height: u32) -> MapData {
    MapData::flat(width, height, 2)
}

// ============================================================================
// RON scenarios
// ============================================================================

/// One unit in a RON scenario.
#[derive(Debug, Clone, Deserialize)]
pub struct UnitFixture {
    /// Owner.
    pub player: PlayerId,
    /// Catalog unit type.
    pub unit_type: String,
    /// World x.
    pub x: f32,
    /// World z.
    pub z: f32,
}

/// One resource node in a RON scenario.
#[derive(Debug, Clone, Deserialize)]
pub struct NodeFixture {
    /// Resource name.
    pub resource: String,
    /// World x.
    pub x: f32,
    /// World z.
    pub z: f32,
    /// Amount held.
    pub amount: i64,
}

/// A small hand-written scenario on top of [`two_player_world`].
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ScenarioFixture {
    /// Simulation constants.
    pub config: SimConfig,
    /// Units to spawn, in order.
    pub units: Vec<UnitFixture>,
    /// Nodes to place, in order.
    pub nodes: Vec<NodeFixture>,
}

impl ScenarioFixture {
    /// Parse a scenario from RON.
    ///
    /// # Panics
    ///
    /// Panics on malformed RON.
    #[must_use]
    pub fn from_ron(text: &str) -> Self {
        ron::from_str(text).expect("fixture scenario")
    }

    /// Build the world the scenario describes.
    ///
    /// # Panics
    ///
    /// Panics if any spawn fails.
    #[must_use]
    pub fn build(&self) -> World {
        let mut world = two_player_world_with(self.config.clone());
        for unit in &self.units {
            world
                .spawn_unit(unit.player, &unit.unit_type, Point3::ground(unit.x, unit.z))
                .expect("fixture unit");
        }
        for node in &self.nodes {
            world
                .spawn_resource_node(&node.resource, Point3::ground(node.x, node.z), node.amount)
                .expect("fixture node");
        }
        tracing::debug!(
            units = self.units.len(),
            nodes = self.nodes.len(),
            "fixture scenario built"
        );
        world
    }
}
