//! World entity records.
//!
//! Units, buildings, resource nodes and players are plain data owned by the
//! [`ObjectManager`](crate::objects::ObjectManager) (players by the
//! [`Economy`](crate::economy::Economy)). Fields whose consistency matters
//! (position/grid, health/state, construction progress) are private and
//! mutated through methods that keep them in sync.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::commands::{Command, CommandQueue};
use crate::data::{BuildingData, UnitData};
use crate::economy::ResourceMap;
use crate::math::{fixed_serde, grid_to_world, world_to_grid, Fixed, GridPos, Point3};

/// Unique identifier for units, buildings and resource nodes.
///
/// All three share one id space; ids are never reused within a match.
pub type EntityId = u64;

/// Player identifier.
pub type PlayerId = u32;

// ============================================================================
// Unit
// ============================================================================

/// Base stats used when no template is registered for a unit type.
pub mod defaults {
    /// Hit points.
    pub const HEALTH: f32 = 100.0;
    /// World units per second.
    pub const SPEED: f32 = 3.0;
    /// Damage per attack.
    pub const ATTACK_DAMAGE: f32 = 10.0;
    /// Attack reach in world units.
    pub const ATTACK_RANGE: f32 = 1.5;
    /// Attacks per second.
    pub const ATTACK_SPEED: f32 = 1.0;
    /// Smallest sight range any unit has.
    pub const MIN_SIGHT: f32 = 10.0;
    /// Damage type name.
    pub const DAMAGE_TYPE: &str = "normal";
}

/// What a unit is currently doing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum UnitState {
    /// No active order.
    #[default]
    Idle,
    /// Walking toward a target.
    Moving,
    /// In range and fighting.
    Attacking,
    /// Harvesting a resource node.
    Gathering,
    /// Constructing a building.
    Building,
    /// Repairing a building.
    Repairing,
    /// Health reached zero. Terminal.
    Dead,
}

/// Standing behaviour applied while a unit has no explicit order.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub enum Stance {
    /// Engage enemies that come within attack range.
    #[default]
    Aggressive,
    /// Never move; engage only what is already in range.
    Hold,
    /// Walk between two points, engaging anything in sight.
    Patrol {
        /// Patrol start.
        from: Point3,
        /// Patrol end.
        to: Point3,
        /// Currently heading toward `to`.
        outbound: bool,
    },
    /// Stay close to another unit.
    Follow {
        /// Unit being followed.
        leader: EntityId,
    },
    /// Defend an area around a point.
    Guard {
        /// Guarded point.
        post: Point3,
        /// Engagement radius around the post.
        radius: f32,
    },
}

/// A mobile entity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Unit {
    /// Entity id.
    pub id: EntityId,
    /// Owning player.
    pub player_id: PlayerId,
    /// Template name (`"worker"`, `"archer"`...).
    pub unit_type: String,
    /// Display name.
    pub name: String,
    position: Point3,
    grid_pos: GridPos,
    /// Facing in radians around +y; zero faces +z.
    pub rotation: f32,
    health: f32,
    max_health: f32,
    /// Flat physical mitigation.
    pub armor: f32,
    /// Current energy.
    pub energy: f32,
    /// Energy cap.
    pub max_energy: f32,
    /// World units per second.
    pub speed: f32,
    state: UnitState,
    move_target: Option<Point3>,
    /// Waypoints supplied by the path provider.
    pub path: Vec<Point3>,
    /// Next waypoint in [`Unit::path`].
    pub path_index: usize,
    /// A path request is outstanding.
    pub awaiting_path: bool,
    /// Damage per attack before modifiers.
    pub attack_damage: f32,
    /// Attack reach.
    pub attack_range: f32,
    /// Attacks per second.
    pub attack_speed: f32,
    /// How far the unit notices enemies.
    pub sight_range: f32,
    /// World time of the last attack.
    pub last_attack_at: Option<f64>,
    /// Entity currently being attacked.
    pub attack_target: Option<EntityId>,
    /// Name of the damage type this unit deals.
    pub damage_type: String,
    /// Free-form tags (`"worker"`, `"armored"`, `"organic"`...).
    pub tags: Vec<String>,
    /// Units gathered per second, by resource.
    pub gather_rate: BTreeMap<String, f32>,
    /// Resources currently carried.
    pub carried_resources: ResourceMap,
    #[serde(with = "fixed_serde")]
    gather_progress: Fixed,
    /// Node being harvested.
    pub gather_target: Option<EntityId>,
    /// Building under construction or repair.
    pub build_target: Option<EntityId>,
    /// Progress of the building this unit is constructing.
    pub build_progress: f32,
    /// Pending orders.
    pub command_queue: CommandQueue,
    /// Order being executed.
    pub current_command: Option<Command>,
    /// Standing behaviour while idle.
    pub stance: Stance,
    /// Population slots consumed.
    pub population_cost: u32,
    /// World time of creation.
    pub created_at: f64,
    pub(crate) died_at_tick: Option<u64>,
}

impl Unit {
    /// Create a unit with default stats.
    #[must_use]
    pub fn new(id: EntityId, player_id: PlayerId, unit_type: &str, position: Point3) -> Self {
        let mut unit = Self {
            id,
            player_id,
            unit_type: unit_type.to_string(),
            name: unit_type.to_string(),
            position,
            grid_pos: world_to_grid(position),
            rotation: 0.0,
            health: defaults::HEALTH,
            max_health: defaults::HEALTH,
            armor: 0.0,
            energy: 0.0,
            max_energy: 0.0,
            speed: defaults::SPEED,
            state: UnitState::Idle,
            move_target: None,
            path: Vec::new(),
            path_index: 0,
            awaiting_path: false,
            attack_damage: defaults::ATTACK_DAMAGE,
            attack_range: defaults::ATTACK_RANGE,
            attack_speed: defaults::ATTACK_SPEED,
            sight_range: 0.0,
            last_attack_at: None,
            attack_target: None,
            damage_type: defaults::DAMAGE_TYPE.to_string(),
            tags: Vec::new(),
            gather_rate: BTreeMap::new(),
            carried_resources: ResourceMap::new(),
            gather_progress: Fixed::ZERO,
            gather_target: None,
            build_target: None,
            build_progress: 0.0,
            command_queue: CommandQueue::new(),
            current_command: None,
            stance: Stance::default(),
            population_cost: 1,
            created_at: 0.0,
            died_at_tick: None,
        };
        unit.recompute_sight();
        unit
    }

    /// Create a unit from a template.
    #[must_use]
    pub fn from_template(
        id: EntityId,
        player_id: PlayerId,
        template: &UnitData,
        position: Point3,
    ) -> Self {
        let mut unit = Self::new(id, player_id, &template.id, position);
        unit.name.clone_from(&template.name);
        unit.health = template.health.max(1.0);
        unit.max_health = unit.health;
        unit.armor = template.armor;
        unit.max_energy = template.energy;
        unit.energy = template.energy;
        unit.speed = template.speed;
        unit.attack_damage = template.attack_damage;
        unit.attack_range = template.attack_range;
        unit.attack_speed = template.attack_speed;
        unit.damage_type.clone_from(&template.damage_type);
        unit.tags.clone_from(&template.tags);
        unit.gather_rate.clone_from(&template.gather_rates);
        unit.population_cost = template.population_cost;
        unit.recompute_sight();
        unit
    }

    /// Builder: override health and max health.
    #[must_use]
    pub fn with_health(mut self, health: f32) -> Self {
        self.max_health = health.max(1.0);
        self.health = self.max_health;
        self
    }

    /// Builder: override attack stats.
    #[must_use]
    pub fn with_attack(mut self, damage: f32, range: f32, attacks_per_second: f32) -> Self {
        self.attack_damage = damage;
        self.attack_range = range;
        self.attack_speed = attacks_per_second;
        self.recompute_sight();
        self
    }

    /// Builder: override armor.
    #[must_use]
    pub fn with_armor(mut self, armor: f32) -> Self {
        self.armor = armor;
        self
    }

    /// Builder: set a gather rate.
    #[must_use]
    pub fn with_gather_rate(mut self, resource: &str, per_second: f32) -> Self {
        self.gather_rate.insert(resource.to_string(), per_second);
        self
    }

    /// Sight is twice the attack range, but never below [`defaults::MIN_SIGHT`].
    pub fn recompute_sight(&mut self) {
        self.sight_range = (self.attack_range * 2.0).max(defaults::MIN_SIGHT);
    }

    /// World position.
    #[must_use]
    pub fn position(&self) -> Point3 {
        self.position
    }

    /// Grid position, always consistent with [`Unit::position`].
    #[must_use]
    pub fn grid_pos(&self) -> GridPos {
        self.grid_pos
    }

    /// Move the unit, keeping world and grid position in sync.
    pub fn set_position(&mut self, position: Point3) {
        self.position = position;
        self.grid_pos = world_to_grid(position);
    }

    /// Place the unit at a grid position.
    pub fn set_grid_pos(&mut self, grid: GridPos) {
        let world = grid_to_world(grid);
        self.position = Point3::new(world.x, self.position.y, world.z);
        self.grid_pos = grid;
    }

    /// Current health.
    #[must_use]
    pub fn health(&self) -> f32 {
        self.health
    }

    /// Maximum health.
    #[must_use]
    pub fn max_health(&self) -> f32 {
        self.max_health
    }

    /// Health as a fraction of max.
    #[must_use]
    pub fn health_fraction(&self) -> f32 {
        if self.max_health <= 0.0 {
            0.0
        } else {
            self.health / self.max_health
        }
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> UnitState {
        self.state
    }

    /// Movement target; present only while [`UnitState::Moving`].
    #[must_use]
    pub fn move_target(&self) -> Option<Point3> {
        self.move_target
    }

    /// Unit has not died.
    #[must_use]
    pub fn is_alive(&self) -> bool {
        self.state != UnitState::Dead
    }

    /// Unit can gather resources.
    #[must_use]
    pub fn is_worker(&self) -> bool {
        !self.gather_rate.is_empty() || self.has_tag("worker")
    }

    /// Unit can fight.
    #[must_use]
    pub fn is_combatant(&self) -> bool {
        self.attack_damage > 0.0 && self.attack_speed > 0.0
    }

    /// Case-sensitive tag test.
    #[must_use]
    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| t == tag)
    }

    /// Change state. Dead units ignore this; leaving `Moving` drops the move target.
    pub fn set_state(&mut self, state: UnitState) {
        if !self.is_alive() || state == UnitState::Dead {
            return;
        }
        if state != UnitState::Moving {
            self.move_target = None;
        }
        self.state = state;
    }

    /// Enter `Moving` toward `target`.
    pub fn start_moving(&mut self, target: Point3) {
        if !self.is_alive() {
            return;
        }
        self.state = UnitState::Moving;
        self.move_target = Some(target);
    }

    /// Apply damage, clamping at zero. Returns the damage actually dealt.
    ///
    /// Reaching zero health kills the unit and drops all of its orders.
    pub fn apply_damage(&mut self, amount: f32) -> f32 {
        if !self.is_alive() || amount <= 0.0 || !amount.is_finite() {
            return 0.0;
        }
        let dealt = amount.min(self.health);
        self.health -= dealt;
        if self.health <= 0.0 {
            self.health = 0.0;
            self.state = UnitState::Dead;
            self.move_target = None;
            self.clear_orders();
        }
        dealt
    }

    /// Heal, clamping at max. Returns the amount actually healed.
    pub fn heal(&mut self, amount: f32) -> f32 {
        if !self.is_alive() || amount <= 0.0 || !amount.is_finite() {
            return 0.0;
        }
        let healed = amount.min(self.max_health - self.health);
        self.health += healed;
        healed
    }

    /// Raise or lower max health, scaling current health proportionally.
    pub fn scale_max_health(&mut self, factor: f32) {
        if !self.is_alive() || factor <= 0.0 {
            return;
        }
        let fraction = self.health_fraction();
        self.max_health *= factor;
        self.health = (self.max_health * fraction).clamp(0.0, self.max_health);
    }

    /// Drop the current order, the queue and every order-related target.
    pub fn clear_orders(&mut self) {
        self.current_command = None;
        self.command_queue.clear();
        self.path.clear();
        self.path_index = 0;
        self.awaiting_path = false;
        self.attack_target = None;
        self.gather_target = None;
        self.build_target = None;
    }

    /// Total carried across all resources.
    #[must_use]
    pub fn carried_total(&self) -> i64 {
        self.carried_resources.values().sum()
    }

    /// Add fractional gather progress; returns the whole units now ready to extract.
    pub(crate) fn accumulate_gather(&mut self, amount: Fixed) -> i64 {
        self.gather_progress = self.gather_progress.saturating_add(amount);
        let whole = self.gather_progress.floor();
        self.gather_progress -= whole;
        whole.to_num::<i64>()
    }

    /// Forget partial gather progress.
    pub(crate) fn reset_gather_progress(&mut self) {
        self.gather_progress = Fixed::ZERO;
    }

    /// Tick on which the unit died, once the world has noticed.
    #[must_use]
    pub fn died_at_tick(&self) -> Option<u64> {
        self.died_at_tick
    }
}

// ============================================================================
// Building
// ============================================================================

/// A static structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Building {
    /// Entity id.
    pub id: EntityId,
    /// Owning player.
    pub player_id: PlayerId,
    /// Template name.
    pub building_type: String,
    /// Display name.
    pub name: String,
    position: Point3,
    grid_pos: GridPos,
    health: f32,
    max_health: f32,
    /// Flat mitigation.
    pub armor: f32,
    is_built: bool,
    build_progress: f32,
    /// Seconds of single-worker effort needed to finish construction.
    pub build_time: f32,
    /// Upgrade tier, starting at zero.
    pub upgrade_level: u32,
    /// World time construction finished.
    pub completion_time: Option<f64>,
    /// Where produced units walk to.
    pub rally_point: Option<Point3>,
    /// Population cap granted while built.
    pub housing: u32,
    /// Footprint radius for adjacency checks.
    pub radius: f32,
}

impl Building {
    /// Default hit points.
    pub const DEFAULT_HEALTH: f32 = 500.0;
    /// Default footprint radius.
    pub const DEFAULT_RADIUS: f32 = 1.5;

    /// Create an unfinished building.
    #[must_use]
    pub fn new(id: EntityId, player_id: PlayerId, building_type: &str, position: Point3) -> Self {
        Self {
            id,
            player_id,
            building_type: building_type.to_string(),
            name: building_type.to_string(),
            position,
            grid_pos: world_to_grid(position),
            health: Self::DEFAULT_HEALTH,
            max_health: Self::DEFAULT_HEALTH,
            armor: 0.0,
            is_built: false,
            build_progress: 0.0,
            build_time: 10.0,
            upgrade_level: 0,
            completion_time: None,
            rally_point: None,
            housing: 0,
            radius: Self::DEFAULT_RADIUS,
        }
    }

    /// Create an unfinished building from a template.
    #[must_use]
    pub fn from_template(
        id: EntityId,
        player_id: PlayerId,
        template: &BuildingData,
        position: Point3,
    ) -> Self {
        let mut building = Self::new(id, player_id, &template.id, position);
        building.name.clone_from(&template.name);
        building.max_health = template.health.max(1.0);
        building.health = building.max_health;
        building.armor = template.armor;
        building.build_time = template.build_time;
        building.housing = template.housing;
        building
    }

    /// World position.
    #[must_use]
    pub fn position(&self) -> Point3 {
        self.position
    }

    /// Grid position.
    #[must_use]
    pub fn grid_pos(&self) -> GridPos {
        self.grid_pos
    }

    /// Construction finished. Equivalent to `build_progress() == 1.0`.
    #[must_use]
    pub fn is_built(&self) -> bool {
        self.is_built
    }

    /// Construction progress in `[0, 1]`.
    #[must_use]
    pub fn build_progress(&self) -> f32 {
        self.build_progress
    }

    /// Current health.
    #[must_use]
    pub fn health(&self) -> f32 {
        self.health
    }

    /// Maximum health.
    #[must_use]
    pub fn max_health(&self) -> f32 {
        self.max_health
    }

    /// Health reached zero.
    #[must_use]
    pub fn is_destroyed(&self) -> bool {
        self.health <= 0.0
    }

    /// Add construction progress. Returns `true` on the call that completes it.
    pub fn advance_construction(&mut self, amount: f32, now: f64) -> bool {
        if self.is_built || amount <= 0.0 || !amount.is_finite() {
            return false;
        }
        self.build_progress = (self.build_progress + amount).min(1.0);
        if self.build_progress >= 1.0 {
            self.complete(now);
            return true;
        }
        false
    }

    /// Mark construction finished.
    pub fn complete(&mut self, now: f64) {
        self.build_progress = 1.0;
        self.is_built = true;
        self.completion_time = Some(now);
    }

    /// Apply damage. Returns the damage actually dealt.
    pub fn apply_damage(&mut self, amount: f32) -> f32 {
        if self.is_destroyed() || amount <= 0.0 || !amount.is_finite() {
            return 0.0;
        }
        let dealt = amount.min(self.health);
        self.health -= dealt;
        dealt
    }

    /// Restore health. Returns the amount actually restored.
    pub fn repair(&mut self, amount: f32) -> f32 {
        if self.is_destroyed() || amount <= 0.0 || !amount.is_finite() {
            return 0.0;
        }
        let restored = amount.min(self.max_health - self.health);
        self.health += restored;
        restored
    }

    /// Distance from a point to the building's footprint edge.
    #[must_use]
    pub fn distance_to_edge(&self, point: Point3) -> f32 {
        (self.position.flatten().distance(point.flatten()) - self.radius).max(0.0)
    }
}

// ============================================================================
// Resource nodes
// ============================================================================

/// A harvestable resource deposit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceNode {
    /// Entity id.
    pub id: EntityId,
    /// Resource name (`"gold"`, `"wood"`...).
    pub resource_type: String,
    /// Location.
    pub position: Point3,
    amount: i64,
    /// Starting amount.
    pub max_amount: i64,
    pub(crate) depletion_announced: bool,
}

impl ResourceNode {
    /// Create a node with `amount` units.
    #[must_use]
    pub fn new(id: EntityId, resource_type: &str, position: Point3, amount: i64) -> Self {
        let amount = amount.max(0);
        Self {
            id,
            resource_type: resource_type.to_string(),
            position,
            amount,
            max_amount: amount,
            depletion_announced: false,
        }
    }

    /// Remaining amount.
    #[must_use]
    pub fn amount(&self) -> i64 {
        self.amount
    }

    /// Nothing left.
    #[must_use]
    pub fn is_depleted(&self) -> bool {
        self.amount <= 0
    }

    /// Remove up to `requested` units, returning how many were taken.
    pub fn extract(&mut self, requested: i64) -> i64 {
        let taken = requested.clamp(0, self.amount);
        self.amount -= taken;
        taken
    }
}

// ============================================================================
// Player
// ============================================================================

/// A participant in the match.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Player {
    /// Player id.
    pub id: PlayerId,
    /// Display name.
    pub name: String,
    /// Faction name.
    pub faction: String,
    /// Controlled by a strategic AI.
    pub is_ai: bool,
    /// Current stockpile.
    pub resources: ResourceMap,
    /// Lifetime income.
    pub resources_gathered: ResourceMap,
    /// Lifetime spending.
    pub resources_spent: ResourceMap,
    /// Eliminated from the match.
    pub is_defeated: bool,
}

impl Player {
    /// Create a player with an empty stockpile.
    #[must_use]
    pub fn new(id: PlayerId, name: &str, faction: &str, is_ai: bool) -> Self {
        Self {
            id,
            name: name.to_string(),
            faction: faction.to_string(),
            is_ai,
            resources: ResourceMap::new(),
            resources_gathered: ResourceMap::new(),
            resources_spent: ResourceMap::new(),
            is_defeated: false,
        }
    }

    /// Amount of one resource held.
    #[must_use]
    pub fn resource(&self, name: &str) -> i64 {
        self.resources.get(name).copied().unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::Tile;

    #[test]
    fn test_set_position_updates_grid() {
        let mut unit = Unit::new(1, 1, "worker", Point3::ZERO);
        unit.set_position(Point3::ground(5.5, 7.25));
        assert_eq!(unit.grid_pos().tile, Tile::new(5, 7));
        assert!((unit.grid_pos().offset_y - 0.25).abs() < 1e-5);
    }

    #[test]
    fn test_lethal_damage_kills_and_clamps() {
        let mut unit = Unit::new(1, 1, "soldier", Point3::ZERO).with_health(50.0);
        unit.current_command = Some(Command::stop());
        let dealt = unit.apply_damage(80.0);
        assert_eq!(dealt, 50.0);
        assert_eq!(unit.health(), 0.0);
        assert_eq!(unit.state(), UnitState::Dead);
        assert!(unit.current_command.is_none());
    }

    #[test]
    fn test_dead_units_stay_dead() {
        let mut unit = Unit::new(1, 1, "soldier", Point3::ZERO);
        unit.apply_damage(1000.0);
        unit.set_state(UnitState::Moving);
        unit.start_moving(Point3::ground(1.0, 1.0));
        assert_eq!(unit.heal(50.0), 0.0);
        assert_eq!(unit.state(), UnitState::Dead);
        assert_eq!(unit.health(), 0.0);
    }

    #[test]
    fn test_move_target_only_while_moving() {
        let mut unit = Unit::new(1, 1, "soldier", Point3::ZERO);
        unit.start_moving(Point3::ground(3.0, 3.0));
        assert!(unit.move_target().is_some());
        unit.set_state(UnitState::Idle);
        assert!(unit.move_target().is_none());
    }

    #[test]
    fn test_heal_clamps_at_max() {
        let mut unit = Unit::new(1, 1, "soldier", Point3::ZERO).with_health(40.0);
        unit.apply_damage(10.0);
        assert_eq!(unit.heal(100.0), 10.0);
        assert_eq!(unit.health(), 40.0);
    }

    #[test]
    fn test_sight_floor() {
        let archer = Unit::new(1, 1, "archer", Point3::ZERO).with_attack(8.0, 7.0, 1.0);
        assert_eq!(archer.sight_range, 14.0);
        let melee = Unit::new(2, 1, "soldier", Point3::ZERO);
        assert_eq!(melee.sight_range, defaults::MIN_SIGHT);
    }

    #[test]
    fn test_gather_progress_accumulates_whole_units() {
        let mut unit = Unit::new(1, 1, "worker", Point3::ZERO);
        assert_eq!(unit.accumulate_gather(Fixed::from_num(0.75)), 0);
        assert_eq!(unit.accumulate_gather(Fixed::from_num(0.75)), 1);
        assert_eq!(unit.accumulate_gather(Fixed::from_num(0.5)), 1);
    }

    #[test]
    fn test_building_construction_completes_once() {
        let mut building = Building::new(1, 1, "house", Point3::ZERO);
        assert!(!building.advance_construction(0.6, 1.0));
        assert!(building.advance_construction(0.6, 2.0));
        assert!(building.is_built());
        assert_eq!(building.build_progress(), 1.0);
        assert_eq!(building.completion_time, Some(2.0));
        assert!(!building.advance_construction(0.1, 3.0));
    }

    #[test]
    fn test_node_extract_clamps() {
        let mut node = ResourceNode::new(1, "gold", Point3::ZERO, 10);
        assert_eq!(node.extract(4), 4);
        assert_eq!(node.extract(100), 6);
        assert!(node.is_depleted());
        assert_eq!(node.extract(1), 0);
    }
}
