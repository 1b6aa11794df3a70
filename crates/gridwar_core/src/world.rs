//! The simulation world and its fixed-step tick.
//!
//! [`World`] owns every subsystem and advances them in a fixed order:
//!
//! 1. Time advances; passive resource generation accrues
//! 2. Status effects tick (may kill units)
//! 3. Command pipeline promotes and executes commands
//! 4. Behavior trees tick (commands they issue run next tick)
//! 5. Groups update centre, cohesion and arrival
//! 6. Construction, production queues and research advance
//! 7. Strategic AI runs when its cadence has elapsed
//! 8. Dead units are culled once their grace period has passed
//!
//! # Determinism
//!
//! Entities are stored and visited in id order, the only randomness is
//! hashing of entity ids, and [`World::state_hash`] summarises the
//! observable state so two runs can be compared.

use std::hash::Hasher;

use serde::{Deserialize, Serialize};

use crate::ai::{Decision, StrategicAi};
use crate::behavior::BehaviorManager;
use crate::combat::DamageRegistry;
use crate::commands::{Command, CommandType};
use crate::components::{Building, EntityId, Player, PlayerId, Stance, Unit, UnitState};
use crate::data::Catalog;
use crate::economy::{Economy, PopulationStatus, ResourceMap};
use crate::error::{GameError, Result};
use crate::events::{EventQueue, EventType, GameEvent};
use crate::formations::{Formation, FormationParams, GroupId, GroupManager};
use crate::hash::StableHasher;
use crate::math::Point3;
use crate::objects::ObjectManager;
use crate::pathfinding::{DirectPathProvider, PathProvider};
use crate::production::{ProductionContext, ProductionSystem};
use crate::status::StatusEffectManager;
use crate::tech::TechTree;

// ============================================================================
// Configuration
// ============================================================================

/// Tunable simulation constants.
///
/// Every field has a default, so a partial RON file is enough.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    /// World units per tile.
    pub tile_size: f32,
    /// Moves finish within this many tiles of the target.
    pub arrival_epsilon: f32,
    /// Resources a worker carries before depositing.
    pub carry_capacity: i64,
    /// Distance between formation slots.
    pub unit_spacing: f32,
    /// Groups break formation beyond this distance from the centre.
    pub formation_break_distance: f32,
    /// Groups re-form within this distance.
    pub formation_reform_distance: f32,
    /// Groups arrive within this distance of their target.
    pub group_arrival_distance: f32,
    /// Population cap without housing.
    pub base_population: u32,
    /// Population cap never drops below this.
    pub population_floor: u32,
    /// Events buffered before new ones are dropped.
    pub event_capacity: usize,
    /// Ticks a dead unit stays in the world before removal.
    pub dead_unit_grace_ticks: u64,
    /// Per-worker construction rate for buildings with no build time.
    pub default_build_rate: f32,
    /// Health per second restored by one repairing worker.
    pub repair_rate: f32,
    /// Workers build and repair within this distance of a building's edge.
    pub build_reach: f32,
    /// Workers gather within this distance of a node.
    pub gather_reach: f32,
    /// Production queue capacity per building.
    pub production_queue_size: usize,
    /// Seconds between strategic AI evaluations.
    pub ai_interval_secs: f64,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            tile_size: 1.0,
            arrival_epsilon: 0.1,
            carry_capacity: 100,
            unit_spacing: 2.0,
            formation_break_distance: 8.0,
            formation_reform_distance: 3.0,
            group_arrival_distance: 2.0,
            base_population: 10,
            population_floor: 5,
            event_capacity: crate::events::DEFAULT_EVENT_CAPACITY,
            dead_unit_grace_ticks: 1,
            default_build_rate: crate::production::DEFAULT_BUILD_RATE,
            repair_rate: 10.0,
            build_reach: 1.5,
            gather_reach: 1.5,
            production_queue_size: crate::production::ProductionQueue::DEFAULT_MAX_QUEUE_SIZE,
            ai_interval_secs: 0.5,
        }
    }
}

impl SimConfig {
    /// Parse from RON, filling gaps with defaults.
    pub fn from_ron(text: &str) -> Result<Self> {
        ron::from_str(text).map_err(|e| GameError::DataParseError {
            path: "<sim config>".to_string(),
            message: e.to_string(),
        })
    }

    fn formation_params(&self) -> FormationParams {
        FormationParams {
            spacing: self.unit_spacing,
            break_distance: self.formation_break_distance,
            reform_distance: self.formation_reform_distance,
            arrival_distance: self.group_arrival_distance,
        }
    }
}

// ============================================================================
// Tick results
// ============================================================================

/// What happened during one tick.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TickReport {
    /// Tick number just completed.
    pub tick: u64,
    /// World time after the tick.
    pub time: f64,
    /// Units that died this tick.
    pub deaths: Vec<EntityId>,
    /// Units spawned by production.
    pub spawned: Vec<EntityId>,
    /// Buildings that finished construction.
    pub completed_buildings: Vec<EntityId>,
    /// Research finished this tick.
    pub researched: Vec<(PlayerId, String)>,
    /// Groups that reached their target.
    pub arrived_groups: Vec<GroupId>,
    /// Decisions the strategic AIs acted on.
    pub decisions: Vec<(PlayerId, Decision)>,
    /// Dead units removed from the world.
    pub culled: Vec<EntityId>,
}

/// Entity and queue counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct WorldStats {
    /// Ticks run.
    pub tick: u64,
    /// World time in seconds.
    pub time: f64,
    /// Units, including corpses awaiting removal.
    pub units: usize,
    /// Buildings.
    pub buildings: usize,
    /// Resource nodes.
    pub resource_nodes: usize,
    /// Unit groups.
    pub groups: usize,
    /// Units running a behavior tree.
    pub behavior_trees: usize,
    /// Events waiting to be drained.
    pub pending_events: usize,
    /// Events lost to a full queue.
    pub dropped_events: u64,
}

#[derive(Serialize)]
struct UnitHashRecord<'a> {
    id: EntityId,
    player: PlayerId,
    unit_type: &'a str,
    position: [u32; 3],
    health: u32,
    state: UnitState,
    carried: &'a ResourceMap,
}

#[derive(Serialize)]
struct BuildingHashRecord<'a> {
    id: EntityId,
    player: PlayerId,
    building_type: &'a str,
    health: u32,
    progress: u32,
    upgrade_level: u32,
}

#[derive(Serialize)]
struct PlayerHashRecord<'a> {
    id: PlayerId,
    resources: &'a ResourceMap,
    spent: &'a ResourceMap,
    gathered: &'a ResourceMap,
    defeated: bool,
}

// ============================================================================
// World
// ============================================================================

/// Owns all simulation state.
#[derive(Debug)]
pub struct World {
    pub(crate) config: SimConfig,
    pub(crate) tick: u64,
    pub(crate) time: f64,
    pub(crate) events: EventQueue,
    pub(crate) catalog: Catalog,
    pub(crate) objects: ObjectManager,
    pub(crate) economy: Economy,
    pub(crate) status: StatusEffectManager,
    pub(crate) groups: GroupManager,
    pub(crate) behaviors: BehaviorManager,
    pub(crate) production: ProductionSystem,
    pub(crate) tech: TechTree,
    pub(crate) damage_types: DamageRegistry,
    pub(crate) paths: Box<dyn PathProvider>,
    pub(crate) ais: Vec<StrategicAi>,
    pub(crate) bounds: Option<(f32, f32)>,
    ai_clock: f64,
    command_sequence: u64,
}

impl World {
    /// Create an empty world.
    #[must_use]
    pub fn new(config: SimConfig, catalog: Catalog, resource_multiplier: f32) -> Self {
        let events = EventQueue::new(config.event_capacity);
        Self::with_events(config, catalog, resource_multiplier, events)
    }

    /// Create an empty world publishing into an existing queue.
    #[must_use]
    pub fn with_events(
        config: SimConfig,
        catalog: Catalog,
        resource_multiplier: f32,
        events: EventQueue,
    ) -> Self {
        let economy = Economy::new(
            events.clone(),
            resource_multiplier,
            config.base_population,
            config.population_floor,
        );
        let production = ProductionSystem::new(events.clone())
            .with_max_queue_size(config.production_queue_size)
            .with_default_build_rate(config.default_build_rate);
        let tech = TechTree::from_catalog(&catalog, events.clone());
        Self {
            groups: GroupManager::new(config.formation_params()),
            config,
            tick: 0,
            time: 0.0,
            catalog,
            objects: ObjectManager::new(),
            economy,
            status: StatusEffectManager::with_defaults(),
            behaviors: BehaviorManager::default(),
            production,
            tech,
            damage_types: DamageRegistry::default(),
            paths: Box::new(DirectPathProvider),
            ais: Vec::new(),
            bounds: None,
            ai_clock: 0.0,
            command_sequence: 0,
            events,
        }
    }

    /// Builder: replace the path provider.
    #[must_use]
    pub fn with_path_provider(mut self, provider: Box<dyn PathProvider>) -> Self {
        self.paths = provider;
        self
    }

    /// Builder: playable area in world units, used by scouting.
    #[must_use]
    pub fn with_bounds(mut self, width: f32, height: f32) -> Self {
        self.bounds = Some((width, height));
        self
    }

    // ------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------

    /// Simulation constants.
    #[must_use]
    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    /// Ticks run so far.
    #[must_use]
    pub fn tick(&self) -> u64 {
        self.tick
    }

    /// World time in seconds.
    #[must_use]
    pub fn time(&self) -> f64 {
        self.time
    }

    /// Shared event queue.
    #[must_use]
    pub fn events(&self) -> &EventQueue {
        &self.events
    }

    /// Unit and building templates.
    #[must_use]
    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    /// Entity registry.
    #[must_use]
    pub fn objects(&self) -> &ObjectManager {
        &self.objects
    }

    /// Entity registry, mutably (scenario setup).
    pub fn objects_mut(&mut self) -> &mut ObjectManager {
        &mut self.objects
    }

    /// Player stockpiles.
    #[must_use]
    pub fn economy(&self) -> &Economy {
        &self.economy
    }

    /// Player stockpiles, mutably.
    pub fn economy_mut(&mut self) -> &mut Economy {
        &mut self.economy
    }

    /// Status effects.
    #[must_use]
    pub fn status(&self) -> &StatusEffectManager {
        &self.status
    }

    /// Unit groups.
    #[must_use]
    pub fn groups(&self) -> &GroupManager {
        &self.groups
    }

    /// Behavior trees.
    #[must_use]
    pub fn behaviors(&self) -> &BehaviorManager {
        &self.behaviors
    }

    /// Behavior trees, mutably.
    pub fn behaviors_mut(&mut self) -> &mut BehaviorManager {
        &mut self.behaviors
    }

    /// Production queues.
    #[must_use]
    pub fn production(&self) -> &ProductionSystem {
        &self.production
    }

    /// Research state.
    #[must_use]
    pub fn tech(&self) -> &TechTree {
        &self.tech
    }

    /// Damage type registry.
    #[must_use]
    pub fn damage_types(&self) -> &DamageRegistry {
        &self.damage_types
    }

    /// Damage type registry, mutably.
    pub fn damage_types_mut(&mut self) -> &mut DamageRegistry {
        &mut self.damage_types
    }

    /// Playable area, if known.
    #[must_use]
    pub fn bounds(&self) -> Option<(f32, f32)> {
        self.bounds
    }

    /// Strategic AI for `player`.
    #[must_use]
    pub fn ai(&self, player: PlayerId) -> Option<&StrategicAi> {
        self.ais.iter().find(|ai| ai.player() == player)
    }

    /// Counts for dashboards and the headless runner.
    #[must_use]
    pub fn stats(&self) -> WorldStats {
        WorldStats {
            tick: self.tick,
            time: self.time,
            units: self.objects.unit_count(),
            buildings: self.objects.building_count(),
            resource_nodes: self.objects.nodes().count(),
            groups: self.groups.groups().count(),
            behavior_trees: self.behaviors.len(),
            pending_events: self.events.len(),
            dropped_events: self.events.dropped(),
        }
    }

    // ------------------------------------------------------------------
    // Setup
    // ------------------------------------------------------------------

    /// Register a player.
    pub fn add_player(&mut self, player: Player) {
        tracing::debug!(player = player.id, name = %player.name, is_ai = player.is_ai, "player added");
        self.economy.add_player(player);
    }

    /// Attach a strategic AI, replacing any existing one for the same player.
    pub fn add_ai(&mut self, ai: StrategicAi) {
        self.ais.retain(|existing| existing.player() != ai.player());
        self.ais.push(ai);
    }

    /// Population used and available for `player`.
    #[must_use]
    pub fn population(&self, player: PlayerId) -> PopulationStatus {
        self.economy
            .population(player, self.objects.units(), self.objects.buildings())
    }

    /// Check that `player` has room for a `unit_type`.
    pub fn can_create_unit(&self, player: PlayerId, unit_type: &str) -> Result<()> {
        self.economy.require_player(player)?;
        self.population(player)
            .check(self.catalog.population_cost(unit_type))
    }

    /// Spawn a unit from the catalog, honouring the population cap.
    pub fn spawn_unit(
        &mut self,
        player: PlayerId,
        unit_type: &str,
        position: Point3,
    ) -> Result<EntityId> {
        if !position.is_finite() {
            return Err(GameError::Validation("spawn position is not finite".into()));
        }
        if let Err(err) = self.can_create_unit(player, unit_type) {
            if let GameError::PopulationLimit { current, max, .. } = err {
                self.events.publish(
                    GameEvent::new(EventType::PopulationLimit, self.time, Some(player))
                        .with_data("current", current)
                        .with_data("max", max)
                        .with_message(err.to_string()),
                );
            }
            return Err(err);
        }
        let template = self.catalog.unit(unit_type);
        let id = self
            .objects
            .create_unit(player, unit_type, position, template, self.time);
        if let Some(unit) = self.objects.unit_mut(id) {
            self.tech.apply_researched(player, unit);
        }
        tracing::debug!(player, unit = id, unit_type, "unit spawned");
        self.events.publish(
            GameEvent::new(EventType::UnitCreated, self.time, Some(player))
                .with_data("unit", id)
                .with_data("unit_type", unit_type),
        );
        Ok(id)
    }

    /// Place a building from the catalog (or defaults), optionally finished.
    pub fn spawn_building(
        &mut self,
        player: PlayerId,
        building_type: &str,
        position: Point3,
        built: bool,
    ) -> Result<EntityId> {
        self.economy.require_player(player)?;
        if !position.is_finite() {
            return Err(GameError::Validation("building position is not finite".into()));
        }
        let template = self.catalog.building(building_type);
        let id = self
            .objects
            .create_building(player, building_type, position, template);
        if built {
            if let Some(building) = self.objects.building_mut(id) {
                building.complete(self.time);
            }
        }
        Ok(id)
    }

    /// Place a resource node.
    pub fn spawn_resource_node(
        &mut self,
        resource_type: &str,
        position: Point3,
        amount: i64,
    ) -> Result<EntityId> {
        if amount < 0 {
            return Err(GameError::Validation("resource amount is negative".into()));
        }
        Ok(self
            .objects
            .create_resource_node(resource_type, position, amount))
    }

    // ------------------------------------------------------------------
    // Orders
    // ------------------------------------------------------------------

    /// Queue a command for a unit owned by `player`.
    ///
    /// `Stop` takes effect immediately; everything else is queued and runs
    /// once promoted by the pipeline.
    pub fn issue_command(
        &mut self,
        player: PlayerId,
        unit_id: EntityId,
        mut command: Command,
    ) -> Result<()> {
        command.validate()?;
        let unit = self.objects.require_unit(unit_id)?;
        if unit.player_id != player {
            return Err(GameError::Unauthorized {
                player,
                entity: unit_id,
            });
        }
        if !unit.is_alive() {
            return Err(GameError::DeadUnit(unit_id));
        }
        if command.command_type == CommandType::Produce {
            if let Some(building) = command.target_building {
                let owner = self.objects.require_building(building)?.player_id;
                if owner != player {
                    return Err(GameError::Unauthorized {
                        player,
                        entity: building,
                    });
                }
            }
        }

        self.command_sequence += 1;
        command.sequence = self.command_sequence;
        command.created_at = self.time;
        let unit = self.objects.require_unit_mut(unit_id)?;
        if command.command_type == CommandType::Stop {
            unit.clear_orders();
            unit.stance = Stance::Aggressive;
            unit.set_state(UnitState::Idle);
            tracing::debug!(player, unit = unit_id, "unit stopped");
            return Ok(());
        }
        tracing::debug!(player, unit = unit_id, command = ?command.command_type, priority = ?command.priority, "command queued");
        unit.command_queue.push(command);
        Ok(())
    }

    /// Group units under `player`'s control.
    pub fn create_group(
        &mut self,
        player: PlayerId,
        units: &[EntityId],
        formation: Formation,
    ) -> Result<GroupId> {
        self.groups
            .create_group(&self.objects, player, units, formation)
    }

    /// Send a group to `target`, giving every member a move to its slot.
    pub fn move_group(&mut self, player: PlayerId, group: GroupId, target: Point3) -> Result<()> {
        self.check_group_orders(player, group)?;
        let assignments = self.groups.move_group(player, group, target)?;
        self.dispatch_slots(player, assignments)
    }

    /// Change a group's formation, re-issuing slot moves if it is travelling.
    pub fn set_group_formation(
        &mut self,
        player: PlayerId,
        group: GroupId,
        formation: Formation,
    ) -> Result<()> {
        self.check_group_orders(player, group)?;
        let assignments = self.groups.set_formation(player, group, formation)?;
        self.dispatch_slots(player, assignments)
    }

    /// Dissolve a group.
    pub fn disband_group(&mut self, player: PlayerId, group: GroupId) -> Result<()> {
        self.groups.disband(player, group)
    }

    /// Fail unless `player` owns the group and every member can take orders.
    /// Nothing is mutated, so a rejected group order leaves all members as they were.
    fn check_group_orders(&self, player: PlayerId, group: GroupId) -> Result<()> {
        for unit in self.groups.require_owned(player, group)?.members() {
            let record = self.objects.require_unit(unit)?;
            if record.player_id != player {
                return Err(GameError::Unauthorized {
                    player,
                    entity: unit,
                });
            }
            if !record.is_alive() {
                return Err(GameError::DeadUnit(unit));
            }
        }
        Ok(())
    }

    fn dispatch_slots(&mut self, player: PlayerId, slots: Vec<(EntityId, Point3)>) -> Result<()> {
        for (unit, destination) in slots {
            if let Some(record) = self.objects.unit_mut(unit) {
                record.current_command = None;
                record.command_queue.clear();
                record.path.clear();
                record.path_index = 0;
            }
            self.issue_command(player, unit, Command::move_to(destination))?;
        }
        Ok(())
    }

    /// Queue a unit at a building.
    pub fn queue_production(
        &mut self,
        player: PlayerId,
        building: EntityId,
        unit_type: &str,
    ) -> Result<()> {
        let mut ctx = ProductionContext {
            objects: &mut self.objects,
            economy: &mut self.economy,
            catalog: &self.catalog,
            tech: &self.tech,
        };
        self.production
            .issue(&mut ctx, player, building, unit_type, self.time)
    }

    /// Cancel a building's current production, refunding it.
    pub fn cancel_production(&mut self, player: PlayerId, building: EntityId) -> Result<()> {
        let owner = self.objects.require_building(building)?.player_id;
        if owner != player {
            return Err(GameError::Unauthorized {
                player,
                entity: building,
            });
        }
        self.production
            .cancel(&mut self.economy, player, building, self.time)
            .map(|_| ())
    }

    /// Start researching a tech.
    pub fn start_research(&mut self, player: PlayerId, tech: &str) -> Result<()> {
        self.economy.require_player(player)?;
        self.tech
            .start_research(&mut self.economy, player, tech, self.time)
    }

    /// Cancel research, refunding it.
    pub fn cancel_research(&mut self, player: PlayerId, tech: &str) -> Result<()> {
        self.tech
            .cancel_research(&mut self.economy, player, tech, self.time)
    }

    /// Cost of raising a building one upgrade level: half its build cost
    /// per level already reached plus one.
    #[must_use]
    pub fn upgrade_cost(&self, building: &Building) -> ResourceMap {
        let factor = i64::from(building.upgrade_level) + 1;
        self.catalog
            .building(&building.building_type)
            .map(|data| {
                data.cost
                    .iter()
                    .map(|(name, &amount)| (name.clone(), (amount / 2) * factor))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Pay for and apply one upgrade level.
    pub fn upgrade_building(
        &mut self,
        player: PlayerId,
        building: EntityId,
        cost: Option<ResourceMap>,
    ) -> Result<u32> {
        let record = self.objects.require_building(building)?;
        if record.player_id != player {
            return Err(GameError::Unauthorized {
                player,
                entity: building,
            });
        }
        if !record.is_built() || record.is_destroyed() {
            return Err(GameError::InvalidState(format!(
                "building {building} cannot be upgraded"
            )));
        }
        let cost = cost.unwrap_or_else(|| self.upgrade_cost(record));
        self.economy
            .deduct(player, &cost, &format!("upgrade {building}"), self.time)?;
        let record = self
            .objects
            .building_mut(building)
            .ok_or(GameError::EntityNotFound(building))?;
        record.upgrade_level += 1;
        tracing::info!(player, building, level = record.upgrade_level, "building upgraded");
        Ok(record.upgrade_level)
    }

    /// Give a unit the behavior tree template matching its type.
    pub fn assign_behavior(&mut self, unit: EntityId) -> Result<String> {
        self.behaviors
            .assign_template(&self.objects, unit, self.time)
    }

    // ------------------------------------------------------------------
    // Tick
    // ------------------------------------------------------------------

    /// Advance the world by `dt` seconds.
    ///
    /// Rejects a negative or non-finite `dt` before touching anything. An
    /// internal invariant violation stops the tick at that point.
    pub fn update(&mut self, dt: f64) -> Result<TickReport> {
        if !dt.is_finite() || dt < 0.0 {
            return Err(GameError::Validation(format!("invalid tick length {dt}")));
        }
        self.tick += 1;
        self.time += dt;
        let span = tracing::debug_span!("tick", tick = self.tick);
        let _guard = span.enter();
        let now = self.time;
        let mut report = TickReport {
            tick: self.tick,
            time: now,
            ..TickReport::default()
        };

        #[allow(clippy::cast_possible_truncation)]
        let step = dt as f32;
        self.economy
            .process_generation(self.objects.buildings(), &self.catalog, step, now);

        let status = self.status.update(&mut self.objects, now);
        report.deaths.extend(status.deaths);

        report.deaths.extend(self.run_commands(dt, now));

        self.behaviors.update(&mut self.objects, dt, now);

        report.arrived_groups = self.groups.update(&self.objects, &self.events, now);

        report.completed_buildings = self
            .production
            .advance_construction(&mut self.objects, dt, now);
        let mut ctx = ProductionContext {
            objects: &mut self.objects,
            economy: &mut self.economy,
            catalog: &self.catalog,
            tech: &self.tech,
        };
        report.spawned = self.production.process(&mut ctx, dt, now);
        report.researched = self.tech.process(&mut self.objects, dt, now);

        self.ai_clock += dt;
        if !self.ais.is_empty() && self.ai_clock + 1e-9 >= self.config.ai_interval_secs {
            self.ai_clock = 0.0;
            let mut ais = std::mem::take(&mut self.ais);
            for ai in &mut ais {
                if let Some(decision) = ai.evaluate(self, now) {
                    report.decisions.push((ai.player(), decision));
                }
            }
            self.ais = ais;
        }

        report.culled = self.cull(now);

        self.check_invariants()?;
        if cfg!(debug_assertions) || cfg!(feature = "debug-validation") {
            self.check_consistency()?;
        }
        if cfg!(debug_assertions) {
            tracing::debug!(hash = self.state_hash(), "tick complete");
        }
        Ok(report)
    }

    /// Mark newly dead units, remove those past their grace period, and drop
    /// destroyed buildings and exhausted nodes.
    fn cull(&mut self, now: f64) -> Vec<EntityId> {
        let tick = self.tick;
        let grace = self.config.dead_unit_grace_ticks.max(1);
        let mut expired = Vec::new();
        for unit in self.objects.units_mut() {
            if unit.is_alive() {
                continue;
            }
            match unit.died_at_tick {
                None => unit.died_at_tick = Some(tick),
                Some(died) if tick.saturating_sub(died) >= grace => expired.push(unit.id),
                Some(_) => {}
            }
        }

        for &id in &expired {
            self.status.clear_unit(id);
            self.behaviors.remove(id);
            self.groups.detach(id);
            if let Some(unit) = self.objects.remove_unit(id) {
                tracing::debug!(unit = id, player = unit.player_id, "dead unit removed");
                self.events.publish(
                    GameEvent::new(EventType::UnitDestroyed, now, Some(unit.player_id))
                        .with_data("unit", id)
                        .with_data("unit_type", &unit.unit_type),
                );
            }
        }

        let destroyed: Vec<EntityId> = self
            .objects
            .buildings()
            .filter(|b| b.is_destroyed())
            .map(|b| b.id)
            .collect();
        for id in destroyed {
            if let Some(building) = self.objects.remove_building(id) {
                self.production
                    .clear_building(&mut self.economy, building.player_id, id, now);
                tracing::info!(building = id, player = building.player_id, "building destroyed");
                self.events.publish(
                    GameEvent::new(EventType::BuildingDestroyed, now, Some(building.player_id))
                        .with_data("building", id)
                        .with_data("building_type", &building.building_type),
                );
            }
        }

        let exhausted: Vec<EntityId> = self
            .objects
            .nodes()
            .filter(|n| n.is_depleted())
            .map(|n| n.id)
            .filter(|&node| {
                !self
                    .objects
                    .units()
                    .any(|u| u.is_alive() && u.gather_target == Some(node))
            })
            .collect();
        for id in exhausted {
            self.objects.remove_resource_node(id);
        }
        expired
    }

    /// Verify the state invariants every tick must preserve: health bounds,
    /// non-negative stockpiles and group membership.
    pub fn check_invariants(&self) -> Result<()> {
        for unit in self.objects.units() {
            let health = unit.health();
            if !(0.0..=unit.max_health()).contains(&health) {
                return Err(GameError::Invariant(format!(
                    "unit {} health {health} outside [0, {}]",
                    unit.id,
                    unit.max_health()
                )));
            }
            if (unit.state() == UnitState::Dead) != (health <= 0.0) {
                return Err(GameError::Invariant(format!(
                    "unit {} state {:?} disagrees with health {health}",
                    unit.id,
                    unit.state()
                )));
            }
        }
        for player in self.economy.players() {
            if let Some((name, amount)) = player.resources.iter().find(|(_, amount)| **amount < 0) {
                return Err(GameError::Invariant(format!(
                    "player {} holds {amount} {name}",
                    player.id
                )));
            }
        }
        for group in self.groups.groups() {
            if group.is_empty() {
                return Err(GameError::Invariant(format!("group {} is empty", group.id)));
            }
            if let Some(stray) = group
                .members()
                .into_iter()
                .find(|&unit| self.groups.group_of(unit) != Some(group.id))
            {
                return Err(GameError::Invariant(format!(
                    "unit {stray} listed in group {} but indexed elsewhere",
                    group.id
                )));
            }
        }
        Ok(())
    }

    /// Slower cross-checks between unit state and orders, and building
    /// progress. Run in debug builds and with `debug-validation`.
    pub fn check_consistency(&self) -> Result<()> {
        for unit in self.objects.units() {
            if unit.move_target().is_some() && unit.state() != UnitState::Moving {
                return Err(GameError::Invariant(format!(
                    "unit {} has a move target while {:?}",
                    unit.id,
                    unit.state()
                )));
            }
        }
        for building in self.objects.buildings() {
            if building.is_built() != (building.build_progress() >= 1.0) {
                return Err(GameError::Invariant(format!(
                    "building {} built flag disagrees with progress {}",
                    building.id,
                    building.build_progress()
                )));
            }
        }
        Ok(())
    }

    /// Hash of units, buildings and players for determinism checks.
    #[must_use]
    pub fn state_hash(&self) -> u64 {
        let units: Vec<UnitHashRecord<'_>> = self
            .objects
            .units()
            .map(|u| {
                let p = u.position();
                UnitHashRecord {
                    id: u.id,
                    player: u.player_id,
                    unit_type: &u.unit_type,
                    position: [p.x.to_bits(), p.y.to_bits(), p.z.to_bits()],
                    health: u.health().to_bits(),
                    state: u.state(),
                    carried: &u.carried_resources,
                }
            })
            .collect();
        let buildings: Vec<BuildingHashRecord<'_>> = self
            .objects
            .buildings()
            .map(|b| BuildingHashRecord {
                id: b.id,
                player: b.player_id,
                building_type: &b.building_type,
                health: b.health().to_bits(),
                progress: b.build_progress().to_bits(),
                upgrade_level: b.upgrade_level,
            })
            .collect();
        let players: Vec<PlayerHashRecord<'_>> = self
            .economy
            .players()
            .map(|p| PlayerHashRecord {
                id: p.id,
                resources: &p.resources,
                spent: &p.resources_spent,
                gathered: &p.resources_gathered,
                defeated: p.is_defeated,
            })
            .collect();

        let mut hasher = StableHasher::new();
        hasher.write_le_u64(self.tick);
        match bincode::serialize(&(units, buildings, players)) {
            Ok(bytes) => hasher.write(&bytes),
            Err(err) => tracing::warn!(%err, "state hash encoding failed"),
        }
        hasher.finish()
    }

    /// Snapshot of one unit.
    #[must_use]
    pub fn unit_snapshot(&self, id: EntityId) -> Option<Unit> {
        self.objects.unit(id).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::economy::resource_map;
    use crate::error::ErrorKind;

    fn world() -> World {
        let mut world = World::new(SimConfig::default(), Catalog::skirmish(), 1.0);
        let mut red = Player::new(1, "Red", "skirmish", false);
        red.resources = resource_map(&[("gold", 1000), ("wood", 1000)]);
        world.add_player(red);
        world.add_player(Player::new(2, "Blue", "skirmish", false));
        world
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let config = SimConfig::from_ron("(carry_capacity: 50)").unwrap();
        assert_eq!(config.carry_capacity, 50);
        assert!((config.unit_spacing - 2.0).abs() < f32::EPSILON);
        assert_eq!(config.dead_unit_grace_ticks, 1);
    }

    #[test]
    fn test_issue_command_checks_ownership_and_life() {
        let mut w = world();
        let unit = w.spawn_unit(1, "swordsman", Point3::ZERO).unwrap();
        let err = w
            .issue_command(2, unit, Command::move_to(Point3::ground(5.0, 5.0)))
            .unwrap_err();
        assert!(matches!(err, GameError::Unauthorized { .. }));

        w.objects_mut().unit_mut(unit).unwrap().apply_damage(10_000.0);
        let err = w
            .issue_command(1, unit, Command::move_to(Point3::ground(5.0, 5.0)))
            .unwrap_err();
        assert!(matches!(err, GameError::DeadUnit(_)));
    }

    #[test]
    fn test_population_blocks_spawn() {
        let mut w = world();
        for i in 0..10 {
            w.spawn_unit(1, "worker", Point3::ground(i as f32, 0.0)).unwrap();
        }
        let err = w.spawn_unit(1, "worker", Point3::ZERO).unwrap_err();
        assert!(matches!(err, GameError::PopulationLimit { current: 10, max: 10, .. }));
        assert!(w
            .events()
            .drain()
            .iter()
            .any(|e| e.event_type == EventType::PopulationLimit));
    }

    #[test]
    fn test_dead_units_culled_after_grace() {
        let mut w = world();
        let unit = w.spawn_unit(1, "worker", Point3::ZERO).unwrap();
        w.objects_mut().unit_mut(unit).unwrap().apply_damage(10_000.0);
        let first = w.update(0.1).unwrap();
        assert!(first.culled.is_empty());
        assert!(w.objects().unit(unit).is_some());
        let second = w.update(0.1).unwrap();
        assert_eq!(second.culled, vec![unit]);
        assert!(w.objects().unit(unit).is_none());
        assert!(w
            .events()
            .drain()
            .iter()
            .any(|e| e.event_type == EventType::UnitDestroyed));
    }

    #[test]
    fn test_state_hash_tracks_changes() {
        let mut a = world();
        let mut b = world();
        a.spawn_unit(1, "worker", Point3::ZERO).unwrap();
        b.spawn_unit(1, "worker", Point3::ZERO).unwrap();
        assert_eq!(a.state_hash(), b.state_hash());
        b.objects_mut()
            .unit_mut(1)
            .unwrap()
            .set_position(Point3::ground(1.0, 0.0));
        assert_ne!(a.state_hash(), b.state_hash());
    }

    #[test]
    fn test_state_hash_is_pinned() {
        let empty = World::new(SimConfig::default(), Catalog::skirmish(), 1.0);
        // Tick 0 plus three empty bincode sequences: 32 zero bytes.
        assert_eq!(empty.state_hash(), crate::hash::fnv1a(&[0; 32]));
        assert_eq!(empty.state_hash(), 0x0c82_1078_4d8a_f5a5);
    }

    #[test]
    fn test_invariant_breach_fails_tick() {
        let mut w = world();
        w.economy_mut()
            .player_mut(1)
            .unwrap()
            .resources
            .insert("gold".into(), -5);
        let err = w.update(0.1).unwrap_err();
        assert!(matches!(err, GameError::Invariant(_)));
        assert_eq!(err.kind(), ErrorKind::Internal);
    }

    #[test]
    fn test_rejected_group_move_keeps_member_orders() {
        let mut w = world();
        let a = w.spawn_unit(1, "swordsman", Point3::ZERO).unwrap();
        let b = w.spawn_unit(1, "swordsman", Point3::ground(2.0, 0.0)).unwrap();
        let group = w.create_group(1, &[a, b], Formation::Line).unwrap();
        let patrol = Point3::ground(-5.0, -5.0);
        w.issue_command(1, a, Command::patrol(patrol)).unwrap();
        w.issue_command(1, b, Command::patrol(patrol)).unwrap();
        w.objects_mut().unit_mut(b).unwrap().apply_damage(10_000.0);

        let err = w.move_group(1, group, Point3::ground(20.0, 0.0)).unwrap_err();
        assert!(matches!(err, GameError::DeadUnit(id) if id == b));
        for id in [a, b] {
            let unit = w.objects().unit(id).unwrap();
            assert_eq!(unit.command_queue.len(), 1);
            assert_eq!(unit.command_queue.peek().and_then(|c| c.target), Some(patrol));
        }
        assert!(!w.groups().group(group).unwrap().is_moving);

        let err = w.move_group(2, group, Point3::ground(20.0, 0.0)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Authorization);
        assert_eq!(w.objects().unit(a).unwrap().command_queue.len(), 1);
    }

    #[test]
    fn test_upgrade_building_deducts() {
        let mut w = world();
        let barracks = w
            .spawn_building(1, "barracks", Point3::ZERO, true)
            .unwrap();
        assert_eq!(w.upgrade_building(1, barracks, None).unwrap(), 1);
        let red = w.economy().player(1).unwrap();
        assert_eq!(red.resource("gold"), 925);
        assert_eq!(red.resource("wood"), 950);
    }

    #[test]
    fn test_negative_dt_rejected() {
        let mut w = world();
        assert!(matches!(w.update(-1.0), Err(GameError::Validation(_))));
    }
}
