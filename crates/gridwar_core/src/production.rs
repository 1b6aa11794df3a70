//! Construction progress and per-building unit production.
//!
//! Each building owns a [`ProductionQueue`]: one order in progress plus
//! waiting orders. Cost is deducted when an order is queued and refunded in
//! full when it is cancelled. A finished order spawns its unit next to the
//! building only if the owner has population room; otherwise the order
//! stalls until room frees up.

use std::collections::{BTreeMap, VecDeque};

use serde::{Deserialize, Serialize};

use crate::commands::Command;
use crate::components::{EntityId, PlayerId, UnitState};
use crate::data::Catalog;
use crate::economy::{Economy, ResourceMap};
use crate::error::{GameError, Result};
use crate::events::{EventQueue, EventType, GameEvent};
use crate::math::Point3;
use crate::objects::ObjectManager;
use crate::tech::TechTree;

/// Offset from the building centre where new units appear.
pub const DEFAULT_SPAWN_OFFSET: f32 = 2.0;

/// Construction rate per worker when a building declares no build time.
pub const DEFAULT_BUILD_RATE: f32 = 0.1;

/// One unit waiting to be produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductionOrder {
    /// Unit type to spawn.
    pub unit_type: String,
    /// What was paid, refunded on cancel.
    pub cost: ResourceMap,
    /// Seconds of production required.
    pub duration: f64,
    /// Seconds done so far.
    pub elapsed: f64,
    /// World time the order was queued.
    pub queued_at: f64,
}

impl ProductionOrder {
    /// Create an order with no progress.
    #[must_use]
    pub fn new(unit_type: &str, cost: ResourceMap, duration: f64, queued_at: f64) -> Self {
        Self {
            unit_type: unit_type.to_string(),
            cost,
            duration: duration.max(0.0),
            elapsed: 0.0,
            queued_at,
        }
    }

    /// Whether production time has elapsed.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.elapsed + 1e-9 >= self.duration
    }

    /// Progress in `[0, 1]`.
    #[must_use]
    pub fn fraction(&self) -> f64 {
        if self.duration <= 0.0 {
            1.0
        } else {
            (self.elapsed / self.duration).min(1.0)
        }
    }
}

/// A building's current order and backlog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductionQueue {
    current: Option<ProductionOrder>,
    queue: VecDeque<ProductionOrder>,
    max_size: usize,
    stalled: bool,
}

impl Default for ProductionQueue {
    fn default() -> Self {
        Self::with_max_size(Self::DEFAULT_MAX_QUEUE_SIZE)
    }
}

impl ProductionQueue {
    /// Default capacity, counting the order in progress.
    pub const DEFAULT_MAX_QUEUE_SIZE: usize = 5;

    /// Empty queue holding at most `max_size` orders.
    #[must_use]
    pub fn with_max_size(max_size: usize) -> Self {
        Self {
            current: None,
            queue: VecDeque::new(),
            max_size,
            stalled: false,
        }
    }

    /// Orders held, including the one in progress.
    #[must_use]
    pub fn len(&self) -> usize {
        self.queue.len() + usize::from(self.current.is_some())
    }

    /// Nothing queued or in progress.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// No room for another order.
    #[must_use]
    pub fn is_full(&self) -> bool {
        self.len() >= self.max_size
    }

    /// The order in progress.
    #[must_use]
    pub fn current(&self) -> Option<&ProductionOrder> {
        self.current.as_ref()
    }

    /// Waiting orders, front first.
    pub fn pending(&self) -> impl Iterator<Item = &ProductionOrder> {
        self.queue.iter()
    }

    /// Current order is finished but blocked on population.
    #[must_use]
    pub fn is_stalled(&self) -> bool {
        self.stalled
    }

    fn push(&mut self, order: ProductionOrder) {
        if self.current.is_none() {
            self.current = Some(order);
        } else {
            self.queue.push_back(order);
        }
    }

    fn promote(&mut self) {
        self.current = self.queue.pop_front();
        self.stalled = false;
    }

    fn drain(&mut self) -> Vec<ProductionOrder> {
        self.stalled = false;
        self.current.take().into_iter().chain(self.queue.drain(..)).collect()
    }
}

/// Everything the production system reads or writes during a tick.
#[derive(Debug)]
pub struct ProductionContext<'a> {
    /// Entity registry.
    pub objects: &'a mut ObjectManager,
    /// Player stockpiles.
    pub economy: &'a mut Economy,
    /// Unit and building templates.
    pub catalog: &'a Catalog,
    /// Research state for spawn modifiers.
    pub tech: &'a TechTree,
}

/// Per-building production queues plus construction progress.
#[derive(Debug, Clone)]
pub struct ProductionSystem {
    queues: BTreeMap<EntityId, ProductionQueue>,
    max_queue_size: usize,
    default_build_rate: f32,
    events: EventQueue,
}

impl ProductionSystem {
    /// Create a system publishing into `events`.
    #[must_use]
    pub fn new(events: EventQueue) -> Self {
        Self {
            queues: BTreeMap::new(),
            max_queue_size: ProductionQueue::DEFAULT_MAX_QUEUE_SIZE,
            default_build_rate: DEFAULT_BUILD_RATE,
            events,
        }
    }

    /// Builder: queue capacity for buildings seen from now on.
    #[must_use]
    pub fn with_max_queue_size(mut self, size: usize) -> Self {
        self.max_queue_size = size.max(1);
        self
    }

    /// Builder: per-worker construction rate for buildings without a build time.
    #[must_use]
    pub fn with_default_build_rate(mut self, rate: f32) -> Self {
        self.default_build_rate = rate.max(0.0);
        self
    }

    /// A building's queue.
    #[must_use]
    pub fn queue(&self, building: EntityId) -> Option<&ProductionQueue> {
        self.queues.get(&building)
    }

    /// Buildings with anything queued.
    pub fn busy_buildings(&self) -> impl Iterator<Item = EntityId> + '_ {
        self.queues
            .iter()
            .filter(|(_, q)| !q.is_empty())
            .map(|(&id, _)| id)
    }

    // ------------------------------------------------------------------
    // Orders
    // ------------------------------------------------------------------

    /// Queue `unit_type` at `building`, taking cost, build time and
    /// eligibility from the catalog.
    pub fn issue(
        &mut self,
        ctx: &mut ProductionContext<'_>,
        player: PlayerId,
        building: EntityId,
        unit_type: &str,
        now: f64,
    ) -> Result<()> {
        let record = ctx.objects.require_building(building)?;
        let template = ctx.catalog.require_unit(unit_type)?;
        if let Some(data) = ctx.catalog.building(&record.building_type) {
            if !data.can_produce(unit_type) {
                return Err(GameError::Validation(format!(
                    "{} cannot produce {unit_type}",
                    record.building_type
                )));
            }
        }
        if let Some(missing) = template
            .tech_required
            .iter()
            .find(|t| !ctx.tech.is_researched(player, t))
        {
            return Err(GameError::TechRequirementNotMet(format!(
                "{unit_type} requires {missing}"
            )));
        }
        let cost = template.cost.clone();
        let duration = f64::from(template.build_time);
        self.enqueue(ctx.objects, ctx.economy, player, building, unit_type, cost, duration, now)
    }

    /// Queue an order with an explicit cost and duration.
    ///
    /// The building must exist, belong to `player` and be built; the cost is
    /// deducted atomically before the order is stored.
    #[allow(clippy::too_many_arguments)]
    pub fn enqueue(
        &mut self,
        objects: &ObjectManager,
        economy: &mut Economy,
        player: PlayerId,
        building: EntityId,
        unit_type: &str,
        cost: ResourceMap,
        duration: f64,
        now: f64,
    ) -> Result<()> {
        let record = objects.require_building(building)?;
        if record.player_id != player {
            return Err(GameError::Unauthorized {
                player,
                entity: building,
            });
        }
        if !record.is_built() || record.is_destroyed() {
            return Err(GameError::InvalidState(format!(
                "building {building} is not ready to produce"
            )));
        }
        let max_size = self.max_queue_size;
        let queue = self
            .queues
            .entry(building)
            .or_insert_with(|| ProductionQueue::with_max_size(max_size));
        if queue.is_full() {
            return Err(GameError::QueueFull(building));
        }
        economy.deduct(player, &cost, &format!("produce {unit_type}"), now)?;
        queue.push(ProductionOrder::new(unit_type, cost, duration, now));

        tracing::debug!(player, building, unit_type, duration, "production queued");
        self.events.publish(
            GameEvent::new(EventType::ProductionStarted, now, Some(player))
                .with_data("building", building)
                .with_data("unit_type", unit_type),
        );
        Ok(())
    }

    /// Cancel the order in progress and refund it in full.
    pub fn cancel(
        &mut self,
        economy: &mut Economy,
        player: PlayerId,
        building: EntityId,
        now: f64,
    ) -> Result<ProductionOrder> {
        let queue = self
            .queues
            .get_mut(&building)
            .filter(|q| q.current.is_some())
            .ok_or_else(|| GameError::InvalidState(format!("building {building} is not producing")))?;
        let order = queue
            .current
            .take()
            .ok_or_else(|| GameError::InvalidState(format!("building {building} is not producing")))?;
        queue.promote();
        economy.refund(player, &order.cost, &format!("cancel {}", order.unit_type), now)?;

        tracing::debug!(player, building, unit_type = %order.unit_type, "production cancelled");
        self.events.publish(
            GameEvent::new(EventType::ProductionCancelled, now, Some(player))
                .with_data("building", building)
                .with_data("unit_type", &order.unit_type),
        );
        Ok(order)
    }

    /// Drop every order of a destroyed building, refunding the owner.
    pub fn clear_building(
        &mut self,
        economy: &mut Economy,
        player: PlayerId,
        building: EntityId,
        now: f64,
    ) {
        let Some(mut queue) = self.queues.remove(&building) else {
            return;
        };
        for order in queue.drain() {
            if let Err(err) = economy.refund(player, &order.cost, "building lost", now) {
                tracing::warn!(player, building, %err, "refund failed");
            }
        }
    }

    // ------------------------------------------------------------------
    // Tick
    // ------------------------------------------------------------------

    /// Advance construction of every building with workers assigned.
    ///
    /// Each worker in state `Building` adds `dt / build_time` progress to its
    /// target; several workers on one site add up. Returns the buildings that
    /// finished this tick.
    pub fn advance_construction(
        &self,
        objects: &mut ObjectManager,
        dt: f64,
        now: f64,
    ) -> Vec<EntityId> {
        let mut effort: BTreeMap<EntityId, f32> = BTreeMap::new();
        for unit in objects.units() {
            if !unit.is_alive() || unit.state() != UnitState::Building {
                continue;
            }
            let Some(target) = unit.build_target else {
                continue;
            };
            let Some(site) = objects.building(target) else {
                continue;
            };
            if site.is_built() || site.is_destroyed() || site.player_id != unit.player_id {
                continue;
            }
            let rate = if site.build_time > 0.0 {
                1.0 / site.build_time
            } else {
                self.default_build_rate
            };
            #[allow(clippy::cast_possible_truncation)]
            let step = rate * dt as f32;
            *effort.entry(target).or_insert(0.0) += step;
        }

        let mut completed = Vec::new();
        for (id, amount) in effort {
            let Some(site) = objects.building_mut(id) else {
                continue;
            };
            if site.advance_construction(amount, now) {
                let (player, building_type) = (site.player_id, site.building_type.clone());
                tracing::info!(player, building = id, %building_type, "construction complete");
                self.events.publish(
                    GameEvent::new(EventType::BuildingCompleted, now, Some(player))
                        .with_data("building", id)
                        .with_data("building_type", &building_type),
                );
                completed.push(id);
            }
        }
        completed
    }

    /// Advance every queue by `dt` and spawn finished units.
    ///
    /// Returns the ids of spawned units.
    pub fn process(&mut self, ctx: &mut ProductionContext<'_>, dt: f64, now: f64) -> Vec<EntityId> {
        let mut spawned = Vec::new();
        let buildings: Vec<EntityId> = self.busy_buildings().collect();
        for building in buildings {
            let Some((player, position, rally)) = ctx
                .objects
                .building(building)
                .filter(|b| b.is_built() && !b.is_destroyed())
                .map(|b| (b.player_id, b.position(), b.rally_point))
            else {
                continue;
            };
            let Some(queue) = self.queues.get_mut(&building) else {
                continue;
            };
            let Some(order) = queue.current.as_mut() else {
                queue.promote();
                continue;
            };
            order.elapsed += dt;
            if !order.is_complete() {
                continue;
            }

            let unit_type = order.unit_type.clone();
            let required = ctx.catalog.population_cost(&unit_type);
            let population = ctx
                .economy
                .population(player, ctx.objects.units(), ctx.objects.buildings());
            if let Err(err) = population.check(required) {
                if !queue.stalled {
                    queue.stalled = true;
                    tracing::warn!(player, building, %unit_type, %err, "production waiting for housing");
                    self.events.publish(
                        GameEvent::new(EventType::PopulationLimit, now, Some(player))
                            .with_data("building", building)
                            .with_data("current", population.current)
                            .with_data("max", population.max)
                            .with_message(err.to_string()),
                    );
                }
                continue;
            }

            let spawn_at = position + Point3::ground(DEFAULT_SPAWN_OFFSET, DEFAULT_SPAWN_OFFSET);
            let template = ctx.catalog.unit(&unit_type);
            let id = ctx.objects.create_unit(player, &unit_type, spawn_at, template, now);
            if let Some(unit) = ctx.objects.unit_mut(id) {
                ctx.tech.apply_researched(player, unit);
                if let Some(rally) = rally {
                    let mut command = Command::move_to(rally);
                    command.created_at = now;
                    unit.command_queue.push(command);
                }
            }
            queue.promote();

            tracing::info!(player, building, unit = id, %unit_type, "unit produced");
            self.events.publish(
                GameEvent::new(EventType::UnitCreated, now, Some(player))
                    .with_data("unit", id)
                    .with_data("unit_type", &unit_type)
                    .with_data("building", building),
            );
            spawned.push(id);
        }
        spawned
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::Player;
    use crate::economy::resource_map;

    struct Fixture {
        objects: ObjectManager,
        economy: Economy,
        catalog: Catalog,
        tech: TechTree,
        events: EventQueue,
        system: ProductionSystem,
        barracks: EntityId,
    }

    impl Fixture {
        fn new(gold: i64) -> Self {
            let events = EventQueue::new(256);
            let catalog = Catalog::skirmish();
            let mut economy = Economy::new(events.clone(), 1.0, 10, 5);
            let mut player = Player::new(1, "Red", "skirmish", false);
            player.resources = resource_map(&[("gold", gold), ("wood", 1000)]);
            economy.add_player(player);
            let mut objects = ObjectManager::new();
            let barracks = objects.create_building(
                1,
                "barracks",
                Point3::ground(10.0, 10.0),
                catalog.building("barracks"),
            );
            if let Some(b) = objects.building_mut(barracks) {
                b.complete(0.0);
            }
            Self {
                objects,
                economy,
                tech: TechTree::from_catalog(&catalog, events.clone()),
                catalog,
                system: ProductionSystem::new(events.clone()),
                events,
                barracks,
            }
        }

        fn issue(&mut self, unit_type: &str) -> Result<()> {
            let mut ctx = ProductionContext {
                objects: &mut self.objects,
                economy: &mut self.economy,
                catalog: &self.catalog,
                tech: &self.tech,
            };
            self.system.issue(&mut ctx, 1, self.barracks, unit_type, 0.0)
        }

        fn run(&mut self, seconds: f64) -> Vec<EntityId> {
            let mut spawned = Vec::new();
            let mut now = 0.0;
            while now < seconds {
                now += 0.5;
                let mut ctx = ProductionContext {
                    objects: &mut self.objects,
                    economy: &mut self.economy,
                    catalog: &self.catalog,
                    tech: &self.tech,
                };
                spawned.extend(self.system.process(&mut ctx, 0.5, now));
            }
            spawned
        }
    }

    #[test]
    fn test_queue_capacity() {
        let mut fx = Fixture::new(10_000);
        for _ in 0..ProductionQueue::DEFAULT_MAX_QUEUE_SIZE {
            fx.issue("archer").unwrap();
        }
        let before = fx.economy.player(1).unwrap().resource("gold");
        assert!(matches!(fx.issue("archer"), Err(GameError::QueueFull(_))));
        assert_eq!(fx.economy.player(1).unwrap().resource("gold"), before);
    }

    #[test]
    fn test_produces_in_order_at_building() {
        let mut fx = Fixture::new(1000);
        fx.issue("swordsman").unwrap();
        fx.issue("archer").unwrap();
        let spawned = fx.run(60.0);
        assert_eq!(spawned.len(), 2);
        let first = fx.objects.unit(spawned[0]).unwrap();
        assert_eq!(first.unit_type, "swordsman");
        assert_eq!(first.player_id, 1);
        assert!(first.position().distance(Point3::ground(12.0, 12.0)) < 1e-4);
        assert!(fx.system.queue(fx.barracks).unwrap().is_empty());
    }

    #[test]
    fn test_cancel_refunds_in_full() {
        let mut fx = Fixture::new(1000);
        fx.issue("swordsman").unwrap();
        fx.issue("archer").unwrap();
        let order = fx.system.cancel(&mut fx.economy, 1, fx.barracks, 1.0).unwrap();
        assert_eq!(order.unit_type, "swordsman");
        assert_eq!(fx.economy.player(1).unwrap().resource("gold"), 960);
        let queue = fx.system.queue(fx.barracks).unwrap();
        assert_eq!(queue.current().map(|o| o.unit_type.as_str()), Some("archer"));
    }

    #[test]
    fn test_rejects_wrong_building_and_unbuilt() {
        let mut fx = Fixture::new(1000);
        assert!(matches!(fx.issue("worker"), Err(GameError::Validation(_))));
        assert!(matches!(fx.issue("dragon"), Err(GameError::UnknownType { .. })));

        let site = fx.objects.create_building(1, "barracks", Point3::ZERO, None);
        let err = fx
            .system
            .enqueue(&fx.objects, &mut fx.economy, 1, site, "archer", ResourceMap::new(), 1.0, 0.0)
            .unwrap_err();
        assert!(matches!(err, GameError::InvalidState(_)));
        let err = fx
            .system
            .enqueue(&fx.objects, &mut fx.economy, 2, fx.barracks, "archer", ResourceMap::new(), 1.0, 0.0)
            .unwrap_err();
        assert!(matches!(err, GameError::Unauthorized { .. }));
    }

    #[test]
    fn test_population_cap_stalls_once() {
        let mut fx = Fixture::new(1000);
        for _ in 0..10 {
            fx.objects.create_unit(1, "worker", Point3::ZERO, None, 0.0);
        }
        fx.issue("archer").unwrap();
        assert!(fx.run(40.0).is_empty());
        assert!(fx.system.queue(fx.barracks).unwrap().is_stalled());
        let limits = fx
            .events
            .drain()
            .into_iter()
            .filter(|e| e.event_type == EventType::PopulationLimit)
            .count();
        assert_eq!(limits, 1);

        let victim = fx.objects.unit_ids()[0];
        fx.objects.unit_mut(victim).unwrap().apply_damage(1000.0);
        assert_eq!(fx.run(1.0).len(), 1);
    }

    #[test]
    fn test_rally_point_issues_move() {
        let mut fx = Fixture::new(1000);
        fx.objects.building_mut(fx.barracks).unwrap().rally_point = Some(Point3::ground(30.0, 30.0));
        fx.issue("archer").unwrap();
        let spawned = fx.run(40.0);
        let unit = fx.objects.unit(spawned[0]).unwrap();
        assert_eq!(
            unit.command_queue.peek().and_then(|c| c.target),
            Some(Point3::ground(30.0, 30.0))
        );
    }

    #[test]
    fn test_construction_sums_workers() {
        let events = EventQueue::new(16);
        let system = ProductionSystem::new(events.clone());
        let mut objects = ObjectManager::new();
        let site = objects.create_building(1, "farm", Point3::ZERO, None);
        objects.building_mut(site).unwrap().build_time = 10.0;
        for x in [1.0, -1.0] {
            let worker = objects.create_unit(1, "worker", Point3::ground(x, 0.0), None, 0.0);
            let unit = objects.unit_mut(worker).unwrap();
            unit.build_target = Some(site);
            unit.set_state(UnitState::Building);
        }
        let mut done = Vec::new();
        for tick in 1..=60 {
            done.extend(system.advance_construction(&mut objects, 0.1, f64::from(tick) * 0.1));
        }
        assert_eq!(done, vec![site]);
        assert!(objects.building(site).unwrap().is_built());
        let completions = events
            .drain()
            .into_iter()
            .filter(|e| e.event_type == EventType::BuildingCompleted)
            .count();
        assert_eq!(completions, 1);
    }
}
