//! Command execution.
//!
//! Each tick the pipeline visits living units in id order. A unit with no
//! current command promotes the head of its queue (highest priority, then
//! oldest). Idle units with nothing queued consult their stance, which may
//! push an implicit attack or move. The current command's handler then runs
//! once and reports whether the command continues, finished, or failed.
//!
//! Failed commands are dropped, the unit returns to idle, and a
//! [`EventType::CommandFailed`] event records the reason.

use crate::combat::resolve_attack;
use crate::commands::{Command, CommandPriority, CommandType};
use crate::components::{EntityId, Stance, UnitState};
use crate::events::{EventType, GameEvent};
use crate::math::{to_fixed, Point3};
use crate::pathfinding::PathResult;
use crate::world::World;

/// Distance a follower keeps from its leader, in slots.
const FOLLOW_SLOTS: f32 = 1.5;

/// Result of running a handler for one tick.
#[derive(Debug, Clone, PartialEq)]
enum Outcome {
    Continue,
    Done,
    Failed(String),
}

impl World {
    /// Promote and execute commands for every living unit.
    ///
    /// Returns units killed by attacks this tick.
    pub(crate) fn run_commands(&mut self, dt: f64, now: f64) -> Vec<EntityId> {
        let mut deaths = Vec::new();
        for id in self.objects.unit_ids() {
            if !self.objects.unit(id).is_some_and(|u| u.is_alive()) {
                continue;
            }
            if self.status.is_disabled(id) {
                continue;
            }
            self.promote(id);
            let idle = self
                .objects
                .unit(id)
                .is_some_and(|u| u.current_command.is_none());
            if idle {
                self.apply_stance(id);
                self.promote(id);
            }
            let Some(command) = self
                .objects
                .unit(id)
                .and_then(|u| u.current_command.clone())
            else {
                continue;
            };

            let outcome = match command.command_type {
                CommandType::Move => self.execute_move(id, &command, dt),
                CommandType::Attack => self.execute_attack(id, &command, dt, now, &mut deaths),
                CommandType::Gather => self.execute_gather(id, &command, dt, now),
                CommandType::Build => self.execute_build(id, &command, dt, now),
                CommandType::Repair => self.execute_repair(id, &command, dt),
                CommandType::Produce => self.execute_produce(id, &command, now),
                CommandType::Upgrade => self.execute_upgrade(id, &command),
                CommandType::Stop => {
                    if let Some(unit) = self.objects.unit_mut(id) {
                        unit.clear_orders();
                        unit.stance = Stance::Aggressive;
                    }
                    Outcome::Done
                }
                CommandType::Hold
                | CommandType::Patrol
                | CommandType::Follow
                | CommandType::Guard => self.execute_stance(id, &command),
            };

            match outcome {
                Outcome::Continue => {}
                Outcome::Done => self.finish_command(id),
                Outcome::Failed(reason) => self.fail_command(id, &command, &reason, now),
            }
        }
        deaths
    }

    /// Move the head of the queue into `current_command` if the slot is free.
    ///
    /// Implicit commands give way to anything the player queued.
    fn promote(&mut self, id: EntityId) {
        let Some(unit) = self.objects.unit_mut(id) else {
            return;
        };
        let preempt = unit.current_command.as_ref().is_some_and(|c| c.implicit)
            && unit.command_queue.peek().is_some_and(|c| !c.implicit);
        if preempt {
            unit.current_command = None;
            unit.attack_target = None;
            unit.path.clear();
            unit.path_index = 0;
            unit.set_state(UnitState::Idle);
        }
        if unit.current_command.is_none() {
            if let Some(next) = unit.command_queue.pop() {
                tracing::debug!(unit = id, command = ?next.command_type, "command promoted");
                unit.path.clear();
                unit.path_index = 0;
                unit.current_command = Some(next);
            }
        }
    }

    fn finish_command(&mut self, id: EntityId) {
        if let Some(unit) = self.objects.unit_mut(id) {
            unit.current_command = None;
            unit.attack_target = None;
            unit.build_target = None;
            unit.path.clear();
            unit.path_index = 0;
            unit.awaiting_path = false;
            unit.set_state(UnitState::Idle);
        }
    }

    fn fail_command(&mut self, id: EntityId, command: &Command, reason: &str, now: f64) {
        let player = self.objects.owner_of(id);
        tracing::warn!(unit = id, command = ?command.command_type, reason, "command failed");
        self.events.publish(
            GameEvent::new(EventType::CommandFailed, now, player)
                .with_data("unit", id)
                .with_data("command", format!("{:?}", command.command_type))
                .with_message(reason),
        );
        if let Some(unit) = self.objects.unit_mut(id) {
            unit.gather_target = None;
        }
        self.finish_command(id);
    }

    fn push_implicit(&mut self, id: EntityId, mut command: Command) {
        let now = self.time;
        if let Some(unit) = self.objects.unit_mut(id) {
            command.implicit = true;
            command.priority = CommandPriority::Normal;
            command.created_at = now;
            unit.command_queue.push(command);
        }
    }

    // ------------------------------------------------------------------
    // Stances
    // ------------------------------------------------------------------

    /// Idle behaviour: acquire a target, or keep patrolling, guarding or following.
    fn apply_stance(&mut self, id: EntityId) {
        let Some(unit) = self.objects.unit(id) else {
            return;
        };
        if !unit.command_queue.is_empty() {
            return;
        }
        let (player, position, stance) = (unit.player_id, unit.position(), unit.stance);
        let (center, radius) = match stance {
            Stance::Hold | Stance::Aggressive | Stance::Follow { .. } => {
                (position, unit.attack_range)
            }
            Stance::Guard { post, radius } => (post, radius),
            Stance::Patrol { .. } => (position, unit.sight_range),
        };

        if unit.is_combatant() {
            let target = self
                .objects
                .nearest_enemy_unit(player, center, radius)
                .or_else(|| self.objects.nearest_enemy_building(player, center, radius));
            if let Some(target) = target {
                tracing::debug!(unit = id, target, ?stance, "target acquired");
                self.push_implicit(id, Command::attack(target));
                return;
            }
        }

        let epsilon = self.config.arrival_epsilon;
        match stance {
            Stance::Guard { post, .. } if position.distance(post) > epsilon => {
                self.push_implicit(id, Command::move_to(post));
            }
            Stance::Patrol { from, to, outbound } => {
                let mut heading_out = outbound;
                let mut destination = if outbound { to } else { from };
                if position.distance(destination) <= epsilon {
                    heading_out = !outbound;
                    destination = if heading_out { to } else { from };
                }
                if let Some(unit) = self.objects.unit_mut(id) {
                    unit.stance = Stance::Patrol {
                        from,
                        to,
                        outbound: heading_out,
                    };
                }
                self.push_implicit(id, Command::move_to(destination));
            }
            Stance::Follow { leader } => {
                let Some(leader_pos) = self
                    .objects
                    .unit(leader)
                    .filter(|u| u.is_alive())
                    .map(|u| u.position())
                else {
                    if let Some(unit) = self.objects.unit_mut(id) {
                        unit.stance = Stance::Aggressive;
                    }
                    return;
                };
                if position.distance(leader_pos) > self.config.unit_spacing * FOLLOW_SLOTS {
                    self.push_implicit(id, Command::move_to(leader_pos));
                }
            }
            _ => {}
        }
    }

    fn execute_stance(&mut self, id: EntityId, command: &Command) -> Outcome {
        let Some(unit) = self.objects.unit_mut(id) else {
            return Outcome::Failed("unit missing".into());
        };
        let stance = match command.command_type {
            CommandType::Hold => Stance::Hold,
            CommandType::Patrol => match command.target {
                Some(to) => Stance::Patrol {
                    from: unit.position(),
                    to,
                    outbound: true,
                },
                None => return Outcome::Failed("patrol needs a target".into()),
            },
            CommandType::Follow => match command.target_unit {
                Some(leader) if leader != id => Stance::Follow { leader },
                _ => return Outcome::Failed("follow needs another unit".into()),
            },
            CommandType::Guard => {
                let post = command.target.unwrap_or_else(|| unit.position());
                let radius = command
                    .float_parameter("radius")
                    .unwrap_or(unit.sight_range);
                Stance::Guard { post, radius }
            }
            _ => return Outcome::Done,
        };
        tracing::debug!(unit = id, ?stance, "stance set");
        unit.stance = stance;
        Outcome::Done
    }

    // ------------------------------------------------------------------
    // Movement
    // ------------------------------------------------------------------

    fn execute_move(&mut self, id: EntityId, command: &Command, dt: f64) -> Outcome {
        let Some(target) = command.target else {
            return Outcome::Failed("move needs a target".into());
        };
        if !command.implicit {
            if let Some(unit) = self.objects.unit_mut(id) {
                if unit.stance == Stance::Hold || matches!(unit.stance, Stance::Patrol { .. }) {
                    unit.stance = Stance::Aggressive;
                }
            }
        }
        self.travel(id, target, self.config.arrival_epsilon, dt)
    }

    /// Walk toward `target` along a provided path. `Done` once within `reach`
    /// or at the end of the path.
    fn travel(&mut self, id: EntityId, target: Point3, reach: f32, dt: f64) -> Outcome {
        let Some(unit) = self.objects.unit(id) else {
            return Outcome::Failed("unit missing".into());
        };
        if unit.position().distance(target) <= reach {
            return Outcome::Done;
        }
        if unit.stance == Stance::Hold {
            return Outcome::Failed("unit is holding position".into());
        }

        let stale = unit
            .move_target()
            .map_or(true, |current| current.distance(target) > reach.max(0.5));
        if unit.path.is_empty() || stale {
            match self.paths.request_path(unit, target) {
                PathResult::Ready(path) => {
                    let Some(unit) = self.objects.unit_mut(id) else {
                        return Outcome::Failed("unit missing".into());
                    };
                    unit.path = path;
                    unit.path_index = 0;
                    unit.awaiting_path = false;
                    unit.start_moving(target);
                }
                PathResult::Pending => {
                    if let Some(unit) = self.objects.unit_mut(id) {
                        unit.path.clear();
                        unit.path_index = 0;
                        unit.awaiting_path = true;
                        unit.start_moving(target);
                    }
                    return Outcome::Continue;
                }
                PathResult::Failed(reason) => return Outcome::Failed(reason),
            }
        }

        let Some(unit) = self.objects.unit_mut(id) else {
            return Outcome::Failed("unit missing".into());
        };
        #[allow(clippy::cast_possible_truncation)]
        let mut budget = unit.speed * dt as f32;
        while budget > 0.0 && unit.path_index < unit.path.len() {
            let waypoint = unit.path[unit.path_index];
            let position = unit.position();
            let gap = position.distance(waypoint);
            if gap > f32::EPSILON {
                unit.rotation = position.heading_to(waypoint);
            }
            if gap <= budget {
                unit.set_position(waypoint);
                unit.path_index += 1;
                budget -= gap;
            } else {
                unit.set_position(position.step_towards(waypoint, budget));
                budget = 0.0;
            }
        }
        if unit.position().distance(target) <= reach || unit.path_index >= unit.path.len() {
            unit.path.clear();
            unit.path_index = 0;
            Outcome::Done
        } else {
            Outcome::Continue
        }
    }

    /// Take a step toward `target` without consuming the command.
    fn approach(&mut self, id: EntityId, target: Point3, reach: f32, dt: f64) -> Option<String> {
        match self.travel(id, target, reach, dt) {
            Outcome::Failed(reason) => Some(reason),
            Outcome::Continue | Outcome::Done => None,
        }
    }

    // ------------------------------------------------------------------
    // Combat
    // ------------------------------------------------------------------

    fn execute_attack(
        &mut self,
        id: EntityId,
        command: &Command,
        dt: f64,
        now: f64,
        deaths: &mut Vec<EntityId>,
    ) -> Outcome {
        let Some(target) = command.target_unit else {
            return Outcome::Failed("attack needs a target".into());
        };
        if !self.objects.is_target_alive(target) {
            return Outcome::Done;
        }
        let Some(unit) = self.objects.unit(id) else {
            return Outcome::Failed("unit missing".into());
        };
        if self.objects.owner_of(target) == Some(unit.player_id) {
            return Outcome::Failed(format!("cannot attack friendly entity {target}"));
        }
        let Some(target_pos) = self.objects.position_of(target) else {
            return Outcome::Done;
        };
        let position = unit.position();
        let distance = match self.objects.building(target) {
            Some(building) => building.distance_to_edge(position),
            None => position.distance(target_pos),
        };
        if distance > unit.sight_range {
            tracing::debug!(unit = id, target, "attack target out of sight");
            return Outcome::Done;
        }
        if let Stance::Guard { post, radius } = unit.stance {
            if command.implicit && target_pos.distance(post) > radius + unit.attack_range {
                return Outcome::Done;
            }
        }

        if distance > unit.attack_range {
            if unit.stance == Stance::Hold {
                return Outcome::Done;
            }
            if let Some(unit) = self.objects.unit_mut(id) {
                unit.attack_target = Some(target);
            }
            return match self.approach(id, target_pos, 0.0, dt) {
                Some(reason) => Outcome::Failed(reason),
                None => Outcome::Continue,
            };
        }

        let (ready, cooldown) = {
            let cooldown = if unit.attack_speed > 0.0 {
                1.0 / f64::from(unit.attack_speed)
            } else {
                f64::INFINITY
            };
            let ready = unit
                .last_attack_at
                .map_or(true, |last| now - last + 1e-9 >= cooldown);
            (ready, cooldown)
        };
        if let Some(unit) = self.objects.unit_mut(id) {
            unit.path.clear();
            unit.path_index = 0;
            unit.attack_target = Some(target);
            unit.rotation = position.heading_to(target_pos);
            unit.set_state(UnitState::Attacking);
        }
        if !ready || !cooldown.is_finite() {
            return Outcome::Continue;
        }

        match resolve_attack(
            &mut self.objects,
            &self.groups,
            &self.status,
            &self.damage_types,
            id,
            target,
            now,
        ) {
            Ok(report) => {
                if let Some(unit) = self.objects.unit_mut(id) {
                    unit.last_attack_at = Some(now);
                }
                deaths.extend(report.kills().filter(|k| self.objects.unit(*k).is_some()));
                if report.primary.killed {
                    Outcome::Done
                } else {
                    Outcome::Continue
                }
            }
            Err(err) => Outcome::Failed(err.to_string()),
        }
    }

    // ------------------------------------------------------------------
    // Economy
    // ------------------------------------------------------------------

    fn execute_gather(&mut self, id: EntityId, command: &Command, dt: f64, now: f64) -> Outcome {
        let Some(node_id) = command.target_resource else {
            return Outcome::Failed("gather needs a resource node".into());
        };
        let Some(unit) = self.objects.unit(id) else {
            return Outcome::Failed("unit missing".into());
        };
        if !unit.is_worker() {
            return Outcome::Failed(format!("{} cannot gather", unit.unit_type));
        }
        let Some(node) = self.objects.node(node_id).filter(|n| !n.is_depleted()) else {
            self.deposit_cargo(id, now);
            return Outcome::Done;
        };
        let (resource, node_pos) = (node.resource_type.clone(), node.position);
        let rate = unit.gather_rate.get(&resource).copied().unwrap_or(0.0);
        if rate <= 0.0 {
            return Outcome::Failed(format!("{} cannot gather {resource}", unit.unit_type));
        }
        let capacity = self.config.carry_capacity;
        if unit.carried_total() >= capacity {
            self.deposit_cargo(id, now);
            return Outcome::Done;
        }

        if unit.position().distance(node_pos) > self.config.gather_reach {
            if let Some(unit) = self.objects.unit_mut(id) {
                unit.gather_target = Some(node_id);
            }
            return match self.approach(id, node_pos, self.config.gather_reach, dt) {
                Some(reason) => Outcome::Failed(reason),
                None => Outcome::Continue,
            };
        }

        let Some(unit) = self.objects.unit_mut(id) else {
            return Outcome::Failed("unit missing".into());
        };
        unit.gather_target = Some(node_id);
        unit.path.clear();
        unit.set_state(UnitState::Gathering);
        let room = capacity - unit.carried_total();
        let ready = unit
            .accumulate_gather(to_fixed(f64::from(rate) * dt))
            .min(room);

        let mut depleted = false;
        if ready > 0 {
            let Some(node) = self.objects.node_mut(node_id) else {
                return Outcome::Done;
            };
            let extracted = node.extract(ready);
            depleted = node.is_depleted();
            if depleted && !node.depletion_announced {
                node.depletion_announced = true;
                tracing::info!(node = node_id, %resource, "resource node depleted");
                self.events.publish(
                    GameEvent::new(EventType::ResourceDepleted, now, None)
                        .with_data("node", node_id)
                        .with_data("resource", &resource),
                );
            }
            if let Some(unit) = self.objects.unit_mut(id) {
                *unit.carried_resources.entry(resource).or_insert(0) += extracted;
            }
        }

        let full = self
            .objects
            .unit(id)
            .is_some_and(|u| u.carried_total() >= capacity);
        if full || depleted {
            self.deposit_cargo(id, now);
            Outcome::Done
        } else {
            Outcome::Continue
        }
    }

    /// Hand carried resources to the owner's stockpile.
    fn deposit_cargo(&mut self, id: EntityId, now: f64) {
        let Some(unit) = self.objects.unit_mut(id) else {
            return;
        };
        let cargo = std::mem::take(&mut unit.carried_resources);
        let player = unit.player_id;
        unit.reset_gather_progress();
        unit.gather_target = None;
        if let Err(err) = self.economy.gather_deposit(player, &cargo, now) {
            tracing::warn!(unit = id, player, %err, "deposit rejected");
        }
    }

    fn execute_build(&mut self, id: EntityId, command: &Command, dt: f64, now: f64) -> Outcome {
        let Some(unit) = self.objects.unit(id) else {
            return Outcome::Failed("unit missing".into());
        };
        if !unit.is_worker() {
            return Outcome::Failed(format!("{} cannot build", unit.unit_type));
        }
        let player = unit.player_id;

        let building_id = match command.target_building {
            Some(building) => building,
            None => match self.place_building(player, command, now) {
                Ok(building) => {
                    if let Some(current) = self
                        .objects
                        .unit_mut(id)
                        .and_then(|u| u.current_command.as_mut())
                    {
                        current.target_building = Some(building);
                    }
                    building
                }
                Err(reason) => return Outcome::Failed(reason),
            },
        };

        let Some(site) = self.objects.building(building_id) else {
            return Outcome::Failed(format!("building {building_id} no longer exists"));
        };
        if site.player_id != player {
            return Outcome::Failed(format!("building {building_id} is not ours"));
        }
        if site.is_built() {
            return Outcome::Done;
        }
        if site.is_destroyed() {
            return Outcome::Failed(format!("building {building_id} was destroyed"));
        }
        let reach = self.config.build_reach;
        let Some(position) = self.objects.unit(id).map(|u| u.position()) else {
            return Outcome::Failed("unit missing".into());
        };
        if site.distance_to_edge(position) > reach {
            let (center, radius) = (site.position(), site.radius);
            return match self.approach(id, center, radius + reach, dt) {
                Some(reason) => Outcome::Failed(reason),
                None => Outcome::Continue,
            };
        }
        if let Some(unit) = self.objects.unit_mut(id) {
            unit.path.clear();
            unit.build_target = Some(building_id);
            unit.set_state(UnitState::Building);
        }
        Outcome::Continue
    }

    /// Pay for and place a foundation from a `Build` command's type and site.
    fn place_building(
        &mut self,
        player: crate::components::PlayerId,
        command: &Command,
        now: f64,
    ) -> std::result::Result<EntityId, String> {
        let (Some(building_type), Some(site)) = (command.build_type.as_deref(), command.target)
        else {
            return Err("build needs a building or a type and site".into());
        };
        let template = self.catalog.building(building_type);
        let cost = match (&command.cost, template) {
            (Some(cost), _) => cost.clone(),
            (None, Some(data)) => data.cost.clone(),
            (None, None) => return Err(format!("unknown building type {building_type}")),
        };
        self.economy
            .deduct(player, &cost, building_type, now)
            .map_err(|err| err.to_string())?;
        let id = self
            .objects
            .create_building(player, building_type, site, template);
        tracing::info!(player, building = id, %building_type, "foundation placed");
        Ok(id)
    }

    fn execute_repair(&mut self, id: EntityId, command: &Command, dt: f64) -> Outcome {
        let Some(building_id) = command.target_building else {
            return Outcome::Failed("repair needs a building".into());
        };
        let Some(unit) = self.objects.unit(id) else {
            return Outcome::Failed("unit missing".into());
        };
        if !unit.is_worker() {
            return Outcome::Failed(format!("{} cannot repair", unit.unit_type));
        }
        let (player, position) = (unit.player_id, unit.position());
        let Some(building) = self.objects.building(building_id) else {
            return Outcome::Failed(format!("building {building_id} no longer exists"));
        };
        if building.player_id != player {
            return Outcome::Failed(format!("building {building_id} is not ours"));
        }
        if !building.is_built() || building.is_destroyed() {
            return Outcome::Failed(format!("building {building_id} cannot be repaired"));
        }
        if building.health() >= building.max_health() {
            return Outcome::Done;
        }
        let reach = self.config.build_reach;
        if building.distance_to_edge(position) > reach {
            let (center, radius) = (building.position(), building.radius);
            return match self.approach(id, center, radius + reach, dt) {
                Some(reason) => Outcome::Failed(reason),
                None => Outcome::Continue,
            };
        }

        if let Some(unit) = self.objects.unit_mut(id) {
            unit.path.clear();
            unit.build_target = Some(building_id);
            unit.set_state(UnitState::Repairing);
        }
        #[allow(clippy::cast_possible_truncation)]
        let amount = self.config.repair_rate * dt as f32;
        let Some(building) = self.objects.building_mut(building_id) else {
            return Outcome::Done;
        };
        building.repair(amount);
        if building.health() >= building.max_health() {
            Outcome::Done
        } else {
            Outcome::Continue
        }
    }

    fn execute_produce(&mut self, id: EntityId, command: &Command, now: f64) -> Outcome {
        let (Some(building), Some(unit_type)) =
            (command.target_building, command.build_type.as_deref())
        else {
            return Outcome::Failed("produce needs a building and a unit type".into());
        };
        let Some(player) = self.objects.owner_of(id) else {
            return Outcome::Failed("unit missing".into());
        };
        let result = match &command.cost {
            Some(cost) => {
                let duration = command
                    .float_parameter("duration")
                    .map(f64::from)
                    .or_else(|| self.catalog.unit(unit_type).map(|d| f64::from(d.build_time)))
                    .unwrap_or(10.0);
                self.production.enqueue(
                    &self.objects,
                    &mut self.economy,
                    player,
                    building,
                    unit_type,
                    cost.clone(),
                    duration,
                    now,
                )
            }
            None => self.queue_production(player, building, unit_type),
        };
        match result {
            Ok(()) => Outcome::Done,
            Err(err) => Outcome::Failed(err.to_string()),
        }
    }

    fn execute_upgrade(&mut self, id: EntityId, command: &Command) -> Outcome {
        let Some(building) = command.target_building else {
            return Outcome::Failed("upgrade needs a building".into());
        };
        let Some(player) = self.objects.owner_of(id) else {
            return Outcome::Failed("unit missing".into());
        };
        match self.upgrade_building(player, building, command.cost.clone()) {
            Ok(_) => Outcome::Done,
            Err(err) => Outcome::Failed(err.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::commands::{Command, CommandPriority};
    use crate::components::{Player, Stance, UnitState};
    use crate::data::Catalog;
    use crate::economy::resource_map;
    use crate::events::EventType;
    use crate::math::Point3;
    use crate::world::{SimConfig, World};

    fn world() -> World {
        let mut world = World::new(SimConfig::default(), Catalog::skirmish(), 1.0);
        let mut red = Player::new(1, "Red", "skirmish", false);
        red.resources = resource_map(&[("gold", 1000), ("wood", 1000)]);
        world.add_player(red);
        world.add_player(Player::new(2, "Blue", "skirmish", false));
        world
    }

    fn run(world: &mut World, ticks: usize) {
        for _ in 0..ticks {
            world.update(0.1).unwrap();
        }
    }

    #[test]
    fn test_move_arrives_and_idles() {
        let mut w = world();
        let unit = w.spawn_unit(1, "swordsman", Point3::ZERO).unwrap();
        w.issue_command(1, unit, Command::move_to(Point3::ground(3.0, 0.0)))
            .unwrap();
        run(&mut w, 20);
        let u = w.objects().unit(unit).unwrap();
        assert!(u.position().distance(Point3::ground(3.0, 0.0)) <= 0.1);
        assert_eq!(u.state(), UnitState::Idle);
        assert!(u.current_command.is_none());
    }

    #[test]
    fn test_critical_command_promoted_first() {
        let mut w = world();
        let unit = w.spawn_unit(1, "swordsman", Point3::ZERO).unwrap();
        w.issue_command(
            1,
            unit,
            Command::move_to(Point3::ground(-5.0, 0.0)).with_priority(CommandPriority::Low),
        )
        .unwrap();
        w.issue_command(
            1,
            unit,
            Command::move_to(Point3::ground(5.0, 0.0)).with_priority(CommandPriority::Critical),
        )
        .unwrap();
        w.update(0.1).unwrap();
        let u = w.objects().unit(unit).unwrap();
        assert_eq!(
            u.current_command.as_ref().and_then(|c| c.target),
            Some(Point3::ground(5.0, 0.0))
        );
    }

    #[test]
    fn test_stop_clears_everything() {
        let mut w = world();
        let unit = w.spawn_unit(1, "swordsman", Point3::ZERO).unwrap();
        w.issue_command(1, unit, Command::move_to(Point3::ground(50.0, 0.0)))
            .unwrap();
        w.issue_command(1, unit, Command::move_to(Point3::ground(-50.0, 0.0)))
            .unwrap();
        w.update(0.1).unwrap();
        w.issue_command(1, unit, Command::stop()).unwrap();
        let u = w.objects().unit(unit).unwrap();
        assert_eq!(u.state(), UnitState::Idle);
        assert!(u.current_command.is_none());
        assert!(u.command_queue.is_empty());
    }

    #[test]
    fn test_attack_kills_and_consumes() {
        let mut w = world();
        let attacker = w.spawn_unit(1, "swordsman", Point3::ZERO).unwrap();
        let victim = w.spawn_unit(2, "worker", Point3::ground(1.0, 0.0)).unwrap();
        w.issue_command(1, attacker, Command::attack(victim)).unwrap();
        let mut died = false;
        for _ in 0..100 {
            let report = w.update(0.1).unwrap();
            if report.deaths.contains(&victim) {
                died = true;
                break;
            }
        }
        assert!(died);
        w.update(0.1).unwrap();
        let a = w.objects().unit(attacker).unwrap();
        assert!(a.current_command.is_none() || a.current_command.as_ref().unwrap().implicit);
    }

    #[test]
    fn test_attack_respects_cooldown() {
        let mut w = world();
        let attacker = w.spawn_unit(1, "swordsman", Point3::ZERO).unwrap();
        let victim = w.spawn_unit(2, "guard", Point3::ground(1.0, 0.0)).unwrap();
        w.issue_command(1, attacker, Command::attack(victim)).unwrap();
        w.update(0.1).unwrap();
        let after_first = w.objects().unit(victim).unwrap().health();
        for _ in 0..5 {
            w.update(0.1).unwrap();
        }
        assert_eq!(w.objects().unit(victim).unwrap().health(), after_first);
    }

    #[test]
    fn test_gather_fills_and_deposits() {
        let mut w = world();
        let worker = w.spawn_unit(1, "worker", Point3::ZERO).unwrap();
        let node = w
            .spawn_resource_node("gold", Point3::ground(1.0, 0.0), 30)
            .unwrap();
        w.issue_command(1, worker, Command::gather(node)).unwrap();
        run(&mut w, 200);
        let red = w.economy().player(1).unwrap();
        assert_eq!(red.resource("gold"), 1030);
        assert!(w.objects().node(node).is_none());
        assert!(w
            .events()
            .drain()
            .iter()
            .any(|e| e.event_type == EventType::ResourceDepleted));
    }

    #[test]
    fn test_build_places_and_completes() {
        let mut w = world();
        let worker = w.spawn_unit(1, "worker", Point3::ZERO).unwrap();
        w.issue_command(1, worker, Command::build_new("house", Point3::ground(3.0, 0.0)))
            .unwrap();
        run(&mut w, 200);
        let house = w
            .objects()
            .buildings_of(1)
            .find(|b| b.building_type == "house")
            .unwrap();
        assert!(house.is_built());
        assert_eq!(w.economy().player(1).unwrap().resource("wood"), 950);
        assert_eq!(w.objects().unit(worker).unwrap().state(), UnitState::Idle);
    }

    #[test]
    fn test_hold_stance_does_not_chase() {
        let mut w = world();
        let guard = w.spawn_unit(1, "swordsman", Point3::ZERO).unwrap();
        w.issue_command(1, guard, Command::hold()).unwrap();
        w.update(0.1).unwrap();
        let _enemy = w.spawn_unit(2, "worker", Point3::ground(5.0, 0.0)).unwrap();
        run(&mut w, 10);
        let u = w.objects().unit(guard).unwrap();
        assert_eq!(u.stance, Stance::Hold);
        assert_eq!(u.position(), Point3::ZERO);
    }

    #[test]
    fn test_guard_acquires_enemy_in_radius() {
        let mut w = world();
        let guard = w.spawn_unit(1, "swordsman", Point3::ZERO).unwrap();
        w.issue_command(1, guard, Command::guard(Point3::ZERO, 6.0))
            .unwrap();
        w.update(0.1).unwrap();
        let enemy = w.spawn_unit(2, "worker", Point3::ground(4.0, 0.0)).unwrap();
        w.update(0.1).unwrap();
        let u = w.objects().unit(guard).unwrap();
        let current = u.current_command.as_ref().unwrap();
        assert!(current.implicit);
        assert_eq!(current.target_unit, Some(enemy));
    }

    #[test]
    fn test_failed_command_publishes_event() {
        let mut w = world();
        let soldier = w.spawn_unit(1, "swordsman", Point3::ZERO).unwrap();
        let node = w
            .spawn_resource_node("gold", Point3::ground(1.0, 0.0), 100)
            .unwrap();
        w.events().drain();
        w.issue_command(1, soldier, Command::gather(node)).unwrap();
        w.update(0.1).unwrap();
        let events = w.events().drain();
        assert!(events.iter().any(|e| e.event_type == EventType::CommandFailed));
        assert_eq!(w.objects().unit(soldier).unwrap().state(), UnitState::Idle);
    }
}
