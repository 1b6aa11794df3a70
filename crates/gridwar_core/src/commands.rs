//! Unit commands and the per-unit command queue.
//!
//! A [`Command`] is a validated order. Each unit owns a [`CommandQueue`]
//! kept sorted by priority (highest first), then creation time, then
//! insertion order, so equal-priority commands run FIFO.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::components::EntityId;
use crate::economy::ResourceMap;
use crate::error::{GameError, Result};
use crate::math::Point3;

/// Kind of order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CommandType {
    /// Walk to `target`.
    Move,
    /// Attack `target_unit` (a unit or building).
    Attack,
    /// Harvest `target_resource`.
    Gather,
    /// Construct `target_building`, or place `build_type` at `target` first.
    Build,
    /// Restore health of `target_building`.
    Repair,
    /// Drop every order.
    Stop,
    /// Stay put, engaging only targets already in range.
    Hold,
    /// Walk between the current position and `target`.
    Patrol,
    /// Stay near `target_unit`.
    Follow,
    /// Defend the area around `target`.
    Guard,
    /// Queue `build_type` in `target_building`'s production queue.
    Produce,
    /// Raise `target_building`'s upgrade level.
    Upgrade,
}

/// Queue ordering class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub enum CommandPriority {
    /// Background work.
    Low,
    /// Player orders.
    #[default]
    Normal,
    /// Urgent orders.
    High,
    /// Jumps every other queued order.
    Critical,
}

/// An order for a single unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Command {
    /// What to do.
    pub command_type: CommandType,
    /// Destination or placement point.
    pub target: Option<Point3>,
    /// Unit (or building, for attacks) to act on.
    pub target_unit: Option<EntityId>,
    /// Resource node to gather from.
    pub target_resource: Option<EntityId>,
    /// Building to construct, repair, produce from or upgrade.
    pub target_building: Option<EntityId>,
    /// Building type to place (Build) or unit type to train (Produce).
    pub build_type: Option<String>,
    /// Explicit cost overriding the catalog.
    pub cost: Option<ResourceMap>,
    /// Queue ordering class.
    pub priority: CommandPriority,
    /// World time the command entered the queue.
    pub created_at: f64,
    /// Insertion counter breaking ties between equal timestamps.
    pub sequence: u64,
    /// Free-form extras (`"radius"` for Guard, `"duration"` for Produce...).
    pub parameters: BTreeMap<String, String>,
    /// Generated by a stance rather than issued by a player.
    #[serde(default)]
    pub implicit: bool,
}

impl Command {
    /// Blank command of the given type.
    #[must_use]
    pub fn new(command_type: CommandType) -> Self {
        Self {
            command_type,
            target: None,
            target_unit: None,
            target_resource: None,
            target_building: None,
            build_type: None,
            cost: None,
            priority: CommandPriority::Normal,
            created_at: 0.0,
            sequence: 0,
            parameters: BTreeMap::new(),
            implicit: false,
        }
    }

    /// Move to a point.
    #[must_use]
    pub fn move_to(target: Point3) -> Self {
        Self::new(CommandType::Move).with_target(target)
    }

    /// Attack an entity.
    #[must_use]
    pub fn attack(target: EntityId) -> Self {
        Self::new(CommandType::Attack).with_target_unit(target)
    }

    /// Gather from a node.
    #[must_use]
    pub fn gather(node: EntityId) -> Self {
        let mut cmd = Self::new(CommandType::Gather);
        cmd.target_resource = Some(node);
        cmd
    }

    /// Help construct an existing building.
    #[must_use]
    pub fn build(building: EntityId) -> Self {
        Self::new(CommandType::Build).with_target_building(building)
    }

    /// Place a new building of `building_type` at `site`, then construct it.
    #[must_use]
    pub fn build_new(building_type: &str, site: Point3) -> Self {
        let mut cmd = Self::new(CommandType::Build).with_target(site);
        cmd.build_type = Some(building_type.to_string());
        cmd
    }

    /// Repair a building.
    #[must_use]
    pub fn repair(building: EntityId) -> Self {
        Self::new(CommandType::Repair).with_target_building(building)
    }

    /// Stop everything.
    #[must_use]
    pub fn stop() -> Self {
        Self::new(CommandType::Stop)
    }

    /// Hold position.
    #[must_use]
    pub fn hold() -> Self {
        Self::new(CommandType::Hold)
    }

    /// Patrol to a point and back.
    #[must_use]
    pub fn patrol(target: Point3) -> Self {
        Self::new(CommandType::Patrol).with_target(target)
    }

    /// Follow a unit.
    #[must_use]
    pub fn follow(leader: EntityId) -> Self {
        Self::new(CommandType::Follow).with_target_unit(leader)
    }

    /// Guard a point.
    #[must_use]
    pub fn guard(post: Point3, radius: f32) -> Self {
        Self::new(CommandType::Guard)
            .with_target(post)
            .with_parameter("radius", radius)
    }

    /// Train a unit at a building.
    #[must_use]
    pub fn produce(building: EntityId, unit_type: &str) -> Self {
        let mut cmd = Self::new(CommandType::Produce).with_target_building(building);
        cmd.build_type = Some(unit_type.to_string());
        cmd
    }

    /// Upgrade a building.
    #[must_use]
    pub fn upgrade(building: EntityId) -> Self {
        Self::new(CommandType::Upgrade).with_target_building(building)
    }

    /// Builder: set the point target.
    #[must_use]
    pub fn with_target(mut self, target: Point3) -> Self {
        self.target = Some(target);
        self
    }

    /// Builder: set the entity target.
    #[must_use]
    pub fn with_target_unit(mut self, target: EntityId) -> Self {
        self.target_unit = Some(target);
        self
    }

    /// Builder: set the building target.
    #[must_use]
    pub fn with_target_building(mut self, building: EntityId) -> Self {
        self.target_building = Some(building);
        self
    }

    /// Builder: set priority.
    #[must_use]
    pub fn with_priority(mut self, priority: CommandPriority) -> Self {
        self.priority = priority;
        self
    }

    /// Builder: set an explicit cost.
    #[must_use]
    pub fn with_cost(mut self, cost: ResourceMap) -> Self {
        self.cost = Some(cost);
        self
    }

    /// Builder: add a parameter.
    #[must_use]
    pub fn with_parameter(mut self, key: &str, value: impl ToString) -> Self {
        self.parameters.insert(key.to_string(), value.to_string());
        self
    }

    /// Parameter parsed as a float.
    #[must_use]
    pub fn float_parameter(&self, key: &str) -> Option<f32> {
        self.parameters.get(key).and_then(|v| v.parse().ok())
    }

    /// Check that the fields this command type needs are present.
    pub fn validate(&self) -> Result<()> {
        let missing = |field: &str| {
            Err(GameError::Validation(format!(
                "{:?} command requires {field}",
                self.command_type
            )))
        };
        if let Some(target) = self.target {
            if !target.is_finite() {
                return Err(GameError::Validation("command target is not finite".into()));
            }
        }
        match self.command_type {
            CommandType::Move | CommandType::Patrol if self.target.is_none() => missing("target"),
            CommandType::Attack | CommandType::Follow if self.target_unit.is_none() => {
                missing("target_unit")
            }
            CommandType::Gather if self.target_resource.is_none() => missing("target_resource"),
            CommandType::Build
                if self.target_building.is_none()
                    && (self.build_type.is_none() || self.target.is_none()) =>
            {
                missing("target_building or build_type with target")
            }
            CommandType::Repair | CommandType::Upgrade if self.target_building.is_none() => {
                missing("target_building")
            }
            CommandType::Produce
                if self.target_building.is_none() || self.build_type.is_none() =>
            {
                missing("target_building and build_type")
            }
            _ => Ok(()),
        }
    }

    /// Queue ordering key: higher priority first, then older, then earlier insertion.
    fn sort_key(&self) -> (std::cmp::Reverse<CommandPriority>, f64, u64) {
        (
            std::cmp::Reverse(self.priority),
            self.created_at,
            self.sequence,
        )
    }
}

/// Priority-ordered queue of commands for a unit.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct CommandQueue {
    /// Pending commands, next first.
    commands: Vec<Command>,
}

impl CommandQueue {
    /// Create an empty command queue.
    #[must_use]
    pub fn new() -> Self {
        Self {
            commands: Vec::new(),
        }
    }

    /// Insert a command at its priority position.
    pub fn push(&mut self, command: Command) {
        let key = command.sort_key();
        let index = self.commands.partition_point(|c| {
            c.sort_key()
                .partial_cmp(&key)
                .is_some_and(|ord| ord != std::cmp::Ordering::Greater)
        });
        self.commands.insert(index, command);
    }

    /// Next command to run.
    #[must_use]
    pub fn peek(&self) -> Option<&Command> {
        self.commands.first()
    }

    /// Remove and return the next command.
    pub fn pop(&mut self) -> Option<Command> {
        if self.commands.is_empty() {
            None
        } else {
            Some(self.commands.remove(0))
        }
    }

    /// Clear all commands.
    pub fn clear(&mut self) {
        self.commands.clear();
    }

    /// Check if the queue is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    /// Get the number of queued commands.
    #[must_use]
    pub fn len(&self) -> usize {
        self.commands.len()
    }

    /// Iterate in execution order.
    pub fn iter(&self) -> impl Iterator<Item = &Command> {
        self.commands.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn queued(priority: CommandPriority, created_at: f64, sequence: u64) -> Command {
        let mut cmd = Command::stop().with_priority(priority);
        cmd.created_at = created_at;
        cmd.sequence = sequence;
        cmd
    }

    #[test]
    fn test_priority_then_fifo() {
        let mut queue = CommandQueue::new();
        queue.push(queued(CommandPriority::Low, 0.0, 1));
        queue.push(queued(CommandPriority::Normal, 0.0, 2));
        queue.push(queued(CommandPriority::Normal, 0.0, 3));
        queue.push(queued(CommandPriority::Critical, 0.0, 4));

        let order: Vec<u64> = std::iter::from_fn(|| queue.pop()).map(|c| c.sequence).collect();
        assert_eq!(order, vec![4, 2, 3, 1]);
    }

    #[test]
    fn test_older_command_first_within_priority() {
        let mut queue = CommandQueue::new();
        queue.push(queued(CommandPriority::High, 2.0, 1));
        queue.push(queued(CommandPriority::High, 1.0, 2));
        assert_eq!(queue.peek().map(|c| c.sequence), Some(2));
    }

    #[test]
    fn test_validate_requires_targets() {
        assert!(Command::new(CommandType::Move).validate().is_err());
        assert!(Command::move_to(Point3::ZERO).validate().is_ok());
        assert!(Command::new(CommandType::Attack).validate().is_err());
        assert!(Command::new(CommandType::Gather).validate().is_err());
        assert!(Command::new(CommandType::Build).validate().is_err());
        assert!(Command::build_new("house", Point3::ZERO).validate().is_ok());
        assert!(Command::new(CommandType::Produce)
            .with_target_building(3)
            .validate()
            .is_err());
        assert!(Command::stop().validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_non_finite_target() {
        let cmd = Command::move_to(Point3::new(f32::NAN, 0.0, 0.0));
        assert!(matches!(cmd.validate(), Err(GameError::Validation(_))));
    }

    #[test]
    fn test_guard_radius_parameter() {
        let cmd = Command::guard(Point3::ZERO, 6.5);
        assert_eq!(cmd.float_parameter("radius"), Some(6.5));
    }
}
