//! Leaf conditions and actions.
//!
//! Actions never act on the world directly: they push commands onto the
//! unit's queue, which the command pipeline picks up on the next tick, and
//! then watch the unit until the order is done.

use serde::{Deserialize, Serialize};

use super::blackboard::BlackboardValue;
use super::node::{BehaviorContext, Status};
use crate::commands::Command;
use crate::components::{Unit, UnitState};
use crate::math::Point3;

/// A leaf that tests the unit or the blackboard.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Condition {
    /// Health fraction below `threshold`.
    IsHealthLow {
        /// Fraction of max health.
        threshold: f32,
    },
    /// Carrying at least `threshold` resources in total.
    IsCarryingResources {
        /// Minimum total carried.
        threshold: i64,
    },
    /// No current or queued command.
    IsUnitIdle,
    /// An enemy unit is within `radius`; the nearest is written to `key`.
    IsEnemyInRange {
        /// Search radius.
        radius: f32,
        /// Blackboard key receiving the enemy id.
        key: String,
    },
    /// A non-depleted node is within `radius`; the nearest is written to `key`.
    IsResourceInRange {
        /// Search radius.
        radius: f32,
        /// Blackboard key receiving the node id.
        key: String,
        /// Only nodes of this resource.
        #[serde(default)]
        resource: Option<String>,
    },
    /// `key` is present on the blackboard.
    IsBlackboardKeySet {
        /// Key to test.
        key: String,
    },
}

fn is_idle(unit: &Unit) -> bool {
    unit.state() == UnitState::Idle
        && unit.current_command.is_none()
        && unit.command_queue.is_empty()
}

fn status_of(ok: bool) -> Status {
    if ok {
        Status::Success
    } else {
        Status::Failure
    }
}

impl Condition {
    /// Evaluate for the context's unit.
    pub fn evaluate(&self, ctx: &mut BehaviorContext<'_>) -> Status {
        let Some(unit) = ctx.objects.unit(ctx.unit) else {
            return Status::Invalid;
        };
        match self {
            Self::IsHealthLow { threshold } => status_of(unit.health_fraction() < *threshold),
            Self::IsCarryingResources { threshold } => {
                status_of(unit.carried_total() >= *threshold)
            }
            Self::IsUnitIdle => status_of(is_idle(unit)),
            Self::IsEnemyInRange { radius, key } => {
                match ctx
                    .objects
                    .nearest_enemy_unit(unit.player_id, unit.position(), *radius)
                {
                    Some(enemy) => {
                        ctx.blackboard.set_entity(key, enemy);
                        Status::Success
                    }
                    None => {
                        ctx.blackboard.remove(key);
                        Status::Failure
                    }
                }
            }
            Self::IsResourceInRange {
                radius,
                key,
                resource,
            } => match ctx
                .objects
                .nearest_node(unit.position(), *radius, resource.as_deref())
            {
                Some(node) => {
                    ctx.blackboard.set_entity(key, node);
                    Status::Success
                }
                None => {
                    ctx.blackboard.remove(key);
                    Status::Failure
                }
            },
            Self::IsBlackboardKeySet { key } => status_of(ctx.blackboard.contains(key)),
        }
    }
}

/// A leaf that does something.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Action {
    /// Walk to the point (or entity) stored under `key`.
    MoveToPosition {
        /// Blackboard key holding a point or entity.
        key: String,
        /// Distance counted as arrived.
        arrive_epsilon: f32,
        /// A move order is outstanding.
        #[serde(default)]
        issued: bool,
    },
    /// Attack the entity stored under `key` until it dies.
    AttackTarget {
        /// Blackboard key holding the target id.
        key: String,
        /// An attack order is outstanding.
        #[serde(default)]
        issued: bool,
    },
    /// Harvest the node stored under `key` until the unit goes idle.
    GatherResource {
        /// Blackboard key holding the node id.
        key: String,
        /// A gather order is outstanding.
        #[serde(default)]
        issued: bool,
    },
    /// Place and construct `building_type` at the point stored under `key`.
    BuildStructure {
        /// Blackboard key holding the site.
        key: String,
        /// Building template.
        building_type: String,
        /// A build order is outstanding.
        #[serde(default)]
        issued: bool,
    },
    /// Write a value.
    SetBlackboardValue {
        /// Key.
        key: String,
        /// Value.
        value: BlackboardValue,
    },
    /// Remove a key.
    ClearBlackboardValue {
        /// Key.
        key: String,
    },
    /// Running until `duration` seconds have passed since the first tick.
    Wait {
        /// Seconds to wait.
        duration: f64,
        /// World time of the first tick.
        #[serde(default)]
        started_at: Option<f64>,
    },
    /// Always returns the wrapped status.
    Constant(Status),
}

impl Action {
    /// Move to a blackboard point.
    #[must_use]
    pub fn move_to(key: &str, arrive_epsilon: f32) -> Self {
        Self::MoveToPosition {
            key: key.to_string(),
            arrive_epsilon,
            issued: false,
        }
    }

    /// Attack a blackboard entity.
    #[must_use]
    pub fn attack(key: &str) -> Self {
        Self::AttackTarget {
            key: key.to_string(),
            issued: false,
        }
    }

    /// Gather from a blackboard node.
    #[must_use]
    pub fn gather(key: &str) -> Self {
        Self::GatherResource {
            key: key.to_string(),
            issued: false,
        }
    }

    /// Build at a blackboard point.
    #[must_use]
    pub fn build(key: &str, building_type: &str) -> Self {
        Self::BuildStructure {
            key: key.to_string(),
            building_type: building_type.to_string(),
            issued: false,
        }
    }

    /// Wait `duration` seconds.
    #[must_use]
    pub fn wait(duration: f64) -> Self {
        Self::Wait {
            duration,
            started_at: None,
        }
    }

    /// Forget any outstanding order or timer.
    pub fn reset(&mut self) {
        match self {
            Self::MoveToPosition { issued, .. }
            | Self::AttackTarget { issued, .. }
            | Self::GatherResource { issued, .. }
            | Self::BuildStructure { issued, .. } => *issued = false,
            Self::Wait { started_at, .. } => *started_at = None,
            Self::SetBlackboardValue { .. } | Self::ClearBlackboardValue { .. } | Self::Constant(_) => {}
        }
    }

    /// Execute for the context's unit.
    pub fn execute(&mut self, ctx: &mut BehaviorContext<'_>) -> Status {
        if !ctx.objects.unit(ctx.unit).is_some_and(Unit::is_alive) {
            self.reset();
            return Status::Invalid;
        }
        let status = match self {
            Self::MoveToPosition {
                key,
                arrive_epsilon,
                issued,
            } => execute_move(ctx, key, *arrive_epsilon, issued),
            Self::AttackTarget { key, issued } => execute_attack(ctx, key, issued),
            Self::GatherResource { key, issued } => execute_gather(ctx, key, issued),
            Self::BuildStructure {
                key,
                building_type,
                issued,
            } => execute_build(ctx, key, building_type, issued),
            Self::SetBlackboardValue { key, value } => {
                ctx.blackboard.set(key, value.clone());
                Status::Success
            }
            Self::ClearBlackboardValue { key } => {
                ctx.blackboard.remove(key);
                Status::Success
            }
            Self::Wait {
                duration,
                started_at,
            } => {
                let start = *started_at.get_or_insert(ctx.now);
                if ctx.now - start + 1e-9 >= *duration {
                    Status::Success
                } else {
                    Status::Running
                }
            }
            Self::Constant(status) => *status,
        };
        if status.is_terminal() {
            self.reset();
        }
        status
    }
}

fn target_point(ctx: &BehaviorContext<'_>, key: &str) -> Option<Point3> {
    ctx.blackboard
        .get_point(key)
        .or_else(|| ctx.blackboard.get_entity(key).and_then(|id| ctx.objects.position_of(id)))
}

fn issue(ctx: &mut BehaviorContext<'_>, mut command: Command) {
    command.created_at = ctx.now;
    if let Some(unit) = ctx.objects.unit_mut(ctx.unit) {
        tracing::trace!(unit = ctx.unit, command = ?command.command_type, "behavior tree issued command");
        unit.command_queue.push(command);
    }
}

fn unit_is_idle(ctx: &BehaviorContext<'_>) -> bool {
    ctx.objects.unit(ctx.unit).is_some_and(is_idle)
}

fn execute_move(ctx: &mut BehaviorContext<'_>, key: &str, epsilon: f32, issued: &mut bool) -> Status {
    let Some(destination) = target_point(ctx, key) else {
        return Status::Failure;
    };
    let arrived = ctx
        .objects
        .unit(ctx.unit)
        .is_some_and(|u| u.position().flatten().distance(destination.flatten()) <= epsilon);
    if arrived {
        return Status::Success;
    }
    if !*issued {
        issue(ctx, Command::move_to(destination));
        *issued = true;
        return Status::Running;
    }
    if unit_is_idle(ctx) {
        // The order ended short of the destination.
        return Status::Failure;
    }
    Status::Running
}

fn execute_attack(ctx: &mut BehaviorContext<'_>, key: &str, issued: &mut bool) -> Status {
    let Some(target) = ctx.blackboard.get_entity(key) else {
        return Status::Failure;
    };
    if !ctx.objects.is_target_alive(target) {
        return status_of(*issued);
    }
    if !*issued {
        issue(ctx, Command::attack(target));
        *issued = true;
        return Status::Running;
    }
    if unit_is_idle(ctx) {
        return Status::Failure;
    }
    Status::Running
}

fn execute_gather(ctx: &mut BehaviorContext<'_>, key: &str, issued: &mut bool) -> Status {
    if !*issued {
        let Some(node) = ctx.blackboard.get_entity(key) else {
            return Status::Failure;
        };
        if ctx.objects.node(node).map_or(true, |n| n.is_depleted()) {
            return Status::Failure;
        }
        issue(ctx, Command::gather(node));
        *issued = true;
        return Status::Running;
    }
    if unit_is_idle(ctx) {
        Status::Success
    } else {
        Status::Running
    }
}

fn execute_build(
    ctx: &mut BehaviorContext<'_>,
    key: &str,
    building_type: &str,
    issued: &mut bool,
) -> Status {
    let Some(site) = target_point(ctx, key) else {
        return Status::Failure;
    };
    if !*issued {
        issue(ctx, Command::build_new(building_type, site));
        *issued = true;
        return Status::Running;
    }
    if !unit_is_idle(ctx) {
        return Status::Running;
    }
    let Some(player) = ctx.objects.unit(ctx.unit).map(|u| u.player_id) else {
        return Status::Invalid;
    };
    let finished = ctx.objects.buildings_of(player).any(|b| {
        b.building_type == building_type
            && b.is_built()
            && b.position().flatten().distance(site.flatten()) < 0.5
    });
    status_of(finished)
}
