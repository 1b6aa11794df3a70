//! Proptest strategies for world inputs.

use gridwar_core::commands::{Command, CommandPriority};
use gridwar_core::components::EntityId;
use gridwar_core::formations::Formation;
use gridwar_core::math::Point3;
use proptest::prelude::*;

/// A ground point inside a `size` x `size` field.
pub fn ground_point(size: f32) -> impl Strategy<Value = Point3> {
    (0.0..size, 0.0..size).prop_map(|(x, z)| Point3::ground(x, z))
}

/// Any command priority.
pub fn priority() -> impl Strategy<Value = CommandPriority> {
    prop_oneof![
        Just(CommandPriority::Low),
        Just(CommandPriority::Normal),
        Just(CommandPriority::High),
        Just(CommandPriority::Critical),
    ]
}

/// Any formation.
pub fn formation() -> impl Strategy<Value = Formation> {
    prop_oneof![
        Just(Formation::Line),
        Just(Formation::Column),
        Just(Formation::Wedge),
        Just(Formation::Box),
        Just(Formation::Circle),
        Just(Formation::Scatter),
    ]
}

/// A unit command aimed at entities with ids in `1..=max_id` and points in
/// a `size` field. The command may fail validation in the world (a friendly
/// attack target, a missing node), which is part of what it exercises.
pub fn command(max_id: EntityId, size: f32) -> impl Strategy<Value = Command> {
    let id = 1..=max_id.max(1);
    let unit_command = prop_oneof![
        ground_point(size).prop_map(Command::move_to),
        id.clone().prop_map(Command::attack),
        id.clone().prop_map(Command::gather),
        id.clone().prop_map(Command::follow),
        ground_point(size).prop_map(Command::patrol),
        (ground_point(size), 1.0_f32..10.0).prop_map(|(post, r)| Command::guard(post, r)),
        Just(Command::hold()),
        Just(Command::stop()),
    ];
    (unit_command, priority()).prop_map(|(c, p)| c.with_priority(p))
}

/// A list of `(tick, unit, command)` orders for a scripted run.
pub fn command_script(
    ticks: u64,
    max_id: EntityId,
    size: f32,
) -> impl Strategy<Value = Vec<(u64, EntityId, Command)>> {
    prop::collection::vec(
        (0..ticks.max(1), 1..=max_id.max(1), command(max_id, size)),
        0..24,
    )
}
