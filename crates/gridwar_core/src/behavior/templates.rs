//! Named tree builders selected by unit type.

use std::collections::BTreeMap;

use super::leaves::{Action, Condition};
use super::node::Node;

/// Builds a fresh tree.
pub type TreeBuilder = fn() -> Node;

/// Key matched when no builder is registered for a unit type.
pub const WILDCARD: &str = "*";

/// Library of tree builders.
#[derive(Debug, Clone)]
pub struct TemplateLibrary {
    builders: BTreeMap<String, TreeBuilder>,
}

impl Default for TemplateLibrary {
    fn default() -> Self {
        let mut library = Self::empty();
        library.register("worker", worker);
        library.register("soldier", soldier);
        library.register("scout", scout);
        library.register("builder", builder);
        library.register("guard", guard);
        library.register("general", general);
        library.register(WILDCARD, soldier);
        library
    }
}

impl TemplateLibrary {
    /// Library with no builders.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            builders: BTreeMap::new(),
        }
    }

    /// Register or replace a builder.
    pub fn register(&mut self, name: &str, builder: TreeBuilder) {
        self.builders.insert(name.to_string(), builder);
    }

    /// Template name used for `unit_type`: exact match, else the wildcard.
    #[must_use]
    pub fn resolve(&self, unit_type: &str) -> Option<&str> {
        self.builders
            .get_key_value(unit_type)
            .or_else(|| self.builders.get_key_value(WILDCARD))
            .map(|(name, _)| name.as_str())
    }

    /// Build a tree for `unit_type`.
    #[must_use]
    pub fn build(&self, unit_type: &str) -> Option<Node> {
        let name = self.resolve(unit_type)?;
        self.builders.get(name).map(|builder| builder())
    }

    /// Registered template names.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.builders.keys().map(String::as_str)
    }
}

fn idle() -> Node {
    Node::Condition(Condition::IsUnitIdle)
}

fn enemy_in_range(radius: f32, key: &str) -> Node {
    Node::Condition(Condition::IsEnemyInRange {
        radius,
        key: key.to_string(),
    })
}

fn key_set(key: &str) -> Node {
    Node::Condition(Condition::IsBlackboardKeySet {
        key: key.to_string(),
    })
}

/// Harvest the nearest resource whenever idle.
#[must_use]
pub fn worker() -> Node {
    Node::forever(Node::sequence(vec![
        idle(),
        Node::Condition(Condition::IsResourceInRange {
            radius: 30.0,
            key: "resource".into(),
            resource: None,
        }),
        Node::Action(Action::gather("resource")),
    ]))
}

/// Engage anything that comes close.
#[must_use]
pub fn soldier() -> Node {
    Node::forever(Node::sequence(vec![
        idle(),
        enemy_in_range(10.0, "enemy"),
        Node::Action(Action::attack("enemy")),
    ]))
}

/// Report enemies, otherwise walk to the assigned waypoint.
#[must_use]
pub fn scout() -> Node {
    Node::forever(Node::selector(vec![
        Node::sequence(vec![
            enemy_in_range(12.0, "enemy"),
            Node::Action(Action::SetBlackboardValue {
                key: "enemy_spotted".into(),
                value: true.into(),
            }),
            Node::Action(Action::wait(1.0)),
        ]),
        Node::sequence(vec![
            key_set("waypoint"),
            idle(),
            Node::Action(Action::move_to("waypoint", 1.0)),
        ]),
    ]))
}

/// Construct a house wherever `build_site` points.
#[must_use]
pub fn builder() -> Node {
    Node::forever(Node::sequence(vec![
        key_set("build_site"),
        idle(),
        Node::Action(Action::build("build_site", "house")),
        Node::Action(Action::ClearBlackboardValue {
            key: "build_site".into(),
        }),
    ]))
}

/// Fight near the post, otherwise return to it.
#[must_use]
pub fn guard() -> Node {
    Node::forever(Node::selector(vec![
        Node::sequence(vec![
            enemy_in_range(8.0, "enemy"),
            Node::Action(Action::attack("enemy")),
        ]),
        Node::sequence(vec![
            key_set("post"),
            idle(),
            Node::Action(Action::move_to("post", 1.0)),
        ]),
    ]))
}

/// Fall back to the rally point when hurt, otherwise lead attacks.
#[must_use]
pub fn general() -> Node {
    Node::forever(Node::selector(vec![
        Node::sequence(vec![
            Node::Condition(Condition::IsHealthLow { threshold: 0.25 }),
            key_set("rally"),
            Node::Action(Action::move_to("rally", 1.5)),
        ]),
        Node::sequence(vec![
            idle(),
            enemy_in_range(15.0, "enemy"),
            Node::Action(Action::attack("enemy")),
        ]),
    ]))
}
