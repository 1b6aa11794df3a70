//! Per-unit tree ownership.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::blackboard::Blackboard;
use super::node::{BehaviorContext, Node, Status};
use super::templates::TemplateLibrary;
use crate::components::{EntityId, Unit};
use crate::error::{GameError, Result};
use crate::objects::ObjectManager;

/// A tree bound to one unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BehaviorTree {
    /// Template or caller-supplied name.
    pub name: String,
    /// Root node.
    pub root: Node,
    /// Tree memory.
    pub blackboard: Blackboard,
    /// World time the tree was assigned.
    pub start_time: f64,
    /// Result of the most recent tick.
    pub last_status: Status,
}

impl BehaviorTree {
    /// Wrap a root node.
    #[must_use]
    pub fn new(name: &str, root: Node) -> Self {
        Self {
            name: name.to_string(),
            root,
            blackboard: Blackboard::new(),
            start_time: 0.0,
            last_status: Status::Invalid,
        }
    }

    /// Tick once for `unit`.
    pub fn tick(
        &mut self,
        objects: &mut ObjectManager,
        unit: EntityId,
        delta_time: f64,
        now: f64,
    ) -> Status {
        let mut ctx = BehaviorContext {
            unit,
            objects,
            blackboard: &mut self.blackboard,
            delta_time,
            now,
            start_time: self.start_time,
        };
        self.last_status = self.root.tick(&mut ctx);
        self.last_status
    }
}

/// Owns at most one tree per unit.
#[derive(Debug, Clone, Default)]
pub struct BehaviorManager {
    trees: BTreeMap<EntityId, BehaviorTree>,
    templates: TemplateLibrary,
}

impl BehaviorManager {
    /// Manager drawing templates from `templates`.
    #[must_use]
    pub fn new(templates: TemplateLibrary) -> Self {
        Self {
            trees: BTreeMap::new(),
            templates,
        }
    }

    /// The template library.
    #[must_use]
    pub fn templates(&self) -> &TemplateLibrary {
        &self.templates
    }

    /// Mutable template library.
    pub fn templates_mut(&mut self) -> &mut TemplateLibrary {
        &mut self.templates
    }

    /// Attach a tree to a unit, replacing any previous one.
    pub fn assign(&mut self, unit: EntityId, mut tree: BehaviorTree, now: f64) {
        tree.start_time = now;
        tree.root.reset();
        tree.last_status = Status::Invalid;
        self.trees.insert(unit, tree);
    }

    /// Attach the template matching the unit's type. Returns the template name.
    pub fn assign_template(
        &mut self,
        objects: &ObjectManager,
        unit: EntityId,
        now: f64,
    ) -> Result<String> {
        let record = objects.require_unit(unit)?;
        if !record.is_alive() {
            return Err(GameError::DeadUnit(unit));
        }
        let name = self
            .templates
            .resolve(&record.unit_type)
            .ok_or_else(|| GameError::UnknownType {
                kind: "behavior template",
                name: record.unit_type.clone(),
            })?
            .to_string();
        let root = self
            .templates
            .build(&record.unit_type)
            .ok_or_else(|| GameError::UnknownType {
                kind: "behavior template",
                name: record.unit_type.clone(),
            })?;
        self.assign(unit, BehaviorTree::new(&name, root), now);
        tracing::debug!(unit, template = %name, "behavior tree assigned");
        Ok(name)
    }

    /// Detach and return a unit's tree.
    pub fn remove(&mut self, unit: EntityId) -> Option<BehaviorTree> {
        self.trees.remove(&unit)
    }

    /// A unit's tree.
    #[must_use]
    pub fn tree(&self, unit: EntityId) -> Option<&BehaviorTree> {
        self.trees.get(&unit)
    }

    /// A unit's tree, mutably (for seeding the blackboard).
    pub fn tree_mut(&mut self, unit: EntityId) -> Option<&mut BehaviorTree> {
        self.trees.get_mut(&unit)
    }

    /// Number of trees.
    #[must_use]
    pub fn len(&self) -> usize {
        self.trees.len()
    }

    /// No trees.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.trees.is_empty()
    }

    /// Tick every tree in unit id order.
    ///
    /// Trees of dead or missing units are stopped and removed before they
    /// tick; trees that finish are removed afterwards. Returns the removed
    /// `(unit, final status)` pairs.
    pub fn update(
        &mut self,
        objects: &mut ObjectManager,
        delta_time: f64,
        now: f64,
    ) -> Vec<(EntityId, Status)> {
        let mut finished = Vec::new();
        self.trees.retain(|&unit, tree| {
            if !objects.unit(unit).is_some_and(Unit::is_alive) {
                tree.root.reset();
                finished.push((unit, Status::Invalid));
                return false;
            }
            let status = tree.tick(objects, unit, delta_time, now);
            if status == Status::Running {
                true
            } else {
                tracing::debug!(unit, tree = %tree.name, ?status, "behavior tree finished");
                finished.push((unit, status));
                false
            }
        });
        finished
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::Point3;

    #[test]
    fn test_finished_trees_are_removed() {
        let mut objects = ObjectManager::new();
        let a = objects.create_unit(1, "soldier", Point3::ZERO, None, 0.0);
        let b = objects.create_unit(1, "soldier", Point3::ZERO, None, 0.0);
        let mut manager = BehaviorManager::default();
        manager.assign(a, BehaviorTree::new("done", Node::constant(Status::Success)), 0.0);
        manager.assign(b, BehaviorTree::new("busy", Node::constant(Status::Running)), 0.0);
        let finished = manager.update(&mut objects, 0.1, 0.1);
        assert_eq!(finished, vec![(a, Status::Success)]);
        assert!(manager.tree(b).is_some());
    }

    #[test]
    fn test_dead_units_lose_their_tree() {
        let mut objects = ObjectManager::new();
        let unit = objects.create_unit(1, "soldier", Point3::ZERO, None, 0.0);
        let mut manager = BehaviorManager::default();
        manager.assign_template(&objects, unit, 0.0).unwrap();
        objects.unit_mut(unit).unwrap().apply_damage(1000.0);
        manager.update(&mut objects, 0.1, 0.1);
        assert!(manager.is_empty());
    }

    #[test]
    fn test_soldier_template_attacks_nearby_enemy() {
        let mut objects = ObjectManager::new();
        let unit = objects.create_unit(1, "soldier", Point3::ZERO, None, 0.0);
        let enemy = objects.create_unit(2, "soldier", Point3::ground(5.0, 0.0), None, 0.0);
        let mut manager = BehaviorManager::default();
        assert_eq!(manager.assign_template(&objects, unit, 0.0).unwrap(), "soldier");
        manager.update(&mut objects, 0.1, 0.1);
        let queued = objects.unit(unit).unwrap().command_queue.peek().cloned();
        assert_eq!(queued.and_then(|c| c.target_unit), Some(enemy));
        assert_eq!(manager.tree(unit).map(|t| t.last_status), Some(Status::Running));
    }
}
