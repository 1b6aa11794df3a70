//! Entity registry.
//!
//! [`ObjectManager`] owns every unit, building and resource node. Ids come
//! from one counter starting at 1 and are never reused. Storage is ordered
//! by id so iteration is deterministic.

use std::collections::{BTreeMap, BTreeSet};

use crate::components::{Building, EntityId, PlayerId, ResourceNode, Unit};
use crate::data::{BuildingData, UnitData};
use crate::error::{GameError, Result};
use crate::math::Point3;

/// Owns all world entities and per-player indexes.
#[derive(Debug, Clone)]
pub struct ObjectManager {
    units: BTreeMap<EntityId, Unit>,
    buildings: BTreeMap<EntityId, Building>,
    nodes: BTreeMap<EntityId, ResourceNode>,
    units_by_player: BTreeMap<PlayerId, BTreeSet<EntityId>>,
    buildings_by_player: BTreeMap<PlayerId, BTreeSet<EntityId>>,
    next_id: EntityId,
}

impl Default for ObjectManager {
    fn default() -> Self {
        Self::new()
    }
}

impl ObjectManager {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            units: BTreeMap::new(),
            buildings: BTreeMap::new(),
            nodes: BTreeMap::new(),
            units_by_player: BTreeMap::new(),
            buildings_by_player: BTreeMap::new(),
            next_id: 1,
        }
    }

    fn allocate_id(&mut self) -> EntityId {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    // ------------------------------------------------------------------
    // Creation
    // ------------------------------------------------------------------

    /// Insert a unit built by `make` from a freshly allocated id.
    pub fn insert_unit(&mut self, make: impl FnOnce(EntityId) -> Unit) -> EntityId {
        let id = self.allocate_id();
        let mut unit = make(id);
        unit.id = id;
        self.units_by_player
            .entry(unit.player_id)
            .or_default()
            .insert(id);
        self.units.insert(id, unit);
        id
    }

    /// Insert a building built by `make` from a freshly allocated id.
    pub fn insert_building(&mut self, make: impl FnOnce(EntityId) -> Building) -> EntityId {
        let id = self.allocate_id();
        let mut building = make(id);
        building.id = id;
        self.buildings_by_player
            .entry(building.player_id)
            .or_default()
            .insert(id);
        self.buildings.insert(id, building);
        id
    }

    /// Create a unit from an optional template.
    pub fn create_unit(
        &mut self,
        player: PlayerId,
        unit_type: &str,
        position: Point3,
        template: Option<&UnitData>,
        now: f64,
    ) -> EntityId {
        self.insert_unit(|id| {
            let mut unit = match template {
                Some(template) => Unit::from_template(id, player, template, position),
                None => Unit::new(id, player, unit_type, position),
            };
            unit.created_at = now;
            unit
        })
    }

    /// Create an unfinished building from an optional template.
    pub fn create_building(
        &mut self,
        player: PlayerId,
        building_type: &str,
        position: Point3,
        template: Option<&BuildingData>,
    ) -> EntityId {
        self.insert_building(|id| match template {
            Some(template) => Building::from_template(id, player, template, position),
            None => Building::new(id, player, building_type, position),
        })
    }

    /// Create a resource node.
    pub fn create_resource_node(
        &mut self,
        resource_type: &str,
        position: Point3,
        amount: i64,
    ) -> EntityId {
        let id = self.allocate_id();
        self.nodes
            .insert(id, ResourceNode::new(id, resource_type, position, amount));
        id
    }

    // ------------------------------------------------------------------
    // Lookup
    // ------------------------------------------------------------------

    /// Get a unit.
    #[must_use]
    pub fn unit(&self, id: EntityId) -> Option<&Unit> {
        self.units.get(&id)
    }

    /// Get a unit mutably.
    pub fn unit_mut(&mut self, id: EntityId) -> Option<&mut Unit> {
        self.units.get_mut(&id)
    }

    /// Get a unit, failing with `EntityNotFound`.
    pub fn require_unit(&self, id: EntityId) -> Result<&Unit> {
        self.unit(id).ok_or(GameError::EntityNotFound(id))
    }

    /// Get a unit mutably, failing with `EntityNotFound`.
    pub fn require_unit_mut(&mut self, id: EntityId) -> Result<&mut Unit> {
        self.unit_mut(id).ok_or(GameError::EntityNotFound(id))
    }

    /// Get a building.
    #[must_use]
    pub fn building(&self, id: EntityId) -> Option<&Building> {
        self.buildings.get(&id)
    }

    /// Get a building mutably.
    pub fn building_mut(&mut self, id: EntityId) -> Option<&mut Building> {
        self.buildings.get_mut(&id)
    }

    /// Get a building, failing with `EntityNotFound`.
    pub fn require_building(&self, id: EntityId) -> Result<&Building> {
        self.building(id).ok_or(GameError::EntityNotFound(id))
    }

    /// Get a resource node.
    #[must_use]
    pub fn node(&self, id: EntityId) -> Option<&ResourceNode> {
        self.nodes.get(&id)
    }

    /// Get a resource node mutably.
    pub fn node_mut(&mut self, id: EntityId) -> Option<&mut ResourceNode> {
        self.nodes.get_mut(&id)
    }

    /// Owner of a unit or building.
    #[must_use]
    pub fn owner_of(&self, id: EntityId) -> Option<PlayerId> {
        self.unit(id)
            .map(|u| u.player_id)
            .or_else(|| self.building(id).map(|b| b.player_id))
    }

    /// Position of any entity.
    #[must_use]
    pub fn position_of(&self, id: EntityId) -> Option<Point3> {
        self.unit(id)
            .map(Unit::position)
            .or_else(|| self.building(id).map(Building::position))
            .or_else(|| self.node(id).map(|n| n.position))
    }

    /// Whether an entity exists and is still standing (living unit or intact building).
    #[must_use]
    pub fn is_target_alive(&self, id: EntityId) -> bool {
        self.unit(id).is_some_and(Unit::is_alive)
            || self.building(id).is_some_and(|b| !b.is_destroyed())
    }

    // ------------------------------------------------------------------
    // Removal
    // ------------------------------------------------------------------

    /// Remove a unit.
    pub fn remove_unit(&mut self, id: EntityId) -> Option<Unit> {
        let unit = self.units.remove(&id)?;
        if let Some(ids) = self.units_by_player.get_mut(&unit.player_id) {
            ids.remove(&id);
        }
        Some(unit)
    }

    /// Remove a building.
    pub fn remove_building(&mut self, id: EntityId) -> Option<Building> {
        let building = self.buildings.remove(&id)?;
        if let Some(ids) = self.buildings_by_player.get_mut(&building.player_id) {
            ids.remove(&id);
        }
        Some(building)
    }

    /// Remove a resource node.
    pub fn remove_resource_node(&mut self, id: EntityId) -> Option<ResourceNode> {
        self.nodes.remove(&id)
    }

    // ------------------------------------------------------------------
    // Iteration and queries
    // ------------------------------------------------------------------

    /// Unit ids in ascending order.
    #[must_use]
    pub fn unit_ids(&self) -> Vec<EntityId> {
        self.units.keys().copied().collect()
    }

    /// Building ids in ascending order.
    #[must_use]
    pub fn building_ids(&self) -> Vec<EntityId> {
        self.buildings.keys().copied().collect()
    }

    /// Resource node ids in ascending order.
    #[must_use]
    pub fn node_ids(&self) -> Vec<EntityId> {
        self.nodes.keys().copied().collect()
    }

    /// All units in id order.
    pub fn units(&self) -> impl Iterator<Item = &Unit> {
        self.units.values()
    }

    /// All units mutably in id order.
    pub fn units_mut(&mut self) -> impl Iterator<Item = &mut Unit> {
        self.units.values_mut()
    }

    /// All buildings in id order.
    pub fn buildings(&self) -> impl Iterator<Item = &Building> {
        self.buildings.values()
    }

    /// All resource nodes in id order.
    pub fn nodes(&self) -> impl Iterator<Item = &ResourceNode> {
        self.nodes.values()
    }

    /// Units owned by `player`, in id order.
    pub fn units_of(&self, player: PlayerId) -> impl Iterator<Item = &Unit> {
        self.units_by_player
            .get(&player)
            .into_iter()
            .flatten()
            .filter_map(|id| self.units.get(id))
    }

    /// Buildings owned by `player`, in id order.
    pub fn buildings_of(&self, player: PlayerId) -> impl Iterator<Item = &Building> {
        self.buildings_by_player
            .get(&player)
            .into_iter()
            .flatten()
            .filter_map(|id| self.buildings.get(id))
    }

    /// Living units of `player`.
    #[must_use]
    pub fn living_unit_count(&self, player: PlayerId) -> usize {
        self.units_of(player).filter(|u| u.is_alive()).count()
    }

    /// Number of units (including corpses awaiting removal).
    #[must_use]
    pub fn unit_count(&self) -> usize {
        self.units.len()
    }

    /// Number of buildings.
    #[must_use]
    pub fn building_count(&self) -> usize {
        self.buildings.len()
    }

    /// Living units within `radius` of `center`, in id order.
    #[must_use]
    pub fn units_in_radius(&self, center: Point3, radius: f32) -> Vec<EntityId> {
        let r2 = radius * radius;
        self.units
            .values()
            .filter(|u| u.is_alive() && u.position().distance_squared(center) <= r2)
            .map(|u| u.id)
            .collect()
    }

    /// Living units not owned by `player` within `radius`, in id order.
    #[must_use]
    pub fn find_enemies_in_radius(
        &self,
        player: PlayerId,
        center: Point3,
        radius: f32,
    ) -> Vec<EntityId> {
        let r2 = radius * radius;
        self.units
            .values()
            .filter(|u| u.is_alive() && u.player_id != player)
            .filter(|u| u.position().distance_squared(center) <= r2)
            .map(|u| u.id)
            .collect()
    }

    /// Closest living unit not owned by `player` within `radius` (ties go to the lower id).
    #[must_use]
    pub fn nearest_enemy_unit(
        &self,
        player: PlayerId,
        center: Point3,
        radius: f32,
    ) -> Option<EntityId> {
        self.units
            .values()
            .filter(|u| u.is_alive() && u.player_id != player)
            .map(|u| (u.id, u.position().distance(center)))
            .filter(|(_, d)| *d <= radius)
            .min_by(|a, b| a.1.total_cmp(&b.1).then(a.0.cmp(&b.0)))
            .map(|(id, _)| id)
    }

    /// Closest intact building not owned by `player` within `radius`.
    #[must_use]
    pub fn nearest_enemy_building(
        &self,
        player: PlayerId,
        center: Point3,
        radius: f32,
    ) -> Option<EntityId> {
        self.buildings
            .values()
            .filter(|b| !b.is_destroyed() && b.player_id != player)
            .map(|b| (b.id, b.distance_to_edge(center)))
            .filter(|(_, d)| *d <= radius)
            .min_by(|a, b| a.1.total_cmp(&b.1).then(a.0.cmp(&b.0)))
            .map(|(id, _)| id)
    }

    /// Closest non-depleted node within `radius`, optionally of one resource.
    #[must_use]
    pub fn nearest_node(
        &self,
        center: Point3,
        radius: f32,
        resource: Option<&str>,
    ) -> Option<EntityId> {
        self.nodes
            .values()
            .filter(|n| !n.is_depleted())
            .filter(|n| resource.map_or(true, |r| n.resource_type == r))
            .map(|n| (n.id, n.position.distance(center)))
            .filter(|(_, d)| *d <= radius)
            .min_by(|a, b| a.1.total_cmp(&b.1).then(a.0.cmp(&b.0)))
            .map(|(id, _)| id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_are_unique_across_kinds() {
        let mut objects = ObjectManager::new();
        let unit = objects.create_unit(1, "worker", Point3::ZERO, None, 0.0);
        let building = objects.create_building(1, "house", Point3::ZERO, None);
        let node = objects.create_resource_node("gold", Point3::ZERO, 100);
        assert_eq!((unit, building, node), (1, 2, 3));
        objects.remove_unit(unit);
        let next = objects.create_unit(1, "worker", Point3::ZERO, None, 0.0);
        assert_eq!(next, 4);
    }

    #[test]
    fn test_player_index_tracks_removal() {
        let mut objects = ObjectManager::new();
        let a = objects.create_unit(1, "worker", Point3::ZERO, None, 0.0);
        objects.create_unit(2, "worker", Point3::ZERO, None, 0.0);
        assert_eq!(objects.units_of(1).count(), 1);
        objects.remove_unit(a);
        assert_eq!(objects.units_of(1).count(), 0);
        assert_eq!(objects.units_of(2).count(), 1);
    }

    #[test]
    fn test_find_enemies_in_radius() {
        let mut objects = ObjectManager::new();
        objects.create_unit(1, "soldier", Point3::ground(1.0, 0.0), None, 0.0);
        let near = objects.create_unit(2, "soldier", Point3::ground(3.0, 0.0), None, 0.0);
        let edge = objects.create_unit(2, "soldier", Point3::ground(0.0, 5.0), None, 0.0);
        objects.create_unit(2, "soldier", Point3::ground(9.0, 0.0), None, 0.0);
        let dead = objects.create_unit(2, "soldier", Point3::ground(1.0, 1.0), None, 0.0);
        objects.unit_mut(dead).unwrap().apply_damage(1000.0);
        assert_eq!(objects.find_enemies_in_radius(1, Point3::ZERO, 5.0), vec![near, edge]);
        assert!(objects.find_enemies_in_radius(2, Point3::ZERO, 0.5).is_empty());
    }

    #[test]
    fn test_nearest_enemy_skips_friends_and_dead() {
        let mut objects = ObjectManager::new();
        objects.create_unit(1, "soldier", Point3::ground(1.0, 0.0), None, 0.0);
        let dead = objects.create_unit(2, "soldier", Point3::ground(2.0, 0.0), None, 0.0);
        let alive = objects.create_unit(2, "soldier", Point3::ground(4.0, 0.0), None, 0.0);
        objects.unit_mut(dead).unwrap().apply_damage(1000.0);
        assert_eq!(objects.nearest_enemy_unit(1, Point3::ZERO, 10.0), Some(alive));
        assert_eq!(objects.nearest_enemy_unit(1, Point3::ZERO, 3.0), None);
    }

    #[test]
    fn test_nearest_node_filters_resource_and_depletion() {
        let mut objects = ObjectManager::new();
        let gold = objects.create_resource_node("gold", Point3::ground(5.0, 0.0), 10);
        let wood = objects.create_resource_node("wood", Point3::ground(1.0, 0.0), 10);
        assert_eq!(objects.nearest_node(Point3::ZERO, 10.0, None), Some(wood));
        assert_eq!(objects.nearest_node(Point3::ZERO, 10.0, Some("gold")), Some(gold));
        objects.node_mut(wood).unwrap().extract(10);
        assert_eq!(objects.nearest_node(Point3::ZERO, 10.0, None), Some(gold));
    }

    #[test]
    fn test_create_from_template() {
        let mut objects = ObjectManager::new();
        let mut template = UnitData::new("archer");
        template.attack_range = 7.0;
        let id = objects.create_unit(3, "archer", Point3::ZERO, Some(&template), 2.5);
        let unit = objects.unit(id).unwrap();
        assert_eq!(unit.attack_range, 7.0);
        assert_eq!(unit.created_at, 2.5);
        assert_eq!(objects.owner_of(id), Some(3));
    }
}
