//! Unit groups and formations.
//!
//! A [`Group`] is a set of same-player units moving as one. Each member is
//! assigned a [`FormationSlot`]: an offset relative to the group anchor
//! where `x` is lateral (right of the facing direction) and `z` is along it.
//! Slots are ordered leader first, then by unit id.
//!
//! Groups track cohesion every tick: they lose formation when any member
//! strays beyond the break distance from the centre and regain it once all
//! members are back within the reform distance.

use std::collections::{BTreeMap, HashMap};
use std::f32::consts::TAU;
use std::hash::Hasher;

use serde::{Deserialize, Serialize};

use crate::components::{EntityId, PlayerId};
use crate::error::{GameError, Result};
use crate::events::{EventQueue, EventType, GameEvent};
use crate::hash::StableHasher;
use crate::math::{centroid, rotate_to_direction, Point3};
use crate::objects::ObjectManager;

/// Group identifier.
pub type GroupId = u64;

/// Arrangement of a group's members.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Formation {
    /// Row perpendicular to the facing.
    #[default]
    Line,
    /// Single file behind the leader.
    Column,
    /// Leader at the tip, members trailing diagonally.
    Wedge,
    /// Square grid.
    Box,
    /// Ring facing outward.
    Circle,
    /// Loose pseudo-random spread.
    Scatter,
}

impl Formation {
    /// Multiplier on damage dealt by members.
    #[must_use]
    pub const fn attack_bonus(self) -> f32 {
        match self {
            Self::Line => 1.1,
            Self::Wedge => 1.2,
            Self::Column | Self::Box | Self::Circle | Self::Scatter => 1.0,
        }
    }

    /// Multiplier on damage taken by members.
    #[must_use]
    pub const fn defense_multiplier(self) -> f32 {
        match self {
            Self::Box => 0.85,
            Self::Circle => 0.9,
            Self::Wedge => 1.1,
            Self::Line | Self::Column | Self::Scatter => 1.0,
        }
    }
}

/// Spacing and cohesion thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FormationParams {
    /// Distance between neighbouring slots.
    pub spacing: f32,
    /// A member farther than this from the centre breaks formation.
    pub break_distance: f32,
    /// Formation re-forms once every member is within this of the centre.
    pub reform_distance: f32,
    /// The group has arrived once its centre is within this of the target.
    pub arrival_distance: f32,
}

impl Default for FormationParams {
    fn default() -> Self {
        Self {
            spacing: 2.0,
            break_distance: 8.0,
            reform_distance: 3.0,
            arrival_distance: 2.0,
        }
    }
}

/// A member's place in the formation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FormationSlot {
    /// Offset from the anchor before rotation.
    pub offset: Point3,
    /// Facing relative to the group direction, in radians.
    pub facing: f32,
}

impl FormationSlot {
    const fn at(x: f32, z: f32) -> Self {
        Self {
            offset: Point3::new(x, 0.0, z),
            facing: 0.0,
        }
    }
}

fn unit_hash(unit: EntityId, salt: u8) -> f32 {
    let mut hasher = StableHasher::new();
    hasher.write_le_u64(unit);
    hasher.write_u8(salt);
    // Map to [-1, 1].
    (hasher.finish() % 20_001) as f32 / 10_000.0 - 1.0
}

/// Slots for `members` (already in slot order) in `formation`.
#[must_use]
pub fn generate_slots(
    formation: Formation,
    members: &[EntityId],
    spacing: f32,
) -> Vec<FormationSlot> {
    let n = members.len();
    if n == 0 {
        return Vec::new();
    }
    let half_width = (n as f32 - 1.0) / 2.0;
    match formation {
        Formation::Line => (0..n)
            .map(|i| FormationSlot::at((i as f32 - half_width) * spacing, 0.0))
            .collect(),
        Formation::Column => (0..n)
            .map(|i| FormationSlot::at(0.0, -(i as f32) * spacing))
            .collect(),
        Formation::Wedge => (0..n)
            .map(|i| {
                if i == 0 {
                    return FormationSlot::at(0.0, 0.0);
                }
                let row = ((i + 1) / 2) as f32;
                let side = if i % 2 == 1 { -1.0 } else { 1.0 };
                FormationSlot::at(side * row * spacing * 0.8, -row * spacing * 0.6)
            })
            .collect(),
        Formation::Box => {
            let side = (n as f32).sqrt().ceil() as usize;
            let rows = n.div_ceil(side);
            let half_cols = (side as f32 - 1.0) / 2.0;
            let half_rows = (rows as f32 - 1.0) / 2.0;
            (0..n)
                .map(|i| {
                    let row = (i / side) as f32;
                    let col = (i % side) as f32;
                    FormationSlot::at((col - half_cols) * spacing, (half_rows - row) * spacing)
                })
                .collect()
        }
        Formation::Circle => {
            let radius = spacing.max(n as f32 * spacing / TAU);
            (0..n)
                .map(|i| {
                    let angle = TAU * i as f32 / n as f32;
                    FormationSlot {
                        offset: Point3::new(radius * angle.sin(), 0.0, radius * angle.cos()),
                        facing: angle,
                    }
                })
                .collect()
        }
        Formation::Scatter => {
            let extent = spacing * 1.5 * (n as f32).sqrt().ceil();
            members
                .iter()
                .map(|&unit| FormationSlot::at(unit_hash(unit, 0) * extent, unit_hash(unit, 1) * extent))
                .collect()
        }
    }
}

/// A set of same-player units moving together.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Group {
    /// Group id.
    pub id: GroupId,
    /// Owning player.
    pub player_id: PlayerId,
    members: Vec<EntityId>,
    /// First living member.
    pub leader: Option<EntityId>,
    /// Current arrangement.
    pub formation: Formation,
    /// Spacing and cohesion thresholds.
    pub params: FormationParams,
    /// Mean position of living members.
    pub center: Point3,
    /// Destination of the current move.
    pub target: Option<Point3>,
    /// Facing of the formation.
    pub direction: Point3,
    /// A move is in progress.
    pub is_moving: bool,
    /// Members are holding formation.
    pub is_formed: bool,
    slots: BTreeMap<EntityId, FormationSlot>,
}

impl Group {
    /// Members in slot order: leader first, then ascending id.
    #[must_use]
    pub fn members(&self) -> Vec<EntityId> {
        let mut ordered: Vec<EntityId> = self.leader.into_iter().collect();
        let mut rest: Vec<EntityId> = self
            .members
            .iter()
            .copied()
            .filter(|id| Some(*id) != self.leader)
            .collect();
        rest.sort_unstable();
        ordered.extend(rest);
        ordered
    }

    /// Number of members.
    #[must_use]
    pub fn len(&self) -> usize {
        self.members.len()
    }

    /// No members left.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Whether `unit` belongs to the group.
    #[must_use]
    pub fn contains(&self, unit: EntityId) -> bool {
        self.members.contains(&unit)
    }

    /// Slot assigned to a member.
    #[must_use]
    pub fn slot(&self, unit: EntityId) -> Option<FormationSlot> {
        self.slots.get(&unit).copied()
    }

    /// World position of a member's slot around `anchor`.
    #[must_use]
    pub fn slot_position(&self, unit: EntityId, anchor: Point3) -> Option<Point3> {
        self.slot(unit)
            .map(|slot| anchor + rotate_to_direction(slot.offset, self.direction))
    }

    /// Whether `unit` occupies the foremost row of the formation.
    #[must_use]
    pub fn is_front_line(&self, unit: EntityId) -> bool {
        let Some(slot) = self.slot(unit) else {
            return false;
        };
        let front = self
            .slots
            .values()
            .map(|s| s.offset.z)
            .fold(f32::NEG_INFINITY, f32::max);
        (slot.offset.z - front).abs() < 1e-3
    }

    fn regenerate_slots(&mut self) {
        let ordered = self.members();
        let slots = generate_slots(self.formation, &ordered, self.params.spacing);
        self.slots = ordered.into_iter().zip(slots).collect();
    }

    fn remove_member(&mut self, unit: EntityId) -> bool {
        let before = self.members.len();
        self.members.retain(|&id| id != unit);
        if self.members.len() == before {
            return false;
        }
        if self.leader == Some(unit) {
            self.leader = self.members.first().copied();
        }
        self.regenerate_slots();
        true
    }

    fn slot_targets(&self) -> Vec<(EntityId, Point3)> {
        let Some(anchor) = self.target else {
            return Vec::new();
        };
        self.members()
            .into_iter()
            .filter_map(|id| self.slot_position(id, anchor).map(|p| (id, p)))
            .collect()
    }
}

/// Owns every group and the unit → group index.
#[derive(Debug, Clone, Default)]
pub struct GroupManager {
    groups: BTreeMap<GroupId, Group>,
    membership: HashMap<EntityId, GroupId>,
    params: FormationParams,
    next_id: GroupId,
}

impl GroupManager {
    /// Manager creating groups with `params`.
    #[must_use]
    pub fn new(params: FormationParams) -> Self {
        Self {
            groups: BTreeMap::new(),
            membership: HashMap::new(),
            params,
            next_id: 1,
        }
    }

    /// Look up a group.
    #[must_use]
    pub fn group(&self, id: GroupId) -> Option<&Group> {
        self.groups.get(&id)
    }

    /// All groups in id order.
    pub fn groups(&self) -> impl Iterator<Item = &Group> {
        self.groups.values()
    }

    /// Group a unit belongs to.
    #[must_use]
    pub fn group_of(&self, unit: EntityId) -> Option<GroupId> {
        self.membership.get(&unit).copied()
    }

    /// Formation of the group a unit belongs to.
    #[must_use]
    pub fn formation_of(&self, unit: EntityId) -> Option<Formation> {
        self.group_of(unit)
            .and_then(|g| self.groups.get(&g))
            .map(|g| g.formation)
    }

    /// Whether a unit stands in its group's front row.
    #[must_use]
    pub fn is_front_line(&self, unit: EntityId) -> bool {
        self.group_of(unit)
            .and_then(|g| self.groups.get(&g))
            .is_some_and(|g| g.is_front_line(unit))
    }

    pub(crate) fn require_owned(&self, player: PlayerId, id: GroupId) -> Result<&Group> {
        let group = self.groups.get(&id).ok_or(GameError::GroupNotFound(id))?;
        if group.player_id != player {
            return Err(GameError::GroupNotOwned { player, group: id });
        }
        Ok(group)
    }

    /// Create a group from living units owned by `player`.
    ///
    /// Units are removed from any group they were in; groups emptied by this are destroyed.
    pub fn create_group(
        &mut self,
        objects: &ObjectManager,
        player: PlayerId,
        units: &[EntityId],
        formation: Formation,
    ) -> Result<GroupId> {
        if units.is_empty() {
            return Err(GameError::Validation("group needs at least one unit".into()));
        }
        let mut members: Vec<EntityId> = Vec::with_capacity(units.len());
        for &id in units {
            let unit = objects.require_unit(id)?;
            if unit.player_id != player {
                return Err(GameError::Unauthorized { player, entity: id });
            }
            if !unit.is_alive() {
                return Err(GameError::DeadUnit(id));
            }
            if !members.contains(&id) {
                members.push(id);
            }
        }

        for &id in &members {
            self.detach(id);
        }

        let id = self.next_id.max(1);
        self.next_id = id + 1;
        let center = centroid(members.iter().filter_map(|&m| objects.position_of(m)))
            .unwrap_or(Point3::ZERO);
        let mut group = Group {
            id,
            player_id: player,
            leader: members.first().copied(),
            members,
            formation,
            params: self.params,
            center,
            target: None,
            direction: Point3::FORWARD,
            is_moving: false,
            is_formed: true,
            slots: BTreeMap::new(),
        };
        group.regenerate_slots();
        for &member in &group.members {
            self.membership.insert(member, id);
        }
        tracing::debug!(group = id, player, size = group.members.len(), ?formation, "group created");
        self.groups.insert(id, group);
        Ok(id)
    }

    /// Start moving a group. Returns each member's slot destination.
    pub fn move_group(
        &mut self,
        player: PlayerId,
        id: GroupId,
        target: Point3,
    ) -> Result<Vec<(EntityId, Point3)>> {
        self.require_owned(player, id)?;
        if !target.is_finite() {
            return Err(GameError::Validation("group target is not finite".into()));
        }
        let group = self
            .groups
            .get_mut(&id)
            .ok_or(GameError::GroupNotFound(id))?;
        group.direction = (target - group.center).flatten().normalize();
        group.target = Some(target);
        group.is_moving = true;
        group.regenerate_slots();
        Ok(group.slot_targets())
    }

    /// Change formation. If the group is moving, returns the new slot destinations.
    pub fn set_formation(
        &mut self,
        player: PlayerId,
        id: GroupId,
        formation: Formation,
    ) -> Result<Vec<(EntityId, Point3)>> {
        self.require_owned(player, id)?;
        let group = self
            .groups
            .get_mut(&id)
            .ok_or(GameError::GroupNotFound(id))?;
        group.formation = formation;
        group.regenerate_slots();
        Ok(if group.is_moving {
            group.slot_targets()
        } else {
            Vec::new()
        })
    }

    /// Dissolve a group.
    pub fn disband(&mut self, player: PlayerId, id: GroupId) -> Result<()> {
        self.require_owned(player, id)?;
        if let Some(group) = self.groups.remove(&id) {
            for member in group.members {
                self.membership.remove(&member);
            }
        }
        Ok(())
    }

    /// Add a living unit owned by the group's player.
    pub fn add_unit(&mut self, objects: &ObjectManager, id: GroupId, unit: EntityId) -> Result<()> {
        let player = self
            .groups
            .get(&id)
            .ok_or(GameError::GroupNotFound(id))?
            .player_id;
        let record = objects.require_unit(unit)?;
        if record.player_id != player {
            return Err(GameError::Unauthorized { player, entity: unit });
        }
        if !record.is_alive() {
            return Err(GameError::DeadUnit(unit));
        }
        if self.group_of(unit) == Some(id) {
            return Ok(());
        }
        self.detach(unit);
        let group = self
            .groups
            .get_mut(&id)
            .ok_or(GameError::GroupNotFound(id))?;
        group.members.push(unit);
        if group.leader.is_none() {
            group.leader = Some(unit);
        }
        group.regenerate_slots();
        self.membership.insert(unit, id);
        Ok(())
    }

    /// Remove a unit from whatever group it is in, destroying the group if emptied.
    pub fn detach(&mut self, unit: EntityId) {
        let Some(id) = self.membership.remove(&unit) else {
            return;
        };
        let emptied = self.groups.get_mut(&id).is_some_and(|group| {
            group.remove_member(unit);
            group.is_empty()
        });
        if emptied {
            self.groups.remove(&id);
            tracing::debug!(group = id, "group emptied and destroyed");
        }
    }

    /// Prune dead members, update centres and cohesion, and detect arrivals.
    ///
    /// Returns the groups that arrived this update.
    pub fn update(&mut self, objects: &ObjectManager, events: &EventQueue, now: f64) -> Vec<GroupId> {
        let stale: Vec<EntityId> = self
            .membership
            .keys()
            .copied()
            .filter(|&id| !objects.unit(id).is_some_and(|u| u.is_alive()))
            .collect();
        for unit in stale {
            self.detach(unit);
        }

        let mut arrived = Vec::new();
        for group in self.groups.values_mut() {
            let positions: Vec<Point3> = group
                .members
                .iter()
                .filter_map(|&id| objects.unit(id).map(|u| u.position()))
                .collect();
            let Some(center) = centroid(positions.iter().copied()) else {
                continue;
            };
            group.center = center;

            let spread = positions
                .iter()
                .map(|p| p.distance(center))
                .fold(0.0_f32, f32::max);
            if group.is_formed && spread > group.params.break_distance {
                group.is_formed = false;
                tracing::debug!(group = group.id, spread, "group lost formation");
            } else if !group.is_formed && spread <= group.params.reform_distance {
                group.is_formed = true;
            }

            if let (true, Some(target)) = (group.is_moving, group.target) {
                if center.flatten().distance(target.flatten()) < group.params.arrival_distance {
                    group.is_moving = false;
                    group.is_formed = true;
                    arrived.push(group.id);
                    events.publish(
                        GameEvent::new(EventType::GroupArrived, now, Some(group.player_id))
                            .with_data("group", group.id)
                            .with_data("size", group.members.len()),
                    );
                }
            }
        }
        arrived
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx(a: f32, b: f32) -> bool {
        (a - b).abs() < 1e-4
    }

    fn objects_with(units: &[(PlayerId, f32, f32)]) -> (ObjectManager, Vec<EntityId>) {
        let mut objects = ObjectManager::new();
        let ids = units
            .iter()
            .map(|&(player, x, z)| objects.create_unit(player, "soldier", Point3::ground(x, z), None, 0.0))
            .collect();
        (objects, ids)
    }

    #[test]
    fn test_line_slots_are_centred() {
        let slots = generate_slots(Formation::Line, &[1, 2, 3], 2.0);
        let xs: Vec<f32> = slots.iter().map(|s| s.offset.x).collect();
        assert_eq!(xs, vec![-2.0, 0.0, 2.0]);
        assert!(slots.iter().all(|s| s.offset.z == 0.0));
    }

    #[test]
    fn test_column_trails_leader() {
        let slots = generate_slots(Formation::Column, &[1, 2, 3], 2.0);
        assert_eq!(slots[2].offset, Point3::new(0.0, 0.0, -4.0));
    }

    #[test]
    fn test_wedge_alternates_sides() {
        let slots = generate_slots(Formation::Wedge, &[1, 2, 3, 4, 5], 2.0);
        assert_eq!(slots[0].offset, Point3::ZERO);
        assert!(slots[1].offset.x < 0.0 && slots[2].offset.x > 0.0);
        assert!(approx(slots[1].offset.z, slots[2].offset.z));
        assert!(slots[3].offset.z < slots[1].offset.z);
    }

    #[test]
    fn test_box_is_square_grid() {
        let slots = generate_slots(Formation::Box, &[1, 2, 3, 4], 2.0);
        assert_eq!(slots.len(), 4);
        assert!(slots.iter().all(|s| s.offset.x.abs() == 1.0 && s.offset.z.abs() == 1.0));
    }

    #[test]
    fn test_circle_faces_outward() {
        let slots = generate_slots(Formation::Circle, &[1, 2, 3, 4], 2.0);
        for slot in &slots {
            assert!(approx(slot.offset.length(), 2.0));
            assert!(approx(slot.offset.x.atan2(slot.offset.z).rem_euclid(TAU), slot.facing.rem_euclid(TAU)));
        }
    }

    #[test]
    fn test_scatter_is_deterministic() {
        let a = generate_slots(Formation::Scatter, &[7, 8, 9], 2.0);
        let b = generate_slots(Formation::Scatter, &[7, 8, 9], 2.0);
        assert_eq!(a, b);
        assert_ne!(a[0].offset, a[1].offset);
    }

    #[test]
    fn test_scatter_jitter_is_pinned() {
        // FNV-1a of the id's little-endian bytes plus the salt.
        assert!(approx(unit_hash(1, 0), 0.7299));
        assert!(approx(unit_hash(1, 1), 0.2677));
        assert!(approx(unit_hash(7, 0), -0.552));
        let slots = generate_slots(Formation::Scatter, &[7], 2.0);
        assert!(approx(slots[0].offset.x, -0.552 * 3.0));
    }

    #[test]
    fn test_create_group_rejects_foreign_units() {
        let (objects, ids) = objects_with(&[(1, 0.0, 0.0), (2, 1.0, 0.0)]);
        let mut groups = GroupManager::new(FormationParams::default());
        let err = groups
            .create_group(&objects, 1, &ids, Formation::Line)
            .unwrap_err();
        assert!(matches!(err, GameError::Unauthorized { player: 1, .. }));
        assert!(groups.groups().next().is_none());
    }

    #[test]
    fn test_regrouping_destroys_empty_group() {
        let (objects, ids) = objects_with(&[(1, 0.0, 0.0), (1, 1.0, 0.0)]);
        let mut groups = GroupManager::new(FormationParams::default());
        let first = groups.create_group(&objects, 1, &ids, Formation::Line).unwrap();
        let second = groups.create_group(&objects, 1, &ids, Formation::Box).unwrap();
        assert!(groups.group(first).is_none());
        assert_eq!(groups.group_of(ids[0]), Some(second));
    }

    #[test]
    fn test_move_group_assigns_slots_around_target() {
        let (objects, ids) = objects_with(&[(1, 0.0, 0.0), (1, 1.0, 0.0), (1, 2.0, 0.0)]);
        let mut groups = GroupManager::new(FormationParams::default());
        let id = groups.create_group(&objects, 1, &ids, Formation::Line).unwrap();
        let target = Point3::ground(20.0, 20.0);
        let assignments = groups.move_group(1, id, target).unwrap();
        assert_eq!(assignments.len(), 3);
        let direction = groups.group(id).unwrap().direction;
        for (_, slot) in &assignments {
            assert!(slot.distance(target) <= 2.0 + 1e-3);
            assert!((*slot - target).dot(direction).abs() < 1e-3);
        }
        assert!(groups.group(id).unwrap().is_moving);
    }

    #[test]
    fn test_foreign_group_orders_are_unauthorized() {
        let (objects, ids) = objects_with(&[(1, 0.0, 0.0), (1, 1.0, 0.0)]);
        let mut groups = GroupManager::new(FormationParams::default());
        let id = groups.create_group(&objects, 1, &ids, Formation::Line).unwrap();

        let err = groups.move_group(2, id, Point3::ground(5.0, 5.0)).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Authorization);
        assert!(matches!(err, GameError::GroupNotOwned { player: 2, group } if group == id));
        assert!(!groups.group(id).unwrap().is_moving);

        let err = groups.set_formation(2, id, Formation::Wedge).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Authorization);
        assert_eq!(groups.group(id).unwrap().formation, Formation::Line);
        assert!(groups.disband(2, id).is_err());
        assert!(groups.group(id).is_some());
    }

    #[test]
    fn test_dead_leader_is_replaced() {
        let (mut objects, ids) = objects_with(&[(1, 0.0, 0.0), (1, 1.0, 0.0)]);
        let mut groups = GroupManager::new(FormationParams::default());
        let events = EventQueue::new(8);
        let id = groups.create_group(&objects, 1, &ids, Formation::Line).unwrap();
        objects.unit_mut(ids[0]).unwrap().apply_damage(1000.0);
        groups.update(&objects, &events, 0.0);
        let group = groups.group(id).unwrap();
        assert_eq!(group.leader, Some(ids[1]));
        assert_eq!(group.len(), 1);
    }

    #[test]
    fn test_cohesion_breaks_and_reforms() {
        let (mut objects, ids) = objects_with(&[(1, 0.0, 0.0), (1, 1.0, 0.0)]);
        let mut groups = GroupManager::new(FormationParams::default());
        let events = EventQueue::new(8);
        let id = groups.create_group(&objects, 1, &ids, Formation::Line).unwrap();
        objects.unit_mut(ids[1]).unwrap().set_position(Point3::ground(30.0, 0.0));
        groups.update(&objects, &events, 0.0);
        assert!(!groups.group(id).unwrap().is_formed);
        objects.unit_mut(ids[1]).unwrap().set_position(Point3::ground(2.0, 0.0));
        groups.update(&objects, &events, 0.1);
        assert!(groups.group(id).unwrap().is_formed);
    }

    #[test]
    fn test_arrival_publishes_event() {
        let (mut objects, ids) = objects_with(&[(1, 0.0, 0.0)]);
        let mut groups = GroupManager::new(FormationParams::default());
        let events = EventQueue::new(8);
        let id = groups.create_group(&objects, 1, &ids, Formation::Column).unwrap();
        groups.move_group(1, id, Point3::ground(10.0, 0.0)).unwrap();
        objects.unit_mut(ids[0]).unwrap().set_position(Point3::ground(9.5, 0.0));
        assert_eq!(groups.update(&objects, &events, 1.0), vec![id]);
        assert!(!groups.group(id).unwrap().is_moving);
        assert_eq!(events.drain()[0].event_type, EventType::GroupArrived);
    }

    #[test]
    fn test_formation_bonuses() {
        assert_eq!(Formation::Line.attack_bonus(), 1.1);
        assert_eq!(Formation::Wedge.attack_bonus(), 1.2);
        assert!(Formation::Box.defense_multiplier() < 1.0);
    }
}
