//! Timed status effects (poison, stun, slow...).
//!
//! [`StatusEffectManager`] owns effect definitions and the active effects of
//! every unit behind internal locks, so hosts can query effects through a
//! shared reference while the simulation updates them.
//!
//! Stacking rules when an effect is re-applied:
//! - stackable and below `max_stacks`: add a stack and refresh the timer
//! - stackable at `max_stacks`, or non-stackable: refresh the timer only
//!
//! Stat-changing effects (Slow, Rage, Armor, Freeze) are sized against the
//! unit's unmodified stats. Whenever the set of effects on a unit changes,
//! every delta is recomputed from those stats, so the order in which effects
//! start and end never leaves a residue. Freeze takes whatever speed the
//! other effects leave.

use std::collections::BTreeMap;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use serde::{Deserialize, Serialize};

use crate::components::{EntityId, Unit, UnitState};
use crate::error::{GameError, Result};
use crate::objects::ObjectManager;

/// Tolerance for comparing accumulated world time against intervals.
const TIME_EPSILON: f64 = 1e-6;

/// Largest slow fraction stacks can reach.
const MAX_SLOW: f32 = 0.9;

/// Behaviour class of an effect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EffectType {
    /// Damage per tick, scaled by stacks.
    Poison,
    /// Damage per tick, scaled by stacks.
    Burn,
    /// Cannot act.
    Stun,
    /// Reduced speed.
    Slow,
    /// Increased attack damage.
    Rage,
    /// Increased armor.
    Armor,
    /// Cannot act (same handling as Stun).
    Fear,
    /// Cannot act or move.
    Freeze,
}

impl EffectType {
    /// Effect prevents the unit from executing commands.
    #[must_use]
    pub const fn disables(self) -> bool {
        matches!(self, Self::Stun | Self::Fear | Self::Freeze)
    }

    /// Effect deals damage on each tick.
    #[must_use]
    pub const fn damages(self) -> bool {
        matches!(self, Self::Poison | Self::Burn)
    }
}

/// Registered effect template.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EffectDefinition {
    /// Lookup key.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Behaviour class.
    pub effect_type: EffectType,
    /// Lifetime in seconds.
    pub duration: f64,
    /// Seconds between ticks; zero for effects without ticks.
    pub tick_interval: f64,
    /// Strength: damage per tick, slow fraction, damage fraction or flat armor.
    pub magnitude: f32,
    /// Re-application adds stacks.
    pub is_stackable: bool,
    /// Stack cap.
    pub max_stacks: u32,
    /// Beneficial to the bearer.
    pub is_buff: bool,
    /// Can be removed by dispel.
    pub is_dispellable: bool,
}

impl EffectDefinition {
    /// Non-stacking, dispellable debuff with no ticks.
    #[must_use]
    pub fn new(id: &str, effect_type: EffectType, duration: f64, magnitude: f32) -> Self {
        Self {
            id: id.to_string(),
            name: id.to_string(),
            effect_type,
            duration,
            tick_interval: 0.0,
            magnitude,
            is_stackable: false,
            max_stacks: 1,
            is_buff: false,
            is_dispellable: true,
        }
    }

    /// Builder: fire every `interval` seconds.
    #[must_use]
    pub fn with_tick_interval(mut self, interval: f64) -> Self {
        self.tick_interval = interval;
        self
    }

    /// Builder: allow up to `max_stacks` stacks.
    #[must_use]
    pub fn stackable(mut self, max_stacks: u32) -> Self {
        self.is_stackable = true;
        self.max_stacks = max_stacks.max(1);
        self
    }

    /// Builder: mark as beneficial.
    #[must_use]
    pub fn buff(mut self) -> Self {
        self.is_buff = true;
        self
    }

    /// Builder: immune to dispel.
    #[must_use]
    pub fn undispellable(mut self) -> Self {
        self.is_dispellable = false;
        self
    }

    /// Number of ticks over the full duration; `None` when the effect has no ticks.
    #[must_use]
    pub fn total_ticks(&self) -> Option<u32> {
        (self.tick_interval > 0.0)
            .then(|| ((self.duration / self.tick_interval) + TIME_EPSILON).floor() as u32)
    }

    fn validate(&self) -> Result<()> {
        if self.id.is_empty() {
            return Err(GameError::Validation("effect id is empty".into()));
        }
        if !(self.duration.is_finite() && self.duration > 0.0) {
            return Err(GameError::Validation(format!(
                "effect '{}' needs a positive duration",
                self.id
            )));
        }
        if !(self.tick_interval.is_finite() && self.tick_interval >= 0.0) {
            return Err(GameError::Validation(format!(
                "effect '{}' has an invalid tick interval",
                self.id
            )));
        }
        if !self.magnitude.is_finite() {
            return Err(GameError::Validation(format!(
                "effect '{}' has a non-finite magnitude",
                self.id
            )));
        }
        Ok(())
    }
}

/// Stat changes an effect has applied to a unit.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct StatDelta {
    /// Added to speed.
    pub speed: f32,
    /// Added to attack damage.
    pub attack_damage: f32,
    /// Added to armor.
    pub armor: f32,
}

impl StatDelta {
    fn for_effect(effect_type: EffectType, magnitude: f32, stacks: u32, base: &BaseStats) -> Self {
        let stacks = stacks as f32;
        match effect_type {
            EffectType::Slow => Self {
                speed: -base.speed * (magnitude * stacks).clamp(0.0, MAX_SLOW),
                ..Self::default()
            },
            EffectType::Rage => Self {
                attack_damage: base.attack_damage * magnitude * stacks,
                ..Self::default()
            },
            EffectType::Armor => Self {
                armor: magnitude * stacks,
                ..Self::default()
            },
            _ => Self::default(),
        }
    }
}

/// A unit's stats with every status effect stripped.
#[derive(Debug, Clone, Copy, PartialEq)]
struct BaseStats {
    speed: f32,
    attack_damage: f32,
    armor: f32,
}

impl BaseStats {
    fn of(unit: &Unit, effects: &[ActiveEffect]) -> Self {
        effects.iter().fold(
            Self {
                speed: unit.speed,
                attack_damage: unit.attack_damage,
                armor: unit.armor,
            },
            |base, effect| Self {
                speed: base.speed - effect.applied.speed,
                attack_damage: base.attack_damage - effect.applied.attack_damage,
                armor: base.armor - effect.applied.armor,
            },
        )
    }
}

/// Recompute every effect's stat change from `base` and write the result to
/// the unit. Speed and attack damage never go below zero.
fn rebalance(effects: &mut [ActiveEffect], unit: &mut Unit, base: BaseStats) {
    let mut speed = base.speed.max(0.0);
    let mut attack_damage = base.attack_damage.max(0.0);
    let mut armor = base.armor;
    for effect in effects
        .iter_mut()
        .filter(|e| e.definition.effect_type != EffectType::Freeze)
    {
        let wanted = StatDelta::for_effect(
            effect.definition.effect_type,
            effect.definition.magnitude,
            effect.stack_count,
            &base,
        );
        let delta = StatDelta {
            speed: wanted.speed.max(-speed),
            attack_damage: wanted.attack_damage.max(-attack_damage),
            armor: wanted.armor,
        };
        speed += delta.speed;
        attack_damage += delta.attack_damage;
        armor += delta.armor;
        effect.applied = delta;
    }
    for effect in effects
        .iter_mut()
        .filter(|e| e.definition.effect_type == EffectType::Freeze)
    {
        effect.applied = StatDelta {
            speed: -speed,
            ..StatDelta::default()
        };
        speed = 0.0;
    }
    unit.speed = speed;
    unit.attack_damage = attack_damage;
    unit.armor = armor;
}

/// An effect currently on a unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActiveEffect {
    /// Template this instance was created from.
    pub definition: EffectDefinition,
    /// World time of the last (re)application.
    pub start_time: f64,
    /// World time of the last tick.
    pub last_tick_at: f64,
    /// Ticks remaining for tick-based effects.
    pub ticks_left: Option<u32>,
    /// Unit that applied the effect.
    pub source: Option<EntityId>,
    /// Current stacks.
    pub stack_count: u32,
    /// Stat change currently applied to the bearer.
    pub applied: StatDelta,
}

impl ActiveEffect {
    fn refresh(&mut self, now: f64) {
        self.start_time = now;
        self.last_tick_at = now;
        self.ticks_left = self.definition.total_ticks();
    }

    fn is_expired(&self, now: f64) -> bool {
        now - self.start_time + TIME_EPSILON >= self.definition.duration
            || self.ticks_left == Some(0)
    }
}

/// What happened during one status update.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StatusReport {
    /// Damage dealt by ticks, per unit.
    pub damage: BTreeMap<EntityId, f32>,
    /// Units killed by ticks.
    pub deaths: Vec<EntityId>,
    /// `(unit, effect id)` pairs that ended.
    pub expired: Vec<(EntityId, String)>,
}

/// Registry and runtime state of all status effects.
#[derive(Debug, Default)]
pub struct StatusEffectManager {
    definitions: RwLock<BTreeMap<String, EffectDefinition>>,
    active: RwLock<BTreeMap<EntityId, Vec<ActiveEffect>>>,
}

impl StatusEffectManager {
    /// Manager with no definitions.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Manager preloaded with the standard effects
    /// (`poison`, `burn`, `stun`, `slow`, `rage`, `armor`, `fear`, `freeze`).
    #[must_use]
    pub fn with_defaults() -> Self {
        let manager = Self::new();
        let defaults = [
            EffectDefinition::new("poison", EffectType::Poison, 10.0, 5.0)
                .with_tick_interval(2.0)
                .stackable(3),
            EffectDefinition::new("burn", EffectType::Burn, 4.0, 8.0).with_tick_interval(1.0),
            EffectDefinition::new("stun", EffectType::Stun, 2.0, 0.0).with_tick_interval(0.5),
            EffectDefinition::new("slow", EffectType::Slow, 5.0, 0.3).stackable(2),
            EffectDefinition::new("rage", EffectType::Rage, 8.0, 0.25).buff(),
            EffectDefinition::new("armor", EffectType::Armor, 10.0, 3.0)
                .buff()
                .stackable(3),
            EffectDefinition::new("fear", EffectType::Fear, 3.0, 0.0).with_tick_interval(0.5),
            EffectDefinition::new("freeze", EffectType::Freeze, 3.0, 0.0)
                .with_tick_interval(0.5)
                .undispellable(),
        ];
        for definition in defaults {
            manager
                .definitions_mut()
                .insert(definition.id.clone(), definition);
        }
        manager
    }

    fn definitions(&self) -> RwLockReadGuard<'_, BTreeMap<String, EffectDefinition>> {
        self.definitions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn definitions_mut(&self) -> RwLockWriteGuard<'_, BTreeMap<String, EffectDefinition>> {
        self.definitions
            .write()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn active(&self) -> RwLockReadGuard<'_, BTreeMap<EntityId, Vec<ActiveEffect>>> {
        self.active.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn active_mut(&self) -> RwLockWriteGuard<'_, BTreeMap<EntityId, Vec<ActiveEffect>>> {
        self.active.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register or replace an effect definition.
    pub fn register(&self, definition: EffectDefinition) -> Result<()> {
        definition.validate()?;
        self.definitions_mut()
            .insert(definition.id.clone(), definition);
        Ok(())
    }

    /// Look up a definition.
    #[must_use]
    pub fn definition(&self, id: &str) -> Option<EffectDefinition> {
        self.definitions().get(id).cloned()
    }

    /// Apply (or re-apply) an effect to a living unit.
    ///
    /// Returns the resulting stack count.
    pub fn apply(
        &self,
        unit: &mut Unit,
        effect_id: &str,
        source: Option<EntityId>,
        now: f64,
    ) -> Result<u32> {
        if !unit.is_alive() {
            return Err(GameError::DeadUnit(unit.id));
        }
        let definition = self
            .definition(effect_id)
            .ok_or_else(|| GameError::UnknownType {
                kind: "effect",
                name: effect_id.to_string(),
            })?;

        let mut active = self.active_mut();
        let effects = active.entry(unit.id).or_default();
        let base = BaseStats::of(unit, effects);
        let stacks = if let Some(existing) = effects
            .iter_mut()
            .find(|e| e.definition.id == effect_id)
        {
            if existing.definition.is_stackable
                && existing.stack_count < existing.definition.max_stacks
            {
                existing.stack_count += 1;
            }
            existing.refresh(now);
            existing.source = source.or(existing.source);
            existing.stack_count
        } else {
            let mut effect = ActiveEffect {
                definition,
                start_time: now,
                last_tick_at: now,
                ticks_left: None,
                source,
                stack_count: 1,
                applied: StatDelta::default(),
            };
            effect.refresh(now);
            effects.push(effect);
            1
        };
        rebalance(effects, unit, base);

        if effects
            .iter()
            .any(|e| e.definition.effect_type.disables())
        {
            disable(unit);
        }
        tracing::debug!(unit = unit.id, effect = effect_id, stacks, "status effect applied");
        Ok(stacks)
    }

    /// Remove one effect, restoring the stats it changed. Returns whether it was present.
    pub fn remove(&self, unit: &mut Unit, effect_id: &str) -> bool {
        let mut active = self.active_mut();
        let Some(effects) = active.get_mut(&unit.id) else {
            return false;
        };
        let base = BaseStats::of(unit, effects);
        let before = effects.len();
        effects.retain(|e| e.definition.id != effect_id);
        let removed = effects.len() != before;
        rebalance(effects, unit, base);
        if effects.is_empty() {
            active.remove(&unit.id);
        }
        removed
    }

    /// Remove dispellable buffs and/or debuffs. Returns how many were removed.
    pub fn dispel(&self, unit: &mut Unit, beneficial: bool, harmful: bool) -> usize {
        let mut active = self.active_mut();
        let Some(effects) = active.get_mut(&unit.id) else {
            return 0;
        };
        let base = BaseStats::of(unit, effects);
        let before = effects.len();
        effects.retain(|e| {
            let def = &e.definition;
            !(def.is_dispellable && ((def.is_buff && beneficial) || (!def.is_buff && harmful)))
        });
        let removed = before - effects.len();
        rebalance(effects, unit, base);
        if effects.is_empty() {
            active.remove(&unit.id);
        }
        removed
    }

    /// Drop every effect on a unit without reverting (the unit is dead or gone).
    pub fn clear_unit(&self, unit_id: EntityId) {
        self.active_mut().remove(&unit_id);
    }

    /// Snapshot of a unit's effects.
    #[must_use]
    pub fn effects(&self, unit_id: EntityId) -> Vec<ActiveEffect> {
        self.active().get(&unit_id).cloned().unwrap_or_default()
    }

    /// Whether a unit carries an effect.
    #[must_use]
    pub fn has_effect(&self, unit_id: EntityId, effect_id: &str) -> bool {
        self.active()
            .get(&unit_id)
            .is_some_and(|effects| effects.iter().any(|e| e.definition.id == effect_id))
    }

    /// Whether a unit is stunned, feared or frozen.
    #[must_use]
    pub fn is_disabled(&self, unit_id: EntityId) -> bool {
        self.active().get(&unit_id).is_some_and(|effects| {
            effects
                .iter()
                .any(|e| e.definition.effect_type.disables())
        })
    }

    /// Units carrying at least one effect.
    #[must_use]
    pub fn affected_units(&self) -> Vec<EntityId> {
        self.active().keys().copied().collect()
    }

    /// Fire due ticks and expire finished effects.
    ///
    /// Effects on dead or removed units are dropped here, one update after
    /// the death, so every effect gets a final decision.
    pub fn update(&self, objects: &mut ObjectManager, now: f64) -> StatusReport {
        let mut report = StatusReport::default();
        let mut active = self.active_mut();

        active.retain(|&unit_id, effects| {
            let Some(unit) = objects.unit_mut(unit_id) else {
                return false;
            };
            if !unit.is_alive() {
                return false;
            }

            for effect in effects.iter_mut() {
                fire_ticks(effect, unit, now, &mut report);
            }

            let base = BaseStats::of(unit, effects);
            let before = effects.len();
            effects.retain(|effect| {
                if effect.is_expired(now) {
                    report
                        .expired
                        .push((unit_id, effect.definition.id.clone()));
                    false
                } else {
                    true
                }
            });
            if effects.len() != before {
                rebalance(effects, unit, base);
            }

            if !unit.is_alive() {
                report.deaths.push(unit_id);
            }
            !effects.is_empty()
        });

        report
    }
}

fn fire_ticks(effect: &mut ActiveEffect, unit: &mut Unit, now: f64, report: &mut StatusReport) {
    let interval = effect.definition.tick_interval;
    if interval <= 0.0 {
        return;
    }
    while effect.ticks_left.is_some_and(|n| n > 0)
        && now - effect.last_tick_at + TIME_EPSILON >= interval
        && unit.is_alive()
    {
        effect.last_tick_at += interval;
        effect.ticks_left = effect.ticks_left.map(|n| n - 1);
        let effect_type = effect.definition.effect_type;
        if effect_type.damages() {
            let dealt = unit.apply_damage(effect.definition.magnitude * effect.stack_count as f32);
            *report.damage.entry(unit.id).or_insert(0.0) += dealt;
        } else if effect_type.disables() {
            disable(unit);
        }
    }
}

fn disable(unit: &mut Unit) {
    unit.current_command = None;
    unit.path.clear();
    unit.path_index = 0;
    unit.awaiting_path = false;
    unit.set_state(UnitState::Idle);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::Command;
    use crate::math::Point3;

    fn objects_with_unit(health: f32) -> (ObjectManager, EntityId) {
        let mut objects = ObjectManager::new();
        let id = objects.insert_unit(|id| Unit::new(id, 1, "soldier", Point3::ZERO).with_health(health));
        (objects, id)
    }

    #[test]
    fn test_poison_stacks_and_ticks() {
        let manager = StatusEffectManager::with_defaults();
        let (mut objects, id) = objects_with_unit(200.0);
        for _ in 0..4 {
            manager
                .apply(objects.unit_mut(id).unwrap(), "poison", None, 0.0)
                .unwrap();
        }
        assert_eq!(manager.effects(id)[0].stack_count, 3);

        let mut now = 0.0;
        while now < 12.0 {
            now += 0.5;
            manager.update(&mut objects, now);
        }
        // 5 ticks * 5 damage * 3 stacks
        assert_eq!(objects.unit(id).unwrap().health(), 125.0);
        assert!(manager.effects(id).is_empty());
    }

    #[test]
    fn test_non_stackable_refreshes_timer() {
        let manager = StatusEffectManager::with_defaults();
        let (mut objects, id) = objects_with_unit(100.0);
        manager.apply(objects.unit_mut(id).unwrap(), "rage", None, 0.0).unwrap();
        manager.apply(objects.unit_mut(id).unwrap(), "rage", None, 5.0).unwrap();
        let effects = manager.effects(id);
        assert_eq!(effects[0].stack_count, 1);
        assert_eq!(effects[0].start_time, 5.0);
        manager.update(&mut objects, 10.0);
        assert!(manager.has_effect(id, "rage"));
        manager.update(&mut objects, 13.0);
        assert!(!manager.has_effect(id, "rage"));
    }

    #[test]
    fn test_slow_reverts_on_expiry() {
        let manager = StatusEffectManager::with_defaults();
        let (mut objects, id) = objects_with_unit(100.0);
        let base_speed = objects.unit(id).unwrap().speed;
        manager.apply(objects.unit_mut(id).unwrap(), "slow", None, 0.0).unwrap();
        assert!(objects.unit(id).unwrap().speed < base_speed);
        manager.update(&mut objects, 5.0);
        assert!((objects.unit(id).unwrap().speed - base_speed).abs() < 1e-5);
    }

    #[test]
    fn test_slow_under_freeze_uses_base_speed() {
        let manager = StatusEffectManager::with_defaults();
        let (mut objects, id) = objects_with_unit(100.0);
        let base_speed = objects.unit(id).unwrap().speed;
        assert!(base_speed > 0.0);
        manager.apply(objects.unit_mut(id).unwrap(), "freeze", None, 0.0).unwrap();
        manager.apply(objects.unit_mut(id).unwrap(), "slow", None, 0.0).unwrap();
        manager.apply(objects.unit_mut(id).unwrap(), "slow", None, 0.0).unwrap();
        assert_eq!(objects.unit(id).unwrap().speed, 0.0);

        // Freeze ends first; two slow stacks still hold the unit at 40%.
        manager.update(&mut objects, 3.0);
        assert!(!manager.has_effect(id, "freeze"));
        let slowed = objects.unit(id).unwrap().speed;
        assert!((slowed - base_speed * 0.4).abs() < 1e-4);

        manager.update(&mut objects, 5.0);
        assert!(manager.effects(id).is_empty());
        assert!((objects.unit(id).unwrap().speed - base_speed).abs() < 1e-4);
    }

    #[test]
    fn test_effect_order_leaves_no_residue() {
        let manager = StatusEffectManager::with_defaults();
        let (mut objects, id) = objects_with_unit(100.0);
        let (speed, damage, armor) = {
            let unit = objects.unit(id).unwrap();
            (unit.speed, unit.attack_damage, unit.armor)
        };
        let unit = objects.unit_mut(id).unwrap();
        manager.apply(unit, "slow", None, 0.0).unwrap();
        manager.apply(unit, "rage", None, 0.0).unwrap();
        manager.apply(unit, "freeze", None, 0.0).unwrap();
        manager.apply(unit, "armor", None, 0.0).unwrap();
        assert!((unit.attack_damage - damage * 1.25).abs() < 1e-4);
        assert!((unit.armor - (armor + 3.0)).abs() < 1e-4);
        assert!(manager.remove(unit, "slow"));
        assert_eq!(unit.speed, 0.0);
        assert!(manager.remove(unit, "freeze"));
        assert!((unit.speed - speed).abs() < 1e-4);
        assert_eq!(manager.dispel(unit, true, false), 2);
        assert!((unit.attack_damage - damage).abs() < 1e-4);
        assert!((unit.armor - armor).abs() < 1e-4);
    }

    #[test]
    fn test_stun_clears_current_command() {
        let manager = StatusEffectManager::with_defaults();
        let (mut objects, id) = objects_with_unit(100.0);
        {
            let unit = objects.unit_mut(id).unwrap();
            unit.current_command = Some(Command::move_to(Point3::ground(5.0, 5.0)));
            unit.start_moving(Point3::ground(5.0, 5.0));
        }
        manager.apply(objects.unit_mut(id).unwrap(), "stun", None, 0.0).unwrap();
        let unit = objects.unit(id).unwrap();
        assert!(unit.current_command.is_none());
        assert_eq!(unit.state(), UnitState::Idle);
        assert!(manager.is_disabled(id));
    }

    #[test]
    fn test_dispel_respects_flags() {
        let manager = StatusEffectManager::with_defaults();
        let (mut objects, id) = objects_with_unit(100.0);
        let unit = objects.unit_mut(id).unwrap();
        manager.apply(unit, "rage", None, 0.0).unwrap();
        manager.apply(unit, "poison", None, 0.0).unwrap();
        manager.apply(unit, "freeze", None, 0.0).unwrap();
        assert_eq!(manager.dispel(unit, false, true), 1);
        assert!(manager.has_effect(id, "rage"));
        assert!(manager.has_effect(id, "freeze"));
        assert_eq!(manager.dispel(unit, true, false), 1);
        assert!(!manager.has_effect(id, "rage"));
    }

    #[test]
    fn test_unknown_effect_and_dead_unit() {
        let manager = StatusEffectManager::with_defaults();
        let (mut objects, id) = objects_with_unit(10.0);
        let unit = objects.unit_mut(id).unwrap();
        assert!(matches!(
            manager.apply(unit, "plague", None, 0.0),
            Err(GameError::UnknownType { .. })
        ));
        unit.apply_damage(100.0);
        assert!(matches!(
            manager.apply(unit, "poison", None, 0.0),
            Err(GameError::DeadUnit(_))
        ));
    }

    #[test]
    fn test_dot_death_is_reported_and_cleaned_next_update() {
        let manager = StatusEffectManager::with_defaults();
        let (mut objects, id) = objects_with_unit(5.0);
        manager.apply(objects.unit_mut(id).unwrap(), "burn", None, 0.0).unwrap();
        let report = manager.update(&mut objects, 1.0);
        assert_eq!(report.deaths, vec![id]);
        assert!(manager.has_effect(id, "burn"));
        manager.update(&mut objects, 1.1);
        assert!(manager.effects(id).is_empty());
    }

    #[test]
    fn test_register_rejects_bad_duration() {
        let manager = StatusEffectManager::new();
        let bad = EffectDefinition::new("broken", EffectType::Burn, 0.0, 1.0);
        assert!(manager.register(bad).is_err());
    }
}
