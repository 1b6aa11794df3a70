//! Damage resolution.
//!
//! Damage types are data: a category that decides how armor mitigates the
//! hit, a penetration fraction, an optional splash radius with a falloff
//! curve, and a list of status effects applied on hit.
//!
//! Resolution of one attack:
//! 1. raw damage = attack damage × formation attack bonus × target formation
//!    defense multiplier × flanking bonus
//! 2. primary damage = max(1, raw − armor reduction of the target); armor
//!    only mitigates targets of the armored class
//! 3. every other unit within the radius takes
//!    max(1, primary × falloff × category modifier of that unit)
//! 4. on-hit effects land on the primary target if it survived

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::components::{EntityId, Unit};
use crate::error::{GameError, Result};
use crate::formations::GroupManager;
use crate::math::Point3;
use crate::objects::ObjectManager;
use crate::status::StatusEffectManager;

/// No hit ever deals less than this.
pub const MIN_DAMAGE: f32 = 1.0;

/// Extra damage fraction when attacking from behind.
pub const FLANK_BONUS: f32 = 0.25;

/// Share of armor that still mitigates magical damage.
const MAGICAL_ARMOR_SHARE: f32 = 0.2;

/// Tag that puts a unit in the armored class.
pub const ARMORED_TAG: &str = "armored";

/// What a target's armor is made of.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ArmorClass {
    /// Flesh. Every category hits it at the baseline.
    Organic,
    /// Plate, hulls and structures. Armor mitigates hits.
    Armored,
}

impl ArmorClass {
    /// Class of a unit, from its tags.
    #[must_use]
    pub fn of_unit(unit: &Unit) -> Self {
        if unit.has_tag(ARMORED_TAG) {
            Self::Armored
        } else {
            Self::Organic
        }
    }
}

/// How a damage type interacts with armor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum DamageCategory {
    /// Fully mitigated by armor, reduced by penetration.
    #[default]
    Physical,
    /// Ignores most armor.
    Magical,
    /// Mitigated like physical; usually paired with splash.
    Siege,
}

/// Splash attenuation curve over `x = distance / radius`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum SplashFalloff {
    /// `1 − x`, inclusive of the edge.
    #[default]
    Linear,
    /// `(1 − x)²`, inclusive of the edge.
    Quadratic,
    /// Full damage strictly inside the radius.
    Constant,
    /// Full damage up to half the radius, then ramps down to zero at the edge.
    Step,
}

impl SplashFalloff {
    /// Multiplier at `distance`, or `None` when the point is outside the splash.
    #[must_use]
    pub fn multiplier(self, distance: f32, radius: f32) -> Option<f32> {
        if radius <= 0.0 || !distance.is_finite() || distance < 0.0 {
            return None;
        }
        let x = distance / radius;
        match self {
            Self::Linear => (x <= 1.0).then(|| 1.0 - x),
            Self::Quadratic => (x <= 1.0).then(|| (1.0 - x) * (1.0 - x)),
            Self::Constant => (x < 1.0).then_some(1.0),
            Self::Step => {
                if x < 0.5 {
                    Some(1.0)
                } else if x < 1.0 {
                    Some(2.0 * (1.0 - x))
                } else {
                    None
                }
            }
        }
    }
}

/// A named damage profile.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DamageType {
    /// Lookup name, matched against `Unit::damage_type`.
    pub name: String,
    /// Armor interaction.
    pub category: DamageCategory,
    /// Fraction of armor ignored, in `[0, 1]`.
    #[serde(default)]
    pub penetration: f32,
    /// Splash radius; zero for single-target.
    #[serde(default)]
    pub splash_radius: f32,
    /// Splash attenuation.
    #[serde(default)]
    pub falloff: SplashFalloff,
    /// Status effect ids applied to the primary target on hit.
    #[serde(default)]
    pub effects: Vec<String>,
}

impl DamageType {
    /// Single-target damage type with no penetration.
    #[must_use]
    pub fn new(name: &str, category: DamageCategory) -> Self {
        Self {
            name: name.to_string(),
            category,
            penetration: 0.0,
            splash_radius: 0.0,
            falloff: SplashFalloff::Linear,
            effects: Vec::new(),
        }
    }

    /// Builder: armor penetration, clamped to `[0, 1]`.
    #[must_use]
    pub fn with_penetration(mut self, penetration: f32) -> Self {
        self.penetration = penetration.clamp(0.0, 1.0);
        self
    }

    /// Builder: splash radius and falloff.
    #[must_use]
    pub fn with_splash(mut self, radius: f32, falloff: SplashFalloff) -> Self {
        self.splash_radius = radius.max(0.0);
        self.falloff = falloff;
        self
    }

    /// Builder: on-hit status effect.
    #[must_use]
    pub fn with_effect(mut self, effect_id: &str) -> Self {
        self.effects.push(effect_id.to_string());
        self
    }

    /// Flat damage removed by `armor` on a target of `class`.
    #[must_use]
    pub fn armor_reduction(&self, armor: f32, class: ArmorClass) -> f32 {
        if class == ArmorClass::Organic {
            return 0.0;
        }
        let armor = armor.max(0.0);
        let effective = match self.category {
            DamageCategory::Physical | DamageCategory::Siege => armor,
            DamageCategory::Magical => armor * MAGICAL_ARMOR_SHARE,
        };
        effective * (1.0 - self.penetration)
    }

    /// Share of `raw` damage that gets through to a target, in `[0, 1]`.
    #[must_use]
    pub fn category_modifier(&self, raw: f32, armor: f32, class: ArmorClass) -> f32 {
        if raw <= 0.0 {
            return 1.0;
        }
        ((raw - self.armor_reduction(armor, class)) / raw).clamp(0.0, 1.0)
    }

    /// Whether this type deals splash damage.
    #[must_use]
    pub fn has_splash(&self) -> bool {
        self.splash_radius > 0.0
    }
}

/// All known damage types.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DamageRegistry {
    types: BTreeMap<String, DamageType>,
}

impl Default for DamageRegistry {
    fn default() -> Self {
        let mut registry = Self::empty();
        registry.register(DamageType::new("normal", DamageCategory::Physical));
        registry.register(DamageType::new("pierce", DamageCategory::Physical).with_penetration(0.3));
        registry.register(DamageType::new("magic", DamageCategory::Magical));
        registry.register(
            DamageType::new("siege", DamageCategory::Siege).with_splash(3.0, SplashFalloff::Linear),
        );
        registry.register(DamageType::new("poison", DamageCategory::Physical).with_effect("poison"));
        registry
    }
}

impl DamageRegistry {
    /// Registry with no types. Unknown names resolve to a plain physical profile.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            types: BTreeMap::new(),
        }
    }

    /// Add or replace a type.
    pub fn register(&mut self, damage_type: DamageType) {
        self.types.insert(damage_type.name.clone(), damage_type);
    }

    /// Look up a type.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&DamageType> {
        self.types.get(name)
    }

    /// Look up a type, falling back to plain physical damage.
    #[must_use]
    pub fn resolve(&self, name: &str) -> DamageType {
        self.get(name)
            .cloned()
            .unwrap_or_else(|| DamageType::new(name, DamageCategory::Physical))
    }
}

/// Multipliers in effect for one attack.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AttackModifiers {
    /// Attacker's formation attack bonus.
    pub formation_attack: f32,
    /// Target's formation damage-taken multiplier.
    pub formation_defense: f32,
    /// Attacker is behind the target and the target is not front line.
    pub flanking: bool,
}

impl Default for AttackModifiers {
    fn default() -> Self {
        Self {
            formation_attack: 1.0,
            formation_defense: 1.0,
            flanking: false,
        }
    }
}

impl AttackModifiers {
    /// Combined multiplier on raw damage.
    #[must_use]
    pub fn multiplier(&self) -> f32 {
        let flank = if self.flanking { 1.0 + FLANK_BONUS } else { 1.0 };
        self.formation_attack * self.formation_defense * flank
    }
}

/// Damage dealt to one entity.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DamageRecord {
    /// Entity hit.
    pub target: EntityId,
    /// Health removed.
    pub damage: f32,
    /// The hit destroyed the target.
    pub killed: bool,
}

/// Outcome of one attack.
#[derive(Debug, Clone, PartialEq)]
pub struct AttackReport {
    /// Hit on the chosen target.
    pub primary: DamageRecord,
    /// Hits on splash victims, in id order.
    pub splash: Vec<DamageRecord>,
}

impl AttackReport {
    /// Damage summed over every hit.
    #[must_use]
    pub fn total_damage(&self) -> f32 {
        self.primary.damage + self.splash.iter().map(|r| r.damage).sum::<f32>()
    }

    /// Every entity killed by the attack.
    pub fn kills(&self) -> impl Iterator<Item = EntityId> + '_ {
        std::iter::once(&self.primary)
            .chain(self.splash.iter())
            .filter(|r| r.killed)
            .map(|r| r.target)
    }
}

/// Unit facing as a ground-plane vector.
#[must_use]
pub fn forward(rotation: f32) -> Point3 {
    Point3::new(rotation.sin(), 0.0, rotation.cos())
}

/// Whether an attack from `attacker_pos` lands on `target`'s back half-plane.
///
/// Units in the front row of their formation cannot be flanked.
#[must_use]
pub fn is_flanking(attacker_pos: Point3, target: &Unit, groups: &GroupManager) -> bool {
    let to_attacker = (attacker_pos - target.position()).flatten();
    forward(target.rotation).dot(to_attacker) < 0.0 && !groups.is_front_line(target.id)
}

/// Modifiers for `attacker` hitting `target`.
#[must_use]
pub fn attack_modifiers(
    objects: &ObjectManager,
    groups: &GroupManager,
    attacker: &Unit,
    target: EntityId,
) -> AttackModifiers {
    let formation_attack = groups
        .formation_of(attacker.id)
        .map_or(1.0, |f| f.attack_bonus());
    let (formation_defense, flanking) = match objects.unit(target) {
        Some(unit) => (
            groups
                .formation_of(target)
                .map_or(1.0, |f| f.defense_multiplier()),
            is_flanking(attacker.position(), unit, groups),
        ),
        None => (1.0, false),
    };
    AttackModifiers {
        formation_attack,
        formation_defense,
        flanking,
    }
}

/// Resolve one attack from `attacker` on `target` (a unit or a building).
pub fn resolve_attack(
    objects: &mut ObjectManager,
    groups: &GroupManager,
    status: &StatusEffectManager,
    registry: &DamageRegistry,
    attacker: EntityId,
    target: EntityId,
    now: f64,
) -> Result<AttackReport> {
    let source = objects.require_unit(attacker)?;
    if !source.is_alive() {
        return Err(GameError::DeadUnit(attacker));
    }
    if !objects.is_target_alive(target) {
        return Err(GameError::InvalidState(format!(
            "attack target {target} is not alive"
        )));
    }
    if objects.owner_of(target) == Some(source.player_id) {
        return Err(GameError::Validation(format!(
            "unit {attacker} cannot attack friendly entity {target}"
        )));
    }

    let damage_type = registry.resolve(&source.damage_type);
    let modifiers = attack_modifiers(objects, groups, source, target);
    let raw = source.attack_damage * modifiers.multiplier();
    let center = objects
        .position_of(target)
        .ok_or(GameError::EntityNotFound(target))?;

    let primary = if let Some(unit) = objects.unit_mut(target) {
        let reduction = damage_type.armor_reduction(unit.armor, ArmorClass::of_unit(unit));
        let damage = (raw - reduction).max(MIN_DAMAGE);
        let dealt = unit.apply_damage(damage);
        DamageRecord {
            target,
            damage: dealt,
            killed: !unit.is_alive(),
        }
    } else {
        let building = objects
            .building_mut(target)
            .ok_or(GameError::EntityNotFound(target))?;
        let reduction = damage_type.armor_reduction(building.armor, ArmorClass::Armored);
        let damage = (raw - reduction).max(MIN_DAMAGE);
        let dealt = building.apply_damage(damage);
        DamageRecord {
            target,
            damage: dealt,
            killed: building.is_destroyed(),
        }
    };

    let mut splash = Vec::new();
    if damage_type.has_splash() {
        for victim_id in objects.units_in_radius(center, damage_type.splash_radius) {
            if victim_id == target {
                continue;
            }
            let Some(victim) = objects.unit_mut(victim_id) else {
                continue;
            };
            let distance = victim.position().distance(center);
            let Some(falloff) = damage_type
                .falloff
                .multiplier(distance, damage_type.splash_radius)
            else {
                continue;
            };
            let modifier =
                damage_type.category_modifier(raw, victim.armor, ArmorClass::of_unit(victim));
            let damage = (primary.damage * falloff * modifier).max(MIN_DAMAGE);
            let dealt = victim.apply_damage(damage);
            splash.push(DamageRecord {
                target: victim_id,
                damage: dealt,
                killed: !victim.is_alive(),
            });
        }
    }

    if let Some(unit) = objects.unit_mut(target) {
        if unit.is_alive() {
            for effect in &damage_type.effects {
                if let Err(err) = status.apply(unit, effect, Some(attacker), now) {
                    tracing::debug!(unit = target, effect = %effect, error = %err, "on-hit effect not applied");
                }
            }
        }
    }

    let report = AttackReport { primary, splash };
    for killed in report.kills() {
        status.clear_unit(killed);
    }
    tracing::debug!(
        attacker,
        target,
        damage = report.primary.damage,
        splash = report.splash.len(),
        flanking = modifiers.flanking,
        "attack resolved"
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::formations::{Formation, FormationParams};

    fn setup() -> (ObjectManager, GroupManager, StatusEffectManager, DamageRegistry) {
        (
            ObjectManager::new(),
            GroupManager::new(FormationParams::default()),
            StatusEffectManager::with_defaults(),
            DamageRegistry::default(),
        )
    }

    fn spawn(objects: &mut ObjectManager, player: u32, x: f32, z: f32) -> EntityId {
        objects.create_unit(player, "soldier", Point3::ground(x, z), None, 0.0)
    }

    #[test]
    fn test_falloff_curves() {
        assert_eq!(SplashFalloff::Linear.multiplier(1.5, 3.0), Some(0.5));
        assert_eq!(SplashFalloff::Quadratic.multiplier(1.5, 3.0), Some(0.25));
        assert_eq!(SplashFalloff::Linear.multiplier(3.0, 3.0), Some(0.0));
        assert_eq!(SplashFalloff::Constant.multiplier(2.9, 3.0), Some(1.0));
        assert_eq!(SplashFalloff::Constant.multiplier(3.0, 3.0), None);
        assert_eq!(SplashFalloff::Step.multiplier(1.0, 3.0), Some(1.0));
        assert_eq!(SplashFalloff::Step.multiplier(3.0, 3.0), None);
        assert!(SplashFalloff::Linear.multiplier(3.1, 3.0).is_none());
    }

    #[test]
    fn test_step_is_monotone() {
        let mut last = f32::INFINITY;
        for i in 0..30 {
            let d = i as f32 * 0.1;
            let m = SplashFalloff::Step.multiplier(d, 3.0).unwrap_or(0.0);
            assert!(m <= last + f32::EPSILON);
            last = m;
        }
    }

    #[test]
    fn test_armor_reduction_by_category() {
        let physical = DamageType::new("p", DamageCategory::Physical).with_penetration(0.5);
        let magical = DamageType::new("m", DamageCategory::Magical);
        assert_eq!(physical.armor_reduction(10.0, ArmorClass::Armored), 5.0);
        assert!((magical.armor_reduction(10.0, ArmorClass::Armored) - 2.0).abs() < 1e-6);
        assert!((physical.category_modifier(20.0, 10.0, ArmorClass::Armored) - 0.75).abs() < 1e-6);
    }

    #[test]
    fn test_organic_targets_are_unmitigated() {
        let physical = DamageType::new("p", DamageCategory::Physical);
        let magical = DamageType::new("m", DamageCategory::Magical);
        assert_eq!(physical.armor_reduction(10.0, ArmorClass::Organic), 0.0);
        assert_eq!(magical.armor_reduction(10.0, ArmorClass::Organic), 0.0);
        assert_eq!(physical.category_modifier(20.0, 10.0, ArmorClass::Organic), 1.0);

        let (mut objects, groups, status, registry) = setup();
        let attacker = spawn(&mut objects, 1, 0.0, 1.0);
        let target = spawn(&mut objects, 2, 0.0, 0.0);
        objects.unit_mut(target).unwrap().armor = 4.0;
        objects.unit_mut(target).unwrap().tags = vec!["organic".into()];
        let report =
            resolve_attack(&mut objects, &groups, &status, &registry, attacker, target, 0.0).unwrap();
        assert_eq!(report.primary.damage, 10.0);
    }

    #[test]
    fn test_minimum_damage() {
        let (mut objects, groups, status, registry) = setup();
        let attacker = spawn(&mut objects, 1, 0.0, 0.0);
        let target = spawn(&mut objects, 2, 1.0, 0.0);
        let unit = objects.unit_mut(target).unwrap();
        unit.armor = 50.0;
        unit.tags = vec![ARMORED_TAG.into()];
        let report =
            resolve_attack(&mut objects, &groups, &status, &registry, attacker, target, 0.0).unwrap();
        assert_eq!(report.primary.damage, MIN_DAMAGE);
    }

    #[test]
    fn test_friendly_fire_rejected() {
        let (mut objects, groups, status, registry) = setup();
        let a = spawn(&mut objects, 1, 0.0, 0.0);
        let b = spawn(&mut objects, 1, 1.0, 0.0);
        let err = resolve_attack(&mut objects, &groups, &status, &registry, a, b, 0.0).unwrap_err();
        assert!(matches!(err, GameError::Validation(_)));
        assert_eq!(objects.unit(b).unwrap().health(), objects.unit(b).unwrap().max_health());
    }

    #[test]
    fn test_flanking_from_behind() {
        let (mut objects, groups, status, registry) = setup();
        // Target faces +z; attacker stands at -z.
        let attacker = spawn(&mut objects, 1, 0.0, -1.0);
        let target = spawn(&mut objects, 2, 0.0, 0.0);
        let report =
            resolve_attack(&mut objects, &groups, &status, &registry, attacker, target, 0.0).unwrap();
        assert!((report.primary.damage - 12.5).abs() < 1e-4);
    }

    #[test]
    fn test_front_line_cannot_be_flanked() {
        let (mut objects, mut groups, _, _) = setup();
        let attacker = spawn(&mut objects, 1, 0.0, -1.0);
        let front = spawn(&mut objects, 2, 0.0, 0.0);
        let rear = spawn(&mut objects, 2, 0.0, 0.0);
        groups
            .create_group(&objects, 2, &[front, rear], Formation::Column)
            .unwrap();
        let attacker_unit = objects.unit(attacker).unwrap();
        assert!(!attack_modifiers(&objects, &groups, attacker_unit, front).flanking);
        assert!(attack_modifiers(&objects, &groups, attacker_unit, rear).flanking);
    }

    #[test]
    fn test_formation_attack_bonus() {
        let (mut objects, mut groups, status, registry) = setup();
        let attacker = spawn(&mut objects, 1, 0.0, 1.0);
        let target = spawn(&mut objects, 2, 0.0, 0.0);
        let group = groups
            .create_group(&objects, 1, &[attacker], Formation::Line)
            .unwrap();
        let report =
            resolve_attack(&mut objects, &groups, &status, &registry, attacker, target, 0.0).unwrap();
        assert!((report.primary.damage - 11.0).abs() < 1e-4);
        groups.set_formation(1, group, Formation::Wedge).unwrap();
        let report =
            resolve_attack(&mut objects, &groups, &status, &registry, attacker, target, 1.0).unwrap();
        assert!((report.primary.damage - 12.0).abs() < 1e-4);
    }

    #[test]
    fn test_splash_scales_primary_damage() {
        let (mut objects, groups, status, registry) = setup();
        let catapult = objects.insert_unit(|id| {
            let mut unit = Unit::new(id, 1, "catapult", Point3::ground(0.0, 8.0))
                .with_attack(40.0, 12.0, 0.25);
            unit.damage_type = "siege".into();
            unit
        });
        let target = objects.insert_unit(|id| Unit::new(id, 2, "soldier", Point3::ZERO).with_health(200.0));
        // Half the 3.0 splash radius away: Linear falloff gives 0.5.
        let enemy = spawn(&mut objects, 2, 1.5, 0.0);
        let friend = spawn(&mut objects, 1, -1.5, 0.0);
        let plated = objects.insert_unit(|id| {
            let mut unit = Unit::new(id, 2, "knight", Point3::ground(0.0, -1.5)).with_armor(10.0);
            unit.tags = vec![ARMORED_TAG.into()];
            unit
        });

        let report =
            resolve_attack(&mut objects, &groups, &status, &registry, catapult, target, 0.0).unwrap();
        assert_eq!(report.primary.damage, 40.0);
        assert_eq!(report.splash.len(), 3);
        let hit = |id: EntityId| report.splash.iter().find(|r| r.target == id).unwrap().damage;
        assert!((hit(enemy) - 20.0).abs() < 1e-4);
        assert!((hit(friend) - 20.0).abs() < 1e-4);
        // 40 × 0.5 × (40 − 10) / 40
        assert!((hit(plated) - 15.0).abs() < 1e-4);
        assert!(report.splash.iter().all(|r| r.target != target));
    }

    #[test]
    fn test_poison_applied_on_hit() {
        let (mut objects, groups, status, registry) = setup();
        let attacker = objects.insert_unit(|id| {
            let mut unit = Unit::new(id, 1, "spider", Point3::ground(0.0, 1.0));
            unit.damage_type = "poison".into();
            unit
        });
        let target = spawn(&mut objects, 2, 0.0, 0.0);
        resolve_attack(&mut objects, &groups, &status, &registry, attacker, target, 0.0).unwrap();
        assert!(status.has_effect(target, "poison"));
    }

    #[test]
    fn test_attack_building() {
        let (mut objects, groups, status, registry) = setup();
        let attacker = spawn(&mut objects, 1, 0.0, 0.0);
        let building = objects.create_building(2, "house", Point3::ground(2.0, 0.0), None);
        let report =
            resolve_attack(&mut objects, &groups, &status, &registry, attacker, building, 0.0).unwrap();
        assert_eq!(report.primary.damage, 10.0);
        assert_eq!(objects.building(building).unwrap().health(), 490.0);
    }
}
