//! Unit data structures for data-driven unit definitions.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::components::defaults;
use crate::economy::ResourceMap;

/// Data-driven unit definition.
///
/// Used to stamp out [`Unit`](crate::components::Unit)s and to price
/// production orders.
///
/// # Example RON
///
/// ```ron
/// UnitData(
///     id: "archer",
///     name: "Archer",
///     cost: {"gold": 40, "wood": 40},
///     build_time: 12.0,
///     health: 70.0,
///     attack_damage: 9.0,
///     attack_range: 7.0,
///     damage_type: "pierce",
///     produced_at: ["barracks"],
///     tags: ["infantry", "organic"],
/// )
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnitData {
    /// Unique string identifier for this unit type.
    pub id: String,

    /// Display name.
    pub name: String,

    /// Flavour text.
    #[serde(default)]
    pub description: String,

    /// Resources deducted when production is queued.
    #[serde(default)]
    pub cost: ResourceMap,

    /// Production time in seconds.
    #[serde(default = "default_build_time")]
    pub build_time: f32,

    /// Maximum health points.
    #[serde(default = "default_health")]
    pub health: f32,

    /// Flat damage mitigation.
    #[serde(default)]
    pub armor: f32,

    /// Maximum energy.
    #[serde(default)]
    pub energy: f32,

    /// World units per second.
    #[serde(default = "default_speed")]
    pub speed: f32,

    /// Damage per attack. Zero for non-combatants.
    #[serde(default = "default_attack_damage")]
    pub attack_damage: f32,

    /// Attack reach.
    #[serde(default = "default_attack_range")]
    pub attack_range: f32,

    /// Attacks per second.
    #[serde(default = "default_attack_speed")]
    pub attack_speed: f32,

    /// Name of the registered damage type this unit deals.
    #[serde(default = "default_damage_type")]
    pub damage_type: String,

    /// Units gathered per second, by resource. Non-empty means worker.
    #[serde(default)]
    pub gather_rates: BTreeMap<String, f32>,

    /// Population slots consumed.
    #[serde(default = "default_population_cost")]
    pub population_cost: u32,

    /// Technologies or buildings required before production.
    #[serde(default)]
    pub tech_required: Vec<String>,

    /// Buildings that can train this unit.
    #[serde(default)]
    pub produced_at: Vec<String>,

    /// Free-form tags used by tech effects and AI role selection.
    #[serde(default)]
    pub tags: Vec<String>,
}

fn default_build_time() -> f32 {
    10.0
}

fn default_health() -> f32 {
    defaults::HEALTH
}

fn default_speed() -> f32 {
    defaults::SPEED
}

fn default_attack_damage() -> f32 {
    defaults::ATTACK_DAMAGE
}

fn default_attack_range() -> f32 {
    defaults::ATTACK_RANGE
}

fn default_attack_speed() -> f32 {
    defaults::ATTACK_SPEED
}

fn default_damage_type() -> String {
    defaults::DAMAGE_TYPE.to_string()
}

const fn default_population_cost() -> u32 {
    1
}

impl UnitData {
    /// Minimal template with default stats.
    #[must_use]
    pub fn new(id: &str) -> Self {
        Self {
            id: id.to_string(),
            name: id.to_string(),
            description: String::new(),
            cost: ResourceMap::new(),
            build_time: default_build_time(),
            health: default_health(),
            armor: 0.0,
            energy: 0.0,
            speed: default_speed(),
            attack_damage: default_attack_damage(),
            attack_range: default_attack_range(),
            attack_speed: default_attack_speed(),
            damage_type: default_damage_type(),
            gather_rates: BTreeMap::new(),
            population_cost: default_population_cost(),
            tech_required: Vec::new(),
            produced_at: Vec::new(),
            tags: Vec::new(),
        }
    }

    /// Check if this unit has a specific tag.
    #[must_use]
    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| t == tag)
    }

    /// Whether this unit can gather resources.
    #[must_use]
    pub fn is_worker(&self) -> bool {
        !self.gather_rates.is_empty()
    }

    /// Whether this unit can be trained at `building_id`.
    ///
    /// Units with no `produced_at` list can be trained anywhere.
    #[must_use]
    pub fn can_be_produced_at(&self, building_id: &str) -> bool {
        self.produced_at.is_empty() || self.produced_at.iter().any(|b| b == building_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ron_defaults_fill_missing_fields() {
        let unit: UnitData = ron::from_str(r#"(id: "militia", name: "Militia")"#).unwrap();
        assert_eq!(unit.health, defaults::HEALTH);
        assert_eq!(unit.damage_type, "normal");
        assert_eq!(unit.population_cost, 1);
        assert!(!unit.is_worker());
    }

    #[test]
    fn test_ron_full_definition() {
        let ron_str = r#"
            UnitData(
                id: "worker",
                name: "Worker",
                cost: {"gold": 50},
                gather_rates: {"gold": 2.0, "wood": 1.5},
                produced_at: ["town_hall"],
                tags: ["worker"],
            )
        "#;
        let unit: UnitData = ron::from_str(ron_str).unwrap();
        assert!(unit.is_worker());
        assert_eq!(unit.cost.get("gold"), Some(&50));
        assert!(unit.can_be_produced_at("town_hall"));
        assert!(!unit.can_be_produced_at("barracks"));
    }
}
