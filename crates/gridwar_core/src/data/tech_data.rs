//! Tech tree data structures for data-driven technology definitions.

use serde::{Deserialize, Serialize};

use crate::economy::ResourceMap;

/// Type of effect a technology provides.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum TechEffectType {
    /// Modify a stat by a percentage.
    StatModifierPercent {
        /// The stat to modify (`"damage"`, `"speed"`, `"health"`, `"armor"`, `"range"`).
        stat: String,
        /// Percentage modifier (e.g., 15 for +15%).
        percent: i32,
    },

    /// Modify a stat by a flat amount.
    StatModifierFlat {
        /// The stat to modify.
        stat: String,
        /// Flat amount to add.
        amount: f32,
    },

    /// Unlock a unit or building for production.
    Unlock {
        /// ID of the unit or building to unlock.
        target_id: String,
    },
}

/// Effect of researching a technology.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TechEffect {
    /// Type of effect.
    pub effect_type: TechEffectType,

    /// Unit type IDs this effect applies to.
    /// Empty (together with `applies_to_tags`) means every unit.
    #[serde(default)]
    pub applies_to: Vec<String>,

    /// Tags this effect applies to (e.g., "infantry", "siege").
    #[serde(default)]
    pub applies_to_tags: Vec<String>,
}

impl TechEffect {
    /// Whether this effect targets a unit with the given type and tags.
    #[must_use]
    pub fn applies(&self, unit_type: &str, tags: &[String]) -> bool {
        if self.applies_to.is_empty() && self.applies_to_tags.is_empty() {
            return true;
        }
        self.applies_to.iter().any(|t| t == unit_type)
            || self.applies_to_tags.iter().any(|t| tags.contains(t))
    }
}

/// Data-driven technology definition.
///
/// # Example RON
///
/// ```ron
/// TechData(
///     id: "forging",
///     name: "Forging",
///     cost: {"gold": 100, "wood": 50},
///     research_time: 30.0,
///     effects: [
///         TechEffect(
///             effect_type: StatModifierPercent(stat: "damage", percent: 15),
///             applies_to_tags: ["infantry"],
///         ),
///     ],
/// )
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TechData {
    /// Unique string identifier for this technology.
    pub id: String,

    /// Display name.
    pub name: String,

    /// Flavour text.
    #[serde(default)]
    pub description: String,

    /// Resources deducted when research starts.
    #[serde(default)]
    pub cost: ResourceMap,

    /// Research time in seconds.
    pub research_time: f32,

    /// Effects granted when this technology is completed.
    #[serde(default)]
    pub effects: Vec<TechEffect>,

    /// Technology IDs that must be researched first.
    #[serde(default)]
    pub prerequisites: Vec<String>,

    /// Tech tier this technology belongs to (1, 2, or 3).
    #[serde(default = "default_tier")]
    pub tier: u8,

    /// Technologies that become unavailable if this is researched.
    #[serde(default)]
    pub exclusive_with: Vec<String>,

    /// Building ID where this technology can be researched.
    #[serde(default)]
    pub researched_at: Option<String>,
}

/// Default tier for technologies without explicit tier.
const fn default_tier() -> u8 {
    1
}

impl TechData {
    /// Check if this technology has a specific prerequisite.
    #[must_use]
    pub fn requires(&self, tech_id: &str) -> bool {
        self.prerequisites.iter().any(|t| t == tech_id)
    }

    /// Check if this technology is mutually exclusive with another.
    #[must_use]
    pub fn excludes(&self, tech_id: &str) -> bool {
        self.exclusive_with.iter().any(|t| t == tech_id)
    }

    /// Get all stat modifiers from this technology's effects.
    ///
    /// Returns `(stat, value, is_percent, effect)` tuples.
    pub fn stat_modifiers(&self) -> impl Iterator<Item = (&str, f32, bool, &TechEffect)> {
        self.effects.iter().filter_map(|e| match &e.effect_type {
            TechEffectType::StatModifierPercent { stat, percent } => {
                Some((stat.as_str(), *percent as f32, true, e))
            }
            TechEffectType::StatModifierFlat { stat, amount } => {
                Some((stat.as_str(), *amount, false, e))
            }
            TechEffectType::Unlock { .. } => None,
        })
    }

    /// IDs unlocked by this technology.
    pub fn unlocks(&self) -> impl Iterator<Item = &str> {
        self.effects.iter().filter_map(|e| match &e.effect_type {
            TechEffectType::Unlock { target_id } => Some(target_id.as_str()),
            _ => None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_tech() -> TechData {
        TechData {
            id: "forging".to_string(),
            name: "Forging".to_string(),
            description: String::new(),
            cost: ResourceMap::new(),
            research_time: 30.0,
            effects: vec![
                TechEffect {
                    effect_type: TechEffectType::StatModifierPercent {
                        stat: "damage".to_string(),
                        percent: 15,
                    },
                    applies_to: vec![],
                    applies_to_tags: vec!["infantry".to_string()],
                },
                TechEffect {
                    effect_type: TechEffectType::Unlock {
                        target_id: "knight".to_string(),
                    },
                    applies_to: vec![],
                    applies_to_tags: vec![],
                },
            ],
            prerequisites: vec!["mining".to_string()],
            tier: 1,
            exclusive_with: vec!["pacifism".to_string()],
            researched_at: Some("blacksmith".to_string()),
        }
    }

    #[test]
    fn test_requires_and_excludes() {
        let tech = create_test_tech();
        assert!(tech.requires("mining"));
        assert!(!tech.requires("unknown_tech"));
        assert!(tech.excludes("pacifism"));
    }

    #[test]
    fn test_stat_modifiers() {
        let tech = create_test_tech();
        let mods: Vec<_> = tech.stat_modifiers().collect();
        assert_eq!(mods.len(), 1);
        assert_eq!(mods[0].0, "damage");
        assert_eq!(mods[0].1, 15.0);
        assert!(mods[0].2);
        assert_eq!(tech.unlocks().collect::<Vec<_>>(), vec!["knight"]);
    }

    #[test]
    fn test_effect_targeting() {
        let tech = create_test_tech();
        let effect = &tech.effects[0];
        assert!(effect.applies("swordsman", &["infantry".to_string()]));
        assert!(!effect.applies("catapult", &["siege".to_string()]));
        assert!(tech.effects[1].applies("anything", &[]));
    }
}
