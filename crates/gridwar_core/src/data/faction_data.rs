//! Faction data structure combining all faction-specific definitions.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::building_data::{BuildingData, ResourceGeneration};
use super::tech_data::{TechData, TechEffect, TechEffectType};
use super::unit_data::UnitData;
use crate::economy::{resource_map, ResourceMap};

/// Complete faction data definition.
///
/// Contains all units, buildings, and technologies for a single faction.
///
/// # Example RON
///
/// ```ron
/// FactionData(
///     id: "northmen",
///     display_name: "Northmen",
///     units: [...],
///     buildings: [...],
///     technologies: [...],
///     starting_resources: {"gold": 500, "wood": 300},
/// )
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FactionData {
    /// Faction identifier.
    pub id: String,

    /// Display name.
    pub display_name: String,

    /// Flavour text.
    #[serde(default)]
    pub description: String,

    /// All unit types available to this faction.
    #[serde(default)]
    pub units: Vec<UnitData>,

    /// All building types available to this faction.
    #[serde(default)]
    pub buildings: Vec<BuildingData>,

    /// All technologies available to this faction.
    #[serde(default)]
    pub technologies: Vec<TechData>,

    /// Starting units when a match begins.
    #[serde(default)]
    pub starting_units: Vec<StartingEntity>,

    /// Starting buildings when a match begins. These spawn fully built.
    #[serde(default)]
    pub starting_buildings: Vec<StartingEntity>,

    /// Starting stockpile.
    #[serde(default)]
    pub starting_resources: ResourceMap,
}

/// Definition for a starting unit or building.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StartingEntity {
    /// ID of the unit or building type.
    pub type_id: String,

    /// Spawn offset from the player start position along x.
    #[serde(default)]
    pub offset_x: f32,

    /// Spawn offset from the player start position along z.
    #[serde(default)]
    pub offset_z: f32,
}

impl StartingEntity {
    /// Starting entity at an offset.
    #[must_use]
    pub fn new(type_id: &str, offset_x: f32, offset_z: f32) -> Self {
        Self {
            type_id: type_id.to_string(),
            offset_x,
            offset_z,
        }
    }
}

impl FactionData {
    /// Find a unit by its ID.
    #[must_use]
    pub fn get_unit(&self, id: &str) -> Option<&UnitData> {
        self.units.iter().find(|u| u.id == id)
    }

    /// Find a building by its ID.
    #[must_use]
    pub fn get_building(&self, id: &str) -> Option<&BuildingData> {
        self.buildings.iter().find(|b| b.id == id)
    }

    /// Find a technology by its ID.
    #[must_use]
    pub fn get_technology(&self, id: &str) -> Option<&TechData> {
        self.technologies.iter().find(|t| t.id == id)
    }

    /// Validate internal consistency of faction data.
    ///
    /// Checks for:
    /// - Unit references in buildings are valid
    /// - Tech prerequisites and exclusions exist
    /// - Building references in units are valid
    /// - Starting entities exist
    ///
    /// Returns a list of validation errors.
    #[must_use]
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();
        let known_requirement =
            |id: &str| self.get_technology(id).is_some() || self.get_building(id).is_some();

        for building in &self.buildings {
            for unit_id in &building.produces {
                if self.get_unit(unit_id).is_none() {
                    errors.push(format!(
                        "Building '{}' produces unknown unit '{}'",
                        building.id, unit_id
                    ));
                }
            }
            for tech_id in &building.tech_required {
                if !known_requirement(tech_id) {
                    errors.push(format!(
                        "Building '{}' requires unknown tech or building '{}'",
                        building.id, tech_id
                    ));
                }
            }
            if let Some(generation) = &building.generates {
                if !(generation.rate.is_finite() && generation.rate >= 0.0) {
                    errors.push(format!(
                        "Building '{}' has invalid generation rate {}",
                        building.id, generation.rate
                    ));
                }
            }
        }

        for unit in &self.units {
            for building_id in &unit.produced_at {
                if self.get_building(building_id).is_none() {
                    errors.push(format!(
                        "Unit '{}' produced at unknown building '{}'",
                        unit.id, building_id
                    ));
                }
            }
            for tech_id in &unit.tech_required {
                if !known_requirement(tech_id) {
                    errors.push(format!(
                        "Unit '{}' requires unknown tech or building '{}'",
                        unit.id, tech_id
                    ));
                }
            }
            if unit.health <= 0.0 {
                errors.push(format!("Unit '{}' has non-positive health", unit.id));
            }
        }

        for tech in &self.technologies {
            for prereq_id in &tech.prerequisites {
                if !known_requirement(prereq_id) {
                    errors.push(format!(
                        "Tech '{}' has unknown prerequisite '{}'",
                        tech.id, prereq_id
                    ));
                }
            }
            for exclusive_id in &tech.exclusive_with {
                if self.get_technology(exclusive_id).is_none() {
                    errors.push(format!(
                        "Tech '{}' is exclusive with unknown tech '{}'",
                        tech.id, exclusive_id
                    ));
                }
            }
        }

        for entity in &self.starting_units {
            if self.get_unit(&entity.type_id).is_none() {
                errors.push(format!("Starting unit '{}' not found", entity.type_id));
            }
        }
        for entity in &self.starting_buildings {
            if self.get_building(&entity.type_id).is_none() {
                errors.push(format!("Starting building '{}' not found", entity.type_id));
            }
        }

        errors
    }

    /// The built-in skirmish faction used when a match supplies no data files.
    #[must_use]
    pub fn skirmish() -> Self {
        Self {
            id: "skirmish".to_string(),
            display_name: "Skirmish".to_string(),
            description: "Balanced default roster".to_string(),
            units: skirmish_units(),
            buildings: skirmish_buildings(),
            technologies: skirmish_technologies(),
            starting_units: vec![
                StartingEntity::new("worker", -2.0, 3.0),
                StartingEntity::new("worker", 0.0, 3.0),
                StartingEntity::new("worker", 2.0, 3.0),
                StartingEntity::new("swordsman", 0.0, 5.0),
            ],
            starting_buildings: vec![StartingEntity::new("town_hall", 0.0, 0.0)],
            starting_resources: resource_map(&[("gold", 500), ("wood", 300), ("food", 100)]),
        }
    }
}

fn unit(
    id: &str,
    health: f32,
    armor: f32,
    speed: f32,
    attack: (f32, f32, f32),
    damage_type: &str,
    cost: &[(&str, i64)],
    produced_at: &str,
    tags: &[&str],
) -> UnitData {
    let mut data = UnitData::new(id);
    data.name = title_case(id);
    data.health = health;
    data.armor = armor;
    data.speed = speed;
    data.attack_damage = attack.0;
    data.attack_range = attack.1;
    data.attack_speed = attack.2;
    data.damage_type = damage_type.to_string();
    data.cost = resource_map(cost);
    data.produced_at = vec![produced_at.to_string()];
    data.tags = tags.iter().map(|t| (*t).to_string()).collect();
    data
}

fn skirmish_units() -> Vec<UnitData> {
    let mut worker = unit(
        "worker",
        40.0,
        0.0,
        3.0,
        (3.0, 1.0, 1.0),
        "normal",
        &[("gold", 50)],
        "town_hall",
        &["worker", "organic"],
    );
    worker.build_time = 10.0;
    worker.gather_rates = BTreeMap::from([
        ("gold".to_string(), 2.0),
        ("wood".to_string(), 2.0),
        ("food".to_string(), 2.0),
    ]);

    let mut catapult = unit(
        "catapult",
        150.0,
        4.0,
        1.5,
        (40.0, 12.0, 0.25),
        "siege",
        &[("gold", 150), ("wood", 100)],
        "workshop",
        &["siege", "armored"],
    );
    catapult.population_cost = 3;
    catapult.build_time = 30.0;

    let mut general = unit(
        "general",
        250.0,
        4.0,
        3.0,
        (18.0, 1.5, 1.0),
        "normal",
        &[("gold", 200)],
        "barracks",
        &["infantry", "armored", "hero"],
    );
    general.population_cost = 2;

    vec![
        worker,
        unit(
            "swordsman",
            120.0,
            2.0,
            3.0,
            (12.0, 1.5, 1.0),
            "normal",
            &[("gold", 60), ("wood", 20)],
            "barracks",
            &["infantry", "armored"],
        ),
        unit(
            "archer",
            70.0,
            0.0,
            3.2,
            (9.0, 7.0, 1.0),
            "pierce",
            &[("gold", 40), ("wood", 40)],
            "barracks",
            &["infantry", "ranged", "organic"],
        ),
        unit(
            "scout",
            60.0,
            0.0,
            6.0,
            (4.0, 1.5, 1.0),
            "normal",
            &[("gold", 40), ("food", 20)],
            "town_hall",
            &["cavalry", "organic"],
        ),
        unit(
            "guard",
            150.0,
            3.0,
            2.5,
            (10.0, 1.5, 1.0),
            "normal",
            &[("gold", 70), ("wood", 30)],
            "barracks",
            &["infantry", "armored"],
        ),
        unit(
            "builder",
            50.0,
            0.0,
            3.0,
            (2.0, 1.0, 1.0),
            "normal",
            &[("gold", 60)],
            "town_hall",
            &["worker", "organic"],
        ),
        general,
        catapult,
    ]
}

fn building(
    id: &str,
    health: f32,
    build_time: f32,
    cost: &[(&str, i64)],
    produces: &[&str],
    housing: u32,
) -> BuildingData {
    let mut data = BuildingData::new(id);
    data.name = title_case(id);
    data.health = health;
    data.build_time = build_time;
    data.cost = resource_map(cost);
    data.produces = produces.iter().map(|p| (*p).to_string()).collect();
    data.housing = housing;
    data
}

fn skirmish_buildings() -> Vec<BuildingData> {
    let mut town_hall = building(
        "town_hall",
        1500.0,
        60.0,
        &[("gold", 400), ("wood", 200)],
        &["worker", "builder", "scout"],
        10,
    );
    town_hall.armor = 5.0;
    town_hall.is_main_base = true;
    town_hall.generates = Some(ResourceGeneration {
        resource: "gold".to_string(),
        rate: 1.0,
    });

    let mut farm = building("farm", 300.0, 20.0, &[("wood", 60)], &[], 0);
    farm.generates = Some(ResourceGeneration {
        resource: "food".to_string(),
        rate: 0.5,
    });

    let mut lumber_mill = building("lumber_mill", 400.0, 25.0, &[("wood", 100)], &[], 0);
    lumber_mill.generates = Some(ResourceGeneration {
        resource: "wood".to_string(),
        rate: 0.5,
    });

    vec![
        town_hall,
        building(
            "barracks",
            800.0,
            30.0,
            &[("gold", 150), ("wood", 100)],
            &["swordsman", "archer", "guard", "general"],
            0,
        ),
        building(
            "workshop",
            700.0,
            40.0,
            &[("gold", 200), ("wood", 200)],
            &["catapult"],
            0,
        ),
        building("house", 300.0, 15.0, &[("wood", 50)], &[], 5),
        farm,
        lumber_mill,
    ]
}

fn tech(id: &str, cost: &[(&str, i64)], research_time: f32, effects: Vec<TechEffect>) -> TechData {
    TechData {
        id: id.to_string(),
        name: title_case(id),
        description: String::new(),
        cost: resource_map(cost),
        research_time,
        effects,
        prerequisites: Vec::new(),
        tier: 1,
        exclusive_with: Vec::new(),
        researched_at: None,
    }
}

fn percent(stat: &str, percent: i32, tags: &[&str]) -> TechEffect {
    TechEffect {
        effect_type: TechEffectType::StatModifierPercent {
            stat: stat.to_string(),
            percent,
        },
        applies_to: Vec::new(),
        applies_to_tags: tags.iter().map(|t| (*t).to_string()).collect(),
    }
}

fn skirmish_technologies() -> Vec<TechData> {
    let forging = tech(
        "forging",
        &[("gold", 100), ("wood", 50)],
        30.0,
        vec![percent("damage", 15, &["infantry"])],
    );

    let mut ballistics = tech(
        "ballistics",
        &[("gold", 150), ("wood", 150)],
        45.0,
        vec![percent("damage", 20, &["siege"]), percent("range", 10, &["siege"])],
    );
    ballistics.prerequisites = vec!["forging".to_string()];
    ballistics.tier = 2;

    let mut fortification = tech(
        "fortification",
        &[("gold", 120)],
        40.0,
        vec![TechEffect {
            effect_type: TechEffectType::StatModifierFlat {
                stat: "armor".to_string(),
                amount: 2.0,
            },
            applies_to: Vec::new(),
            applies_to_tags: vec!["infantry".to_string()],
        }],
    );
    fortification.exclusive_with = vec!["mobilization".to_string()];
    fortification.tier = 2;

    let mut mobilization = tech(
        "mobilization",
        &[("gold", 120)],
        40.0,
        vec![percent("speed", 10, &["infantry", "cavalry"])],
    );
    mobilization.exclusive_with = vec!["fortification".to_string()];
    mobilization.tier = 2;

    vec![forging, ballistics, fortification, mobilization]
}

fn title_case(id: &str) -> String {
    id.split('_')
        .map(|word| {
            let mut chars = word.chars();
            chars.next().map_or_else(String::new, |first| {
                first.to_uppercase().chain(chars).collect::<String>()
            })
        })
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_skirmish_faction_is_consistent() {
        let faction = FactionData::skirmish();
        let errors = faction.validate();
        assert!(errors.is_empty(), "Errors: {errors:?}");
        assert!(faction.get_unit("worker").is_some_and(UnitData::is_worker));
        assert_eq!(faction.get_building("house").map(|b| b.housing), Some(5));
    }

    #[test]
    fn test_validate_invalid_reference() {
        let mut faction = FactionData::skirmish();
        faction.buildings[0].produces.push("dragon".to_string());
        let errors = faction.validate();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].contains("unknown unit"));
    }

    #[test]
    fn test_validate_unknown_starting_unit() {
        let mut faction = FactionData::skirmish();
        faction.starting_units.push(StartingEntity::new("wizard", 0.0, 0.0));
        assert!(faction
            .validate()
            .iter()
            .any(|e| e.contains("Starting unit 'wizard'")));
    }

    #[test]
    fn test_title_case() {
        assert_eq!(title_case("town_hall"), "Town Hall");
        assert_eq!(title_case("archer"), "Archer");
    }

    #[test]
    fn test_ron_round_trip_keeps_roster() {
        let faction = FactionData::skirmish();
        let text = ron::to_string(&faction).unwrap();
        let parsed: FactionData = ron::from_str(&text).unwrap();
        assert_eq!(parsed, faction);
    }
}
