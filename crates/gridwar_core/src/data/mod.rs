//! Data structures for faction configuration.
//!
//! This module contains pure data structures that define faction units,
//! buildings, and tech trees. All structs are designed to be deserialized
//! from RON. [`Catalog`] merges the factions in a match into one lookup.

mod building_data;
mod faction_data;
mod tech_data;
mod unit_data;

use std::collections::BTreeMap;

pub use building_data::{BuildingData, ResourceGeneration};
pub use faction_data::{FactionData, StartingEntity};
pub use tech_data::{TechData, TechEffect, TechEffectType};
pub use unit_data::UnitData;

use crate::error::{GameError, Result};

/// Parse a faction definition from RON text.
///
/// `source` names the origin (usually a path) for error messages.
pub fn parse_faction(text: &str, source: &str) -> Result<FactionData> {
    ron::from_str(text).map_err(|e| GameError::DataParseError {
        path: source.to_string(),
        message: e.to_string(),
    })
}

/// Parse a list of technologies from RON text.
pub fn parse_technologies(text: &str, source: &str) -> Result<Vec<TechData>> {
    ron::from_str(text).map_err(|e| GameError::DataParseError {
        path: source.to_string(),
        message: e.to_string(),
    })
}

/// Merged unit/building templates for every faction in a match.
///
/// When two factions define the same id the first registration wins.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    factions: BTreeMap<String, FactionData>,
    units: BTreeMap<String, UnitData>,
    buildings: BTreeMap<String, BuildingData>,
}

impl Catalog {
    /// Empty catalog; every type falls back to default stats.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Catalog holding the built-in skirmish faction.
    #[must_use]
    pub fn skirmish() -> Self {
        let mut catalog = Self::new();
        catalog.add_faction(FactionData::skirmish());
        catalog
    }

    /// Register a faction and its templates.
    pub fn add_faction(&mut self, faction: FactionData) {
        for unit in &faction.units {
            self.units
                .entry(unit.id.clone())
                .or_insert_with(|| unit.clone());
        }
        for building in &faction.buildings {
            self.buildings
                .entry(building.id.clone())
                .or_insert_with(|| building.clone());
        }
        self.factions.insert(faction.id.clone(), faction);
    }

    /// Register a standalone unit template, replacing any previous one.
    pub fn add_unit(&mut self, unit: UnitData) {
        self.units.insert(unit.id.clone(), unit);
    }

    /// Register a standalone building template, replacing any previous one.
    pub fn add_building(&mut self, building: BuildingData) {
        self.buildings.insert(building.id.clone(), building);
    }

    /// Look up a faction.
    #[must_use]
    pub fn faction(&self, id: &str) -> Option<&FactionData> {
        self.factions.get(id)
    }

    /// Look up a unit template.
    #[must_use]
    pub fn unit(&self, id: &str) -> Option<&UnitData> {
        self.units.get(id)
    }

    /// Look up a building template.
    #[must_use]
    pub fn building(&self, id: &str) -> Option<&BuildingData> {
        self.buildings.get(id)
    }

    /// Look up a unit template, failing with `UnknownType`.
    pub fn require_unit(&self, id: &str) -> Result<&UnitData> {
        self.unit(id).ok_or_else(|| GameError::UnknownType {
            kind: "unit",
            name: id.to_string(),
        })
    }

    /// Look up a building template, failing with `UnknownType`.
    pub fn require_building(&self, id: &str) -> Result<&BuildingData> {
        self.building(id).ok_or_else(|| GameError::UnknownType {
            kind: "building",
            name: id.to_string(),
        })
    }

    /// All registered factions.
    pub fn factions(&self) -> impl Iterator<Item = &FactionData> {
        self.factions.values()
    }

    /// All registered unit templates.
    pub fn units(&self) -> impl Iterator<Item = &UnitData> {
        self.units.values()
    }

    /// Every technology defined by any registered faction.
    pub fn technologies(&self) -> impl Iterator<Item = &TechData> {
        self.factions.values().flat_map(|f| f.technologies.iter())
    }

    /// Population slots a unit type consumes (1 for unknown types).
    #[must_use]
    pub fn population_cost(&self, unit_type: &str) -> u32 {
        self.unit(unit_type).map_or(1, |u| u.population_cost)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_skirmish_catalog_lookups() {
        let catalog = Catalog::skirmish();
        assert!(catalog.unit("archer").is_some());
        assert!(catalog.building("barracks").is_some());
        assert_eq!(catalog.population_cost("catapult"), 3);
        assert_eq!(catalog.population_cost("ghost"), 1);
        assert!(catalog.technologies().any(|t| t.id == "forging"));
    }

    #[test]
    fn test_require_unknown_type() {
        let catalog = Catalog::new();
        let err = catalog.require_unit("dragon").unwrap_err();
        assert!(matches!(err, GameError::UnknownType { kind: "unit", .. }));
    }

    #[test]
    fn test_parse_faction_error_names_source() {
        let err = parse_faction("FactionData(", "factions/broken.ron").unwrap_err();
        match err {
            GameError::DataParseError { path, .. } => assert_eq!(path, "factions/broken.ron"),
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
