//! Building data structures for data-driven building definitions.

use serde::{Deserialize, Serialize};

use crate::economy::ResourceMap;

/// Passive income produced by a completed building.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceGeneration {
    /// Resource granted.
    pub resource: String,
    /// Base units per second before upgrade and match multipliers.
    pub rate: f32,
}

/// Data-driven building definition.
///
/// # Example RON
///
/// ```ron
/// BuildingData(
///     id: "farm",
///     name: "Farm",
///     cost: {"wood": 60},
///     build_time: 20.0,
///     generates: Some(ResourceGeneration(resource: "food", rate: 0.5)),
/// )
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuildingData {
    /// Unique string identifier for this building type.
    pub id: String,

    /// Display name.
    pub name: String,

    /// Flavour text.
    #[serde(default)]
    pub description: String,

    /// Resources deducted when the site is placed.
    #[serde(default)]
    pub cost: ResourceMap,

    /// Seconds a single worker needs to finish construction.
    #[serde(default = "default_build_time")]
    pub build_time: f32,

    /// Maximum health points.
    #[serde(default = "default_health")]
    pub health: f32,

    /// Flat damage mitigation.
    #[serde(default)]
    pub armor: f32,

    /// Unit types this building can produce.
    #[serde(default)]
    pub produces: Vec<String>,

    /// Population cap added while the building stands.
    #[serde(default)]
    pub housing: u32,

    /// Passive income once built.
    #[serde(default)]
    pub generates: Option<ResourceGeneration>,

    /// Technologies or buildings required before placement.
    #[serde(default)]
    pub tech_required: Vec<String>,

    /// Tags for categorization.
    #[serde(default)]
    pub tags: Vec<String>,

    /// Losing every main base building is not required for defeat, but AIs
    /// anchor their base around it.
    #[serde(default)]
    pub is_main_base: bool,
}

fn default_build_time() -> f32 {
    30.0
}

fn default_health() -> f32 {
    500.0
}

impl BuildingData {
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
            produces: Vec::new(),
            housing: 0,
            generates: None,
            tech_required: Vec::new(),
            tags: Vec::new(),
            is_main_base: false,
        }
    }

    /// Check if this building can produce a specific unit.
    #[must_use]
    pub fn can_produce(&self, unit_id: &str) -> bool {
        self.produces.iter().any(|u| u == unit_id)
    }

    /// Check if this building requires a specific technology.
    #[must_use]
    pub fn requires_tech(&self, tech_id: &str) -> bool {
        self.tech_required.iter().any(|t| t == tech_id)
    }

    /// Check if this building has a specific tag.
    #[must_use]
    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| t == tag)
    }
}
