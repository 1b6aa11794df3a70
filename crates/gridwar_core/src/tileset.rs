//! Tileset descriptions.
//!
//! A tileset names the surfaces a map's surface bytes refer to, the terrain
//! objects its object bytes refer to, ambient sounds, and environment
//! settings. The core only consumes the structure; hosts convert their
//! source format to RON.

use serde::{Deserialize, Serialize};

use crate::error::{AssetError, GameError, Result};

/// Tolerance on the weather probability sum.
pub const WEATHER_SUM_TOLERANCE: f32 = 0.01;

/// One texture choice for a surface.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextureVariation {
    /// Texture asset path.
    pub path: String,
    /// Relative weight.
    pub probability: f32,
}

/// A ground surface with weighted texture variations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Surface {
    /// Surface name.
    pub name: String,
    /// Texture choices.
    pub textures: Vec<TextureVariation>,
}

impl Surface {
    /// Sum of texture weights.
    #[must_use]
    pub fn probability_sum(&self) -> f32 {
        self.textures.iter().map(|t| t.probability).sum()
    }

    /// Texture selected by `roll` in `[0, 1)` over the normalised weights.
    #[must_use]
    pub fn pick_texture(&self, roll: f32) -> Option<&TextureVariation> {
        let total = self.probability_sum();
        if total <= 0.0 {
            return None;
        }
        let mut threshold = roll.clamp(0.0, 1.0) * total;
        for texture in &self.textures {
            if threshold < texture.probability {
                return Some(texture);
            }
            threshold -= texture.probability;
        }
        self.textures.iter().rev().find(|t| t.probability > 0.0)
    }
}

/// A placeable terrain object (tree, rock...).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TerrainObject {
    /// Object name.
    pub name: String,
    /// Model asset paths.
    #[serde(default)]
    pub models: Vec<String>,
    /// Units can cross it.
    #[serde(default)]
    pub walkable: bool,
}

/// Ambient sound groups.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AmbientSounds {
    /// Daytime loop.
    pub day: Vec<String>,
    /// Night loop.
    pub night: Vec<String>,
    /// Rain loop.
    pub rain: Vec<String>,
    /// Snow loop.
    pub snow: Vec<String>,
    /// Played at dawn.
    pub day_start: Vec<String>,
    /// Played at dusk.
    pub night_start: Vec<String>,
}

/// Chance of each weather kind.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WeatherProbabilities {
    /// Clear skies.
    pub sun: f32,
    /// Rain.
    pub rain: f32,
    /// Snow.
    pub snow: f32,
}

impl Default for WeatherProbabilities {
    fn default() -> Self {
        Self {
            sun: 1.0,
            rain: 0.0,
            snow: 0.0,
        }
    }
}

impl WeatherProbabilities {
    /// Sum of all three.
    #[must_use]
    pub fn sum(&self) -> f32 {
        self.sun + self.rain + self.snow
    }
}

/// Lighting, water and weather.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Environment {
    /// Water rendering enabled.
    pub water: bool,
    /// Water texture path.
    pub water_texture: String,
    /// Fog enabled.
    pub fog: bool,
    /// Fog density.
    pub fog_density: f32,
    /// Fog colour (RGB, 0..1).
    pub fog_color: [f32; 3],
    /// Sunlight colour.
    pub sun_color: [f32; 3],
    /// Moonlight colour.
    pub moon_color: [f32; 3],
    /// Length of the day in seconds.
    pub day_length_secs: f32,
    /// Length of the night in seconds.
    pub night_length_secs: f32,
    /// Weather chances.
    pub weather: WeatherProbabilities,
}

impl Default for Environment {
    fn default() -> Self {
        Self {
            water: true,
            water_texture: String::new(),
            fog: false,
            fog_density: 0.0,
            fog_color: [0.5, 0.5, 0.5],
            sun_color: [1.0, 1.0, 1.0],
            moon_color: [0.3, 0.3, 0.5],
            day_length_secs: 600.0,
            night_length_secs: 300.0,
            weather: WeatherProbabilities::default(),
        }
    }
}

/// Terrain art and environment for a map.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tileset {
    /// Tileset name.
    pub name: String,
    /// Surfaces indexed by a map's surface bytes.
    pub surfaces: Vec<Surface>,
    /// Objects indexed by a map's object bytes (minus one; zero is empty).
    #[serde(default)]
    pub objects: Vec<TerrainObject>,
    /// Ambient sounds.
    #[serde(default)]
    pub ambient: AmbientSounds,
    /// Environment.
    #[serde(default)]
    pub environment: Environment,
}

impl Tileset {
    /// Parse and validate a RON tileset.
    pub fn from_ron(text: &str) -> Result<Self> {
        let tileset: Self = ron::from_str(text).map_err(|e| GameError::DataParseError {
            path: "<tileset>".to_string(),
            message: e.to_string(),
        })?;
        tileset.validate()?;
        Ok(tileset)
    }

    /// Check probabilities and cycle lengths.
    ///
    /// A weather sum off by more than [`WEATHER_SUM_TOLERANCE`] is only
    /// logged.
    pub fn validate(&self) -> Result<()> {
        let invalid = |message: String| {
            GameError::from(AssetError::InvalidTileset {
                tileset: self.name.clone(),
                message,
            })
        };
        if self.surfaces.is_empty() {
            return Err(invalid("no surfaces".into()));
        }
        for surface in &self.surfaces {
            if surface.textures.iter().any(|t| t.probability < 0.0) {
                return Err(AssetError::Probability {
                    tileset: self.name.clone(),
                    message: format!("surface '{}' has a negative weight", surface.name),
                }
                .into());
            }
            if surface.probability_sum() <= 0.0 {
                return Err(AssetError::Probability {
                    tileset: self.name.clone(),
                    message: format!("surface '{}' weights sum to zero", surface.name),
                }
                .into());
            }
        }
        let env = &self.environment;
        if !(env.day_length_secs > 0.0) || !(env.night_length_secs > 0.0) {
            return Err(invalid(format!(
                "day {} s and night {} s must be positive",
                env.day_length_secs, env.night_length_secs
            )));
        }
        let weather = env.weather.sum();
        if (weather - 1.0).abs() > WEATHER_SUM_TOLERANCE {
            tracing::warn!(tileset = %self.name, sum = weather, "weather probabilities do not sum to 1");
        }
        Ok(())
    }

    /// Surface for a map surface byte.
    #[must_use]
    pub fn surface(&self, index: i8) -> Option<&Surface> {
        usize::try_from(index).ok().and_then(|i| self.surfaces.get(i))
    }

    /// Terrain object for a map object byte; zero and unknown bytes are empty.
    #[must_use]
    pub fn object(&self, index: i8) -> Option<&TerrainObject> {
        usize::try_from(index)
            .ok()
            .and_then(|i| i.checked_sub(1))
            .and_then(|i| self.objects.get(i))
    }

    /// Whether a map object byte blocks movement.
    #[must_use]
    pub fn blocks(&self, index: i8) -> bool {
        index != 0 && self.object(index).map_or(true, |o| !o.walkable)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FOREST: &str = r#"(
        name: "forest",
        surfaces: [
            (name: "grass", textures: [(path: "grass1.png", probability: 0.7), (path: "grass2.png", probability: 0.3)]),
            (name: "dirt", textures: [(path: "dirt.png", probability: 1.0)]),
        ],
        objects: [
            (name: "tree", models: ["tree.g3d"], walkable: false),
            (name: "bush", walkable: true),
        ],
        ambient: (day: ["birds.ogg"], night: ["crickets.ogg"]),
        environment: (day_length_secs: 900.0, night_length_secs: 300.0, weather: (sun: 0.6, rain: 0.3, snow: 0.1)),
    )"#;

    #[test]
    fn test_parse_and_lookup() {
        let tileset = Tileset::from_ron(FOREST).unwrap();
        assert_eq!(tileset.surface(1).unwrap().name, "dirt");
        assert!(tileset.object(0).is_none());
        assert_eq!(tileset.object(1).unwrap().name, "tree");
        assert!(tileset.blocks(1));
        assert!(!tileset.blocks(2));
        assert!(!tileset.blocks(0));
    }

    #[test]
    fn test_pick_texture_follows_weights() {
        let tileset = Tileset::from_ron(FOREST).unwrap();
        let grass = tileset.surface(0).unwrap();
        assert_eq!(grass.pick_texture(0.1).unwrap().path, "grass1.png");
        assert_eq!(grass.pick_texture(0.69).unwrap().path, "grass1.png");
        assert_eq!(grass.pick_texture(0.75).unwrap().path, "grass2.png");
        assert_eq!(grass.pick_texture(1.0).unwrap().path, "grass2.png");
    }

    #[test]
    fn test_zero_probability_rejected() {
        let text = FOREST.replace("probability: 1.0", "probability: 0.0");
        let err = Tileset::from_ron(&text).unwrap_err();
        assert!(matches!(err, GameError::Asset(AssetError::Probability { .. })));
    }

    #[test]
    fn test_non_positive_day_rejected() {
        let text = FOREST.replace("day_length_secs: 900.0", "day_length_secs: 0.0");
        let err = Tileset::from_ron(&text).unwrap_err();
        assert!(matches!(err, GameError::Asset(AssetError::InvalidTileset { .. })));
    }

    #[test]
    fn test_weather_sum_only_warns() {
        let text = FOREST.replace("snow: 0.1", "snow: 0.5");
        assert!(Tileset::from_ron(&text).is_ok());
    }
}
