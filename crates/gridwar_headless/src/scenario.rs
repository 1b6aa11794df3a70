//! Match configuration loading.
//!
//! A scenario is a RON file holding the [`GameSettings`] for a match plus
//! optional paths to a binary map and a tileset. Relative asset paths are
//! resolved against the scenario file's directory.

use std::path::{Path, PathBuf};

use gridwar_core::error::GameError;
use gridwar_core::game::GameAssets;
use gridwar_core::map::MapData;
use gridwar_core::settings::{GameSettings, PlayerSettings};
use gridwar_core::tileset::Tileset;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error type for scenario operations.
#[derive(Error, Debug)]
pub enum ScenarioError {
    /// File not found.
    #[error("Scenario file not found: {0}")]
    FileNotFound(String),
    /// Failed to read file.
    #[error("Failed to read scenario file: {0}")]
    ReadError(#[from] std::io::Error),
    /// Failed to parse RON.
    #[error("Failed to parse scenario: {0}")]
    ParseError(#[from] ron::error::SpannedError),
    /// The core rejected the settings or assets.
    #[error(transparent)]
    Game(#[from] GameError),
}

/// A complete match configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Scenario {
    /// Scenario name.
    pub name: String,
    /// Human-readable description.
    pub description: String,
    /// Match settings.
    pub settings: GameSettings,
    /// Binary map file.
    pub map: Option<PathBuf>,
    /// Tileset RON file.
    pub tileset: Option<PathBuf>,
    /// Ticks to run when the command line does not say.
    pub ticks: u64,
}

impl Default for Scenario {
    fn default() -> Self {
        Self::skirmish_1v1()
    }
}

impl Scenario {
    /// Load a scenario from a RON file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ScenarioError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ScenarioError::FileNotFound(path.display().to_string()));
        }
        let contents = std::fs::read_to_string(path)?;
        let mut scenario = Self::from_ron_str(&contents)?;
        if let Some(dir) = path.parent() {
            scenario.resolve_paths(dir);
        }
        tracing::info!(scenario = %scenario.name, path = %path.display(), "scenario loaded");
        Ok(scenario)
    }

    /// Load from a RON string (useful for embedded scenarios).
    pub fn from_ron_str(ron: &str) -> Result<Self, ScenarioError> {
        let scenario: Scenario = ron::from_str(ron)?;
        Ok(scenario)
    }

    fn resolve_paths(&mut self, dir: &Path) {
        for path in [&mut self.map, &mut self.tileset].into_iter().flatten() {
            if path.is_relative() {
                *path = dir.join(&*path);
            }
        }
    }

    /// A strategic AI on each side of the built-in skirmish faction.
    #[must_use]
    pub fn skirmish_1v1() -> Self {
        use gridwar_core::ai::{Difficulty, Personality};
        Self {
            name: "Skirmish 1v1".to_string(),
            description: "Aggressive AI against economic AI on the default field".to_string(),
            settings: GameSettings::default()
                .with_player(PlayerSettings::ai(
                    "Red",
                    "skirmish",
                    Personality::Aggressive,
                    Difficulty::Normal,
                ))
                .with_player(PlayerSettings::ai(
                    "Blue",
                    "skirmish",
                    Personality::Economic,
                    Difficulty::Normal,
                )),
            map: None,
            tileset: None,
            ticks: 3600,
        }
    }

    /// Load the map and tileset this scenario names, `map_override`
    /// taking precedence over the scenario's own map.
    pub fn assets(&self, map_override: Option<&Path>) -> Result<GameAssets, ScenarioError> {
        let mut assets = GameAssets::skirmish();
        if let Some(path) = map_override.or(self.map.as_deref()) {
            assets = assets.with_map(MapData::load(path)?);
        }
        if let Some(path) = &self.tileset {
            let text = std::fs::read_to_string(path)?;
            assets = assets.with_tileset(Tileset::from_ron(&text)?);
        }
        Ok(assets)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_skirmish_is_valid() {
        let scenario = Scenario::skirmish_1v1();
        scenario.settings.validate().unwrap();
        assert_eq!(scenario.settings.players.len(), 2);
    }

    #[test]
    fn test_partial_ron() {
        let scenario = Scenario::from_ron_str(
            r#"(
                name: "duel",
                settings: (players: [(name: "A"), (name: "B", is_ai: true)]),
                ticks: 600,
            )"#,
        )
        .unwrap();
        assert_eq!(scenario.name, "duel");
        assert_eq!(scenario.ticks, 600);
        assert!(scenario.settings.players[1].is_ai);
        assert!(scenario.map.is_none());
    }

    #[test]
    fn test_missing_file() {
        assert!(matches!(
            Scenario::load("/nonexistent/match.ron"),
            Err(ScenarioError::FileNotFound(_))
        ));
    }

    #[test]
    fn test_relative_map_path_resolved() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("match.ron");
        std::fs::write(&path, r#"(name: "m", map: Some("arena.map"))"#).unwrap();
        let scenario = Scenario::load(&path).unwrap();
        assert_eq!(scenario.map.unwrap(), dir.path().join("arena.map"));
    }
}
