//! Match settings.
//!
//! [`GameSettings`] is loaded from RON by the host and validated before a
//! match is created. Every field except the player list has a default.

use serde::{Deserialize, Serialize};

use crate::ai::{AiConfig, Difficulty, Personality};
use crate::error::{GameError, Result};
use crate::world::SimConfig;

/// Hard ceiling on players in one match.
pub const MAX_PLAYERS: usize = 8;

/// One seat in the match.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerSettings {
    /// Display name.
    pub name: String,
    /// Faction id in the catalog.
    #[serde(default = "default_faction")]
    pub faction: String,
    /// Controlled by a strategic AI.
    #[serde(default)]
    pub is_ai: bool,
    /// AI personality.
    #[serde(default)]
    pub personality: Personality,
    /// AI difficulty.
    #[serde(default)]
    pub difficulty: Difficulty,
}

fn default_faction() -> String {
    "skirmish".to_string()
}

impl PlayerSettings {
    /// A human seat.
    #[must_use]
    pub fn human(name: &str, faction: &str) -> Self {
        Self {
            name: name.to_string(),
            faction: faction.to_string(),
            is_ai: false,
            personality: Personality::default(),
            difficulty: Difficulty::default(),
        }
    }

    /// An AI seat.
    #[must_use]
    pub fn ai(name: &str, faction: &str, personality: Personality, difficulty: Difficulty) -> Self {
        Self {
            name: name.to_string(),
            faction: faction.to_string(),
            is_ai: true,
            personality,
            difficulty,
        }
    }
}

/// Everything needed to set up a match.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GameSettings {
    /// Tech tree data path, resolved by the host.
    pub tech_tree_path: String,
    /// Seats, in player id order starting at 1.
    pub players: Vec<PlayerSettings>,
    /// Simulation speed multiplier.
    pub game_speed: f64,
    /// Scales passive income.
    pub resource_multiplier: f32,
    /// Seats allowed, at most [`MAX_PLAYERS`].
    pub max_players: usize,
    /// Match length in seconds; zero is unlimited.
    pub time_limit_secs: u64,
    /// Fog of war enabled.
    pub fog_of_war: bool,
    /// Cheats enabled.
    pub cheats: bool,
    /// Milliseconds between strategic AI evaluations.
    pub ai_interval_ms: u64,
    /// Host ticks per second.
    pub tick_rate: u32,
    /// Simulation constants.
    pub sim: SimConfig,
    /// Strategic AI tunables.
    pub ai: AiConfig,
}

impl Default for GameSettings {
    fn default() -> Self {
        Self {
            tech_tree_path: "data/tech/skirmish.ron".to_string(),
            players: Vec::new(),
            game_speed: 1.0,
            resource_multiplier: 1.0,
            max_players: MAX_PLAYERS,
            time_limit_secs: 0,
            fog_of_war: true,
            cheats: false,
            ai_interval_ms: 500,
            tick_rate: 60,
            sim: SimConfig::default(),
            ai: AiConfig::default(),
        }
    }
}

impl GameSettings {
    /// Parse settings from RON.
    pub fn from_ron(text: &str) -> Result<Self> {
        ron::from_str(text).map_err(|e| GameError::DataParseError {
            path: "<settings>".to_string(),
            message: e.to_string(),
        })
    }

    /// Serialize to pretty RON.
    pub fn to_ron(&self) -> Result<String> {
        ron::ser::to_string_pretty(self, ron::ser::PrettyConfig::default())
            .map_err(|e| GameError::Validation(format!("settings not serializable: {e}")))
    }

    /// Builder: add a seat.
    #[must_use]
    pub fn with_player(mut self, player: PlayerSettings) -> Self {
        self.players.push(player);
        self
    }

    /// Builder: set the time limit.
    #[must_use]
    pub fn with_time_limit(mut self, secs: u64) -> Self {
        self.time_limit_secs = secs;
        self
    }

    /// Seconds of game time per host tick.
    #[must_use]
    pub fn tick_length(&self) -> f64 {
        1.0 / f64::from(self.tick_rate.max(1))
    }

    /// Reject settings a match cannot start with.
    pub fn validate(&self) -> Result<()> {
        if self.tech_tree_path.trim().is_empty() {
            return Err(GameError::Validation("tech tree path is empty".into()));
        }
        if self.players.is_empty() {
            return Err(GameError::Validation("no players".into()));
        }
        if self.max_players == 0 || self.max_players > MAX_PLAYERS {
            return Err(GameError::Validation(format!(
                "max players {} outside 1..={MAX_PLAYERS}",
                self.max_players
            )));
        }
        if self.players.len() > self.max_players {
            return Err(GameError::Validation(format!(
                "{} players exceed the limit of {}",
                self.players.len(),
                self.max_players
            )));
        }
        if !(self.game_speed.is_finite() && self.game_speed > 0.0) {
            return Err(GameError::Validation(format!(
                "game speed {} must be positive",
                self.game_speed
            )));
        }
        if !(self.resource_multiplier.is_finite() && self.resource_multiplier >= 0.0) {
            return Err(GameError::Validation(format!(
                "resource multiplier {} must not be negative",
                self.resource_multiplier
            )));
        }
        if self.tick_rate == 0 {
            return Err(GameError::Validation("tick rate must be positive".into()));
        }
        if let Some(seat) = self.players.iter().find(|p| p.name.trim().is_empty()) {
            return Err(GameError::Validation(format!(
                "player with faction {} has no name",
                seat.faction
            )));
        }
        Ok(())
    }
}
