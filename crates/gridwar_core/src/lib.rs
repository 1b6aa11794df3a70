//! # Gridwar Core
//!
//! Tick-driven simulation core for a real-time strategy match.
//!
//! This crate contains **only** simulation logic:
//! - No rendering
//! - No networking
//! - No system randomness
//! - IO limited to parsing maps, tilesets and data files
//!
//! Every tick visits entities in id order and all collections are ordered,
//! so two worlds fed the same commands produce the same
//! [`World::state_hash`](world::World::state_hash).
//!
//! ## Crate Structure
//!
//! - [`world`] - Entity storage plus the fixed per-tick update order
//! - [`game`] - Match lifecycle, victory and defeat, thread-safe queries
//! - [`commands`] - Unit orders and priority queues
//! - [`combat`] - Damage types, flanking, splash
//! - [`economy`] - Stockpiles, income, population
//! - [`production`] - Build queues and construction
//! - [`tech`] - Research and upgrades
//! - [`status`] - Timed buffs and debuffs
//! - [`formations`] - Unit groups and formation slots
//! - [`behavior`] - Behavior trees for autonomous units
//! - [`ai`] - Strategic AI players
//! - [`map`] / [`tileset`] - Binary maps and tileset descriptions
//! - [`data`] - Faction, unit, building and technology templates
//! - [`hash`] - Stable FNV-1a hashing for determinism checks

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic)]

pub mod ai;
pub mod behavior;
pub mod combat;
pub mod commands;
pub mod components;
pub mod data;
pub mod economy;
pub mod error;
pub mod events;
pub mod formations;
pub mod game;
pub mod hash;
pub mod map;
pub mod math;
pub mod objects;
pub mod pathfinding;
mod pipeline;
pub mod production;
pub mod settings;
pub mod status;
pub mod tech;
pub mod tileset;
pub mod world;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::ai::{Decision, DecisionType, Difficulty, Personality, StrategicAi};
    pub use crate::behavior::{BehaviorManager, Node, Status, TreeBuilder};
    pub use crate::combat::{DamageCategory, DamageRegistry, DamageType, SplashFalloff};
    pub use crate::commands::{Command, CommandPriority, CommandQueue, CommandType};
    pub use crate::components::{
        Building, EntityId, Player, PlayerId, ResourceNode, Stance, Unit, UnitState,
    };
    pub use crate::data::Catalog;
    pub use crate::economy::{resource_map, Economy, ResourceMap};
    pub use crate::error::{ErrorKind, GameError, Result};
    pub use crate::events::{EventQueue, EventType, GameEvent};
    pub use crate::formations::{Formation, GroupId};
    pub use crate::game::{Game, GameAssets, GameHandle, GameState, MatchOutcome};
    pub use crate::map::MapData;
    pub use crate::math::{Fixed, Point3, Tile};
    pub use crate::settings::{GameSettings, PlayerSettings};
    pub use crate::status::EffectType;
    pub use crate::tileset::Tileset;
    pub use crate::world::{SimConfig, TickReport, World};
}
