//! Error types for the game simulation.
//!
//! Every fallible operation returns [`Result`]. Errors are grouped into
//! categories ([`ErrorKind`]) so hosts can decide whether to surface them to
//! the player (recoverable) or stop the match (internal invariant breaks).

use thiserror::Error;

use crate::components::{EntityId, PlayerId};
use crate::economy::ResourceMap;
use crate::formations::GroupId;
use crate::game::GameState;

/// Result type alias using [`GameError`].
pub type Result<T> = std::result::Result<T, GameError>;

/// Coarse error category used for reporting and recovery decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Malformed input or unknown identifiers.
    Validation,
    /// The caller does not own the target.
    Authorization,
    /// Not enough resources.
    Resource,
    /// Population cap reached.
    Population,
    /// Operation not allowed in the current state.
    State,
    /// Asset parsing or validation failure.
    Asset,
    /// An internal invariant was violated.
    Internal,
}

/// Top-level error type for all game simulation errors.
#[derive(Debug, Error)]
pub enum GameError {
    /// Malformed request (missing command target, empty group, bad settings...).
    #[error("Validation failed: {0}")]
    Validation(String),

    /// A unit/building/tech/effect type name is not registered.
    #[error("Unknown {kind} type: {name}")]
    UnknownType {
        /// What kind of type was looked up.
        kind: &'static str,
        /// The name that was not found.
        name: String,
    },

    /// Player tried to act on an entity it does not own.
    #[error("Player {player} does not own entity {entity}")]
    Unauthorized {
        /// Acting player.
        player: PlayerId,
        /// Target entity.
        entity: EntityId,
    },

    /// Player tried to command a group it does not own.
    #[error("Player {player} does not own group {group}")]
    GroupNotOwned {
        /// Acting player.
        player: PlayerId,
        /// Target group.
        group: GroupId,
    },

    /// Insufficient resources.
    #[error("Insufficient resources for {purpose}: missing {}", format_resources(.missing))]
    InsufficientResources {
        /// What the resources were for.
        purpose: String,
        /// Per-resource shortfall.
        missing: ResourceMap,
    },

    /// Population cap would be exceeded.
    #[error("Population limit reached: {current}/{max}, need {required} more")]
    PopulationLimit {
        /// Population in use.
        current: u32,
        /// Current cap.
        max: u32,
        /// Population the new unit needs.
        required: u32,
    },

    /// Invalid game state.
    #[error("Invalid game state: {0}")]
    InvalidState(String),

    /// Command issued to a dead unit.
    #[error("Unit {0} is dead")]
    DeadUnit(EntityId),

    /// Invalid entity reference.
    #[error("Entity not found: {0}")]
    EntityNotFound(EntityId),

    /// Unknown player.
    #[error("Player not found: {0}")]
    PlayerNotFound(PlayerId),

    /// Unknown unit group.
    #[error("Group not found: {0}")]
    GroupNotFound(GroupId),

    /// Lifecycle action not permitted from the current state.
    #[error("Cannot {action} while game is {from:?}")]
    InvalidTransition {
        /// State the game was in.
        from: GameState,
        /// Attempted action.
        action: &'static str,
    },

    /// Tech tree requirement not met.
    #[error("Tech requirement not met: {0}")]
    TechRequirementNotMet(String),

    /// A building's production queue is full.
    #[error("Production queue full for building {0}")]
    QueueFull(EntityId),

    /// Data file parsing error.
    #[error("Failed to parse data file '{path}': {message}")]
    DataParseError {
        /// Path to the file that failed to parse.
        path: String,
        /// Error message.
        message: String,
    },

    /// Binary map or tileset failure.
    #[error(transparent)]
    Asset(#[from] AssetError),

    /// Internal invariant violated; the match should stop.
    #[error("Invariant violated: {0}")]
    Invariant(String),
}

impl GameError {
    /// Category of this error.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation(_)
            | Self::UnknownType { .. }
            | Self::DeadUnit(_)
            | Self::EntityNotFound(_)
            | Self::PlayerNotFound(_)
            | Self::GroupNotFound(_)
            | Self::DataParseError { .. } => ErrorKind::Validation,
            Self::Unauthorized { .. } | Self::GroupNotOwned { .. } => ErrorKind::Authorization,
            Self::InsufficientResources { .. } => ErrorKind::Resource,
            Self::PopulationLimit { .. } => ErrorKind::Population,
            Self::InvalidState(_)
            | Self::InvalidTransition { .. }
            | Self::TechRequirementNotMet(_)
            | Self::QueueFull(_) => ErrorKind::State,
            Self::Asset(_) => ErrorKind::Asset,
            Self::Invariant(_) => ErrorKind::Internal,
        }
    }

    /// Whether the match can continue after this error.
    ///
    /// Everything except internal invariant violations is reported back to the
    /// caller and leaves the simulation untouched.
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        self.kind() != ErrorKind::Internal
    }
}

/// Errors raised while decoding binary maps or validating tilesets.
#[derive(Debug, Error)]
pub enum AssetError {
    /// Map file header did not start with the expected magic.
    #[error("Bad map magic: expected {expected:?}, found {found:?}")]
    BadMagic {
        /// Expected magic bytes.
        expected: [u8; 4],
        /// Bytes actually read.
        found: [u8; 4],
    },

    /// Map version newer than this reader understands.
    #[error("Unsupported map version {found} (max {supported})")]
    UnsupportedVersion {
        /// Version in the file.
        found: i32,
        /// Highest supported version.
        supported: i32,
    },

    /// Width or height outside 16..=1024.
    #[error("Map dimensions {width}x{height} out of range")]
    DimensionsOutOfRange {
        /// Declared width.
        width: i32,
        /// Declared height.
        height: i32,
    },

    /// Faction count outside 1..=8.
    #[error("Faction count {0} out of range")]
    FactionCountOutOfRange(i32),

    /// File ended before the declared payload was read.
    #[error("Map data truncated: {0}")]
    Truncated(String),

    /// Tileset probabilities don't form a usable distribution.
    #[error("Invalid probabilities in tileset '{tileset}': {message}")]
    Probability {
        /// Tileset name.
        tileset: String,
        /// Details.
        message: String,
    },

    /// Tileset failed a structural check.
    #[error("Invalid tileset '{tileset}': {message}")]
    InvalidTileset {
        /// Tileset name.
        tileset: String,
        /// Details.
        message: String,
    },

    /// Asset file could not be read.
    #[error("Failed to read asset: {0}")]
    Io(#[from] std::io::Error),
}

fn format_resources(resources: &ResourceMap) -> String {
    if resources.is_empty() {
        return "nothing".to_string();
    }
    resources
        .iter()
        .map(|(name, amount)| format!("{amount} {name}"))
        .collect::<Vec<_>>()
        .join(", ")
}
