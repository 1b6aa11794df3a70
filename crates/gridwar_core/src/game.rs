//! Match lifecycle.
//!
//! A [`Game`] owns the [`World`] behind an `Arc<RwLock<_>>` and drives it
//! through `Loading -> Playing <-> Paused -> Ended`. Hosts that want to query
//! from other threads take a [`GameHandle`], which hands out owned snapshots
//! taken under the read lock.

use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use serde::{Deserialize, Serialize};

use crate::ai::StrategicAi;
use crate::components::{EntityId, Player, PlayerId, Unit};
use crate::data::Catalog;
use crate::error::{GameError, Result};
use crate::events::{EventQueue, EventType, GameEvent};
use crate::map::MapData;
use crate::math::{Point3, Tile};
use crate::pathfinding::{GridPathProvider, NavGrid};
use crate::settings::GameSettings;
use crate::status::ActiveEffect;
use crate::tileset::Tileset;
use crate::world::{TickReport, World, WorldStats};

/// Lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GameState {
    /// Created, not yet started.
    Loading,
    /// Ticking.
    Playing,
    /// Suspended; ticks are ignored.
    Paused,
    /// Finished. Terminal.
    Ended,
}

/// Why a match ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EndReason {
    /// One player left standing.
    Victory,
    /// Every player was eliminated.
    Draw,
    /// The time limit elapsed.
    TimeLimit,
    /// The host stopped the match.
    Stopped,
    /// The simulation hit an internal error.
    Aborted,
}

/// Result of a finished match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchOutcome {
    /// Winning player, if any.
    pub winner: Option<PlayerId>,
    /// How the match ended.
    pub reason: EndReason,
}

/// A resource node placed next to every start position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StartingNode {
    /// Resource name.
    pub resource: String,
    /// Offset from the start position along x.
    pub offset_x: f32,
    /// Offset from the start position along z.
    pub offset_z: f32,
    /// Amount held.
    pub amount: i64,
}

/// Data a match is built from.
#[derive(Debug, Clone, Default)]
pub struct GameAssets {
    /// Faction templates.
    pub catalog: Catalog,
    /// Optional map; without one players are spread on a default field.
    pub map: Option<MapData>,
    /// Optional tileset used to decide which map objects block movement.
    pub tileset: Option<Tileset>,
    /// Nodes placed around each start position.
    pub starting_nodes: Vec<StartingNode>,
}

impl GameAssets {
    /// The built-in skirmish faction with a gold and a wood node per player.
    #[must_use]
    pub fn skirmish() -> Self {
        Self {
            catalog: Catalog::skirmish(),
            map: None,
            tileset: None,
            starting_nodes: vec![
                StartingNode {
                    resource: "gold".to_string(),
                    offset_x: 7.0,
                    offset_z: -3.0,
                    amount: 2000,
                },
                StartingNode {
                    resource: "wood".to_string(),
                    offset_x: -7.0,
                    offset_z: -3.0,
                    amount: 2000,
                },
            ],
        }
    }

    /// Builder: use a map.
    #[must_use]
    pub fn with_map(mut self, map: MapData) -> Self {
        self.map = Some(map);
        self
    }

    /// Builder: use a tileset.
    #[must_use]
    pub fn with_tileset(mut self, tileset: Tileset) -> Self {
        self.tileset = Some(tileset);
        self
    }
}

/// Side length of the field used when no map is supplied.
const DEFAULT_FIELD: f32 = 64.0;

fn default_start(slot: usize, players: usize) -> Point3 {
    #[allow(clippy::cast_precision_loss)]
    let angle = std::f32::consts::TAU * slot as f32 / players.max(1) as f32;
    let centre = DEFAULT_FIELD / 2.0;
    Point3::ground(
        centre + angle.cos() * DEFAULT_FIELD * 0.35,
        centre + angle.sin() * DEFAULT_FIELD * 0.35,
    )
}

fn read_lock(world: &RwLock<World>) -> RwLockReadGuard<'_, World> {
    world.read().unwrap_or_else(PoisonError::into_inner)
}

fn write_lock(world: &RwLock<World>) -> RwLockWriteGuard<'_, World> {
    world.write().unwrap_or_else(PoisonError::into_inner)
}

// ============================================================================
// Game
// ============================================================================

/// A match.
#[derive(Debug)]
pub struct Game {
    settings: GameSettings,
    state: GameState,
    world: Arc<RwLock<World>>,
    events: EventQueue,
    players: usize,
    outcome: Option<MatchOutcome>,
}

impl Game {
    /// Validate settings and build the world with every player's starting
    /// entities. The game starts in [`GameState::Loading`].
    pub fn new_game(settings: GameSettings, assets: GameAssets) -> Result<Self> {
        settings.validate()?;
        for seat in &settings.players {
            if assets.catalog.faction(&seat.faction).is_none() {
                return Err(GameError::UnknownType {
                    kind: "faction",
                    name: seat.faction.clone(),
                });
            }
        }
        if let Some(map) = &assets.map {
            if map.start_positions.len() < settings.players.len() {
                return Err(GameError::Validation(format!(
                    "map has {} start positions for {} players",
                    map.start_positions.len(),
                    settings.players.len()
                )));
            }
        }

        let mut config = settings.sim.clone();
        #[allow(clippy::cast_precision_loss)]
        let interval = settings.ai_interval_ms as f64 / 1000.0;
        config.ai_interval_secs = interval;
        let events = EventQueue::new(config.event_capacity);
        let tile_size = config.tile_size;
        let mut world = World::with_events(
            config,
            assets.catalog.clone(),
            settings.resource_multiplier,
            events.clone(),
        );
        world = match &assets.map {
            Some(map) => {
                let (width, height) = map.world_size(tile_size);
                let grid = Self::nav_grid(map, assets.tileset.as_ref());
                world
                    .with_bounds(width, height)
                    .with_path_provider(Box::new(GridPathProvider::new(grid)))
            }
            None => world.with_bounds(DEFAULT_FIELD, DEFAULT_FIELD),
        };

        let count = settings.players.len();
        for (slot, seat) in settings.players.iter().enumerate() {
            let id = PlayerId::try_from(slot + 1)
                .map_err(|_| GameError::Validation("too many players".into()))?;
            let faction = assets.catalog.faction(&seat.faction).cloned().ok_or_else(|| {
                GameError::UnknownType {
                    kind: "faction",
                    name: seat.faction.clone(),
                }
            })?;
            let mut player = Player::new(id, &seat.name, &seat.faction, seat.is_ai);
            player.resources = faction.starting_resources.clone();
            world.add_player(player);

            let start = assets
                .map
                .as_ref()
                .and_then(|m| m.start_position(slot))
                .unwrap_or_else(|| default_start(slot, count));
            for entity in &faction.starting_buildings {
                let at = start + Point3::ground(entity.offset_x, entity.offset_z);
                world.spawn_building(id, &entity.type_id, at, true)?;
            }
            for entity in &faction.starting_units {
                let at = start + Point3::ground(entity.offset_x, entity.offset_z);
                world.spawn_unit(id, &entity.type_id, at)?;
            }
            for node in &assets.starting_nodes {
                let at = start + Point3::ground(node.offset_x, node.offset_z);
                world.spawn_resource_node(&node.resource, at, node.amount)?;
            }
            if seat.is_ai {
                world.add_ai(
                    StrategicAi::new(id, seat.personality, seat.difficulty)
                        .with_config(settings.ai.clone()),
                );
            }
            tracing::info!(player = id, name = %seat.name, faction = %seat.faction, is_ai = seat.is_ai, "player seated");
        }

        Ok(Self {
            settings,
            state: GameState::Loading,
            world: Arc::new(RwLock::new(world)),
            events,
            players: count,
            outcome: None,
        })
    }

    fn nav_grid(map: &MapData, tileset: Option<&Tileset>) -> NavGrid {
        NavGrid::from_fn(map.width, map.height, |x, y| {
            #[allow(clippy::cast_possible_wrap)]
            let tile = Tile::new(x as i32, y as i32);
            match (tileset, map.object_at(tile)) {
                (Some(tileset), Some(object)) => !tileset.blocks(object),
                (None, _) => map.is_walkable(tile),
                (_, None) => false,
            }
        })
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> GameState {
        self.state
    }

    /// Settings the match was created with.
    #[must_use]
    pub fn settings(&self) -> &GameSettings {
        &self.settings
    }

    /// How the match ended, once it has.
    #[must_use]
    pub fn outcome(&self) -> Option<MatchOutcome> {
        self.outcome
    }

    /// Shared event queue.
    #[must_use]
    pub fn events(&self) -> &EventQueue {
        &self.events
    }

    /// Query handle usable from other threads.
    #[must_use]
    pub fn handle(&self) -> GameHandle {
        GameHandle {
            world: Arc::clone(&self.world),
            events: self.events.clone(),
        }
    }

    /// Read access to the world.
    pub fn world(&self) -> RwLockReadGuard<'_, World> {
        read_lock(&self.world)
    }

    /// Write access to the world, for scripted setup and host commands.
    pub fn world_mut(&self) -> RwLockWriteGuard<'_, World> {
        write_lock(&self.world)
    }

    fn transition(
        &mut self,
        action: &'static str,
        allowed: &[GameState],
        to: GameState,
        event: EventType,
    ) -> Result<()> {
        if !allowed.contains(&self.state) {
            tracing::warn!(from = ?self.state, action, "invalid lifecycle transition");
            return Err(GameError::InvalidTransition {
                from: self.state,
                action,
            });
        }
        let now = read_lock(&self.world).time();
        tracing::info!(from = ?self.state, to = ?to, "game state changed");
        self.state = to;
        self.events.publish(GameEvent::new(event, now, None));
        Ok(())
    }

    /// `Loading -> Playing`.
    pub fn start(&mut self) -> Result<()> {
        self.transition(
            "start",
            &[GameState::Loading],
            GameState::Playing,
            EventType::GameStarted,
        )
    }

    /// `Playing -> Paused`.
    pub fn pause(&mut self) -> Result<()> {
        self.transition(
            "pause",
            &[GameState::Playing],
            GameState::Paused,
            EventType::GamePaused,
        )
    }

    /// `Paused -> Playing`.
    pub fn resume(&mut self) -> Result<()> {
        self.transition(
            "resume",
            &[GameState::Paused],
            GameState::Playing,
            EventType::GameResumed,
        )
    }

    /// Any non-terminal state `-> Ended`.
    pub fn stop(&mut self) -> Result<()> {
        self.end(None, EndReason::Stopped)
    }

    fn end(&mut self, winner: Option<PlayerId>, reason: EndReason) -> Result<()> {
        self.transition(
            "stop",
            &[GameState::Loading, GameState::Playing, GameState::Paused],
            GameState::Ended,
            EventType::GameEnded,
        )?;
        self.outcome = Some(MatchOutcome { winner, reason });
        tracing::info!(?winner, ?reason, "match ended");
        Ok(())
    }

    /// Advance by `real_dt` seconds of host time, scaled by the game speed.
    ///
    /// Does nothing unless playing. An internal error ends the match and is
    /// returned to the caller.
    pub fn update(&mut self, real_dt: f64) -> Result<Option<TickReport>> {
        if self.state != GameState::Playing {
            return Ok(None);
        }
        let dt = real_dt * self.settings.game_speed;
        let result = write_lock(&self.world).update(dt);
        let report = match result {
            Ok(report) => report,
            Err(err) => {
                tracing::error!(%err, "tick aborted");
                if !err.is_recoverable() {
                    self.end(None, EndReason::Aborted)?;
                }
                return Err(err);
            }
        };

        self.check_defeats(report.time);
        let remaining: Vec<PlayerId> = read_lock(&self.world)
            .economy()
            .players()
            .filter(|p| !p.is_defeated)
            .map(|p| p.id)
            .collect();
        if self.players >= 2 && remaining.len() == 1 {
            let winner = remaining[0];
            self.events.publish(
                GameEvent::new(EventType::PlayerVictorious, report.time, Some(winner))
                    .with_message("last player standing"),
            );
            self.end(Some(winner), EndReason::Victory)?;
        } else if remaining.is_empty() {
            self.end(None, EndReason::Draw)?;
        } else if self.settings.time_limit_secs > 0 {
            #[allow(clippy::cast_precision_loss)]
            let limit = self.settings.time_limit_secs as f64;
            if report.time + 1e-9 >= limit {
                self.end(None, EndReason::TimeLimit)?;
            }
        }
        Ok(Some(report))
    }

    /// Mark players with nothing left as defeated.
    fn check_defeats(&mut self, now: f64) {
        let mut world = write_lock(&self.world);
        let beaten: Vec<PlayerId> = world
            .economy()
            .players()
            .filter(|p| !p.is_defeated)
            .filter(|p| {
                world.objects().living_unit_count(p.id) == 0
                    && world.objects().buildings_of(p.id).next().is_none()
            })
            .map(|p| p.id)
            .collect();
        for player in beaten {
            if let Some(record) = world.economy_mut().player_mut(player) {
                record.is_defeated = true;
            }
            tracing::info!(player, "player defeated");
            self.events.publish(
                GameEvent::new(EventType::PlayerDefeated, now, Some(player))
                    .with_message("no units or buildings left"),
            );
        }
    }
}

// ============================================================================
// Query handle
// ============================================================================

/// Cheap, thread-safe read access to a running match.
#[derive(Debug, Clone)]
pub struct GameHandle {
    world: Arc<RwLock<World>>,
    events: EventQueue,
}

impl GameHandle {
    /// Copy of one unit.
    #[must_use]
    pub fn unit_snapshot(&self, id: EntityId) -> Option<Unit> {
        read_lock(&self.world).unit_snapshot(id)
    }

    /// Copies of a player's units, in id order.
    #[must_use]
    pub fn units_for_player(&self, player: PlayerId) -> Vec<Unit> {
        read_lock(&self.world)
            .objects()
            .units_of(player)
            .cloned()
            .collect()
    }

    /// Copy of a player's record.
    #[must_use]
    pub fn player_snapshot(&self, player: PlayerId) -> Option<Player> {
        read_lock(&self.world).economy().player(player).cloned()
    }

    /// Status effects on a unit.
    #[must_use]
    pub fn effects_on(&self, unit: EntityId) -> Vec<ActiveEffect> {
        read_lock(&self.world).status().effects(unit)
    }

    /// Entity and queue counts.
    #[must_use]
    pub fn stats(&self) -> WorldStats {
        read_lock(&self.world).stats()
    }

    /// Determinism hash of the current state.
    #[must_use]
    pub fn state_hash(&self) -> u64 {
        read_lock(&self.world).state_hash()
    }

    /// Drain buffered events.
    #[must_use]
    pub fn drain_events(&self) -> Vec<GameEvent> {
        self.events.drain()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::PlayerSettings;

    fn settings() -> GameSettings {
        GameSettings::default()
            .with_player(PlayerSettings::human("Red", "skirmish"))
            .with_player(PlayerSettings::human("Blue", "skirmish"))
    }

    #[test]
    fn test_new_game_seats_players() {
        let game = Game::new_game(settings(), GameAssets::skirmish()).unwrap();
        assert_eq!(game.state(), GameState::Loading);
        let world = game.world();
        for player in [1, 2] {
            assert_eq!(world.objects().living_unit_count(player), 4);
            assert_eq!(world.objects().buildings_of(player).count(), 1);
            assert_eq!(world.economy().player(player).unwrap().resource("gold"), 500);
        }
        assert_eq!(world.objects().nodes().count(), 4);
    }

    #[test]
    fn test_unknown_faction_rejected() {
        let settings = GameSettings::default().with_player(PlayerSettings::human("Red", "elves"));
        assert!(matches!(
            Game::new_game(settings, GameAssets::skirmish()),
            Err(GameError::UnknownType { kind: "faction", .. })
        ));
    }

    #[test]
    fn test_transitions() {
        let mut game = Game::new_game(settings(), GameAssets::skirmish()).unwrap();
        assert!(matches!(
            game.pause(),
            Err(GameError::InvalidTransition {
                from: GameState::Loading,
                ..
            })
        ));
        game.start().unwrap();
        game.pause().unwrap();
        assert!(game.update(0.1).unwrap().is_none());
        game.resume().unwrap();
        assert!(game.update(0.1).unwrap().is_some());
        game.stop().unwrap();
        assert!(game.start().is_err());
        assert_eq!(game.outcome().unwrap().reason, EndReason::Stopped);
    }

    #[test]
    fn test_game_speed_scales_time() {
        let mut s = settings();
        s.game_speed = 2.0;
        let mut game = Game::new_game(s, GameAssets::skirmish()).unwrap();
        game.start().unwrap();
        game.update(0.5).unwrap();
        assert!((game.world().time() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_time_limit_ends_match() {
        let mut game = Game::new_game(settings().with_time_limit(1), GameAssets::skirmish()).unwrap();
        game.start().unwrap();
        for _ in 0..10 {
            game.update(0.1).unwrap();
        }
        assert_eq!(game.state(), GameState::Ended);
        assert_eq!(game.outcome().unwrap().reason, EndReason::TimeLimit);
    }

    #[test]
    fn test_handle_snapshots() {
        let game = Game::new_game(settings(), GameAssets::skirmish()).unwrap();
        let handle = game.handle();
        let units = handle.units_for_player(2);
        assert_eq!(units.len(), 4);
        assert_eq!(handle.unit_snapshot(units[0].id).unwrap().player_id, 2);
        assert!(handle.player_snapshot(1).is_some());
        assert_eq!(handle.stats().units, 8);
    }
}
