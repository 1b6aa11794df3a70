//! Match metrics collection.
//!
//! The collector watches the event stream while a match runs and the
//! summary is built from the final world state.

use std::collections::BTreeMap;

use gridwar_core::components::PlayerId;
use gridwar_core::economy::ResourceMap;
use gridwar_core::events::GameEvent;
use gridwar_core::game::{EndReason, Game};
use serde::{Deserialize, Serialize};

/// Final numbers for one player.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerSummary {
    /// Player id.
    pub id: PlayerId,
    /// Display name.
    pub name: String,
    /// Living units.
    pub units: usize,
    /// Standing buildings.
    pub buildings: usize,
    /// Stockpile.
    pub resources: ResourceMap,
    /// Lifetime spending.
    pub spent: ResourceMap,
    /// Lifetime gathering.
    pub gathered: ResourceMap,
    /// Eliminated.
    pub defeated: bool,
}

/// Everything printed at the end of a headless run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchSummary {
    /// Scenario name.
    pub scenario: String,
    /// Ticks run.
    pub ticks: u64,
    /// Game time elapsed in seconds.
    pub elapsed_secs: f64,
    /// Winner, when the match ended with one.
    pub winner: Option<PlayerId>,
    /// How the match ended, if it did.
    pub end_reason: Option<EndReason>,
    /// Per-player results.
    pub players: Vec<PlayerSummary>,
    /// Event counts keyed by event type.
    pub events_by_type: BTreeMap<String, u64>,
    /// Events lost to a full queue.
    pub dropped_events: u64,
    /// Final determinism hash.
    pub state_hash: u64,
}

/// Tallies events as they are drained.
#[derive(Debug, Clone, Default)]
pub struct MetricsCollector {
    events_by_type: BTreeMap<String, u64>,
}

impl MetricsCollector {
    /// Create an empty collector.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Count a batch of drained events.
    pub fn record(&mut self, events: &[GameEvent]) {
        for event in events {
            *self
                .events_by_type
                .entry(format!("{:?}", event.event_type))
                .or_insert(0) += 1;
        }
    }

    /// Count of one event type.
    #[must_use]
    pub fn count(&self, event_type: &str) -> u64 {
        self.events_by_type.get(event_type).copied().unwrap_or(0)
    }

    /// Build the summary from the match's current state.
    #[must_use]
    pub fn summarize(&self, scenario: &str, game: &Game) -> MatchSummary {
        let world = game.world();
        let players = world
            .economy()
            .players()
            .map(|player| PlayerSummary {
                id: player.id,
                name: player.name.clone(),
                units: world.objects().living_unit_count(player.id),
                buildings: world.objects().buildings_of(player.id).count(),
                resources: player.resources.clone(),
                spent: player.resources_spent.clone(),
                gathered: player.resources_gathered.clone(),
                defeated: player.is_defeated,
            })
            .collect();
        let outcome = game.outcome();
        MatchSummary {
            scenario: scenario.to_string(),
            ticks: world.tick(),
            elapsed_secs: world.time(),
            winner: outcome.and_then(|o| o.winner),
            end_reason: outcome.map(|o| o.reason),
            players,
            events_by_type: self.events_by_type.clone(),
            dropped_events: game.events().dropped(),
            state_hash: world.state_hash(),
        }
    }
}
