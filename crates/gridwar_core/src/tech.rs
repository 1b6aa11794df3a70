//! Per-player research.
//!
//! A tech can be researched once its prerequisites are done and no tech it
//! is mutually exclusive with has been researched or started. Starting
//! research pays the full cost up front; cancelling refunds it in full.
//! Completed techs apply their stat modifiers to the player's existing units
//! and to every unit spawned afterwards.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::components::{PlayerId, Unit};
use crate::data::{Catalog, TechData};
use crate::economy::{Economy, ResourceMap};
use crate::error::{GameError, Result};
use crate::events::{EventQueue, EventType, GameEvent};
use crate::objects::ObjectManager;

/// Research underway.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResearchState {
    /// Tech being researched.
    pub tech_id: String,
    /// Seconds of research done.
    pub progress: f64,
    /// Seconds required.
    pub duration: f64,
    /// What was paid, refunded on cancel.
    pub cost: ResourceMap,
    /// World time research began.
    pub started_at: f64,
}

impl ResearchState {
    /// Progress in `[0, 1]`.
    #[must_use]
    pub fn fraction(&self) -> f64 {
        if self.duration <= 0.0 {
            1.0
        } else {
            (self.progress / self.duration).min(1.0)
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct PlayerResearch {
    researched: BTreeSet<String>,
    in_progress: BTreeMap<String, ResearchState>,
}

/// Tech definitions plus each player's research state.
#[derive(Debug, Clone)]
pub struct TechTree {
    techs: BTreeMap<String, TechData>,
    players: BTreeMap<PlayerId, PlayerResearch>,
    events: EventQueue,
}

impl TechTree {
    /// Tree over `techs`, publishing into `events`.
    #[must_use]
    pub fn new(techs: impl IntoIterator<Item = TechData>, events: EventQueue) -> Self {
        Self {
            techs: techs.into_iter().map(|t| (t.id.clone(), t)).collect(),
            players: BTreeMap::new(),
            events,
        }
    }

    /// Tree over every tech in the catalog.
    #[must_use]
    pub fn from_catalog(catalog: &Catalog, events: EventQueue) -> Self {
        Self::new(catalog.technologies().cloned(), events)
    }

    /// Look up a tech.
    #[must_use]
    pub fn tech(&self, id: &str) -> Option<&TechData> {
        self.techs.get(id)
    }

    /// All techs in id order.
    pub fn techs(&self) -> impl Iterator<Item = &TechData> {
        self.techs.values()
    }

    fn require_tech(&self, id: &str) -> Result<&TechData> {
        self.tech(id).ok_or_else(|| GameError::UnknownType {
            kind: "tech",
            name: id.to_string(),
        })
    }

    /// Whether `player` has finished `tech`.
    #[must_use]
    pub fn is_researched(&self, player: PlayerId, tech: &str) -> bool {
        self.players
            .get(&player)
            .is_some_and(|p| p.researched.contains(tech))
    }

    /// Whether every id in `required` is researched by `player`.
    #[must_use]
    pub fn has_all(&self, player: PlayerId, required: &[String]) -> bool {
        required.iter().all(|t| self.is_researched(player, t))
    }

    /// Techs `player` has finished.
    #[must_use]
    pub fn researched(&self, player: PlayerId) -> Vec<String> {
        self.players
            .get(&player)
            .map(|p| p.researched.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Research `player` has underway.
    #[must_use]
    pub fn in_progress(&self, player: PlayerId) -> Vec<ResearchState> {
        self.players
            .get(&player)
            .map(|p| p.in_progress.values().cloned().collect())
            .unwrap_or_default()
    }

    /// Check that `player` may start `tech` now.
    pub fn can_research(&self, player: PlayerId, tech: &str) -> Result<()> {
        let data = self.require_tech(tech)?;
        let state = self.players.get(&player);
        let researched = |id: &str| state.is_some_and(|p| p.researched.contains(id));
        let started = |id: &str| state.is_some_and(|p| p.in_progress.contains_key(id));

        if researched(tech) {
            return Err(GameError::InvalidState(format!("{tech} is already researched")));
        }
        if started(tech) {
            return Err(GameError::InvalidState(format!("{tech} is already being researched")));
        }
        if let Some(missing) = data.prerequisites.iter().find(|p| !researched(p.as_str())) {
            return Err(GameError::TechRequirementNotMet(format!(
                "{tech} requires {missing}"
            )));
        }
        let conflict = state.and_then(|p| {
            p.researched
                .iter()
                .chain(p.in_progress.keys())
                .find(|other| {
                    data.excludes(other)
                        || self.tech(other).is_some_and(|o| o.excludes(tech))
                })
        });
        if let Some(other) = conflict {
            return Err(GameError::TechRequirementNotMet(format!(
                "{tech} is exclusive with {other}"
            )));
        }
        Ok(())
    }

    /// Pay for and begin research.
    pub fn start_research(
        &mut self,
        economy: &mut Economy,
        player: PlayerId,
        tech: &str,
        now: f64,
    ) -> Result<()> {
        self.can_research(player, tech)?;
        let data = self.require_tech(tech)?;
        let cost = data.cost.clone();
        let duration = f64::from(data.research_time.max(0.0));
        economy.deduct(player, &cost, &format!("research {tech}"), now)?;

        self.players.entry(player).or_default().in_progress.insert(
            tech.to_string(),
            ResearchState {
                tech_id: tech.to_string(),
                progress: 0.0,
                duration,
                cost,
                started_at: now,
            },
        );
        tracing::info!(player, tech, duration, "research started");
        self.events.publish(
            GameEvent::new(EventType::ResearchStarted, now, Some(player)).with_data("tech", tech),
        );
        Ok(())
    }

    /// Stop research and refund its cost in full.
    pub fn cancel_research(
        &mut self,
        economy: &mut Economy,
        player: PlayerId,
        tech: &str,
        now: f64,
    ) -> Result<()> {
        let state = self
            .players
            .get_mut(&player)
            .and_then(|p| p.in_progress.remove(tech))
            .ok_or_else(|| GameError::InvalidState(format!("{tech} is not being researched")))?;
        economy.refund(player, &state.cost, &format!("cancel research {tech}"), now)?;
        tracing::info!(player, tech, "research cancelled");
        self.events.publish(
            GameEvent::new(EventType::ResearchCancelled, now, Some(player)).with_data("tech", tech),
        );
        Ok(())
    }

    /// Advance all research by `dt`. Finished techs are applied to the
    /// owner's living units. Returns the `(player, tech)` pairs completed.
    pub fn process(
        &mut self,
        objects: &mut ObjectManager,
        dt: f64,
        now: f64,
    ) -> Vec<(PlayerId, String)> {
        let mut completed = Vec::new();
        for (&player, research) in &mut self.players {
            let done: Vec<String> = research
                .in_progress
                .values_mut()
                .filter_map(|state| {
                    state.progress += dt;
                    (state.progress + 1e-9 >= state.duration).then(|| state.tech_id.clone())
                })
                .collect();
            for tech in done {
                research.in_progress.remove(&tech);
                research.researched.insert(tech.clone());
                completed.push((player, tech));
            }
        }

        for (player, tech) in &completed {
            if let Some(data) = self.techs.get(tech) {
                let ids: Vec<_> = objects.units_of(*player).map(|u| u.id).collect();
                for id in ids {
                    if let Some(unit) = objects.unit_mut(id) {
                        apply_tech(data, unit);
                    }
                }
            }
            tracing::info!(player, tech = %tech, "research complete");
            self.events.publish(
                GameEvent::new(EventType::TechResearched, now, Some(*player)).with_data("tech", tech),
            );
        }
        completed
    }

    /// Apply every tech `player` has researched to a freshly spawned unit.
    pub fn apply_researched(&self, player: PlayerId, unit: &mut Unit) {
        let Some(state) = self.players.get(&player) else {
            return;
        };
        for tech in &state.researched {
            if let Some(data) = self.techs.get(tech) {
                apply_tech(data, unit);
            }
        }
    }

    /// Cheapest tech `player` may start, by total cost then id.
    #[must_use]
    pub fn cheapest_available(&self, player: PlayerId) -> Option<&TechData> {
        self.techs
            .values()
            .filter(|t| self.can_research(player, &t.id).is_ok())
            .min_by_key(|t| (t.cost.values().sum::<i64>(), t.id.clone()))
    }
}

fn apply_tech(tech: &TechData, unit: &mut Unit) {
    if !unit.is_alive() {
        return;
    }
    for (stat, value, is_percent, effect) in tech.stat_modifiers() {
        if !effect.applies(&unit.unit_type, &unit.tags) {
            continue;
        }
        let adjust = |base: f32| {
            if is_percent {
                base * (1.0 + value / 100.0)
            } else {
                base + value
            }
        };
        match stat {
            "damage" => unit.attack_damage = adjust(unit.attack_damage).max(0.0),
            "speed" => unit.speed = adjust(unit.speed).max(0.0),
            "armor" => unit.armor = adjust(unit.armor),
            "attack_speed" => unit.attack_speed = adjust(unit.attack_speed).max(0.0),
            "range" => {
                unit.attack_range = adjust(unit.attack_range).max(0.0);
                unit.recompute_sight();
            }
            "health" => {
                let max = unit.max_health();
                if max > 0.0 {
                    unit.scale_max_health(adjust(max) / max);
                }
            }
            other => tracing::warn!(tech = %tech.id, stat = other, "unknown tech stat ignored"),
        }
    }
}
