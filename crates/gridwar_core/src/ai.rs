//! Strategic AI for computer-controlled players.
//!
//! Each [`StrategicAi`] runs on a coarser cadence than the world tick. An
//! evaluation has three steps:
//!
//! 1. **Assess** the player's position into a normalised [`StrategyState`]
//! 2. **Decide** by scoring candidate [`Decision`]s against the personality
//!    profile and difficulty
//! 3. **Act** on the best candidate by issuing ordinary commands
//!
//! Before deciding, idle workers are sent to the nearest resource node.
//! Outcomes are kept in a short history; decision types that failed recently
//! score lower on the next evaluation.

use std::collections::{BTreeMap, VecDeque};

use serde::{Deserialize, Serialize};

use crate::commands::Command;
use crate::components::{EntityId, PlayerId, Unit};
use crate::economy::ResourceMap;
use crate::error::{GameError, Result};
use crate::formations::Formation;
use crate::math::{centroid, Point3};
use crate::world::World;

// ============================================================================
// Decisions
// ============================================================================

/// Kind of strategic move.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub enum DecisionType {
    /// Claim more of the map with new economic buildings.
    Expand,
    /// Send the army at the nearest known enemy.
    Attack,
    /// Pull idle forces back to guard the base.
    Defend,
    /// Start the cheapest available technology.
    Research,
    /// Train units or raise housing.
    Build,
    /// Look for the enemy.
    Scout,
    /// Withdraw every military unit to the base.
    Retreat,
    /// Upgrade a building.
    Upgrade,
}

/// A scored candidate action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Decision {
    /// What to do.
    pub decision_type: DecisionType,
    /// Score after personality, difficulty and history weighting.
    pub priority: f32,
    /// How sure the AI is that this will work, in `[0, 1]`.
    pub confidence: f32,
    /// Human-readable reason.
    pub rationale: String,
    /// Action details (`"unit"`, `"building"`, `"tech"`...).
    pub parameters: BTreeMap<String, String>,
}

impl Decision {
    fn new(decision_type: DecisionType, base: f32, confidence: f32, rationale: String) -> Self {
        Self {
            decision_type,
            priority: base,
            confidence: confidence.clamp(0.0, 1.0),
            rationale,
            parameters: BTreeMap::new(),
        }
    }

    fn with(mut self, key: &str, value: impl ToString) -> Self {
        self.parameters.insert(key.to_string(), value.to_string());
        self
    }

    fn parameter(&self, key: &str) -> Option<&str> {
        self.parameters.get(key).map(String::as_str)
    }
}

/// A decision the AI acted on and how it went.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionRecord {
    /// The decision.
    pub decision: Decision,
    /// World time of the attempt.
    pub time: f64,
    /// Failure reason, if the commands were refused.
    pub failure: Option<String>,
}

impl DecisionRecord {
    /// The commands were accepted.
    #[must_use]
    pub fn succeeded(&self) -> bool {
        self.failure.is_none()
    }
}

// ============================================================================
// Personality and difficulty
// ============================================================================

/// Weights in `[0, 1]` that bias decision scoring.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PersonalityProfile {
    /// Workers, income and upgrades.
    pub economic: f32,
    /// Training an army.
    pub military: f32,
    /// Claiming territory.
    pub expansion: f32,
    /// Research.
    pub technology: f32,
    /// Attacking.
    pub aggression: f32,
    /// Defending and retreating.
    pub defense: f32,
    /// Avoiding needless fights.
    pub diplomacy: f32,
    /// Scouting and new tech.
    pub innovation: f32,
}

impl PersonalityProfile {
    const fn new(values: [f32; 8]) -> Self {
        Self {
            economic: values[0],
            military: values[1],
            expansion: values[2],
            technology: values[3],
            aggression: values[4],
            defense: values[5],
            diplomacy: values[6],
            innovation: values[7],
        }
    }
}

/// Named personality presets, or a custom profile.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub enum Personality {
    /// Even weights.
    #[default]
    Balanced,
    /// Army first, attacks early.
    Aggressive,
    /// Workers and income.
    Economic,
    /// Holds ground, researches.
    Defensive,
    /// Research above all.
    Technological,
    /// Builds outward.
    Expansionist,
    /// Caller-supplied weights.
    Custom(PersonalityProfile),
}

impl Personality {
    /// Weights for this personality.
    #[must_use]
    pub fn profile(&self) -> PersonalityProfile {
        //                               eco  mil  exp  tech aggr def  dipl innov
        match self {
            Self::Balanced => PersonalityProfile::new([0.5, 0.5, 0.5, 0.5, 0.5, 0.5, 0.5, 0.5]),
            Self::Aggressive => PersonalityProfile::new([0.3, 0.8, 0.3, 0.2, 0.9, 0.2, 0.1, 0.3]),
            Self::Economic => PersonalityProfile::new([0.9, 0.3, 0.6, 0.4, 0.2, 0.4, 0.6, 0.3]),
            Self::Defensive => PersonalityProfile::new([0.5, 0.5, 0.2, 0.6, 0.1, 0.9, 0.5, 0.3]),
            Self::Technological => {
                PersonalityProfile::new([0.5, 0.3, 0.3, 0.9, 0.2, 0.5, 0.4, 0.8])
            }
            Self::Expansionist => {
                PersonalityProfile::new([0.6, 0.4, 0.9, 0.3, 0.4, 0.3, 0.3, 0.5])
            }
            Self::Custom(profile) => *profile,
        }
    }
}

/// Skill level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Difficulty {
    /// Plays slowly and hesitantly.
    Easy,
    /// Baseline.
    #[default]
    Normal,
    /// Plays harder.
    Hard,
    /// Acts on thin evidence.
    Expert,
}

impl Difficulty {
    /// Priority multiplier.
    #[must_use]
    pub fn multiplier(self) -> f32 {
        match self {
            Self::Easy => 0.7,
            Self::Normal => 1.0,
            Self::Hard => 1.2,
            Self::Expert => 1.4,
        }
    }
}

/// Tunables shared by every AI.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AiConfig {
    /// Confidence needed to act at Normal difficulty.
    pub confidence_threshold: f32,
    /// Decisions kept in the history ring.
    pub history_size: usize,
    /// Priority factor for a type that failed recently.
    pub failure_penalty: f32,
    /// Enemies this close to any owned entity are detected.
    pub detection_radius: f32,
    /// Enemies this close to the base count as a threat.
    pub defend_radius: f32,
    /// Population pressure above which housing is built.
    pub housing_pressure: f32,
    /// Workers wanted before favouring soldiers.
    pub target_workers: usize,
    /// Distance from the base centroid for new buildings.
    pub build_offset: f32,
    /// Building placed by Expand.
    pub expansion_building: String,
    /// Building placed for housing.
    pub housing_building: String,
    /// Radius searched when assigning idle workers.
    pub gather_search_radius: f32,
}

impl Default for AiConfig {
    fn default() -> Self {
        Self {
            confidence_threshold: 0.3,
            history_size: 32,
            failure_penalty: 0.5,
            detection_radius: 25.0,
            defend_radius: 15.0,
            housing_pressure: 0.7,
            target_workers: 6,
            build_offset: 6.0,
            expansion_building: "farm".to_string(),
            housing_building: "house".to_string(),
            gather_search_radius: 60.0,
        }
    }
}

// ============================================================================
// Assessment
// ============================================================================

/// Normalised snapshot of a player's position. Every score is in `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct StrategyState {
    /// Workers and income.
    pub economic_strength: f32,
    /// Own army relative to detected enemies.
    pub military_strength: f32,
    /// Detected enemies near the base relative to the army.
    pub threat_level: f32,
    /// Share of all buildings owned.
    pub territory_control: f32,
    /// Stockpile size.
    pub resource_stockpile: f32,
    /// Population used over cap.
    pub population_pressure: f32,
    /// Nearest detected enemy to the base.
    pub enemy_position: Option<Point3>,
    /// Centroid of owned buildings (or units with no buildings).
    pub base: Option<Point3>,
    /// Living military units.
    pub military_units: usize,
    /// Living workers.
    pub workers: usize,
}

fn is_military(unit: &Unit) -> bool {
    unit.is_alive() && unit.is_combatant() && !unit.is_worker()
}

fn is_idle(unit: &Unit) -> bool {
    unit.is_alive() && unit.current_command.is_none() && unit.command_queue.is_empty()
}

fn ratio(part: f32, whole: f32) -> f32 {
    if whole <= 0.0 {
        0.0
    } else {
        (part / whole).clamp(0.0, 1.0)
    }
}

// ============================================================================
// Strategic AI
// ============================================================================

/// Decision-making agent for one player.
#[derive(Debug, Clone)]
pub struct StrategicAi {
    player: PlayerId,
    personality: Personality,
    difficulty: Difficulty,
    config: AiConfig,
    state: StrategyState,
    recent: VecDeque<DecisionRecord>,
    last_candidates: Vec<Decision>,
    evaluations: u64,
}

impl StrategicAi {
    /// Create an AI for `player`.
    #[must_use]
    pub fn new(player: PlayerId, personality: Personality, difficulty: Difficulty) -> Self {
        Self {
            player,
            personality,
            difficulty,
            config: AiConfig::default(),
            state: StrategyState::default(),
            recent: VecDeque::new(),
            last_candidates: Vec::new(),
            evaluations: 0,
        }
    }

    /// Builder: replace the tunables.
    #[must_use]
    pub fn with_config(mut self, config: AiConfig) -> Self {
        self.config = config;
        self
    }

    /// Controlled player.
    #[must_use]
    pub fn player(&self) -> PlayerId {
        self.player
    }

    /// Personality.
    #[must_use]
    pub fn personality(&self) -> Personality {
        self.personality
    }

    /// Difficulty.
    #[must_use]
    pub fn difficulty(&self) -> Difficulty {
        self.difficulty
    }

    /// Latest assessment.
    #[must_use]
    pub fn state(&self) -> &StrategyState {
        &self.state
    }

    /// Decisions acted on, oldest first.
    pub fn recent_decisions(&self) -> impl Iterator<Item = &DecisionRecord> {
        self.recent.iter()
    }

    /// Every candidate scored in the latest evaluation, best first.
    #[must_use]
    pub fn last_candidates(&self) -> &[Decision] {
        &self.last_candidates
    }

    /// Evaluations run.
    #[must_use]
    pub fn evaluations(&self) -> u64 {
        self.evaluations
    }

    /// Confidence needed to act at this difficulty.
    #[must_use]
    pub fn confidence_threshold(&self) -> f32 {
        self.config.confidence_threshold / self.difficulty.multiplier()
    }

    /// Run one assess / decide / act cycle. Returns the decision acted on.
    pub fn evaluate(&mut self, world: &mut World, now: f64) -> Option<Decision> {
        let defeated = world
            .economy()
            .player(self.player)
            .map_or(true, |p| p.is_defeated);
        if defeated {
            return None;
        }
        self.evaluations += 1;
        self.assign_idle_workers(world);
        self.state = self.assess(world);
        self.last_candidates = self.decide(world);

        let threshold = self.confidence_threshold();
        let chosen = self
            .last_candidates
            .iter()
            .find(|d| d.confidence >= threshold)
            .cloned()?;

        let failure = self.act(world, &chosen).err().map(|err| err.to_string());
        match &failure {
            None => tracing::info!(
                player = self.player,
                decision = ?chosen.decision_type,
                priority = chosen.priority,
                rationale = %chosen.rationale,
                "ai decision"
            ),
            Some(reason) => tracing::warn!(
                player = self.player,
                decision = ?chosen.decision_type,
                reason = %reason,
                "ai decision failed"
            ),
        }
        if self.recent.len() >= self.config.history_size.max(1) {
            self.recent.pop_front();
        }
        self.recent.push_back(DecisionRecord {
            decision: chosen.clone(),
            time: now,
            failure,
        });
        Some(chosen)
    }

    // ------------------------------------------------------------------
    // Housekeeping
    // ------------------------------------------------------------------

    fn assign_idle_workers(&self, world: &mut World) {
        let assignments: Vec<(EntityId, EntityId)> = world
            .objects()
            .units_of(self.player)
            .filter(|u| is_idle(u) && u.is_worker())
            .filter_map(|u| {
                world
                    .objects()
                    .nearest_node(u.position(), self.config.gather_search_radius, None)
                    .filter(|&node| {
                        world
                            .objects()
                            .node(node)
                            .is_some_and(|n| u.gather_rate.contains_key(&n.resource_type))
                    })
                    .map(|node| (u.id, node))
            })
            .collect();
        for (worker, node) in assignments {
            if let Err(err) = world.issue_command(self.player, worker, Command::gather(node)) {
                tracing::debug!(player = self.player, worker, %err, "gather assignment refused");
            }
        }
    }

    // ------------------------------------------------------------------
    // Assess
    // ------------------------------------------------------------------

    /// Score the player's current position.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn assess(&self, world: &World) -> StrategyState {
        let objects = world.objects();
        let player = self.player;

        let base = centroid(objects.buildings_of(player).map(|b| b.position())).or_else(|| {
            centroid(
                objects
                    .units_of(player)
                    .filter(|u| u.is_alive())
                    .map(Unit::position),
            )
        });

        let workers = objects
            .units_of(player)
            .filter(|u| u.is_alive() && u.is_worker())
            .count();
        let military_units = objects.units_of(player).filter(|u| is_military(u)).count();

        let watchers: Vec<(Point3, f32)> = objects
            .units_of(player)
            .filter(|u| u.is_alive())
            .map(|u| (u.position(), u.sight_range.max(self.config.detection_radius)))
            .chain(
                objects
                    .buildings_of(player)
                    .map(|b| (b.position(), self.config.detection_radius + b.radius)),
            )
            .collect();
        let detected = |p: Point3| watchers.iter().any(|&(w, r)| w.distance(p) <= r);

        let mut detected_military = 0usize;
        let mut threats = 0usize;
        let mut enemy_position: Option<(f32, Point3)> = None;
        let anchor = base.unwrap_or(Point3::ZERO);
        let enemy_points = objects
            .units()
            .filter(|u| u.is_alive() && u.player_id != player)
            .map(|u| (u.position(), is_military(u)))
            .chain(
                objects
                    .buildings()
                    .filter(|b| !b.is_destroyed() && b.player_id != player)
                    .map(|b| (b.position(), false)),
            );
        for (position, military) in enemy_points {
            if !detected(position) {
                continue;
            }
            let distance = position.distance(anchor);
            if military {
                detected_military += 1;
                if distance <= self.config.defend_radius {
                    threats += 1;
                }
            }
            if enemy_position.map_or(true, |(best, _)| distance < best) {
                enemy_position = Some((distance, position));
            }
        }

        let income: f32 = world
            .economy()
            .generation_rates(player, objects.buildings(), world.catalog())
            .values()
            .sum();
        let stockpile: i64 = world
            .economy()
            .player(player)
            .map_or(0, |p| p.resources.values().sum());
        let own_buildings = objects.buildings_of(player).count();

        StrategyState {
            economic_strength: 0.5 * ratio(workers as f32, self.config.target_workers as f32 * 1.5)
                + 0.5 * ratio(income, 5.0),
            military_strength: ratio(
                military_units as f32,
                (military_units + detected_military) as f32,
            ),
            threat_level: ratio(threats as f32, (military_units + 1) as f32),
            territory_control: ratio(own_buildings as f32, objects.building_count() as f32),
            resource_stockpile: ratio(stockpile as f32, 2000.0),
            population_pressure: world.population(player).pressure().clamp(0.0, 1.0),
            enemy_position: enemy_position.map(|(_, p)| p),
            base,
            military_units,
            workers,
        }
    }

    // ------------------------------------------------------------------
    // Decide
    // ------------------------------------------------------------------

    fn failed_recently(&self, decision_type: DecisionType) -> bool {
        self.recent
            .iter()
            .rev()
            .take(4)
            .any(|r| r.decision.decision_type == decision_type && !r.succeeded())
    }

    fn weigh(&self, mut decision: Decision, weight: f32) -> Decision {
        decision.priority *= (0.5 + weight) * self.difficulty.multiplier();
        if self.failed_recently(decision.decision_type) {
            decision.priority *= self.config.failure_penalty;
        }
        decision
    }

    /// Score every applicable candidate, best first.
    #[must_use]
    pub fn decide(&self, world: &World) -> Vec<Decision> {
        let s = self.state;
        let p = self.personality.profile();
        let objects = world.objects();
        let economy = world.economy();
        let player = self.player;
        let idle_worker = objects
            .units_of(player)
            .any(|u| is_idle(u) && u.is_worker());
        let idle_military = objects
            .units_of(player)
            .filter(|u| is_idle(u) && is_military(u))
            .count();
        let mut candidates = Vec::new();

        if let Some(enemy) = s.enemy_position {
            if idle_military > 0 {
                let attack = Decision::new(
                    DecisionType::Attack,
                    0.4 + 0.4 * s.military_strength,
                    0.3 + 0.7 * s.military_strength,
                    format!("{idle_military} idle units and an enemy in sight"),
                )
                .with("x", enemy.x)
                .with("z", enemy.z);
                candidates.push(self.weigh(attack, (p.aggression + p.military) / 2.0));
            }
        }

        if s.threat_level > 0.3 && idle_military > 0 {
            let defend = Decision::new(
                DecisionType::Defend,
                s.threat_level,
                0.5 + 0.5 * s.threat_level,
                "enemies near the base".into(),
            );
            candidates.push(self.weigh(defend, p.defense));
        }

        if s.threat_level > 0.7 && s.military_strength < 0.3 && s.military_units > 0 {
            let retreat = Decision::new(
                DecisionType::Retreat,
                0.8,
                1.0 - s.military_strength,
                "outnumbered".into(),
            );
            candidates.push(self.weigh(retreat, p.defense * (1.0 - p.aggression / 2.0)));
        }

        if let Some(tech) = world.tech().cheapest_available(player) {
            if economy.can_afford(player, &tech.cost) {
                let research = Decision::new(
                    DecisionType::Research,
                    0.35,
                    0.4 + 0.6 * s.resource_stockpile,
                    format!("{} is affordable", tech.id),
                )
                .with("tech", &tech.id);
                candidates.push(self.weigh(research, (p.technology + p.innovation) / 2.0));
            }
        }

        let housing_cost = world
            .catalog()
            .building(&self.config.housing_building)
            .map(|b| b.cost.clone())
            .unwrap_or_default();
        if s.population_pressure > self.config.housing_pressure
            && idle_worker
            && economy.can_afford(player, &housing_cost)
        {
            let house = Decision::new(
                DecisionType::Build,
                0.5 + 0.5 * s.population_pressure,
                0.8,
                "population nearly capped".into(),
            )
            .with("building", &self.config.housing_building);
            candidates.push(self.weigh(house, p.economic));
        } else if let Some((building, unit, military)) = self.training_choice(world) {
            let base = if military {
                0.2 + 0.45 * (1.0 - s.military_strength)
            } else {
                0.2 + 0.45 * (1.0 - s.economic_strength)
            };
            let weight = if military { p.military } else { p.economic };
            let train = Decision::new(
                DecisionType::Build,
                base,
                0.6,
                format!("train {unit}"),
            )
            .with("producer", building)
            .with("unit", unit);
            candidates.push(self.weigh(train, weight));
        }

        let expansion_cost = world
            .catalog()
            .building(&self.config.expansion_building)
            .map(|b| b.cost.clone());
        if let Some(cost) = expansion_cost {
            if idle_worker && s.resource_stockpile > 0.2 && economy.can_afford(player, &cost) {
                let expand = Decision::new(
                    DecisionType::Expand,
                    0.1 + 0.3 * (1.0 - s.territory_control),
                    0.5,
                    "room to grow".into(),
                )
                .with("building", &self.config.expansion_building);
                candidates.push(self.weigh(expand, p.expansion));
            }
        }

        if s.enemy_position.is_none() && objects.units_of(player).any(is_idle) {
            let scout = Decision::new(
                DecisionType::Scout,
                0.25,
                0.5,
                "enemy location unknown".into(),
            );
            candidates.push(self.weigh(scout, (p.innovation + p.expansion) / 2.0));
        }

        if s.resource_stockpile > 0.6 {
            if let Some(building) = self.upgrade_choice(world) {
                let upgrade = Decision::new(
                    DecisionType::Upgrade,
                    0.2,
                    0.5,
                    "spare resources".into(),
                )
                .with("building", building);
                candidates.push(self.weigh(upgrade, (p.economic + p.innovation) / 2.0));
            }
        }

        candidates.sort_by(|a, b| {
            b.priority
                .total_cmp(&a.priority)
                .then(a.decision_type.cmp(&b.decision_type))
        });
        candidates
    }

    /// A producer building with room, and the unit it should train.
    fn training_choice(&self, world: &World) -> Option<(EntityId, String, bool)> {
        let want_workers = self.state.workers < self.config.target_workers;
        let mut fallback = None;
        for building in world.objects().buildings_of(self.player) {
            if !building.is_built() || building.is_destroyed() {
                continue;
            }
            if world
                .production()
                .queue(building.id)
                .is_some_and(|q| !q.is_empty())
            {
                continue;
            }
            let Some(data) = world.catalog().building(&building.building_type) else {
                continue;
            };
            for unit_type in &data.produces {
                let Some(template) = world.catalog().unit(unit_type) else {
                    continue;
                };
                if !world.economy().can_afford(self.player, &template.cost)
                    || world.can_create_unit(self.player, unit_type).is_err()
                {
                    continue;
                }
                let is_worker = template.is_worker();
                if is_worker == want_workers {
                    return Some((building.id, unit_type.clone(), !is_worker));
                }
                if fallback.is_none() {
                    fallback = Some((building.id, unit_type.clone(), !is_worker));
                }
            }
        }
        fallback
    }

    /// Lowest-level built building whose upgrade is affordable.
    fn upgrade_choice(&self, world: &World) -> Option<EntityId> {
        world
            .objects()
            .buildings_of(self.player)
            .filter(|b| b.is_built() && !b.is_destroyed())
            .filter(|b| {
                let cost: ResourceMap = world.upgrade_cost(b);
                world.economy().can_afford(self.player, &cost)
            })
            .min_by_key(|b| (b.upgrade_level, b.id))
            .map(|b| b.id)
    }

    // ------------------------------------------------------------------
    // Act
    // ------------------------------------------------------------------

    fn idle_units(&self, world: &World, filter: impl Fn(&Unit) -> bool) -> Vec<EntityId> {
        world
            .objects()
            .units_of(self.player)
            .filter(|u| is_idle(u) && filter(u))
            .map(|u| u.id)
            .collect()
    }

    fn base(&self) -> Result<Point3> {
        self.state
            .base
            .ok_or_else(|| GameError::InvalidState("player has no base".into()))
    }

    fn parse_id(decision: &Decision, key: &str) -> Result<EntityId> {
        decision
            .parameter(key)
            .and_then(|v| v.parse().ok())
            .ok_or_else(|| GameError::Validation(format!("decision missing {key}")))
    }

    /// Construction site for the next building, spiralling around the base.
    fn build_site(&self, world: &World) -> Result<Point3> {
        let base = self.base()?;
        #[allow(clippy::cast_precision_loss)]
        let n = world.objects().buildings_of(self.player).count() as f32;
        let angle = n * 1.1;
        let distance = self.config.build_offset + n * 0.5;
        Ok(base + Point3::new(angle.sin() * distance, 0.0, angle.cos() * distance))
    }

    fn act(&self, world: &mut World, decision: &Decision) -> Result<()> {
        let player = self.player;
        match decision.decision_type {
            DecisionType::Attack => {
                let target = self
                    .state
                    .enemy_position
                    .ok_or_else(|| GameError::InvalidState("no known enemy".into()))?;
                let army = self.idle_units(world, is_military);
                if army.is_empty() {
                    return Err(GameError::InvalidState("no idle military".into()));
                }
                let group = world.create_group(player, &army, Formation::Wedge)?;
                world.move_group(player, group, target)
            }
            DecisionType::Defend => {
                let post = self.base()?;
                let army = self.idle_units(world, is_military);
                if army.is_empty() {
                    return Err(GameError::InvalidState("no idle military".into()));
                }
                for unit in army {
                    world.issue_command(
                        player,
                        unit,
                        Command::guard(post, self.config.defend_radius),
                    )?;
                }
                Ok(())
            }
            DecisionType::Retreat => {
                let base = self.base()?;
                let army: Vec<EntityId> = world
                    .objects()
                    .units_of(player)
                    .filter(|u| is_military(u))
                    .map(|u| u.id)
                    .collect();
                for unit in army {
                    world.issue_command(player, unit, Command::stop())?;
                    world.issue_command(player, unit, Command::move_to(base))?;
                }
                Ok(())
            }
            DecisionType::Research => {
                let tech = decision
                    .parameter("tech")
                    .ok_or_else(|| GameError::Validation("decision missing tech".into()))?
                    .to_string();
                world.start_research(player, &tech)
            }
            DecisionType::Build | DecisionType::Expand => {
                if let Some(unit) = decision.parameter("unit") {
                    let unit = unit.to_string();
                    let producer = Self::parse_id(decision, "producer")?;
                    return world.queue_production(player, producer, &unit);
                }
                let building_type = decision
                    .parameter("building")
                    .ok_or_else(|| GameError::Validation("decision missing building".into()))?
                    .to_string();
                let worker = self
                    .idle_units(world, Unit::is_worker)
                    .first()
                    .copied()
                    .or_else(|| {
                        world
                            .objects()
                            .units_of(player)
                            .find(|u| {
                                u.is_alive()
                                    && u.is_worker()
                                    && u.current_command.as_ref().map_or(true, |c| {
                                        c.command_type == crate::commands::CommandType::Gather
                                    })
                            })
                            .map(|u| u.id)
                    })
                    .ok_or_else(|| GameError::InvalidState("no available worker".into()))?;
                let site = self.build_site(world)?;
                if let Some(unit) = world.objects_mut().unit_mut(worker) {
                    unit.current_command = None;
                }
                world.issue_command(player, worker, Command::build_new(&building_type, site))
            }
            DecisionType::Scout => {
                let base = self.base()?;
                let (width, height) = world.bounds().unwrap_or((64.0, 64.0));
                let quadrants = [
                    Point3::ground(width * 0.25, height * 0.25),
                    Point3::ground(width * 0.75, height * 0.25),
                    Point3::ground(width * 0.25, height * 0.75),
                    Point3::ground(width * 0.75, height * 0.75),
                ];
                let destination = quadrants
                    .into_iter()
                    .max_by(|a, b| a.distance(base).total_cmp(&b.distance(base)))
                    .unwrap_or(base);
                let scouts = self.idle_units(world, |u| !u.is_worker());
                let scout = scouts
                    .first()
                    .copied()
                    .or_else(|| self.idle_units(world, |_| true).first().copied())
                    .ok_or_else(|| GameError::InvalidState("no idle unit to scout".into()))?;
                world.issue_command(player, scout, Command::move_to(destination))
            }
            DecisionType::Upgrade => {
                let building = Self::parse_id(decision, "building")?;
                world.upgrade_building(player, building, None).map(|_| ())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::Player;
    use crate::data::Catalog;
    use crate::economy::resource_map;
    use crate::world::SimConfig;

    fn world() -> World {
        let mut world = World::new(SimConfig::default(), Catalog::skirmish(), 1.0);
        for id in [1, 2] {
            let mut player = Player::new(id, "p", "skirmish", true);
            player.resources = resource_map(&[("gold", 500), ("wood", 300)]);
            world.add_player(player);
        }
        world
    }

    #[test]
    fn test_difficulty_scales_threshold() {
        let easy = StrategicAi::new(1, Personality::Balanced, Difficulty::Easy);
        let expert = StrategicAi::new(1, Personality::Balanced, Difficulty::Expert);
        assert!(easy.confidence_threshold() > expert.confidence_threshold());
        assert!((Difficulty::Hard.multiplier() - 1.2).abs() < f32::EPSILON);
    }

    #[test]
    fn test_assess_detects_nearby_enemy() {
        let mut w = world();
        w.spawn_building(1, "town_hall", Point3::ZERO, true).unwrap();
        w.spawn_unit(1, "swordsman", Point3::ground(2.0, 0.0)).unwrap();
        w.spawn_unit(2, "swordsman", Point3::ground(12.0, 0.0)).unwrap();
        let ai = StrategicAi::new(1, Personality::Aggressive, Difficulty::Normal);
        let state = ai.assess(&w);
        assert_eq!(state.enemy_position, Some(Point3::ground(12.0, 0.0)));
        assert_eq!(state.military_units, 1);
        assert!((state.military_strength - 0.5).abs() < 1e-6);
        assert_eq!(state.base, Some(Point3::ZERO));
    }

    #[test]
    fn test_aggressive_prefers_attack_over_economic() {
        let mut w = world();
        w.spawn_unit(1, "swordsman", Point3::ZERO).unwrap();
        w.spawn_unit(1, "swordsman", Point3::ground(1.0, 0.0)).unwrap();
        w.spawn_unit(2, "worker", Point3::ground(15.0, 0.0)).unwrap();

        let mut aggressive = StrategicAi::new(1, Personality::Aggressive, Difficulty::Normal);
        let mut economic = StrategicAi::new(1, Personality::Economic, Difficulty::Normal);
        aggressive.state = aggressive.assess(&w);
        economic.state = economic.assess(&w);
        let attack_priority = |ai: &StrategicAi| {
            ai.decide(&w)
                .into_iter()
                .find(|d| d.decision_type == DecisionType::Attack)
                .map(|d| d.priority)
                .unwrap()
        };
        assert!(attack_priority(&aggressive) > attack_priority(&economic));
    }

    #[test]
    fn test_failed_type_is_penalised() {
        let mut w = world();
        w.spawn_unit(1, "swordsman", Point3::ZERO).unwrap();
        w.spawn_unit(2, "worker", Point3::ground(15.0, 0.0)).unwrap();
        let mut ai = StrategicAi::new(1, Personality::Aggressive, Difficulty::Normal);
        ai.state = ai.assess(&w);
        let before = ai.decide(&w)[0].clone();
        assert_eq!(before.decision_type, DecisionType::Attack);
        ai.recent.push_back(DecisionRecord {
            decision: before.clone(),
            time: 0.0,
            failure: Some("refused".into()),
        });
        let after = ai
            .decide(&w)
            .into_iter()
            .find(|d| d.decision_type == DecisionType::Attack)
            .unwrap();
        assert!((after.priority - before.priority * 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_idle_workers_sent_to_nodes() {
        let mut w = world();
        let worker = w.spawn_unit(1, "worker", Point3::ZERO).unwrap();
        let node = w
            .spawn_resource_node("gold", Point3::ground(5.0, 0.0), 500)
            .unwrap();
        let mut ai = StrategicAi::new(1, Personality::Economic, Difficulty::Normal);
        ai.evaluate(&mut w, 0.5);
        let unit = w.objects().unit(worker).unwrap();
        let queued = unit.command_queue.peek().or(unit.current_command.as_ref());
        assert!(queued.is_some_and(|c| c.target_resource == Some(node)));
    }

    #[test]
    fn test_history_ring_is_bounded() {
        let mut w = world();
        w.spawn_unit(1, "swordsman", Point3::ZERO).unwrap();
        let mut ai = StrategicAi::new(1, Personality::Balanced, Difficulty::Expert)
            .with_config(AiConfig {
                history_size: 3,
                ..AiConfig::default()
            });
        for i in 0..10 {
            ai.evaluate(&mut w, f64::from(i));
        }
        assert!(ai.recent_decisions().count() <= 3);
    }
}
