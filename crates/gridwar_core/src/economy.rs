//! Player economy: stockpiles, spending, passive income and population.
//!
//! Each player's stockpile is a [`ResourceMap`] of named integer resources.
//! Every mutation goes through [`Economy`], which validates the whole request
//! before touching anything, so a failed purchase never leaves a partial
//! deduction behind.
//!
//! Passive income is fractional (`rate * dt`), so it is accumulated in
//! [`Fixed`] per player and resource and only whole units are granted.

use std::collections::BTreeMap;

use crate::components::{Building, Player, PlayerId, Unit};
use crate::data::Catalog;
use crate::error::{GameError, Result};
use crate::events::{EventQueue, EventType, GameEvent};
use crate::math::{to_fixed, Fixed};

/// Named resource amounts.
pub type ResourceMap = BTreeMap<String, i64>;

/// Income bonus per building upgrade level.
pub const UPGRADE_GENERATION_BONUS: f32 = 0.25;

/// Build a [`ResourceMap`] from `(name, amount)` pairs.
#[must_use]
pub fn resource_map(pairs: &[(&str, i64)]) -> ResourceMap {
    pairs
        .iter()
        .map(|(name, amount)| ((*name).to_string(), *amount))
        .collect()
}

/// Per-resource amount by which `have` falls short of `need`. Empty if affordable.
#[must_use]
pub fn shortfall(have: &ResourceMap, need: &ResourceMap) -> ResourceMap {
    need.iter()
        .filter_map(|(name, &amount)| {
            let held = have.get(name).copied().unwrap_or(0);
            (amount > held).then(|| (name.clone(), amount - held))
        })
        .collect()
}

fn format_amounts(resources: &ResourceMap) -> String {
    resources
        .iter()
        .map(|(name, amount)| format!("{name}={amount}"))
        .collect::<Vec<_>>()
        .join(",")
}

fn reject_negative(amounts: &ResourceMap, what: &str) -> Result<()> {
    match amounts.iter().find(|(_, &amount)| amount < 0) {
        Some((name, amount)) => Err(GameError::Validation(format!(
            "{what} has negative {name}: {amount}"
        ))),
        None => Ok(()),
    }
}

/// Population in use versus cap.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PopulationStatus {
    /// Slots used by living units.
    pub current: u32,
    /// Slots available.
    pub max: u32,
}

impl PopulationStatus {
    /// Fail with `PopulationLimit` if `required` more slots don't fit.
    pub fn check(self, required: u32) -> Result<()> {
        if self.current.saturating_add(required) > self.max {
            Err(GameError::PopulationLimit {
                current: self.current,
                max: self.max,
                required,
            })
        } else {
            Ok(())
        }
    }

    /// Fraction of the cap in use.
    #[must_use]
    pub fn pressure(self) -> f32 {
        if self.max == 0 {
            1.0
        } else {
            (self.current as f32 / self.max as f32).min(1.0)
        }
    }
}

/// All players' stockpiles plus income and population rules.
#[derive(Debug, Clone)]
pub struct Economy {
    players: BTreeMap<PlayerId, Player>,
    generation_progress: BTreeMap<(PlayerId, String), Fixed>,
    resource_multiplier: f32,
    base_population: u32,
    population_floor: u32,
    events: EventQueue,
}

impl Economy {
    /// Create an economy publishing into `events`.
    #[must_use]
    pub fn new(
        events: EventQueue,
        resource_multiplier: f32,
        base_population: u32,
        population_floor: u32,
    ) -> Self {
        Self {
            players: BTreeMap::new(),
            generation_progress: BTreeMap::new(),
            resource_multiplier,
            base_population,
            population_floor,
            events,
        }
    }

    /// Register a player.
    pub fn add_player(&mut self, player: Player) {
        self.players.insert(player.id, player);
    }

    /// Look up a player.
    #[must_use]
    pub fn player(&self, id: PlayerId) -> Option<&Player> {
        self.players.get(&id)
    }

    /// Look up a player mutably.
    pub fn player_mut(&mut self, id: PlayerId) -> Option<&mut Player> {
        self.players.get_mut(&id)
    }

    /// Look up a player, failing with `PlayerNotFound`.
    pub fn require_player(&self, id: PlayerId) -> Result<&Player> {
        self.player(id).ok_or(GameError::PlayerNotFound(id))
    }

    /// All players in id order.
    pub fn players(&self) -> impl Iterator<Item = &Player> {
        self.players.values()
    }

    /// Income multiplier applied to passive generation.
    #[must_use]
    pub fn resource_multiplier(&self) -> f32 {
        self.resource_multiplier
    }

    /// What `player` is missing to pay `required`. Empty means affordable.
    pub fn validate(&self, player: PlayerId, required: &ResourceMap) -> Result<ResourceMap> {
        reject_negative(required, "cost")?;
        let player = self.require_player(player)?;
        Ok(shortfall(&player.resources, required))
    }

    /// Whether `player` can pay `required` right now.
    #[must_use]
    pub fn can_afford(&self, player: PlayerId, required: &ResourceMap) -> bool {
        self.validate(player, required)
            .is_ok_and(|missing| missing.is_empty())
    }

    /// Atomically remove `cost` from a stockpile.
    ///
    /// Either every resource is deducted or nothing changes.
    pub fn deduct(
        &mut self,
        player_id: PlayerId,
        cost: &ResourceMap,
        purpose: &str,
        now: f64,
    ) -> Result<()> {
        let missing = self.validate(player_id, cost)?;
        if !missing.is_empty() {
            return Err(GameError::InsufficientResources {
                purpose: purpose.to_string(),
                missing,
            });
        }
        let player = self
            .players
            .get_mut(&player_id)
            .ok_or(GameError::PlayerNotFound(player_id))?;
        for (name, &amount) in cost {
            if amount == 0 {
                continue;
            }
            *player.resources.entry(name.clone()).or_insert(0) -= amount;
            *player.resources_spent.entry(name.clone()).or_insert(0) += amount;
        }
        tracing::debug!(player = player_id, purpose, cost = %format_amounts(cost), "resources spent");
        self.events.publish(
            GameEvent::new(EventType::ResourceSpent, now, Some(player_id))
                .with_data("purpose", purpose)
                .with_data("amounts", format_amounts(cost)),
        );
        Ok(())
    }

    /// Atomically add `amounts` to a stockpile and lifetime income.
    pub fn grant(
        &mut self,
        player_id: PlayerId,
        amounts: &ResourceMap,
        source: &str,
        now: f64,
    ) -> Result<()> {
        self.credit(player_id, amounts, source, now, true)
    }

    /// Credit a worker's cargo. Empty cargo is a no-op.
    pub fn gather_deposit(
        &mut self,
        player_id: PlayerId,
        carried: &ResourceMap,
        now: f64,
    ) -> Result<()> {
        if carried.values().all(|&amount| amount == 0) {
            return Ok(());
        }
        self.grant(player_id, carried, "gather", now)
    }

    /// Return previously spent resources to the stockpile. Lifetime spending
    /// and income are left as they were.
    pub fn refund(
        &mut self,
        player_id: PlayerId,
        amounts: &ResourceMap,
        reason: &str,
        now: f64,
    ) -> Result<()> {
        self.credit(player_id, amounts, reason, now, false)
    }

    fn credit(
        &mut self,
        player_id: PlayerId,
        amounts: &ResourceMap,
        source: &str,
        now: f64,
        is_income: bool,
    ) -> Result<()> {
        reject_negative(amounts, "grant")?;
        let player = self
            .players
            .get_mut(&player_id)
            .ok_or(GameError::PlayerNotFound(player_id))?;
        for (name, &amount) in amounts {
            if amount == 0 {
                continue;
            }
            let held = player.resources.entry(name.clone()).or_insert(0);
            *held = held.saturating_add(amount);
            if is_income {
                let gathered = player.resources_gathered.entry(name.clone()).or_insert(0);
                *gathered = gathered.saturating_add(amount);
            }
        }
        self.events.publish(
            GameEvent::new(EventType::ResourceGained, now, Some(player_id))
                .with_data("source", source)
                .with_data("amounts", format_amounts(amounts)),
        );
        Ok(())
    }

    /// Per-second income of a building, after upgrade and match multipliers.
    #[must_use]
    pub fn building_rate(&self, building: &Building, catalog: &Catalog) -> Option<(String, f32)> {
        if !building.is_built() || building.is_destroyed() {
            return None;
        }
        let generation = catalog.building(&building.building_type)?.generates.as_ref()?;
        let upgrade = 1.0 + UPGRADE_GENERATION_BONUS * building.upgrade_level as f32;
        Some((
            generation.resource.clone(),
            generation.rate * upgrade * self.resource_multiplier,
        ))
    }

    /// Total per-second passive income of `player` by resource.
    pub fn generation_rates<'a>(
        &self,
        player: PlayerId,
        buildings: impl IntoIterator<Item = &'a Building>,
        catalog: &Catalog,
    ) -> BTreeMap<String, f32> {
        let mut rates = BTreeMap::new();
        for building in buildings.into_iter().filter(|b| b.player_id == player) {
            if let Some((resource, rate)) = self.building_rate(building, catalog) {
                *rates.entry(resource).or_insert(0.0) += rate;
            }
        }
        rates
    }

    /// Accumulate one step of passive income and grant the whole units.
    pub fn process_generation<'a>(
        &mut self,
        buildings: impl IntoIterator<Item = &'a Building>,
        catalog: &Catalog,
        dt: f32,
        now: f64,
    ) {
        let mut payouts: BTreeMap<PlayerId, ResourceMap> = BTreeMap::new();
        for building in buildings {
            let Some((resource, rate)) = self.building_rate(building, catalog) else {
                continue;
            };
            if self
                .players
                .get(&building.player_id)
                .map_or(true, |p| p.is_defeated)
            {
                continue;
            }
            let progress = self
                .generation_progress
                .entry((building.player_id, resource.clone()))
                .or_insert(Fixed::ZERO);
            *progress = progress.saturating_add(to_fixed(f64::from(rate) * f64::from(dt)));
            let whole = progress.floor();
            if whole > Fixed::ZERO {
                *progress -= whole;
                *payouts
                    .entry(building.player_id)
                    .or_default()
                    .entry(resource)
                    .or_insert(0) += whole.to_num::<i64>();
            }
        }
        for (player, amounts) in payouts {
            if let Err(err) = self.grant(player, &amounts, "generation", now) {
                tracing::warn!(player, %err, "generation payout rejected");
            }
        }
    }

    /// Population used and available for `player`.
    pub fn population<'a>(
        &self,
        player: PlayerId,
        units: impl IntoIterator<Item = &'a Unit>,
        buildings: impl IntoIterator<Item = &'a Building>,
    ) -> PopulationStatus {
        let current = units
            .into_iter()
            .filter(|u| u.player_id == player && u.is_alive())
            .map(|u| u.population_cost)
            .sum();
        let housing: u32 = buildings
            .into_iter()
            .filter(|b| b.player_id == player && b.is_built() && !b.is_destroyed())
            .map(|b| b.housing)
            .sum();
        PopulationStatus {
            current,
            max: self
                .base_population
                .saturating_add(housing)
                .max(self.population_floor),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::Point3;

    fn economy_with_player(gold: i64, wood: i64) -> (Economy, EventQueue) {
        let events = EventQueue::new(64);
        let mut economy = Economy::new(events.clone(), 1.0, 10, 5);
        let mut player = Player::new(1, "Red", "skirmish", false);
        player.resources = resource_map(&[("gold", gold), ("wood", wood)]);
        economy.add_player(player);
        (economy, events)
    }

    #[test]
    fn test_deduct_is_all_or_nothing() {
        let (mut economy, events) = economy_with_player(100, 10);
        let cost = resource_map(&[("gold", 50), ("wood", 20)]);
        let err = economy.deduct(1, &cost, "barracks", 0.0).unwrap_err();
        match err {
            GameError::InsufficientResources { missing, purpose } => {
                assert_eq!(purpose, "barracks");
                assert_eq!(missing, resource_map(&[("wood", 10)]));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        let player = economy.player(1).unwrap();
        assert_eq!(player.resource("gold"), 100);
        assert_eq!(player.resource("wood"), 10);
        assert!(events.is_empty());
    }

    #[test]
    fn test_deduct_updates_spent_and_publishes() {
        let (mut economy, events) = economy_with_player(100, 50);
        economy
            .deduct(1, &resource_map(&[("gold", 60)]), "archer", 1.0)
            .unwrap();
        let player = economy.player(1).unwrap();
        assert_eq!(player.resource("gold"), 40);
        assert_eq!(player.resources_spent.get("gold"), Some(&60));
        let drained = events.drain();
        assert_eq!(drained[0].event_type, EventType::ResourceSpent);
    }

    #[test]
    fn test_negative_amounts_rejected() {
        let (mut economy, _) = economy_with_player(0, 0);
        let bad = resource_map(&[("gold", -5)]);
        assert!(matches!(
            economy.grant(1, &bad, "cheat", 0.0),
            Err(GameError::Validation(_))
        ));
        assert!(matches!(
            economy.deduct(1, &bad, "cheat", 0.0),
            Err(GameError::Validation(_))
        ));
    }

    #[test]
    fn test_refund_keeps_lifetime_spending() {
        let (mut economy, _) = economy_with_player(100, 0);
        let cost = resource_map(&[("gold", 40)]);
        economy.deduct(1, &cost, "scout", 0.0).unwrap();
        economy.refund(1, &cost, "cancelled", 0.5).unwrap();
        let player = economy.player(1).unwrap();
        assert_eq!(player.resource("gold"), 100);
        assert_eq!(player.resources_spent.get("gold"), Some(&40));
        assert!(player.resources_gathered.is_empty());
    }

    #[test]
    fn test_generation_accumulates_fractions() {
        let (mut economy, _) = economy_with_player(0, 0);
        let catalog = Catalog::skirmish();
        let mut farm = Building::new(10, 1, "farm", Point3::ZERO);
        farm.complete(0.0);
        // 0.5 food/s for 4s at 60 steps per second
        for step in 0..240 {
            economy.process_generation([&farm], &catalog, 1.0 / 60.0, f64::from(step) / 60.0);
        }
        let food = economy.player(1).unwrap().resource("food");
        assert!((1..=2).contains(&food), "food = {food}");
    }

    #[test]
    fn test_unbuilt_buildings_generate_nothing() {
        let (economy, _) = economy_with_player(0, 0);
        let catalog = Catalog::skirmish();
        let farm = Building::new(10, 1, "farm", Point3::ZERO);
        assert!(economy.generation_rates(1, [&farm], &catalog).is_empty());
    }

    #[test]
    fn test_upgrade_scales_generation() {
        let (economy, _) = economy_with_player(0, 0);
        let catalog = Catalog::skirmish();
        let mut mill = Building::new(10, 1, "lumber_mill", Point3::ZERO);
        mill.complete(0.0);
        mill.upgrade_level = 2;
        let rates = economy.generation_rates(1, [&mill], &catalog);
        assert!((rates["wood"] - 0.75).abs() < 1e-6);
    }

    #[test]
    fn test_population_counts_housing_and_floor() {
        let events = EventQueue::new(8);
        let economy = Economy::new(events, 1.0, 0, 5);
        let units = vec![
            Unit::new(1, 1, "worker", Point3::ZERO),
            Unit::new(2, 1, "worker", Point3::ZERO),
            Unit::new(3, 2, "worker", Point3::ZERO),
        ];
        let mut house = Building::new(4, 1, "house", Point3::ZERO);
        house.housing = 8;
        let before = economy.population(1, &units, std::iter::empty());
        assert_eq!(before, PopulationStatus { current: 2, max: 5 });
        house.complete(0.0);
        let after = economy.population(1, &units, [&house]);
        assert_eq!(after.max, 8);
        assert!(after.check(6).is_ok());
        assert!(matches!(
            after.check(7),
            Err(GameError::PopulationLimit { current: 2, max: 8, required: 7 })
        ));
    }
}
