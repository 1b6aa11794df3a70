//! Headless match runner.

use std::path::Path;

use gridwar_core::game::{Game, GameState};

use crate::metrics::{MatchSummary, MetricsCollector};
use crate::scenario::{Scenario, ScenarioError};

/// Drives one match at the scenario's fixed tick rate.
#[derive(Debug)]
pub struct HeadlessRunner {
    scenario: Scenario,
    game: Game,
    metrics: MetricsCollector,
}

impl HeadlessRunner {
    /// Build the match described by `scenario`.
    pub fn new(scenario: Scenario, map_override: Option<&Path>) -> Result<Self, ScenarioError> {
        let assets = scenario.assets(map_override)?;
        let game = Game::new_game(scenario.settings.clone(), assets)?;
        Ok(Self {
            scenario,
            game,
            metrics: MetricsCollector::new(),
        })
    }

    /// The match.
    #[must_use]
    pub fn game(&self) -> &Game {
        &self.game
    }

    /// Run up to `ticks` ticks, stopping early if the match ends.
    pub fn run(&mut self, ticks: u64) -> Result<MatchSummary, ScenarioError> {
        if self.game.state() == GameState::Loading {
            self.game.start()?;
        }
        let step = self.scenario.settings.tick_length();
        let handle = self.game.handle();
        tracing::info!(scenario = %self.scenario.name, ticks, step, "match running");

        for tick in 0..ticks {
            if self.game.state() == GameState::Ended {
                tracing::info!(tick, "match ended early");
                break;
            }
            self.game.update(step)?;
            self.metrics.record(&handle.drain_events());
        }
        self.metrics.record(&handle.drain_events());

        let summary = self.metrics.summarize(&self.scenario.name, &self.game);
        tracing::info!(
            ticks = summary.ticks,
            winner = ?summary.winner,
            hash = summary.state_hash,
            "match finished"
        );
        Ok(summary)
    }
}

/// Outcome of running the same scenario twice.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct VerifyReport {
    /// Final hash of each run.
    pub hashes: Vec<u64>,
    /// Every run matched.
    pub deterministic: bool,
}

/// Run `scenario` `runs` times for `ticks` ticks and compare final hashes.
pub fn verify_determinism(
    scenario: &Scenario,
    map_override: Option<&Path>,
    ticks: u64,
    runs: usize,
) -> Result<VerifyReport, ScenarioError> {
    let mut hashes = Vec::with_capacity(runs);
    for run in 0..runs {
        let mut runner = HeadlessRunner::new(scenario.clone(), map_override)?;
        let summary = runner.run(ticks)?;
        tracing::debug!(run, hash = summary.state_hash, "verification run finished");
        hashes.push(summary.state_hash);
    }
    let deterministic = hashes.windows(2).all(|w| w[0] == w[1]);
    if !deterministic {
        tracing::warn!(?hashes, "runs diverged");
    }
    Ok(VerifyReport {
        hashes,
        deterministic,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use gridwar_test_utils::fixtures::flat_map;

    #[test]
    fn test_run_produces_summary() {
        let mut runner = HeadlessRunner::new(Scenario::skirmish_1v1(), None).unwrap();
        let summary = runner.run(120).unwrap();
        assert_eq!(summary.ticks, 120);
        assert!((summary.elapsed_secs - 2.0).abs() < 1e-6);
        assert_eq!(summary.events_by_type.get("GameStarted"), Some(&1));
        assert!(summary.events_by_type.get("UnitCreated").copied().unwrap_or(0) >= 8);
    }

    #[test]
    fn test_verify_is_deterministic() {
        let report = verify_determinism(&Scenario::skirmish_1v1(), None, 300, 2).unwrap();
        assert!(report.deterministic, "{:?}", report.hashes);
    }

    #[test]
    fn test_map_override() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("arena.map");
        std::fs::write(&path, flat_map(40, 40).to_bytes()).unwrap();
        let runner = HeadlessRunner::new(Scenario::skirmish_1v1(), Some(&path)).unwrap();
        assert_eq!(runner.game().world().bounds(), Some((40.0, 40.0)));
    }
}
