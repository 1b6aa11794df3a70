//! Headless match runner for AI tuning and CI verification.
//!
//! Loads a [`Scenario`] (RON match settings plus optional map and tileset),
//! runs it at the configured tick rate with every AI seat driven by the
//! core's strategic AI, and produces a [`MatchSummary`].
//!
//! - **stdout**: JSON summary
//! - **stderr**: tracing logs

pub mod metrics;
pub mod runner;
pub mod scenario;

pub use metrics::{MatchSummary, MetricsCollector, PlayerSummary};
pub use runner::{verify_determinism, HeadlessRunner, VerifyReport};
pub use scenario::{Scenario, ScenarioError};
