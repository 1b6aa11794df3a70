//! Behavior trees for autonomous units.
//!
//! Each unit may carry one [`BehaviorTree`]: a [`Node`] hierarchy plus a
//! [`Blackboard`]. The [`BehaviorManager`] ticks every tree once per world
//! tick, after the command pipeline, so any command a tree issues runs on
//! the following tick.

pub mod blackboard;
pub mod leaves;
pub mod manager;
pub mod node;
pub mod templates;

pub use blackboard::{Blackboard, BlackboardValue};
pub use leaves::{Action, Condition};
pub use manager::{BehaviorManager, BehaviorTree};
pub use node::{BehaviorContext, Node, ParallelPolicy, Status};
pub use templates::{TemplateLibrary, TreeBuilder};
