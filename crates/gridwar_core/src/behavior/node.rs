//! Tree nodes and their tick semantics.
//!
//! Nodes are a tagged enum rather than trait objects so a tree is plain
//! data: cloneable, serialisable and walked without allocation.

use serde::{Deserialize, Serialize};

use super::blackboard::Blackboard;
use super::leaves::{Action, Condition};
use crate::components::EntityId;
use crate::objects::ObjectManager;

/// Result of ticking a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum Status {
    /// Finished successfully.
    Success,
    /// Finished unsuccessfully.
    Failure,
    /// Needs more ticks.
    Running,
    /// Could not run at all (the unit is gone) or has not run yet.
    #[default]
    Invalid,
}

impl Status {
    /// Success or Failure.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Success | Self::Failure)
    }
}

/// Success rule for [`Node::Parallel`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum ParallelPolicy {
    /// Succeeds as soon as any child succeeds; fails once all have failed.
    #[default]
    RequireOne,
    /// Succeeds once every child succeeds; fails as soon as any fails.
    RequireAll,
}

/// Everything a node may read or change during one tick.
#[derive(Debug)]
pub struct BehaviorContext<'a> {
    /// Unit the tree controls.
    pub unit: EntityId,
    /// World entities. Actions only enqueue commands; they never execute them.
    pub objects: &'a mut ObjectManager,
    /// The tree's memory.
    pub blackboard: &'a mut Blackboard,
    /// Seconds since the previous tick.
    pub delta_time: f64,
    /// Current world time.
    pub now: f64,
    /// World time the tree was assigned.
    pub start_time: f64,
}

/// A behavior tree node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Node {
    /// Runs children in order until one does not succeed.
    Sequence {
        /// Children.
        children: Vec<Node>,
        /// Child resumed on the next tick.
        current: usize,
    },
    /// Runs children in order until one does not fail.
    Selector {
        /// Children.
        children: Vec<Node>,
        /// Child resumed on the next tick.
        current: usize,
    },
    /// Ticks every child each tick.
    Parallel {
        /// Children.
        children: Vec<Node>,
        /// Success rule.
        policy: ParallelPolicy,
    },
    /// Swaps Success and Failure.
    Inverter(Box<Node>),
    /// Re-runs its child after each success.
    Repeater {
        /// Child.
        child: Box<Node>,
        /// Successes required; `-1` repeats forever.
        max_repeats: i32,
        /// Successes so far.
        count: i32,
    },
    /// Turns any finished result into Success.
    Succeeder(Box<Node>),
    /// Leaf test.
    Condition(Condition),
    /// Leaf action.
    Action(Action),
}

impl Node {
    /// Sequence over `children`.
    #[must_use]
    pub fn sequence(children: Vec<Node>) -> Self {
        Self::Sequence {
            children,
            current: 0,
        }
    }

    /// Selector over `children`.
    #[must_use]
    pub fn selector(children: Vec<Node>) -> Self {
        Self::Selector {
            children,
            current: 0,
        }
    }

    /// Parallel over `children`.
    #[must_use]
    pub fn parallel(policy: ParallelPolicy, children: Vec<Node>) -> Self {
        Self::Parallel { children, policy }
    }

    /// Invert `child`.
    #[must_use]
    pub fn inverter(child: Node) -> Self {
        Self::Inverter(Box::new(child))
    }

    /// Repeat `child` `max_repeats` times (`-1` for ever).
    #[must_use]
    pub fn repeater(max_repeats: i32, child: Node) -> Self {
        Self::Repeater {
            child: Box::new(child),
            max_repeats,
            count: 0,
        }
    }

    /// Force `child` to succeed.
    #[must_use]
    pub fn succeeder(child: Node) -> Self {
        Self::Succeeder(Box::new(child))
    }

    /// Run `child` every tick for as long as the tree lives.
    #[must_use]
    pub fn forever(child: Node) -> Self {
        Self::repeater(-1, Self::succeeder(child))
    }

    /// Leaf that always returns `status`.
    #[must_use]
    pub fn constant(status: Status) -> Self {
        Self::Action(Action::Constant(status))
    }

    /// Clear all running state below this node.
    pub fn reset(&mut self) {
        match self {
            Self::Sequence { children, current } | Self::Selector { children, current } => {
                *current = 0;
                children.iter_mut().for_each(Node::reset);
            }
            Self::Parallel { children, .. } => children.iter_mut().for_each(Node::reset),
            Self::Inverter(child) | Self::Succeeder(child) => child.reset(),
            Self::Repeater { child, count, .. } => {
                *count = 0;
                child.reset();
            }
            Self::Condition(_) => {}
            Self::Action(action) => action.reset(),
        }
    }

    /// Tick this node once.
    pub fn tick(&mut self, ctx: &mut BehaviorContext<'_>) -> Status {
        match self {
            Self::Sequence { children, current } => {
                while *current < children.len() {
                    match children[*current].tick(ctx) {
                        Status::Success => *current += 1,
                        Status::Running => return Status::Running,
                        Status::Failure | Status::Invalid => {
                            *current = 0;
                            return Status::Failure;
                        }
                    }
                }
                *current = 0;
                Status::Success
            }
            Self::Selector { children, current } => {
                while *current < children.len() {
                    match children[*current].tick(ctx) {
                        Status::Failure | Status::Invalid => *current += 1,
                        Status::Running => return Status::Running,
                        Status::Success => {
                            *current = 0;
                            return Status::Success;
                        }
                    }
                }
                *current = 0;
                Status::Failure
            }
            Self::Parallel { children, policy } => {
                let mut successes = 0;
                let mut failures = 0;
                for child in children.iter_mut() {
                    match child.tick(ctx) {
                        Status::Success => successes += 1,
                        Status::Failure | Status::Invalid => failures += 1,
                        Status::Running => {}
                    }
                }
                let total = children.len();
                let status = match policy {
                    ParallelPolicy::RequireOne if successes > 0 => Status::Success,
                    ParallelPolicy::RequireOne if failures == total => Status::Failure,
                    ParallelPolicy::RequireAll if failures > 0 => Status::Failure,
                    ParallelPolicy::RequireAll if successes == total => Status::Success,
                    _ => Status::Running,
                };
                if status.is_terminal() {
                    children.iter_mut().for_each(Node::reset);
                }
                status
            }
            Self::Inverter(child) => match child.tick(ctx) {
                Status::Success => Status::Failure,
                Status::Failure => Status::Success,
                other => other,
            },
            Self::Repeater {
                child,
                max_repeats,
                count,
            } => {
                if *max_repeats == 0 {
                    return Status::Success;
                }
                match child.tick(ctx) {
                    Status::Success => {
                        *count = count.saturating_add(1);
                        if *max_repeats > 0 && *count >= *max_repeats {
                            *count = 0;
                            Status::Success
                        } else {
                            Status::Running
                        }
                    }
                    Status::Failure | Status::Invalid => {
                        *count = 0;
                        Status::Failure
                    }
                    Status::Running => Status::Running,
                }
            }
            Self::Succeeder(child) => match child.tick(ctx) {
                Status::Running => Status::Running,
                _ => Status::Success,
            },
            Self::Condition(condition) => condition.evaluate(ctx),
            Self::Action(action) => action.execute(ctx),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::Point3;

    fn run(node: &mut Node) -> Status {
        let mut objects = ObjectManager::new();
        let unit = objects.create_unit(1, "soldier", Point3::ZERO, None, 0.0);
        let mut blackboard = Blackboard::new();
        let mut ctx = BehaviorContext {
            unit,
            objects: &mut objects,
            blackboard: &mut blackboard,
            delta_time: 0.1,
            now: 0.0,
            start_time: 0.0,
        };
        node.tick(&mut ctx)
    }

    const S: Status = Status::Success;
    const F: Status = Status::Failure;
    const R: Status = Status::Running;

    #[test]
    fn test_sequence_of_successes() {
        let mut node = Node::sequence(vec![Node::constant(S), Node::constant(S)]);
        assert_eq!(run(&mut node), S);
    }

    #[test]
    fn test_sequence_resumes_running_child() {
        let mut node = Node::sequence(vec![Node::constant(S), Node::constant(R)]);
        assert_eq!(run(&mut node), R);
        assert!(matches!(node, Node::Sequence { current: 1, .. }));
    }

    #[test]
    fn test_selector_finds_success() {
        let mut node = Node::selector(vec![Node::constant(F), Node::constant(F), Node::constant(S)]);
        assert_eq!(run(&mut node), S);
        let mut node = Node::selector(vec![Node::constant(F)]);
        assert_eq!(run(&mut node), F);
    }

    #[test]
    fn test_inverter() {
        assert_eq!(run(&mut Node::inverter(Node::constant(S))), F);
        assert_eq!(run(&mut Node::inverter(Node::constant(F))), S);
        assert_eq!(run(&mut Node::inverter(Node::constant(R))), R);
    }

    #[test]
    fn test_repeater_counts_successes() {
        let mut node = Node::repeater(3, Node::constant(S));
        assert_eq!(run(&mut node), R);
        assert_eq!(run(&mut node), R);
        assert_eq!(run(&mut node), S);
        // Resets for the next cycle.
        assert_eq!(run(&mut node), R);
    }

    #[test]
    fn test_repeater_failure_bubbles() {
        let mut node = Node::repeater(-1, Node::constant(F));
        assert_eq!(run(&mut node), F);
    }

    #[test]
    fn test_succeeder() {
        assert_eq!(run(&mut Node::succeeder(Node::constant(F))), S);
        assert_eq!(run(&mut Node::succeeder(Node::constant(R))), R);
    }

    #[test]
    fn test_parallel_policies() {
        let children = || vec![Node::constant(S), Node::constant(F), Node::constant(R)];
        assert_eq!(run(&mut Node::parallel(ParallelPolicy::RequireOne, children())), S);
        assert_eq!(run(&mut Node::parallel(ParallelPolicy::RequireAll, children())), F);
        let running = vec![Node::constant(S), Node::constant(R)];
        assert_eq!(run(&mut Node::parallel(ParallelPolicy::RequireAll, running)), R);
        let failing = vec![Node::constant(F), Node::constant(F)];
        assert_eq!(run(&mut Node::parallel(ParallelPolicy::RequireOne, failing)), F);
    }

    #[test]
    fn test_forever_never_finishes() {
        let mut node = Node::forever(Node::constant(F));
        for _ in 0..5 {
            assert_eq!(run(&mut node), R);
        }
    }
}
