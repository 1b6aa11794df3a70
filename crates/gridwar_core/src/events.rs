//! Game event stream.
//!
//! Systems publish [`GameEvent`]s into a shared, bounded [`EventQueue`].
//! Hosts drain it once per frame. When the queue is full new events are
//! dropped and counted, so a slow consumer can never stall the simulation.

use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use serde::{Deserialize, Serialize};

use crate::components::PlayerId;

/// Default number of events buffered before new ones are dropped.
pub const DEFAULT_EVENT_CAPACITY: usize = 1024;

/// Everything observable that happens in a match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EventType {
    /// Lifecycle: game entered Playing.
    GameStarted,
    /// Lifecycle: game entered Paused.
    GamePaused,
    /// Lifecycle: game resumed.
    GameResumed,
    /// Lifecycle: game ended.
    GameEnded,
    /// A unit was spawned.
    UnitCreated,
    /// A dead unit was removed from the world.
    UnitDestroyed,
    /// A building finished construction.
    BuildingCompleted,
    /// A building was removed.
    BuildingDestroyed,
    /// Resources were spent.
    ResourceSpent,
    /// Resources were granted.
    ResourceGained,
    /// A resource node ran out.
    ResourceDepleted,
    /// Research finished.
    TechResearched,
    /// Research began.
    ResearchStarted,
    /// Research was cancelled and refunded.
    ResearchCancelled,
    /// A unit was queued for production.
    ProductionStarted,
    /// Production was cancelled and refunded.
    ProductionCancelled,
    /// A player was eliminated.
    PlayerDefeated,
    /// A player won.
    PlayerVictorious,
    /// A player cannot create more units.
    PopulationLimit,
    /// A command could not be executed.
    CommandFailed,
    /// A unit group reached its destination.
    GroupArrived,
}

/// One published event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameEvent {
    /// What happened.
    pub event_type: EventType,
    /// World time in seconds.
    pub timestamp: f64,
    /// Owning player; `None` for system events.
    pub player_id: Option<PlayerId>,
    /// Free-form key/value details.
    pub data: BTreeMap<String, String>,
    /// Human readable summary.
    pub message: String,
}

impl GameEvent {
    /// Create an event with no details.
    #[must_use]
    pub fn new(event_type: EventType, timestamp: f64, player_id: Option<PlayerId>) -> Self {
        Self {
            event_type,
            timestamp,
            player_id,
            data: BTreeMap::new(),
            message: String::new(),
        }
    }

    /// Builder: attach a detail.
    #[must_use]
    pub fn with_data(mut self, key: &str, value: impl ToString) -> Self {
        self.data.insert(key.to_string(), value.to_string());
        self
    }

    /// Builder: set the message.
    #[must_use]
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    /// Player id as it appears on the wire (`-1` for system events).
    #[must_use]
    pub fn player_code(&self) -> i64 {
        self.player_id.map_or(-1, i64::from)
    }
}

#[derive(Debug)]
struct QueueInner {
    events: Mutex<VecDeque<GameEvent>>,
    capacity: usize,
    dropped: AtomicU64,
}

/// Shared, bounded, multi-producer event queue.
///
/// Cloning yields another handle to the same queue.
#[derive(Debug, Clone)]
pub struct EventQueue {
    inner: Arc<QueueInner>,
}

impl Default for EventQueue {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_CAPACITY)
    }
}

impl EventQueue {
    /// Create a queue holding at most `capacity` undrained events.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Arc::new(QueueInner {
                events: Mutex::new(VecDeque::with_capacity(capacity.min(4096))),
                capacity: capacity.max(1),
                dropped: AtomicU64::new(0),
            }),
        }
    }

    /// Publish an event. Returns `false` if it was dropped because the queue is full.
    pub fn publish(&self, event: GameEvent) -> bool {
        let mut events = self
            .inner
            .events
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if events.len() >= self.inner.capacity {
            let total = self.inner.dropped.fetch_add(1, Ordering::Relaxed) + 1;
            tracing::warn!(event = ?event.event_type, dropped = total, "event queue full, dropping");
            return false;
        }
        events.push_back(event);
        true
    }

    /// Remove and return every buffered event in publication order.
    #[must_use]
    pub fn drain(&self) -> Vec<GameEvent> {
        let mut events = self
            .inner
            .events
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        events.drain(..).collect()
    }

    /// Number of buffered events.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner
            .events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// No buffered events.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Events dropped since creation.
    #[must_use]
    pub fn dropped(&self) -> u64 {
        self.inner.dropped.load(Ordering::Relaxed)
    }

    /// Maximum buffered events.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.inner.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_drain_preserves_order() {
        let queue = EventQueue::new(8);
        queue.publish(GameEvent::new(EventType::UnitCreated, 0.0, Some(1)));
        queue.publish(GameEvent::new(EventType::UnitDestroyed, 0.5, Some(1)));
        let drained = queue.drain();
        assert_eq!(drained.len(), 2);
        assert_eq!(drained[0].event_type, EventType::UnitCreated);
        assert_eq!(drained[1].event_type, EventType::UnitDestroyed);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_full_queue_drops_and_counts() {
        let queue = EventQueue::new(2);
        assert!(queue.publish(GameEvent::new(EventType::GameStarted, 0.0, None)));
        assert!(queue.publish(GameEvent::new(EventType::GamePaused, 0.0, None)));
        assert!(!queue.publish(GameEvent::new(EventType::GameResumed, 0.0, None)));
        assert_eq!(queue.len(), 2);
        assert_eq!(queue.dropped(), 1);
    }

    #[test]
    fn test_clones_share_queue() {
        let a = EventQueue::new(4);
        let b = a.clone();
        b.publish(GameEvent::new(EventType::GroupArrived, 1.0, Some(2)));
        assert_eq!(a.len(), 1);
    }

    #[test]
    fn test_system_events_use_minus_one() {
        let event = GameEvent::new(EventType::GameEnded, 3.0, None).with_data("winner", 2);
        assert_eq!(event.player_code(), -1);
        assert_eq!(event.data.get("winner").map(String::as_str), Some("2"));
    }
}
