//! Match lifecycle, end conditions and the event stream.

use std::thread;

use gridwar_core::events::{EventQueue, EventType, GameEvent};
use gridwar_core::game::{EndReason, Game, GameAssets, GameState};
use gridwar_core::settings::{GameSettings, PlayerSettings};
use gridwar_test_utils::fixtures::{flat_map, skirmish_settings, started_game};

fn types(events: &[GameEvent]) -> Vec<EventType> {
    events.iter().map(|e| e.event_type).collect()
}

#[test]
fn test_transitions_publish_events() {
    let mut game = Game::new_game(skirmish_settings(), GameAssets::skirmish()).unwrap();
    let handle = game.handle();
    let _ = handle.drain_events();

    game.start().unwrap();
    game.pause().unwrap();
    game.resume().unwrap();
    game.stop().unwrap();
    assert_eq!(
        types(&handle.drain_events()),
        [
            EventType::GameStarted,
            EventType::GamePaused,
            EventType::GameResumed,
            EventType::GameEnded
        ]
    );
}

#[test]
fn test_invalid_transition_is_silent() {
    let mut game = started_game();
    let handle = game.handle();
    let _ = handle.drain_events();
    assert!(game.resume().is_err());
    assert!(game.start().is_err());
    assert!(handle.drain_events().is_empty());
    assert_eq!(game.state(), GameState::Playing);
}

#[test]
fn test_eliminating_a_player_ends_match() {
    let mut game = started_game();
    {
        let mut world = game.world_mut();
        let objects = world.objects_mut();
        for unit in objects.units_mut().filter(|u| u.player_id == 2) {
            unit.apply_damage(f32::MAX);
        }
        let buildings: Vec<_> = objects.buildings_of(2).map(|b| b.id).collect();
        for id in buildings {
            if let Some(building) = objects.building_mut(id) {
                building.apply_damage(f32::MAX);
            }
        }
    }
    let handle = game.handle();
    let _ = handle.drain_events();

    for _ in 0..5 {
        if game.state() == GameState::Ended {
            break;
        }
        game.update(0.1).unwrap();
    }
    assert_eq!(game.state(), GameState::Ended);
    let outcome = game.outcome().unwrap();
    assert_eq!(outcome.winner, Some(1));
    assert_eq!(outcome.reason, EndReason::Victory);
    assert!(handle.player_snapshot(2).unwrap().is_defeated);

    let events = handle.drain_events();
    let defeated: Vec<_> = events
        .iter()
        .filter(|e| e.event_type == EventType::PlayerDefeated)
        .collect();
    assert_eq!(defeated.len(), 1);
    assert_eq!(defeated[0].player_id, Some(2));
    assert!(events
        .iter()
        .any(|e| e.event_type == EventType::PlayerVictorious && e.player_id == Some(1)));
    assert_eq!(events.last().unwrap().event_type, EventType::GameEnded);
}

#[test]
fn test_map_start_positions_are_used() {
    let map = flat_map(48, 48);
    let starts: Vec<_> = (0..2).map(|i| map.start_position(i).unwrap()).collect();
    let game = Game::new_game(skirmish_settings(), GameAssets::skirmish().with_map(map)).unwrap();
    let world = game.world();
    for (slot, start) in starts.iter().enumerate() {
        let player = u32::try_from(slot + 1).unwrap();
        let hall = world.objects().buildings_of(player).next().unwrap();
        assert!(hall.position().distance(*start) < 1e-4);
    }
    assert_eq!(world.bounds(), Some((48.0, 48.0)));
}

#[test]
fn test_map_with_too_few_starts_rejected() {
    let settings = skirmish_settings().with_player(PlayerSettings::human("Green", "skirmish"));
    let result = Game::new_game(settings, GameAssets::skirmish().with_map(flat_map(32, 32)));
    assert!(result.is_err());
}

#[test]
fn test_ai_players_act_during_play() {
    let settings = GameSettings::default()
        .with_player(PlayerSettings::human("Red", "skirmish"))
        .with_player(PlayerSettings::ai(
            "Blue",
            "skirmish",
            gridwar_core::ai::Personality::Economic,
            gridwar_core::ai::Difficulty::Normal,
        ));
    let mut game = Game::new_game(settings, GameAssets::skirmish()).unwrap();
    game.start().unwrap();
    for _ in 0..120 {
        game.update(1.0 / 60.0).unwrap();
    }
    let world = game.world();
    let ai = world.ai(2).unwrap();
    assert!(ai.evaluations() >= 3);
    assert!(world.ai(1).is_none());
}

#[test]
fn test_handle_reads_from_another_thread() {
    let mut game = started_game();
    let handle = game.handle();
    let reader = thread::spawn(move || {
        let mut seen = 0;
        for _ in 0..50 {
            seen = seen.max(handle.stats().tick);
            let _ = handle.units_for_player(1);
        }
        seen
    });
    for _ in 0..50 {
        game.update(0.05).unwrap();
    }
    let seen = reader.join().unwrap();
    assert!(seen <= 50);
    assert_eq!(game.handle().stats().tick, 50);
}

#[test]
fn test_event_queue_drops_when_full() {
    let queue = EventQueue::new(2);
    for i in 0..5 {
        queue.publish(GameEvent::new(EventType::UnitCreated, f64::from(i), Some(1)));
    }
    assert_eq!(queue.len(), 2);
    assert_eq!(queue.dropped(), 3);
    let drained = queue.drain();
    assert_eq!(drained[0].timestamp, 0.0);
    assert!(queue.is_empty());
}
