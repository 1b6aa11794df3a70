//! End-to-end scenarios across combat, formations, behavior trees, status
//! effects, the economy, production and the strategic AI.

use gridwar_core::ai::{DecisionType, Difficulty, Personality, StrategicAi};
use gridwar_core::behavior::{BehaviorContext, Blackboard, Node, Status};
use gridwar_core::combat::{attack_modifiers, resolve_attack, DamageRegistry};
use gridwar_core::commands::CommandType;
use gridwar_core::components::Unit;
use gridwar_core::data::Catalog;
use gridwar_core::economy::resource_map;
use gridwar_core::error::GameError;
use gridwar_core::formations::{Formation, FormationParams, GroupManager};
use gridwar_core::math::Point3;
use gridwar_core::objects::ObjectManager;
use gridwar_core::status::StatusEffectManager;
use gridwar_test_utils::fixtures::{spawn_row, two_player_world};

fn params() -> FormationParams {
    FormationParams {
        spacing: 2.0,
        break_distance: 8.0,
        reform_distance: 3.0,
        arrival_distance: 2.0,
    }
}

#[test]
fn test_catapult_splash_hits_neighbours_with_falloff() {
    let catalog = Catalog::skirmish();
    let mut objects = ObjectManager::new();
    let groups = GroupManager::new(params());
    let status = StatusEffectManager::with_defaults();
    let registry = DamageRegistry::default();

    let catapult = objects.create_unit(1, "catapult", Point3::ZERO, catalog.unit("catapult"), 0.0);
    let worker = catalog.unit("worker");
    let primary = objects.create_unit(2, "worker", Point3::ground(10.0, 10.0), worker, 0.0);
    let near = objects.create_unit(2, "worker", Point3::ground(12.0, 10.0), worker, 0.0);
    let far = objects.create_unit(2, "worker", Point3::ground(11.0, 12.0), worker, 0.0);

    let report =
        resolve_attack(&mut objects, &groups, &status, &registry, catapult, primary, 0.0).unwrap();
    assert_eq!(report.primary.target, primary);
    assert_eq!(report.splash.len(), 2);
    for hit in &report.splash {
        assert!(hit.damage > 0.0);
        assert!(report.primary.damage > hit.damage);
    }
    let near_hit = report.splash.iter().find(|h| h.target == near).unwrap();
    let far_hit = report.splash.iter().find(|h| h.target == far).unwrap();
    assert!(near_hit.damage > far_hit.damage);

    let sum: f32 = report.primary.damage + report.splash.iter().map(|h| h.damage).sum::<f32>();
    assert!((report.total_damage() - sum).abs() < 1e-4);
}

#[test]
fn test_formation_changes_attack_bonus() {
    let mut objects = ObjectManager::new();
    let mut groups = GroupManager::new(params());
    let status = StatusEffectManager::with_defaults();
    let registry = DamageRegistry::default();

    // Attacker stands in front of the target, so no flanking bonus.
    let attacker = objects.insert_unit(|id| Unit::new(id, 1, "soldier", Point3::ground(0.0, 1.0)));
    let target = objects.insert_unit(|id| Unit::new(id, 2, "soldier", Point3::ZERO).with_health(500.0));
    let group = groups
        .create_group(&objects, 1, &[attacker], Formation::Line)
        .unwrap();

    let line = attack_modifiers(&objects, &groups, objects.unit(attacker).unwrap(), target);
    assert!((line.formation_attack - 1.1).abs() < 1e-6);
    assert!(!line.flanking);
    let base = objects.unit(attacker).unwrap().attack_damage;
    let report =
        resolve_attack(&mut objects, &groups, &status, &registry, attacker, target, 0.0).unwrap();
    assert!((report.primary.damage - base * 1.1).abs() < 1e-4);

    groups.set_formation(1, group, Formation::Wedge).unwrap();
    let wedge = attack_modifiers(&objects, &groups, objects.unit(attacker).unwrap(), target);
    assert!((wedge.formation_attack - 1.2).abs() < 1e-6);
    let report =
        resolve_attack(&mut objects, &groups, &status, &registry, attacker, target, 1.0).unwrap();
    assert!((report.primary.damage - base * 1.2).abs() < 1e-4);
}

#[test]
fn test_group_move_assigns_line_slots() {
    let mut world = two_player_world();
    let workers: Vec<_> = (0..3)
        .map(|i| {
            world
                .spawn_unit(1, "worker", Point3::ground(i as f32, 0.0))
                .unwrap()
        })
        .collect();
    let group = world.create_group(1, &workers, Formation::Line).unwrap();
    let target = Point3::ground(20.0, 20.0);
    world.move_group(1, group, target).unwrap();
    world.update(0.1).unwrap();

    assert!(world.groups().group(group).unwrap().is_moving);
    let spacing = world.config().unit_spacing;
    let slots: Vec<Point3> = workers
        .iter()
        .map(|&id| {
            let command = world
                .objects()
                .unit(id)
                .unwrap()
                .current_command
                .clone()
                .unwrap();
            assert_eq!(command.command_type, CommandType::Move);
            command.target.unwrap()
        })
        .collect();
    for slot in &slots {
        assert!(slot.distance(target) <= spacing + 1e-3);
    }

    // The slots lie on one line, perpendicular to the direction of travel.
    let centre = Point3::ground(1.0, 0.0);
    let heading = (target - centre).flatten().normalize();
    for slot in &slots {
        let offset = (*slot - target).flatten();
        assert!(offset.dot(heading).abs() < 1e-3);
    }
}

fn tick(node: &mut Node) -> Status {
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

#[test]
fn test_behavior_composites() {
    let mut sequence = Node::sequence(vec![
        Node::constant(Status::Success),
        Node::constant(Status::Success),
    ]);
    assert_eq!(tick(&mut sequence), Status::Success);

    let mut selector = Node::selector(vec![
        Node::constant(Status::Failure),
        Node::constant(Status::Failure),
        Node::constant(Status::Success),
    ]);
    assert_eq!(tick(&mut selector), Status::Success);

    let mut inverter = Node::inverter(Node::constant(Status::Success));
    assert_eq!(tick(&mut inverter), Status::Failure);

    let mut repeater = Node::repeater(3, Node::constant(Status::Success));
    assert_eq!(tick(&mut repeater), Status::Running);
    assert_eq!(tick(&mut repeater), Status::Running);
    assert_eq!(tick(&mut repeater), Status::Success);
}

#[test]
fn test_poison_three_stacks_deal_75() {
    let manager = StatusEffectManager::with_defaults();
    let mut objects = ObjectManager::new();
    let id = objects.insert_unit(|id| Unit::new(id, 1, "soldier", Point3::ZERO).with_health(100.0));
    for _ in 0..3 {
        manager
            .apply(objects.unit_mut(id).unwrap(), "poison", None, 0.0)
            .unwrap();
    }
    let mut now = 0.0;
    while now < 10.0 - 1e-9 {
        now += 0.25;
        manager.update(&mut objects, now);
    }
    let unit = objects.unit(id).unwrap();
    assert!((unit.max_health() - unit.health() - 75.0).abs() < 1e-3);
    assert!(manager.effects(id).is_empty());
}

#[test]
fn test_failed_deduction_changes_nothing() {
    let mut world = two_player_world();
    {
        let player = world.economy_mut().player_mut(1).unwrap();
        player.resources = resource_map(&[("gold", 1000), ("wood", 500)]);
    }
    let before = world.economy().player(1).unwrap().clone();
    let err = world
        .economy_mut()
        .deduct(1, &resource_map(&[("gold", 150), ("wood", 600)]), "test", 0.0)
        .unwrap_err();
    assert!(matches!(err, GameError::InsufficientResources { .. }));
    let after = world.economy().player(1).unwrap();
    assert_eq!(after.resources, before.resources);
    assert_eq!(after.resources_spent, before.resources_spent);
}

#[test]
fn test_barracks_produces_queue_in_order() {
    let mut world = two_player_world();
    let barracks = world
        .spawn_building(1, "barracks", Point3::ground(10.0, 10.0), true)
        .unwrap();
    for unit_type in ["swordsman", "archer", "swordsman"] {
        world.queue_production(1, barracks, unit_type).unwrap();
    }

    let mut spawned = Vec::new();
    for _ in 0..1200 {
        spawned.extend(world.update(0.1).unwrap().spawned);
        if spawned.len() == 3 {
            break;
        }
    }
    assert_eq!(spawned.len(), 3);
    let types: Vec<_> = spawned
        .iter()
        .map(|&id| world.objects().unit(id).unwrap().unit_type.clone())
        .collect();
    assert_eq!(types, ["swordsman", "archer", "swordsman"]);
    for &id in &spawned {
        let unit = world.objects().unit(id).unwrap();
        assert_eq!(unit.player_id, 1);
        assert!(unit.position().distance(Point3::ground(12.0, 12.0)) < 0.5);
    }
}

#[test]
fn test_aggressive_ai_considers_attack_once_enemy_seen() {
    let mut world = two_player_world();
    world
        .spawn_building(1, "town_hall", Point3::ZERO, true)
        .unwrap();
    spawn_row(&mut world, 1, "swordsman", 3, Point3::ground(2.0, 0.0));
    world
        .spawn_unit(2, "swordsman", Point3::ground(14.0, 0.0))
        .unwrap();

    let mut ai = StrategicAi::new(1, Personality::Aggressive, Difficulty::Normal);
    ai.evaluate(&mut world, 0.0);
    assert!(ai.state().enemy_position.is_some());
    assert!(ai
        .last_candidates()
        .iter()
        .any(|d| d.decision_type == DecisionType::Attack));
}
