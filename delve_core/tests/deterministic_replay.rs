use delve_core::{
    Position,
    agent::AdventurerState,
    config::SimulationConfig,
    dungeon::Dungeon,
    pathfinding::RiskAffinity,
    simulation::{SimEvent, Simulation},
};

const LAYOUT: &str = "
    EN BL BL BL BL BL BL BL BL BL
    BL BL MN BL BL L6 BL BL BL BL
    BL BL BL BL TP BL BL MN BL BL
    BL L3 BL BL BL BL BL BL BL BL
    BL BL BL MN BL BL TP BL BL BL
    BL BL BL BL BL BL BL BL LX BL
    BL BL TP BL BL BL BL BL BL BL
    BL BL BL BL BL BL MN BL BL EX
";

#[derive(Debug, PartialEq)]
struct ReplayOutcome {
    events: Vec<(u64, SimEvent)>,
    finals: Vec<(Position, AdventurerState, i32)>,
    lures_left: usize,
}

fn replay(seed: u64, max_jitter: f64) -> ReplayOutcome {
    let dungeon = Dungeon::from_layout(LAYOUT, 2).unwrap();
    let config = SimulationConfig {
        seed: Some(seed),
        max_jitter,
        adventurer_health: 20,
        ..SimulationConfig::default()
    };
    let mut sim = Simulation::new(dungeon, config).unwrap();
    for risk in [0.0, 0.35, 0.6, 0.85, 1.0] {
        sim.spawn_adventurer(RiskAffinity::new(risk));
    }

    let mut events = Vec::new();
    for _ in 0..1_000 {
        let report = sim.process_tick();
        events.extend(report.events.into_iter().map(|event| (report.tick, event)));
        if sim.is_finished() {
            break;
        }
    }

    ReplayOutcome {
        events,
        finals: sim
            .adventurers()
            .map(|a| (a.position, a.state, a.health))
            .collect(),
        lures_left: sim.dungeon().lures().count(),
    }
}

#[test]
fn replay_with_same_seed_is_identical() {
    let first = replay(0xD0_6E0, 0.5);
    let second = replay(0xD0_6E0, 0.5);
    assert_eq!(first, second, "replay diverged between runs");
}

#[test]
fn every_adventurer_finishes_the_run() {
    let outcome = replay(7, 0.0);
    assert_eq!(outcome.finals.len(), 5);
    for (position, state, health) in &outcome.finals {
        assert_ne!(*state, AdventurerState::Exploring);
        if *state == AdventurerState::Escaped {
            assert_eq!(*position, Position::new(9, 7));
            assert!(*health > 0);
        }
    }
}

#[test]
fn moves_are_single_orthogonal_steps_on_decision_ticks() {
    let outcome = replay(3, 0.5);
    for (tick, event) in &outcome.events {
        if let SimEvent::Moved { from, to, .. } = event {
            assert_eq!(from.manhattan(*to), 1);
            assert_eq!(tick % SimulationConfig::DEFAULT_DECISION_CADENCE, 0);
        }
    }
}

#[test]
fn cautious_adventurers_never_collect_lures() {
    let outcome = replay(21, 0.0);
    for (_, event) in &outcome.events {
        if let SimEvent::LureCollected { adventurer, .. } = event {
            // ids 0 and 1 have risk affinities at or below the interest threshold
            assert!(*adventurer >= 2, "adventurer {adventurer} took a lure");
        }
    }
}
