use rand::{Rng, SeedableRng, rngs::StdRng};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{
    EntityId, Position,
    dungeon::Dungeon,
    pathfinding::{RiskAffinity, find_nearest_lure},
};

/// Where an adventurer is in its run through the dungeon.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AdventurerState {
    Exploring,
    Escaped,
    Slain,
}

/// An agent walking from the entrance toward the exit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Adventurer {
    pub id: EntityId,
    pub position: Position,
    pub risk_affinity: RiskAffinity,
    /// Lure the adventurer has committed to collecting before heading out.
    pub lure_target: Option<Position>,
    pub health: i32,
    pub state: AdventurerState,
}

impl Adventurer {
    pub fn new(id: EntityId, position: Position, risk_affinity: RiskAffinity, health: i32) -> Self {
        Self {
            id,
            position,
            risk_affinity,
            lure_target: None,
            health,
            state: AdventurerState::Exploring,
        }
    }

    #[inline]
    pub fn is_exploring(&self) -> bool {
        self.state == AdventurerState::Exploring
    }
}

/// Decides, once per decision tick, whether an adventurer heads for the exit
/// or detours toward a lure.
#[derive(Debug)]
pub struct MovementPolicy {
    rng: StdRng,
    lure_interest_threshold: f64,
}

impl MovementPolicy {
    pub fn new(seed: u64, lure_interest_threshold: f64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            lure_interest_threshold,
        }
    }

    /// Returns the position the adventurer should walk toward this tick,
    /// updating its lure commitment on the way.
    ///
    /// A committed lure is pursued until it is collected. An uncommitted
    /// adventurer greedier than the interest threshold looks at the nearest
    /// lure and commits if it is strictly closer than the exit, or if a
    /// temptation roll with probability `strength * risk / 10` succeeds.
    pub fn choose_target(&mut self, adventurer: &mut Adventurer, dungeon: &Dungeon) -> Position {
        if let Some(target) = adventurer.lure_target {
            if dungeon.cell(target).is_some_and(|cell| cell.lure.is_some()) {
                return target;
            }
            debug!(adventurer = adventurer.id, %target, "committed lure vanished");
            adventurer.lure_target = None;
        }

        let risk = adventurer.risk_affinity.get();
        if risk > self.lure_interest_threshold {
            if let Some((lure_position, strength)) = find_nearest_lure(dungeon, adventurer.position)
                .and_then(|cell| Some((cell.position(), cell.lure?.strength())))
            {
                let to_lure = adventurer.position.manhattan(lure_position);
                let to_exit = adventurer.position.manhattan(dungeon.exit());
                let temptation = (f64::from(strength) * risk / 10.0).clamp(0.0, 1.0);
                let tempted = self.rng.random_bool(temptation);
                if to_lure < to_exit || tempted {
                    debug!(
                        adventurer = adventurer.id,
                        lure = %lure_position,
                        to_lure,
                        to_exit,
                        tempted,
                        "committing to lure"
                    );
                    adventurer.lure_target = Some(lure_position);
                    return lure_position;
                }
            }
        }

        dungeon.exit()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dungeon() -> Dungeon {
        // EN at the left end, EX at the right end of a 7x3 room.
        Dungeon::new(7, 3, Position::new(0, 1), Position::new(6, 1)).unwrap()
    }

    fn adventurer(risk: f64, at: Position) -> Adventurer {
        Adventurer::new(0, at, RiskAffinity::new(risk), 10)
    }

    #[test]
    fn cautious_adventurers_ignore_lures() {
        let mut dungeon = dungeon();
        dungeon.place_lure(Position::new(1, 1), 10).unwrap();
        let mut policy = MovementPolicy::new(1, 0.4);
        let mut hero = adventurer(0.4, Position::new(0, 1));
        for _ in 0..50 {
            assert_eq!(policy.choose_target(&mut hero, &dungeon), dungeon.exit());
        }
        assert_eq!(hero.lure_target, None);
    }

    #[test]
    fn greedy_adventurer_commits_to_closer_lure() {
        let mut dungeon = dungeon();
        let lure = Position::new(2, 0);
        dungeon.place_lure(lure, 0).unwrap();
        let mut policy = MovementPolicy::new(1, 0.4);
        let mut hero = adventurer(0.8, Position::new(0, 1));
        assert_eq!(policy.choose_target(&mut hero, &dungeon), lure);
        assert_eq!(hero.lure_target, Some(lure));
    }

    #[test]
    fn far_lure_without_temptation_is_ignored() {
        let mut dungeon = dungeon();
        // strength 0 makes the temptation probability zero
        dungeon.place_lure(Position::new(0, 0), 0).unwrap();
        let mut policy = MovementPolicy::new(3, 0.4);
        let mut hero = adventurer(1.0, Position::new(5, 1));
        for _ in 0..50 {
            assert_eq!(policy.choose_target(&mut hero, &dungeon), dungeon.exit());
        }
    }

    #[test]
    fn full_temptation_always_detours() {
        let mut dungeon = dungeon();
        let lure = Position::new(0, 0);
        // strength 10 at risk 1.0 gives probability 1
        dungeon.place_lure(lure, 10).unwrap();
        let mut policy = MovementPolicy::new(3, 0.4);
        let mut hero = adventurer(1.0, Position::new(5, 1));
        assert_eq!(policy.choose_target(&mut hero, &dungeon), lure);
    }

    #[test]
    fn partial_temptation_detours_some_of_the_time() {
        let mut dungeon = dungeon();
        let lure = Position::new(0, 0);
        // strength 5 at risk 0.6 gives probability 0.3
        dungeon.place_lure(lure, 5).unwrap();
        let mut policy = MovementPolicy::new(21, 0.4);
        let decisions = 400;
        let detours = (0..decisions)
            .filter(|_| {
                let mut hero = adventurer(0.6, Position::new(5, 1));
                policy.choose_target(&mut hero, &dungeon) == lure
            })
            .count();
        assert!(
            (60..=180).contains(&detours),
            "{detours} of {decisions} decisions detoured"
        );
    }

    #[test]
    fn commitment_persists_until_lure_is_gone() {
        let mut dungeon = dungeon();
        let near = Position::new(2, 1);
        dungeon.place_lure(near, 5).unwrap();
        let mut policy = MovementPolicy::new(9, 0.4);
        let mut hero = adventurer(0.9, Position::new(1, 1));
        assert_eq!(policy.choose_target(&mut hero, &dungeon), near);

        // a closer lure appearing later does not change the commitment
        dungeon.place_lure(Position::new(1, 0), 5).unwrap();
        assert_eq!(policy.choose_target(&mut hero, &dungeon), near);

        dungeon.take_lure(near);
        assert_eq!(
            policy.choose_target(&mut hero, &dungeon),
            Position::new(1, 0)
        );
    }

    #[test]
    fn vanished_lure_reverts_to_exit() {
        let mut dungeon = dungeon();
        let lure = Position::new(3, 1);
        dungeon.place_lure(lure, 5).unwrap();
        let mut policy = MovementPolicy::new(9, 0.4);
        let mut hero = adventurer(0.9, Position::new(2, 1));
        assert_eq!(policy.choose_target(&mut hero, &dungeon), lure);
        dungeon.take_lure(lure);
        assert_eq!(policy.choose_target(&mut hero, &dungeon), dungeon.exit());
        assert_eq!(hero.lure_target, None);
    }
}
