//! Risk-weighted A* over the dungeon grid.
//!
//! Edge costs depend on the hazard in the cell being entered and on the
//! caller's [`RiskAffinity`]: cautious adventurers see monsters and traps as
//! expensive detours, reckless ones walk straight through them. An optional
//! [`CostJitter`] perturbs every edge so adventurers with the same affinity
//! do not all take the exact same route.

use rand::{Rng, SeedableRng, rngs::StdRng};
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::{
    Position,
    config::HazardCosts,
    dungeon::{Cell, Dungeon},
    map::Grid,
};

/// Willingness to walk through danger and chase lures, clamped to `[0, 1]`.
///
/// `0.0` is maximally cautious, `1.0` maximally reckless.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Default, Serialize, Deserialize)]
pub struct RiskAffinity(f64);

impl RiskAffinity {
    pub const CAUTIOUS: RiskAffinity = RiskAffinity(0.0);
    pub const RECKLESS: RiskAffinity = RiskAffinity(1.0);

    /// Clamps `value` into `[0, 1]`. NaN is treated as fully cautious.
    pub fn new(value: f64) -> Self {
        if value.is_nan() {
            Self::CAUTIOUS
        } else {
            RiskAffinity(value.clamp(0.0, 1.0))
        }
    }

    #[inline]
    pub fn get(self) -> f64 {
        self.0
    }
}

impl From<f64> for RiskAffinity {
    fn from(value: f64) -> Self {
        RiskAffinity::new(value)
    }
}

/// Source of the per-edge cost perturbation.
pub trait CostJitter {
    /// Returns a value in `[0, max)` to add to one edge cost.
    fn sample(&mut self) -> f64;
}

impl<J: CostJitter + ?Sized> CostJitter for Box<J> {
    fn sample(&mut self) -> f64 {
        (**self).sample()
    }
}

/// Adds nothing. Searches are fully reproducible.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoJitter;

impl CostJitter for NoJitter {
    fn sample(&mut self) -> f64 {
        0.0
    }
}

/// Uniform jitter in `[0, max)` from a seeded generator.
#[derive(Debug, Clone)]
pub struct SeededJitter {
    rng: StdRng,
    max: f64,
}

impl SeededJitter {
    pub const DEFAULT_MAX: f64 = 0.5;

    pub fn new(seed: u64) -> Self {
        Self::with_max(seed, Self::DEFAULT_MAX)
    }

    pub fn with_max(seed: u64, max: f64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            max,
        }
    }
}

impl CostJitter for SeededJitter {
    fn sample(&mut self) -> f64 {
        if self.max > 0.0 {
            self.rng.random_range(0.0..self.max)
        } else {
            0.0
        }
    }
}

/// Cost of stepping into `cell`, before jitter.
///
/// A trap overrides a monster rather than adding to it; the cell model only
/// ever holds one hazard, so the two branches never both apply today.
pub fn edge_cost(cell: &Cell, risk: RiskAffinity, costs: &HazardCosts) -> f64 {
    let caution = 1.0 - risk.get();
    let mut cost = 1.0;
    if cell.has_live_monster() {
        cost = f64::max(1.0, costs.monster_penalty * caution);
    }
    if cell.has_active_trap() {
        cost = f64::max(1.0, costs.trap_penalty * caution);
    }
    cost
}

/// A route returned by [`GridPathfinder::compute_path`].
#[derive(Debug, Clone, PartialEq)]
pub struct Path {
    /// Every cell on the route, `start` first and `goal` last.
    pub cells: Vec<Position>,
    /// Sum of the edge costs along the route, jitter included.
    pub cost: f64,
}

impl Path {
    /// Number of cells on the route, endpoints included.
    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// The cell to move into next, if the route has more than one cell.
    pub fn next(&self) -> Option<Position> {
        self.cells.get(1).copied()
    }
}

/// Weighted grid search used once per movement decision.
///
/// The pathfinder holds no grid state of its own; every query reads the
/// dungeon it is given and keeps its bookkeeping local to the call.
#[derive(Debug, Clone, Default)]
pub struct GridPathfinder<J = NoJitter> {
    costs: HazardCosts,
    jitter: J,
}

impl GridPathfinder<NoJitter> {
    /// A deterministic pathfinder with the default hazard penalties.
    pub fn new() -> Self {
        Self::default()
    }
}

impl<J: CostJitter> GridPathfinder<J> {
    pub fn with_jitter(costs: HazardCosts, jitter: J) -> Self {
        Self { costs, jitter }
    }

    pub fn costs(&self) -> &HazardCosts {
        &self.costs
    }

    /// Finds the cheapest route from `start` to `goal` for an adventurer with
    /// the given risk affinity.
    ///
    /// The frontier is scanned linearly in insertion order and the first cell
    /// with the lowest `f = g + h` is expanded, so ties resolve the same way
    /// on every call. Returns `None` if either endpoint lies outside the grid
    /// or the goal cannot be reached.
    pub fn compute_path(
        &mut self,
        dungeon: &Dungeon,
        start: Position,
        goal: Position,
        risk: RiskAffinity,
    ) -> Option<Path> {
        let grid = dungeon.grid();
        let start_index = grid.index_of(start)?;
        let goal_index = grid.index_of(goal)?;

        let mut g_score = vec![f64::INFINITY; grid.len()];
        let mut f_score = vec![f64::INFINITY; grid.len()];
        let mut came_from: Vec<Option<usize>> = vec![None; grid.len()];
        let mut on_frontier = vec![false; grid.len()];
        let mut frontier = vec![start_index];

        g_score[start_index] = 0.0;
        f_score[start_index] = start.manhattan(goal) as f64;
        on_frontier[start_index] = true;

        let mut expansions = 0usize;
        while !frontier.is_empty() {
            let mut best = 0;
            for (slot, &index) in frontier.iter().enumerate().skip(1) {
                if f_score[index] < f_score[frontier[best]] {
                    best = slot;
                }
            }
            let current = frontier.remove(best);
            on_frontier[current] = false;
            expansions += 1;

            if current == goal_index {
                trace!(%start, %goal, expansions, "path found");
                return Some(Path {
                    cells: reconstruct(grid, &came_from, current),
                    cost: g_score[current],
                });
            }

            let position = grid.position_of(current)?;
            for neighbor in grid.neighbors(position) {
                let Some(index) = grid.index_of(neighbor) else {
                    continue;
                };
                let Some(cell) = grid.get_index(index) else {
                    continue;
                };
                let step = edge_cost(cell, risk, &self.costs) + self.jitter.sample();
                let tentative = g_score[current] + step;
                if tentative < g_score[index] {
                    came_from[index] = Some(current);
                    g_score[index] = tentative;
                    f_score[index] = tentative + neighbor.manhattan(goal) as f64;
                    if !on_frontier[index] {
                        on_frontier[index] = true;
                        frontier.push(index);
                    }
                }
            }
        }

        trace!(%start, %goal, expansions, "frontier exhausted");
        None
    }

    /// The cell an adventurer at `from` should move into to approach `target`.
    ///
    /// Uses the weighted route when one with at least one step exists.
    /// Otherwise steps to the in-bounds neighbor closest to `target` by
    /// Manhattan distance, ignoring hazards, so callers always make progress.
    /// Returns `None` only when `from` is outside the grid or has no
    /// neighbors.
    pub fn next_step(
        &mut self,
        dungeon: &Dungeon,
        from: Position,
        target: Position,
        risk: RiskAffinity,
    ) -> Option<Position> {
        if let Some(step) = self
            .compute_path(dungeon, from, target, risk)
            .and_then(|path| path.next())
        {
            return Some(step);
        }

        let fallback = greedy_step(dungeon, from, target);
        debug!(%from, %target, ?fallback, "weighted search gave no step, using greedy fallback");
        fallback
    }

    /// Nearest cell holding a lure, by Manhattan distance from `from`.
    ///
    /// Ties go to the first cell in row-major order.
    pub fn find_nearest_lure<'d>(&self, dungeon: &'d Dungeon, from: Position) -> Option<&'d Cell> {
        find_nearest_lure(dungeon, from)
    }
}

/// Nearest cell holding a lure, by Manhattan distance from `from`.
///
/// Ties go to the first cell in row-major order.
pub fn find_nearest_lure(dungeon: &Dungeon, from: Position) -> Option<&Cell> {
    let mut nearest: Option<(&Cell, usize)> = None;
    for cell in dungeon.lures() {
        let distance = cell.position().manhattan(from);
        if nearest.is_none_or(|(_, best)| distance < best) {
            nearest = Some((cell, distance));
        }
    }
    nearest.map(|(cell, _)| cell)
}

fn greedy_step(dungeon: &Dungeon, from: Position, target: Position) -> Option<Position> {
    let mut best: Option<(Position, usize)> = None;
    for neighbor in dungeon.grid().neighbors(from) {
        let distance = neighbor.manhattan(target);
        if best.is_none_or(|(_, shortest)| distance < shortest) {
            best = Some((neighbor, distance));
        }
    }
    best.map(|(position, _)| position)
}

fn reconstruct(
    grid: &Grid<Cell>,
    came_from: &[Option<usize>],
    goal: usize,
) -> Vec<Position> {
    let mut cells = Vec::new();
    let mut current = Some(goal);
    while let Some(index) = current {
        if let Some(position) = grid.position_of(index) {
            cells.push(position);
        }
        current = came_from[index];
    }
    cells.reverse();
    cells
}

#[cfg(test)]
mod tests {
    use super::*;

    fn corridor() -> Dungeon {
        Dungeon::new(3, 1, Position::new(0, 0), Position::new(2, 0)).unwrap()
    }

    #[test]
    fn risk_affinity_is_clamped() {
        assert_eq!(RiskAffinity::new(-0.5).get(), 0.0);
        assert_eq!(RiskAffinity::new(1.7).get(), 1.0);
        assert_eq!(RiskAffinity::new(f64::NAN), RiskAffinity::CAUTIOUS);
        assert_eq!(RiskAffinity::from(0.25).get(), 0.25);
    }

    #[test]
    fn edge_cost_scales_with_caution() {
        let mut dungeon = corridor();
        let middle = Position::new(1, 0);
        let costs = HazardCosts::default();

        let empty = dungeon.cell(middle).unwrap().clone();
        assert_eq!(edge_cost(&empty, RiskAffinity::CAUTIOUS, &costs), 1.0);

        dungeon.place_monster(middle).unwrap();
        let monster = dungeon.cell(middle).unwrap().clone();
        assert_eq!(edge_cost(&monster, RiskAffinity::CAUTIOUS, &costs), 5.0);
        assert_eq!(edge_cost(&monster, RiskAffinity::new(0.5), &costs), 2.5);
        assert_eq!(edge_cost(&monster, RiskAffinity::new(0.9), &costs), 1.0);
        assert_eq!(edge_cost(&monster, RiskAffinity::RECKLESS, &costs), 1.0);

        dungeon.kill_monster(middle).unwrap();
        let corpse = dungeon.cell(middle).unwrap().clone();
        assert_eq!(edge_cost(&corpse, RiskAffinity::CAUTIOUS, &costs), 1.0);
    }

    #[test]
    fn trap_cost_only_applies_while_armed() {
        let mut dungeon = corridor();
        let middle = Position::new(1, 0);
        let costs = HazardCosts::default();
        dungeon.place_trap(middle, 2).unwrap();
        let armed = dungeon.cell(middle).unwrap().clone();
        assert_eq!(edge_cost(&armed, RiskAffinity::new(0.5), &costs), 1.5);

        dungeon.set_trap_active(middle, false).unwrap();
        let disarmed = dungeon.cell(middle).unwrap().clone();
        assert_eq!(edge_cost(&disarmed, RiskAffinity::CAUTIOUS, &costs), 1.0);
    }

    #[test]
    fn seeded_jitter_stays_in_range() {
        let mut jitter = SeededJitter::new(7);
        for _ in 0..1000 {
            let value = jitter.sample();
            assert!((0.0..SeededJitter::DEFAULT_MAX).contains(&value));
        }
        assert_eq!(SeededJitter::with_max(7, 0.0).sample(), 0.0);
    }

    #[test]
    fn path_to_self_is_a_single_cell() {
        let dungeon = corridor();
        let mut pathfinder = GridPathfinder::new();
        let path = pathfinder
            .compute_path(&dungeon, Position::new(1, 0), Position::new(1, 0), RiskAffinity::CAUTIOUS)
            .unwrap();
        assert_eq!(path.cells, vec![Position::new(1, 0)]);
        assert_eq!(path.cost, 0.0);
        assert_eq!(path.next(), None);
    }

    #[test]
    fn out_of_bounds_endpoints_yield_no_path() {
        let dungeon = corridor();
        let mut pathfinder = GridPathfinder::new();
        let risk = RiskAffinity::new(0.5);
        assert!(pathfinder
            .compute_path(&dungeon, Position::new(3, 0), Position::new(0, 0), risk)
            .is_none());
        assert!(pathfinder
            .compute_path(&dungeon, Position::new(0, 0), Position::new(0, 1), risk)
            .is_none());
        assert_eq!(
            pathfinder.next_step(&dungeon, Position::new(5, 5), Position::new(0, 0), risk),
            None
        );
    }

    #[test]
    fn greedy_step_prefers_first_neighbor_on_ties() {
        let dungeon =
            Dungeon::new(3, 3, Position::new(0, 0), Position::new(2, 2)).unwrap();
        // right and down are both one closer to (2, 2)
        assert_eq!(
            greedy_step(&dungeon, Position::new(1, 1), Position::new(2, 2)),
            Some(Position::new(2, 1))
        );
        assert_eq!(
            greedy_step(&dungeon, Position::new(1, 1), Position::new(0, 0)),
            Some(Position::new(0, 1))
        );
    }

    #[test]
    fn next_step_at_the_target_still_moves() {
        let dungeon = corridor();
        let mut pathfinder = GridPathfinder::new();
        let step = pathfinder.next_step(
            &dungeon,
            Position::new(2, 0),
            Position::new(2, 0),
            RiskAffinity::CAUTIOUS,
        );
        assert_eq!(step, Some(Position::new(1, 0)));
    }
}
