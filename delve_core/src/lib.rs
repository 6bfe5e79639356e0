use serde::{Deserialize, Serialize};

pub mod agent;
pub mod config;
pub mod dungeon;
pub mod map;
pub mod pathfinding;
pub mod simulation;

/// Unique identifier for adventurers.
pub type EntityId = usize;

/// Represents a 2D coordinate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Position {
    pub x: usize,
    pub y: usize,
}

impl Position {
    pub const fn new(x: usize, y: usize) -> Self {
        Position { x, y }
    }

    /// Manhattan distance (`|dx| + |dy|`) to another position.
    #[inline]
    pub fn manhattan(&self, other: Position) -> usize {
        self.x.abs_diff(other.x) + self.y.abs_diff(other.y)
    }
}

impl std::fmt::Display for Position {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manhattan_is_symmetric() {
        let a = Position::new(1, 4);
        let b = Position::new(3, 0);
        assert_eq!(a.manhattan(b), 6);
        assert_eq!(b.manhattan(a), 6);
        assert_eq!(a.manhattan(a), 0);
    }
}
