use serde::{Deserialize, Serialize};

use crate::Position;

/// Represents errors that can occur within the grid operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GridError {
    #[error("Position {position} is out of bounds for grid size ({width}, {height})")]
    OutOfBounds {
        position: Position,
        width: usize,
        height: usize,
    },
    #[error("Grid dimensions ({width}, {height}) must both be non-zero")]
    Empty { width: usize, height: usize },
}

/// Offsets of the four axis-aligned neighbors, in expansion order:
/// right, down, left, up.
pub const NEIGHBOR_OFFSETS: [(isize, isize); 4] = [(1, 0), (0, 1), (-1, 0), (0, -1)];

/// A fixed-size 2D arena.
///
/// Elements live in a flat vector in row-major order, so the index
/// `y * width + x` is a stable identity for every cell for the lifetime of
/// the grid. Search code keys its bookkeeping by that index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Grid<T> {
    width: usize,
    height: usize,
    cells: Vec<T>,
}

impl<T> Grid<T> {
    /// Creates a new grid, filling each cell from its position.
    ///
    /// Returns `GridError::Empty` if either dimension is zero or the cell
    /// count overflows.
    pub fn from_fn<F>(width: usize, height: usize, mut f: F) -> Result<Self, GridError>
    where
        F: FnMut(Position) -> T,
    {
        let size = width
            .checked_mul(height)
            .filter(|size| *size > 0)
            .ok_or(GridError::Empty { width, height })?;
        let mut cells = Vec::with_capacity(size);
        for y in 0..height {
            for x in 0..width {
                cells.push(f(Position { x, y }));
            }
        }
        Ok(Grid {
            width,
            height,
            cells,
        })
    }

    #[inline]
    pub fn width(&self) -> usize {
        self.width
    }

    #[inline]
    pub fn height(&self) -> usize {
        self.height
    }

    /// Number of cells in the grid.
    #[inline]
    pub fn len(&self) -> usize {
        self.cells.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Checks if the given position is within the grid boundaries.
    #[inline]
    pub fn contains(&self, position: Position) -> bool {
        position.x < self.width && position.y < self.height
    }

    /// Converts a position to its flat index, or `None` when out of bounds.
    #[inline]
    pub fn index_of(&self, position: Position) -> Option<usize> {
        self.contains(position)
            .then(|| position.y * self.width + position.x)
    }

    /// Converts a flat index back to a position, or `None` when out of range.
    #[inline]
    pub fn position_of(&self, index: usize) -> Option<Position> {
        (index < self.cells.len()).then(|| Position {
            x: index % self.width,
            y: index / self.width,
        })
    }

    /// Bounds-checked access by position.
    pub fn get(&self, position: Position) -> Option<&T> {
        let index = self.index_of(position)?;
        self.cells.get(index)
    }

    /// Bounds-checked mutable access by position.
    pub fn get_mut(&mut self, position: Position) -> Option<&mut T> {
        let index = self.index_of(position)?;
        self.cells.get_mut(index)
    }

    /// Like [`Grid::get_mut`], but reports the failing position.
    pub fn try_get_mut(&mut self, position: Position) -> Result<&mut T, GridError> {
        let (width, height) = (self.width, self.height);
        self.get_mut(position).ok_or(GridError::OutOfBounds {
            position,
            width,
            height,
        })
    }

    /// Access by flat index.
    #[inline]
    pub fn get_index(&self, index: usize) -> Option<&T> {
        self.cells.get(index)
    }

    /// In-bounds 4-neighbors of `position`, in [`NEIGHBOR_OFFSETS`] order.
    ///
    /// Yields nothing if `position` itself is out of bounds.
    pub fn neighbors(&self, position: Position) -> impl Iterator<Item = Position> + '_ {
        let origin = self.contains(position).then_some(position);
        NEIGHBOR_OFFSETS
            .iter()
            .filter_map(move |&(dx, dy)| {
                let origin = origin?;
                let next = Position {
                    x: origin.x.checked_add_signed(dx)?,
                    y: origin.y.checked_add_signed(dy)?,
                };
                self.contains(next).then_some(next)
            })
    }

    /// Iterates over the cells in row-major order.
    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.cells.iter()
    }

    /// Iterates over `(position, cell)` pairs in row-major order.
    pub fn enumerate(&self) -> impl Iterator<Item = (Position, &T)> {
        let width = self.width;
        self.cells.iter().enumerate().map(move |(index, cell)| {
            (
                Position {
                    x: index % width,
                    y: index / width,
                },
                cell,
            )
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grid(width: usize, height: usize) -> Grid<Position> {
        Grid::from_fn(width, height, |p| p).unwrap()
    }

    #[test]
    fn index_round_trips_through_position() {
        let g = grid(4, 3);
        let p = Position::new(3, 2);
        let index = g.index_of(p).unwrap();
        assert_eq!(index, 11);
        assert_eq!(g.position_of(index), Some(p));
        assert_eq!(g.get(p), Some(&p));
        assert_eq!(g.index_of(Position::new(4, 0)), None);
        assert_eq!(g.position_of(12), None);
    }

    #[test]
    fn zero_sized_grid_is_rejected() {
        assert_eq!(
            Grid::from_fn(0, 3, |_| ()).unwrap_err(),
            GridError::Empty {
                width: 0,
                height: 3
            }
        );
    }

    #[test]
    fn neighbors_follow_right_down_left_up_order() {
        let g = grid(3, 3);
        let around: Vec<_> = g.neighbors(Position::new(1, 1)).collect();
        assert_eq!(
            around,
            vec![
                Position::new(2, 1),
                Position::new(1, 2),
                Position::new(0, 1),
                Position::new(1, 0),
            ]
        );
    }

    #[test]
    fn neighbors_are_clipped_at_the_border() {
        let g = grid(3, 3);
        let corner: Vec<_> = g.neighbors(Position::new(0, 0)).collect();
        assert_eq!(corner, vec![Position::new(1, 0), Position::new(0, 1)]);

        let single = grid(1, 1);
        assert_eq!(single.neighbors(Position::new(0, 0)).count(), 0);
        assert_eq!(g.neighbors(Position::new(5, 5)).count(), 0);
    }

    #[test]
    fn try_get_mut_reports_out_of_bounds() {
        let mut g = grid(2, 2);
        let err = g.try_get_mut(Position::new(2, 0)).unwrap_err();
        assert!(matches!(err, GridError::OutOfBounds { width: 2, height: 2, .. }));
    }
}
