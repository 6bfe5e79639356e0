use serde::{Deserialize, Serialize};

use crate::{
    Position,
    map::{Grid, GridError},
};

/// Static role of a cell. Exactly one entrance and one exit exist per dungeon.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum CellKind {
    #[default]
    Empty,
    Entrance,
    Exit,
}

/// Something dangerous occupying a cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Hazard {
    Trap { damage: u32, active: bool },
    Monster { alive: bool },
}

impl Hazard {
    /// True for an armed trap or a living monster.
    pub fn is_threat(&self) -> bool {
        match *self {
            Hazard::Trap { active, .. } => active,
            Hazard::Monster { alive } => alive,
        }
    }
}

/// An object placed to tempt greedy adventurers off the exit route.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lure {
    strength: u8,
}

impl Lure {
    pub const MAX_STRENGTH: u8 = 10;

    pub fn new(strength: u8) -> Result<Self, DungeonError> {
        if strength > Self::MAX_STRENGTH {
            return Err(DungeonError::InvalidLureStrength(strength));
        }
        Ok(Lure { strength })
    }

    #[inline]
    pub fn strength(&self) -> u8 {
        self.strength
    }
}

/// One grid position. The position and kind never change after construction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cell {
    position: Position,
    kind: CellKind,
    pub hazard: Option<Hazard>,
    pub lure: Option<Lure>,
}

impl Cell {
    #[inline]
    pub fn position(&self) -> Position {
        self.position
    }

    #[inline]
    pub fn kind(&self) -> CellKind {
        self.kind
    }

    pub fn has_live_monster(&self) -> bool {
        matches!(self.hazard, Some(Hazard::Monster { alive: true }))
    }

    pub fn has_active_trap(&self) -> bool {
        matches!(self.hazard, Some(Hazard::Trap { active: true, .. }))
    }

    fn is_protected(&self) -> bool {
        self.kind != CellKind::Empty
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DungeonError {
    #[error(transparent)]
    Grid(#[from] GridError),
    #[error("Entrance and exit must be distinct cells, both were {0}")]
    EntranceIsExit(Position),
    #[error("Cell {0} is the entrance or exit and cannot hold hazards or lures")]
    Protected(Position),
    #[error("Cell {0} already holds a hazard or lure")]
    Occupied(Position),
    #[error("Lure strength {0} exceeds the maximum of {max}", max = Lure::MAX_STRENGTH)]
    InvalidLureStrength(u8),
    #[error("Cell {0} does not hold a trap")]
    NoTrap(Position),
    #[error("Cell {0} does not hold a monster")]
    NoMonster(Position),
    #[error("Layout is empty")]
    EmptyLayout,
    #[error("Inconsistent width at row {row}: expected {expected}, found {found}")]
    RaggedLayout {
        row: usize,
        expected: usize,
        found: usize,
    },
    #[error("Unknown layout code '{code}' at {position}")]
    UnknownCode { code: String, position: Position },
    #[error("Layout contains more than one '{0}' cell")]
    Duplicate(&'static str),
    #[error("Layout has no '{0}' cell")]
    Missing(&'static str),
    #[error("Expected {expected} cells, found {found}")]
    CellCount { expected: usize, found: usize },
    #[error("Cell at index {0} does not match its position or kind")]
    CellMismatch(usize),
}

/// The dungeon floor: a grid of cells plus the entrance and exit positions.
///
/// Hazards and lures are placed and removed here by outside collaborators
/// (placement tools, trap timers). Pathfinding only reads it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "DungeonRecord")]
pub struct Dungeon {
    cells: Grid<Cell>,
    entrance: Position,
    exit: Position,
}

/// Serialized shape of a [`Dungeon`], checked before it becomes one.
#[derive(Deserialize)]
struct DungeonRecord {
    cells: Grid<Cell>,
    entrance: Position,
    exit: Position,
}

impl TryFrom<DungeonRecord> for Dungeon {
    type Error = DungeonError;

    /// Rebuilds the dungeon and replays every hazard and lure through the
    /// placement operations, so a record breaking an invariant is rejected.
    fn try_from(record: DungeonRecord) -> Result<Self, Self::Error> {
        let (width, height) = (record.cells.width(), record.cells.height());
        let mut dungeon = Dungeon::new(width, height, record.entrance, record.exit)?;
        if record.cells.len() != dungeon.cells.len() {
            return Err(DungeonError::CellCount {
                expected: dungeon.cells.len(),
                found: record.cells.len(),
            });
        }

        for (index, (cell, fresh)) in record.cells.iter().zip(dungeon.cells.iter()).enumerate() {
            if cell.position != fresh.position || cell.kind != fresh.kind {
                return Err(DungeonError::CellMismatch(index));
            }
        }

        for cell in record.cells.iter() {
            let position = cell.position;
            match cell.hazard {
                Some(Hazard::Trap { damage, active }) => {
                    dungeon.place_trap(position, damage)?;
                    dungeon.set_trap_active(position, active)?;
                }
                Some(Hazard::Monster { alive }) => {
                    dungeon.place_monster(position)?;
                    if !alive {
                        dungeon.kill_monster(position)?;
                    }
                }
                None => {}
            }
            if let Some(lure) = cell.lure {
                dungeon.place_lure(position, lure.strength())?;
            }
        }
        Ok(dungeon)
    }
}

impl Dungeon {
    /// Creates an empty dungeon with the given entrance and exit.
    pub fn new(
        width: usize,
        height: usize,
        entrance: Position,
        exit: Position,
    ) -> Result<Self, DungeonError> {
        if entrance == exit {
            return Err(DungeonError::EntranceIsExit(entrance));
        }
        let cells = Grid::from_fn(width, height, |position| Cell {
            position,
            kind: if position == entrance {
                CellKind::Entrance
            } else if position == exit {
                CellKind::Exit
            } else {
                CellKind::Empty
            },
            hazard: None,
            lure: None,
        })?;
        for position in [entrance, exit] {
            if !cells.contains(position) {
                return Err(GridError::OutOfBounds {
                    position,
                    width,
                    height,
                }
                .into());
            }
        }
        Ok(Dungeon {
            cells,
            entrance,
            exit,
        })
    }

    #[inline]
    pub fn width(&self) -> usize {
        self.cells.width()
    }

    #[inline]
    pub fn height(&self) -> usize {
        self.cells.height()
    }

    #[inline]
    pub fn entrance(&self) -> Position {
        self.entrance
    }

    #[inline]
    pub fn exit(&self) -> Position {
        self.exit
    }

    /// The underlying cell arena.
    #[inline]
    pub fn grid(&self) -> &Grid<Cell> {
        &self.cells
    }

    /// Bounds-checked cell lookup. Returns the same cell for the same position
    /// every time.
    #[inline]
    pub fn cell(&self, position: Position) -> Option<&Cell> {
        self.cells.get(position)
    }

    /// Cells currently holding a lure, in row-major order.
    pub fn lures(&self) -> impl Iterator<Item = &Cell> {
        self.cells.iter().filter(|cell| cell.lure.is_some())
    }

    pub fn place_trap(&mut self, position: Position, damage: u32) -> Result<(), DungeonError> {
        self.place_hazard(
            position,
            Hazard::Trap {
                damage,
                active: true,
            },
        )
    }

    pub fn place_monster(&mut self, position: Position) -> Result<(), DungeonError> {
        self.place_hazard(position, Hazard::Monster { alive: true })
    }

    pub fn place_lure(&mut self, position: Position, strength: u8) -> Result<(), DungeonError> {
        let lure = Lure::new(strength)?;
        let cell = self.vacant_cell_mut(position)?;
        cell.lure = Some(lure);
        Ok(())
    }

    /// Removes and returns the lure at `position`, if any.
    pub fn take_lure(&mut self, position: Position) -> Option<Lure> {
        self.cells.get_mut(position)?.lure.take()
    }

    /// Removes and returns the hazard at `position`, if any.
    pub fn clear_hazard(&mut self, position: Position) -> Option<Hazard> {
        self.cells.get_mut(position)?.hazard.take()
    }

    /// Arms or disarms the trap at `position`.
    pub fn set_trap_active(&mut self, position: Position, armed: bool) -> Result<(), DungeonError> {
        match &mut self.cells.try_get_mut(position)?.hazard {
            Some(Hazard::Trap { active, .. }) => {
                *active = armed;
                Ok(())
            }
            _ => Err(DungeonError::NoTrap(position)),
        }
    }

    /// Marks the monster at `position` as dead. Its body stays in the cell.
    pub fn kill_monster(&mut self, position: Position) -> Result<(), DungeonError> {
        match &mut self.cells.try_get_mut(position)?.hazard {
            Some(Hazard::Monster { alive }) => {
                *alive = false;
                Ok(())
            }
            _ => Err(DungeonError::NoMonster(position)),
        }
    }

    fn place_hazard(&mut self, position: Position, hazard: Hazard) -> Result<(), DungeonError> {
        let cell = self.vacant_cell_mut(position)?;
        cell.hazard = Some(hazard);
        Ok(())
    }

    fn vacant_cell_mut(&mut self, position: Position) -> Result<&mut Cell, DungeonError> {
        let cell = self.cells.try_get_mut(position)?;
        if cell.is_protected() {
            return Err(DungeonError::Protected(position));
        }
        if cell.hazard.is_some() || cell.lure.is_some() {
            return Err(DungeonError::Occupied(position));
        }
        Ok(cell)
    }

    /// Parses a dungeon from a whitespace-separated grid of two-letter codes.
    ///
    /// | code | meaning |
    /// |------|---------|
    /// | `BL` | empty floor |
    /// | `EN` | entrance |
    /// | `EX` | exit |
    /// | `TP` | armed trap dealing `trap_damage` |
    /// | `MN` | live monster |
    /// | `L0`..`L9` | lure of that strength |
    /// | `LX` | lure of strength 10 |
    pub fn from_layout(layout: &str, trap_damage: u32) -> Result<Self, DungeonError> {
        let rows: Vec<Vec<&str>> = layout
            .trim()
            .lines()
            .map(|line| line.split_whitespace().collect())
            .collect();

        let width = rows.first().map_or(0, Vec::len);
        if width == 0 {
            return Err(DungeonError::EmptyLayout);
        }
        for (row, tokens) in rows.iter().enumerate() {
            if tokens.len() != width {
                return Err(DungeonError::RaggedLayout {
                    row,
                    expected: width,
                    found: tokens.len(),
                });
            }
        }

        let mut entrance = None;
        let mut exit = None;
        for (y, tokens) in rows.iter().enumerate() {
            for (x, token) in tokens.iter().enumerate() {
                let slot = match *token {
                    "EN" => (&mut entrance, "EN"),
                    "EX" => (&mut exit, "EX"),
                    _ => continue,
                };
                if slot.0.replace(Position { x, y }).is_some() {
                    return Err(DungeonError::Duplicate(slot.1));
                }
            }
        }
        let entrance = entrance.ok_or(DungeonError::Missing("EN"))?;
        let exit = exit.ok_or(DungeonError::Missing("EX"))?;

        let mut dungeon = Dungeon::new(width, rows.len(), entrance, exit)?;
        for (y, tokens) in rows.iter().enumerate() {
            for (x, token) in tokens.iter().enumerate() {
                let position = Position { x, y };
                match *token {
                    "BL" | "EN" | "EX" => {}
                    "TP" => dungeon.place_trap(position, trap_damage)?,
                    "MN" => dungeon.place_monster(position)?,
                    "LX" => dungeon.place_lure(position, Lure::MAX_STRENGTH)?,
                    code => match code.strip_prefix('L').and_then(|d| d.parse::<u8>().ok()) {
                        Some(strength) if code.len() == 2 => {
                            dungeon.place_lure(position, strength)?
                        }
                        _ => {
                            return Err(DungeonError::UnknownCode {
                                code: code.to_string(),
                                position,
                            });
                        }
                    },
                }
            }
        }

        Ok(dungeon)
    }
}
