//! A single 3x3 relation matrix between two entity axes.
//!
//! Only the manual marks are stored. The crossed marks implied by a confirmed
//! cell are computed on demand and never written back into the grid.

use serde::{Deserialize, Serialize};

/// Number of rows and columns in a relation grid
pub const GRID_SIZE: usize = 3;

/// Manual mark a player has placed on a cell
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CellMark {
    #[default]
    Empty,
    Crossed,
    Suspected,
    Confirmed,
}

impl CellMark {
    /// Next mark in the cycle empty -> crossed -> suspected -> confirmed -> empty
    pub fn next(self) -> Self {
        match self {
            CellMark::Empty => CellMark::Crossed,
            CellMark::Crossed => CellMark::Suspected,
            CellMark::Suspected => CellMark::Confirmed,
            CellMark::Confirmed => CellMark::Empty,
        }
    }
}

/// What a cell shows to the player (manual mark or derived cross)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CellDisplay {
    Empty,
    Crossed,
    Suspected,
    Confirmed,
    /// Empty cell sharing a row or column with a confirmed cell
    DerivedCrossed,
}

impl CellDisplay {
    /// Derived marks are display-only and do not accept cycling
    pub fn is_interactive(self) -> bool {
        !matches!(self, CellDisplay::DerivedCrossed)
    }
}

/// State machine for one relation grid
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GridEngine {
    marks: [[CellMark; GRID_SIZE]; GRID_SIZE],
}

impl GridEngine {
    /// Create an empty grid
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a grid from raw manual marks (e.g. a restored snapshot)
    pub fn from_marks(marks: [[CellMark; GRID_SIZE]; GRID_SIZE]) -> Self {
        Self { marks }
    }

    /// Raw manual marks
    pub fn marks(&self) -> &[[CellMark; GRID_SIZE]; GRID_SIZE] {
        &self.marks
    }

    /// Manual mark at a cell
    pub fn mark(&self, row: usize, col: usize) -> CellMark {
        assert_in_range(row, col);
        self.marks[row][col]
    }

    /// All confirmed cells in row-major order
    pub fn confirmed_cells(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        (0..GRID_SIZE).flat_map(move |row| {
            (0..GRID_SIZE)
                .filter(move |&col| self.marks[row][col] == CellMark::Confirmed)
                .map(move |col| (row, col))
        })
    }

    /// The live confirmation, if any
    pub fn confirmed(&self) -> Option<(usize, usize)> {
        self.confirmed_cells().next()
    }

    /// Whether the cell currently shows a derived cross
    pub fn is_derived(&self, row: usize, col: usize) -> bool {
        assert_in_range(row, col);
        if self.marks[row][col] != CellMark::Empty {
            return false;
        }
        self.confirmed_cells()
            .any(|(r, c)| (r, c) != (row, col) && (r == row || c == col))
    }

    /// Derived-cross mask for the whole grid
    pub fn derived_marks(&self) -> [[bool; GRID_SIZE]; GRID_SIZE] {
        let mut derived = [[false; GRID_SIZE]; GRID_SIZE];
        for (r, c) in self.confirmed_cells() {
            for i in 0..GRID_SIZE {
                if i != c && self.marks[r][i] == CellMark::Empty {
                    derived[r][i] = true;
                }
                if i != r && self.marks[i][c] == CellMark::Empty {
                    derived[i][c] = true;
                }
            }
        }
        derived
    }

    /// Mark shown for a cell (priority: manual mark, then derived cross)
    pub fn display(&self, row: usize, col: usize) -> CellDisplay {
        match self.mark(row, col) {
            CellMark::Crossed => CellDisplay::Crossed,
            CellMark::Suspected => CellDisplay::Suspected,
            CellMark::Confirmed => CellDisplay::Confirmed,
            CellMark::Empty if self.is_derived(row, col) => CellDisplay::DerivedCrossed,
            CellMark::Empty => CellDisplay::Empty,
        }
    }

    /// Advance a cell's manual mark.
    ///
    /// Returns `false` when the cell shows a derived cross and therefore
    /// ignores the interaction. Confirming a cell clears any other
    /// confirmation in this grid.
    pub fn cycle(&mut self, row: usize, col: usize) -> bool {
        assert_in_range(row, col);
        if self.is_derived(row, col) {
            return false;
        }

        let next = self.marks[row][col].next();
        if next == CellMark::Confirmed {
            for r in 0..GRID_SIZE {
                for c in 0..GRID_SIZE {
                    if self.marks[r][c] == CellMark::Confirmed {
                        self.marks[r][c] = CellMark::Empty;
                    }
                }
            }
        }
        self.marks[row][col] = next;
        true
    }

    /// Reset every cell to empty
    pub fn clear(&mut self) {
        self.marks = [[CellMark::Empty; GRID_SIZE]; GRID_SIZE];
    }

    /// True if no cell carries a manual mark
    pub fn is_blank(&self) -> bool {
        self.marks.iter().flatten().all(|m| *m == CellMark::Empty)
    }
}

fn assert_in_range(row: usize, col: usize) {
    assert!(
        row < GRID_SIZE && col < GRID_SIZE,
        "cell ({}, {}) outside {}x{} grid",
        row,
        col,
        GRID_SIZE,
        GRID_SIZE
    );
}
