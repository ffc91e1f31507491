//! NoirNote deduction engine
//!
//! Platform-agnostic core of the NoirNote detective puzzle: the relation grids
//! a player marks up while reading clues, the case definitions those grids are
//! bound to, and the scoring function applied to a solved case. Nothing in this
//! crate performs I/O.

pub mod board;
pub mod case;
pub mod grid;
pub mod scoring;

pub use board::{AxisPair, BoardSnapshot, Candidate, DeductionBoard};
pub use case::{Axis, CaseCatalog, CaseDefinition, CaseError, Difficulty, Entity, Solution};
pub use grid::{CellDisplay, CellMark, GridEngine, GRID_SIZE};
pub use scoring::{average_time_ms, case_score, sanitize_score, total_score, BASE_SCORE};
