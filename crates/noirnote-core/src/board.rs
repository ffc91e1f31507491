//! The deduction board: three relation grids bound to one case's entities,
//! plus the final-answer selectors.

use crate::case::{Axis, CaseDefinition};
use crate::grid::{CellDisplay, GridEngine};
use serde::{Deserialize, Serialize};

/// Identity of one of the three relation grids
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AxisPair {
    SuspectLocation,
    SuspectWeapon,
    LocationWeapon,
}

impl AxisPair {
    pub const ALL: [AxisPair; 3] = [
        AxisPair::SuspectLocation,
        AxisPair::SuspectWeapon,
        AxisPair::LocationWeapon,
    ];

    /// Axis along the grid's rows
    pub fn rows(self) -> Axis {
        match self {
            AxisPair::SuspectLocation | AxisPair::SuspectWeapon => Axis::Suspect,
            AxisPair::LocationWeapon => Axis::Location,
        }
    }

    /// Axis along the grid's columns
    pub fn cols(self) -> Axis {
        match self {
            AxisPair::SuspectLocation => Axis::Location,
            AxisPair::SuspectWeapon | AxisPair::LocationWeapon => Axis::Weapon,
        }
    }

    /// Short label used in snapshots and the UI
    pub fn key(self) -> &'static str {
        match self {
            AxisPair::SuspectLocation => "SL",
            AxisPair::SuspectWeapon => "SW",
            AxisPair::LocationWeapon => "LW",
        }
    }

    fn index(self) -> usize {
        match self {
            AxisPair::SuspectLocation => 0,
            AxisPair::SuspectWeapon => 1,
            AxisPair::LocationWeapon => 2,
        }
    }
}

/// A final answer picked by the player
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Candidate {
    pub suspect_id: String,
    pub location_id: String,
    pub weapon_id: String,
}

impl Candidate {
    pub fn new(suspect_id: &str, location_id: &str, weapon_id: &str) -> Self {
        Self {
            suspect_id: suspect_id.to_string(),
            location_id: location_id.to_string(),
            weapon_id: weapon_id.to_string(),
        }
    }
}

/// Serializable form of the three grids
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct BoardSnapshot {
    #[serde(rename = "SL")]
    pub suspect_location: GridEngine,
    #[serde(rename = "SW")]
    pub suspect_weapon: GridEngine,
    #[serde(rename = "LW")]
    pub location_weapon: GridEngine,
}

/// Three independent relation grids for one case
#[derive(Debug, Clone)]
pub struct DeductionBoard {
    /// Entity ids per axis, indexed by `Axis::index`
    entities: [[String; 3]; 3],
    grids: [GridEngine; 3],
    selection: [Option<String>; 3],
}

impl DeductionBoard {
    /// Create an empty board bound to a case's entities
    pub fn for_case(case: &CaseDefinition) -> Self {
        let entities =
            Axis::ALL.map(|axis| case.entities(axis).each_ref().map(|e| e.id.clone()));
        Self {
            entities,
            grids: [GridEngine::new(); 3],
            selection: [None, None, None],
        }
    }

    pub fn grid(&self, pair: AxisPair) -> &GridEngine {
        &self.grids[pair.index()]
    }

    /// Cycle a cell by grid coordinates
    pub fn cycle(&mut self, pair: AxisPair, row: usize, col: usize) -> bool {
        self.grids[pair.index()].cycle(row, col)
    }

    /// Cycle the cell linking two entities; unknown ids are ignored
    pub fn cycle_entities(&mut self, pair: AxisPair, row_id: &str, col_id: &str) -> bool {
        match (self.index_of(pair.rows(), row_id), self.index_of(pair.cols(), col_id)) {
            (Some(row), Some(col)) => self.cycle(pair, row, col),
            _ => {
                log::debug!(
                    "ignoring cycle on {} for unknown entities {} / {}",
                    pair.key(),
                    row_id,
                    col_id
                );
                false
            }
        }
    }

    /// Mark shown for a cell
    pub fn display(&self, pair: AxisPair, row: usize, col: usize) -> CellDisplay {
        self.grid(pair).display(row, col)
    }

    /// Entity id heading a row or column
    pub fn entity_at(&self, axis: Axis, index: usize) -> &str {
        &self.entities[axis.index()][index]
    }

    pub fn index_of(&self, axis: Axis, id: &str) -> Option<usize> {
        self.entities[axis.index()].iter().position(|e| e == id)
    }

    /// Pick the final answer along one axis
    pub fn select(&mut self, axis: Axis, id: &str) -> bool {
        if self.index_of(axis, id).is_none() {
            return false;
        }
        self.selection[axis.index()] = Some(id.to_string());
        true
    }

    pub fn selected(&self, axis: Axis) -> Option<&str> {
        self.selection[axis.index()].as_deref()
    }

    pub fn clear_selection(&mut self) {
        self.selection = [None, None, None];
    }

    /// The player's chosen answer, once all three axes are selected.
    ///
    /// The board does not judge the answer.
    pub fn submit_candidate(&self) -> Option<Candidate> {
        let [suspect, location, weapon] = &self.selection;
        Some(Candidate {
            suspect_id: suspect.clone()?,
            location_id: location.clone()?,
            weapon_id: weapon.clone()?,
        })
    }

    /// Reset all grids
    pub fn clear(&mut self) {
        for grid in &mut self.grids {
            grid.clear();
        }
    }

    pub fn snapshot(&self) -> BoardSnapshot {
        BoardSnapshot {
            suspect_location: self.grids[0],
            suspect_weapon: self.grids[1],
            location_weapon: self.grids[2],
        }
    }

    pub fn restore(&mut self, snapshot: &BoardSnapshot) {
        self.grids = [
            snapshot.suspect_location,
            snapshot.suspect_weapon,
            snapshot.location_weapon,
        ];
    }

    /// Encode the grids as the opaque string stored in the session document
    pub fn to_snapshot(&self) -> String {
        serde_json::to_string(&self.snapshot()).unwrap_or_default()
    }

    /// Restore grids from an encoded snapshot.
    ///
    /// An undecodable snapshot resets the board and returns `false`.
    pub fn restore_snapshot(&mut self, encoded: &str) -> bool {
        match serde_json::from_str::<BoardSnapshot>(encoded) {
            Ok(snapshot) => {
                self.restore(&snapshot);
                true
            }
            Err(e) => {
                log::warn!("discarding undecodable board snapshot: {}", e);
                self.clear();
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::case::CaseCatalog;
    use crate::grid::CellMark;

    fn board() -> DeductionBoard {
        DeductionBoard::for_case(CaseCatalog::builtin().get("case-001").unwrap())
    }

    #[test]
    fn test_axis_pairs() {
        assert_eq!(AxisPair::SuspectLocation.rows(), Axis::Suspect);
        assert_eq!(AxisPair::SuspectLocation.cols(), Axis::Location);
        assert_eq!(AxisPair::SuspectWeapon.cols(), Axis::Weapon);
        assert_eq!(AxisPair::LocationWeapon.rows(), Axis::Location);
    }

    #[test]
    fn test_grids_are_independent() {
        let mut board = board();
        for _ in 0..3 {
            board.cycle(AxisPair::SuspectLocation, 0, 0);
        }

        assert_eq!(board.grid(AxisPair::SuspectLocation).confirmed(), Some((0, 0)));
        assert!(board.grid(AxisPair::SuspectWeapon).is_blank());
        assert!(board.grid(AxisPair::LocationWeapon).is_blank());
        assert_eq!(
            board.display(AxisPair::SuspectLocation, 0, 1),
            CellDisplay::DerivedCrossed
        );
        assert_eq!(board.display(AxisPair::SuspectWeapon, 0, 1), CellDisplay::Empty);
    }

    #[test]
    fn test_cycle_by_entity_ids() {
        let mut board = board();
        assert!(board.cycle_entities(AxisPair::LocationWeapon, "location-002", "weapon-003"));
        assert_eq!(
            board.grid(AxisPair::LocationWeapon).mark(1, 2),
            CellMark::Crossed
        );
        assert!(!board.cycle_entities(AxisPair::LocationWeapon, "suspect-001", "weapon-003"));
    }

    #[test]
    fn test_header_lookup() {
        let board = board();
        assert_eq!(board.entity_at(Axis::Weapon, 2), "weapon-003");
        assert_eq!(board.index_of(Axis::Location, "location-001"), Some(0));
        assert_eq!(board.index_of(Axis::Location, "weapon-001"), None);
    }

    #[test]
    fn test_candidate_requires_all_selections() {
        let mut board = board();
        assert!(board.submit_candidate().is_none());

        assert!(board.select(Axis::Suspect, "suspect-002"));
        assert!(board.select(Axis::Location, "location-001"));
        assert!(!board.select(Axis::Weapon, "weapon-404"));
        assert!(board.submit_candidate().is_none());

        assert!(board.select(Axis::Weapon, "weapon-001"));
        assert_eq!(
            board.submit_candidate(),
            Some(Candidate::new("suspect-002", "location-001", "weapon-001"))
        );

        board.clear_selection();
        assert!(board.selected(Axis::Suspect).is_none());
    }

    #[test]
    fn test_snapshot_restore() {
        let mut board = board();
        board.cycle(AxisPair::SuspectWeapon, 2, 1);
        board.cycle(AxisPair::LocationWeapon, 0, 0);
        board.cycle(AxisPair::LocationWeapon, 0, 0);
        let encoded = board.to_snapshot();

        let mut restored = self::board();
        assert!(restored.restore_snapshot(&encoded));
        assert_eq!(restored.snapshot(), board.snapshot());
        assert_eq!(
            restored.grid(AxisPair::LocationWeapon).mark(0, 0),
            CellMark::Suspected
        );
    }

    #[test]
    fn test_snapshot_uses_grid_keys() {
        let value: serde_json::Value = serde_json::from_str(&board().to_snapshot()).unwrap();
        assert_eq!(value["SL"][0][0], "empty");
        assert!(value.get("SW").is_some());
        assert!(value.get("LW").is_some());
    }

    #[test]
    fn test_corrupt_snapshot_resets_board() {
        let mut board = board();
        board.cycle(AxisPair::SuspectLocation, 1, 1);
        assert!(!board.restore_snapshot("{not json"));
        assert!(board.grid(AxisPair::SuspectLocation).is_blank());
    }
}
