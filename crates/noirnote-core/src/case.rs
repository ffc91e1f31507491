//! Case definitions: the entities a case is played over and its solution.
//!
//! Display content (names, icons, clue text) is resolved by the front end from
//! the keys carried here.

use crate::board::Candidate;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Difficulty tier of a case
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    Easy,
    Medium,
    Hard,
}

impl Difficulty {
    /// Score multiplier for this tier
    pub fn multiplier(&self) -> f64 {
        match self {
            Difficulty::Easy => 1.0,
            Difficulty::Medium => 1.5,
            Difficulty::Hard => 2.0,
        }
    }

    pub fn all() -> &'static [Difficulty] {
        &[Difficulty::Easy, Difficulty::Medium, Difficulty::Hard]
    }
}

impl std::fmt::Display for Difficulty {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Difficulty::Easy => write!(f, "Easy"),
            Difficulty::Medium => write!(f, "Medium"),
            Difficulty::Hard => write!(f, "Hard"),
        }
    }
}

/// One of the three entity categories
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Axis {
    Suspect,
    Location,
    Weapon,
}

impl Axis {
    pub const ALL: [Axis; 3] = [Axis::Suspect, Axis::Location, Axis::Weapon];

    pub(crate) fn index(self) -> usize {
        match self {
            Axis::Suspect => 0,
            Axis::Location => 1,
            Axis::Weapon => 2,
        }
    }
}

impl std::fmt::Display for Axis {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Axis::Suspect => write!(f, "suspect"),
            Axis::Location => write!(f, "location"),
            Axis::Weapon => write!(f, "weapon"),
        }
    }
}

/// A suspect, location or weapon
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Entity {
    pub id: String,
    /// Text key of the display name
    pub name_key: String,
    #[serde(default)]
    pub icon_key: Option<String>,
}

impl Entity {
    pub fn new(id: &str, name_key: &str) -> Self {
        Self {
            id: id.to_string(),
            name_key: name_key.to_string(),
            icon_key: None,
        }
    }
}

/// The suspect, location and weapon that are actually linked
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Solution {
    pub suspect_id: String,
    pub location_id: String,
    pub weapon_id: String,
}

impl Solution {
    /// All three axes must match; there is no partial credit
    pub fn matches(&self, candidate: &Candidate) -> bool {
        self.suspect_id == candidate.suspect_id
            && self.location_id == candidate.location_id
            && self.weapon_id == candidate.weapon_id
    }
}

/// Immutable description of one case
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CaseDefinition {
    pub id: String,
    pub title_key: String,
    pub difficulty: Difficulty,
    pub suspects: [Entity; 3],
    pub locations: [Entity; 3],
    pub weapons: [Entity; 3],
    #[serde(default)]
    pub clues: Vec<String>,
    pub solution: Solution,
}

/// Errors raised while loading case definitions
#[derive(Debug, Error)]
pub enum CaseError {
    #[error("invalid case catalog: {0}")]
    Json(#[from] serde_json::Error),
    #[error("case {case}: solution {axis} `{id}` is not one of the case's entities")]
    UnknownSolutionEntity { case: String, axis: Axis, id: String },
    #[error("case {case}: duplicate {axis} id `{id}`")]
    DuplicateEntity { case: String, axis: Axis, id: String },
    #[error("duplicate case id `{0}`")]
    DuplicateCase(String),
}

impl CaseDefinition {
    /// Entities along one axis
    pub fn entities(&self, axis: Axis) -> &[Entity; 3] {
        match axis {
            Axis::Suspect => &self.suspects,
            Axis::Location => &self.locations,
            Axis::Weapon => &self.weapons,
        }
    }

    /// Solution id along one axis
    pub fn solution_id(&self, axis: Axis) -> &str {
        match axis {
            Axis::Suspect => &self.solution.suspect_id,
            Axis::Location => &self.solution.location_id,
            Axis::Weapon => &self.solution.weapon_id,
        }
    }

    /// Check a submitted candidate against the solution
    pub fn is_solved_by(&self, candidate: &Candidate) -> bool {
        self.solution.matches(candidate)
    }

    /// Check that entity ids are unique per axis and the solution refers to them
    pub fn validate(&self) -> Result<(), CaseError> {
        for axis in Axis::ALL {
            let entities = self.entities(axis);
            for (i, entity) in entities.iter().enumerate() {
                if entities[..i].iter().any(|e| e.id == entity.id) {
                    return Err(CaseError::DuplicateEntity {
                        case: self.id.clone(),
                        axis,
                        id: entity.id.clone(),
                    });
                }
            }

            let id = self.solution_id(axis);
            if !entities.iter().any(|e| e.id == id) {
                return Err(CaseError::UnknownSolutionEntity {
                    case: self.id.clone(),
                    axis,
                    id: id.to_string(),
                });
            }
        }
        Ok(())
    }
}

/// Read-only set of cases keyed by id
#[derive(Debug, Clone, Default)]
pub struct CaseCatalog {
    cases: Vec<CaseDefinition>,
}

impl CaseCatalog {
    /// Build a catalog, validating every case
    pub fn new(cases: Vec<CaseDefinition>) -> Result<Self, CaseError> {
        for (i, case) in cases.iter().enumerate() {
            case.validate()?;
            if cases[..i].iter().any(|c| c.id == case.id) {
                return Err(CaseError::DuplicateCase(case.id.clone()));
            }
        }
        Ok(Self { cases })
    }

    /// Load a catalog from a JSON array of case definitions
    pub fn from_json(json: &str) -> Result<Self, CaseError> {
        let cases: Vec<CaseDefinition> = serde_json::from_str(json)?;
        Self::new(cases)
    }

    /// Demo cases shipped with the game
    pub fn builtin() -> Self {
        Self {
            cases: vec![
                demo_case("case-001", Difficulty::Easy, 1, [0, 1, 2]),
                demo_case("case-002", Difficulty::Medium, 7, [2, 0, 1]),
                demo_case("case-003", Difficulty::Hard, 13, [1, 2, 0]),
            ],
        }
    }

    pub fn get(&self, id: &str) -> Option<&CaseDefinition> {
        self.cases.iter().find(|c| c.id == id)
    }

    pub fn first(&self) -> Option<&CaseDefinition> {
        self.cases.first()
    }

    pub fn iter(&self) -> impl Iterator<Item = &CaseDefinition> {
        self.cases.iter()
    }

    pub fn len(&self) -> usize {
        self.cases.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cases.is_empty()
    }
}

fn demo_case(id: &str, difficulty: Difficulty, first: usize, solution: [usize; 3]) -> CaseDefinition {
    let number = id.trim_start_matches("case-");
    let axis = |kind: &str| -> [Entity; 3] {
        std::array::from_fn(|i| {
            let n = format!("{:03}", first + i);
            Entity {
                id: format!("{}-{}", kind, n),
                name_key: format!("{}s.{}{}", kind, kind, n),
                icon_key: Some(format!("{}s.icon{}", kind, n)),
            }
        })
    };

    let suspects = axis("suspect");
    let locations = axis("location");
    let weapons = axis("weapon");
    let solution = Solution {
        suspect_id: suspects[solution[0]].id.clone(),
        location_id: locations[solution[1]].id.clone(),
        weapon_id: weapons[solution[2]].id.clone(),
    };

    CaseDefinition {
        id: id.to_string(),
        title_key: format!("cases.case{}.title", number),
        difficulty,
        clues: (1..=5)
            .map(|n| format!("cases.case{}.clues.clue{}", number, n))
            .collect(),
        suspects,
        locations,
        weapons,
        solution,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_catalog_is_valid() {
        let catalog = CaseCatalog::builtin();
        assert_eq!(catalog.len(), 3);
        for case in catalog.iter() {
            case.validate().unwrap();
        }
        let first = catalog.get("case-001").unwrap();
        assert_eq!(first.difficulty, Difficulty::Easy);
        assert_eq!(first.solution.suspect_id, "suspect-001");
        assert_eq!(first.solution.location_id, "location-002");
        assert_eq!(first.solution.weapon_id, "weapon-003");
    }

    #[test]
    fn test_solution_requires_all_axes() {
        let case = CaseCatalog::builtin().get("case-001").unwrap().clone();
        let right = Candidate::new("suspect-001", "location-002", "weapon-003");
        let partial = Candidate::new("suspect-001", "location-002", "weapon-001");

        assert!(case.is_solved_by(&right));
        assert!(!case.is_solved_by(&partial));
    }

    #[test]
    fn test_catalog_from_json() {
        let json = serde_json::to_string(&CaseCatalog::builtin().cases).unwrap();
        let catalog = CaseCatalog::from_json(&json).unwrap();
        assert_eq!(catalog.len(), 3);
        assert_eq!(catalog.get("case-003").unwrap().difficulty, Difficulty::Hard);
    }

    #[test]
    fn test_catalog_rejects_foreign_solution() {
        let mut case = CaseCatalog::builtin().get("case-001").unwrap().clone();
        case.solution.weapon_id = "weapon-999".to_string();

        let err = CaseCatalog::new(vec![case]).unwrap_err();
        assert!(matches!(
            err,
            CaseError::UnknownSolutionEntity { axis: Axis::Weapon, .. }
        ));
    }

    #[test]
    fn test_catalog_rejects_duplicates() {
        let case = CaseCatalog::builtin().get("case-002").unwrap().clone();
        let err = CaseCatalog::new(vec![case.clone(), case]).unwrap_err();
        assert!(matches!(err, CaseError::DuplicateCase(id) if id == "case-002"));
    }

    #[test]
    fn test_catalog_rejects_wrong_axis_length() {
        let json = r#"[{
            "id": "case-x", "titleKey": "t", "difficulty": "easy",
            "suspects": [{"id": "s1", "nameKey": "n"}],
            "locations": [], "weapons": [],
            "solution": {"suspectId": "s1", "locationId": "l1", "weaponId": "w1"}
        }]"#;
        assert!(matches!(CaseCatalog::from_json(json), Err(CaseError::Json(_))));
    }
}
