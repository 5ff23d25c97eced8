//! Level documents as served by the remote level store.
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

use crate::constants::LEVEL_ID_PREFIX;

/// A single grid square. `value` is set for the numbered checkpoints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Cell {
    pub x: u32,
    pub y: u32,
    #[serde(default)]
    pub value: Option<u32>,
}

impl Cell {
    #[must_use]
    pub const fn blank(x: u32, y: u32) -> Self {
        Self { x, y, value: None }
    }

    #[must_use]
    pub const fn numbered(x: u32, y: u32, value: u32) -> Self {
        Self {
            x,
            y,
            value: Some(value),
        }
    }

    #[must_use]
    pub const fn position(&self) -> (u32, u32) {
        (self.x, self.y)
    }

    /// Orthogonal neighbours only; diagonals never count.
    #[must_use]
    pub const fn is_adjacent(&self, other: &Self) -> bool {
        let dx = self.x.abs_diff(other.x);
        let dy = self.y.abs_diff(other.y);
        (dx == 1 && dy == 0) || (dx == 0 && dy == 1)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    Easy,
    #[default]
    Medium,
    Hard,
    Expert,
    #[serde(other)]
    Unknown,
}

/// Rows of cells, indexed `grid[y][x]`.
pub type Grid = Vec<Vec<Cell>>;

/// An authored puzzle. Immutable once fetched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Level {
    pub id: String,
    #[serde(default)]
    pub difficulty: Difficulty,
    pub grid_size: u32,
    pub grid: Grid,
    #[serde(default)]
    pub solution: Vec<Cell>,
}

impl Level {
    /// Sequence number parsed from the id, or `fallback` when the id carries none.
    #[must_use]
    pub fn level_number_or(&self, fallback: u32) -> u32 {
        parse_level_number(&self.id).unwrap_or(fallback)
    }

    #[must_use]
    pub fn cell_at(&self, x: u32, y: u32) -> Option<&Cell> {
        let row = self.grid.get(usize::try_from(y).ok()?)?;
        row.get(usize::try_from(x).ok()?)
    }

    /// Largest numbered value in the grid, `None` for an unnumbered grid.
    #[must_use]
    pub fn max_value(&self) -> Option<u32> {
        max_value(&self.grid)
    }

    #[must_use]
    pub fn find_value(&self, value: u32) -> Option<&Cell> {
        self.grid
            .iter()
            .flatten()
            .find(|cell| cell.value == Some(value))
    }

    /// Check that the grid is square, matches `grid_size`, and that every cell
    /// sits at the coordinates it claims.
    #[must_use]
    pub fn validate_shape(&self) -> bool {
        let Ok(size) = usize::try_from(self.grid_size) else {
            return false;
        };
        if size == 0 || self.grid.len() != size {
            return false;
        }
        self.grid.iter().enumerate().all(|(y, row)| {
            row.len() == size
                && row.iter().enumerate().all(|(x, cell)| {
                    usize::try_from(cell.x).is_ok_and(|cx| cx == x)
                        && usize::try_from(cell.y).is_ok_and(|cy| cy == y)
                })
        })
    }

    /// Whether the authored solution passes the path validator.
    #[must_use]
    pub fn has_valid_solution(&self) -> bool {
        crate::validator::validate_path(&self.grid, &self.solution)
    }
}

/// Largest numbered value among the cells of `grid`.
#[must_use]
pub fn max_value(grid: &Grid) -> Option<u32> {
    grid.iter().flatten().filter_map(|cell| cell.value).max()
}

fn digits_pattern() -> Option<&'static Regex> {
    static DIGITS: OnceLock<Option<Regex>> = OnceLock::new();
    DIGITS.get_or_init(|| Regex::new(r"\d+").ok()).as_ref()
}

/// Extract the sequence number from an id such as `level_12`.
///
/// The first run of decimal digits anywhere in the id is used, leading zeros
/// are accepted, and ids without digits (or that overflow) yield `None`.
#[must_use]
pub fn parse_level_number(id: &str) -> Option<u32> {
    let found = digits_pattern()?.find(id)?;
    found.as_str().parse().ok()
}

/// Canonical id for a level number.
#[must_use]
pub fn level_id(number: u32) -> String {
    format!("{LEVEL_ID_PREFIX}{number}")
}

/// Highest sequence number among `ids`, ignoring ids that fail to parse.
#[must_use]
pub fn highest_level_number<'a, I>(ids: I) -> u32
where
    I: IntoIterator<Item = &'a String>,
{
    ids.into_iter()
        .filter_map(|id| parse_level_number(id))
        .max()
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_by_two() -> Level {
        Level {
            id: "level_7".to_string(),
            difficulty: Difficulty::Easy,
            grid_size: 2,
            grid: vec![
                vec![Cell::numbered(0, 0, 1), Cell::blank(1, 0)],
                vec![Cell::numbered(0, 1, 2), Cell::blank(1, 1)],
            ],
            solution: vec![
                Cell::numbered(0, 0, 1),
                Cell::blank(1, 0),
                Cell::blank(1, 1),
                Cell::numbered(0, 1, 2),
            ],
        }
    }

    #[test]
    fn parses_level_numbers_leniently() {
        assert_eq!(parse_level_number("level_12"), Some(12));
        assert_eq!(parse_level_number("level_007"), Some(7));
        assert_eq!(parse_level_number("bonus-3-extra"), Some(3));
        assert_eq!(parse_level_number("level_"), None);
        assert_eq!(parse_level_number(""), None);
        assert_eq!(parse_level_number("level_99999999999"), None);
    }

    #[test]
    fn highest_level_ignores_garbage() {
        let ids = vec![
            "level_3".to_string(),
            "oops".to_string(),
            "level_010".to_string(),
        ];
        assert_eq!(highest_level_number(&ids), 10);
        assert_eq!(highest_level_number(&Vec::<String>::new()), 0);
    }

    #[test]
    fn level_number_falls_back_to_position() {
        let mut level = two_by_two();
        assert_eq!(level.level_number_or(99), 7);
        level.id = "mystery".to_string();
        assert_eq!(level.level_number_or(99), 99);
    }

    #[test]
    fn grid_helpers_find_cells() {
        let level = two_by_two();
        assert_eq!(level.max_value(), Some(2));
        assert_eq!(level.find_value(2), Some(&Cell::numbered(0, 1, 2)));
        assert_eq!(level.cell_at(1, 1), Some(&Cell::blank(1, 1)));
        assert!(level.cell_at(2, 0).is_none());
        assert!(level.validate_shape());
        assert!(level.has_valid_solution());
    }

    #[test]
    fn shape_rejects_ragged_grids() {
        let mut level = two_by_two();
        level.grid[1].pop();
        assert!(!level.validate_shape());
    }

    #[test]
    fn deserializes_remote_document() {
        let json = r#"{
            "id": "level_1",
            "difficulty": "nightmare",
            "gridSize": 1,
            "grid": [[{ "x": 0, "y": 0, "value": 1 }]],
            "solution": [{ "x": 0, "y": 0, "value": 1 }]
        }"#;
        let level: Level = serde_json::from_str(json).unwrap();
        assert_eq!(level.difficulty, Difficulty::Unknown);
        assert_eq!(level.grid_size, 1);
        assert!(level.has_valid_solution());
    }

    #[test]
    fn adjacency_is_orthogonal() {
        let origin = Cell::blank(1, 1);
        assert!(origin.is_adjacent(&Cell::blank(1, 2)));
        assert!(origin.is_adjacent(&Cell::blank(0, 1)));
        assert!(!origin.is_adjacent(&Cell::blank(2, 2)));
        assert!(!origin.is_adjacent(&origin));
    }
}
