//! Hamiltonian path validation and the live trace the player drags.
//!
//! [`validate_path`] is pure and linear in the number of cells, so callers may
//! run it after every pointer step.

use std::collections::{HashMap, HashSet};

use crate::level::{Cell, Grid, max_value};

/// Decide whether `path` is a winning solution for `grid`.
///
/// The path must cover every cell exactly once, start on `1`, end on the
/// grid's highest numbered value, pass the numbered cells in ascending order
/// and only ever step between orthogonal neighbours. Numbers are read from the
/// grid, so a path cell carrying a stale or forged value cannot change the
/// outcome, and cells outside the grid are rejected.
#[must_use]
pub fn validate_path(grid: &Grid, path: &[Cell]) -> bool {
    let Some(last) = path.last() else {
        return false;
    };
    let size = grid.len();
    if size == 0 || path.len() != size * size {
        return false;
    }

    let mut seen = HashSet::with_capacity(path.len());
    if !path.iter().all(|cell| seen.insert(cell.position())) {
        return false;
    }

    let Some(values) = path
        .iter()
        .map(|cell| value_in_grid(grid, cell))
        .collect::<Option<Vec<_>>>()
    else {
        return false;
    };

    if values[0] != Some(1) {
        return false;
    }
    let Some(terminal) = max_value(grid) else {
        return false;
    };
    if value_in_grid(grid, last).flatten() != Some(terminal) {
        return false;
    }

    let index_of: HashMap<u32, usize> = values
        .iter()
        .enumerate()
        .filter_map(|(index, value)| value.map(|v| (v, index)))
        .collect();
    let mut previous: Option<usize> = None;
    for value in 1..=terminal {
        let Some(&index) = index_of.get(&value) else {
            return false;
        };
        if previous.is_some_and(|prev| index <= prev) {
            return false;
        }
        previous = Some(index);
    }

    path.windows(2).all(|pair| pair[0].is_adjacent(&pair[1]))
}

/// Value of the grid cell at `cell`'s coordinates; `None` when off the grid.
fn value_in_grid(grid: &Grid, cell: &Cell) -> Option<Option<u32>> {
    let row = grid.get(usize::try_from(cell.y).ok()?)?;
    row.get(usize::try_from(cell.x).ok()?).map(|c| c.value)
}

/// Result of feeding one cell into a [`Trace`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TraceStep {
    Started,
    Extended,
    /// The player re-entered an earlier cell; everything after it was dropped.
    Backtracked { removed: usize },
    Rejected(TraceRejection),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TraceRejection {
    OffGrid,
    MustStartAtOne,
    NotAdjacent,
    /// A numbered cell was entered before its predecessor.
    OutOfOrder { expected: u32, found: u32 },
}

/// The in-progress path, edited as the pointer moves.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Trace {
    cells: Vec<Cell>,
}

impl Trace {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn cells(&self) -> &[Cell] {
        &self.cells
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.cells.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// The numbered value the trace must reach next.
    #[must_use]
    pub fn next_expected_value(&self) -> u32 {
        self.cells
            .iter()
            .filter_map(|cell| cell.value)
            .max()
            .map_or(1, |v| v + 1)
    }

    /// Feed the cell under the pointer at `(x, y)`.
    pub fn extend(&mut self, grid: &Grid, x: u32, y: u32) -> TraceStep {
        let Some(cell) = usize::try_from(y)
            .ok()
            .and_then(|row| grid.get(row))
            .zip(usize::try_from(x).ok())
            .and_then(|(row, col)| row.get(col))
            .copied()
        else {
            return TraceStep::Rejected(TraceRejection::OffGrid);
        };

        if let Some(index) = self.cells.iter().position(|c| c.position() == (x, y)) {
            let removed = self.cells.len() - index - 1;
            self.cells.truncate(index + 1);
            return TraceStep::Backtracked { removed };
        }

        let Some(tail) = self.cells.last() else {
            if cell.value != Some(1) {
                return TraceStep::Rejected(TraceRejection::MustStartAtOne);
            }
            self.cells.push(cell);
            return TraceStep::Started;
        };

        if !tail.is_adjacent(&cell) {
            return TraceStep::Rejected(TraceRejection::NotAdjacent);
        }
        if let Some(found) = cell.value {
            let expected = self.next_expected_value();
            if found != expected {
                return TraceStep::Rejected(TraceRejection::OutOfOrder { expected, found });
            }
        }
        self.cells.push(cell);
        TraceStep::Extended
    }

    pub fn undo(&mut self) -> Option<Cell> {
        self.cells.pop()
    }

    pub fn clear(&mut self) {
        self.cells.clear();
    }

    #[must_use]
    pub fn is_solution(&self, grid: &Grid) -> bool {
        validate_path(grid, &self.cells)
    }
}
