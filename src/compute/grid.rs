//! Binary occupancy grid used as chromosome and as phenotype region.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// A chromosome is a binary occupancy grid: `true` cells hold material.
pub type Chromosome = OccupancyGrid;

/// Row-major binary grid.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "GridRecord")]
pub struct OccupancyGrid {
    rows: usize,
    cols: usize,
    cells: Vec<bool>,
}

/// Serialized form of a grid, checked on load.
#[derive(Deserialize)]
struct GridRecord {
    rows: usize,
    cols: usize,
    cells: Vec<bool>,
}

impl TryFrom<GridRecord> for OccupancyGrid {
    type Error = GridShapeError;

    fn try_from(record: GridRecord) -> Result<Self, Self::Error> {
        let GridRecord { rows, cols, cells } = record;
        let found = cells.len();
        Self::from_cells(rows, cols, cells).ok_or(GridShapeError { rows, cols, found })
    }
}

/// Cell count does not match the grid shape.
#[derive(Debug, thiserror::Error)]
#[error("Grid of {rows}x{cols} cannot hold {found} cells")]
pub struct GridShapeError {
    pub rows: usize,
    pub cols: usize,
    pub found: usize,
}

impl OccupancyGrid {
    /// Create an empty grid.
    pub fn new(rows: usize, cols: usize) -> Self {
        Self {
            rows,
            cols,
            cells: vec![false; rows * cols],
        }
    }

    /// Create a grid with every cell filled.
    pub fn filled(rows: usize, cols: usize) -> Self {
        Self {
            rows,
            cols,
            cells: vec![true; rows * cols],
        }
    }

    /// Build a grid from row-major cells. Returns `None` on a size mismatch.
    pub fn from_cells(rows: usize, cols: usize, cells: Vec<bool>) -> Option<Self> {
        (cells.len() == rows * cols).then_some(Self { rows, cols, cells })
    }

    #[inline]
    pub fn rows(&self) -> usize {
        self.rows
    }

    #[inline]
    pub fn cols(&self) -> usize {
        self.cols
    }

    /// Grid dimensions as `(rows, cols)`.
    #[inline]
    pub fn shape(&self) -> (usize, usize) {
        (self.rows, self.cols)
    }

    /// Total number of cells.
    #[inline]
    pub fn len(&self) -> usize {
        self.cells.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Flat index of a cell.
    #[inline]
    pub fn index(&self, row: usize, col: usize) -> usize {
        row * self.cols + col
    }

    /// Whether `(row, col)` lies inside the grid.
    #[inline]
    pub fn contains(&self, row: usize, col: usize) -> bool {
        row < self.rows && col < self.cols
    }

    /// Cell value. Out-of-range coordinates read as empty.
    #[inline]
    pub fn get(&self, row: usize, col: usize) -> bool {
        self.contains(row, col) && self.cells[self.index(row, col)]
    }

    #[inline]
    pub fn set(&mut self, row: usize, col: usize, value: bool) {
        let idx = self.index(row, col);
        self.cells[idx] = value;
    }

    /// Invert the cell at a flat index.
    #[inline]
    pub fn flip_index(&mut self, idx: usize) {
        self.cells[idx] = !self.cells[idx];
    }

    /// Row-major cell values.
    #[inline]
    pub fn cells(&self) -> &[bool] {
        &self.cells
    }

    /// Fill the rectangle `rows × cols` (half-open ranges) with `value`.
    pub fn fill_block(
        &mut self,
        rows: std::ops::Range<usize>,
        cols: std::ops::Range<usize>,
        value: bool,
    ) {
        for row in rows {
            for col in cols.clone() {
                self.set(row, col, value);
            }
        }
    }

    /// Copy the rectangle `rows × cols` from `other` into `self`.
    pub fn copy_block_from(
        &mut self,
        other: &OccupancyGrid,
        rows: std::ops::Range<usize>,
        cols: std::ops::Range<usize>,
    ) {
        for row in rows {
            for col in cols.clone() {
                self.set(row, col, other.get(row, col));
            }
        }
    }

    /// Number of material cells.
    pub fn count(&self) -> usize {
        self.cells.iter().filter(|&&c| c).count()
    }

    /// Whether every material cell of `self` is also material in `other`.
    pub fn is_subset_of(&self, other: &OccupancyGrid) -> bool {
        self.shape() == other.shape()
            && self
                .cells
                .iter()
                .zip(&other.cells)
                .all(|(&a, &b)| !a || b)
    }

    /// Bit-packed byte pattern identifying the cell contents.
    ///
    /// Two grids of the same shape produce the same key iff their cells match.
    pub fn to_key(&self) -> Vec<u8> {
        let mut key = vec![0u8; self.cells.len().div_ceil(8)];
        for (i, _) in self.cells.iter().enumerate().filter(|(_, c)| **c) {
            key[i / 8] |= 1 << (i % 8);
        }
        key
    }
}

impl fmt::Display for OccupancyGrid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for row in 0..self.rows {
            if row > 0 {
                writeln!(f)?;
            }
            for col in 0..self.cols {
                f.write_str(if self.get(row, col) { "#" } else { "." })?;
            }
        }
        Ok(())
    }
}

/// Errors when parsing a grid from text.
#[derive(Debug, thiserror::Error)]
pub enum GridParseError {
    #[error("Grid has no rows")]
    Empty,
    #[error("Row {row} has {found} cells, expected {expected}")]
    RaggedRow {
        row: usize,
        found: usize,
        expected: usize,
    },
    #[error("Unexpected character {0:?} (use '#'/'1' for material, '.'/'0' for void)")]
    InvalidCell(char),
}

impl FromStr for OccupancyGrid {
    type Err = GridParseError;

    /// Parse one row per line; `#` or `1` is material, `.` or `0` is void.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lines: Vec<&str> = s
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .collect();
        let cols = lines.first().ok_or(GridParseError::Empty)?.chars().count();

        let mut cells = Vec::with_capacity(lines.len() * cols);
        for (row, line) in lines.iter().enumerate() {
            let found = line.chars().count();
            if found != cols {
                return Err(GridParseError::RaggedRow {
                    row,
                    found,
                    expected: cols,
                });
            }
            for c in line.chars() {
                cells.push(match c {
                    '#' | '1' => true,
                    '.' | '0' => false,
                    other => return Err(GridParseError::InvalidCell(other)),
                });
            }
        }

        Ok(Self {
            rows: lines.len(),
            cols,
            cells,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_and_display() {
        let grid: OccupancyGrid = "#..#\n.##.".parse().unwrap();
        assert_eq!(grid.shape(), (2, 4));
        assert!(grid.get(0, 0));
        assert!(!grid.get(0, 1));
        assert!(grid.get(1, 2));
        assert_eq!(grid.count(), 4);
        assert_eq!(grid.to_string(), "#..#\n.##.");
    }

    #[test]
    fn test_deserialize_checks_shape() {
        let grid: OccupancyGrid = "#.\n.#".parse().unwrap();
        let json = serde_json::to_string(&grid).unwrap();
        let parsed: OccupancyGrid = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, grid);

        let short = r#"{ "rows": 2, "cols": 3, "cells": [true, false, true] }"#;
        let err = serde_json::from_str::<OccupancyGrid>(short).unwrap_err();
        assert!(err.to_string().contains("cannot hold 3 cells"), "{err}");
    }

    #[test]
    fn test_ragged_rows_rejected() {
        let err = "##\n###".parse::<OccupancyGrid>().unwrap_err();
        assert!(matches!(err, GridParseError::RaggedRow { row: 1, .. }));
    }

    #[test]
    fn test_key_identifies_contents() {
        let a: OccupancyGrid = "1010\n0101\n1111".parse().unwrap();
        let mut b = a.clone();
        assert_eq!(a.to_key(), b.to_key());
        assert_eq!(a.to_key().len(), 2);

        b.flip_index(11);
        assert_ne!(a.to_key(), b.to_key());
    }

    #[test]
    fn test_out_of_range_reads_empty() {
        let grid = OccupancyGrid::filled(2, 2);
        assert!(grid.get(1, 1));
        assert!(!grid.get(2, 0));
        assert!(!grid.get(0, 2));
    }

    #[test]
    fn test_blocks_and_subset() {
        let mut grid = OccupancyGrid::new(4, 4);
        grid.fill_block(1..3, 0..2, true);
        assert_eq!(grid.count(), 4);

        let full = OccupancyGrid::filled(4, 4);
        assert!(grid.is_subset_of(&full));
        assert!(!full.is_subset_of(&grid));

        let mut copy = OccupancyGrid::new(4, 4);
        copy.copy_block_from(&full, 0..1, 0..4);
        assert_eq!(copy.count(), 4);
        assert!(copy.get(0, 3));
    }
}
