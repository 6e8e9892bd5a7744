//! Phenotype extraction: connectivity search and mesh construction.
//!
//! Starting from the loaded cell, [`extract`] walks the material of a
//! chromosome depth-first and returns the 4-connected region reachable from
//! it, whether that region touches the support column (column 0), and the
//! finite-element mesh of the region. All three are produced by a single
//! traversal: every visited cell is emitted as a mesh element at the moment
//! it is marked.
//!
//! The walk descends vertically through unvisited material, then climbs from
//! the cell above the top of the run, then resumes from the most recently
//! discovered horizontal branch. Branches live on an explicit stack so large
//! grids never recurse.

use serde::{Deserialize, Serialize};

use super::grid::{Chromosome, OccupancyGrid};
use super::mesh::Mesh;

/// Result of extracting the phenotype of a chromosome.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Phenotype {
    /// Material cells 4-connected to the start cell.
    pub region: OccupancyGrid,
    /// Whether the region contains a cell of column 0.
    pub boundary_reached: bool,
    /// Mesh with one element per region cell, in visiting order.
    pub mesh: Mesh,
}

impl Phenotype {
    /// Number of cells in the region.
    pub fn area_cells(&self) -> usize {
        self.mesh.element_count()
    }
}

/// Direction of the move that brought the walk into the current cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Move {
    Down,
    Up,
    Left,
    Right,
}

/// Deferred horizontal neighbour, with the side it lies on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Branch {
    row: usize,
    col: usize,
    side: Move,
}

struct Walker<'a> {
    chromosome: &'a Chromosome,
    region: OccupancyGrid,
    mesh: Mesh,
    branches: Vec<Branch>,
    boundary_reached: bool,
    last_move: Option<Move>,
}

impl<'a> Walker<'a> {
    /// Material that the walk has not entered yet.
    #[inline]
    fn is_open(&self, row: usize, col: usize) -> bool {
        self.chromosome.get(row, col) && !self.region.get(row, col)
    }

    fn push_branch(&mut self, row: usize, col: usize, side: Move) {
        let branch = Branch { row, col, side };
        if !self.branches.contains(&branch) {
            self.branches.push(branch);
        }
    }

    fn visit(&mut self, row: usize, col: usize) {
        if self.last_move != Some(Move::Left)
            && col + 1 < self.chromosome.cols()
            && self.is_open(row, col + 1)
        {
            self.push_branch(row, col + 1, Move::Right);
        }

        if col == 0 {
            self.boundary_reached = true;
        } else if self.last_move != Some(Move::Right) && self.is_open(row, col - 1) {
            self.push_branch(row, col - 1, Move::Left);
        }

        self.region.set(row, col, true);
        self.mesh.push_element(row, col);
        self.branches.retain(|b| (b.row, b.col) != (row, col));
    }

    fn run(&mut self, start: (usize, usize)) {
        let (mut row, mut col) = start;

        loop {
            let top = row;

            // descend
            loop {
                self.visit(row, col);
                if row + 1 < self.chromosome.rows() && self.is_open(row + 1, col) {
                    row += 1;
                    self.last_move = Some(Move::Down);
                } else {
                    break;
                }
            }

            // climb from above the top of the run
            if top > 0 && self.is_open(top - 1, col) {
                row = top - 1;
                self.last_move = Some(Move::Up);
                loop {
                    self.visit(row, col);
                    if row > 0 && self.is_open(row - 1, col) {
                        row -= 1;
                    } else {
                        break;
                    }
                }
            }

            match self.branches.pop() {
                Some(branch) => {
                    row = branch.row;
                    col = branch.col;
                    self.last_move = Some(branch.side);
                }
                None => break,
            }
        }
    }
}

/// Extract the region reachable from `start` and build its mesh.
///
/// `element_size` is the side of one square cell; node coordinates are
/// `x = col · l` and `y = (rows − row) · l`. A start cell without material
/// yields an empty region and mesh.
pub fn extract(chromosome: &Chromosome, start: (usize, usize), element_size: f64) -> Phenotype {
    let (rows, cols) = chromosome.shape();
    let mut walker = Walker {
        chromosome,
        region: OccupancyGrid::new(rows, cols),
        mesh: Mesh::new(rows, element_size),
        branches: Vec::new(),
        boundary_reached: false,
        last_move: None,
    };

    if chromosome.get(start.0, start.1) {
        walker.run(start);
    }

    Phenotype {
        region: walker.region,
        boundary_reached: walker.boundary_reached,
        mesh: walker.mesh,
    }
}
