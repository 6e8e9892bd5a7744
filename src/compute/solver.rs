//! Linear static analysis of membrane meshes.
//!
//! The [`StructuralSolver`] trait is the seam between the evolutionary core
//! and the finite-element analysis. [`PlaneStressSolver`] is the bundled
//! implementation: bilinear square elements under plane stress, dense global
//! assembly and a Cholesky solve of the free block.

use nalgebra::{DMatrix, DVector, Matrix3, SMatrix};
use serde::{Deserialize, Serialize};

use super::mesh::{Mesh, NodeLabel};

/// 8×8 stiffness matrix of one square element.
pub type ElementStiffness = SMatrix<f64, 8, 8>;

/// Geometry and material shared by every element of a mesh.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ElementParameters {
    /// Side of the square element.
    pub size: f64,
    pub thickness: f64,
    pub poisson_ratio: f64,
    pub young_modulus: f64,
}

/// Point load applied at a node.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NodalLoad {
    pub label: NodeLabel,
    pub fx: f64,
    pub fy: f64,
}

/// Supports and loads, expressed with node labels.
///
/// Support labels absent from the mesh are ignored; load labels absent from
/// the mesh are an error.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BoundaryConditions {
    /// Nodes with both displacements clamped to zero.
    pub clamped: Vec<NodeLabel>,
    pub loads: Vec<NodalLoad>,
}

/// Nodal force and displacement vectors, two entries per node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StructuralSolution {
    /// Applied loads on free DOFs and support reactions on clamped DOFs.
    pub force: Vec<f64>,
    pub displacement: Vec<f64>,
}

/// Structural analysis errors.
#[derive(Debug, thiserror::Error)]
pub enum SolverError {
    #[error("Mesh has no elements")]
    EmptyMesh,
    #[error("Load applied at node {0:?}, which is not part of the mesh")]
    MissingLoadNode(NodeLabel),
    #[error("Stiffness matrix is singular ({free_dofs} free DOFs); check supports")]
    Singular { free_dofs: usize },
}

/// Structural solver used by the fitness evaluation.
pub trait StructuralSolver: Send + Sync {
    fn solve(
        &self,
        mesh: &Mesh,
        parameters: &ElementParameters,
        conditions: &BoundaryConditions,
    ) -> Result<StructuralSolution, SolverError>;
}

/// Relative pivot size under which the free block is treated as singular.
const SINGULAR_PIVOT_TOLERANCE: f64 = 1e-10;

/// Plane-stress solver for square bilinear membranes.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlaneStressSolver;

impl PlaneStressSolver {
    pub fn new() -> Self {
        Self
    }

    /// Assemble the global stiffness matrix from the mesh DOF map.
    pub fn assemble(mesh: &Mesh, ke: &ElementStiffness) -> DMatrix<f64> {
        let n = mesh.dof_count();
        let mut k = DMatrix::zeros(n, n);
        for dofs in mesh.dof_map() {
            for (a, &p) in dofs.iter().enumerate() {
                for (b, &q) in dofs.iter().enumerate() {
                    k[(p, q)] += ke[(a, b)];
                }
            }
        }
        k
    }
}

/// Stiffness of a square bilinear membrane under plane stress.
///
/// Corners are ordered upper-left, upper-right, lower-right, lower-left with
/// DOFs `(u_x, u_y)` per corner. Integrated with 2×2 Gauss quadrature, which
/// is exact for this element.
pub fn element_stiffness(parameters: &ElementParameters) -> ElementStiffness {
    let ElementParameters {
        size: l,
        thickness: t,
        poisson_ratio: nu,
        young_modulus: e,
    } = *parameters;

    let d = Matrix3::new(
        1.0,
        nu,
        0.0,
        nu,
        1.0,
        0.0,
        0.0,
        0.0,
        (1.0 - nu) / 2.0,
    ) * (e / (1.0 - nu * nu));

    // Natural coordinates of ul, ur, dr, dl (y points up).
    const CORNERS: [(f64, f64); 4] = [(-1.0, 1.0), (1.0, 1.0), (1.0, -1.0), (-1.0, -1.0)];
    let g = 1.0 / 3f64.sqrt();
    let det_j = l * l / 4.0;

    let mut k = ElementStiffness::zeros();
    for (xi, eta) in [(-g, -g), (g, -g), (g, g), (-g, g)] {
        let mut b = SMatrix::<f64, 3, 8>::zeros();
        for (i, &(xi_i, eta_i)) in CORNERS.iter().enumerate() {
            let dn_dx = 0.25 * xi_i * (1.0 + eta * eta_i) * 2.0 / l;
            let dn_dy = 0.25 * eta_i * (1.0 + xi * xi_i) * 2.0 / l;
            b[(0, 2 * i)] = dn_dx;
            b[(1, 2 * i + 1)] = dn_dy;
            b[(2, 2 * i)] = dn_dy;
            b[(2, 2 * i + 1)] = dn_dx;
        }
        k += b.transpose() * d * b * (t * det_j);
    }
    k
}

impl StructuralSolver for PlaneStressSolver {
    fn solve(
        &self,
        mesh: &Mesh,
        parameters: &ElementParameters,
        conditions: &BoundaryConditions,
    ) -> Result<StructuralSolution, SolverError> {
        if mesh.is_empty() {
            return Err(SolverError::EmptyMesh);
        }

        let n = mesh.dof_count();
        let k = Self::assemble(mesh, &element_stiffness(parameters));

        let mut clamped = vec![false; n];
        for &label in &conditions.clamped {
            if let Some(node) = mesh.node_index(label) {
                clamped[2 * node] = true;
                clamped[2 * node + 1] = true;
            }
        }

        let mut applied = DVector::zeros(n);
        for load in &conditions.loads {
            let node = mesh
                .node_index(load.label)
                .ok_or(SolverError::MissingLoadNode(load.label))?;
            applied[2 * node] += load.fx;
            applied[2 * node + 1] += load.fy;
        }

        let free: Vec<usize> = (0..n).filter(|&i| !clamped[i]).collect();
        let nf = free.len();

        let mut u = DVector::zeros(n);
        if nf > 0 {
            let k_ff = DMatrix::from_fn(nf, nf, |i, j| k[(free[i], free[j])]);
            let f_f = DVector::from_fn(nf, |i, _| applied[free[i]]);

            let max_diag = k_ff.diagonal().max();
            let chol = k_ff
                .cholesky()
                .ok_or(SolverError::Singular { free_dofs: nf })?;
            let l = chol.l_dirty();
            if (0..nf).any(|i| l[(i, i)] * l[(i, i)] <= SINGULAR_PIVOT_TOLERANCE * max_diag) {
                return Err(SolverError::Singular { free_dofs: nf });
            }

            let u_f = chol.solve(&f_f);
            for (i, &dof) in free.iter().enumerate() {
                u[dof] = u_f[i];
            }
        }

        let reactions = &k * &u;
        let force = (0..n)
            .map(|i| if clamped[i] { reactions[i] } else { applied[i] })
            .collect();

        Ok(StructuralSolution {
            force,
            displacement: u.iter().copied().collect(),
        })
    }
}
