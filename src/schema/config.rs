//! Configuration types for the structural side of an optimization run.

use serde::{Deserialize, Serialize};

/// Default number of row slices used to build generation 0.
fn default_row_slices() -> usize {
    7
}

/// Default number of column slices used to build generation 0.
fn default_column_slices() -> usize {
    14
}

/// Structural parameters of the cantilever plate.
///
/// The plate is `2 × 1` in size and is discretized into a grid of
/// `refinement_order` rows by `2 * refinement_order` columns of square
/// membrane elements. The left edge is clamped and the load is applied at the
/// middle of the right edge. With `fixed_corners`, a design must also reach
/// both corners of the clamped edge.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StructuralConfig {
    /// Number of element rows (columns are twice as many). Must be even.
    pub refinement_order: usize,
    /// Element thickness.
    pub thickness: f64,
    /// Poisson's ratio of the material.
    pub poisson_ratio: f64,
    /// Young's modulus of the material.
    pub young_modulus: f64,
    /// Magnitude of the downward load applied at the load point.
    pub load_magnitude: f64,
    /// Largest nodal displacement allowed before penalization kicks in.
    pub displacement_limit: f64,
    /// Initial weight of the displacement penalty (grows 1% per generation).
    pub penalty_weight: f64,
    /// Weight of material not connected to the load path.
    pub disconnected_area_weight: f64,
    /// Minimum thickness, in cells, of the blocks painted in generation 0.
    pub min_internal_thickness: usize,
    /// Number of horizontal slices of the generation 0 block graph.
    #[serde(default = "default_row_slices")]
    pub row_slices: usize,
    /// Number of vertical slices of the generation 0 block graph.
    #[serde(default = "default_column_slices")]
    pub column_slices: usize,
    /// Require the connected region to hold both corners of the clamped edge.
    #[serde(default)]
    pub fixed_corners: bool,
}

impl Default for StructuralConfig {
    fn default() -> Self {
        Self {
            refinement_order: 16,
            thickness: 0.1,
            poisson_ratio: 0.3,
            young_modulus: 210.0e9,
            load_magnitude: 1.0e5,
            displacement_limit: 5.0e-4,
            penalty_weight: 1000.0,
            disconnected_area_weight: 0.4,
            min_internal_thickness: 2,
            row_slices: default_row_slices(),
            column_slices: default_column_slices(),
            fixed_corners: false,
        }
    }
}

impl StructuralConfig {
    /// Number of rows of the design grid.
    #[inline]
    pub fn rows(&self) -> usize {
        self.refinement_order
    }

    /// Number of columns of the design grid.
    #[inline]
    pub fn cols(&self) -> usize {
        2 * self.refinement_order
    }

    /// Side length of one square element.
    #[inline]
    pub fn element_size(&self) -> f64 {
        1.0 / self.refinement_order as f64
    }

    /// Cell where the connectivity search starts (the loaded element).
    #[inline]
    pub fn start_cell(&self) -> (usize, usize) {
        (self.refinement_order / 2, self.cols() - 1)
    }

    /// Key identifying every parameter that cached fitness values depend on.
    ///
    /// Two configurations with the same key produce identical evaluations for
    /// identical chromosomes.
    pub fn scope_key(&self) -> String {
        format!(
            "n={};t={:e};v={:e};E={:e};P={:e};Dlim={:e};alfa0={:e};e={:e};corners={}",
            self.refinement_order,
            self.thickness,
            self.poisson_ratio,
            self.young_modulus,
            self.load_magnitude,
            self.displacement_limit,
            self.penalty_weight,
            self.disconnected_area_weight,
            self.fixed_corners,
        )
    }

    /// Validate configuration parameters.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.refinement_order % 2 != 0 {
            return Err(ConfigError::OddRefinementOrder(self.refinement_order));
        }
        if self.refinement_order < 8 {
            return Err(ConfigError::RefinementOrderTooSmall(self.refinement_order));
        }
        if self.thickness <= 0.0 || self.young_modulus <= 0.0 {
            return Err(ConfigError::InvalidMaterial);
        }
        if !(0.0..0.5).contains(&self.poisson_ratio) {
            return Err(ConfigError::InvalidPoissonRatio(self.poisson_ratio));
        }
        if self.displacement_limit <= 0.0 {
            return Err(ConfigError::InvalidDisplacementLimit);
        }
        if self.penalty_weight < 0.0 || self.disconnected_area_weight < 0.0 {
            return Err(ConfigError::NegativeWeight);
        }
        if self.min_internal_thickness == 0 || self.row_slices < 2 || self.column_slices == 0 {
            return Err(ConfigError::InvalidSlicing);
        }
        Ok(())
    }
}

/// Configuration validation errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Refinement order must be even, got {0}")]
    OddRefinementOrder(usize),
    #[error("Refinement order must be at least 8, got {0}")]
    RefinementOrderTooSmall(usize),
    #[error("Thickness and Young's modulus must be positive")]
    InvalidMaterial,
    #[error("Poisson's ratio must lie in [0, 0.5), got {0}")]
    InvalidPoissonRatio(f64),
    #[error("Displacement limit must be positive")]
    InvalidDisplacementLimit,
    #[error("Penalty weights must be non-negative")]
    NegativeWeight,
    #[error("Slicing needs a positive thickness, at least 2 row slices and 1 column slice")]
    InvalidSlicing,
    #[error(
        "Cannot split an interval of length {length} into {slices} slices of minimum length {min_length}"
    )]
    InfeasiblePartition {
        length: usize,
        slices: usize,
        min_length: usize,
    },
}
