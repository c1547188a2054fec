//! Construction options for row-matrix operators.
//!
//! This module provides the `RowMatrixOptions` struct, which controls how a
//! `BasicRowMatrix` labels itself, how it decides triangularity during the
//! numeric pass, and whether the general (four-map) constructor computes
//! constants immediately.

/// How the numeric pass decides whether an entry lies off the diagonal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TriangularityPolicy {
    /// Compare the entry's global column index with the row's global index.
    #[default]
    GlobalIndex,
    /// Compare the entry's position within the extracted row with the local
    /// row index. Only agrees with `GlobalIndex` when rows are extracted in
    /// column order starting at the diagonal; kept for callers whose
    /// triangular-solve dispatch was tuned against it.
    ExtractionPosition,
}

/// Row-matrix options.
#[derive(Debug, Clone)]
pub struct RowMatrixOptions {
    /// Operator label
    pub label: String,

    /// Triangularity detection policy
    pub triangularity: TriangularityPolicy,

    /// Run the structural and numeric passes inside the four-map constructor
    pub eager_constants: bool,
}

impl Default for RowMatrixOptions {
    fn default() -> Self {
        RowMatrixOptions {
            label: "distmat::BasicRowMatrix".to_string(),
            triangularity: TriangularityPolicy::default(),
            eager_constants: false,
        }
    }
}
