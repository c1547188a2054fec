//! Generic distributed row-matrix operator.
//!
//! `BasicRowMatrix` turns any [`RowAccessor`] into a distributed operator. It
//! owns the four maps, the importer (domain -> column map) and exporter
//! (row map -> range map), the derived constants, and the multiply scratch
//! vectors. Everything it computes goes through the accessor one row at a
//! time, so it never needs to know how entries are stored.
//!
//! # Collective protocol
//!
//! Construction, the structural and numeric passes, and every operation
//! taking a vector are collective over the row map's communicator. All ranks
//! must issue them in the same order: construction, then (optionally) the
//! structural pass, then (optionally) the numeric pass, then any sequence of
//! scaling, diagonal, inverse-sum, and multiply calls. An error returned on
//! one rank only is the caller's to mirror on the others.
//!
//! # Staleness
//!
//! Nonzero counts reflect the last structural pass and norms the last numeric
//! pass. After mutating the storage through [`accessor_mut`](BasicRowMatrix::accessor_mut)
//! or scaling, call [`compute_structure_constants`](BasicRowMatrix::compute_structure_constants)
//! and/or [`compute_numeric_constants`](BasicRowMatrix::compute_numeric_constants) again.

mod constants;
mod multiply;
mod scaling;

pub use scaling::SumStatus;

use std::cell::RefCell;

use bitflags::bitflags;
use log::debug;

use crate::config::RowMatrixOptions;
use crate::core::multivector::MultiVector;
use crate::core::traits::{LinearOperator, RowAccessor};
use crate::error::MatError;
use crate::map::{BlockMap, Redistributor};
use crate::parallel::Comm;
use crate::utils::FlopCounter;

bitflags! {
    #[derive(Copy, Clone, Debug, PartialEq, Eq)]
    pub struct MatrixProperties: u32 {
        const LOWER_TRIANGULAR = 0b001;
        const UPPER_TRIANGULAR = 0b010;
        const HAS_NORM_INF     = 0b100;
        /// Set by a successful structural pass.
        const HAS_STRUCTURE    = 0b1000;
    }
}

/// Import/export buffers reused across multiply calls. Reallocated only when
/// the vector count changes.
struct Scratch<C: Comm> {
    import: Option<MultiVector<C>>,
    export: Option<MultiVector<C>>,
}

pub struct BasicRowMatrix<A, C: Comm> {
    accessor: A,
    comm: C,

    row_map: BlockMap<C>,
    col_map: BlockMap<C>,
    domain_map: BlockMap<C>,
    range_map: BlockMap<C>,
    importer: Option<Redistributor<C>>,
    exporter: Option<Redistributor<C>>,

    num_my_rows: usize,
    num_my_cols: usize,
    num_my_nonzeros: usize,
    num_global_nonzeros: usize,
    max_num_entries: usize,

    norm_inf: f64,
    norm_one: f64,
    properties: MatrixProperties,

    use_transpose: bool,
    options: RowMatrixOptions,
    // not part of the mathematical state; makes the type !Sync
    scratch: RefCell<Scratch<C>>,
    flops: FlopCounter,
}

impl<A: RowAccessor, C: Comm> BasicRowMatrix<A, C> {
    /// Square operator: domain and range are the row map. Runs the
    /// structural and numeric passes before returning. Collective.
    pub fn new(accessor: A, row_map: BlockMap<C>, col_map: BlockMap<C>) -> Result<Self, MatError> {
        let mut m = Self::assemble(
            accessor,
            row_map.clone(),
            col_map,
            row_map.clone(),
            row_map,
            RowMatrixOptions::default(),
        )?;
        m.compute_structure_constants()?;
        m.compute_numeric_constants()?;
        Ok(m)
    }

    /// General operator from domain to range. Constants stay zero until the
    /// caller runs the passes, so storage can finish initializing first.
    /// Collective.
    pub fn with_maps(
        accessor: A,
        row_map: BlockMap<C>,
        col_map: BlockMap<C>,
        domain_map: BlockMap<C>,
        range_map: BlockMap<C>,
    ) -> Result<Self, MatError> {
        Self::with_options(accessor, row_map, col_map, domain_map, range_map, RowMatrixOptions::default())
    }

    /// Like [`with_maps`](Self::with_maps); runs both passes when
    /// `options.eager_constants` is set. Collective.
    pub fn with_options(
        accessor: A,
        row_map: BlockMap<C>,
        col_map: BlockMap<C>,
        domain_map: BlockMap<C>,
        range_map: BlockMap<C>,
        options: RowMatrixOptions,
    ) -> Result<Self, MatError> {
        let eager = options.eager_constants;
        let mut m = Self::assemble(accessor, row_map, col_map, domain_map, range_map, options)?;
        if eager {
            m.compute_structure_constants()?;
            m.compute_numeric_constants()?;
        }
        Ok(m)
    }

    fn assemble(
        accessor: A,
        row_map: BlockMap<C>,
        col_map: BlockMap<C>,
        domain_map: BlockMap<C>,
        range_map: BlockMap<C>,
        options: RowMatrixOptions,
    ) -> Result<Self, MatError> {
        let comm = row_map.comm().dup();

        let exporter = if row_map.same_as(&range_map) {
            None
        } else {
            Some(Redistributor::export(&row_map, &range_map)?)
        };
        let importer = if col_map.same_as(&domain_map) {
            None
        } else {
            Some(Redistributor::import(&domain_map, &col_map)?)
        };
        debug!(
            "{}: rank {}/{}: {} rows, {} cols, importer: {}, exporter: {}",
            options.label,
            comm.rank(),
            comm.size(),
            row_map.num_my_elements(),
            col_map.num_my_elements(),
            importer.is_some(),
            exporter.is_some()
        );

        Ok(BasicRowMatrix {
            accessor,
            comm,
            num_my_rows: row_map.num_my_elements(),
            num_my_cols: col_map.num_my_elements(),
            row_map,
            col_map,
            domain_map,
            range_map,
            importer,
            exporter,
            num_my_nonzeros: 0,
            num_global_nonzeros: 0,
            max_num_entries: 0,
            norm_inf: 0.0,
            norm_one: 0.0,
            properties: MatrixProperties::LOWER_TRIANGULAR
                | MatrixProperties::UPPER_TRIANGULAR
                | MatrixProperties::HAS_NORM_INF,
            use_transpose: false,
            options,
            scratch: RefCell::new(Scratch { import: None, export: None }),
            flops: FlopCounter::new(),
        })
    }

    pub fn accessor(&self) -> &A {
        &self.accessor
    }

    /// Mutable storage access. Constants are not refreshed automatically.
    pub fn accessor_mut(&mut self) -> &mut A {
        &mut self.accessor
    }

    pub fn into_accessor(self) -> A {
        self.accessor
    }

    /// The operator's own communicator handle, duplicated at construction.
    pub fn comm(&self) -> &C {
        &self.comm
    }

    pub fn row_matrix_row_map(&self) -> &BlockMap<C> {
        &self.row_map
    }

    pub fn row_matrix_col_map(&self) -> &BlockMap<C> {
        &self.col_map
    }

    pub fn importer(&self) -> Option<&Redistributor<C>> {
        self.importer.as_ref()
    }

    pub fn exporter(&self) -> Option<&Redistributor<C>> {
        self.exporter.as_ref()
    }

    pub fn num_my_rows(&self) -> usize {
        self.num_my_rows
    }

    pub fn num_my_cols(&self) -> usize {
        self.num_my_cols
    }

    pub fn num_global_rows(&self) -> usize {
        self.range_map.num_global_elements()
    }

    pub fn num_global_cols(&self) -> usize {
        self.domain_map.num_global_elements()
    }

    pub fn num_my_nonzeros(&self) -> usize {
        self.num_my_nonzeros
    }

    pub fn num_global_nonzeros(&self) -> usize {
        self.num_global_nonzeros
    }

    /// Widest local row.
    pub fn max_num_entries(&self) -> usize {
        self.max_num_entries
    }

    pub fn norm_one(&self) -> f64 {
        self.norm_one
    }

    pub fn properties(&self) -> MatrixProperties {
        self.properties
    }

    /// Whether a structural pass has completed.
    pub fn has_structure(&self) -> bool {
        self.properties.contains(MatrixProperties::HAS_STRUCTURE)
    }

    /// Valid after a numeric pass; local to this rank.
    pub fn lower_triangular(&self) -> bool {
        self.properties.contains(MatrixProperties::LOWER_TRIANGULAR)
    }

    /// Valid after a numeric pass; local to this rank.
    pub fn upper_triangular(&self) -> bool {
        self.properties.contains(MatrixProperties::UPPER_TRIANGULAR)
    }

    pub fn options(&self) -> &RowMatrixOptions {
        &self.options
    }

    pub fn set_label(&mut self, label: impl Into<String>) {
        self.options.label = label.into();
    }

    pub fn flops(&self) -> f64 {
        self.flops.flops()
    }

    pub fn reset_flops(&self) {
        self.flops.reset()
    }

    /// Copies local row `my_row` into the buffers, checking that every
    /// returned column index lies inside the column map.
    fn extract_row(&self, my_row: usize, values: &mut [f64], indices: &mut [usize]) -> Result<usize, MatError> {
        let n = self.accessor.extract_my_row_copy(my_row, values, indices)?;
        let provided = values.len().min(indices.len());
        if n > provided {
            return Err(MatError::InsufficientBuffer { required: n, provided });
        }
        if let Some(&column) = indices[..n].iter().find(|&&c| c >= self.num_my_cols) {
            return Err(MatError::ColumnOutOfRange { column, num_cols: self.num_my_cols });
        }
        Ok(n)
    }

    fn row_buffers(&self) -> (Vec<f64>, Vec<usize>) {
        (vec![0.0; self.max_num_entries], vec![0; self.max_num_entries])
    }
}

impl<A: RowAccessor, C: Comm> LinearOperator<C> for BasicRowMatrix<A, C> {
    fn apply(&self, x: &MultiVector<C>, y: &mut MultiVector<C>) -> Result<(), MatError> {
        self.multiply(self.use_transpose, x, y)
    }

    fn apply_transpose(&self, x: &MultiVector<C>, y: &mut MultiVector<C>) -> Result<(), MatError> {
        self.multiply(!self.use_transpose, x, y)
    }

    fn set_use_transpose(&mut self, use_transpose: bool) {
        self.use_transpose = use_transpose;
    }

    fn use_transpose(&self) -> bool {
        self.use_transpose
    }

    fn operator_domain_map(&self) -> &BlockMap<C> {
        &self.domain_map
    }

    fn operator_range_map(&self) -> &BlockMap<C> {
        &self.range_map
    }

    fn norm_inf(&self) -> f64 {
        self.norm_inf
    }

    fn has_norm_inf(&self) -> bool {
        self.properties.contains(MatrixProperties::HAS_NORM_INF)
    }

    fn label(&self) -> &str {
        &self.options.label
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TriangularityPolicy;
    use crate::matrix::CsrMatrix;
    use crate::parallel::SerialComm;

    fn tridiag(n: usize) -> CsrMatrix {
        let rows: Vec<Vec<(usize, f64)>> = (0..n)
            .map(|i| {
                let mut row = Vec::new();
                if i > 0 {
                    row.push((i - 1, -1.0));
                }
                row.push((i, 2.0));
                if i + 1 < n {
                    row.push((i + 1, -1.0));
                }
                row
            })
            .collect();
        CsrMatrix::from_rows(n, &rows).unwrap()
    }

    /// Fails on one chosen row.
    struct Faulty {
        inner: CsrMatrix,
        bad_row: usize,
    }

    impl RowAccessor for Faulty {
        fn num_my_row_entries(&self, my_row: usize) -> Result<usize, MatError> {
            if my_row == self.bad_row {
                return Err(MatError::RowOutOfRange { row: my_row, num_rows: 0 });
            }
            self.inner.num_my_row_entries(my_row)
        }
        fn extract_my_row_copy(&self, my_row: usize, values: &mut [f64], indices: &mut [usize]) -> Result<usize, MatError> {
            self.inner.extract_my_row_copy(my_row, values, indices)
        }
    }

    #[test]
    fn square_constructor_runs_both_passes() {
        let map = BlockMap::linear(4, SerialComm);
        let m = BasicRowMatrix::new(tridiag(4), map.clone(), map).unwrap();
        assert!(m.importer().is_none() && m.exporter().is_none());
        assert_eq!(m.num_my_rows(), 4);
        assert_eq!((m.num_my_nonzeros(), m.num_global_nonzeros(), m.max_num_entries()), (10, 10, 3));
        assert_eq!(m.norm_inf(), 4.0);
        assert_eq!(m.norm_one(), 4.0);
        assert!(m.has_norm_inf());
        assert!(!m.lower_triangular() && !m.upper_triangular());
        assert_eq!(m.flops(), 20.0);
        assert_eq!(m.label(), "distmat::BasicRowMatrix");
    }

    #[test]
    fn general_constructor_defers_passes() {
        let map = BlockMap::linear(3, SerialComm);
        let mut m = BasicRowMatrix::with_maps(tridiag(3), map.clone(), map.clone(), map.clone(), map).unwrap();
        assert_eq!((m.num_my_nonzeros(), m.max_num_entries(), m.norm_inf()), (0, 0, 0.0));
        m.compute_structure_constants().unwrap();
        m.compute_numeric_constants().unwrap();
        assert_eq!((m.num_global_nonzeros(), m.norm_inf()), (7, 4.0));
    }

    #[test]
    fn eager_option_runs_passes_in_general_constructor() {
        let map = BlockMap::linear(3, SerialComm);
        let options = RowMatrixOptions { eager_constants: true, label: "eager".into(), ..Default::default() };
        let m = BasicRowMatrix::with_options(tridiag(3), map.clone(), map.clone(), map.clone(), map, options).unwrap();
        assert_eq!((m.num_global_nonzeros(), m.label()), (7, "eager"));
    }

    #[test]
    fn structural_failure_is_forwarded_and_counts_kept() {
        let map = BlockMap::linear(3, SerialComm);
        let faulty = Faulty { inner: tridiag(3), bad_row: 2 };
        let mut m = BasicRowMatrix::with_maps(faulty, map.clone(), map.clone(), map.clone(), map).unwrap();
        let err = m.compute_structure_constants();
        assert_eq!(err, Err(MatError::RowOutOfRange { row: 2, num_rows: 0 }));
        assert_eq!(m.num_my_nonzeros(), 0);
        m.accessor_mut().bad_row = 99;
        m.compute_structure_constants().unwrap();
        assert_eq!(m.num_my_nonzeros(), 7);
    }

    #[test]
    fn scratch_is_reused_until_vector_count_changes() {
        // ghost-free storage but a column map that differs from the domain
        let rows = BlockMap::linear(2, SerialComm);
        let cols = BlockMap::from_global_ids(vec![1, 0], SerialComm).unwrap();
        let csr = CsrMatrix::from_rows(2, &[vec![(1, 1.0)], vec![(0, 1.0)]]).unwrap();
        let m = BasicRowMatrix::new(csr, rows.clone(), cols).unwrap();
        assert!(m.importer().is_some());
        assert_eq!(m.scratch_vector_counts(), (None, None));

        let x = MultiVector::from_fn(rows.clone(), 2, |g, _| g as f64 + 1.0);
        let mut y = MultiVector::new(rows.clone(), 2);
        m.multiply(false, &x, &mut y).unwrap();
        assert_eq!(m.scratch_vector_counts(), (Some(2), None));
        assert_eq!(y.column(1), &[1.0, 2.0]);

        let x1 = MultiVector::from_fn(rows.clone(), 1, |g, _| g as f64);
        let mut y1 = MultiVector::new(rows, 1);
        m.multiply(false, &x1, &mut y1).unwrap();
        assert_eq!(m.scratch_vector_counts(), (Some(1), None));
    }

    #[test]
    fn triangularity_policies_differ_on_diagonal_rows() {
        // diagonal matrix: every entry sits at extraction position 0
        let map = BlockMap::linear(3, SerialComm);
        let csr = CsrMatrix::from_rows(3, &[vec![(0, 1.0)], vec![(1, 2.0)], vec![(2, 3.0)]]).unwrap();
        let m = BasicRowMatrix::new(csr.clone(), map.clone(), map.clone()).unwrap();
        assert!(m.lower_triangular() && m.upper_triangular());

        let options = RowMatrixOptions {
            triangularity: TriangularityPolicy::ExtractionPosition,
            eager_constants: true,
            ..Default::default()
        };
        let legacy = BasicRowMatrix::with_options(csr, map.clone(), map.clone(), map.clone(), map, options).unwrap();
        assert!(legacy.lower_triangular());
        assert!(!legacy.upper_triangular());
    }
}
