//! Core traits for distmat: the storage-side row accessor and the
//! operator-side linear operator.

use crate::core::multivector::MultiVector;
use crate::error::MatError;
use crate::map::BlockMap;
use crate::parallel::Comm;

/// Mutable view of one stored nonzero.
pub struct EntryViewMut<'a> {
    pub value: &'a mut f64,
    /// Local row index.
    pub row: usize,
    /// Local column index (column map numbering).
    pub col: usize,
}

/// Row-wise access to a locally stored sparse matrix.
///
/// Rows are numbered by the row map, columns by the column map, both local.
/// This is all a storage format needs to provide to become a distributed
/// operator through [`BasicRowMatrix`](crate::matrix::BasicRowMatrix).
pub trait RowAccessor {
    /// Number of stored entries in local row `my_row`.
    fn num_my_row_entries(&self, my_row: usize) -> Result<usize, MatError>;

    /// Copies row `my_row` into `values`/`indices` and returns the entry
    /// count. Fails with [`MatError::InsufficientBuffer`] when either slice
    /// is shorter than the row.
    fn extract_my_row_copy(&self, my_row: usize, values: &mut [f64], indices: &mut [usize]) -> Result<usize, MatError>;

    /// In-place access to the `index`-th local nonzero, counting over all
    /// rows in storage order. Needed only for left/right scaling.
    fn extract_my_entry_view_mut(&mut self, index: usize) -> Result<EntryViewMut<'_>, MatError> {
        let _ = index;
        Err(MatError::Unsupported("in-place entry view"))
    }
}

/// A distributed linear operator `y = A x` between two maps.
pub trait LinearOperator<C: Comm> {
    /// y = op(A) x, where op honors [`use_transpose`](Self::use_transpose).
    fn apply(&self, x: &MultiVector<C>, y: &mut MultiVector<C>) -> Result<(), MatError>;
    /// y = op(A)ᵀ x.
    fn apply_transpose(&self, x: &MultiVector<C>, y: &mut MultiVector<C>) -> Result<(), MatError>;
    fn set_use_transpose(&mut self, use_transpose: bool);
    fn use_transpose(&self) -> bool;
    fn operator_domain_map(&self) -> &BlockMap<C>;
    fn operator_range_map(&self) -> &BlockMap<C>;
    /// ‖A‖∞ from the last numeric pass.
    fn norm_inf(&self) -> f64;
    fn has_norm_inf(&self) -> bool;
    fn label(&self) -> &str;
}
