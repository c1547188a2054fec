// Local CSR storage exposed through the row accessor contract

use faer::Mat;
use faer::sparse::{
    SymbolicSparseRowMat, // owning symbolic CSR alias
    SparseRowMat,         // owning numeric CSR alias
};

use crate::core::traits::{EntryViewMut, RowAccessor};
use crate::error::MatError;

/// Locally owned rows in compressed sparse row form. Column indices are local
/// to the column map of the operator the storage is attached to.
#[derive(Debug, Clone)]
pub struct CsrMatrix {
    nrows: usize,
    ncols: usize,
    row_ptr: Vec<usize>,
    col_idx: Vec<usize>,
    values: Vec<f64>,
}

impl CsrMatrix {
    /// Build a CSR from raw row-ptr, col-idx, and values.
    pub fn from_csr(
        nrows: usize,
        ncols: usize,
        row_ptr: Vec<usize>,
        col_idx: Vec<usize>,
        values: Vec<f64>,
    ) -> Result<Self, MatError> {
        if row_ptr.len() != nrows + 1 {
            return Err(MatError::InvalidStructure(format!(
                "row_ptr has {} entries, expected {}",
                row_ptr.len(),
                nrows + 1
            )));
        }
        if row_ptr[0] != 0 || row_ptr.windows(2).any(|w| w[0] > w[1]) {
            return Err(MatError::InvalidStructure("row_ptr must start at 0 and be non-decreasing".into()));
        }
        let nnz = row_ptr[nrows];
        if col_idx.len() != nnz || values.len() != nnz {
            return Err(MatError::InvalidStructure(format!(
                "row_ptr ends at {nnz} but col_idx has {} and values has {}",
                col_idx.len(),
                values.len()
            )));
        }
        if let Some(&c) = col_idx.iter().find(|&&c| c >= ncols) {
            return Err(MatError::ColumnOutOfRange { column: c, num_cols: ncols });
        }
        Ok(Self { nrows, ncols, row_ptr, col_idx, values })
    }

    /// Build from per-row `(local column, value)` lists, kept in the given order.
    pub fn from_rows(ncols: usize, rows: &[Vec<(usize, f64)>]) -> Result<Self, MatError> {
        let mut row_ptr = Vec::with_capacity(rows.len() + 1);
        row_ptr.push(0);
        let mut col_idx = Vec::new();
        let mut values = Vec::new();
        for row in rows {
            for &(c, v) in row {
                col_idx.push(c);
                values.push(v);
            }
            row_ptr.push(col_idx.len());
        }
        Self::from_csr(rows.len(), ncols, row_ptr, col_idx, values)
    }

    pub fn nrows(&self) -> usize {
        self.nrows
    }

    pub fn ncols(&self) -> usize {
        self.ncols
    }

    pub fn nnz(&self) -> usize {
        self.values.len()
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    /// Stored values, for in-place updates that keep the sparsity pattern.
    pub fn values_mut(&mut self) -> &mut [f64] {
        &mut self.values
    }

    fn row_range(&self, my_row: usize) -> Result<std::ops::Range<usize>, MatError> {
        if my_row >= self.nrows {
            return Err(MatError::RowOutOfRange { row: my_row, num_rows: self.nrows });
        }
        Ok(self.row_ptr[my_row]..self.row_ptr[my_row + 1])
    }

    /// Convert to faer's owning CSR.
    ///
    /// # Panics
    /// Panics if column indices within a row are not strictly increasing.
    pub fn to_faer(&self) -> SparseRowMat<usize, f64> {
        // Build symbolic structure; second argument `None` means “no separate row_nnz”:
        let symbolic = SymbolicSparseRowMat::new_checked(
            self.nrows,
            self.ncols,
            self.row_ptr.clone(),
            None, // optional row_nnz: Option<Vec<usize>>
            self.col_idx.clone(),
        );
        // Attach the numerical values:
        SparseRowMat::new(symbolic, self.values.clone())
    }

    /// Dense copy of the local block (local rows × local columns).
    pub fn to_dense(&self) -> Mat<f64> {
        self.to_faer().to_dense()
    }
}

impl RowAccessor for CsrMatrix {
    fn num_my_row_entries(&self, my_row: usize) -> Result<usize, MatError> {
        Ok(self.row_range(my_row)?.len())
    }

    fn extract_my_row_copy(&self, my_row: usize, values: &mut [f64], indices: &mut [usize]) -> Result<usize, MatError> {
        let range = self.row_range(my_row)?;
        let n = range.len();
        let provided = values.len().min(indices.len());
        if n > provided {
            return Err(MatError::InsufficientBuffer { required: n, provided });
        }
        values[..n].copy_from_slice(&self.values[range.clone()]);
        indices[..n].copy_from_slice(&self.col_idx[range]);
        Ok(n)
    }

    fn extract_my_entry_view_mut(&mut self, index: usize) -> Result<EntryViewMut<'_>, MatError> {
        if index >= self.values.len() {
            return Err(MatError::EntryOutOfRange { index, num_entries: self.values.len() });
        }
        // last row whose start is at or before `index`; empty rows share starts
        let row = self.row_ptr.partition_point(|&p| p <= index) - 1;
        let col = self.col_idx[index];
        Ok(EntryViewMut { value: &mut self.values[index], row, col })
    }
}
