use log::warn;
use num_traits::Float;

use super::BasicRowMatrix;
use crate::core::multivector::MultiVector;
use crate::core::traits::RowAccessor;
use crate::error::MatError;
use crate::map::CombineMode;
use crate::parallel::Comm;

/// Outcome of an inverse row/column sum computation on this rank.
///
/// Degenerate sums are replaced by `f64::MAX` instead of producing
/// infinities. `ZeroSum` wins over `BelowThreshold` when both occur.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SumStatus {
    Clean,
    /// Some sum was exactly zero.
    ZeroSum,
    /// Some sum was non-zero but below the smallest normal `f64`.
    BelowThreshold,
}

impl SumStatus {
    /// Numeric warning code: 0 clean, 1 zero sum, 2 sub-threshold sum.
    pub fn code(self) -> i32 {
        match self {
            SumStatus::Clean => 0,
            SumStatus::ZeroSum => 1,
            SumStatus::BelowThreshold => 2,
        }
    }

    pub fn is_clean(self) -> bool {
        self == SumStatus::Clean
    }
}

/// Inverts sums in place under the degenerate-sum policy.
fn invert_sums(sums: &mut [f64]) -> SumStatus {
    let threshold = <f64 as Float>::min_positive_value();
    let sentinel = <f64 as Float>::max_value();
    let mut status = SumStatus::Clean;
    for s in sums.iter_mut() {
        if *s < threshold {
            if *s == 0.0 {
                status = SumStatus::ZeroSum;
            } else if status != SumStatus::ZeroSum {
                status = SumStatus::BelowThreshold;
            }
            *s = sentinel;
        } else {
            *s = 1.0 / *s;
        }
    }
    status
}

fn ensure_vector<C: Comm>(x: &MultiVector<C>) -> Result<(), MatError> {
    match x.num_vectors() {
        1 => Ok(()),
        n => Err(MatError::VectorCountMismatch { x: n, y: 1 }),
    }
}

impl<A: RowAccessor, C: Comm> BasicRowMatrix<A, C> {
    /// Copies the diagonal into `diagonal`, which must live on the row map.
    /// Rows without a stored diagonal entry get 0. Collective.
    pub fn extract_diagonal_copy(&self, diagonal: &mut MultiVector<C>) -> Result<(), MatError> {
        ensure_vector(diagonal)?;
        if !self.row_map.same_as(diagonal.map()) {
            return Err(MatError::MapMismatch { operation: "extract_diagonal_copy" });
        }
        let (mut values, mut indices) = self.row_buffers();
        let d = diagonal.column_mut(0);
        for (i, di) in d.iter_mut().enumerate() {
            let n = self.extract_row(i, &mut values, &mut indices)?;
            let row_gid = self.row_map.gid(i);
            *di = values[..n]
                .iter()
                .zip(&indices[..n])
                .find(|&(_, &c)| self.col_map.gid(c) == row_gid)
                .map_or(0.0, |(&v, _)| v);
        }
        Ok(())
    }

    /// Local absolute row sums, indexed by local row.
    fn row_abs_sums(&self, out: &mut [f64]) -> Result<(), MatError> {
        let (mut values, mut indices) = self.row_buffers();
        for (i, o) in out.iter_mut().enumerate().take(self.num_my_rows) {
            let n = self.extract_row(i, &mut values, &mut indices)?;
            *o = values[..n].iter().map(|v| v.abs()).sum();
        }
        Ok(())
    }

    /// Local absolute column sums, indexed by local column.
    fn col_abs_sums(&self, out: &mut [f64]) -> Result<(), MatError> {
        let (mut values, mut indices) = self.row_buffers();
        for i in 0..self.num_my_rows {
            let n = self.extract_row(i, &mut values, &mut indices)?;
            for (&v, &c) in values[..n].iter().zip(&indices[..n]) {
                out[c] += v.abs();
            }
        }
        Ok(())
    }

    /// x = 1 / (absolute row sums). `x` lives on the range map (summed
    /// through the exporter) or on the row map. Collective.
    pub fn inv_row_sums(&self, x: &mut MultiVector<C>) -> Result<SumStatus, MatError> {
        ensure_vector(x)?;
        x.put_scalar(0.0);
        if self.range_map.same_as(x.map()) && self.exporter.is_some() {
            let mut partial = MultiVector::new(self.row_map.clone(), 1);
            self.row_abs_sums(partial.column_mut(0))?;
            if let Some(exporter) = &self.exporter {
                exporter.forward(&partial, x, CombineMode::Add)?;
            }
        } else if self.row_map.same_as(x.map()) {
            self.row_abs_sums(x.column_mut(0))?;
        } else {
            return Err(MatError::MapMismatch { operation: "inv_row_sums" });
        }
        let status = invert_sums(x.column_mut(0));
        if !status.is_clean() {
            warn!("{}: inv_row_sums: {:?}, sentinel substituted", self.options.label, status);
        }
        self.flops.update(self.num_global_nonzeros as f64);
        Ok(status)
    }

    /// x = 1 / (absolute column sums). `x` lives on the domain map (summed
    /// through the importer) or on the column map. Collective.
    pub fn inv_col_sums(&self, x: &mut MultiVector<C>) -> Result<SumStatus, MatError> {
        ensure_vector(x)?;
        x.put_scalar(0.0);
        if self.domain_map.same_as(x.map()) && self.importer.is_some() {
            let mut partial = MultiVector::new(self.col_map.clone(), 1);
            self.col_abs_sums(partial.column_mut(0))?;
            if let Some(importer) = &self.importer {
                importer.reverse(&partial, x, CombineMode::Add)?;
            }
        } else if self.col_map.same_as(x.map()) {
            self.col_abs_sums(x.column_mut(0))?;
        } else {
            return Err(MatError::MapMismatch { operation: "inv_col_sums" });
        }
        let status = invert_sums(x.column_mut(0));
        if !status.is_clean() {
            warn!("{}: inv_col_sums: {:?}, sentinel substituted", self.options.label, status);
        }
        self.flops.update(self.num_global_nonzeros as f64);
        Ok(status)
    }

    /// A = diag(x) A. `x` lives on the range map (brought to the row map
    /// through the exporter, overwriting) or on the row map. Mutates storage
    /// through the accessor's entry view; norms are stale afterwards.
    /// Collective.
    pub fn left_scale(&mut self, x: &MultiVector<C>) -> Result<(), MatError> {
        ensure_vector(x)?;
        let redistributed;
        let factors: &[f64] = if self.range_map.same_as(x.map()) && self.exporter.is_some() {
            let mut t = MultiVector::new(self.row_map.clone(), 1);
            if let Some(exporter) = &self.exporter {
                exporter.reverse(x, &mut t, CombineMode::Insert)?;
            }
            redistributed = t;
            redistributed.column(0)
        } else if self.row_map.same_as(x.map()) {
            x.column(0)
        } else {
            return Err(MatError::MapMismatch { operation: "left_scale" });
        };
        self.scale_entries(factors, |row, _| row, |row, num_rows| MatError::RowOutOfRange { row, num_rows })
    }

    /// A = A diag(x). `x` lives on the domain map (brought to the column map
    /// through the importer, overwriting) or on the column map. Collective.
    pub fn right_scale(&mut self, x: &MultiVector<C>) -> Result<(), MatError> {
        ensure_vector(x)?;
        let redistributed;
        let factors: &[f64] = if self.domain_map.same_as(x.map()) && self.importer.is_some() {
            let mut t = MultiVector::new(self.col_map.clone(), 1);
            if let Some(importer) = &self.importer {
                importer.forward(x, &mut t, CombineMode::Insert)?;
            }
            redistributed = t;
            redistributed.column(0)
        } else if self.col_map.same_as(x.map()) {
            x.column(0)
        } else {
            return Err(MatError::MapMismatch { operation: "right_scale" });
        };
        self.scale_entries(factors, |_, col| col, |column, num_cols| MatError::ColumnOutOfRange { column, num_cols })
    }

    /// Walks every local nonzero and multiplies it by `factors[pick(row, col)]`.
    ///
    /// The walk is bounded by the structural pass, so it refuses to run
    /// before one or after the storage changed size since the last one.
    fn scale_entries(
        &mut self,
        factors: &[f64],
        pick: impl Fn(usize, usize) -> usize,
        out_of_range: impl Fn(usize, usize) -> MatError,
    ) -> Result<(), MatError> {
        if !self.has_structure() {
            return Err(MatError::StructureNotComputed);
        }
        let mut stored = 0;
        for i in 0..self.num_my_rows {
            stored += self.accessor.num_my_row_entries(i)?;
        }
        if stored != self.num_my_nonzeros {
            return Err(MatError::StaleStructure { computed: self.num_my_nonzeros, stored });
        }

        for k in 0..self.num_my_nonzeros {
            let entry = self.accessor.extract_my_entry_view_mut(k)?;
            let at = pick(entry.row, entry.col);
            let f = factors.get(at).ok_or_else(|| out_of_range(at, factors.len()))?;
            *entry.value *= *f;
        }
        self.flops.update(self.num_global_nonzeros as f64);
        Ok(())
    }
}
