use log::trace;

use super::{BasicRowMatrix, MatrixProperties};
use crate::config::TriangularityPolicy;
use crate::core::multivector::MultiVector;
use crate::core::traits::RowAccessor;
use crate::error::MatError;
use crate::map::CombineMode;
use crate::parallel::Comm;

impl<A: RowAccessor, C: Comm> BasicRowMatrix<A, C> {
    /// Structural pass: local and global nonzero counts and the widest row.
    ///
    /// On an accessor failure the pass stops at the failing row and returns
    /// the error; the previous counts are left untouched. The final global
    /// sum is collective, so a rank that fails here leaves the others waiting
    /// unless the caller mirrors the failure.
    pub fn compute_structure_constants(&mut self) -> Result<(), MatError> {
        let mut nnz = 0usize;
        let mut max_entries = 0usize;
        for i in 0..self.num_my_rows {
            let n = self.accessor.num_my_row_entries(i)?;
            nnz += n;
            max_entries = max_entries.max(n);
        }
        self.num_my_nonzeros = nnz;
        self.max_num_entries = max_entries;
        self.num_global_nonzeros = self.comm.sum_count(nnz);
        self.properties.insert(MatrixProperties::HAS_STRUCTURE);
        trace!(
            "{}: structure: {} local nonzeros ({} global), widest row {}",
            self.options.label, nnz, self.num_global_nonzeros, max_entries
        );
        Ok(())
    }

    /// Numeric pass: ‖A‖∞ (max absolute row sum in the range distribution),
    /// ‖A‖₁ (max absolute column sum in the domain distribution), and the
    /// local triangularity flags. Requires a prior structural pass.
    /// Collective.
    pub fn compute_numeric_constants(&mut self) -> Result<(), MatError> {
        let (mut values, mut indices) = self.row_buffers();
        let mut row_sums = MultiVector::new(self.row_map.clone(), 1);
        let mut col_sums = MultiVector::new(self.col_map.clone(), 1);
        let mut lower = true;
        let mut upper = true;
        {
            let rs = row_sums.column_mut(0);
            let cs = col_sums.column_mut(0);
            for i in 0..self.num_my_rows {
                let n = self.extract_row(i, &mut values, &mut indices)?;
                let row_gid = self.row_map.gid(i);
                for (j, (&v, &c)) in values[..n].iter().zip(&indices[..n]).enumerate() {
                    rs[i] += v.abs();
                    cs[c] += v.abs();
                    let (below, above) = match self.options.triangularity {
                        TriangularityPolicy::GlobalIndex => {
                            let col_gid = self.col_map.gid(c);
                            (col_gid < row_gid, col_gid > row_gid)
                        }
                        TriangularityPolicy::ExtractionPosition => (j < i, j > i),
                    };
                    if below {
                        upper = false;
                    }
                    if above {
                        lower = false;
                    }
                }
            }
        }

        // Rows may be split or permuted relative to the range map, columns
        // relative to the domain map: sum there before taking the max.
        let norm_inf = match &self.exporter {
            Some(exporter) => {
                let mut sums = MultiVector::new(self.range_map.clone(), 1);
                exporter.forward(&row_sums, &mut sums, CombineMode::Add)?;
                sums.max_value()[0]
            }
            None => row_sums.max_value()[0],
        };
        let norm_one = match &self.importer {
            Some(importer) => {
                let mut sums = MultiVector::new(self.domain_map.clone(), 1);
                importer.reverse(&col_sums, &mut sums, CombineMode::Add)?;
                sums.max_value()[0]
            }
            None => col_sums.max_value()[0],
        };
        // globally empty maps report -inf
        self.norm_inf = norm_inf.max(0.0);
        self.norm_one = norm_one.max(0.0);

        let mut properties = MatrixProperties::HAS_NORM_INF | (self.properties & MatrixProperties::HAS_STRUCTURE);
        properties.set(MatrixProperties::LOWER_TRIANGULAR, lower);
        properties.set(MatrixProperties::UPPER_TRIANGULAR, upper);
        self.properties = properties;

        self.flops.update(2.0 * self.num_global_nonzeros as f64);
        trace!(
            "{}: numeric: norm_inf = {}, norm_one = {}, {:?}",
            self.options.label, self.norm_inf, self.norm_one, self.properties
        );
        Ok(())
    }
}
