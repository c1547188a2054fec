use super::{BasicRowMatrix, Scratch};
use crate::core::multivector::MultiVector;
use crate::core::traits::RowAccessor;
use crate::error::MatError;
use crate::map::CombineMode;
use crate::parallel::Comm;

fn check_length<C: Comm>(v: &MultiVector<C>, expected: usize) -> Result<(), MatError> {
    if v.my_length() != expected {
        return Err(MatError::LengthMismatch { expected, found: v.my_length() });
    }
    Ok(())
}

impl<A: RowAccessor, C: Comm> BasicRowMatrix<A, C> {
    /// y = A x, or y = Aᵀ x when `transpose` is set. `x` and `y` must hold
    /// the same number of vectors. Collective.
    ///
    /// The operator keeps its import/export buffers between calls, so it is
    /// not reentrant: a call from inside the accessor on the same operator
    /// fails with [`MatError::Unsupported`].
    pub fn multiply(&self, transpose: bool, x: &MultiVector<C>, y: &mut MultiVector<C>) -> Result<(), MatError> {
        let nv = x.num_vectors();
        if nv != y.num_vectors() {
            return Err(MatError::VectorCountMismatch { x: nv, y: y.num_vectors() });
        }

        let mut scratch = self
            .scratch
            .try_borrow_mut()
            .map_err(|_| MatError::Unsupported("re-entrant multiply on the same operator"))?;
        self.update_import_vector(&mut scratch, nv);
        self.update_export_vector(&mut scratch, nv);
        let Scratch { import, export } = &mut *scratch;

        if transpose {
            self.multiply_transpose(x, y, import, export)?;
        } else {
            self.multiply_forward(x, y, import, export)?;
        }

        self.flops.update(2.0 * nv as f64 * self.num_global_nonzeros as f64);
        Ok(())
    }

    fn update_import_vector(&self, scratch: &mut Scratch<C>, nv: usize) {
        if let Some(importer) = &self.importer {
            if scratch.import.as_ref().is_none_or(|v| v.num_vectors() != nv) {
                scratch.import = Some(MultiVector::new(importer.target_map().clone(), nv));
            }
        }
    }

    fn update_export_vector(&self, scratch: &mut Scratch<C>, nv: usize) {
        if let Some(exporter) = &self.exporter {
            if scratch.export.as_ref().is_none_or(|v| v.num_vectors() != nv) {
                scratch.export = Some(MultiVector::new(exporter.source_map().clone(), nv));
            }
        }
    }

    fn multiply_forward(
        &self,
        x: &MultiVector<C>,
        y: &mut MultiVector<C>,
        import: &mut Option<MultiVector<C>>,
        export: &mut Option<MultiVector<C>>,
    ) -> Result<(), MatError> {
        // Pull ghost columns of x into the column map.
        let xs: &MultiVector<C> = match (&self.importer, import.as_mut()) {
            (Some(importer), Some(iv)) => {
                importer.forward(x, iv, CombineMode::Insert)?;
                &*iv
            }
            _ => x,
        };
        check_length(xs, self.num_my_cols)?;

        match export.as_mut() {
            Some(ev) => self.row_products(xs, ev)?,
            None => {
                check_length(y, self.num_my_rows)?;
                self.row_products(xs, y)?;
            }
        }

        if let (Some(exporter), Some(ev)) = (&self.exporter, export.as_ref()) {
            y.put_scalar(0.0);
            exporter.forward(ev, y, CombineMode::Add)?;
        }
        // Every rank computed its rows of a replicated result; combine them.
        if !self.range_map.is_distributed() && self.comm.size() > 1 {
            y.reduce();
        }
        Ok(())
    }

    fn multiply_transpose(
        &self,
        x: &MultiVector<C>,
        y: &mut MultiVector<C>,
        import: &mut Option<MultiVector<C>>,
        export: &mut Option<MultiVector<C>>,
    ) -> Result<(), MatError> {
        // Transpose swaps the roles: x lives on the range map, y on the domain.
        let xs: &MultiVector<C> = match (&self.exporter, export.as_mut()) {
            (Some(exporter), Some(ev)) => {
                exporter.reverse(x, ev, CombineMode::Insert)?;
                &*ev
            }
            _ => x,
        };
        check_length(xs, self.num_my_rows)?;

        match import.as_mut() {
            Some(iv) => {
                iv.put_scalar(0.0);
                self.row_scatter(xs, iv)?;
            }
            None => {
                check_length(y, self.num_my_cols)?;
                y.put_scalar(0.0);
                self.row_scatter(xs, y)?;
            }
        }

        if let (Some(importer), Some(iv)) = (&self.importer, import.as_ref()) {
            y.put_scalar(0.0);
            importer.reverse(iv, y, CombineMode::Add)?;
        }
        if !self.domain_map.is_distributed() && self.comm.size() > 1 {
            y.reduce();
        }
        Ok(())
    }

    /// ys[i] = row_i · xs for every local row, one dot per vector.
    fn row_products(&self, xs: &MultiVector<C>, ys: &mut MultiVector<C>) -> Result<(), MatError> {
        let (mut values, mut indices) = self.row_buffers();
        for i in 0..self.num_my_rows {
            let n = self.extract_row(i, &mut values, &mut indices)?;
            for k in 0..xs.num_vectors() {
                let xk = xs.column(k);
                let sum: f64 = values[..n].iter().zip(&indices[..n]).map(|(&v, &c)| v * xk[c]).sum();
                ys.column_mut(k)[i] = sum;
            }
        }
        Ok(())
    }

    /// ys[c] += a_ic * xs[i] for every stored entry, one scatter per vector.
    fn row_scatter(&self, xs: &MultiVector<C>, ys: &mut MultiVector<C>) -> Result<(), MatError> {
        let (mut values, mut indices) = self.row_buffers();
        for i in 0..self.num_my_rows {
            let n = self.extract_row(i, &mut values, &mut indices)?;
            for k in 0..xs.num_vectors() {
                let xi = xs.column(k)[i];
                let acc = ys.column_mut(k);
                for (&v, &c) in values[..n].iter().zip(&indices[..n]) {
                    acc[c] += v * xi;
                }
            }
        }
        Ok(())
    }

    #[cfg(test)]
    pub(crate) fn scratch_vector_counts(&self) -> (Option<usize>, Option<usize>) {
        let s = self.scratch.borrow();
        (
            s.import.as_ref().map(MultiVector::num_vectors),
            s.export.as_ref().map(MultiVector::num_vectors),
        )
    }
}
