//! Distributed multi-vectors over a [`BlockMap`].
//!
//! Local storage is one column-major buffer of `my_length * num_vectors`
//! values, viewable as a faer matrix. Norms, dots, and `max_value` reduce
//! over the map's communicator and are therefore collective. With the
//! `rayon` feature the local kernels run on rayon's pool.

use faer::{Mat, MatMut, MatRef};

use crate::error::MatError;
use crate::map::BlockMap;
use crate::parallel::Comm;

#[derive(Clone)]
pub struct MultiVector<C: Comm> {
    map: BlockMap<C>,
    num_vectors: usize,
    values: Vec<f64>,
}

/// Sum of `f(x)` over a local slice.
fn local_sum<F>(xs: &[f64], f: F) -> f64
where
    F: Fn(f64) -> f64 + Send + Sync,
{
    #[cfg(feature = "rayon")]
    {
        use rayon::prelude::*;
        xs.par_iter().map(|&x| f(x)).sum()
    }
    #[cfg(not(feature = "rayon"))]
    {
        xs.iter().map(|&x| f(x)).sum()
    }
}

fn local_max(xs: &[f64]) -> f64 {
    #[cfg(feature = "rayon")]
    {
        use rayon::prelude::*;
        xs.par_iter().copied().reduce(|| f64::NEG_INFINITY, f64::max)
    }
    #[cfg(not(feature = "rayon"))]
    {
        xs.iter().copied().fold(f64::NEG_INFINITY, f64::max)
    }
}

impl<C: Comm> MultiVector<C> {
    /// Zero-filled multi-vector with `num_vectors` columns.
    pub fn new(map: BlockMap<C>, num_vectors: usize) -> Self {
        let values = vec![0.0; map.num_my_elements() * num_vectors];
        MultiVector { map, num_vectors, values }
    }

    /// One local column per inner `Vec`, each of the map's local length.
    pub fn from_columns(map: BlockMap<C>, columns: Vec<Vec<f64>>) -> Result<Self, MatError> {
        let n = map.num_my_elements();
        if let Some(bad) = columns.iter().find(|c| c.len() != n) {
            return Err(MatError::LengthMismatch { expected: n, found: bad.len() });
        }
        let num_vectors = columns.len();
        let values = columns.into_iter().flatten().collect();
        Ok(MultiVector { map, num_vectors, values })
    }

    /// Fills entry `(lid, k)` with `f(gid, k)`.
    pub fn from_fn<F>(map: BlockMap<C>, num_vectors: usize, f: F) -> Self
    where
        F: Fn(i64, usize) -> f64,
    {
        let gids = map.my_global_ids();
        let values = (0..num_vectors)
            .flat_map(|k| gids.iter().map(move |&g| (g, k)))
            .map(|(g, k)| f(g, k))
            .collect();
        MultiVector { map, num_vectors, values }
    }

    pub fn map(&self) -> &BlockMap<C> {
        &self.map
    }

    pub fn num_vectors(&self) -> usize {
        self.num_vectors
    }

    pub fn my_length(&self) -> usize {
        self.map.num_my_elements()
    }

    pub fn global_length(&self) -> usize {
        self.map.num_global_elements()
    }

    pub fn column(&self, k: usize) -> &[f64] {
        let n = self.my_length();
        &self.values[k * n..(k + 1) * n]
    }

    pub fn column_mut(&mut self, k: usize) -> &mut [f64] {
        let n = self.my_length();
        &mut self.values[k * n..(k + 1) * n]
    }

    pub fn as_mat(&self) -> MatRef<'_, f64> {
        MatRef::from_column_major_slice(&self.values, self.my_length(), self.num_vectors)
    }

    pub fn as_mat_mut(&mut self) -> MatMut<'_, f64> {
        let n = self.my_length();
        MatMut::from_column_major_slice_mut(&mut self.values, n, self.num_vectors)
    }

    /// Owned copy of the local block.
    pub fn to_mat(&self) -> Mat<f64> {
        Mat::from_fn(self.my_length(), self.num_vectors, |i, k| self.column(k)[i])
    }

    pub fn put_scalar(&mut self, alpha: f64) {
        #[cfg(feature = "rayon")]
        {
            use rayon::prelude::*;
            self.values.par_iter_mut().for_each(|v| *v = alpha);
        }
        #[cfg(not(feature = "rayon"))]
        self.values.iter_mut().for_each(|v| *v = alpha);
    }

    pub fn scale(&mut self, alpha: f64) {
        self.values.iter_mut().for_each(|v| *v *= alpha);
    }

    /// Element-wise `1 / x`. Zeros become infinities; callers that care use
    /// the inverse-sum routines of the row matrix instead.
    pub fn reciprocal(&mut self) {
        self.values.iter_mut().for_each(|v| *v = v.recip());
    }

    /// Sums every column across all ranks in place. Used when the map is
    /// replicated and each rank holds a partial result. Collective.
    pub fn reduce(&mut self) {
        let comm = self.map.comm().clone();
        comm.all_reduce_sum(&mut self.values);
    }

    /// Global maximum of each column; `-inf` for a globally empty map.
    /// Collective.
    pub fn max_value(&self) -> Vec<f64> {
        let comm = self.map.comm();
        (0..self.num_vectors)
            .map(|k| comm.all_reduce_max(local_max(self.column(k))))
            .collect()
    }

    pub fn norm1(&self) -> Vec<f64> {
        let comm = self.map.comm();
        (0..self.num_vectors)
            .map(|k| comm.all_reduce(local_sum(self.column(k), f64::abs)))
            .collect()
    }

    pub fn norm2(&self) -> Vec<f64> {
        let comm = self.map.comm();
        (0..self.num_vectors)
            .map(|k| comm.all_reduce(local_sum(self.column(k), |x| x * x)).sqrt())
            .collect()
    }

    pub fn norm_inf(&self) -> Vec<f64> {
        let comm = self.map.comm();
        (0..self.num_vectors)
            .map(|k| {
                let local = self.column(k).iter().fold(0.0, |m: f64, x| m.max(x.abs()));
                comm.all_reduce_max(local)
            })
            .collect()
    }

    pub fn dot(&self, other: &MultiVector<C>) -> Result<Vec<f64>, MatError> {
        if self.num_vectors != other.num_vectors {
            return Err(MatError::VectorCountMismatch { x: self.num_vectors, y: other.num_vectors });
        }
        if self.my_length() != other.my_length() {
            return Err(MatError::LengthMismatch { expected: self.my_length(), found: other.my_length() });
        }
        let comm = self.map.comm();
        Ok((0..self.num_vectors)
            .map(|k| comm.dot(self.column(k), other.column(k)))
            .collect())
    }
}
