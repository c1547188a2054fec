//! Distributed index maps and the redistribution plans between them.
//!
//! A [`BlockMap`] assigns a list of global indices to every rank of a
//! communicator. Local index `lid` on a rank refers to the `lid`-th entry of
//! that rank's list. Maps are immutable and cheap to clone.

pub mod redistribute;
pub use redistribute::{CombineMode, Redistributor};

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use crate::error::MatError;
use crate::parallel::Comm;

struct MapData<C> {
    comm: C,
    my_gids: Vec<i64>,
    lids: HashMap<i64, usize>,
    num_global: usize,
    distributed: bool,
}

#[derive(Clone)]
pub struct BlockMap<C: Comm> {
    inner: Arc<MapData<C>>,
}

impl<C: Comm> BlockMap<C> {
    /// Contiguous partition of `0..num_global`; the first `num_global % size`
    /// ranks own one extra index. Collective.
    pub fn linear(num_global: usize, comm: C) -> Self {
        let size = comm.size();
        let rank = comm.rank();
        let base = num_global / size;
        let extra = num_global % size;
        let start = rank * base + rank.min(extra);
        let len = base + usize::from(rank < extra);
        let my_gids: Vec<i64> = (start..start + len).map(|g| g as i64).collect();
        let distributed = Self::detect_distributed(&comm, len, num_global);
        Self::assemble(comm, my_gids, num_global, distributed)
    }

    /// Map from an explicit list of global indices owned by this rank. The
    /// global element count is the sum of all local counts. Collective.
    pub fn from_global_ids(my_gids: Vec<i64>, comm: C) -> Result<Self, MatError> {
        let mut seen = HashSet::with_capacity(my_gids.len());
        let duplicate = my_gids.iter().find(|&&gid| !seen.insert(gid)).copied();
        let num_global = comm.sum_count(my_gids.len());
        let distributed = Self::detect_distributed(&comm, my_gids.len(), num_global);
        match duplicate {
            Some(gid) => Err(MatError::DuplicateGlobalIndex(gid)),
            None => Ok(Self::assemble(comm, my_gids, num_global, distributed)),
        }
    }

    /// Every rank owns all of `0..n`. Not distributed; not collective.
    pub fn replicated(n: usize, comm: C) -> Self {
        let my_gids = (0..n as i64).collect();
        Self::assemble(comm, my_gids, n, false)
    }

    fn detect_distributed(comm: &C, num_my: usize, num_global: usize) -> bool {
        let everywhere_whole = comm.all_true(num_my == num_global);
        comm.size() > 1 && !everywhere_whole
    }

    fn assemble(comm: C, my_gids: Vec<i64>, num_global: usize, distributed: bool) -> Self {
        let lids = my_gids.iter().enumerate().map(|(lid, &gid)| (gid, lid)).collect();
        BlockMap {
            inner: Arc::new(MapData { comm, my_gids, lids, num_global, distributed }),
        }
    }

    pub fn comm(&self) -> &C {
        &self.inner.comm
    }

    pub fn num_my_elements(&self) -> usize {
        self.inner.my_gids.len()
    }

    pub fn num_global_elements(&self) -> usize {
        self.inner.num_global
    }

    pub fn my_global_ids(&self) -> &[i64] {
        &self.inner.my_gids
    }

    /// Global index of local index `lid`.
    pub fn gid(&self, lid: usize) -> Option<i64> {
        self.inner.my_gids.get(lid).copied()
    }

    /// Local index of global index `gid`, if this rank owns it.
    pub fn lid(&self, gid: i64) -> Option<usize> {
        self.inner.lids.get(&gid).copied()
    }

    pub fn my_gid(&self, gid: i64) -> bool {
        self.inner.lids.contains_key(&gid)
    }

    /// False for maps whose every rank holds the whole index set.
    pub fn is_distributed(&self) -> bool {
        self.inner.distributed
    }

    /// Whether both maps describe the same distribution: identical global
    /// index lists on every rank. Always collective, even when both handles
    /// share the same underlying map on this rank.
    pub fn same_as(&self, other: &BlockMap<C>) -> bool {
        let local = Arc::ptr_eq(&self.inner, &other.inner)
            || (self.inner.num_global == other.inner.num_global
                && self.inner.distributed == other.inner.distributed
                && self.inner.my_gids == other.inner.my_gids);
        self.inner.comm.all_true(local)
    }
}
