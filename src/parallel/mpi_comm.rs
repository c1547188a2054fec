/// MPI-based parallel communication module.
///
/// This module provides an implementation of the `Comm` trait using the MPI (Message Passing Interface)
/// backend for distributed-memory parallelism. Personalized exchanges map onto `MPI_Alltoallv`,
/// reductions onto `MPI_Allreduce`, and `dup` onto `MPI_Comm_dup`. The implementation is only
/// available when the `mpi` feature is enabled.
///
/// # Usage
///
/// - `MpiComm::new()` initializes MPI once; the universe stays alive as long as any handle does.
/// - The `Comm` trait is implemented for `MpiComm`, allowing it to be used as a drop-in replacement
///   for the serial or thread backends.
///
/// # References
/// - [MPI Standard](https://www.mpi-forum.org/)
///
/// # Example
/// ```no_run
/// # #[cfg(feature = "mpi")] {
/// use distmat::parallel::{Comm, MpiComm};
/// let comm = MpiComm::new();
/// println!("Rank: {} / {}", comm.rank(), comm.size());
/// comm.barrier();
/// # }
/// ```

#[cfg(feature = "mpi")]
use std::sync::Arc;

#[cfg(feature = "mpi")]
use mpi::collective::SystemOperation;
#[cfg(feature = "mpi")]
use mpi::datatype::{Partition, PartitionMut};
#[cfg(feature = "mpi")]
use mpi::environment::Universe;
#[cfg(feature = "mpi")]
use mpi::topology::SimpleCommunicator;
#[cfg(feature = "mpi")]
use mpi::traits::*;
#[cfg(feature = "mpi")]
use mpi::Count;

#[cfg(feature = "mpi")]
use super::Payload;

/// MPI communicator wrapper for distributed parallelism.
///
/// Holds a communicator, the rank of the current process, and the total number of processes.
#[cfg(feature = "mpi")]
#[derive(Clone)]
pub struct MpiComm {
    /// The communicator this handle talks on.
    pub world: Arc<SimpleCommunicator>,
    /// The rank (ID) of this process within the communicator.
    pub rank: usize,
    /// The total number of processes in the communicator.
    pub size: usize,
    // Finalizes MPI when the last handle drops.
    _universe: Option<Arc<Universe>>,
}

#[cfg(feature = "mpi")]
impl MpiComm {
    /// Initializes MPI and constructs a new `MpiComm` over the world communicator.
    ///
    /// # Panics
    /// Panics if MPI was already initialized.
    pub fn new() -> Self {
        let universe = mpi::initialize().expect("MPI already initialized");
        let world = universe.world();
        let rank = world.rank() as usize;
        let size = world.size() as usize;
        MpiComm { world: Arc::new(world), rank, size, _universe: Some(Arc::new(universe)) }
    }
}

#[cfg(feature = "mpi")]
fn displacements(counts: &[Count]) -> Vec<Count> {
    counts
        .iter()
        .scan(0, |acc, &c| {
            let d = *acc;
            *acc += c;
            Some(d)
        })
        .collect()
}

#[cfg(feature = "mpi")]
impl super::Comm for MpiComm {
    /// Returns the rank (ID) of this process.
    fn rank(&self) -> usize { self.rank }
    /// Returns the total number of processes in the communicator.
    fn size(&self) -> usize { self.size }
    /// Synchronizes all processes at a barrier.
    fn barrier(&self) { self.world.barrier(); }

    fn dup(&self) -> Self {
        MpiComm {
            world: Arc::new(self.world.duplicate()),
            rank: self.rank,
            size: self.size,
            _universe: self._universe.clone(),
        }
    }

    /// Personalized all-to-all: sizes first, then the variable-count payload.
    fn exchange<T: Payload>(&self, outgoing: Vec<Vec<T>>) -> Vec<Vec<T>> {
        let send_counts: Vec<Count> = outgoing.iter().map(|b| b.len() as Count).collect();
        let mut recv_counts = vec![0 as Count; self.size];
        self.world.all_to_all_into(&send_counts[..], &mut recv_counts[..]);

        let send_displs = displacements(&send_counts);
        let recv_displs = displacements(&recv_counts);
        let send_buf: Vec<T> = outgoing.into_iter().flatten().collect();
        let total = recv_counts.iter().sum::<Count>() as usize;
        let mut recv_buf = vec![T::default(); total];
        {
            let send = Partition::new(&send_buf[..], &send_counts[..], &send_displs[..]);
            let mut recv = PartitionMut::new(&mut recv_buf[..], &recv_counts[..], &recv_displs[..]);
            self.world.all_to_all_varcount_into(&send, &mut recv);
        }
        recv_counts
            .iter()
            .zip(&recv_displs)
            .map(|(&c, &d)| recv_buf[d as usize..(d + c) as usize].to_vec())
            .collect()
    }

    /// Performs an element-wise all-reduce sum across all processes.
    fn all_reduce_sum(&self, values: &mut [f64]) {
        let local = values.to_vec();
        self.world.all_reduce_into(&local[..], values, &SystemOperation::sum());
    }

    /// Performs an all-reduce max across all processes.
    fn all_reduce_max(&self, x: f64) -> f64 {
        let mut y = x;
        self.world.all_reduce_into(&x, &mut y, &SystemOperation::max());
        y
    }
}
