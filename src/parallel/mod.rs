//! Communicators: the collective layer every distributed object sits on.
//!
//! All methods marked collective must be called by every rank of the group,
//! in the same order and the same number of times.

/// Plain data that can travel through [`Comm::exchange`].
#[cfg(feature = "mpi")]
pub trait Payload: Copy + Default + Send + 'static + mpi::datatype::Equivalence {}
#[cfg(not(feature = "mpi"))]
pub trait Payload: Copy + Default + Send + 'static {}

impl Payload for f64 {}
impl Payload for i64 {}
impl Payload for u64 {}

pub trait Comm: Clone {
    fn rank(&self) -> usize;
    fn size(&self) -> usize;
    fn barrier(&self);

    /// Collective clone: every rank receives a handle to a new, independent
    /// communication context over the same group.
    fn dup(&self) -> Self;

    /// Personalized all-to-all. `outgoing[p]` is delivered to rank `p`; entry
    /// `q` of the result is what rank `q` sent to this rank.
    fn exchange<T: Payload>(&self, outgoing: Vec<Vec<T>>) -> Vec<Vec<T>>;

    /// Every rank's `local` slice, indexed by rank.
    fn all_gather<T: Payload>(&self, local: &[T]) -> Vec<Vec<T>> {
        self.exchange(vec![local.to_vec(); self.size()])
    }

    /// Element-wise global sum, in place. Contributions are added in rank
    /// order so all ranks see identical bits.
    fn all_reduce_sum(&self, values: &mut [f64]) {
        let gathered = self.all_gather(values);
        values.iter_mut().for_each(|v| *v = 0.0);
        for contribution in &gathered {
            for (v, c) in values.iter_mut().zip(contribution) {
                *v += *c;
            }
        }
    }

    fn all_reduce(&self, x: f64) -> f64 {
        let mut buf = [x];
        self.all_reduce_sum(&mut buf);
        buf[0]
    }

    fn all_reduce_max(&self, x: f64) -> f64 {
        self.all_gather(&[x])
            .iter()
            .flatten()
            .copied()
            .fold(f64::NEG_INFINITY, f64::max)
    }

    fn sum_count(&self, n: usize) -> usize {
        self.all_gather(&[n as u64])
            .iter()
            .flatten()
            .map(|&c| c as usize)
            .sum()
    }

    /// Logical AND across the group.
    fn all_true(&self, flag: bool) -> bool {
        self.all_gather(&[u64::from(flag)])
            .iter()
            .flatten()
            .all(|&f| f == 1)
    }

    fn dot(&self, a: &[f64], b: &[f64]) -> f64 {
        let local = a.iter().zip(b).map(|(&x, &y)| x * y).sum::<f64>();
        self.all_reduce(local)
    }
}

#[cfg(feature = "mpi")]
pub mod mpi_comm;
#[cfg(feature = "mpi")]
pub use mpi_comm::MpiComm;

pub mod serial_comm;
pub use serial_comm::SerialComm;

pub mod thread_comm;
pub use thread_comm::ThreadComm;

#[derive(Clone)]
pub enum UniverseComm {
    #[cfg(feature = "mpi")]
    Mpi(MpiComm),
    Threads(ThreadComm),
    Serial(SerialComm),
}

impl Default for UniverseComm {
    fn default() -> Self {
        UniverseComm::Serial(SerialComm)
    }
}

impl Comm for UniverseComm {
    fn rank(&self) -> usize {
        match self {
            #[cfg(feature = "mpi")]
            UniverseComm::Mpi(comm) => comm.rank(),
            UniverseComm::Threads(comm) => comm.rank(),
            UniverseComm::Serial(comm) => comm.rank(),
        }
    }
    fn size(&self) -> usize {
        match self {
            #[cfg(feature = "mpi")]
            UniverseComm::Mpi(comm) => comm.size(),
            UniverseComm::Threads(comm) => comm.size(),
            UniverseComm::Serial(comm) => comm.size(),
        }
    }
    fn barrier(&self) {
        match self {
            #[cfg(feature = "mpi")]
            UniverseComm::Mpi(comm) => comm.barrier(),
            UniverseComm::Threads(comm) => comm.barrier(),
            UniverseComm::Serial(comm) => comm.barrier(),
        }
    }
    fn dup(&self) -> Self {
        match self {
            #[cfg(feature = "mpi")]
            UniverseComm::Mpi(comm) => UniverseComm::Mpi(comm.dup()),
            UniverseComm::Threads(comm) => UniverseComm::Threads(comm.dup()),
            UniverseComm::Serial(comm) => UniverseComm::Serial(comm.dup()),
        }
    }
    fn exchange<T: Payload>(&self, outgoing: Vec<Vec<T>>) -> Vec<Vec<T>> {
        match self {
            #[cfg(feature = "mpi")]
            UniverseComm::Mpi(comm) => comm.exchange(outgoing),
            UniverseComm::Threads(comm) => comm.exchange(outgoing),
            UniverseComm::Serial(comm) => comm.exchange(outgoing),
        }
    }
    fn all_reduce_sum(&self, values: &mut [f64]) {
        match self {
            #[cfg(feature = "mpi")]
            UniverseComm::Mpi(comm) => comm.all_reduce_sum(values),
            UniverseComm::Threads(comm) => comm.all_reduce_sum(values),
            UniverseComm::Serial(comm) => comm.all_reduce_sum(values),
        }
    }
    fn all_reduce_max(&self, x: f64) -> f64 {
        match self {
            #[cfg(feature = "mpi")]
            UniverseComm::Mpi(comm) => comm.all_reduce_max(x),
            UniverseComm::Threads(comm) => comm.all_reduce_max(x),
            UniverseComm::Serial(comm) => comm.all_reduce_max(x),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn universe_serial_is_single_rank() {
        let comm = UniverseComm::default();
        assert_eq!(comm.rank(), 0);
        assert_eq!(comm.size(), 1);
        assert_eq!(comm.all_reduce(2.5), 2.5);
        assert_eq!(comm.sum_count(7), 7);
        assert!(comm.all_true(true));
    }

    #[test]
    fn universe_threads_dispatch() {
        let sums = ThreadComm::run(3, |comm| {
            let comm = UniverseComm::Threads(comm);
            let dup = comm.dup();
            (comm.all_reduce(comm.rank() as f64), dup.sum_count(1))
        });
        assert!(sums.iter().all(|&(s, n)| s == 3.0 && n == 3));
    }
}
