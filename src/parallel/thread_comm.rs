//! In-process communicator: a group of ranks, one OS thread each.
//!
//! Ranks meet at a shared mailbox of `size * size` slots. `exchange` posts
//! into row `rank`, waits at the group barrier, drains column `rank`, and
//! waits again so the mailbox is empty before the next collective starts.
//! The same SPMD discipline as MPI applies: a rank that skips a collective
//! leaves the others blocked at the barrier.

use std::any::Any;
use std::sync::{Arc, Barrier, Mutex, MutexGuard, PoisonError};

use super::{Comm, Payload};

type Slot = Option<Box<dyn Any + Send>>;

struct Group {
    size: usize,
    barrier: Barrier,
    mailbox: Mutex<Vec<Slot>>,
    // Context handed out by the last `dup`.
    spawned: Mutex<Option<Arc<Group>>>,
}

impl Group {
    fn new(size: usize) -> Arc<Self> {
        Arc::new(Group {
            size,
            barrier: Barrier::new(size),
            mailbox: Mutex::new((0..size * size).map(|_| None).collect()),
            spawned: Mutex::new(None),
        })
    }
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

/// One rank's handle on a thread group.
#[derive(Clone)]
pub struct ThreadComm {
    rank: usize,
    group: Arc<Group>,
}

impl ThreadComm {
    /// Handles for every rank of a fresh group, indexed by rank.
    ///
    /// # Panics
    /// Panics if `size == 0`.
    pub fn group(size: usize) -> Vec<ThreadComm> {
        assert!(size > 0, "a communicator group needs at least one rank");
        let group = Group::new(size);
        (0..size)
            .map(|rank| ThreadComm { rank, group: Arc::clone(&group) })
            .collect()
    }

    /// Runs `f` once per rank on its own thread and returns the results in
    /// rank order. A panic on any rank is re-raised here.
    pub fn run<F, R>(size: usize, f: F) -> Vec<R>
    where
        F: Fn(ThreadComm) -> R + Sync,
        R: Send,
    {
        let comms = Self::group(size);
        std::thread::scope(|s| {
            let handles: Vec<_> = comms
                .into_iter()
                .map(|comm| {
                    let f = &f;
                    s.spawn(move || f(comm))
                })
                .collect();
            handles
                .into_iter()
                .map(|h| match h.join() {
                    Ok(r) => r,
                    Err(payload) => std::panic::resume_unwind(payload),
                })
                .collect()
        })
    }
}

impl Comm for ThreadComm {
    fn rank(&self) -> usize { self.rank }
    fn size(&self) -> usize { self.group.size }
    fn barrier(&self) { self.group.barrier.wait(); }

    fn dup(&self) -> Self {
        if self.rank == 0 {
            *lock(&self.group.spawned) = Some(Group::new(self.group.size));
        }
        self.group.barrier.wait();
        let fresh = lock(&self.group.spawned).as_ref().map(Arc::clone);
        self.group.barrier.wait();
        if self.rank == 0 {
            lock(&self.group.spawned).take();
        }
        ThreadComm {
            rank: self.rank,
            // rank 0 always publishes before the first wait
            group: fresh.unwrap_or_else(|| Arc::clone(&self.group)),
        }
    }

    fn exchange<T: Payload>(&self, outgoing: Vec<Vec<T>>) -> Vec<Vec<T>> {
        let size = self.group.size;
        debug_assert_eq!(outgoing.len(), size, "exchange needs one buffer per rank");
        {
            let mut mailbox = lock(&self.group.mailbox);
            for (dst, buf) in outgoing.into_iter().enumerate().take(size) {
                mailbox[self.rank * size + dst] = Some(Box::new(buf));
            }
        }
        self.group.barrier.wait();
        let incoming = {
            let mut mailbox = lock(&self.group.mailbox);
            (0..size)
                .map(|src| {
                    mailbox[src * size + self.rank]
                        .take()
                        .and_then(|b| b.downcast::<Vec<T>>().ok())
                        .map(|b| *b)
                        .unwrap_or_default()
                })
                .collect()
        };
        self.group.barrier.wait();
        incoming
    }
}
