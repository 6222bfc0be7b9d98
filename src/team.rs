//! Cooperative worker-team execution context.
//!
//! A [`Team`] owns a dedicated thread pool with a fixed number of workers. A
//! call to [`Team::run`] enters all workers into the same closure at once,
//! each with its own [`Worker`] handle carrying a distinct rank. The call
//! blocks until every worker has returned, so the closure may borrow local
//! data from the caller's stack.
//!
//! Kernels written against [`Worker`] follow an SPMD structure: uniform
//! arguments on every worker, explicit [`Worker::barrier`] calls at the data
//! dependencies, and leader-only writes (see [`Worker::is_leader`]) for
//! results that must be produced exactly once.

use assert2::assert as fancy_assert;
use std::sync::Barrier;

/// Per-worker handle passed to the closure of [`Team::run`].
///
/// The handle identifies one worker within a rendezvous of the whole team: it
/// exposes the worker's rank, the team size, and the team's barrier.
pub struct Worker<'a> {
    rank: usize,
    size: usize,
    barrier: &'a Barrier,
}

impl<'a> Worker<'a> {
    /// Returns the rank of this worker, in `0..self.size()`.
    #[inline]
    pub fn rank(&self) -> usize {
        self.rank
    }

    /// Returns the number of workers in the team.
    #[inline]
    pub fn size(&self) -> usize {
        self.size
    }

    /// Returns `true` on exactly one worker of the team (rank zero).
    ///
    /// Values that must be produced exactly once per team are written by the
    /// leader, with barriers ordering the write relative to the other
    /// workers' reads.
    #[inline]
    pub fn is_leader(&self) -> bool {
        self.rank == 0
    }

    /// Blocks until every worker of the team has reached this call.
    ///
    /// All writes performed by any worker before its barrier call are visible
    /// to every worker after the barrier returns.
    #[inline]
    pub fn barrier(&self) {
        self.barrier.wait();
    }

    /// Partitions the half-open range `[0, len)` into contiguous,
    /// non-overlapping chunks, one per worker, and returns this worker's
    /// chunk as `(start, end)`.
    ///
    /// The chunk lengths differ by at most one and their union covers the
    /// whole range. Workers whose chunk is empty get `start == end`.
    #[inline]
    pub fn split(&self, len: usize) -> (usize, usize) {
        let div = len / self.size;
        let rem = len % self.size;

        // the first `rem` workers get one extra element
        let start = self.rank * div + self.rank.min(rem);
        let extra = usize::from(self.rank < rem);
        (start, start + div + extra)
    }
}

/// A fixed-size team of workers backed by a dedicated thread pool.
pub struct Team {
    pool: rayon::ThreadPool,
    size: usize,
}

impl Team {
    /// Creates a team with `size` workers.
    ///
    /// # Panics
    ///
    /// Panics if `size` is zero or if the worker threads cannot be spawned.
    pub fn new(size: usize) -> Self {
        fancy_assert!(size > 0);
        let pool = match rayon::ThreadPoolBuilder::new().num_threads(size).build() {
            Ok(pool) => pool,
            Err(e) => panic!("failed to spawn worker threads: {e}"),
        };
        Self { pool, size }
    }

    /// Returns the number of workers in the team.
    #[inline]
    pub fn size(&self) -> usize {
        self.size
    }

    /// Runs `f` on every worker of the team simultaneously, and blocks until
    /// all of them have returned.
    ///
    /// Returns the value produced by the leader (rank zero).
    pub fn run<R: Send>(&self, f: impl Fn(&Worker<'_>) -> R + Sync) -> R {
        let barrier = Barrier::new(self.size);
        let size = self.size;

        let results = self.pool.broadcast(|ctx| {
            let worker = Worker {
                rank: ctx.index(),
                size,
                barrier: &barrier,
            };
            f(&worker)
        });

        // broadcast returns one result per worker, in rank order, and the
        // team is never empty
        match results.into_iter().next() {
            Some(r) => r,
            None => unreachable!(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn ranks_are_distinct() {
        let team = Team::new(4);
        let seen = [(); 4].map(|()| AtomicUsize::new(0));
        team.run(|worker| {
            fancy_assert!(worker.size() == 4);
            seen[worker.rank()].fetch_add(1, Ordering::Relaxed);
        });
        for s in &seen {
            fancy_assert!(s.load(Ordering::Relaxed) == 1);
        }
    }

    #[test]
    fn leader_result_is_returned() {
        let team = Team::new(3);
        let r = team.run(|worker| worker.rank() * 10 + 7);
        fancy_assert!(r == 7);
    }

    #[test]
    fn split_covers_range() {
        let team = Team::new(4);
        for len in [0usize, 1, 3, 4, 7, 64, 65] {
            let counts = (0..len).map(|_| AtomicUsize::new(0)).collect::<Vec<_>>();
            team.run(|worker| {
                let (start, end) = worker.split(len);
                fancy_assert!(start <= end);
                fancy_assert!(end <= len);
                for i in start..end {
                    counts[i].fetch_add(1, Ordering::Relaxed);
                }
            });
            for c in &counts {
                fancy_assert!(c.load(Ordering::Relaxed) == 1);
            }
        }
    }

    #[test]
    fn split_is_balanced() {
        let team = Team::new(3);
        team.run(|worker| {
            let (start, end) = worker.split(10);
            let chunk = end - start;
            fancy_assert!(chunk == 3 || chunk == 4);
        });
    }

    #[test]
    fn barrier_orders_leader_write() {
        let team = Team::new(4);
        let value = AtomicUsize::new(0);
        team.run(|worker| {
            if worker.is_leader() {
                value.store(42, Ordering::Relaxed);
            }
            worker.barrier();
            fancy_assert!(value.load(Ordering::Relaxed) == 42);
        });
    }

    #[test]
    fn single_worker_team() {
        let team = Team::new(1);
        let r = team.run(|worker| {
            worker.barrier();
            let (start, end) = worker.split(5);
            (start, end, worker.is_leader())
        });
        fancy_assert!(r == (0, 5, true));
    }
}
