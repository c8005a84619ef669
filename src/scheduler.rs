//! Local thread-pool stand-in for the distributed "bigslice" scheduler
//! collaborator named in spec.md §1/§5. Implements exactly the contract an
//! operator needs: run `k` shard functions, each told its own
//! `(shard_index, n_shards)`, and collect their results. A real distributed
//! scheduler would place these across worker nodes; this one places them
//! across `rayon`'s thread pool on a single machine.

use rayon::prelude::*;

use crate::error::Result;

/// Runs shard closures to completion, collecting their results in shard
/// order (spec.md §5: "No operator result depends on which thread executed
/// it" — the *order* of results here is always by shard index, regardless
/// of completion order, so downstream combining stays deterministic).
pub struct LocalScheduler {
    n_shards: usize,
}

impl LocalScheduler {
    pub fn new(n_shards: usize) -> Self {
        assert!(n_shards >= 1, "a scheduler needs at least one shard");
        LocalScheduler { n_shards }
    }

    pub fn n_shards(&self) -> usize {
        self.n_shards
    }

    /// Run `f(shard_index, n_shards)` for every shard, in parallel, and
    /// return the per-shard results in shard order. The first error
    /// encountered is propagated; other shards are still allowed to run to
    /// completion (this crate does not attempt cooperative short-circuit —
    /// callers that want early-out cancellation should use
    /// [`crate::interrupt::InterruptContext`]).
    pub fn run<T, F>(&self, f: F) -> Result<Vec<T>>
    where
        T: Send,
        F: Fn(usize, usize) -> Result<T> + Sync,
    {
        (0..self.n_shards)
            .into_par_iter()
            .map(|shard| f(shard, self.n_shards))
            .collect()
    }

    /// Like [`LocalScheduler::run`], but also reduces the per-shard results
    /// with `combine`, starting from `identity()`. Used by operators (e.g.
    /// `reduce`'s phase-B re-group, `sort`'s merge) whose final output is a
    /// fold over per-shard partials rather than the partials themselves.
    pub fn run_reduce<T, F, C, I>(&self, identity: I, f: F, combine: C) -> Result<T>
    where
        T: Send,
        F: Fn(usize, usize) -> Result<T> + Sync,
        C: Fn(T, T) -> T + Sync,
        I: Fn() -> T + Sync,
    {
        let parts = self.run(f)?;
        Ok(parts.into_iter().fold(identity(), combine))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_shard_sees_its_own_index_and_total() {
        let sched = LocalScheduler::new(4);
        let results = sched.run(|shard, n| Ok((shard, n))).unwrap();
        assert_eq!(results, vec![(0, 4), (1, 4), (2, 4), (3, 4)]);
    }

    #[test]
    fn run_reduce_folds_in_shard_order_independent_results() {
        let sched = LocalScheduler::new(3);
        let sum = sched
            .run_reduce(|| 0i64, |shard, _n| Ok(shard as i64), |a, b| a + b)
            .unwrap();
        assert_eq!(sum, 0 + 1 + 2);
    }

    #[test]
    fn error_in_one_shard_propagates() {
        let sched = LocalScheduler::new(2);
        let result: Result<Vec<i64>> = sched.run(|shard, _n| {
            if shard == 1 {
                Err(crate::error::GqlError::Internal("boom".into()))
            } else {
                Ok(0)
            }
        });
        assert!(result.is_err());
    }
}
