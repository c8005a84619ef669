//! Built-in operator library (spec.md §4.6): `read`, `map`, `filter`,
//! `reduce`, `flatten`, `sort`, `join`, `pick`, `write`, `readdir`. Each
//! operator is implemented against [`crate::eval::EvalCtx`] so it can
//! recursively evaluate its per-row argument expressions without the
//! evaluator needing to know operator-specific argument shapes up front.

pub mod filter;
pub mod flatten;
pub mod join;
pub mod map;
pub mod pick;
pub mod read;
pub mod readdir;
pub mod reduce;
pub mod sort;
pub mod write;

use crate::ast::{Arg, Expr};
use crate::env::Env;
use crate::error::{GqlError, Result};
use crate::eval::EvalCtx;
use crate::hash::Hash;
use crate::scheduler::LocalScheduler;
use crate::table::{MemTable, TableAttrs};
use crate::value::Value;

/// The `i`th positional argument, skipping named ones (spec.md §4.5: call
/// arguments may be positional or named).
pub fn positional(args: &[Arg], i: usize) -> Result<&Expr> {
    args.iter()
        .filter_map(|a| match a {
            Arg::Positional(e) => Some(e),
            Arg::Named(_, _) => None,
        })
        .nth(i)
        .ok_or_else(|| GqlError::Internal(format!("missing positional argument #{i}")))
}

/// A named argument (e.g. `map:=expr`, `shards:=4`), if present.
pub fn named<'a>(args: &'a [Arg], name: &str) -> Option<&'a Expr> {
    args.iter().find_map(|a| match a {
        Arg::Named(n, e) if &*n.str() == name => Some(e),
        _ => None,
    })
}

/// Resolve the effective shard count for an operator call: the `shards:=k`
/// named argument (spec.md §4.6) if present, otherwise the session's
/// default concurrency.
pub fn shard_count(ctx: &EvalCtx, args: &[Arg], env: &Env) -> Result<usize> {
    match named(args, "shards") {
        Some(e) => {
            let n = ctx.eval(e, env)?.as_int()?;
            if n < 1 {
                return Err(GqlError::Internal(format!("shards must be >= 1, got {n}")));
            }
            Ok(n as usize)
        }
        None => Ok(ctx.scheduler.n_shards()),
    }
}

/// Run `f` across `n_shards` shards. Reuses the session's own scheduler
/// when `n_shards` matches its default concurrency; spins up a dedicated
/// [`LocalScheduler`] only when a `shards:=k` override asked for a
/// different count.
pub fn run_sharded<T, F>(ctx: &EvalCtx, n_shards: usize, f: F) -> Result<Vec<T>>
where
    T: Send,
    F: Fn(usize, usize) -> Result<T> + Sync,
{
    if n_shards == ctx.scheduler.n_shards() {
        ctx.scheduler.run(f)
    } else {
        LocalScheduler::new(n_shards).run(f)
    }
}

/// Consult the materialization cache for `fingerprint` before running
/// `produce` (spec.md §4.7, §2: "expensive stages... compute a
/// fingerprint, consult the cache, and either stream the cached artifact
/// or execute and populate it"). Shared by every operator spec.md §2 names
/// as a materializing stage (`reduce`, `sort`; `write` persists through its
/// own `FileHandler` instead of this cache).
pub fn materialize(
    ctx: &EvalCtx,
    fingerprint: Hash,
    name: &str,
    produce: impl FnOnce() -> Result<Vec<Value>>,
) -> Result<Value> {
    let rows = ctx.cache.build(fingerprint, produce)?;
    Ok(Value::Table(MemTable::new(
        (*rows).clone(),
        fingerprint,
        TableAttrs {
            name: name.to_string(),
            ..Default::default()
        },
    )))
}
