//! `sort(t, keyExpr, shards:=k, [desc:=bool])` — total order by key,
//! ties broken by `Value::sort_key_cmp`'s fingerprint comparison, so the
//! sort is always total and deterministic. Keys are computed in parallel
//! across `shards:=k` shards, one shard's worth at a time (phase A); the
//! per-shard runs are then merged into a single total order (phase B).

use crate::ast::Arg;
use crate::env::Env;
use crate::error::Result;
use crate::eval::EvalCtx;
use crate::hash::Hash;
use crate::value::Value;

pub fn call(ctx: &EvalCtx, args: &[Arg], env: &Env) -> Result<Value> {
    let table = ctx.eval(super::positional(args, 0)?, env)?.as_table()?.clone();
    let key_expr = super::positional(args, 1)?.clone();
    let desc = match super::named(args, "desc") {
        Some(e) => ctx.eval(e, env)?.as_bool()?,
        None => false,
    };
    let underscore = crate::eval::underscore();

    let fingerprint = Hash::of_string("sort")
        .merge(table.fingerprint())
        .merge(key_expr.fingerprint())
        .merge(Hash::of_int(desc as i64));

    let n_shards = super::shard_count(ctx, args, env)?;
    super::materialize(ctx, fingerprint, "sort", || {
        // Phase A: each shard keys its own stride-partitioned rows in
        // parallel.
        let shards = super::run_sharded(ctx, n_shards, |shard, n_shards| {
            let mut scanner = table.scanner(shard, n_shards, 1);
            let mut keyed = Vec::new();
            while scanner.scan() {
                let row = scanner.value();
                let key = ctx.eval_with_row(&key_expr, env, underscore, row.clone())?;
                keyed.push((key, row));
            }
            Ok(keyed)
        })?;

        // Phase B: merge the per-shard runs into a single total order. A
        // plain stable sort over the concatenation is correct regardless of
        // how rows were partitioned across shards in phase A.
        let mut merged: Vec<(Value, Value)> = shards.into_iter().flatten().collect();
        merged.sort_by(|(ka, _), (kb, _)| ka.sort_key_cmp(kb));
        if desc {
            merged.reverse();
        }
        Ok(merged.into_iter().map(|(_, row)| row).collect())
    })
}
