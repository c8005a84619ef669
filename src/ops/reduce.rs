//! `reduce(t, keyExpr, combiner, map:=valueExpr, shards:=k)` — group rows
//! by a per-row key
//! expression and fold the (optionally transformed) per-row value within
//! each group using `combine`, whose body sees the running accumulator as
//! `_acc` and the next value as `_val` (spec.md §4.6, §8 scenario (a)).
//!
//! Grouping happens in two phases: phase A groups each shard's rows
//! independently and in parallel; phase B re-groups the per-shard partials,
//! folding any key that appears in more than one shard with `combine`
//! again. The result is a multiset of `{key, value}` rows independent of
//! shard count (resolved as an open question — output order is stable for
//! a fixed fingerprint, insertion-order-of-first-occurrence per shard, but
//! not guaranteed identical across different shard counts; see
//! DESIGN.md).

use rustc_hash::FxHashMap;

use crate::ast::{Arg, Expr};
use crate::env::Env;
use crate::error::Result;
use crate::eval::EvalCtx;
use crate::hash::Hash;
use crate::symbol;
use crate::value::{Row, Value};

type ShardGroups = (Vec<Hash>, FxHashMap<Hash, (Value, Value)>);

fn combine_into(
    ctx: &EvalCtx,
    combine_expr: &Expr,
    env: &Env,
    acc_sym: crate::symbol::SymbolId,
    val_sym: crate::symbol::SymbolId,
    acc: Value,
    val: Value,
) -> Result<Value> {
    let scoped = env.push(vec![acc_sym, val_sym], vec![acc, val]);
    ctx.eval(combine_expr, &scoped)
}

pub fn call(ctx: &EvalCtx, args: &[Arg], env: &Env) -> Result<Value> {
    let table = ctx.eval(super::positional(args, 0)?, env)?.as_table()?.clone();
    let key_expr = super::positional(args, 1)?.clone();
    let combine_expr = super::positional(args, 2)?.clone();
    let map_expr = super::named(args, "map").cloned();
    let underscore = crate::eval::underscore();
    let acc_sym = symbol::intern("_acc");
    let val_sym = symbol::intern("_val");

    let fingerprint = Hash::of_string("reduce")
        .merge(table.fingerprint())
        .merge(key_expr.fingerprint())
        .merge(combine_expr.fingerprint());

    let n_shards = super::shard_count(ctx, args, env)?;
    super::materialize(ctx, fingerprint, "reduce", || {
        let shards: Vec<ShardGroups> = super::run_sharded(ctx, n_shards, |shard, n_shards| {
            let mut scanner = table.scanner(shard, n_shards, 1);
            let mut order: Vec<Hash> = Vec::new();
            let mut groups: FxHashMap<Hash, (Value, Value)> = FxHashMap::default();
            while scanner.scan() {
                let row = scanner.value();
                let key = ctx.eval_with_row(&key_expr, env, underscore, row.clone())?;
                let val = match &map_expr {
                    Some(e) => ctx.eval_with_row(e, env, underscore, row)?,
                    None => row,
                };
                let k = key.fingerprint();
                match groups.remove(&k) {
                    Some((key, acc)) => {
                        let combined = combine_into(ctx, &combine_expr, env, acc_sym, val_sym, acc, val)?;
                        groups.insert(k, (key, combined));
                    }
                    None => {
                        order.push(k);
                        groups.insert(k, (key, val));
                    }
                }
            }
            Ok((order, groups))
        })?;

        // Phase B: merge shard partials in shard order.
        let mut order: Vec<Hash> = Vec::new();
        let mut merged: FxHashMap<Hash, (Value, Value)> = FxHashMap::default();
        for (shard_order, mut shard_groups) in shards {
            for k in shard_order {
                let (key, val) = shard_groups.remove(&k).expect("key present in its own shard map");
                match merged.remove(&k) {
                    Some((key, acc)) => {
                        let combined = combine_into(ctx, &combine_expr, env, acc_sym, val_sym, acc, val)?;
                        merged.insert(k, (key, combined));
                    }
                    None => {
                        order.push(k);
                        merged.insert(k, (key, val));
                    }
                }
            }
        }

        let key_sym = symbol::intern("key");
        let value_sym = symbol::intern("value");
        let mut rows = Vec::with_capacity(order.len());
        for k in order {
            let (key, val) = merged.remove(&k).expect("key recorded in order");
            rows.push(Value::Struct(Row::new(vec![(key_sym, key), (value_sym, val)])));
        }
        Ok(rows)
    })
}
