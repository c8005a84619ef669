//! `filter(t, f, shards:=k)` — keep only rows for which `f` (with `_`
//! bound to the row) evaluates to `true` (spec.md §4.6). Lazy in spirit;
//! preserves input row order within a shard.

use crate::ast::Arg;
use crate::env::Env;
use crate::error::Result;
use crate::eval::EvalCtx;
use crate::hash::Hash;
use crate::table::{MemTable, TableAttrs};
use crate::value::Value;

pub fn call(ctx: &EvalCtx, args: &[Arg], env: &Env) -> Result<Value> {
    let table = ctx.eval(super::positional(args, 0)?, env)?.as_table()?.clone();
    let pred = super::positional(args, 1)?.clone();
    let underscore = crate::eval::underscore();

    let n_shards = super::shard_count(ctx, args, env)?;
    let parts = super::run_sharded(ctx, n_shards, |shard, n_shards| {
        let mut scanner = table.scanner(shard, n_shards, 1);
        let mut out = Vec::new();
        while scanner.scan() {
            let row = scanner.value();
            if ctx.eval_with_row(&pred, env, underscore, row.clone())?.as_bool()? {
                out.push(row);
            }
        }
        Ok(out)
    })?;
    let rows: Vec<Value> = parts.into_iter().flatten().collect();

    let fingerprint = Hash::of_string("filter").merge(table.fingerprint()).merge(pred.fingerprint());
    Ok(Value::Table(MemTable::new(
        rows,
        fingerprint,
        TableAttrs {
            name: "filter".to_string(),
            ..Default::default()
        },
    )))
}
