//! `flatten(t1, t2, …, subshard:=bool)` — logical concatenation of one or
//! more tables; any row that is itself a `Table` (typically the result of
//! a `map` whose body produced sub-tables) is expanded into its own rows
//! rather than passed through as a single row (spec.md §4.6). When
//! `subshard=true`, each shard draws from the same-numbered shard of every
//! input in parallel (parallelism-preserving); otherwise the inputs are
//! walked in order.

use crate::ast::Arg;
use crate::env::Env;
use crate::error::{GqlError, Result};
use crate::eval::EvalCtx;
use crate::hash::Hash;
use crate::table::{MemTable, Table, TableAttrs};
use crate::value::Value;

fn flatten_row(row: Value, out: &mut Vec<Value>) {
    match row {
        Value::Table(inner) => out.extend(inner.collect()),
        other => out.push(other),
    }
}

pub fn call(ctx: &EvalCtx, args: &[Arg], env: &Env) -> Result<Value> {
    let tables: Vec<Table> = args
        .iter()
        .filter_map(|a| match a {
            Arg::Positional(e) => Some(e),
            Arg::Named(_, _) => None,
        })
        .map(|e| Ok(ctx.eval(e, env)?.as_table()?.clone()))
        .collect::<Result<Vec<_>>>()?;
    if tables.is_empty() {
        return Err(GqlError::Internal("flatten requires at least one table argument".into()));
    }
    let subshard = match super::named(args, "subshard") {
        Some(e) => ctx.eval(e, env)?.as_bool()?,
        None => false,
    };

    let rows = if subshard {
        let n_shards = super::shard_count(ctx, args, env)?;
        let parts = super::run_sharded(ctx, n_shards, |shard, n_shards| {
            let mut out = Vec::new();
            for t in &tables {
                let mut scanner = t.scanner(shard, n_shards, 1);
                while scanner.scan() {
                    flatten_row(scanner.value(), &mut out);
                }
            }
            Ok(out)
        })?;
        parts.into_iter().flatten().collect::<Vec<_>>()
    } else {
        let mut out = Vec::new();
        for t in &tables {
            for row in t.collect() {
                flatten_row(row, &mut out);
            }
        }
        out
    };

    let fingerprint = tables
        .iter()
        .fold(Hash::of_string("flatten"), |h, t| h.merge(t.fingerprint()))
        .merge(Hash::of_int(subshard as i64));
    Ok(Value::Table(MemTable::new(
        rows,
        fingerprint,
        TableAttrs {
            name: "flatten".to_string(),
            ..Default::default()
        },
    )))
}
