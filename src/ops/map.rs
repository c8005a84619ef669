//! `map(t, e, filter:=g?, row:=name?, shards:=k)` — apply `e` to every row,
//! optionally skipping rows where `g` is false, producing a new table of
//! the results (spec.md §4.6). `row` rebinds the implicit row variable;
//! the default `_` is used when unset.

use crate::ast::{Arg, Expr};
use crate::env::Env;
use crate::error::{GqlError, Result};
use crate::eval::EvalCtx;
use crate::hash::Hash;
use crate::table::{MemTable, TableAttrs};
use crate::value::Value;

/// Resolve the `row:=name` named argument to the symbol it rebinds the
/// implicit row variable to. The right-hand side names a variable rather
/// than evaluating to one, so it must be a bare identifier.
fn row_binding(args: &[Arg]) -> Result<crate::symbol::SymbolId> {
    match super::named(args, "row") {
        Some(Expr::Var(sym)) => Ok(*sym),
        Some(_) => Err(GqlError::Internal("`row:=` must name a bare identifier".into())),
        None => Ok(crate::eval::underscore()),
    }
}

pub fn call(ctx: &EvalCtx, args: &[Arg], env: &Env) -> Result<Value> {
    let table = ctx.eval(super::positional(args, 0)?, env)?.as_table()?.clone();
    let body = super::positional(args, 1)?.clone();
    let filter_expr = super::named(args, "filter").cloned();
    let row_sym = row_binding(args)?;

    let n_shards = super::shard_count(ctx, args, env)?;
    let parts = super::run_sharded(ctx, n_shards, |shard, n_shards| {
        let mut scanner = table.scanner(shard, n_shards, 1);
        let mut out = Vec::new();
        while scanner.scan() {
            let row = scanner.value();
            let keep = match &filter_expr {
                Some(g) => ctx.eval_with_row(g, env, row_sym, row.clone())?.as_bool()?,
                None => true,
            };
            if keep {
                out.push(ctx.eval_with_row(&body, env, row_sym, row)?);
            }
        }
        Ok(out)
    })?;
    let rows: Vec<Value> = parts.into_iter().flatten().collect();

    let mut fingerprint = Hash::of_string("map").merge(table.fingerprint()).merge(body.fingerprint());
    if let Some(g) = &filter_expr {
        fingerprint = fingerprint.merge(g.fingerprint());
    }
    Ok(Value::Table(MemTable::new(
        rows,
        fingerprint,
        TableAttrs {
            name: "map".to_string(),
            ..Default::default()
        },
    )))
}
