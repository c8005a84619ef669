//! `write(table, path, [shards:=n], [overwrite:=bool])` — persist a table
//! via the registered `FileHandler` for `path`'s extension (spec.md §4.6).
//! Returns the table unchanged so `write(...)` can sit mid-pipeline.

use crate::ast::Arg;
use crate::env::Env;
use crate::error::Result;
use crate::eval::EvalCtx;
use crate::value::Value;

pub fn call(ctx: &EvalCtx, args: &[Arg], env: &Env) -> Result<Value> {
    let table_expr = super::positional(args, 0)?;
    let table = ctx.eval(table_expr, env)?.as_table()?.clone();
    let path = ctx.eval(super::positional(args, 1)?, env)?.as_str()?;

    let shards = match super::named(args, "shards") {
        Some(e) => ctx.eval(e, env)?.as_int()?.max(1) as usize,
        None => ctx.config.n_shards,
    };
    let overwrite = match super::named(args, "overwrite") {
        Some(e) => ctx.eval(e, env)?.as_bool()?,
        None => ctx.config.overwrite_files,
    };

    let handler = ctx.files.by_path(&path)?;
    handler.write(&ctx.interrupt, &path, table_expr, &table, shards, overwrite)?;
    Ok(Value::Table(table))
}
