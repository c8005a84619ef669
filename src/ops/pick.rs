//! `pick(t, expr)` — the first row of shard 0 (scanned with N=1) where
//! `expr` evaluates to true; Null if none (spec.md §4.6). Unlike the
//! other operators, `pick` deliberately does not fan out across shards:
//! the spec pins it to a single, unsharded scan so its result never
//! depends on how many shards the table happens to have.

use crate::ast::Arg;
use crate::env::Env;
use crate::error::Result;
use crate::eval::EvalCtx;
use crate::value::{NullSign, Value};

pub fn call(ctx: &EvalCtx, args: &[Arg], env: &Env) -> Result<Value> {
    let table = ctx.eval(super::positional(args, 0)?, env)?.as_table()?.clone();
    let pred = super::positional(args, 1).ok().cloned();
    let underscore = crate::eval::underscore();

    let mut scanner = table.scanner(0, 1, 1);
    while scanner.scan() {
        if ctx.interrupt.is_interrupted() {
            return Err(crate::error::GqlError::Interrupted);
        }
        let row = scanner.value();
        let matched = match &pred {
            Some(p) => ctx.eval_with_row(p, env, underscore, row.clone())?.as_bool()?,
            None => true,
        };
        if matched {
            return Ok(row);
        }
    }
    Ok(Value::Null(NullSign::Pos))
}
