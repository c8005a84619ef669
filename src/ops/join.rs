//! `join(left, right, on:=pred)` — pair every `(l, r)` for which `pred(l, r)`
//! is true, producing one combined struct row per matching pair (spec.md
//! §4.6). `pred` is a two-parameter closure; when its body is a plain
//! equality between an expression of the left row and one of the right row
//! (the common case: `|l, r| l.k1 == r.k2`), the join runs as a hash join
//! (or sort-merge, above `HASH_JOIN_THRESHOLD` rows) keyed on those two
//! sides. Any other predicate shape falls back to a nested-loop scan —
//! correct for arbitrary predicates, but quadratic.

use rustc_hash::FxHashMap;

use crate::ast::{BinOp, Expr};
use crate::env::Env;
use crate::error::{GqlError, Result};
use crate::eval::EvalCtx;
use crate::hash::Hash;
use crate::symbol::SymbolId;
use crate::table::{LenKind, MemTable, Table, TableAttrs};
use crate::value::{Closure, Row, Value};

/// Below this many (approximate) rows, the right side of a `join` is
/// hash-joined in memory; above it, both sides are sorted and merge-joined.
pub const HASH_JOIN_THRESHOLD: u64 = 10_000;

fn combine_rows(left: &Value, right: &Value) -> Result<Value> {
    let l = left.as_struct()?;
    let r = right.as_struct()?;
    let mut fields: Vec<(SymbolId, Value)> = l.fields().to_vec();
    for (name, value) in r.fields() {
        if l.get(*name).is_none() {
            fields.push((*name, value.clone()));
        }
    }
    Ok(Value::Struct(Row::new(fields)))
}

/// If `pred`'s body is `a == b` where `a` references only `left_param` and
/// `b` references only `right_param` (or vice versa), return the two
/// key-extraction expressions in `(left_key, right_key)` order.
fn extract_equi_keys(closure: &Closure) -> Option<(Expr, Expr)> {
    let [left_param, right_param] = closure.params.as_ref() else {
        return None;
    };
    let Expr::Binary(BinOp::Eq, a, b) = &*closure.body else {
        return None;
    };
    let refs_only = |e: &Expr, only: SymbolId, not: SymbolId| {
        let mut fv = Vec::new();
        e.free_vars(&mut fv);
        fv.contains(&only) && !fv.contains(&not)
    };
    if refs_only(a, *left_param, *right_param) && refs_only(b, *right_param, *left_param) {
        Some(((**a).clone(), (**b).clone()))
    } else if refs_only(a, *right_param, *left_param) && refs_only(b, *left_param, *right_param) {
        Some(((**b).clone(), (**a).clone()))
    } else {
        None
    }
}

pub fn call(ctx: &EvalCtx, args: &[crate::ast::Arg], env: &Env) -> Result<Value> {
    let left = ctx.eval(super::positional(args, 0)?, env)?.as_table()?.clone();
    let right = ctx.eval(super::positional(args, 1)?, env)?.as_table()?.clone();
    let on_expr = super::named(args, "on")
        .ok_or_else(|| GqlError::Internal("join requires an `on:=pred` argument".into()))?
        .clone();
    let pred = ctx.eval(&on_expr, env)?.as_closure()?.clone();
    if pred.params.len() != 2 {
        return Err(GqlError::Internal("join's `on:=` predicate must take exactly two arguments".into()));
    }

    let underscore_key = extract_equi_keys(&pred);
    let rows = match &underscore_key {
        Some((left_key, right_key)) => {
            let (left_param, right_param) = (pred.params[0], pred.params[1]);
            let right_len = right.len(LenKind::Approx).unwrap_or(u64::MAX);
            if right_len <= HASH_JOIN_THRESHOLD {
                hash_join(ctx, &left, &right, left_key, right_key, env, left_param, right_param)?
            } else {
                sort_merge_join(ctx, &left, &right, left_key, right_key, env, left_param, right_param)?
            }
        }
        None => nested_loop_join(ctx, &left, &right, &pred)?,
    };

    let fingerprint = Hash::of_string("join")
        .merge(left.fingerprint())
        .merge(right.fingerprint())
        .merge(on_expr.fingerprint());
    Ok(Value::Table(MemTable::new(
        rows,
        fingerprint,
        TableAttrs {
            name: "join".to_string(),
            ..Default::default()
        },
    )))
}

fn nested_loop_join(ctx: &EvalCtx, left: &Table, right: &Table, pred: &std::sync::Arc<Closure>) -> Result<Vec<Value>> {
    let right_rows = right.collect();
    let mut rows = Vec::new();
    for lrow in left.collect() {
        for rrow in &right_rows {
            if ctx.call_closure(pred, vec![lrow.clone(), rrow.clone()])?.as_bool()? {
                rows.push(combine_rows(&lrow, rrow)?);
            }
        }
    }
    Ok(rows)
}

fn hash_join(
    ctx: &EvalCtx,
    left: &Table,
    right: &Table,
    left_key: &Expr,
    right_key: &Expr,
    env: &Env,
    left_param: SymbolId,
    right_param: SymbolId,
) -> Result<Vec<Value>> {
    let mut by_key: FxHashMap<Hash, Vec<Value>> = FxHashMap::default();
    for row in right.collect() {
        let key = ctx.eval_with_row(right_key, env, right_param, row.clone())?;
        by_key.entry(key.fingerprint()).or_default().push(row);
    }

    let mut rows = Vec::new();
    for lrow in left.collect() {
        let key = ctx.eval_with_row(left_key, env, left_param, lrow.clone())?;
        if let Some(matches) = by_key.get(&key.fingerprint()) {
            for rrow in matches {
                rows.push(combine_rows(&lrow, rrow)?);
            }
        }
    }
    Ok(rows)
}

fn sort_merge_join(
    ctx: &EvalCtx,
    left: &Table,
    right: &Table,
    left_key: &Expr,
    right_key: &Expr,
    env: &Env,
    left_param: SymbolId,
    right_param: SymbolId,
) -> Result<Vec<Value>> {
    let mut lkeyed: Vec<(Value, Value)> = Vec::new();
    for row in left.collect() {
        let key = ctx.eval_with_row(left_key, env, left_param, row.clone())?;
        lkeyed.push((key, row));
    }
    let mut rkeyed: Vec<(Value, Value)> = Vec::new();
    for row in right.collect() {
        let key = ctx.eval_with_row(right_key, env, right_param, row.clone())?;
        rkeyed.push((key, row));
    }
    lkeyed.sort_by(|(a, _), (b, _)| a.sort_key_cmp(b));
    rkeyed.sort_by(|(a, _), (b, _)| a.sort_key_cmp(b));

    let mut rows = Vec::new();
    let mut li = 0usize;
    let mut ri = 0usize;
    while li < lkeyed.len() && ri < rkeyed.len() {
        match lkeyed[li].0.sort_key_cmp(&rkeyed[ri].0) {
            std::cmp::Ordering::Less => li += 1,
            std::cmp::Ordering::Greater => ri += 1,
            std::cmp::Ordering::Equal => {
                let lend = run_end(&lkeyed, li);
                let rend = run_end(&rkeyed, ri);
                for l in &lkeyed[li..lend] {
                    for r in &rkeyed[ri..rend] {
                        rows.push(combine_rows(&l.1, &r.1)?);
                    }
                }
                li = lend;
                ri = rend;
            }
        }
    }
    Ok(rows)
}

/// End (exclusive) of the run of entries starting at `start` that compare
/// equal to it, for a slice already sorted by `sort_key_cmp`.
fn run_end(keyed: &[(Value, Value)], start: usize) -> usize {
    let mut end = start + 1;
    while end < keyed.len() && keyed[end].0.sort_key_cmp(&keyed[start].0) == std::cmp::Ordering::Equal {
        end += 1;
    }
    end
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::Arg;
    use crate::cache::Cache;
    use crate::filehandler::Registry;
    use crate::interrupt::InterruptContext;
    use crate::scheduler::LocalScheduler;
    use crate::symbol;

    fn row(k: &str, v: i64) -> Value {
        let kk = symbol::intern("k");
        let vv = symbol::intern("v");
        Value::Struct(Row::new(vec![(kk, Value::String(std::sync::Arc::from(k))), (vv, Value::Int(v))]))
    }

    fn table(rows: Vec<Value>) -> Table {
        let fp = Hash::merge_seq(rows.iter().map(Value::fingerprint));
        MemTable::new(rows, fp, TableAttrs::default())
    }

    #[test]
    fn equi_join_extracts_keys_and_hash_joins() {
        let files = Registry::default();
        let dir = tempfile::tempdir().unwrap();
        let cache = Cache::new(dir.path()).unwrap();
        let sched = LocalScheduler::new(1);
        let cfg = crate::eval::SessionConfig::default();
        let ctx = EvalCtx {
            files: &files,
            cache: &cache,
            interrupt: InterruptContext::background(),
            scheduler: &sched,
            config: &cfg,
        };
        let env = Env::new();

        let left = Value::Table(table(vec![row("a", 1), row("b", 2)]));
        let right = Value::Table(table(vec![row("a", 10), row("c", 20)]));
        let l = symbol::intern("l");
        let r = symbol::intern("r");
        let k = symbol::intern("k");
        let pred = Expr::FuncLit(
            std::sync::Arc::from([l, r]),
            Box::new(Expr::Binary(
                BinOp::Eq,
                Box::new(Expr::FieldAccess(Box::new(Expr::Var(l)), k)),
                Box::new(Expr::FieldAccess(Box::new(Expr::Var(r)), k)),
            )),
        );
        let args = vec![
            Arg::Positional(Expr::Const(left)),
            Arg::Positional(Expr::Const(right)),
            Arg::Named(symbol::intern("on"), pred),
        ];
        let result = call(&ctx, &args, &env).unwrap();
        let rows = result.as_table().unwrap().collect();
        assert_eq!(rows.len(), 1);
    }
}
