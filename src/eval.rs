//! Tree-walking evaluator (spec.md §4.5): reduces an `ast::Expr` plus an
//! `env::Env` to a `value::Value`. Built-in operators (`read`, `map`,
//! `filter`, `reduce`, `flatten`, `sort`, `join`, `pick`, `write`,
//! `readdir`) live in `crate::ops` and are dispatched here by name; a
//! `Call` whose name resolves to a bound `Value::Func` instead invokes that
//! user-defined closure.

use std::sync::Arc;

use regex::RegexSet;

use crate::ast::{Arg, BinOp, Expr, NullEq};
use crate::cache::Cache;
use crate::env::Env;
use crate::error::{GqlError, Result};
use crate::filehandler::Registry;
use crate::hash::Hash;
use crate::interrupt::InterruptContext;
use crate::ops;
use crate::scheduler::LocalScheduler;
use crate::symbol::{self, SymbolId};
use crate::table::{MemTable, TableAttrs};
use crate::value::{Closure, NullSign, Row, Value};

/// Session-wide knobs an evaluating expression may consult (spec.md §6's
/// CLI flags, surfaced here so `ops::write`/`ops::read` can see them without
/// threading extra arguments through every call site).
pub struct SessionConfig {
    /// Default shard count for operators that don't pin one explicitly via
    /// a `shards:=n` named argument.
    pub n_shards: usize,
    /// Default for `write`'s `overwrite` flag when not given explicitly.
    pub overwrite_files: bool,
    /// A path is immutable if it matches any pattern here: `read`'s
    /// fingerprint then ignores the file's mtime, trusting the path alone
    /// to identify its content (spec.md §4.6; resolved as an open question
    /// in DESIGN.md).
    pub immutable_files: RegexSet,
}

impl Default for SessionConfig {
    fn default() -> Self {
        SessionConfig {
            n_shards: 1,
            overwrite_files: false,
            immutable_files: RegexSet::empty(),
        }
    }
}

/// Everything the evaluator needs besides the expression and environment
/// being evaluated. Borrowed, not owned: a `Session` (see `session.rs`)
/// constructs one of these per top-level statement.
pub struct EvalCtx<'a> {
    pub files: &'a Registry,
    pub cache: &'a Cache,
    pub interrupt: InterruptContext,
    pub scheduler: &'a LocalScheduler,
    pub config: &'a SessionConfig,
}

impl<'a> EvalCtx<'a> {
    /// Evaluate `expr` in `env`.
    pub fn eval(&self, expr: &Expr, env: &Env) -> Result<Value> {
        if self.interrupt.is_interrupted() {
            return Err(GqlError::Interrupted);
        }
        match expr {
            Expr::Const(v) => Ok(v.clone()),
            Expr::Var(name) => env
                .lookup(*name)
                .cloned()
                .ok_or_else(|| GqlError::Internal(format!("undefined name `{}`", name.str()))),
            Expr::FieldAccess(e, name) => self.eval(e, env)?.must_field(*name),
            Expr::Index(e, i) => self.eval_index(e, i, env),
            Expr::RegexProject(e, re) => self.eval_regex_project(e, re, env),
            Expr::StructLit(fields) => {
                let mut out = Vec::with_capacity(fields.len());
                for (name, e) in fields {
                    out.push((*name, self.eval(e, env)?));
                }
                Ok(Value::Struct(Row::new(out)))
            }
            Expr::TableLit(rows) => self.eval_table_lit(rows, env),
            Expr::Call(name, args) => self.eval_call(*name, args, env),
            Expr::FuncLit(params, body) => Ok(Value::Func(Arc::new(Closure::new(
                params.clone(),
                Arc::new((**body).clone()),
                env,
            )))),
            Expr::Binary(op, a, b) => self.eval_binary(*op, a, b, env),
            Expr::Not(e) => Ok(Value::Bool(!self.eval(e, env)?.as_bool()?)),
            Expr::Neg(e) => self.eval_neg(e, env),
            Expr::NullEq(kind, a, b) => self.eval_null_eq(*kind, a, b, env),
            Expr::Cond(arms, default) => self.eval_cond(arms, default, env),
            Expr::If(c, t, e) => {
                if self.eval(c, env)?.as_bool()? {
                    self.eval(t, env)
                } else {
                    self.eval(e, env)
                }
            }
        }
    }

    /// Evaluate `expr` in `env` extended with `row_name` bound to `row` —
    /// the shape every per-row operator argument (`map`'s body, `filter`'s
    /// predicate, `reduce`'s key/value expressions, ...) is evaluated in.
    pub fn eval_with_row(&self, expr: &Expr, env: &Env, row_name: SymbolId, row: Value) -> Result<Value> {
        let scoped = env.push(vec![row_name], vec![row]);
        self.eval(expr, &scoped)
    }

    /// Invoke a closure with already-evaluated positional arguments.
    pub fn call_closure(&self, f: &Arc<Closure>, args: Vec<Value>) -> Result<Value> {
        if args.len() != f.params.len() {
            return Err(GqlError::Internal(format!(
                "function expects {} argument(s), got {}",
                f.params.len(),
                args.len()
            )));
        }
        let scoped = f.captured_env.push(f.params.to_vec(), args);
        self.eval(&f.body, &scoped)
    }

    fn eval_index(&self, e: &Expr, i: &Expr, env: &Env) -> Result<Value> {
        let base = self.eval(e, env)?;
        let idx = self.eval(i, env)?.as_int()?;
        match &base {
            Value::Table(t) => {
                let rows = t.collect();
                usize::try_from(idx)
                    .ok()
                    .and_then(|i| rows.get(i).cloned())
                    .ok_or_else(|| GqlError::Internal(format!("table index {idx} out of range")))
            }
            Value::StructFragment(fields) => {
                usize::try_from(idx)
                    .ok()
                    .and_then(|i| fields.get(i).map(|(_, v)| v.clone()))
                    .ok_or_else(|| GqlError::Internal(format!("fragment index {idx} out of range")))
            }
            other => Err(GqlError::Internal(format!("cannot index into {other:?}"))),
        }
    }

    fn eval_regex_project(&self, e: &Expr, pattern: &Arc<str>, env: &Env) -> Result<Value> {
        let base = self.eval(e, env)?;
        let row = base.as_struct()?;
        let re = regex::Regex::new(pattern)
            .map_err(|err| GqlError::Internal(format!("invalid struct-projection regex `{pattern}`: {err}")))?;
        let fields: Vec<(SymbolId, Value)> = row
            .fields()
            .iter()
            .filter(|(name, _)| re.is_match(&name.str()))
            .cloned()
            .collect();
        Ok(Value::StructFragment(Arc::new(fields)))
    }

    fn eval_table_lit(&self, rows: &[Expr], env: &Env) -> Result<Value> {
        let mut values = Vec::with_capacity(rows.len());
        for r in rows {
            values.push(self.eval(r, env)?);
        }
        let fingerprint = Hash::of_string("tablelit").merge(Hash::merge_seq(values.iter().map(Value::fingerprint)));
        Ok(Value::Table(MemTable::new(
            values,
            fingerprint,
            TableAttrs {
                name: "table".to_string(),
                ..Default::default()
            },
        )))
    }

    fn eval_call(&self, name: SymbolId, args: &[Arg], env: &Env) -> Result<Value> {
        // A bound closure (user-defined function) shadows a built-in of the
        // same name — consistent with ordinary lexical lookup for `Var`.
        if let Some(Value::Func(f)) = env.lookup(name).cloned() {
            let mut evaluated = Vec::with_capacity(args.len());
            for a in args {
                match a {
                    Arg::Positional(e) => evaluated.push(self.eval(e, env)?),
                    Arg::Named(_, _) => {
                        return Err(GqlError::Internal(
                            "named arguments are only supported on built-in operators".into(),
                        ))
                    }
                }
            }
            return self.call_closure(&f, evaluated);
        }

        match &*name.str() {
            "read" => ops::read::call(self, args, env),
            "write" => ops::write::call(self, args, env),
            "map" => ops::map::call(self, args, env),
            "filter" => ops::filter::call(self, args, env),
            "reduce" => ops::reduce::call(self, args, env),
            "flatten" => ops::flatten::call(self, args, env),
            "sort" => ops::sort::call(self, args, env),
            "join" => ops::join::call(self, args, env),
            "pick" => ops::pick::call(self, args, env),
            "readdir" => ops::readdir::call(self, args, env),
            other => Err(GqlError::Internal(format!("unknown function `{other}`"))),
        }
    }

    fn eval_binary(&self, op: BinOp, a: &Expr, b: &Expr, env: &Env) -> Result<Value> {
        // `And`/`Or` short-circuit: the right operand is only evaluated if
        // the left one doesn't already settle the result.
        if op == BinOp::And {
            return Ok(Value::Bool(self.eval(a, env)?.as_bool()? && self.eval(b, env)?.as_bool()?));
        }
        if op == BinOp::Or {
            return Ok(Value::Bool(self.eval(a, env)?.as_bool()? || self.eval(b, env)?.as_bool()?));
        }

        let va = self.eval(a, env)?;
        let vb = self.eval(b, env)?;
        match op {
            BinOp::Add | BinOp::Sub | BinOp::Mul | BinOp::Div | BinOp::Mod => numeric_binop(op, &va, &vb),
            BinOp::Concat => {
                let sa = va.as_str()?;
                let sb = vb.as_str()?;
                Ok(Value::String(Arc::from(format!("{sa}{sb}").as_str())))
            }
            BinOp::Lt => Ok(Value::Bool(va.sort_key_cmp(&vb).is_lt())),
            BinOp::Le => Ok(Value::Bool(va.sort_key_cmp(&vb).is_le())),
            BinOp::Gt => Ok(Value::Bool(va.sort_key_cmp(&vb).is_gt())),
            BinOp::Ge => Ok(Value::Bool(va.sort_key_cmp(&vb).is_ge())),
            BinOp::Eq => Ok(Value::Bool(va == vb)),
            BinOp::Ne => Ok(Value::Bool(va != vb)),
            BinOp::And | BinOp::Or => unreachable!("handled above"),
        }
    }

    fn eval_neg(&self, e: &Expr, env: &Env) -> Result<Value> {
        match self.eval(e, env)? {
            Value::Int(i) => Ok(Value::Int(-i)),
            Value::Float(f) => Ok(Value::Float(-f)),
            other => Err(GqlError::Internal(format!("cannot negate {other:?}"))),
        }
    }

    fn eval_null_eq(&self, kind: NullEq, a: &Expr, b: &Expr, env: &Env) -> Result<Value> {
        let va = self.eval(a, env)?;
        let vb = self.eval(b, env)?;
        let tolerant = match kind {
            NullEq::LeftTolerant => va.is_null(),
            NullEq::RightTolerant => vb.is_null(),
            NullEq::BothTolerant => va.is_null() || vb.is_null(),
        };
        Ok(Value::Bool(tolerant || va == vb))
    }

    fn eval_cond(&self, arms: &[(Expr, Expr)], default: &Expr, env: &Env) -> Result<Value> {
        for (guard, value) in arms {
            if self.eval(guard, env)?.as_bool()? {
                return self.eval(value, env);
            }
        }
        self.eval(default, env)
    }
}

fn numeric_binop(op: BinOp, a: &Value, b: &Value) -> Result<Value> {
    if let (Value::Int(x), Value::Int(y)) = (a, b) {
        return Ok(Value::Int(match op {
            BinOp::Add => x.wrapping_add(*y),
            BinOp::Sub => x.wrapping_sub(*y),
            BinOp::Mul => x.wrapping_mul(*y),
            BinOp::Div => {
                if *y == 0 {
                    return Err(GqlError::Internal("division by zero".into()));
                }
                x.wrapping_div(*y)
            }
            BinOp::Mod => {
                if *y == 0 {
                    return Err(GqlError::Internal("division by zero".into()));
                }
                x.wrapping_rem(*y)
            }
            _ => unreachable!(),
        }));
    }
    let x = a.as_float()?;
    let y = b.as_float()?;
    Ok(Value::Float(match op {
        BinOp::Add => x + y,
        BinOp::Sub => x - y,
        BinOp::Mul => x * y,
        BinOp::Div => x / y,
        BinOp::Mod => x % y,
        _ => unreachable!(),
    }))
}

/// Sugar used by the `$field` lexer token: `$name` desugars to
/// `Expr::FieldAccess(Var(_), name)`, so the per-row implicit binding is
/// always named `_`.
pub fn underscore() -> SymbolId {
    symbol::intern("_")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::Expr;
    use crate::interrupt::InterruptContext;

    fn ctx<'a>(files: &'a Registry, cache: &'a Cache, sched: &'a LocalScheduler, cfg: &'a SessionConfig) -> EvalCtx<'a> {
        EvalCtx {
            files,
            cache,
            interrupt: InterruptContext::background(),
            scheduler: sched,
            config: cfg,
        }
    }

    #[test]
    fn arithmetic_promotes_int_to_float_on_mixed_operands() {
        let files = Registry::default();
        let dir = tempfile::tempdir().unwrap();
        let cache = Cache::new(dir.path()).unwrap();
        let sched = LocalScheduler::new(1);
        let cfg = SessionConfig::default();
        let c = ctx(&files, &cache, &sched, &cfg);
        let env = Env::new();
        let expr = Expr::Binary(
            BinOp::Add,
            Box::new(Expr::Const(Value::Int(1))),
            Box::new(Expr::Const(Value::Float(2.5))),
        );
        assert_eq!(c.eval(&expr, &env).unwrap(), Value::Float(3.5));
    }

    #[test]
    fn field_access_on_missing_field_is_an_eval_error() {
        let files = Registry::default();
        let dir = tempfile::tempdir().unwrap();
        let cache = Cache::new(dir.path()).unwrap();
        let sched = LocalScheduler::new(1);
        let cfg = SessionConfig::default();
        let c = ctx(&files, &cache, &sched, &cfg);
        let env = Env::new();
        let s = Value::Struct(Row::new(vec![(symbol::intern("a_test_eval_present"), Value::Int(1))]));
        let expr = Expr::FieldAccess(
            Box::new(Expr::Const(s)),
            symbol::intern("a_test_eval_absent"),
        );
        assert!(c.eval(&expr, &env).is_err());
    }

    #[test]
    fn cond_falls_through_to_default() {
        let files = Registry::default();
        let dir = tempfile::tempdir().unwrap();
        let cache = Cache::new(dir.path()).unwrap();
        let sched = LocalScheduler::new(1);
        let cfg = SessionConfig::default();
        let c = ctx(&files, &cache, &sched, &cfg);
        let env = Env::new();
        let expr = Expr::Cond(
            vec![(Expr::Const(Value::Bool(false)), Expr::Const(Value::Int(1)))],
            Box::new(Expr::Const(Value::Int(99))),
        );
        assert_eq!(c.eval(&expr, &env).unwrap(), Value::Int(99));
    }

    #[test]
    fn null_tolerant_equality_treats_null_as_wildcard() {
        let files = Registry::default();
        let dir = tempfile::tempdir().unwrap();
        let cache = Cache::new(dir.path()).unwrap();
        let sched = LocalScheduler::new(1);
        let cfg = SessionConfig::default();
        let c = ctx(&files, &cache, &sched, &cfg);
        let env = Env::new();
        let expr = Expr::NullEq(
            NullEq::LeftTolerant,
            Box::new(Expr::Const(Value::Null(NullSign::Pos))),
            Box::new(Expr::Const(Value::Int(5))),
        );
        assert_eq!(c.eval(&expr, &env).unwrap(), Value::Bool(true));
    }

    #[test]
    fn closures_capture_free_variables_and_call() {
        let files = Registry::default();
        let dir = tempfile::tempdir().unwrap();
        let cache = Cache::new(dir.path()).unwrap();
        let sched = LocalScheduler::new(1);
        let cfg = SessionConfig::default();
        let c = ctx(&files, &cache, &sched, &cfg);
        let captured = symbol::intern("a_test_eval_captured");
        let param = symbol::intern("a_test_eval_param");
        let env = Env::new().push(vec![captured], vec![Value::Int(10)]);
        let body = Expr::Binary(
            BinOp::Add,
            Box::new(Expr::Var(param)),
            Box::new(Expr::Var(captured)),
        );
        let f = c
            .eval(&Expr::FuncLit(Arc::from([param]), Box::new(body)), &env)
            .unwrap();
        let closure = f.as_closure().unwrap().clone();
        assert_eq!(c.call_closure(&closure, vec![Value::Int(5)]).unwrap(), Value::Int(15));
    }
}
