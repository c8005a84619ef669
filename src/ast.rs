//! Expression tree produced by [`crate::parser`] (spec.md §4.5: "AST &
//! Env"). The AST itself — and [`crate::env::Env`] — are core; the
//! grammar that produces an AST is, per spec.md §1, an external
//! collaborator whose interface is an `Expr` tree like this one.

use std::sync::Arc;

use crate::hash::Hash;
use crate::symbol::SymbolId;
use crate::value::Value;

/// Binary operators (spec.md §6 literal/operator surface).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Concat, // string `|` concatenation, distinct from pipe chaining
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
    Ne,
    And,
    Or,
}

/// The three null-tolerant equality flavors of spec.md §6.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NullEq {
    /// `a ==? b`: null treated as equal to anything on the right.
    LeftTolerant,
    /// `a ?== b`: null treated as equal to anything on the left.
    RightTolerant,
    /// `a ?==? b`: null treated as equal to null on either side.
    BothTolerant,
}

/// A call argument: positional, or bound to a formal's name (spec.md §4.5).
#[derive(Clone, Debug)]
pub enum Arg {
    Positional(Expr),
    Named(SymbolId, Expr),
}

/// Expression tree node. Cheaply cloned (`Arc`-wrapped recursively via
/// `Box` for single ownership within one tree; shared subtrees — captured
/// closures — use `Arc` explicitly where sharing is intended).
#[derive(Clone, Debug)]
pub enum Expr {
    /// A literal value, already evaluated at parse time.
    Const(Value),
    /// Reference to a bound name (the implicit row variable `_`, a
    /// `:=`-bound global, or a function parameter).
    Var(SymbolId),
    /// `x.field`
    FieldAccess(Box<Expr>, SymbolId),
    /// `x[i]`
    Index(Box<Expr>, Box<Expr>),
    /// `x./re/` — struct projection by regex over field names, producing a
    /// `Value::StructFragment`.
    RegexProject(Box<Expr>, Arc<str>),
    /// `{a:1, b:2}`
    StructLit(Vec<(SymbolId, Expr)>),
    /// `table(r1, r2, ...)`
    TableLit(Vec<Expr>),
    /// `f(args)` — `f` is resolved to a built-in or user function at eval
    /// time by name (spec.md §4.5: "bound to a registered function
    /// descriptor" at parse time, but this tree keeps the name so the
    /// evaluator can re-resolve against the current builtin registry).
    Call(SymbolId, Vec<Arg>),
    /// `func name(a,b) body` or `|a,b| body` (spec.md §6).
    FuncLit(Arc<[SymbolId]>, Box<Expr>),
    Binary(BinOp, Box<Expr>, Box<Expr>),
    Not(Box<Expr>),
    Neg(Box<Expr>),
    NullEq(NullEq, Box<Expr>, Box<Expr>),
    /// `cond(a?x, b?y, z)` — list of (guard, value) arms plus a mandatory
    /// default.
    Cond(Vec<(Expr, Expr)>, Box<Expr>),
    /// `if c then x else y`
    If(Box<Expr>, Box<Expr>, Box<Expr>),
}

impl Expr {
    /// Structural fingerprint of the expression, used by
    /// [`crate::value::Value::Func`]'s closure fingerprint (spec.md §4.4:
    /// "function/closure fingerprint combines the AST hash with the
    /// captured-environment hash").
    pub fn fingerprint(&self) -> Hash {
        match self {
            Expr::Const(v) => Hash::of_string("const").merge(v.fingerprint()),
            Expr::Var(s) => Hash::of_string("var").merge(s.hash()),
            Expr::FieldAccess(e, s) => Hash::of_string("field")
                .merge(e.fingerprint())
                .merge(s.hash()),
            Expr::Index(e, i) => Hash::of_string("index")
                .merge(e.fingerprint())
                .merge(i.fingerprint()),
            Expr::RegexProject(e, re) => Hash::of_string("regexproject")
                .merge(e.fingerprint())
                .merge(Hash::of_string(re)),
            Expr::StructLit(fields) => {
                let mut h = Hash::of_string("struct");
                for (name, e) in fields {
                    h = h.merge(name.hash()).merge(e.fingerprint());
                }
                h
            }
            Expr::TableLit(rows) => {
                let mut h = Hash::of_string("tablelit");
                for r in rows {
                    h = h.merge(r.fingerprint());
                }
                h
            }
            Expr::Call(name, args) => {
                let mut h = Hash::of_string("call").merge(name.hash());
                for a in args {
                    h = h.merge(match a {
                        Arg::Positional(e) => Hash::of_string("pos").merge(e.fingerprint()),
                        Arg::Named(n, e) => {
                            Hash::of_string("named").merge(n.hash()).merge(e.fingerprint())
                        }
                    });
                }
                h
            }
            Expr::FuncLit(params, body) => {
                let mut h = Hash::of_string("funclit");
                for p in params.iter() {
                    h = h.merge(p.hash());
                }
                h.merge(body.fingerprint())
            }
            Expr::Binary(op, a, b) => Hash::of_string("binary")
                .merge(Hash::of_int(*op as i64))
                .merge(a.fingerprint())
                .merge(b.fingerprint()),
            Expr::Not(e) => Hash::of_string("not").merge(e.fingerprint()),
            Expr::Neg(e) => Hash::of_string("neg").merge(e.fingerprint()),
            Expr::NullEq(k, a, b) => Hash::of_string("nulleq")
                .merge(Hash::of_int(*k as i64))
                .merge(a.fingerprint())
                .merge(b.fingerprint()),
            Expr::Cond(arms, def) => {
                let mut h = Hash::of_string("cond");
                for (g, v) in arms {
                    h = h.merge(g.fingerprint()).merge(v.fingerprint());
                }
                h.merge(def.fingerprint())
            }
            Expr::If(c, t, e) => Hash::of_string("if")
                .merge(c.fingerprint())
                .merge(t.fingerprint())
                .merge(e.fingerprint()),
        }
    }

    /// Free variables of this expression: names referenced but not bound by
    /// an enclosing `FuncLit`'s own parameter list. Used when capturing a
    /// closure's environment (spec.md §4.5: "emits only the bindings
    /// reachable as free variables").
    pub fn free_vars(&self, out: &mut Vec<SymbolId>) {
        fn go(e: &Expr, bound: &mut Vec<SymbolId>, out: &mut Vec<SymbolId>) {
            match e {
                Expr::Const(_) => {}
                Expr::Var(s) => {
                    if !bound.contains(s) && !out.contains(s) {
                        out.push(*s);
                    }
                }
                Expr::FieldAccess(e, _) | Expr::Neg(e) | Expr::Not(e) => go(e, bound, out),
                Expr::RegexProject(e, _) => go(e, bound, out),
                Expr::Index(a, b) => {
                    go(a, bound, out);
                    go(b, bound, out);
                }
                Expr::StructLit(fields) => {
                    for (_, e) in fields {
                        go(e, bound, out);
                    }
                }
                Expr::TableLit(rows) => {
                    for r in rows {
                        go(r, bound, out);
                    }
                }
                Expr::Call(_, args) => {
                    for a in args {
                        match a {
                            Arg::Positional(e) => go(e, bound, out),
                            Arg::Named(_, e) => go(e, bound, out),
                        }
                    }
                }
                Expr::FuncLit(params, body) => {
                    let mark = bound.len();
                    bound.extend(params.iter().copied());
                    go(body, bound, out);
                    bound.truncate(mark);
                }
                Expr::Binary(_, a, b) | Expr::NullEq(_, a, b) => {
                    go(a, bound, out);
                    go(b, bound, out);
                }
                Expr::Cond(arms, def) => {
                    for (g, v) in arms {
                        go(g, bound, out);
                        go(v, bound, out);
                    }
                    go(def, bound, out);
                }
                Expr::If(c, t, e) => {
                    go(c, bound, out);
                    go(t, bound, out);
                    go(e, bound, out);
                }
            }
        }
        let mut bound = Vec::new();
        go(self, &mut bound, out);
    }
}

/// Top-level statements (spec.md §6).
#[derive(Clone, Debug)]
pub enum Stmt {
    /// A bare expression statement.
    Expr(Expr),
    /// `X := expr`
    Bind(SymbolId, Expr),
    /// `load "file"`
    Load(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::symbol::intern;

    #[test]
    fn free_vars_excludes_params() {
        let x = intern("a_test_ast_free_x");
        let y = intern("a_test_ast_free_y");
        let body = Expr::Binary(
            BinOp::Add,
            Box::new(Expr::Var(x)),
            Box::new(Expr::Var(y)),
        );
        let f = Expr::FuncLit(Arc::from([x]), Box::new(body));
        let mut fv = Vec::new();
        f.free_vars(&mut fv);
        assert_eq!(fv, vec![y]);
    }

    #[test]
    fn fingerprint_is_order_sensitive_for_args() {
        let a = intern("a_test_ast_fp_a");
        let f = intern("a_test_ast_fp_f");
        let one = Expr::Const(Value::Int(1));
        let two = Expr::Const(Value::Int(2));
        let c1 = Expr::Call(f, vec![Arg::Positional(one.clone()), Arg::Positional(two.clone())]);
        let c2 = Expr::Call(f, vec![Arg::Positional(two), Arg::Positional(one)]);
        let _ = a;
        assert_ne!(c1.fingerprint(), c2.fingerprint());
    }
}
