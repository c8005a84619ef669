//! Lexically-scoped environment: a stack of binding frames (spec.md §4.5).
//!
//! Lookup walks frames inner-to-outer. Marshaling an environment (see
//! [`crate::value::Closure`]) only ever touches the bindings reachable as
//! free variables of the closure being shipped — an `Env` itself is never
//! marshaled wholesale.

use std::sync::Arc;

use crate::hash::Hash;
use crate::symbol::SymbolId;
use crate::value::Value;

#[derive(Clone, Debug)]
struct Frame {
    names: Vec<SymbolId>,
    values: Vec<Value>,
}

/// A chain of lexical frames, innermost first. Cheap to clone: frames are
/// `Arc`-shared, so capturing an environment for a closure is O(1).
#[derive(Clone, Debug, Default)]
pub struct Env {
    frames: Vec<Arc<Frame>>,
}

impl Env {
    pub fn new() -> Self {
        Env { frames: Vec::new() }
    }

    /// Push a new innermost frame binding `names[i]` to `values[i]`.
    #[must_use]
    pub fn push(&self, names: Vec<SymbolId>, values: Vec<Value>) -> Env {
        debug_assert_eq!(names.len(), values.len());
        let mut frames = self.frames.clone();
        frames.push(Arc::new(Frame { names, values }));
        Env { frames }
    }

    /// Look up `name`, searching inner-to-outer.
    pub fn lookup(&self, name: SymbolId) -> Option<&Value> {
        for frame in self.frames.iter().rev() {
            if let Some(i) = frame.names.iter().position(|n| *n == name) {
                return Some(&frame.values[i]);
            }
        }
        None
    }

    /// Build the restricted capture environment for a closure: a single
    /// flat frame containing exactly the current bindings of `free_vars`
    /// (spec.md §4.5). Variables free in the closure but not yet bound
    /// (forward references / recursion) are simply omitted; looking them
    /// up later is a `Var` evaluation error, not a panic here.
    pub fn capture(&self, free_vars: &[SymbolId]) -> Env {
        let mut names = Vec::with_capacity(free_vars.len());
        let mut values = Vec::with_capacity(free_vars.len());
        for &v in free_vars {
            if let Some(val) = self.lookup(v) {
                names.push(v);
                values.push(val.clone());
            }
        }
        Env {
            frames: vec![Arc::new(Frame { names, values })],
        }
    }

    /// Fingerprint of the bindings currently visible (order-insensitive —
    /// a captured environment is logically a set of name/value pairs).
    pub fn fingerprint(&self) -> Hash {
        let mut h = Hash::ZERO;
        for frame in &self.frames {
            for (n, v) in frame.names.iter().zip(frame.values.iter()) {
                h = h.add(n.hash().merge(v.fingerprint()));
            }
        }
        h
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::symbol::intern;

    #[test]
    fn inner_frame_shadows_outer() {
        let x = intern("a_test_env_shadow_x");
        let env = Env::new().push(vec![x], vec![Value::Int(1)]);
        let env = env.push(vec![x], vec![Value::Int(2)]);
        assert_eq!(env.lookup(x), Some(&Value::Int(2)));
    }

    #[test]
    fn capture_restricts_to_free_vars() {
        let x = intern("a_test_env_capture_x");
        let y = intern("a_test_env_capture_y");
        let env = Env::new().push(vec![x, y], vec![Value::Int(1), Value::Int(2)]);
        let captured = env.capture(&[y]);
        assert_eq!(captured.lookup(y), Some(&Value::Int(2)));
        assert_eq!(captured.lookup(x), None);
    }

    #[test]
    fn capture_fingerprint_is_order_insensitive() {
        let x = intern("a_test_env_fp_x");
        let y = intern("a_test_env_fp_y");
        let e1 = Env::new().push(vec![x, y], vec![Value::Int(1), Value::Int(2)]);
        let e2 = Env::new().push(vec![y, x], vec![Value::Int(2), Value::Int(1)]);
        assert_eq!(e1.fingerprint(), e2.fingerprint());
    }
}
