//! The uniformly-typed cell/row/table value model (spec.md §3, §4.4).

use std::sync::Arc;

use crate::ast::Expr;
use crate::env::Env;
use crate::error::{GqlError, Result};
use crate::hash::Hash;
use crate::marshal::{Decoder, Encoder};
use crate::symbol::SymbolId;
use crate::table::Table;

/// Which extreme a `Null` sorts towards (spec.md §3: `Null{pos|neg}`).
/// `NullPos` behaves like positive infinity for ordering purposes,
/// `NullNeg` like negative infinity, so callers can choose where missing
/// values land in a sort without a separate "nulls first/last" flag.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NullSign {
    Pos,
    Neg,
}

/// A closure: an AST body plus its captured environment, restricted to the
/// body's free variables (spec.md §4.4, §4.5).
pub struct Closure {
    pub params: Arc<[SymbolId]>,
    pub body: Arc<Expr>,
    pub captured_env: Env,
    fingerprint: Hash,
}

impl Closure {
    pub fn new(params: Arc<[SymbolId]>, body: Arc<Expr>, defining_env: &Env) -> Self {
        let mut free = Vec::new();
        body.free_vars(&mut free);
        free.retain(|v| !params.contains(v));
        let captured_env = defining_env.capture(&free);
        let fingerprint = body.fingerprint().merge(captured_env.fingerprint());
        Closure {
            params,
            body,
            captured_env,
            fingerprint,
        }
    }
}

impl std::fmt::Debug for Closure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Closure({:?})", self.fingerprint)
    }
}

/// A struct (row): an ordered list of `(SymbolId, Value)` fields. Field
/// order is preserved for display but irrelevant to equality/hashing
/// (spec.md §3).
///
/// spec.md describes specialized small-arity storage tiers (≤2, 4, 8, 12,
/// 16 fields) as a pure storage optimization, explicitly "indistinguishable
/// through the Struct interface". This crate implements a single
/// `Arc<Vec<_>>`-backed representation: the tiering is invisible through
/// the interface by spec.md's own description, so the extra variants would
/// add complexity without changing any observable behavior. See
/// `DESIGN.md`.
#[derive(Clone, Debug)]
pub struct Row(Arc<Vec<(SymbolId, Value)>>);

impl Row {
    pub fn new(fields: Vec<(SymbolId, Value)>) -> Self {
        Row(Arc::new(fields))
    }

    pub fn fields(&self) -> &[(SymbolId, Value)] {
        &self.0
    }

    pub fn get(&self, name: SymbolId) -> Option<&Value> {
        self.0.iter().find(|(n, _)| *n == name).map(|(_, v)| v)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    fn fingerprint(&self) -> Hash {
        Hash::add_seq(self.0.iter().map(|(n, v)| n.hash().merge(v.fingerprint())))
    }
}

/// The tagged value union (spec.md §3).
#[derive(Clone, Debug)]
pub enum Value {
    Null(NullSign),
    Int(i64),
    Float(f64),
    Bool(bool),
    Char(char),
    String(Arc<str>),
    /// An interned enum/symbol value (distinct from `String`: compares and
    /// hashes as the interned name, never allocates a fresh string).
    Enum(SymbolId),
    FileName(Arc<str>),
    /// Nanoseconds since the Unix epoch, UTC.
    DateTime(i64),
    /// Nanoseconds.
    Duration(i64),
    Struct(Row),
    Table(Table),
    Func(Arc<Closure>),
    /// Ordered named cells produced by `x./re/` struct projection
    /// (spec.md §3). Distinct from `Struct` so that a projection's
    /// fingerprint never collides with an equivalent real struct's.
    StructFragment(Arc<Vec<(SymbolId, Value)>>),
    Invalid,
}

const TAG_NULL_POS: u8 = 0;
const TAG_NULL_NEG: u8 = 1;
const TAG_INT: u8 = 2;
const TAG_FLOAT: u8 = 3;
const TAG_BOOL: u8 = 4;
const TAG_CHAR: u8 = 5;
const TAG_STRING: u8 = 6;
const TAG_ENUM: u8 = 7;
const TAG_FILENAME: u8 = 8;
const TAG_DATETIME: u8 = 9;
const TAG_DURATION: u8 = 10;
const TAG_STRUCT: u8 = 11;
const TAG_STRUCT_FRAGMENT: u8 = 12;
const TAG_INVALID: u8 = 13;
// Table (14) and Func (15) are not primitively marshaled by tag here: a
// Table marshals via its own `TableImpl::marshal`, wrapped at tag 14; a
// Func's AST/env is process-local and is never shipped across the
// marshaling boundary (spec.md's marshaling protocol ships *values*
// between workers and to/from the cache — closures over the evaluator's
// live environment do not outlive one process in this implementation).
const TAG_TABLE: u8 = 14;

impl Value {
    /// Pure function of `v`'s logical content (spec.md §4.4 invariant).
    pub fn fingerprint(&self) -> Hash {
        match self {
            Value::Null(NullSign::Pos) => Hash::of_string("null+"),
            Value::Null(NullSign::Neg) => Hash::of_string("null-"),
            Value::Int(i) => Hash::of_string("int").merge(Hash::of_int(*i)),
            Value::Float(f) => Hash::of_string("float").merge(Hash::of_float(*f)),
            Value::Bool(b) => Hash::of_string("bool").merge(Hash::of_int(*b as i64)),
            Value::Char(c) => Hash::of_string("char").merge(Hash::of_int(*c as i64)),
            Value::String(s) => Hash::of_string("string").merge(Hash::of_string(s)),
            Value::Enum(s) => Hash::of_string("enum").merge(s.hash()),
            Value::FileName(p) => Hash::of_string("filename").merge(Hash::of_string(p)),
            Value::DateTime(t) => Hash::of_string("datetime").merge(Hash::of_int(*t)),
            Value::Duration(d) => Hash::of_string("duration").merge(Hash::of_int(*d)),
            Value::Struct(r) => Hash::of_string("struct").merge(r.fingerprint()),
            Value::StructFragment(fields) => Hash::of_string("fragment").merge(Hash::add_seq(
                fields.iter().map(|(n, v)| n.hash().merge(v.fingerprint())),
            )),
            Value::Table(t) => Hash::of_string("table").merge(t.fingerprint()),
            Value::Func(c) => Hash::of_string("func").merge(c.fingerprint),
            Value::Invalid => Hash::of_string("invalid"),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null(_))
    }

    pub fn as_int(&self) -> Result<i64> {
        match self {
            Value::Int(i) => Ok(*i),
            other => Err(GqlError::Internal(format!("expected Int, got {other:?}"))),
        }
    }

    pub fn as_float(&self) -> Result<f64> {
        match self {
            Value::Float(f) => Ok(*f),
            Value::Int(i) => Ok(*i as f64),
            other => Err(GqlError::Internal(format!("expected Float, got {other:?}"))),
        }
    }

    pub fn as_bool(&self) -> Result<bool> {
        match self {
            Value::Bool(b) => Ok(*b),
            other => Err(GqlError::Internal(format!("expected Bool, got {other:?}"))),
        }
    }

    pub fn as_str(&self) -> Result<Arc<str>> {
        match self {
            Value::String(s) => Ok(s.clone()),
            Value::FileName(s) => Ok(s.clone()),
            other => Err(GqlError::Internal(format!("expected String, got {other:?}"))),
        }
    }

    pub fn as_struct(&self) -> Result<&Row> {
        match self {
            Value::Struct(r) => Ok(r),
            other => Err(GqlError::Internal(format!("expected Struct, got {other:?}"))),
        }
    }

    /// The `MustStructValue` access spec.md §7 names as a concrete
    /// evaluation-error source: a missing field in a struct.
    pub fn must_field(&self, name: SymbolId) -> Result<Value> {
        self.as_struct()?
            .get(name)
            .cloned()
            .ok_or_else(|| GqlError::Internal(format!("no field `{}` in struct", name.str())))
    }

    pub fn as_table(&self) -> Result<&Table> {
        match self {
            Value::Table(t) => Ok(t),
            other => Err(GqlError::Internal(format!("expected Table, got {other:?}"))),
        }
    }

    pub fn as_closure(&self) -> Result<&Arc<Closure>> {
        match self {
            Value::Func(c) => Ok(c),
            other => Err(GqlError::Internal(format!("expected Func, got {other:?}"))),
        }
    }

    /// Total order used by the `sort` operator: defined fields compare
    /// naturally within a variant; anything else (including cross-variant
    /// comparisons) falls back to comparing fingerprints so the order is
    /// still total and deterministic (spec.md §4.6: "ties broken by
    /// hash").
    pub fn sort_key_cmp(&self, other: &Value) -> std::cmp::Ordering {
        use std::cmp::Ordering;
        let natural = match (self, other) {
            (Value::Int(a), Value::Int(b)) => Some(a.cmp(b)),
            (Value::Float(a), Value::Float(b)) => a.partial_cmp(b),
            (Value::Bool(a), Value::Bool(b)) => Some(a.cmp(b)),
            (Value::Char(a), Value::Char(b)) => Some(a.cmp(b)),
            (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
            (Value::FileName(a), Value::FileName(b)) => Some(a.cmp(b)),
            (Value::DateTime(a), Value::DateTime(b)) => Some(a.cmp(b)),
            (Value::Duration(a), Value::Duration(b)) => Some(a.cmp(b)),
            (Value::Null(NullSign::Neg), Value::Null(NullSign::Neg)) => Some(Ordering::Equal),
            (Value::Null(NullSign::Pos), Value::Null(NullSign::Pos)) => Some(Ordering::Equal),
            (Value::Null(NullSign::Neg), _) => Some(Ordering::Less),
            (_, Value::Null(NullSign::Neg)) => Some(Ordering::Greater),
            (Value::Null(NullSign::Pos), _) => Some(Ordering::Greater),
            (_, Value::Null(NullSign::Pos)) => Some(Ordering::Less),
            _ => None,
        };
        natural.unwrap_or_else(|| self.fingerprint().cmp(&other.fingerprint()))
    }

    /// Binary marshal (spec.md §4.4). Tables delegate to
    /// `TableImpl::marshal`; `Func` values are not supported (process-local
    /// only) and are encoded as `Invalid` with a debug assertion, since
    /// shipping a live closure across the marshal boundary would silently
    /// lose its environment.
    pub fn marshal(&self, enc: &mut Encoder) {
        match self {
            Value::Null(NullSign::Pos) => enc.byte(TAG_NULL_POS),
            Value::Null(NullSign::Neg) => enc.byte(TAG_NULL_NEG),
            Value::Int(i) => {
                enc.byte(TAG_INT);
                enc.svarint(*i);
            }
            Value::Float(f) => {
                enc.byte(TAG_FLOAT);
                enc.uint64(f.to_bits());
            }
            Value::Bool(b) => {
                enc.byte(TAG_BOOL);
                enc.bool(*b);
            }
            Value::Char(c) => {
                enc.byte(TAG_CHAR);
                enc.varint(*c as u64);
            }
            Value::String(s) => {
                enc.byte(TAG_STRING);
                enc.string(s);
            }
            Value::Enum(s) => {
                enc.byte(TAG_ENUM);
                enc.symbol(*s);
            }
            Value::FileName(p) => {
                enc.byte(TAG_FILENAME);
                enc.string(p);
            }
            Value::DateTime(t) => {
                enc.byte(TAG_DATETIME);
                enc.svarint(*t);
            }
            Value::Duration(d) => {
                enc.byte(TAG_DURATION);
                enc.svarint(*d);
            }
            Value::Struct(r) => {
                enc.byte(TAG_STRUCT);
                enc.varint(r.len() as u64);
                for (n, v) in r.fields() {
                    enc.symbol(*n);
                    v.marshal(enc);
                }
            }
            Value::StructFragment(fields) => {
                enc.byte(TAG_STRUCT_FRAGMENT);
                enc.varint(fields.len() as u64);
                for (n, v) in fields.iter() {
                    enc.symbol(*n);
                    v.marshal(enc);
                }
            }
            Value::Table(t) => {
                enc.byte(TAG_TABLE);
                enc.string(&t.attrs().name);
                t.marshal(enc).expect("table marshal failed");
            }
            Value::Func(_) => {
                debug_assert!(false, "closures are not marshaled across process boundaries");
                enc.byte(TAG_INVALID);
            }
            Value::Invalid => enc.byte(TAG_INVALID),
        }
    }

    /// Matching decoder for [`Value::marshal`]. `Table` values unmarshal as
    /// an in-memory [`crate::table::MemTable`] — sufficient for the
    /// materialization cache and cross-worker shipping, which always
    /// operate on already-scanned row sets rather than live file handles.
    pub fn unmarshal(dec: &mut Decoder) -> Result<Value> {
        let tag = dec
            .byte()
            .map_err(|e| GqlError::CacheCorruption {
                hex: String::new(),
                msg: e.to_string(),
            })?;
        let err = |e: crate::marshal::MarshalError| GqlError::CacheCorruption {
            hex: String::new(),
            msg: e.to_string(),
        };
        Ok(match tag {
            TAG_NULL_POS => Value::Null(NullSign::Pos),
            TAG_NULL_NEG => Value::Null(NullSign::Neg),
            TAG_INT => Value::Int(dec.svarint().map_err(err)?),
            TAG_FLOAT => Value::Float(f64::from_bits(dec.uint64().map_err(err)?)),
            TAG_BOOL => Value::Bool(dec.bool().map_err(err)?),
            TAG_CHAR => {
                let c = dec.varint().map_err(err)? as u32;
                Value::Char(char::from_u32(c).ok_or_else(|| GqlError::CacheCorruption {
                    hex: String::new(),
                    msg: "invalid char code point".into(),
                })?)
            }
            TAG_STRING => Value::String(Arc::from(dec.string().map_err(err)?.as_str())),
            TAG_ENUM => Value::Enum(dec.symbol().map_err(err)?),
            TAG_FILENAME => Value::FileName(Arc::from(dec.string().map_err(err)?.as_str())),
            TAG_DATETIME => Value::DateTime(dec.svarint().map_err(err)?),
            TAG_DURATION => Value::Duration(dec.svarint().map_err(err)?),
            TAG_STRUCT => {
                let n = dec.varint().map_err(err)? as usize;
                let mut fields = Vec::with_capacity(n);
                for _ in 0..n {
                    let name = dec.symbol().map_err(err)?;
                    let val = Value::unmarshal(dec)?;
                    fields.push((name, val));
                }
                Value::Struct(Row::new(fields))
            }
            TAG_STRUCT_FRAGMENT => {
                let n = dec.varint().map_err(err)? as usize;
                let mut fields = Vec::with_capacity(n);
                for _ in 0..n {
                    let name = dec.symbol().map_err(err)?;
                    let val = Value::unmarshal(dec)?;
                    fields.push((name, val));
                }
                Value::StructFragment(Arc::new(fields))
            }
            TAG_TABLE => {
                let name = dec.string().map_err(err)?;
                let n = dec.varint().map_err(err)? as usize;
                let mut rows = Vec::with_capacity(n);
                for _ in 0..n {
                    rows.push(Value::unmarshal(dec)?);
                }
                let fp = Hash::merge_seq(rows.iter().map(|r| r.fingerprint()));
                Value::Table(crate::table::MemTable::new(
                    rows,
                    fp,
                    crate::table::TableAttrs {
                        name,
                        ..Default::default()
                    },
                ))
            }
            TAG_INVALID => Value::Invalid,
            other => {
                return Err(GqlError::CacheCorruption {
                    hex: String::new(),
                    msg: format!("unknown value tag {other}"),
                })
            }
        })
    }
}

impl PartialEq for Value {
    /// spec.md §3: "Equality is defined as equality of hash; structural
    /// equality is only an optimization." The common scalar cases are
    /// compared structurally first to avoid hashing on the hot path;
    /// everything else falls back to fingerprint equality.
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Char(a), Value::Char(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Enum(a), Value::Enum(b)) => a == b,
            (Value::Invalid, Value::Invalid) => true,
            _ => self.fingerprint() == other.fingerprint(),
        }
    }
}
impl Eq for Value {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::symbol::intern;

    #[test]
    fn struct_hash_is_field_order_insensitive() {
        let a = intern("a_test_value_struct_a");
        let b = intern("a_test_value_struct_b");
        let v1 = Value::Struct(Row::new(vec![(a, Value::Int(1)), (b, Value::Int(2))]));
        let v2 = Value::Struct(Row::new(vec![(b, Value::Int(2)), (a, Value::Int(1))]));
        assert_eq!(v1.fingerprint(), v2.fingerprint());
        assert_eq!(v1, v2);
    }

    #[test]
    fn marshal_round_trip_preserves_hash() {
        let a = intern("a_test_value_marshal_a");
        let v = Value::Struct(Row::new(vec![
            (a, Value::String(Arc::from("hello"))),
            (intern("a_test_value_marshal_n"), Value::Int(42)),
        ]));
        let mut enc = Encoder::new();
        v.marshal(&mut enc);
        let bytes = enc.into_bytes();
        let mut dec = Decoder::new(&bytes);
        let v2 = Value::unmarshal(&mut dec).unwrap();
        assert_eq!(v.fingerprint(), v2.fingerprint());
    }

    #[test]
    fn table_marshal_round_trip() {
        let t = crate::table::MemTable::new(
            vec![Value::Int(10), Value::Int(20), Value::Int(30)],
            Hash::of_string("t"),
            crate::table::TableAttrs::default(),
        );
        let v = Value::Table(t);
        let mut enc = Encoder::new();
        v.marshal(&mut enc);
        let bytes = enc.into_bytes();
        let mut dec = Decoder::new(&bytes);
        let v2 = Value::unmarshal(&mut dec).unwrap();
        let rows = v2.as_table().unwrap().collect();
        assert_eq!(rows, vec![Value::Int(10), Value::Int(20), Value::Int(30)]);
    }

    #[test]
    fn bytes_nil_fingerprint_matches_hash_module_law() {
        // struct with zero fields still has a well-defined, non-zero-biased
        // fingerprint distinguishing it from Invalid.
        let empty = Value::Struct(Row::new(vec![]));
        assert_ne!(empty.fingerprint(), Value::Invalid.fingerprint());
    }
}
