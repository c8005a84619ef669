//! Sharded table abstraction and the pull-based scanner protocol
//! (spec.md §3 "Table"/"Scanner", §4.8).

use std::sync::Arc;

use crate::error::GqlError;
use crate::hash::Hash;
use crate::interrupt::InterruptContext;
use crate::marshal::Encoder;
use crate::value::Value;

/// `Len`'s precision request.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LenKind {
    Exact,
    Approx,
}

/// Display/debugging metadata for a table (spec.md §3).
#[derive(Clone, Debug, Default)]
pub struct TableAttrs {
    pub name: String,
    pub path: String,
    pub description: String,
}

/// Everything a concrete table representation must implement. Tables are
/// immutable once constructed and may be freely shared across shards/
/// threads (`Send + Sync`).
pub trait TableImpl: Send + Sync {
    /// Best-effort warmup; default is a no-op.
    fn prefetch(&self, _ctx: &InterruptContext) {}

    /// Row count, `None` if unknown/unsupported for the requested
    /// precision (an approximate table may not support `Exact` cheaply).
    fn len(&self, kind: LenKind) -> Option<u64>;

    /// Produce a scanner over the rows belonging to shard `shard_index` of
    /// `n_shards` (spec.md's shard-partition-completeness invariant).
    /// `n_parallel` is a hint for how much internal parallelism the scanner
    /// itself may use; it never changes which rows are visited.
    fn scanner(&self, shard_index: usize, n_shards: usize, n_parallel: usize) -> Box<dyn Scanner>;

    /// Deterministic fingerprint over logical content (spec.md §4.4: each
    /// table-producing operator defines its own rule; this is the
    /// already-computed result).
    fn fingerprint(&self) -> Hash;

    fn attrs(&self) -> TableAttrs;

    /// Serialize this table for shipping to another worker or into the
    /// materialization cache (spec.md §4.4 "marshaling protocol").
    fn marshal(&self, enc: &mut Encoder) -> Result<(), GqlError>;
}

/// Opaque, cheaply-cloneable table handle (spec.md §3 "Table").
#[derive(Clone)]
pub struct Table(Arc<dyn TableImpl>);

impl Table {
    pub fn new(inner: Arc<dyn TableImpl>) -> Self {
        Table(inner)
    }

    pub fn prefetch(&self, ctx: &InterruptContext) {
        self.0.prefetch(ctx)
    }

    pub fn len(&self, kind: LenKind) -> Option<u64> {
        self.0.len(kind)
    }

    pub fn scanner(&self, shard_index: usize, n_shards: usize, n_parallel: usize) -> Box<dyn Scanner> {
        self.0.scanner(shard_index, n_shards, n_parallel)
    }

    pub fn fingerprint(&self) -> Hash {
        self.0.fingerprint()
    }

    pub fn attrs(&self) -> TableAttrs {
        self.0.attrs()
    }

    pub fn marshal(&self, enc: &mut Encoder) -> Result<(), GqlError> {
        self.0.marshal(enc)
    }

    /// Collect every row visited by an `(0,1)` scan into a `Vec`. Intended
    /// for small tables (tests, `pick`'s single-row scan, REPL display) —
    /// not a substitute for streaming consumption of large tables.
    pub fn collect(&self) -> Vec<Value> {
        let mut s = self.scanner(0, 1, 1);
        let mut out = Vec::new();
        while s.scan() {
            out.push(s.value());
        }
        out
    }

    /// Replace this table's fingerprint, leaving scanning/attrs/marshaling
    /// delegated to the original (spec.md §4.6: `read`'s fingerprint is a
    /// function of the path and immutability, not of a particular
    /// `FileHandler`'s own notion of content identity).
    pub fn with_fingerprint(self, fingerprint: Hash) -> Table {
        Table::new(Arc::new(WithFingerprint { inner: self, fingerprint }))
    }
}

struct WithFingerprint {
    inner: Table,
    fingerprint: Hash,
}

impl TableImpl for WithFingerprint {
    fn prefetch(&self, ctx: &InterruptContext) {
        self.inner.prefetch(ctx)
    }

    fn len(&self, kind: LenKind) -> Option<u64> {
        self.inner.len(kind)
    }

    fn scanner(&self, shard_index: usize, n_shards: usize, n_parallel: usize) -> Box<dyn Scanner> {
        self.inner.scanner(shard_index, n_shards, n_parallel)
    }

    fn fingerprint(&self) -> Hash {
        self.fingerprint
    }

    fn attrs(&self) -> TableAttrs {
        self.inner.attrs()
    }

    fn marshal(&self, enc: &mut Encoder) -> Result<(), GqlError> {
        self.inner.marshal(enc)
    }
}

impl std::fmt::Debug for Table {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Table({:?}, {:?})", self.attrs().name, self.fingerprint())
    }
}

/// Scanner lifecycle state (spec.md §4.8). Implementations are expected to
/// hold one of these and debug-assert the legal transitions; violating the
/// state machine is a fatal programmer error (spec.md §7), not a recoverable
/// condition.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ScannerState {
    Idle,
    Scanning,
    Row,
    Exhausted,
    Error,
}

impl ScannerState {
    /// Precondition check for entering `Scan()`. Any state reachable after
    /// `Exhausted` or `Error` must behave as those terminal states
    /// (spec.md §4.8: "any operation after Exhausted returns Exhausted";
    /// "Error state is terminal").
    pub fn can_scan(self) -> bool {
        matches!(self, ScannerState::Idle | ScannerState::Row)
    }
}

/// Pull-based cursor over one shard of a table's rows.
pub trait Scanner {
    /// Advance to the next row. Returns `false` on exhaustion or error;
    /// callers distinguish the two only by continuing to call `scan()`,
    /// which must keep returning `false` (spec.md §4.8).
    fn scan(&mut self) -> bool;

    /// The current row. Undefined (may panic) if called before a
    /// successful `scan()`, after `scan()` returned `false`, or in the
    /// `Error` state — callers must not do this (spec.md §4.8: "Value()
    /// after Error is undefined").
    fn value(&self) -> Value;
}

/// In-memory scanner over a pre-materialized row set, used by every
/// concrete table implementation in this crate as the common cursor type.
/// Rows for shard `s` of `n` are exactly those at index `i` with
/// `i % n == s` (spec.md §3 default, non-shuffling, partitioning rule).
pub struct VecScanner {
    rows: Arc<Vec<Value>>,
    stride: usize,
    next: usize,
    state: ScannerState,
    ctx: InterruptContext,
}

impl VecScanner {
    pub fn new(rows: Arc<Vec<Value>>, shard_index: usize, n_shards: usize, ctx: InterruptContext) -> Self {
        debug_assert!(n_shards >= 1 && shard_index < n_shards);
        VecScanner {
            rows,
            stride: n_shards,
            next: shard_index,
            state: ScannerState::Idle,
            ctx,
        }
    }
}

impl Scanner for VecScanner {
    fn scan(&mut self) -> bool {
        if !self.state.can_scan() {
            return false;
        }
        if self.ctx.is_interrupted() {
            self.state = ScannerState::Error;
            return false;
        }
        self.state = ScannerState::Scanning;
        if self.next < self.rows.len() {
            self.state = ScannerState::Row;
            self.next += self.stride;
            true
        } else {
            self.state = ScannerState::Exhausted;
            false
        }
    }

    fn value(&self) -> Value {
        debug_assert_eq!(self.state, ScannerState::Row);
        self.rows[self.next - self.stride].clone()
    }
}

/// A table fully materialized in memory (the backing representation for
/// `table(...)` literals, `mem:` handler tables, and intermediate results
/// between operators that don't warrant disk spill).
pub struct MemTable {
    rows: Arc<Vec<Value>>,
    fingerprint: Hash,
    attrs: TableAttrs,
}

impl MemTable {
    pub fn new(rows: Vec<Value>, fingerprint: Hash, attrs: TableAttrs) -> Table {
        Table::new(Arc::new(MemTable {
            rows: Arc::new(rows),
            fingerprint,
            attrs,
        }))
    }
}

impl TableImpl for MemTable {
    fn len(&self, _kind: LenKind) -> Option<u64> {
        Some(self.rows.len() as u64)
    }

    fn scanner(&self, shard_index: usize, n_shards: usize, _n_parallel: usize) -> Box<dyn Scanner> {
        Box::new(VecScanner::new(
            self.rows.clone(),
            shard_index,
            n_shards,
            InterruptContext::background(),
        ))
    }

    fn fingerprint(&self) -> Hash {
        self.fingerprint
    }

    fn attrs(&self) -> TableAttrs {
        self.attrs.clone()
    }

    fn marshal(&self, enc: &mut Encoder) -> Result<(), GqlError> {
        enc.varint(self.rows.len() as u64);
        for row in self.rows.iter() {
            row.marshal(enc);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_table() -> Table {
        MemTable::new(
            (0..10).map(Value::Int).collect(),
            Hash::of_string("sample"),
            TableAttrs::default(),
        )
    }

    #[test]
    fn shard_partition_is_complete_for_several_shard_counts() {
        let t = sample_table();
        let whole: Vec<Value> = t.scanner(0, 1, 1).let_collect();
        for n in [1usize, 2, 4] {
            let mut combined: Vec<Value> = Vec::new();
            for s in 0..n {
                combined.extend(t.scanner(s, n, 1).let_collect());
            }
            let mut a = whole.iter().map(|v| format!("{v:?}")).collect::<Vec<_>>();
            let mut b = combined.iter().map(|v| format!("{v:?}")).collect::<Vec<_>>();
            a.sort();
            b.sort();
            assert_eq!(a, b, "n_shards={n}");
        }
    }

    #[test]
    fn scanner_after_exhausted_stays_exhausted() {
        let t = MemTable::new(vec![Value::Int(1)], Hash::ZERO, TableAttrs::default());
        let mut s = t.scanner(0, 1, 1);
        assert!(s.scan());
        assert!(!s.scan());
        assert!(!s.scan());
    }

    trait CollectExt {
        fn let_collect(self) -> Vec<Value>;
    }
    impl CollectExt for Box<dyn Scanner> {
        fn let_collect(mut self) -> Vec<Value> {
            let mut out = Vec::new();
            while self.scan() {
                out.push(self.value());
            }
            out
        }
    }
}
