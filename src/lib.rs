//! GQL: an interactive query language and execution engine for tabular
//! scientific data.
//!
//! A `Session` (see `session` module) owns the process-wide collaborators —
//! the symbol table, a materialization `Cache`, a `LocalScheduler`, and a
//! file-format `Registry` — and evaluates parsed scripts against a
//! `session`-local `Env` of `X := expr` global bindings. Tables are
//! represented as lazily-scanned, shardable `Table` values (`table` module);
//! the built-in operator library (`read`, `map`, `filter`, `reduce`,
//! `flatten`, `sort`, `join`, `pick`, `write`, `readdir`) lives under `ops`
//! and is dispatched by the tree-walking evaluator in `eval`.
//!
//! ```text
//! count := func(t) pick(reduce(t, 0, _acc + 1, map:=0), true).value;
//! ```
//! is itself how `count`/`sum`/`distinct`/`group_count`/`first` are defined
//! in the `prelude` module, loaded into every new `Session`.

/// Fingerprinting: a stable, content-addressed hash used for cache keys,
/// table/value identity, and symbol pre-interning order.
pub mod hash;

/// Process-wide interned identifiers (`SymbolId`), with a "pre-interned"
/// boundary used to keep well-known names stable across worker processes.
pub mod symbol;

/// Binary encode/decode of `Value`s, used by the on-disk cache and by
/// `table`/`value` codecs.
pub mod marshal;

/// The dynamically-typed runtime value: scalars, structs, tables, closures.
pub mod value;

/// Lazily-scanned, shardable tables, and the format-specific codecs under
/// `codecs/` that back file-sourced ones.
pub mod table;

/// Variable bindings: a persistent, chained scope used by closures and the
/// implicit per-row binding of operator bodies.
pub mod env;

/// Parsed syntax tree shared by the lexer/parser and the evaluator.
pub mod ast;

/// The tree-walking evaluator and the `EvalCtx`/`SessionConfig` it runs
/// with.
pub mod eval;

/// The built-in operator library (`read`, `map`, `filter`, `reduce`,
/// `flatten`, `sort`, `join`, `pick`, `write`, `readdir`).
pub mod ops;

/// Pluggable file-format support (`FileHandler` trait and the `Registry`
/// that resolves a path/name to one).
pub mod filehandler;

/// Concrete `FileHandler` implementations: an in-memory test format and a
/// tab-separated-values (optionally gzipped) format.
pub mod codecs;

/// Content-addressed, on-disk materialization cache with a singleflight
/// `build`.
pub mod cache;

/// Cooperative cancellation: a process-wide flag plus an optional
/// locally-scoped one an operator can use to stop its own sibling shards.
pub mod interrupt;

/// A minimal, in-process stand-in for a sharded worker pool.
pub mod scheduler;

/// The `GqlError` taxonomy and `Result` alias used throughout the crate.
pub mod error;

/// Tokenizer for GQL source text.
pub mod lexer;

/// Recursive-descent parser producing `ast::Stmt`/`ast::Expr`.
pub mod parser;

/// The `Session` facade: parses and evaluates scripts against accumulated
/// global bindings, catching panics at the evaluation boundary.
pub mod session;

/// Rendering evaluated values to a sink, in a small set of output formats.
pub mod printer;

/// The GQL-in-GQL bootstrap script loaded into every new `Session`.
pub mod prelude;

pub use error::{GqlError, Result};
pub use session::Session;
pub use value::Value;
