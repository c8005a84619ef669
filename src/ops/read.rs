//! `read(path)` — open a file (or pseudo-scheme) path as a `Table` via the
//! registered `FileHandler` for its extension (spec.md §4.6).
//!
//! The returned table's fingerprint is `Hash(path)` folded with an
//! immutability flag rather than the handler's own content digest (spec.md
//! §4.6): a path matching `ctx.config.immutable_files` is assumed to never
//! change underfoot, so its mtime is ignored and two reads of the same path
//! always hit the materialization cache; any other path folds in the file's
//! stat digest (mtime + length) so an edited-in-place file busts the cache.

use crate::ast::Arg;
use crate::env::Env;
use crate::error::Result;
use crate::eval::EvalCtx;
use crate::hash::Hash;
use crate::value::Value;

fn stat_digest(path: &str) -> Result<Hash> {
    let meta = std::fs::metadata(path)?;
    let mtime_ns = meta
        .modified()?
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or(0);
    Ok(Hash::of_int(mtime_ns as i64).merge(Hash::of_int(meta.len() as i64)))
}

pub fn call(ctx: &EvalCtx, args: &[Arg], env: &Env) -> Result<Value> {
    let path = ctx.eval(super::positional(args, 0)?, env)?.as_str()?;
    let handler = ctx.files.by_path(&path)?;
    let table = handler.open(&ctx.interrupt, &path)?;

    let immutable = ctx.config.immutable_files.is_match(&path);
    let mut fingerprint = Hash::of_string("read").merge(Hash::of_string(&path));
    fingerprint = if immutable {
        fingerprint.merge_tag("immutable")
    } else {
        fingerprint.merge(stat_digest(&path)?)
    };

    Ok(Value::Table(table.with_fingerprint(fingerprint)))
}
