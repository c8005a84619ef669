//! In-memory `mem:` pseudo-scheme handler (spec.md SPEC_FULL.md supplement):
//! backs `table(...)` literals and tests with a concrete `Table` without
//! touching disk.

use std::sync::Arc;

use parking_lot::RwLock;
use rustc_hash::FxHashMap;

use crate::ast::Expr;
use crate::error::{GqlError, Result};
use crate::filehandler::FileHandler;
use crate::hash::Hash;
use crate::interrupt::InterruptContext;
use crate::table::{MemTable, Table, TableAttrs};
use crate::value::Value;

/// Handler for paths of the form `mem:<key>`. Entries live only as long as
/// the process (or, in tests, the handler instance) — there is no disk
/// component at all.
#[derive(Default)]
pub struct MemHandler {
    store: RwLock<FxHashMap<String, Arc<Vec<Value>>>>,
}

impl MemHandler {
    fn key_of<'a>(&self, path: &'a str) -> &'a str {
        path.strip_prefix("mem:").unwrap_or(path)
    }

    /// Directly publish rows under `key`, bypassing the `write`/`ast`
    /// ceremony — used by `table(...)` literal evaluation.
    pub fn put(&self, key: &str, rows: Vec<Value>) {
        self.store.write().insert(key.to_string(), Arc::new(rows));
    }
}

impl FileHandler for MemHandler {
    fn name(&self) -> &str {
        "mem"
    }

    fn handles_path(&self, path: &str) -> bool {
        path.starts_with("mem:")
    }

    fn open(&self, _ctx: &InterruptContext, path: &str) -> Result<Table> {
        let key = self.key_of(path);
        let rows = self
            .store
            .read()
            .get(key)
            .cloned()
            .ok_or_else(|| GqlError::Internal(format!("no in-memory table registered at `mem:{key}`")))?;
        let fingerprint = Hash::merge_seq(rows.iter().map(|r| r.fingerprint()));
        Ok(MemTable::new(
            (*rows).clone(),
            fingerprint,
            TableAttrs {
                name: self.name().to_string(),
                path: path.to_string(),
                description: String::new(),
            },
        ))
    }

    fn write(
        &self,
        _ctx: &InterruptContext,
        path: &str,
        _ast: &Expr,
        table: &Table,
        _n_shards: usize,
        _overwrite: bool,
    ) -> Result<()> {
        let key = self.key_of(path).to_string();
        self.put(&key, table.collect());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_then_open_round_trips() {
        let handler = MemHandler::default();
        let ctx = InterruptContext::background();
        let rows = vec![Value::Int(10), Value::Int(20), Value::Int(30)];
        let t = MemTable::new(rows.clone(), Hash::ZERO, TableAttrs::default());
        handler
            .write(&ctx, "mem:scratch", &Expr::Const(Value::Invalid), &t, 1, false)
            .unwrap();
        let back = handler.open(&ctx, "mem:scratch").unwrap();
        assert_eq!(back.collect(), rows);
    }

    #[test]
    fn open_unknown_key_errors() {
        let handler = MemHandler::default();
        let ctx = InterruptContext::background();
        assert!(handler.open(&ctx, "mem:nope").is_err());
    }
}
