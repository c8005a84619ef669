//! Fingerprint-keyed disk memoization of materialized tables (spec.md §3
//! "Cache entries", §4.7).
//!
//! Entries are immutable once written and named `<hex(fingerprint)>.<ext>`
//! under a configured cache directory. A per-key singleflight (the teacher's
//! `Cache<T>` also centralizes concurrent access to shared state, though for
//! page versions rather than fingerprints) ensures concurrent callers asking
//! for the same key block on a single producer instead of racing to write
//! the same file.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};

use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use tracing::{debug, warn};

use crate::error::{GqlError, Result};
use crate::hash::Hash;
use crate::marshal::{Decoder, Encoder};
use crate::value::Value;

/// Extension used for cache entry files, independent of any
/// `FileHandler`-registered codec: the cache always round-trips through the
/// crate's own `Value::marshal`/`unmarshal`, never a format codec.
const CACHE_EXT: &str = "gqlcache";

type CacheResult = Result<Arc<Vec<Value>>>;

/// Fingerprint-keyed on-disk materialization cache.
pub struct Cache {
    dir: PathBuf,
    inflight: Mutex<FxHashMap<Hash, Arc<OnceLock<CacheResult>>>>,
}

impl Cache {
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Cache {
            dir,
            inflight: Mutex::new(FxHashMap::default()),
        })
    }

    fn path_for(&self, key: Hash) -> PathBuf {
        self.dir.join(format!("{}.{CACHE_EXT}", key.to_hex()))
    }

    fn tmp_path_for(&self, key: Hash) -> PathBuf {
        let pid = std::process::id();
        static COUNTER: std::sync::atomic::AtomicU64 = std::sync::atomic::AtomicU64::new(0);
        let n = COUNTER.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
        self.dir.join(format!("{}.{CACHE_EXT}.tmp.{pid}.{n}", key.to_hex()))
    }

    /// Read an already-materialized entry for `key`, if present on disk.
    /// Does not participate in singleflight: callers that want to avoid a
    /// concurrent duplicate materialization should go through [`Cache::build`].
    pub fn lookup(&self, key: Hash) -> Result<Option<Arc<Vec<Value>>>> {
        let path = self.path_for(key);
        match fs::read(&path) {
            Ok(bytes) => Ok(Some(Arc::new(decode_rows(&bytes)?))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(GqlError::Io(e)),
        }
    }

    /// Return the materialized rows for `key`, running `produce` at most
    /// once across all concurrent callers that share this `Cache` (spec.md
    /// §4.7: "per-key singleflight"). `produce` is only ever invoked by the
    /// first caller to observe `key` as unclaimed; everyone else blocks on
    /// the resulting `OnceLock`.
    pub fn build(&self, key: Hash, produce: impl FnOnce() -> Result<Vec<Value>>) -> CacheResult {
        if let Some(rows) = self.lookup(key)? {
            return Ok(rows);
        }

        let slot = {
            let mut map = self.inflight.lock();
            map.entry(key).or_insert_with(|| Arc::new(OnceLock::new())).clone()
        };

        let result = slot
            .get_or_init(|| {
                // Re-check disk: another process (not just another thread
                // in this one) may have raced us to materialize `key`.
                match self.lookup(key) {
                    Ok(Some(rows)) => Ok(rows),
                    Ok(None) => match produce() {
                        Ok(rows) => {
                            let rows = Arc::new(rows);
                            if let Err(e) = self.write_atomic(key, &rows) {
                                warn!(fingerprint = %key.to_hex(), error = %e, "failed to persist cache entry");
                            }
                            Ok(rows)
                        }
                        Err(e) => Err(e),
                    },
                    Err(e) => Err(e),
                }
            })
            .clone();

        self.inflight.lock().remove(&key);
        result
    }

    fn write_atomic(&self, key: Hash, rows: &[Value]) -> Result<()> {
        let tmp = self.tmp_path_for(key);
        let mut enc = Encoder::new();
        enc.varint(rows.len() as u64);
        for r in rows {
            r.marshal(&mut enc);
        }
        fs::write(&tmp, enc.into_bytes())?;
        fs::rename(&tmp, self.path_for(key))?;
        debug!(fingerprint = %key.to_hex(), rows = rows.len(), "wrote cache entry");
        Ok(())
    }

    /// Remove any leftover `*.tmp.*` files in the cache directory. Crash
    /// recovery only: a producer that dies mid-write leaves its temp file
    /// behind, tolerated and ignored by [`Cache::lookup`]/[`Cache::build`]
    /// (spec.md §6: "sibling `.tmp` file is tolerated and ignored on
    /// startup"). Never called automatically — an external sweeper (cron,
    /// CLI subcommand) is expected to invoke this periodically.
    pub fn discard_stale_temp_files(&self) -> Result<usize> {
        let mut removed = 0;
        for entry in fs::read_dir(&self.dir)? {
            let entry = entry?;
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if name.contains(".tmp.") {
                if fs::remove_file(entry.path()).is_ok() {
                    removed += 1;
                }
            }
        }
        Ok(removed)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

fn decode_rows(bytes: &[u8]) -> Result<Vec<Value>> {
    let mut dec = Decoder::new(bytes);
    let n = dec.varint().map_err(|e| GqlError::CacheCorruption {
        hex: String::new(),
        msg: e.to_string(),
    })? as usize;
    let mut rows = Vec::with_capacity(n);
    for _ in 0..n {
        rows.push(Value::unmarshal(&mut dec)?);
    }
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn build_runs_producer_once_and_persists() {
        let dir = tempfile::tempdir().unwrap();
        let cache = Cache::new(dir.path()).unwrap();
        let key = Hash::of_string("a_test_cache_key");
        let calls = AtomicUsize::new(0);

        let rows1 = cache
            .build(key, || {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(vec![Value::Int(1), Value::Int(2)])
            })
            .unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(*rows1, vec![Value::Int(1), Value::Int(2)]);

        // Second call for the same key: file now exists, producer must not
        // run again.
        let rows2 = cache
            .build(key, || {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(vec![Value::Int(99)])
            })
            .unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(*rows2, vec![Value::Int(1), Value::Int(2)]);
    }

    #[test]
    fn cache_idempotence_same_bytes_on_repeat_materialization() {
        let dir = tempfile::tempdir().unwrap();
        let key = Hash::of_string("a_test_cache_idempotence");
        {
            let cache = Cache::new(dir.path()).unwrap();
            cache.build(key, || Ok(vec![Value::Int(1), Value::Int(2), Value::Int(3)])).unwrap();
        }
        let bytes1 = fs::read(dir.path().join(format!("{}.{CACHE_EXT}", key.to_hex()))).unwrap();
        // Force a second, independent materialization producing logically
        // identical rows.
        let dir2 = tempfile::tempdir().unwrap();
        {
            let cache = Cache::new(dir2.path()).unwrap();
            cache.build(key, || Ok(vec![Value::Int(1), Value::Int(2), Value::Int(3)])).unwrap();
        }
        let bytes2 = fs::read(dir2.path().join(format!("{}.{CACHE_EXT}", key.to_hex()))).unwrap();
        assert_eq!(bytes1, bytes2);
    }

    #[test]
    fn discard_stale_temp_files_removes_only_tmp_files() {
        let dir = tempfile::tempdir().unwrap();
        let cache = Cache::new(dir.path()).unwrap();
        let key = Hash::of_string("a_test_cache_sweep");
        cache.build(key, || Ok(vec![Value::Int(1)])).unwrap();
        fs::write(dir.path().join(format!("{}.{CACHE_EXT}.tmp.1.2", key.to_hex())), b"junk").unwrap();
        let removed = cache.discard_stale_temp_files().unwrap();
        assert_eq!(removed, 1);
        assert!(cache.lookup(key).unwrap().is_some());
    }

    #[test]
    fn lookup_missing_key_returns_none() {
        let dir = tempfile::tempdir().unwrap();
        let cache = Cache::new(dir.path()).unwrap();
        assert!(cache.lookup(Hash::of_string("a_test_cache_missing")).unwrap().is_none());
    }
}
