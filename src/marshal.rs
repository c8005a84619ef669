//! Compact binary marshaling with per-stream symbol back-reference
//! compression (spec.md §4.3).
//!
//! `Encoder`/`Decoder` are a matched pair of primitives
//! (`byte`/`bool`/`varint`/`uint64`/`hash`/`bytes`/`string`/`raw_bytes`/
//! `symbol`). Encoding must be deterministic for equal values — fingerprint
//! stability (spec.md §4.4) depends on it.

use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use std::sync::OnceLock;

use crate::hash::Hash;
use crate::symbol::{self, SymbolId};

/// A growable output buffer plus the per-stream symbol dictionary used to
/// compress repeated [`SymbolId`]s into small back-references.
pub struct Encoder {
    buf: Vec<u8>,
    /// Maps a symbol to the back-reference index it was first written
    /// under in *this* stream only (spec.md: "per-stream back-references").
    seen: FxHashMap<SymbolId, u32>,
}

/// Matching reader for an [`Encoder`]'s output.
pub struct Decoder<'a> {
    buf: &'a [u8],
    pos: usize,
    /// Reverse of `Encoder::seen`: back-reference index -> resolved symbol.
    seen: Vec<SymbolId>,
}

/// Corrupt or truncated marshal stream (spec.md §7: "cache corruption").
#[derive(Debug, thiserror::Error)]
pub enum MarshalError {
    #[error("unexpected end of marshal stream")]
    Eof,
    #[error("invalid UTF-8 in marshaled string")]
    BadUtf8,
    #[error("symbol back-reference {0} out of range")]
    BadBackref(i64),
    #[error("unknown symbol wire tag {0}")]
    BadSymbolTag(u8),
}

type Result<T> = std::result::Result<T, MarshalError>;

/// Wire-format discriminators for [`Encoder::symbol`]/[`Decoder::symbol`]
/// (spec.md §4.2: pre-interned symbols marshal as raw ids, everything else
/// through the per-stream back-reference dictionary).
const SYMBOL_RAW_ID: u8 = 0;
const SYMBOL_BACKREF: u8 = 1;

/// A small pool of reusable output buffers, avoiding per-call allocation in
/// the steady state (the teacher's `ByteStorage` reuses pages for the same
/// reason).
fn pool() -> &'static Mutex<Vec<Vec<u8>>> {
    static POOL: OnceLock<Mutex<Vec<Vec<u8>>>> = OnceLock::new();
    POOL.get_or_init(|| Mutex::new(Vec::new()))
}

impl Default for Encoder {
    fn default() -> Self {
        Self::new()
    }
}

impl Encoder {
    /// New encoder, reusing a pooled buffer if one is available.
    pub fn new() -> Self {
        let buf = pool().lock().pop().unwrap_or_default();
        Encoder {
            buf,
            seen: FxHashMap::default(),
        }
    }

    pub fn byte(&mut self, b: u8) {
        self.buf.push(b);
    }

    pub fn bool(&mut self, b: bool) {
        self.byte(if b { 1 } else { 0 });
    }

    /// Unsigned LEB128 varint.
    pub fn varint(&mut self, mut v: u64) {
        loop {
            let mut b = (v & 0x7f) as u8;
            v >>= 7;
            if v != 0 {
                b |= 0x80;
            }
            self.buf.push(b);
            if v == 0 {
                break;
            }
        }
    }

    /// Zigzag-encoded signed varint, used for symbol back-references (the
    /// only signed primitive in the format).
    pub fn svarint(&mut self, v: i64) {
        let zz = ((v << 1) ^ (v >> 63)) as u64;
        self.varint(zz);
    }

    pub fn uint64(&mut self, v: u64) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    pub fn hash(&mut self, h: Hash) {
        self.buf.extend_from_slice(&h.0);
    }

    /// Length-prefixed byte string.
    pub fn bytes(&mut self, b: &[u8]) {
        self.varint(b.len() as u64);
        self.buf.extend_from_slice(b);
    }

    pub fn string(&mut self, s: &str) {
        self.bytes(s.as_bytes());
    }

    /// Unprefixed raw bytes — caller knows the length from context.
    pub fn raw_bytes(&mut self, b: &[u8]) {
        self.buf.extend_from_slice(b);
    }

    /// Encode a symbol. Pre-interned symbols (spec.md §4.2: stable across
    /// worker nodes) are marshaled as a raw, tagged integer id — no node
    /// needs the literal name to resolve them. Everything else uses
    /// per-stream back-reference compression: the first occurrence writes a
    /// negative index followed by the literal name; repeats write just the
    /// (positive) index.
    pub fn symbol(&mut self, id: SymbolId) {
        if symbol::is_pre_interned(id) {
            self.byte(SYMBOL_RAW_ID);
            self.varint(id.0 as u64);
            return;
        }
        self.byte(SYMBOL_BACKREF);
        if let Some(&idx) = self.seen.get(&id) {
            self.svarint(idx as i64 + 1);
        } else {
            let idx = self.seen.len() as u32;
            self.seen.insert(id, idx);
            self.svarint(-(idx as i64 + 1));
            self.string(&id.str());
        }
    }

    /// Finish encoding, returning the bytes. The internal buffer is *not*
    /// returned to the pool here — call [`Encoder::into_pooled_vec`] if you
    /// want to recycle it once you're done with the bytes.
    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }

    /// Current length of the encoded stream.
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }
}

impl Drop for Encoder {
    fn drop(&mut self) {
        let mut b = std::mem::take(&mut self.buf);
        if pool().lock().len() < 64 {
            b.clear();
            pool().lock().push(b);
        }
    }
}

impl<'a> Decoder<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Decoder {
            buf,
            pos: 0,
            seen: Vec::new(),
        }
    }

    pub fn byte(&mut self) -> Result<u8> {
        let b = *self.buf.get(self.pos).ok_or(MarshalError::Eof)?;
        self.pos += 1;
        Ok(b)
    }

    pub fn bool(&mut self) -> Result<bool> {
        Ok(self.byte()? != 0)
    }

    pub fn varint(&mut self) -> Result<u64> {
        let mut result: u64 = 0;
        let mut shift = 0;
        loop {
            let b = self.byte()?;
            result |= ((b & 0x7f) as u64) << shift;
            if b & 0x80 == 0 {
                break;
            }
            shift += 7;
        }
        Ok(result)
    }

    pub fn svarint(&mut self) -> Result<i64> {
        let zz = self.varint()?;
        Ok(((zz >> 1) as i64) ^ -((zz & 1) as i64))
    }

    pub fn uint64(&mut self) -> Result<u64> {
        let end = self.pos + 8;
        let slice = self.buf.get(self.pos..end).ok_or(MarshalError::Eof)?;
        self.pos = end;
        Ok(u64::from_le_bytes(slice.try_into().unwrap()))
    }

    pub fn hash(&mut self) -> Result<Hash> {
        let end = self.pos + 32;
        let slice = self.buf.get(self.pos..end).ok_or(MarshalError::Eof)?;
        self.pos = end;
        let mut out = [0u8; 32];
        out.copy_from_slice(slice);
        Ok(Hash(out))
    }

    pub fn bytes(&mut self) -> Result<Vec<u8>> {
        let len = self.varint()? as usize;
        let end = self.pos + len;
        let slice = self.buf.get(self.pos..end).ok_or(MarshalError::Eof)?;
        self.pos = end;
        Ok(slice.to_vec())
    }

    pub fn string(&mut self) -> Result<String> {
        String::from_utf8(self.bytes()?).map_err(|_| MarshalError::BadUtf8)
    }

    pub fn raw_bytes(&mut self, len: usize) -> Result<&'a [u8]> {
        let end = self.pos + len;
        let slice = self.buf.get(self.pos..end).ok_or(MarshalError::Eof)?;
        self.pos = end;
        Ok(slice)
    }

    pub fn symbol(&mut self) -> Result<SymbolId> {
        match self.byte()? {
            SYMBOL_RAW_ID => {
                let raw = self.varint()?;
                Ok(SymbolId(raw as u32))
            }
            SYMBOL_BACKREF => {
                let v = self.svarint()?;
                if v < 0 {
                    let idx = (-v - 1) as usize;
                    let name = self.string()?;
                    let id = symbol::intern(&name);
                    if idx != self.seen.len() {
                        return Err(MarshalError::BadBackref(v));
                    }
                    self.seen.push(id);
                    Ok(id)
                } else {
                    let idx = (v - 1) as usize;
                    self.seen
                        .get(idx)
                        .copied()
                        .ok_or(MarshalError::BadBackref(v))
                }
            }
            other => Err(MarshalError::BadSymbolTag(other)),
        }
    }

    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    pub fn at_end(&self) -> bool {
        self.pos == self.buf.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn varint_round_trip() {
        for v in [0u64, 1, 127, 128, 300, u64::MAX] {
            let mut e = Encoder::new();
            e.varint(v);
            let bytes = e.into_bytes();
            let mut d = Decoder::new(&bytes);
            assert_eq!(d.varint().unwrap(), v);
            assert!(d.at_end());
        }
    }

    #[test]
    fn svarint_round_trip() {
        for v in [0i64, 1, -1, 1000, -1000, i64::MIN, i64::MAX] {
            let mut e = Encoder::new();
            e.svarint(v);
            let bytes = e.into_bytes();
            let mut d = Decoder::new(&bytes);
            assert_eq!(d.svarint().unwrap(), v);
        }
    }

    #[test]
    fn symbol_raw_id_used_for_pre_interned_symbols() {
        // Spinning up a Session interns the builtin keyword names and marks
        // them pre-interned (spec.md §4.2); `key` is always among them.
        let dir = tempfile::tempdir().unwrap();
        let _session = crate::session::Session::new(crate::eval::SessionConfig::default(), dir.path()).unwrap();
        let id = symbol::intern("key");
        assert!(symbol::is_pre_interned(id));

        let mut e = Encoder::new();
        e.symbol(id);
        let bytes = e.into_bytes();
        assert_eq!(bytes[0], SYMBOL_RAW_ID, "pre-interned symbols marshal as a raw id, not a back-reference");

        let mut d = Decoder::new(&bytes);
        assert_eq!(d.symbol().unwrap(), id);
        assert!(d.at_end());
    }

    #[test]
    fn symbol_backreference_compresses_repeats() {
        let id = symbol::intern("a_test_marshal_symbol_repeat");
        let mut e = Encoder::new();
        e.symbol(id);
        e.symbol(id);
        let bytes = e.into_bytes();
        let mut d = Decoder::new(&bytes);
        assert_eq!(d.symbol().unwrap(), id);
        assert_eq!(d.symbol().unwrap(), id);
        assert!(d.at_end());
    }

    #[test]
    fn string_and_bytes_round_trip() {
        let mut e = Encoder::new();
        e.string("hello world");
        e.bytes(&[1, 2, 3, 4]);
        e.hash(Hash::of_string("x"));
        let bytes = e.into_bytes();
        let mut d = Decoder::new(&bytes);
        assert_eq!(d.string().unwrap(), "hello world");
        assert_eq!(d.bytes().unwrap(), vec![1, 2, 3, 4]);
        assert_eq!(d.hash().unwrap(), Hash::of_string("x"));
        assert!(d.at_end());
    }

    #[test]
    fn truncated_stream_is_eof_not_panic() {
        let mut e = Encoder::new();
        e.uint64(42);
        let mut bytes = e.into_bytes();
        bytes.truncate(4);
        let mut d = Decoder::new(&bytes);
        assert!(matches!(d.uint64(), Err(MarshalError::Eof)));
    }
}
