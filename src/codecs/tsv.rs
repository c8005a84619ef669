//! Minimal tab-separated-value codec (spec.md SPEC_FULL.md supplement): a
//! reference implementation of the `FileHandler` interface, not a
//! production TSV reader. Column-type guessing beyond "does this field
//! parse as an integer or float literal" is explicitly out of scope.

use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Read, Write};
use std::sync::Arc;

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;

use crate::ast::Expr;
use crate::error::{GqlError, Result};
use crate::filehandler::FileHandler;
use crate::hash::Hash;
use crate::interrupt::InterruptContext;
use crate::symbol::{self, SymbolId};
use crate::table::{MemTable, Table, TableAttrs};
use crate::value::{Row, Value};

pub struct TsvHandler;

fn is_gz(path: &str) -> bool {
    path.ends_with(".tsv.gz")
}

fn reader_for(path: &str) -> Result<Box<dyn BufRead>> {
    let f = File::open(path)?;
    if is_gz(path) {
        Ok(Box::new(BufReader::new(GzDecoder::new(f))))
    } else {
        Ok(Box::new(BufReader::new(f)))
    }
}

fn parse_cell(s: &str) -> Value {
    if let Ok(i) = s.parse::<i64>() {
        Value::Int(i)
    } else if let Ok(f) = s.parse::<f64>() {
        Value::Float(f)
    } else {
        Value::String(Arc::from(s))
    }
}

fn cell_to_string(v: &Value) -> String {
    match v {
        Value::Int(i) => i.to_string(),
        Value::Float(f) => f.to_string(),
        Value::String(s) => s.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Null(_) => String::new(),
        other => format!("{other:?}"),
    }
}

fn read_rows(path: &str) -> Result<(Vec<SymbolId>, Vec<Value>)> {
    let mut reader = reader_for(path)?;
    let mut header_line = String::new();
    if reader.read_line(&mut header_line)? == 0 {
        return Ok((Vec::new(), Vec::new()));
    }
    let columns: Vec<SymbolId> = header_line.trim_end_matches(['\n', '\r']).split('\t').map(symbol::intern).collect();

    let mut rows = Vec::new();
    for line in reader.lines() {
        let line = line?;
        if line.is_empty() {
            continue;
        }
        let cells: Vec<&str> = line.split('\t').collect();
        let fields: Vec<(SymbolId, Value)> = columns
            .iter()
            .copied()
            .zip(cells.iter().map(|c| parse_cell(c)))
            .collect();
        rows.push(Value::Struct(Row::new(fields)));
    }
    Ok((columns, rows))
}

impl FileHandler for TsvHandler {
    fn name(&self) -> &str {
        "tsv"
    }

    fn handles_path(&self, path: &str) -> bool {
        path.ends_with(".tsv") || is_gz(path)
    }

    fn open(&self, _ctx: &InterruptContext, path: &str) -> Result<Table> {
        let (_columns, rows) = read_rows(path)?;
        let fingerprint = Hash::merge_seq(rows.iter().map(|r| r.fingerprint()));
        Ok(MemTable::new(
            rows,
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
        n_shards: usize,
        overwrite: bool,
    ) -> Result<()> {
        let rows = table.collect();
        if n_shards <= 1 {
            write_shard(path, &rows, overwrite)
        } else {
            let (stem, ext) = split_ext(path);
            for shard in 0..n_shards {
                let shard_rows: Vec<&Value> = rows.iter().skip(shard).step_by(n_shards).collect();
                let shard_path = format!("{stem}-s{shard}.{ext}");
                write_shard_refs(&shard_path, &shard_rows, overwrite)?;
            }
            Ok(())
        }
    }
}

fn split_ext(path: &str) -> (&str, &str) {
    if let Some(stem) = path.strip_suffix(".tsv.gz") {
        (stem, "tsv.gz")
    } else if let Some(stem) = path.strip_suffix(".tsv") {
        (stem, "tsv")
    } else {
        (path, "tsv")
    }
}

fn write_shard(path: &str, rows: &[Value], overwrite: bool) -> Result<()> {
    let refs: Vec<&Value> = rows.iter().collect();
    write_shard_refs(path, &refs, overwrite)
}

fn write_shard_refs(path: &str, rows: &[&Value], overwrite: bool) -> Result<()> {
    if !overwrite && std::path::Path::new(path).exists() {
        return Err(GqlError::Io(std::io::Error::new(
            std::io::ErrorKind::AlreadyExists,
            format!("refusing to overwrite existing file `{path}` (pass --overwrite-files)"),
        )));
    }
    let f = File::create(path)?;
    let mut out: Box<dyn Write> = if is_gz(path) {
        Box::new(GzEncoder::new(BufWriter::new(f), Compression::default()))
    } else {
        Box::new(BufWriter::new(f))
    };

    let mut columns: Vec<SymbolId> = Vec::new();
    for row in rows {
        if let Value::Struct(r) = row {
            for (name, _) in r.fields() {
                if !columns.contains(name) {
                    columns.push(*name);
                }
            }
        }
    }
    let header: Vec<String> = columns.iter().map(|c| c.str().to_string()).collect();
    writeln!(out, "{}", header.join("\t"))?;
    for row in rows {
        if let Value::Struct(r) = row {
            let cells: Vec<String> = columns
                .iter()
                .map(|c| r.get(*c).map(cell_to_string).unwrap_or_default())
                .collect();
            writeln!(out, "{}", cells.join("\t"))?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_plain_tsv() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rows.tsv");
        let path = path.to_str().unwrap();

        let k = symbol::intern("a_test_tsv_k");
        let v = symbol::intern("a_test_tsv_v");
        let rows = vec![
            Value::Struct(Row::new(vec![(k, Value::Int(1)), (v, Value::Int(10))])),
            Value::Struct(Row::new(vec![(k, Value::Int(2)), (v, Value::Int(20))])),
        ];
        let t = MemTable::new(
            rows.clone(),
            Hash::merge_seq(rows.iter().map(|r| r.fingerprint())),
            TableAttrs::default(),
        );

        let handler = TsvHandler;
        let ctx = InterruptContext::background();
        handler
            .write(&ctx, path, &Expr::Const(Value::Invalid), &t, 1, true)
            .unwrap();
        let read_back = handler.open(&ctx, path).unwrap();
        assert_eq!(read_back.collect(), rows);
    }

    #[test]
    fn sharded_write_produces_one_file_per_shard() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rows.tsv");
        let path = path.to_str().unwrap();
        let k = symbol::intern("a_test_tsv_shard_k");
        let rows: Vec<Value> = (0..6).map(|i| Value::Struct(Row::new(vec![(k, Value::Int(i))]))).collect();
        let t = MemTable::new(rows, Hash::ZERO, TableAttrs::default());
        let handler = TsvHandler;
        let ctx = InterruptContext::background();
        handler
            .write(&ctx, path, &Expr::Const(Value::Invalid), &t, 2, true)
            .unwrap();
        let (stem, ext) = split_ext(path);
        assert!(std::path::Path::new(&format!("{stem}-s0.{ext}")).exists());
        assert!(std::path::Path::new(&format!("{stem}-s1.{ext}")).exists());
    }
}
