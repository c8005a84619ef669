//! `readdir(dir)` — list a directory, grouping per-sample shard files
//! sharing a directory (named `<base>-s<digits>.<ext>`) into one field
//! whose sanitized group name becomes a `Struct` field identifier
//! (spec.md §4.6: "sanitizes names into field identifiers"). Each field's
//! value is classified against the `FileHandler` registry: a group whose
//! extension has a registered handler becomes a `Table` (of the group's
//! file paths); anything else — an unrecognized extension on a lone file —
//! becomes a `FileName` string (spec.md §8 scenario (d)). Files with no
//! `-s<digits>` suffix get their own single-file group.

use std::sync::Arc;

use regex::Regex;
use rustc_hash::FxHashMap;

use crate::ast::Arg;
use crate::env::Env;
use crate::error::Result;
use crate::eval::EvalCtx;
use crate::hash::Hash;
use crate::symbol::{self, SymbolId};
use crate::table::{MemTable, TableAttrs};
use crate::value::{Row, Value};

fn split_ext(file_name: &str) -> (&str, &str) {
    match file_name.rsplit_once('.') {
        Some((stem, ext)) => (stem, ext),
        None => (file_name, ""),
    }
}

/// Turn an arbitrary group key (a file stem, possibly with an extension
/// and punctuation) into a valid field identifier: every byte that isn't
/// `[A-Za-z0-9_]` becomes `_`, and a leading digit gets a `_` prefix so the
/// result is never ambiguous with a numeric literal.
fn sanitize_ident(key: &str) -> String {
    let mut out: String = key
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .collect();
    if out.chars().next().is_some_and(|c| c.is_ascii_digit()) {
        out.insert(0, '_');
    }
    out
}

pub fn call(ctx: &EvalCtx, args: &[Arg], env: &Env) -> Result<Value> {
    let dir = ctx.eval(super::positional(args, 0)?, env)?.as_str()?;
    let shard_re = Regex::new(r"^(?P<base>.+)-s\d+$").expect("static regex is valid");

    // Preserve first-seen order of group keys so output fields are stable
    // across runs of the same directory contents.
    let mut order: Vec<String> = Vec::new();
    let mut groups: FxHashMap<String, Vec<String>> = FxHashMap::default();
    for entry in std::fs::read_dir(&*dir)? {
        let entry = entry?;
        let file_name = entry.file_name().to_string_lossy().into_owned();
        let (stem, ext) = split_ext(&file_name);
        let group_key = match shard_re.captures(stem) {
            Some(caps) if !ext.is_empty() => format!("{}.{}", &caps["base"], ext),
            Some(caps) => caps["base"].to_string(),
            None => file_name.clone(),
        };
        if !groups.contains_key(&group_key) {
            order.push(group_key.clone());
        }
        groups.entry(group_key).or_default().push(format!("{dir}/{file_name}"));
    }

    let mut fields: Vec<(SymbolId, Value)> = Vec::with_capacity(order.len());
    for group in &order {
        let mut paths = groups.remove(group).expect("recorded in own order");
        paths.sort();

        // Classify by consulting the FileHandler registry on a
        // representative path: known extension -> Table of the group's
        // paths; otherwise a lone file (shard grouping requires a shared,
        // therefore known-or-not-together extension) -> a bare FileName.
        let known_extension = ctx.files.by_path(&paths[0]).is_ok();
        let value = if !known_extension && paths.len() == 1 {
            Value::FileName(Arc::from(paths[0].as_str()))
        } else {
            let file_values: Vec<Value> = paths.iter().map(|p| Value::FileName(Arc::from(p.as_str()))).collect();
            let files_fp = Hash::merge_seq(file_values.iter().map(Value::fingerprint));
            Value::Table(MemTable::new(
                file_values,
                files_fp,
                TableAttrs {
                    name: "readdir-group".to_string(),
                    ..Default::default()
                },
            ))
        };

        fields.push((symbol::intern(&sanitize_ident(group)), value));
    }

    Ok(Value::Struct(Row::new(fields)))
}
