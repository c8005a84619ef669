//! Output rendering (spec.md §6's CLI surface; deliberately thin —
//! "terminal pagination and HTML rendering internals beyond a `Printer`
//! trait" are an explicit Non-goal, so only the render-to-sink contract is
//! implemented here, not a real pager or a styled HTML renderer).
//!
//! Grounded on the teacher's `WebQuery` idiom of accumulating output into a
//! buffer (`status_code`/`headers`/`output: Vec<u8>`) before it is flushed
//! to its destination, generalized from one HTTP-response target to any
//! [`Sink`].

use std::io::{self, Write};

use crate::table::LenKind;
use crate::value::Value;

/// Where rendered output goes, and (loosely) how it's framed. `Paged` and
/// `Html` only change the framing written around each value's plain
/// rendering; neither drives an actual pager subprocess or a styled
/// renderer (both out of scope — see the module doc comment).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Format {
    Plain,
    Paged,
    Html,
}

/// Anything a `Printer` can write rendered output to.
pub trait Sink: Write {}
impl<T: Write> Sink for T {}

/// Renders `Value`s to a `Sink` in the configured `Format`.
pub struct Printer<W: Write> {
    format: Format,
    out: W,
}

impl<W: Write> Printer<W> {
    pub fn new(format: Format, out: W) -> Self {
        Printer { format, out }
    }

    /// Render every value produced by a `Session::run_script` call, one
    /// per line (or, for `Html`, one per `<pre>` block).
    pub fn print_all(&mut self, values: &[Value]) -> io::Result<()> {
        match self.format {
            Format::Html => {
                writeln!(self.out, "<table>")?;
                for v in values {
                    writeln!(self.out, "<tr><td><pre>{}</pre></td></tr>", html_escape(&render(v)))?;
                }
                writeln!(self.out, "</table>")
            }
            Format::Plain | Format::Paged => {
                for v in values {
                    writeln!(self.out, "{}", render(v))?;
                }
                Ok(())
            }
        }
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

/// A `Printer` that accumulates into an in-memory buffer instead of a real
/// sink — used by the CLI's `--eval` one-shot mode and by tests that want
/// to assert on rendered output without touching stdout.
pub type BufferPrinter = Printer<Vec<u8>>;

pub fn buffer(format: Format) -> BufferPrinter {
    Printer::new(format, Vec::new())
}

fn render(value: &Value) -> String {
    match value {
        Value::Null(_) => "NA".to_string(),
        Value::Int(i) => i.to_string(),
        Value::Float(f) => f.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Char(c) => c.to_string(),
        Value::String(s) => s.to_string(),
        Value::Enum(sym) => sym.str().to_string(),
        Value::FileName(path) => path.to_string(),
        Value::DateTime(ns) => format!("datetime({ns})"),
        Value::Duration(ns) => format!("duration({ns})"),
        Value::Struct(row) => render_fields(row.fields().iter().map(|(n, v)| (n.str().to_string(), v))),
        Value::StructFragment(fields) => render_fields(fields.iter().map(|(n, v)| (n.str().to_string(), v))),
        Value::Table(t) => {
            let rows = t.collect();
            let approx = t.len(LenKind::Approx);
            let rendered: Vec<String> = rows.iter().map(render).collect();
            match approx {
                Some(n) if n as usize != rendered.len() => format!("table({} rows, ~{n} reported): [{}]", rendered.len(), rendered.join(", ")),
                _ => format!("table({} rows): [{}]", rendered.len(), rendered.join(", ")),
            }
        }
        Value::Func(_) => "<func>".to_string(),
        Value::Invalid => "<invalid>".to_string(),
    }
}

fn render_fields<'a>(fields: impl Iterator<Item = (String, &'a Value)>) -> String {
    let parts: Vec<String> = fields.map(|(name, v)| format!("{name}: {}", render(v))).collect();
    format!("{{{}}}", parts.join(", "))
}

fn html_escape(s: &str) -> String {
    s.replace('&', "&amp;").replace('<', "&lt;").replace('>', "&gt;")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hash::Hash;
    use crate::symbol;
    use crate::table::{MemTable, TableAttrs};
    use crate::value::Row;

    #[test]
    fn plain_rendering_of_a_struct_lists_fields_in_order() {
        let mut p = buffer(Format::Plain);
        let name = symbol::intern("a_test_printer_name");
        let row = Value::Struct(Row::new(vec![(name, Value::Int(7))]));
        p.print_all(&[row]).unwrap();
        let out = String::from_utf8(p.into_inner()).unwrap();
        assert!(out.contains("a_test_printer_name: 7"));
    }

    #[test]
    fn html_rendering_escapes_and_wraps_in_table() {
        let mut p = buffer(Format::Html);
        p.print_all(&[Value::String(std::sync::Arc::from("<x>"))]).unwrap();
        let out = String::from_utf8(p.into_inner()).unwrap();
        assert!(out.contains("<table>"));
        assert!(out.contains("&lt;x&gt;"));
    }

    #[test]
    fn table_rendering_counts_rows() {
        let mut p = buffer(Format::Plain);
        let rows = vec![Value::Int(1), Value::Int(2), Value::Int(3)];
        let fp = Hash::merge_seq(rows.iter().map(Value::fingerprint));
        let t = MemTable::new(rows, fp, TableAttrs::default());
        p.print_all(&[Value::Table(t)]).unwrap();
        let out = String::from_utf8(p.into_inner()).unwrap();
        assert!(out.contains("table(3 rows)"));
    }
}
