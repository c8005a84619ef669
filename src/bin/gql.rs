//! Thin CLI front end (spec.md §6) — builds a `SessionConfig` from flags,
//! a positional script path or `--eval` expression, and trailing
//! `-flag`/`-flag=value` global constants, then delegates everything else
//! to `Session`. All semantics live in the library; this binary only
//! parses arguments and renders output.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser as ClapParser;

use gql::error::{GqlError, Result};
use gql::eval::SessionConfig;
use gql::printer::{Format, Printer};
use gql::session::Session;
use gql::symbol;
use gql::value::Value;

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum OutputArg {
    Plain,
    Paged,
    Html,
}

impl From<OutputArg> for Format {
    fn from(o: OutputArg) -> Format {
        match o {
            OutputArg::Plain => Format::Plain,
            OutputArg::Paged => Format::Paged,
            OutputArg::Html => Format::Html,
        }
    }
}

#[derive(clap::Parser)]
#[command(name = "gql", about = "Interactive query language for tabular scientific data")]
struct Cli {
    /// Evaluate this single expression instead of running a script file.
    #[arg(long)]
    eval: Option<String>,

    #[arg(long, value_enum, default_value_t = OutputArg::Plain)]
    output: OutputArg,

    #[arg(long)]
    overwrite_files: bool,

    #[arg(long, default_value = ".gqlcache")]
    cache_dir: PathBuf,

    /// Comma-separated regexes; a `read` of a matching path trusts the path
    /// alone and ignores the file's mtime when fingerprinting it.
    #[arg(long)]
    immutable_files: Option<String>,

    /// A script path (unless `--eval` is given), followed by any number of
    /// `-flag` / `-flag=value` global constants.
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    rest: Vec<String>,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    match run(Cli::parse()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{e}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<()> {
    let immutable_files = match &cli.immutable_files {
        Some(patterns) => regex::RegexSet::new(patterns.split(',').map(str::trim))
            .map_err(|e| GqlError::Internal(format!("invalid --immutable-files pattern: {e}")))?,
        None => regex::RegexSet::empty(),
    };
    let config = SessionConfig {
        n_shards: 1,
        overwrite_files: cli.overwrite_files,
        immutable_files,
    };
    let session = Session::new(config, &cli.cache_dir)?;

    let mut rest = cli.rest.into_iter();
    let script_path = if cli.eval.is_none() { rest.next() } else { None };
    for arg in rest {
        bind_constant(&session, &arg);
    }

    let values = if let Some(expr) = &cli.eval {
        vec![session.eval_str(expr)?]
    } else if let Some(path) = &script_path {
        let source = std::fs::read_to_string(path)?;
        session.run_script(&source)?
    } else {
        Vec::new()
    };

    let mut printer = Printer::new(cli.output.into(), std::io::stdout());
    printer.print_all(&values)?;
    Ok(())
}

/// Bind a trailing `-flag` / `-flag=value` CLI argument as a global
/// constant (spec.md §6). A bare `-flag` binds `true`; `-flag=value`
/// guesses int, then float, then falls back to string.
fn bind_constant(session: &Session, arg: &str) {
    let body = arg.strip_prefix('-').unwrap_or(arg);
    let (name, value) = match body.split_once('=') {
        Some((name, value)) => (name, parse_constant(value)),
        None => (body, Value::Bool(true)),
    };
    session.bind(symbol::intern(name), value);
}

fn parse_constant(text: &str) -> Value {
    if let Ok(i) = text.parse::<i64>() {
        Value::Int(i)
    } else if let Ok(f) = text.parse::<f64>() {
        Value::Float(f)
    } else if text == "true" {
        Value::Bool(true)
    } else if text == "false" {
        Value::Bool(false)
    } else {
        Value::String(Arc::from(text))
    }
}
