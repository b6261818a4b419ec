//! Metro language driver: source discovery, import resolution, and wiring
//! lex -> parse -> check -> evaluate into a single process.

use std::path::{Path, PathBuf};
use std::process;

use clap::Parser;

use metro_core::diagnostics::{CollectingSink, Diagnostic, DiagnosticKind, DiagnosticSink};
use metro_core::source::SourceStore;
use metro_check::RuntimeError;

/// Metro language interpreter.
#[derive(Parser)]
#[command(name = "metro", about = "Metro language interpreter")]
struct Cli {
    /// Source files to run (`.metro` extension), concatenated in order as
    /// one compilation unit.
    paths: Vec<PathBuf>,

    /// Treat `<expr>` as an inline program instead of reading source files.
    #[arg(short = 'c', long = "eval", value_name = "EXPR")]
    inline: Option<String>,
}

fn main() {
    tracing_subscriber::fmt().with_env_filter(tracing_subscriber::EnvFilter::from_default_env()).without_time().init();

    let cli = Cli::parse();
    process::exit(run(cli));
}

/// Exit codes: 0 clean, 1 diagnostic emission (lex/parse/Sema/import), >1
/// runtime fatals (spec.md 6.1).
fn run(cli: Cli) -> i32 {
    let text = if let Some(expr) = &cli.inline {
        expr.clone()
    } else if cli.paths.is_empty() {
        eprintln!("error: no source files given (pass one or more `.metro` paths, or `-c <expr>`)");
        return 1;
    } else {
        let mut loaded = Vec::new();
        let mut combined = String::new();
        for path in &cli.paths {
            let mut chain = Vec::new();
            match load_unit_text(path, &mut chain, &mut loaded) {
                Ok(text) => {
                    combined.push_str(&text);
                    combined.push('\n');
                }
                Err(()) => return 1,
            }
        }
        combined
    };

    let mut store = SourceStore::new();
    let id = store.add_file(if cli.inline.is_some() { PathBuf::from("<inline>") } else { PathBuf::from("<program>") }, text);

    let mut sink = CollectingSink::new();
    let tokens = tracing::info_span!("lex").in_scope(|| metro_core::lex(&store, id, &mut sink));
    let (items, parse_ok) = tracing::info_span!("parse").in_scope(|| metro_core::parse_file(&tokens, id, &mut sink));
    if !parse_ok || sink.has_errors() {
        report(&sink, &store);
        return 1;
    }

    tracing::info_span!("check").in_scope(|| metro_check::check_program(&items, &tokens, &mut sink));
    report(&sink, &store);
    if sink.has_errors() {
        return 1;
    }

    match tracing::info_span!("eval").in_scope(|| metro_check::run_program(&items, &tokens)) {
        Ok(code) => code,
        Err(e) => {
            let diag = Diagnostic::error(DiagnosticKind::Runtime, e.span(), e.to_string());
            eprint!("{}", diag.render(&store));
            runtime_exit_code(&e)
        }
    }
}

/// Distinct non-zero codes per runtime failure kind (spec.md 6.1 only
/// requires ">1", not a fixed numbering).
fn runtime_exit_code(e: &RuntimeError) -> i32 {
    match e {
        RuntimeError::DivisionByZero { .. } => 2,
        RuntimeError::IndexOutOfRange { .. } => 3,
        RuntimeError::KeyNotFound { .. } => 4,
        RuntimeError::FileOpenFailure { .. } => 5,
        RuntimeError::Builtin { .. } => 6,
    }
}

fn report(sink: &CollectingSink, store: &SourceStore) {
    for diag in &sink.diagnostics {
        eprint!("{}", diag.render(store));
    }
}

/// Loads `path` and every file it (transitively) imports, in source order,
/// returning one combined source text. `import a/b` is a source-level
/// directive resolved here rather than an AST node: it only decides which
/// files' text become part of this run's single compilation unit, which is
/// then lexed and parsed exactly once (spec.md 6.2).
fn load_unit_text(path: &Path, chain: &mut Vec<PathBuf>, loaded: &mut Vec<PathBuf>) -> Result<String, ()> {
    if chain.contains(&path.to_path_buf()) {
        eprintln!("error: cannot import recursively: '{}' is already being imported", path.display());
        return Err(());
    }
    if loaded.contains(&path.to_path_buf()) {
        return Ok(String::new());
    }

    let text = match std::fs::read_to_string(path) {
        Ok(t) => t,
        Err(e) => {
            eprintln!("error: cannot open source file '{}': {e}", path.display());
            return Err(());
        }
    };

    let (stripped, imports) = strip_imports(&text);
    loaded.push(path.to_path_buf());
    chain.push(path.to_path_buf());

    let mut combined = String::new();
    let base = path.parent().unwrap_or_else(|| Path::new(""));
    for segs in &imports {
        let import_path = base.join(format!("{segs}.metro"));
        let imported = load_unit_text(&import_path, chain, loaded)?;
        combined.push_str(&imported);
        combined.push('\n');
    }
    combined.push_str(&stripped);

    chain.pop();
    Ok(combined)
}

/// Removes `import a/b/c;` lines (replacing them with a blank line so later
/// diagnostics keep correct line numbers within this file's own text),
/// returning the remaining text and the ordered list of import path strings
/// (`a/b/c`, no extension).
fn strip_imports(text: &str) -> (String, Vec<String>) {
    let mut imports = Vec::new();
    let mut out = String::with_capacity(text.len());
    for line in text.lines() {
        let trimmed = line.trim_start();
        if let Some(rest) = trimmed.strip_prefix("import ") {
            let path = rest.trim().trim_end_matches(';').trim();
            imports.push(path.to_string());
        } else {
            out.push_str(line);
        }
        out.push('\n');
    }
    (out, imports)
}
