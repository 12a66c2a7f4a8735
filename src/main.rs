// CLI entry point: parse arguments, collect candidates, dispatch the match
// run, emit results. Exit code 0 on a clean run, 1 on usage errors or when
// any I/O error was recorded during the walk.

use std::env;
use std::fs;
use std::io::{self, Write};
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

use tracing::debug;

use gpufind::batch::{CompiledPattern, Orchestrator};
use gpufind::cli::{self, CliRequest, PatternArg};
use gpufind::error::FindError;
use gpufind::filters::{self, TimeField};
use gpufind::output;
use gpufind::pattern::MatchOptions;
use gpufind::walk::{self, WalkOptions};

fn main() {
    let code = match run() {
        Ok(walk_errors) => {
            if walk_errors {
                1
            } else {
                0
            }
        }
        Err(e) => {
            eprintln!("gpufind: {e}");
            1
        }
    };
    std::process::exit(code);
}

fn run() -> Result<bool, FindError> {
    let req = cli::parse(env::args_os().skip(1))?;
    init_tracing(req.verbose);

    let patterns = build_patterns(&req.patterns)?;
    let (candidates, walk_errors) = gather(&req)?;

    let complexity = patterns
        .iter()
        .map(|p| p.complexity())
        .fold(Default::default(), |a: gpufind::pattern::PatternComplexity, c| {
            gpufind::pattern::PatternComplexity {
                wildcards: a.wildcards.max(c.wildcards),
                classes: a.classes.max(c.classes),
            }
        });

    let orch = Orchestrator::new(req.mode, candidates.len(), complexity)?;
    debug!(
        backend = orch.backend().name(),
        device = orch.device_name().unwrap_or("-"),
        candidates = candidates.len(),
        "dispatching"
    );

    let verdicts = orch.match_paths(&candidates, &patterns, req.negate)?;

    let stdout = io::stdout();
    let mut out = stdout.lock();
    if req.count {
        let n = verdicts.iter().filter(|&&v| v).count();
        output::emit_count(&mut out, n)?;
    } else {
        let matched = candidates
            .iter()
            .zip(&verdicts)
            .filter(|(_, &m)| m)
            .map(|(p, _)| p.as_slice());
        output::emit_paths(&mut out, matched, req.print0)?;
    }
    out.flush()?;

    Ok(walk_errors)
}

fn init_tracing(verbose: bool) {
    let default = if verbose {
        "gpufind=debug"
    } else {
        "gpufind=warn"
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

fn build_patterns(args: &[PatternArg]) -> Result<Vec<CompiledPattern>, FindError> {
    args.iter()
        .map(|arg| match arg {
            PatternArg::Name {
                pattern,
                case_insensitive,
            } => CompiledPattern::glob(
                pattern,
                MatchOptions::new().case_insensitive(*case_insensitive),
            ),
            PatternArg::PathGlob {
                pattern,
                case_insensitive,
            } => CompiledPattern::glob(
                pattern,
                MatchOptions::new()
                    .case_insensitive(*case_insensitive)
                    .match_path(true),
            ),
            PatternArg::Regex {
                pattern,
                case_insensitive,
            } => CompiledPattern::regex(pattern, *case_insensitive),
        })
        .collect()
}

/// Collect candidate paths: either the walker output filtered by the
/// metadata predicates, or the stdin path list.
fn gather(req: &CliRequest) -> Result<(Vec<Vec<u8>>, bool), FindError> {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0);

    if req.stdin_paths {
        return gather_stdin(req, now);
    }

    let opts = WalkOptions {
        max_depth: req.max_depth,
        min_depth: req.min_depth,
        prune: req.prune.clone(),
    };
    let outcome = walk::walk(&req.roots, &opts);

    let mut candidates = Vec::with_capacity(outcome.entries.len());
    for entry in &outcome.entries {
        if entry_passes(
            req,
            now,
            &entry.path,
            entry.file_type,
            entry.size,
            entry.mtime,
            entry.atime,
            entry.ctime,
        ) {
            candidates.push(entry.path_bytes());
        }
    }
    Ok((candidates, outcome.had_errors))
}

/// Stdin candidates are matched as given; predicates needing stat data look
/// it up lazily, and entries whose stat fails are skipped like mid-walk
/// errors.
fn gather_stdin(req: &CliRequest, now: i64) -> Result<(Vec<Vec<u8>>, bool), FindError> {
    let stdin = io::stdin();
    let mut lock = stdin.lock();
    let paths = walk::read_stdin_paths(&mut lock)?;

    let needs_stat = req.type_filter.is_some()
        || req.size.is_some()
        || !req.times.is_empty()
        || req.empty;

    if !needs_stat {
        return Ok((paths, false));
    }

    let mut candidates = Vec::with_capacity(paths.len());
    let mut had_errors = false;
    for raw in paths {
        let path = bytes_to_path(&raw);
        let meta = match fs::symlink_metadata(&path) {
            Ok(m) => m,
            Err(_) => {
                had_errors = true;
                continue;
            }
        };
        let (mtime, atime, ctime) = walk::stat_times(&meta);
        if entry_passes(
            req,
            now,
            &path,
            meta.file_type(),
            meta.len(),
            mtime,
            atime,
            ctime,
        ) {
            candidates.push(raw);
        }
    }
    Ok((candidates, had_errors))
}

#[cfg(unix)]
fn bytes_to_path(raw: &[u8]) -> std::path::PathBuf {
    use std::os::unix::ffi::OsStrExt;
    Path::new(std::ffi::OsStr::from_bytes(raw)).to_path_buf()
}

#[cfg(not(unix))]
fn bytes_to_path(raw: &[u8]) -> std::path::PathBuf {
    std::path::PathBuf::from(String::from_utf8_lossy(raw).into_owned())
}

#[allow(clippy::too_many_arguments)]
fn entry_passes(
    req: &CliRequest,
    now: i64,
    path: &Path,
    file_type: fs::FileType,
    size: u64,
    mtime: i64,
    atime: i64,
    ctime: i64,
) -> bool {
    if let Some(t) = &req.type_filter {
        if !t.matches(file_type) {
            return false;
        }
    }
    if let Some(s) = &req.size {
        if !s.matches(size) {
            return false;
        }
    }
    for tf in &req.times {
        let ts = match tf.field {
            TimeField::Modified => mtime,
            TimeField::Accessed => atime,
            TimeField::Changed => ctime,
        };
        if !tf.matches(now, ts) {
            return false;
        }
    }
    if req.empty && !filters::is_empty(path, file_type, size) {
        return false;
    }
    true
}
