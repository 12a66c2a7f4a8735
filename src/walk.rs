// Directory walker and stdin path ingestion.
//
// Synchronous depth-first traversal; entries are emitted in the order the
// directory iterator returns them (not sorted), parents before children.
// Error policy follows GNU find: a root that cannot be read is reported on
// stderr and the walk continues with other roots; unreadable directories
// mid-walk are skipped silently. Either case makes the final exit code 1.

use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::FindError;
use crate::pattern::{glob, MatchOptions, MAX_PATH_LEN};

/// Stdin ingestion cap for `find -`.
pub const STDIN_MAX_BYTES: usize = 1 << 20;

#[derive(Debug, Clone, Default)]
pub struct WalkOptions {
    pub max_depth: Option<usize>,
    pub min_depth: Option<usize>,
    /// Directories whose basename matches are neither emitted nor entered.
    pub prune: Option<Vec<u8>>,
}

/// One filesystem entry with the stat data the filters need.
#[derive(Debug)]
pub struct WalkEntry {
    pub path: PathBuf,
    pub file_type: fs::FileType,
    pub size: u64,
    pub mtime: i64,
    pub atime: i64,
    pub ctime: i64,
    pub depth: usize,
}

impl WalkEntry {
    pub fn path_bytes(&self) -> Vec<u8> {
        path_bytes(&self.path)
    }
}

#[derive(Debug, Default)]
pub struct WalkOutcome {
    pub entries: Vec<WalkEntry>,
    pub had_errors: bool,
}

#[cfg(unix)]
pub fn path_bytes(p: &Path) -> Vec<u8> {
    use std::os::unix::ffi::OsStrExt;
    p.as_os_str().as_bytes().to_vec()
}

#[cfg(not(unix))]
pub fn path_bytes(p: &Path) -> Vec<u8> {
    p.to_string_lossy().into_owned().into_bytes()
}

/// (mtime, atime, ctime) epoch seconds for a stat result.
#[cfg(unix)]
pub fn stat_times(meta: &fs::Metadata) -> (i64, i64, i64) {
    use std::os::unix::fs::MetadataExt;
    (meta.mtime(), meta.atime(), meta.ctime())
}

/// (mtime, atime, ctime) epoch seconds for a stat result.
#[cfg(not(unix))]
pub fn stat_times(meta: &fs::Metadata) -> (i64, i64, i64) {
    use std::time::UNIX_EPOCH;
    let secs = |t: std::io::Result<std::time::SystemTime>| {
        t.ok()
            .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
            .map(|d| d.as_secs() as i64)
            .unwrap_or(0)
    };
    let m = secs(meta.modified());
    let a = secs(meta.accessed());
    (m, a, m)
}

fn pruned(path: &Path, opts: &WalkOptions) -> bool {
    match &opts.prune {
        Some(pattern) => glob::matches(pattern, &path_bytes(path), MatchOptions::new()),
        None => false,
    }
}

/// Walk every root depth-first. Symbolic links are not followed.
pub fn walk(roots: &[PathBuf], opts: &WalkOptions) -> WalkOutcome {
    let mut out = WalkOutcome::default();
    let min_depth = opts.min_depth.unwrap_or(0);

    for root in roots {
        let meta = match fs::symlink_metadata(root) {
            Ok(m) => m,
            Err(e) => {
                eprintln!("gpufind: {}: {}", root.display(), e);
                out.had_errors = true;
                continue;
            }
        };

        let is_dir = meta.file_type().is_dir();
        if is_dir && pruned(root, opts) {
            continue;
        }

        push_entry(&mut out, root.clone(), &meta, 0, min_depth);

        let descend = is_dir && opts.max_depth.map_or(true, |m| m > 0);
        if descend {
            walk_dir(root, 1, opts, min_depth, &mut out);
        }
    }
    out
}

fn walk_dir(dir: &Path, depth: usize, opts: &WalkOptions, min_depth: usize, out: &mut WalkOutcome) {
    let reader = match fs::read_dir(dir) {
        Ok(r) => r,
        Err(_) => {
            // Unreadable directory mid-walk: skipped without a message.
            out.had_errors = true;
            return;
        }
    };

    for entry in reader {
        let entry = match entry {
            Ok(e) => e,
            Err(_) => {
                out.had_errors = true;
                continue;
            }
        };
        let path = entry.path();
        let meta = match fs::symlink_metadata(&path) {
            Ok(m) => m,
            Err(_) => {
                out.had_errors = true;
                continue;
            }
        };

        let is_dir = meta.file_type().is_dir();
        if is_dir && pruned(&path, opts) {
            continue;
        }

        push_entry(out, path.clone(), &meta, depth, min_depth);

        if is_dir && opts.max_depth.map_or(true, |m| depth < m) {
            walk_dir(&path, depth + 1, opts, min_depth, out);
        }
    }
}

fn push_entry(out: &mut WalkOutcome, path: PathBuf, meta: &fs::Metadata, depth: usize, min_depth: usize) {
    if depth < min_depth {
        return;
    }
    if path_bytes(&path).len() > MAX_PATH_LEN {
        debug!(path = %path.display(), "skipping over-long path");
        return;
    }
    let (mtime, atime, ctime) = stat_times(meta);
    out.entries.push(WalkEntry {
        path,
        file_type: meta.file_type(),
        size: meta.len(),
        mtime,
        atime,
        ctime,
        depth,
    });
}

/// Read whitespace-separated paths from stdin (`find -`), capped at 1 MiB.
pub fn read_stdin_paths(reader: &mut impl Read) -> Result<Vec<Vec<u8>>, FindError> {
    let mut buf = Vec::new();
    reader
        .take(STDIN_MAX_BYTES as u64 + 1)
        .read_to_end(&mut buf)?;
    if buf.len() > STDIN_MAX_BYTES {
        return Err(FindError::usage("stdin path list exceeds 1 MiB"));
    }
    Ok(buf
        .split(|b| b.is_ascii_whitespace())
        .filter(|s| !s.is_empty())
        .map(|s| s.to_vec())
        .collect())
}
