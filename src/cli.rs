// find-grammar argument parser.
//
//   find [--auto|--gpu|--cpu|--metal|--vulkan] [-v|--verbose]
//        [path ...]
//        [ -name|-iname|-path|-ipath|-regex|-iregex PATTERN ]
//        [ -o -name|-iname PATTERN ]*
//        [ -type X ] [ -maxdepth N ] [ -mindepth N ] [ -size S ]
//        [ -mtime|-atime|-ctime T ] [ -prune PATTERN ]
//        [ -empty ] [ -not | ! ] [ -print0 ] [ -count ]
//
// find's operand grammar (single-dash long predicates, paths before the
// expression, `-o` disjunction) is hand-parsed over a token cursor; no
// derive-style CLI crate expresses it.

use std::ffi::OsString;
use std::path::PathBuf;

use crate::error::FindError;
use crate::filters::{SizeFilter, TimeField, TimeFilter, TypeFilter};
use crate::gpu::select::BackendMode;
use crate::pattern::{MAX_PATH_LEN, MAX_PATTERN_LEN};

/// A pattern operand as written on the command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PatternArg {
    /// `-name` / `-iname`: glob over the basename.
    Name {
        pattern: Vec<u8>,
        case_insensitive: bool,
    },
    /// `-path` / `-ipath`: glob over the full path.
    PathGlob {
        pattern: Vec<u8>,
        case_insensitive: bool,
    },
    /// `-regex` / `-iregex`: whole-path regex.
    Regex {
        pattern: Vec<u8>,
        case_insensitive: bool,
    },
}

/// Everything a run needs, parsed and validated.
#[derive(Debug, Default)]
pub struct CliRequest {
    pub mode: BackendMode,
    pub verbose: bool,
    pub roots: Vec<PathBuf>,
    pub stdin_paths: bool,
    pub patterns: Vec<PatternArg>,
    pub negate: bool,
    pub type_filter: Option<TypeFilter>,
    pub max_depth: Option<usize>,
    pub min_depth: Option<usize>,
    pub size: Option<SizeFilter>,
    pub times: Vec<TimeFilter>,
    pub prune: Option<Vec<u8>>,
    pub empty: bool,
    pub print0: bool,
    pub count: bool,
}

#[cfg(unix)]
fn arg_bytes(arg: &OsString) -> Vec<u8> {
    use std::os::unix::ffi::OsStrExt;
    arg.as_os_str().as_bytes().to_vec()
}

#[cfg(not(unix))]
fn arg_bytes(arg: &OsString) -> Vec<u8> {
    arg.to_string_lossy().into_owned().into_bytes()
}

struct Cursor {
    args: Vec<OsString>,
    pos: usize,
}

impl Cursor {
    fn next(&mut self) -> Option<&OsString> {
        let arg = self.args.get(self.pos);
        if arg.is_some() {
            self.pos += 1;
        }
        arg
    }

    fn value(&mut self, flag: &str) -> Result<&OsString, FindError> {
        self.next()
            .ok_or_else(|| FindError::usage(format!("{flag} requires an argument")))
    }

    fn str_value(&mut self, flag: &str) -> Result<String, FindError> {
        let v = self.value(flag)?;
        v.to_str()
            .map(str::to_owned)
            .ok_or_else(|| FindError::usage(format!("{flag}: argument is not valid UTF-8")))
    }

    fn pattern_value(&mut self, flag: &str) -> Result<Vec<u8>, FindError> {
        let bytes = arg_bytes(self.value(flag)?);
        if bytes.len() > MAX_PATTERN_LEN {
            return Err(FindError::PatternTooLong);
        }
        Ok(bytes)
    }
}

fn parse_number(flag: &str, arg: &str) -> Result<usize, FindError> {
    arg.parse::<usize>()
        .map_err(|_| FindError::usage(format!("{flag}: invalid number: {arg}")))
}

/// Parse the argument list (without argv[0]).
pub fn parse<I: IntoIterator<Item = OsString>>(args: I) -> Result<CliRequest, FindError> {
    let mut cur = Cursor {
        args: args.into_iter().collect(),
        pos: 0,
    };
    let mut req = CliRequest::default();
    let mut expression_started = false;

    while let Some(arg) = cur.next() {
        let text = arg.to_str().map(str::to_owned);
        match text.as_deref() {
            Some("--auto") => req.mode = BackendMode::Auto,
            Some("--gpu") => req.mode = BackendMode::ForceGpu,
            Some("--cpu") => req.mode = BackendMode::ForceCpu,
            Some("--metal") => req.mode = BackendMode::ForceMetal,
            Some("--vulkan") => req.mode = BackendMode::ForceVulkan,
            Some("-v") | Some("--verbose") => req.verbose = true,

            Some("-name") | Some("-iname") => {
                let ci = text.as_deref() == Some("-iname");
                let pattern = cur.pattern_value(text.as_deref().unwrap_or("-name"))?;
                push_pattern(
                    &mut req,
                    PatternArg::Name {
                        pattern,
                        case_insensitive: ci,
                    },
                )?;
                expression_started = true;
            }
            Some("-path") | Some("-ipath") => {
                let ci = text.as_deref() == Some("-ipath");
                let pattern = cur.pattern_value(text.as_deref().unwrap_or("-path"))?;
                push_pattern(
                    &mut req,
                    PatternArg::PathGlob {
                        pattern,
                        case_insensitive: ci,
                    },
                )?;
                expression_started = true;
            }
            Some("-regex") | Some("-iregex") => {
                let ci = text.as_deref() == Some("-iregex");
                let pattern = cur.pattern_value(text.as_deref().unwrap_or("-regex"))?;
                push_pattern(
                    &mut req,
                    PatternArg::Regex {
                        pattern,
                        case_insensitive: ci,
                    },
                )?;
                expression_started = true;
            }
            Some("-o") => {
                // Only a -name/-iname disjunct may follow.
                let next = cur
                    .next()
                    .and_then(|a| a.to_str().map(str::to_owned))
                    .ok_or_else(|| FindError::usage("-o requires -name or -iname"))?;
                let ci = match next.as_str() {
                    "-name" => false,
                    "-iname" => true,
                    other => {
                        return Err(FindError::usage(format!(
                            "-o must be followed by -name or -iname, got {other}"
                        )))
                    }
                };
                if req.patterns.is_empty() {
                    return Err(FindError::usage("-o needs a preceding pattern"));
                }
                let pattern = cur.pattern_value("-name")?;
                req.patterns.push(PatternArg::Name {
                    pattern,
                    case_insensitive: ci,
                });
                expression_started = true;
            }

            Some("-type") => {
                let letter = cur.str_value("-type")?;
                req.type_filter = Some(TypeFilter::parse(&letter)?);
                expression_started = true;
            }
            Some("-maxdepth") => {
                let n = cur.str_value("-maxdepth")?;
                req.max_depth = Some(parse_number("-maxdepth", &n)?);
                expression_started = true;
            }
            Some("-mindepth") => {
                let n = cur.str_value("-mindepth")?;
                req.min_depth = Some(parse_number("-mindepth", &n)?);
                expression_started = true;
            }
            Some("-size") => {
                let spec = cur.str_value("-size")?;
                req.size = Some(SizeFilter::parse(&spec)?);
                expression_started = true;
            }
            Some("-mtime") | Some("-atime") | Some("-ctime") => {
                let field = match text.as_deref() {
                    Some("-mtime") => TimeField::Modified,
                    Some("-atime") => TimeField::Accessed,
                    _ => TimeField::Changed,
                };
                let spec = cur.str_value(text.as_deref().unwrap_or("-mtime"))?;
                req.times.push(TimeFilter::parse(field, &spec)?);
                expression_started = true;
            }
            Some("-prune") => {
                req.prune = Some(cur.pattern_value("-prune")?);
                expression_started = true;
            }
            Some("-empty") => {
                req.empty = true;
                expression_started = true;
            }
            Some("-not") | Some("!") => {
                req.negate = true;
                expression_started = true;
            }
            Some("-print0") => {
                req.print0 = true;
                expression_started = true;
            }
            Some("-count") => {
                req.count = true;
                expression_started = true;
            }

            Some("-") if !expression_started => req.stdin_paths = true,
            Some(flag) if flag.starts_with('-') && flag.len() > 1 => {
                return Err(FindError::usage(format!("unknown predicate: {flag}")));
            }
            _ => {
                if expression_started {
                    return Err(FindError::usage(format!(
                        "paths must precede the expression: {}",
                        arg.to_string_lossy()
                    )));
                }
                if arg_bytes(arg).len() > MAX_PATH_LEN {
                    return Err(FindError::PathTooLong);
                }
                req.roots.push(PathBuf::from(arg));
            }
        }
    }

    if req.roots.is_empty() && !req.stdin_paths {
        req.roots.push(PathBuf::from("."));
    }
    Ok(req)
}

/// First pattern slot; a second primary pattern needs `-o`.
fn push_pattern(req: &mut CliRequest, pattern: PatternArg) -> Result<(), FindError> {
    if !req.patterns.is_empty() {
        return Err(FindError::usage(
            "multiple patterns must be joined with -o",
        ));
    }
    req.patterns.push(pattern);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_line(line: &[&str]) -> Result<CliRequest, FindError> {
        parse(line.iter().map(OsString::from))
    }

    #[test]
    fn test_defaults() {
        let req = parse_line(&[]).unwrap();
        assert_eq!(req.roots, vec![PathBuf::from(".")]);
        assert_eq!(req.mode, BackendMode::Auto);
        assert!(req.patterns.is_empty());
        assert!(!req.verbose);
        assert!(!req.count);
    }

    #[test]
    fn test_full_line() {
        let req = parse_line(&[
            "--vulkan", "-v", "/usr", "/opt", "-name", "*.rs", "-o", "-iname", "*.TXT", "-type",
            "f", "-maxdepth", "3", "-size", "+1M", "-mtime", "-7", "-print0",
        ])
        .unwrap();
        assert_eq!(req.mode, BackendMode::ForceVulkan);
        assert!(req.verbose);
        assert_eq!(req.roots.len(), 2);
        assert_eq!(req.patterns.len(), 2);
        assert_eq!(
            req.patterns[0],
            PatternArg::Name {
                pattern: b"*.rs".to_vec(),
                case_insensitive: false
            }
        );
        assert_eq!(
            req.patterns[1],
            PatternArg::Name {
                pattern: b"*.TXT".to_vec(),
                case_insensitive: true
            }
        );
        assert!(req.type_filter.is_some());
        assert_eq!(req.max_depth, Some(3));
        assert!(req.size.is_some());
        assert_eq!(req.times.len(), 1);
        assert!(req.print0);
    }

    #[test]
    fn test_backend_flags() {
        assert_eq!(parse_line(&["--gpu"]).unwrap().mode, BackendMode::ForceGpu);
        assert_eq!(parse_line(&["--cpu"]).unwrap().mode, BackendMode::ForceCpu);
        assert_eq!(
            parse_line(&["--metal"]).unwrap().mode,
            BackendMode::ForceMetal
        );
        assert_eq!(parse_line(&["--auto"]).unwrap().mode, BackendMode::Auto);
    }

    #[test]
    fn test_regex_and_negate() {
        let req = parse_line(&["-iregex", ".*\\.c", "-not"]).unwrap();
        assert_eq!(
            req.patterns[0],
            PatternArg::Regex {
                pattern: b".*\\.c".to_vec(),
                case_insensitive: true
            }
        );
        assert!(req.negate);
        let req = parse_line(&["!", "-name", "*.o"]).unwrap();
        assert!(req.negate);
    }

    #[test]
    fn test_path_glob() {
        let req = parse_line(&["-ipath", "*/src/*"]).unwrap();
        assert_eq!(
            req.patterns[0],
            PatternArg::PathGlob {
                pattern: b"*/src/*".to_vec(),
                case_insensitive: true
            }
        );
    }

    #[test]
    fn test_stdin_marker() {
        let req = parse_line(&["-", "-name", "*.rs"]).unwrap();
        assert!(req.stdin_paths);
        assert!(req.roots.is_empty());
    }

    #[test]
    fn test_errors() {
        assert!(matches!(
            parse_line(&["-frobnicate"]),
            Err(FindError::Usage(_))
        ));
        assert!(matches!(parse_line(&["-name"]), Err(FindError::Usage(_))));
        assert!(matches!(
            parse_line(&["-type", "q"]),
            Err(FindError::Usage(_))
        ));
        assert!(matches!(
            parse_line(&["-maxdepth", "many"]),
            Err(FindError::Usage(_))
        ));
        assert!(matches!(
            parse_line(&["-o", "-name", "x"]),
            Err(FindError::Usage(_))
        ));
        assert!(matches!(
            parse_line(&["-name", "a", "-o", "-type", "f"]),
            Err(FindError::Usage(_))
        ));
        // Paths after the expression starts are rejected.
        assert!(matches!(
            parse_line(&["-name", "a", "/late/path"]),
            Err(FindError::Usage(_))
        ));
        // Two primaries without -o are rejected.
        assert!(matches!(
            parse_line(&["-name", "a", "-name", "b"]),
            Err(FindError::Usage(_))
        ));
    }

    #[test]
    fn test_pattern_length_limit() {
        let long = "x".repeat(MAX_PATTERN_LEN + 1);
        assert!(matches!(
            parse_line(&["-name", &long]),
            Err(FindError::PatternTooLong)
        ));
    }

    #[test]
    fn test_count_and_empty() {
        let req = parse_line(&["-name", "*.log", "-empty", "-count"]).unwrap();
        assert!(req.empty);
        assert!(req.count);
    }

    #[test]
    fn test_prune() {
        let req = parse_line(&[".", "-name", "*.rs", "-prune", "target"]).unwrap();
        assert_eq!(req.prune, Some(b"target".to_vec()));
    }
}
