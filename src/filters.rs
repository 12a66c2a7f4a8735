// Metadata predicates: -type, -size, -mtime/-atime/-ctime, -empty.
//
// These run host-side against stat data collected by the walker, before any
// pattern matching is dispatched.

use std::fs;
use std::path::Path;

use crate::error::FindError;

/// File kind, from `-type f|d|l|b|c|p|s`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeFilter {
    File,
    Dir,
    Symlink,
    Block,
    Char,
    Fifo,
    Socket,
}

impl TypeFilter {
    pub fn parse(arg: &str) -> Result<Self, FindError> {
        match arg {
            "f" => Ok(TypeFilter::File),
            "d" => Ok(TypeFilter::Dir),
            "l" => Ok(TypeFilter::Symlink),
            "b" => Ok(TypeFilter::Block),
            "c" => Ok(TypeFilter::Char),
            "p" => Ok(TypeFilter::Fifo),
            "s" => Ok(TypeFilter::Socket),
            other => Err(FindError::usage(format!("invalid -type letter: {other}"))),
        }
    }

    pub fn matches(&self, ft: fs::FileType) -> bool {
        #[cfg(unix)]
        use std::os::unix::fs::FileTypeExt;

        match self {
            TypeFilter::File => ft.is_file(),
            TypeFilter::Dir => ft.is_dir(),
            TypeFilter::Symlink => ft.is_symlink(),
            #[cfg(unix)]
            TypeFilter::Block => ft.is_block_device(),
            #[cfg(unix)]
            TypeFilter::Char => ft.is_char_device(),
            #[cfg(unix)]
            TypeFilter::Fifo => ft.is_fifo(),
            #[cfg(unix)]
            TypeFilter::Socket => ft.is_socket(),
            #[cfg(not(unix))]
            _ => false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cmp {
    /// `+N`: strictly greater.
    Greater,
    /// `-N`: strictly less.
    Less,
    /// Bare `N`: exact.
    Exact,
}

fn split_prefix(arg: &str) -> (Cmp, &str) {
    match arg.as_bytes().first() {
        Some(b'+') => (Cmp::Greater, &arg[1..]),
        Some(b'-') => (Cmp::Less, &arg[1..]),
        _ => (Cmp::Exact, arg),
    }
}

/// `-size [+-]N[cwbkKMG]`. The file size is rounded up to whole units
/// before comparing, matching the traditional find behavior (so `-size
/// -1M` matches only empty files).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SizeFilter {
    cmp: Cmp,
    n: u64,
    unit: u64,
}

impl SizeFilter {
    pub fn parse(arg: &str) -> Result<Self, FindError> {
        let (cmp, rest) = split_prefix(arg);
        if rest.is_empty() {
            return Err(FindError::usage(format!("invalid -size argument: {arg}")));
        }
        // Exact suffix table: c=1, w=2, b=512, k/K=1024, M=2^20, G=2^30;
        // no suffix means 512-byte blocks.
        let (digits, unit) = match rest.as_bytes()[rest.len() - 1] {
            b'c' => (&rest[..rest.len() - 1], 1),
            b'w' => (&rest[..rest.len() - 1], 2),
            b'b' => (&rest[..rest.len() - 1], 512),
            b'k' | b'K' => (&rest[..rest.len() - 1], 1024),
            b'M' => (&rest[..rest.len() - 1], 1_048_576),
            b'G' => (&rest[..rest.len() - 1], 1_073_741_824),
            b'0'..=b'9' => (rest, 512),
            _ => return Err(FindError::usage(format!("invalid -size suffix: {arg}"))),
        };
        let n = digits
            .parse::<u64>()
            .map_err(|_| FindError::usage(format!("invalid -size argument: {arg}")))?;
        Ok(SizeFilter { cmp, n, unit })
    }

    pub fn matches(&self, size_bytes: u64) -> bool {
        let units = size_bytes.div_ceil(self.unit);
        match self.cmp {
            Cmp::Greater => units > self.n,
            Cmp::Less => units < self.n,
            Cmp::Exact => units == self.n,
        }
    }
}

/// Which stat timestamp a time filter reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeField {
    Modified,
    Accessed,
    Changed,
}

/// `-mtime/-atime/-ctime [+-]N` over whole days:
/// `age_days = floor((now - file_time) / 86400)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeFilter {
    pub field: TimeField,
    cmp: Cmp,
    n: i64,
}

impl TimeFilter {
    pub fn parse(field: TimeField, arg: &str) -> Result<Self, FindError> {
        let (cmp, rest) = split_prefix(arg);
        let n = rest
            .parse::<i64>()
            .map_err(|_| FindError::usage(format!("invalid time argument: {arg}")))?;
        Ok(TimeFilter { field, cmp, n })
    }

    pub fn matches(&self, now_epoch: i64, file_time_epoch: i64) -> bool {
        let age_days = (now_epoch - file_time_epoch).div_euclid(86400);
        match self.cmp {
            Cmp::Greater => age_days > self.n,
            Cmp::Less => age_days < self.n,
            Cmp::Exact => age_days == self.n,
        }
    }
}

/// `-empty`: a zero-length file or a directory with no entries.
pub fn is_empty(path: &Path, ft: fs::FileType, size: u64) -> bool {
    if ft.is_file() {
        size == 0
    } else if ft.is_dir() {
        match fs::read_dir(path) {
            Ok(mut entries) => entries.next().is_none(),
            Err(_) => false,
        }
    } else {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_type_letters() {
        assert_eq!(TypeFilter::parse("f").unwrap(), TypeFilter::File);
        assert_eq!(TypeFilter::parse("d").unwrap(), TypeFilter::Dir);
        assert_eq!(TypeFilter::parse("l").unwrap(), TypeFilter::Symlink);
        assert_eq!(TypeFilter::parse("b").unwrap(), TypeFilter::Block);
        assert_eq!(TypeFilter::parse("c").unwrap(), TypeFilter::Char);
        assert_eq!(TypeFilter::parse("p").unwrap(), TypeFilter::Fifo);
        assert_eq!(TypeFilter::parse("s").unwrap(), TypeFilter::Socket);
        assert!(TypeFilter::parse("x").is_err());
        assert!(TypeFilter::parse("ff").is_err());
    }

    #[test]
    fn test_size_suffix_table() {
        assert_eq!(SizeFilter::parse("1c").unwrap().unit, 1);
        assert_eq!(SizeFilter::parse("1w").unwrap().unit, 2);
        assert_eq!(SizeFilter::parse("1b").unwrap().unit, 512);
        assert_eq!(SizeFilter::parse("1k").unwrap().unit, 1024);
        assert_eq!(SizeFilter::parse("1K").unwrap().unit, 1024);
        assert_eq!(SizeFilter::parse("1M").unwrap().unit, 1_048_576);
        assert_eq!(SizeFilter::parse("1G").unwrap().unit, 1_073_741_824);
        assert_eq!(SizeFilter::parse("3").unwrap().unit, 512);
        assert!(SizeFilter::parse("1z").is_err());
        assert!(SizeFilter::parse("+").is_err());
        assert!(SizeFilter::parse("").is_err());
    }

    #[test]
    fn test_size_plus_one_meg() {
        // Scenario 8: +1M over six sizes matches exactly one file.
        let f = SizeFilter::parse("+1M").unwrap();
        let sizes = [0u64, 100, 1024, 10 * 1024, 100 * 1024, 1_048_577];
        let n = sizes.iter().filter(|&&s| f.matches(s)).count();
        assert_eq!(n, 1);
        assert!(f.matches(1_048_577));
    }

    #[test]
    fn test_size_rounding() {
        // Sizes round up to whole units, so -1M matches only empty files.
        let f = SizeFilter::parse("-1M").unwrap();
        assert!(f.matches(0));
        assert!(!f.matches(1));
        // Bare N is exact in rounded units.
        let f = SizeFilter::parse("1k").unwrap();
        assert!(f.matches(1));
        assert!(f.matches(1024));
        assert!(!f.matches(1025));
        assert!(!f.matches(0));
    }

    #[test]
    fn test_time_ages() {
        let now = 1_000_000_000i64;
        let day = 86_400i64;

        let exact = TimeFilter::parse(TimeField::Modified, "3").unwrap();
        assert!(exact.matches(now, now - 3 * day));
        assert!(exact.matches(now, now - 3 * day - day + 1));
        assert!(!exact.matches(now, now - 4 * day));
        assert!(!exact.matches(now, now));

        let older = TimeFilter::parse(TimeField::Modified, "+7").unwrap();
        assert!(older.matches(now, now - 8 * day));
        assert!(!older.matches(now, now - 7 * day));

        let newer = TimeFilter::parse(TimeField::Accessed, "-2").unwrap();
        assert!(newer.matches(now, now - day));
        assert!(!newer.matches(now, now - 2 * day));
    }

    #[test]
    fn test_time_future_mtime() {
        // A file stamped in the future has a negative age; floor division
        // keeps `-N` comparisons sane.
        let now = 1_000_000_000i64;
        let f = TimeFilter::parse(TimeField::Modified, "-1").unwrap();
        assert!(f.matches(now, now + 100));
        let f = TimeFilter::parse(TimeField::Modified, "0").unwrap();
        assert!(f.matches(now, now - 100));
    }

    #[test]
    fn test_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let sub = dir.path().join("sub");
        fs::create_dir(&sub).unwrap();
        let file = dir.path().join("f");
        fs::write(&file, b"").unwrap();
        let full = dir.path().join("g");
        fs::write(&full, b"data").unwrap();

        let ft = |p: &Path| fs::symlink_metadata(p).unwrap().file_type();
        assert!(is_empty(&sub, ft(&sub), 0));
        assert!(is_empty(&file, ft(&file), 0));
        assert!(!is_empty(&full, ft(&full), 4));
        assert!(!is_empty(dir.path(), ft(dir.path()), 0));
    }
}
