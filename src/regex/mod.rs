// Regex engine: a Thompson-NFA compiler emitting a compact, GPU-executable
// byte-code, plus the CPU reference executor the kernels are ports of.
//
// Supported syntax: literals, `.`, `[...]`, `^`, `$`, `\b`, `\B`, `(...)`,
// `|`, `*`, `+`, `?`, and backslash escapes of metacharacters.

mod compile;
mod exec;
mod parse;

pub use compile::{CompiledRegex, RegexHeader, StateRecord};

use thiserror::Error;

/// Maximum number of NFA states a pattern may compile to.
pub const MAX_STATES: usize = 256;

/// Maximum number of capture groups.
pub const MAX_GROUPS: usize = 255;

// State record types. One byte each in the packed table.
pub const STATE_LITERAL: u8 = 0;
pub const STATE_CHAR_CLASS: u8 = 1;
pub const STATE_DOT: u8 = 2;
pub const STATE_SPLIT: u8 = 3;
pub const STATE_MATCH: u8 = 4;
pub const STATE_GROUP_START: u8 = 5;
pub const STATE_GROUP_END: u8 = 6;
pub const STATE_WORD_BOUNDARY: u8 = 7;
pub const STATE_NOT_WORD_BOUNDARY: u8 = 8;
pub const STATE_LINE_START: u8 = 9;
pub const STATE_LINE_END: u8 = 10;
pub const STATE_ANY: u8 = 11;

/// State flag: invert the character-class membership test.
pub const STATE_FLAG_NEGATED: u8 = 1 << 0;

// Header flags.
pub const REGEX_ANCHORED_START: u32 = 1 << 0;
pub const REGEX_ANCHORED_END: u32 = 1 << 1;
pub const REGEX_CASE_INSENSITIVE: u32 = 1 << 2;

/// Errors produced while parsing or compiling a pattern.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegexError {
    #[error("unexpected end of pattern")]
    UnexpectedEnd,
    #[error("unmatched parenthesis")]
    UnmatchedParen,
    #[error("unterminated character class")]
    UnterminatedClass,
    #[error("quantifier without target at byte {0}")]
    DanglingQuantifier(usize),
    #[error("unsupported escape '\\{0}'")]
    BadEscape(char),
    #[error("pattern needs more than {MAX_STATES} states")]
    TooManyStates,
    #[error("pattern has more than {MAX_GROUPS} groups")]
    TooManyGroups,
}

/// Byte-class used by `\b` / `\B`: `[A-Za-z0-9_]`.
#[inline]
pub(crate) fn is_word_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_'
}
