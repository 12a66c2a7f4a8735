// Error taxonomy.
//
// Every failure class maps to exit code 1; the distinction matters for what
// gets printed and for how far the run proceeds (usage errors stop before
// the walk, I/O errors during the walk only flip the exit code at the end).

use thiserror::Error;

use crate::gpu::GpuError;
use crate::pattern::{MAX_PATH_LEN, MAX_PATTERN_LEN};
use crate::regex::RegexError;

#[derive(Debug, Error)]
pub enum FindError {
    /// Bad flag, malformed size/time argument, invalid type letter.
    #[error("{0}")]
    Usage(String),

    /// Regex failed to parse or compile. The message is fixed by contract.
    #[error("invalid regex pattern")]
    InvalidRegex(#[source] RegexError),

    #[error("pattern exceeds {MAX_PATTERN_LEN} bytes")]
    PatternTooLong,

    #[error("path exceeds {MAX_PATH_LEN} bytes")]
    PathTooLong,

    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// A forced backend that could not be initialized.
    #[error("backend unavailable: {0}")]
    BackendUnavailable(String),

    #[error(transparent)]
    Gpu(#[from] GpuError),
}

impl FindError {
    pub fn usage(msg: impl Into<String>) -> Self {
        FindError::Usage(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_regex_error_message_is_fixed() {
        let err = FindError::InvalidRegex(RegexError::UnmatchedParen);
        assert_eq!(err.to_string(), "invalid regex pattern");
    }

    #[test]
    fn test_usage_error_passthrough() {
        let err = FindError::usage("unknown flag: -frobnicate");
        assert_eq!(err.to_string(), "unknown flag: -frobnicate");
    }
}
