// gpufind: GPU-accelerated file-name search modeled after POSIX find.
//
// The heart of the crate is a pattern runtime implemented four times with
// bit-identical semantics (scalar CPU, SIMD-assisted CPU, a Metal kernel
// and a Vulkan-class kernel) plus a Thompson-NFA regex compiler that emits
// the same byte-code for the CPU executor and both GPU backends. Everything
// else (walker, CLI, filters, output) is conventional plumbing around one
// question: for each path, does it match?

pub mod batch;
pub mod cli;
pub mod error;
pub mod filters;
pub mod gpu;
pub mod output;
pub mod pattern;
pub mod regex;
pub mod walk;

pub use batch::{CompiledPattern, Orchestrator};
pub use error::FindError;
pub use gpu::select::BackendMode;
pub use gpu::Backend;
pub use pattern::MatchOptions;
pub use regex::CompiledRegex;
