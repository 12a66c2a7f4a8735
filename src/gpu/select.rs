// Backend auto-selection.
//
// Small workloads never reach the GPU: fixed dispatch overhead (pipeline
// binding, buffer upload, fence wait) dwarfs the matching work below about a
// thousand paths. Above that, the native GPU wins, and pattern complexity
// (character classes, repeated `*`) lowers the crossover because those cost
// the scalar loop far more than they cost the kernel.

use tracing::debug;

use super::Backend;
use crate::pattern::PatternComplexity;

/// Path count below which the CPU always wins for a plain pattern.
pub const SMALL_WORKLOAD: usize = 1024;

/// Backend choice requested on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BackendMode {
    /// Score the workload and pick.
    #[default]
    Auto,
    /// Prefer the native GPU, whichever is available.
    ForceGpu,
    /// SIMD CPU, never touch a GPU.
    ForceCpu,
    ForceMetal,
    ForceVulkan,
}

/// Which GPU drivers probed as usable.
#[derive(Debug, Clone, Copy, Default)]
pub struct AvailableBackends {
    pub metal: bool,
    pub vulkan: bool,
}

impl AvailableBackends {
    fn native_gpu(&self) -> Option<Backend> {
        // Metal is the native API on Apple hardware; Vulkan everywhere else.
        if self.metal {
            Some(Backend::Metal)
        } else if self.vulkan {
            Some(Backend::Vulkan)
        } else {
            None
        }
    }
}

/// Workload-scaled path count: classes and extra wildcards multiply the
/// effective size, pulling the GPU crossover down for expensive patterns.
fn effective_workload(num_paths: usize, complexity: PatternComplexity) -> usize {
    let mut scale = 1 + complexity.classes;
    if complexity.wildcards >= 2 {
        scale += complexity.wildcards - 1;
    }
    num_paths.saturating_mul(scale)
}

/// Pick a backend for a workload. Forced modes bypass scoring entirely and
/// report `None` when their driver is missing; the caller decides whether
/// that is fatal.
pub fn select_backend(
    mode: BackendMode,
    num_paths: usize,
    complexity: PatternComplexity,
    available: AvailableBackends,
) -> Option<Backend> {
    let choice = match mode {
        BackendMode::ForceCpu => Some(Backend::Simd),
        BackendMode::ForceMetal => available.metal.then_some(Backend::Metal),
        BackendMode::ForceVulkan => available.vulkan.then_some(Backend::Vulkan),
        BackendMode::ForceGpu => available.native_gpu(),
        BackendMode::Auto => {
            if effective_workload(num_paths, complexity) < SMALL_WORKLOAD {
                Some(Backend::Simd)
            } else {
                Some(available.native_gpu().unwrap_or(Backend::Simd))
            }
        }
    };
    debug!(
        ?mode,
        num_paths,
        wildcards = complexity.wildcards,
        classes = complexity.classes,
        backend = choice.map(|b| b.name()),
        "backend selected"
    );
    choice
}
