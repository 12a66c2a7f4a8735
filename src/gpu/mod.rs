// GPU dispatch layer.
//
// Each backend is an owned driver object: `init()` probes the device and
// builds the compute pipelines once, `match_names` / `regex_match_names`
// run one dispatch each over a packed batch, and dropping the driver
// releases everything. No process-wide GPU state survives a dispatch.

pub mod layout;
pub mod select;
pub mod vulkan;

#[cfg(target_os = "macos")]
pub mod metal;

use thiserror::Error;

/// Execution backend for a match run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    Scalar,
    Simd,
    Metal,
    Vulkan,
}

impl Backend {
    pub fn name(&self) -> &'static str {
        match self {
            Backend::Scalar => "scalar",
            Backend::Simd => "simd",
            Backend::Metal => "metal",
            Backend::Vulkan => "vulkan",
        }
    }

    pub fn is_gpu(&self) -> bool {
        matches!(self, Backend::Metal | Backend::Vulkan)
    }
}

/// Driver failures. Initialization failures degrade to the CPU path under
/// auto-selection; dispatch failures retry the batch on the CPU.
#[derive(Debug, Error)]
pub enum GpuError {
    #[error("no compatible device: {0}")]
    NoDevice(String),
    #[error("shader compilation failed: {0}")]
    ShaderCompile(String),
    #[error("pipeline creation failed: {0}")]
    Pipeline(String),
    #[error("dispatch failed: {0}")]
    Dispatch(String),
    #[error("result readback failed: {0}")]
    Readback(String),
}

/// Device limits recorded at driver init.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceCaps {
    /// Maximum threads per workgroup.
    pub max_threads_per_group: u32,
    /// Maximum size of a single buffer, in bytes.
    pub max_buffer_len: u64,
    /// Device-local memory (sum of device-local heaps), 0 when the API does
    /// not expose it.
    pub device_memory: u64,
    /// Whether host and device share one memory pool.
    pub unified_memory: bool,
}

/// Coarse device classification fed into the backend selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum CapabilityTier {
    Standard,
    HighPerformance,
}

impl DeviceCaps {
    /// Apple-Silicon-class devices (unified memory, wide workgroups)
    /// classify as high-performance.
    pub fn tier(&self) -> CapabilityTier {
        if self.unified_memory && self.max_threads_per_group >= 1024 {
            CapabilityTier::HighPerformance
        } else {
            CapabilityTier::Standard
        }
    }
}

/// A per-path match vector read back from one dispatch.
#[derive(Debug, Clone)]
pub struct MatchVector {
    /// One verdict per input path, input order.
    pub verdicts: Vec<bool>,
    /// Value of the kernel's atomic counter after completion.
    pub gpu_count: u32,
}

impl MatchVector {
    pub fn matched_count(&self) -> usize {
        self.verdicts.iter().filter(|&&v| v).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tier_classification() {
        let apple = DeviceCaps {
            max_threads_per_group: 1024,
            max_buffer_len: 1 << 32,
            device_memory: 16 << 30,
            unified_memory: true,
        };
        assert_eq!(apple.tier(), CapabilityTier::HighPerformance);

        let discrete = DeviceCaps {
            max_threads_per_group: 1024,
            max_buffer_len: 1 << 31,
            device_memory: 8 << 30,
            unified_memory: false,
        };
        assert_eq!(discrete.tier(), CapabilityTier::Standard);

        let narrow = DeviceCaps {
            max_threads_per_group: 256,
            max_buffer_len: 1 << 28,
            device_memory: 0,
            unified_memory: true,
        };
        assert_eq!(narrow.tier(), CapabilityTier::Standard);
    }

    #[test]
    fn test_backend_names() {
        assert_eq!(Backend::Metal.name(), "metal");
        assert!(Backend::Metal.is_gpu());
        assert!(Backend::Vulkan.is_gpu());
        assert!(!Backend::Simd.is_gpu());
    }
}
