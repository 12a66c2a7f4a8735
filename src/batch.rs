// Batch orchestrator.
//
// Collects walker output into batches of at most 64 Ki paths / 64 MiB
// packed bytes, runs each batch on the selected backend, and stitches the
// per-batch vectors back into input order. A failed GPU dispatch retries
// the same batch on the CPU path; no partial results are ever emitted, no
// path is counted twice.

use tracing::{debug, warn};

use crate::error::FindError;
use crate::gpu::layout::{PackedBatch, MAX_BATCH_BYTES, MAX_BATCH_PATHS};
use crate::gpu::select::{select_backend, AvailableBackends, BackendMode, SMALL_WORKLOAD};
use crate::gpu::vulkan::VulkanDriver;
use crate::gpu::{Backend, CapabilityTier, GpuError, MatchVector};
use crate::pattern::{self, glob, MatchOptions, PatternComplexity, MAX_PATTERN_LEN};
use crate::regex::{CompiledRegex, RegexError};

#[cfg(target_os = "macos")]
use crate::gpu::metal::MetalDriver;

/// A query pattern, compiled once and matched against every candidate.
#[derive(Debug, Clone)]
pub enum CompiledPattern {
    Glob {
        /// Pattern as given; this is what the kernels receive.
        pattern: Vec<u8>,
        /// Pre-folded copy used by the SIMD CPU path when folding case.
        folded: Vec<u8>,
        options: MatchOptions,
    },
    Regex(CompiledRegex),
}

impl CompiledPattern {
    pub fn glob(pattern: &[u8], options: MatchOptions) -> Result<Self, FindError> {
        if pattern.len() > MAX_PATTERN_LEN {
            return Err(FindError::PatternTooLong);
        }
        let mut folded = pattern.to_vec();
        if options.case_insensitive {
            pattern::simd::fold_ascii_lower(&mut folded);
        }
        Ok(CompiledPattern::Glob {
            pattern: pattern.to_vec(),
            folded,
            options,
        })
    }

    pub fn regex(pattern: &[u8], case_insensitive: bool) -> Result<Self, FindError> {
        CompiledRegex::compile(pattern, case_insensitive)
            .map(CompiledPattern::Regex)
            .map_err(|e| match e {
                RegexError::TooManyStates => FindError::usage(e.to_string()),
                other => FindError::InvalidRegex(other),
            })
    }

    /// Cost signals for the backend selector. Regex programs report their
    /// class count directly and treat every SPLIT as wildcard-like work.
    pub fn complexity(&self) -> PatternComplexity {
        match self {
            CompiledPattern::Glob { pattern, .. } => pattern::probe_complexity(pattern),
            CompiledPattern::Regex(re) => PatternComplexity {
                wildcards: re
                    .states
                    .iter()
                    .filter(|s| s.ty == crate::regex::STATE_SPLIT)
                    .count(),
                classes: re.bitmaps.len() / 8,
            },
        }
    }

    /// CPU verdict for one path.
    fn matches_cpu(&self, path: &[u8], simd: bool) -> bool {
        match self {
            CompiledPattern::Glob {
                pattern,
                folded,
                options,
            } => {
                if simd {
                    glob::matches_simd(folded, path, *options)
                } else {
                    glob::matches(pattern, path, *options)
                }
            }
            CompiledPattern::Regex(re) => re.matches_full(path),
        }
    }
}

/// Lifecycle of one dispatch. Transitions are strictly linear; a failure at
/// any stage aborts the dispatch and the batch reruns on the CPU.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchState {
    Building,
    Packed,
    Encoded,
    Submitted,
    Complete,
    Readback,
    Done,
}

impl DispatchState {
    pub fn next(self) -> DispatchState {
        match self {
            DispatchState::Building => DispatchState::Packed,
            DispatchState::Packed => DispatchState::Encoded,
            DispatchState::Encoded => DispatchState::Submitted,
            DispatchState::Submitted => DispatchState::Complete,
            DispatchState::Complete => DispatchState::Readback,
            DispatchState::Readback | DispatchState::Done => DispatchState::Done,
        }
    }
}

/// Drives batches through the selected backend.
pub struct Orchestrator {
    backend: Backend,
    #[cfg(target_os = "macos")]
    metal: Option<MetalDriver>,
    vulkan: Option<VulkanDriver>,
    device_name: Option<String>,
    max_batch_paths: usize,
    max_batch_bytes: usize,
}

impl Orchestrator {
    /// Select a backend for the workload and initialize its driver.
    ///
    /// Under auto-selection a GPU that fails to initialize degrades to the
    /// SIMD path; a forced backend that fails is an error.
    pub fn new(
        mode: BackendMode,
        num_paths: usize,
        complexity: PatternComplexity,
    ) -> Result<Self, FindError> {
        // Optimistic availability: Metal exists only on macOS builds, a
        // Vulkan adapter may exist anywhere. Drivers are probed only when
        // the tentative choice actually needs them.
        let assumed = AvailableBackends {
            metal: cfg!(target_os = "macos"),
            vulkan: true,
        };
        let tentative = select_backend(mode, num_paths, complexity, assumed).ok_or_else(|| {
            FindError::BackendUnavailable("requested backend is not supported here".into())
        })?;

        let mut orch = Orchestrator {
            backend: tentative,
            #[cfg(target_os = "macos")]
            metal: None,
            vulkan: None,
            device_name: None,
            max_batch_paths: MAX_BATCH_PATHS,
            max_batch_bytes: MAX_BATCH_BYTES,
        };

        if tentative.is_gpu() {
            match orch.init_gpu(tentative) {
                Ok(tier) => {
                    // A standard-tier device needs a fatter workload to beat
                    // the CPU; high-performance (unified memory, wide
                    // workgroups) keeps the low crossover.
                    if mode == BackendMode::Auto
                        && tier == CapabilityTier::Standard
                        && num_paths < SMALL_WORKLOAD * 8
                    {
                        debug!("standard-tier device, small workload, using simd");
                        orch.backend = Backend::Simd;
                    }
                }
                Err(e) if mode == BackendMode::Auto => {
                    // Reported only under -v; the run silently degrades.
                    debug!(error = %e, "gpu init failed, falling back to simd");
                    orch.backend = Backend::Simd;
                }
                Err(e) => return Err(FindError::BackendUnavailable(e.to_string())),
            }
        }

        Ok(orch)
    }

    fn init_gpu(&mut self, backend: Backend) -> Result<CapabilityTier, GpuError> {
        match backend {
            #[cfg(target_os = "macos")]
            Backend::Metal => {
                let driver = MetalDriver::init()?;
                let tier = driver.caps().tier();
                self.device_name = Some(driver.device_name());
                self.metal = Some(driver);
                Ok(tier)
            }
            #[cfg(not(target_os = "macos"))]
            Backend::Metal => Err(GpuError::NoDevice("metal requires macOS".into())),
            Backend::Vulkan => {
                let driver = VulkanDriver::init()?;
                let tier = driver.caps().tier();
                self.device_name = Some(driver.device_name().to_string());
                self.vulkan = Some(driver);
                Ok(tier)
            }
            _ => Ok(CapabilityTier::Standard),
        }
    }

    pub fn backend(&self) -> Backend {
        self.backend
    }

    pub fn device_name(&self) -> Option<&str> {
        self.device_name.as_deref()
    }

    /// Match every path against every pattern. An entry matches when any
    /// pattern does (the `-o` disjunction); `negate` flips the combined
    /// verdict. With no patterns at all, everything matches.
    pub fn match_paths(
        &self,
        paths: &[Vec<u8>],
        patterns: &[CompiledPattern],
        negate: bool,
    ) -> Result<Vec<bool>, FindError> {
        let mut verdicts = vec![patterns.is_empty(); paths.len()];

        for pattern in patterns {
            let mut base = 0;
            for chunk in split_batches(paths, self.max_batch_paths, self.max_batch_bytes) {
                let batch = self.run_batch(chunk, pattern)?;
                for (i, matched) in batch.iter().enumerate() {
                    if *matched {
                        // Batch-local indices translate by the batch base.
                        verdicts[base + i] = true;
                    }
                }
                base += chunk.len();
            }
        }

        if negate {
            for v in &mut verdicts {
                *v = !*v;
            }
        }
        Ok(verdicts)
    }

    /// One batch, one dispatch. GPU errors mid-batch rerun the same chunk on
    /// the CPU path.
    fn run_batch(&self, chunk: &[Vec<u8>], pattern: &CompiledPattern) -> Result<Vec<bool>, FindError> {
        match self.backend {
            Backend::Scalar => Ok(cpu_match(chunk, pattern, false)),
            Backend::Simd => Ok(cpu_match(chunk, pattern, true)),
            gpu => {
                let mut state = DispatchState::Building;
                let packed = match PackedBatch::pack(chunk) {
                    Ok(p) => p,
                    Err(e) => {
                        warn!(error = %e, "batch packing failed, retrying on cpu");
                        return Ok(cpu_match(chunk, pattern, true));
                    }
                };
                state = state.next();
                debug_assert_eq!(state, DispatchState::Packed);

                match self.gpu_dispatch(gpu, &packed, pattern) {
                    Ok(vector) => {
                        // Encode, submit, completion wait and readback all
                        // happened inside the driver call.
                        while state != DispatchState::Done {
                            state = state.next();
                        }
                        debug!(
                            backend = gpu.name(),
                            paths = chunk.len(),
                            matched = vector.matched_count(),
                            gpu_count = vector.gpu_count,
                            "batch complete"
                        );
                        Ok(vector.verdicts)
                    }
                    Err(e) => {
                        warn!(
                            backend = gpu.name(),
                            state = ?state,
                            error = %e,
                            "gpu dispatch failed, retrying batch on cpu"
                        );
                        Ok(cpu_match(chunk, pattern, true))
                    }
                }
            }
        }
    }

    fn gpu_dispatch(
        &self,
        backend: Backend,
        batch: &PackedBatch,
        pattern: &CompiledPattern,
    ) -> Result<MatchVector, GpuError> {
        match backend {
            #[cfg(target_os = "macos")]
            Backend::Metal => {
                let driver = self
                    .metal
                    .as_ref()
                    .ok_or_else(|| GpuError::NoDevice("metal driver not initialized".into()))?;
                match pattern {
                    CompiledPattern::Glob {
                        pattern, options, ..
                    } => driver.match_names(batch, pattern, *options),
                    CompiledPattern::Regex(re) => driver.regex_match_names(batch, re),
                }
            }
            Backend::Vulkan => {
                let driver = self
                    .vulkan
                    .as_ref()
                    .ok_or_else(|| GpuError::NoDevice("vulkan driver not initialized".into()))?;
                match pattern {
                    CompiledPattern::Glob {
                        pattern, options, ..
                    } => driver.match_names(batch, pattern, *options),
                    CompiledPattern::Regex(re) => driver.regex_match_names(batch, re),
                }
            }
            other => Err(GpuError::Dispatch(format!(
                "{} is not a gpu backend",
                other.name()
            ))),
        }
    }

    /// Shrink batch limits; used by tests to exercise multi-batch plumbing
    /// without packing millions of paths.
    #[cfg(test)]
    fn with_batch_limits(mut self, max_paths: usize, max_bytes: usize) -> Self {
        self.max_batch_paths = max_paths;
        self.max_batch_bytes = max_bytes;
        self
    }
}

fn cpu_match(paths: &[Vec<u8>], pattern: &CompiledPattern, simd: bool) -> Vec<bool> {
    paths.iter().map(|p| pattern.matches_cpu(p, simd)).collect()
}

/// Split the path list into sub-slices obeying both batch caps. A single
/// oversized path still forms its own batch; the packer rejects it there.
fn split_batches(paths: &[Vec<u8>], max_paths: usize, max_bytes: usize) -> Vec<&[Vec<u8>]> {
    let mut out = Vec::new();
    let mut start = 0;
    while start < paths.len() {
        let mut end = start;
        let mut bytes = 0usize;
        while end < paths.len() && end - start < max_paths {
            let len = paths[end].len();
            if end > start && bytes + len > max_bytes {
                break;
            }
            bytes += len;
            end += 1;
        }
        out.push(&paths[start..end]);
        start = end;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn paths(list: &[&str]) -> Vec<Vec<u8>> {
        list.iter().map(|s| s.as_bytes().to_vec()).collect()
    }

    fn cpu_orchestrator() -> Orchestrator {
        Orchestrator::new(BackendMode::ForceCpu, 0, PatternComplexity::default()).unwrap()
    }

    #[test]
    fn test_dispatch_state_order() {
        let mut s = DispatchState::Building;
        let expect = [
            DispatchState::Packed,
            DispatchState::Encoded,
            DispatchState::Submitted,
            DispatchState::Complete,
            DispatchState::Readback,
            DispatchState::Done,
        ];
        for e in expect {
            s = s.next();
            assert_eq!(s, e);
        }
        assert_eq!(DispatchState::Done.next(), DispatchState::Done);
    }

    #[test]
    fn test_split_batches_by_count() {
        let p = paths(&["a", "b", "c", "d", "e"]);
        let chunks = split_batches(&p, 2, usize::MAX);
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0].len(), 2);
        assert_eq!(chunks[2].len(), 1);
        let total: usize = chunks.iter().map(|c| c.len()).sum();
        assert_eq!(total, 5);
    }

    #[test]
    fn test_split_batches_by_bytes() {
        let p = paths(&["aaaa", "bbbb", "cc", "d"]);
        let chunks = split_batches(&p, usize::MAX, 6);
        // 4 + 4 > 6, so "aaaa" is alone; "bbbb" + "cc" fits; "d" follows.
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0].len(), 1);
        assert_eq!(chunks[1].len(), 2);
        assert_eq!(chunks[2].len(), 1);
    }

    #[test]
    fn test_match_paths_glob_scenarios() {
        let orch = cpu_orchestrator();
        let pats = vec![CompiledPattern::glob(b"*.txt", MatchOptions::new()).unwrap()];
        let p = paths(&["file.txt", "file.doc", "other.txt"]);
        let v = orch.match_paths(&p, &pats, false).unwrap();
        assert_eq!(v, vec![true, false, true]);
    }

    #[test]
    fn test_match_paths_disjunction() {
        let orch = cpu_orchestrator();
        let pats = vec![
            CompiledPattern::glob(b"*.txt", MatchOptions::new()).unwrap(),
            CompiledPattern::glob(b"*.doc", MatchOptions::new()).unwrap(),
        ];
        let p = paths(&["a.txt", "b.doc", "c.pdf"]);
        let v = orch.match_paths(&p, &pats, false).unwrap();
        assert_eq!(v, vec![true, true, false]);
    }

    #[test]
    fn test_match_paths_negate() {
        let orch = cpu_orchestrator();
        let pats = vec![CompiledPattern::glob(b"*.txt", MatchOptions::new()).unwrap()];
        let p = paths(&["a.txt", "b.doc"]);
        let v = orch.match_paths(&p, &pats, true).unwrap();
        assert_eq!(v, vec![false, true]);
    }

    #[test]
    fn test_match_paths_no_pattern_matches_everything() {
        let orch = cpu_orchestrator();
        let p = paths(&["a", "b"]);
        let v = orch.match_paths(&p, &[], false).unwrap();
        assert_eq!(v, vec![true, true]);
    }

    #[test]
    fn test_batch_base_translation() {
        // Tiny batch caps force multiple batches; verdict indices must line
        // up with the global input order.
        let orch = cpu_orchestrator().with_batch_limits(2, usize::MAX);
        let pats = vec![CompiledPattern::glob(b"m*", MatchOptions::new()).unwrap()];
        let p = paths(&["m1", "x", "m2", "y", "m3"]);
        let v = orch.match_paths(&p, &pats, false).unwrap();
        assert_eq!(v, vec![true, false, true, false, true]);
    }

    #[test]
    fn test_regex_pattern_cpu() {
        let orch = cpu_orchestrator();
        let pats = vec![CompiledPattern::regex(b".*/src/.*\\.c", false).unwrap()];
        let p = paths(&["/p/src/a.c", "/p/src/a.h", "/src/q/b.c", "/q/b.c"]);
        let v = orch.match_paths(&p, &pats, false).unwrap();
        assert_eq!(v.iter().filter(|&&m| m).count(), 3);
    }

    #[test]
    fn test_regex_state_limit_is_usage_error() {
        let long = vec![b'a'; 300];
        match CompiledPattern::regex(&long, false) {
            Err(FindError::Usage(_)) => {}
            other => panic!("expected usage error, got {other:?}"),
        }
        match CompiledPattern::regex(b"(unclosed", false) {
            Err(FindError::InvalidRegex(_)) => {}
            other => panic!("expected invalid regex, got {other:?}"),
        }
    }

    #[test]
    fn test_scalar_and_simd_backends_agree() {
        let scalar = Orchestrator {
            backend: Backend::Scalar,
            #[cfg(target_os = "macos")]
            metal: None,
            vulkan: None,
            device_name: None,
            max_batch_paths: MAX_BATCH_PATHS,
            max_batch_bytes: MAX_BATCH_BYTES,
        };
        let simd = cpu_orchestrator();
        let pats = vec![
            CompiledPattern::glob(b"*.TXT", MatchOptions::new().case_insensitive(true)).unwrap(),
            CompiledPattern::glob(b"*/to/*", MatchOptions::new().match_path(true)).unwrap(),
        ];
        let p = paths(&[
            "/path/to/file.txt",
            "/other/path/FILE.TXT",
            "/path/file.doc",
            "deep/nested/dir/structure/with/a/really/long/component/name.txt",
        ]);
        let a = scalar.match_paths(&p, &pats, false).unwrap();
        let b = simd.match_paths(&p, &pats, false).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_complexity_probe_for_regex() {
        let pat = CompiledPattern::regex(b"(a|b)[0-9]+", false).unwrap();
        let c = pat.complexity();
        assert!(c.wildcards >= 1);
        assert_eq!(c.classes, 1);
    }
}
