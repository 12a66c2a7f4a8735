// Host-side GPU buffer layout.
//
// A batch of paths is flattened into three arrays (concatenated name bytes,
// per-path offsets, per-path lengths) plus a fixed 32-byte config struct.
// Both drivers bind these at the same slots so the host packing code is
// shared. All structs are repr(C) and size-asserted; the shader structs
// mirror them field for field.

use std::mem;

use bytemuck::{Pod, Zeroable};

use crate::pattern::{MatchOptions, MAX_PATH_LEN, MAX_PATTERN_LEN};

/// Maximum paths per dispatch.
pub const MAX_BATCH_PATHS: usize = 65_536;

/// Maximum packed name bytes per dispatch (64 MiB).
pub const MAX_BATCH_BYTES: usize = 64 * 1024 * 1024;

/// Threads per workgroup in both kernels.
pub const WORKGROUP_SIZE: u32 = 256;

/// Dispatch config, bound at slot 0. 32 bytes, std140-compatible.
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct MatchConfig {
    pub num_names: u32,
    pub pattern_len: u32,
    pub flags: u32,
    pub max_name_len: u32,
    pub names_offset: u32,
    pub lengths_offset: u32,
    pub _pad0: u32,
    pub _pad1: u32,
}

const _: () = assert!(mem::size_of::<MatchConfig>() == 32);

/// Per-path result slot. The kernel writes one for every input index, so
/// output positions are deterministic and the host never guesses at
/// compaction.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Pod, Zeroable)]
pub struct MatchResult {
    pub name_idx: u32,
    pub matched: u32,
}

const _: () = assert!(mem::size_of::<MatchResult>() == 8);

/// Errors raised while packing a batch.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum PackError {
    #[error("pattern exceeds {MAX_PATTERN_LEN} bytes")]
    PatternTooLong,
    #[error("path exceeds {MAX_PATH_LEN} bytes")]
    PathTooLong,
    #[error("batch exceeds {MAX_BATCH_PATHS} paths")]
    TooManyPaths,
    #[error("batch exceeds {MAX_BATCH_BYTES} packed bytes")]
    TooManyBytes,
}

/// A batch of paths flattened for GPU consumption.
///
/// Invariant: `offsets[i] + lengths[i] <= names_data.len()` for every `i`.
/// Paths are opaque byte strings; nothing is assumed about their content.
#[derive(Debug, Clone)]
pub struct PackedBatch {
    pub names_data: Vec<u8>,
    pub offsets: Vec<u32>,
    pub lengths: Vec<u32>,
    pub max_name_len: u32,
}

impl PackedBatch {
    /// Flatten `paths` into the three-array GPU representation.
    pub fn pack<P: AsRef<[u8]>>(paths: &[P]) -> Result<Self, PackError> {
        if paths.len() > MAX_BATCH_PATHS {
            return Err(PackError::TooManyPaths);
        }

        let total: usize = paths.iter().map(|p| p.as_ref().len()).sum();
        if total > MAX_BATCH_BYTES {
            return Err(PackError::TooManyBytes);
        }

        let mut names_data = Vec::with_capacity(total);
        let mut offsets = Vec::with_capacity(paths.len());
        let mut lengths = Vec::with_capacity(paths.len());
        let mut max_name_len = 0u32;

        for p in paths {
            let p = p.as_ref();
            if p.len() > MAX_PATH_LEN {
                return Err(PackError::PathTooLong);
            }
            offsets.push(names_data.len() as u32);
            lengths.push(p.len() as u32);
            max_name_len = max_name_len.max(p.len() as u32);
            names_data.extend_from_slice(p);
        }

        Ok(Self {
            names_data,
            offsets,
            lengths,
            max_name_len,
        })
    }

    pub fn num_names(&self) -> usize {
        self.offsets.len()
    }

    /// Build the slot-0 config for a glob dispatch over this batch.
    pub fn glob_config(&self, pattern: &[u8], options: MatchOptions) -> Result<MatchConfig, PackError> {
        if pattern.len() > MAX_PATTERN_LEN {
            return Err(PackError::PatternTooLong);
        }
        Ok(MatchConfig {
            num_names: self.num_names() as u32,
            pattern_len: pattern.len() as u32,
            flags: options.bits(),
            max_name_len: self.max_name_len,
            names_offset: 0,
            lengths_offset: 0,
            _pad0: 0,
            _pad1: 0,
        })
    }

    /// Build the slot-0 config for a regex dispatch over this batch.
    /// `pattern_len` carries the state count for regex programs.
    pub fn regex_config(&self, num_states: u32) -> MatchConfig {
        MatchConfig {
            num_names: self.num_names() as u32,
            pattern_len: num_states,
            flags: 0,
            max_name_len: self.max_name_len,
            names_offset: 0,
            lengths_offset: 0,
            _pad0: 0,
            _pad1: 0,
        }
    }

    /// Name bytes padded out to a whole number of u32 words so kernels that
    /// read bytes through word indexing never touch the buffer tail.
    pub fn names_words(&self) -> Vec<u8> {
        pad_to_words(&self.names_data)
    }
}

/// Pad a byte buffer to a non-empty multiple of four bytes.
pub fn pad_to_words(data: &[u8]) -> Vec<u8> {
    let mut padded = data.to_vec();
    let target = ((padded.len() + 3) & !3).max(4);
    padded.resize(target, 0);
    padded
}

/// Number of workgroups for `n` items: the grid is padded up and every
/// thread bounds-checks against `num_names`.
pub fn workgroups_for(n: usize) -> u32 {
    ((n as u32) + WORKGROUP_SIZE - 1) / WORKGROUP_SIZE
}

/// Defensively truncate raw result records to the input size and compact
/// them into a per-path boolean vector. A rogue kernel cannot push results
/// out of range.
pub fn compact_results(raw: &[MatchResult], num_names: usize) -> Vec<bool> {
    let mut verdicts = vec![false; num_names];
    for r in raw.iter().take(num_names) {
        if (r.name_idx as usize) < num_names {
            verdicts[r.name_idx as usize] = r.matched != 0;
        }
    }
    verdicts
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_struct_sizes() {
        assert_eq!(mem::size_of::<MatchConfig>(), 32);
        assert_eq!(mem::size_of::<MatchResult>(), 8);
    }

    #[test]
    fn test_pack_invariants() {
        let paths: [&[u8]; 3] = [b"a.txt", b"", b"dir/b.rs"];
        let batch = PackedBatch::pack(&paths).unwrap();
        assert_eq!(batch.num_names(), 3);
        assert_eq!(batch.names_data.len(), 13);
        for i in 0..3 {
            let off = batch.offsets[i] as usize;
            let len = batch.lengths[i] as usize;
            assert!(off + len <= batch.names_data.len());
            assert_eq!(&batch.names_data[off..off + len], paths[i]);
        }
        assert_eq!(batch.max_name_len, 8);
    }

    #[test]
    fn test_pack_limits() {
        let long = vec![b'x'; MAX_PATH_LEN + 1];
        assert_eq!(
            PackedBatch::pack(&[long.as_slice()]).unwrap_err(),
            PackError::PathTooLong
        );

        let batch = PackedBatch::pack(&[b"ok".as_slice()]).unwrap();
        let long_pattern = vec![b'*'; MAX_PATTERN_LEN + 1];
        assert_eq!(
            batch
                .glob_config(&long_pattern, crate::pattern::MatchOptions::new())
                .unwrap_err(),
            PackError::PatternTooLong
        );
    }

    #[test]
    fn test_pad_to_words() {
        assert_eq!(pad_to_words(b"").len(), 4);
        assert_eq!(pad_to_words(b"abc").len(), 4);
        assert_eq!(pad_to_words(b"abcd").len(), 4);
        assert_eq!(pad_to_words(b"abcde").len(), 8);
        assert_eq!(&pad_to_words(b"ab")[..2], b"ab");
    }

    #[test]
    fn test_workgroups_for() {
        assert_eq!(workgroups_for(0), 0);
        assert_eq!(workgroups_for(1), 1);
        assert_eq!(workgroups_for(256), 1);
        assert_eq!(workgroups_for(257), 2);
        assert_eq!(workgroups_for(65_536), 256);
    }

    #[test]
    fn test_compact_results_defensive() {
        let raw = [
            MatchResult { name_idx: 0, matched: 1 },
            MatchResult { name_idx: 1, matched: 0 },
            MatchResult { name_idx: 9, matched: 1 }, // out of range, dropped
        ];
        let v = compact_results(&raw, 3);
        assert_eq!(v, vec![true, false, false]);
        // Truncation: extra records past num_names are ignored.
        let v = compact_results(&raw, 2);
        assert_eq!(v, vec![true, false]);
    }

    #[test]
    fn test_glob_config() {
        let batch = PackedBatch::pack(&[b"abc".as_slice()]).unwrap();
        let opts = crate::pattern::MatchOptions::new().case_insensitive(true);
        let cfg = batch.glob_config(b"*.c", opts).unwrap();
        assert_eq!(cfg.num_names, 1);
        assert_eq!(cfg.pattern_len, 3);
        assert_eq!(cfg.flags, 1);
        assert_eq!(cfg.max_name_len, 3);
    }
}
