// Metal backend.
//
// One thread per path, workgroup of 256, shared-mode buffers on unified
// memory. The MSL kernels below are the Metal rendition of the shared
// matcher semantics; the scalar CPU implementation is the reference.
//
// The shader library is compiled from source at init and both pipelines are
// cached on the driver. Dispatches allocate fresh buffers and release them
// on return.

use metal::*;
use tracing::debug;

use super::layout::{
    compact_results, pad_to_words, workgroups_for, MatchResult, PackedBatch, WORKGROUP_SIZE,
};
use super::{DeviceCaps, GpuError, MatchVector};
use crate::pattern::MatchOptions;
use crate::regex::CompiledRegex;

const MATCH_SHADER: &str = r#"
#include <metal_stdlib>
using namespace metal;

// ============================================================================
// Shared structures (must match the Rust repr(C) definitions)
// ============================================================================

struct MatchConfig {
    uint num_names;
    uint pattern_len;
    uint flags;
    uint max_name_len;
    uint names_offset;
    uint lengths_offset;
    uint _pad0;
    uint _pad1;
};

struct RegexHeader {
    uint num_states;
    uint start_state;
    uint num_groups;
    uint flags;
};

struct MatchResult {
    uint name_idx;
    uint matched;
};

constant uint OPT_CASE_INSENSITIVE = 1u;
constant uint OPT_MATCH_PATH = 2u;
constant uint OPT_PERIOD = 4u;

// ============================================================================
// Glob matcher
// ============================================================================

inline uchar fold_case(uchar c) {
    return (c >= 'A' && c <= 'Z') ? c + 32 : c;
}

inline bool chars_equal(uchar a, uchar b, bool ci) {
    if (a == b) return true;
    return ci && fold_case(a) == fold_case(b);
}

// Character class at pattern[pi]. Returns bytes consumed (0 = unterminated,
// caller treats '[' as a literal); membership lands in *matched with
// negation already applied.
inline uint match_class(device const uchar* pattern, uint pi, uint plen,
                        uchar c, bool ci, thread bool* matched) {
    uint i = pi + 1;
    bool negated = false;
    if (i < plen && (pattern[i] == '!' || pattern[i] == '^')) {
        negated = true;
        i++;
    }
    bool found = false;
    bool first = true;
    for (;;) {
        if (i >= plen) return 0;
        uchar pc = pattern[i];
        if (pc == ']' && !first) {
            i++;
            break;
        }
        first = false;
        if (i + 2 < plen && pattern[i + 1] == '-' && pattern[i + 2] != ']') {
            uchar lo = pc;
            uchar hi = pattern[i + 2];
            uchar b = c;
            if (ci) {
                lo = fold_case(lo);
                hi = fold_case(hi);
                b = fold_case(b);
            }
            if (b >= lo && b <= hi) found = true;
            i += 3;
        } else {
            if (chars_equal(pc, c, ci)) found = true;
            i++;
        }
    }
    *matched = (found != negated);
    return i - pi;
}

// Two-cursor backtracking matcher with a single '*' checkpoint; identical
// to the scalar CPU reference.
inline bool glob_match(device const uchar* pattern, uint plen,
                       device const uchar* text, uint tlen, uint flags) {
    bool ci = (flags & OPT_CASE_INSENSITIVE) != 0;
    if ((flags & OPT_PERIOD) != 0 && tlen > 0 && text[0] == '.') {
        if (plen == 0 || pattern[0] != '.') return false;
    }
    uint pi = 0;
    uint ni = 0;
    uint star_pi = 0xFFFFFFFFu;
    uint star_ni = 0;
    while (ni < tlen) {
        if (pi < plen) {
            uchar pc = pattern[pi];
            if (pc == '*') {
                star_pi = pi;
                star_ni = ni;
                pi++;
                continue;
            } else if (pc == '?') {
                pi++;
                ni++;
                continue;
            } else if (pc == '[') {
                bool member = false;
                uint consumed = match_class(pattern, pi, plen, text[ni], ci, &member);
                if (consumed != 0) {
                    if (member) {
                        pi += consumed;
                        ni++;
                        continue;
                    }
                    // Valid class, not a member: backtrack below.
                } else if (chars_equal('[', text[ni], ci)) {
                    pi++;
                    ni++;
                    continue;
                }
            } else if (chars_equal(pc, text[ni], ci)) {
                pi++;
                ni++;
                continue;
            }
        }
        if (star_pi != 0xFFFFFFFFu) {
            pi = star_pi + 1;
            star_ni++;
            ni = star_ni;
            continue;
        }
        return false;
    }
    while (pi < plen && pattern[pi] == '*') pi++;
    return pi == plen;
}

kernel void match_names(
    constant MatchConfig& config [[buffer(0)]],
    device const uchar* pattern [[buffer(1)]],
    device const uchar* names [[buffer(2)]],
    device const uint* offsets [[buffer(3)]],
    device const uint* lengths [[buffer(4)]],
    device MatchResult* results [[buffer(5)]],
    device atomic_uint& match_count [[buffer(6)]],
    uint gid [[thread_position_in_grid]]
) {
    if (gid >= config.num_names) return;

    uint off = offsets[gid];
    uint len = lengths[gid];
    device const uchar* name = names + off;

    uint start = 0;
    if ((config.flags & OPT_MATCH_PATH) == 0) {
        for (uint i = len; i > 0; i--) {
            if (name[i - 1] == '/') {
                start = i;
                break;
            }
        }
    }

    bool ok = glob_match(pattern, config.pattern_len, name + start, len - start, config.flags);
    results[gid].name_idx = gid;
    results[gid].matched = ok ? 1u : 0u;
    if (ok) {
        atomic_fetch_add_explicit(&match_count, 1u, memory_order_relaxed);
    }
}

// ============================================================================
// Thompson-NFA regex matcher
// ============================================================================

constant uint STATE_LITERAL = 0u;
constant uint STATE_CHAR_CLASS = 1u;
constant uint STATE_DOT = 2u;
constant uint STATE_SPLIT = 3u;
constant uint STATE_MATCH = 4u;
constant uint STATE_GROUP_START = 5u;
constant uint STATE_GROUP_END = 6u;
constant uint STATE_WORD_BOUNDARY = 7u;
constant uint STATE_NOT_WORD_BOUNDARY = 8u;
constant uint STATE_LINE_START = 9u;
constant uint STATE_LINE_END = 10u;
constant uint STATE_ANY = 11u;

constant uint FLAG_NEGATED = 1u;
constant uint REGEX_CASE_INSENSITIVE = 4u;

// State records are three little-endian u32 words:
//   word0 = type | flags << 8 | out << 16
//   word1 = out2 | literal << 16 | group_idx << 24
//   word2 = bitmap_offset
inline uint state_type(device const uint* t, uint i) { return t[i * 3] & 0xFFu; }
inline uint state_flags(device const uint* t, uint i) { return (t[i * 3] >> 8) & 0xFFu; }
inline uint state_out(device const uint* t, uint i) { return (t[i * 3] >> 16) & 0xFFFFu; }
inline uint state_out2(device const uint* t, uint i) { return t[i * 3 + 1] & 0xFFFFu; }
inline uint state_literal(device const uint* t, uint i) { return (t[i * 3 + 1] >> 16) & 0xFFu; }
inline uint state_bitmap_offset(device const uint* t, uint i) { return t[i * 3 + 2]; }

inline bool set_contains(thread const uint* set, uint i) {
    return (set[i >> 5] >> (i & 31u)) & 1u;
}

inline bool set_insert(thread uint* set, uint i) {
    uint w = i >> 5;
    uint mask = 1u << (i & 31u);
    bool fresh = (set[w] & mask) == 0u;
    set[w] |= mask;
    return fresh;
}

inline bool is_word_byte(uchar b) {
    return (b >= '0' && b <= '9') || (b >= 'A' && b <= 'Z')
        || (b >= 'a' && b <= 'z') || b == '_';
}

inline bool at_word_boundary(device const uchar* text, uint tlen, uint pos) {
    bool left = pos > 0 && is_word_byte(text[pos - 1]);
    bool right = pos < tlen && is_word_byte(text[pos]);
    return left != right;
}

// Epsilon closure via a bounded worklist; each state is pushed at most once
// per position (guarded by its set bit), so depth never exceeds num_states.
inline void nfa_closure(device const uint* table, uint num_states,
                        device const uchar* text, uint tlen, uint pos,
                        thread uint* set) {
    ushort stack[256];
    uint top = 0;
    for (uint i = 0; i < num_states; i++) {
        if (set_contains(set, i)) {
            stack[top++] = ushort(i);
        }
    }
    while (top > 0) {
        uint s = stack[--top];
        uint ty = state_type(table, s);
        if (ty == STATE_SPLIT) {
            uint o = state_out(table, s);
            if (set_insert(set, o)) stack[top++] = ushort(o);
            uint o2 = state_out2(table, s);
            if (set_insert(set, o2)) stack[top++] = ushort(o2);
            continue;
        }
        uint target = 0xFFFFFFFFu;
        if (ty == STATE_GROUP_START || ty == STATE_GROUP_END) {
            target = state_out(table, s);
        } else if (ty == STATE_WORD_BOUNDARY) {
            if (at_word_boundary(text, tlen, pos)) target = state_out(table, s);
        } else if (ty == STATE_NOT_WORD_BOUNDARY) {
            if (!at_word_boundary(text, tlen, pos)) target = state_out(table, s);
        } else if (ty == STATE_LINE_START) {
            if (pos == 0) target = state_out(table, s);
        } else if (ty == STATE_LINE_END) {
            if (pos == tlen) target = state_out(table, s);
        }
        if (target != 0xFFFFFFFFu && set_insert(set, target)) {
            stack[top++] = ushort(target);
        }
    }
}

// Whole-input match: begin at 0, accept only if MATCH is live at
// end-of-input.
kernel void regex_match_names(
    constant MatchConfig& config [[buffer(0)]],
    device const uint* state_words [[buffer(1)]],
    device const uchar* names [[buffer(2)]],
    device const uint* offsets [[buffer(3)]],
    device const uint* lengths [[buffer(4)]],
    device MatchResult* results [[buffer(5)]],
    device atomic_uint& match_count [[buffer(6)]],
    device const uint* bitmaps [[buffer(7)]],
    constant RegexHeader& regex [[buffer(8)]],
    uint gid [[thread_position_in_grid]]
) {
    if (gid >= config.num_names) return;

    uint tlen = lengths[gid];
    device const uchar* text = names + offsets[gid];
    bool ci = (regex.flags & REGEX_CASE_INSENSITIVE) != 0;

    uint cur[8];
    uint nxt[8];
    for (uint w = 0; w < 8; w++) cur[w] = 0u;
    cur[regex.start_state >> 5] = 1u << (regex.start_state & 31u);
    nfa_closure(state_words, regex.num_states, text, tlen, 0, cur);

    bool dead = false;
    for (uint pos = 0; pos < tlen; pos++) {
        uchar b = text[pos];
        uchar fb = ci ? fold_case(b) : b;
        for (uint w = 0; w < 8; w++) nxt[w] = 0u;
        for (uint i = 0; i < regex.num_states; i++) {
            if (!set_contains(cur, i)) continue;
            uint ty = state_type(state_words, i);
            bool consumed = false;
            if (ty == STATE_LITERAL) {
                // Literals are pre-folded at compile time.
                consumed = uint(fb) == state_literal(state_words, i);
            } else if (ty == STATE_CHAR_CLASS) {
                uint word = bitmaps[(state_bitmap_offset(state_words, i) >> 2) + (uint(b) >> 5)];
                bool member = (word >> (uint(b) & 31u)) & 1u;
                bool negated = (state_flags(state_words, i) & FLAG_NEGATED) != 0;
                consumed = member != negated;
            } else if (ty == STATE_DOT) {
                consumed = b != '\n';
            } else if (ty == STATE_ANY) {
                consumed = true;
            }
            if (consumed) {
                uint o = state_out(state_words, i);
                nxt[o >> 5] |= 1u << (o & 31u);
            }
        }
        bool empty = true;
        for (uint w = 0; w < 8; w++) {
            if (nxt[w] != 0u) empty = false;
        }
        if (empty) {
            dead = true;
            break;
        }
        nfa_closure(state_words, regex.num_states, text, tlen, pos + 1, nxt);
        for (uint w = 0; w < 8; w++) cur[w] = nxt[w];
    }

    bool ok = false;
    if (!dead) {
        for (uint i = 0; i < regex.num_states; i++) {
            if (set_contains(cur, i) && state_type(state_words, i) == STATE_MATCH) {
                ok = true;
                break;
            }
        }
    }
    results[gid].name_idx = gid;
    results[gid].matched = ok ? 1u : 0u;
    if (ok) {
        atomic_fetch_add_explicit(&match_count, 1u, memory_order_relaxed);
    }
}
"#;

/// Metal compute driver. Owns the device, queue and both pipelines; nothing
/// outlives it.
pub struct MetalDriver {
    device: Device,
    command_queue: CommandQueue,
    glob_pipeline: ComputePipelineState,
    regex_pipeline: ComputePipelineState,
    caps: DeviceCaps,
}

impl MetalDriver {
    /// Grab the system device, compile the library, build both pipelines.
    pub fn init() -> Result<Self, GpuError> {
        let device = Device::system_default()
            .ok_or_else(|| GpuError::NoDevice("no Metal device".into()))?;

        let options = CompileOptions::new();
        let library = device
            .new_library_with_source(MATCH_SHADER, &options)
            .map_err(|e| GpuError::ShaderCompile(e.to_string()))?;

        let glob_pipeline = Self::make_pipeline(&device, &library, "match_names")?;
        let regex_pipeline = Self::make_pipeline(&device, &library, "regex_match_names")?;

        let caps = DeviceCaps {
            max_threads_per_group: device.max_threads_per_threadgroup().width as u32,
            max_buffer_len: device.max_buffer_length(),
            device_memory: device.recommended_max_working_set_size(),
            unified_memory: device.has_unified_memory(),
        };

        debug!(
            device = %device.name(),
            max_threads = caps.max_threads_per_group,
            unified = caps.unified_memory,
            "metal driver ready"
        );

        let command_queue = device.new_command_queue();
        Ok(Self {
            device,
            command_queue,
            glob_pipeline,
            regex_pipeline,
            caps,
        })
    }

    fn make_pipeline(
        device: &Device,
        library: &Library,
        name: &str,
    ) -> Result<ComputePipelineState, GpuError> {
        let function = library
            .get_function(name, None)
            .map_err(|e| GpuError::Pipeline(format!("{name}: {e}")))?;
        device
            .new_compute_pipeline_state_with_function(&function)
            .map_err(|e| GpuError::Pipeline(format!("{name}: {e}")))
    }

    pub fn caps(&self) -> DeviceCaps {
        self.caps
    }

    pub fn device_name(&self) -> String {
        self.device.name().to_string()
    }

    fn buffer_with_bytes(&self, data: &[u8]) -> Buffer {
        self.device.new_buffer_with_data(
            data.as_ptr() as *const _,
            data.len() as u64,
            MTLResourceOptions::StorageModeShared,
        )
    }

    fn buffer_with_u32s(&self, data: &[u32]) -> Buffer {
        self.device.new_buffer_with_data(
            data.as_ptr() as *const _,
            std::mem::size_of_val(data) as u64,
            MTLResourceOptions::StorageModeShared,
        )
    }

    fn run(
        &self,
        pipeline: &ComputePipelineState,
        buffers: &[&Buffer],
        num_names: usize,
    ) -> Result<MatchVector, GpuError> {
        let results_buf = self.device.new_buffer(
            (num_names * std::mem::size_of::<MatchResult>()) as u64,
            MTLResourceOptions::StorageModeShared,
        );
        let counter_buf = self.buffer_with_u32s(&[0u32]);

        let command_buffer = self.command_queue.new_command_buffer();
        let encoder = command_buffer.new_compute_command_encoder();
        encoder.set_compute_pipeline_state(pipeline);
        // Slots 0-4 are inputs, 5-6 results and counter, 7+ the regex
        // bitmap pool and header.
        for (i, buf) in buffers.iter().take(5).enumerate() {
            encoder.set_buffer(i as u64, Some(buf), 0);
        }
        encoder.set_buffer(5, Some(&results_buf), 0);
        encoder.set_buffer(6, Some(&counter_buf), 0);
        for (i, buf) in buffers.iter().skip(5).enumerate() {
            encoder.set_buffer(7 + i as u64, Some(buf), 0);
        }

        encoder.dispatch_thread_groups(
            MTLSize::new(workgroups_for(num_names) as u64, 1, 1),
            MTLSize::new(WORKGROUP_SIZE as u64, 1, 1),
        );
        encoder.end_encoding();
        command_buffer.commit();
        command_buffer.wait_until_completed();

        if command_buffer.status() == MTLCommandBufferStatus::Error {
            return Err(GpuError::Dispatch("command buffer failed".into()));
        }

        // Completion above establishes happens-before; reading the shared
        // buffers is now safe.
        let verdicts;
        let gpu_count;
        unsafe {
            let records =
                std::slice::from_raw_parts(results_buf.contents() as *const MatchResult, num_names);
            verdicts = compact_results(records, num_names);
            gpu_count = *(counter_buf.contents() as *const u32);
        }

        Ok(MatchVector {
            verdicts,
            gpu_count,
        })
    }

    /// Glob-match every path in the batch. Entry point `match_names`.
    pub fn match_names(
        &self,
        batch: &PackedBatch,
        pattern: &[u8],
        options: MatchOptions,
    ) -> Result<MatchVector, GpuError> {
        let num_names = batch.num_names();
        if num_names == 0 {
            return Ok(MatchVector {
                verdicts: Vec::new(),
                gpu_count: 0,
            });
        }

        let config = batch
            .glob_config(pattern, options)
            .map_err(|e| GpuError::Dispatch(e.to_string()))?;

        let config_buf = self.buffer_with_bytes(bytemuck::bytes_of(&config));
        let pattern_buf = self.buffer_with_bytes(&pad_to_words(pattern));
        let names_buf = self.buffer_with_bytes(&batch.names_words());
        let offsets_buf = self.buffer_with_u32s(&batch.offsets);
        let lengths_buf = self.buffer_with_u32s(&batch.lengths);

        self.run(
            &self.glob_pipeline,
            &[
                &config_buf,
                &pattern_buf,
                &names_buf,
                &offsets_buf,
                &lengths_buf,
            ],
            num_names,
        )
    }

    /// Regex-match every path in the batch. Entry point `regex_match_names`.
    pub fn regex_match_names(
        &self,
        batch: &PackedBatch,
        regex: &CompiledRegex,
    ) -> Result<MatchVector, GpuError> {
        let num_names = batch.num_names();
        if num_names == 0 {
            return Ok(MatchVector {
                verdicts: Vec::new(),
                gpu_count: 0,
            });
        }

        let config = batch.regex_config(regex.header.num_states);
        let header_words = [
            regex.header.num_states,
            regex.header.start_state,
            regex.header.num_groups,
            regex.header.flags,
        ];

        let config_buf = self.buffer_with_bytes(bytemuck::bytes_of(&config));
        let states_buf = self.buffer_with_bytes(&regex.packed_state_bytes());
        let names_buf = self.buffer_with_bytes(&batch.names_words());
        let offsets_buf = self.buffer_with_u32s(&batch.offsets);
        let lengths_buf = self.buffer_with_u32s(&batch.lengths);
        let bitmaps_buf = self.buffer_with_bytes(&regex.bitmap_bytes());
        let header_buf = self.buffer_with_u32s(&header_words);

        self.run(
            &self.regex_pipeline,
            &[
                &config_buf,
                &states_buf,
                &names_buf,
                &offsets_buf,
                &lengths_buf,
                &bitmaps_buf,
                &header_buf,
            ],
            num_names,
        )
    }
}
