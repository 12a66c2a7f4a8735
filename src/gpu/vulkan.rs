// Vulkan-class backend via wgpu.
//
// The instance is pinned to the Vulkan backend; the WGSL kernels are the
// second kernel rendition of the shared matcher semantics. WGSL has no byte
// type, so name, pattern and state-table bytes travel in u32 words and are
// unpacked little-endian in the shader. The host packs them the same way
// explicitly, keeping the ABI platform-agnostic.
//
// Pipelines are compiled once at init and cached on the driver; every
// dispatch creates fresh buffers and releases them when it returns.

use tracing::debug;
use wgpu::util::DeviceExt;

use super::layout::{compact_results, pad_to_words, workgroups_for, MatchResult, PackedBatch};
use super::{DeviceCaps, GpuError, MatchVector};
use crate::pattern::MatchOptions;
use crate::regex::CompiledRegex;

/// WGSL kernel: glob matching, one thread per path.
const GLOB_SHADER: &str = r#"
struct MatchConfig {
    num_names: u32,
    pattern_len: u32,
    flags: u32,
    max_name_len: u32,
    names_offset: u32,
    lengths_offset: u32,
    pad0: u32,
    pad1: u32,
}

struct MatchResult {
    name_idx: u32,
    matched: u32,
}

@group(0) @binding(0) var<uniform> config: MatchConfig;
@group(0) @binding(1) var<storage, read> pattern_words: array<u32>;
@group(0) @binding(2) var<storage, read> names_words: array<u32>;
@group(0) @binding(3) var<storage, read> offsets: array<u32>;
@group(0) @binding(4) var<storage, read> lengths: array<u32>;
@group(0) @binding(5) var<storage, read_write> results: array<MatchResult>;
@group(0) @binding(6) var<storage, read_write> match_count: atomic<u32>;

const OPT_CASE_INSENSITIVE: u32 = 1u;
const OPT_MATCH_PATH: u32 = 2u;
const OPT_PERIOD: u32 = 4u;

// Bytes are packed little-endian into u32 words.
fn name_byte(idx: u32) -> u32 {
    return (names_words[idx >> 2u] >> ((idx & 3u) * 8u)) & 0xffu;
}

fn pattern_byte(idx: u32) -> u32 {
    return (pattern_words[idx >> 2u] >> ((idx & 3u) * 8u)) & 0xffu;
}

fn fold_case(c: u32) -> u32 {
    if (c >= 65u && c <= 90u) {
        return c + 32u;
    }
    return c;
}

fn chars_equal(a: u32, b: u32, ci: bool) -> bool {
    if (a == b) {
        return true;
    }
    return ci && fold_case(a) == fold_case(b);
}

// Character class test at pattern position pi. Low 16 bits of the return
// value hold the consumed byte count (0 = unterminated), bit 31 holds the
// membership verdict with negation applied.
fn match_class(pi: u32, plen: u32, c: u32, ci: bool) -> u32 {
    var i = pi + 1u;
    var negated = false;
    if (i < plen) {
        let b = pattern_byte(i);
        if (b == 33u || b == 94u) { // '!' or '^'
            negated = true;
            i = i + 1u;
        }
    }
    var found = false;
    var first = true;
    loop {
        if (i >= plen) {
            return 0u;
        }
        let pc = pattern_byte(i);
        if (pc == 93u && !first) { // ']'
            i = i + 1u;
            break;
        }
        first = false;
        if (i + 2u < plen && pattern_byte(i + 1u) == 45u && pattern_byte(i + 2u) != 93u) {
            var lo = pc;
            var hi = pattern_byte(i + 2u);
            var b = c;
            if (ci) {
                lo = fold_case(lo);
                hi = fold_case(hi);
                b = fold_case(b);
            }
            if (b >= lo && b <= hi) {
                found = true;
            }
            i = i + 3u;
        } else {
            if (chars_equal(pc, c, ci)) {
                found = true;
            }
            i = i + 1u;
        }
    }
    var result = i - pi;
    if (found != negated) {
        result = result | 0x80000000u;
    }
    return result;
}

// Two-cursor backtracking matcher with a single '*' checkpoint; identical
// to the scalar CPU reference.
fn glob_match(plen: u32, toff: u32, tlen: u32, flags: u32) -> bool {
    let ci = (flags & OPT_CASE_INSENSITIVE) != 0u;
    if ((flags & OPT_PERIOD) != 0u && tlen > 0u && name_byte(toff) == 46u) {
        if (plen == 0u || pattern_byte(0u) != 46u) {
            return false;
        }
    }
    var pi = 0u;
    var ni = 0u;
    var star_pi = 0xffffffffu;
    var star_ni = 0u;
    loop {
        if (ni >= tlen) {
            break;
        }
        if (pi < plen) {
            let pc = pattern_byte(pi);
            if (pc == 42u) { // '*'
                star_pi = pi;
                star_ni = ni;
                pi = pi + 1u;
                continue;
            } else if (pc == 63u) { // '?'
                pi = pi + 1u;
                ni = ni + 1u;
                continue;
            } else if (pc == 91u) { // '['
                let r = match_class(pi, plen, name_byte(toff + ni), ci);
                let consumed = r & 0xffffu;
                if (consumed != 0u) {
                    if ((r & 0x80000000u) != 0u) {
                        pi = pi + consumed;
                        ni = ni + 1u;
                        continue;
                    }
                    // Valid class, not a member: backtrack below.
                } else if (chars_equal(91u, name_byte(toff + ni), ci)) {
                    pi = pi + 1u;
                    ni = ni + 1u;
                    continue;
                }
            } else if (chars_equal(pc, name_byte(toff + ni), ci)) {
                pi = pi + 1u;
                ni = ni + 1u;
                continue;
            }
        }
        if (star_pi != 0xffffffffu) {
            pi = star_pi + 1u;
            star_ni = star_ni + 1u;
            ni = star_ni;
            continue;
        }
        return false;
    }
    loop {
        if (pi >= plen || pattern_byte(pi) != 42u) {
            break;
        }
        pi = pi + 1u;
    }
    return pi == plen;
}

@compute @workgroup_size(256)
fn match_names(@builtin(global_invocation_id) gid: vec3<u32>) {
    let idx = gid.x;
    if (idx >= config.num_names) {
        return;
    }
    let off = offsets[idx];
    let len = lengths[idx];
    var start = 0u;
    if ((config.flags & OPT_MATCH_PATH) == 0u) {
        var i = len;
        loop {
            if (i == 0u) {
                break;
            }
            if (name_byte(off + i - 1u) == 47u) { // '/'
                start = i;
                break;
            }
            i = i - 1u;
        }
    }
    let ok = glob_match(config.pattern_len, off + start, len - start, config.flags);
    results[idx].name_idx = idx;
    results[idx].matched = select(0u, 1u, ok);
    if (ok) {
        atomicAdd(&match_count, 1u);
    }
}
"#;

/// WGSL kernel: Thompson-NFA simulation, one thread per path.
const REGEX_SHADER: &str = r#"
struct MatchConfig {
    num_names: u32,
    pattern_len: u32,
    flags: u32,
    max_name_len: u32,
    names_offset: u32,
    lengths_offset: u32,
    pad0: u32,
    pad1: u32,
}

struct RegexHeader {
    num_states: u32,
    start_state: u32,
    num_groups: u32,
    flags: u32,
}

struct MatchResult {
    name_idx: u32,
    matched: u32,
}

@group(0) @binding(0) var<uniform> config: MatchConfig;
@group(0) @binding(1) var<storage, read> state_words: array<u32>;
@group(0) @binding(2) var<storage, read> names_words: array<u32>;
@group(0) @binding(3) var<storage, read> offsets: array<u32>;
@group(0) @binding(4) var<storage, read> lengths: array<u32>;
@group(0) @binding(5) var<storage, read_write> results: array<MatchResult>;
@group(0) @binding(6) var<storage, read_write> match_count: atomic<u32>;
@group(0) @binding(7) var<storage, read> bitmaps: array<u32>;
@group(0) @binding(8) var<uniform> regex: RegexHeader;

const STATE_LITERAL: u32 = 0u;
const STATE_CHAR_CLASS: u32 = 1u;
const STATE_DOT: u32 = 2u;
const STATE_SPLIT: u32 = 3u;
const STATE_MATCH: u32 = 4u;
const STATE_GROUP_START: u32 = 5u;
const STATE_GROUP_END: u32 = 6u;
const STATE_WORD_BOUNDARY: u32 = 7u;
const STATE_NOT_WORD_BOUNDARY: u32 = 8u;
const STATE_LINE_START: u32 = 9u;
const STATE_LINE_END: u32 = 10u;
const STATE_ANY: u32 = 11u;

const FLAG_NEGATED: u32 = 1u;
const REGEX_CASE_INSENSITIVE: u32 = 4u;

fn name_byte(idx: u32) -> u32 {
    return (names_words[idx >> 2u] >> ((idx & 3u) * 8u)) & 0xffu;
}

fn fold_case(c: u32) -> u32 {
    if (c >= 65u && c <= 90u) {
        return c + 32u;
    }
    return c;
}

// State records are three little-endian u32 words:
//   word0 = type | flags << 8 | out << 16
//   word1 = out2 | literal << 16 | group_idx << 24
//   word2 = bitmap_offset
fn state_type(i: u32) -> u32 {
    return state_words[i * 3u] & 0xffu;
}
fn state_flags(i: u32) -> u32 {
    return (state_words[i * 3u] >> 8u) & 0xffu;
}
fn state_out(i: u32) -> u32 {
    return (state_words[i * 3u] >> 16u) & 0xffffu;
}
fn state_out2(i: u32) -> u32 {
    return state_words[i * 3u + 1u] & 0xffffu;
}
fn state_literal(i: u32) -> u32 {
    return (state_words[i * 3u + 1u] >> 16u) & 0xffu;
}
fn state_bitmap_offset(i: u32) -> u32 {
    return state_words[i * 3u + 2u];
}

fn class_contains(byte_offset: u32, b: u32) -> bool {
    let word = bitmaps[(byte_offset >> 2u) + (b >> 5u)];
    return ((word >> (b & 31u)) & 1u) != 0u;
}

fn set_contains(set: ptr<function, array<u32, 8>>, i: u32) -> bool {
    return (((*set)[i >> 5u] >> (i & 31u)) & 1u) != 0u;
}

fn set_insert(set: ptr<function, array<u32, 8>>, i: u32) -> bool {
    let w = i >> 5u;
    let mask = 1u << (i & 31u);
    let fresh = ((*set)[w] & mask) == 0u;
    (*set)[w] = (*set)[w] | mask;
    return fresh;
}

fn is_word_byte(b: u32) -> bool {
    return (b >= 48u && b <= 57u) || (b >= 65u && b <= 90u)
        || (b >= 97u && b <= 122u) || b == 95u;
}

fn at_word_boundary(toff: u32, tlen: u32, pos: u32) -> bool {
    var left = false;
    if (pos > 0u) {
        left = is_word_byte(name_byte(toff + pos - 1u));
    }
    var right = false;
    if (pos < tlen) {
        right = is_word_byte(name_byte(toff + pos));
    }
    return left != right;
}

// Epsilon closure via a bounded worklist: each state is pushed at most once,
// guarded by its set bit, so the stack depth never exceeds the state count.
fn closure(set: ptr<function, array<u32, 8>>, toff: u32, tlen: u32, pos: u32) {
    var stack: array<u32, 256>;
    var top = 0u;
    for (var i = 0u; i < regex.num_states; i = i + 1u) {
        if (set_contains(set, i)) {
            stack[top] = i;
            top = top + 1u;
        }
    }
    loop {
        if (top == 0u) {
            break;
        }
        top = top - 1u;
        let s = stack[top];
        let ty = state_type(s);
        if (ty == STATE_SPLIT) {
            if (set_insert(set, state_out(s))) {
                stack[top] = state_out(s);
                top = top + 1u;
            }
            if (set_insert(set, state_out2(s))) {
                stack[top] = state_out2(s);
                top = top + 1u;
            }
            continue;
        }
        var target = 0xffffffffu;
        if (ty == STATE_GROUP_START || ty == STATE_GROUP_END) {
            target = state_out(s);
        } else if (ty == STATE_WORD_BOUNDARY) {
            if (at_word_boundary(toff, tlen, pos)) {
                target = state_out(s);
            }
        } else if (ty == STATE_NOT_WORD_BOUNDARY) {
            if (!at_word_boundary(toff, tlen, pos)) {
                target = state_out(s);
            }
        } else if (ty == STATE_LINE_START) {
            if (pos == 0u) {
                target = state_out(s);
            }
        } else if (ty == STATE_LINE_END) {
            if (pos == tlen) {
                target = state_out(s);
            }
        }
        if (target != 0xffffffffu) {
            if (set_insert(set, target)) {
                stack[top] = target;
                top = top + 1u;
            }
        }
    }
}

// Whole-input match: begin at 0, accept only if MATCH is live at
// end-of-input.
@compute @workgroup_size(256)
fn regex_match_names(@builtin(global_invocation_id) gid: vec3<u32>) {
    let idx = gid.x;
    if (idx >= config.num_names) {
        return;
    }
    let toff = offsets[idx];
    let tlen = lengths[idx];
    let ci = (regex.flags & REGEX_CASE_INSENSITIVE) != 0u;

    var cur: array<u32, 8>;
    var nxt: array<u32, 8>;
    for (var w = 0u; w < 8u; w = w + 1u) {
        cur[w] = 0u;
    }
    cur[regex.start_state >> 5u] = 1u << (regex.start_state & 31u);
    closure(&cur, toff, tlen, 0u);

    var dead = false;
    for (var pos = 0u; pos < tlen; pos = pos + 1u) {
        let b = name_byte(toff + pos);
        var fb = b;
        if (ci) {
            fb = fold_case(b);
        }
        for (var w = 0u; w < 8u; w = w + 1u) {
            nxt[w] = 0u;
        }
        for (var i = 0u; i < regex.num_states; i = i + 1u) {
            if (!set_contains(&cur, i)) {
                continue;
            }
            let ty = state_type(i);
            var consumed = false;
            if (ty == STATE_LITERAL) {
                // Literals are pre-folded at compile time.
                consumed = fb == state_literal(i);
            } else if (ty == STATE_CHAR_CLASS) {
                let member = class_contains(state_bitmap_offset(i), b);
                let negated = (state_flags(i) & FLAG_NEGATED) != 0u;
                consumed = member != negated;
            } else if (ty == STATE_DOT) {
                consumed = b != 10u;
            } else if (ty == STATE_ANY) {
                consumed = true;
            }
            if (consumed) {
                let o = state_out(i);
                nxt[o >> 5u] = nxt[o >> 5u] | (1u << (o & 31u));
            }
        }
        var empty = true;
        for (var w = 0u; w < 8u; w = w + 1u) {
            if (nxt[w] != 0u) {
                empty = false;
            }
        }
        if (empty) {
            dead = true;
            break;
        }
        closure(&nxt, toff, tlen, pos + 1u);
        for (var w = 0u; w < 8u; w = w + 1u) {
            cur[w] = nxt[w];
        }
    }

    var ok = false;
    if (!dead) {
        for (var i = 0u; i < regex.num_states; i = i + 1u) {
            if (set_contains(&cur, i) && state_type(i) == STATE_MATCH) {
                ok = true;
                break;
            }
        }
    }
    results[idx].name_idx = idx;
    results[idx].matched = select(0u, 1u, ok);
    if (ok) {
        atomicAdd(&match_count, 1u);
    }
}
"#;

/// Vulkan compute driver. One instance per process lifetime is typical but
/// nothing is global; `Drop` releases the device and pipelines.
pub struct VulkanDriver {
    device: wgpu::Device,
    queue: wgpu::Queue,
    glob_pipeline: wgpu::ComputePipeline,
    regex_pipeline: wgpu::ComputePipeline,
    caps: DeviceCaps,
    device_name: String,
}

impl VulkanDriver {
    /// Probe for a Vulkan adapter and build both pipelines.
    pub fn init() -> Result<Self, GpuError> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::VULKAN,
            ..Default::default()
        });

        let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::HighPerformance,
            force_fallback_adapter: false,
            compatible_surface: None,
        }))
        .ok_or_else(|| GpuError::NoDevice("no Vulkan adapter found".into()))?;

        let info = adapter.get_info();
        let limits = adapter.limits();
        let caps = DeviceCaps {
            max_threads_per_group: limits.max_compute_workgroup_size_x,
            max_buffer_len: limits.max_buffer_size,
            // wgpu does not expose heap sizes; leave unknown.
            device_memory: 0,
            unified_memory: matches!(
                info.device_type,
                wgpu::DeviceType::IntegratedGpu | wgpu::DeviceType::Cpu
            ),
        };
        let device_name = info.name.clone();

        let (device, queue) = pollster::block_on(adapter.request_device(
            &wgpu::DeviceDescriptor {
                label: Some("gpufind"),
                required_features: wgpu::Features::empty(),
                // The regex pipeline binds seven storage buffers; downlevel
                // defaults only guarantee four.
                required_limits: wgpu::Limits::default(),
                memory_hints: wgpu::MemoryHints::Performance,
            },
            None,
        ))
        .map_err(|e| GpuError::NoDevice(e.to_string()))?;

        let glob_module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("glob_match"),
            source: wgpu::ShaderSource::Wgsl(GLOB_SHADER.into()),
        });
        let regex_module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("regex_match"),
            source: wgpu::ShaderSource::Wgsl(REGEX_SHADER.into()),
        });

        let make_pipeline =
            |label: &str, module: &wgpu::ShaderModule, entry: &str| -> wgpu::ComputePipeline {
                device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
                    label: Some(label),
                    layout: None,
                    module,
                    entry_point: Some(entry),
                    compilation_options: Default::default(),
                    cache: None,
                })
            };

        let glob_pipeline = make_pipeline("match_names", &glob_module, "match_names");
        let regex_pipeline = make_pipeline("regex_match_names", &regex_module, "regex_match_names");

        debug!(
            device = %device_name,
            max_threads = caps.max_threads_per_group,
            unified = caps.unified_memory,
            "vulkan driver ready"
        );

        Ok(Self {
            device,
            queue,
            glob_pipeline,
            regex_pipeline,
            caps,
            device_name,
        })
    }

    pub fn caps(&self) -> DeviceCaps {
        self.caps
    }

    pub fn device_name(&self) -> &str {
        &self.device_name
    }

    fn create_buffer_init(&self, label: &str, data: &[u8], usage: wgpu::BufferUsages) -> wgpu::Buffer {
        self.device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some(label),
                contents: data,
                usage,
            })
    }

    /// Copy a storage buffer back to the CPU through a staging buffer.
    fn read_buffer(&self, buffer: &wgpu::Buffer, size: u64) -> Result<Vec<u8>, GpuError> {
        let staging = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("staging"),
            size,
            usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("readback"),
            });
        encoder.copy_buffer_to_buffer(buffer, 0, &staging, 0, size);
        self.queue.submit(Some(encoder.finish()));

        let slice = staging.slice(..);
        let (tx, rx) = std::sync::mpsc::channel();
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = tx.send(result);
        });
        self.device.poll(wgpu::Maintain::Wait);
        rx.recv()
            .map_err(|_| GpuError::Readback("map callback dropped".into()))?
            .map_err(|e| GpuError::Readback(e.to_string()))?;

        let data = slice.get_mapped_range().to_vec();
        staging.unmap();
        Ok(data)
    }

    fn dispatch(
        &self,
        pipeline: &wgpu::ComputePipeline,
        entries: &[wgpu::BindGroupEntry],
        num_names: usize,
        results_buf: &wgpu::Buffer,
        counter_buf: &wgpu::Buffer,
    ) -> Result<MatchVector, GpuError> {
        let layout = pipeline.get_bind_group_layout(0);
        let bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("match_bg"),
            layout: &layout,
            entries,
        });

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("match_dispatch"),
            });
        {
            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("match_pass"),
                timestamp_writes: None,
            });
            pass.set_pipeline(pipeline);
            pass.set_bind_group(0, &bind_group, &[]);
            pass.dispatch_workgroups(workgroups_for(num_names), 1, 1);
        }
        self.queue.submit(Some(encoder.finish()));

        // Completion is established by the mapped readback below; only then
        // is the relaxed counter value meaningful.
        let results_size = (num_names * std::mem::size_of::<MatchResult>()) as u64;
        let raw = self.read_buffer(results_buf, results_size)?;
        let records: &[MatchResult] = bytemuck::cast_slice(&raw);
        let counter_raw = self.read_buffer(counter_buf, 4)?;
        let gpu_count = u32::from_le_bytes(
            counter_raw[..4]
                .try_into()
                .map_err(|_| GpuError::Readback("short counter readback".into()))?,
        );

        Ok(MatchVector {
            verdicts: compact_results(records, num_names),
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

        let config_buf = self.create_buffer_init(
            "config",
            bytemuck::bytes_of(&config),
            wgpu::BufferUsages::UNIFORM,
        );
        let pattern_buf = self.create_buffer_init(
            "pattern",
            &pad_to_words(pattern),
            wgpu::BufferUsages::STORAGE,
        );
        let names_buf =
            self.create_buffer_init("names", &batch.names_words(), wgpu::BufferUsages::STORAGE);
        let offsets_buf = self.create_buffer_init(
            "offsets",
            bytemuck::cast_slice(&batch.offsets),
            wgpu::BufferUsages::STORAGE,
        );
        let lengths_buf = self.create_buffer_init(
            "lengths",
            bytemuck::cast_slice(&batch.lengths),
            wgpu::BufferUsages::STORAGE,
        );
        let results_buf = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("results"),
            size: (num_names * std::mem::size_of::<MatchResult>()) as u64,
            usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_SRC,
            mapped_at_creation: false,
        });
        let counter_buf = self.create_buffer_init(
            "match_count",
            &[0u8; 4],
            wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_SRC,
        );

        let entries = [
            bind(0, &config_buf),
            bind(1, &pattern_buf),
            bind(2, &names_buf),
            bind(3, &offsets_buf),
            bind(4, &lengths_buf),
            bind(5, &results_buf),
            bind(6, &counter_buf),
        ];
        self.dispatch(&self.glob_pipeline, &entries, num_names, &results_buf, &counter_buf)
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

        let config_buf = self.create_buffer_init(
            "config",
            bytemuck::bytes_of(&config),
            wgpu::BufferUsages::UNIFORM,
        );
        let states_buf = self.create_buffer_init(
            "state_words",
            &regex.packed_state_bytes(),
            wgpu::BufferUsages::STORAGE,
        );
        let names_buf =
            self.create_buffer_init("names", &batch.names_words(), wgpu::BufferUsages::STORAGE);
        let offsets_buf = self.create_buffer_init(
            "offsets",
            bytemuck::cast_slice(&batch.offsets),
            wgpu::BufferUsages::STORAGE,
        );
        let lengths_buf = self.create_buffer_init(
            "lengths",
            bytemuck::cast_slice(&batch.lengths),
            wgpu::BufferUsages::STORAGE,
        );
        let results_buf = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("results"),
            size: (num_names * std::mem::size_of::<MatchResult>()) as u64,
            usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_SRC,
            mapped_at_creation: false,
        });
        let counter_buf = self.create_buffer_init(
            "match_count",
            &[0u8; 4],
            wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_SRC,
        );
        let bitmaps_buf = self.create_buffer_init(
            "bitmaps",
            &regex.bitmap_bytes(),
            wgpu::BufferUsages::STORAGE,
        );
        let header_buf = self.create_buffer_init(
            "regex_header",
            bytemuck::cast_slice(&header_words),
            wgpu::BufferUsages::UNIFORM,
        );

        let entries = [
            bind(0, &config_buf),
            bind(1, &states_buf),
            bind(2, &names_buf),
            bind(3, &offsets_buf),
            bind(4, &lengths_buf),
            bind(5, &results_buf),
            bind(6, &counter_buf),
            bind(7, &bitmaps_buf),
            bind(8, &header_buf),
        ];
        self.dispatch(&self.regex_pipeline, &entries, num_names, &results_buf, &counter_buf)
    }
}

fn bind(binding: u32, buffer: &wgpu::Buffer) -> wgpu::BindGroupEntry {
    wgpu::BindGroupEntry {
        binding,
        resource: buffer.as_entire_binding(),
    }
}
