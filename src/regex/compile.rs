// AST -> Thompson NFA byte-code.
//
// The output is the GPU-executable program: a header, a flat table of fixed
// 12-byte state records, and a pool of 256-bit character-class bitmaps. The
// host packs the table into little-endian u32 words explicitly so the shader
// ABI never depends on platform byte order.

use std::mem;

use super::exec;
use super::parse::{Ast, ClassItem, Parser};
use super::{
    RegexError, MAX_STATES, REGEX_ANCHORED_END, REGEX_ANCHORED_START, REGEX_CASE_INSENSITIVE,
    STATE_CHAR_CLASS, STATE_DOT, STATE_FLAG_NEGATED, STATE_GROUP_END, STATE_GROUP_START,
    STATE_LINE_END, STATE_LINE_START, STATE_LITERAL, STATE_MATCH, STATE_NOT_WORD_BOUNDARY,
    STATE_SPLIT, STATE_WORD_BOUNDARY,
};

/// Words per class bitmap: 256 bits as 8 little-endian u32s.
pub const BITMAP_WORDS: usize = 8;

/// One NFA state. Fixed 12-byte record, mirrored by both kernels.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StateRecord {
    pub ty: u8,
    pub flags: u8,
    pub out: u16,
    pub out2: u16,
    pub literal: u8,
    pub group_idx: u8,
    pub bitmap_offset: u32,
}

const _: () = assert!(mem::size_of::<StateRecord>() == 12);

impl StateRecord {
    fn new(ty: u8) -> Self {
        Self {
            ty,
            flags: 0,
            out: 0,
            out2: 0,
            literal: 0,
            group_idx: 0,
            bitmap_offset: 0,
        }
    }
}

/// Program header, identical to the GPU-side uniform struct.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegexHeader {
    pub num_states: u32,
    pub start_state: u32,
    pub num_groups: u32,
    pub flags: u32,
}

const _: () = assert!(mem::size_of::<RegexHeader>() == 16);

/// A compiled, immutable regex program. Owned by the caller and passed by
/// reference into every match invocation; the matchers keep no state.
#[derive(Debug, Clone)]
pub struct CompiledRegex {
    pub header: RegexHeader,
    pub states: Vec<StateRecord>,
    pub bitmaps: Vec<u32>,
}

impl CompiledRegex {
    /// Compile a pattern. Case folding (for `-iregex`) happens entirely at
    /// compile time: literals are stored folded and class bitmaps mirror
    /// every letter across case, so kernels never fold class lookups.
    pub fn compile(pattern: &[u8], case_insensitive: bool) -> Result<Self, RegexError> {
        let (ast, num_groups) = Parser::new(pattern).parse()?;

        let mut b = Builder {
            states: Vec::new(),
            bitmaps: Vec::new(),
            ci: case_insensitive,
        };
        let frag = b.compile_ast(&ast)?;
        let matched = b.push(StateRecord::new(STATE_MATCH))?;
        b.patch(&frag.outs, matched);

        let mut flags = 0;
        if case_insensitive {
            flags |= REGEX_CASE_INSENSITIVE;
        }
        if starts_anchored(&ast) {
            flags |= REGEX_ANCHORED_START;
        }
        if ends_anchored(&ast) {
            flags |= REGEX_ANCHORED_END;
        }

        Ok(Self {
            header: RegexHeader {
                num_states: b.states.len() as u32,
                start_state: frag.start as u32,
                num_groups: num_groups as u32,
                flags,
            },
            states: b.states,
            bitmaps: b.bitmaps,
        })
    }

    /// True when a match starts anywhere in `text` (the §4.2 scan loop).
    pub fn is_match(&self, text: &[u8]) -> bool {
        exec::is_match(self, text)
    }

    /// True when the program matches the entire input, the `-regex`
    /// semantics: the match begins at 0 and reaches MATCH at end-of-input.
    pub fn matches_full(&self, text: &[u8]) -> bool {
        exec::matches_full(self, text)
    }

    /// State table packed into little-endian u32 words, three per state:
    ///   word0 = ty | flags << 8 | out << 16
    ///   word1 = out2 | literal << 16 | group_idx << 24
    ///   word2 = bitmap_offset
    pub fn packed_state_words(&self) -> Vec<u32> {
        let mut words = Vec::with_capacity(self.states.len() * 3);
        for s in &self.states {
            words.push(s.ty as u32 | (s.flags as u32) << 8 | (s.out as u32) << 16);
            words.push(s.out2 as u32 | (s.literal as u32) << 16 | (s.group_idx as u32) << 24);
            words.push(s.bitmap_offset);
        }
        words
    }

    /// The packed state table as explicit little-endian bytes.
    pub fn packed_state_bytes(&self) -> Vec<u8> {
        self.packed_state_words()
            .iter()
            .flat_map(|w| w.to_le_bytes())
            .collect()
    }

    /// The bitmap pool as explicit little-endian bytes.
    pub fn bitmap_bytes(&self) -> Vec<u8> {
        if self.bitmaps.is_empty() {
            // Keep the binding non-empty even for class-free programs.
            return vec![0; 4];
        }
        self.bitmaps.iter().flat_map(|w| w.to_le_bytes()).collect()
    }

    /// Test a byte against the class bitmap at `byte_offset`.
    #[inline]
    pub(crate) fn class_contains(&self, byte_offset: u32, b: u8) -> bool {
        let word = self.bitmaps[byte_offset as usize / 4 + (b as usize >> 5)];
        (word >> (b & 31)) & 1 != 0
    }
}

/// A partially built fragment: an entry state plus the dangling out-slots
/// still waiting for their target.
struct Frag {
    start: u16,
    outs: Vec<Slot>,
}

/// A dangling edge: which field of which state to patch.
#[derive(Clone, Copy)]
enum Slot {
    Out(u16),
    Out2(u16),
}

struct Builder {
    states: Vec<StateRecord>,
    bitmaps: Vec<u32>,
    ci: bool,
}

impl Builder {
    fn push(&mut self, rec: StateRecord) -> Result<u16, RegexError> {
        if self.states.len() >= MAX_STATES {
            return Err(RegexError::TooManyStates);
        }
        self.states.push(rec);
        Ok((self.states.len() - 1) as u16)
    }

    fn patch(&mut self, outs: &[Slot], target: u16) {
        for slot in outs {
            match *slot {
                Slot::Out(i) => self.states[i as usize].out = target,
                Slot::Out2(i) => self.states[i as usize].out2 = target,
            }
        }
    }

    fn single(&mut self, rec: StateRecord) -> Result<Frag, RegexError> {
        let i = self.push(rec)?;
        Ok(Frag {
            start: i,
            outs: vec![Slot::Out(i)],
        })
    }

    fn compile_ast(&mut self, ast: &Ast) -> Result<Frag, RegexError> {
        match ast {
            Ast::Empty => {
                // An epsilon pass-through: a SPLIT whose two edges share the
                // successor.
                let i = self.push(StateRecord::new(STATE_SPLIT))?;
                Ok(Frag {
                    start: i,
                    outs: vec![Slot::Out(i), Slot::Out2(i)],
                })
            }
            Ast::Literal(b) => {
                let mut rec = StateRecord::new(STATE_LITERAL);
                rec.literal = if self.ci {
                    crate::pattern::glob::fold_case(*b)
                } else {
                    *b
                };
                self.single(rec)
            }
            Ast::Dot => self.single(StateRecord::new(STATE_DOT)),
            Ast::LineStart => self.single(StateRecord::new(STATE_LINE_START)),
            Ast::LineEnd => self.single(StateRecord::new(STATE_LINE_END)),
            Ast::WordBoundary => self.single(StateRecord::new(STATE_WORD_BOUNDARY)),
            Ast::NotWordBoundary => self.single(StateRecord::new(STATE_NOT_WORD_BOUNDARY)),
            Ast::Class { negated, items } => {
                let offset = self.alloc_bitmap(items);
                let mut rec = StateRecord::new(STATE_CHAR_CLASS);
                if *negated {
                    rec.flags |= STATE_FLAG_NEGATED;
                }
                rec.bitmap_offset = offset;
                self.single(rec)
            }
            Ast::Group(idx, inner) => {
                let mut gs = StateRecord::new(STATE_GROUP_START);
                gs.group_idx = *idx;
                let gs = self.push(gs)?;
                let body = self.compile_ast(inner)?;
                self.states[gs as usize].out = body.start;
                let mut ge = StateRecord::new(STATE_GROUP_END);
                ge.group_idx = *idx;
                let ge = self.push(ge)?;
                self.patch(&body.outs, ge);
                Ok(Frag {
                    start: gs,
                    outs: vec![Slot::Out(ge)],
                })
            }
            Ast::Concat(parts) => {
                let mut iter = parts.iter();
                let first = iter.next().expect("concat is never empty");
                let mut frag = self.compile_ast(first)?;
                for part in iter {
                    let next = self.compile_ast(part)?;
                    self.patch(&frag.outs, next.start);
                    frag = Frag {
                        start: frag.start,
                        outs: next.outs,
                    };
                }
                Ok(frag)
            }
            Ast::Alt(branches) => {
                let mut iter = branches.iter();
                let first = iter.next().expect("alt is never empty");
                let mut frag = self.compile_ast(first)?;
                for branch in iter {
                    let rhs = self.compile_ast(branch)?;
                    let mut split = StateRecord::new(STATE_SPLIT);
                    split.out = frag.start;
                    split.out2 = rhs.start;
                    let s = self.push(split)?;
                    let mut outs = frag.outs;
                    outs.extend(rhs.outs);
                    frag = Frag { start: s, outs };
                }
                Ok(frag)
            }
            Ast::Star(inner) => {
                let body = self.compile_ast(inner)?;
                let mut split = StateRecord::new(STATE_SPLIT);
                split.out = body.start;
                let s = self.push(split)?;
                self.patch(&body.outs, s);
                Ok(Frag {
                    start: s,
                    outs: vec![Slot::Out2(s)],
                })
            }
            Ast::Plus(inner) => {
                let body = self.compile_ast(inner)?;
                let mut split = StateRecord::new(STATE_SPLIT);
                split.out = body.start;
                let s = self.push(split)?;
                self.patch(&body.outs, s);
                Ok(Frag {
                    start: body.start,
                    outs: vec![Slot::Out2(s)],
                })
            }
            Ast::Quest(inner) => {
                let body = self.compile_ast(inner)?;
                let mut split = StateRecord::new(STATE_SPLIT);
                split.out = body.start;
                let s = self.push(split)?;
                let mut outs = body.outs;
                outs.push(Slot::Out2(s));
                Ok(Frag { start: s, outs })
            }
        }
    }

    /// Append a 256-bit bitmap for the class and return its byte offset into
    /// the pool. Case-insensitive compiles mirror each letter across case.
    fn alloc_bitmap(&mut self, items: &[ClassItem]) -> u32 {
        fn set(bits: &mut [u32; BITMAP_WORDS], b: u8) {
            bits[(b >> 5) as usize] |= 1 << (b & 31);
        }
        fn set_folded(bits: &mut [u32; BITMAP_WORDS], b: u8, ci: bool) {
            set(bits, b);
            if ci {
                if b.is_ascii_lowercase() {
                    set(bits, b - 32);
                } else if b.is_ascii_uppercase() {
                    set(bits, b + 32);
                }
            }
        }

        let offset_words = self.bitmaps.len();
        let mut bits = [0u32; BITMAP_WORDS];
        for item in items {
            match *item {
                ClassItem::Byte(b) => set_folded(&mut bits, b, self.ci),
                ClassItem::Range(lo, hi) => {
                    for b in lo..=hi {
                        set_folded(&mut bits, b, self.ci);
                    }
                }
            }
        }
        self.bitmaps.extend_from_slice(&bits);
        (offset_words * 4) as u32
    }
}

fn starts_anchored(ast: &Ast) -> bool {
    match ast {
        Ast::LineStart => true,
        Ast::Concat(parts) => parts.first().is_some_and(starts_anchored),
        Ast::Group(_, inner) => starts_anchored(inner),
        Ast::Alt(branches) => branches.iter().all(starts_anchored),
        _ => false,
    }
}

fn ends_anchored(ast: &Ast) -> bool {
    match ast {
        Ast::LineEnd => true,
        Ast::Concat(parts) => parts.last().is_some_and(ends_anchored),
        Ast::Group(_, inner) => ends_anchored(inner),
        Ast::Alt(branches) => branches.iter().all(ends_anchored),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::regex::STATE_ANY;

    #[test]
    fn test_state_record_layout() {
        assert_eq!(mem::size_of::<StateRecord>(), 12);
        assert_eq!(mem::size_of::<RegexHeader>(), 16);
    }

    #[test]
    fn test_simple_compile_counts() {
        // `ab` -> two literals + MATCH.
        let re = CompiledRegex::compile(b"ab", false).unwrap();
        assert_eq!(re.header.num_states, 3);
        assert_eq!(re.states[0].ty, STATE_LITERAL);
        assert_eq!(re.states[0].literal, b'a');
        assert_eq!(re.states[0].out, 1);
        assert_eq!(re.states[1].out, 2);
        assert_eq!(re.states[2].ty, STATE_MATCH);
        assert_eq!(re.header.start_state, 0);
        assert_eq!(re.header.flags, 0);
    }

    #[test]
    fn test_class_bitmap_bits() {
        // `[a-z]` sets exactly bits 97..=122.
        let re = CompiledRegex::compile(b"[a-z]", false).unwrap();
        assert_eq!(re.states[0].ty, STATE_CHAR_CLASS);
        assert_eq!(re.bitmaps.len(), BITMAP_WORDS);
        let total: u32 = re.bitmaps.iter().map(|w| w.count_ones()).sum();
        assert_eq!(total, 26);
        for b in 0..=255u8 {
            assert_eq!(re.class_contains(0, b), b.is_ascii_lowercase(), "byte {b}");
        }
    }

    #[test]
    fn test_case_insensitive_mirrors_at_compile_time() {
        let re = CompiledRegex::compile(b"[a-c]x", true).unwrap();
        for b in [b'a', b'A', b'c', b'C'] {
            assert!(re.class_contains(0, b), "byte {b}");
        }
        assert!(!re.class_contains(0, b'd'));
        // Literals store the folded byte.
        assert_eq!(re.states[1].literal, b'x');
        let re = CompiledRegex::compile(b"X", true).unwrap();
        assert_eq!(re.states[0].literal, b'x');
        assert_ne!(re.header.flags & REGEX_CASE_INSENSITIVE, 0);
    }

    #[test]
    fn test_anchor_hoisting() {
        let re = CompiledRegex::compile(b"^abc$", false).unwrap();
        assert_ne!(re.header.flags & REGEX_ANCHORED_START, 0);
        assert_ne!(re.header.flags & REGEX_ANCHORED_END, 0);
        let re = CompiledRegex::compile(b"abc", false).unwrap();
        assert_eq!(re.header.flags & (REGEX_ANCHORED_START | REGEX_ANCHORED_END), 0);
        // Alternations are anchored only when every branch is.
        let re = CompiledRegex::compile(b"^a|^b", false).unwrap();
        assert_ne!(re.header.flags & REGEX_ANCHORED_START, 0);
        let re = CompiledRegex::compile(b"^a|b", false).unwrap();
        assert_eq!(re.header.flags & REGEX_ANCHORED_START, 0);
    }

    #[test]
    fn test_state_limit() {
        let long = vec![b'a'; MAX_STATES + 10];
        assert_eq!(
            CompiledRegex::compile(&long, false).unwrap_err(),
            RegexError::TooManyStates
        );
        let ok = vec![b'a'; 200];
        assert!(CompiledRegex::compile(&ok, false).is_ok());
    }

    #[test]
    fn test_word_packing_roundtrip() {
        let re = CompiledRegex::compile(b"(a|[0-9])+\\.c$", false).unwrap();
        let words = re.packed_state_words();
        assert_eq!(words.len(), re.states.len() * 3);
        for (i, s) in re.states.iter().enumerate() {
            let w0 = words[i * 3];
            let w1 = words[i * 3 + 1];
            let w2 = words[i * 3 + 2];
            assert_eq!((w0 & 0xff) as u8, s.ty);
            assert_eq!(((w0 >> 8) & 0xff) as u8, s.flags);
            assert_eq!(((w0 >> 16) & 0xffff) as u16, s.out);
            assert_eq!((w1 & 0xffff) as u16, s.out2);
            assert_eq!(((w1 >> 16) & 0xff) as u8, s.literal);
            assert_eq!(((w1 >> 24) & 0xff) as u8, s.group_idx);
            assert_eq!(w2, s.bitmap_offset);
        }
        // Byte packing is explicit little-endian.
        let bytes = re.packed_state_bytes();
        assert_eq!(bytes.len(), words.len() * 4);
        assert_eq!(bytes[0], re.states[0].ty);
        assert_eq!(bytes[1], re.states[0].flags);
    }

    #[test]
    fn test_any_is_reserved_but_valid() {
        // ANY is part of the byte-code format (the executor honors it) even
        // though no surface syntax currently produces it.
        assert_eq!(STATE_ANY, 11);
        let re = CompiledRegex::compile(b".", false).unwrap();
        assert_eq!(re.states[0].ty, super::STATE_DOT);
    }

    #[test]
    fn test_group_states() {
        let re = CompiledRegex::compile(b"(ab)", false).unwrap();
        assert_eq!(re.header.num_groups, 1);
        assert_eq!(re.states[0].ty, STATE_GROUP_START);
        assert_eq!(re.states[0].group_idx, 1);
        assert!(re.states.iter().any(|s| s.ty == STATE_GROUP_END));
    }
}
