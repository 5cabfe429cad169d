//! Brace, quote, and comment aware scanning primitives.
//!
//! Rules never parse the files they patch. Instead they ask this module two
//! questions: "where does this block end?" and "is this textual match real
//! code, or is it inside a string literal or a comment?". Both answers come
//! from one state machine over the raw bytes of a file.
//!
//! The machine tracks at most one active lexical state at a time:
//!
//! - single-quoted string (`'...'`)
//! - double-quoted string (`"..."`)
//! - line comment (`// ...` up to the next newline)
//! - block comment (`/* ... */`)
//!
//! Inside a string, a backslash escapes the following byte, so `"a \" b"` is a
//! single literal. Quotes of the opposite kind inside a string are ordinary
//! characters (`"it's"` does not open a single-quoted string), and comment
//! markers inside strings are ordinary characters too.
//!
//! All offsets are byte offsets. Every structural character is ASCII, so
//! multi-byte UTF-8 sequences can never be mistaken for one.
//!
//! ```
//! use source_patch::lexer::{find_matching_close, is_inside_string_or_comment};
//!
//! let src = r#"try { let s = "a } b"; } "#;
//! let close = find_matching_close(src, 4).unwrap();
//! assert_eq!(close, 23);
//! assert!(is_inside_string_or_comment(src, src.find("} b").unwrap()));
//! ```

use std::ops::Range;

/// Quote state at a scan position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum QuoteState {
    #[default]
    None,
    Single,
    Double,
}

/// Comment state at a scan position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CommentState {
    #[default]
    None,
    Line,
    Block,
}

/// An offset into a file's content together with its lexical context.
///
/// The quote and comment states are mutually exclusive: at most one of them
/// is ever active.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ScanPosition {
    pub offset: usize,
    pub quote: QuoteState,
    pub comment: CommentState,
}

impl ScanPosition {
    /// Returns true if the position is structural code (no quote or comment).
    pub fn is_code(&self) -> bool {
        self.quote == QuoteState::None && self.comment == CommentState::None
    }
}

/// Active state of the machine. Only one variant can be live at a time,
/// which is what keeps quotes and comments mutually exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum LexState {
    #[default]
    Code,
    SingleQuote,
    DoubleQuote,
    LineComment,
    BlockComment,
}

impl LexState {
    fn to_position(self, offset: usize) -> ScanPosition {
        let (quote, comment) = match self {
            LexState::Code => (QuoteState::None, CommentState::None),
            LexState::SingleQuote => (QuoteState::Single, CommentState::None),
            LexState::DoubleQuote => (QuoteState::Double, CommentState::None),
            LexState::LineComment => (QuoteState::None, CommentState::Line),
            LexState::BlockComment => (QuoteState::None, CommentState::Block),
        };
        ScanPosition {
            offset,
            quote,
            comment,
        }
    }
}

/// Consumes one token starting at `i` and returns its length and the state
/// after it. Tokens are one byte, except `//`, `/*`, `*/`, and escapes inside
/// strings, which are two bytes.
fn step(bytes: &[u8], i: usize, state: LexState) -> (usize, LexState) {
    let ch = bytes[i];
    let next = bytes.get(i + 1).copied();
    let pair = if next.is_some() { 2 } else { 1 };

    match state {
        LexState::LineComment => {
            if ch == b'\n' {
                (1, LexState::Code)
            } else {
                (1, state)
            }
        }
        LexState::BlockComment => {
            if ch == b'*' && next == Some(b'/') {
                (2, LexState::Code)
            } else {
                (1, state)
            }
        }
        LexState::SingleQuote | LexState::DoubleQuote => {
            let terminator = if state == LexState::SingleQuote {
                b'\''
            } else {
                b'"'
            };
            if ch == b'\\' {
                (pair, state)
            } else if ch == terminator {
                (1, LexState::Code)
            } else {
                (1, state)
            }
        }
        LexState::Code => match (ch, next) {
            (b'/', Some(b'/')) => (2, LexState::LineComment),
            (b'/', Some(b'*')) => (2, LexState::BlockComment),
            (b'\'', _) => (1, LexState::SingleQuote),
            (b'"', _) => (1, LexState::DoubleQuote),
            _ => (1, LexState::Code),
        },
    }
}

/// Incremental scanner for answering many "is this offset code?" queries
/// over the same content.
///
/// Queries are cheapest when issued in ascending offset order; a query
/// before the current cursor restarts the scan from the beginning.
pub struct Scanner<'a> {
    bytes: &'a [u8],
    cursor: usize,
    state: LexState,
}

impl<'a> Scanner<'a> {
    /// Creates a scanner positioned at the start of `content`.
    pub fn new(content: &'a str) -> Self {
        Self {
            bytes: content.as_bytes(),
            cursor: 0,
            state: LexState::Code,
        }
    }

    /// Returns the lexical context at `offset`.
    ///
    /// An offset that falls in the middle of a two-byte token (the second
    /// slash of `//`, the slash of `*/`, an escaped character) is reported
    /// as inside a comment or string.
    pub fn position(&mut self, offset: usize) -> ScanPosition {
        let offset = offset.min(self.bytes.len());
        if offset < self.cursor {
            self.cursor = 0;
            self.state = LexState::Code;
        }

        while self.cursor < offset {
            let (len, next_state) = step(self.bytes, self.cursor, self.state);
            if self.cursor + len > offset {
                // Straddled token: the offset sits inside it.
                let inside = if next_state == LexState::Code {
                    self.state
                } else {
                    next_state
                };
                return inside.to_position(offset);
            }
            self.cursor += len;
            self.state = next_state;
        }

        self.state.to_position(offset)
    }

    /// Returns true if `offset` is inside a quote or comment.
    pub fn is_inside_string_or_comment(&mut self, offset: usize) -> bool {
        !self.position(offset).is_code()
    }
}

/// Lexical view of a file whose code lives in separate regions, such as the
/// PHP blocks of a template or the `<script>` bodies of a page.
///
/// Each region is scanned on its own, starting in the code state, so quotes
/// and comment markers in the surrounding markup never leak into it. An
/// offset outside every region is not code.
pub struct CodeMap<'a> {
    content: &'a str,
    regions: Vec<Range<usize>>,
    scanners: Vec<Scanner<'a>>,
}

impl<'a> CodeMap<'a> {
    /// Treats all of `content` as one code region.
    pub fn whole(content: &'a str) -> Self {
        Self::new(content, vec![0..content.len()])
    }

    /// Creates a map over non-overlapping `regions` of `content`.
    pub fn new(content: &'a str, mut regions: Vec<Range<usize>>) -> Self {
        regions.sort_by_key(|r| r.start);
        let scanners = regions
            .iter()
            .map(|r| Scanner::new(&content[r.clone()]))
            .collect();
        Self {
            content,
            regions,
            scanners,
        }
    }

    pub fn regions(&self) -> &[Range<usize>] {
        &self.regions
    }

    /// A region's end offset belongs to it: text spliced right after the
    /// last byte of a block is still inside that block.
    fn region_index(&self, offset: usize) -> Option<usize> {
        self.regions
            .iter()
            .position(|r| r.start <= offset && offset <= r.end)
    }

    /// Returns the lexical context at `offset`, or `None` when the offset
    /// lies outside every code region.
    pub fn position(&mut self, offset: usize) -> Option<ScanPosition> {
        let index = self.region_index(offset)?;
        let start = self.regions[index].start;
        let mut position = self.scanners[index].position(offset - start);
        position.offset = offset;
        Some(position)
    }

    /// Returns true if `offset` is structural code.
    pub fn is_code(&mut self, offset: usize) -> bool {
        self.position(offset).is_some_and(|p| p.is_code())
    }

    /// Finds the `}` matching the `{` at `open` without leaving its region.
    pub fn matching_close(&self, open: usize) -> Option<usize> {
        let region = &self.regions[self.region_index(open)?];
        find_matching_close(&self.content[region.clone()], open - region.start)
            .map(|close| close + region.start)
    }

    /// Returns the content up to the end of the region holding `offset`.
    pub fn through_region(&self, offset: usize) -> &'a str {
        match self.region_index(offset) {
            Some(index) => &self.content[..self.regions[index].end],
            None => &self.content[..offset.min(self.content.len())],
        }
    }
}

/// Reports whether `offset` lies inside a string literal or comment.
pub fn is_inside_string_or_comment(content: &str, offset: usize) -> bool {
    Scanner::new(content).is_inside_string_or_comment(offset)
}

/// Finds the `}` matching the `{` at `open`.
///
/// Only braces seen outside strings and comments change the nesting depth.
/// Returns `None` when `open` is not a `{` or the braces are unbalanced.
pub fn find_matching_close(content: &str, open: usize) -> Option<usize> {
    let bytes = content.as_bytes();
    if bytes.get(open) != Some(&b'{') {
        return None;
    }

    let mut depth = 0usize;
    let mut state = LexState::Code;
    let mut i = open;
    while i < bytes.len() {
        if state == LexState::Code {
            match bytes[i] {
                b'{' => depth += 1,
                b'}' => {
                    depth -= 1;
                    if depth == 0 {
                        return Some(i);
                    }
                }
                _ => {}
            }
        }
        let (len, next_state) = step(bytes, i, state);
        i += len;
        state = next_state;
    }

    None
}

/// Advances past whitespace and both comment forms, returning the offset of
/// the next real token (or the content length).
pub fn skip_whitespace_and_comments(content: &str, offset: usize) -> usize {
    let bytes = content.as_bytes();
    let mut i = offset.min(bytes.len());

    loop {
        while i < bytes.len() && bytes[i].is_ascii_whitespace() {
            i += 1;
        }
        if bytes[i..].starts_with(b"//") {
            match bytes[i..].iter().position(|&b| b == b'\n') {
                Some(nl) => i += nl + 1,
                None => return bytes.len(),
            }
        } else if bytes[i..].starts_with(b"/*") {
            match content[i + 2..].find("*/") {
                Some(end) => i += 2 + end + 2,
                None => return bytes.len(),
            }
        } else {
            return i;
        }
    }
}

/// Returns the leading whitespace of the line containing `offset`.
pub fn line_indent(content: &str, offset: usize) -> &str {
    let offset = offset.min(content.len());
    let line_start = content[..offset].rfind('\n').map(|nl| nl + 1).unwrap_or(0);
    let rest = &content[line_start..];
    let width = rest
        .bytes()
        .take_while(|b| *b == b' ' || *b == b'\t')
        .count();
    &rest[..width]
}
