//! Byte-faithful decoding of source files.
//!
//! Legacy trees often mix UTF-8 with single-byte code pages. A file that is
//! not valid UTF-8 is decoded one byte per character (ISO-8859-1), which maps
//! back to the identical bytes on write. Every structural character the rules
//! look for is ASCII, so scanning and splicing behave the same either way.

/// How a file's bytes were turned into text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TextEncoding {
    #[default]
    Utf8,
    /// One character per byte; round-trips arbitrary bytes.
    Latin1,
}

impl TextEncoding {
    /// Decodes `bytes`, falling back to [`TextEncoding::Latin1`] when they
    /// are not valid UTF-8.
    pub fn decode(bytes: Vec<u8>) -> (String, TextEncoding) {
        match String::from_utf8(bytes) {
            Ok(text) => (text, TextEncoding::Utf8),
            Err(e) => {
                let text = e.into_bytes().into_iter().map(char::from).collect();
                (text, TextEncoding::Latin1)
            }
        }
    }

    /// Encodes `text` for writing. Returns `None` when a character has no
    /// single-byte form under [`TextEncoding::Latin1`].
    pub fn encode(self, text: &str) -> Option<Vec<u8>> {
        match self {
            TextEncoding::Utf8 => Some(text.as_bytes().to_vec()),
            TextEncoding::Latin1 => text.chars().map(|c| u8::try_from(c).ok()).collect(),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TextEncoding::Utf8 => "utf-8",
            TextEncoding::Latin1 => "latin-1",
        }
    }
}
