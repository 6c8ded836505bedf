//! Escaping and tokenization for the wire grammar.
//!
//! Escaping is a single `\` prefix per protected character; decoding strips
//! exactly one layer. Tokenization walks a decoded frame and splits on
//! unescaped delimiters only.

use super::{ProtocolError, DLM, EOM, ESC};

/// Characters that must be escaped inside a key label: everything that the
/// key and message tokenizers split on.
pub const KEY_SPECIALS: &[char] = &[ESC, EOM, DLM, '|', ']', '}'];

/// Characters that must be escaped inside free text and value payloads,
/// which are only ever read up to the closing brace.
pub const TEXT_SPECIALS: &[char] = &[EOM, ESC, '}'];

/// Prefixes every occurrence of a special character with the escape
/// character. Applying this to a string without specials is the identity.
pub fn add_escapes(input: &str, specials: &[char]) -> String {
    let mut out = String::with_capacity(input.len());
    for ch in input.chars() {
        if specials.contains(&ch) {
            out.push(ESC);
        }
        out.push(ch);
    }
    out
}

/// Removes one layer of escaping: every `ESC` + char pair becomes the char.
/// A trailing lone `ESC` is dropped.
pub fn strip_escapes(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut chars = input.chars();
    while let Some(ch) = chars.next() {
        if ch == ESC {
            if let Some(next) = chars.next() {
                out.push(next);
            }
        } else {
            out.push(ch);
        }
    }
    out
}

/// Byte index of the first unescaped occurrence of `delim`, if any.
pub fn find_unescaped(input: &str, delim: char) -> Option<usize> {
    let mut escaped = false;
    for (i, ch) in input.char_indices() {
        if escaped {
            escaped = false;
        } else if ch == ESC {
            escaped = true;
        } else if ch == delim {
            return Some(i);
        }
    }
    None
}

/// Cursor over a frame that consumes tokens up to unescaped delimiters.
pub struct TokenStream<'a> {
    rest: &'a str,
}

impl<'a> TokenStream<'a> {
    pub fn new(input: &'a str) -> Self {
        Self { rest: input }
    }

    /// Returns the raw (still-escaped) slice up to the first unescaped
    /// `delim` and consumes both. Errors if the delimiter never appears.
    pub fn until(&mut self, delim: char) -> Result<&'a str, ProtocolError> {
        let idx =
            find_unescaped(self.rest, delim).ok_or(ProtocolError::MissingDelimiter(delim))?;
        let tok = &self.rest[..idx];
        self.rest = &self.rest[idx + delim.len_utf8()..];
        Ok(tok)
    }

    /// Next space-delimited field.
    pub fn field(&mut self) -> Result<&'a str, ProtocolError> {
        self.until(DLM)
    }

    /// Next space-delimited field parsed as a sender/target index.
    pub fn index(&mut self) -> Result<i32, ProtocolError> {
        let tok = self.field()?;
        tok.parse()
            .map_err(|_| ProtocolError::BadIndex(tok.to_string()))
    }

    /// Everything not yet consumed.
    pub fn remainder(&self) -> &'a str {
        self.rest
    }
}
