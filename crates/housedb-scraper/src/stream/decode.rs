use thiserror::Error;

use super::chunks::enqueued_chunks;
use super::token::{Scalar, StreamToken};

/// Maximum array/object nesting accepted by the scanner.
pub const MAX_DEPTH: usize = 512;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DecodeError {
    #[error("malformed stream at byte {offset}: {detail}")]
    MalformedChunk { offset: usize, detail: String },

    #[error("unterminated structure opened at byte {offset}: {detail}")]
    UnterminatedStructure { offset: usize, detail: String },

    #[error("unknown marker {marker:?} at byte {offset}")]
    UnknownMarker { offset: usize, marker: String },
}

/// Decode the stream embedded in a server-rendered page.
///
/// Every `streamController.enqueue("...")` payload is unescaped and the
/// payloads are concatenated before scanning, so chunk boundaries may fall
/// anywhere, including inside a token.
///
/// # Errors
///
/// Returns a [`DecodeError`] when the page carries no stream or the stream
/// does not follow the expected grammar.
pub fn decode(html: &str) -> Result<Vec<StreamToken>, DecodeError> {
    let stream: String = enqueued_chunks(html)?.concat();
    decode_stream(&stream)
}

/// Tokenize an already-extracted logical stream.
///
/// The stream is one JSON-syntax array (the flat root) optionally followed
/// by newline-separated deferred frames `P<id>:<json>`, which are validated
/// and skipped.
///
/// # Errors
///
/// See [`decode`].
pub fn decode_stream(stream: &str) -> Result<Vec<StreamToken>, DecodeError> {
    let mut scanner = Scanner::new(stream);
    scanner.skip_whitespace();
    match scanner.peek() {
        Some(b'[') => {}
        Some(_) => return Err(scanner.malformed("stream root must be an array")),
        None => return Err(scanner.malformed("stream is empty")),
    }
    scanner.value(0)?;
    scanner.trailing_frames()?;
    Ok(scanner.tokens)
}

struct Scanner<'a> {
    src: &'a str,
    bytes: &'a [u8],
    pos: usize,
    tokens: Vec<StreamToken>,
}

impl<'a> Scanner<'a> {
    fn new(src: &'a str) -> Self {
        Self {
            src,
            bytes: src.as_bytes(),
            pos: 0,
            tokens: Vec::new(),
        }
    }

    fn peek(&self) -> Option<u8> {
        self.bytes.get(self.pos).copied()
    }

    fn skip_whitespace(&mut self) {
        while self.peek().is_some_and(|b| b.is_ascii_whitespace()) {
            self.pos += 1;
        }
    }

    fn malformed(&self, detail: &str) -> DecodeError {
        DecodeError::MalformedChunk {
            offset: self.pos,
            detail: detail.to_string(),
        }
    }

    fn unterminated(offset: usize, detail: &str) -> DecodeError {
        DecodeError::UnterminatedStructure {
            offset,
            detail: detail.to_string(),
        }
    }

    fn value(&mut self, depth: usize) -> Result<(), DecodeError> {
        self.skip_whitespace();
        let Some(byte) = self.peek() else {
            return Err(Self::unterminated(self.pos, "expected a value"));
        };
        match byte {
            b'[' => self.array(depth + 1),
            b'{' => self.object(depth + 1),
            b'"' => {
                let start = self.pos;
                let text = self.string()?;
                let token = classify_string(text, start)?;
                self.tokens.push(token);
                Ok(())
            }
            b'-' | b'0'..=b'9' => {
                let scalar = self.number()?;
                self.tokens.push(StreamToken::Primitive(scalar));
                Ok(())
            }
            b't' => self.literal("true", Scalar::Bool(true)),
            b'f' => self.literal("false", Scalar::Bool(false)),
            b'n' => self.literal("null", Scalar::Null),
            _ => Err(self.malformed("unexpected character")),
        }
    }

    fn array(&mut self, depth: usize) -> Result<(), DecodeError> {
        if depth > MAX_DEPTH {
            return Err(self.malformed("nesting too deep"));
        }
        let open = self.pos;
        self.pos += 1;
        self.tokens.push(StreamToken::ArrayOpen);
        self.skip_whitespace();
        if self.peek() == Some(b']') {
            self.pos += 1;
            self.tokens.push(StreamToken::ArrayClose);
            return Ok(());
        }
        loop {
            self.value(depth)?;
            self.skip_whitespace();
            match self.peek() {
                Some(b',') => self.pos += 1,
                Some(b']') => {
                    self.pos += 1;
                    self.tokens.push(StreamToken::ArrayClose);
                    return Ok(());
                }
                Some(_) => return Err(self.malformed("expected ',' or ']'")),
                None => return Err(Self::unterminated(open, "array is never closed")),
            }
        }
    }

    fn object(&mut self, depth: usize) -> Result<(), DecodeError> {
        if depth > MAX_DEPTH {
            return Err(self.malformed("nesting too deep"));
        }
        let open = self.pos;
        self.pos += 1;
        self.tokens.push(StreamToken::ObjectOpen);
        self.skip_whitespace();
        if self.peek() == Some(b'}') {
            self.pos += 1;
            self.tokens.push(StreamToken::ObjectClose);
            return Ok(());
        }
        loop {
            self.skip_whitespace();
            match self.peek() {
                Some(b'"') => {}
                Some(_) => return Err(self.malformed("expected an object key")),
                None => return Err(Self::unterminated(open, "object is never closed")),
            }
            let key = self.string()?;
            self.tokens.push(StreamToken::Key(key));
            self.skip_whitespace();
            match self.peek() {
                Some(b':') => self.pos += 1,
                Some(_) => return Err(self.malformed("expected ':' after key")),
                None => return Err(Self::unterminated(open, "object is never closed")),
            }
            self.value(depth)?;
            self.skip_whitespace();
            match self.peek() {
                Some(b',') => self.pos += 1,
                Some(b'}') => {
                    self.pos += 1;
                    self.tokens.push(StreamToken::ObjectClose);
                    return Ok(());
                }
                Some(_) => return Err(self.malformed("expected ',' or '}'")),
                None => return Err(Self::unterminated(open, "object is never closed")),
            }
        }
    }

    /// JSON string starting at the opening quote.
    fn string(&mut self) -> Result<String, DecodeError> {
        let open = self.pos;
        self.pos += 1;
        let mut out = String::new();
        loop {
            let Some(byte) = self.peek() else {
                return Err(Self::unterminated(open, "string is never closed"));
            };
            match byte {
                b'"' => {
                    self.pos += 1;
                    return Ok(out);
                }
                b'\\' => {
                    self.pos += 1;
                    let Some(esc) = self.peek() else {
                        return Err(Self::unterminated(open, "string is never closed"));
                    };
                    self.pos += 1;
                    match esc {
                        b'"' => out.push('"'),
                        b'\\' => out.push('\\'),
                        b'/' => out.push('/'),
                        b'b' => out.push('\u{8}'),
                        b'f' => out.push('\u{c}'),
                        b'n' => out.push('\n'),
                        b'r' => out.push('\r'),
                        b't' => out.push('\t'),
                        b'u' => {
                            let ch = self.unicode_escape(open)?;
                            out.push(ch);
                        }
                        _ => return Err(self.malformed("invalid escape in string")),
                    }
                }
                _ => {
                    // Copy the run of plain characters up to the next quote
                    // or backslash; both are ASCII so the slice stays on a
                    // char boundary.
                    let start = self.pos;
                    while self
                        .peek()
                        .is_some_and(|b| b != b'"' && b != b'\\')
                    {
                        self.pos += 1;
                    }
                    out.push_str(&self.src[start..self.pos]);
                }
            }
        }
    }

    fn hex4(&mut self, open: usize) -> Result<u32, DecodeError> {
        let end = self.pos + 4;
        let Some(digits) = self.src.as_bytes().get(self.pos..end) else {
            return Err(Self::unterminated(open, "string is never closed"));
        };
        // from_str_radix alone would accept a sign.
        if !digits.iter().all(u8::is_ascii_hexdigit) {
            return Err(self.malformed("invalid \\u escape"));
        }
        let code = u32::from_str_radix(&self.src[self.pos..end], 16)
            .map_err(|_| self.malformed("invalid \\u escape"))?;
        self.pos = end;
        Ok(code)
    }

    fn unicode_escape(&mut self, open: usize) -> Result<char, DecodeError> {
        let code = self.hex4(open)?;
        if (0xD800..0xDC00).contains(&code) && self.src[self.pos..].starts_with("\\u") {
            let saved = self.pos;
            self.pos += 2;
            let low = self.hex4(open)?;
            if (0xDC00..0xE000).contains(&low) {
                let combined = 0x10000 + ((code - 0xD800) << 10) + (low - 0xDC00);
                return Ok(char::from_u32(combined).unwrap_or(char::REPLACEMENT_CHARACTER));
            }
            self.pos = saved;
        }
        Ok(char::from_u32(code).unwrap_or(char::REPLACEMENT_CHARACTER))
    }

    fn number(&mut self) -> Result<Scalar, DecodeError> {
        let start = self.pos;
        if self.peek() == Some(b'-') {
            self.pos += 1;
        }
        let int_start = self.pos;
        self.eat_digits();
        if self.pos == int_start {
            return Err(self.malformed("expected digits"));
        }
        let mut integral = true;
        if self.peek() == Some(b'.') {
            integral = false;
            self.pos += 1;
            let frac_start = self.pos;
            self.eat_digits();
            if self.pos == frac_start {
                return Err(self.malformed("expected digits after '.'"));
            }
        }
        if matches!(self.peek(), Some(b'e' | b'E')) {
            integral = false;
            self.pos += 1;
            if matches!(self.peek(), Some(b'+' | b'-')) {
                self.pos += 1;
            }
            let exp_start = self.pos;
            self.eat_digits();
            if self.pos == exp_start {
                return Err(self.malformed("expected exponent digits"));
            }
        }
        let text = &self.src[start..self.pos];
        if integral {
            if let Ok(n) = text.parse::<i64>() {
                return Ok(Scalar::Int(n));
            }
        }
        text.parse::<f64>()
            .map(Scalar::Float)
            .map_err(|_| DecodeError::MalformedChunk {
                offset: start,
                detail: format!("invalid number {text:?}"),
            })
    }

    fn eat_digits(&mut self) {
        while self.peek().is_some_and(|b| b.is_ascii_digit()) {
            self.pos += 1;
        }
    }

    fn literal(&mut self, word: &str, scalar: Scalar) -> Result<(), DecodeError> {
        if self.src[self.pos..].starts_with(word) {
            self.pos += word.len();
            self.tokens.push(StreamToken::Primitive(scalar));
            Ok(())
        } else if word.starts_with(&self.src[self.pos..]) {
            Err(Self::unterminated(self.pos, "truncated literal"))
        } else {
            Err(self.malformed("unexpected character"))
        }
    }

    /// Validate and skip `P<id>:<json>` frames after the root array.
    fn trailing_frames(&mut self) -> Result<(), DecodeError> {
        loop {
            self.skip_whitespace();
            let Some(byte) = self.peek() else {
                return Ok(());
            };
            if byte != b'P' {
                return Err(self.malformed("unexpected content after root array"));
            }
            let frame_start = self.pos;
            self.pos += 1;
            let id_start = self.pos;
            self.eat_digits();
            if self.pos == id_start || self.peek() != Some(b':') {
                return Err(self.malformed("malformed deferred frame header"));
            }
            let id = &self.src[id_start..self.pos];
            self.pos += 1;
            let body_end = self.src[self.pos..]
                .find('\n')
                .map_or(self.src.len(), |i| self.pos + i);
            let body = &self.src[self.pos..body_end];
            if let Err(err) = serde_json::from_str::<serde::de::IgnoredAny>(body) {
                return Err(DecodeError::MalformedChunk {
                    offset: frame_start,
                    detail: format!("deferred frame P{id} is not valid JSON: {err}"),
                });
            }
            tracing::debug!(frame = id, bytes = body.len(), "skipping deferred frame");
            self.pos = body_end;
        }
    }
}

/// Interpret `$`-prefixed strings in value position.
fn classify_string(text: String, offset: usize) -> Result<StreamToken, DecodeError> {
    let Some(rest) = text.strip_prefix('$') else {
        return Ok(StreamToken::Primitive(Scalar::String(text)));
    };
    if rest.starts_with('$') {
        return Ok(StreamToken::Primitive(Scalar::String(rest.to_string())));
    }
    if let Some(message) = rest.strip_prefix('E') {
        return Ok(StreamToken::Error(message.to_string()));
    }
    if rest == "u" {
        return Ok(StreamToken::Primitive(Scalar::Null));
    }
    if !rest.is_empty() && rest.bytes().all(|b| b.is_ascii_digit()) {
        if let Some(index) = rest.parse::<usize>().ok().and_then(|n| n.checked_sub(1)) {
            return Ok(StreamToken::Reference(index));
        }
    }
    Err(DecodeError::UnknownMarker {
        offset,
        marker: text,
    })
}

#[cfg(test)]
#[path = "decode_test.rs"]
mod tests;
