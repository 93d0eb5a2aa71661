//! Locating `streamController.enqueue(...)` calls in page HTML and decoding
//! their JavaScript string-literal arguments.

use super::decode::DecodeError;

const ENQUEUE_CALL: &str = "streamController.enqueue(";

/// Unescaped payloads of every enqueue call, in source order.
///
/// # Errors
///
/// [`DecodeError::MalformedChunk`] when the page has no enqueue call or a
/// call's argument is not a string literal, and
/// [`DecodeError::UnterminatedStructure`] when a literal runs off the end of
/// the page.
pub fn enqueued_chunks(html: &str) -> Result<Vec<String>, DecodeError> {
    let mut chunks = Vec::new();
    let mut cursor = 0;
    while let Some(found) = html[cursor..].find(ENQUEUE_CALL) {
        let call_start = cursor + found;
        let mut pos = call_start + ENQUEUE_CALL.len();
        pos = skip_whitespace(html, pos);
        let (chunk, after) = read_js_string(html, pos)?;
        let close = skip_whitespace(html, after);
        if html.as_bytes().get(close) != Some(&b')') {
            return Err(DecodeError::MalformedChunk {
                offset: close,
                detail: "expected ')' after enqueue argument".to_string(),
            });
        }
        chunks.push(chunk);
        cursor = close + 1;
    }
    if chunks.is_empty() {
        return Err(DecodeError::MalformedChunk {
            offset: 0,
            detail: "no streamController.enqueue call found".to_string(),
        });
    }
    Ok(chunks)
}

fn skip_whitespace(src: &str, mut pos: usize) -> usize {
    let bytes = src.as_bytes();
    while bytes.get(pos).is_some_and(u8::is_ascii_whitespace) {
        pos += 1;
    }
    pos
}

/// Read a single- or double-quoted JavaScript string literal starting at
/// `start`. Returns the decoded text and the byte offset just past the
/// closing quote.
fn read_js_string(src: &str, start: usize) -> Result<(String, usize), DecodeError> {
    let quote = match src.as_bytes().get(start) {
        Some(q @ (b'"' | b'\'')) => char::from(*q),
        _ => {
            return Err(DecodeError::MalformedChunk {
                offset: start,
                detail: "enqueue argument is not a string literal".to_string(),
            })
        }
    };

    let mut out = String::new();
    let mut chars = src[start + 1..].char_indices().peekable();
    while let Some((rel, ch)) = chars.next() {
        let at = start + 1 + rel;
        match ch {
            c if c == quote => return Ok((out, at + 1)),
            '\\' => {
                let Some((_, esc)) = chars.next() else {
                    break;
                };
                match esc {
                    'n' => out.push('\n'),
                    'r' => out.push('\r'),
                    't' => out.push('\t'),
                    'b' => out.push('\u{8}'),
                    'f' => out.push('\u{c}'),
                    'v' => out.push('\u{b}'),
                    '0' => out.push('\0'),
                    // line continuation
                    '\n' | '\u{2028}' | '\u{2029}' => {}
                    '\r' => {
                        if chars.peek().is_some_and(|(_, c)| *c == '\n') {
                            chars.next();
                        }
                    }
                    'x' => {
                        let code = take_hex(&mut chars, 2).ok_or_else(|| bad_escape(at))?;
                        out.push(char::from_u32(code).ok_or_else(|| bad_escape(at))?);
                    }
                    'u' => {
                        let code = read_unicode_escape(&mut chars).ok_or_else(|| bad_escape(at))?;
                        push_code_unit(&mut out, &mut chars, code, at)?;
                    }
                    other => out.push(other),
                }
            }
            '\n' => {
                return Err(DecodeError::MalformedChunk {
                    offset: at,
                    detail: "raw newline inside string literal".to_string(),
                })
            }
            other => out.push(other),
        }
    }
    Err(DecodeError::UnterminatedStructure {
        offset: start,
        detail: "string literal is never closed".to_string(),
    })
}

type Chars<'a> = std::iter::Peekable<std::str::CharIndices<'a>>;

fn take_hex(chars: &mut Chars<'_>, len: usize) -> Option<u32> {
    let mut code = 0u32;
    for _ in 0..len {
        let (_, c) = chars.next()?;
        code = code * 16 + c.to_digit(16)?;
    }
    Some(code)
}

/// `\uHHHH` or `\u{H...}`; the leading `\u` is already consumed.
fn read_unicode_escape(chars: &mut Chars<'_>) -> Option<u32> {
    if chars.peek().is_some_and(|(_, c)| *c == '{') {
        chars.next();
        let mut code = 0u32;
        let mut digits = 0;
        loop {
            let (_, c) = chars.next()?;
            if c == '}' {
                break;
            }
            code = code.checked_mul(16)?.checked_add(c.to_digit(16)?)?;
            digits += 1;
        }
        (digits > 0 && code <= 0x0010_FFFF).then_some(code)
    } else {
        take_hex(chars, 4)
    }
}

/// Push a UTF-16 code unit, pairing a high surrogate with a following
/// `\uDC00..=\uDFFF` escape. Unpaired surrogates become U+FFFD.
fn push_code_unit(
    out: &mut String,
    chars: &mut Chars<'_>,
    code: u32,
    at: usize,
) -> Result<(), DecodeError> {
    if (0xD800..0xDC00).contains(&code) {
        let mut lookahead = chars.clone();
        let low = match (lookahead.next(), lookahead.next()) {
            (Some((_, '\\')), Some((_, 'u'))) => read_unicode_escape(&mut lookahead),
            _ => None,
        };
        if let Some(low @ 0xDC00..=0xDFFF) = low {
            *chars = lookahead;
            let combined = 0x10000 + ((code - 0xD800) << 10) + (low - 0xDC00);
            out.push(char::from_u32(combined).ok_or_else(|| bad_escape(at))?);
        } else {
            out.push(char::REPLACEMENT_CHARACTER);
        }
        return Ok(());
    }
    out.push(char::from_u32(code).unwrap_or(char::REPLACEMENT_CHARACTER));
    Ok(())
}

fn bad_escape(offset: usize) -> DecodeError {
    DecodeError::MalformedChunk {
        offset,
        detail: "invalid escape sequence in string literal".to_string(),
    }
}
