//! Low-level text scanning helpers
//!
//! Shared by the plain-text and OpenMetrics parsers: byte spans over the
//! input buffer, line splitting, name/value tokenizing, and escape
//! handling. Everything operates on offsets into the original buffer so
//! accessors can return zero-copy sub-slices.

use std::borrow::Cow;

use crate::error::ParseError;
use crate::Result;

/// A byte range into the parse buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub(crate) struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    pub(crate) const EMPTY: Self = Self { start: 0, end: 0 };

    #[inline]
    pub(crate) fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    #[inline]
    pub(crate) fn slice<'a>(&self, buf: &'a [u8]) -> &'a [u8] {
        &buf[self.start..self.end]
    }

    #[inline]
    pub(crate) fn is_empty(&self) -> bool {
        self.start >= self.end
    }
}

/// Split off the next line at `pos`. Returns the line span (without the
/// newline or a trailing `\r`), the offset of the following line, and
/// whether a newline terminator was present.
pub(crate) fn next_line(buf: &[u8], pos: usize) -> (Span, usize, bool) {
    match buf[pos..].iter().position(|&b| b == b'\n') {
        Some(n) => {
            let mut end = pos + n;
            if end > pos && buf[end - 1] == b'\r' {
                end -= 1;
            }
            (Span::new(pos, end), pos + n + 1, true)
        }
        None => (Span::new(pos, buf.len()), buf.len(), false),
    }
}

#[inline]
pub(crate) fn is_name_start(b: u8) -> bool {
    b.is_ascii_alphabetic() || b == b'_' || b == b':'
}

#[inline]
pub(crate) fn is_name_char(b: u8) -> bool {
    is_name_start(b) || b.is_ascii_digit()
}

#[inline]
pub(crate) fn is_label_start(b: u8) -> bool {
    b.is_ascii_alphabetic() || b == b'_'
}

#[inline]
pub(crate) fn is_label_char(b: u8) -> bool {
    is_label_start(b) || b.is_ascii_digit()
}

/// Advance past spaces and tabs
#[inline]
pub(crate) fn skip_blank(buf: &[u8], mut pos: usize, end: usize) -> usize {
    while pos < end && (buf[pos] == b' ' || buf[pos] == b'\t') {
        pos += 1;
    }
    pos
}

/// End of the token starting at `pos` (first space or tab)
#[inline]
pub(crate) fn token_end(buf: &[u8], mut pos: usize, end: usize) -> usize {
    while pos < end && buf[pos] != b' ' && buf[pos] != b'\t' {
        pos += 1;
    }
    pos
}

/// Scan a metric name at `pos`; returns the end offset, or None if no valid
/// name starts here
pub(crate) fn scan_metric_name(buf: &[u8], pos: usize, end: usize) -> Option<usize> {
    if pos >= end || !is_name_start(buf[pos]) {
        return None;
    }
    let mut i = pos + 1;
    while i < end && is_name_char(buf[i]) {
        i += 1;
    }
    Some(i)
}

/// Scan a `{name="value",...}` block starting at the `{` at `open`.
///
/// Calls `f(name_span, raw_value_span)` for each pair; value spans are the
/// raw (still escaped) bytes between the quotes. In strict mode (OpenMetrics)
/// no blanks are allowed around separators and a trailing comma is an error.
/// Returns the offset just past the closing `}`.
pub(crate) fn scan_label_block<F>(
    buf: &[u8],
    open: usize,
    end: usize,
    strict: bool,
    mut f: F,
) -> Result<usize>
where
    F: FnMut(Span, Span) -> Result<()>,
{
    debug_assert_eq!(buf[open], b'{');
    let mut pos = open + 1;
    let mut after_comma = false;

    loop {
        if !strict {
            pos = skip_blank(buf, pos, end);
        }
        if pos >= end {
            return Err(ParseError::syntax(open, "unterminated label set"));
        }
        if buf[pos] == b'}' {
            if strict && after_comma {
                return Err(ParseError::syntax(pos, "trailing comma in label set"));
            }
            return Ok(pos + 1);
        }

        // Label name
        if !is_label_start(buf[pos]) {
            return Err(ParseError::syntax(pos, "invalid label name"));
        }
        let name_start = pos;
        pos += 1;
        while pos < end && is_label_char(buf[pos]) {
            pos += 1;
        }
        let name = Span::new(name_start, pos);

        if !strict {
            pos = skip_blank(buf, pos, end);
        }
        if pos >= end || buf[pos] != b'=' {
            return Err(ParseError::syntax(pos, "expected '=' after label name"));
        }
        pos += 1;
        if !strict {
            pos = skip_blank(buf, pos, end);
        }
        if pos >= end || buf[pos] != b'"' {
            return Err(ParseError::syntax(pos, "expected quoted label value"));
        }
        pos += 1;

        // Raw value bytes between the quotes; escapes validated here,
        // decoded later on demand.
        let value_start = pos;
        loop {
            if pos >= end {
                return Err(ParseError::syntax(value_start, "unterminated label value"));
            }
            match buf[pos] {
                b'"' => break,
                b'\\' => {
                    if pos + 1 >= end {
                        return Err(ParseError::InvalidEscape { offset: pos });
                    }
                    match buf[pos + 1] {
                        b'\\' | b'"' | b'n' => pos += 2,
                        _ => return Err(ParseError::InvalidEscape { offset: pos }),
                    }
                }
                _ => pos += 1,
            }
        }
        let value = Span::new(value_start, pos);
        pos += 1; // closing quote

        f(name, value)?;

        if !strict {
            pos = skip_blank(buf, pos, end);
        }
        match buf.get(pos) {
            Some(b',') => {
                pos += 1;
                after_comma = true;
            }
            Some(b'}') => {
                return Ok(pos + 1);
            }
            _ => {
                return Err(ParseError::syntax(pos, "expected ',' or '}' in label set"));
            }
        }
    }
}

/// Parse a float sample value. Accepts `+Inf`/`-Inf`/`NaN` spellings.
pub(crate) fn parse_float(buf: &[u8], span: Span) -> Result<f64> {
    let s = std::str::from_utf8(span.slice(buf)).map_err(|_| ParseError::InvalidUtf8 {
        offset: span.start,
    })?;
    if s.is_empty() {
        return Err(ParseError::InvalidValue { offset: span.start });
    }
    s.parse::<f64>()
        .map_err(|_| ParseError::InvalidValue { offset: span.start })
}

/// Parse a millisecond integer timestamp (plain text format)
pub(crate) fn parse_timestamp_ms(buf: &[u8], span: Span) -> Result<i64> {
    let s = std::str::from_utf8(span.slice(buf)).map_err(|_| ParseError::InvalidUtf8 {
        offset: span.start,
    })?;
    s.parse::<i64>().map_err(|_| ParseError::InvalidTimestamp {
        offset: span.start,
    })
}

/// Parse a second-resolution float timestamp (OpenMetrics) into
/// milliseconds
pub(crate) fn parse_timestamp_seconds(buf: &[u8], span: Span) -> Result<i64> {
    let seconds = parse_float(buf, span).map_err(|_| ParseError::InvalidTimestamp {
        offset: span.start,
    })?;
    if !seconds.is_finite() {
        return Err(ParseError::InvalidTimestamp { offset: span.start });
    }
    Ok((seconds * 1000.0) as i64)
}

/// Decode a validated label value: `\\`, `\"` and `\n` escapes
pub(crate) fn unescape_label_value(raw: &str) -> Cow<'_, str> {
    if !raw.contains('\\') {
        return Cow::Borrowed(raw);
    }
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('\\') => out.push('\\'),
            Some('"') => out.push('"'),
            Some('n') => out.push('\n'),
            Some(other) => {
                out.push('\\');
                out.push(other);
            }
            None => out.push('\\'),
        }
    }
    Cow::Owned(out)
}

/// Decode help text escapes (`\\` and `\n`) into `out`, leaving unknown
/// sequences verbatim
pub(crate) fn unescape_help_into(raw: &[u8], out: &mut Vec<u8>) {
    out.clear();
    let mut i = 0;
    while i < raw.len() {
        if raw[i] == b'\\' && i + 1 < raw.len() {
            match raw[i + 1] {
                b'\\' => {
                    out.push(b'\\');
                    i += 2;
                    continue;
                }
                b'n' => {
                    out.push(b'\n');
                    i += 2;
                    continue;
                }
                _ => {}
            }
        }
        out.push(raw[i]);
        i += 1;
    }
}

/// True when the bytes contain an escape that needs decoding
#[inline]
pub(crate) fn needs_unescape(raw: &[u8]) -> bool {
    raw.contains(&b'\\')
}
