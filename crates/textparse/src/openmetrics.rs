//! OpenMetrics text parser
//!
//! Stricter grammar than the plain text format: single-space separators,
//! `# HELP|TYPE|UNIT` metadata only, no free-form comments or blank lines,
//! and a mandatory `# EOF` terminator. Timestamps are second-resolution
//! floats. Samples may carry one exemplar suffix, and counter, summary and
//! histogram families may expose a `_created` series that surfaces through
//! `created_timestamp`.

use std::sync::Arc;

use crate::entry::{EntryKind, MetricType};
use crate::error::ParseError;
use crate::histogram::HistogramValue;
use crate::labels::{Exemplar, Labels, METRIC_NAME_LABEL};
use crate::parser::{Parser, ParserState};
use crate::scan::{self, Span};
use crate::symbols::SymbolTable;
use crate::Result;

const CREATED_SUFFIX: &[u8] = b"_created";

/// Parser for the OpenMetrics text format
pub struct OpenMetricsParser<'a> {
    buf: &'a [u8],
    symbols: Arc<SymbolTable>,
    state: ParserState,
    pos: usize,
    skip_created_series: bool,
    saw_eof: bool,

    // Family context from the last metadata line
    family_name: Span,
    family_type: MetricType,

    // Current entry
    series: Span,
    name: Span,
    label_block: Option<usize>,
    text: Span,
    mtype: MetricType,
    value: f64,
    ts: Option<i64>,

    // Exemplar suffix of the current sample
    ex_label_open: Option<usize>,
    ex_block_end: usize,
    ex_value: f64,
    ex_ts: Option<i64>,
    ex_present: bool,
    ex_served: bool,

    scratch: Vec<u8>,
    scratch_used: bool,
}

impl<'a> OpenMetricsParser<'a> {
    /// Create a parser over the full payload in `buf`.
    ///
    /// With `skip_created_series` set, `_created` series of families that
    /// support created timestamps are not emitted as standalone samples;
    /// they remain visible to [`Parser::created_timestamp`].
    pub fn new(buf: &'a [u8], symbols: Arc<SymbolTable>, skip_created_series: bool) -> Self {
        Self {
            buf,
            symbols,
            state: ParserState::Fresh,
            pos: 0,
            skip_created_series,
            saw_eof: false,
            family_name: Span::EMPTY,
            family_type: MetricType::Unknown,
            series: Span::EMPTY,
            name: Span::EMPTY,
            label_block: None,
            text: Span::EMPTY,
            mtype: MetricType::Unknown,
            value: 0.0,
            ts: None,
            ex_label_open: None,
            ex_block_end: 0,
            ex_value: 0.0,
            ex_ts: None,
            ex_present: false,
            ex_served: false,
            scratch: Vec::new(),
            scratch_used: false,
        }
    }

    fn scan_next(&mut self) -> Result<Option<EntryKind>> {
        loop {
            if self.saw_eof {
                return Ok(None);
            }
            if self.pos >= self.buf.len() {
                return Err(ParseError::MissingEofMarker);
            }
            let (line, next, _) = scan::next_line(self.buf, self.pos);
            self.pos = next;

            if line.is_empty() {
                return Err(ParseError::syntax(line.start, "unexpected blank line"));
            }
            if self.buf[line.start] == b'#' {
                match self.scan_metadata(line)? {
                    Some(kind) => return Ok(Some(kind)),
                    None => return Ok(None), // # EOF
                }
            } else if self.scan_series(line)? {
                return Ok(Some(EntryKind::Series));
            }
            // A suppressed _created series; keep scanning.
        }
    }

    /// Parse a `# KEYWORD ...` line. Returns None for `# EOF`.
    fn scan_metadata(&mut self, line: Span) -> Result<Option<EntryKind>> {
        let buf = self.buf;
        let (start, end) = (line.start, line.end);
        if start + 1 >= end || buf[start + 1] != b' ' {
            return Err(ParseError::syntax(start, "expected space after '#'"));
        }
        let kw_start = start + 2;
        let kw_end = scan::token_end(buf, kw_start, end);

        match &buf[kw_start..kw_end] {
            b"EOF" => {
                if scan::skip_blank(buf, kw_end, end) != end {
                    return Err(ParseError::syntax(kw_end, "unexpected data after # EOF"));
                }
                // The marker must terminate the payload.
                if self.pos < buf.len() {
                    return Err(ParseError::syntax(self.pos, "unexpected data after # EOF"));
                }
                self.saw_eof = true;
                Ok(None)
            }
            b"HELP" => {
                let (name, text) = self.scan_meta_tail(kw_end, end)?;
                self.set_family(name);
                self.name = name;
                self.text = text;
                let raw = text.slice(buf);
                self.scratch_used = scan::needs_unescape(raw);
                if self.scratch_used {
                    scan::unescape_help_into(raw, &mut self.scratch);
                }
                Ok(Some(EntryKind::Help))
            }
            b"TYPE" => {
                let (name, tok) = self.scan_meta_tail(kw_end, end)?;
                let token = tok.slice(buf);
                // `untyped` is a legacy spelling; OpenMetrics says `unknown`.
                let mtype = match MetricType::from_token(token) {
                    Some(t) if token != b"untyped" => t,
                    _ => {
                        return Err(ParseError::InvalidMetricType {
                            offset: tok.start,
                            found: String::from_utf8_lossy(token).into_owned(),
                        })
                    }
                };
                self.name = name;
                self.family_name = name;
                self.family_type = mtype;
                self.mtype = mtype;
                Ok(Some(EntryKind::Type))
            }
            b"UNIT" => {
                let (name, unit) = self.scan_meta_tail(kw_end, end)?;
                let name_bytes = name.slice(buf);
                let unit_bytes = unit.slice(buf);
                if unit_bytes.is_empty() || !name_bytes.ends_with(unit_bytes) {
                    return Err(ParseError::syntax(
                        unit.start,
                        "unit is not a suffix of the metric name",
                    ));
                }
                self.set_family(name);
                self.name = name;
                self.text = unit;
                self.scratch_used = false;
                Ok(Some(EntryKind::Unit))
            }
            other => Err(ParseError::syntax(
                kw_start,
                format!("invalid metadata keyword {:?}", String::from_utf8_lossy(other)),
            )),
        }
    }

    /// Track the family named by a metadata line; a new family name resets
    /// the declared type
    fn set_family(&mut self, name: Span) {
        if name.slice(self.buf) != self.family_name.slice(self.buf) {
            self.family_type = MetricType::Unknown;
        }
        self.family_name = name;
    }

    /// `<space> name <space> rest-of-line` after a metadata keyword
    fn scan_meta_tail(&mut self, kw_end: usize, end: usize) -> Result<(Span, Span)> {
        let buf = self.buf;
        if kw_end >= end || buf[kw_end] != b' ' {
            return Err(ParseError::syntax(kw_end, "expected space after keyword"));
        }
        let name_start = kw_end + 1;
        let name_end = scan::scan_metric_name(buf, name_start, end)
            .ok_or_else(|| ParseError::syntax(name_start, "expected metric name"))?;
        let name = Span::new(name_start, name_end);

        if name_end >= end {
            return Ok((name, Span::new(end, end)));
        }
        if buf[name_end] != b' ' {
            return Err(ParseError::syntax(name_end, "expected space after metric name"));
        }
        Ok((name, Span::new(name_end + 1, end)))
    }

    /// Parse a sample line. Returns false when the line was a suppressed
    /// `_created` series.
    fn scan_series(&mut self, line: Span) -> Result<bool> {
        let buf = self.buf;
        let (start, end) = (line.start, line.end);
        self.ex_present = false;
        self.ex_served = false;

        let name_end = scan::scan_metric_name(buf, start, end)
            .ok_or_else(|| ParseError::syntax(start, "expected metric name"))?;
        self.name = Span::new(start, name_end);

        let mut pos = name_end;
        self.label_block = None;
        if pos < end && buf[pos] == b'{' {
            self.label_block = Some(pos);
            pos = scan::scan_label_block(buf, pos, end, true, |n, v| {
                std::str::from_utf8(n.slice(buf))
                    .map_err(|_| ParseError::InvalidUtf8 { offset: n.start })?;
                std::str::from_utf8(v.slice(buf))
                    .map_err(|_| ParseError::InvalidUtf8 { offset: v.start })?;
                Ok(())
            })?;
        }
        self.series = Span::new(start, pos);
        std::str::from_utf8(self.series.slice(buf))
            .map_err(|_| ParseError::InvalidUtf8 { offset: start })?;

        pos = self.expect_space(pos, end)?;
        let value_end = scan::token_end(buf, pos, end);
        self.value = scan::parse_float(buf, Span::new(pos, value_end))?;
        pos = value_end;

        self.ts = None;
        if pos < end {
            pos = self.expect_space(pos, end)?;
            if buf[pos] != b'#' {
                let ts_end = scan::token_end(buf, pos, end);
                self.ts = Some(scan::parse_timestamp_seconds(buf, Span::new(pos, ts_end))?);
                pos = ts_end;
                if pos < end {
                    pos = self.expect_space(pos, end)?;
                }
            }
            if pos < end {
                if buf[pos] != b'#' {
                    return Err(ParseError::syntax(pos, "expected exemplar separator '#'"));
                }
                self.scan_exemplar(pos + 1, end)?;
            }
        }

        if self.skip_created_series && self.is_created_series() {
            return Ok(false);
        }
        Ok(true)
    }

    /// `{labels} value [ts]` after the `#` separator
    fn scan_exemplar(&mut self, pos: usize, end: usize) -> Result<()> {
        let buf = self.buf;
        let mut pos = self.expect_space(pos, end)?;
        if pos >= end || buf[pos] != b'{' {
            return Err(ParseError::syntax(pos, "expected exemplar label set"));
        }
        self.ex_label_open = Some(pos);
        pos = scan::scan_label_block(buf, pos, end, true, |n, v| {
            std::str::from_utf8(n.slice(buf))
                .map_err(|_| ParseError::InvalidUtf8 { offset: n.start })?;
            std::str::from_utf8(v.slice(buf))
                .map_err(|_| ParseError::InvalidUtf8 { offset: v.start })?;
            Ok(())
        })?;
        self.ex_block_end = pos;

        pos = self.expect_space(pos, end)?;
        let value_end = scan::token_end(buf, pos, end);
        self.ex_value = scan::parse_float(buf, Span::new(pos, value_end))?;
        pos = value_end;

        self.ex_ts = None;
        if pos < end {
            pos = self.expect_space(pos, end)?;
            let ts_end = scan::token_end(buf, pos, end);
            self.ex_ts = Some(scan::parse_timestamp_seconds(buf, Span::new(pos, ts_end))?);
            pos = ts_end;
        }
        if pos != end {
            return Err(ParseError::syntax(pos, "unexpected data after exemplar"));
        }
        self.ex_present = true;
        Ok(())
    }

    /// Exactly one space, then a non-space
    fn expect_space(&self, pos: usize, end: usize) -> Result<usize> {
        if pos >= end || self.buf[pos] != b' ' {
            return Err(ParseError::syntax(pos, "expected space"));
        }
        let next = pos + 1;
        if next >= end || self.buf[next] == b' ' {
            return Err(ParseError::syntax(next, "expected token after space"));
        }
        Ok(next)
    }

    /// True when the current series is `<family>_created` for a family type
    /// that supports created timestamps
    fn is_created_series(&self) -> bool {
        if !self.family_type.supports_created_timestamp() || self.family_name.is_empty() {
            return false;
        }
        let name = self.name.slice(self.buf);
        let family = self.family_name.slice(self.buf);
        name.len() == family.len() + CREATED_SUFFIX.len()
            && name.starts_with(family)
            && name.ends_with(CREATED_SUFFIX)
    }

    /// Labels of the current sample minus `__name__`, `le` and `quantile`,
    /// for matching against a `_created` series
    fn identity_labels(&self, out: &mut Labels) {
        out.clear();
        if let Some(open) = self.label_block {
            let buf = self.buf;
            let _ = scan::scan_label_block(buf, open, self.series.end, true, |n, v| {
                let name = std::str::from_utf8(n.slice(buf)).unwrap_or_default();
                if name == "le" || name == "quantile" {
                    return Ok(());
                }
                let raw = std::str::from_utf8(v.slice(buf)).unwrap_or_default();
                let value = scan::unescape_label_value(raw);
                out.push(self.symbols.intern(name), self.symbols.intern(&value));
                Ok(())
            });
        }
        out.sort();
    }

    /// Forward scan for a `<family>_created` sample with matching labels.
    /// Stops at end of input, `# EOF`, or metadata for another family.
    fn find_created(&self) -> Option<i64> {
        let buf = self.buf;
        let family = self.family_name.slice(buf);
        let mut want = Labels::new();
        self.identity_labels(&mut want);

        let mut pos = self.pos;
        let mut got = Labels::new();
        while pos < buf.len() {
            let (line, next, _) = scan::next_line(buf, pos);
            pos = next;
            if line.is_empty() {
                return None;
            }
            if buf[line.start] == b'#' {
                // Metadata for the same family may be interleaved; anything
                // else means the family ended.
                match self.metadata_name(line) {
                    Some(name) if name == family => continue,
                    _ => return None,
                }
            }
            let name_end = scan::scan_metric_name(buf, line.start, line.end)?;
            let name = &buf[line.start..name_end];
            if name.len() != family.len() + CREATED_SUFFIX.len()
                || !name.starts_with(family)
                || !name.ends_with(CREATED_SUFFIX)
            {
                continue;
            }

            // Candidate found: compare identity labels, then take its value.
            let mut cursor = name_end;
            got.clear();
            if cursor < line.end && buf[cursor] == b'{' {
                let closed = scan::scan_label_block(buf, cursor, line.end, true, |n, v| {
                    let name = std::str::from_utf8(n.slice(buf)).unwrap_or_default();
                    if name == "le" || name == "quantile" {
                        return Ok(());
                    }
                    let raw = std::str::from_utf8(v.slice(buf)).unwrap_or_default();
                    let value = scan::unescape_label_value(raw);
                    got.push(self.symbols.intern(name), self.symbols.intern(&value));
                    Ok(())
                });
                cursor = match closed {
                    Ok(c) => c,
                    Err(_) => return None,
                };
            }
            got.sort();
            if got != want {
                continue;
            }

            let value_start = self.expect_space(cursor, line.end).ok()?;
            let value_end = scan::token_end(buf, value_start, line.end);
            let seconds = scan::parse_float(buf, Span::new(value_start, value_end)).ok()?;
            if !seconds.is_finite() {
                return None;
            }
            return Some((seconds * 1000.0) as i64);
        }
        None
    }

    /// Name declared on a metadata line, if it parses as one
    fn metadata_name(&self, line: Span) -> Option<&[u8]> {
        let buf = self.buf;
        let (start, end) = (line.start, line.end);
        if start + 1 >= end || buf[start + 1] != b' ' {
            return None;
        }
        let kw_end = scan::token_end(buf, start + 2, end);
        match &buf[start + 2..kw_end] {
            b"HELP" | b"TYPE" | b"UNIT" => {}
            _ => return None,
        }
        if kw_end >= end || buf[kw_end] != b' ' {
            return None;
        }
        let name_end = scan::scan_metric_name(buf, kw_end + 1, end)?;
        Some(&buf[kw_end + 1..name_end])
    }
}

impl Parser for OpenMetricsParser<'_> {
    fn advance(&mut self) -> Result<Option<EntryKind>> {
        if let Some(signal) = self.state.terminal() {
            return signal;
        }
        match self.scan_next() {
            Ok(Some(kind)) => {
                self.state = ParserState::Positioned(kind);
                Ok(Some(kind))
            }
            Ok(None) => {
                self.state = ParserState::Exhausted;
                Ok(None)
            }
            Err(err) => {
                self.state = ParserState::Failed(err.clone());
                Err(err)
            }
        }
    }

    fn series(&self) -> (&[u8], Option<i64>, f64) {
        self.state.require("series", &[EntryKind::Series]);
        (self.series.slice(self.buf), self.ts, self.value)
    }

    fn histogram(&self) -> (&[u8], Option<i64>, HistogramValue<'_>) {
        self.state.require("histogram", &[EntryKind::Histogram]);
        unreachable!("native histograms are not encoded in OpenMetrics text")
    }

    fn help(&self) -> (&[u8], &[u8]) {
        self.state.require("help", &[EntryKind::Help]);
        let text = if self.scratch_used {
            self.scratch.as_slice()
        } else {
            self.text.slice(self.buf)
        };
        (self.name.slice(self.buf), text)
    }

    fn metric_type(&self) -> (&[u8], MetricType) {
        self.state.require("metric_type", &[EntryKind::Type]);
        (self.name.slice(self.buf), self.mtype)
    }

    fn unit(&self) -> (&[u8], &[u8]) {
        self.state.require("unit", &[EntryKind::Unit]);
        (self.name.slice(self.buf), self.text.slice(self.buf))
    }

    fn comment(&self) -> &[u8] {
        self.state.require("comment", &[EntryKind::Comment]);
        unreachable!("OpenMetrics has no free-form comments")
    }

    fn metric(&self, labels: &mut Labels) -> &str {
        self.state.require("metric", &[EntryKind::Series]);
        labels.clear();

        let name = std::str::from_utf8(self.name.slice(self.buf)).unwrap_or_default();
        labels.push(
            self.symbols.intern(METRIC_NAME_LABEL),
            self.symbols.intern(name),
        );
        if let Some(open) = self.label_block {
            // Validated during advance; the rescan cannot fail.
            let buf = self.buf;
            let _ = scan::scan_label_block(buf, open, self.series.end, true, |n, v| {
                let name = std::str::from_utf8(n.slice(buf)).unwrap_or_default();
                let raw = std::str::from_utf8(v.slice(buf)).unwrap_or_default();
                let value = scan::unescape_label_value(raw);
                labels.push(self.symbols.intern(name), self.symbols.intern(&value));
                Ok(())
            });
        }
        labels.sort();
        std::str::from_utf8(self.series.slice(self.buf)).unwrap_or_default()
    }

    fn exemplar(&mut self, out: &mut Exemplar) -> bool {
        self.state
            .require("exemplar", &[EntryKind::Series, EntryKind::Histogram]);
        if !self.ex_present || self.ex_served {
            return false;
        }
        out.reset();
        if let Some(open) = self.ex_label_open {
            let buf = self.buf;
            let _ = scan::scan_label_block(buf, open, self.ex_block_end, true, |n, v| {
                let name = std::str::from_utf8(n.slice(buf)).unwrap_or_default();
                let raw = std::str::from_utf8(v.slice(buf)).unwrap_or_default();
                let value = scan::unescape_label_value(raw);
                out.labels
                    .push(self.symbols.intern(name), self.symbols.intern(&value));
                Ok(())
            });
            out.labels.sort();
        }
        out.value = self.ex_value;
        out.timestamp = self.ex_ts;
        self.ex_served = true;
        true
    }

    fn created_timestamp(&self) -> Option<i64> {
        if self.state.kind().map_or(true, |k| !k.is_sample()) {
            return None;
        }
        if !self.family_type.supports_created_timestamp() {
            return None;
        }
        self.find_created()
    }
}
