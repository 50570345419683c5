//! Plain text exposition parser
//!
//! Line-oriented legacy format: `# HELP`/`# TYPE` metadata, arbitrary `#`
//! comments surfaced as Comment entries, blank lines skipped, and series
//! lines of the form `name{labels} value [timestamp_ms]`.
//!
//! All accessor spans are sub-slices of the input buffer except help text
//! containing escapes, which is decoded once into internal scratch during
//! the advance that produced it.

use std::sync::Arc;

use crate::entry::{EntryKind, MetricType};
use crate::error::ParseError;
use crate::histogram::HistogramValue;
use crate::labels::{Exemplar, Labels, METRIC_NAME_LABEL};
use crate::parser::{Parser, ParserState};
use crate::scan::{self, Span};
use crate::symbols::SymbolTable;
use crate::Result;

/// Parser for the plain text exposition format
pub struct PromTextParser<'a> {
    buf: &'a [u8],
    symbols: Arc<SymbolTable>,
    state: ParserState,
    pos: usize,

    // Current entry, set by the last advance
    series: Span,
    name: Span,
    label_block: Option<usize>,
    text: Span,
    mtype: MetricType,
    value: f64,
    ts: Option<i64>,

    scratch: Vec<u8>,
    scratch_used: bool,
}

impl<'a> PromTextParser<'a> {
    /// Create a parser over the full payload in `buf`
    pub fn new(buf: &'a [u8], symbols: Arc<SymbolTable>) -> Self {
        Self {
            buf,
            symbols,
            state: ParserState::Fresh,
            pos: 0,
            series: Span::EMPTY,
            name: Span::EMPTY,
            label_block: None,
            text: Span::EMPTY,
            mtype: MetricType::Unknown,
            value: 0.0,
            ts: None,
            scratch: Vec::new(),
            scratch_used: false,
        }
    }

    fn scan_next(&mut self) -> Result<Option<EntryKind>> {
        loop {
            if self.pos >= self.buf.len() {
                return Ok(None);
            }
            let (line, next, _) = scan::next_line(self.buf, self.pos);
            self.pos = next;

            let start = scan::skip_blank(self.buf, line.start, line.end);
            if start >= line.end {
                continue; // blank line
            }
            if self.buf[start] == b'#' {
                return self.scan_comment(start, line.end).map(Some);
            }
            return self.scan_series(start, line.end).map(Some);
        }
    }

    /// Classify a `#` line: HELP/TYPE metadata or a plain comment
    fn scan_comment(&mut self, start: usize, end: usize) -> Result<EntryKind> {
        let buf = self.buf;
        let mut pos = start + 1;
        if pos < end && (buf[pos] == b' ' || buf[pos] == b'\t') {
            pos = scan::skip_blank(buf, pos, end);
            let kw_end = scan::token_end(buf, pos, end);
            match &buf[pos..kw_end] {
                b"HELP" => return self.scan_help(kw_end, end),
                b"TYPE" => return self.scan_type(kw_end, end),
                _ => {}
            }
        }
        self.text = Span::new(start, end);
        Ok(EntryKind::Comment)
    }

    fn scan_help(&mut self, pos: usize, end: usize) -> Result<EntryKind> {
        let buf = self.buf;
        let name_start = scan::skip_blank(buf, pos, end);
        let name_end = scan::scan_metric_name(buf, name_start, end)
            .ok_or_else(|| ParseError::syntax(name_start, "expected metric name after HELP"))?;
        self.name = Span::new(name_start, name_end);

        let text_start = scan::skip_blank(buf, name_end, end);
        if text_start > name_end || text_start == end {
            self.text = Span::new(text_start, end);
        } else {
            return Err(ParseError::syntax(name_end, "expected blank after metric name"));
        }

        let raw = self.text.slice(buf);
        self.scratch_used = scan::needs_unescape(raw);
        if self.scratch_used {
            scan::unescape_help_into(raw, &mut self.scratch);
        }
        Ok(EntryKind::Help)
    }

    fn scan_type(&mut self, pos: usize, end: usize) -> Result<EntryKind> {
        let buf = self.buf;
        let name_start = scan::skip_blank(buf, pos, end);
        let name_end = scan::scan_metric_name(buf, name_start, end)
            .ok_or_else(|| ParseError::syntax(name_start, "expected metric name after TYPE"))?;
        self.name = Span::new(name_start, name_end);

        let tok_start = scan::skip_blank(buf, name_end, end);
        if tok_start == name_end {
            return Err(ParseError::syntax(name_end, "expected blank after metric name"));
        }
        let tok_end = scan::token_end(buf, tok_start, end);
        // Legacy format knows only these five type tokens.
        self.mtype = match &buf[tok_start..tok_end] {
            b"counter" => MetricType::Counter,
            b"gauge" => MetricType::Gauge,
            b"histogram" => MetricType::Histogram,
            b"summary" => MetricType::Summary,
            b"untyped" => MetricType::Unknown,
            other => {
                return Err(ParseError::InvalidMetricType {
                    offset: tok_start,
                    found: String::from_utf8_lossy(other).into_owned(),
                })
            }
        };
        if scan::skip_blank(buf, tok_end, end) != end {
            return Err(ParseError::syntax(tok_end, "unexpected data after metric type"));
        }
        Ok(EntryKind::Type)
    }

    fn scan_series(&mut self, start: usize, end: usize) -> Result<EntryKind> {
        let buf = self.buf;
        let name_end = scan::scan_metric_name(buf, start, end)
            .ok_or_else(|| ParseError::syntax(start, "expected metric name"))?;
        self.name = Span::new(start, name_end);

        let mut pos = name_end;
        self.label_block = None;
        if pos < end && buf[pos] == b'{' {
            self.label_block = Some(pos);
            // Validate syntax and UTF-8 now so metric() cannot fail later.
            pos = scan::scan_label_block(buf, pos, end, false, |n, v| {
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

        if pos >= end {
            return Err(ParseError::syntax(pos, "expected value"));
        }
        if buf[pos] != b' ' && buf[pos] != b'\t' {
            return Err(ParseError::syntax(pos, "unexpected character after series"));
        }
        let value_start = scan::skip_blank(buf, pos, end);
        if value_start >= end {
            return Err(ParseError::syntax(value_start, "expected value"));
        }
        let value_end = scan::token_end(buf, value_start, end);
        self.value = scan::parse_float(buf, Span::new(value_start, value_end))?;

        self.ts = None;
        let ts_start = scan::skip_blank(buf, value_end, end);
        if ts_start < end {
            let ts_end = scan::token_end(buf, ts_start, end);
            self.ts = Some(scan::parse_timestamp_ms(buf, Span::new(ts_start, ts_end))?);
            if scan::skip_blank(buf, ts_end, end) != end {
                return Err(ParseError::syntax(ts_end, "unexpected data after timestamp"));
            }
        }
        Ok(EntryKind::Series)
    }
}

impl Parser for PromTextParser<'_> {
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
        unreachable!("plain text format has no histogram entries")
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
        unreachable!("plain text format has no unit entries")
    }

    fn comment(&self) -> &[u8] {
        self.state.require("comment", &[EntryKind::Comment]);
        self.text.slice(self.buf)
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
            let _ = scan::scan_label_block(buf, open, self.series.end, false, |n, v| {
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

    fn exemplar(&mut self, _out: &mut Exemplar) -> bool {
        // The plain text format carries no exemplars.
        false
    }

    fn created_timestamp(&self) -> Option<i64> {
        // The plain text format carries no created timestamps.
        None
    }
}
