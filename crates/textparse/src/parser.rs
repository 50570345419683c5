//! Parser contract and format dispatch
//!
//! One trait fronts the three wire formats. A parser owns a cursor over the
//! caller's buffer; `advance` positions it on the next entry and the
//! accessors read the current one. All spans returned by accessors are
//! sub-slices of either the input buffer or the parser's internal scratch
//! and are invalidated by the next `advance` — callers needing persistence
//! must copy first.

use std::sync::Arc;

use tracing::warn;

use crate::entry::EntryKind;
use crate::error::ParseError;
use crate::histogram::HistogramValue;
use crate::labels::{Exemplar, Labels};
use crate::openmetrics::OpenMetricsParser;
use crate::promtext::PromTextParser;
use crate::protobuf::ProtobufParser;
use crate::symbols::SymbolTable;
use crate::{negotiate, MetricType, Result};
use crate::{OPENMETRICS_TEXT, PROTOBUF_DELIMITED, TEXT_PLAIN};

/// Streaming parser over one exposition payload.
///
/// Drive with [`advance`](Parser::advance); each `Ok(Some(kind))` positions
/// the parser on an entry whose matching accessors may then be called.
/// Calling an accessor that does not match the current entry kind is a
/// contract violation and panics; it never yields wrong data or corrupts
/// parser state.
///
/// A parser is single-threaded: one owner drives it from construction to
/// exhaustion or failure. Only the [`SymbolTable`] behind it is shared.
pub trait Parser {
    /// Advance to the next entry.
    ///
    /// Returns `Ok(Some(kind))` when positioned on an entry, `Ok(None)` on
    /// clean end of input, and `Err` on malformed input. End of input and
    /// failure are terminal: further calls return the same signal without
    /// re-scanning.
    fn advance(&mut self) -> Result<Option<EntryKind>>;

    /// Bytes of the current series, its timestamp in milliseconds if one
    /// was present, and the sample value. Valid after a `Series` entry.
    fn series(&self) -> (&[u8], Option<i64>, f64);

    /// Bytes of the current series, its timestamp, and the native histogram
    /// value. Valid after a `Histogram` entry.
    fn histogram(&self) -> (&[u8], Option<i64>, HistogramValue<'_>);

    /// Metric family name and help text. Valid after a `Help` entry.
    fn help(&self) -> (&[u8], &[u8]);

    /// Metric family name and declared type. Valid after a `Type` entry.
    fn metric_type(&self) -> (&[u8], MetricType);

    /// Metric family name and unit text. Valid after a `Unit` entry.
    fn unit(&self) -> (&[u8], &[u8]);

    /// Text of the current comment line. Valid after a `Comment` entry.
    fn comment(&self) -> &[u8];

    /// Populate `labels` with the labels of the current sample (including
    /// `__name__`) and return the text the series was parsed from. Valid
    /// after a `Series` or `Histogram` entry.
    fn metric(&self, labels: &mut Labels) -> &str;

    /// Write the next exemplar of the current sample into `out`. Call
    /// repeatedly to drain multiple exemplars; returns `false` once none
    /// remain (and keeps returning `false` until the next advance).
    fn exemplar(&mut self, out: &mut Exemplar) -> bool;

    /// Created timestamp of the current sample in milliseconds, when the
    /// format and metric type carry one.
    fn created_timestamp(&self) -> Option<i64>;
}

/// Shared entry state machine driven by `advance`
#[derive(Debug, Clone, Default)]
pub(crate) enum ParserState {
    /// Before the first advance
    #[default]
    Fresh,
    /// Positioned on an entry
    Positioned(EntryKind),
    /// Clean end of input (terminal)
    Exhausted,
    /// Malformed input (terminal)
    Failed(ParseError),
}

impl ParserState {
    /// The terminal signal to re-yield, if this state is terminal
    pub(crate) fn terminal(&self) -> Option<Result<Option<EntryKind>>> {
        match self {
            Self::Exhausted => Some(Ok(None)),
            Self::Failed(err) => Some(Err(err.clone())),
            _ => None,
        }
    }

    /// Current entry kind, if positioned
    pub(crate) fn kind(&self) -> Option<EntryKind> {
        match self {
            Self::Positioned(kind) => Some(*kind),
            _ => None,
        }
    }

    /// Assert the accessor matches the current entry kind
    #[track_caller]
    pub(crate) fn require(&self, accessor: &'static str, allowed: &[EntryKind]) {
        match self.kind() {
            Some(kind) if allowed.contains(&kind) => {}
            Some(kind) => panic!("{accessor}() called on a {kind} entry"),
            None => panic!("{accessor}() called with no current entry"),
        }
    }
}

/// Build a parser for `buf` from a declared Content-Type and a configured
/// fallback format.
///
/// Negotiation warnings are advisory: the parser is still returned alongside
/// them so the caller can decide whether to log or reject. The buffer is not
/// validated here; malformed content surfaces on the first `advance`.
///
/// `parse_classic_histograms` makes the protobuf parser reinterpret classic
/// bucketed histograms as native custom-bucket histograms.
/// `skip_created_series` suppresses OpenMetrics `_created` series as
/// standalone samples while keeping them visible to `created_timestamp`.
pub fn new_parser<'a>(
    buf: &'a [u8],
    content_type: &str,
    fallback: &str,
    parse_classic_histograms: bool,
    skip_created_series: bool,
    symbols: &Arc<SymbolTable>,
) -> Result<(Box<dyn Parser + 'a>, Option<ParseError>)> {
    let (media_type, warning) = negotiate::resolve(content_type, fallback)?;
    if let Some(w) = &warning {
        warn!(content_type, media_type = %media_type, warning = %w,
            "content-type negotiation fell back");
    }

    let parser: Box<dyn Parser + 'a> = match media_type.as_str() {
        OPENMETRICS_TEXT => Box::new(OpenMetricsParser::new(
            buf,
            Arc::clone(symbols),
            skip_created_series,
        )),
        PROTOBUF_DELIMITED => Box::new(ProtobufParser::new(
            buf,
            parse_classic_histograms,
            Arc::clone(symbols),
        )),
        TEXT_PLAIN => Box::new(PromTextParser::new(buf, Arc::clone(symbols))),
        // The fallback itself named no known format.
        other => return Err(ParseError::unrecognized_content_type(other)),
    };
    Ok((parser, warning))
}
