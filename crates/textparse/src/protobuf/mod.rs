//! Protobuf exposition parser
//!
//! The payload is a sequence of uvarint-length-delimited metric-family
//! messages. Each family yields a Help entry, a Type entry, and one entry
//! per series: summaries and classic histograms expand into their
//! `_count`/`_sum`/component series, native (sparse) histograms yield
//! Histogram entries. There is no series text on the wire, so it is
//! synthesized into a reusable internal buffer; like all accessor spans it
//! is only valid until the next advance.

mod model;
mod wire;

use std::collections::VecDeque;
use std::sync::Arc;

use tracing::trace;

use crate::entry::{EntryKind, MetricType};
use crate::error::ParseError;
use crate::histogram::{FloatHistogram, Histogram, HistogramValue};
use crate::labels::{Exemplar, Labels, METRIC_NAME_LABEL};
use crate::parser::{Parser, ParserState};
use crate::symbols::SymbolTable;
use crate::Result;

use model::{decode_family, ExemplarProto, FamilyProto, HistogramProto, LabelProto, MetricProto};

/// Parser for the delimited protobuf exposition format
pub struct ProtobufParser<'a> {
    buf: &'a [u8],
    pos: usize,
    symbols: Arc<SymbolTable>,
    parse_classic: bool,
    state: ParserState,

    stage: Stage,
    family: Option<FamilyProto<'a>>,
    metric_idx: usize,
    queue: VecDeque<PendingEntry<'a>>,

    // Current entry, materialized by the last advance
    entry_bytes: Vec<u8>,
    name_len: usize,
    cur_labels: Vec<LabelProto<'a>>,
    extra: Option<(&'static str, f64)>,
    value: f64,
    ts: Option<i64>,
    created: Option<i64>,
    hist: Option<Histogram>,
    fhist: Option<FloatHistogram>,
    exemplars: Vec<ExemplarProto<'a>>,
    exemplar_idx: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    NextFamily,
    Help,
    Type,
    Metrics,
}

/// One not-yet-emitted entry expanded from a metric
struct PendingEntry<'a> {
    kind: EntryKind,
    suffix: &'static str,
    extra: Option<(&'static str, f64)>,
    value: f64,
    hist: Option<Histogram>,
    fhist: Option<FloatHistogram>,
    exemplars: Vec<ExemplarProto<'a>>,
}

impl PendingEntry<'_> {
    fn series(suffix: &'static str, extra: Option<(&'static str, f64)>, value: f64) -> Self {
        Self {
            kind: EntryKind::Series,
            suffix,
            extra,
            value,
            hist: None,
            fhist: None,
            exemplars: Vec::new(),
        }
    }
}

impl<'a> ProtobufParser<'a> {
    /// Create a parser over the full payload in `buf`.
    ///
    /// With `parse_classic` set, classic bucketed histograms are
    /// reinterpreted as native custom-bucket histograms instead of being
    /// expanded into `_count`/`_sum`/`_bucket` series.
    pub fn new(buf: &'a [u8], parse_classic: bool, symbols: Arc<SymbolTable>) -> Self {
        Self {
            buf,
            pos: 0,
            symbols,
            parse_classic,
            state: ParserState::Fresh,
            stage: Stage::NextFamily,
            family: None,
            metric_idx: 0,
            queue: VecDeque::new(),
            entry_bytes: Vec::new(),
            name_len: 0,
            cur_labels: Vec::new(),
            extra: None,
            value: 0.0,
            ts: None,
            created: None,
            hist: None,
            fhist: None,
            exemplars: Vec::new(),
            exemplar_idx: 0,
        }
    }

    fn scan_next(&mut self) -> Result<Option<EntryKind>> {
        loop {
            match self.stage {
                Stage::NextFamily => {
                    if self.pos >= self.buf.len() {
                        return Ok(None);
                    }
                    let (len, delim) = wire::read_delimiter(self.buf, self.pos)?;
                    let start = self.pos + delim;
                    let end = start
                        .checked_add(len)
                        .filter(|&e| e <= self.buf.len())
                        .ok_or_else(|| {
                            ParseError::truncated(start.saturating_add(len), self.buf.len())
                        })?;
                    self.pos = end;

                    let family = decode_family(&self.buf[start..end])?;
                    trace!(family = family.name, metrics = family.metrics.len(),
                        "decoded metric family");
                    self.family = Some(family);
                    self.metric_idx = 0;
                    self.stage = Stage::Help;
                }
                Stage::Help => {
                    self.stage = Stage::Type;
                    return Ok(Some(EntryKind::Help));
                }
                Stage::Type => {
                    self.stage = Stage::Metrics;
                    return Ok(Some(EntryKind::Type));
                }
                Stage::Metrics => {
                    if let Some(pending) = self.queue.pop_front() {
                        let kind = pending.kind;
                        self.install(pending);
                        return Ok(Some(kind));
                    }
                    let done = {
                        let family = self.family.as_ref().ok_or_else(|| {
                            ParseError::missing_field("metric family")
                        })?;
                        self.metric_idx >= family.metrics.len()
                    };
                    if done {
                        self.family = None;
                        self.stage = Stage::NextFamily;
                        continue;
                    }
                    self.expand_current_metric()?;
                    self.metric_idx += 1;
                }
            }
        }
    }

    /// Expand the next metric of the current family into pending entries
    fn expand_current_metric(&mut self) -> Result<()> {
        let (entries, labels, ts, created) = {
            let family = self
                .family
                .as_ref()
                .ok_or_else(|| ParseError::missing_field("metric family"))?;
            let metric = &family.metrics[self.metric_idx];
            let (entries, created) = expand_metric(family.kind, metric, self.parse_classic)?;
            (entries, metric.labels.clone(), metric.timestamp_ms, created)
        };
        self.queue.extend(entries);
        self.cur_labels = labels;
        self.ts = ts;
        self.created = created;
        Ok(())
    }

    /// Make a pending entry the current one and synthesize its series text
    fn install(&mut self, pending: PendingEntry<'a>) {
        self.extra = pending.extra;
        self.value = pending.value;
        self.hist = pending.hist;
        self.fhist = pending.fhist;
        self.exemplars = pending.exemplars;
        self.exemplar_idx = 0;
        self.render_series(pending.suffix);
    }

    /// Write `name{label="value",...}` into the reusable entry buffer
    fn render_series(&mut self, suffix: &'static str) {
        let family_name: &'a str = match self.family.as_ref() {
            Some(f) => f.name,
            None => "",
        };
        self.entry_bytes.clear();
        self.entry_bytes.extend_from_slice(family_name.as_bytes());
        self.entry_bytes.extend_from_slice(suffix.as_bytes());
        self.name_len = self.entry_bytes.len();

        if self.cur_labels.is_empty() && self.extra.is_none() {
            return;
        }
        self.entry_bytes.push(b'{');
        let mut first = true;
        for label in &self.cur_labels {
            if !first {
                self.entry_bytes.push(b',');
            }
            first = false;
            self.entry_bytes.extend_from_slice(label.name.as_bytes());
            self.entry_bytes.extend_from_slice(b"=\"");
            write_escaped(&mut self.entry_bytes, label.value);
            self.entry_bytes.push(b'"');
        }
        if let Some((name, bound)) = self.extra {
            if !first {
                self.entry_bytes.push(b',');
            }
            self.entry_bytes.extend_from_slice(name.as_bytes());
            self.entry_bytes.extend_from_slice(b"=\"");
            self.entry_bytes
                .extend_from_slice(format_bound(bound).as_bytes());
            self.entry_bytes.push(b'"');
        }
        self.entry_bytes.push(b'}');
    }
}

impl Parser for ProtobufParser<'_> {
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
        (self.entry_bytes.as_slice(), self.ts, self.value)
    }

    fn histogram(&self) -> (&[u8], Option<i64>, HistogramValue<'_>) {
        self.state.require("histogram", &[EntryKind::Histogram]);
        // Exactly one representation was installed for this entry.
        let value = match (&self.hist, &self.fhist) {
            (Some(h), None) => HistogramValue::Integer(h),
            (None, Some(h)) => HistogramValue::Float(h),
            _ => unreachable!("histogram entry without exactly one value representation"),
        };
        (self.entry_bytes.as_slice(), self.ts, value)
    }

    fn help(&self) -> (&[u8], &[u8]) {
        self.state.require("help", &[EntryKind::Help]);
        let family = self.family.as_ref().expect("positioned on a family");
        (family.name.as_bytes(), family.help.as_bytes())
    }

    fn metric_type(&self) -> (&[u8], MetricType) {
        self.state.require("metric_type", &[EntryKind::Type]);
        let family = self.family.as_ref().expect("positioned on a family");
        (family.name.as_bytes(), family.kind)
    }

    fn unit(&self) -> (&[u8], &[u8]) {
        self.state.require("unit", &[EntryKind::Unit]);
        unreachable!("the protobuf exposition format has no unit entries")
    }

    fn comment(&self) -> &[u8] {
        self.state.require("comment", &[EntryKind::Comment]);
        unreachable!("the protobuf exposition format has no comments")
    }

    fn metric(&self, labels: &mut Labels) -> &str {
        self.state
            .require("metric", &[EntryKind::Series, EntryKind::Histogram]);
        labels.clear();

        let name = std::str::from_utf8(&self.entry_bytes[..self.name_len]).unwrap_or_default();
        labels.push(
            self.symbols.intern(METRIC_NAME_LABEL),
            self.symbols.intern(name),
        );
        for label in &self.cur_labels {
            labels.push(
                self.symbols.intern(label.name),
                self.symbols.intern(label.value),
            );
        }
        if let Some((name, bound)) = self.extra {
            labels.push(
                self.symbols.intern(name),
                self.symbols.intern(&format_bound(bound)),
            );
        }
        labels.sort();
        std::str::from_utf8(&self.entry_bytes).unwrap_or_default()
    }

    fn exemplar(&mut self, out: &mut Exemplar) -> bool {
        self.state
            .require("exemplar", &[EntryKind::Series, EntryKind::Histogram]);
        let Some(exemplar) = self.exemplars.get(self.exemplar_idx) else {
            return false;
        };
        self.exemplar_idx += 1;

        out.reset();
        for label in &exemplar.labels {
            out.labels.push(
                self.symbols.intern(label.name),
                self.symbols.intern(label.value),
            );
        }
        out.labels.sort();
        out.value = exemplar.value;
        out.timestamp = exemplar.timestamp_ms;
        true
    }

    fn created_timestamp(&self) -> Option<i64> {
        if self.state.kind().map_or(true, |k| !k.is_sample()) {
            return None;
        }
        self.created
    }
}

/// Expand one metric into its pending entries; also returns the created
/// timestamp shared by those entries
fn expand_metric<'a>(
    kind: MetricType,
    metric: &MetricProto<'a>,
    parse_classic: bool,
) -> Result<(Vec<PendingEntry<'a>>, Option<i64>)> {
    match kind {
        MetricType::Counter => {
            let counter = metric
                .counter
                .as_ref()
                .ok_or_else(|| ParseError::missing_field("counter"))?;
            let mut entry = PendingEntry::series("", None, counter.value);
            entry.exemplars.extend(counter.exemplar.clone());
            Ok((vec![entry], counter.created_ms))
        }
        MetricType::Gauge => {
            let value = metric
                .gauge
                .ok_or_else(|| ParseError::missing_field("gauge"))?;
            Ok((vec![PendingEntry::series("", None, value)], None))
        }
        MetricType::Summary => {
            let summary = metric
                .summary
                .as_ref()
                .ok_or_else(|| ParseError::missing_field("summary"))?;
            let mut entries = vec![
                PendingEntry::series("_count", None, summary.count as f64),
                PendingEntry::series("_sum", None, summary.sum),
            ];
            for q in &summary.quantiles {
                entries.push(PendingEntry::series(
                    "",
                    Some(("quantile", q.quantile)),
                    q.value,
                ));
            }
            Ok((entries, summary.created_ms))
        }
        MetricType::Histogram | MetricType::GaugeHistogram => {
            let h = metric
                .histogram
                .as_ref()
                .ok_or_else(|| ParseError::missing_field("histogram"))?;
            Ok((expand_histogram(h, parse_classic)?, h.created_ms))
        }
        MetricType::Info | MetricType::Stateset | MetricType::Unknown => {
            let value = metric
                .untyped
                .ok_or_else(|| ParseError::missing_field("untyped"))?;
            Ok((vec![PendingEntry::series("", None, value)], None))
        }
    }
}

fn expand_histogram<'a>(
    h: &HistogramProto<'a>,
    parse_classic: bool,
) -> Result<Vec<PendingEntry<'a>>> {
    let bucket_exemplars = || {
        h.buckets
            .iter()
            .filter_map(|b| b.exemplar.clone())
            .collect::<Vec<_>>()
    };

    if h.is_native() {
        let mut entry = PendingEntry::series("", None, 0.0);
        entry.kind = EntryKind::Histogram;
        if h.is_float() {
            entry.fhist = Some(FloatHistogram {
                count: h.count_float,
                sum: h.sum,
                schema: h.schema,
                zero_threshold: h.zero_threshold,
                zero_count: h.zero_count_float,
                positive_spans: convert_spans(&h.positive_spans),
                positive_counts: h.positive_counts.clone(),
                negative_spans: convert_spans(&h.negative_spans),
                negative_counts: h.negative_counts.clone(),
                custom_values: Vec::new(),
            });
        } else {
            entry.hist = Some(Histogram {
                count: h.count,
                sum: h.sum,
                schema: h.schema,
                zero_threshold: h.zero_threshold,
                zero_count: h.zero_count,
                positive_spans: convert_spans(&h.positive_spans),
                positive_deltas: h.positive_deltas.clone(),
                negative_spans: convert_spans(&h.negative_spans),
                negative_deltas: h.negative_deltas.clone(),
                custom_values: Vec::new(),
            });
        }
        entry.exemplars = bucket_exemplars();
        return Ok(vec![entry]);
    }

    if parse_classic {
        let buckets: Vec<(f64, u64)> = h
            .buckets
            .iter()
            .map(|b| (b.upper_bound, b.cumulative_count))
            .collect();
        let mut entry = PendingEntry::series("", None, 0.0);
        entry.kind = EntryKind::Histogram;
        entry.hist = Some(Histogram::from_classic(h.count, h.sum, &buckets));
        entry.exemplars = bucket_exemplars();
        return Ok(vec![entry]);
    }

    // Classic expansion: _count, _sum, then one _bucket series per bound,
    // with an +Inf bucket synthesized when the exposition omitted it.
    let float = h.is_float();
    let count_value = if float { h.count_float } else { h.count as f64 };
    let mut entries = vec![
        PendingEntry::series("_count", None, count_value),
        PendingEntry::series("_sum", None, h.sum),
    ];
    let mut saw_inf = false;
    for bucket in &h.buckets {
        if bucket.upper_bound.is_infinite() && bucket.upper_bound > 0.0 {
            saw_inf = true;
        }
        let value = if float {
            bucket.cumulative_count_float
        } else {
            bucket.cumulative_count as f64
        };
        let mut entry = PendingEntry::series("_bucket", Some(("le", bucket.upper_bound)), value);
        entry.exemplars.extend(bucket.exemplar.clone());
        entries.push(entry);
    }
    if !saw_inf {
        entries.push(PendingEntry::series(
            "_bucket",
            Some(("le", f64::INFINITY)),
            count_value,
        ));
    }
    Ok(entries)
}

fn convert_spans(spans: &[model::SpanProto]) -> Vec<crate::histogram::BucketSpan> {
    spans
        .iter()
        .map(|s| crate::histogram::BucketSpan {
            offset: s.offset,
            length: s.length,
        })
        .collect()
}

/// Format a bucket bound or quantile the way text expositions spell it
fn format_bound(value: f64) -> String {
    if value.is_infinite() {
        return if value > 0.0 { "+Inf" } else { "-Inf" }.to_string();
    }
    if value.is_nan() {
        return "NaN".to_string();
    }
    format!("{value}")
}

/// Escape a label value for the synthesized series text
fn write_escaped(out: &mut Vec<u8>, value: &str) {
    for byte in value.bytes() {
        match byte {
            b'\\' => out.extend_from_slice(b"\\\\"),
            b'"' => out.extend_from_slice(b"\\\""),
            b'\n' => out.extend_from_slice(b"\\n"),
            other => out.push(other),
        }
    }
}

#[cfg(test)]
#[path = "protobuf_test.rs"]
mod protobuf_test;
