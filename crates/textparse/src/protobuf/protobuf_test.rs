//! Tests for the protobuf exposition parser
//!
//! Payloads are hand-assembled with small wire-format builders so the tests
//! need no generated code.

use std::sync::Arc;

use crate::entry::{EntryKind, MetricType};
use crate::error::ParseError;
use crate::histogram::{BucketSpan, HistogramValue, CUSTOM_BUCKETS_SCHEMA};
use crate::labels::{Exemplar, Labels};
use crate::parser::Parser;
use crate::symbols::SymbolTable;

use super::ProtobufParser;

// ==== wire builders ====

fn varint(mut v: u64) -> Vec<u8> {
    let mut out = Vec::new();
    loop {
        let byte = (v & 0x7f) as u8;
        v >>= 7;
        if v == 0 {
            out.push(byte);
            return out;
        }
        out.push(byte | 0x80);
    }
}

fn zigzag(v: i64) -> u64 {
    ((v << 1) ^ (v >> 63)) as u64
}

fn tag(field: u32, wire_type: u8) -> Vec<u8> {
    varint(u64::from(field) << 3 | u64::from(wire_type))
}

fn varint_field(field: u32, v: u64) -> Vec<u8> {
    let mut out = tag(field, 0);
    out.extend(varint(v));
    out
}

fn double_field(field: u32, v: f64) -> Vec<u8> {
    let mut out = tag(field, 1);
    out.extend(v.to_le_bytes());
    out
}

fn len_field(field: u32, payload: &[u8]) -> Vec<u8> {
    let mut out = tag(field, 2);
    out.extend(varint(payload.len() as u64));
    out.extend(payload);
    out
}

fn str_field(field: u32, s: &str) -> Vec<u8> {
    len_field(field, s.as_bytes())
}

/// Prefix a family message with its uvarint length delimiter
fn delimited(msg: &[u8]) -> Vec<u8> {
    let mut out = varint(msg.len() as u64);
    out.extend(msg);
    out
}

fn label(name: &str, value: &str) -> Vec<u8> {
    let mut out = str_field(1, name);
    out.extend(str_field(2, value));
    out
}

fn timestamp(seconds: i64, nanos: i64) -> Vec<u8> {
    let mut out = varint_field(1, seconds as u64);
    out.extend(varint_field(2, nanos as u64));
    out
}

fn family(name: &str, help: &str, kind: u64, metrics: &[Vec<u8>]) -> Vec<u8> {
    let mut out = str_field(1, name);
    if !help.is_empty() {
        out.extend(str_field(2, help));
    }
    out.extend(varint_field(3, kind));
    for metric in metrics {
        out.extend(len_field(4, metric));
    }
    delimited(&out)
}

fn bucket(cumulative_count: u64, upper_bound: f64) -> Vec<u8> {
    let mut out = varint_field(1, cumulative_count);
    out.extend(double_field(2, upper_bound));
    out
}

fn parser(buf: &[u8]) -> ProtobufParser<'_> {
    ProtobufParser::new(buf, false, Arc::new(SymbolTable::new()))
}

fn parser_classic(buf: &[u8]) -> ProtobufParser<'_> {
    ProtobufParser::new(buf, true, Arc::new(SymbolTable::new()))
}

// Type enum values of the exposition schema.
const COUNTER: u64 = 0;
const GAUGE: u64 = 1;
const SUMMARY: u64 = 2;
const UNTYPED: u64 = 3;
const HISTOGRAM: u64 = 4;
const GAUGE_HISTOGRAM: u64 = 5;

// ==== tests ====

#[test]
fn test_empty_payload() {
    let mut p = parser(b"");
    assert_eq!(p.advance().unwrap(), None);
    assert_eq!(p.advance().unwrap(), None);
}

#[test]
fn test_counter_family() {
    let mut metric = len_field(1, &label("job", "api"));
    metric.extend(len_field(3, &double_field(1, 1027.0)));
    let payload = family("requests_total", "Total requests.", COUNTER, &[metric]);
    let mut p = parser(&payload);

    assert_eq!(p.advance().unwrap(), Some(EntryKind::Help));
    let (name, help) = p.help();
    assert_eq!(name, b"requests_total");
    assert_eq!(help, b"Total requests.");

    assert_eq!(p.advance().unwrap(), Some(EntryKind::Type));
    let (name, mtype) = p.metric_type();
    assert_eq!(name, b"requests_total");
    assert_eq!(mtype, MetricType::Counter);

    assert_eq!(p.advance().unwrap(), Some(EntryKind::Series));
    let (series, ts, value) = p.series();
    assert_eq!(series, b"requests_total{job=\"api\"}");
    assert_eq!(ts, None);
    assert_eq!(value, 1027.0);

    let mut labels = Labels::new();
    let text = p.metric(&mut labels);
    assert_eq!(text, "requests_total{job=\"api\"}");
    assert_eq!(labels.get("__name__"), Some("requests_total"));
    assert_eq!(labels.get("job"), Some("api"));

    assert_eq!(p.advance().unwrap(), None);
}

#[test]
fn test_gauge() {
    let metric = len_field(2, &double_field(1, 42.5));
    let payload = family("temperature", "", GAUGE, &[metric]);
    let mut p = parser(&payload);
    p.advance().unwrap();
    p.advance().unwrap();
    assert_eq!(p.advance().unwrap(), Some(EntryKind::Series));
    let (series, _, value) = p.series();
    assert_eq!(series, b"temperature");
    assert_eq!(value, 42.5);
}

#[test]
fn test_untyped() {
    let metric = len_field(5, &double_field(1, 3.0));
    let payload = family("mystery", "", UNTYPED, &[metric]);
    let mut p = parser(&payload);
    p.advance().unwrap();
    assert_eq!(p.advance().unwrap(), Some(EntryKind::Type));
    assert_eq!(p.metric_type().1, MetricType::Unknown);
    assert_eq!(p.advance().unwrap(), Some(EntryKind::Series));
    assert_eq!(p.series().2, 3.0);
}

#[test]
fn test_metric_timestamp() {
    let mut metric = len_field(2, &double_field(1, 1.0));
    metric.extend(varint_field(6, 1395066363000));
    let payload = family("g", "", GAUGE, &[metric]);
    let mut p = parser(&payload);
    p.advance().unwrap();
    p.advance().unwrap();
    p.advance().unwrap();
    assert_eq!(p.series().1, Some(1395066363000));
}

#[test]
fn test_zero_timestamp_means_absent() {
    let mut metric = len_field(2, &double_field(1, 1.0));
    metric.extend(varint_field(6, 0));
    let payload = family("g", "", GAUGE, &[metric]);
    let mut p = parser(&payload);
    p.advance().unwrap();
    p.advance().unwrap();
    p.advance().unwrap();
    assert_eq!(p.series().1, None);
}

#[test]
fn test_summary_expansion() {
    let mut summary = varint_field(1, 7);
    summary.extend(double_field(2, 22.5));
    let mut q = double_field(1, 0.5);
    q.extend(double_field(2, 4.0));
    summary.extend(len_field(3, &q));
    let mut q = double_field(1, 0.9);
    q.extend(double_field(2, 8.0));
    summary.extend(len_field(3, &q));
    let metric = len_field(4, &summary);
    let payload = family("rpc_duration_seconds", "", SUMMARY, &[metric]);

    let mut p = parser(&payload);
    p.advance().unwrap();
    p.advance().unwrap();

    assert_eq!(p.advance().unwrap(), Some(EntryKind::Series));
    let (series, _, value) = p.series();
    assert_eq!(series, b"rpc_duration_seconds_count");
    assert_eq!(value, 7.0);

    assert_eq!(p.advance().unwrap(), Some(EntryKind::Series));
    let (series, _, value) = p.series();
    assert_eq!(series, b"rpc_duration_seconds_sum");
    assert_eq!(value, 22.5);

    assert_eq!(p.advance().unwrap(), Some(EntryKind::Series));
    let (series, _, value) = p.series();
    assert_eq!(series, b"rpc_duration_seconds{quantile=\"0.5\"}");
    assert_eq!(value, 4.0);

    assert_eq!(p.advance().unwrap(), Some(EntryKind::Series));
    let (series, _, value) = p.series();
    assert_eq!(series, b"rpc_duration_seconds{quantile=\"0.9\"}");
    assert_eq!(value, 8.0);

    assert_eq!(p.advance().unwrap(), None);
}

#[test]
fn test_counter_created_timestamp() {
    let mut counter = double_field(1, 5.0);
    counter.extend(len_field(3, &timestamp(1520872607, 500_000_000)));
    let metric = len_field(3, &counter);
    let payload = family("c_total", "", COUNTER, &[metric]);

    let mut p = parser(&payload);
    p.advance().unwrap();
    // Not a sample entry yet.
    assert_eq!(p.created_timestamp(), None);
    p.advance().unwrap();
    assert_eq!(p.advance().unwrap(), Some(EntryKind::Series));
    assert_eq!(p.created_timestamp(), Some(1520872607500));
}

#[test]
fn test_created_timestamp_saturates_on_overflow() {
    let mut counter = double_field(1, 5.0);
    counter.extend(len_field(3, &varint_field(1, i64::MAX as u64)));
    let metric = len_field(3, &counter);
    let payload = family("c_total", "", COUNTER, &[metric]);

    let mut p = parser(&payload);
    p.advance().unwrap();
    p.advance().unwrap();
    assert_eq!(p.advance().unwrap(), Some(EntryKind::Series));
    assert_eq!(p.created_timestamp(), Some(i64::MAX));
}

#[test]
fn test_counter_exemplar() {
    let mut exemplar = len_field(1, &label("trace_id", "abc123"));
    exemplar.extend(double_field(2, 0.67));
    exemplar.extend(len_field(3, &timestamp(120, 0)));
    let mut counter = double_field(1, 5.0);
    counter.extend(len_field(2, &exemplar));
    let metric = len_field(3, &counter);
    let payload = family("c_total", "", COUNTER, &[metric]);

    let mut p = parser(&payload);
    p.advance().unwrap();
    p.advance().unwrap();
    p.advance().unwrap();

    let mut ex = Exemplar::new();
    assert!(p.exemplar(&mut ex));
    assert_eq!(ex.labels.get("trace_id"), Some("abc123"));
    assert_eq!(ex.value, 0.67);
    assert_eq!(ex.timestamp, Some(120000));
    assert!(!p.exemplar(&mut ex));
}

#[test]
fn test_classic_histogram_expansion() {
    let mut hist = varint_field(1, 5);
    hist.extend(double_field(2, 12.5));
    hist.extend(len_field(3, &bucket(1, 0.1)));
    hist.extend(len_field(3, &bucket(3, 1.0)));
    hist.extend(len_field(3, &bucket(5, f64::INFINITY)));
    let mut metric = len_field(1, &label("path", "/"));
    metric.extend(len_field(7, &hist));
    let payload = family("req_seconds", "", HISTOGRAM, &[metric]);

    let mut p = parser(&payload);
    p.advance().unwrap();
    p.advance().unwrap();

    let want = [
        (b"req_seconds_count{path=\"/\"}".as_slice(), 5.0),
        (b"req_seconds_sum{path=\"/\"}".as_slice(), 12.5),
        (b"req_seconds_bucket{path=\"/\",le=\"0.1\"}".as_slice(), 1.0),
        (b"req_seconds_bucket{path=\"/\",le=\"1\"}".as_slice(), 3.0),
        (b"req_seconds_bucket{path=\"/\",le=\"+Inf\"}".as_slice(), 5.0),
    ];
    for (want_series, want_value) in want {
        assert_eq!(p.advance().unwrap(), Some(EntryKind::Series));
        let (series, _, value) = p.series();
        assert_eq!(series, want_series);
        assert_eq!(value, want_value);
    }
    assert_eq!(p.advance().unwrap(), None);
}

#[test]
fn test_inf_bucket_synthesized() {
    let mut hist = varint_field(1, 4);
    hist.extend(double_field(2, 2.0));
    hist.extend(len_field(3, &bucket(3, 0.5)));
    let metric = len_field(7, &hist);
    let payload = family("h", "", HISTOGRAM, &[metric]);

    let mut p = parser(&payload);
    p.advance().unwrap();
    p.advance().unwrap();
    p.advance().unwrap(); // _count
    p.advance().unwrap(); // _sum
    p.advance().unwrap(); // le="0.5"
    assert_eq!(p.advance().unwrap(), Some(EntryKind::Series));
    let (series, _, value) = p.series();
    assert_eq!(series, b"h_bucket{le=\"+Inf\"}");
    assert_eq!(value, 4.0);
}

#[test]
fn test_bucket_exemplar() {
    let mut exemplar = len_field(1, &label("trace_id", "xyz"));
    exemplar.extend(double_field(2, 0.05));
    let mut b = bucket(2, 0.1);
    b.extend(len_field(3, &exemplar));
    let mut hist = varint_field(1, 2);
    hist.extend(double_field(2, 0.07));
    hist.extend(len_field(3, &b));
    let metric = len_field(7, &hist);
    let payload = family("h", "", HISTOGRAM, &[metric]);

    let mut p = parser(&payload);
    p.advance().unwrap();
    p.advance().unwrap();
    let mut ex = Exemplar::new();
    p.advance().unwrap(); // _count
    assert!(!p.exemplar(&mut ex));
    p.advance().unwrap(); // _sum
    p.advance().unwrap(); // le="0.1"
    assert!(p.exemplar(&mut ex));
    assert_eq!(ex.labels.get("trace_id"), Some("xyz"));
    assert_eq!(ex.value, 0.05);
    assert_eq!(ex.timestamp, None);
}

#[test]
fn test_native_integer_histogram() {
    let mut hist = varint_field(1, 4);
    hist.extend(double_field(2, 10.0));
    hist.extend(varint_field(5, zigzag(3))); // schema
    hist.extend(double_field(6, 1e-128)); // zero threshold
    hist.extend(varint_field(7, 1)); // zero count
    let mut span = varint_field(1, zigzag(0));
    span.extend(varint_field(2, 2));
    hist.extend(len_field(12, &span));
    let mut deltas = varint(zigzag(2));
    deltas.extend(varint(zigzag(-1)));
    hist.extend(len_field(13, &deltas)); // packed
    let metric = len_field(7, &hist);
    let payload = family("latency", "", HISTOGRAM, &[metric]);

    let mut p = parser(&payload);
    p.advance().unwrap();
    p.advance().unwrap();
    assert_eq!(p.advance().unwrap(), Some(EntryKind::Histogram));

    let (series, ts, value) = p.histogram();
    assert_eq!(series, b"latency");
    assert_eq!(ts, None);
    match value {
        HistogramValue::Integer(h) => {
            assert_eq!(h.count, 4);
            assert_eq!(h.sum, 10.0);
            assert_eq!(h.schema, 3);
            assert_eq!(h.zero_threshold, 1e-128);
            assert_eq!(h.zero_count, 1);
            assert_eq!(h.positive_spans, vec![BucketSpan { offset: 0, length: 2 }]);
            assert_eq!(h.positive_deltas, vec![2, -1]);
        }
        HistogramValue::Float(_) => panic!("expected integer histogram"),
    }
    assert_eq!(value.count(), 4.0);

    let mut labels = Labels::new();
    p.metric(&mut labels);
    assert_eq!(labels.get("__name__"), Some("latency"));
    assert_eq!(p.advance().unwrap(), None);
}

#[test]
fn test_native_float_histogram() {
    let mut hist = double_field(4, 4.0); // float count
    hist.extend(double_field(2, 10.0));
    hist.extend(varint_field(5, zigzag(3)));
    let mut span = varint_field(1, zigzag(0));
    span.extend(varint_field(2, 2));
    hist.extend(len_field(12, &span));
    let mut counts = 2.0f64.to_le_bytes().to_vec();
    counts.extend(1.0f64.to_le_bytes());
    hist.extend(len_field(14, &counts)); // packed doubles
    let metric = len_field(7, &hist);
    let payload = family("latency", "", HISTOGRAM, &[metric]);

    let mut p = parser(&payload);
    p.advance().unwrap();
    p.advance().unwrap();
    assert_eq!(p.advance().unwrap(), Some(EntryKind::Histogram));
    match p.histogram().2 {
        HistogramValue::Float(h) => {
            assert_eq!(h.count, 4.0);
            assert_eq!(h.schema, 3);
            assert_eq!(h.positive_counts, vec![2.0, 1.0]);
        }
        HistogramValue::Integer(_) => panic!("expected float histogram"),
    }
}

#[test]
fn test_gauge_histogram_type() {
    let mut hist = varint_field(1, 1);
    hist.extend(double_field(2, 1.0));
    hist.extend(varint_field(5, zigzag(0)));
    hist.extend(varint_field(7, 1)); // zero count marks it native
    let metric = len_field(7, &hist);
    let payload = family("gh", "", GAUGE_HISTOGRAM, &[metric]);

    let mut p = parser(&payload);
    p.advance().unwrap();
    assert_eq!(p.advance().unwrap(), Some(EntryKind::Type));
    assert_eq!(p.metric_type().1, MetricType::GaugeHistogram);
    assert_eq!(p.advance().unwrap(), Some(EntryKind::Histogram));
}

#[test]
fn test_parse_classic_reinterprets_buckets() {
    let mut hist = varint_field(1, 5);
    hist.extend(double_field(2, 12.5));
    hist.extend(len_field(3, &bucket(1, 0.1)));
    hist.extend(len_field(3, &bucket(3, 1.0)));
    hist.extend(len_field(3, &bucket(5, f64::INFINITY)));
    let metric = len_field(7, &hist);
    let payload = family("req_seconds", "", HISTOGRAM, &[metric]);

    let mut p = parser_classic(&payload);
    p.advance().unwrap();
    p.advance().unwrap();
    assert_eq!(p.advance().unwrap(), Some(EntryKind::Histogram));
    match p.histogram().2 {
        HistogramValue::Integer(h) => {
            assert_eq!(h.count, 5);
            assert_eq!(h.sum, 12.5);
            assert_eq!(h.schema, CUSTOM_BUCKETS_SCHEMA);
            assert_eq!(h.custom_values, vec![0.1, 1.0]);
            assert_eq!(h.positive_deltas, vec![1, 1, 0]);
            assert_eq!(h.positive_spans, vec![BucketSpan { offset: 0, length: 3 }]);
        }
        HistogramValue::Float(_) => panic!("expected integer histogram"),
    }
    assert_eq!(p.advance().unwrap(), None);
}

#[test]
fn test_multiple_families() {
    let g1 = family("a", "", GAUGE, &[len_field(2, &double_field(1, 1.0))]);
    let g2 = family("b", "", GAUGE, &[len_field(2, &double_field(1, 2.0))]);
    let mut payload = g1;
    payload.extend(g2);

    let mut p = parser(&payload);
    let mut seen = Vec::new();
    while let Some(kind) = p.advance().unwrap() {
        if kind == EntryKind::Series {
            seen.push(p.series().2);
        }
    }
    assert_eq!(seen, vec![1.0, 2.0]);
}

#[test]
fn test_family_without_metrics_still_emits_metadata() {
    let empty = family("empty", "A family with no series.", GAUGE, &[]);
    let mut payload = empty;
    payload.extend(family("a", "", GAUGE, &[len_field(2, &double_field(1, 7.0))]));

    let mut p = parser(&payload);
    assert_eq!(p.advance().unwrap(), Some(EntryKind::Help));
    assert_eq!(p.help(), (b"empty".as_slice(), b"A family with no series.".as_slice()));
    assert_eq!(p.advance().unwrap(), Some(EntryKind::Type));
    assert_eq!(p.metric_type().0, b"empty");

    // No series entries; the next family follows directly.
    assert_eq!(p.advance().unwrap(), Some(EntryKind::Help));
    assert_eq!(p.help().0, b"a");
    assert_eq!(p.advance().unwrap(), Some(EntryKind::Type));
    assert_eq!(p.advance().unwrap(), Some(EntryKind::Series));
    assert_eq!(p.series().2, 7.0);
    assert_eq!(p.advance().unwrap(), None);
}

#[test]
fn test_family_without_name_is_error() {
    let msg = varint_field(3, GAUGE);
    let payload = delimited(&msg);
    let mut p = parser(&payload);
    let err = p.advance().unwrap_err();
    assert!(matches!(err, ParseError::MissingField("name")));
}

#[test]
fn test_truncated_message_is_error() {
    let mut payload = varint(100); // delimiter longer than the payload
    payload.extend_from_slice(b"abc");
    let mut p = parser(&payload);
    let err = p.advance().unwrap_err();
    assert!(matches!(err, ParseError::Truncated { .. }));
    // Failure is terminal.
    assert!(matches!(p.advance().unwrap_err(), ParseError::Truncated { .. }));
}

#[test]
fn test_counter_without_body_is_error() {
    // Declared counter family whose metric carries a gauge field.
    let metric = len_field(2, &double_field(1, 1.0));
    let payload = family("c", "", COUNTER, &[metric]);
    let mut p = parser(&payload);
    p.advance().unwrap();
    p.advance().unwrap();
    let err = p.advance().unwrap_err();
    assert!(matches!(err, ParseError::MissingField("counter")));
}

#[test]
fn test_escaped_label_in_series_text() {
    let mut metric = len_field(1, &label("msg", "a\"b\\c\nd"));
    metric.extend(len_field(2, &double_field(1, 1.0)));
    let payload = family("g", "", GAUGE, &[metric]);
    let mut p = parser(&payload);
    p.advance().unwrap();
    p.advance().unwrap();
    p.advance().unwrap();
    let (series, _, _) = p.series();
    assert_eq!(series, b"g{msg=\"a\\\"b\\\\c\\nd\"}");

    // The label receiver gets the unescaped value.
    let mut labels = Labels::new();
    p.metric(&mut labels);
    assert_eq!(labels.get("msg"), Some("a\"b\\c\nd"));
}

#[test]
fn test_unknown_fields_are_skipped() {
    let mut metric = len_field(2, &double_field(1, 9.0));
    metric.extend(varint_field(99, 12345));
    let mut msg = str_field(1, "g");
    msg.extend(varint_field(3, GAUGE));
    msg.extend(len_field(4, &metric));
    msg.extend(double_field(50, 1.5)); // unknown family field
    let payload = delimited(&msg);

    let mut p = parser(&payload);
    p.advance().unwrap();
    p.advance().unwrap();
    p.advance().unwrap();
    assert_eq!(p.series().2, 9.0);
}
