//! Decoded metric-family messages
//!
//! Zero-copy views over one serialized metric-family message: strings
//! borrow from the input buffer. Field numbers follow the classic
//! client-exposition protobuf schema. Unknown fields are skipped.

use crate::entry::MetricType;
use crate::error::ParseError;
use crate::Result;

use super::wire::{zigzag32, zigzag64, WireReader, WireType};

/// A string label (name-value pair)
#[derive(Debug, Clone, Copy)]
pub(crate) struct LabelProto<'a> {
    pub name: &'a str,
    pub value: &'a str,
}

/// An exemplar attached to a counter or histogram bucket
#[derive(Debug, Clone)]
pub(crate) struct ExemplarProto<'a> {
    pub labels: Vec<LabelProto<'a>>,
    pub value: f64,
    pub timestamp_ms: Option<i64>,
}

/// A summary quantile
#[derive(Debug, Clone, Copy)]
pub(crate) struct QuantileProto {
    pub quantile: f64,
    pub value: f64,
}

/// A classic histogram bucket (cumulative)
#[derive(Debug, Clone)]
pub(crate) struct BucketProto<'a> {
    pub cumulative_count: u64,
    pub cumulative_count_float: f64,
    pub upper_bound: f64,
    pub exemplar: Option<ExemplarProto<'a>>,
}

/// A native histogram bucket span
#[derive(Debug, Clone, Copy)]
pub(crate) struct SpanProto {
    pub offset: i32,
    pub length: u32,
}

#[derive(Debug, Clone, Default)]
pub(crate) struct SummaryProto {
    pub count: u64,
    pub sum: f64,
    pub quantiles: Vec<QuantileProto>,
    pub created_ms: Option<i64>,
}

#[derive(Debug, Clone, Default)]
pub(crate) struct HistogramProto<'a> {
    pub count: u64,
    pub count_float: f64,
    pub sum: f64,
    pub schema: i32,
    pub zero_threshold: f64,
    pub zero_count: u64,
    pub zero_count_float: f64,
    pub buckets: Vec<BucketProto<'a>>,
    pub negative_spans: Vec<SpanProto>,
    pub negative_deltas: Vec<i64>,
    pub negative_counts: Vec<f64>,
    pub positive_spans: Vec<SpanProto>,
    pub positive_deltas: Vec<i64>,
    pub positive_counts: Vec<f64>,
    pub created_ms: Option<i64>,
}

impl HistogramProto<'_> {
    /// True when native (sparse) encoding fields are in use
    pub fn is_native(&self) -> bool {
        self.schema != 0
            || self.zero_threshold > 0.0
            || self.zero_count > 0
            || self.zero_count_float > 0.0
            || !self.negative_spans.is_empty()
            || !self.positive_spans.is_empty()
            || !self.negative_deltas.is_empty()
            || !self.positive_deltas.is_empty()
            || !self.negative_counts.is_empty()
            || !self.positive_counts.is_empty()
    }

    /// True when counts are float-valued
    pub fn is_float(&self) -> bool {
        self.count_float > 0.0
            || self.zero_count_float > 0.0
            || !self.positive_counts.is_empty()
            || !self.negative_counts.is_empty()
    }
}

#[derive(Debug, Clone, Default)]
pub(crate) struct CounterProto<'a> {
    pub value: f64,
    pub exemplar: Option<ExemplarProto<'a>>,
    pub created_ms: Option<i64>,
}

/// One series within a family
#[derive(Debug, Clone, Default)]
pub(crate) struct MetricProto<'a> {
    pub labels: Vec<LabelProto<'a>>,
    pub timestamp_ms: Option<i64>,
    pub gauge: Option<f64>,
    pub counter: Option<CounterProto<'a>>,
    pub untyped: Option<f64>,
    pub summary: Option<SummaryProto>,
    pub histogram: Option<HistogramProto<'a>>,
}

/// A decoded metric-family message
#[derive(Debug, Clone)]
pub(crate) struct FamilyProto<'a> {
    pub name: &'a str,
    pub help: &'a str,
    pub kind: MetricType,
    pub metrics: Vec<MetricProto<'a>>,
}

/// Decode one metric-family message
pub(crate) fn decode_family(buf: &[u8]) -> Result<FamilyProto<'_>> {
    let mut reader = WireReader::new(buf);
    let mut name = None;
    let mut help = "";
    let mut kind = MetricType::Unknown;
    let mut metrics = Vec::new();

    while let Some((field, wire_type)) = reader.read_tag()? {
        match field {
            1 => name = Some(reader.read_string()?),
            2 => help = reader.read_string()?,
            3 => {
                kind = match reader.read_varint()? {
                    0 => MetricType::Counter,
                    1 => MetricType::Gauge,
                    2 => MetricType::Summary,
                    3 => MetricType::Unknown,
                    4 => MetricType::Histogram,
                    5 => MetricType::GaugeHistogram,
                    _ => MetricType::Unknown,
                }
            }
            4 => metrics.push(decode_metric(reader.read_len_bytes()?)?),
            _ => reader.skip(wire_type)?,
        }
    }

    let name = name.filter(|n| !n.is_empty()).ok_or_else(|| {
        ParseError::missing_field("name")
    })?;
    Ok(FamilyProto {
        name,
        help,
        kind,
        metrics,
    })
}

fn decode_metric(buf: &[u8]) -> Result<MetricProto<'_>> {
    let mut reader = WireReader::new(buf);
    let mut metric = MetricProto::default();

    while let Some((field, wire_type)) = reader.read_tag()? {
        match field {
            1 => metric.labels.push(decode_label(reader.read_len_bytes()?)?),
            2 => metric.gauge = Some(decode_value(reader.read_len_bytes()?)?),
            3 => metric.counter = Some(decode_counter(reader.read_len_bytes()?)?),
            4 => metric.summary = Some(decode_summary(reader.read_len_bytes()?)?),
            5 => metric.untyped = Some(decode_value(reader.read_len_bytes()?)?),
            6 => {
                let ts = reader.read_varint()? as i64;
                // Zero means the producer set no timestamp.
                metric.timestamp_ms = (ts != 0).then_some(ts);
            }
            7 => metric.histogram = Some(decode_histogram(reader.read_len_bytes()?)?),
            _ => reader.skip(wire_type)?,
        }
    }
    Ok(metric)
}

fn decode_label(buf: &[u8]) -> Result<LabelProto<'_>> {
    let mut reader = WireReader::new(buf);
    let mut name = "";
    let mut value = "";
    while let Some((field, wire_type)) = reader.read_tag()? {
        match field {
            1 => name = reader.read_string()?,
            2 => value = reader.read_string()?,
            _ => reader.skip(wire_type)?,
        }
    }
    Ok(LabelProto { name, value })
}

/// Gauge and Untyped share the single-value layout
fn decode_value(buf: &[u8]) -> Result<f64> {
    let mut reader = WireReader::new(buf);
    let mut value = 0.0;
    while let Some((field, wire_type)) = reader.read_tag()? {
        match field {
            1 => value = reader.read_double()?,
            _ => reader.skip(wire_type)?,
        }
    }
    Ok(value)
}

fn decode_counter(buf: &[u8]) -> Result<CounterProto<'_>> {
    let mut reader = WireReader::new(buf);
    let mut counter = CounterProto::default();
    while let Some((field, wire_type)) = reader.read_tag()? {
        match field {
            1 => counter.value = reader.read_double()?,
            2 => counter.exemplar = Some(decode_exemplar(reader.read_len_bytes()?)?),
            3 => counter.created_ms = Some(decode_timestamp(reader.read_len_bytes()?)?),
            _ => reader.skip(wire_type)?,
        }
    }
    Ok(counter)
}

fn decode_summary(buf: &[u8]) -> Result<SummaryProto> {
    let mut reader = WireReader::new(buf);
    let mut summary = SummaryProto::default();
    while let Some((field, wire_type)) = reader.read_tag()? {
        match field {
            1 => summary.count = reader.read_varint()?,
            2 => summary.sum = reader.read_double()?,
            3 => summary.quantiles.push(decode_quantile(reader.read_len_bytes()?)?),
            4 => summary.created_ms = Some(decode_timestamp(reader.read_len_bytes()?)?),
            _ => reader.skip(wire_type)?,
        }
    }
    Ok(summary)
}

fn decode_quantile(buf: &[u8]) -> Result<QuantileProto> {
    let mut reader = WireReader::new(buf);
    let mut q = QuantileProto {
        quantile: 0.0,
        value: 0.0,
    };
    while let Some((field, wire_type)) = reader.read_tag()? {
        match field {
            1 => q.quantile = reader.read_double()?,
            2 => q.value = reader.read_double()?,
            _ => reader.skip(wire_type)?,
        }
    }
    Ok(q)
}

fn decode_histogram(buf: &[u8]) -> Result<HistogramProto<'_>> {
    let mut reader = WireReader::new(buf);
    let mut h = HistogramProto::default();
    while let Some((field, wire_type)) = reader.read_tag()? {
        match field {
            1 => h.count = reader.read_varint()?,
            2 => h.sum = reader.read_double()?,
            3 => h.buckets.push(decode_bucket(reader.read_len_bytes()?)?),
            4 => h.count_float = reader.read_double()?,
            5 => h.schema = zigzag32(reader.read_varint()?),
            6 => h.zero_threshold = reader.read_double()?,
            7 => h.zero_count = reader.read_varint()?,
            8 => h.zero_count_float = reader.read_double()?,
            9 => h.negative_spans.push(decode_span(reader.read_len_bytes()?)?),
            10 => read_sint64s(&mut reader, wire_type, &mut h.negative_deltas)?,
            11 => read_doubles(&mut reader, wire_type, &mut h.negative_counts)?,
            12 => h.positive_spans.push(decode_span(reader.read_len_bytes()?)?),
            13 => read_sint64s(&mut reader, wire_type, &mut h.positive_deltas)?,
            14 => read_doubles(&mut reader, wire_type, &mut h.positive_counts)?,
            15 => h.created_ms = Some(decode_timestamp(reader.read_len_bytes()?)?),
            _ => reader.skip(wire_type)?,
        }
    }
    Ok(h)
}

fn decode_bucket(buf: &[u8]) -> Result<BucketProto<'_>> {
    let mut reader = WireReader::new(buf);
    let mut bucket = BucketProto {
        cumulative_count: 0,
        cumulative_count_float: 0.0,
        upper_bound: 0.0,
        exemplar: None,
    };
    while let Some((field, wire_type)) = reader.read_tag()? {
        match field {
            1 => bucket.cumulative_count = reader.read_varint()?,
            2 => bucket.upper_bound = reader.read_double()?,
            3 => bucket.exemplar = Some(decode_exemplar(reader.read_len_bytes()?)?),
            4 => bucket.cumulative_count_float = reader.read_double()?,
            _ => reader.skip(wire_type)?,
        }
    }
    Ok(bucket)
}

fn decode_span(buf: &[u8]) -> Result<SpanProto> {
    let mut reader = WireReader::new(buf);
    let mut span = SpanProto {
        offset: 0,
        length: 0,
    };
    while let Some((field, wire_type)) = reader.read_tag()? {
        match field {
            1 => span.offset = zigzag32(reader.read_varint()?),
            2 => span.length = reader.read_varint()? as u32,
            _ => reader.skip(wire_type)?,
        }
    }
    Ok(span)
}

fn decode_exemplar(buf: &[u8]) -> Result<ExemplarProto<'_>> {
    let mut reader = WireReader::new(buf);
    let mut exemplar = ExemplarProto {
        labels: Vec::new(),
        value: 0.0,
        timestamp_ms: None,
    };
    while let Some((field, wire_type)) = reader.read_tag()? {
        match field {
            1 => exemplar.labels.push(decode_label(reader.read_len_bytes()?)?),
            2 => exemplar.value = reader.read_double()?,
            3 => exemplar.timestamp_ms = Some(decode_timestamp(reader.read_len_bytes()?)?),
            _ => reader.skip(wire_type)?,
        }
    }
    Ok(exemplar)
}

/// Well-known Timestamp message, reduced to milliseconds
fn decode_timestamp(buf: &[u8]) -> Result<i64> {
    let mut reader = WireReader::new(buf);
    let mut seconds = 0i64;
    let mut nanos = 0i64;
    while let Some((field, wire_type)) = reader.read_tag()? {
        match field {
            1 => seconds = reader.read_varint()? as i64,
            2 => nanos = reader.read_varint()? as i64,
            _ => reader.skip(wire_type)?,
        }
    }
    // Adversarial values must not overflow; clamp instead.
    Ok(seconds.saturating_mul(1000).saturating_add(nanos / 1_000_000))
}

/// Repeated sint64, packed or not
fn read_sint64s(reader: &mut WireReader<'_>, wire_type: WireType, out: &mut Vec<i64>) -> Result<()> {
    match wire_type {
        WireType::Len => {
            let mut sub = WireReader::new(reader.read_len_bytes()?);
            while !sub.is_at_end() {
                out.push(zigzag64(sub.read_varint()?));
            }
            Ok(())
        }
        WireType::Varint => {
            out.push(zigzag64(reader.read_varint()?));
            Ok(())
        }
        _ => Err(ParseError::syntax(0, "unexpected wire type for sint64 field")),
    }
}

/// Repeated double, packed or not
fn read_doubles(reader: &mut WireReader<'_>, wire_type: WireType, out: &mut Vec<f64>) -> Result<()> {
    match wire_type {
        WireType::Len => {
            let mut sub = WireReader::new(reader.read_len_bytes()?);
            while !sub.is_at_end() {
                out.push(sub.read_double()?);
            }
            Ok(())
        }
        WireType::Fixed64 => {
            out.push(reader.read_double()?);
            Ok(())
        }
        _ => Err(ParseError::syntax(0, "unexpected wire type for double field")),
    }
}
