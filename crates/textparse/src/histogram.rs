//! Native histogram value types
//!
//! Sparse histograms encode buckets as spans over a schema-defined bucket
//! layout. Counts are either integer deltas (`Histogram`) or absolute float
//! counts (`FloatHistogram`); a histogram entry carries exactly one of the
//! two.

/// Schema number marking custom (classic-style) bucket boundaries
pub const CUSTOM_BUCKETS_SCHEMA: i32 = -53;

/// A run of consecutive buckets starting `offset` bucket indexes after the
/// previous span ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BucketSpan {
    pub offset: i32,
    pub length: u32,
}

/// Integer-counted native histogram
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Histogram {
    pub count: u64,
    pub sum: f64,
    pub schema: i32,
    pub zero_threshold: f64,
    pub zero_count: u64,
    pub positive_spans: Vec<BucketSpan>,
    /// Delta-encoded bucket counts: first entry is absolute, the rest are
    /// differences from the previous bucket
    pub positive_deltas: Vec<i64>,
    pub negative_spans: Vec<BucketSpan>,
    pub negative_deltas: Vec<i64>,
    /// Upper bounds for `CUSTOM_BUCKETS_SCHEMA`; empty for exponential
    /// schemas
    pub custom_values: Vec<f64>,
}

/// Float-counted native histogram
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FloatHistogram {
    pub count: f64,
    pub sum: f64,
    pub schema: i32,
    pub zero_threshold: f64,
    pub zero_count: f64,
    pub positive_spans: Vec<BucketSpan>,
    /// Absolute bucket counts (not deltas)
    pub positive_counts: Vec<f64>,
    pub negative_spans: Vec<BucketSpan>,
    pub negative_counts: Vec<f64>,
    pub custom_values: Vec<f64>,
}

impl Histogram {
    /// Reinterpret classic cumulative buckets as a custom-bucket native
    /// histogram. `buckets` are (upper_bound, cumulative_count) pairs in
    /// ascending bound order; a trailing `+Inf` bucket is implied by
    /// `count` when absent.
    pub fn from_classic(count: u64, sum: f64, buckets: &[(f64, u64)]) -> Self {
        let mut bounds = Vec::with_capacity(buckets.len());
        let mut deltas = Vec::with_capacity(buckets.len() + 1);
        let mut prev_cumulative = 0u64;
        let mut prev_bucket = 0i64;

        for &(upper, cumulative) in buckets {
            let in_bucket = cumulative.saturating_sub(prev_cumulative) as i64;
            if upper.is_infinite() {
                deltas.push(in_bucket - prev_bucket);
                prev_bucket = in_bucket;
            } else {
                bounds.push(upper);
                deltas.push(in_bucket - prev_bucket);
                prev_bucket = in_bucket;
            }
            prev_cumulative = cumulative;
        }

        // Synthesize the +Inf bucket when the exposition omitted it.
        if buckets.last().map_or(true, |&(u, _)| !u.is_infinite()) {
            let in_bucket = count.saturating_sub(prev_cumulative) as i64;
            deltas.push(in_bucket - prev_bucket);
        }

        let length = deltas.len() as u32;
        Self {
            count,
            sum,
            schema: CUSTOM_BUCKETS_SCHEMA,
            positive_spans: vec![BucketSpan { offset: 0, length }],
            positive_deltas: deltas,
            custom_values: bounds,
            ..Default::default()
        }
    }
}

/// The histogram value of the current entry: exactly one representation is
/// populated, enforced by construction
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum HistogramValue<'a> {
    Integer(&'a Histogram),
    Float(&'a FloatHistogram),
}

impl HistogramValue<'_> {
    /// Total observation count, widening integer counts to f64
    pub fn count(&self) -> f64 {
        match self {
            Self::Integer(h) => h.count as f64,
            Self::Float(h) => h.count,
        }
    }

    /// Sum of observations
    pub fn sum(&self) -> f64 {
        match self {
            Self::Integer(h) => h.sum,
            Self::Float(h) => h.sum,
        }
    }
}
