//! Entry and metric type enums
//!
//! `EntryKind` classifies what the parser is positioned on after each
//! successful advance. The discriminants are part of the external contract
//! and must not change.

/// Kind of entry the parser is currently positioned on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i8)]
pub enum EntryKind {
    /// No current entry (sentinel, never returned by a successful advance)
    Invalid = -1,
    /// TYPE metadata for a metric family
    Type = 0,
    /// HELP metadata for a metric family
    Help = 1,
    /// A series with a plain float value
    Series = 2,
    /// A non-metadata comment line
    Comment = 3,
    /// UNIT metadata for a metric family
    Unit = 4,
    /// A series with a native histogram value
    Histogram = 5,
}

impl EntryKind {
    #[inline]
    pub const fn from_i8(value: i8) -> Self {
        match value {
            0 => Self::Type,
            1 => Self::Help,
            2 => Self::Series,
            3 => Self::Comment,
            4 => Self::Unit,
            5 => Self::Histogram,
            _ => Self::Invalid,
        }
    }

    #[inline]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Invalid => "invalid",
            Self::Type => "type",
            Self::Help => "help",
            Self::Series => "series",
            Self::Comment => "comment",
            Self::Unit => "unit",
            Self::Histogram => "histogram",
        }
    }

    /// True for entries that carry a sample (series or histogram)
    #[inline]
    pub const fn is_sample(self) -> bool {
        matches!(self, Self::Series | Self::Histogram)
    }
}

impl std::fmt::Display for EntryKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Declared type of a metric family
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u8)]
pub enum MetricType {
    Counter = 0,
    Gauge = 1,
    Histogram = 2,
    GaugeHistogram = 3,
    Summary = 4,
    Info = 5,
    Stateset = 6,
    #[default]
    Unknown = 7,
}

impl MetricType {
    /// Parse an exposition-format type token. `untyped` is the legacy
    /// spelling of `unknown`.
    pub fn from_token(token: &[u8]) -> Option<Self> {
        match token {
            b"counter" => Some(Self::Counter),
            b"gauge" => Some(Self::Gauge),
            b"histogram" => Some(Self::Histogram),
            b"gaugehistogram" => Some(Self::GaugeHistogram),
            b"summary" => Some(Self::Summary),
            b"info" => Some(Self::Info),
            b"stateset" => Some(Self::Stateset),
            b"unknown" | b"untyped" => Some(Self::Unknown),
            _ => None,
        }
    }

    #[inline]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Counter => "counter",
            Self::Gauge => "gauge",
            Self::Histogram => "histogram",
            Self::GaugeHistogram => "gaugehistogram",
            Self::Summary => "summary",
            Self::Info => "info",
            Self::Stateset => "stateset",
            Self::Unknown => "unknown",
        }
    }

    /// True for types that can carry a created timestamp
    #[inline]
    pub const fn supports_created_timestamp(self) -> bool {
        matches!(
            self,
            Self::Counter | Self::Summary | Self::Histogram | Self::GaugeHistogram
        )
    }
}

impl std::fmt::Display for MetricType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
