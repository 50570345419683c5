//! Textparse - streaming exposition-format parser
//!
//! Converts a raw byte buffer carrying one of the metrics exposition
//! formats (plain text, OpenMetrics text, delimited protobuf) into a
//! uniform stream of typed entries: samples, native histogram samples,
//! metadata, and comments.
//!
//! # Design Principles
//!
//! - **Zero-copy**: accessors return sub-slices of the caller's buffer (or
//!   of a small internal scratch for synthesized/unescaped text); nothing
//!   is copied unless the caller copies it
//! - **One contract, three formats**: the [`Parser`] trait hides which wire
//!   format is being walked; callers never branch on the format
//! - **Shared interning**: label strings are deduplicated through a
//!   [`SymbolTable`] that many concurrent parsers share
//!
//! # Usage
//!
//! ```ignore
//! use std::sync::Arc;
//! use textparse::{new_parser, EntryKind, Labels, SymbolTable};
//!
//! let symbols = Arc::new(SymbolTable::new());
//! let (mut parser, warning) =
//!     new_parser(body, content_type, "text/plain", false, false, &symbols)?;
//! if let Some(w) = warning {
//!     // advisory only; the parser is usable
//! }
//!
//! let mut labels = Labels::new();
//! while let Some(kind) = parser.advance()? {
//!     match kind {
//!         EntryKind::Series => {
//!             let (series, ts, value) = parser.series();
//!             parser.metric(&mut labels);
//!         }
//!         EntryKind::Help => {
//!             let (name, help) = parser.help();
//!         }
//!         _ => {}
//!     }
//! }
//! ```

mod entry;
mod error;
mod histogram;
mod labels;
mod negotiate;
mod openmetrics;
mod parser;
mod promtext;
mod protobuf;
mod scan;
mod symbols;

pub use entry::{EntryKind, MetricType};
pub use error::{MediaTypeError, ParseError};
pub use histogram::{
    BucketSpan, FloatHistogram, Histogram, HistogramValue, CUSTOM_BUCKETS_SCHEMA,
};
pub use labels::{Exemplar, Labels, METRIC_NAME_LABEL};
pub use negotiate::{parse_media_type, resolve};
pub use openmetrics::OpenMetricsParser;
pub use parser::{new_parser, Parser};
pub use promtext::PromTextParser;
pub use protobuf::ProtobufParser;
pub use symbols::SymbolTable;

/// Result type for parse operations
pub type Result<T> = std::result::Result<T, ParseError>;

/// Media type of the plain text exposition format
pub const TEXT_PLAIN: &str = "text/plain";

/// Media type of the OpenMetrics text format
pub const OPENMETRICS_TEXT: &str = "application/openmetrics-text";

/// Media type of the delimited protobuf exposition format
pub const PROTOBUF_DELIMITED: &str = "application/vnd.google.protobuf";

#[cfg(test)]
mod symbols_test;
