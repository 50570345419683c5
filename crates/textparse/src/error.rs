//! Parser error types
//!
//! Errors that can occur during content-type negotiation and exposition
//! parsing. Negotiation errors may be downgraded to warnings when a fallback
//! protocol is configured; syntax errors terminate the parser.

use thiserror::Error;

/// Errors produced while resolving a content type or parsing a payload
#[derive(Debug, Clone, Error)]
pub enum ParseError {
    /// No Content-Type header and no fallback protocol configured
    #[error("blank Content-Type and no fallback protocol configured")]
    MissingContentType,

    /// Content-Type header could not be parsed as a media type
    #[error("cannot parse Content-Type {content_type:?}")]
    UnparsableContentType {
        content_type: String,
        #[source]
        cause: MediaTypeError,
    },

    /// Media type parsed but is not a known exposition format
    #[error("unrecognized exposition media type {media_type:?}")]
    UnrecognizedContentType { media_type: String },

    /// Malformed input at the given buffer offset
    #[error("syntax error at byte {offset}: {reason}")]
    Syntax { offset: usize, reason: String },

    /// Sample value is not a valid float
    #[error("invalid sample value at byte {offset}")]
    InvalidValue { offset: usize },

    /// Timestamp token could not be parsed
    #[error("invalid timestamp at byte {offset}")]
    InvalidTimestamp { offset: usize },

    /// Invalid escape sequence in a label value or help text
    #[error("invalid escape sequence at byte {offset}")]
    InvalidEscape { offset: usize },

    /// Non-UTF-8 bytes where text is required
    #[error("invalid UTF-8 at byte {offset}")]
    InvalidUtf8 { offset: usize },

    /// Unknown metric type token in a TYPE line
    #[error("invalid metric type {found:?} at byte {offset}")]
    InvalidMetricType { offset: usize, found: String },

    /// OpenMetrics input ended without the required terminating marker
    #[error("input ended without # EOF marker")]
    MissingEofMarker,

    /// Binary message truncated
    #[error("message truncated: expected at least {expected} bytes, got {actual}")]
    Truncated { expected: usize, actual: usize },

    /// Malformed protobuf varint
    #[error("invalid varint at byte {offset}")]
    InvalidVarint { offset: usize },

    /// Required protobuf field absent
    #[error("missing required field: {0}")]
    MissingField(&'static str),
}

impl ParseError {
    /// Create a syntax error at the given offset
    #[inline]
    pub fn syntax(offset: usize, reason: impl Into<String>) -> Self {
        Self::Syntax {
            offset,
            reason: reason.into(),
        }
    }

    /// Create an unparsable Content-Type error carrying its cause
    #[inline]
    pub fn unparsable_content_type(content_type: impl Into<String>, cause: MediaTypeError) -> Self {
        Self::UnparsableContentType {
            content_type: content_type.into(),
            cause,
        }
    }

    /// Create an unrecognized media type error
    #[inline]
    pub fn unrecognized_content_type(media_type: impl Into<String>) -> Self {
        Self::UnrecognizedContentType {
            media_type: media_type.into(),
        }
    }

    /// Create a truncated message error
    #[inline]
    pub fn truncated(expected: usize, actual: usize) -> Self {
        Self::Truncated { expected, actual }
    }

    /// Create an invalid varint error
    #[inline]
    pub fn invalid_varint(offset: usize) -> Self {
        Self::InvalidVarint { offset }
    }

    /// Create a missing field error
    #[inline]
    pub fn missing_field(field: &'static str) -> Self {
        Self::MissingField(field)
    }

    /// Check if this error came from content-type negotiation
    pub fn is_negotiation(&self) -> bool {
        matches!(
            self,
            Self::MissingContentType
                | Self::UnparsableContentType { .. }
                | Self::UnrecognizedContentType { .. }
        )
    }

    /// Check if this error describes malformed payload bytes
    pub fn is_syntax(&self) -> bool {
        !self.is_negotiation()
    }
}

/// Errors from parsing a media type string (`type/subtype`)
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MediaTypeError {
    /// No `/` separating type and subtype
    #[error("missing type/subtype separator")]
    MissingSlash,

    /// Type or subtype is empty
    #[error("empty type or subtype")]
    EmptyPart,

    /// Character not allowed in a media type token
    #[error("invalid character {0:?} in media type")]
    InvalidCharacter(char),
}
