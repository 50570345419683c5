//! Content-type negotiation
//!
//! Decides which exposition format to parse from a declared Content-Type
//! and a statically configured fallback. Pure string work: nothing here
//! touches the payload buffer.
//!
//! A blank Content-Type with a configured fallback succeeds silently, while
//! a present-but-unparsable one succeeds with a warning. The asymmetry is
//! deliberate: lenient legacy scrapers send no Content-Type at all, and
//! that path must stay quiet.

use crate::error::{MediaTypeError, ParseError};
use crate::{OPENMETRICS_TEXT, PROTOBUF_DELIMITED, TEXT_PLAIN};

/// Parse `type/subtype` out of a media type string, ignoring parameters.
///
/// Both parts must be non-empty RFC 7230 tokens; the result is lowercased.
pub fn parse_media_type(s: &str) -> Result<String, MediaTypeError> {
    let essence = s.split(';').next().unwrap_or("").trim();
    let (main, sub) = essence
        .split_once('/')
        .ok_or(MediaTypeError::MissingSlash)?;

    if main.is_empty() || sub.is_empty() {
        return Err(MediaTypeError::EmptyPart);
    }
    for part in [main, sub] {
        if let Some(c) = part.chars().find(|&c| !is_token_char(c)) {
            return Err(MediaTypeError::InvalidCharacter(c));
        }
    }

    Ok(format!(
        "{}/{}",
        main.to_ascii_lowercase(),
        sub.to_ascii_lowercase()
    ))
}

/// Resolve the media type to parse as.
///
/// Returns the chosen media type plus an advisory warning when the fallback
/// had to be used for a bad (but present) Content-Type. Fails when no
/// usable media type remains.
pub fn resolve(content_type: &str, fallback: &str) -> crate::Result<(String, Option<ParseError>)> {
    if content_type.is_empty() {
        if fallback.is_empty() {
            return Err(ParseError::MissingContentType);
        }
        // Legacy scrapers send no Content-Type; accept the fallback quietly.
        return Ok((fallback.to_string(), None));
    }

    let media_type = match parse_media_type(content_type) {
        Ok(media_type) => media_type,
        Err(cause) => {
            let err = ParseError::unparsable_content_type(content_type, cause);
            if fallback.is_empty() {
                return Err(err);
            }
            return Ok((fallback.to_string(), Some(err)));
        }
    };

    match media_type.as_str() {
        TEXT_PLAIN | OPENMETRICS_TEXT | PROTOBUF_DELIMITED => Ok((media_type, None)),
        _ => {
            let err = ParseError::unrecognized_content_type(&media_type);
            if fallback.is_empty() {
                return Err(err);
            }
            Ok((fallback.to_string(), Some(err)))
        }
    }
}

/// RFC 7230 tchar
fn is_token_char(c: char) -> bool {
    c.is_ascii_alphanumeric()
        || matches!(
            c,
            '!' | '#' | '$' | '%' | '&' | '\'' | '*' | '+' | '-' | '.' | '^' | '_' | '`' | '|'
                | '~'
        )
}
