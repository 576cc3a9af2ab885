//! Parsing of single byte-range specifiers.
//!
//! Accepts both the request-side `Range` grammar (`bytes=0-499`, `bytes=500-`,
//! `bytes=-500`) and the response-side `Content-Range` grammar
//! (`bytes 0-499/1234`, `bytes */1234`). Positions that depend on the
//! resource size (open ends, suffix lengths) are left unresolved here; see
//! [`ServingWindow::resolve`](crate::ServingWindow::resolve).

use std::fmt;
use std::str::FromStr;

use axum::http::HeaderValue;
use axum_extra::headers::ContentRange;

use crate::error::{HeaderMalformed, RangeError};

/// Unit assumed when a specifier does not name one.
pub const DEFAULT_UNIT: &str = "bytes";

/// One decoded range specifier.
///
/// `first` and `last` are inclusive, zero-based offsets. When only `last` is
/// present it is a suffix length ("the last N bytes"), when only `first` is
/// present the range runs to the end of the resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RangeRequest {
    pub unit: String,
    pub first: Option<u64>,
    pub last: Option<u64>,
    /// `None` when the length was given as `*` or not given at all.
    pub complete_length: Option<u64>,
}

impl RangeRequest {
    /// An explicit `first-last` range in bytes with unknown total length.
    pub fn bytes(first: u64, last: u64) -> Self {
        RangeRequest {
            unit: DEFAULT_UNIT.to_string(),
            first: Some(first),
            last: Some(last),
            complete_length: None,
        }
    }

    /// The last `length` bytes of the resource.
    pub fn suffix(length: u64) -> Self {
        RangeRequest {
            unit: DEFAULT_UNIT.to_string(),
            first: None,
            last: Some(length),
            complete_length: None,
        }
    }

    /// Everything from `first` to the end of the resource.
    pub fn from_offset(first: u64) -> Self {
        RangeRequest {
            unit: DEFAULT_UNIT.to_string(),
            first: Some(first),
            last: None,
            complete_length: None,
        }
    }

    pub fn with_complete_length(mut self, complete_length: u64) -> Self {
        self.complete_length = Some(complete_length);
        self
    }

    pub fn is_bytes(&self) -> bool {
        self.unit.eq_ignore_ascii_case(DEFAULT_UNIT)
    }

    /// True for the total-length-only form (`bytes */1000`, `1000`), which
    /// only appears in `Content-Range` values.
    pub fn is_length_only(&self) -> bool {
        self.first.is_none() && self.last.is_none()
    }

    /// Renders this specifier as a typed `Content-Range` header.
    ///
    /// Requires a complete length; suffix and open-ended forms must be
    /// resolved against the resource first.
    pub fn to_content_range(&self) -> Result<ContentRange, RangeError> {
        let complete_length = self.complete_length.ok_or(RangeError::ResourceSizeUnknown)?;
        match (self.first, self.last) {
            (Some(first), Some(last)) if last < first => {
                Err(HeaderMalformed::Reversed { first, last }.into())
            }
            (Some(first), Some(last)) => ContentRange::bytes(first..=last, complete_length)
                .map_err(|_| HeaderMalformed::NoPosition.into()),
            (None, None) => Ok(ContentRange::unsatisfied_bytes(complete_length)),
            _ => Err(HeaderMalformed::NoPosition.into()),
        }
    }
}

/// Renders in the `Content-Range` layout: `<unit> <range>/<length>`, where
/// `<range>` is `first-last`, `first-`, `-suffix` or `*` and an unknown length
/// is `*`. Parsing the output yields an equal value.
impl fmt::Display for RangeRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ", self.unit)?;
        match (self.first, self.last) {
            (Some(first), Some(last)) => write!(f, "{first}-{last}")?,
            (Some(first), None) => write!(f, "{first}-")?,
            (None, Some(suffix)) => write!(f, "-{suffix}")?,
            (None, None) => f.write_str("*")?,
        }
        match self.complete_length {
            Some(length) => write!(f, "/{length}"),
            None => f.write_str("/*"),
        }
    }
}

impl FromStr for RangeRequest {
    type Err = HeaderMalformed;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse(Some(s))?.ok_or(HeaderMalformed::NoPosition)
    }
}

/// Parses a raw header value.
///
/// `Ok(None)` means no range was asked for (absent or blank header); the
/// caller serves the resource from the start. A value that is not visible
/// ASCII is [`HeaderMalformed::NotText`].
pub fn parse_header_value(value: Option<&HeaderValue>) -> Result<Option<RangeRequest>, HeaderMalformed> {
    match value {
        None => Ok(None),
        Some(value) => parse(Some(value.to_str().map_err(|_| HeaderMalformed::NotText)?)),
    }
}

/// Parses a single range specifier. Pure, does not need the resource size.
///
/// `last < first` is kept as given: whether that is a 416 or a malformed
/// header depends on the size, so [`ServingWindow::resolve`](crate::ServingWindow::resolve) decides.
pub fn parse(value: Option<&str>) -> Result<Option<RangeRequest>, HeaderMalformed> {
    let value = match value.map(str::trim) {
        None | Some("") => return Ok(None),
        Some(value) => value,
    };

    if value.contains(',') {
        return Err(HeaderMalformed::MultipleRanges);
    }

    // `bytes=0-1` on requests, `bytes 0-1/2` on responses, or a bare spec
    let (unit, spec) = match value.split_once('=').or_else(|| value.split_once(' ')) {
        Some((unit, spec)) => (parse_unit(unit)?, spec.trim()),
        None => (DEFAULT_UNIT.to_string(), value),
    };

    let (range, complete_length) = match spec.split_once('/') {
        Some((range, "*")) => (range.trim(), None),
        Some((range, length)) => (range.trim(), Some(parse_position(length)?)),
        None => (spec, None),
    };

    let (first, last) = match range.split_once('-') {
        Some((first, last)) => {
            let first = first.trim();
            let last = last.trim();
            if first.is_empty() && last.is_empty() {
                return Err(HeaderMalformed::NoPosition);
            }
            let first = (!first.is_empty()).then(|| parse_position(first)).transpose()?;
            let last = (!last.is_empty()).then(|| parse_position(last)).transpose()?;
            (first, last)
        }
        // `*/<length>` is the unsatisfied form
        None if range == "*" => (None, None),
        // a lone token is a total length: `bytes=1000`, `1000`
        None if complete_length.is_none() && spec == range => {
            return Ok(Some(RangeRequest {
                unit,
                first: None,
                last: None,
                complete_length: Some(parse_position(range)?),
            }));
        }
        None => return Err(HeaderMalformed::Integer(range.to_string())),
    };

    if first.is_none() && last.is_none() && complete_length.is_none() {
        return Err(HeaderMalformed::NoPosition);
    }

    Ok(Some(RangeRequest { unit, first, last, complete_length }))
}

fn parse_unit(unit: &str) -> Result<String, HeaderMalformed> {
    let unit = unit.trim();
    if unit.is_empty() {
        return Ok(DEFAULT_UNIT.to_string());
    }
    let mut chars = unit.chars();
    let leading_letter = chars.next().is_some_and(|c| c.is_ascii_alphabetic());
    if !leading_letter || !chars.all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(HeaderMalformed::Unit(unit.to_string()));
    }
    Ok(unit.to_string())
}

/// Base-10, digits only. `u64::from_str` would also take a leading `+`.
fn parse_position(token: &str) -> Result<u64, HeaderMalformed> {
    let token = token.trim();
    if token.is_empty() || !token.bytes().all(|b| b.is_ascii_digit()) {
        return Err(HeaderMalformed::Integer(token.to_string()));
    }
    token
        .parse()
        .map_err(|_| HeaderMalformed::Integer(token.to_string()))
}
