use std::io;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum_extra::headers::ContentRange;
use axum_extra::TypedHeader;
use thiserror::Error;

/// A `Range` value that does not follow the single-range grammar.
///
/// The responder recovers from these by ignoring the header.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HeaderMalformed {
    #[error("range header is not visible ASCII")]
    NotText,
    #[error("multiple ranges are not supported")]
    MultipleRanges,
    #[error("invalid range unit `{0}`")]
    Unit(String),
    #[error("invalid position `{0}`")]
    Integer(String),
    #[error("range has no position")]
    NoPosition,
    #[error("range end {last} is before start {first}")]
    Reversed { first: u64, last: u64 },
}

#[derive(Debug, Error)]
pub enum RangeError {
    #[error(transparent)]
    HeaderMalformed(#[from] HeaderMalformed),
    #[error("range not satisfiable for a resource of {size} bytes")]
    RangeUnsatisfiable { size: u64 },
    #[error("resource unavailable: {0}")]
    ResourceUnavailable(#[from] io::Error),
    #[error("resource size is unknown")]
    ResourceSizeUnknown,
}

impl RangeError {
    pub fn status(&self) -> StatusCode {
        match self {
            RangeError::HeaderMalformed(_) => StatusCode::BAD_REQUEST,
            RangeError::RangeUnsatisfiable { .. } => StatusCode::RANGE_NOT_SATISFIABLE,
            RangeError::ResourceUnavailable(e) if e.kind() == io::ErrorKind::NotFound => StatusCode::NOT_FOUND,
            RangeError::ResourceUnavailable(_) | RangeError::ResourceSizeUnknown => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for RangeError {
    fn into_response(self) -> Response {
        let status = self.status();
        match self {
            RangeError::RangeUnsatisfiable { size } => {
                let header = TypedHeader(ContentRange::unsatisfied_bytes(size));
                (status, header, ()).into_response()
            }
            RangeError::ResourceUnavailable(e) if status.is_server_error() => {
                tracing::error!(error = %e, "failed to read resource");
                status.into_response()
            }
            err => (status, err.to_string()).into_response(),
        }
    }
}
