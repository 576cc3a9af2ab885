//! # media-range
//!
//! Bounded HTTP range responses for audio and video over [`axum`][1].
//!
//! A [`Ranged`] responder takes the raw `Range` header, a seekable body of
//! known size, a mime type and a chunk ceiling. It answers with at most one
//! chunk of the resource:
//!
//! * no `Range` header, or one that cannot be parsed: `200 OK` with the first
//!   `ceiling` bytes,
//! * a satisfiable range: `206 Partial Content` with the requested bytes,
//!   capped to `ceiling`,
//! * a range starting or ending past the resource: `416 Range Not
//!   Satisfiable` with `Content-Range: bytes */<size>`.
//!
//! Large files are therefore delivered as a sequence of bounded partial
//! responses, each one a separate client request.
//!
//! Any type implementing both [`AsyncRead`] and [`AsyncSeekStart`] can be
//! used through the [`KnownSize`] adapter struct. [`AsyncSeekStart`] is
//! automatically implemented for any type implementing [`AsyncSeek`].
//!
//! ```
//! use std::num::NonZeroU64;
//!
//! use axum::Router;
//! use axum::http::{HeaderMap, header};
//! use axum::routing::get;
//!
//! use media_range::{KnownSize, Ranged, RangedResponse, RangeError};
//!
//! async fn song(headers: HeaderMap) -> Result<RangedResponse, RangeError> {
//!     let body = KnownSize::open("static/song.mp3").await?;
//!     let range = headers.get(header::RANGE).cloned();
//!     let ceiling = NonZeroU64::new(1024 * 1024).unwrap();
//!     Ranged::new(range, body, "audio/mpeg", ceiling).respond().await
//! }
//!
//! let _app = Router::<()>::new().route("/song.mp3", get(song));
//! ```
//!
//! [1]: https://docs.rs/axum

mod chunk;
mod file;

pub mod config;
pub mod error;
pub mod header;
pub mod health;
pub mod server;
pub mod window;

use std::io;
use std::num::NonZeroU64;
use std::pin::Pin;
use std::task::{Context, Poll};

use axum::http::{header::CONTENT_TYPE, HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum_extra::headers::{AcceptRanges, CacheControl, ContentLength, ContentRange, HeaderMapExt};
use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncSeek};
use tracing::debug;

use chunk::ReadChunk;
pub use error::{HeaderMalformed, RangeError};
pub use file::KnownSize;
pub use header::RangeRequest;
pub use window::ServingWindow;

/// [`AsyncSeek`] narrowed to only allow seeking from start.
pub trait AsyncSeekStart {
    /// Same semantics as [`AsyncSeek::start_seek`], always passing position as the `SeekFrom::Start` variant.
    fn start_seek(self: Pin<&mut Self>, position: u64) -> io::Result<()>;

    /// Same semantics as [`AsyncSeek::poll_complete`], returning `()` instead of the new stream position.
    fn poll_complete(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>>;
}

impl<T: AsyncSeek> AsyncSeekStart for T {
    fn start_seek(self: Pin<&mut Self>, position: u64) -> io::Result<()> {
        AsyncSeek::start_seek(self, io::SeekFrom::Start(position))
    }

    fn poll_complete(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        AsyncSeek::poll_complete(self, cx).map_ok(|_| ())
    }
}

/// An [`AsyncRead`] and [`AsyncSeekStart`] with a fixed known byte size.
pub trait RangeBody: AsyncRead + AsyncSeekStart {
    /// The total size of the underlying file.
    ///
    /// This should not change for the lifetime of the object once queried.
    /// Behaviour is not guaranteed if it does change.
    fn byte_size(&self) -> u64;
}

/// The main responder type. Consumed by [`Ranged::respond`].
#[derive(Debug)]
pub struct Ranged<B: RangeBody + Send + 'static> {
    range: Option<HeaderValue>,
    body: B,
    content_type: String,
    ceiling: NonZeroU64,
}

impl<B: RangeBody + Send + 'static> Ranged<B> {
    /// Construct a ranged response over any type implementing [`RangeBody`],
    /// the raw `Range` header if the request carried one, the mime type to
    /// advertise and the most bytes a single response may carry.
    pub fn new(
        range: Option<HeaderValue>,
        body: B,
        content_type: impl Into<String>,
        ceiling: NonZeroU64,
    ) -> Self {
        Ranged { range, body, content_type: content_type.into(), ceiling }
    }

    /// Reads the selected window and returns it as [`RangedResponse`].
    ///
    /// The body is dropped before this returns, whatever the outcome. Only
    /// I/O failures are errors; a malformed header falls back to serving
    /// from the start and an unsatisfiable range is
    /// [`RangedResponse::Unsatisfiable`].
    pub async fn respond(self) -> Result<RangedResponse, RangeError> {
        let Ranged { range, body, content_type, ceiling } = self;
        let size = body.byte_size();

        let request = header::parse_header_value(range.as_ref()).unwrap_or_else(|e| {
            debug!(error = %e, "ignoring malformed range header");
            None
        });

        let window = match request {
            None => None,
            Some(request) => match ServingWindow::resolve(&request, size, ceiling) {
                Ok(window) => Some(window),
                Err(RangeError::HeaderMalformed(e)) => {
                    debug!(error = %e, %request, "ignoring unresolvable range");
                    None
                }
                Err(RangeError::RangeUnsatisfiable { size }) => {
                    debug!(%request, size, "range not satisfiable");
                    let content_range = ContentRange::unsatisfied_bytes(size);
                    return Ok(RangedResponse::Unsatisfiable { content_range, content_type });
                }
                Err(e) => return Err(e),
            },
        };

        let Some(window) = window else {
            let data = match ServingWindow::leading(size, ceiling) {
                Some(window) => ReadChunk::new(body, window.start, window.len()).await?,
                None => Bytes::new(),
            };
            debug!(size, served = data.len(), "serving leading chunk");
            return Ok(RangedResponse::Full { content_type, data });
        };

        let data = ReadChunk::new(body, window.start, window.len()).await?;
        if data.is_empty() {
            let eof = io::Error::new(io::ErrorKind::UnexpectedEof, "resource ended before the requested range");
            return Err(eof.into());
        }

        // the resource may have shrunk since it was sized
        let served = ServingWindow { start: window.start, end: window.start + data.len() as u64 - 1 };
        debug!(start = served.start, end = served.end, size, "serving partial content");
        let content_range = served.content_range(size)?;
        Ok(RangedResponse::Partial { content_range, content_type, data })
    }
}

/// Computed status, headers and body of one ranged response. Implements [`IntoResponse`].
#[derive(Debug, Clone, PartialEq)]
pub enum RangedResponse {
    /// No usable range was requested; carries the leading chunk.
    Full {
        content_type: String,
        data: Bytes,
    },
    Partial {
        content_range: ContentRange,
        content_type: String,
        data: Bytes,
    },
    Unsatisfiable {
        content_range: ContentRange,
        content_type: String,
    },
}

impl RangedResponse {
    pub fn status(&self) -> StatusCode {
        match self {
            RangedResponse::Full { .. } => StatusCode::OK,
            RangedResponse::Partial { .. } => StatusCode::PARTIAL_CONTENT,
            RangedResponse::Unsatisfiable { .. } => StatusCode::RANGE_NOT_SATISFIABLE,
        }
    }

    pub fn data(&self) -> &[u8] {
        match self {
            RangedResponse::Full { data, .. } | RangedResponse::Partial { data, .. } => data,
            RangedResponse::Unsatisfiable { .. } => &[],
        }
    }

    pub fn content_range(&self) -> Option<&ContentRange> {
        match self {
            RangedResponse::Full { .. } => None,
            RangedResponse::Partial { content_range, .. }
            | RangedResponse::Unsatisfiable { content_range, .. } => Some(content_range),
        }
    }

    fn content_type(&self) -> &str {
        match self {
            RangedResponse::Full { content_type, .. }
            | RangedResponse::Partial { content_type, .. }
            | RangedResponse::Unsatisfiable { content_type, .. } => content_type,
        }
    }

    /// `Accept-Ranges`, `Content-Type`, `Cache-Control` and `Content-Length`
    /// on every response, plus `Content-Range` on 206 and 416.
    pub fn headers(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.typed_insert(AcceptRanges::bytes());
        headers.insert(
            CONTENT_TYPE,
            HeaderValue::from_str(self.content_type())
                .unwrap_or_else(|_| HeaderValue::from_static("application/octet-stream")),
        );
        headers.typed_insert(CacheControl::new().with_no_cache());
        headers.typed_insert(ContentLength(self.data().len() as u64));
        if let Some(content_range) = self.content_range() {
            headers.typed_insert(content_range.clone());
        }
        headers
    }
}

impl IntoResponse for RangedResponse {
    fn into_response(self) -> Response {
        let status = self.status();
        let headers = self.headers();
        let body = match self {
            RangedResponse::Full { data, .. } | RangedResponse::Partial { data, .. } => data,
            RangedResponse::Unsatisfiable { .. } => Bytes::new(),
        };
        (status, headers, body).into_response()
    }
}
