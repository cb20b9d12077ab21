//! Content types and response flushing.
//!
//! Handlers never build a response object. They buffer status, headers and
//! body on the [`Context`]; the server turns that buffer into exactly one
//! `http::Response` after the middleware chain has returned.

use bytes::Bytes;
use http::StatusCode;
use http::header::{self, HeaderValue};
use http_body_util::Full;

use crate::context::Context;

/// Common content-type values for [`Context::set_content_type`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ContentType {
    FormData,    // application/x-www-form-urlencoded
    Html,        // text/html; charset=utf-8
    Json,        // application/json; charset=utf-8
    OctetStream, // application/octet-stream  (binary / file download)
    Text,        // text/plain; charset=utf-8
}

impl ContentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::FormData    => "application/x-www-form-urlencoded",
            Self::Html        => "text/html; charset=utf-8",
            Self::Json        => "application/json; charset=utf-8",
            Self::OctetStream => "application/octet-stream",
            Self::Text        => "text/plain; charset=utf-8",
        }
    }
}

/// Converts the buffered state of `ctx` into the wire response.
///
/// Consuming the context is what guarantees nothing can change the response
/// once flushing has begun.
pub(crate) fn flush(ctx: Context) -> http::Response<Full<Bytes>> {
    let (status, headers, body) = ctx.into_parts();
    let len = body.len();

    let mut resp = http::Response::new(Full::new(body));
    *resp.status_mut() = status.unwrap_or(StatusCode::OK);
    *resp.headers_mut() = headers;
    resp.headers_mut()
        .entry(header::CONTENT_LENGTH)
        .or_insert_with(|| HeaderValue::from(len));
    resp
}

/// A bodyless response with `status`, used outside the chain.
pub(crate) fn status_only(status: StatusCode) -> http::Response<Full<Bytes>> {
    let mut resp = http::Response::new(Full::new(Bytes::new()));
    *resp.status_mut() = status;
    resp
}
