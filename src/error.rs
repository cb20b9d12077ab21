//! Unified error type.

use http::StatusCode;
use thiserror::Error;

/// The error type returned by weft's fallible operations.
///
/// Registration errors (`MalformedPattern`, `DuplicateRoute`, `InvalidMethod`)
/// surface while the server is being built. Everything else is returned as a
/// value from a [`Context`](crate::Context) accessor or helper and left to the
/// handler to decide on; [`Error::status_code`] gives the conventional mapping.
#[derive(Debug, Error)]
pub enum Error {
    #[error("malformed pattern `{pattern}`: {reason}")]
    MalformedPattern { pattern: String, reason: &'static str },

    #[error("route `{method} {pattern}` is already registered")]
    DuplicateRoute { method: String, pattern: String },

    #[error("invalid HTTP method `{0}`")]
    InvalidMethod(String),

    #[error("no route matches the request")]
    RouteNotFound,

    #[error("invalid request body: {0}")]
    InvalidRequestBody(String),

    #[error("missing parameter `{0}`")]
    MissingParameter(String),

    #[error("value `{0}` is out of range")]
    OutOfRange(String),

    #[error("value `{0}` is not a number")]
    InvalidNumber(String),

    #[error("failed to encode response: {0}")]
    Encode(String),

    #[error("no template engine configured")]
    NoTemplateEngine,

    #[error("template `{0}` not found")]
    TemplateNotFound(String),

    #[error("template error: {0}")]
    Template(String),

    #[error("no session")]
    NoSession,

    #[error("session key `{0}` not found")]
    SessionKeyNotFound(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("illegal path `{0}`")]
    PathTraversal(String),

    #[error("unsupported file type `{0}`")]
    UnsupportedFileType(String),

    #[error("permission denied")]
    Forbidden,

    #[error("file not found")]
    FileNotFound,

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("failed to bind `{addr}`: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// The HTTP status a handler would normally answer with for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::RouteNotFound | Self::FileNotFound => StatusCode::NOT_FOUND,
            Self::InvalidRequestBody(_)
            | Self::MissingParameter(_)
            | Self::OutOfRange(_)
            | Self::InvalidNumber(_)
            | Self::PathTraversal(_)
            | Self::UnsupportedFileType(_) => StatusCode::BAD_REQUEST,
            Self::NoSession => StatusCode::UNAUTHORIZED,
            Self::Forbidden => StatusCode::FORBIDDEN,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// `Result` specialised to [`Error`].
pub type Result<T, E = Error> = std::result::Result<T, E>;
