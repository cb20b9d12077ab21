//! Built-in middleware.
//!
//! Each constructor returns a [`Middleware`](crate::Middleware) ready for
//! [`Server::use_middleware`](crate::Server::use_middleware):
//!
//! - [`access_log`] emits one `info` event per request with method, path,
//!   status and latency.
//! - [`recovery`] turns a panic anywhere downstream into a logged `500`.
//! - [`rate_limit`] is a single global token bucket answering `429`.
//!
//! The first middleware registered runs outermost. Register `access_log`
//! before `recovery` so a recovered `500` is still logged:
//!
//! ```rust,no_run
//! use weft::{Server, middleware};
//!
//! let mut server = Server::new();
//! server.use_middlewares([middleware::access_log(), middleware::recovery()]);
//! ```

mod access_log;
mod rate_limit;
mod recovery;

pub use self::access_log::access_log;
pub use self::rate_limit::rate_limit;
pub use self::recovery::recovery;
