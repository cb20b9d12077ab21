//! # weft
//!
//! A small HTTP application framework on hyper and tokio.
//!
//! Requests run through an ordered chain of middlewares around a routed
//! handler. Handlers never write to the socket: they buffer status, headers
//! and body on the per-request [`Context`], and the server flushes that
//! buffer once after the whole chain has returned.
//!
//! What ships with it:
//!
//! - Priority routing over `"METHOD /path/{param}"` patterns, with `{$}`
//!   exact-match and `{name...}` wildcard segments
//! - A middleware chain with access log, panic recovery and rate limiting
//! - Query, form, JSON, cookie and path-parameter access on the context
//! - Templates through [`template::JinjaEngine`]
//! - Sessions with pluggable stores and id propagation
//! - File upload, download and LRU-cached static files
//! - Graceful shutdown on SIGTERM / Ctrl-C, with a drain deadline
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use serde::{Deserialize, Serialize};
//! use weft::{Server, handler, middleware};
//!
//! #[derive(Deserialize, Serialize)]
//! struct Counter {
//!     count: i64,
//! }
//!
//! #[tokio::main]
//! async fn main() -> weft::Result<()> {
//!     let mut server = Server::new();
//!     server.use_middlewares([middleware::access_log(), middleware::recovery()]);
//!
//!     server.post("/increment", handler(|ctx| Box::pin(async move {
//!         match ctx.bind_json::<Counter>() {
//!             Ok(c) => {
//!                 let _ = ctx.resp_json_ok(&Counter { count: c.count + 1 });
//!             }
//!             Err(e) => ctx.resp_error(&e),
//!         }
//!     })))?;
//!
//!     server.get("/users/{id}", handler(|ctx| Box::pin(async move {
//!         let id = ctx.path_value("id").string().unwrap_or_default();
//!         ctx.write_string(format!("user {id}"));
//!     })))?;
//!
//!     server.run("0.0.0.0:3000").await
//! }
//! ```

mod config;
mod context;
mod error;
mod handler;
mod method;
mod response;
mod router;
mod server;

pub mod files;
pub mod middleware;
pub mod session;
pub mod template;

pub use config::ServerConfig;
pub use context::{Context, StringValue};
pub use error::{Error, Result};
pub use handler::{BoxFuture, HandleFunc, Handler, Middleware, handler, middleware};
pub use method::Method;
pub use response::ContentType;
pub use router::Router;
pub use server::{Server, shutdown_signal};
