//! HTTP server and graceful shutdown.
//!
//! # Request lifecycle
//!
//! 1. hyper parses the request head; the body is collected within
//!    `read_timeout` (`408` on expiry).
//! 2. A fresh [`Context`] is built and the route is resolved onto it.
//! 3. The composed middleware chain runs within `write_timeout` (`503` on
//!    expiry). Its innermost step calls the matched handler, or answers `404`.
//! 4. The buffered response is flushed once.
//!
//! # Graceful shutdown and Kubernetes
//!
//! When Kubernetes terminates a pod it sends **SIGTERM** and waits
//! `terminationGracePeriodSeconds` (default 30 s) before sending SIGKILL.
//!
//! The server reacts by:
//! 1. Immediately stopping `listener.accept()`, so no new connections are made.
//! 2. Asking every open connection to finish its current request and close.
//! 3. Waiting up to `shutdown_timeout` for them, then aborting the rest.
//!
//! Keep `shutdown_timeout` below `terminationGracePeriodSeconds`.

use std::convert::Infallible;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::{Arc, OnceLock};

use bytes::Bytes;
use http::StatusCode;
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::{TokioIo, TokioTimer};
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::config::ServerConfig;
use crate::context::{Context, RemoteAddr};
use crate::error::Error;
use crate::handler::{HandleFunc, Handler, Middleware, chain, handler};
use crate::method::Method;
use crate::response::{flush, status_only};
use crate::router::Router;
use crate::session::Manager;
use crate::template::TemplateEngine;

/// The application: routes, middleware and shared services.
///
/// Everything is registered through `&mut Server`. Serving moves the server
/// behind an `Arc`, which freezes the configuration for the lifetime of the
/// listener.
///
/// ```rust,no_run
/// use weft::{Server, handler};
///
/// #[tokio::main]
/// async fn main() -> weft::Result<()> {
///     let mut server = Server::new();
///     server.get("/hello", handler(|ctx| Box::pin(async move {
///         ctx.write_string("hello");
///     })))?;
///     server.run("0.0.0.0:3000").await
/// }
/// ```
pub struct Server {
    config: ServerConfig,
    router: Router,
    middlewares: Vec<Middleware>,
    template_engine: Option<Arc<dyn TemplateEngine>>,
    session_manager: Option<Arc<Manager>>,
    root: OnceLock<HandleFunc>,
}

impl Default for Server {
    fn default() -> Self {
        Self::with_config(ServerConfig::default())
    }
}

impl Server {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: ServerConfig) -> Self {
        Self {
            config,
            router: Router::new(),
            middlewares: Vec::new(),
            template_engine: None,
            session_manager: None,
            root: OnceLock::new(),
        }
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    // ── Registration ──────────────────────────────────────────────────────────

    /// Registers `handler` under a `"METHOD /path"` pattern.
    ///
    /// ```rust,no_run
    /// # use weft::{Server, handler};
    /// # let mut server = Server::new();
    /// server.handle("GET /users/{id}", handler(|ctx| Box::pin(async move {
    ///     let id = ctx.path_value("id").string().unwrap_or_default();
    ///     ctx.write_string(id);
    /// }))).unwrap();
    /// ```
    pub fn handle(&mut self, pattern: &str, handler: impl Handler) -> Result<(), Error> {
        let (method, path) = pattern
            .trim()
            .split_once(char::is_whitespace)
            .ok_or_else(|| Error::MalformedPattern {
                pattern: pattern.to_owned(),
                reason: "expected `METHOD /path`",
            })?;
        let method: Method = method.parse()?;
        self.router.register(method, path.trim_start(), handler)
    }

    pub fn get(&mut self, path: &str, handler: impl Handler) -> Result<(), Error> {
        self.router.register(Method::Get, path, handler)
    }

    pub fn post(&mut self, path: &str, handler: impl Handler) -> Result<(), Error> {
        self.router.register(Method::Post, path, handler)
    }

    pub fn put(&mut self, path: &str, handler: impl Handler) -> Result<(), Error> {
        self.router.register(Method::Put, path, handler)
    }

    pub fn delete(&mut self, path: &str, handler: impl Handler) -> Result<(), Error> {
        self.router.register(Method::Delete, path, handler)
    }

    pub fn patch(&mut self, path: &str, handler: impl Handler) -> Result<(), Error> {
        self.router.register(Method::Patch, path, handler)
    }

    pub fn head(&mut self, path: &str, handler: impl Handler) -> Result<(), Error> {
        self.router.register(Method::Head, path, handler)
    }

    pub fn options(&mut self, path: &str, handler: impl Handler) -> Result<(), Error> {
        self.router.register(Method::Options, path, handler)
    }

    /// Appends a middleware. The first one registered is the outermost.
    pub fn use_middleware(&mut self, m: Middleware) {
        self.middlewares.push(m);
        self.root = OnceLock::new();
    }

    pub fn use_middlewares(&mut self, ms: impl IntoIterator<Item = Middleware>) {
        self.middlewares.extend(ms);
        self.root = OnceLock::new();
    }

    /// Engine behind [`Context::resp_template`].
    pub fn template_engine(&mut self, engine: Arc<dyn TemplateEngine>) {
        self.template_engine = Some(engine);
    }

    /// Manager behind [`Context::session_manager`].
    pub fn session_manager(&mut self, manager: Arc<Manager>) {
        self.session_manager = Some(manager);
    }

    // ── Dispatch ──────────────────────────────────────────────────────────────

    /// The middleware chain around route dispatch, composed on first use.
    fn root(&self) -> &HandleFunc {
        self.root.get_or_init(|| chain(&self.middlewares, dispatch_route()))
    }

    /// Runs one fully-read request through the application.
    ///
    /// This is what every connection calls; it is public so applications can
    /// be exercised without a socket.
    pub async fn serve_http(&self, req: http::Request<Bytes>) -> http::Response<Full<Bytes>> {
        let Ok(method) = Method::try_from(req.method()) else {
            return status_only(StatusCode::METHOD_NOT_ALLOWED);
        };

        let mut ctx = Context::new(req);
        if let Some(engine) = &self.template_engine {
            ctx = ctx.with_template_engine(Arc::clone(engine));
        }
        if let Some(manager) = &self.session_manager {
            ctx = ctx.with_session_manager(Arc::clone(manager));
        }
        if let Some(m) = self.router.lookup(method, ctx.path()) {
            ctx.set_route(m.pattern, m.handler, m.params);
        }

        let root = Arc::clone(self.root());
        if tokio::time::timeout(self.config.write_timeout, root.call(&mut ctx)).await.is_err() {
            warn!(method = %ctx.method(), path = ctx.path(), "write timeout elapsed");
            return status_only(StatusCode::SERVICE_UNAVAILABLE);
        }
        flush(ctx)
    }

    async fn serve_incoming(
        &self,
        req: hyper::Request<Incoming>,
        remote_addr: SocketAddr,
    ) -> http::Response<Full<Bytes>> {
        let (mut parts, body) = req.into_parts();
        let body = match tokio::time::timeout(self.config.read_timeout, body.collect()).await {
            Ok(Ok(collected)) => collected.to_bytes(),
            Ok(Err(e)) => {
                debug!(peer = %remote_addr, "failed to read request body: {e}");
                return status_only(StatusCode::BAD_REQUEST);
            }
            Err(_) => return status_only(StatusCode::REQUEST_TIMEOUT),
        };
        parts.extensions.insert(RemoteAddr(remote_addr));
        self.serve_http(http::Request::from_parts(parts, body)).await
    }

    // ── Serving ───────────────────────────────────────────────────────────────

    /// Binds `addr` and serves until SIGTERM or Ctrl-C.
    pub async fn run(self, addr: &str) -> Result<(), Error> {
        let listener = TcpListener::bind(addr).await.map_err(|source| Error::Bind {
            addr: addr.to_owned(),
            source,
        })?;
        self.serve_with_shutdown(listener, shutdown_signal()).await
    }

    /// Binds the configured address and serves until SIGTERM or Ctrl-C.
    pub async fn serve(self) -> Result<(), Error> {
        let addr = self.config.address.clone();
        self.run(&addr).await
    }

    /// Serves `listener` until `signal` resolves, then drains.
    ///
    /// Returns only after every connection has finished or been aborted.
    pub async fn serve_with_shutdown<F>(self, listener: TcpListener, signal: F) -> Result<(), Error>
    where
        F: Future<Output = ()> + Send,
    {
        let local_addr = listener.local_addr()?;
        let shutdown_timeout = self.config.shutdown_timeout;
        let idle_timeout = self.config.idle_timeout;
        let server = Arc::new(self);

        info!(addr = %local_addr, "weft listening");

        let (closing_tx, closing_rx) = watch::channel(false);
        let mut tasks = JoinSet::new();

        tokio::pin!(signal);

        loop {
            tokio::select! {
                biased;

                () = &mut signal => {
                    info!(in_flight = tasks.len(), "shutdown signal received, draining connections");
                    break;
                }

                res = listener.accept() => {
                    let (stream, remote_addr) = match res {
                        Ok(v) => v,
                        Err(e) => {
                            error!("accept error: {e}");
                            continue;
                        }
                    };

                    let server = Arc::clone(&server);
                    let mut closing = closing_rx.clone();
                    let io = TokioIo::new(stream);

                    tasks.spawn(async move {
                        let svc = service_fn(move |req| {
                            let server = Arc::clone(&server);
                            async move { Ok::<_, Infallible>(server.serve_incoming(req, remote_addr).await) }
                        });

                        let mut builder = http1::Builder::new();
                        builder.timer(TokioTimer::new()).header_read_timeout(idle_timeout);
                        let conn = builder.serve_connection(io, svc);
                        tokio::pin!(conn);

                        let res = tokio::select! {
                            res = conn.as_mut() => res,
                            _ = closing.changed() => {
                                conn.as_mut().graceful_shutdown();
                                conn.as_mut().await
                            }
                        };
                        if let Err(e) = res {
                            error!(peer = %remote_addr, "connection error: {e}");
                        }
                    });
                }

                Some(_) = tasks.join_next(), if !tasks.is_empty() => {}
            }
        }

        drop(listener);
        let _ = closing_tx.send(true);

        let drain = async { while tasks.join_next().await.is_some() {} };
        if tokio::time::timeout(shutdown_timeout, drain).await.is_err() {
            warn!(remaining = tasks.len(), "shutdown timeout elapsed, aborting connections");
            tasks.abort_all();
            while tasks.join_next().await.is_some() {}
        }

        info!("weft stopped");
        Ok(())
    }
}

/// Innermost step of every chain: calls the resolved route, or answers `404`.
fn dispatch_route() -> HandleFunc {
    handler(|ctx| {
        Box::pin(async move {
            match ctx.route.take() {
                Some(route) => route.call(ctx).await,
                None => ctx.resp_error(&Error::RouteNotFound),
            }
        })
    })
}

// ── Shutdown signal ───────────────────────────────────────────────────────────

/// Resolves on the first shutdown signal the process receives.
///
/// On Unix this listens for both **SIGTERM** and **SIGINT** (Ctrl-C). A
/// signal that cannot be installed is logged and never fires.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("failed to install Ctrl-C handler: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let sigterm = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut s) => {
                s.recv().await;
            }
            Err(e) => {
                error!("failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let sigterm = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c   => {}
        () = sigterm  => {}
    }
}
