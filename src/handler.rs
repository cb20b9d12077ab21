//! Handler and middleware types.
//!
//! # How handlers are stored
//!
//! The router holds handlers of *different* types in one table, so every
//! handler is erased behind `Arc<dyn Handler>` ([`HandleFunc`]). A handler
//! borrows the request [`Context`] mutably for the duration of its future:
//!
//! ```text
//! fn hello(ctx: &mut Context) -> BoxFuture<'_> { … }   ← user writes this
//!        ↓ server.get("/", handler(hello))
//! Arc::new(FnHandler(hello))                           ← erased by handler()
//!        ↓  stored as HandleFunc = Arc<dyn Handler>
//! handler.call(&mut ctx) at request time               ← one vtable dispatch
//! ```
//!
//! The returned future borrows only the context, never the handler, so a
//! handler can be called from inside another handler's future (which is what
//! a middleware does with its `next`).
//!
//! # Middleware
//!
//! A [`Middleware`] turns the next handler into a wrapped one. The server
//! folds the registered list right-to-left around the terminal handler:
//! `effective = m1(m2(…mN(h)))`. Code before `next.call(ctx)` runs in
//! registration order, code after it runs in reverse.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::context::Context;

/// A heap-allocated future borrowing the request context for `'a`.
pub type BoxFuture<'a> = Pin<Box<dyn Future<Output = ()> + Send + 'a>>;

/// Implemented by every route handler.
///
/// Closures and plain functions become handlers through [`handler`]:
///
/// ```rust,no_run
/// use weft::{handler, BoxFuture, Context};
///
/// fn hello(ctx: &mut Context) -> BoxFuture<'_> {
///     Box::pin(async move { ctx.write_string("hello") })
/// }
///
/// let h = handler(hello);
/// ```
///
/// Types that carry state implement it directly and clone whatever they need
/// into the future.
pub trait Handler: Send + Sync + 'static {
    fn call<'a>(&self, ctx: &'a mut Context) -> BoxFuture<'a>;
}

/// A type-erased handler shared across concurrent requests.
pub type HandleFunc = Arc<dyn Handler>;

impl Handler for HandleFunc {
    fn call<'a>(&self, ctx: &'a mut Context) -> BoxFuture<'a> {
        (**self).call(ctx)
    }
}

/// Wraps one handler into another.
pub type Middleware = Arc<dyn Fn(HandleFunc) -> HandleFunc + Send + Sync>;

struct FnHandler<F>(F);

impl<F> Handler for FnHandler<F>
where
    F: for<'a> Fn(&'a mut Context) -> BoxFuture<'a> + Send + Sync + 'static,
{
    fn call<'a>(&self, ctx: &'a mut Context) -> BoxFuture<'a> {
        (self.0)(ctx)
    }
}

/// Erases a function or closure into a [`HandleFunc`].
///
/// Passing the closure through this function lets the compiler infer the
/// higher-ranked signature, so `|ctx| Box::pin(async move { … })` just works.
pub fn handler<F>(f: F) -> HandleFunc
where
    F: for<'a> Fn(&'a mut Context) -> BoxFuture<'a> + Send + Sync + 'static,
{
    Arc::new(FnHandler(f))
}

/// Erases a closure into a [`Middleware`].
///
/// ```rust,no_run
/// use weft::{handler, middleware, HandleFunc};
///
/// let server_header = middleware(|next: HandleFunc| {
///     handler(move |ctx| {
///         let next = next.clone();
///         Box::pin(async move {
///             next.call(ctx).await;
///             ctx.set_header("server", "weft");
///         })
///     })
/// });
/// ```
pub fn middleware<F>(f: F) -> Middleware
where
    F: Fn(HandleFunc) -> HandleFunc + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Folds `middlewares` right-to-left around `terminal`.
pub(crate) fn chain(middlewares: &[Middleware], terminal: HandleFunc) -> HandleFunc {
    middlewares
        .iter()
        .rev()
        .fold(terminal, |next, m| m(next))
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;

    fn labelled(log: Arc<Mutex<Vec<String>>>, name: &'static str, call_next: bool) -> Middleware {
        middleware(move |next: HandleFunc| {
            let log = log.clone();
            handler(move |ctx| {
                let next = next.clone();
                let log = log.clone();
                Box::pin(async move {
                    log.lock().unwrap().push(format!("{name} before"));
                    if call_next {
                        next.call(ctx).await;
                    }
                    log.lock().unwrap().push(format!("{name} after"));
                })
            })
        })
    }

    fn terminal(log: Arc<Mutex<Vec<String>>>) -> HandleFunc {
        handler(move |ctx| {
            let log = log.clone();
            Box::pin(async move {
                log.lock().unwrap().push("handler".to_owned());
                ctx.write_string("done");
            })
        })
    }

    #[tokio::test]
    async fn runs_fifo_before_lifo_after() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mws = vec![labelled(log.clone(), "mw1", true), labelled(log.clone(), "mw2", true)];
        let root = chain(&mws, terminal(log.clone()));

        let mut ctx = Context::new(http::Request::new(bytes::Bytes::new()));
        root.call(&mut ctx).await;

        assert_eq!(
            *log.lock().unwrap(),
            ["mw1 before", "mw2 before", "handler", "mw2 after", "mw1 after"]
        );
    }

    #[tokio::test]
    async fn skipping_next_aborts_downstream() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mws = vec![
            labelled(log.clone(), "mw1", true),
            labelled(log.clone(), "mw2", false),
            labelled(log.clone(), "mw3", true),
        ];
        let root = chain(&mws, terminal(log.clone()));

        let mut ctx = Context::new(http::Request::new(bytes::Bytes::new()));
        root.call(&mut ctx).await;

        assert_eq!(*log.lock().unwrap(), ["mw1 before", "mw2 before", "mw2 after", "mw1 after"]);
        assert!(ctx.resp_data().is_empty());
    }

    #[tokio::test]
    async fn empty_chain_is_the_terminal_handler() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let root = chain(&[], terminal(log.clone()));

        let mut ctx = Context::new(http::Request::new(bytes::Bytes::new()));
        root.call(&mut ctx).await;

        assert_eq!(*log.lock().unwrap(), ["handler"]);
        assert_eq!(ctx.resp_data(), b"done");
    }
}
