use std::any::Any;
use std::panic::AssertUnwindSafe;

use futures_util::FutureExt;
use http::StatusCode;
use tracing::error;

use crate::handler::{HandleFunc, Middleware, handler, middleware};
use crate::response::ContentType;

/// Catches a panic from anything downstream and answers `500`.
///
/// Whatever the panicking handler had buffered is discarded.
pub fn recovery() -> Middleware {
    middleware(|next: HandleFunc| {
        handler(move |ctx| {
            let next = next.clone();
            Box::pin(async move {
                let outcome = AssertUnwindSafe(next.call(ctx)).catch_unwind().await;
                if let Err(payload) = outcome {
                    error!(
                        method = %ctx.method(),
                        path = ctx.path(),
                        panic = panic_message(payload.as_ref()),
                        "handler panicked"
                    );
                    ctx.reset_response();
                    ctx.set_status(StatusCode::INTERNAL_SERVER_ERROR);
                    ctx.set_content_type(ContentType::Text);
                    ctx.write_string("internal server error");
                }
            })
        })
    })
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&'static str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s
    } else {
        "non-string panic payload"
    }
}
