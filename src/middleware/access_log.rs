use std::time::Instant;

use http::StatusCode;
use tracing::info;

use crate::handler::{HandleFunc, Middleware, handler, middleware};

/// One `info!` event per request, after the rest of the chain has run.
pub fn access_log() -> Middleware {
    middleware(|next: HandleFunc| {
        handler(move |ctx| {
            let next = next.clone();
            Box::pin(async move {
                let start = Instant::now();
                let method = ctx.method().clone();
                let path = ctx.path().to_owned();

                next.call(ctx).await;

                let status = ctx.status().unwrap_or(StatusCode::OK);
                info!(
                    method = %method,
                    path = %path,
                    status = status.as_u16(),
                    latency_ms = start.elapsed().as_secs_f64() * 1000.0,
                    "request"
                );
            })
        })
    })
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;

    use super::*;
    use crate::context::Context;
    use crate::handler::chain;

    #[tokio::test]
    async fn passes_the_response_through() {
        let h = chain(
            &[access_log()],
            handler(|ctx| {
                Box::pin(async move {
                    ctx.set_status(StatusCode::CREATED);
                    ctx.write_string("made");
                })
            }),
        );
        let mut ctx = Context::new(http::Request::new(Bytes::new()));
        h.call(&mut ctx).await;
        assert_eq!(ctx.status(), Some(StatusCode::CREATED));
        assert_eq!(ctx.resp_data(), b"made");
    }
}
