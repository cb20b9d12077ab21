use std::sync::{Arc, Mutex, PoisonError};

use http::StatusCode;
use tokio::time::Instant;
use tracing::warn;

use crate::handler::{HandleFunc, Middleware, handler, middleware};
use crate::response::ContentType;

struct TokenBucket {
    capacity: f64,
    refill_per_sec: f64,
    tokens: f64,
    last_update: Instant,
}

impl TokenBucket {
    fn new(capacity: u32, refill_per_sec: f64) -> Self {
        let capacity = f64::from(capacity.max(1));
        Self { capacity, refill_per_sec, tokens: capacity, last_update: Instant::now() }
    }

    fn try_acquire(&mut self) -> bool {
        let now = Instant::now();
        let elapsed = now.duration_since(self.last_update).as_secs_f64();
        self.tokens = (self.tokens + elapsed * self.refill_per_sec).min(self.capacity);
        self.last_update = now;

        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            true
        } else {
            false
        }
    }
}

/// A single token bucket shared by every request through this middleware.
///
/// Starts full with `capacity` tokens and regains `refill_per_sec` per
/// second. A request that finds the bucket empty answers `429` without
/// reaching the rest of the chain.
pub fn rate_limit(capacity: u32, refill_per_sec: f64) -> Middleware {
    let bucket = Arc::new(Mutex::new(TokenBucket::new(capacity, refill_per_sec.max(0.0))));
    middleware(move |next: HandleFunc| {
        let bucket = Arc::clone(&bucket);
        handler(move |ctx| {
            let next = next.clone();
            let admitted = bucket.lock().unwrap_or_else(PoisonError::into_inner).try_acquire();
            Box::pin(async move {
                if admitted {
                    next.call(ctx).await;
                } else {
                    warn!(path = ctx.path(), "rate limit exceeded");
                    ctx.set_status(StatusCode::TOO_MANY_REQUESTS);
                    ctx.set_content_type(ContentType::Text);
                    ctx.write_string("rate limit exceeded");
                }
            })
        })
    })
}
