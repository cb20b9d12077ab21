//! Server-side sessions.
//!
//! Three seams:
//!
//! - a [`Store`] owns session lifecycles (generate, get, refresh, remove);
//! - a [`Propagator`] moves the session id between request and response;
//! - the [`Manager`] composes the two and memoizes the live session on the
//!   request [`Context`] so one request resolves it at most once.
//!
//! [`MemoryStore`] and [`CookiePropagator`] are the bundled implementations.

mod manager;
mod memory;
mod propagator;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;
use rand::distributions::Alphanumeric;
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::context::Context;
use crate::error::Error;

pub use self::manager::Manager;
pub use self::memory::MemoryStore;
pub use self::propagator::CookiePropagator;

/// Shortest session lifetime a store accepts.
pub const MIN_EXPIRATION: Duration = Duration::from_secs(60);
/// Longest session lifetime a store accepts.
pub const MAX_EXPIRATION: Duration = Duration::from_secs(24 * 60 * 60);
/// Lifetime used when none is configured.
pub const DEFAULT_EXPIRATION: Duration = Duration::from_secs(30 * 60);

const ID_LEN: usize = 32;
const ID_MIN_LEN: usize = 16;
const ID_MAX_LEN: usize = 128;

/// A live session: an id plus a string-keyed value map.
#[async_trait]
pub trait Session: Send + Sync {
    fn id(&self) -> &str;
    async fn get(&self, key: &str) -> Result<serde_json::Value, Error>;
    async fn set(&self, key: &str, value: serde_json::Value) -> Result<(), Error>;
}

impl dyn Session {
    /// Reads `key` and decodes it into `T`.
    pub async fn get_as<T: DeserializeOwned>(&self, key: &str) -> Result<T, Error> {
        let value = self.get(key).await?;
        serde_json::from_value(value).map_err(|e| Error::Storage(e.to_string()))
    }

    /// Encodes `value` and stores it under `key`.
    pub async fn set_as<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> Result<(), Error> {
        let value = serde_json::to_value(value).map_err(|e| Error::Encode(e.to_string()))?;
        self.set(key, value).await
    }
}

/// Session persistence.
#[async_trait]
pub trait Store: Send + Sync {
    /// Creates a fresh session for `id`, replacing any previous one.
    async fn generate(&self, id: &str) -> Result<Arc<dyn Session>, Error>;
    /// Returns the live session for `id`, or [`Error::NoSession`].
    async fn get(&self, id: &str) -> Result<Arc<dyn Session>, Error>;
    /// Restarts the lifetime of `id`, or [`Error::NoSession`].
    async fn refresh(&self, id: &str) -> Result<(), Error>;
    /// Deletes `id`. Removing an absent id succeeds.
    async fn remove(&self, id: &str) -> Result<(), Error>;
}

/// Session id transport between request and response.
pub trait Propagator: Send + Sync {
    fn inject(&self, id: &str, ctx: &mut Context) -> Result<(), Error>;
    fn extract(&self, ctx: &Context) -> Result<String, Error>;
    fn remove(&self, ctx: &mut Context) -> Result<(), Error>;
}

/// A new random session id from the thread-local CSPRNG.
pub fn generate_id() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(ID_LEN)
        .map(char::from)
        .collect()
}

/// Whether `id` has the shape of a session id: 16–128 of `[A-Za-z0-9_-]`.
pub fn is_valid_id(id: &str) -> bool {
    (ID_MIN_LEN..=ID_MAX_LEN).contains(&id.len())
        && id.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'-')
}

/// Clamps a configured lifetime into `[MIN_EXPIRATION, MAX_EXPIRATION]`;
/// zero selects [`DEFAULT_EXPIRATION`].
pub(crate) fn clamp_expiration(expiration: Duration) -> Duration {
    if expiration.is_zero() {
        return DEFAULT_EXPIRATION;
    }
    expiration.clamp(MIN_EXPIRATION, MAX_EXPIRATION)
}
