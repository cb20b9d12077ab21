//! Store + propagator composition.

use std::sync::Arc;

use super::{Propagator, Session, Store};
use crate::context::Context;
use crate::error::Error;

/// User-value key the live session is memoized under by default.
pub const DEFAULT_CTX_KEY: &str = "_weft_session";

/// Resolves, creates, refreshes and removes the session of a request.
pub struct Manager {
    store: Arc<dyn Store>,
    propagator: Arc<dyn Propagator>,
    ctx_key: String,
}

impl Manager {
    pub fn new(store: Arc<dyn Store>, propagator: Arc<dyn Propagator>) -> Self {
        Self { store, propagator, ctx_key: DEFAULT_CTX_KEY.to_owned() }
    }

    /// Memoizes the session under `key` instead of [`DEFAULT_CTX_KEY`].
    pub fn ctx_key(mut self, key: impl Into<String>) -> Self {
        self.ctx_key = key.into();
        self
    }

    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    /// The session of this request.
    ///
    /// A missing id and an id unknown to the store both surface as
    /// [`Error::NoSession`]. The result is memoized on `ctx`.
    pub async fn get_session(&self, ctx: &mut Context) -> Result<Arc<dyn Session>, Error> {
        if let Some(session) = ctx.user_value::<Arc<dyn Session>>(&self.ctx_key) {
            return Ok(Arc::clone(session));
        }
        let id = self.propagator.extract(ctx)?;
        let session = self.store.get(&id).await?;
        ctx.set_user_value(self.ctx_key.clone(), Arc::clone(&session));
        Ok(session)
    }

    /// Creates a session for `id` and sends the id back to the client.
    ///
    /// Fails with [`Error::Storage`] when `id` is not a valid session id.
    pub async fn init_session(&self, ctx: &mut Context, id: &str) -> Result<Arc<dyn Session>, Error> {
        if !super::is_valid_id(id) {
            return Err(Error::Storage(format!("invalid session id `{id}`")));
        }
        let session = self.store.generate(id).await?;
        self.propagator.inject(id, ctx)?;
        ctx.set_user_value(self.ctx_key.clone(), Arc::clone(&session));
        Ok(session)
    }

    /// Extends the current session and re-sends its id.
    pub async fn refresh_session(&self, ctx: &mut Context) -> Result<(), Error> {
        let session = self.get_session(ctx).await?;
        self.store.refresh(session.id()).await?;
        self.propagator.inject(session.id(), ctx)
    }

    /// Deletes the current session and tells the client to drop its id.
    pub async fn remove_session(&self, ctx: &mut Context) -> Result<(), Error> {
        let session = self.get_session(ctx).await?;
        self.store.remove(session.id()).await?;
        ctx.remove_user_value(&self.ctx_key);
        self.propagator.remove(ctx)
    }
}
