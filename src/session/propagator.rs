//! Cookie-based session id propagation.

use std::sync::Arc;

use cookie::{Cookie, SameSite};

use super::{Propagator, is_valid_id};
use crate::context::Context;
use crate::error::Error;

/// Default session cookie name.
pub const DEFAULT_COOKIE_NAME: &str = "sessid";

type CookieOption = Arc<dyn Fn(&mut Cookie<'static>) + Send + Sync>;

/// Carries the session id in a cookie.
///
/// The cookie defaults to `Path=/; HttpOnly; SameSite=Lax`; a customizer set
/// with [`cookie_options`](Self::cookie_options) runs on every cookie written,
/// the removal cookie included.
///
/// ```rust
/// use weft::session::CookiePropagator;
///
/// let propagator = CookiePropagator::new()
///     .cookie_name("app_session")
///     .cookie_options(|c| c.set_secure(true));
/// ```
#[derive(Clone)]
pub struct CookiePropagator {
    name: String,
    customize: Option<CookieOption>,
}

impl CookiePropagator {
    pub fn new() -> Self {
        Self { name: DEFAULT_COOKIE_NAME.to_owned(), customize: None }
    }

    pub fn cookie_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn cookie_options(mut self, f: impl Fn(&mut Cookie<'static>) + Send + Sync + 'static) -> Self {
        self.customize = Some(Arc::new(f));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn build(&self, value: String) -> Cookie<'static> {
        let mut cookie = Cookie::build((self.name.clone(), value))
            .path("/")
            .http_only(true)
            .same_site(SameSite::Lax)
            .build();
        if let Some(customize) = &self.customize {
            customize(&mut cookie);
        }
        cookie
    }
}

impl Default for CookiePropagator {
    fn default() -> Self {
        Self::new()
    }
}

impl Propagator for CookiePropagator {
    fn inject(&self, id: &str, ctx: &mut Context) -> Result<(), Error> {
        ctx.set_cookie(&self.build(id.to_owned()));
        Ok(())
    }

    fn extract(&self, ctx: &Context) -> Result<String, Error> {
        let id = ctx.cookie(&self.name).map_err(|_| Error::NoSession)?;
        if !is_valid_id(&id) {
            return Err(Error::NoSession);
        }
        Ok(id)
    }

    fn remove(&self, ctx: &mut Context) -> Result<(), Error> {
        let mut cookie = self.build(String::new());
        cookie.make_removal();
        ctx.set_cookie(&cookie);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;

    use super::*;

    const ID: &str = "0123456789abcdefXYZ";

    fn set_cookies(ctx: &Context) -> Vec<String> {
        ctx.resp_headers()
            .get_all("set-cookie")
            .iter()
            .map(|v| v.to_str().unwrap().to_owned())
            .collect()
    }

    #[test]
    fn inject_writes_default_attributes() {
        let mut ctx = Context::new(http::Request::new(Bytes::new()));
        CookiePropagator::new().inject(ID, &mut ctx).unwrap();
        let set = set_cookies(&ctx);
        assert_eq!(set.len(), 1);
        assert!(set[0].starts_with(&format!("sessid={ID}")));
        assert!(set[0].contains("HttpOnly"));
        assert!(set[0].contains("Path=/"));
    }

    #[test]
    fn customizer_and_name_apply() {
        let mut ctx = Context::new(http::Request::new(Bytes::new()));
        CookiePropagator::new()
            .cookie_name("sid")
            .cookie_options(|c| {
                c.set_secure(true);
                c.set_domain("example.com");
            })
            .inject(ID, &mut ctx)
            .unwrap();
        let set = &set_cookies(&ctx)[0];
        assert!(set.starts_with("sid="));
        assert!(set.contains("Secure"));
        assert!(set.contains("Domain=example.com"));
    }

    #[test]
    fn extract_reads_and_validates() {
        let p = CookiePropagator::new();
        let with = |cookie: &str| {
            Context::new(http::Request::builder().header("cookie", cookie).body(Bytes::new()).unwrap())
        };
        assert_eq!(p.extract(&with(&format!("a=b; sessid={ID}"))).unwrap(), ID);
        assert!(matches!(p.extract(&with("other=1")), Err(Error::NoSession)));
        assert!(matches!(p.extract(&with("sessid=short")), Err(Error::NoSession)));
    }

    #[test]
    fn remove_writes_expired_cookie() {
        let mut ctx = Context::new(http::Request::new(Bytes::new()));
        CookiePropagator::new().remove(&mut ctx).unwrap();
        let set = &set_cookies(&ctx)[0];
        assert!(set.starts_with("sessid="));
        assert!(set.contains("Max-Age=0"));
    }
}
