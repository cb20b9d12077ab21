//! Per-request context.
//!
//! A [`Context`] is created by the server right before the middleware chain
//! runs and consumed when the response is flushed. Handlers read the request
//! through it and *buffer* the response on it: status, headers and body are
//! only written to the socket after the whole chain has returned, so an outer
//! middleware can still rewrite what an inner handler produced.

use std::any::Any;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::num::IntErrorKind;
use std::sync::Arc;

use bytes::Bytes;
use cookie::Cookie;
use http::header::{self, HeaderMap, HeaderName, HeaderValue};
use http::request::Parts;
use http::{StatusCode, Uri};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::warn;

use crate::error::Error;
use crate::handler::HandleFunc;
use crate::response::ContentType;
use crate::session::Manager;
use crate::template::TemplateEngine;

/// Peer address of the connection, stored in the request extensions.
#[derive(Clone, Copy, Debug)]
pub(crate) struct RemoteAddr(pub(crate) SocketAddr);

type Values = HashMap<String, Vec<String>>;

/// The per-request facade.
pub struct Context {
    req: Parts,
    body: Bytes,

    path_params: HashMap<String, String>,
    matched_pattern: Option<String>,
    cache_query_values: Option<Values>,
    cache_post_form: Option<Values>,

    resp_status_code: Option<StatusCode>,
    resp_headers: HeaderMap,
    resp_data: Bytes,

    template_engine: Option<Arc<dyn TemplateEngine>>,
    session_manager: Option<Arc<Manager>>,
    user_values: HashMap<String, Box<dyn Any + Send + Sync>>,

    pub(crate) route: Option<HandleFunc>,
}

impl Context {
    /// Builds a context around a fully-read request.
    ///
    /// The server does this for every request; it is public so handlers can
    /// be exercised without a socket.
    pub fn new(req: http::Request<Bytes>) -> Self {
        let (req, body) = req.into_parts();
        Self {
            req,
            body,
            path_params: HashMap::new(),
            matched_pattern: None,
            cache_query_values: None,
            cache_post_form: None,
            resp_status_code: None,
            resp_headers: HeaderMap::new(),
            resp_data: Bytes::new(),
            template_engine: None,
            session_manager: None,
            user_values: HashMap::new(),
            route: None,
        }
    }

    pub fn with_template_engine(mut self, engine: Arc<dyn TemplateEngine>) -> Self {
        self.template_engine = Some(engine);
        self
    }

    pub fn with_session_manager(mut self, manager: Arc<Manager>) -> Self {
        self.session_manager = Some(manager);
        self
    }

    pub fn with_path_params(mut self, params: HashMap<String, String>) -> Self {
        self.path_params = params;
        self
    }

    pub(crate) fn set_route(&mut self, pattern: String, handler: HandleFunc, params: HashMap<String, String>) {
        self.matched_pattern = Some(pattern);
        self.route = Some(handler);
        self.path_params = params;
    }

    // ── Request ───────────────────────────────────────────────────────────────

    pub fn method(&self) -> &http::Method {
        &self.req.method
    }

    pub fn uri(&self) -> &Uri {
        &self.req.uri
    }

    pub fn path(&self) -> &str {
        self.req.uri.path()
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.req.headers
    }

    /// Request header as a string, if present and visible ASCII.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.req.headers.get(name)?.to_str().ok()
    }

    pub fn body(&self) -> &Bytes {
        &self.body
    }

    pub fn remote_addr(&self) -> Option<SocketAddr> {
        self.req.extensions.get::<RemoteAddr>().map(|a| a.0)
    }

    /// The pattern of the route that matched this request.
    pub fn matched_pattern(&self) -> Option<&str> {
        self.matched_pattern.as_deref()
    }

    /// Decodes the JSON body into `T`.
    ///
    /// Put `#[serde(deny_unknown_fields)]` on `T` to reject unknown fields.
    pub fn bind_json<T: DeserializeOwned>(&self) -> Result<T, Error> {
        if self.body.is_empty() {
            return Err(Error::InvalidRequestBody("empty body".to_owned()));
        }
        serde_json::from_slice(&self.body).map_err(|e| Error::InvalidRequestBody(e.to_string()))
    }

    /// First query value for `key`. The query string is parsed once per context.
    pub fn query_value(&mut self, key: &str) -> StringValue {
        let query = self.req.uri.query().unwrap_or("");
        let values = self.cache_query_values.get_or_insert_with(|| parse_values(query.as_bytes()));
        StringValue::first(values, key)
    }

    pub fn default_query_value(&mut self, key: &str, default: &str) -> StringValue {
        match self.query_value(key) {
            StringValue(Err(_)) => StringValue(Ok(default.to_owned())),
            found => found,
        }
    }

    pub fn path_value(&self, key: &str) -> StringValue {
        match self.path_params.get(key) {
            Some(v) => StringValue(Ok(v.clone())),
            None => StringValue(Err(Error::MissingParameter(key.to_owned()))),
        }
    }

    /// First url-encoded body value for `key`.
    pub fn post_form_value(&mut self, key: &str) -> StringValue {
        let is_form = self
            .header(header::CONTENT_TYPE.as_str())
            .is_some_and(|ct| ct.starts_with(ContentType::FormData.as_str()));
        let body = &self.body;
        let values = self.cache_post_form.get_or_insert_with(|| {
            if is_form { parse_values(body) } else { Values::new() }
        });
        StringValue::first(values, key)
    }

    /// First value for `key` from the url-encoded body, falling back to the query.
    pub fn form_value(&mut self, key: &str) -> StringValue {
        match self.post_form_value(key) {
            StringValue(Err(_)) => self.query_value(key),
            found => found,
        }
    }

    /// Value of the request cookie `name`.
    pub fn cookie(&self, name: &str) -> Result<String, Error> {
        self.req
            .headers
            .get_all(header::COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .flat_map(Cookie::split_parse)
            .filter_map(Result::ok)
            .find(|c| c.name() == name)
            .map(|c| c.value().to_owned())
            .ok_or_else(|| Error::MissingParameter(name.to_owned()))
    }

    // ── Buffered response ─────────────────────────────────────────────────────

    /// The buffered status; `None` until something sets it, flushed as `200`.
    pub fn status(&self) -> Option<StatusCode> {
        self.resp_status_code
    }

    pub fn set_status(&mut self, code: StatusCode) {
        self.resp_status_code = Some(code);
    }

    pub fn resp_data(&self) -> &[u8] {
        &self.resp_data
    }

    pub fn resp_headers(&self) -> &HeaderMap {
        &self.resp_headers
    }

    /// Replaces a buffered response header. Invalid names or values are dropped.
    pub fn set_header(&mut self, name: &str, value: &str) {
        match (HeaderName::try_from(name), HeaderValue::try_from(value)) {
            (Ok(n), Ok(v)) => {
                self.resp_headers.insert(n, v);
            }
            _ => warn!(name, "dropping invalid response header"),
        }
    }

    pub fn set_content_type(&mut self, content_type: ContentType) {
        self.resp_headers
            .insert(header::CONTENT_TYPE, HeaderValue::from_static(content_type.as_str()));
    }

    /// Appends a `Set-Cookie` header to the buffered response.
    pub fn set_cookie(&mut self, cookie: &Cookie<'_>) {
        match HeaderValue::try_from(cookie.to_string()) {
            Ok(v) => {
                self.resp_headers.append(header::SET_COOKIE, v);
            }
            Err(_) => warn!(name = cookie.name(), "dropping unencodable cookie"),
        }
    }

    /// Buffers `s` as the body. Does not touch the content type.
    pub fn write_string(&mut self, s: impl Into<String>) {
        self.resp_data = Bytes::from(s.into());
    }

    pub fn write_bytes(&mut self, b: impl Into<Bytes>) {
        self.resp_data = b.into();
    }

    pub fn resp_json<T: Serialize + ?Sized>(&mut self, code: StatusCode, val: &T) -> Result<(), Error> {
        let body = serde_json::to_vec(val).map_err(|e| Error::Encode(e.to_string()))?;
        self.set_content_type(ContentType::Json);
        self.resp_status_code = Some(code);
        self.resp_data = Bytes::from(body);
        Ok(())
    }

    pub fn resp_json_ok<T: Serialize + ?Sized>(&mut self, val: &T) -> Result<(), Error> {
        self.resp_json(StatusCode::OK, val)
    }

    /// Renders `name` with `data` through the configured template engine.
    pub fn resp_template<T: Serialize + ?Sized>(&mut self, name: &str, data: &T) -> Result<(), Error> {
        let engine = self.template_engine.as_ref().ok_or(Error::NoTemplateEngine)?;
        let data = serde_json::to_value(data).map_err(|e| Error::Encode(e.to_string()))?;
        let body = engine.render(name, &data)?;
        self.set_content_type(ContentType::Html);
        self.resp_status_code = Some(StatusCode::OK);
        self.resp_data = Bytes::from(body);
        Ok(())
    }

    /// Answers with the conventional status for `err` and its message as text.
    pub fn resp_error(&mut self, err: &Error) {
        self.set_content_type(ContentType::Text);
        self.resp_status_code = Some(err.status_code());
        self.resp_data = Bytes::from(err.to_string());
    }

    // ── Shared state ──────────────────────────────────────────────────────────

    pub fn template_engine(&self) -> Option<&Arc<dyn TemplateEngine>> {
        self.template_engine.as_ref()
    }

    pub fn session_manager(&self) -> Option<Arc<Manager>> {
        self.session_manager.clone()
    }

    pub fn set_user_value<T: Any + Send + Sync>(&mut self, key: impl Into<String>, value: T) {
        self.user_values.insert(key.into(), Box::new(value));
    }

    /// Per-request value stored under `key`, if present and of type `T`.
    pub fn user_value<T: Any>(&self, key: &str) -> Option<&T> {
        self.user_values.get(key)?.downcast_ref()
    }

    pub fn remove_user_value(&mut self, key: &str) -> bool {
        self.user_values.remove(key).is_some()
    }

    /// Drops everything buffered so far.
    pub(crate) fn reset_response(&mut self) {
        self.resp_status_code = None;
        self.resp_headers.clear();
        self.resp_data = Bytes::new();
    }

    pub(crate) fn into_parts(self) -> (Option<StatusCode>, HeaderMap, Bytes) {
        (self.resp_status_code, self.resp_headers, self.resp_data)
    }
}

fn parse_values(raw: &[u8]) -> Values {
    let mut values = Values::new();
    for (k, v) in url::form_urlencoded::parse(raw) {
        values.entry(k.into_owned()).or_default().push(v.into_owned());
    }
    values
}

// ── StringValue ───────────────────────────────────────────────────────────────

/// Result of a string-valued accessor, with conversions that keep the
/// lookup error.
#[derive(Debug)]
pub struct StringValue(pub Result<String, Error>);

impl StringValue {
    fn first(values: &Values, key: &str) -> Self {
        match values.get(key).and_then(|v| v.first()) {
            Some(v) => Self(Ok(v.clone())),
            None => Self(Err(Error::MissingParameter(key.to_owned()))),
        }
    }

    pub fn string(self) -> Result<String, Error> {
        self.0
    }

    pub fn is_ok(&self) -> bool {
        self.0.is_ok()
    }

    /// Base-10 signed parse. A failed lookup is returned unchanged.
    pub fn to_i64(self) -> Result<i64, Error> {
        let s = self.0?;
        s.parse::<i64>().map_err(|e| match e.kind() {
            IntErrorKind::PosOverflow | IntErrorKind::NegOverflow => Error::OutOfRange(s.clone()),
            _ => Error::InvalidNumber(s.clone()),
        })
    }
}
