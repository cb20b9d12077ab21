//! Priority-ordered request router.
//!
//! One list of compiled patterns per HTTP method, kept sorted by descending
//! priority (ties keep insertion order). A lookup is a linear scan that stops
//! at the first full-path match; route tables are small and the most
//! selective patterns sit at the front.

mod pattern;

use std::collections::HashMap;
use std::sync::Arc;

use tracing::debug;

use crate::error::Error;
use crate::handler::{HandleFunc, Handler};
use crate::method::Method;

use pattern::Pattern;

struct Route {
    pattern: Pattern,
    handler: HandleFunc,
}

/// A successful route lookup.
pub(crate) struct RouteMatch {
    pub(crate) handler: HandleFunc,
    pub(crate) pattern: String,
    pub(crate) params: HashMap<String, String>,
}

/// The application route table.
#[derive(Default)]
pub struct Router {
    routes: HashMap<Method, Vec<Route>>,
}

impl Router {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `handler` for `method` + `pattern`.
    ///
    /// Fails with [`Error::MalformedPattern`] on a grammar violation and with
    /// [`Error::DuplicateRoute`] if the exact pair is already registered.
    pub fn register(&mut self, method: Method, pattern: &str, handler: impl Handler) -> Result<(), Error> {
        self.register_func(method, pattern, Arc::new(handler))
    }

    pub(crate) fn register_func(&mut self, method: Method, pattern: &str, handler: HandleFunc) -> Result<(), Error> {
        let pattern = Pattern::parse(pattern)?;
        let routes = self.routes.entry(method).or_default();

        if routes.iter().any(|r| r.pattern.as_str() == pattern.as_str()) {
            return Err(Error::DuplicateRoute {
                method: method.to_string(),
                pattern: pattern.as_str().to_owned(),
            });
        }

        // Insert after every route of equal or higher priority.
        let at = routes.partition_point(|r| r.pattern.priority() >= pattern.priority());
        debug!(%method, pattern = pattern.as_str(), priority = pattern.priority(), "route registered");
        routes.insert(at, Route { pattern, handler });
        Ok(())
    }

    pub(crate) fn lookup(&self, method: Method, path: &str) -> Option<RouteMatch> {
        self.routes.get(&method)?.iter().find_map(|route| {
            let params = route.pattern.captures(path)?;
            Some(RouteMatch {
                handler: Arc::clone(&route.handler),
                pattern: route.pattern.as_str().to_owned(),
                params: params.into_iter().collect(),
            })
        })
    }
}
