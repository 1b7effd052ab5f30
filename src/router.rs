//! Radix-tree request router.
//!
//! One tree per HTTP method. O(path-length) lookup. The router only answers
//! "which handler serves this method and path?"; middleware lives in the
//! [`Dispatcher`](crate::Dispatcher) that sits in front of it.

use std::collections::HashMap;
use std::sync::Arc;

use http::header::{self, HeaderValue};
use http::{Method, StatusCode};
use matchit::Router as MatchitRouter;

use crate::exchange::Exchange;
use crate::handler::{BoxFuture, BoxedHandler};

/// Maps a request to a terminal handler.
///
/// Implemented by [`Router`]; implement it yourself to put a different
/// routing scheme behind the dispatcher.
pub trait Resolve: Send + Sync + 'static {
    /// The handler registered for `method` + `path`, plus any path
    /// parameters the match captured. `None` means no match.
    fn lookup(&self, method: &Method, path: &str) -> Option<(BoxedHandler, HashMap<String, String>)>;

    /// Runs when [`lookup`](Resolve::lookup) finds nothing.
    fn fallback<'a>(&'a self, ex: &'a mut Exchange) -> BoxFuture<'a>;
}

/// The application router.
///
/// One radix tree per HTTP method, O(path-length) lookup. Build it once at
/// startup and hand it to a [`Dispatcher`](crate::Dispatcher).
/// Each registration returns `self` so calls chain naturally.
pub struct Router {
    routes: HashMap<Method, MatchitRouter<BoxedHandler>>,
    not_found: Option<BoxedHandler>,
    handle_method_not_allowed: bool,
}

impl Router {
    pub fn new() -> Self {
        Self {
            routes: HashMap::new(),
            not_found: None,
            handle_method_not_allowed: true,
        }
    }

    /// Register a handler for a method + path pair. Returns `self` for chaining.
    ///
    /// Path parameters use `{name}` syntax, catch-alls `{*name}`;
    /// `ex.request().param("name")` retrieves them:
    ///
    /// ```rust
    /// # use obi::{BoxFuture, Exchange, Method, Router};
    /// # fn get_user(_: &mut Exchange) -> BoxFuture<'_> { Box::pin(async {}) }
    /// # fn create_user(_: &mut Exchange) -> BoxFuture<'_> { Box::pin(async {}) }
    /// # fn delete_user(_: &mut Exchange) -> BoxFuture<'_> { Box::pin(async {}) }
    /// Router::new()
    ///     .on(Method::DELETE, "/users/{id}", delete_user)
    ///     .on(Method::GET,    "/users/{id}", get_user)
    ///     .on(Method::POST,   "/users",      create_user);
    /// ```
    ///
    /// # Panics
    ///
    /// Panics if `path` is not a valid route or conflicts with one already
    /// registered for `method`.
    pub fn on<F>(self, method: Method, path: &str, handler: F) -> Self
    where
        F: for<'a> Fn(&'a mut Exchange) -> BoxFuture<'a> + Send + Sync + 'static,
    {
        self.add(method, path, Arc::new(handler))
    }

    pub fn get<F>(self, path: &str, handler: F) -> Self
    where
        F: for<'a> Fn(&'a mut Exchange) -> BoxFuture<'a> + Send + Sync + 'static,
    {
        self.on(Method::GET, path, handler)
    }

    pub fn post<F>(self, path: &str, handler: F) -> Self
    where
        F: for<'a> Fn(&'a mut Exchange) -> BoxFuture<'a> + Send + Sync + 'static,
    {
        self.on(Method::POST, path, handler)
    }

    pub fn put<F>(self, path: &str, handler: F) -> Self
    where
        F: for<'a> Fn(&'a mut Exchange) -> BoxFuture<'a> + Send + Sync + 'static,
    {
        self.on(Method::PUT, path, handler)
    }

    pub fn patch<F>(self, path: &str, handler: F) -> Self
    where
        F: for<'a> Fn(&'a mut Exchange) -> BoxFuture<'a> + Send + Sync + 'static,
    {
        self.on(Method::PATCH, path, handler)
    }

    pub fn delete<F>(self, path: &str, handler: F) -> Self
    where
        F: for<'a> Fn(&'a mut Exchange) -> BoxFuture<'a> + Send + Sync + 'static,
    {
        self.on(Method::DELETE, path, handler)
    }

    /// Handler for requests that match no route. Defaults to a bare `404`.
    pub fn not_found<F>(mut self, handler: F) -> Self
    where
        F: for<'a> Fn(&'a mut Exchange) -> BoxFuture<'a> + Send + Sync + 'static,
    {
        self.not_found = Some(Arc::new(handler));
        self
    }

    /// When on (the default), a path registered only under other methods
    /// answers `405` with an `Allow` header instead of falling through to
    /// the not-found handler.
    pub fn handle_method_not_allowed(mut self, on: bool) -> Self {
        self.handle_method_not_allowed = on;
        self
    }

    fn add(mut self, method: Method, path: &str, handler: BoxedHandler) -> Self {
        self.routes
            .entry(method)
            .or_default()
            .insert(path, handler)
            .unwrap_or_else(|e| panic!("invalid route `{path}`: {e}"));
        self
    }

    /// Methods, other than `method`, with a route matching `path`. Sorted.
    fn allowed(&self, method: &Method, path: &str) -> Vec<&str> {
        let mut allowed: Vec<&str> = self
            .routes
            .iter()
            .filter(|(m, tree)| *m != method && tree.at(path).is_ok())
            .map(|(m, _)| m.as_str())
            .collect();
        allowed.sort_unstable();
        allowed
    }
}

impl Default for Router {
    fn default() -> Self { Self::new() }
}

impl Resolve for Router {
    fn lookup(&self, method: &Method, path: &str) -> Option<(BoxedHandler, HashMap<String, String>)> {
        let tree = self.routes.get(method)?;
        let matched = tree.at(path).ok()?;
        let handler = Arc::clone(matched.value);
        let params = matched.params.iter()
            .map(|(k, v)| (k.to_owned(), v.to_owned()))
            .collect();
        Some((handler, params))
    }

    fn fallback<'a>(&'a self, ex: &'a mut Exchange) -> BoxFuture<'a> {
        if self.handle_method_not_allowed {
            let allowed = self.allowed(ex.request().method(), ex.request().path()).join(", ");
            if !allowed.is_empty() {
                let res = ex.response_mut();
                if let Ok(value) = HeaderValue::from_str(&allowed) {
                    res.set_header(header::ALLOW, value);
                }
                res.error(StatusCode::METHOD_NOT_ALLOWED);
                return Box::pin(async {});
            }
        }

        match &self.not_found {
            Some(handler) => handler(ex),
            None => {
                ex.response_mut().error(StatusCode::NOT_FOUND);
                Box::pin(async {})
            }
        }
    }
}
