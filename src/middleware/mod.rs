//! Middleware layer.
//!
//! A middleware is a handler decorator: it takes the `next` handler and
//! returns a new one that runs code before and after calling it, or does not
//! call it at all. That is the right place for cross-cutting concerns:
//! tracing, size limits, authentication, CORS, redirects and panic recovery.
//!
//! Any `Fn(BoxedHandler) -> BoxedHandler` is a middleware:
//!
//! ```rust
//! use std::sync::Arc;
//! use obi::{handler, BoxedHandler, Dispatcher, Router};
//!
//! let stamp = |next: BoxedHandler| -> BoxedHandler {
//!     handler(move |ex| {
//!         let next = Arc::clone(&next);
//!         Box::pin(async move {
//!             next(ex).await;
//!             ex.response_mut().headers_mut()
//!                 .insert("x-served-by", http::HeaderValue::from_static("obi"));
//!         })
//!     })
//! };
//!
//! let app = Dispatcher::new(Router::new()).with(stamp);
//! ```
//!
//! # Skipping
//!
//! Every built-in policy takes a [`Skipper`]. It is evaluated first on each
//! request; when it returns `true` the policy calls `next` with the exchange
//! untouched and does nothing else.

use std::sync::Arc;

use crate::exchange::Exchange;
use crate::handler::BoxedHandler;

pub mod basic_auth;
pub mod body_limit;
pub mod cors;
pub mod jwt;
pub mod recover;
pub mod redirect;
pub mod trace;

pub use basic_auth::{BasicAuth, BasicAuthConfig};
pub use body_limit::{BodyLimit, BodyLimitConfig};
pub use cors::{Cors, CorsConfig};
pub use jwt::{Jwt, JwtClaims, JwtConfig};
pub use recover::{Recover, RecoverConfig};
pub use redirect::{Redirect, RedirectConfig};
pub use trace::Trace;

/// A handler decorator.
///
/// `wrap` must not depend on per-request state: it may be called once per
/// request, each time with a different `next`, and every returned handler
/// has to work independently of the others.
pub trait Middleware: Send + Sync + 'static {
    fn wrap(&self, next: BoxedHandler) -> BoxedHandler;
}

impl<F> Middleware for F
where
    F: Fn(BoxedHandler) -> BoxedHandler + Send + Sync + 'static,
{
    fn wrap(&self, next: BoxedHandler) -> BoxedHandler {
        self(next)
    }
}

/// Decides, per request, whether a policy steps aside. `true` skips.
pub type Skipper = Arc<dyn Fn(&Exchange) -> bool + Send + Sync + 'static>;

/// The default [`Skipper`]: never skips.
pub fn never_skip() -> Skipper {
    Arc::new(|_| false)
}

/// Builds a [`Skipper`] from a predicate.
pub fn skip_if(predicate: impl Fn(&Exchange) -> bool + Send + Sync + 'static) -> Skipper {
    Arc::new(predicate)
}
