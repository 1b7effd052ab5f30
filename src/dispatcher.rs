//! Request dispatch: resolve, wrap, run.
//!
//! A [`Dispatcher`] owns two middleware chains and shares a resolver:
//!
//! ```text
//! pre[0]( pre[1]( … routed … ) )
//!                   │
//!                   ├─ match    → route[0]( route[1]( … handler … ) )
//!                   └─ no match → resolver.fallback
//! ```
//!
//! The pre-chain runs for every request. The route-chain runs only around a
//! matched handler, never around the fallback. The handler tree is composed
//! fresh for every request from the same chains, so nothing one request does
//! to the composition can leak into the next.
//!
//! Resolution happens in the innermost pre-chain position. A pre unit that
//! rewrites the method or URI therefore changes which route is picked, and a
//! panicking resolver unwinds through the pre-chain like any handler would.

use std::fmt;
use std::sync::Arc;

use tracing::{debug, trace};

use crate::chain::Chain;
use crate::exchange::Exchange;
use crate::handler::{handler, BoxedHandler};
use crate::middleware::Middleware;
use crate::router::{Resolve, Router};

/// Two middleware chains in front of a resolver.
///
/// Configure it with the by-value builder methods, then hand it to
/// [`Server::serve`](crate::Server::serve), which takes ownership; from then
/// on the chains can no longer change.
///
/// ```rust
/// use obi::middleware::{BodyLimit, Recover, Trace};
/// use obi::{Dispatcher, Router};
///
/// # fn main() -> Result<(), obi::Error> {
/// let app = Dispatcher::new(Router::new())
///     .pre(Recover::new())
///     .with(Trace::new())
///     .with_route(BodyLimit::new("2M")?);
/// # Ok(()) }
/// ```
pub struct Dispatcher<R: Resolve = Router> {
    pre: Chain,
    route: Arc<Chain>,
    resolver: Arc<R>,
}

impl<R: Resolve> Dispatcher<R> {
    pub fn new(resolver: R) -> Self {
        Self::shared(Arc::new(resolver))
    }

    /// Builds a dispatcher around a resolver that other code also holds.
    pub fn shared(resolver: Arc<R>) -> Self {
        Self {
            pre: Chain::new(),
            route: Arc::new(Chain::new()),
            resolver,
        }
    }

    /// Appends `unit` to the pre-chain, which runs for every request.
    pub fn pre(mut self, unit: impl Middleware) -> Self {
        self.pre.append(unit);
        self
    }

    /// Same as [`pre`](Dispatcher::pre): both feed the single pre-chain.
    pub fn with(self, unit: impl Middleware) -> Self {
        self.pre(unit)
    }

    /// Appends `unit` to the route-chain, which only wraps matched handlers.
    pub fn with_route(mut self, unit: impl Middleware) -> Self {
        Arc::make_mut(&mut self.route).append(unit);
        self
    }

    pub fn resolver(&self) -> &R {
        &self.resolver
    }

    pub fn pre_chain(&self) -> &Chain {
        &self.pre
    }

    pub fn route_chain(&self) -> &Chain {
        &self.route
    }

    /// Runs one request through the composed handler, exactly once.
    ///
    /// Traps nothing: a panic anywhere below unwinds out of here unless a
    /// [`Recover`](crate::middleware::Recover) unit in the pre-chain catches it.
    pub async fn dispatch(&self, ex: &mut Exchange) {
        let composed = self.compose();
        composed(ex).await;
    }

    /// The full handler for one request: the pre-chain folded around the
    /// routing step.
    pub fn compose(&self) -> BoxedHandler {
        self.pre.fold(self.routed())
    }

    /// The innermost step: resolve, then either run the matched handler
    /// inside the route-chain, or the resolver's fallback on its own.
    fn routed(&self) -> BoxedHandler {
        let resolver = Arc::clone(&self.resolver);
        let route = Arc::clone(&self.route);

        handler(move |ex| {
            let found = resolver.lookup(ex.request().method(), ex.request().path());
            match found {
                Some((matched, params)) => {
                    debug!(
                        method = %ex.request().method(),
                        path = ex.request().path(),
                        route_layers = route.len(),
                        "route matched"
                    );
                    ex.request_mut().set_params(params);
                    route.fold(matched)(ex)
                }
                None => {
                    trace!(
                        method = %ex.request().method(),
                        path = ex.request().path(),
                        "no route, running fallback"
                    );
                    let resolver = Arc::clone(&resolver);
                    Box::pin(async move { resolver.fallback(ex).await })
                }
            }
        })
    }
}

impl<R: Resolve> fmt::Debug for Dispatcher<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dispatcher")
            .field("pre", &self.pre)
            .field("route", &self.route)
            .finish_non_exhaustive()
    }
}
