//! Handler type and type erasure.
//!
//! # What a handler is
//!
//! A handler borrows the request's [`Exchange`] mutably, does its work, and
//! returns nothing: all output is written to `exchange.response_mut()`.
//! Because the work may be async, the handler returns a boxed future that
//! borrows the exchange for exactly as long as it runs:
//!
//! ```text
//! fn hello(ex: &mut Exchange) -> BoxFuture<'_>     ← user writes this
//!        ↓ router.get("/", hello)
//! Arc::new(hello) as BoxedHandler                 ← one allocation, at setup
//!        ↓ per request
//! middleware wraps it: BoxedHandler → BoxedHandler
//!        ↓
//! composed(&mut exchange).await                   ← one virtual call per layer
//! ```
//!
//! Closures work too, through [`handler`], which pins down the higher-ranked
//! signature so the compiler accepts `|ex| Box::pin(async move { … })`.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::exchange::Exchange;

/// A heap-allocated, type-erased future that borrows the exchange for `'a`.
///
/// `Send` lets tokio move an in-flight request between worker threads.
pub type BoxFuture<'a> = Pin<Box<dyn Future<Output = ()> + Send + 'a>>;

/// A type-erased handler, shared across concurrent requests.
///
/// This is both what the router stores and what middleware consume and
/// produce. Cloning is one atomic increment.
pub type BoxedHandler = Arc<dyn for<'a> Fn(&'a mut Exchange) -> BoxFuture<'a> + Send + Sync + 'static>;

/// Erases a handler function or closure into a [`BoxedHandler`].
///
/// ```rust
/// use obi::{handler, BoxedHandler};
///
/// let hello: BoxedHandler = handler(|ex| Box::pin(async move {
///     ex.response_mut().text("hello");
/// }));
/// ```
pub fn handler<F>(f: F) -> BoxedHandler
where
    F: for<'a> Fn(&'a mut Exchange) -> BoxFuture<'a> + Send + Sync + 'static,
{
    Arc::new(f)
}
