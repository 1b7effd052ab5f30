//! Kubernetes health-check handlers.
//!
//! | Check | Path | Question |
//! |---|---|---|
//! | **Liveness** | `/healthz` | Is the process alive? Failure → restart. |
//! | **Readiness** | `/readyz` | Can the pod serve traffic? Failure → pulled from load-balancer. |
//!
//! ```rust
//! use obi::{health, Router};
//!
//! let router = Router::new()
//!     .get("/healthz", health::liveness)
//!     .get("/readyz", health::readiness);
//! ```
//!
//! To gate readiness on dependencies, register your own handler instead:
//!
//! ```rust
//! use obi::{BoxFuture, Exchange, StatusCode};
//!
//! fn readiness(ex: &mut Exchange) -> BoxFuture<'_> {
//!     Box::pin(async move {
//!         if database_reachable().await {
//!             ex.response_mut().text("ready");
//!         } else {
//!             ex.response_mut().error(StatusCode::SERVICE_UNAVAILABLE);
//!         }
//!     })
//! }
//!
//! async fn database_reachable() -> bool { true }
//! ```
//!
//! Health checks are frequent; route them past [`Trace`](crate::middleware::Trace)
//! with a skipper if they drown out the logs.

use crate::exchange::Exchange;
use crate::handler::BoxFuture;

/// Always `200 OK` with body `"ok"`.
pub fn liveness(ex: &mut Exchange) -> BoxFuture<'_> {
    Box::pin(async move {
        ex.response_mut().text("ok");
    })
}

/// `200 OK` with body `"ready"`.
pub fn readiness(ex: &mut Exchange) -> BoxFuture<'_> {
    Box::pin(async move {
        ex.response_mut().text("ready");
    })
}
