//! # obi
//!
//! A small HTTP framework built around two middleware chains.
//!
//! ## The model
//!
//! Every request is an [`Exchange`]: the request, the response being built,
//! and a bag of typed extensions. Handlers and middleware borrow it mutably
//! and write their output into it.
//!
//! A [`Dispatcher`] holds:
//!
//! - the **pre-chain**, which runs for every request before a route is
//!   chosen: recovery, tracing, redirects, CORS;
//! - the **route-chain**, which wraps only handlers the router matched:
//!   auth, body limits, anything that should not run for a `404`;
//! - a resolver, normally a [`Router`].
//!
//! The first unit appended is the outermost. A unit that does not call
//! `next` ends the request right there.
//!
//! What `obi` deliberately leaves to a reverse proxy: TLS termination, rate
//! limiting and slow-client protection.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use obi::middleware::{BodyLimit, Recover, Trace};
//! use obi::{BoxFuture, Dispatcher, Exchange, Router, Server, StatusCode};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), obi::Error> {
//!     let router = Router::new()
//!         .get("/users/{id}", get_user)
//!         .post("/users", create_user);
//!
//!     let app = Dispatcher::new(router)
//!         .pre(Recover::new())
//!         .pre(Trace::new())
//!         .with_route(BodyLimit::new("1M")?);
//!
//!     Server::bind("0.0.0.0:3000")?.serve(app).await
//! }
//!
//! fn get_user(ex: &mut Exchange) -> BoxFuture<'_> {
//!     Box::pin(async move {
//!         let id = ex.request().param("id").unwrap_or("unknown").to_owned();
//!         ex.response_mut().json(format!(r#"{{"id":"{id}"}}"#));
//!     })
//! }
//!
//! fn create_user(ex: &mut Exchange) -> BoxFuture<'_> {
//!     Box::pin(async move {
//!         if ex.request().body().is_empty() {
//!             ex.response_mut().error(StatusCode::BAD_REQUEST);
//!             return;
//!         }
//!         ex.response_mut()
//!             .set_status(StatusCode::CREATED)
//!             .json(r#"{"id":"99"}"#);
//!     })
//! }
//! ```

mod chain;
mod dispatcher;
mod error;
mod exchange;
mod handler;
mod request;
mod response;
mod router;
mod server;

pub mod health;
pub mod middleware;

pub use chain::Chain;
pub use dispatcher::Dispatcher;
pub use error::Error;
pub use exchange::Exchange;
pub use handler::{handler, BoxFuture, BoxedHandler};
pub use request::Request;
pub use response::{ContentType, Response};
pub use router::{Resolve, Router};
pub use server::Server;

pub use http::{Method, StatusCode};
