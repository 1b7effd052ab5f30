//! Minimal obi example: JSON endpoints, an admin area behind Basic auth,
//! CORS and health checks.
//!
//! Run with:
//!   RUST_LOG=info cargo run --example basic
//!
//! Try:
//!   curl http://localhost:3000/users/42
//!   curl -X POST http://localhost:3000/users -d '{"name":"alice"}'
//!   curl -u admin:hunter2 http://localhost:3000/admin/stats
//!   curl -X OPTIONS http://localhost:3000/users -H 'origin: https://app.example'
//!   curl http://localhost:3000/healthz

use obi::middleware::basic_auth::BoxError;
use obi::middleware::{skip_if, BasicAuth, BodyLimit, Cors, Recover, Trace};
use obi::{health, BoxFuture, Dispatcher, Exchange, Router, Server, StatusCode};

#[tokio::main]
async fn main() -> Result<(), obi::Error> {
    tracing_subscriber::fmt::init();

    let router = Router::new()
        .get("/users/{id}", get_user)
        .post("/users", create_user)
        .delete("/users/{id}", delete_user)
        .get("/admin/stats", stats)
        .get("/healthz", health::liveness)
        .get("/readyz", health::readiness);

    let admin_only = BasicAuth::with_config({
        let mut config = obi::middleware::BasicAuthConfig::new(|user, pass, _| async move {
            Ok::<_, BoxError>(user == "admin" && pass == "hunter2")
        });
        config.skipper = skip_if(|ex| !ex.request().path().starts_with("/admin"));
        config.realm = "Admin".to_owned();
        config
    })?;

    let app = Dispatcher::new(router)
        .pre(Recover::new())
        .pre(Trace::with_skipper(skip_if(|ex| ex.request().path() == "/healthz")))
        .pre(Cors::new())
        .with_route(BodyLimit::new("64KB")?)
        .with_route(admin_only);

    Server::bind("0.0.0.0:3000")?.serve(app).await
}

// GET /users/{id}
fn get_user(ex: &mut Exchange) -> BoxFuture<'_> {
    Box::pin(async move {
        let id = ex.request().param("id").unwrap_or("unknown").to_owned();
        ex.response_mut().json(format!(r#"{{"id":"{id}","name":"alice"}}"#));
    })
}

// POST /users
//
// The body is already collected; parse it with whatever you like.
fn create_user(ex: &mut Exchange) -> BoxFuture<'_> {
    Box::pin(async move {
        if ex.request().body().is_empty() {
            ex.response_mut().error(StatusCode::BAD_REQUEST);
            return;
        }
        ex.response_mut()
            .set_status(StatusCode::CREATED)
            .set_header(http::header::LOCATION, http::HeaderValue::from_static("/users/99"))
            .json(r#"{"id":"99","name":"new_user"}"#);
    })
}

// DELETE /users/{id} → 204 No Content
fn delete_user(ex: &mut Exchange) -> BoxFuture<'_> {
    Box::pin(async move {
        ex.response_mut().set_status(StatusCode::NO_CONTENT);
    })
}

// GET /admin/stats, reachable only with valid credentials
fn stats(ex: &mut Exchange) -> BoxFuture<'_> {
    Box::pin(async move {
        ex.response_mut().json(r#"{"users":2}"#);
    })
}
