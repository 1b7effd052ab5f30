//! HTTP server and graceful shutdown.
//!
//! # Shutdown
//!
//! On **SIGTERM** (what Kubernetes sends before SIGKILL) or Ctrl-C the server:
//! 1. stops accepting connections,
//! 2. lets every in-flight connection task finish,
//! 3. returns from [`Server::serve`].
//!
//! Keep the pod's `terminationGracePeriodSeconds` above your slowest request.

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;

use bytes::Bytes;
use http::StatusCode;
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::service::service_fn;
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto::Builder as ConnBuilder;
use tokio::net::TcpListener;
use tokio::task::{JoinError, JoinSet};
use tracing::{error, info, warn};

use crate::dispatcher::Dispatcher;
use crate::error::Error;
use crate::exchange::Exchange;
use crate::request::Request;
use crate::response::Response;
use crate::router::Resolve;

/// The HTTP server.
#[derive(Debug)]
pub struct Server {
    addr: SocketAddr,
}

impl Server {
    /// Configures the server to bind to `addr` when [`serve`](Server::serve)
    /// is called.
    ///
    /// ```rust
    /// use obi::Server;
    /// # fn main() -> Result<(), obi::Error> {
    /// let server = Server::bind("0.0.0.0:3000")?;
    /// # Ok(()) }
    /// ```
    pub fn bind(addr: &str) -> Result<Self, Error> {
        let addr = addr
            .parse()
            .map_err(|source| Error::InvalidAddress { addr: addr.to_owned(), source })?;
        Ok(Self { addr })
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Accepts connections and runs every request through `dispatcher`.
    ///
    /// Taking the dispatcher by value freezes both of its chains for the
    /// lifetime of the server. Returns after a full graceful shutdown.
    pub async fn serve<R: Resolve>(self, dispatcher: Dispatcher<R>) -> Result<(), Error> {
        let listener = TcpListener::bind(self.addr).await?;
        let dispatcher = Arc::new(dispatcher);

        info!(addr = %self.addr, "obi listening");

        let mut tasks = JoinSet::new();
        let shutdown = shutdown_signal();
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                // Shutdown wins over a queued accept.
                biased;

                () = &mut shutdown => {
                    info!(in_flight = tasks.len(), "shutdown signal received, draining connections");
                    break;
                }

                res = listener.accept() => {
                    let (stream, remote_addr) = match res {
                        Ok(v) => v,
                        Err(e) => {
                            error!("accept error: {e}");
                            continue;
                        }
                    };

                    let dispatcher = Arc::clone(&dispatcher);
                    let io = TokioIo::new(stream);

                    tasks.spawn(async move {
                        // Called once per request on the connection.
                        let svc = service_fn(move |req| {
                            let dispatcher = Arc::clone(&dispatcher);
                            async move { handle(&dispatcher, req, remote_addr).await }
                        });

                        // HTTP/1.1 or HTTP/2, whichever the client speaks.
                        if let Err(e) = ConnBuilder::new(TokioExecutor::new())
                            .serve_connection(io, svc)
                            .await
                        {
                            error!(peer = %remote_addr, "connection error: {e}");
                        }
                    });
                }

                Some(res) = tasks.join_next(), if !tasks.is_empty() => reap(res),
            }
        }

        while let Some(res) = tasks.join_next().await {
            reap(res);
        }

        info!("obi stopped");
        Ok(())
    }
}

/// Logs connection tasks that died from a panic no `Recover` unit caught.
fn reap(res: Result<(), JoinError>) {
    if let Err(e) = res {
        if e.is_panic() {
            error!("connection task panicked: {e}");
        }
    }
}

/// One request, one response. Failures become responses, never hyper errors.
async fn handle<R: Resolve>(
    dispatcher: &Dispatcher<R>,
    req: hyper::Request<Incoming>,
    remote_addr: SocketAddr,
) -> Result<http::Response<Full<Bytes>>, Infallible> {
    let (parts, body) = req.into_parts();
    let body = match body.collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(e) => {
            warn!(peer = %remote_addr, "failed to read request body: {e}");
            let mut res = Response::default();
            res.error(StatusCode::BAD_REQUEST);
            return Ok(res.into_http());
        }
    };

    let mut ex = Exchange::new(Request::from_parts(parts, body).with_remote_addr(remote_addr));
    dispatcher.dispatch(&mut ex).await;
    Ok(ex.into_response().into_http())
}

/// Resolves on SIGTERM or Ctrl-C. If a handler cannot be installed that
/// signal is logged and ignored.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("failed to listen for Ctrl-C: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let sigterm = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                term.recv().await;
            }
            Err(e) => {
                error!("failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let sigterm = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c  => {}
        () = sigterm => {}
    }
}
