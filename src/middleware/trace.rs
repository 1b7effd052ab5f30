//! Per-request tracing span.
//!
//! Opens an `http_request` span carrying the method and path, runs the rest
//! of the chain inside it, then records the status and latency and emits one
//! event: `info` for `1xx`–`3xx`, `warn` for errors. Anything logged
//! downstream, including [`Recover`](super::Recover) reports when `Trace`
//! sits outside it, is attached to the span.

use std::sync::Arc;
use std::time::Instant;

use tracing::field::Empty;
use tracing::{info, info_span, warn, Instrument};

use super::{never_skip, Middleware, Skipper};
use crate::handler::{handler, BoxedHandler};

/// Tracing middleware. See the [module docs](self).
#[derive(Clone)]
pub struct Trace {
    skipper: Skipper,
}

impl Trace {
    pub fn new() -> Self {
        Self { skipper: never_skip() }
    }

    /// Skips requests for which `skipper` returns `true`, e.g. health checks.
    pub fn with_skipper(skipper: Skipper) -> Self {
        Self { skipper }
    }
}

impl Default for Trace {
    fn default() -> Self {
        Self::new()
    }
}

impl Middleware for Trace {
    fn wrap(&self, next: BoxedHandler) -> BoxedHandler {
        let skipper = Arc::clone(&self.skipper);

        handler(move |ex| {
            let next = Arc::clone(&next);
            let skipper = Arc::clone(&skipper);
            Box::pin(async move {
                if skipper(ex) {
                    return next(ex).await;
                }

                let method = ex.request().method().clone();
                let path = ex.request().path().to_owned();
                let span = info_span!(
                    "http_request",
                    %method,
                    %path,
                    status = Empty,
                    latency_ms = Empty,
                );

                let start = Instant::now();
                next(ex).instrument(span.clone()).await;
                let latency_ms = start.elapsed().as_millis() as u64;
                let status = ex.response().status();

                span.record("status", status.as_u16());
                span.record("latency_ms", latency_ms);
                span.in_scope(|| {
                    if status.is_client_error() || status.is_server_error() {
                        warn!(%method, %path, status = status.as_u16(), latency_ms, "request failed");
                    } else {
                        info!(%method, %path, status = status.as_u16(), latency_ms, "request completed");
                    }
                });
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;
    use http::StatusCode;

    use super::*;
    use crate::exchange::Exchange;
    use crate::middleware::skip_if;

    fn teapot() -> BoxedHandler {
        handler(|ex| Box::pin(async move {
            ex.response_mut().error(StatusCode::IM_A_TEAPOT);
        }))
    }

    #[tokio::test]
    async fn passes_the_response_through() {
        let _ = tracing_subscriber::fmt().with_test_writer().try_init();

        let h = Trace::new().wrap(teapot());
        let mut ex = Exchange::from(http::Request::new(Bytes::new()));
        h(&mut ex).await;
        assert_eq!(ex.response().status(), StatusCode::IM_A_TEAPOT);
    }

    #[tokio::test]
    async fn skipped_requests_still_run_next() {
        let h = Trace::with_skipper(skip_if(|_| true)).wrap(teapot());
        let mut ex = Exchange::from(http::Request::new(Bytes::new()));
        h(&mut ex).await;
        assert_eq!(ex.response().status(), StatusCode::IM_A_TEAPOT);
    }
}
