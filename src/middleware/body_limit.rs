//! Request body size limit.
//!
//! Rejects a request with `413 Payload Too Large` when either its declared
//! `Content-Length` or the body actually received exceeds the limit. The
//! downstream chain never sees it.
//!
//! ```rust
//! use obi::middleware::BodyLimit;
//! # fn main() -> Result<(), obi::Error> {
//! let limit = BodyLimit::new("4KB")?;
//! # Ok(()) }
//! ```

use std::sync::Arc;

use http::StatusCode;
use tracing::debug;

use super::{never_skip, Middleware, Skipper};
use crate::error::Error;
use crate::handler::{handler, BoxedHandler};

/// Configuration for [`BodyLimit`].
#[derive(Clone)]
pub struct BodyLimitConfig {
    /// Default: never skip.
    pub skipper: Skipper,
    /// Maximum body size: `<n>` bytes, or `<n><unit>` / `<n><unit>B` where
    /// unit is one of K, M, G, T, P (powers of 1024, case-insensitive).
    /// Default: empty, which fails validation; a limit must be chosen.
    pub limit: String,
}

impl Default for BodyLimitConfig {
    fn default() -> Self {
        Self { skipper: never_skip(), limit: String::new() }
    }
}

/// Body size limit middleware. See the [module docs](self).
#[derive(Clone)]
pub struct BodyLimit {
    skipper: Skipper,
    limit: u64,
}

impl BodyLimit {
    pub fn new(limit: &str) -> Result<Self, Error> {
        Self::with_config(BodyLimitConfig { limit: limit.to_owned(), ..Default::default() })
    }

    /// Validates the limit string up front; a bad limit is a setup error.
    pub fn with_config(config: BodyLimitConfig) -> Result<Self, Error> {
        let limit = parse_limit(&config.limit)?;
        debug!(limit, "body limit configured");
        Ok(Self { skipper: config.skipper, limit })
    }

    /// The ceiling in bytes.
    pub fn limit(&self) -> u64 {
        self.limit
    }
}

impl Middleware for BodyLimit {
    fn wrap(&self, next: BoxedHandler) -> BoxedHandler {
        let skipper = Arc::clone(&self.skipper);
        let limit = self.limit;

        handler(move |ex| {
            let next = Arc::clone(&next);
            let skipper = Arc::clone(&skipper);
            Box::pin(async move {
                if skipper(ex) {
                    return next(ex).await;
                }

                let req = ex.request();
                let declared = req.content_length().unwrap_or(0);
                let actual = req.body().len() as u64;
                if declared > limit || actual > limit {
                    debug!(declared, actual, limit, "request body too large");
                    ex.response_mut().error(StatusCode::PAYLOAD_TOO_LARGE);
                    return;
                }

                next(ex).await;
            })
        })
    }
}

/// Parses `"10"`, `"10B"`, `"4K"`, `"4KB"`, `"1.5M"` … into bytes.
fn parse_limit(raw: &str) -> Result<u64, Error> {
    let invalid = || Error::InvalidBodyLimit(raw.to_owned());

    let s = raw.trim().to_ascii_uppercase();
    let s = s.strip_suffix('B').unwrap_or(&s);
    let split = s.find(|c: char| !(c.is_ascii_digit() || c == '.')).unwrap_or(s.len());
    let (number, unit) = s.split_at(split);

    let shift = match unit {
        "" => 0,
        "K" => 10,
        "M" => 20,
        "G" => 30,
        "T" => 40,
        "P" => 50,
        _ => return Err(invalid()),
    };
    let number: f64 = number.parse().map_err(|_| invalid())?;
    let bytes = number * (1u64 << shift) as f64;
    if !bytes.is_finite() || bytes < 0.0 || bytes > u64::MAX as f64 {
        return Err(invalid());
    }
    Ok(bytes as u64)
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use bytes::Bytes;

    use super::*;
    use crate::exchange::Exchange;
    use crate::middleware::skip_if;

    fn counting(calls: &Arc<AtomicUsize>) -> BoxedHandler {
        let calls = Arc::clone(calls);
        handler(move |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            Box::pin(async {})
        })
    }

    fn post(body: &'static [u8]) -> Exchange {
        http::Request::builder()
            .method("POST")
            .uri("/upload")
            .body(Bytes::from_static(body))
            .unwrap()
            .into()
    }

    #[test]
    fn parses_units() {
        assert_eq!(parse_limit("1").unwrap(), 1);
        assert_eq!(parse_limit("1B").unwrap(), 1);
        assert_eq!(parse_limit("4K").unwrap(), 4096);
        assert_eq!(parse_limit("4kb").unwrap(), 4096);
        assert_eq!(parse_limit("2M").unwrap(), 2 * 1024 * 1024);
        assert_eq!(parse_limit("1.5K").unwrap(), 1536);
        assert_eq!(parse_limit("1G").unwrap(), 1 << 30);
    }

    #[test]
    fn rejects_garbage_at_construction() {
        for bad in ["", "B", "K", "4X", "-1", "lots"] {
            assert!(
                matches!(BodyLimit::new(bad), Err(Error::InvalidBodyLimit(_))),
                "{bad:?} should be rejected",
            );
        }
    }

    #[tokio::test]
    async fn oversized_body_never_reaches_next() {
        let calls = Arc::new(AtomicUsize::new(0));
        let h = BodyLimit::new("1B").unwrap().wrap(counting(&calls));

        let mut ex = post(b"ab");
        h(&mut ex).await;

        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(ex.response().status(), StatusCode::PAYLOAD_TOO_LARGE);
        assert_eq!(ex.response().body(), b"Payload Too Large");
    }

    #[tokio::test]
    async fn declared_length_alone_is_enough_to_reject() {
        let calls = Arc::new(AtomicUsize::new(0));
        let h = BodyLimit::new("1K").unwrap().wrap(counting(&calls));

        let mut ex: Exchange = http::Request::builder()
            .method("POST")
            .uri("/upload")
            .header("content-length", "4096")
            .body(Bytes::new())
            .unwrap()
            .into();
        h(&mut ex).await;

        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(ex.response().status(), StatusCode::PAYLOAD_TOO_LARGE);
    }

    #[tokio::test]
    async fn body_at_the_limit_passes() {
        let calls = Arc::new(AtomicUsize::new(0));
        let h = BodyLimit::new("2").unwrap().wrap(counting(&calls));

        let mut ex = post(b"ab");
        h(&mut ex).await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(ex.response().status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn skipper_bypasses_the_check() {
        let calls = Arc::new(AtomicUsize::new(0));
        let limit = BodyLimit::with_config(BodyLimitConfig {
            skipper: skip_if(|ex| ex.request().path() == "/upload"),
            limit: "1".into(),
        })
        .unwrap();
        let h = limit.wrap(counting(&calls));

        let mut ex = post(b"way too long");
        h(&mut ex).await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(ex.response().status(), StatusCode::OK);
    }
}
