//! Scheme and `www.` canonicalisation redirects.
//!
//! These belong in the pre-chain so the redirect happens before routing:
//!
//! ```rust
//! use obi::middleware::Redirect;
//! use obi::{Dispatcher, Router};
//!
//! let app = Dispatcher::new(Router::new()).pre(Redirect::https_non_www());
//! ```
//!
//! TLS is detected from the request URI or from `X-Forwarded-Proto`, since
//! the usual deployment terminates TLS at a proxy in front of the server.

use std::sync::Arc;

use http::header::HeaderValue;
use http::StatusCode;
use tracing::{debug, warn};

use super::{never_skip, Middleware, Skipper};
use crate::exchange::Exchange;
use crate::handler::{handler, BoxedHandler};

const WWW: &str = "www.";

/// Configuration for [`Redirect`].
#[derive(Clone)]
pub struct RedirectConfig {
    /// Default: never skip.
    pub skipper: Skipper,
    /// Status sent with the redirect. Default: `301 Moved Permanently`.
    /// A status outside the `3xx` range falls back to the default.
    pub code: StatusCode,
}

impl Default for RedirectConfig {
    fn default() -> Self {
        Self { skipper: never_skip(), code: StatusCode::MOVED_PERMANENTLY }
    }
}

/// Which canonical form requests are sent to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RedirectKind {
    /// `http://example.com` → `https://example.com`
    Https,
    /// `http://example.com` → `https://www.example.com`
    HttpsWww,
    /// `http://www.example.com` → `https://example.com`
    HttpsNonWww,
    /// `http://example.com` → `http://www.example.com`
    Www,
    /// `http://www.example.com` → `http://example.com`
    NonWww,
}

/// Redirect middleware. See the [module docs](self).
#[derive(Clone)]
pub struct Redirect {
    kind: RedirectKind,
    skipper: Skipper,
    code: StatusCode,
}

impl Redirect {
    pub fn https() -> Self {
        Self::with_config(RedirectKind::Https, RedirectConfig::default())
    }

    pub fn https_www() -> Self {
        Self::with_config(RedirectKind::HttpsWww, RedirectConfig::default())
    }

    pub fn https_non_www() -> Self {
        Self::with_config(RedirectKind::HttpsNonWww, RedirectConfig::default())
    }

    pub fn www() -> Self {
        Self::with_config(RedirectKind::Www, RedirectConfig::default())
    }

    pub fn non_www() -> Self {
        Self::with_config(RedirectKind::NonWww, RedirectConfig::default())
    }

    pub fn with_config(kind: RedirectKind, config: RedirectConfig) -> Self {
        let code = if config.code.is_redirection() {
            config.code
        } else {
            RedirectConfig::default().code
        };
        Self { kind, skipper: config.skipper, code }
    }

    pub fn kind(&self) -> RedirectKind {
        self.kind
    }
}

impl RedirectKind {
    /// The URL to redirect to, or `None` when the request is already canonical.
    fn target(self, ex: &Exchange) -> Option<String> {
        let req = ex.request();
        let host = req.host();
        if host.is_empty() {
            return None;
        }
        let tls = req.is_tls();
        let www = host.starts_with(WWW);
        let rest = req.path_and_query();

        match self {
            Self::Https if !tls => Some(format!("https://{host}{rest}")),
            Self::HttpsWww if !tls && !www => Some(format!("https://{WWW}{host}{rest}")),
            Self::HttpsNonWww if !tls => {
                let host = host.strip_prefix(WWW).unwrap_or(host);
                Some(format!("https://{host}{rest}"))
            }
            Self::Www if !www => Some(format!("{}://{WWW}{host}{rest}", req.scheme())),
            Self::NonWww if www => Some(format!("{}://{}{rest}", req.scheme(), &host[WWW.len()..])),
            _ => None,
        }
    }
}

impl Middleware for Redirect {
    fn wrap(&self, next: BoxedHandler) -> BoxedHandler {
        let this = self.clone();

        handler(move |ex| {
            let next = Arc::clone(&next);
            let this = this.clone();
            Box::pin(async move {
                if (this.skipper)(ex) {
                    return next(ex).await;
                }

                let Some(target) = this.kind.target(ex) else {
                    return next(ex).await;
                };

                match HeaderValue::try_from(target) {
                    Ok(location) => {
                        debug!(kind = ?this.kind, location = ?location, "redirecting");
                        ex.response_mut().redirect(this.code, location);
                    }
                    Err(e) => {
                        warn!(error = %e, "redirect target is not a valid header value");
                        ex.response_mut().error(StatusCode::BAD_REQUEST);
                    }
                }
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use bytes::Bytes;
    use http::header;

    use super::*;
    use crate::middleware::skip_if;

    fn run(redirect: Redirect, uri: &str, headers: &[(&str, &str)]) -> (Exchange, usize) {
        let calls = Arc::new(AtomicUsize::new(0));
        let counted = Arc::clone(&calls);
        let h = redirect.wrap(handler(move |_| {
            counted.fetch_add(1, Ordering::SeqCst);
            Box::pin(async {})
        }));

        let mut builder = http::Request::builder().uri(uri);
        for (k, v) in headers {
            builder = builder.header(*k, *v);
        }
        let mut ex: Exchange = builder.body(Bytes::new()).unwrap().into();
        futures_util::FutureExt::now_or_never(h(&mut ex)).unwrap();
        let n = calls.load(Ordering::SeqCst);
        (ex, n)
    }

    fn location(ex: &Exchange) -> &str {
        ex.response().headers()[header::LOCATION].to_str().unwrap()
    }

    #[test]
    fn https_upgrades_plain_requests() {
        let (ex, calls) = run(Redirect::https(), "/a?b=1", &[("host", "example.com")]);
        assert_eq!(calls, 0);
        assert_eq!(ex.response().status(), StatusCode::MOVED_PERMANENTLY);
        assert_eq!(location(&ex), "https://example.com/a?b=1");
    }

    #[test]
    fn forwarded_https_is_left_alone() {
        let (ex, calls) = run(
            Redirect::https(),
            "/",
            &[("host", "example.com"), ("x-forwarded-proto", "https")],
        );
        assert_eq!(calls, 1);
        assert!(ex.response().headers().get(header::LOCATION).is_none());
    }

    #[test]
    fn www_variants() {
        let (ex, _) = run(Redirect::https_www(), "/x", &[("host", "example.com")]);
        assert_eq!(location(&ex), "https://www.example.com/x");

        let (ex, _) = run(Redirect::https_non_www(), "/x", &[("host", "www.example.com")]);
        assert_eq!(location(&ex), "https://example.com/x");

        let (ex, _) = run(Redirect::www(), "/x", &[("host", "example.com")]);
        assert_eq!(location(&ex), "http://www.example.com/x");

        let (ex, _) = run(Redirect::non_www(), "/x", &[("host", "www.example.com")]);
        assert_eq!(location(&ex), "http://example.com/x");

        let (_, calls) = run(Redirect::non_www(), "/x", &[("host", "example.com")]);
        assert_eq!(calls, 1);
    }

    #[test]
    fn custom_code_and_fallback_for_non_redirect_codes() {
        let config = RedirectConfig { code: StatusCode::PERMANENT_REDIRECT, ..Default::default() };
        let (ex, _) = run(
            Redirect::with_config(RedirectKind::Https, config),
            "/",
            &[("host", "example.com")],
        );
        assert_eq!(ex.response().status(), StatusCode::PERMANENT_REDIRECT);

        let config = RedirectConfig { code: StatusCode::OK, ..Default::default() };
        let (ex, _) = run(
            Redirect::with_config(RedirectKind::Https, config),
            "/",
            &[("host", "example.com")],
        );
        assert_eq!(ex.response().status(), StatusCode::MOVED_PERMANENTLY);
    }

    #[test]
    fn skipped_request_is_not_redirected() {
        let config = RedirectConfig {
            skipper: skip_if(|ex| ex.request().path() == "/.well-known/acme-challenge"),
            ..Default::default()
        };
        let redirect = Redirect::with_config(RedirectKind::Https, config);

        let (ex, calls) = run(redirect, "/.well-known/acme-challenge", &[("host", "example.com")]);
        assert_eq!(calls, 1);
        assert_eq!(ex.response().status(), StatusCode::OK);
        assert!(ex.response().headers().get(header::LOCATION).is_none());
    }

    #[test]
    fn missing_host_is_not_redirected() {
        let (_, calls) = run(Redirect::https(), "/", &[]);
        assert_eq!(calls, 1);
    }
}
