//! Cross-Origin Resource Sharing.
//!
//! Simple requests get the allow-origin headers and continue down the
//! chain. Preflight `OPTIONS` requests are answered right here with
//! `204 No Content` and never reach the router, which is why CORS belongs in
//! the pre-chain.
//!
//! See <https://developer.mozilla.org/en-US/docs/Web/HTTP/CORS>.

use std::sync::Arc;

use http::header::{self, HeaderName, HeaderValue};
use http::{Method, StatusCode};

use super::{never_skip, Middleware, Skipper};
use crate::error::Error;
use crate::handler::{handler, BoxedHandler};

/// Configuration for [`Cors`].
#[derive(Clone)]
pub struct CorsConfig {
    /// Default: never skip.
    pub skipper: Skipper,
    /// Origins allowed to access the resource; `"*"` allows any.
    /// Default: `["*"]`. An empty list falls back to the default.
    pub allow_origins: Vec<String>,
    /// Methods announced in preflight responses.
    /// Default: GET, HEAD, PUT, PATCH, POST, DELETE. An empty list falls back to the default.
    pub allow_methods: Vec<Method>,
    /// Request headers announced in preflight responses. Default: none, in
    /// which case the preflight's `Access-Control-Request-Headers` is echoed.
    pub allow_headers: Vec<String>,
    /// Default: `false`.
    pub allow_credentials: bool,
    /// Response headers the client may read. Default: none.
    pub expose_headers: Vec<String>,
    /// Seconds a preflight result may be cached. `0` (the default) omits the header.
    pub max_age: u64,
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            skipper: never_skip(),
            allow_origins: vec!["*".to_owned()],
            allow_methods: vec![
                Method::GET,
                Method::HEAD,
                Method::PUT,
                Method::PATCH,
                Method::POST,
                Method::DELETE,
            ],
            allow_headers: Vec::new(),
            allow_credentials: false,
            expose_headers: Vec::new(),
            max_age: 0,
        }
    }
}

/// CORS middleware. See the [module docs](self).
#[derive(Clone)]
pub struct Cors {
    inner: Arc<Inner>,
}

/// Header values rendered once at construction.
struct Inner {
    skipper: Skipper,
    origins: Vec<(String, HeaderValue)>,
    allow_methods: HeaderValue,
    allow_headers: Option<HeaderValue>,
    allow_credentials: bool,
    expose_headers: Option<HeaderValue>,
    max_age: Option<HeaderValue>,
}

impl Cors {
    /// Permissive defaults: any origin, the common methods.
    pub fn new() -> Self {
        // Every default origin and method is a valid header token.
        Self::with_config(CorsConfig::default()).expect("default CORS config renders to valid headers")
    }

    /// Fails if a configured origin or header name cannot be sent in a header.
    pub fn with_config(config: CorsConfig) -> Result<Self, Error> {
        let defaults = CorsConfig::default();
        let allow_origins = if config.allow_origins.is_empty() {
            defaults.allow_origins
        } else {
            config.allow_origins
        };
        let allow_methods = if config.allow_methods.is_empty() {
            defaults.allow_methods
        } else {
            config.allow_methods
        };

        let origins = allow_origins
            .into_iter()
            .map(|o| {
                let value = value("access-control-allow-origin", &o)?;
                Ok((o, value))
            })
            .collect::<Result<Vec<_>, Error>>()?;
        let methods: Vec<&str> = allow_methods.iter().map(Method::as_str).collect();

        Ok(Self {
            inner: Arc::new(Inner {
                skipper: config.skipper,
                origins,
                allow_methods: value("access-control-allow-methods", &methods.join(","))?,
                allow_headers: joined("access-control-allow-headers", &config.allow_headers)?,
                allow_credentials: config.allow_credentials,
                expose_headers: joined("access-control-expose-headers", &config.expose_headers)?,
                max_age: (config.max_age > 0).then(|| HeaderValue::from(config.max_age)),
            }),
        })
    }
}

impl Default for Cors {
    fn default() -> Self {
        Self::new()
    }
}

fn value(name: &'static str, s: &str) -> Result<HeaderValue, Error> {
    HeaderValue::from_str(s).map_err(|source| Error::InvalidHeaderValue { name, source })
}

fn joined(name: &'static str, items: &[String]) -> Result<Option<HeaderValue>, Error> {
    if items.is_empty() {
        return Ok(None);
    }
    value(name, &items.join(",")).map(Some)
}

impl Inner {
    fn allow_origin(&self, origin: Option<&str>) -> Option<&HeaderValue> {
        self.origins
            .iter()
            .find(|(o, _)| o == "*" || Some(o.as_str()) == origin)
            .map(|(_, v)| v)
    }
}

const VARY_PREFLIGHT: [HeaderName; 3] = [
    header::ORIGIN,
    header::ACCESS_CONTROL_REQUEST_METHOD,
    header::ACCESS_CONTROL_REQUEST_HEADERS,
];

impl Middleware for Cors {
    fn wrap(&self, next: BoxedHandler) -> BoxedHandler {
        let inner = Arc::clone(&self.inner);

        handler(move |ex| {
            let next = Arc::clone(&next);
            let inner = Arc::clone(&inner);
            Box::pin(async move {
                if (inner.skipper)(ex) {
                    return next(ex).await;
                }

                let req = ex.request();
                let preflight = req.method() == Method::OPTIONS;
                let allow_origin = inner.allow_origin(req.header(header::ORIGIN)).cloned();
                let requested_headers = req.headers().get(header::ACCESS_CONTROL_REQUEST_HEADERS).cloned();

                let res = ex.response_mut();
                if let Some(origin) = allow_origin {
                    res.set_header(header::ACCESS_CONTROL_ALLOW_ORIGIN, origin);
                }
                if inner.allow_credentials {
                    res.set_header(
                        header::ACCESS_CONTROL_ALLOW_CREDENTIALS,
                        HeaderValue::from_static("true"),
                    );
                }

                if !preflight {
                    res.append_header(header::VARY, HeaderValue::from_static("Origin"));
                    if let Some(expose) = &inner.expose_headers {
                        res.set_header(header::ACCESS_CONTROL_EXPOSE_HEADERS, expose.clone());
                    }
                    return next(ex).await;
                }

                for name in VARY_PREFLIGHT {
                    res.append_header(header::VARY, HeaderValue::from(name));
                }
                res.set_header(header::ACCESS_CONTROL_ALLOW_METHODS, inner.allow_methods.clone());
                if let Some(allowed) = inner.allow_headers.clone().or(requested_headers) {
                    res.set_header(header::ACCESS_CONTROL_ALLOW_HEADERS, allowed);
                }
                if let Some(max_age) = &inner.max_age {
                    res.set_header(header::ACCESS_CONTROL_MAX_AGE, max_age.clone());
                }
                res.set_status(StatusCode::NO_CONTENT);
            })
        })
    }
}
