//! HTTP Basic authentication.
//!
//! Valid credentials call the next handler. Missing, malformed or rejected
//! credentials answer `401 Unauthorized` with a `WWW-Authenticate` challenge,
//! so browsers show their login box.
//!
//! The validator is async, so it can look credentials up in a database or
//! call out to another service. It also sees the request, for decisions that
//! depend on the tenant or path; copy what you need out of it before the
//! `async` block, since the returned future may not borrow it:
//!
//! ```rust
//! use obi::middleware::basic_auth::{BasicAuth, BoxError};
//!
//! let auth = BasicAuth::new(|user, pass, req| {
//!     let admin_area = req.path().starts_with("/admin");
//!     async move { Ok::<_, BoxError>(user == "joe" && pass == "secret" && !admin_area) }
//! });
//! ```

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use http::header::{self, HeaderValue};
use http::StatusCode;
use tracing::{debug, warn};

use super::{never_skip, Middleware, Skipper};
use crate::error::Error;
use crate::exchange::Exchange;
use crate::handler::{handler, BoxedHandler};
use crate::request::Request;

/// Error type a validator may fail with. Any failure is answered with `401`.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

type ValidatorFuture = Pin<Box<dyn Future<Output = Result<bool, BoxError>> + Send>>;

/// Checks a username/password pair for the given request.
pub type Validator = Arc<dyn Fn(String, String, &Request) -> ValidatorFuture + Send + Sync>;

const BASIC: &str = "Basic";
const DEFAULT_REALM: &str = "Restricted";

/// Configuration for [`BasicAuth`].
///
/// There is no `Default`: a validator is required, so start from
/// [`BasicAuthConfig::new`].
#[derive(Clone)]
pub struct BasicAuthConfig {
    /// Default: never skip.
    pub skipper: Skipper,
    pub validator: Validator,
    /// Realm sent in the challenge. Default: `"Restricted"`.
    pub realm: String,
}

impl BasicAuthConfig {
    pub fn new<F, Fut>(validator: F) -> Self
    where
        F: Fn(String, String, &Request) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<bool, BoxError>> + Send + 'static,
    {
        Self {
            skipper: never_skip(),
            validator: Arc::new(move |user: String, pass: String, req: &Request| -> ValidatorFuture {
                Box::pin(validator(user, pass, req))
            }),
            realm: DEFAULT_REALM.to_owned(),
        }
    }
}

/// Basic authentication middleware. See the [module docs](self).
#[derive(Clone)]
pub struct BasicAuth {
    skipper: Skipper,
    validator: Validator,
    challenge: HeaderValue,
}

impl BasicAuth {
    pub fn new<F, Fut>(validator: F) -> Self
    where
        F: Fn(String, String, &Request) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<bool, BoxError>> + Send + 'static,
    {
        let challenge = HeaderValue::from_static("Basic realm=Restricted");
        let config = BasicAuthConfig::new(validator);
        Self { skipper: config.skipper, validator: config.validator, challenge }
    }

    /// Fails if the realm cannot be sent in a header.
    pub fn with_config(config: BasicAuthConfig) -> Result<Self, Error> {
        let realm = match config.realm.as_str() {
            "" | DEFAULT_REALM => DEFAULT_REALM.to_owned(),
            custom => format!("{custom:?}"),
        };
        let challenge = HeaderValue::from_str(&format!("{BASIC} realm={realm}"))
            .map_err(|source| Error::InvalidHeaderValue { name: "www-authenticate", source })?;
        Ok(Self { skipper: config.skipper, validator: config.validator, challenge })
    }
}

impl Middleware for BasicAuth {
    fn wrap(&self, next: BoxedHandler) -> BoxedHandler {
        let this = self.clone();

        handler(move |ex| {
            let next = Arc::clone(&next);
            let this = this.clone();
            Box::pin(async move {
                if (this.skipper)(ex) {
                    return next(ex).await;
                }

                if let Some((user, pass)) = credentials(ex) {
                    match (this.validator)(user, pass, ex.request()).await {
                        Ok(true) => return next(ex).await,
                        Ok(false) => debug!(path = ex.request().path(), "basic auth rejected"),
                        Err(e) => warn!(error = %e, "basic auth validator failed"),
                    }
                }

                ex.response_mut()
                    .set_header(header::WWW_AUTHENTICATE, this.challenge.clone())
                    .error(StatusCode::UNAUTHORIZED);
            })
        })
    }
}

/// Decodes `Authorization: Basic <base64(user:pass)>`.
fn credentials(ex: &Exchange) -> Option<(String, String)> {
    let auth = ex.request().header(header::AUTHORIZATION)?;
    let (scheme, encoded) = auth.split_once(' ')?;
    if !scheme.eq_ignore_ascii_case(BASIC) {
        return None;
    }
    let decoded = STANDARD.decode(encoded.trim()).ok()?;
    let decoded = String::from_utf8(decoded).ok()?;
    let (user, pass) = decoded.split_once(':')?;
    Some((user.to_owned(), pass.to_owned()))
}
