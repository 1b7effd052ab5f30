//! JSON Web Token authentication.
//!
//! The token is looked up in a header, a query parameter or a cookie and
//! verified with a shared secret. A valid token's claims are stored in the
//! exchange's extensions as [`JwtClaims`] and the next handler runs. No token
//! answers `400 Bad Request`; a bad signature, wrong algorithm or expired
//! token answers `401 Unauthorized`.
//!
//! ```rust
//! use obi::middleware::jwt::{Jwt, JwtClaims};
//! use obi::{BoxFuture, Exchange};
//!
//! let auth: Jwt = Jwt::new(b"secret".to_vec()).unwrap();
//!
//! fn whoami(ex: &mut Exchange) -> BoxFuture<'_> {
//!     Box::pin(async move {
//!         let sub = ex
//!             .extensions()
//!             .get::<JwtClaims>()
//!             .and_then(|c| c.0["sub"].as_str().map(str::to_owned))
//!             .unwrap_or_default();
//!         ex.response_mut().text(sub);
//!     })
//! }
//! ```

use std::marker::PhantomData;
use std::sync::Arc;

use http::header::{self, HeaderName};
use http::StatusCode;
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::de::DeserializeOwned;
use tracing::debug;

use super::{never_skip, Middleware, Skipper};
use crate::error::Error;
use crate::handler::{handler, BoxedHandler};
use crate::request::Request;

const MISSING: &str = "Missing or malformed jwt";
const INVALID: &str = "Invalid or expired jwt";

/// Configuration for [`Jwt`].
///
/// There is no `Default`: a signing key is required, so start from
/// [`JwtConfig::new`].
#[derive(Clone)]
pub struct JwtConfig {
    /// Default: never skip.
    pub skipper: Skipper,
    /// Shared secret the tokens are signed with. Must not be empty.
    pub signing_key: Vec<u8>,
    /// Only tokens signed with this algorithm are accepted. Must be one of
    /// the HMAC algorithms. Default: `HS256`.
    pub signing_method: Algorithm,
    /// Where the token comes from, as `<source>:<name>` with source one of
    /// `header`, `query` or `cookie`. Default: `"header:Authorization"`.
    pub token_lookup: String,
    /// Scheme in front of a token taken from a header, matched without
    /// regard to case. Empty means the whole header value is the token.
    /// Default: `"Bearer"`.
    pub auth_scheme: String,
}

impl JwtConfig {
    pub fn new(signing_key: impl Into<Vec<u8>>) -> Self {
        Self {
            skipper: never_skip(),
            signing_key: signing_key.into(),
            signing_method: Algorithm::HS256,
            token_lookup: "header:Authorization".to_owned(),
            auth_scheme: "Bearer".to_owned(),
        }
    }
}

/// Claims of the token that authenticated the request, stored in
/// [`Exchange::extensions`](crate::Exchange::extensions).
#[derive(Clone, Debug)]
pub struct JwtClaims<T = serde_json::Value>(pub T);

/// JWT middleware, decoding claims into `T`. See the [module docs](self).
pub struct Jwt<T = serde_json::Value> {
    inner: Arc<Inner>,
    claims: PhantomData<fn() -> T>,
}

struct Inner {
    skipper: Skipper,
    key: DecodingKey,
    validation: Validation,
    lookup: TokenLookup,
    auth_scheme: String,
}

impl<T> Clone for Jwt<T> {
    fn clone(&self) -> Self {
        Self { inner: Arc::clone(&self.inner), claims: PhantomData }
    }
}

impl<T> Jwt<T> {
    /// Tokens from `Authorization: Bearer <token>`, signed with HS256.
    pub fn new(signing_key: impl Into<Vec<u8>>) -> Result<Self, Error> {
        Self::with_config(JwtConfig::new(signing_key))
    }

    /// Fails on an empty key, a non-HMAC algorithm or a malformed lookup.
    pub fn with_config(config: JwtConfig) -> Result<Self, Error> {
        if config.signing_key.is_empty() {
            return Err(Error::InvalidJwtConfig("signing key is empty".to_owned()));
        }
        if !matches!(config.signing_method, Algorithm::HS256 | Algorithm::HS384 | Algorithm::HS512) {
            return Err(Error::InvalidJwtConfig(format!(
                "{:?} does not sign with a shared secret",
                config.signing_method
            )));
        }
        let lookup = TokenLookup::parse(&config.token_lookup)?;

        // Registered claims are checked when present but none is required.
        let mut validation = Validation::new(config.signing_method);
        validation.set_required_spec_claims::<&str>(&[]);

        Ok(Self {
            inner: Arc::new(Inner {
                skipper: config.skipper,
                key: DecodingKey::from_secret(&config.signing_key),
                validation,
                lookup,
                auth_scheme: config.auth_scheme,
            }),
            claims: PhantomData,
        })
    }
}

#[derive(Debug, PartialEq)]
enum TokenLookup {
    Header(HeaderName),
    Query(String),
    Cookie(String),
}

impl TokenLookup {
    fn parse(raw: &str) -> Result<Self, Error> {
        let invalid = || Error::InvalidJwtConfig(format!("token lookup `{raw}`"));
        let (source, name) = raw.split_once(':').ok_or_else(invalid)?;
        if name.is_empty() {
            return Err(invalid());
        }
        match source {
            "header" => HeaderName::from_bytes(name.as_bytes()).map(Self::Header).map_err(|_| invalid()),
            "query" => Ok(Self::Query(name.to_owned())),
            "cookie" => Ok(Self::Cookie(name.to_owned())),
            _ => Err(invalid()),
        }
    }

    fn extract<'r>(&self, req: &'r Request, scheme: &str) -> Option<&'r str> {
        match self {
            Self::Header(name) => {
                let value = req.header(name)?;
                if scheme.is_empty() {
                    return (!value.is_empty()).then_some(value);
                }
                let prefix = value.get(..scheme.len())?;
                if !prefix.eq_ignore_ascii_case(scheme) || value.as_bytes().get(scheme.len()) != Some(&b' ') {
                    return None;
                }
                let token = &value[scheme.len() + 1..];
                (!token.is_empty()).then_some(token)
            }
            Self::Query(name) => req.query()?.split('&').find_map(|pair| pick(pair, name)),
            Self::Cookie(name) => req
                .headers()
                .get_all(header::COOKIE)
                .iter()
                .filter_map(|v| v.to_str().ok())
                .flat_map(|v| v.split(';'))
                .find_map(|pair| pick(pair.trim(), name)),
        }
    }
}

/// Value of a non-empty `name=value` pair named `name`.
fn pick<'a>(pair: &'a str, name: &str) -> Option<&'a str> {
    let (key, value) = pair.split_once('=')?;
    (key == name && !value.is_empty()).then_some(value)
}

impl<T> Middleware for Jwt<T>
where
    T: DeserializeOwned + Clone + Send + Sync + 'static,
{
    fn wrap(&self, next: BoxedHandler) -> BoxedHandler {
        let inner = Arc::clone(&self.inner);

        handler(move |ex| {
            let next = Arc::clone(&next);
            let inner = Arc::clone(&inner);
            Box::pin(async move {
                if (inner.skipper)(ex) {
                    return next(ex).await;
                }

                let Some(token) = inner.lookup.extract(ex.request(), &inner.auth_scheme) else {
                    debug!(path = %ex.request().path(), "jwt missing");
                    ex.response_mut().set_status(StatusCode::BAD_REQUEST).text(MISSING);
                    return;
                };

                match decode::<T>(token, &inner.key, &inner.validation) {
                    Ok(data) => {
                        ex.extensions_mut().insert(JwtClaims(data.claims));
                        next(ex).await;
                    }
                    Err(err) => {
                        debug!(path = %ex.request().path(), error = %err, "jwt rejected");
                        ex.response_mut().set_status(StatusCode::UNAUTHORIZED).text(INVALID);
                    }
                }
            })
        })
    }
}
