//! Outgoing HTTP response, written in place by handlers and middleware.
//!
//! Every [`Exchange`](crate::Exchange) starts with an empty `200 OK`
//! response. Whoever runs later may overwrite it, so the response seen by
//! the client is whatever the last writer left behind.

use bytes::Bytes;
use http::header::{self, HeaderMap, HeaderName, HeaderValue};
use http::StatusCode;
use http_body_util::Full;

// ── ContentType ───────────────────────────────────────────────────────────────

/// Common content-type values for use with [`Response::bytes`].
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ContentType {
    Html,         // text/html; charset=utf-8
    Json,         // application/json
    OctetStream,  // application/octet-stream
    Text,         // text/plain; charset=utf-8
    Xml,          // application/xml
}

impl ContentType {
    fn as_str(self) -> &'static str {
        match self {
            Self::Html        => "text/html; charset=utf-8",
            Self::Json        => "application/json",
            Self::OctetStream => "application/octet-stream",
            Self::Text        => "text/plain; charset=utf-8",
            Self::Xml         => "application/xml",
        }
    }
}

// ── Response ─────────────────────────────────────────────────────────────────

/// The response half of an exchange.
///
/// ```rust
/// use obi::{ContentType, Exchange, StatusCode};
/// # let mut ex = Exchange::from(http::Request::new(bytes::Bytes::new()));
///
/// ex.response_mut().json(br#"{"id":1}"#.to_vec());
/// ex.response_mut()
///     .set_status(StatusCode::CREATED)
///     .bytes(ContentType::Xml, b"<ok/>".to_vec());
/// ```
#[derive(Debug, Default)]
pub struct Response {
    status: StatusCode,
    headers: HeaderMap,
    body: Bytes,
}

impl Response {
    pub fn status(&self) -> StatusCode { self.status }
    pub fn headers(&self) -> &HeaderMap { &self.headers }
    pub fn headers_mut(&mut self) -> &mut HeaderMap { &mut self.headers }
    pub fn body(&self) -> &[u8] { &self.body }

    pub fn set_status(&mut self, status: StatusCode) -> &mut Self {
        self.status = status;
        self
    }

    /// Sets `name`, replacing any previous values.
    pub fn set_header(&mut self, name: HeaderName, value: HeaderValue) -> &mut Self {
        self.headers.insert(name, value);
        self
    }

    /// Adds another value for `name`, keeping previous ones.
    pub fn append_header(&mut self, name: HeaderName, value: HeaderValue) -> &mut Self {
        self.headers.append(name, value);
        self
    }

    /// Replaces the body with `application/json` bytes.
    ///
    /// Pass bytes from your serialiser directly:
    /// - serde_json: `serde_json::to_vec(&val)?`
    /// - hand-built: `format!(r#"{{"id":{id}}}"#).into_bytes()`
    pub fn json(&mut self, body: impl Into<Bytes>) -> &mut Self {
        self.bytes(ContentType::Json, body)
    }

    /// Replaces the body with `text/plain; charset=utf-8`.
    pub fn text(&mut self, body: impl Into<String>) -> &mut Self {
        let body: String = body.into();
        self.bytes(ContentType::Text, body)
    }

    /// Replaces the body with a typed payload. Use this for XML, HTML, binary, etc.
    pub fn bytes(&mut self, content_type: ContentType, body: impl Into<Bytes>) -> &mut Self {
        self.headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static(content_type.as_str()),
        );
        self.body = body.into();
        self
    }

    /// Writes a plain-text error: `status` plus its canonical reason as body.
    ///
    /// Headers already set by outer middleware (CORS, `WWW-Authenticate`, ...)
    /// are kept.
    pub fn error(&mut self, status: StatusCode) -> &mut Self {
        self.status = status;
        self.text(status.canonical_reason().unwrap_or_default())
    }

    /// Redirects to `location` with a `3xx` `status` and an empty body.
    pub fn redirect(&mut self, status: StatusCode, location: HeaderValue) -> &mut Self {
        self.status = status;
        self.headers.insert(header::LOCATION, location);
        self.headers.remove(header::CONTENT_TYPE);
        self.body = Bytes::new();
        self
    }

    /// Discards everything written so far and starts over with `status`.
    pub(crate) fn reset(&mut self, status: StatusCode) -> &mut Self {
        *self = Self { status, ..Self::default() };
        self
    }

    pub(crate) fn into_http(self) -> http::Response<Full<Bytes>> {
        let mut res = http::Response::new(Full::new(self.body));
        *res.status_mut() = self.status;
        *res.headers_mut() = self.headers;
        res
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_response_is_empty_ok() {
        let res = Response::default();
        assert_eq!(res.status(), StatusCode::OK);
        assert!(res.body().is_empty());
        assert!(res.headers().is_empty());
    }

    #[test]
    fn error_keeps_headers_set_earlier() {
        let mut res = Response::default();
        res.set_header(header::VARY, HeaderValue::from_static("origin"));
        res.error(StatusCode::PAYLOAD_TOO_LARGE);

        assert_eq!(res.status(), StatusCode::PAYLOAD_TOO_LARGE);
        assert_eq!(res.body(), b"Payload Too Large");
        assert_eq!(res.headers()[header::VARY], "origin");
        assert_eq!(res.headers()[header::CONTENT_TYPE], "text/plain; charset=utf-8");
    }

    #[test]
    fn redirect_clears_body() {
        let mut res = Response::default();
        res.text("stale");
        res.redirect(
            StatusCode::MOVED_PERMANENTLY,
            HeaderValue::from_static("https://example.com/"),
        );

        assert!(res.body().is_empty());
        assert_eq!(res.headers()[header::LOCATION], "https://example.com/");
        assert!(res.headers().get(header::CONTENT_TYPE).is_none());
    }

    #[test]
    fn into_http_carries_status_and_headers() {
        let mut res = Response::default();
        res.set_status(StatusCode::CREATED).json(b"{}".to_vec());
        let http = res.into_http();
        assert_eq!(http.status(), StatusCode::CREATED);
        assert_eq!(http.headers()[header::CONTENT_TYPE], "application/json");
    }
}
