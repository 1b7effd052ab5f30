//! The per-request exchange object.

use bytes::Bytes;
use http::Extensions;

use crate::request::Request;
use crate::response::Response;

/// One request and the response being built for it.
///
/// The server creates an `Exchange` per request and lends it, `&mut`, to the
/// composed handler. Every middleware and the terminal handler observe and
/// mutate this same instance; whatever is in [`response`](Exchange::response)
/// when dispatch returns is sent to the client.
///
/// [`extensions`](Exchange::extensions) carries typed values between
/// middleware and handlers, e.g. an authenticated principal.
#[derive(Debug)]
pub struct Exchange {
    request: Request,
    response: Response,
    extensions: Extensions,
}

impl Exchange {
    pub fn new(request: Request) -> Self {
        Self { request, response: Response::default(), extensions: Extensions::new() }
    }

    pub fn request(&self) -> &Request { &self.request }
    pub fn request_mut(&mut self) -> &mut Request { &mut self.request }
    pub fn response(&self) -> &Response { &self.response }
    pub fn response_mut(&mut self) -> &mut Response { &mut self.response }
    pub fn extensions(&self) -> &Extensions { &self.extensions }
    pub fn extensions_mut(&mut self) -> &mut Extensions { &mut self.extensions }

    pub fn into_response(self) -> Response {
        self.response
    }
}

impl From<Request> for Exchange {
    fn from(request: Request) -> Self {
        Self::new(request)
    }
}

impl From<http::Request<Bytes>> for Exchange {
    fn from(req: http::Request<Bytes>) -> Self {
        Self::new(req.into())
    }
}
