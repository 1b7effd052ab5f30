//! Unified error type.

use thiserror::Error;

/// The error type returned by obi's fallible operations.
///
/// Application-level outcomes (404, 413, 500, etc.) are written to the
/// [`Exchange`](crate::Exchange) response, not returned as `Error`s. This type
/// surfaces infrastructure and setup failures: binding to a port, accepting a
/// connection, or building a middleware from an invalid configuration.
#[derive(Debug, Error)]
pub enum Error {
    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid socket address `{addr}`")]
    InvalidAddress {
        addr: String,
        #[source]
        source: std::net::AddrParseError,
    },

    /// A body-limit string that is not `<n>`, `<n><unit>` or `<n><unit>B`.
    #[error("invalid body limit `{0}`")]
    InvalidBodyLimit(String),

    /// A JWT policy built without a usable key, with an algorithm that does
    /// not take a shared secret, or with a malformed token lookup.
    #[error("invalid jwt config: {0}")]
    InvalidJwtConfig(String),

    /// A configured value that cannot be sent as an HTTP header.
    #[error("invalid value for header `{name}`")]
    InvalidHeaderValue {
        name: &'static str,
        #[source]
        source: http::header::InvalidHeaderValue,
    },
}
