//! Error types for the XML API client.
//!
//! # Design
//! A response with `status="fail"` is not an error: it decodes into a normal
//! `Response` whose `is_success()` is false. The variants here cover the
//! cases where no envelope could be produced at all: bad client setup, an
//! unusable method name, a network failure, or a body that is not a valid
//! envelope.

use crate::xml::XmlError;

/// Errors returned by `Client` construction and calls.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Wrong number of credential arguments or an empty credential field.
    #[error("configuration error: {0}")]
    Config(String),

    /// A call chain produced a method name the wire format cannot carry.
    #[error("invalid method name: {0}")]
    InvalidMethod(String),

    /// The request never produced an HTTP response.
    #[error("transport error: {0}")]
    Transport(String),

    /// The response body is not a well-formed `<response>` envelope.
    #[error("decode error: {0}")]
    Decode(#[from] XmlError),

    /// A non-success HTTP status whose body is not an envelope.
    #[error("HTTP {status}: {body}")]
    Http { status: u16, body: String },
}
