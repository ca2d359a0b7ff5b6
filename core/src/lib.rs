//! Blocking client for the FreshBooks XML-over-HTTP API.
//!
//! # Overview
//! Callers name remote methods by chaining namespaces
//! (`client.ns("invoice").call("list", params)`) or by dotted name
//! (`client.call("invoice.list", params)`). The crate has no catalog of
//! remote methods: whatever name the chain resolves to is sent, and the
//! server decides whether it exists.
//!
//! # Design
//! - `Value` is the one data model for arguments and decoded bodies.
//! - `xml` turns values into `<request method="…">` documents and parses
//!   `<response status="…">` documents back into `Response` envelopes.
//! - `Credentials` picks token (Basic) or OAuth 1.0 PLAINTEXT signing.
//! - `Client` splits every call into `build_request` / `parse_response`
//!   around a pluggable `Transport`; `UreqTransport` is the default.
//! - A `status="fail"` response is returned as a `Response`, not an error.

pub mod auth;
pub mod client;
pub mod error;
pub mod http;
pub mod resolver;
pub mod response;
pub mod value;
pub mod xml;

pub use auth::{AuthKind, Credentials};
#[allow(deprecated)]
pub use client::Connection;
pub use client::{Client, ClientConfig, API_VERSION};
pub use error::Error;
pub use http::{HttpRequest, HttpResponse, LoggingTransport, Transport, UreqTransport};
pub use resolver::{MethodName, Namespace, SubordinateRules};
pub use response::{Response, Status};
pub use value::{Map, Value};
pub use xml::{XmlError, XmlOptions};
