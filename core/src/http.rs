//! HTTP transport types and the `Transport` seam.
//!
//! # Design
//! Requests and responses are plain data. `Client` builds an `HttpRequest`,
//! hands it to a `Transport`, and parses the `HttpResponse` it gets back, so
//! request building and response parsing stay deterministic and testable
//! without a network. `UreqTransport` is the default blocking transport;
//! anything else (a test fake, a logging decorator) plugs in through the
//! same trait.
//!
//! The XML API accepts `POST` only, so requests carry no method field.

use std::time::Duration;

use tracing::info;

use crate::error::Error;

/// A `POST` request described as plain data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: String,
}

impl HttpRequest {
    /// Case-insensitive header lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        find_header(&self.headers, name)
    }
}

/// An HTTP response described as plain data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: String,
}

impl HttpResponse {
    /// Case-insensitive header lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        find_header(&self.headers, name)
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn is_redirect(&self) -> bool {
        (300..400).contains(&self.status)
    }
}

fn find_header<'a>(headers: &'a [(String, String)], name: &str) -> Option<&'a str> {
    headers
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case(name))
        .map(|(_, v)| v.as_str())
}

/// Executes one HTTP round trip.
///
/// Implementations must return non-2xx and 3xx responses as data: status
/// interpretation (including the login redirect) belongs to `Client`.
/// A `Transport` is shared by every call of a client, possibly from several
/// threads.
pub trait Transport: Send + Sync {
    fn execute(&self, request: &HttpRequest) -> Result<HttpResponse, Error>;
}

impl<T: Transport + ?Sized> Transport for &T {
    fn execute(&self, request: &HttpRequest) -> Result<HttpResponse, Error> {
        (**self).execute(request)
    }
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn execute(&self, request: &HttpRequest) -> Result<HttpResponse, Error> {
        (**self).execute(request)
    }
}

/// Blocking transport backed by a `ureq` agent.
///
/// Redirects are not followed so the caller can see them, and error
/// statuses are returned as responses.
#[derive(Clone)]
pub struct UreqTransport {
    agent: ureq::Agent,
}

impl std::fmt::Debug for UreqTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UreqTransport").finish_non_exhaustive()
    }
}

impl UreqTransport {
    pub fn new(timeout: Option<Duration>) -> Self {
        let agent = ureq::Agent::config_builder()
            .http_status_as_error(false)
            .max_redirects(0)
            .timeout_global(timeout)
            .build()
            .new_agent();
        Self { agent }
    }
}

impl Default for UreqTransport {
    fn default() -> Self {
        Self::new(None)
    }
}

impl Transport for UreqTransport {
    fn execute(&self, request: &HttpRequest) -> Result<HttpResponse, Error> {
        let mut builder = self.agent.post(request.url.as_str());
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }

        let mut response = builder
            .send(request.body.as_bytes())
            .map_err(|e| Error::Transport(e.to_string()))?;

        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_string(), v.to_string()))
            })
            .collect();
        let body = response
            .body_mut()
            .read_to_string()
            .map_err(|e| Error::Transport(e.to_string()))?;

        Ok(HttpResponse {
            status,
            headers,
            body,
        })
    }
}

/// Logs every request and response body at `info` level, then delegates.
#[derive(Debug, Clone, Default)]
pub struct LoggingTransport<T> {
    inner: T,
}

impl<T: Transport> LoggingTransport<T> {
    pub fn new(inner: T) -> Self {
        Self { inner }
    }

    pub fn into_inner(self) -> T {
        self.inner
    }
}

impl<T: Transport> Transport for LoggingTransport<T> {
    fn execute(&self, request: &HttpRequest) -> Result<HttpResponse, Error> {
        info!(url = %request.url, "\n== Request ==\n{}", request.body);
        let response = self.inner.execute(request)?;
        info!(status = response.status, "\n== Response ==\n{}\n", response.body);
        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Echo;

    impl Transport for Echo {
        fn execute(&self, request: &HttpRequest) -> Result<HttpResponse, Error> {
            Ok(HttpResponse {
                status: 200,
                headers: vec![("Content-Type".to_string(), "application/xml".to_string())],
                body: request.body.clone(),
            })
        }
    }

    fn request() -> HttpRequest {
        HttpRequest {
            url: "https://acme.example/api/2.1/xml-in".to_string(),
            headers: vec![("Authorization".to_string(), "Basic abc".to_string())],
            body: "<request method=\"client.list\"></request>".to_string(),
        }
    }

    #[test]
    fn header_lookup_ignores_case() {
        let req = request();
        assert_eq!(req.header("authorization"), Some("Basic abc"));
        assert!(req.header("location").is_none());
    }

    #[test]
    fn status_classes() {
        let mut resp = HttpResponse {
            status: 200,
            headers: Vec::new(),
            body: String::new(),
        };
        assert!(resp.is_success());
        resp.status = 302;
        assert!(resp.is_redirect());
        assert!(!resp.is_success());
    }

    #[test]
    fn logging_transport_delegates() {
        let transport = LoggingTransport::new(Echo);
        let resp = transport.execute(&request()).unwrap();
        assert_eq!(resp.body, request().body);
        assert_eq!(resp.header("content-type"), Some("application/xml"));
    }

    #[test]
    fn boxed_transport_delegates() {
        let transport: Box<dyn Transport> = Box::new(Echo);
        assert_eq!(transport.execute(&request()).unwrap().status, 200);
    }
}
