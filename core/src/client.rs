//! Account-bound client for the XML API.
//!
//! # Design
//! `Client` holds immutable credentials, an immutable `ClientConfig`, and a
//! `Transport`. Each call is split into `build_request` (method name and
//! params in, `HttpRequest` out) and `parse_response` (`HttpResponse` in,
//! `Response` out); `execute` runs the transport between the two. No state
//! survives a call, so one client may serve concurrent calls from several
//! threads. Nothing is retried.

use std::time::Duration;

use tracing::{debug, warn};

use crate::auth::{AuthKind, Credentials};
use crate::error::Error;
use crate::http::{HttpRequest, HttpResponse, Transport, UreqTransport};
use crate::resolver::{MethodName, Namespace, SubordinateRules};
use crate::response::Response;
use crate::value::Value;
use crate::xml::{self, XmlOptions};

/// Version segment of the endpoint path.
pub const API_VERSION: &str = "2.1";

/// Path the backend redirects unknown accounts to instead of failing.
pub const LOGIN_SEARCH_PATH: &str = "/loginSearch";

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Per-client HTTP and serialization settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// `https` unless talking to a local test server.
    pub scheme: String,
    pub xml: XmlOptions,
    pub subordinates: SubordinateRules,
    /// Overall deadline for one round trip, enforced by the transport.
    pub timeout: Option<Duration>,
    pub user_agent: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            scheme: "https".to_string(),
            xml: XmlOptions::default(),
            subordinates: SubordinateRules::default(),
            timeout: Some(DEFAULT_TIMEOUT),
            user_agent: concat!("freshbooks-core/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

/// Client for one remote account.
#[derive(Debug)]
pub struct Client<T = UreqTransport> {
    credentials: Credentials,
    config: ClientConfig,
    transport: T,
}

/// Former name of `Client`.
#[deprecated(note = "use `Client` instead")]
pub type Connection = Client;

impl Client<UreqTransport> {
    pub fn new(credentials: Credentials) -> Self {
        Self::with_config(credentials, ClientConfig::default())
    }

    /// Two arguments build a token client, five an OAuth client.
    pub fn from_args(args: &[&str]) -> Result<Self, Error> {
        Ok(Self::new(Credentials::from_args(args)?))
    }

    pub fn with_config(credentials: Credentials, config: ClientConfig) -> Self {
        let transport = UreqTransport::new(config.timeout);
        Self::with_transport(credentials, config, transport)
    }
}

impl<T: Transport> Client<T> {
    pub fn with_transport(credentials: Credentials, config: ClientConfig, transport: T) -> Self {
        Self {
            credentials,
            config,
            transport,
        }
    }

    pub fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    pub fn auth_kind(&self) -> AuthKind {
        self.credentials.kind()
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn api_url(&self) -> String {
        format!(
            "{}://{}/api/{API_VERSION}/xml-in",
            self.config.scheme,
            self.credentials.domain()
        )
    }

    /// Start a call chain at `segment`. Performs no request.
    pub fn ns(&self, segment: &str) -> Namespace<'_, T> {
        Namespace::new(self, segment)
    }

    /// Call a remote method by its dotted name. The configured subordinate
    /// rules apply exactly as they do for a chain built with `ns`.
    pub fn call(&self, method: &str, params: impl Into<Value>) -> Result<Response, Error> {
        let method = self.config.subordinates.apply(&MethodName::parse(method)?)?;
        self.execute(&method, params)
    }

    /// Serialize, send, and decode one call.
    pub fn execute(&self, method: &MethodName, params: impl Into<Value>) -> Result<Response, Error> {
        let request = self.build_request(method, &params.into())?;
        let response = self.transport.execute(&request)?;
        self.parse_response(response)
    }

    pub fn build_request(&self, method: &MethodName, params: &Value) -> Result<HttpRequest, Error> {
        let body = xml::request_body(method.as_str(), params, &self.config.xml)?;

        let mut headers = self.credentials.auth_headers();
        headers.push((
            "Content-Type".to_string(),
            "application/xml; charset=utf-8".to_string(),
        ));
        headers.push(("User-Agent".to_string(), self.config.user_agent.clone()));

        debug!(method = %method, bytes = body.len(), "built request");
        Ok(HttpRequest {
            url: self.api_url(),
            headers,
            body,
        })
    }

    pub fn parse_response(&self, response: HttpResponse) -> Result<Response, Error> {
        if response.is_redirect() {
            if is_login_redirect(&response) {
                warn!(
                    domain = self.credentials.domain(),
                    "account redirected to login search, treating as not found"
                );
                return Ok(Response::not_found());
            }
            return Err(Error::Http {
                status: response.status,
                body: response.body,
            });
        }

        match xml::deserialize(&response.body) {
            Ok(decoded) => {
                debug!(http_status = response.status, status = %decoded.status(), "decoded response");
                Ok(decoded)
            }
            Err(e) if response.is_success() => Err(Error::Decode(e)),
            Err(_) => Err(Error::Http {
                status: response.status,
                body: response.body,
            }),
        }
    }
}

/// A redirect whose `Location` path ends in the login search page.
fn is_login_redirect(response: &HttpResponse) -> bool {
    let Some(location) = response.header("location") else {
        return false;
    };
    let without_fragment = location.split('#').next().unwrap_or_default();
    let path = without_fragment.split('?').next().unwrap_or_default();
    path.ends_with(LOGIN_SEARCH_PATH)
}
