//! Decoded response envelope.

use std::fmt;
use std::str::FromStr;

use serde::Serialize;

use crate::value::{Map, Value};
use crate::xml::XmlError;

/// Value of the `status` attribute on `<response>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Ok,
    Fail,
}

impl Status {
    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Ok => "ok",
            Status::Fail => "fail",
        }
    }
}

impl FromStr for Status {
    type Err = XmlError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ok" => Ok(Status::Ok),
            "fail" => Ok(Status::Fail),
            other => Err(XmlError::InvalidStatus(other.to_string())),
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A decoded `<response>`: its status plus everything else it carried.
///
/// A failed API call is still a `Response`; check `is_success()` and read
/// the server's message from `error()`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Response {
    status: Status,
    body: Map,
}

impl Response {
    pub fn new(status: Status, body: Map) -> Self {
        Self { status, body }
    }

    /// What the backend should have answered instead of redirecting an
    /// unknown account to its login search page.
    pub fn not_found() -> Self {
        Self::new(
            Status::Fail,
            Map::new().with("error", "Not Found").with("code", "404"),
        )
    }

    pub fn status(&self) -> Status {
        self.status
    }

    pub fn is_success(&self) -> bool {
        self.status == Status::Ok
    }

    /// Server-supplied error text of a failed call.
    pub fn error(&self) -> Option<&str> {
        self.body.get("error").and_then(Value::as_str)
    }

    pub fn code(&self) -> Option<&str> {
        self.body.get("code").and_then(Value::as_str)
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.body.get(key)
    }

    pub fn body(&self) -> &Map {
        &self.body
    }

    pub fn into_body(self) -> Map {
        self.body
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_parses_known_values_only() {
        assert_eq!("ok".parse::<Status>().unwrap(), Status::Ok);
        assert_eq!("fail".parse::<Status>().unwrap(), Status::Fail);
        assert!(matches!("OK".parse::<Status>(), Err(XmlError::InvalidStatus(_))));
    }

    #[test]
    fn not_found_is_a_failure() {
        let resp = Response::not_found();
        assert!(!resp.is_success());
        assert_eq!(resp.error(), Some("Not Found"));
        assert_eq!(resp.code(), Some("404"));
    }

    #[test]
    fn serializes_with_lowercase_status() {
        let resp = Response::new(Status::Ok, Map::new().with("client_id", "3"));
        let json = serde_json::to_value(&resp).unwrap();
        assert_eq!(json["status"], "ok");
        assert_eq!(json["body"]["client_id"], "3");
    }
}
