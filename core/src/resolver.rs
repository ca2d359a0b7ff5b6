//! Call chains that resolve to remote method names.
//!
//! # Design
//! The client knows nothing about the remote method catalog. A chain such as
//! `client.ns("invoice").call("list", params)` accumulates namespace
//! segments in a `Namespace` value and joins them into `invoice.list` only
//! when a call is made. Each `ns` step returns a new `Namespace`; none of
//! them touch the transport.
//!
//! Subordinate resources (`lines` under `invoice` and `recurring`) extend a
//! chain to three segments. Whether the emitted segment stays `lines` or is
//! rewritten (to `items`, say) is decided by `SubordinateRules`, which the
//! client carries in its configuration.

use std::fmt;

use crate::client::Client;
use crate::error::Error;
use crate::http::Transport;
use crate::response::Response;
use crate::value::Value;

/// A validated, dotted remote method name such as `invoice.lines.add`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MethodName(String);

impl MethodName {
    pub fn from_segments<S: AsRef<str>>(segments: &[S]) -> Result<Self, Error> {
        if segments.is_empty() {
            return Err(Error::InvalidMethod("empty method name".to_string()));
        }
        for segment in segments {
            validate_segment(segment.as_ref())?;
        }
        let joined = segments
            .iter()
            .map(AsRef::as_ref)
            .collect::<Vec<&str>>()
            .join(".");
        Ok(MethodName(joined))
    }

    /// Parse an already dotted name.
    pub fn parse(name: &str) -> Result<Self, Error> {
        let segments: Vec<&str> = name.split('.').collect();
        Self::from_segments(&segments)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.0.split('.')
    }
}

impl fmt::Display for MethodName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

fn validate_segment(segment: &str) -> Result<(), Error> {
    if segment.is_empty() {
        return Err(Error::InvalidMethod("empty segment".to_string()));
    }
    if segment.contains(|c: char| c == '.' || c.is_whitespace() || c == '"' || c == '<' || c == '&')
    {
        return Err(Error::InvalidMethod(format!("bad segment {segment:?}")));
    }
    Ok(())
}

/// One subordinate-resource rewrite.
#[derive(Debug, Clone, PartialEq, Eq)]
struct SubordinateRule {
    parent: String,
    segment: String,
    emitted: String,
}

/// Segment substitutions applied while a chain accumulates.
///
/// A rule `(parent, segment) → emitted` fires when `segment` is accessed on
/// a namespace that is exactly `parent`. The default has no rules, so
/// `invoice.lines.*` and `recurring.lines.*` are sent as written.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubordinateRules {
    rules: Vec<SubordinateRule>,
}

impl SubordinateRules {
    /// No rewriting at all.
    pub fn none() -> Self {
        Self { rules: Vec::new() }
    }

    /// `invoice.lines.*` and `recurring.lines.*` are sent as
    /// `invoice.items.*` and `recurring.items.*`.
    pub fn items_alias() -> Self {
        Self::none()
            .with_rule("invoice", "lines", "items")
            .with_rule("recurring", "lines", "items")
    }

    pub fn with_rule(mut self, parent: &str, segment: &str, emitted: &str) -> Self {
        self.rules.retain(|r| !(r.parent == parent && r.segment == segment));
        self.rules.push(SubordinateRule {
            parent: parent.to_string(),
            segment: segment.to_string(),
            emitted: emitted.to_string(),
        });
        self
    }

    /// The segment to append when `segment` is accessed under `namespace`.
    pub fn resolve<'a>(&'a self, namespace: &str, segment: &'a str) -> &'a str {
        self.rules
            .iter()
            .find(|r| r.parent == namespace && r.segment == segment)
            .map_or(segment, |r| r.emitted.as_str())
    }

    /// Rewrite a complete dotted name as if it had been built one `ns` step
    /// at a time. The last segment is the method itself and is kept.
    pub fn apply(&self, method: &MethodName) -> Result<MethodName, Error> {
        let segments: Vec<&str> = method.segments().collect();
        let Some((last, namespaces)) = segments.split_last() else {
            return Ok(method.clone());
        };

        let mut emitted: Vec<&str> = Vec::with_capacity(segments.len());
        for segment in namespaces {
            let next = if emitted.is_empty() {
                *segment
            } else {
                self.resolve(&emitted.join("."), segment)
            };
            emitted.push(next);
        }
        emitted.push(last);
        MethodName::from_segments(&emitted)
    }
}

/// A call chain in progress: the owning client and the segments so far.
#[derive(Debug)]
pub struct Namespace<'c, T> {
    client: &'c Client<T>,
    segments: Vec<String>,
}

impl<T> Clone for Namespace<'_, T> {
    fn clone(&self) -> Self {
        Self {
            client: self.client,
            segments: self.segments.clone(),
        }
    }
}

impl<'c, T: Transport> Namespace<'c, T> {
    pub(crate) fn new(client: &'c Client<T>, segment: &str) -> Self {
        Self {
            client,
            segments: vec![segment.to_string()],
        }
    }

    /// Extend the chain by one segment. Never performs a request.
    pub fn ns(&self, segment: &str) -> Namespace<'c, T> {
        let emitted = self
            .client
            .config()
            .subordinates
            .resolve(&self.path(), segment);
        let mut segments = self.segments.clone();
        segments.push(emitted.to_string());
        Namespace {
            client: self.client,
            segments,
        }
    }

    /// Dotted namespace accumulated so far, e.g. `invoice.lines`.
    pub fn path(&self) -> String {
        self.segments.join(".")
    }

    /// The method name a call to `segment` on this namespace would use.
    pub fn method(&self, segment: &str) -> Result<MethodName, Error> {
        let mut segments: Vec<&str> = self.segments.iter().map(String::as_str).collect();
        segments.push(segment);
        MethodName::from_segments(&segments)
    }

    /// Terminate the chain: resolve `segment` into a method name and execute
    /// exactly one request with `params`.
    pub fn call(&self, segment: &str, params: impl Into<Value>) -> Result<Response, Error> {
        let method = self.method(segment)?;
        self.client.execute(&method, params)
    }
}
