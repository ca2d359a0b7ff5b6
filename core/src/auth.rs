//! Account credentials and the `Authorization` header they produce.
//!
//! # Design
//! Two schemes exist: an API token sent as HTTP Basic auth (password fixed
//! to `X`), and OAuth 1.0 with the `PLAINTEXT` signature method. The scheme
//! is chosen by which credentials are supplied; `Credentials::from_args`
//! keeps the "two or five arguments" construction surface. OAuth headers
//! carry a fresh timestamp and nonce on every call, nothing is cached.

use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use uuid::Uuid;

use crate::error::Error;

pub const AUTHORIZATION: &str = "Authorization";

/// Characters left untouched by form-style escaping of the signature.
const SIGNATURE_ENCODE_SET: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'*')
    .remove(b'-')
    .remove(b'.')
    .remove(b'_');

/// Which signing scheme a client uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthKind {
    Token,
    OAuth,
}

/// Immutable credentials for one account.
#[derive(Clone, PartialEq, Eq)]
pub enum Credentials {
    Token {
        domain: String,
        token: String,
    },
    OAuth {
        domain: String,
        consumer_key: String,
        consumer_secret: String,
        token: String,
        token_secret: String,
    },
}

impl Credentials {
    pub fn token(domain: &str, token: &str) -> Result<Self, Error> {
        require("domain", domain)?;
        require("api token", token)?;
        Ok(Credentials::Token {
            domain: domain.to_string(),
            token: token.to_string(),
        })
    }

    pub fn oauth(
        domain: &str,
        consumer_key: &str,
        consumer_secret: &str,
        token: &str,
        token_secret: &str,
    ) -> Result<Self, Error> {
        require("domain", domain)?;
        require("consumer key", consumer_key)?;
        require("consumer secret", consumer_secret)?;
        require("token", token)?;
        require("token secret", token_secret)?;
        Ok(Credentials::OAuth {
            domain: domain.to_string(),
            consumer_key: consumer_key.to_string(),
            consumer_secret: consumer_secret.to_string(),
            token: token.to_string(),
            token_secret: token_secret.to_string(),
        })
    }

    /// `(domain, token)` selects token auth, `(domain, consumer_key,
    /// consumer_secret, token, token_secret)` selects OAuth. Any other
    /// number of arguments is a configuration error.
    pub fn from_args(args: &[&str]) -> Result<Self, Error> {
        match *args {
            [domain, token] => Self::token(domain, token),
            [domain, consumer_key, consumer_secret, token, token_secret] => {
                Self::oauth(domain, consumer_key, consumer_secret, token, token_secret)
            }
            _ => Err(Error::Config(format!(
                "expected 2 (token) or 5 (OAuth) credential arguments, got {}",
                args.len()
            ))),
        }
    }

    pub fn domain(&self) -> &str {
        match self {
            Credentials::Token { domain, .. } | Credentials::OAuth { domain, .. } => domain,
        }
    }

    pub fn kind(&self) -> AuthKind {
        match self {
            Credentials::Token { .. } => AuthKind::Token,
            Credentials::OAuth { .. } => AuthKind::OAuth,
        }
    }

    /// Headers authenticating one request. Always exactly one entry.
    pub fn auth_headers(&self) -> Vec<(String, String)> {
        let value = match self {
            Credentials::Token { token, .. } => basic_header(token),
            Credentials::OAuth {
                consumer_key,
                consumer_secret,
                token,
                token_secret,
                ..
            } => oauth_header(
                consumer_key,
                consumer_secret,
                token,
                token_secret,
                unix_timestamp(),
                &nonce(),
            ),
        };
        vec![(AUTHORIZATION.to_string(), value)]
    }

    /// OAuth header for a given timestamp and nonce, or `None` for token
    /// credentials.
    pub fn oauth_header_at(&self, timestamp: u64, nonce: &str) -> Option<String> {
        match self {
            Credentials::Token { .. } => None,
            Credentials::OAuth {
                consumer_key,
                consumer_secret,
                token,
                token_secret,
                ..
            } => Some(oauth_header(
                consumer_key,
                consumer_secret,
                token,
                token_secret,
                timestamp,
                nonce,
            )),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Credentials::Token { domain, .. } => f
                .debug_struct("Token")
                .field("domain", domain)
                .field("token", &"<redacted>")
                .finish(),
            Credentials::OAuth {
                domain, consumer_key, ..
            } => f
                .debug_struct("OAuth")
                .field("domain", domain)
                .field("consumer_key", consumer_key)
                .field("consumer_secret", &"<redacted>")
                .field("token", &"<redacted>")
                .field("token_secret", &"<redacted>")
                .finish(),
        }
    }
}

fn require(field: &str, value: &str) -> Result<(), Error> {
    if value.trim().is_empty() {
        return Err(Error::Config(format!("{field} must not be empty")));
    }
    Ok(())
}

fn basic_header(token: &str) -> String {
    format!("Basic {}", BASE64.encode(format!("{token}:X")))
}

fn oauth_header(
    consumer_key: &str,
    consumer_secret: &str,
    token: &str,
    token_secret: &str,
    timestamp: u64,
    nonce: &str,
) -> String {
    let signature = form_escape(&format!("{consumer_secret}&{token_secret}"));
    let timestamp = timestamp.to_string();
    let params = [
        ("realm", ""),
        ("oauth_version", "1.0"),
        ("oauth_consumer_key", consumer_key),
        ("oauth_token", token),
        ("oauth_timestamp", timestamp.as_str()),
        ("oauth_nonce", nonce),
        ("oauth_signature_method", "PLAINTEXT"),
        ("oauth_signature", signature.as_str()),
    ]
    .iter()
    .map(|(k, v)| format!("{k}=\"{v}\""))
    .collect::<Vec<_>>()
    .join(",");
    format!("OAuth {params}")
}

/// Percent-encode like an HTML form: spaces become `+`.
fn form_escape(s: &str) -> String {
    s.split(' ')
        .map(|part| utf8_percent_encode(part, SIGNATURE_ENCODE_SET).to_string())
        .collect::<Vec<_>>()
        .join("+")
}

fn unix_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
}

/// Base64 of 16 random bytes with non-word characters removed.
fn nonce() -> String {
    BASE64
        .encode(Uuid::new_v4().as_bytes())
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '_')
        .collect()
}
