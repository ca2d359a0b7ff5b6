//! End-to-end calls against the live mock server.
//!
//! # Design
//! Starts the mock server on a random port, then drives `Client` with the
//! real `ureq` transport over plain HTTP. Validates request building, auth
//! headers, response decoding, and the login-redirect handling against an
//! independent implementation of the wire protocol.

use std::net::SocketAddr;

use freshbooks_core::{
    Client, ClientConfig, Credentials, Error, LoggingTransport, Map, SubordinateRules,
    UreqTransport, Value,
};

const TOKEN: &str = "integration-token";

fn start_server() -> SocketAddr {
    let std_listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = std_listener.local_addr().unwrap();
    std_listener.set_nonblocking(true).unwrap();

    std::thread::spawn(move || {
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        rt.block_on(async {
            let listener = tokio::net::TcpListener::from_std(std_listener).unwrap();
            mock_server::run(listener, TOKEN).await
        })
        .unwrap();
    });

    addr
}

fn http_config() -> ClientConfig {
    ClientConfig {
        scheme: "http".to_string(),
        ..ClientConfig::default()
    }
}

fn token_client(domain: &str, token: &str) -> Client {
    Client::with_config(Credentials::token(domain, token).unwrap(), http_config())
}

#[test]
fn client_lifecycle() {
    let addr = start_server();
    let client = token_client(&addr.to_string(), TOKEN);
    let clients = client.ns("client");

    // Step 1: list is empty.
    let resp = clients.call("list", Value::default()).unwrap();
    assert!(resp.is_success());
    let listed = resp.get("clients").unwrap();
    assert_eq!(listed.get("total").and_then(Value::as_str), Some("0"));
    assert!(listed.get("client").is_none());

    // Step 2: create a client.
    let params = Map::new().with(
        "client",
        Map::new()
            .with("organization", "Acme & Co")
            .with("email", "billing@acme.test"),
    );
    let resp = clients.call("create", params).unwrap();
    assert!(resp.is_success());
    let id = resp
        .get("client_id")
        .and_then(Value::as_str)
        .unwrap()
        .to_string();

    // Step 3: get it back.
    let resp = clients
        .call("get", Map::new().with("client_id", id.as_str()))
        .unwrap();
    let record = resp.get("client").unwrap();
    assert_eq!(record.get("organization").and_then(Value::as_str), Some("Acme & Co"));
    assert_eq!(record.get("email").and_then(Value::as_str), Some("billing@acme.test"));

    // Step 4: create a second one, list shows both as a sequence.
    let params = Map::new().with("client", Map::new().with("organization", "Globex"));
    clients.call("create", params).unwrap();
    let resp = client.call("client.list", Value::default()).unwrap();
    let page = resp.get("clients").unwrap();
    assert_eq!(page.get("page").and_then(Value::as_str), Some("1"));
    assert_eq!(page.get("total").and_then(Value::as_str), Some("2"));
    let listed = page.get("client").and_then(Value::as_list).unwrap();
    assert_eq!(listed.len(), 2);
    assert_eq!(listed[1].get("organization").and_then(Value::as_str), Some("Globex"));

    // Step 5: delete.
    let resp = clients
        .call("delete", Map::new().with("client_id", id.as_str()))
        .unwrap();
    assert!(resp.is_success());

    // Step 6: get after delete is an API failure, not an error.
    let resp = clients
        .call("get", Map::new().with("client_id", id.as_str()))
        .unwrap();
    assert!(!resp.is_success());
    assert_eq!(resp.error(), Some("Client not found."));
}

#[test]
fn oauth_client_is_accepted() {
    let addr = start_server();
    let domain = addr.to_string();
    let creds = Credentials::from_args(&[domain.as_str(), "ck", "cs", TOKEN, "ts"]).unwrap();
    let client = Client::with_config(creds, http_config());

    let resp = client.ns("client").call("list", Value::default()).unwrap();
    assert!(resp.is_success());
}

#[test]
fn wrong_token_fails_in_band() {
    let addr = start_server();
    let client = token_client(&addr.to_string(), "not-the-token");

    let resp = client.call("client.list", Value::default()).unwrap();
    assert!(!resp.is_success());
    assert_eq!(resp.error(), Some("Authentication failed."));
}

#[test]
fn unknown_method_fails_in_band() {
    let addr = start_server();
    let client = token_client(&addr.to_string(), TOKEN);

    let resp = client.ns("widget").call("frobnicate", Value::default()).unwrap();
    assert!(!resp.is_success());
    assert_eq!(resp.error(), Some("Method not found"));
}

#[test]
fn invoice_lines_chain_reaches_three_segment_method() {
    let addr = start_server();
    let client = token_client(&addr.to_string(), TOKEN);

    let params = Map::new().with("invoice_id", 7).with(
        "lines",
        Map::new().with("line", Map::new().with("name", "Hours").with("quantity", 2)),
    );
    let resp = client.ns("invoice").ns("lines").call("add", params.clone()).unwrap();
    assert!(resp.is_success());
    assert_eq!(
        resp.get("lines").and_then(|l| l.get("line_id")).and_then(Value::as_str),
        Some("1")
    );

    // With the items alias the server sees `invoice.items.add`, which it
    // does not implement.
    let config = ClientConfig {
        subordinates: SubordinateRules::items_alias(),
        ..http_config()
    };
    let aliased = Client::with_config(
        Credentials::token(&addr.to_string(), TOKEN).unwrap(),
        config,
    );
    let resp = aliased.ns("invoice").ns("lines").call("add", params).unwrap();
    assert_eq!(resp.error(), Some("Method not found"));
}

#[test]
fn unknown_account_redirect_becomes_not_found() {
    let addr = start_server();
    let client = token_client(&format!("{addr}/nosuchaccount"), TOKEN);

    let resp = client.call("client.list", Value::default()).unwrap();
    assert!(!resp.is_success());
    assert_eq!(resp.error(), Some("Not Found"));
    assert_eq!(resp.code(), Some("404"));
}

#[test]
fn connection_refused_is_transport_error() {
    let addr = {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap()
    };
    let client = token_client(&addr.to_string(), TOKEN);

    let err = client.call("client.list", Value::default()).unwrap_err();
    assert!(matches!(err, Error::Transport(_)));
}

#[test]
fn logging_transport_round_trip() {
    let addr = start_server();
    let creds = Credentials::token(&addr.to_string(), TOKEN).unwrap();
    let transport = LoggingTransport::new(UreqTransport::default());
    let client = Client::with_transport(creds, http_config(), transport);

    let resp = client.ns("client").call("list", Value::default()).unwrap();
    assert!(resp.is_success());
}
