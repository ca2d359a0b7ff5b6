use std::collections::HashMap;
use std::sync::Arc;

use axum::{
    extract::State,
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use quick_xml::{escape::escape, events::Event, Reader};
use tokio::{net::TcpListener, sync::RwLock};
use tracing::debug;

pub const API_PATH: &str = "/api/2.1/xml-in";
pub const LOGIN_SEARCH_PATH: &str = "/loginSearch";
pub const NAMESPACE: &str = "http://www.freshbooks.com/api/";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClientRecord {
    pub client_id: u64,
    pub organization: String,
    pub email: String,
}

#[derive(Default)]
struct Store {
    clients: Vec<ClientRecord>,
    next_client_id: u64,
    next_line_id: u64,
}

pub struct Account {
    token: String,
    store: RwLock<Store>,
}

pub type Db = Arc<Account>;

pub fn app(token: &str) -> Router {
    let db: Db = Arc::new(Account {
        token: token.to_string(),
        store: RwLock::new(Store::default()),
    });
    Router::new()
        .route(API_PATH, post(xml_in))
        .route(LOGIN_SEARCH_PATH, get(login_search))
        .fallback(unknown_account)
        .with_state(db)
}

pub async fn run(listener: TcpListener, token: &str) -> Result<(), std::io::Error> {
    axum::serve(listener, app(token)).await
}

async fn login_search() -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/html")],
        "<html><body>Find your account</body></html>",
    )
}

/// Any path other than the API endpoint behaves like a mistyped account.
async fn unknown_account() -> impl IntoResponse {
    (StatusCode::FOUND, [(header::LOCATION, LOGIN_SEARCH_PATH)])
}

async fn xml_in(State(db): State<Db>, headers: HeaderMap, body: String) -> Response {
    let authorization = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    if !is_authorized(authorization, &db.token) {
        return xml_response(StatusCode::UNAUTHORIZED, &fail("Authentication failed."));
    }

    let Some((method, params)) = parse_request(&body) else {
        return xml_response(StatusCode::OK, &fail("The request was not valid XML."));
    };
    debug!(%method, "xml-in");

    let payload = match method.as_str() {
        "client.create" => create_client(&db, &params).await,
        "client.get" => get_client(&db, &params).await,
        "client.list" => list_clients(&db).await,
        "client.delete" => delete_client(&db, &params).await,
        "invoice.lines.add" => add_invoice_line(&db, &params).await,
        _ => fail("Method not found"),
    };
    xml_response(StatusCode::OK, &payload)
}

/// Basic `token:X`, or OAuth PLAINTEXT whose `oauth_token` is the token.
pub fn is_authorized(authorization: &str, token: &str) -> bool {
    if let Some(encoded) = authorization.strip_prefix("Basic ") {
        return BASE64
            .decode(encoded)
            .ok()
            .and_then(|raw| String::from_utf8(raw).ok())
            .is_some_and(|creds| creds == format!("{token}:X"));
    }
    if let Some(params) = authorization.strip_prefix("OAuth ") {
        let has = |k: &str, v: &str| params.split(',').any(|p| p == format!("{k}=\"{v}\""));
        return has("oauth_token", token) && has("oauth_signature_method", "PLAINTEXT");
    }
    false
}

/// Extract the method name and every leaf element's text.
pub fn parse_request(body: &str) -> Option<(String, HashMap<String, String>)> {
    let mut reader = Reader::from_str(body);
    reader.config_mut().trim_text(true);

    let mut method = None;
    let mut params = HashMap::new();
    let mut current: Option<String> = None;

    loop {
        match reader.read_event().ok()? {
            Event::Start(e) => {
                let name = String::from_utf8(e.name().as_ref().to_vec()).ok()?;
                if name == "request" {
                    for attr in e.attributes().flatten() {
                        if attr.key.as_ref() == b"method" {
                            method = Some(attr.unescape_value().ok()?.into_owned());
                        }
                    }
                }
                current = Some(name);
            }
            Event::Text(e) => {
                if let Some(name) = &current {
                    params.insert(name.clone(), e.unescape().ok()?.into_owned());
                }
            }
            Event::End(_) => current = None,
            Event::Eof => break,
            _ => {}
        }
    }
    method.map(|m| (m, params))
}

async fn create_client(db: &Db, params: &HashMap<String, String>) -> String {
    let Some(organization) = params.get("organization") else {
        return fail("Field organization is required.");
    };
    let mut store = db.store.write().await;
    store.next_client_id += 1;
    let record = ClientRecord {
        client_id: store.next_client_id,
        organization: organization.clone(),
        email: params.get("email").cloned().unwrap_or_default(),
    };
    let id = record.client_id;
    store.clients.push(record);
    ok(&format!("<client_id>{id}</client_id>"))
}

async fn get_client(db: &Db, params: &HashMap<String, String>) -> String {
    let store = db.store.read().await;
    match find_client(&store, params) {
        Some(record) => ok(&client_xml(record)),
        None => fail("Client not found."),
    }
}

async fn list_clients(db: &Db) -> String {
    let store = db.store.read().await;
    let clients: String = store.clients.iter().map(client_xml).collect();
    ok(&format!(
        r#"<clients page="1" per_page="25" pages="1" total="{}">{clients}</clients>"#,
        store.clients.len()
    ))
}

async fn delete_client(db: &Db, params: &HashMap<String, String>) -> String {
    let mut store = db.store.write().await;
    let Some(id) = find_client(&store, params).map(|c| c.client_id) else {
        return fail("Client not found.");
    };
    store.clients.retain(|c| c.client_id != id);
    ok("")
}

async fn add_invoice_line(db: &Db, params: &HashMap<String, String>) -> String {
    if !params.contains_key("invoice_id") {
        return fail("Field invoice_id is required.");
    }
    let mut store = db.store.write().await;
    store.next_line_id += 1;
    ok(&format!("<lines><line_id>{}</line_id></lines>", store.next_line_id))
}

fn find_client<'a>(store: &'a Store, params: &HashMap<String, String>) -> Option<&'a ClientRecord> {
    let id: u64 = params.get("client_id")?.parse().ok()?;
    store.clients.iter().find(|c| c.client_id == id)
}

fn client_xml(record: &ClientRecord) -> String {
    format!(
        "<client><client_id>{}</client_id><organization>{}</organization><email>{}</email></client>",
        record.client_id,
        escape(record.organization.as_str()),
        escape(record.email.as_str())
    )
}

fn ok(inner: &str) -> String {
    envelope("ok", inner)
}

fn fail(message: &str) -> String {
    envelope("fail", &format!("<error>{}</error>", escape(message)))
}

fn envelope(status: &str, inner: &str) -> String {
    format!(
        "<?xml version=\"1.0\" encoding=\"utf-8\"?>\n<response xmlns=\"{NAMESPACE}\" status=\"{status}\">{inner}</response>"
    )
}

fn xml_response(status: StatusCode, body: &str) -> Response {
    (
        status,
        [(header::CONTENT_TYPE, "application/xml")],
        body.to_string(),
    )
        .into_response()
}
