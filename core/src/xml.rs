//! Conversion between structured values and the API's XML wire format.
//!
//! # Encoding
//! - A map emits one element per entry, named by the key, in insertion order.
//! - A list emits its elements back to back with no wrapper element, so each
//!   element is expected to be a single-key map that names itself.
//! - Scalars become escaped text content (`&`, `<`, `>`).
//!
//! Compact mode emits no whitespace. Indented mode puts every element on its
//! own line, indented two spaces per depth, with a newline after each closing
//! tag. Both modes carry identical content.
//!
//! # Decoding
//! The root must be `<response>`. Namespace declarations are dropped and the
//! `status` attribute is lifted into the envelope. An element whose child tag
//! names are all distinct becomes a map; if any tag repeats, the children
//! become a list of single-key maps in document order; an element without
//! children becomes its text.
//!
//! Attributes below the root are kept. An element that carries attributes
//! always decodes to a map: the attributes come first, then its children
//! keyed by tag, where a tag that repeats holds the list of its values. So
//! `<clients page="1"><client>..</client><client>..</client></clients>`
//! decodes to `{page: "1", client: [.., ..]}`. Text next to attributes is
//! kept under `content`. Text placed directly in `<response>` is kept under
//! `response`, as are repeated top-level elements.
//!
//! Under these rules `deserialize(serialize(v))` reproduces `v` for string
//! scalars, non-empty maps, and lists of single-key maps that repeat a key.

use std::io;

use quick_xml::escape::partial_escape;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};

use crate::response::{Response, Status};
use crate::value::{Map, Value};

/// Errors produced while encoding or decoding XML.
#[derive(Debug, thiserror::Error)]
pub enum XmlError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("XML processing error: {0}")]
    QuickXml(#[from] quick_xml::Error),

    #[error("XML attribute error: {0}")]
    Attribute(#[from] quick_xml::events::attributes::AttrError),

    /// A map key cannot be used as an element name.
    #[error("invalid element name: {0:?}")]
    InvalidName(String),

    #[error("missing required XML element: {0}")]
    MissingElement(String),

    #[error("unexpected XML element: {0}")]
    UnexpectedElement(String),

    #[error("response has no status attribute")]
    MissingStatus,

    #[error("unknown response status: {0:?}")]
    InvalidStatus(String),

    #[error("failed to parse value: {0}")]
    ParseError(String),
}

/// Serialization layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct XmlOptions {
    /// Pretty-print with two-space indentation.
    pub indent: bool,
    /// Emit `<?xml version="1.0" encoding="utf-8"?>` before the request root.
    pub declaration: bool,
}

impl XmlOptions {
    pub fn compact() -> Self {
        Self::default()
    }

    pub fn indented() -> Self {
        Self {
            indent: true,
            declaration: false,
        }
    }

    pub fn with_declaration(mut self, declaration: bool) -> Self {
        self.declaration = declaration;
        self
    }
}

// ---------------------------------------------------------------------------
// Serialization
// ---------------------------------------------------------------------------

/// Serialize `value` as an XML fragment (no declaration, no root element).
pub fn serialize(value: &Value, options: &XmlOptions) -> Result<String, XmlError> {
    let mut writer = Writer::new(Vec::with_capacity(256));
    write_value(&mut writer, value, 0, options.indent)?;
    into_string(writer)
}

/// Build a complete request document: `<request method="NAME">…</request>`.
pub fn request_body(method: &str, params: &Value, options: &XmlOptions) -> Result<String, XmlError> {
    let mut writer = Writer::new(Vec::with_capacity(512));

    if options.declaration {
        writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("utf-8"), None)))?;
        if options.indent {
            write_raw(&mut writer, "\n")?;
        }
    }

    writer.write_event(Event::Start(
        BytesStart::new("request").with_attributes([("method", method)]),
    ))?;
    if options.indent {
        write_raw(&mut writer, "\n")?;
    }
    write_value(&mut writer, params, 1, options.indent)?;
    writer.write_event(Event::End(BytesEnd::new("request")))?;
    if options.indent {
        write_raw(&mut writer, "\n")?;
    }

    into_string(writer)
}

fn write_value(
    writer: &mut Writer<Vec<u8>>,
    value: &Value,
    depth: usize,
    indent: bool,
) -> Result<(), XmlError> {
    match value {
        Value::Map(map) => {
            for (key, child) in map.iter() {
                write_element(writer, key, child, depth, indent)?;
            }
        }
        Value::List(items) => {
            for item in items {
                write_value(writer, item, depth, indent)?;
            }
        }
        scalar => write_text(writer, scalar)?,
    }
    Ok(())
}

fn write_element(
    writer: &mut Writer<Vec<u8>>,
    name: &str,
    value: &Value,
    depth: usize,
    indent: bool,
) -> Result<(), XmlError> {
    validate_name(name)?;

    if indent {
        write_raw(writer, &"  ".repeat(depth))?;
    }
    writer.write_event(Event::Start(BytesStart::new(name)))?;

    if value.is_scalar() {
        write_text(writer, value)?;
    } else {
        if indent {
            write_raw(writer, "\n")?;
        }
        write_value(writer, value, depth + 1, indent)?;
        if indent {
            write_raw(writer, &"  ".repeat(depth))?;
        }
    }

    writer.write_event(Event::End(BytesEnd::new(name)))?;
    if indent {
        write_raw(writer, "\n")?;
    }
    Ok(())
}

fn write_text(writer: &mut Writer<Vec<u8>>, value: &Value) -> Result<(), XmlError> {
    if let Some(text) = value.to_text() {
        if !text.is_empty() {
            writer.write_event(Event::Text(BytesText::from_escaped(partial_escape(&*text))))?;
        }
    }
    Ok(())
}

/// Whitespace that is not part of any value.
fn write_raw(writer: &mut Writer<Vec<u8>>, whitespace: &str) -> Result<(), XmlError> {
    if whitespace.is_empty() {
        return Ok(());
    }
    writer.write_event(Event::Text(BytesText::from_escaped(whitespace)))?;
    Ok(())
}

fn validate_name(name: &str) -> Result<(), XmlError> {
    let bad_char = |c: char| c.is_whitespace() || matches!(c, '<' | '>' | '&' | '"' | '\'' | '/' | '=');
    if name.is_empty() || name.contains(bad_char) {
        return Err(XmlError::InvalidName(name.to_string()));
    }
    Ok(())
}

fn into_string(writer: Writer<Vec<u8>>) -> Result<String, XmlError> {
    String::from_utf8(writer.into_inner()).map_err(|e| XmlError::ParseError(e.to_string()))
}

// ---------------------------------------------------------------------------
// Deserialization
// ---------------------------------------------------------------------------

/// An element still waiting for its end tag.
struct Frame {
    name: String,
    attrs: Vec<(String, Value)>,
    children: Vec<(String, Value)>,
    text: String,
}

impl Frame {
    fn new(name: String, attrs: Vec<(String, Value)>) -> Self {
        Self {
            name,
            attrs,
            children: Vec::new(),
            text: String::new(),
        }
    }

    fn into_value(self) -> Value {
        let text = self.text.trim();
        if self.attrs.is_empty() {
            if self.children.is_empty() {
                return Value::String(text.to_string());
            }
            return group_children(self.children);
        }

        let mut map: Map = self.attrs.into_iter().collect();
        if self.children.is_empty() {
            if !text.is_empty() {
                map.insert("content", text);
            }
            return Value::Map(map);
        }
        for (name, mut values) in group_by_tag(self.children) {
            let value = if values.len() == 1 {
                values.swap_remove(0)
            } else {
                Value::List(values)
            };
            map.insert(name, value);
        }
        Value::Map(map)
    }
}

/// Collect child values per tag, keeping the order in which tags first
/// appear.
fn group_by_tag(children: Vec<(String, Value)>) -> Vec<(String, Vec<Value>)> {
    let mut groups: Vec<(String, Vec<Value>)> = Vec::new();
    for (name, value) in children {
        match groups.iter_mut().find(|(tag, _)| *tag == name) {
            Some((_, values)) => values.push(value),
            None => groups.push((name, vec![value])),
        }
    }
    groups
}

/// Children with distinct names form a map; any repeat turns them into a
/// list of single-key maps.
fn group_children(children: Vec<(String, Value)>) -> Value {
    let repeats = children
        .iter()
        .enumerate()
        .any(|(i, (name, _))| children[..i].iter().any(|(prev, _)| prev == name));
    if repeats {
        Value::List(
            children
                .into_iter()
                .map(|(name, value)| Value::Map(Map::new().with(name, value)))
                .collect(),
        )
    } else {
        Value::Map(children.into_iter().collect())
    }
}

/// Parse a `<response>` document into a `Response` envelope.
pub fn deserialize(xml: &str) -> Result<Response, XmlError> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut status: Option<Status> = None;
    let mut root_attrs: Vec<(String, Value)> = Vec::new();
    let mut stack: Vec<Frame> = Vec::new();
    let mut body: Option<Value> = None;

    loop {
        match reader.read_event()? {
            Event::Start(e) => {
                let name = element_name(&e)?;
                if stack.is_empty() {
                    if body.is_some() {
                        return Err(XmlError::UnexpectedElement(name));
                    }
                    status = Some(read_root(&e, &name, &mut root_attrs)?);
                    stack.push(Frame::new(name, Vec::new()));
                } else {
                    stack.push(Frame::new(name, read_attributes(&e)?));
                }
            }
            Event::Empty(e) => {
                let name = element_name(&e)?;
                match stack.last_mut() {
                    Some(parent) => {
                        let value = Frame::new(name.clone(), read_attributes(&e)?).into_value();
                        parent.children.push((name, value));
                    }
                    None => {
                        if body.is_some() {
                            return Err(XmlError::UnexpectedElement(name));
                        }
                        status = Some(read_root(&e, &name, &mut root_attrs)?);
                        body = Some(Value::String(String::new()));
                    }
                }
            }
            Event::Text(e) => {
                if let Some(frame) = stack.last_mut() {
                    frame.text.push_str(&e.unescape()?);
                }
            }
            Event::CData(e) => {
                if let Some(frame) = stack.last_mut() {
                    let raw = String::from_utf8(e.into_inner().into_owned())
                        .map_err(|err| XmlError::ParseError(err.to_string()))?;
                    frame.text.push_str(&raw);
                }
            }
            Event::End(_) => {
                let frame = stack
                    .pop()
                    .ok_or_else(|| XmlError::UnexpectedElement("unmatched end tag".to_string()))?;
                let name = frame.name.clone();
                let value = frame.into_value();
                match stack.last_mut() {
                    Some(parent) => parent.children.push((name, value)),
                    None => body = Some(value),
                }
            }
            Event::Eof => break,
            // Declaration, comments, processing instructions, doctype.
            _ => {}
        }
    }

    if !stack.is_empty() {
        return Err(XmlError::UnexpectedElement(
            "unexpected EOF inside response".to_string(),
        ));
    }
    let body = body.ok_or_else(|| XmlError::MissingElement("response".to_string()))?;
    let status = status.ok_or(XmlError::MissingStatus)?;

    let mut envelope = Map::new();
    for (k, v) in root_attrs {
        envelope.insert(k, v);
    }
    match body {
        Value::Map(map) => {
            for (k, v) in map {
                envelope.insert(k, v);
            }
        }
        // Repeated top-level elements cannot share one body map; keep them
        // under the root's name.
        Value::List(items) => {
            envelope.insert("response", Value::List(items));
        }
        Value::String(text) if !text.is_empty() => {
            envelope.insert("response", text);
        }
        _ => {}
    }

    Ok(Response::new(status, envelope))
}

fn element_name(e: &BytesStart<'_>) -> Result<String, XmlError> {
    std::str::from_utf8(e.name().as_ref())
        .map(str::to_string)
        .map_err(|err| XmlError::ParseError(err.to_string()))
}

/// Read an element's attributes, skipping namespace declarations.
fn read_attributes(e: &BytesStart<'_>) -> Result<Vec<(String, Value)>, XmlError> {
    let mut attrs = Vec::new();
    for attr in e.attributes() {
        let attr = attr?;
        let key = std::str::from_utf8(attr.key.as_ref())
            .map_err(|err| XmlError::ParseError(err.to_string()))?
            .to_string();
        if key == "xmlns" || key.starts_with("xmlns:") {
            continue;
        }
        let value = attr.unescape_value()?.into_owned();
        attrs.push((key, Value::String(value)));
    }
    Ok(attrs)
}

/// Validate the root element and split its attributes into the status and
/// the attributes that belong to the body.
fn read_root(
    e: &BytesStart<'_>,
    name: &str,
    attrs: &mut Vec<(String, Value)>,
) -> Result<Status, XmlError> {
    if name != "response" {
        return Err(XmlError::UnexpectedElement(name.to_string()));
    }

    let mut status = None;
    for (key, value) in read_attributes(e)? {
        if let ("status", Value::String(raw)) = (key.as_str(), &value) {
            status = Some(raw.parse::<Status>()?);
        } else {
            attrs.push((key, value));
        }
    }
    status.ok_or(XmlError::MissingStatus)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn map(entries: &[(&str, Value)]) -> Value {
        Value::Map(entries.iter().cloned().collect())
    }

    fn compact(value: &Value) -> String {
        serialize(value, &XmlOptions::compact()).unwrap()
    }

    fn indented(value: &Value) -> String {
        serialize(value, &XmlOptions::indented()).unwrap()
    }

    fn strip_between_tags(xml: &str) -> String {
        let mut out = String::new();
        for piece in xml.split('>') {
            let piece = piece.trim_start();
            if piece.is_empty() {
                continue;
            }
            out.push_str(piece);
            out.push('>');
        }
        out
    }

    fn bar_baz_list() -> Value {
        Value::List(vec![map(&[("bar", "baz".into())]), map(&[("bar", "baz".into())])])
    }

    #[test]
    fn simple_map() {
        let v = map(&[("foo", "bar".into())]);
        assert_eq!(compact(&v), "<foo>bar</foo>");
        assert_eq!(indented(&v), "<foo>bar</foo>\n");
    }

    #[test]
    fn integer_is_coerced_to_decimal_text() {
        assert_eq!(compact(&map(&[("foo", 1.into())])), "<foo>1</foo>");
    }

    #[test]
    fn text_is_escaped() {
        assert_eq!(compact(&map(&[("foo", "b&r".into())])), "<foo>b&amp;r</foo>");
        assert_eq!(compact(&map(&[("foo", "<x>".into())])), "<foo>&lt;x&gt;</foo>");
    }

    #[test]
    fn nested_map() {
        let v = map(&[("foo", map(&[("bar", "baz".into())]))]);
        assert_eq!(compact(&v), "<foo><bar>baz</bar></foo>");
        assert_eq!(indented(&v), "<foo>\n  <bar>baz</bar>\n</foo>\n");
    }

    #[test]
    fn deeply_nested_map() {
        let v = map(&[("foo", map(&[("bar", map(&[("baz", "bat".into())]))]))]);
        assert_eq!(compact(&v), "<foo><bar><baz>bat</baz></bar></foo>");
        assert_eq!(
            indented(&v),
            "<foo>\n  <bar>\n    <baz>bat</baz>\n  </bar>\n</foo>\n"
        );
    }

    #[test]
    fn list_has_no_wrapper() {
        assert_eq!(compact(&bar_baz_list()), "<bar>baz</bar><bar>baz</bar>");
        assert_eq!(indented(&bar_baz_list()), "<bar>baz</bar>\n<bar>baz</bar>\n");
    }

    #[test]
    fn map_with_list() {
        let v = map(&[("foo", bar_baz_list())]);
        assert_eq!(compact(&v), "<foo><bar>baz</bar><bar>baz</bar></foo>");
    }

    #[test]
    fn compact_and_indented_carry_the_same_content() {
        let v = map(&[
            ("client", map(&[("name", "Acme & Co".into()), ("id", 7.into())])),
            ("lines", bar_baz_list()),
        ]);
        assert_eq!(strip_between_tags(&indented(&v)), compact(&v));
    }

    #[test]
    fn invalid_key_is_rejected() {
        let err = serialize(&map(&[("bad key", "x".into())]), &XmlOptions::compact()).unwrap_err();
        assert!(matches!(err, XmlError::InvalidName(_)));
    }

    #[test]
    fn request_body_compact() {
        let body = request_body("client.get", &map(&[("client_id", 2.into())]), &XmlOptions::compact())
            .unwrap();
        assert_eq!(body, r#"<request method="client.get"><client_id>2</client_id></request>"#);
    }

    #[test]
    fn request_body_indented_with_declaration() {
        let options = XmlOptions::indented().with_declaration(true);
        let body = request_body("client.get", &map(&[("client_id", 2.into())]), &options).unwrap();
        assert_eq!(
            body,
            "<?xml version=\"1.0\" encoding=\"utf-8\"?>\n<request method=\"client.get\">\n  <client_id>2</client_id>\n</request>\n"
        );
    }

    #[test]
    fn request_body_without_params() {
        let body = request_body("client.list", &Value::default(), &XmlOptions::compact()).unwrap();
        assert_eq!(body, r#"<request method="client.list"></request>"#);
    }

    #[test]
    fn decode_drops_namespace_and_lifts_status() {
        let xml = r#"<?xml version="1.0" encoding="utf-8"?>
<response xmlns="http://www.freshbooks.com/api/" status="ok">
  <client>
    <client_id>2</client_id>
    <username>foolhardy</username>
  </client>
</response>"#;
        let resp = deserialize(xml).unwrap();
        assert!(resp.is_success());
        assert!(resp.get("xmlns").is_none());
        assert!(resp.get("status").is_none());
        let client = resp.get("client").unwrap();
        assert_eq!(client.get("client_id").and_then(Value::as_str), Some("2"));
        assert_eq!(client.get("username").and_then(Value::as_str), Some("foolhardy"));
    }

    #[test]
    fn decode_repeated_siblings_as_list() {
        let xml = r#"<response status="ok"><clients><client><id>1</id></client><client><id>2</id></client></clients></response>"#;
        let resp = deserialize(xml).unwrap();
        let clients = resp.get("clients").unwrap().as_list().unwrap();
        assert_eq!(clients.len(), 2);
        assert_eq!(
            clients[1].get("client").and_then(|c| c.get("id")).and_then(Value::as_str),
            Some("2")
        );
    }

    #[test]
    fn decode_keeps_pagination_attributes() {
        let xml = r#"<response status="ok"><clients page="1" pages="3" total="60"><client><id>1</id></client><client><id>2</id></client></clients></response>"#;
        let resp = deserialize(xml).unwrap();
        let clients = resp.get("clients").unwrap();
        assert_eq!(clients.get("page").and_then(Value::as_str), Some("1"));
        assert_eq!(clients.get("pages").and_then(Value::as_str), Some("3"));
        assert_eq!(clients.get("total").and_then(Value::as_str), Some("60"));

        let listed = clients.get("client").and_then(Value::as_list).unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[1].get("id").and_then(Value::as_str), Some("2"));
    }

    #[test]
    fn decode_attributes_with_single_child_or_text() {
        let xml = r#"<response status="ok"><clients page="1" total="1"><client><id>9</id></client></clients><amount unit="USD">12.50</amount><empty a="b"/></response>"#;
        let resp = deserialize(xml).unwrap();

        let clients = resp.get("clients").unwrap();
        assert_eq!(clients.get("total").and_then(Value::as_str), Some("1"));
        assert_eq!(
            clients.get("client").and_then(|c| c.get("id")).and_then(Value::as_str),
            Some("9")
        );

        let amount = resp.get("amount").unwrap();
        assert_eq!(amount.get("unit").and_then(Value::as_str), Some("USD"));
        assert_eq!(amount.get("content").and_then(Value::as_str), Some("12.50"));

        assert_eq!(
            resp.get("empty").and_then(|e| e.get("a")).and_then(Value::as_str),
            Some("b")
        );
    }

    #[test]
    fn decode_keeps_text_directly_under_response() {
        let resp = deserialize(r#"<response status="fail">Account suspended</response>"#).unwrap();
        assert_eq!(resp.get("response").and_then(Value::as_str), Some("Account suspended"));
    }

    #[test]
    fn decode_failure_is_not_an_error() {
        let xml = r#"<response xmlns="http://www.freshbooks.com/api/" status="fail"><error>Client not found.</error><code>50010</code></response>"#;
        let resp = deserialize(xml).unwrap();
        assert!(!resp.is_success());
        assert_eq!(resp.error(), Some("Client not found."));
    }

    #[test]
    fn decode_unescapes_text() {
        let resp = deserialize(r#"<response status="ok"><name>b&amp;r</name></response>"#).unwrap();
        assert_eq!(resp.get("name").and_then(Value::as_str), Some("b&r"));
    }

    #[test]
    fn decode_missing_status() {
        let err = deserialize("<response><a>1</a></response>").unwrap_err();
        assert!(matches!(err, XmlError::MissingStatus));
    }

    #[test]
    fn decode_unknown_status() {
        let err = deserialize(r#"<response status="maybe"/>"#).unwrap_err();
        assert!(matches!(err, XmlError::InvalidStatus(_)));
    }

    #[test]
    fn decode_wrong_root() {
        let err = deserialize(r#"<html status="ok"><body/></html>"#).unwrap_err();
        assert!(matches!(err, XmlError::UnexpectedElement(_)));
    }

    #[test]
    fn decode_malformed() {
        assert!(deserialize(r#"<response status="ok"><a>1</b></response>"#).is_err());
        assert!(deserialize(r#"<response status="ok"><a>1</a>"#).is_err());
        assert!(deserialize("not xml at all").is_err());
    }

    #[test]
    fn decode_empty_response() {
        let resp = deserialize(r#"<response status="ok"/>"#).unwrap();
        assert!(resp.is_success());
        assert!(resp.body().is_empty());
    }

    #[test]
    fn round_trip_in_both_modes() {
        let v = map(&[
            ("client", map(&[("name", "Acme & Co".into()), ("email", "a@b.c".into())])),
            ("lines", Value::List(vec![
                map(&[("line", map(&[("amount", "1".into())]))]),
                map(&[("line", map(&[("amount", "2".into())]))]),
            ])),
        ]);
        for options in [XmlOptions::compact(), XmlOptions::indented()] {
            let fragment = serialize(&v, &options).unwrap();
            let doc = format!(r#"<response status="ok">{fragment}</response>"#);
            let resp = deserialize(&doc).unwrap();
            assert_eq!(Value::Map(resp.into_body()), v, "{options:?}");
        }
    }
}
