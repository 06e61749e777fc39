//! XML to JSON conversion for outbound response bodies.
//!
//! The produced shape:
//! - the root element's name is the single top-level key;
//! - attributes become `-name` keys;
//! - an element with only text becomes a string;
//! - text next to attributes or children goes under `#content`;
//! - repeated sibling elements become an array, in document order.
//!
//! All leaf values are strings; no numeric or boolean coercion happens.

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use serde_json::{Map, Value};

pub const ATTRIBUTE_PREFIX: &str = "-";
pub const CONTENT_KEY: &str = "#content";

#[derive(thiserror::Error, Debug)]
pub enum XmlError {
    #[error("malformed xml: {0}")]
    Malformed(#[from] quick_xml::Error),

    #[error("malformed xml attribute: {0}")]
    Attribute(#[from] quick_xml::events::attributes::AttrError),

    #[error("unclosed element <{0}>")]
    Unclosed(String),

    #[error("document has no root element")]
    NoRoot,
}

#[derive(Debug, Default)]
struct Node {
    name: String,
    attributes: Vec<(String, String)>,
    children: Vec<Node>,
    text: String,
}

impl Node {
    fn open(start: &BytesStart<'_>) -> Result<Self, XmlError> {
        let mut attributes = Vec::new();
        for attr in start.attributes() {
            let attr = attr?;
            let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
            let value = attr.unescape_value()?.into_owned();
            attributes.push((key, value));
        }

        Ok(Self {
            name: String::from_utf8_lossy(start.name().as_ref()).into_owned(),
            attributes,
            ..Self::default()
        })
    }

    fn into_value(self) -> Value {
        if self.attributes.is_empty() && self.children.is_empty() {
            return Value::String(self.text);
        }

        let mut map = Map::new();
        for (key, value) in self.attributes {
            map.insert(format!("{}{}", ATTRIBUTE_PREFIX, key), Value::String(value));
        }
        for child in self.children {
            let name = child.name.clone();
            let value = child.into_value();
            match map.get_mut(&name) {
                Some(Value::Array(items)) => items.push(value),
                Some(existing) => {
                    let first = existing.take();
                    *existing = Value::Array(vec![first, value]);
                }
                None => {
                    map.insert(name, value);
                }
            }
        }
        if !self.text.is_empty() {
            map.insert(CONTENT_KEY.to_string(), Value::String(self.text));
        }
        Value::Object(map)
    }
}

/// Convert an XML document into its JSON equivalent.
pub fn xml_to_json(xml: &[u8]) -> Result<Value, XmlError> {
    let mut reader = Reader::from_reader(xml);
    reader.config_mut().trim_text(true);

    let mut stack: Vec<Node> = Vec::new();
    let mut roots: Vec<Node> = Vec::new();

    loop {
        match reader.read_event()? {
            Event::Start(start) => stack.push(Node::open(&start)?),
            Event::Empty(start) => {
                let node = Node::open(&start)?;
                attach(&mut stack, &mut roots, node);
            }
            Event::End(_) => {
                if let Some(node) = stack.pop() {
                    attach(&mut stack, &mut roots, node);
                }
            }
            Event::Text(text) => {
                if let Some(node) = stack.last_mut() {
                    node.text.push_str(&text.unescape()?);
                }
            }
            Event::CData(data) => {
                if let Some(node) = stack.last_mut() {
                    node.text.push_str(&String::from_utf8_lossy(&data.into_inner()));
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if let Some(open) = stack.pop() {
        return Err(XmlError::Unclosed(open.name));
    }
    if roots.is_empty() {
        return Err(XmlError::NoRoot);
    }

    let document = Node { children: roots, ..Node::default() };
    Ok(document.into_value())
}

fn attach(stack: &mut [Node], roots: &mut Vec<Node>, node: Node) {
    match stack.last_mut() {
        Some(parent) => parent.children.push(node),
        None => roots.push(node),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn nested_elements_become_objects_of_strings() {
        let value = xml_to_json(b"<user><name>Ann</name><age>31</age></user>").unwrap();
        assert_eq!(value, json!({ "user": { "name": "Ann", "age": "31" } }));
    }

    #[test]
    fn attributes_and_mixed_text() {
        let value = xml_to_json(br#"<price currency="EUR">12.50</price>"#).unwrap();
        assert_eq!(value, json!({ "price": { "-currency": "EUR", "#content": "12.50" } }));
    }

    #[test]
    fn repeated_siblings_become_arrays() {
        let value = xml_to_json(b"<list><item>a</item><item>b</item><item>c</item></list>").unwrap();
        assert_eq!(value, json!({ "list": { "item": ["a", "b", "c"] } }));
    }

    #[test]
    fn declaration_entities_and_cdata() {
        let xml = br#"<?xml version="1.0"?><note><body>a &amp; b</body><raw><![CDATA[<x>]]></raw><empty/></note>"#;
        let value = xml_to_json(xml).unwrap();
        assert_eq!(value, json!({ "note": { "body": "a & b", "raw": "<x>", "empty": "" } }));
    }

    #[test]
    fn malformed_documents_are_errors() {
        assert!(xml_to_json(b"<a><b></a>").is_err());
        assert!(xml_to_json(b"<a><b>").is_err());
        assert!(matches!(xml_to_json(b"   "), Err(XmlError::NoRoot)));
    }
}
