//! Embedded markup normalizer
//!
//! Non-text payloads arrive as XML documents embedded in the JSON envelope.
//! This module folds such a document into a `serde_json::Value` tree:
//! attributes become fields, repeated sibling tags become lists, and an
//! element holding only text folds to a plain string. Elements that carry
//! both text and other content keep the text under `_text`.

use serde_json::{Map, Value};

use crate::{Error, Result};

/// Key under which element text is kept when it cannot fold to a string
const TEXT_KEY: &str = "_text";

/// Parse an embedded markup document into a field tree
///
/// The returned value is an object with a single entry named after the root
/// tag.
///
/// # Errors
///
/// Returns error if the document is not well-formed
pub fn markup_to_tree(raw: &str) -> Result<Value> {
    let doc = roxmltree::Document::parse(raw.trim())
        .map_err(|e| Error::Payload(format!("markup parse failed: {e}")))?;

    let root = doc.root_element();
    let mut tree = Map::new();
    tree.insert(root.tag_name().name().to_string(), element_to_value(root));
    Ok(Value::Object(tree))
}

/// Fold one element into a value
fn element_to_value(element: roxmltree::Node<'_, '_>) -> Value {
    let mut fields = Map::new();

    for attr in element.attributes() {
        fields.insert(attr.name().to_string(), Value::String(attr.value().to_string()));
    }

    for child in element.children().filter(roxmltree::Node::is_element) {
        let name = child.tag_name().name().to_string();
        let value = element_to_value(child);

        // repeated sibling tags collect into a list
        match fields.remove(&name) {
            None => {
                fields.insert(name, value);
            }
            Some(Value::Array(mut list)) => {
                list.push(value);
                fields.insert(name, Value::Array(list));
            }
            Some(existing) => {
                fields.insert(name, Value::Array(vec![existing, value]));
            }
        }
    }

    let text = element_text(element);
    if let Some(text) = text {
        if fields.is_empty() {
            return Value::String(text);
        }
        fields.insert(TEXT_KEY.to_string(), Value::String(text));
    }

    Value::Object(fields)
}

/// Trimmed direct text of an element, if non-empty
fn element_text(element: roxmltree::Node<'_, '_>) -> Option<String> {
    let text: String = element
        .children()
        .filter(roxmltree::Node::is_text)
        .filter_map(|n| n.text())
        .collect();
    let trimmed = text.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// Walk a tree along a path of field names
#[must_use]
pub fn tree_get<'a>(value: &'a Value, path: &[&str]) -> Option<&'a Value> {
    let mut current = value;
    for key in path {
        current = current.get(key)?;
    }
    Some(current)
}

/// Read the string content of a node, unfolding `_text` when present
#[must_use]
pub fn node_text(value: &Value) -> Option<&str> {
    match value {
        Value::String(text) => Some(text),
        Value::Object(fields) => fields.get(TEXT_KEY).and_then(Value::as_str),
        _ => None,
    }
}

/// Read the string content of a node along a path
#[must_use]
pub fn tree_text<'a>(value: &'a Value, path: &[&str]) -> Option<&'a str> {
    tree_get(value, path).and_then(node_text)
}
