//! Decoding of 200 response bodies into JSON documents.
//!
//! The server's payloads are treated as opaque documents. Callers pull out a
//! named string field, the whole object, or a top-level array; anything else
//! about the shape is left unchecked.

use serde_json::Value;

use dp5_core::error::{Dp5Error, Dp5Result};

/// An opaque structured document decoded from a response or notification.
pub type Document = Value;

/// Parse a response body into a document.
pub fn parse_document(body: &str) -> Dp5Result<Document> {
    serde_json::from_str(body)
        .map_err(|e| Dp5Error::Decode(format!("response body is not valid JSON: {e}")))
}

/// Parse a body that must be a JSON object.
pub fn parse_object(body: &str) -> Dp5Result<Document> {
    let doc = parse_document(body)?;
    if doc.is_object() {
        Ok(doc)
    } else {
        Err(Dp5Error::Decode(format!(
            "expected a JSON object, got {}",
            kind_of(&doc)
        )))
    }
}

/// Parse a body that must be a top-level JSON array.
pub fn parse_array(body: &str) -> Dp5Result<Vec<Document>> {
    match parse_document(body)? {
        Value::Array(items) => Ok(items),
        other => Err(Dp5Error::Decode(format!(
            "expected a JSON array, got {}",
            kind_of(&other)
        ))),
    }
}

/// Parse an object body and return one of its string fields.
pub fn parse_string_field(body: &str, field: &str) -> Dp5Result<String> {
    let doc = parse_object(body)?;
    doc.str_field(field).map(str::to_string)
}

/// On-demand field extraction for documents.
pub trait DocumentExt {
    /// A string-valued field.
    fn str_field(&self, name: &str) -> Dp5Result<&str>;

    /// An array-valued field.
    fn array_field(&self, name: &str) -> Dp5Result<&Vec<Value>>;
}

impl DocumentExt for Value {
    fn str_field(&self, name: &str) -> Dp5Result<&str> {
        match self.get(name) {
            Some(Value::String(s)) => Ok(s.as_str()),
            Some(other) => Err(Dp5Error::Decode(format!(
                "field {name:?} is {}, expected a string",
                kind_of(other)
            ))),
            None => Err(Dp5Error::Decode(format!("missing field {name:?}"))),
        }
    }

    fn array_field(&self, name: &str) -> Dp5Result<&Vec<Value>> {
        match self.get(name) {
            Some(Value::Array(items)) => Ok(items),
            Some(other) => Err(Dp5Error::Decode(format!(
                "field {name:?} is {}, expected an array",
                kind_of(other)
            ))),
            None => Err(Dp5Error::Decode(format!("missing field {name:?}"))),
        }
    }
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
