//! SOAP envelope encoding and decoding.
//!
//! [`encode_call`] turns an operation name and positional JSON arguments into
//! a SOAP 1.1 or 1.2 request envelope; [`decode_response`] turns a response
//! envelope back into a JSON value, or into [`EnvelopeError::Fault`] when the
//! server answered with a SOAP fault. Both lean on a [`ServiceDescription`]
//! for element names, namespaces, and declared types.
//!
//! # Value mapping
//!
//! | JSON | XML |
//! |------|-----|
//! | object | child elements, one per key (keys starting with `@` are skipped) |
//! | array | the element repeated once per item |
//! | `null` | empty element with `xsi:nil="true"` |
//! | string / number / bool | text content |
//!
//! On the way back, text is typed by the declared XSD type (`int` and
//! friends become numbers, `boolean` becomes a bool, anything else a string).

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};
use thiserror::Error;

use crate::description::{Operation, ServiceDescription, SOAP11_BINDING_NS, SOAP12_BINDING_NS};
use crate::document::{local_name, Element, Node, ParseError};
use crate::metadata::Field;

pub const SOAP11_ENVELOPE_NS: &str = "http://schemas.xmlsoap.org/soap/envelope/";
pub const SOAP12_ENVELOPE_NS: &str = "http://www.w3.org/2003/05/soap-envelope";
pub const XSI_NS: &str = "http://www.w3.org/2001/XMLSchema-instance";

const ENV_PREFIX: &str = "soapenv";
const TNS_PREFIX: &str = "tns";

// ---------------------------------------------------------------------------
// SoapVersion
// ---------------------------------------------------------------------------

/// SOAP protocol version. Selects envelope namespace and HTTP headers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SoapVersion {
    #[default]
    #[serde(rename = "1.1")]
    V1_1,
    #[serde(rename = "1.2")]
    V1_2,
}

impl SoapVersion {
    pub fn envelope_namespace(self) -> &'static str {
        match self {
            SoapVersion::V1_1 => SOAP11_ENVELOPE_NS,
            SoapVersion::V1_2 => SOAP12_ENVELOPE_NS,
        }
    }

    /// Namespace of the matching WSDL binding extension.
    pub fn binding_namespace(self) -> &'static str {
        match self {
            SoapVersion::V1_1 => SOAP11_BINDING_NS,
            SoapVersion::V1_2 => SOAP12_BINDING_NS,
        }
    }

    /// Detect the version from an envelope namespace URI.
    pub fn from_envelope_namespace(uri: &str) -> Option<Self> {
        match uri {
            SOAP11_ENVELOPE_NS => Some(SoapVersion::V1_1),
            SOAP12_ENVELOPE_NS => Some(SoapVersion::V1_2),
            _ => None,
        }
    }
}

impl fmt::Display for SoapVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SoapVersion::V1_1 => write!(f, "1.1"),
            SoapVersion::V1_2 => write!(f, "1.2"),
        }
    }
}

impl FromStr for SoapVersion {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "1.1" | "11" => Ok(SoapVersion::V1_1),
            "1.2" | "12" => Ok(SoapVersion::V1_2),
            _ => Err(format!("unknown SOAP version {s:?}; expected 1.1 or 1.2")),
        }
    }
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors produced while encoding a request or decoding a response.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum EnvelopeError {
    #[error("cannot encode call to {operation}: {reason}")]
    Encode { operation: String, reason: String },

    #[error("response is not well-formed XML: {0}")]
    Parse(#[from] ParseError),

    #[error("response root is <{0}>, not a SOAP envelope")]
    NotEnvelope(String),

    #[error("SOAP envelope has no body")]
    MissingBody,

    /// The server reported a fault.
    #[error("SOAP fault {code}: {message}")]
    Fault { code: String, message: String },
}

// ---------------------------------------------------------------------------
// Encoding
// ---------------------------------------------------------------------------

/// Build the request envelope for calling `operation` with `args`.
///
/// Document/literal operations with a single element part take either one
/// object argument (its keys become the element's children) or positional
/// arguments matched against the element's declared fields in order. Other
/// operations take one positional argument per message part.
pub fn encode_call(
    version: SoapVersion,
    description: &ServiceDescription,
    operation: &Operation,
    args: &[Value],
) -> Result<String, EnvelopeError> {
    let fail = |reason: String| EnvelopeError::Encode {
        operation: operation.name.clone(),
        reason,
    };

    let mut namespace = description.target_namespace();
    let wrapper = match operation.request_element() {
        Some(element) => {
            namespace = description.element_namespace(element);
            let names = Names {
                qualified: description.element_qualified(element),
            };
            let mut wrapper = Element::new(format!("{TNS_PREFIX}:{element}"));
            let fields = description.fields_of(element).unwrap_or(&[]);
            match args {
                [] => {}
                [Value::Object(map)] => push_object(&mut wrapper, map, fields, names),
                _ if fields.is_empty() => {
                    return Err(fail(format!(
                        "element {element} declares no fields to match {} positional arguments",
                        args.len()
                    )))
                }
                _ if args.len() > fields.len() => {
                    return Err(fail(format!(
                        "expected at most {} arguments, got {}",
                        fields.len(),
                        args.len()
                    )))
                }
                _ => {
                    for (field, arg) in fields.iter().zip(args) {
                        push_value(&mut wrapper, &names.of(&field.name), arg, names);
                    }
                }
            }
            wrapper
        }
        None => {
            let names = Names { qualified: false };
            let mut wrapper = Element::new(format!("{TNS_PREFIX}:{}", operation.name));
            let parts = &operation.input;
            match args {
                [Value::Object(map)] if parts.len() > 1 => {
                    for part in parts {
                        if let Some(value) = map.get(&part.name) {
                            push_value(&mut wrapper, &part.name, value, names);
                        }
                    }
                }
                _ if args.len() > parts.len() => {
                    return Err(fail(format!(
                        "expected at most {} arguments, got {}",
                        parts.len(),
                        args.len()
                    )))
                }
                _ => {
                    for (part, arg) in parts.iter().zip(args) {
                        push_value(&mut wrapper, &part.name, arg, names);
                    }
                }
            }
            wrapper
        }
    };

    let envelope = envelope(version)
        .with_attr(format!("xmlns:{TNS_PREFIX}"), namespace)
        .with_child(Element::new(format!("{ENV_PREFIX}:Body")).with_child(wrapper));
    Ok(with_declaration(&envelope))
}

/// Wrap `payload` in a response envelope. Used by servers and test doubles.
pub fn response_envelope(version: SoapVersion, payload: Element) -> String {
    let envelope =
        envelope(version).with_child(Element::new(format!("{ENV_PREFIX}:Body")).with_child(payload));
    with_declaration(&envelope)
}

/// Build a fault envelope in the shape `version` prescribes.
pub fn fault_envelope(version: SoapVersion, code: &str, message: &str) -> String {
    let q = |local: &str| format!("{ENV_PREFIX}:{local}");
    let fault = match version {
        SoapVersion::V1_1 => Element::new(q("Fault"))
            .with_child(Element::new("faultcode").with_text(code))
            .with_child(Element::new("faultstring").with_text(message)),
        SoapVersion::V1_2 => Element::new(q("Fault"))
            .with_child(Element::new(q("Code")).with_child(Element::new(q("Value")).with_text(code)))
            .with_child(
                Element::new(q("Reason")).with_child(
                    Element::new(q("Text"))
                        .with_attr("xml:lang", "en")
                        .with_text(message),
                ),
            ),
    };
    response_envelope(version, fault)
}

fn envelope(version: SoapVersion) -> Element {
    Element::new(format!("{ENV_PREFIX}:Envelope"))
        .with_attr(format!("xmlns:{ENV_PREFIX}"), version.envelope_namespace())
        .with_attr("xmlns:xsi", XSI_NS)
}

fn with_declaration(root: &Element) -> String {
    format!("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n{}", root.to_xml())
}

/// Element naming for the children of a request wrapper.
#[derive(Clone, Copy)]
struct Names {
    qualified: bool,
}

impl Names {
    fn of(self, local: &str) -> String {
        if self.qualified {
            format!("{TNS_PREFIX}:{local}")
        } else {
            local.to_string()
        }
    }
}

/// Append `map` to `parent`, declared fields first in schema order.
fn push_object(parent: &mut Element, map: &Map<String, Value>, fields: &[Field], names: Names) {
    for field in fields {
        if let Some(value) = map.get(&field.name) {
            push_value(parent, &names.of(&field.name), value, names);
        }
    }
    for (key, value) in map {
        if key.starts_with('@') || fields.iter().any(|f| &f.name == key) {
            continue;
        }
        push_value(parent, &names.of(key), value, names);
    }
}

fn push_value(parent: &mut Element, name: &str, value: &Value, names: Names) {
    let mut element = Element::new(name);
    match value {
        Value::Array(items) => {
            for item in items {
                push_value(parent, name, item, names);
            }
            return;
        }
        Value::Null => element.set_attr("xsi:nil", "true"),
        Value::Bool(b) => element.children.push(Node::Text(b.to_string())),
        Value::Number(n) => element.children.push(Node::Text(n.to_string())),
        Value::String(s) => element.children.push(Node::Text(s.clone())),
        Value::Object(map) => push_object(&mut element, map, &[], names),
    }
    parent.children.push(Node::Element(element));
}

// ---------------------------------------------------------------------------
// Decoding
// ---------------------------------------------------------------------------

/// Decode a response envelope for `operation`.
///
/// `type_mapping` maps declared type names to caller-chosen names; decoded
/// objects of a mapped type carry the chosen name under an `"@type"` key.
pub fn decode_response(
    text: &str,
    description: &ServiceDescription,
    operation: &Operation,
    type_mapping: &BTreeMap<String, String>,
) -> Result<Value, EnvelopeError> {
    let root = Element::parse(text)?;
    if root.local_name() != "Envelope" {
        return Err(EnvelopeError::NotEnvelope(root.name));
    }
    let body = root.child("Body").ok_or(EnvelopeError::MissingBody)?;
    let Some(payload) = body.elements().next() else {
        return Ok(Value::Null);
    };
    if payload.local_name() == "Fault" {
        return Err(fault_from(payload));
    }

    let hints: Vec<Field> = match operation.response_element() {
        Some(element) => description
            .fields_of(element)
            .map(<[Field]>::to_vec)
            .unwrap_or_default(),
        None => operation
            .output
            .iter()
            .map(|p| Field {
                name: p.name.clone(),
                type_name: p.declared_type().to_string(),
                repeated: false,
            })
            .collect(),
    };

    let decoder = Decoder {
        description,
        type_mapping,
    };
    let children: Vec<&Element> = payload.elements().collect();
    Ok(match children.as_slice() {
        [] => {
            let text = payload.text();
            if text.is_empty() {
                Value::Null
            } else {
                Value::String(text)
            }
        }
        [single] => {
            let field = hints.iter().find(|f| f.name == single.local_name());
            let value = decoder.element(single, field.map(|f| f.type_name.as_str()));
            match field {
                Some(f) if f.repeated => Value::Array(vec![value]),
                _ => value,
            }
        }
        _ => decoder.members(payload, &hints),
    })
}

fn fault_from(fault: &Element) -> EnvelopeError {
    let code = fault
        .child("faultcode")
        .or_else(|| fault.child("Code").and_then(|c| c.child("Value")))
        .map(Element::text)
        .unwrap_or_default();
    let message = fault
        .child("faultstring")
        .or_else(|| fault.child("Reason").and_then(|r| r.child("Text")))
        .map(Element::text)
        .unwrap_or_default();
    EnvelopeError::Fault { code, message }
}

struct Decoder<'a> {
    description: &'a ServiceDescription,
    type_mapping: &'a BTreeMap<String, String>,
}

impl Decoder<'_> {
    fn element(&self, element: &Element, hint: Option<&str>) -> Value {
        if element.attr_local("nil") == Some("true") {
            return Value::Null;
        }
        let type_name = element.attr_local("type").map(local_name).or(hint);

        if !element.has_element_children() {
            let builtin = type_name.map(|t| self.description.builtin_of(t));
            return scalar(&element.text(), builtin);
        }

        let fields = type_name
            .and_then(|t| self.description.fields_of(t))
            .unwrap_or(&[]);
        let mut value = self.members(element, fields);
        if let (Some(t), Value::Object(map)) = (type_name, &mut value) {
            if let Some(mapped) = self.type_mapping.get(local_name(t)) {
                map.insert("@type".into(), Value::String(mapped.clone()));
            }
        }
        value
    }

    fn members(&self, element: &Element, fields: &[Field]) -> Value {
        let mut map = Map::new();
        for child in element.elements() {
            let name = child.local_name();
            let field = fields.iter().find(|f| f.name == name);
            let value = self.element(child, field.map(|f| f.type_name.as_str()));
            let repeated = field.is_some_and(|f| f.repeated);

            match map.get_mut(name) {
                Some(Value::Array(items)) => items.push(value),
                Some(existing) => {
                    let first = existing.take();
                    *existing = Value::Array(vec![first, value]);
                }
                None if repeated => {
                    map.insert(name.to_string(), Value::Array(vec![value]));
                }
                None => {
                    map.insert(name.to_string(), value);
                }
            }
        }
        Value::Object(map)
    }
}

fn scalar(text: &str, builtin: Option<&str>) -> Value {
    let trimmed = text.trim();
    match builtin {
        Some(
            "int" | "integer" | "long" | "short" | "byte" | "unsignedInt" | "unsignedLong"
            | "unsignedShort" | "unsignedByte" | "nonNegativeInteger" | "positiveInteger"
            | "negativeInteger" | "nonPositiveInteger",
        ) => {
            if let Ok(n) = trimmed.parse::<i64>() {
                return Value::Number(n.into());
            }
            if let Ok(n) = trimmed.parse::<u64>() {
                return Value::Number(n.into());
            }
        }
        Some("float" | "double" | "decimal") => {
            if let Some(n) = trimmed.parse::<f64>().ok().and_then(Number::from_f64) {
                return Value::Number(n);
            }
        }
        Some("boolean") => match trimmed {
            "true" | "1" => return Value::Bool(true),
            "false" | "0" => return Value::Bool(false),
            _ => {}
        },
        _ => {}
    }
    Value::String(text.to_string())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
