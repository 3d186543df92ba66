//! Service descriptions read from flattened WSDL 1.1 documents.
//!
//! [`ServiceDescription::from_document`] extracts what a SOAP engine needs to
//! make calls and report metadata: operations (in `portType` order) with
//! their message parts, SOAP actions and binding styles, named schema types,
//! and the endpoint addresses of the service ports. It understands the
//! subset of WSDL and XML Schema that typical RPC services use; it is not a
//! schema validator.
//!
//! All names are matched by local name. QName-valued attributes such as
//! `element="tns:Add"` are reduced to their local part.

use thiserror::Error;

use crate::document::{local_name, Document, Element};
use crate::envelope::SoapVersion;
use crate::metadata::{Field, Metadata, Method, Parameter, Type, TypeKind};

/// Namespace of the WSDL SOAP 1.1 binding extension (`soap:address`, …).
pub const SOAP11_BINDING_NS: &str = "http://schemas.xmlsoap.org/wsdl/soap/";
/// Namespace of the WSDL SOAP 1.2 binding extension (`soap12:address`, …).
pub const SOAP12_BINDING_NS: &str = "http://schemas.xmlsoap.org/wsdl/soap12/";

/// Errors raised when a document cannot be read as a service description.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DescriptionError {
    #[error("expected a WSDL definitions root element, found <{0}>")]
    NotDefinitions(String),

    #[error("service description declares no operations")]
    NoOperations,

    #[error("operation {operation:?} refers to undeclared message {message:?}")]
    UnknownMessage { operation: String, message: String },
}

/// Binding style of an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Style {
    Document,
    Rpc,
}

/// One part of an input or output message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Part {
    pub name: String,
    /// Local name of the element the part refers to (document style).
    pub element: Option<String>,
    /// Local name of the part's type (rpc style).
    pub type_name: Option<String>,
}

impl Part {
    pub fn declared_type(&self) -> &str {
        self.element
            .as_deref()
            .or(self.type_name.as_deref())
            .unwrap_or("anyType")
    }
}

/// A callable operation with everything needed to encode a request for it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Operation {
    pub name: String,
    /// SOAP action from the binding; empty when none is declared.
    pub action: String,
    pub style: Style,
    pub input: Vec<Part>,
    pub output: Vec<Part>,
}

impl Operation {
    /// The element that wraps the request body for document/literal calls
    /// with a single element part.
    pub fn request_element(&self) -> Option<&str> {
        single_element(self.style, &self.input)
    }

    /// The element that wraps the response body, by the same rule.
    pub fn response_element(&self) -> Option<&str> {
        single_element(self.style, &self.output)
    }
}

fn single_element(style: Style, parts: &[Part]) -> Option<&str> {
    match (style, parts) {
        (Style::Document, [part]) => part.element.as_deref(),
        _ => None,
    }
}

/// Namespace and element form of the schema a top-level element came from.
#[derive(Debug, Clone, PartialEq, Eq)]
struct ElementSchema {
    element: String,
    namespace: String,
    qualified: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Address {
    namespace: Option<String>,
    location: String,
}

/// Everything the engine knows about a service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceDescription {
    target_namespace: String,
    qualified: bool,
    operations: Vec<Operation>,
    types: Vec<Type>,
    element_schemas: Vec<ElementSchema>,
    addresses: Vec<Address>,
}

impl ServiceDescription {
    /// Read a flattened WSDL document.
    pub fn from_document(document: &Document) -> Result<Self, DescriptionError> {
        let root = document.root();
        if root.local_name() != "definitions" {
            return Err(DescriptionError::NotDefinitions(root.name.clone()));
        }

        let target_namespace = root.attr("targetNamespace").unwrap_or_default().to_string();

        let schemas: Vec<&Element> = root
            .elements_named("types")
            .flat_map(|t| t.elements_named("schema"))
            .collect();
        let qualified = schemas
            .first()
            .and_then(|s| s.attr("elementFormDefault"))
            .is_some_and(|v| v == "qualified");
        let types = schemas.iter().flat_map(|s| schema_types(s)).collect();
        let element_schemas = schemas
            .iter()
            .flat_map(|s| element_schemas(s, &target_namespace))
            .collect();

        let messages: Vec<(&str, Vec<Part>)> = root
            .elements_named("message")
            .filter_map(|m| Some((m.attr("name")?, message_parts(m))))
            .collect();
        let find_message = |operation: &str, reference: &str| {
            let wanted = local_name(reference);
            messages
                .iter()
                .find(|(name, _)| *name == wanted)
                .map(|(_, parts)| parts.clone())
                .ok_or_else(|| DescriptionError::UnknownMessage {
                    operation: operation.to_string(),
                    message: wanted.to_string(),
                })
        };

        let bindings = binding_operations(root);

        let mut operations: Vec<Operation> = Vec::new();
        for port_type in root.elements_named("portType") {
            for op in port_type.elements_named("operation") {
                let Some(name) = op.attr("name") else { continue };
                if operations.iter().any(|o| o.name == name) {
                    continue;
                }
                let input = match op.child("input").and_then(|i| i.attr("message")) {
                    Some(message) => find_message(name, message)?,
                    None => Vec::new(),
                };
                let output = match op.child("output").and_then(|o| o.attr("message")) {
                    Some(message) => find_message(name, message)?,
                    None => Vec::new(),
                };
                let (action, style) = bindings
                    .iter()
                    .find(|b| b.name == name)
                    .map(|b| (b.action.clone(), b.style))
                    .unwrap_or((String::new(), Style::Document));
                operations.push(Operation {
                    name: name.to_string(),
                    action,
                    style,
                    input,
                    output,
                });
            }
        }
        if operations.is_empty() {
            return Err(DescriptionError::NoOperations);
        }

        Ok(Self {
            target_namespace,
            qualified,
            operations,
            types,
            element_schemas,
            addresses: service_addresses(root),
        })
    }

    pub fn target_namespace(&self) -> &str {
        &self.target_namespace
    }

    /// `true` when local elements are namespace-qualified
    /// (`elementFormDefault="qualified"`).
    pub fn qualified_elements(&self) -> bool {
        self.qualified
    }

    /// Namespace of the schema declaring the top-level element `element`,
    /// falling back to the definitions' target namespace.
    pub fn element_namespace(&self, element: &str) -> &str {
        self.element_schema(element)
            .map_or(self.target_namespace.as_str(), |s| s.namespace.as_str())
    }

    /// Whether the children of `element` are namespace-qualified, per the
    /// `elementFormDefault` of the schema that declares it.
    pub fn element_qualified(&self, element: &str) -> bool {
        self.element_schema(element)
            .map_or(self.qualified, |s| s.qualified)
    }

    fn element_schema(&self, element: &str) -> Option<&ElementSchema> {
        let element = local_name(element);
        self.element_schemas.iter().find(|s| s.element == element)
    }

    pub fn operations(&self) -> &[Operation] {
        &self.operations
    }

    pub fn operation(&self, name: &str) -> Option<&Operation> {
        self.operations.iter().find(|o| o.name == name)
    }

    pub fn types(&self) -> &[Type] {
        &self.types
    }

    pub fn find_type(&self, name: &str) -> Option<&Type> {
        let name = local_name(name);
        self.types.iter().find(|t| t.name == name)
    }

    /// Fields of a complex type, following element declarations that refer
    /// to a named type.
    pub fn fields_of(&self, type_name: &str) -> Option<&[Field]> {
        let mut current = self.find_type(type_name)?;
        for _ in 0..8 {
            if !current.fields.is_empty() {
                return Some(current.fields.as_slice());
            }
            current = self.find_type(current.base.as_deref()?)?;
        }
        None
    }

    /// The built-in XSD type a (possibly user-defined) type ultimately
    /// derives from, e.g. `"int"` for a simple type restricting `xsd:int`.
    pub fn builtin_of<'a>(&'a self, type_name: &'a str) -> &'a str {
        let mut name = local_name(type_name);
        for _ in 0..8 {
            match self.find_type(name).and_then(|t| t.base.as_deref()) {
                Some(base) => name = local_name(base),
                None => break,
            }
        }
        name
    }

    /// Endpoint address for `version`: a port bound with that SOAP version's
    /// binding namespace if there is one, otherwise any SOAP port, otherwise
    /// the first address declared.
    pub fn endpoint(&self, version: SoapVersion) -> Option<&str> {
        let preferred = version.binding_namespace();
        let by_ns = |ns: &str| {
            self.addresses
                .iter()
                .find(|a| a.namespace.as_deref() == Some(ns))
        };
        by_ns(preferred)
            .or_else(|| by_ns(SOAP11_BINDING_NS))
            .or_else(|| by_ns(SOAP12_BINDING_NS))
            .or_else(|| self.addresses.first())
            .map(|a| a.location.as_str())
    }

    /// Ordered method and type collections.
    pub fn metadata(&self) -> Metadata {
        let methods = self
            .operations
            .iter()
            .map(|op| Method {
                name: op.name.clone(),
                parameters: op
                    .input
                    .iter()
                    .map(|p| Parameter {
                        name: p.name.clone(),
                        type_name: p.declared_type().to_string(),
                    })
                    .collect(),
                return_type: op
                    .output
                    .first()
                    .map_or("void", Part::declared_type)
                    .to_string(),
            })
            .collect();
        Metadata {
            methods,
            types: self.types.clone(),
        }
    }
}

// ---------------------------------------------------------------------------
// Schema
// ---------------------------------------------------------------------------

fn schema_types(schema: &Element) -> Vec<Type> {
    let mut out = Vec::new();
    for decl in schema.elements() {
        let Some(name) = decl.attr("name") else { continue };
        let ty = match decl.local_name() {
            "complexType" => Type {
                name: name.to_string(),
                kind: TypeKind::Complex,
                base: extension_base(decl),
                fields: collect_fields(decl),
            },
            "simpleType" => Type {
                name: name.to_string(),
                kind: TypeKind::Simple,
                base: decl
                    .child("restriction")
                    .and_then(|r| r.attr("base"))
                    .map(|b| local_name(b).to_string()),
                fields: Vec::new(),
            },
            "element" => Type {
                name: name.to_string(),
                kind: TypeKind::Element,
                base: decl.attr("type").map(|t| local_name(t).to_string()),
                fields: decl.child("complexType").map(collect_fields).unwrap_or_default(),
            },
            _ => continue,
        };
        out.push(ty);
    }
    out
}

fn element_schemas(schema: &Element, default_namespace: &str) -> Vec<ElementSchema> {
    let namespace = schema.attr("targetNamespace").unwrap_or(default_namespace);
    let qualified = schema.attr("elementFormDefault") == Some("qualified");
    schema
        .elements_named("element")
        .filter_map(|e| {
            Some(ElementSchema {
                element: e.attr("name")?.to_string(),
                namespace: namespace.to_string(),
                qualified,
            })
        })
        .collect()
}

fn extension_base(complex: &Element) -> Option<String> {
    let content = complex
        .child("complexContent")
        .or_else(|| complex.child("simpleContent"))?;
    let derivation = content.child("extension").or_else(|| content.child("restriction"))?;
    derivation.attr("base").map(|b| local_name(b).to_string())
}

fn collect_fields(container: &Element) -> Vec<Field> {
    let mut out = Vec::new();
    push_fields(container, &mut out);
    out
}

fn push_fields(container: &Element, out: &mut Vec<Field>) {
    for child in container.elements() {
        match child.local_name() {
            "element" => {
                let reference = child.attr("ref").map(local_name);
                let Some(name) = child.attr("name").or(reference) else { continue };
                let type_name = child
                    .attr("type")
                    .map(local_name)
                    .or(reference)
                    .unwrap_or("anyType");
                let repeated = match child.attr("maxOccurs") {
                    Some("unbounded") => true,
                    Some(n) => n.parse::<u32>().is_ok_and(|n| n > 1),
                    None => false,
                };
                out.push(Field {
                    name: name.to_string(),
                    type_name: type_name.to_string(),
                    repeated,
                });
            }
            "sequence" | "all" | "choice" | "complexContent" | "extension" | "restriction" => {
                push_fields(child, out)
            }
            _ => {}
        }
    }
}

// ---------------------------------------------------------------------------
// Messages, bindings, services
// ---------------------------------------------------------------------------

fn message_parts(message: &Element) -> Vec<Part> {
    message
        .elements_named("part")
        .filter_map(|p| {
            Some(Part {
                name: p.attr("name")?.to_string(),
                element: p.attr("element").map(|e| local_name(e).to_string()),
                type_name: p.attr("type").map(|t| local_name(t).to_string()),
            })
        })
        .collect()
}

struct BoundOperation {
    name: String,
    action: String,
    style: Style,
}

fn parse_style(value: Option<&str>) -> Option<Style> {
    match value? {
        "rpc" => Some(Style::Rpc),
        "document" => Some(Style::Document),
        _ => None,
    }
}

fn binding_operations(root: &Element) -> Vec<BoundOperation> {
    let mut out: Vec<BoundOperation> = Vec::new();
    for binding in root.elements_named("binding") {
        let default_style = parse_style(binding.child("binding").and_then(|b| b.attr("style")))
            .unwrap_or(Style::Document);
        for op in binding.elements_named("operation") {
            let Some(name) = op.attr("name") else { continue };
            let soap_op = op.child("operation");
            let action = soap_op
                .and_then(|s| s.attr("soapAction"))
                .unwrap_or_default()
                .to_string();
            let style = parse_style(soap_op.and_then(|s| s.attr("style"))).unwrap_or(default_style);

            match out.iter_mut().find(|b| b.name == name) {
                Some(existing) if existing.action.is_empty() && !action.is_empty() => {
                    existing.action = action;
                    existing.style = style;
                }
                Some(_) => {}
                None => out.push(BoundOperation {
                    name: name.to_string(),
                    action,
                    style,
                }),
            }
        }
    }
    out
}

fn service_addresses(root: &Element) -> Vec<Address> {
    let mut out = Vec::new();
    for service in root.elements_named("service") {
        for port in service.elements_named("port") {
            for address in port.elements_named("address") {
                let Some(location) = address.attr("location") else { continue };
                let namespace = namespace_of(address, &[root, service, port, address]);
                out.push(Address {
                    namespace: namespace.map(str::to_string),
                    location: location.to_string(),
                });
            }
        }
    }
    out
}

/// Namespace URI bound to `element`'s prefix, searching `scopes` innermost
/// first.
fn namespace_of<'a>(element: &Element, scopes: &[&'a Element]) -> Option<&'a str> {
    let prefix = element.prefix().unwrap_or("");
    scopes.iter().rev().find_map(|scope| {
        scope
            .namespace_declarations()
            .find(|(p, _)| *p == prefix)
            .map(|(_, uri)| uri)
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
