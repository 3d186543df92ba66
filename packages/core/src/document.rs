//! In-memory XML document model.
//!
//! Interface documents (WSDL files and the XML Schemas they pull in) are held
//! as a small owned element tree. The tree keeps qualified names exactly as
//! written (`wsdl:import`, `s:element`) so that splicing one document into
//! another and serialising the result back out preserves the original
//! prefixes. Lookups that should not care about prefixes go through
//! [`Element::local_name`].
//!
//! Whitespace-only text between tags is dropped on parse; the model is for
//! data-oriented XML, not mixed content.

use std::fmt::Write as _;

use quick_xml::escape::escape;
use quick_xml::events::{BytesStart, Event};
use quick_xml::reader::Reader;
use thiserror::Error;

/// Location given to documents that were supplied as inline content rather
/// than fetched from somewhere.
pub const INLINE_LOCATION: &str = "inline:";

/// Errors produced while parsing XML text into an [`Element`] tree.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("malformed XML: {0}")]
    Xml(String),

    #[error("document contains no root element")]
    Empty,

    #[error("document contains more than one root element")]
    MultipleRoots,

    #[error("document ended before all elements were closed")]
    UnexpectedEof,
}

// ---------------------------------------------------------------------------
// Element tree
// ---------------------------------------------------------------------------

/// A child of an [`Element`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    Element(Element),
    Text(String),
}

/// An XML element with its attributes and children, in document order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Element {
    /// Qualified name as written, e.g. `"wsdl:definitions"`.
    pub name: String,
    /// Attributes in document order, namespace declarations included.
    pub attributes: Vec<(String, String)>,
    pub children: Vec<Node>,
}

impl Element {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            attributes: Vec::new(),
            children: Vec::new(),
        }
    }

    /// Builder-style attribute setter.
    pub fn with_attr(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.set_attr(name, value);
        self
    }

    /// Builder-style child element append.
    pub fn with_child(mut self, child: Element) -> Self {
        self.children.push(Node::Element(child));
        self
    }

    /// Builder-style text append.
    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.children.push(Node::Text(text.into()));
        self
    }

    /// The name with any namespace prefix removed.
    pub fn local_name(&self) -> &str {
        local_name(&self.name)
    }

    /// The namespace prefix, if the name has one.
    pub fn prefix(&self) -> Option<&str> {
        self.name.split_once(':').map(|(prefix, _)| prefix)
    }

    /// Look up an attribute by its exact (qualified) name.
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    /// Look up an attribute by local name, ignoring any prefix.
    pub fn attr_local(&self, local: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| !k.starts_with("xmlns") && local_name(k) == local)
            .map(|(_, v)| v.as_str())
    }

    /// Set an attribute, replacing an existing one with the same name.
    pub fn set_attr(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        match self.attributes.iter_mut().find(|(k, _)| *k == name) {
            Some(slot) => slot.1 = value,
            None => self.attributes.push((name, value)),
        }
    }

    /// Remove an attribute, returning its value if it was present.
    pub fn remove_attr(&mut self, name: &str) -> Option<String> {
        let pos = self.attributes.iter().position(|(k, _)| k == name)?;
        Some(self.attributes.remove(pos).1)
    }

    /// Child elements, skipping text nodes.
    pub fn elements(&self) -> impl Iterator<Item = &Element> {
        self.children.iter().filter_map(|n| match n {
            Node::Element(e) => Some(e),
            Node::Text(_) => None,
        })
    }

    /// Child elements whose local name is `local`.
    pub fn elements_named<'a>(&'a self, local: &'a str) -> impl Iterator<Item = &'a Element> {
        self.elements().filter(move |e| e.local_name() == local)
    }

    /// First child element whose local name is `local`.
    pub fn child(&self, local: &str) -> Option<&Element> {
        self.elements().find(|e| e.local_name() == local)
    }

    /// Concatenated direct text content.
    pub fn text(&self) -> String {
        self.children
            .iter()
            .filter_map(|n| match n {
                Node::Text(t) => Some(t.as_str()),
                Node::Element(_) => None,
            })
            .collect()
    }

    pub fn has_element_children(&self) -> bool {
        self.elements().next().is_some()
    }

    /// Namespace declarations made on this element as `(prefix, uri)` pairs.
    /// The default namespace is reported with an empty prefix.
    pub fn namespace_declarations(&self) -> impl Iterator<Item = (&str, &str)> {
        self.attributes.iter().filter_map(|(k, v)| {
            if k == "xmlns" {
                Some(("", v.as_str()))
            } else {
                k.strip_prefix("xmlns:").map(|p| (p, v.as_str()))
            }
        })
    }

    /// Copy every namespace declaration of `scope` that this element does not
    /// already make itself.
    pub fn inherit_namespaces(&mut self, scope: &Element) {
        for (key, value) in &scope.attributes {
            if (key == "xmlns" || key.starts_with("xmlns:")) && self.attr(key).is_none() {
                self.attributes.push((key.clone(), value.clone()));
            }
        }
    }

    /// Parse XML text into its root element.
    pub fn parse(text: &str) -> Result<Element, ParseError> {
        let mut reader = Reader::from_str(text);

        let mut stack: Vec<Element> = Vec::new();
        let mut root: Option<Element> = None;

        loop {
            let event = reader
                .read_event()
                .map_err(|e| ParseError::Xml(e.to_string()))?;
            match event {
                Event::Start(start) => stack.push(element_from_start(&start)?),
                Event::Empty(start) => {
                    let element = element_from_start(&start)?;
                    attach(&mut stack, &mut root, element)?;
                }
                Event::End(_) => {
                    let element = stack
                        .pop()
                        .ok_or_else(|| ParseError::Xml("unexpected closing tag".into()))?;
                    attach(&mut stack, &mut root, element)?;
                }
                Event::Text(text) => {
                    let text = text
                        .unescape()
                        .map_err(|e| ParseError::Xml(e.to_string()))?;
                    if let Some(parent) = stack.last_mut() {
                        if !text.trim().is_empty() {
                            parent.children.push(Node::Text(text.into_owned()));
                        }
                    }
                }
                Event::CData(data) => {
                    if let Some(parent) = stack.last_mut() {
                        let text = String::from_utf8_lossy(&data.into_inner()).into_owned();
                        parent.children.push(Node::Text(text));
                    }
                }
                Event::Eof => break,
                // Declarations, comments, processing instructions, doctypes.
                _ => {}
            }
        }

        if !stack.is_empty() {
            return Err(ParseError::UnexpectedEof);
        }
        root.ok_or(ParseError::Empty)
    }

    /// Serialise this element (without an XML declaration).
    pub fn to_xml(&self) -> String {
        let mut out = String::new();
        self.write_to(&mut out);
        out
    }

    fn write_to(&self, out: &mut String) {
        out.push('<');
        out.push_str(&self.name);
        for (key, value) in &self.attributes {
            let _ = write!(out, " {}=\"{}\"", key, escape(value.as_str()));
        }
        if self.children.is_empty() {
            out.push_str("/>");
            return;
        }
        out.push('>');
        for child in &self.children {
            match child {
                Node::Element(e) => e.write_to(out),
                Node::Text(t) => out.push_str(&escape(t.as_str())),
            }
        }
        out.push_str("</");
        out.push_str(&self.name);
        out.push('>');
    }
}

/// Strip a namespace prefix from a qualified name.
pub fn local_name(qname: &str) -> &str {
    qname.rsplit_once(':').map_or(qname, |(_, local)| local)
}

fn element_from_start(start: &BytesStart<'_>) -> Result<Element, ParseError> {
    let name = String::from_utf8_lossy(start.name().as_ref()).into_owned();
    let mut element = Element::new(name);
    for attr in start.attributes() {
        let attr = attr.map_err(|e| ParseError::Xml(e.to_string()))?;
        let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
        let value = attr
            .unescape_value()
            .map_err(|e| ParseError::Xml(e.to_string()))?
            .into_owned();
        element.attributes.push((key, value));
    }
    Ok(element)
}

fn attach(
    stack: &mut [Element],
    root: &mut Option<Element>,
    element: Element,
) -> Result<(), ParseError> {
    match stack.last_mut() {
        Some(parent) => {
            parent.children.push(Node::Element(element));
            Ok(())
        }
        None if root.is_none() => {
            *root = Some(element);
            Ok(())
        }
        None => Err(ParseError::MultipleRoots),
    }
}

// ---------------------------------------------------------------------------
// Import references
// ---------------------------------------------------------------------------

/// What kind of external reference an element makes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportKind {
    /// `wsdl:import location="…"`: another WSDL definitions document.
    Wsdl,
    /// `xsd:import schemaLocation="…"`: a schema in another namespace.
    SchemaImport,
    /// `xsd:include schemaLocation="…"`: a schema in the same namespace.
    SchemaInclude,
}

/// An unresolved reference from one document to another.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportRef {
    pub kind: ImportKind,
    /// The target exactly as written; may be relative.
    pub target: String,
}

impl ImportRef {
    /// Classify `element` as an import reference, if it is one.
    ///
    /// `xsd:import` without a `schemaLocation` only names a namespace and is
    /// not a reference.
    pub fn from_element(element: &Element) -> Option<ImportRef> {
        match element.local_name() {
            "import" => {
                if let Some(target) = element.attr("schemaLocation") {
                    Some(ImportRef {
                        kind: ImportKind::SchemaImport,
                        target: target.to_string(),
                    })
                } else {
                    element.attr("location").map(|target| ImportRef {
                        kind: ImportKind::Wsdl,
                        target: target.to_string(),
                    })
                }
            }
            "include" => element.attr("schemaLocation").map(|target| ImportRef {
                kind: ImportKind::SchemaInclude,
                target: target.to_string(),
            }),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Document
// ---------------------------------------------------------------------------

/// A parsed interface document together with the location it came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    location: String,
    root: Element,
}

impl Document {
    pub fn new(location: impl Into<String>, root: Element) -> Self {
        Self {
            location: location.into(),
            root,
        }
    }

    /// Parse `text` as the document found at `location`.
    pub fn parse(location: impl Into<String>, text: &str) -> Result<Self, ParseError> {
        Ok(Self::new(location, Element::parse(text)?))
    }

    /// Parse content that was handed over directly rather than fetched.
    pub fn inline(text: &str) -> Result<Self, ParseError> {
        Self::parse(INLINE_LOCATION, text)
    }

    pub fn location(&self) -> &str {
        &self.location
    }

    pub fn root(&self) -> &Element {
        &self.root
    }

    pub fn into_parts(self) -> (String, Element) {
        (self.location, self.root)
    }

    /// Every import reference anywhere in the tree, in document order.
    pub fn imports(&self) -> Vec<ImportRef> {
        let mut out = Vec::new();
        collect_imports(&self.root, &mut out);
        out
    }

    /// `true` when the document references no other documents.
    pub fn is_flat(&self) -> bool {
        self.imports().is_empty()
    }

    /// Serialise with a leading XML declaration.
    pub fn to_xml(&self) -> String {
        let mut out = String::from("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n");
        self.root.write_to(&mut out);
        out
    }
}

fn collect_imports(element: &Element, out: &mut Vec<ImportRef>) {
    for child in element.elements() {
        match ImportRef::from_element(child) {
            Some(import) => out.push(import),
            None => collect_imports(child, out),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<wsdl:definitions xmlns:wsdl="http://schemas.xmlsoap.org/wsdl/" targetNamespace="urn:x">
  <!-- comment -->
  <wsdl:import namespace="urn:y" location="other.wsdl"/>
  <wsdl:types>
    <xsd:schema xmlns:xsd="http://www.w3.org/2001/XMLSchema">
      <xsd:import namespace="urn:z" schemaLocation="z.xsd"/>
      <xsd:import namespace="urn:builtin"/>
      <xsd:include schemaLocation="inc.xsd"/>
    </xsd:schema>
  </wsdl:types>
  <wsdl:documentation>a &amp; b</wsdl:documentation>
</wsdl:definitions>"#;

    #[test]
    fn parses_names_attributes_and_text() {
        let root = Element::parse(SAMPLE).unwrap();
        assert_eq!(root.name, "wsdl:definitions");
        assert_eq!(root.local_name(), "definitions");
        assert_eq!(root.prefix(), Some("wsdl"));
        assert_eq!(root.attr("targetNamespace"), Some("urn:x"));
        assert_eq!(root.child("documentation").unwrap().text(), "a & b");
        assert_eq!(root.elements().count(), 3);
    }

    #[test]
    fn enumerates_imports_in_document_order() {
        let doc = Document::parse("http://example.com/a.wsdl", SAMPLE).unwrap();
        let imports = doc.imports();
        assert_eq!(
            imports,
            vec![
                ImportRef { kind: ImportKind::Wsdl, target: "other.wsdl".into() },
                ImportRef { kind: ImportKind::SchemaImport, target: "z.xsd".into() },
                ImportRef { kind: ImportKind::SchemaInclude, target: "inc.xsd".into() },
            ]
        );
        assert!(!doc.is_flat());
    }

    #[test]
    fn serialised_output_parses_back_to_the_same_tree() {
        let root = Element::parse(SAMPLE).unwrap();
        let again = Element::parse(&root.to_xml()).unwrap();
        assert_eq!(root, again);
    }

    #[test]
    fn escapes_special_characters() {
        let el = Element::new("a").with_attr("q", "\"<>\"").with_text("x < y & z");
        let xml = el.to_xml();
        assert!(!xml.contains("x < y"));
        assert_eq!(Element::parse(&xml).unwrap(), el);
    }

    #[test]
    fn padded_text_is_kept_and_indentation_dropped() {
        let root = Element::parse("<r>\n  <s> a </s>\n  <t>\n  </t>\n</r>").unwrap();
        assert_eq!(root.children.len(), 2);
        assert_eq!(root.child("s").unwrap().text(), " a ");
        assert!(root.child("t").unwrap().children.is_empty());
    }

    #[test]
    fn rejects_unclosed_and_empty_input() {
        assert_eq!(Element::parse("<a><b></b>"), Err(ParseError::UnexpectedEof));
        assert_eq!(Element::parse("   "), Err(ParseError::Empty));
        assert_eq!(Element::parse("<a/><b/>"), Err(ParseError::MultipleRoots));
        assert!(matches!(Element::parse("<a></b>"), Err(ParseError::Xml(_))));
    }

    #[test]
    fn inherit_namespaces_keeps_own_declarations() {
        let scope = Element::new("r")
            .with_attr("xmlns:a", "urn:scope-a")
            .with_attr("xmlns:b", "urn:scope-b")
            .with_attr("name", "ignored");
        let mut el = Element::new("a:x").with_attr("xmlns:a", "urn:own-a");
        el.inherit_namespaces(&scope);
        assert_eq!(el.attr("xmlns:a"), Some("urn:own-a"));
        assert_eq!(el.attr("xmlns:b"), Some("urn:scope-b"));
        assert_eq!(el.attr("name"), None);
    }
}
