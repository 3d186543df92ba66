//! Import flattening.
//!
//! An execution engine wants one self-contained document, but real service
//! descriptions are often split across files: `wsdl:import` pulls in other
//! definitions, `xsd:import` / `xsd:include` pull in schemas. The
//! [`Flattener`] fetches every referenced document through a [`Loader`] and
//! splices its content into the referencing document until no external
//! references remain.
//!
//! # Splicing rules
//!
//! | Reference | Result |
//! |-----------|--------|
//! | `wsdl:import location` | replaced by the imported definitions' child elements |
//! | `xsd:include schemaLocation` | replaced by the included schema's child elements |
//! | `xsd:import schemaLocation` | `schemaLocation` dropped; the imported schema is placed in `types` right after the importing schema |
//!
//! Namespace declarations of an imported root are copied onto every element
//! spliced out of it, so prefixes stay bound after the move.
//!
//! # Traversal
//!
//! Depth-first, in the order references appear. Each resolved absolute
//! location is fetched at most once per pass: a second reference to a
//! location that has already been merged is dropped (diamond imports collapse
//! to one copy). A reference to a location that is still being resolved
//! further up the current path is a cycle and fails the pass.

use std::collections::HashSet;
use std::sync::Arc;

use futures::future::BoxFuture;
use thiserror::Error;
use tracing::{debug, warn};
use url::Url;

use crate::document::{Document, Element, ImportKind, ImportRef, Node, ParseError};
use crate::loader::{FetchError, Loader};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors raised while resolving the documents referenced from a root.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ImportError {
    /// The import graph loops back onto a document still being resolved.
    #[error("import cycle: {}", .chain.join(" -> "))]
    Cycle { chain: Vec<String> },

    #[error("failed to fetch import {location}: {source}")]
    Fetch {
        location: String,
        #[source]
        source: FetchError,
    },

    #[error("failed to parse import {location}: {source}")]
    Parse {
        location: String,
        #[source]
        source: ParseError,
    },

    /// The reference cannot be turned into an absolute location.
    #[error("cannot resolve import {reference:?} against {base:?}")]
    InvalidLocation { reference: String, base: String },
}

/// Errors returned by [`Flattener::flatten`].
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FlattenError {
    /// The root document could not be fetched.
    #[error(transparent)]
    Fetch(#[from] FetchError),

    /// The root document is not well-formed XML.
    #[error("failed to parse {location}: {source}")]
    Parse {
        location: String,
        #[source]
        source: ParseError,
    },

    /// Something below the root failed.
    #[error(transparent)]
    Import(#[from] ImportError),
}

// ---------------------------------------------------------------------------
// Flattener
// ---------------------------------------------------------------------------

/// Resolves and merges all imports of a document.
#[derive(Clone)]
pub struct Flattener {
    loader: Arc<dyn Loader>,
}

/// Result of expanding one element: the element itself plus any schemas that
/// must be hoisted into the root's `types` section.
struct Expanded {
    element: Element,
    hoisted: Vec<Element>,
}

/// Traversal state of a single flatten pass.
struct Pass {
    /// Locations whose content has been fully merged.
    resolved: HashSet<String>,
    /// Locations on the current descent path, root first.
    resolving: Vec<String>,
}

enum Visit {
    New,
    Resolving,
    Resolved,
}

impl Pass {
    fn new(root: &str) -> Self {
        Self {
            resolved: HashSet::new(),
            resolving: vec![root.to_string()],
        }
    }

    fn visit(&self, location: &str) -> Visit {
        if self.resolving.iter().any(|l| l == location) {
            Visit::Resolving
        } else if self.resolved.contains(location) {
            Visit::Resolved
        } else {
            Visit::New
        }
    }
}

impl Flattener {
    pub fn new(loader: Arc<dyn Loader>) -> Self {
        Self { loader }
    }

    /// Fetch the document at `root_location` and flatten it.
    pub async fn flatten(&self, root_location: &str) -> Result<Document, FlattenError> {
        let location = normalize(root_location);
        debug!(%location, "fetching root document");
        let text = self.loader.load(&location).await?;
        let document = Document::parse(location.clone(), &text)
            .map_err(|source| FlattenError::Parse { location, source })?;
        self.flatten_document(document).await
    }

    /// Flatten a document that is already in memory. Relative references are
    /// resolved against the document's own location.
    pub async fn flatten_document(&self, document: Document) -> Result<Document, FlattenError> {
        if document.is_flat() {
            return Ok(document);
        }

        let (location, root) = document.into_parts();
        let mut pass = Pass::new(&location);
        let Expanded { mut element, hoisted } = self.expand(root, &location, &mut pass).await?;
        attach_hoisted(&mut element, hoisted);
        debug!(%location, merged = pass.resolved.len(), "document flattened");
        Ok(Document::new(location, element))
    }

    fn expand<'a>(
        &'a self,
        mut element: Element,
        base: &'a str,
        pass: &'a mut Pass,
    ) -> BoxFuture<'a, Result<Expanded, ImportError>> {
        Box::pin(async move {
            let mut hoisted = Vec::new();
            let children = std::mem::take(&mut element.children);

            for child in children {
                let child = match child {
                    Node::Element(child) => child,
                    text => {
                        element.children.push(text);
                        continue;
                    }
                };

                let Some(import) = ImportRef::from_element(&child) else {
                    let expanded = self.expand(child, base, pass).await?;
                    element.children.push(Node::Element(expanded.element));
                    if element.local_name() == "types" {
                        // Schemas imported by a schema follow it directly.
                        element
                            .children
                            .extend(expanded.hoisted.into_iter().map(Node::Element));
                    } else {
                        hoisted.extend(expanded.hoisted);
                    }
                    continue;
                };

                let target = resolve(base, &import.target)?;
                match pass.visit(&target) {
                    Visit::Resolving => {
                        let mut chain = pass.resolving.clone();
                        chain.push(target);
                        warn!(chain = %chain.join(" -> "), "import cycle detected");
                        return Err(ImportError::Cycle { chain });
                    }
                    Visit::Resolved => {
                        debug!(%target, "import already merged; skipping");
                        if import.kind == ImportKind::SchemaImport {
                            element.children.push(Node::Element(strip_location(child)));
                        }
                    }
                    Visit::New => {
                        let imported = self.load_import(&target, pass).await?;
                        splice(&mut element, child, import.kind, imported, &mut hoisted);
                    }
                }
            }

            Ok(Expanded { element, hoisted })
        })
    }

    async fn load_import(&self, location: &str, pass: &mut Pass) -> Result<Expanded, ImportError> {
        pass.resolving.push(location.to_string());
        debug!(%location, "fetching import");

        let text = self
            .loader
            .load(location)
            .await
            .map_err(|source| ImportError::Fetch {
                location: location.to_string(),
                source,
            })?;
        let root = Element::parse(&text).map_err(|source| ImportError::Parse {
            location: location.to_string(),
            source,
        })?;
        let expanded = self.expand(root, location, pass).await?;

        pass.resolving.pop();
        pass.resolved.insert(location.to_string());
        Ok(expanded)
    }
}

/// Merge an imported document into `parent` in place of `reference`.
fn splice(
    parent: &mut Element,
    reference: Element,
    kind: ImportKind,
    imported: Expanded,
    hoisted: &mut Vec<Element>,
) {
    let Expanded {
        element: imported_root,
        hoisted: nested,
    } = imported;

    let hoist_whole = kind == ImportKind::SchemaImport
        || (kind == ImportKind::Wsdl && imported_root.local_name() == "schema");

    if hoist_whole {
        if kind == ImportKind::SchemaImport {
            parent.children.push(Node::Element(strip_location(reference)));
        }
        hoisted.push(imported_root);
    } else {
        for grandchild in imported_root.elements() {
            let mut grandchild = grandchild.clone();
            grandchild.inherit_namespaces(&imported_root);
            parent.children.push(Node::Element(grandchild));
        }
    }
    hoisted.extend(nested);
}

fn strip_location(mut reference: Element) -> Element {
    reference.remove_attr("schemaLocation");
    reference
}

/// Append schemas hoisted outside any `types` section (a `wsdl:import` of a
/// bare schema) to the root's `types` section, creating one when the root is
/// a definitions document without it. Any other root receives them as
/// trailing children.
fn attach_hoisted(root: &mut Element, hoisted: Vec<Element>) {
    if hoisted.is_empty() {
        return;
    }

    if root.local_name() != "definitions" {
        root.children
            .extend(hoisted.into_iter().map(Node::Element));
        return;
    }

    let position = root.children.iter().position(
        |n| matches!(n, Node::Element(e) if e.local_name() == "types"),
    );
    let index = match position {
        Some(index) => index,
        None => {
            let name = match root.prefix() {
                Some(prefix) => format!("{prefix}:types"),
                None => "types".to_string(),
            };
            root.children.insert(0, Node::Element(Element::new(name)));
            0
        }
    };
    if let Node::Element(types) = &mut root.children[index] {
        types
            .children
            .extend(hoisted.into_iter().map(Node::Element));
    }
}

/// Resolve `reference` against `base` into a canonical absolute location.
fn resolve(base: &str, reference: &str) -> Result<String, ImportError> {
    let invalid = || ImportError::InvalidLocation {
        reference: reference.to_string(),
        base: base.to_string(),
    };
    if let Ok(absolute) = Url::parse(reference) {
        return Ok(absolute.to_string());
    }
    let base = Url::parse(base).map_err(|_| invalid())?;
    base.join(reference).map(|u| u.to_string()).map_err(|_| invalid())
}

/// Canonical form of a root location; left untouched when it is not a URL.
fn normalize(location: &str) -> String {
    Url::parse(location)
        .map(|u| u.to_string())
        .unwrap_or_else(|_| location.to_string())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::MemoryLoader;

    const WSDL_NS: &str = r#"xmlns:wsdl="http://schemas.xmlsoap.org/wsdl/""#;
    const XSD_NS: &str = r#"xmlns:xsd="http://www.w3.org/2001/XMLSchema""#;

    fn definitions(body: &str) -> String {
        format!(r#"<wsdl:definitions {WSDL_NS} targetNamespace="urn:t">{body}</wsdl:definitions>"#)
    }

    fn schema(body: &str) -> String {
        format!(r#"<xsd:schema {XSD_NS} targetNamespace="urn:t">{body}</xsd:schema>"#)
    }

    fn flattener(loader: &Arc<MemoryLoader>) -> Flattener {
        Flattener::new(Arc::clone(loader) as Arc<dyn Loader>)
    }

    fn message_names(doc: &Document) -> Vec<String> {
        doc.root()
            .elements_named("message")
            .filter_map(|m| m.attr("name").map(str::to_string))
            .collect()
    }

    #[tokio::test]
    async fn flat_document_is_returned_unchanged() {
        let text = definitions(r#"<wsdl:message name="A"/><wsdl:message name="B"/>"#);
        let loader = Arc::new(MemoryLoader::new().with("http://x/root.wsdl", text.clone()));
        let flat = flattener(&loader).flatten("http://x/root.wsdl").await.unwrap();

        assert_eq!(flat, Document::parse("http://x/root.wsdl", &text).unwrap());

        let again = flattener(&loader).flatten_document(flat.clone()).await.unwrap();
        assert_eq!(again, flat);
    }

    #[tokio::test]
    async fn wsdl_import_is_spliced_in_place_with_namespaces() {
        let loader = Arc::new(
            MemoryLoader::new()
                .with(
                    "http://x/root.wsdl",
                    definitions(
                        r#"<wsdl:message name="First"/><wsdl:import location="parts/child.wsdl"/><wsdl:message name="Last"/>"#,
                    ),
                )
                .with(
                    "http://x/parts/child.wsdl",
                    r#"<w:definitions xmlns:w="http://schemas.xmlsoap.org/wsdl/" xmlns:c="urn:child"><w:message name="Middle"/></w:definitions>"#,
                ),
        );

        let flat = flattener(&loader).flatten("http://x/root.wsdl").await.unwrap();

        assert!(flat.is_flat());
        assert_eq!(message_names(&flat), vec!["First", "Middle", "Last"]);
        let middle = flat.root().elements().nth(1).unwrap();
        assert_eq!(middle.name, "w:message");
        assert_eq!(middle.attr("xmlns:w"), Some("http://schemas.xmlsoap.org/wsdl/"));
        assert_eq!(middle.attr("xmlns:c"), Some("urn:child"));
    }

    #[tokio::test]
    async fn diamond_import_fetches_shared_document_once() {
        let loader = Arc::new(
            MemoryLoader::new()
                .with("http://x/a.wsdl", definitions(r#"<wsdl:import location="b.wsdl"/><wsdl:import location="c.wsdl"/>"#))
                .with("http://x/b.wsdl", definitions(r#"<wsdl:message name="B"/><wsdl:import location="d.wsdl"/>"#))
                .with("http://x/c.wsdl", definitions(r#"<wsdl:message name="C"/><wsdl:import location="./d.wsdl"/>"#))
                .with("http://x/d.wsdl", definitions(r#"<wsdl:message name="D"/>"#)),
        );

        let flat = flattener(&loader).flatten("http://x/a.wsdl").await.unwrap();

        assert_eq!(loader.fetch_count("http://x/d.wsdl"), 1);
        assert_eq!(loader.total_fetches(), 4);
        assert_eq!(message_names(&flat), vec!["B", "D", "C"]);
    }

    #[tokio::test]
    async fn cycle_is_rejected() {
        let loader = Arc::new(
            MemoryLoader::new()
                .with("http://x/a.wsdl", definitions(r#"<wsdl:import location="b.wsdl"/>"#))
                .with("http://x/b.wsdl", definitions(r#"<wsdl:import location="a.wsdl"/>"#)),
        );

        let err = flattener(&loader).flatten("http://x/a.wsdl").await.unwrap_err();

        assert_eq!(
            err,
            FlattenError::Import(ImportError::Cycle {
                chain: vec![
                    "http://x/a.wsdl".into(),
                    "http://x/b.wsdl".into(),
                    "http://x/a.wsdl".into(),
                ],
            })
        );
        assert_eq!(loader.fetch_count("http://x/a.wsdl"), 1);
    }

    #[tokio::test]
    async fn self_import_is_a_cycle() {
        let loader = Arc::new(
            MemoryLoader::new().with("http://x/a.xsd", schema(r#"<xsd:include schemaLocation="a.xsd"/>"#)),
        );
        let err = flattener(&loader).flatten("http://x/a.xsd").await.unwrap_err();
        assert!(matches!(err, FlattenError::Import(ImportError::Cycle { .. })));
    }

    #[tokio::test]
    async fn schema_include_and_import_are_resolved() {
        let root = definitions(&format!(
            "<wsdl:types>{}</wsdl:types><wsdl:message name=\"M\"/>",
            schema(
                r#"<xsd:include schemaLocation="inc.xsd"/><xsd:import namespace="urn:other" schemaLocation="other.xsd"/><xsd:element name="Own"/>"#
            )
        ));
        let loader = Arc::new(
            MemoryLoader::new()
                .with("http://x/root.wsdl", root)
                .with("http://x/inc.xsd", schema(r#"<xsd:complexType name="Included"/>"#))
                .with(
                    "http://x/other.xsd",
                    r#"<xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema" targetNamespace="urn:other"><xs:complexType name="Other"/></xs:schema>"#,
                ),
        );

        let flat = flattener(&loader).flatten("http://x/root.wsdl").await.unwrap();
        assert!(flat.is_flat());

        let types = flat.root().child("types").unwrap();
        let schemas: Vec<&Element> = types.elements_named("schema").collect();
        assert_eq!(schemas.len(), 2);

        let own: Vec<&str> = schemas[0].elements().map(|e| e.local_name()).collect();
        assert_eq!(own, vec!["complexType", "import", "element"]);
        let import = schemas[0].child("import").unwrap();
        assert_eq!(import.attr("namespace"), Some("urn:other"));
        assert_eq!(import.attr("schemaLocation"), None);

        assert_eq!(schemas[1].attr("targetNamespace"), Some("urn:other"));
        assert_eq!(schemas[1].child("complexType").unwrap().attr("name"), Some("Other"));
    }

    #[tokio::test]
    async fn imported_schema_follows_the_schema_that_imports_it() {
        let root = definitions(&format!(
            "<wsdl:types>{}{}</wsdl:types>",
            schema(r#"<xsd:import namespace="urn:x" schemaLocation="x.xsd"/><xsd:complexType name="First"/>"#),
            schema(r#"<xsd:complexType name="Third"/>"#),
        ));
        let loader = Arc::new(
            MemoryLoader::new()
                .with("http://x/root.wsdl", root)
                .with(
                    "http://x/x.xsd",
                    format!(
                        r#"<xsd:schema {XSD_NS} targetNamespace="urn:x"><xsd:complexType name="Second"/><xsd:import namespace="urn:y" schemaLocation="y.xsd"/></xsd:schema>"#
                    ),
                )
                .with(
                    "http://x/y.xsd",
                    format!(r#"<xsd:schema {XSD_NS} targetNamespace="urn:y"><xsd:complexType name="Nested"/></xsd:schema>"#),
                ),
        );

        let flat = flattener(&loader).flatten("http://x/root.wsdl").await.unwrap();

        let names: Vec<&str> = flat
            .root()
            .child("types")
            .unwrap()
            .elements_named("schema")
            .filter_map(|s| s.child("complexType")?.attr("name"))
            .collect();
        assert_eq!(names, vec!["First", "Second", "Nested", "Third"]);
    }

    #[tokio::test]
    async fn types_section_is_created_for_hoisted_schemas() {
        let loader = Arc::new(
            MemoryLoader::new()
                .with("http://x/root.wsdl", definitions(r#"<wsdl:import location="s.xsd"/><wsdl:message name="M"/>"#))
                .with("http://x/s.xsd", schema(r#"<xsd:element name="E"/>"#)),
        );

        let flat = flattener(&loader).flatten("http://x/root.wsdl").await.unwrap();

        let first = flat.root().elements().next().unwrap();
        assert_eq!(first.name, "wsdl:types");
        assert_eq!(first.child("schema").unwrap().child("element").unwrap().attr("name"), Some("E"));
    }

    #[tokio::test]
    async fn missing_import_fails_with_import_error() {
        let loader = Arc::new(
            MemoryLoader::new().with("http://x/root.wsdl", definitions(r#"<wsdl:import location="gone.wsdl"/>"#)),
        );
        let err = flattener(&loader).flatten("http://x/root.wsdl").await.unwrap_err();
        assert_eq!(
            err,
            FlattenError::Import(ImportError::Fetch {
                location: "http://x/gone.wsdl".into(),
                source: FetchError::NotFound("http://x/gone.wsdl".into()),
            })
        );
    }

    #[tokio::test]
    async fn missing_root_fails_with_fetch_error() {
        let loader = Arc::new(MemoryLoader::new());
        let err = flattener(&loader).flatten("http://x/root.wsdl").await.unwrap_err();
        assert!(matches!(err, FlattenError::Fetch(FetchError::NotFound(_))));
    }

    #[tokio::test]
    async fn relative_import_in_inline_document_cannot_be_resolved() {
        let loader = Arc::new(MemoryLoader::new());
        let doc = Document::inline(&definitions(r#"<wsdl:import location="b.wsdl"/>"#)).unwrap();
        let err = flattener(&loader).flatten_document(doc).await.unwrap_err();
        assert!(matches!(
            err,
            FlattenError::Import(ImportError::InvalidLocation { .. })
        ));
    }

    #[tokio::test]
    async fn inline_document_with_absolute_import_is_flattened() {
        let loader = Arc::new(
            MemoryLoader::new().with("http://x/b.wsdl", definitions(r#"<wsdl:message name="B"/>"#)),
        );
        let doc = Document::inline(&definitions(r#"<wsdl:import location="http://x/b.wsdl"/>"#)).unwrap();
        let flat = flattener(&loader).flatten_document(doc).await.unwrap();
        assert_eq!(message_names(&flat), vec!["B"]);
    }
}
