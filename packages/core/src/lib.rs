//! Core of the soapflow SOAP client.
//!
//! This crate holds everything that does not touch the network: parsing and
//! flattening interface documents, reading a service description out of a
//! flattened document, and encoding and decoding SOAP envelopes. The
//! `soapflow-client` crate layers HTTP, lazy engine construction, and the
//! client facade on top.
//!
//! # Crate layout
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`document`] | XML element tree, [`Document`] with its import references |
//! | [`loader`] | [`Loader`] trait for fetching documents, [`MemoryLoader`] |
//! | [`flatten`] | [`Flattener`]: inline every import into one self-contained document |
//! | [`description`] | [`ServiceDescription`]: operations, types, endpoints |
//! | [`envelope`] | SOAP 1.1 / 1.2 request encoding and response decoding |
//! | [`message`] | [`SoapRequest`] / [`SoapResponse`] handed to and from a transport |
//! | [`metadata`] | [`Method`] and [`Type`] summaries reported to callers |
//!
//! # Quick start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use soapflow::{Flattener, MemoryLoader, ServiceDescription};
//!
//! let loader = Arc::new(MemoryLoader::new()
//!     .with("mem://calc.wsdl", CALC_WSDL)
//!     .with("mem://types.xsd", CALC_TYPES));
//! let flat = Flattener::new(loader).flatten("mem://calc.wsdl").await?;
//! let description = ServiceDescription::from_document(&flat)?;
//! for method in description.metadata().methods {
//!     println!("{method}");
//! }
//! ```

pub mod description;
pub mod document;
pub mod envelope;
pub mod flatten;
pub mod loader;
pub mod message;
pub mod metadata;

pub use description::{DescriptionError, Operation, Part, ServiceDescription, Style};
pub use document::{Document, Element, ImportKind, ImportRef, Node, ParseError, INLINE_LOCATION};
pub use envelope::{decode_response, encode_call, EnvelopeError, SoapVersion};
pub use flatten::{FlattenError, Flattener, ImportError};
pub use loader::{FetchError, Loader, MemoryLoader};
pub use message::{SoapRequest, SoapResponse};
pub use metadata::{Field, Metadata, Method, Parameter, Type, TypeKind};
