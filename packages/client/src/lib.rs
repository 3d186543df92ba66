//! Async SOAP client built on the `soapflow` core.
//!
//! # Crate layout
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`client`] | [`Client`] facade and [`ClientBuilder`] |
//! | [`config`] | [`ClientOptions`], read from code or from `SOAPFLOW_*` variables |
//! | [`engine`] | [`Engine`] / [`EngineFactory`] traits and the bundled [`SoapEngine`] |
//! | [`lazy`] | [`LazyEngine`]: builds the engine once, on first use |
//! | [`transport`] | [`Transport`] trait and [`HttpTransport`] |
//! | [`http`] | [`HttpClient`] policy and [`HttpLoader`] for `http(s)://` and `file://` |
//! | [`proxy`] | [`Proxy`]: call operations by name |
//! | [`error`] | [`ClientError`] and its component errors |

pub mod client;
pub mod config;
pub mod engine;
pub mod error;
pub mod http;
pub mod lazy;
pub mod proxy;
pub mod transport;

pub use client::{Client, ClientBuilder, DocumentSource};
pub use config::{ClientOptions, ConfigError};
pub use engine::{Engine, EngineFactory, SoapEngine, SoapEngineFactory};
pub use error::{ClientError, EngineError, TransportError};
pub use http::{HttpClient, HttpLoader};
pub use lazy::LazyEngine;
pub use proxy::Proxy;
pub use transport::{HttpTransport, Transport};
