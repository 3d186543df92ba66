//! Error types surfaced by the client.
//!
//! Every failure reaches the caller as the error of the call or metadata
//! query that triggered it. Nothing is retried and nothing is swallowed.

use soapflow::{
    DescriptionError, EnvelopeError, FetchError, FlattenError, ImportError, ParseError,
};
use thiserror::Error;

use crate::config::ConfigError;

// ---------------------------------------------------------------------------
// TransportError
// ---------------------------------------------------------------------------

/// A network-level failure. HTTP error statuses are not transport errors;
/// they come back as ordinary responses.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    #[error("cannot connect to {location}: {message}")]
    Connect { location: String, message: String },

    #[error("request to {location} timed out")]
    Timeout { location: String },

    #[error("request to {location} failed: {message}")]
    Request { location: String, message: String },

    #[error("failed to read response body from {location}: {message}")]
    Body { location: String, message: String },
}

impl TransportError {
    /// Classify a `reqwest` failure for `location`.
    pub fn from_reqwest(location: &str, err: &reqwest::Error) -> Self {
        let location = location.to_string();
        if err.is_timeout() {
            TransportError::Timeout { location }
        } else if err.is_connect() {
            TransportError::Connect {
                location,
                message: err.to_string(),
            }
        } else if err.is_body() || err.is_decode() {
            TransportError::Body {
                location,
                message: err.to_string(),
            }
        } else {
            TransportError::Request {
                location,
                message: err.to_string(),
            }
        }
    }
}

// ---------------------------------------------------------------------------
// EngineError
// ---------------------------------------------------------------------------

/// Failures inside an engine: building it, or encoding and decoding a call.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum EngineError {
    #[error("invalid service description: {0}")]
    Description(#[from] DescriptionError),

    #[error("unknown operation: {0}")]
    UnknownOperation(String),

    /// The service declares no address and none was configured.
    #[error("no endpoint for {0}; set ClientOptions::endpoint")]
    NoEndpoint(String),

    #[error("cannot encode {operation}: {source}")]
    Encode {
        operation: String,
        #[source]
        source: EnvelopeError,
    },

    #[error("cannot decode {operation} response (HTTP {status}): {source}")]
    Decode {
        operation: String,
        status: u16,
        #[source]
        source: EnvelopeError,
    },

    /// The result decoded fine but does not fit the type the caller asked for.
    #[error("{operation} result does not match the requested type: {message}")]
    Convert { operation: String, message: String },

    /// The service answered with a SOAP fault.
    #[error("SOAP fault {code}: {message}")]
    Fault { code: String, message: String },
}

// ---------------------------------------------------------------------------
// ClientError
// ---------------------------------------------------------------------------

/// Top-level error returned by [`Client`](crate::Client) operations.
#[derive(Debug, Error)]
pub enum ClientError {
    /// The root interface document could not be fetched.
    #[error(transparent)]
    Fetch(#[from] FetchError),

    /// An imported document could not be resolved.
    #[error(transparent)]
    Import(#[from] ImportError),

    /// The root interface document is not well-formed XML.
    #[error("failed to parse {location}: {source}")]
    Parse {
        location: String,
        #[source]
        source: ParseError,
    },

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Engine(#[from] EngineError),

    /// The HTTP client could not be constructed.
    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl ClientError {
    /// `true` when the failure happened on the network.
    pub fn is_transport(&self) -> bool {
        matches!(self, ClientError::Transport(_))
    }

    /// `true` when the service answered with a SOAP fault.
    pub fn is_fault(&self) -> bool {
        matches!(self, ClientError::Engine(EngineError::Fault { .. }))
    }
}

impl From<FlattenError> for ClientError {
    fn from(e: FlattenError) -> Self {
        match e {
            FlattenError::Fetch(e) => ClientError::Fetch(e),
            FlattenError::Parse { location, source } => ClientError::Parse { location, source },
            FlattenError::Import(e) => ClientError::Import(e),
        }
    }
}

impl From<DescriptionError> for ClientError {
    fn from(e: DescriptionError) -> Self {
        ClientError::Engine(EngineError::Description(e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flatten_errors_keep_their_kind() {
        let fetch: ClientError = FlattenError::Fetch(FetchError::NotFound("mem://x".into())).into();
        assert!(matches!(fetch, ClientError::Fetch(FetchError::NotFound(_))));

        let import: ClientError = FlattenError::Import(ImportError::Cycle {
            chain: vec!["a".into(), "b".into(), "a".into()],
        })
        .into();
        assert_eq!(import.to_string(), "import cycle: a -> b -> a");
    }

    #[test]
    fn classification_helpers() {
        let fault = ClientError::Engine(EngineError::Fault {
            code: "soap:Server".into(),
            message: "boom".into(),
        });
        assert!(fault.is_fault());
        assert!(!fault.is_transport());

        let transport = ClientError::Transport(TransportError::Timeout {
            location: "http://h".into(),
        });
        assert!(transport.is_transport());
        assert!(!transport.is_fault());
    }
}
