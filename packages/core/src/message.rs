//! Request and response values exchanged with a transport.
//!
//! Both are immutable once built: an engine creates a [`SoapRequest`], hands
//! it to the transport, and receives a [`SoapResponse`] by value.

use crate::envelope::SoapVersion;

/// One outgoing SOAP exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SoapRequest {
    operation: String,
    payload: String,
    location: String,
    version: SoapVersion,
    action: String,
}

impl SoapRequest {
    pub fn new(
        operation: impl Into<String>,
        payload: impl Into<String>,
        location: impl Into<String>,
        version: SoapVersion,
        action: impl Into<String>,
    ) -> Self {
        Self {
            operation: operation.into(),
            payload: payload.into(),
            location: location.into(),
            version,
            action: action.into(),
        }
    }

    /// Name of the operation being invoked. Used for logging only.
    pub fn operation(&self) -> &str {
        &self.operation
    }

    /// Serialized envelope.
    pub fn payload(&self) -> &str {
        &self.payload
    }

    /// Endpoint URI the request is posted to.
    pub fn location(&self) -> &str {
        &self.location
    }

    pub fn version(&self) -> SoapVersion {
        self.version
    }

    /// SOAP action; may be empty.
    pub fn action(&self) -> &str {
        &self.action
    }
}

/// What came back from the endpoint, whatever the status code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SoapResponse {
    status: u16,
    payload: String,
}

impl SoapResponse {
    pub fn new(status: u16, payload: impl Into<String>) -> Self {
        Self {
            status,
            payload: payload.into(),
        }
    }

    pub fn status(&self) -> u16 {
        self.status
    }

    pub fn payload(&self) -> &str {
        &self.payload
    }

    pub fn into_payload(self) -> String {
        self.payload
    }

    /// `true` for 2xx statuses.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}
