//! Client configuration.

use std::collections::BTreeMap;
use std::time::Duration;

use soapflow::SoapVersion;
use thiserror::Error;

/// Options that shape how a [`Client`](crate::Client) builds its engine and
/// talks to the endpoint.
///
/// Every field has a default, so `ClientOptions::default()` is a working
/// configuration. [`ClientOptions::from_env`] reads the same fields from the
/// environment:
///
/// | Variable | Default | Description |
/// |----------|---------|-------------|
/// | `SOAPFLOW_ENDPOINT` | (absent = address in the WSDL) | Endpoint URI override |
/// | `SOAPFLOW_SOAP_VERSION` | `1.1` | `1.1` or `1.2` |
/// | `SOAPFLOW_TIMEOUT_SECS` | (absent = no timeout) | Whole-request HTTP timeout |
/// | `SOAPFLOW_MAX_IN_FLIGHT` | (absent = unbounded) | Concurrent exchange cap |
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClientOptions {
    /// Endpoint to post requests to instead of the service's declared address.
    pub endpoint: Option<String>,

    pub soap_version: SoapVersion,

    /// Declared type name → name reported under `"@type"` in decoded objects.
    pub type_mapping: BTreeMap<String, String>,

    /// Applied to the HTTP client the facade builds itself. Ignored when the
    /// caller supplies its own [`HttpClient`](crate::HttpClient).
    pub timeout: Option<Duration>,

    /// Maximum number of exchanges on the wire at once. Further calls wait.
    pub max_in_flight: Option<usize>,
}

/// An environment variable holds a value that cannot be used.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{var} must be {expected}, got {value:?}")]
pub struct ConfigError {
    pub var: &'static str,
    pub value: String,
    pub expected: &'static str,
}

impl ClientOptions {
    /// Populate options from `SOAPFLOW_*` environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Like [`from_env`](Self::from_env) with a custom variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let invalid = |var: &'static str, value: String, expected: &'static str| ConfigError {
            var,
            value,
            expected,
        };

        let soap_version = match lookup("SOAPFLOW_SOAP_VERSION") {
            Some(v) => v
                .parse()
                .map_err(|_| invalid("SOAPFLOW_SOAP_VERSION", v, "1.1 or 1.2"))?,
            None => SoapVersion::default(),
        };

        let timeout = match lookup("SOAPFLOW_TIMEOUT_SECS") {
            Some(v) => match v.parse::<u64>() {
                Ok(secs) if secs > 0 => Some(Duration::from_secs(secs)),
                _ => return Err(invalid("SOAPFLOW_TIMEOUT_SECS", v, "a positive integer")),
            },
            None => None,
        };

        let max_in_flight = match lookup("SOAPFLOW_MAX_IN_FLIGHT") {
            Some(v) => match v.parse::<usize>() {
                Ok(n) if n > 0 => Some(n),
                _ => return Err(invalid("SOAPFLOW_MAX_IN_FLIGHT", v, "a positive integer")),
            },
            None => None,
        };

        Ok(Self {
            endpoint: lookup("SOAPFLOW_ENDPOINT").filter(|e| !e.is_empty()),
            soap_version,
            type_mapping: BTreeMap::new(),
            timeout,
            max_in_flight,
        })
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    pub fn with_soap_version(mut self, version: SoapVersion) -> Self {
        self.soap_version = version;
        self
    }

    pub fn with_type(mut self, declared: impl Into<String>, mapped: impl Into<String>) -> Self {
        self.type_mapping.insert(declared.into(), mapped.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_max_in_flight(mut self, limit: usize) -> Self {
        self.max_in_flight = Some(limit);
        self
    }
}
