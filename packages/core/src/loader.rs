//! Interface-document loading.
//!
//! A [`Loader`] turns a location into document text. It performs exactly one
//! fetch per call: no retries and no caching. Deduplication of repeated
//! imports is the job of the [`Flattener`](crate::flatten::Flattener).
//!
//! # Implementations
//!
//! | Type | When to use |
//! |------|-------------|
//! | [`MemoryLoader`] | Tests, offline use, documents bundled with a binary |
//! | `soapflow_client::HttpLoader` | `http(s)://` and `file://` locations |

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use thiserror::Error;

/// Errors that can occur while fetching a single document.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FetchError {
    /// Nothing exists at the location.
    #[error("document not found: {0}")]
    NotFound(String),

    /// The server answered with a status the loader is configured to reject.
    #[error("{location} returned HTTP status {status}")]
    Status { location: String, status: u16 },

    /// The HTTP exchange itself failed.
    #[error("HTTP error fetching {location}: {message}")]
    Http { location: String, message: String },

    /// Reading a local file failed.
    #[error("I/O error reading {location}: {message}")]
    Io { location: String, message: String },

    /// The loader does not know how to fetch this kind of location.
    #[error("unsupported location: {0}")]
    UnsupportedScheme(String),
}

/// Fetches document text by location.
#[async_trait]
pub trait Loader: Send + Sync {
    async fn load(&self, location: &str) -> Result<String, FetchError>;
}

// ---------------------------------------------------------------------------
// MemoryLoader
// ---------------------------------------------------------------------------

/// In-memory [`Loader`] keyed by exact location string.
///
/// Records how many times each location was fetched so callers can assert
/// that shared imports are only loaded once.
#[derive(Debug, Default)]
pub struct MemoryLoader {
    documents: RwLock<HashMap<String, String>>,
    fetches: RwLock<HashMap<String, usize>>,
}

impl MemoryLoader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style [`insert`](Self::insert).
    pub fn with(self, location: impl Into<String>, text: impl Into<String>) -> Self {
        self.insert(location, text);
        self
    }

    /// Register (or replace) the document served at `location`.
    pub fn insert(&self, location: impl Into<String>, text: impl Into<String>) {
        self.documents
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(location.into(), text.into());
    }

    /// Number of `load` calls made for `location`, successful or not.
    pub fn fetch_count(&self, location: &str) -> usize {
        self.fetches
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(location)
            .copied()
            .unwrap_or(0)
    }

    /// Number of `load` calls made across all locations.
    pub fn total_fetches(&self) -> usize {
        self.fetches
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .values()
            .sum()
    }
}

#[async_trait]
impl Loader for MemoryLoader {
    async fn load(&self, location: &str) -> Result<String, FetchError> {
        *self
            .fetches
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .entry(location.to_string())
            .or_insert(0) += 1;

        self.documents
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(location)
            .cloned()
            .ok_or_else(|| FetchError::NotFound(location.to_string()))
    }
}
