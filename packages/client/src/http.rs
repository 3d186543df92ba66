//! Shared HTTP client and the HTTP/file document loader.
//!
//! [`HttpClient`] is the one place the client's HTTP policy is applied:
//! redirects are never followed and error statuses are handed back to the
//! caller rather than turned into errors. Both the transport and the loader
//! go through it, so they pool connections together.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{redirect, Url};
use soapflow::{FetchError, Loader};
use tracing::debug;

// ---------------------------------------------------------------------------
// HttpClient
// ---------------------------------------------------------------------------

/// Cloneable handle to a pooled `reqwest::Client` with the soapflow policy.
#[derive(Debug, Clone)]
pub struct HttpClient {
    inner: reqwest::Client,
}

impl HttpClient {
    /// Client with no timeout.
    pub fn new() -> Result<Self, reqwest::Error> {
        Self::from_builder(reqwest::Client::builder())
    }

    /// Client whose requests fail with a timeout after `timeout`, if given.
    pub fn with_timeout(timeout: Option<Duration>) -> Result<Self, reqwest::Error> {
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        Self::from_builder(builder)
    }

    /// Apply the redirect policy to a caller-configured builder.
    pub fn from_builder(builder: reqwest::ClientBuilder) -> Result<Self, reqwest::Error> {
        let inner = builder.redirect(redirect::Policy::none()).build()?;
        Ok(Self { inner })
    }

    pub fn inner(&self) -> &reqwest::Client {
        &self.inner
    }
}

// ---------------------------------------------------------------------------
// HttpLoader
// ---------------------------------------------------------------------------

/// [`Loader`] for `http://`, `https://`, and `file://` locations.
///
/// Performs exactly one round trip per `load`. Whether a non-2xx status is a
/// failure is up to the caller: by default it is reported as
/// [`FetchError::Status`]; with [`accept_error_status`](Self::accept_error_status)
/// the body is returned whatever the status.
#[derive(Debug, Clone)]
pub struct HttpLoader {
    http: HttpClient,
    reject_error_status: bool,
}

impl HttpLoader {
    pub fn new(http: HttpClient) -> Self {
        Self {
            http,
            reject_error_status: true,
        }
    }

    /// Return response bodies even for non-2xx statuses.
    pub fn accept_error_status(mut self) -> Self {
        self.reject_error_status = false;
        self
    }

    async fn load_http(&self, location: &str) -> Result<String, FetchError> {
        let http_err = |e: reqwest::Error| FetchError::Http {
            location: location.to_string(),
            message: e.to_string(),
        };

        let response = self.http.inner().get(location).send().await.map_err(http_err)?;
        let status = response.status();
        debug!("loader: GET {location} -> {}", status.as_u16());
        if self.reject_error_status && !status.is_success() {
            return Err(FetchError::Status {
                location: location.to_string(),
                status: status.as_u16(),
            });
        }
        response.text().await.map_err(http_err)
    }

    async fn load_file(&self, url: &Url) -> Result<String, FetchError> {
        let path = url
            .to_file_path()
            .map_err(|_| FetchError::UnsupportedScheme(url.to_string()))?;
        debug!("loader: reading {}", path.display());
        tokio::fs::read_to_string(&path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                FetchError::NotFound(url.to_string())
            } else {
                FetchError::Io {
                    location: url.to_string(),
                    message: e.to_string(),
                }
            }
        })
    }
}

#[async_trait]
impl Loader for HttpLoader {
    async fn load(&self, location: &str) -> Result<String, FetchError> {
        let url =
            Url::parse(location).map_err(|_| FetchError::UnsupportedScheme(location.to_string()))?;
        match url.scheme() {
            "http" | "https" => self.load_http(location).await,
            "file" => self.load_file(&url).await,
            _ => Err(FetchError::UnsupportedScheme(location.to_string())),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    use axum::{http::StatusCode, response::Redirect, routing::get, Router};
    use tokio::net::TcpListener;

    /// Spawn a loopback axum server and return its base URL.
    async fn spawn_mock_server(router: Router) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{addr}")
    }

    #[tokio::test]
    async fn loads_document_over_http() {
        let app = Router::new().route("/calc.wsdl", get(|| async { "<definitions/>" }));
        let base = spawn_mock_server(app).await;

        let loader = HttpLoader::new(HttpClient::new().unwrap());
        let text = loader.load(&format!("{base}/calc.wsdl")).await.unwrap();
        assert_eq!(text, "<definitions/>");
    }

    #[tokio::test]
    async fn error_status_policy_is_configurable() {
        let app = Router::new().route(
            "/gone.wsdl",
            get(|| async { (StatusCode::NOT_FOUND, "<error/>") }),
        );
        let base = spawn_mock_server(app).await;
        let location = format!("{base}/gone.wsdl");

        let strict = HttpLoader::new(HttpClient::new().unwrap());
        assert_eq!(
            strict.load(&location).await,
            Err(FetchError::Status {
                location: location.clone(),
                status: 404
            })
        );

        let lenient = HttpLoader::new(HttpClient::new().unwrap()).accept_error_status();
        assert_eq!(lenient.load(&location).await.unwrap(), "<error/>");
    }

    #[tokio::test]
    async fn redirects_are_not_followed() {
        let app = Router::new()
            .route("/old.wsdl", get(|| async { Redirect::temporary("/new.wsdl") }))
            .route("/new.wsdl", get(|| async { "<definitions/>" }));
        let base = spawn_mock_server(app).await;

        let loader = HttpLoader::new(HttpClient::new().unwrap());
        let err = loader.load(&format!("{base}/old.wsdl")).await.unwrap_err();
        assert!(matches!(err, FetchError::Status { status: 307, .. }));
    }

    #[tokio::test]
    async fn reads_file_urls() {
        let dir = std::env::temp_dir().join(format!("soapflow-loader-{}", std::process::id()));
        tokio::fs::create_dir_all(&dir).await.unwrap();
        let path = dir.join("local.wsdl");
        tokio::fs::write(&path, "<definitions/>").await.unwrap();

        let loader = HttpLoader::new(HttpClient::new().unwrap());
        let url = Url::from_file_path(&path).unwrap();
        assert_eq!(loader.load(url.as_str()).await.unwrap(), "<definitions/>");

        let missing = Url::from_file_path(dir.join("missing.wsdl")).unwrap();
        assert!(matches!(
            loader.load(missing.as_str()).await,
            Err(FetchError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn unknown_schemes_are_unsupported() {
        let loader = HttpLoader::new(HttpClient::new().unwrap());
        assert!(matches!(
            loader.load("ftp://example.com/a.wsdl").await,
            Err(FetchError::UnsupportedScheme(_))
        ));
        assert!(matches!(
            loader.load("not a url").await,
            Err(FetchError::UnsupportedScheme(_))
        ));
    }
}
