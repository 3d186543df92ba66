//! Transport bridge: moves one SOAP request over HTTP and hands back the
//! response.
//!
//! | Version | `SOAPAction` header | `Content-Type` |
//! |---------|---------------------|----------------|
//! | 1.1 | `"<action>"` | `text/xml; charset=utf-8` |
//! | 1.2 | (none) | `application/soap+xml; charset=utf-8; action="<action>"` |
//!
//! Whatever status the endpoint answers with (redirects and server errors
//! included) comes back as a [`SoapResponse`]. Only failures to complete the
//! exchange become a [`TransportError`].

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::header::{HeaderName, HeaderValue, CONTENT_TYPE};
use soapflow::{SoapRequest, SoapResponse, SoapVersion};
use tokio::sync::Semaphore;
use tracing::debug;

use crate::error::TransportError;
use crate::http::HttpClient;

pub const SOAP_ACTION: HeaderName = HeaderName::from_static("soapaction");

/// Performs SOAP exchanges.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn request(&self, request: SoapRequest) -> Result<SoapResponse, TransportError>;
}

/// Protocol headers for `version`, as `(name, value)` pairs.
pub fn soap_headers(version: SoapVersion, action: &str) -> Vec<(HeaderName, String)> {
    match version {
        SoapVersion::V1_1 => vec![
            (CONTENT_TYPE, "text/xml; charset=utf-8".to_string()),
            (SOAP_ACTION, format!("\"{action}\"")),
        ],
        SoapVersion::V1_2 => vec![(
            CONTENT_TYPE,
            format!("application/soap+xml; charset=utf-8; action=\"{action}\""),
        )],
    }
}

// ---------------------------------------------------------------------------
// HttpTransport
// ---------------------------------------------------------------------------

/// [`Transport`] over the shared [`HttpClient`].
///
/// With a `max_in_flight` limit, requests beyond the limit wait for a free
/// slot before anything is sent.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    http: HttpClient,
    limiter: Option<Arc<Semaphore>>,
}

impl HttpTransport {
    pub fn new(http: HttpClient, max_in_flight: Option<usize>) -> Self {
        Self {
            http,
            limiter: max_in_flight.map(|n| Arc::new(Semaphore::new(n))),
        }
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn request(&self, request: SoapRequest) -> Result<SoapResponse, TransportError> {
        let location = request.location();
        let _permit = match &self.limiter {
            Some(limiter) => Some(limiter.acquire().await.map_err(|e| TransportError::Request {
                location: location.to_string(),
                message: e.to_string(),
            })?),
            None => None,
        };

        let mut builder = self.http.inner().post(location);
        for (name, value) in soap_headers(request.version(), request.action()) {
            let value = HeaderValue::from_str(&value).map_err(|e| TransportError::Request {
                location: location.to_string(),
                message: format!("invalid {name} header: {e}"),
            })?;
            builder = builder.header(name, value);
        }

        debug!(
            "transport: POST {location} ({}, SOAP {})",
            request.operation(),
            request.version()
        );
        let response = builder
            .body(request.payload().to_string())
            .send()
            .await
            .map_err(|e| TransportError::from_reqwest(location, &e))?;

        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|e| TransportError::from_reqwest(location, &e))?;
        debug!("transport: {location} -> {status}, {} bytes", body.len());
        Ok(SoapResponse::new(status, body))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    use axum::{
        http::{HeaderMap, StatusCode},
        response::{IntoResponse, Redirect},
        routing::post,
        Router,
    };
    use tokio::net::TcpListener;

    async fn spawn_mock_server(router: Router) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{addr}")
    }

    /// Server that records the headers of the last request it received.
    async fn spawn_recorder() -> (String, Arc<Mutex<Option<HeaderMap>>>) {
        let seen: Arc<Mutex<Option<HeaderMap>>> = Arc::default();
        let slot = Arc::clone(&seen);
        let app = Router::new().route(
            "/soap",
            post(move |headers: HeaderMap, body: String| {
                let slot = Arc::clone(&slot);
                async move {
                    *slot.lock().unwrap() = Some(headers);
                    body
                }
            }),
        );
        (spawn_mock_server(app).await, seen)
    }

    fn transport() -> HttpTransport {
        HttpTransport::new(HttpClient::new().unwrap(), None)
    }

    #[test]
    fn header_sets_per_version() {
        let v11 = soap_headers(SoapVersion::V1_1, "urn:calc#Add");
        assert_eq!(v11[0], (CONTENT_TYPE, "text/xml; charset=utf-8".to_string()));
        assert_eq!(v11[1], (SOAP_ACTION, "\"urn:calc#Add\"".to_string()));

        let v12 = soap_headers(SoapVersion::V1_2, "urn:calc#Add");
        assert_eq!(v12.len(), 1);
        assert_eq!(
            v12[0].1,
            "application/soap+xml; charset=utf-8; action=\"urn:calc#Add\""
        );
    }

    #[tokio::test]
    async fn soap11_request_carries_soapaction() {
        let (base, seen) = spawn_recorder().await;
        let request = SoapRequest::new("Add", "<e/>", format!("{base}/soap"), SoapVersion::V1_1, "urn:calc#Add");

        let response = transport().request(request).await.unwrap();
        assert_eq!(response.status(), 200);
        assert_eq!(response.payload(), "<e/>");

        let headers = seen.lock().unwrap().clone().unwrap();
        assert_eq!(headers["soapaction"], "\"urn:calc#Add\"");
        assert_eq!(headers["content-type"], "text/xml; charset=utf-8");
    }

    #[tokio::test]
    async fn soap12_request_puts_action_in_content_type() {
        let (base, seen) = spawn_recorder().await;
        let request = SoapRequest::new("Add", "<e/>", format!("{base}/soap"), SoapVersion::V1_2, "urn:calc#Add");

        transport().request(request).await.unwrap();

        let headers = seen.lock().unwrap().clone().unwrap();
        assert!(headers.get("soapaction").is_none());
        assert_eq!(
            headers["content-type"],
            "application/soap+xml; charset=utf-8; action=\"urn:calc#Add\""
        );
    }

    #[tokio::test]
    async fn redirect_and_error_statuses_are_returned_as_is() {
        let target_hits = Arc::new(AtomicUsize::new(0));
        let hits = Arc::clone(&target_hits);
        let app = Router::new()
            .route("/moved", post(|| async { Redirect::to("/target") }))
            .route(
                "/target",
                post(move || {
                    let hits = Arc::clone(&hits);
                    async move {
                        hits.fetch_add(1, Ordering::SeqCst);
                        "target"
                    }
                }),
            )
            .route(
                "/broken",
                post(|| async { (StatusCode::INTERNAL_SERVER_ERROR, "<fault/>").into_response() }),
            );
        let base = spawn_mock_server(app).await;

        let moved = transport()
            .request(SoapRequest::new("Op", "", format!("{base}/moved"), SoapVersion::V1_1, ""))
            .await
            .unwrap();
        assert_eq!(moved.status(), 303);
        assert_eq!(target_hits.load(Ordering::SeqCst), 0);

        let broken = transport()
            .request(SoapRequest::new("Op", "", format!("{base}/broken"), SoapVersion::V1_1, ""))
            .await
            .unwrap();
        assert_eq!(broken.status(), 500);
        assert_eq!(broken.payload(), "<fault/>");
    }

    #[tokio::test]
    async fn refused_connection_is_a_transport_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let err = transport()
            .request(SoapRequest::new("Op", "", format!("http://{addr}/soap"), SoapVersion::V1_1, ""))
            .await
            .unwrap_err();
        assert!(matches!(err, TransportError::Connect { .. }));
    }

    #[tokio::test]
    async fn timeout_is_reported() {
        let app = Router::new().route(
            "/slow",
            post(|| async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                "late"
            }),
        );
        let base = spawn_mock_server(app).await;
        let http = HttpClient::with_timeout(Some(Duration::from_millis(100))).unwrap();

        let err = HttpTransport::new(http, None)
            .request(SoapRequest::new("Op", "", format!("{base}/slow"), SoapVersion::V1_1, ""))
            .await
            .unwrap_err();
        assert!(matches!(err, TransportError::Timeout { .. }));
    }

    #[tokio::test]
    async fn in_flight_limit_caps_concurrency() {
        let current = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let (c, p) = (Arc::clone(&current), Arc::clone(&peak));
        let app = Router::new().route(
            "/soap",
            post(move || {
                let (c, p) = (Arc::clone(&c), Arc::clone(&p));
                async move {
                    let now = c.fetch_add(1, Ordering::SeqCst) + 1;
                    p.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(50)).await;
                    c.fetch_sub(1, Ordering::SeqCst);
                    "ok"
                }
            }),
        );
        let base = spawn_mock_server(app).await;
        let transport = HttpTransport::new(HttpClient::new().unwrap(), Some(2));

        let calls = (0..6).map(|_| {
            transport.request(SoapRequest::new("Op", "", format!("{base}/soap"), SoapVersion::V1_1, ""))
        });
        for result in futures::future::join_all(calls).await {
            assert_eq!(result.unwrap().status(), 200);
        }
        assert!(peak.load(Ordering::SeqCst) <= 2);
    }
}
