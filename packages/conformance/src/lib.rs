//! Shared helpers for the soapflow conformance test suite.
//!
//! Provides [`spawn_calculator`]: an in-process SOAP calculator bound to an
//! ephemeral port on `127.0.0.1`, serving its own WSDL (whole and split
//! across three documents) and answering `Add`, `Subtract`, and `Divide`
//! over SOAP 1.1 and 1.2. The returned [`Calculator`] exposes counters and
//! the last request headers so tests can observe what went over the wire.
//!
//! | Route | Behaviour |
//! |-------|-----------|
//! | `GET /calc.wsdl` | Complete WSDL, one document |
//! | `GET /split/root.wsdl` | WSDL importing `messages.wsdl`, which includes `types.xsd` |
//! | `POST /soap`, `POST /soap12` | SOAP endpoints (1.1 and 1.2 ports) |
//! | `POST /moved` | `302 Found` pointing at `/soap` |

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::{
    extract::{Path, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use soapflow::envelope::{fault_envelope, response_envelope};
use soapflow::{Element, SoapVersion};

pub const CALC_NS: &str = "urn:soapflow:calculator";

/// How long `Add` takes to answer, so concurrent calls overlap.
pub const ADD_DELAY: Duration = Duration::from_millis(100);

// ---------------------------------------------------------------------------
// Calculator handle
// ---------------------------------------------------------------------------

/// A running mock calculator service.
#[derive(Clone)]
pub struct Calculator {
    pub base_url: String,
    state: Arc<ServiceState>,
}

impl Calculator {
    /// Location of the single-document WSDL.
    pub fn wsdl_url(&self) -> String {
        format!("{}/calc.wsdl", self.base_url)
    }

    /// Location of the WSDL whose parts are spread over several documents.
    pub fn split_wsdl_url(&self) -> String {
        format!("{}/split/root.wsdl", self.base_url)
    }

    /// SOAP 1.1 endpoint.
    pub fn endpoint(&self) -> String {
        format!("{}/soap", self.base_url)
    }

    /// Endpoint that redirects to [`endpoint`](Self::endpoint).
    pub fn moved_endpoint(&self) -> String {
        format!("{}/moved", self.base_url)
    }

    /// Number of GETs served for `path` (e.g. `"/calc.wsdl"`).
    pub fn fetches(&self, path: &str) -> usize {
        self.state
            .fetches
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(path)
            .copied()
            .unwrap_or(0)
    }

    /// Number of requests that reached a SOAP endpoint.
    pub fn soap_requests(&self) -> usize {
        self.state.soap_requests.load(Ordering::SeqCst)
    }

    /// Headers of the most recent SOAP request.
    pub fn last_headers(&self) -> Option<HeaderMap> {
        self.state
            .last_headers
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

struct ServiceState {
    documents: HashMap<String, String>,
    fetches: Mutex<HashMap<String, usize>>,
    soap_requests: AtomicUsize,
    last_headers: Mutex<Option<HeaderMap>>,
}

/// Start the calculator on an ephemeral port.
///
/// # Panics
///
/// Panics if the TCP listener cannot be bound.
pub async fn spawn_calculator() -> Calculator {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind ephemeral port");
    let addr = listener.local_addr().expect("get local addr");
    let base_url = format!("http://{addr}");

    let documents = HashMap::from([
        ("calc.wsdl".to_string(), calculator_wsdl(&base_url)),
        ("split/root.wsdl".to_string(), split_root_wsdl(&base_url)),
        ("split/messages.wsdl".to_string(), split_messages_wsdl()),
        ("split/types.xsd".to_string(), types_schema()),
    ]);
    let state = Arc::new(ServiceState {
        documents,
        fetches: Mutex::default(),
        soap_requests: AtomicUsize::new(0),
        last_headers: Mutex::default(),
    });

    let router = Router::new()
        .route("/soap", post(soap))
        .route("/soap12", post(soap))
        .route("/moved", post(moved))
        .route("/{*path}", get(document))
        .with_state(Arc::clone(&state));

    tokio::spawn(async move {
        axum::serve(listener, router)
            .await
            .expect("calculator service error");
    });

    Calculator { base_url, state }
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

async fn document(State(state): State<Arc<ServiceState>>, Path(path): Path<String>) -> Response {
    *state
        .fetches
        .lock()
        .unwrap_or_else(|e| e.into_inner())
        .entry(format!("/{path}"))
        .or_insert(0) += 1;

    match state.documents.get(&path) {
        Some(text) => ([(header::CONTENT_TYPE, "text/xml")], text.clone()).into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

async fn moved() -> Response {
    (StatusCode::FOUND, [(header::LOCATION, "/soap")]).into_response()
}

async fn soap(State(state): State<Arc<ServiceState>>, headers: HeaderMap, body: String) -> Response {
    state.soap_requests.fetch_add(1, Ordering::SeqCst);
    let version = match headers.get(header::CONTENT_TYPE).and_then(|v| v.to_str().ok()) {
        Some(ct) if ct.starts_with("application/soap+xml") => SoapVersion::V1_2,
        _ => SoapVersion::V1_1,
    };
    *state.last_headers.lock().unwrap_or_else(|e| e.into_inner()) = Some(headers);

    let (sender_code, receiver_code) = match version {
        SoapVersion::V1_1 => ("soapenv:Client", "soapenv:Server"),
        SoapVersion::V1_2 => ("soapenv:Sender", "soapenv:Receiver"),
    };
    let fault = |code: &str, message: &str| {
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            [(header::CONTENT_TYPE, content_type(version))],
            fault_envelope(version, code, message),
        )
            .into_response()
    };

    let Some((operation, a, b)) = parse_call(&body) else {
        return fault(sender_code, "malformed request");
    };
    let result = match operation.as_str() {
        "Add" => {
            tokio::time::sleep(ADD_DELAY).await;
            a + b
        }
        "Subtract" => a - b,
        "Divide" if b == 0 => return fault(receiver_code, "division by zero"),
        "Divide" => a / b,
        other => return fault(sender_code, &format!("unknown operation {other}")),
    };

    let payload = Element::new(format!("tns:{operation}Response"))
        .with_attr("xmlns:tns", CALC_NS)
        .with_child(Element::new(format!("tns:{operation}Result")).with_text(result.to_string()));
    (
        [(header::CONTENT_TYPE, content_type(version))],
        response_envelope(version, payload),
    )
        .into_response()
}

fn content_type(version: SoapVersion) -> &'static str {
    match version {
        SoapVersion::V1_1 => "text/xml; charset=utf-8",
        SoapVersion::V1_2 => "application/soap+xml; charset=utf-8",
    }
}

/// Operation name and the two integer operands of a request envelope.
fn parse_call(body: &str) -> Option<(String, i64, i64)> {
    let envelope = Element::parse(body).ok()?;
    let call = envelope.child("Body")?.elements().next()?;
    let operand = |name: &str| call.child(name)?.text().trim().parse::<i64>().ok();
    Some((call.local_name().to_string(), operand("a")?, operand("b")?))
}

// ---------------------------------------------------------------------------
// Documents
// ---------------------------------------------------------------------------

const OPERATIONS: [&str; 3] = ["Add", "Subtract", "Divide"];

fn schema_body() -> String {
    let mut out = String::from(
        r#"<xsd:complexType name="Operands"><xsd:sequence><xsd:element name="a" type="xsd:int"/><xsd:element name="b" type="xsd:int"/></xsd:sequence></xsd:complexType>"#,
    );
    for op in OPERATIONS {
        out.push_str(&format!(
            r#"<xsd:element name="{op}" type="tns:Operands"/><xsd:element name="{op}Response"><xsd:complexType><xsd:sequence><xsd:element name="{op}Result" type="xsd:int"/></xsd:sequence></xsd:complexType></xsd:element>"#
        ));
    }
    out
}

fn messages() -> String {
    OPERATIONS
        .iter()
        .map(|op| {
            format!(
                r#"<wsdl:message name="{op}SoapIn"><wsdl:part name="parameters" element="tns:{op}"/></wsdl:message><wsdl:message name="{op}SoapOut"><wsdl:part name="parameters" element="tns:{op}Response"/></wsdl:message>"#
            )
        })
        .collect()
}

/// Port type, both bindings, and the service with its two ports.
fn interface(base_url: &str) -> String {
    let mut port_type = String::from(r#"<wsdl:portType name="CalculatorSoap">"#);
    let mut soap11 = String::from(
        r#"<wsdl:binding name="CalculatorSoap" type="tns:CalculatorSoap"><soap:binding transport="http://schemas.xmlsoap.org/soap/http" style="document"/>"#,
    );
    let mut soap12 = String::from(
        r#"<wsdl:binding name="CalculatorSoap12" type="tns:CalculatorSoap"><soap12:binding transport="http://schemas.xmlsoap.org/soap/http" style="document"/>"#,
    );
    for op in OPERATIONS {
        port_type.push_str(&format!(
            r#"<wsdl:operation name="{op}"><wsdl:input message="tns:{op}SoapIn"/><wsdl:output message="tns:{op}SoapOut"/></wsdl:operation>"#
        ));
        let body = r#"<wsdl:input><soap:body use="literal"/></wsdl:input><wsdl:output><soap:body use="literal"/></wsdl:output>"#;
        soap11.push_str(&format!(
            r#"<wsdl:operation name="{op}"><soap:operation soapAction="{CALC_NS}#{op}" style="document"/>{body}</wsdl:operation>"#
        ));
        soap12.push_str(&format!(
            r#"<wsdl:operation name="{op}"><soap12:operation soapAction="{CALC_NS}#{op}" style="document"/>{body}</wsdl:operation>"#
        ));
    }
    port_type.push_str("</wsdl:portType>");
    soap11.push_str("</wsdl:binding>");
    soap12.push_str("</wsdl:binding>");

    format!(
        r#"{port_type}{soap11}{soap12}<wsdl:service name="Calculator"><wsdl:port name="CalculatorSoap" binding="tns:CalculatorSoap"><soap:address location="{base_url}/soap"/></wsdl:port><wsdl:port name="CalculatorSoap12" binding="tns:CalculatorSoap12"><soap12:address location="{base_url}/soap12"/></wsdl:port></wsdl:service>"#
    )
}

fn definitions(body: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="utf-8"?>
<wsdl:definitions xmlns:wsdl="http://schemas.xmlsoap.org/wsdl/" xmlns:soap="http://schemas.xmlsoap.org/wsdl/soap/" xmlns:soap12="http://schemas.xmlsoap.org/wsdl/soap12/" xmlns:xsd="http://www.w3.org/2001/XMLSchema" xmlns:tns="{CALC_NS}" targetNamespace="{CALC_NS}">{body}</wsdl:definitions>"#
    )
}

fn calculator_wsdl(base_url: &str) -> String {
    definitions(&format!(
        r#"<wsdl:types><xsd:schema elementFormDefault="qualified" targetNamespace="{CALC_NS}">{}</xsd:schema></wsdl:types>{}{}"#,
        schema_body(),
        messages(),
        interface(base_url)
    ))
}

fn split_root_wsdl(base_url: &str) -> String {
    definitions(&format!(
        r#"<wsdl:import namespace="{CALC_NS}" location="messages.wsdl"/>{}"#,
        interface(base_url)
    ))
}

fn split_messages_wsdl() -> String {
    definitions(&format!(
        r#"<wsdl:types><xsd:schema elementFormDefault="qualified" targetNamespace="{CALC_NS}"><xsd:include schemaLocation="types.xsd"/></xsd:schema></wsdl:types>{}"#,
        messages()
    ))
}

fn types_schema() -> String {
    format!(
        r#"<?xml version="1.0" encoding="utf-8"?>
<xsd:schema xmlns:xsd="http://www.w3.org/2001/XMLSchema" xmlns:tns="{CALC_NS}" elementFormDefault="qualified" targetNamespace="{CALC_NS}">{}</xsd:schema>"#,
        schema_body()
    )
}
