//! SOAP engines: the part of a client that knows how to turn a call into a
//! request and a response into a result.
//!
//! An [`Engine`] is built once per client from the flattened interface
//! document by an [`EngineFactory`]. [`SoapEngineFactory`] builds the
//! bundled [`SoapEngine`]; other engines can be plugged in through
//! [`ClientBuilder::engine_factory`](crate::ClientBuilder::engine_factory).

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use soapflow::{
    decode_response, encode_call, Document, EnvelopeError, Metadata, ServiceDescription,
    SoapRequest, SoapVersion,
};
use tracing::{debug, info, warn};

use crate::config::ClientOptions;
use crate::error::{ClientError, EngineError};
use crate::transport::Transport;

/// Invokes operations of one service.
#[async_trait]
pub trait Engine: Send + Sync {
    /// Call `operation` with positional arguments.
    async fn call(&self, operation: &str, args: Vec<Value>) -> Result<Value, ClientError>;

    /// Methods and types, in declaration order.
    fn metadata(&self) -> &Metadata;
}

/// Builds an [`Engine`] from a flattened interface document.
#[async_trait]
pub trait EngineFactory: Send + Sync {
    async fn build(
        &self,
        document: Document,
        options: &ClientOptions,
    ) -> Result<Arc<dyn Engine>, ClientError>;
}

// ---------------------------------------------------------------------------
// SoapEngine
// ---------------------------------------------------------------------------

/// The bundled engine: [`ServiceDescription`] plus the envelope codec, over
/// any [`Transport`].
pub struct SoapEngine {
    description: ServiceDescription,
    metadata: Metadata,
    transport: Arc<dyn Transport>,
    endpoint: Option<String>,
    version: SoapVersion,
    type_mapping: BTreeMap<String, String>,
}

impl SoapEngine {
    pub fn new(
        description: ServiceDescription,
        transport: Arc<dyn Transport>,
        options: &ClientOptions,
    ) -> Self {
        let endpoint = options.endpoint.clone().or_else(|| {
            description
                .endpoint(options.soap_version)
                .map(str::to_string)
        });
        Self {
            metadata: description.metadata(),
            description,
            transport,
            endpoint,
            version: options.soap_version,
            type_mapping: options.type_mapping.clone(),
        }
    }

    pub fn description(&self) -> &ServiceDescription {
        &self.description
    }

    /// Where requests are posted, if known.
    pub fn endpoint(&self) -> Option<&str> {
        self.endpoint.as_deref()
    }
}

#[async_trait]
impl Engine for SoapEngine {
    async fn call(&self, name: &str, args: Vec<Value>) -> Result<Value, ClientError> {
        let operation = self
            .description
            .operation(name)
            .ok_or_else(|| EngineError::UnknownOperation(name.to_string()))?;
        let endpoint = self
            .endpoint
            .as_deref()
            .ok_or_else(|| EngineError::NoEndpoint(name.to_string()))?;

        let payload = encode_call(self.version, &self.description, operation, &args).map_err(
            |source| EngineError::Encode {
                operation: name.to_string(),
                source,
            },
        )?;
        let request = SoapRequest::new(
            name,
            payload,
            endpoint,
            self.version,
            operation.action.clone(),
        );

        let response = self.transport.request(request).await?;
        let status = response.status();
        debug!("engine: {name} answered with HTTP {status}");

        decode_response(
            response.payload(),
            &self.description,
            operation,
            &self.type_mapping,
        )
        .map_err(|e| match e {
            EnvelopeError::Fault { code, message } => {
                warn!("engine: {name} faulted: {code}: {message}");
                ClientError::Engine(EngineError::Fault { code, message })
            }
            source => ClientError::Engine(EngineError::Decode {
                operation: name.to_string(),
                status,
                source,
            }),
        })
    }

    fn metadata(&self) -> &Metadata {
        &self.metadata
    }
}

// ---------------------------------------------------------------------------
// SoapEngineFactory
// ---------------------------------------------------------------------------

/// Builds [`SoapEngine`]s that share one transport.
pub struct SoapEngineFactory {
    transport: Arc<dyn Transport>,
}

impl SoapEngineFactory {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self { transport }
    }
}

#[async_trait]
impl EngineFactory for SoapEngineFactory {
    async fn build(
        &self,
        document: Document,
        options: &ClientOptions,
    ) -> Result<Arc<dyn Engine>, ClientError> {
        let description = ServiceDescription::from_document(&document)?;
        let engine = SoapEngine::new(description, Arc::clone(&self.transport), options);
        info!(
            "engine: built for {} ({} operations, endpoint {})",
            document.location(),
            engine.metadata().methods.len(),
            engine.endpoint().unwrap_or("<none>")
        );
        Ok(Arc::new(engine))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::Mutex;

    use serde_json::json;
    use soapflow::envelope::{fault_envelope, response_envelope};
    use soapflow::{Element, SoapResponse};

    use crate::error::TransportError;

    const WSDL: &str = r#"<definitions xmlns="http://schemas.xmlsoap.org/wsdl/"
    xmlns:soap="http://schemas.xmlsoap.org/wsdl/soap/"
    xmlns:xsd="http://www.w3.org/2001/XMLSchema"
    xmlns:tns="urn:calc" targetNamespace="urn:calc">
  <types>
    <xsd:schema targetNamespace="urn:calc" elementFormDefault="qualified">
      <xsd:element name="Add"><xsd:complexType><xsd:sequence>
        <xsd:element name="a" type="xsd:int"/><xsd:element name="b" type="xsd:int"/>
      </xsd:sequence></xsd:complexType></xsd:element>
      <xsd:element name="AddResponse"><xsd:complexType><xsd:sequence>
        <xsd:element name="AddResult" type="xsd:int"/>
      </xsd:sequence></xsd:complexType></xsd:element>
    </xsd:schema>
  </types>
  <message name="AddIn"><part name="parameters" element="tns:Add"/></message>
  <message name="AddOut"><part name="parameters" element="tns:AddResponse"/></message>
  <portType name="P">
    <operation name="Add"><input message="tns:AddIn"/><output message="tns:AddOut"/></operation>
  </portType>
  <binding name="B" type="tns:P">
    <soap:binding style="document" transport="http://schemas.xmlsoap.org/soap/http"/>
    <operation name="Add"><soap:operation soapAction="urn:calc#Add"/></operation>
  </binding>
  <service name="Calc">
    <port name="CalcPort" binding="tns:B"><soap:address location="http://calc.invalid/soap"/></port>
  </service>
</definitions>"#;

    /// Transport that answers every request with a canned response and
    /// remembers what it was asked.
    struct Canned {
        response: SoapResponse,
        seen: Mutex<Vec<SoapRequest>>,
    }

    impl Canned {
        fn new(status: u16, payload: String) -> Arc<Self> {
            Arc::new(Self {
                response: SoapResponse::new(status, payload),
                seen: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl Transport for Canned {
        async fn request(&self, request: SoapRequest) -> Result<SoapResponse, TransportError> {
            self.seen.lock().unwrap().push(request);
            Ok(self.response.clone())
        }
    }

    async fn engine(transport: Arc<Canned>, options: ClientOptions) -> Arc<dyn Engine> {
        let document = Document::inline(WSDL).unwrap();
        SoapEngineFactory::new(transport)
            .build(document, &options)
            .await
            .unwrap()
    }

    fn add_response(result: i64) -> String {
        response_envelope(
            SoapVersion::V1_1,
            Element::new("AddResponse")
                .with_attr("xmlns", "urn:calc")
                .with_child(Element::new("AddResult").with_text(result.to_string())),
        )
    }

    #[tokio::test]
    async fn call_round_trips_through_transport() {
        let transport = Canned::new(200, add_response(3));
        let engine = engine(Arc::clone(&transport), ClientOptions::default()).await;

        let result = engine.call("Add", vec![json!(1), json!(2)]).await.unwrap();
        assert_eq!(result, json!(3));

        let seen = transport.seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].location(), "http://calc.invalid/soap");
        assert_eq!(seen[0].action(), "urn:calc#Add");
        assert!(seen[0].payload().contains("<tns:a>1</tns:a>"));
    }

    #[tokio::test]
    async fn endpoint_option_overrides_declared_address() {
        let transport = Canned::new(200, add_response(3));
        let options = ClientOptions::default().with_endpoint("http://override.invalid/calc");
        let engine = engine(Arc::clone(&transport), options).await;

        engine.call("Add", vec![json!(1), json!(2)]).await.unwrap();
        assert_eq!(
            transport.seen.lock().unwrap()[0].location(),
            "http://override.invalid/calc"
        );
    }

    #[tokio::test]
    async fn unknown_operation_is_rejected_before_sending() {
        let transport = Canned::new(200, add_response(0));
        let engine = engine(Arc::clone(&transport), ClientOptions::default()).await;

        let err = engine.call("Multiply", vec![]).await.unwrap_err();
        assert!(matches!(
            err,
            ClientError::Engine(EngineError::UnknownOperation(ref op)) if op == "Multiply"
        ));
        assert!(transport.seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn fault_is_distinguishable() {
        let transport = Canned::new(500, fault_envelope(SoapVersion::V1_1, "soap:Server", "overflow"));
        let engine = engine(transport, ClientOptions::default()).await;

        let err = engine.call("Add", vec![json!(1), json!(2)]).await.unwrap_err();
        assert!(err.is_fault());
    }

    #[tokio::test]
    async fn undecodable_response_reports_status() {
        let transport = Canned::new(302, String::new());
        let engine = engine(transport, ClientOptions::default()).await;

        let err = engine.call("Add", vec![json!(1), json!(2)]).await.unwrap_err();
        assert!(matches!(
            err,
            ClientError::Engine(EngineError::Decode { status: 302, .. })
        ));
    }

    #[tokio::test]
    async fn metadata_lists_operations() {
        let engine = engine(Canned::new(200, String::new()), ClientOptions::default()).await;
        let names: Vec<&str> = engine
            .metadata()
            .methods
            .iter()
            .map(|m| m.name.as_str())
            .collect();
        assert_eq!(names, vec!["Add"]);
    }
}
