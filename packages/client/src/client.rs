//! The client facade.
//!
//! A [`Client`] is cheap to construct: nothing is fetched or parsed until
//! the first call or metadata query. At that point the interface document is
//! loaded, flattened, and handed to the engine factory, exactly once for the
//! lifetime of the client. Clones share that engine, so a client can be
//! cloned into spawned tasks to fan calls out.
//!
//! ```rust,ignore
//! let client = Client::for_wsdl(None, "http://localhost:8080/calc?wsdl", ClientOptions::default())?;
//! let (sum, diff) = tokio::join!(
//!     client.call("Add", vec![json!(1), json!(2)]),
//!     client.call("Subtract", vec![json!(5), json!(3)]),
//! );
//! ```

use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde_json::Value;
use soapflow::{Document, Flattener, Loader, Method, ParseError, Type, INLINE_LOCATION};
use tracing::{debug, info};

use crate::config::ClientOptions;
use crate::engine::{Engine, EngineFactory, SoapEngineFactory};
use crate::error::{ClientError, EngineError};
use crate::http::{HttpClient, HttpLoader};
use crate::lazy::LazyEngine;
use crate::transport::{HttpTransport, Transport};

/// Where a client's interface document comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DocumentSource {
    /// Document text supplied by the caller. Relative imports cannot be
    /// resolved from it; absolute ones are fetched.
    Inline(String),
    /// Absolute location to fetch the document from.
    Location(String),
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct Client {
    engine: Arc<LazyEngine>,
}

impl Client {
    /// Client with the bundled SOAP engine over HTTP.
    ///
    /// When `http` is `None` a client is built from `options.timeout`.
    pub fn new(
        http: Option<HttpClient>,
        source: DocumentSource,
        options: ClientOptions,
    ) -> Result<Self, ClientError> {
        let mut builder = Client::builder(source).options(options);
        if let Some(http) = http {
            builder = builder.http_client(http);
        }
        builder.build()
    }

    /// Shorthand for [`Client::new`] with [`DocumentSource::Location`].
    pub fn for_wsdl(
        http: Option<HttpClient>,
        location: impl Into<String>,
        options: ClientOptions,
    ) -> Result<Self, ClientError> {
        Self::new(http, DocumentSource::Location(location.into()), options)
    }

    /// Client whose engine is produced by `factory`.
    pub fn with_factory(
        source: DocumentSource,
        options: ClientOptions,
        factory: Arc<dyn EngineFactory>,
    ) -> Result<Self, ClientError> {
        Client::builder(source)
            .options(options)
            .engine_factory(factory)
            .build()
    }

    pub fn builder(source: DocumentSource) -> ClientBuilder {
        ClientBuilder {
            source,
            options: ClientOptions::default(),
            http: None,
            loader: None,
            transport: None,
            factory: None,
        }
    }

    /// Invoke `operation` with positional arguments. Never retried.
    pub async fn call(&self, operation: &str, args: Vec<Value>) -> Result<Value, ClientError> {
        let engine = self.engine.get().await?;
        engine.call(operation, args).await
    }

    /// [`call`](Self::call), deserializing the result into `T`.
    pub async fn call_as<T: DeserializeOwned>(
        &self,
        operation: &str,
        args: Vec<Value>,
    ) -> Result<T, ClientError> {
        let value = self.call(operation, args).await?;
        serde_json::from_value(value).map_err(|e| {
            ClientError::Engine(EngineError::Convert {
                operation: operation.to_string(),
                message: e.to_string(),
            })
        })
    }

    /// Callable methods in declaration order.
    pub async fn functions(&self) -> Result<Vec<Method>, ClientError> {
        Ok(self.engine.get().await?.metadata().methods.clone())
    }

    /// Declared types in declaration order.
    pub async fn types(&self) -> Result<Vec<Type>, ClientError> {
        Ok(self.engine.get().await?.metadata().types.clone())
    }

    /// The engine, building it if needed.
    pub async fn engine(&self) -> Result<Arc<dyn Engine>, ClientError> {
        self.engine.get().await
    }

    /// Whether the engine has been built yet.
    pub fn is_ready(&self) -> bool {
        self.engine.is_built()
    }
}

// ---------------------------------------------------------------------------
// ClientBuilder
// ---------------------------------------------------------------------------

/// Assembles a [`Client`] from replaceable parts. Unset parts default to the
/// HTTP implementations sharing one [`HttpClient`].
pub struct ClientBuilder {
    source: DocumentSource,
    options: ClientOptions,
    http: Option<HttpClient>,
    loader: Option<Arc<dyn Loader>>,
    transport: Option<Arc<dyn Transport>>,
    factory: Option<Arc<dyn EngineFactory>>,
}

impl ClientBuilder {
    pub fn options(mut self, options: ClientOptions) -> Self {
        self.options = options;
        self
    }

    pub fn http_client(mut self, http: HttpClient) -> Self {
        self.http = Some(http);
        self
    }

    pub fn loader(mut self, loader: Arc<dyn Loader>) -> Self {
        self.loader = Some(loader);
        self
    }

    /// Transport for the bundled engine. Ignored when a custom engine
    /// factory is set.
    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn engine_factory(mut self, factory: Arc<dyn EngineFactory>) -> Self {
        self.factory = Some(factory);
        self
    }

    pub fn build(self) -> Result<Client, ClientError> {
        let mut http = self.http;
        let loader: Arc<dyn Loader> = match self.loader {
            Some(loader) => loader,
            None => Arc::new(HttpLoader::new(shared_http(&mut http, &self.options)?)),
        };
        let factory: Arc<dyn EngineFactory> = match (self.factory, self.transport) {
            (Some(factory), _) => factory,
            (None, Some(transport)) => Arc::new(SoapEngineFactory::new(transport)),
            (None, None) => {
                let transport = HttpTransport::new(
                    shared_http(&mut http, &self.options)?,
                    self.options.max_in_flight,
                );
                Arc::new(SoapEngineFactory::new(Arc::new(transport)))
            }
        };

        let recipe = Arc::new(Recipe {
            source: self.source,
            options: self.options,
            loader,
            factory,
        });
        let engine = LazyEngine::new(move || {
            let recipe = Arc::clone(&recipe);
            async move { recipe.build().await }
        });
        Ok(Client {
            engine: Arc::new(engine),
        })
    }
}

/// The caller's HTTP client, or one built from `options` and reused for
/// every part that needs it.
fn shared_http(
    http: &mut Option<HttpClient>,
    options: &ClientOptions,
) -> Result<HttpClient, ClientError> {
    if let Some(http) = http {
        return Ok(http.clone());
    }
    let built = HttpClient::with_timeout(options.timeout)?;
    *http = Some(built.clone());
    Ok(built)
}

/// Everything needed to build the engine on first use.
struct Recipe {
    source: DocumentSource,
    options: ClientOptions,
    loader: Arc<dyn Loader>,
    factory: Arc<dyn EngineFactory>,
}

impl Recipe {
    async fn build(&self) -> Result<Arc<dyn Engine>, ClientError> {
        let flattener = Flattener::new(Arc::clone(&self.loader));
        let document = match &self.source {
            DocumentSource::Location(location) => {
                info!("client: loading interface document {location}");
                flattener.flatten(location).await?
            }
            DocumentSource::Inline(text) => {
                debug!("client: using inline interface document");
                let document = Document::inline(text).map_err(|source: ParseError| {
                    ClientError::Parse {
                        location: INLINE_LOCATION.to_string(),
                        source,
                    }
                })?;
                flattener.flatten_document(document).await?
            }
        };
        self.factory.build(document, &self.options).await
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
