//! Call-by-name convenience over a [`Client`].

use serde_json::Value;

use crate::client::Client;
use crate::error::ClientError;

/// Forwards calls to a [`Client`] by operation name.
#[derive(Debug, Clone)]
pub struct Proxy {
    client: Client,
}

impl Proxy {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    pub async fn call(&self, operation: &str, args: Vec<Value>) -> Result<Value, ClientError> {
        self.client.call(operation, args).await
    }

    /// A handle bound to one operation. The name is checked on first call.
    pub fn operation(&self, name: impl Into<String>) -> Operation {
        Operation {
            client: self.client.clone(),
            name: name.into(),
        }
    }

    pub fn client(&self) -> &Client {
        &self.client
    }
}

/// One operation of a service, callable with positional arguments.
#[derive(Debug, Clone)]
pub struct Operation {
    client: Client,
    name: String,
}

impl Operation {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub async fn call(&self, args: Vec<Value>) -> Result<Value, ClientError> {
        self.client.call(&self.name, args).await
    }
}
