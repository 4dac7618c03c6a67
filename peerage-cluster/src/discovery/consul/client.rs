//! Consul agent HTTP transport

use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use reqwest::Client;
use serde_json::Value;
use std::time::Duration;
use url::Url;

use peerage_core::ConsulConfig;

use crate::error::{Error, Result};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// HTTP method used against the registry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistryMethod {
    Get,
    Post,
}

/// A single query argument; arguments without a value are sent as bare keys (`?passing`)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryArg {
    pub key: String,
    pub value: Option<String>,
}

/// Ordered query arguments
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryArgs(Vec<QueryArg>);

impl QueryArgs {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a presence-only flag
    #[must_use]
    pub fn flag(mut self, key: impl Into<String>) -> Self {
        self.0.push(QueryArg {
            key: key.into(),
            value: None,
        });
        self
    }

    /// Append a `key=value` pair
    #[must_use]
    pub fn pair(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.0.push(QueryArg {
            key: key.into(),
            value: Some(value.into()),
        });
        self
    }

    /// Append `token=<acl>` when an ACL token is configured
    #[must_use]
    pub fn with_token(self, token: Option<&str>) -> Self {
        match token {
            Some(token) => self.pair("token", token),
            None => self,
        }
    }

    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.0.iter().any(|arg| arg.key == key)
    }

    /// Value of the first argument named `key`
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|arg| arg.key == key)
            .and_then(|arg| arg.value.as_deref())
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &QueryArg> {
        self.0.iter()
    }
}

/// A request against the registry API, relative to the agent base URL
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistryRequest {
    pub method: RegistryMethod,
    pub path: Vec<String>,
    pub query: QueryArgs,
    pub body: Option<String>,
}

impl RegistryRequest {
    pub fn get<I, S>(path: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            method: RegistryMethod::Get,
            path: path.into_iter().map(Into::into).collect(),
            query: QueryArgs::new(),
            body: None,
        }
    }

    pub fn post<I, S>(path: I, body: String) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            method: RegistryMethod::Post,
            path: path.into_iter().map(Into::into).collect(),
            query: QueryArgs::new(),
            body: Some(body),
        }
    }

    #[must_use]
    pub fn with_query(mut self, query: QueryArgs) -> Self {
        self.query = query;
        self
    }

    /// Path joined with `/`, for logging and matching
    #[must_use]
    pub fn path_string(&self) -> String {
        format!("/{}", self.path.join("/"))
    }
}

/// Transport used to talk to the registry
///
/// Returns the decoded JSON response; an empty successful body decodes to `Value::Null`.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RegistryClient: Send + Sync {
    async fn send(&self, request: RegistryRequest) -> Result<Value>;
}

/// `reqwest`-backed registry client
pub struct HttpRegistryClient {
    client: Client,
    base_url: Url,
}

impl HttpRegistryClient {
    /// Build a client for the agent described by `config`
    pub fn new(config: &ConsulConfig) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| Error::Configuration(format!("Failed to build registry HTTP client: {e}")))?;

        Self::with_client(client, &config.base_url())
    }

    /// Use an existing `reqwest` client against `base_url`
    pub fn with_client(client: Client, base_url: &str) -> Result<Self> {
        let base_url = Url::parse(base_url)
            .map_err(|e| Error::Configuration(format!("Invalid registry URL '{base_url}': {e}")))?;
        if base_url.cannot_be_a_base() {
            return Err(Error::Configuration(format!(
                "Registry URL '{base_url}' cannot carry a path"
            )));
        }
        Ok(Self { client, base_url })
    }

    /// Resolve a request to a full URL
    pub fn build_url(&self, request: &RegistryRequest) -> Result<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| Error::Configuration(format!("Registry URL '{}' cannot carry a path", self.base_url)))?
            .clear()
            .extend(&request.path);

        if !request.query.is_empty() {
            let mut pairs = url.query_pairs_mut();
            for arg in request.query.iter() {
                match &arg.value {
                    Some(value) => pairs.append_pair(&arg.key, value),
                    None => pairs.append_key_only(&arg.key),
                };
            }
        }

        Ok(url)
    }
}

#[async_trait]
impl RegistryClient for HttpRegistryClient {
    async fn send(&self, request: RegistryRequest) -> Result<Value> {
        let url = self.build_url(&request)?;
        tracing::trace!(method = ?request.method, %url, "Registry request");

        let builder = match request.method {
            RegistryMethod::Get => self.client.get(url),
            RegistryMethod::Post => self.client.post(url),
        };
        let builder = match request.body {
            Some(body) => builder.header(CONTENT_TYPE, "application/json").body(body),
            None => builder,
        };

        let response = builder.send().await?;
        let status = response.status();
        let bytes = response.bytes().await?;

        if !status.is_success() {
            return Err(Error::Registry {
                status: status.as_u16(),
                reason: String::from_utf8_lossy(&bytes).trim().to_string(),
            });
        }

        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Ok(Value::Null);
        }

        Ok(serde_json::from_slice(&bytes)?)
    }
}
