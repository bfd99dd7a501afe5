//! HTTP transport used by `AuthClient`.

use futures::future::BoxFuture;
use reqwest::Method;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use url::Url;

use super::error::ClientError;

/// An outgoing API request. `path` is relative to the transport's base URL.
#[derive(Debug, Clone)]
pub struct ClientRequest {
    pub method: Method,
    pub path: String,
    pub body: Option<serde_json::Value>,
    /// Access token for the `Authorization: Bearer` header
    pub bearer: Option<String>,
}

impl ClientRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            body: None,
            bearer: None,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn post(path: impl Into<String>, body: serde_json::Value) -> Self {
        Self::new(Method::POST, path).with_body(body)
    }

    pub fn with_body(mut self, body: serde_json::Value) -> Self {
        self.body = Some(body);
        self
    }
}

#[derive(Debug, Clone)]
pub struct ClientResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

#[derive(Deserialize)]
struct ErrorBody {
    error: String,
}

#[derive(Deserialize)]
struct Envelope<T> {
    data: T,
}

impl ClientResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn json<T: DeserializeOwned>(&self) -> Result<T, ClientError> {
        Ok(serde_json::from_slice(&self.body)?)
    }

    /// Unwrap `{success, data}` from a successful response, or turn the
    /// `{error}` envelope into `ClientError::Status`.
    pub fn into_data<T: DeserializeOwned>(self) -> Result<T, ClientError> {
        self.ensure_success()?;
        let envelope: Envelope<T> = self.json()?;
        Ok(envelope.data)
    }

    pub fn ensure_success(&self) -> Result<(), ClientError> {
        if self.is_success() {
            return Ok(());
        }
        let error = self
            .json::<ErrorBody>()
            .map(|b| b.error)
            .unwrap_or_else(|_| String::from_utf8_lossy(&self.body).into_owned());
        Err(ClientError::Status {
            status: self.status,
            error,
        })
    }
}

/// Sends requests on behalf of `AuthClient`.
pub trait Transport: Send + Sync {
    fn send(&self, request: ClientRequest) -> BoxFuture<'_, Result<ClientResponse, ClientError>>;
}

/// `Transport` over HTTP with reqwest.
pub struct ReqwestTransport {
    http: reqwest::Client,
    base_url: Url,
}

impl ReqwestTransport {
    pub fn new(base_url: Url) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url,
        }
    }

    /// Use a custom HTTP client (for connection pool reuse or timeouts).
    pub fn with_http_client(mut self, client: reqwest::Client) -> Self {
        self.http = client;
        self
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url.as_str().trim_end_matches('/'), path)
    }
}

impl Transport for ReqwestTransport {
    fn send(&self, request: ClientRequest) -> BoxFuture<'_, Result<ClientResponse, ClientError>> {
        Box::pin(async move {
            let mut builder = self.http.request(request.method, self.url(&request.path));
            if let Some(token) = &request.bearer {
                builder = builder.bearer_auth(token);
            }
            if let Some(body) = &request.body {
                builder = builder.json(body);
            }

            let response = builder.send().await?;
            let status = response.status().as_u16();
            let body = response.bytes().await?.to_vec();
            Ok(ClientResponse { status, body })
        })
    }
}

/// Body of login and refresh responses.
#[derive(Debug, Deserialize, Serialize)]
pub(crate) struct TokensData {
    pub tokens: crate::session::TokenPair,
}
