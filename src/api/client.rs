//! REST client for the LegisFlow backend.

use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;
use url::Url;

use crate::cache::{FetchRequest, FetchResponse};
use crate::config::Config;

/// Transport failure taxonomy.
///
/// The split matters to the sync queue: network failures retry forever,
/// while rejections count against a record's budget.
#[derive(Debug, Error)]
pub enum TransportError {
  /// The server could not be reached (offline, DNS, timeout)
  #[error("network error: {0}")]
  Network(String),
  /// The server answered with an error status
  #[error("server rejected request with status {status}")]
  Rejected { status: u16, body: String },
  /// The server answered but the body was not the expected shape
  #[error("unexpected response body: {0}")]
  Decode(String),
}

impl TransportError {
  /// Whether the server actively refused this submission.
  pub fn is_rejection(&self) -> bool {
    matches!(self, Self::Rejected { .. } | Self::Decode(_))
  }
}

/// Replay transport used by the sync queue.
pub trait SyncTransport: Send + Sync {
  /// Create a record; returns the server-assigned identifier.
  async fn create(&self, resource: &str, payload: &Value) -> Result<String, TransportError>;

  /// Update the record known to the server under `id`.
  async fn update(&self, resource: &str, id: &str, payload: &Value)
    -> Result<(), TransportError>;
}

/// Shape of the backend's create response; only the id is load-bearing.
#[derive(Debug, Deserialize)]
struct CreatedRecord {
  id: String,
}

/// LegisFlow API client.
#[derive(Clone)]
pub struct ApiClient {
  http: reqwest::Client,
  base: Url,
  api_prefix: String,
  health_path: String,
  token: Option<String>,
}

impl ApiClient {
  pub fn new(config: &Config) -> Result<Self> {
    let http = reqwest::Client::builder()
      .user_agent(concat!("lexsync/", env!("CARGO_PKG_VERSION")))
      .build()
      .map_err(|e| eyre!("Failed to create HTTP client: {}", e))?;

    Ok(Self {
      http,
      base: config.server_url()?,
      api_prefix: config.server.api_prefix.trim_end_matches('/').to_string(),
      health_path: config.sync.health_path.clone(),
      token: Config::api_token(),
    })
  }

  fn resource_url(&self, resource: &str, id: Option<&str>) -> Result<Url, TransportError> {
    let path = match id {
      Some(id) => format!("{}/{}/{}", self.api_prefix, resource, id),
      None => format!("{}/{}", self.api_prefix, resource),
    };

    self
      .base
      .join(&path)
      .map_err(|e| TransportError::Decode(format!("invalid resource url '{}': {}", path, e)))
  }

  fn authorized(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
    match &self.token {
      Some(token) => request.bearer_auth(token),
      None => request,
    }
  }

  /// Probe the backend health endpoint. Any 2xx counts as reachable.
  pub async fn health(&self) -> bool {
    let url = match self.base.join(&self.health_path) {
      Ok(url) => url,
      Err(_) => return false,
    };

    match self.authorized(self.http.get(url)).send().await {
      Ok(response) => response.status().is_success(),
      Err(_) => false,
    }
  }

  /// Execute a raw request on behalf of the cache router.
  pub async fn execute(&self, request: &FetchRequest) -> Result<FetchResponse> {
    let mut builder = self.http.request(request.method.clone(), request.url.clone());
    if let Some(accept) = &request.accept {
      builder = builder.header(reqwest::header::ACCEPT, accept);
    }

    let response = self
      .authorized(builder)
      .send()
      .await
      .map_err(|e| eyre!("Fetch failed for {}: {}", request.url, e))?;

    let url = response.url().clone();
    let status = response.status();
    let headers = response
      .headers()
      .iter()
      .map(|(name, value)| {
        (
          name.to_string(),
          String::from_utf8_lossy(value.as_bytes()).into_owned(),
        )
      })
      .collect();
    let body = response
      .bytes()
      .await
      .map_err(|e| eyre!("Failed to read response body from {}: {}", request.url, e))?
      .to_vec();

    Ok(FetchResponse {
      url,
      status,
      headers,
      body,
    })
  }
}

impl SyncTransport for ApiClient {
  async fn create(&self, resource: &str, payload: &Value) -> Result<String, TransportError> {
    let url = self.resource_url(resource, None)?;

    let response = self
      .authorized(self.http.post(url))
      .json(payload)
      .send()
      .await
      .map_err(|e| TransportError::Network(e.to_string()))?;

    let status = response.status();
    if !status.is_success() {
      let body = response.text().await.unwrap_or_default();
      return Err(TransportError::Rejected {
        status: status.as_u16(),
        body,
      });
    }

    let created: CreatedRecord = response
      .json()
      .await
      .map_err(|e| TransportError::Decode(e.to_string()))?;

    Ok(created.id)
  }

  async fn update(
    &self,
    resource: &str,
    id: &str,
    payload: &Value,
  ) -> Result<(), TransportError> {
    let url = self.resource_url(resource, Some(id))?;

    let response = self
      .authorized(self.http.put(url))
      .json(payload)
      .send()
      .await
      .map_err(|e| TransportError::Network(e.to_string()))?;

    let status = response.status();
    if !status.is_success() {
      let body = response.text().await.unwrap_or_default();
      return Err(TransportError::Rejected {
        status: status.as_u16(),
        body,
      });
    }

    Ok(())
  }
}
