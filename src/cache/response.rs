//! Request and response types flowing through the cache router.

use http::{Method, StatusCode};
use url::Url;

/// An outgoing request as seen by the router.
#[derive(Debug, Clone)]
pub struct FetchRequest {
  pub method: Method,
  pub url: Url,
  /// Accept header, when the caller negotiates a content type
  pub accept: Option<String>,
}

impl FetchRequest {
  /// A GET request with no content negotiation.
  pub fn get(url: Url) -> Self {
    Self {
      method: Method::GET,
      url,
      accept: None,
    }
  }

  pub fn with_accept(mut self, accept: impl Into<String>) -> Self {
    self.accept = Some(accept.into());
    self
  }

  /// Whether the caller asked for an HTML document (a navigation).
  pub fn wants_document(&self) -> bool {
    self
      .accept
      .as_deref()
      .is_some_and(|accept| accept.contains("text/html"))
  }
}

/// A response body plus the metadata needed to replay it from cache.
#[derive(Debug, Clone)]
pub struct FetchResponse {
  /// Final URL after redirects
  pub url: Url,
  pub status: StatusCode,
  pub headers: Vec<(String, String)>,
  pub body: Vec<u8>,
}

impl FetchResponse {
  /// Whether the response landed on the same origin it was requested from.
  pub fn same_origin_as(&self, request: &FetchRequest) -> bool {
    self.url.origin() == request.url.origin()
  }
}

/// Where a routed response came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseSource {
  /// Fresh from the network
  Network,
  /// Served from a cache partition
  Cache,
  /// The designated offline placeholder document
  OfflineFallback,
  /// Not intercepted, forwarded untouched
  Passthrough,
}

/// Response returned by the router, tagged with its provenance.
#[derive(Debug, Clone)]
pub struct RoutedResponse {
  pub response: FetchResponse,
  pub source: ResponseSource,
}

impl RoutedResponse {
  pub fn network(response: FetchResponse) -> Self {
    Self {
      response,
      source: ResponseSource::Network,
    }
  }

  pub fn cached(response: FetchResponse) -> Self {
    Self {
      response,
      source: ResponseSource::Cache,
    }
  }

  pub fn offline_fallback(response: FetchResponse) -> Self {
    Self {
      response,
      source: ResponseSource::OfflineFallback,
    }
  }

  pub fn passthrough(response: FetchResponse) -> Self {
    Self {
      response,
      source: ResponseSource::Passthrough,
    }
  }
}
