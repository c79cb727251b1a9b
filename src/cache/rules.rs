//! Request classification for the cache router.

use http::Method;
use url::{Origin, Url};

use crate::config::CacheConfig;

use super::response::FetchRequest;

/// How an intercepted request is handled. First matching rule wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestClass {
  /// Forwarded untouched: cross-origin, non-GET, or a never-cache endpoint
  Bypass,
  /// HTML navigation: network first, cached copy, offline document last
  Document,
  /// Cacheable API read: network first with api-partition fallback
  CacheableApi,
  /// Script, stylesheet, image or icon: cache first with network fill
  StaticAsset,
  /// Any other same-origin GET: network first with dynamic-partition fallback
  Dynamic,
}

/// Classification rules compiled from configuration.
#[derive(Debug, Clone)]
pub struct RouteRules {
  origin: Origin,
  api_prefix: String,
  never_cache: Vec<String>,
  cacheable_api: Vec<String>,
  static_prefixes: Vec<String>,
  static_extensions: Vec<String>,
}

impl RouteRules {
  pub fn new(server_url: &Url, api_prefix: &str, cache: &CacheConfig) -> Self {
    Self {
      origin: server_url.origin(),
      api_prefix: api_prefix.to_string(),
      never_cache: cache.never_cache.clone(),
      cacheable_api: cache.cacheable_api.clone(),
      static_prefixes: cache.static_prefixes.clone(),
      static_extensions: cache.static_extensions.clone(),
    }
  }

  /// Classify a request. Rules are evaluated in order; the first match wins.
  pub fn classify(&self, request: &FetchRequest) -> RequestClass {
    // Cross-origin and non-GET requests are never intercepted
    if request.url.origin() != self.origin {
      return RequestClass::Bypass;
    }
    if request.method != Method::GET {
      return RequestClass::Bypass;
    }

    let path = request.url.path();

    if self.never_cache.iter().any(|p| path.starts_with(p.as_str())) {
      return RequestClass::Bypass;
    }

    if request.wants_document() {
      return RequestClass::Document;
    }

    if path.starts_with(&self.api_prefix)
      && self.cacheable_api.iter().any(|p| path.starts_with(p.as_str()))
    {
      return RequestClass::CacheableApi;
    }

    if self.is_static_asset(path) {
      return RequestClass::StaticAsset;
    }

    RequestClass::Dynamic
  }

  fn is_static_asset(&self, path: &str) -> bool {
    if self.static_prefixes.iter().any(|p| path.starts_with(p.as_str())) {
      return true;
    }

    let name = path.rsplit('/').next().unwrap_or(path);
    match name.rsplit_once('.') {
      Some((_, ext)) => self
        .static_extensions
        .iter()
        .any(|e| e.eq_ignore_ascii_case(ext)),
      None => false,
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn rules() -> RouteRules {
    let server = Url::parse("https://app.legisflow.example").unwrap();
    RouteRules::new(&server, "/api", &CacheConfig::default())
  }

  fn get(path_or_url: &str) -> FetchRequest {
    let url = if path_or_url.starts_with("http") {
      Url::parse(path_or_url).unwrap()
    } else {
      Url::parse("https://app.legisflow.example")
        .unwrap()
        .join(path_or_url)
        .unwrap()
    };
    FetchRequest::get(url)
  }

  #[test]
  fn test_cross_origin_is_bypassed() {
    let request = get("https://cdn.example.com/app.js");
    assert_eq!(rules().classify(&request), RequestClass::Bypass);
  }

  #[test]
  fn test_non_get_is_bypassed() {
    let mut request = get("/api/matters");
    request.method = Method::POST;
    assert_eq!(rules().classify(&request), RequestClass::Bypass);
  }

  #[test]
  fn test_auth_endpoints_are_never_cached() {
    for path in ["/api/auth/login", "/api/auth/logout", "/api/auth/refresh"] {
      assert_eq!(rules().classify(&get(path)), RequestClass::Bypass);
    }
  }

  #[test]
  fn test_html_navigation_is_a_document() {
    let request = get("/matters").with_accept("text/html,application/xhtml+xml");
    assert_eq!(rules().classify(&request), RequestClass::Document);
  }

  #[test]
  fn test_document_rule_wins_over_api_rule() {
    let request = get("/api/matters").with_accept("text/html");
    assert_eq!(rules().classify(&request), RequestClass::Document);
  }

  #[test]
  fn test_allowlisted_api_reads_use_the_api_partition() {
    for path in ["/api/matters", "/api/time-entries?week=32", "/api/clients/42"] {
      assert_eq!(rules().classify(&get(path)), RequestClass::CacheableApi);
    }
  }

  #[test]
  fn test_unlisted_api_path_falls_through_to_dynamic() {
    assert_eq!(rules().classify(&get("/api/reports/summary")), RequestClass::Dynamic);
  }

  #[test]
  fn test_static_assets_by_prefix_and_extension() {
    for path in ["/icons/icon-192x192.png", "/static/app.bundle", "/app.css", "/vendor/chart.js"] {
      assert_eq!(rules().classify(&get(path)), RequestClass::StaticAsset, "{path}");
    }
  }

  #[test]
  fn test_everything_else_is_dynamic() {
    for path in ["/", "/manifest.json", "/robots.txt"] {
      assert_eq!(rules().classify(&get(path)), RequestClass::Dynamic, "{path}");
    }
  }
}
