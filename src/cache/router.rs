//! Strategy selection and execution for intercepted requests.

use chrono::Duration;
use color_eyre::{eyre::eyre, Result};
use http::StatusCode;
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, info, warn};
use url::Url;

use crate::config::Config;
use crate::db::Database;

use super::response::{FetchRequest, FetchResponse, RoutedResponse};
use super::rules::{RequestClass, RouteRules};
use super::store::{CacheStore, Partition};

/// Outcome of one activation pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ActivationReport {
  /// Entries deleted because their partition left the current named set
  pub retired: usize,
  /// Entries purged from the dynamic and api partitions by age
  pub expired: usize,
}

/// Routes intercepted requests to a caching strategy.
///
/// The router owns its store handle and classification rules; network access
/// is injected per call as an async fetcher closure.
pub struct CacheRouter {
  store: CacheStore,
  rules: RouteRules,
  offline_url: Url,
  precache: Vec<Url>,
  dynamic_max_age: Duration,
  api_max_age: Duration,
}

impl CacheRouter {
  pub fn new(db: Arc<Database>, config: &Config) -> Result<Self> {
    let server_url = config.server_url()?;
    let cache = &config.cache;

    let offline_url = server_url
      .join(&cache.offline_url)
      .map_err(|e| eyre!("Invalid offline url '{}': {}", cache.offline_url, e))?;

    let precache = cache
      .precache
      .iter()
      .map(|path| {
        server_url
          .join(path)
          .map_err(|e| eyre!("Invalid precache url '{}': {}", path, e))
      })
      .collect::<Result<Vec<_>>>()?;

    Ok(Self {
      store: CacheStore::new(db, cache.version),
      rules: RouteRules::new(&server_url, &config.server.api_prefix, cache),
      offline_url,
      precache,
      dynamic_max_age: Duration::days(cache.dynamic_max_age_days),
      api_max_age: Duration::hours(cache.api_max_age_hours),
    })
  }

  /// Serve one request through the strategy its classification selects.
  pub async fn handle<F, Fut>(&self, request: &FetchRequest, fetch: F) -> Result<RoutedResponse>
  where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<FetchResponse>>,
  {
    match self.rules.classify(request) {
      RequestClass::Bypass => Ok(RoutedResponse::passthrough(fetch().await?)),
      RequestClass::Document => self.network_first_document(request, fetch).await,
      RequestClass::CacheableApi => self.network_first(request, Partition::Api, fetch).await,
      RequestClass::StaticAsset => self.cache_first(request, fetch).await,
      RequestClass::Dynamic => self.network_first(request, Partition::Dynamic, fetch).await,
    }
  }

  /// Network first; on failure fall back to the cached copy, then to the
  /// offline placeholder document.
  async fn network_first_document<F, Fut>(
    &self,
    request: &FetchRequest,
    fetch: F,
  ) -> Result<RoutedResponse>
  where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<FetchResponse>>,
  {
    match fetch().await {
      Ok(response) => {
        self.store.put(Partition::Dynamic, &request.url, &response)?;
        Ok(RoutedResponse::network(response))
      }
      Err(err) => {
        if let Some(hit) = self.store.get(Partition::Dynamic, &request.url)? {
          debug!(url = %request.url, stored_at = %hit.stored_at, "network failed, serving cached navigation");
          return Ok(RoutedResponse::cached(hit.response));
        }

        if let Some(hit) = self.store.get(Partition::Static, &self.offline_url)? {
          debug!(url = %request.url, "network failed, serving offline document");
          return Ok(RoutedResponse::offline_fallback(hit.response));
        }

        Err(err)
      }
    }
  }

  /// Network first; on failure fall back to the cached copy, else propagate.
  async fn network_first<F, Fut>(
    &self,
    request: &FetchRequest,
    partition: Partition,
    fetch: F,
  ) -> Result<RoutedResponse>
  where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<FetchResponse>>,
  {
    match fetch().await {
      Ok(response) => {
        self.store.put(partition, &request.url, &response)?;
        Ok(RoutedResponse::network(response))
      }
      Err(err) => match self.store.get(partition, &request.url)? {
        Some(hit) => {
          debug!(
            url = %request.url,
            partition = partition.prefix(),
            stored_at = %hit.stored_at,
            "network failed, serving cache"
          );
          Ok(RoutedResponse::cached(hit.response))
        }
        None => Err(err),
      },
    }
  }

  /// Cache first; on a miss fetch and cache valid same-origin 200 responses.
  async fn cache_first<F, Fut>(&self, request: &FetchRequest, fetch: F) -> Result<RoutedResponse>
  where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<FetchResponse>>,
  {
    if let Some(hit) = self.store.get(Partition::Static, &request.url)? {
      return Ok(RoutedResponse::cached(hit.response));
    }

    let response = fetch().await?;
    if response.status == StatusCode::OK && response.same_origin_as(request) {
      self.store.put(Partition::Static, &request.url, &response)?;
    }

    Ok(RoutedResponse::network(response))
  }

  /// Pre-populate the static partition from the configured manifest.
  ///
  /// Fails if any manifest asset cannot be fetched, leaving already stored
  /// entries in place.
  pub async fn install<F, Fut>(&self, fetch: F) -> Result<usize>
  where
    F: Fn(Url) -> Fut,
    Fut: Future<Output = Result<FetchResponse>>,
  {
    let fetches = self.precache.iter().cloned().map(|url| {
      let pending = fetch(url.clone());
      async move { (url, pending.await) }
    });

    let mut stored = 0;
    for (url, result) in futures::future::join_all(fetches).await {
      let response = result.map_err(|e| eyre!("Failed to precache {}: {}", url, e))?;
      self.store.put(Partition::Static, &url, &response)?;
      stored += 1;
    }

    info!(assets = stored, "static partition precached");
    Ok(stored)
  }

  /// Retire partitions outside the current named set and sweep the dynamic
  /// and api partitions for expired entries.
  pub fn activate(&self) -> Result<ActivationReport> {
    let retired = self.store.retire_unknown()?;
    let expired = self.store.sweep(Partition::Dynamic, self.dynamic_max_age)?
      + self.store.sweep(Partition::Api, self.api_max_age)?;

    if retired > 0 || expired > 0 {
      warn!(retired, expired, "cache activation cleaned up entries");
    }

    Ok(ActivationReport { retired, expired })
  }

  /// Entry counts per partition, for status reporting.
  pub fn usage(&self) -> Result<Vec<(Partition, usize)>> {
    Partition::ALL
      .iter()
      .map(|&p| Ok((p, self.store.entry_count(p)?)))
      .collect()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::cache::response::ResponseSource;
  use crate::config::Config;

  fn config() -> Config {
    serde_yaml::from_str("server:\n  url: https://app.legisflow.example\n").unwrap()
  }

  fn router() -> CacheRouter {
    CacheRouter::new(Arc::new(Database::open_in_memory().unwrap()), &config()).unwrap()
  }

  fn url(path: &str) -> Url {
    Url::parse("https://app.legisflow.example").unwrap().join(path).unwrap()
  }

  fn ok_response(path: &str, body: &[u8]) -> FetchResponse {
    FetchResponse {
      url: url(path),
      status: StatusCode::OK,
      headers: Vec::new(),
      body: body.to_vec(),
    }
  }

  fn offline() -> Result<FetchResponse> {
    Err(eyre!("connection refused"))
  }

  #[tokio::test]
  async fn test_never_cache_endpoint_is_not_written_to_any_partition() {
    let router = router();
    let request = FetchRequest::get(url("/api/auth/login"));

    let routed = router
      .handle(&request, || async { Ok(ok_response("/api/auth/login", b"session")) })
      .await
      .unwrap();

    assert_eq!(routed.source, ResponseSource::Passthrough);
    for (_, count) in router.usage().unwrap() {
      assert_eq!(count, 0);
    }
  }

  #[tokio::test]
  async fn test_never_cache_endpoint_is_not_read_from_cache() {
    let router = router();
    let request = FetchRequest::get(url("/api/auth/login"));

    // Seed every partition with an entry for the same URL; a severed network
    // must still surface the failure rather than any cached copy.
    router
      .store
      .put(Partition::Api, &request.url, &ok_response("/api/auth/login", b"stale"))
      .unwrap();
    router
      .store
      .put(Partition::Dynamic, &request.url, &ok_response("/api/auth/login", b"stale"))
      .unwrap();

    let result = router.handle(&request, || async { offline() }).await;
    assert!(result.is_err());
  }

  #[tokio::test]
  async fn test_static_asset_is_served_from_cache_when_network_is_severed() {
    let router = router();
    let request = FetchRequest::get(url("/app.css"));

    let first = router
      .handle(&request, || async { Ok(ok_response("/app.css", b"body{}")) })
      .await
      .unwrap();
    assert_eq!(first.source, ResponseSource::Network);

    let second = router.handle(&request, || async { offline() }).await.unwrap();
    assert_eq!(second.source, ResponseSource::Cache);
    assert_eq!(second.response.body, b"body{}");
  }

  #[tokio::test]
  async fn test_cache_first_does_not_store_error_responses() {
    let router = router();
    let request = FetchRequest::get(url("/missing.css"));

    let routed = router
      .handle(&request, || async {
        Ok(FetchResponse {
          status: StatusCode::NOT_FOUND,
          ..ok_response("/missing.css", b"not found")
        })
      })
      .await
      .unwrap();

    assert_eq!(routed.source, ResponseSource::Network);
    assert!(router.store.get(Partition::Static, &request.url).unwrap().is_none());
  }

  #[tokio::test]
  async fn test_cache_first_does_not_store_cross_origin_responses() {
    let router = router();
    let request = FetchRequest::get(url("/app.js"));

    // Redirected off-origin; returned but never cached
    let routed = router
      .handle(&request, || async {
        Ok(FetchResponse {
          url: Url::parse("https://cdn.example.com/app.js").unwrap(),
          status: StatusCode::OK,
          headers: Vec::new(),
          body: b"js".to_vec(),
        })
      })
      .await
      .unwrap();

    assert_eq!(routed.source, ResponseSource::Network);
    assert!(router.store.get(Partition::Static, &request.url).unwrap().is_none());
  }

  #[tokio::test]
  async fn test_api_read_falls_back_to_api_partition() {
    let router = router();
    let request = FetchRequest::get(url("/api/matters"));

    router
      .handle(&request, || async { Ok(ok_response("/api/matters", b"[1]")) })
      .await
      .unwrap();

    let routed = router.handle(&request, || async { offline() }).await.unwrap();
    assert_eq!(routed.source, ResponseSource::Cache);
    assert_eq!(routed.response.body, b"[1]");
    assert_eq!(router.store.entry_count(Partition::Api).unwrap(), 1);
  }

  #[tokio::test]
  async fn test_api_read_with_no_cache_propagates_the_failure() {
    let router = router();
    let request = FetchRequest::get(url("/api/matters"));

    let result = router.handle(&request, || async { offline() }).await;
    assert!(result.is_err());
  }

  #[tokio::test]
  async fn test_navigation_falls_back_to_cached_copy_then_offline_document() {
    let router = router();
    let request = FetchRequest::get(url("/matters")).with_accept("text/html");

    // No cached copy and no offline document yet: failure propagates
    assert!(router.handle(&request, || async { offline() }).await.is_err());

    // With the offline document installed, the placeholder is served
    router
      .store
      .put(Partition::Static, &url("/offline.html"), &ok_response("/offline.html", b"<h1>offline</h1>"))
      .unwrap();
    let routed = router.handle(&request, || async { offline() }).await.unwrap();
    assert_eq!(routed.source, ResponseSource::OfflineFallback);

    // Once the navigation has been seen online, its own copy wins
    router
      .handle(&request, || async { Ok(ok_response("/matters", b"<table>")) })
      .await
      .unwrap();
    let routed = router.handle(&request, || async { offline() }).await.unwrap();
    assert_eq!(routed.source, ResponseSource::Cache);
    assert_eq!(routed.response.body, b"<table>");
  }

  #[tokio::test]
  async fn test_install_precaches_the_manifest() {
    let router = router();

    let stored = router
      .install(|target| async move {
        let path = target.path().to_string();
        Ok(ok_response(&path, path.as_bytes()))
      })
      .await
      .unwrap();

    assert_eq!(stored, config().cache.precache.len());
    assert!(router.store.get(Partition::Static, &url("/offline.html")).unwrap().is_some());
  }

  #[tokio::test]
  async fn test_install_fails_when_an_asset_cannot_be_fetched() {
    let router = router();

    let result = router
      .install(|target| async move {
        if target.path() == "/favicon.ico" {
          Err(eyre!("connection reset"))
        } else {
          let path = target.path().to_string();
          Ok(ok_response(&path, b"asset"))
        }
      })
      .await;

    assert!(result.is_err());
  }

  #[tokio::test]
  async fn test_activation_retires_old_partitions_and_expires_stale_entries() {
    let db = Arc::new(Database::open_in_memory().unwrap());

    // An entry under a retired partition name
    let old_store = CacheStore::new(db.clone(), 0);
    old_store
      .put(Partition::Dynamic, &url("/matters"), &ok_response("/matters", b"old"))
      .unwrap();

    let router = CacheRouter::new(db.clone(), &config()).unwrap();

    // A current api entry, backdated past its 24 hour window
    let aged = url("/api/matters");
    router
      .store
      .put(Partition::Api, &aged, &ok_response("/api/matters", b"[1]"))
      .unwrap();
    db.lock()
      .unwrap()
      .execute(
        "UPDATE response_cache SET stored_at = ? WHERE partition = 'api-v1'",
        rusqlite::params![crate::db::timestamp(chrono::Utc::now() - Duration::hours(25))],
      )
      .unwrap();

    let report = router.activate().unwrap();

    assert_eq!(report.retired, 1);
    assert_eq!(report.expired, 1);
    assert!(router.store.get(Partition::Api, &aged).unwrap().is_none());
  }
}
