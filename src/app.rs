//! Agent wiring: stores, router, queue, and the event loop.

use color_eyre::{eyre::eyre, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use url::Url;

use crate::api::{
  ApiClient, ClientRecord, Deadline, DocumentRecord, Matter, RecordKind, TimeEntry,
};
use crate::cache::{CacheRouter, FetchRequest, ResponseSource};
use crate::config::Config;
use crate::db::Database;
use crate::event::{ConnectivityWatcher, PlatformEvent, SyncRegistry};
use crate::sync::{FlushReport, OfflineQueue, RecordIdentity, RecordStore, Syncable, SyncPolicy};

/// The assembled agent.
///
/// Owns the database handle and passes it explicitly to the router and the
/// queue; both release it when the app is dropped.
pub struct App {
  config: Config,
  client: ApiClient,
  router: CacheRouter,
  queue: OfflineQueue<ApiClient>,
  records: RecordStore,
  registry: SyncRegistry,
  online: Arc<AtomicBool>,
}

impl App {
  pub fn new(config: Config) -> Result<Self> {
    let db_path = config.data_dir()?.join("lexsync.db");
    let db = Arc::new(Database::open_at(&db_path)?);
    Self::with_database(config, db)
  }

  fn with_database(config: Config, db: Arc<Database>) -> Result<Self> {
    let client = ApiClient::new(&config)?;
    let router = CacheRouter::new(db.clone(), &config)?;
    let records = RecordStore::new(db.clone());
    let queue = OfflineQueue::new(
      RecordStore::new(db),
      client.clone(),
      SyncPolicy {
        max_rejections: config.sync.max_rejections,
      },
    );

    Ok(Self {
      config,
      client,
      router,
      queue,
      records,
      registry: SyncRegistry::new(),
      online: Arc::new(AtomicBool::new(false)),
    })
  }

  /// Run the agent loop until interrupted.
  pub async fn run(&mut self) -> Result<()> {
    let report = self.router.activate()?;
    info!(
      retired = report.retired,
      expired = report.expired,
      "cache partitions activated"
    );

    self.seed_registry()?;

    let probe_client = self.client.clone();
    let mut events = ConnectivityWatcher::spawn(
      Duration::from_secs(self.config.sync.poll_interval_secs),
      move || {
        let client = probe_client.clone();
        async move { client.health().await }
      },
    );
    self.online = events.online_flag();

    info!("agent running");
    loop {
      tokio::select! {
        _ = tokio::signal::ctrl_c() => {
          info!("shutting down");
          break;
        }
        event = events.next() => match event {
          Some(event) => self.handle_event(event).await?,
          None => break,
        },
      }
    }

    Ok(())
  }

  /// One platform event, one handler.
  async fn handle_event(&self, event: PlatformEvent) -> Result<()> {
    match event {
      PlatformEvent::Online => {
        info!("backend reachable, draining sync registry");
        for tag in self.registry.drain()? {
          match RecordKind::from_tag(&tag) {
            Some(kind) => {
              let report = self.flush_kind(kind).await?;
              log_report(kind, &report);
            }
            None => warn!(%tag, "unknown sync tag, dropping"),
          }
        }
      }
      PlatformEvent::Offline => {
        warn!(
          pending_tags = self.registry.pending()?,
          "backend unreachable, queuing locally"
        );
      }
      PlatformEvent::Tick => {
        if !self.online.load(Ordering::SeqCst) {
          return Ok(());
        }

        // Safety net for records enqueued by other processes against the
        // shared store, and for earlier failures.
        for kind in RecordKind::ALL {
          if self.records.counts(kind.record_type())?.pending > 0 {
            let report = self.flush_kind(kind).await?;
            log_report(kind, &report);
          }
        }
      }
    }

    Ok(())
  }

  /// Register a deferred sync tag for every type with pending records, so
  /// work queued by previous runs still fires on the next transition.
  fn seed_registry(&self) -> Result<()> {
    for kind in RecordKind::ALL {
      if self.records.counts(kind.record_type())?.pending > 0 {
        self.registry.register(kind.sync_tag())?;
        info!(tag = kind.sync_tag(), "pending records found, sync tag registered");
      }
    }

    Ok(())
  }

  async fn flush_kind(&self, kind: RecordKind) -> Result<FlushReport> {
    match kind {
      RecordKind::TimeEntry => self.queue.flush::<TimeEntry>().await,
      RecordKind::Document => self.queue.flush::<DocumentRecord>().await,
      RecordKind::Matter => self.queue.flush::<Matter>().await,
      RecordKind::Client => self.queue.flush::<ClientRecord>().await,
      RecordKind::Deadline => self.queue.flush::<Deadline>().await,
    }
  }

  /// Queue a new record from its CLI JSON payload.
  pub async fn enqueue(&self, kind_name: &str, data: &str) -> Result<()> {
    let kind = parse_kind(kind_name)?;

    let identity = match kind {
      RecordKind::TimeEntry => self.queue.enqueue(parse_payload::<TimeEntry>(data)?)?,
      RecordKind::Document => self.queue.enqueue(parse_payload::<DocumentRecord>(data)?)?,
      RecordKind::Matter => self.queue.enqueue(parse_payload::<Matter>(data)?)?,
      RecordKind::Client => self.queue.enqueue(parse_payload::<ClientRecord>(data)?)?,
      RecordKind::Deadline => self.queue.enqueue(parse_payload::<Deadline>(data)?)?,
    };

    println!("{identity}");
    self.sync_or_defer(kind).await
  }

  /// Queue an edit to an existing record.
  pub async fn edit(&self, kind_name: &str, id: &str, data: &str) -> Result<()> {
    let kind = parse_kind(kind_name)?;
    let identity = RecordIdentity::parse(id);

    let identity = match kind {
      RecordKind::TimeEntry => self
        .queue
        .enqueue_edit(&identity, parse_payload::<TimeEntry>(data)?)?,
      RecordKind::Document => self
        .queue
        .enqueue_edit(&identity, parse_payload::<DocumentRecord>(data)?)?,
      RecordKind::Matter => self
        .queue
        .enqueue_edit(&identity, parse_payload::<Matter>(data)?)?,
      RecordKind::Client => self
        .queue
        .enqueue_edit(&identity, parse_payload::<ClientRecord>(data)?)?,
      RecordKind::Deadline => self
        .queue
        .enqueue_edit(&identity, parse_payload::<Deadline>(data)?)?,
    };

    println!("{identity}");
    self.sync_or_defer(kind).await
  }

  /// Immediate flush when the backend is reachable, deferred tag otherwise.
  async fn sync_or_defer(&self, kind: RecordKind) -> Result<()> {
    if self.client.health().await {
      let report = self.flush_kind(kind).await?;
      log_report(kind, &report);
    } else {
      self.registry.register(kind.sync_tag())?;
      info!(tag = kind.sync_tag(), "offline, record queued for deferred sync");
    }

    Ok(())
  }

  /// One wholesale flush pass over every record type.
  pub async fn flush_all(&self) -> Result<()> {
    for kind in RecordKind::ALL {
      let report = self.flush_kind(kind).await?;
      if report.attempted > 0 || report.skipped {
        log_report(kind, &report);
      }
      println!(
        "{:<12} attempted {:>3}  created {:>3}  updated {:>3}  failed {:>3}",
        kind.name(),
        report.attempted,
        report.created,
        report.updated,
        report.failed
      );
    }

    Ok(())
  }

  /// Pending/synced/dead tallies and cache partition usage.
  pub fn status(&self) -> Result<()> {
    println!("{:<12} {:>8} {:>8} {:>6}", "record type", "pending", "synced", "dead");
    for kind in RecordKind::ALL {
      let counts = self.records.counts(kind.record_type())?;
      println!(
        "{:<12} {:>8} {:>8} {:>6}",
        kind.name(),
        counts.pending,
        counts.synced,
        counts.dead
      );
    }

    println!();
    println!("{:<12} {:>8}", "partition", "entries");
    for (partition, entries) in self.router.usage()? {
      println!("{:<12} {:>8}", partition.prefix(), entries);
    }

    Ok(())
  }

  /// Fetch one URL through the cache router and report the outcome.
  pub async fn get(&self, target: &str, accept: Option<&str>) -> Result<()> {
    let url = self.resolve_url(target)?;
    let mut request = FetchRequest::get(url);
    if let Some(accept) = accept {
      request = request.with_accept(accept);
    }

    let routed = self
      .router
      .handle(&request, || self.client.execute(&request))
      .await?;

    let source = match routed.source {
      ResponseSource::Network => "network",
      ResponseSource::Cache => "cache",
      ResponseSource::OfflineFallback => "offline-fallback",
      ResponseSource::Passthrough => "passthrough",
    };
    println!(
      "{} {} ({} bytes, {})",
      routed.response.status.as_u16(),
      request.url,
      routed.response.body.len(),
      source
    );

    Ok(())
  }

  /// Precache the static asset manifest.
  pub async fn install(&self) -> Result<()> {
    let stored = self
      .router
      .install(|url| {
        let client = self.client.clone();
        async move { client.execute(&FetchRequest::get(url)).await }
      })
      .await?;

    println!("precached {stored} assets");
    Ok(())
  }

  /// Retire stale partitions and purge expired entries.
  pub fn sweep(&self) -> Result<()> {
    let report = self.router.activate()?;
    println!("retired {} entries, expired {}", report.retired, report.expired);
    Ok(())
  }

  fn resolve_url(&self, target: &str) -> Result<Url> {
    if target.starts_with("http://") || target.starts_with("https://") {
      return Url::parse(target).map_err(|e| eyre!("Invalid url '{}': {}", target, e));
    }

    self
      .config
      .server_url()?
      .join(target)
      .map_err(|e| eyre!("Invalid path '{}': {}", target, e))
  }
}

fn parse_kind(name: &str) -> Result<RecordKind> {
  RecordKind::parse(name).ok_or_else(|| {
    eyre!(
      "Unknown record type '{}'. Expected one of: time-entry, document, matter, client, deadline",
      name
    )
  })
}

fn parse_payload<T: Syncable>(data: &str) -> Result<T> {
  serde_json::from_str(data).map_err(|e| eyre!("Invalid {} payload: {}", T::record_type(), e))
}

fn log_report(kind: RecordKind, report: &FlushReport) {
  if report.skipped {
    info!(record_type = kind.record_type(), "flush skipped, already in flight");
    return;
  }

  info!(
    record_type = kind.record_type(),
    attempted = report.attempted,
    created = report.created,
    updated = report.updated,
    failed = report.failed,
    dead_lettered = report.dead_lettered,
    "flush finished"
  );
}
