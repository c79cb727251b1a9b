//! Platform events: connectivity transitions, ticks, and deferred sync tags.
//!
//! The agent has no ambient event callbacks; a watcher task probes the
//! backend and every observation arrives as one event on one channel, each
//! handled by a single awaited handler.

use std::collections::BTreeSet;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use color_eyre::{eyre::eyre, Result};
use tokio::sync::mpsc;

/// Events driving the agent loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlatformEvent {
  /// Connectivity restored
  Online,
  /// Connectivity lost
  Offline,
  /// Periodic heartbeat while the state is unchanged
  Tick,
}

/// Watches backend reachability and emits transition events plus ticks.
pub struct ConnectivityWatcher {
  rx: mpsc::UnboundedReceiver<PlatformEvent>,
  online: Arc<AtomicBool>,
}

impl ConnectivityWatcher {
  /// Spawn the probe loop. `probe` is polled once per interval and reports
  /// whether the backend is reachable. The first successful probe emits
  /// `Online`, so startup with connectivity immediately drains the registry.
  pub fn spawn<F, Fut>(interval: Duration, probe: F) -> Self
  where
    F: Fn() -> Fut + Send + 'static,
    Fut: Future<Output = bool> + Send + 'static,
  {
    let (tx, rx) = mpsc::unbounded_channel();
    let online = Arc::new(AtomicBool::new(false));
    let flag = online.clone();

    tokio::spawn(async move {
      let mut was_online = false;

      loop {
        let now_online = probe().await;
        flag.store(now_online, Ordering::SeqCst);

        let event = if now_online != was_online {
          was_online = now_online;
          if now_online {
            PlatformEvent::Online
          } else {
            PlatformEvent::Offline
          }
        } else {
          PlatformEvent::Tick
        };

        if tx.send(event).is_err() {
          break;
        }

        tokio::time::sleep(interval).await;
      }
    });

    Self { rx, online }
  }

  /// Receive the next event.
  pub async fn next(&mut self) -> Option<PlatformEvent> {
    self.rx.recv().await
  }

  /// Shared flag reflecting the last probe result.
  pub fn online_flag(&self) -> Arc<AtomicBool> {
    self.online.clone()
  }
}

/// Deferred sync requests, keyed by tag.
///
/// A tag registered while offline fires once connectivity returns; draining
/// consumes every registered tag in one pass.
#[derive(Debug, Default)]
pub struct SyncRegistry {
  tags: Mutex<BTreeSet<String>>,
}

impl SyncRegistry {
  pub fn new() -> Self {
    Self::default()
  }

  /// Register a tag for the next online transition. Returns false if the
  /// tag was already registered.
  pub fn register(&self, tag: &str) -> Result<bool> {
    let mut tags = self.tags.lock().map_err(|e| eyre!("Lock poisoned: {}", e))?;
    Ok(tags.insert(tag.to_string()))
  }

  /// Take every registered tag, leaving the registry empty.
  pub fn drain(&self) -> Result<Vec<String>> {
    let mut tags = self.tags.lock().map_err(|e| eyre!("Lock poisoned: {}", e))?;
    Ok(std::mem::take(&mut *tags).into_iter().collect())
  }

  pub fn pending(&self) -> Result<usize> {
    let tags = self.tags.lock().map_err(|e| eyre!("Lock poisoned: {}", e))?;
    Ok(tags.len())
  }
}
