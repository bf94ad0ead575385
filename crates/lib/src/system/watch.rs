//! Change notification for the account databases.
//!
//! The account tools replace `/etc/group` and `/etc/shadow` atomically (write a
//! temporary file, then rename), which invalidates inode watches. We therefore
//! watch the parent directories and keep only events naming one of the target
//! files. A single `useradd` touches both files several times, so events are
//! collapsed into bursts by a [`Debouncer`]: every event restarts the quiet
//! period and a burst ends once the period elapses without another event.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tracing::{debug, trace, warn};

use super::SystemError;

/// Collapses a stream of events into quiet-period-separated bursts.
#[derive(Debug)]
pub struct Debouncer<T> {
  rx: mpsc::UnboundedReceiver<T>,
  quiet: Duration,
}

impl<T> Debouncer<T> {
  pub fn new(rx: mpsc::UnboundedReceiver<T>, quiet: Duration) -> Self {
    Self { rx, quiet }
  }

  /// Wait for the next burst and return how many events it contained.
  ///
  /// Returns `None` once the sending side is gone and no events remain.
  pub async fn next_burst(&mut self) -> Option<usize> {
    self.rx.recv().await?;
    let mut count = 1;
    loop {
      match tokio::time::timeout(self.quiet, self.rx.recv()).await {
        Ok(Some(_)) => count += 1,
        Ok(None) | Err(_) => return Some(count),
      }
    }
  }
}

/// Watches a fixed list of files and yields debounced change bursts.
pub struct ChangeWatcher {
  _watcher: RecommendedWatcher,
  events: Debouncer<PathBuf>,
}

impl ChangeWatcher {
  pub fn new(files: &[PathBuf], quiet: Duration) -> Result<Self, SystemError> {
    let (tx, rx) = mpsc::unbounded_channel();
    let targets: Vec<PathBuf> = files.to_vec();

    let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| match res {
      Ok(event) => {
        if matches!(event.kind, EventKind::Access(_)) {
          return;
        }
        for path in event.paths {
          if targets.iter().any(|t| *t == path) {
            trace!(path = %path.display(), kind = ?event.kind, "account database touched");
            if tx.send(path).is_err() {
              return;
            }
          }
        }
      }
      Err(e) => warn!(error = %e, "file watcher reported an error"),
    })?;

    let dirs: BTreeSet<&Path> = files.iter().filter_map(|f| f.parent()).collect();
    for dir in dirs {
      debug!(dir = %dir.display(), "watching directory");
      watcher.watch(dir, RecursiveMode::NonRecursive)?;
    }

    Ok(Self {
      _watcher: watcher,
      events: Debouncer::new(rx, quiet),
    })
  }

  /// Wait for the next debounced burst of changes to the watched files.
  pub async fn next_change(&mut self) -> Option<usize> {
    self.events.next_burst().await
  }
}
