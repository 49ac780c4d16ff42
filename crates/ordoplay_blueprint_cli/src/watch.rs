// SPDX-License-Identifier: MIT OR Apache-2.0
//! Debounced file watching for recompile-on-save.

use notify_debouncer_full::{
    new_debouncer,
    notify::{self, EventKind, RecommendedWatcher, RecursiveMode},
    DebounceEventResult, Debouncer, RecommendedCache,
};
use parking_lot::RwLock;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::sync::Arc;
use std::time::Duration;

/// Configuration for the graph watcher
#[derive(Debug, Clone)]
pub struct WatchConfig {
    /// Debounce duration for events
    pub debounce_duration: Duration,
    /// File extensions that trigger a rebuild (empty = all)
    pub extensions: HashSet<String>,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            debounce_duration: Duration::from_millis(250),
            extensions: ["json", "ron"].into_iter().map(String::from).collect(),
        }
    }
}

impl WatchConfig {
    /// Whether a change to `path` should trigger a rebuild
    pub fn matches(&self, path: &Path) -> bool {
        if self.extensions.is_empty() {
            return true;
        }
        path.extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| self.extensions.contains(&e.to_lowercase()))
    }
}

/// Watches graph and settings files for changes
pub struct GraphWatcher {
    watcher: Debouncer<RecommendedWatcher, RecommendedCache>,
    changes: Receiver<Vec<PathBuf>>,
    watched_dirs: Arc<RwLock<HashSet<PathBuf>>>,
}

impl GraphWatcher {
    /// Create a watcher; nothing is watched until [`GraphWatcher::watch`]
    pub fn new(config: WatchConfig) -> Result<Self, notify::Error> {
        let (tx, changes) = mpsc::channel();

        let watcher = new_debouncer(
            config.debounce_duration,
            None,
            move |result: DebounceEventResult| match result {
                Ok(events) => {
                    let paths: Vec<PathBuf> = events
                        .iter()
                        .filter(|event| {
                            matches!(
                                event.kind,
                                EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_)
                            )
                        })
                        .flat_map(|event| event.paths.iter())
                        .filter(|path| config.matches(path))
                        .cloned()
                        .collect();
                    if !paths.is_empty() {
                        let _ = tx.send(paths);
                    }
                }
                Err(errors) => {
                    for error in errors {
                        tracing::warn!("File watcher error: {error}");
                    }
                }
            },
        )?;

        Ok(Self {
            watcher,
            changes,
            watched_dirs: Arc::new(RwLock::new(HashSet::new())),
        })
    }

    /// Watch a directory (recursively)
    pub fn watch(&mut self, path: impl AsRef<Path>) -> Result<(), notify::Error> {
        let path = path.as_ref().to_path_buf();
        if self.is_watching(&path) {
            return Ok(());
        }
        self.watcher.watch(&path, RecursiveMode::Recursive)?;
        self.watched_dirs.write().insert(path.clone());
        tracing::info!("Watching directory for changes: {:?}", path);
        Ok(())
    }

    /// Check if a directory is being watched
    pub fn is_watching(&self, path: &Path) -> bool {
        self.watched_dirs.read().contains(path)
    }

    /// Block until matching files change or `timeout` passes.
    ///
    /// Returns `None` on timeout. Changes that arrive together are merged.
    pub fn wait_for_change(&self, timeout: Duration) -> Option<Vec<PathBuf>> {
        let mut paths = match self.changes.recv_timeout(timeout) {
            Ok(paths) => paths,
            Err(RecvTimeoutError::Timeout) => return None,
            Err(RecvTimeoutError::Disconnected) => {
                tracing::warn!("File watcher channel disconnected");
                return None;
            }
        };
        while let Ok(more) = self.changes.try_recv() {
            paths.extend(more);
        }
        paths.sort();
        paths.dedup();
        Some(paths)
    }
}
