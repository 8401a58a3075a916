//! In-process file watcher
//!
//! Does not observe the disk. Whoever knows a file changed calls
//! [`ManualFileWatcher::trigger`]; useful for tests and for hosts that already
//! run their own watcher.

use crate::domain::collaborators::{FileChangeCallback, FileWatcher, WatchSubscription};
use anyhow::Result;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

type Watches = HashMap<PathBuf, Vec<(u64, FileChangeCallback)>>;

#[derive(Clone, Default)]
pub struct ManualFileWatcher {
    watches: Arc<RwLock<Watches>>,
    next_id: Arc<AtomicU64>,
}

impl ManualFileWatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Invoke every callback watching `path`; returns how many ran
    pub fn trigger(&self, path: &Path) -> usize {
        let callbacks: Vec<FileChangeCallback> = self
            .watches
            .read()
            .get(path)
            .map(|entries| entries.iter().map(|(_, cb)| Arc::clone(cb)).collect())
            .unwrap_or_default();

        for callback in &callbacks {
            callback();
        }
        callbacks.len()
    }

    /// Number of live subscriptions for `path`
    pub fn watch_count(&self, path: &Path) -> usize {
        self.watches.read().get(path).map_or(0, Vec::len)
    }
}

impl FileWatcher for ManualFileWatcher {
    fn watch(&self, path: &Path, on_change: FileChangeCallback) -> Result<WatchSubscription> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let path = path.to_path_buf();
        self.watches
            .write()
            .entry(path.clone())
            .or_default()
            .push((id, on_change));

        let watches = Arc::downgrade(&self.watches);
        Ok(WatchSubscription::new(move || {
            if let Some(watches) = watches.upgrade() {
                let mut watches = watches.write();
                if let Some(entries) = watches.get_mut(&path) {
                    entries.retain(|(entry_id, _)| *entry_id != id);
                    if entries.is_empty() {
                        watches.remove(&path);
                    }
                }
            }
        }))
    }
}
