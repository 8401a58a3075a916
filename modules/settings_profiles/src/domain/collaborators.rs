//! Collaborator traits consumed by the settings container
//!
//! These traits define the serializer, file-system and file-watch seams.
//! Implementations live in `infra/`.

use crate::contract::SettingsDocument;
use anyhow::Result;
use std::io::{Read, Write};
use std::path::Path;
use std::sync::Arc;

/// Converts whole settings documents to and from a byte stream
pub trait SettingsSerializer: Send + Sync {
    /// Write a document
    fn serialize(&self, writer: &mut dyn Write, document: &SettingsDocument) -> Result<()>;

    /// Read a document
    fn deserialize(&self, reader: &mut dyn Read) -> Result<SettingsDocument>;
}

/// Synchronous file access
pub trait FileSystem: Send + Sync {
    /// Check whether a file exists
    fn exists(&self, path: &Path) -> bool;

    /// Create a directory and all of its parents
    fn create_dir_all(&self, path: &Path) -> Result<()>;

    /// Open an existing file for reading
    fn open_read(&self, path: &Path) -> Result<Box<dyn Read>>;

    /// Create or truncate a file for writing
    fn open_write(&self, path: &Path) -> Result<Box<dyn Write>>;

    /// Delete a file
    fn remove_file(&self, path: &Path) -> Result<()>;
}

/// Callback invoked by a watcher when the watched file changes
pub type FileChangeCallback = Arc<dyn Fn() + Send + Sync>;

/// Notifies about external modification of a file
///
/// Callbacks may be delivered on any thread.
pub trait FileWatcher: Send + Sync {
    /// Start watching `path`; watching stops when the returned subscription is dropped
    fn watch(&self, path: &Path, on_change: FileChangeCallback) -> Result<WatchSubscription>;
}

/// Keeps a file watch alive
pub struct WatchSubscription {
    release: Option<Box<dyn FnOnce() + Send>>,
}

impl WatchSubscription {
    /// Subscription that runs `release` when dropped
    pub fn new(release: impl FnOnce() + Send + 'static) -> Self {
        Self {
            release: Some(Box::new(release)),
        }
    }

    /// Subscription with nothing to release
    pub fn detached() -> Self {
        Self { release: None }
    }
}

impl Drop for WatchSubscription {
    fn drop(&mut self) {
        if let Some(release) = self.release.take() {
            release();
        }
    }
}

impl std::fmt::Debug for WatchSubscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WatchSubscription")
            .field("active", &self.release.is_some())
            .finish()
    }
}
