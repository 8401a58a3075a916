//! Notifications raised by the settings subsystem
//!
//! Every notification is delivered synchronously, inside the call that
//! triggers it (validate, load, reload, file watch), after internal locks
//! have been released so that handlers may read and write settings.

use super::profile::SettingsProfile;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::fmt;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

/// Handle returned by [`Observers::subscribe`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type Handler<E> = Arc<dyn Fn(&E) + Send + Sync>;

/// Observer list for one kind of event
pub struct Observers<E> {
    handlers: Mutex<Vec<(SubscriptionId, Handler<E>)>>,
    next_id: AtomicU64,
}

impl<E> Observers<E> {
    pub fn new() -> Self {
        Self {
            handlers: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(1),
        }
    }

    pub fn subscribe(&self, handler: impl Fn(&E) + Send + Sync + 'static) -> SubscriptionId {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.handlers.lock().push((id, Arc::new(handler)));
        id
    }

    /// Returns `false` if the subscription was unknown
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut handlers = self.handlers.lock();
        let before = handlers.len();
        handlers.retain(|(existing, _)| *existing != id);
        handlers.len() != before
    }

    pub fn emit(&self, event: &E) {
        // snapshot so handlers can subscribe/unsubscribe while being called
        let handlers: Vec<Handler<E>> = self
            .handlers
            .lock()
            .iter()
            .map(|(_, handler)| Arc::clone(handler))
            .collect();
        for handler in handlers {
            handler(event);
        }
    }

    pub fn len(&self) -> usize {
        self.handlers.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<E> Default for Observers<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> fmt::Debug for Observers<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Observers").field("len", &self.len()).finish()
    }
}

/// A profile committed changes touching a key
#[derive(Debug, Clone)]
pub struct ChangesValidatedEvent {
    /// Key whose value changed
    pub key_name: String,
    /// Profile that committed the change
    pub profile: Arc<SettingsProfile>,
    /// Timestamp of the event
    pub timestamp: DateTime<Utc>,
}

impl ChangesValidatedEvent {
    pub fn new(key_name: impl Into<String>, profile: Arc<SettingsProfile>) -> Self {
        Self {
            key_name: key_name.into(),
            profile,
            timestamp: Utc::now(),
        }
    }
}

/// A settings file was loaded or reloaded
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SettingsFileLoadedEvent {
    /// Path of the file
    pub path: PathBuf,
    /// Timestamp of the event
    pub timestamp: DateTime<Utc>,
}

impl SettingsFileLoadedEvent {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            timestamp: Utc::now(),
        }
    }
}

/// The backing file of a profile changed outside of a save
///
/// Any handler may call [`FileModifiedEvent::request_reload`]; the container
/// then reloads the profile once all handlers have run.
#[derive(Debug)]
pub struct FileModifiedEvent {
    /// Profile backed by the file
    pub profile: Arc<SettingsProfile>,
    /// Path of the modified file
    pub path: PathBuf,
    reload_file: AtomicBool,
}

impl FileModifiedEvent {
    pub fn new(profile: Arc<SettingsProfile>, path: impl Into<PathBuf>) -> Self {
        Self {
            profile,
            path: path.into(),
            reload_file: AtomicBool::new(false),
        }
    }

    pub fn request_reload(&self) {
        self.reload_file.store(true, Ordering::SeqCst);
    }

    pub fn reload_requested(&self) -> bool {
        self.reload_file.load(Ordering::SeqCst)
    }
}
