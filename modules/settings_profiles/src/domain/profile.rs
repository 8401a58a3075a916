//! Settings profiles and inheritance resolution
//!
//! A profile holds its own entries and falls back to its parent for every
//! name it does not hold. The root profile has no parent and carries the
//! default value of every registered key.

use super::collaborators::WatchSubscription;
use super::container::{ContainerShared, SettingsContainer};
use super::entry::SettingsEntry;
use super::events::{FileModifiedEvent, Observers, SubscriptionId};
use super::key::SettingsKeyDescriptor;
use super::transaction::{TransactionStack, ValueChangeOperation};
use super::value::EntryValue;
use crate::contract::SettingsError;
use parking_lot::Mutex;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use uuid::Uuid;

#[derive(Default)]
struct ProfileState {
    entries: BTreeMap<String, SettingsEntry>,
    file_path: Option<PathBuf>,
    modified_names: BTreeSet<String>,
    transactions: TransactionStack,
    is_discarding: bool,
    monitor_file_modification: bool,
    watch: Option<WatchSubscription>,
}

/// A named, inheritable collection of setting values
pub struct SettingsProfile {
    id: Uuid,
    container: Weak<ContainerShared>,
    parent: Option<Arc<SettingsProfile>>,
    state: Mutex<ProfileState>,
    saving: AtomicBool,
    file_modified: Observers<FileModifiedEvent>,
}

impl SettingsProfile {
    pub(crate) fn new(container: Weak<ContainerShared>, parent: Option<Arc<SettingsProfile>>) -> Self {
        Self {
            id: Uuid::new_v4(),
            container,
            parent,
            state: Mutex::new(ProfileState::default()),
            saving: AtomicBool::new(false),
            file_modified: Observers::new(),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn parent(&self) -> Option<&Arc<SettingsProfile>> {
        self.parent.as_ref()
    }

    pub fn is_root(&self) -> bool {
        self.parent.is_none()
    }

    /// Container owning this profile, if it is still alive
    pub fn container(&self) -> Option<SettingsContainer> {
        SettingsContainer::upgrade(&self.container)
    }

    // ===== Lookup =====

    /// Resolve the value stored under `name`
    ///
    /// A local entry always wins. With `create_in_current`, a value inherited
    /// from the parent chain is copied into a new local entry first, so later
    /// lookups and writes stay local. Otherwise, with `search_parent`, the
    /// lookup is delegated to the parent.
    pub fn get_value(&self, name: &str, search_parent: bool, create_in_current: bool) -> Option<EntryValue> {
        let local = self.state.lock().entries.get(name).map(|entry| entry.value().clone());
        if local.is_some() {
            return local;
        }

        if create_in_current {
            let (value, is_list) = self.parent.as_ref()?.find_inherited(name)?;
            let mut state = self.state.lock();
            let entry = state
                .entries
                .entry(name.to_string())
                .or_insert_with(|| SettingsEntry::from_value(name, value, is_list));
            tracing::trace!(profile = %self.id, key = %name, "Materialized inherited value");
            return Some(entry.value().clone());
        }

        if search_parent {
            return self.parent.as_ref()?.get_value(name, true, false);
        }

        None
    }

    /// Nearest value along the chain starting at this profile
    fn find_inherited(&self, name: &str) -> Option<(EntryValue, bool)> {
        let local = self
            .state
            .lock()
            .entries
            .get(name)
            .map(|entry| (entry.value().clone(), entry.is_list()));
        match local {
            Some(found) => Some(found),
            None => self.parent.as_ref()?.find_inherited(name),
        }
    }

    /// Copy of the local entry stored under `name`
    pub fn entry(&self, name: &str) -> Option<SettingsEntry> {
        self.state.lock().entries.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.state.lock().entries.contains_key(name)
    }

    /// Names of the local entries, ordered
    pub fn entry_names(&self) -> Vec<String> {
        self.state.lock().entries.keys().cloned().collect()
    }

    pub(crate) fn entries_snapshot(&self) -> Vec<SettingsEntry> {
        self.state.lock().entries.values().cloned().collect()
    }

    // ===== Mutation =====

    /// Write `value` under `name`
    ///
    /// When a key with that name is registered, raw values are decoded
    /// through it. Replacing an existing entry is change-tracked; creating a
    /// new one is not.
    pub fn set_value(&self, name: &str, value: EntryValue) {
        let key = self.container().and_then(|container| container.get_settings_key(name));
        let (value, is_list) = match key {
            Some(key) => (key.normalize(value), key.is_list()),
            None => {
                let is_list = value.looks_like_list();
                (value, is_list)
            }
        };
        self.set_value_with_kind(name, value, is_list);
    }

    /// Write without consulting the container; safe while the container lock is held
    pub(crate) fn set_value_with_kind(&self, name: &str, value: EntryValue, is_list: bool) {
        let mut guard = self.state.lock();
        let state = &mut *guard;
        match state.entries.get_mut(name) {
            Some(entry) => {
                if let Some(previous) = entry.update_value(value, state.is_discarding) {
                    state.transactions.begin_transaction();
                    state.transactions.push_operation(ValueChangeOperation {
                        name: name.to_string(),
                        previous,
                    });
                    state.transactions.complete_transaction();
                    state.modified_names.insert(name.to_string());
                }
            }
            None => {
                state
                    .entries
                    .insert(name.to_string(), SettingsEntry::from_value(name, value, is_list));
            }
        }
    }

    /// Enable or disable change tracking for the local entry `name`
    pub fn set_should_notify(&self, name: &str, should_notify: bool) -> bool {
        match self.state.lock().entries.get_mut(name) {
            Some(entry) => {
                entry.set_should_notify(should_notify);
                true
            }
            None => false,
        }
    }

    /// Remove the local entry; lookups fall back to the parent again
    pub fn remove_entry(&self, name: &str) -> Option<SettingsEntry> {
        let mut state = self.state.lock();
        state.modified_names.remove(name);
        state.entries.remove(name)
    }

    /// Mark `name` as changed since the last validate or discard
    pub fn notify_entry_changed(&self, name: &str) {
        self.state.lock().modified_names.insert(name.to_string());
    }

    pub fn modified_names(&self) -> BTreeSet<String> {
        self.state.lock().modified_names.clone()
    }

    /// Number of committed transactions waiting for validate or discard
    pub fn transaction_count(&self) -> usize {
        self.state.lock().transactions.transaction_count()
    }

    /// Commit pending changes
    ///
    /// Clears the undo log and the modified set, then fires the "changes
    /// validated" notification of every registered key that was modified.
    /// Values are left untouched.
    pub fn validate_settings_changes(self: &Arc<Self>) {
        let names = {
            let mut state = self.state.lock();
            state.transactions.clear();
            std::mem::take(&mut state.modified_names)
        };
        if names.is_empty() {
            return;
        }

        let Some(container) = self.container() else {
            return;
        };
        tracing::debug!(profile = %self.id, count = names.len(), "Validating settings changes");
        for name in &names {
            if let Some(key) = container.get_settings_key(name) {
                key.notify_changes_validated(self);
            }
        }
    }

    /// Roll every pending change back, newest first
    pub fn discard_settings_changes(&self) {
        let mut guard = self.state.lock();
        let state = &mut *guard;
        state.is_discarding = true;
        for operation in state.transactions.drain_for_rollback() {
            if let Some(entry) = state.entries.get_mut(&operation.name) {
                entry.update_value(operation.previous, true);
            }
        }
        state.transactions.clear();
        state.modified_names.clear();
        state.is_discarding = false;
    }

    /// Store a key default; replaces any local entry without tracking
    pub(crate) fn insert_default(&self, name: &str, value: EntryValue, is_list: bool) {
        self.state
            .lock()
            .entries
            .insert(name.to_string(), SettingsEntry::from_value(name, value, is_list));
    }

    /// Decode a raw local entry now that `key` is known
    ///
    /// Decoding runs outside the profile lock.
    pub(crate) fn convert_entry(&self, key: &dyn SettingsKeyDescriptor) {
        let events = match self.state.lock().entries.get(key.name()).map(SettingsEntry::value) {
            Some(EntryValue::Raw(events)) => events.clone(),
            _ => return,
        };
        let decoded = key.convert_raw(&events);

        let mut state = self.state.lock();
        if let Some(entry) = state.entries.get_mut(key.name()) {
            if entry.value().is_raw() {
                entry.replace_untracked(decoded, key.is_list());
            }
        }
    }

    pub(crate) fn raw_entry_names(&self) -> Vec<String> {
        self.state
            .lock()
            .entries
            .values()
            .filter(|entry| entry.value().is_raw())
            .map(|entry| entry.name().to_string())
            .collect()
    }

    pub(crate) fn clear_entries(&self) {
        let mut state = self.state.lock();
        state.entries.clear();
        state.modified_names.clear();
        state.transactions.clear();
    }

    // ===== File backing =====

    pub fn file_path(&self) -> Option<PathBuf> {
        self.state.lock().file_path.clone()
    }

    pub(crate) fn set_file_path(&self, path: impl Into<PathBuf>) {
        self.state.lock().file_path = Some(path.into());
    }

    /// `true` while the container writes this profile to disk
    pub fn is_saving(&self) -> bool {
        self.saving.load(Ordering::SeqCst)
    }

    pub(crate) fn set_saving(&self, saving: bool) {
        self.saving.store(saving, Ordering::SeqCst);
    }

    pub fn monitor_file_modification(&self) -> bool {
        self.state.lock().monitor_file_modification
    }

    /// Start or stop watching the backing file
    pub fn set_monitor_file_modification(self: &Arc<Self>, enabled: bool) -> Result<(), SettingsError> {
        let container = self.container().ok_or_else(|| {
            SettingsError::invalid_operation(format!("profile {} has no live container", self.id))
        })?;
        container.set_monitor_file_modification(self, enabled)
    }

    /// Replace the active watch; the previous one is returned for release
    pub(crate) fn replace_watch(
        &self,
        monitor: bool,
        watch: Option<WatchSubscription>,
    ) -> Option<WatchSubscription> {
        let mut state = self.state.lock();
        state.monitor_file_modification = monitor;
        std::mem::replace(&mut state.watch, watch)
    }

    pub(crate) fn stop_watching(&self) {
        // released outside of the profile lock
        let previous = self.replace_watch(false, None);
        drop(previous);
    }

    pub fn on_file_modified(
        &self,
        handler: impl Fn(&FileModifiedEvent) + Send + Sync + 'static,
    ) -> SubscriptionId {
        self.file_modified.subscribe(handler)
    }

    pub fn remove_file_modified_handler(&self, id: SubscriptionId) -> bool {
        self.file_modified.unsubscribe(id)
    }

    pub(crate) fn emit_file_modified(&self, event: &FileModifiedEvent) {
        self.file_modified.emit(event);
    }
}

impl fmt::Debug for SettingsProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SettingsProfile")
            .field("id", &self.id)
            .field("parent", &self.parent.as_ref().map(|parent| parent.id))
            .field("file_path", &self.file_path())
            .finish()
    }
}
