//! Settings container - key registry and profile lifecycle
//!
//! The container owns the root profile, every registered key and every live
//! profile. Registration and profile add/remove/switch run under a single
//! container lock. Values are decoded and notifications raised after that
//! lock is released, so default factories and handlers may read settings.

use super::collaborators::{FileChangeCallback, FileSystem, FileWatcher, SettingsSerializer};
use super::events::{FileModifiedEvent, Observers, SettingsFileLoadedEvent, SubscriptionId};
use super::key::SettingsKeyDescriptor;
use super::profile::SettingsProfile;
use super::value::EntryValue;
use crate::config::SettingsConfig;
use crate::contract::{is_sequence, SettingsDocument, SettingsError};
use crate::infra::{LocalFileSystem, YamlSettingsSerializer};
use anyhow::Context;
use parking_lot::{Mutex, MutexGuard};
use std::collections::BTreeMap;
use std::fmt;
use std::io::Write;
use std::path::Path;
use std::sync::{Arc, Weak};

type KeyTable = BTreeMap<String, Arc<dyn SettingsKeyDescriptor>>;

struct ContainerState {
    keys: KeyTable,
    profiles: Vec<Arc<SettingsProfile>>,
    current: Arc<SettingsProfile>,
}

impl ContainerState {
    fn is_registered(&self, profile: &Arc<SettingsProfile>) -> bool {
        self.profiles.iter().any(|p| Arc::ptr_eq(p, profile))
    }
}

pub(crate) struct ContainerShared {
    state: Mutex<ContainerState>,
    root: Arc<SettingsProfile>,
    config: SettingsConfig,
    serializer: Arc<dyn SettingsSerializer>,
    file_system: Arc<dyn FileSystem>,
    watcher: Option<Arc<dyn FileWatcher>>,
    settings_file_loaded: Observers<SettingsFileLoadedEvent>,
}

/// Handle to a settings container
///
/// Cloning is cheap; every clone refers to the same registry.
#[derive(Clone)]
pub struct SettingsContainer {
    shared: Arc<ContainerShared>,
}

impl SettingsContainer {
    /// Container with the default configuration, YAML files on the local disk
    pub fn new() -> Self {
        Self::builder().build()
    }

    pub fn with_config(config: SettingsConfig) -> Self {
        Self::builder().config(config).build()
    }

    pub fn builder() -> SettingsContainerBuilder {
        SettingsContainerBuilder::default()
    }

    pub(crate) fn upgrade(shared: &Weak<ContainerShared>) -> Option<Self> {
        shared.upgrade().map(|shared| Self { shared })
    }

    pub(crate) fn downgrade(&self) -> Weak<ContainerShared> {
        Arc::downgrade(&self.shared)
    }

    // ===== Accessors =====

    pub fn config(&self) -> &SettingsConfig {
        &self.shared.config
    }

    /// Profile holding the default value of every key
    pub fn root_profile(&self) -> Arc<SettingsProfile> {
        Arc::clone(&self.shared.root)
    }

    pub fn current_profile(&self) -> Arc<SettingsProfile> {
        Arc::clone(&self.shared.state.lock().current)
    }

    /// Every live profile, root first
    pub fn profiles(&self) -> Vec<Arc<SettingsProfile>> {
        self.shared.state.lock().profiles.clone()
    }

    pub fn get_settings_key(&self, name: &str) -> Option<Arc<dyn SettingsKeyDescriptor>> {
        self.shared.state.lock().keys.get(name).cloned()
    }

    /// Registered keys, ordered by name
    pub fn all_settings_keys(&self) -> Vec<Arc<dyn SettingsKeyDescriptor>> {
        self.shared.state.lock().keys.values().cloned().collect()
    }

    // ===== Key registry =====

    /// Add a key to the registry and write its default into the root profile
    ///
    /// Raw entries already loaded under `name` in other profiles are decoded
    /// through the new key.
    pub(crate) fn register_key(
        &self,
        name: &str,
        default_value: EntryValue,
        key: Arc<dyn SettingsKeyDescriptor>,
    ) -> Result<(), SettingsError> {
        let profiles: Vec<_> = {
            let mut state = self.shared.state.lock();
            if state.keys.contains_key(name) {
                tracing::warn!(key = %name, "Settings key already registered");
                return Err(SettingsError::DuplicateKey {
                    name: name.to_string(),
                });
            }

            self.shared.root.insert_default(name, default_value, key.is_list());
            state.keys.insert(name.to_string(), Arc::clone(&key));
            state.profiles.iter().filter(|p| !p.is_root()).cloned().collect()
        };

        // decoding may fall back to a default factory that reads settings
        for profile in profiles {
            profile.convert_entry(key.as_ref());
        }

        tracing::debug!(key = %name, "Registered settings key");
        Ok(())
    }

    // ===== Profile lifecycle =====

    /// Create an empty profile inheriting from `parent` (default: root)
    pub fn create_profile(
        &self,
        set_as_current: bool,
        parent: Option<&Arc<SettingsProfile>>,
    ) -> Result<Arc<SettingsProfile>, SettingsError> {
        let mut state = self.shared.state.lock();
        let parent = self.resolve_parent(&state, parent)?;
        let profile = Arc::new(SettingsProfile::new(self.downgrade(), Some(parent)));

        state.profiles.push(Arc::clone(&profile));
        if set_as_current {
            self.activate(state, &profile);
        }
        tracing::debug!(profile = %profile.id(), "Created settings profile");
        Ok(profile)
    }

    /// Load a profile from `path`
    ///
    /// Nothing is registered when the file is missing or cannot be parsed.
    pub fn load_profile(
        &self,
        path: impl AsRef<Path>,
        set_as_current: bool,
        parent: Option<&Arc<SettingsProfile>>,
    ) -> Result<Arc<SettingsProfile>, SettingsError> {
        let path = path.as_ref();
        let document = self.read_document(path)?;
        let parent = self.resolve_parent(&self.shared.state.lock(), parent)?;

        let profile = Arc::new(SettingsProfile::new(self.downgrade(), Some(parent)));
        profile.set_file_path(path);
        self.decode_settings(&document, &profile);

        let mut state = self.shared.state.lock();
        state.profiles.push(Arc::clone(&profile));
        let late_keys = Self::undecoded_keys(&state.keys, &profile);
        if set_as_current {
            self.activate(state, &profile);
        } else {
            drop(state);
        }
        for key in late_keys {
            profile.convert_entry(key.as_ref());
        }

        if self.shared.config.monitor_file_modification {
            if let Err(err) = self.set_monitor_file_modification(&profile, true) {
                tracing::warn!(path = %path.display(), error = %err, "Settings file will not be monitored");
            }
        }

        tracing::info!(path = %path.display(), count = document.len(), "Loaded settings file");
        self.shared
            .settings_file_loaded
            .emit(&SettingsFileLoadedEvent::new(path));
        Ok(profile)
    }

    /// Re-read the backing file of `profile` into the same profile
    ///
    /// The file is parsed completely before any entry is touched; a parse
    /// failure leaves the profile unchanged. Changed values are recorded as
    /// pending changes of the profile.
    pub fn reload_profile(&self, profile: &Arc<SettingsProfile>) -> Result<(), SettingsError> {
        let path = profile.file_path().ok_or(SettingsError::MissingFilePath {
            profile_id: profile.id(),
        })?;
        let document = self.read_document(&path)?;
        self.decode_settings(&document, profile);

        tracing::info!(path = %path.display(), count = document.len(), "Reloaded settings file");
        self.shared
            .settings_file_loaded
            .emit(&SettingsFileLoadedEvent::new(path));
        Ok(())
    }

    /// Remove a profile from the container
    ///
    /// The root profile and the current profile cannot be unloaded.
    pub fn unload_profile(&self, profile: &Arc<SettingsProfile>) -> Result<(), SettingsError> {
        {
            let mut state = self.shared.state.lock();
            if Arc::ptr_eq(profile, &self.shared.root) {
                return Err(SettingsError::invalid_operation("the root profile cannot be unloaded"));
            }
            if Arc::ptr_eq(profile, &state.current) {
                return Err(SettingsError::invalid_operation("the current profile cannot be unloaded"));
            }
            if !state.is_registered(profile) {
                return Err(SettingsError::invalid_operation(format!(
                    "profile {} is not loaded in this container",
                    profile.id()
                )));
            }
            state.profiles.retain(|p| !Arc::ptr_eq(p, profile));
        }

        profile.stop_watching();
        tracing::debug!(profile = %profile.id(), "Unloaded settings profile");
        Ok(())
    }

    /// Write `profile` to `path`
    ///
    /// When `path` differs from the profile's backing file, the profile moves
    /// to it and the previous file is deleted if the configuration says so.
    pub fn save_profile(&self, profile: &Arc<SettingsProfile>, path: impl AsRef<Path>) -> Result<(), SettingsError> {
        let path = path.as_ref();

        profile.set_saving(true);
        let _saving = scopeguard::guard((), |_| profile.set_saving(false));

        let document = self.encode_settings(profile);
        self.write_document(path, &document).map_err(|source| {
            tracing::error!(path = %path.display(), error = %format!("{source:#}"), "Error while saving settings file");
            SettingsError::Serialization {
                path: path.to_path_buf(),
                source,
            }
        })?;

        let previous = profile.file_path();
        if previous.as_deref() != Some(path) {
            if let Some(previous) = previous.filter(|_| self.shared.config.delete_previous_file_on_move) {
                self.remove_previous_file(&previous)?;
            }
            profile.set_file_path(path);

            if profile.monitor_file_modification() {
                if let Err(err) = self.set_monitor_file_modification(profile, true) {
                    tracing::warn!(path = %path.display(), error = %err, "Saved settings file will not be monitored");
                    // the previous file is no longer the backing file
                    drop(profile.replace_watch(true, None));
                }
            }
        }

        tracing::info!(path = %path.display(), count = document.len(), "Saved settings file");
        Ok(())
    }

    /// Make `profile` the current profile
    ///
    /// Every registered key whose resolved value differs between the old and
    /// the new profile is reported once through its "changes validated"
    /// notification, raised on the new profile.
    pub fn set_current_profile(&self, profile: &Arc<SettingsProfile>) -> Result<(), SettingsError> {
        let state = self.shared.state.lock();
        if !state.is_registered(profile) {
            return Err(SettingsError::invalid_operation(format!(
                "profile {} is not loaded in this container",
                profile.id()
            )));
        }
        self.activate(state, profile);
        Ok(())
    }

    fn activate(&self, mut state: MutexGuard<'_, ContainerState>, profile: &Arc<SettingsProfile>) {
        let previous = std::mem::replace(&mut state.current, Arc::clone(profile));
        if Arc::ptr_eq(&previous, profile) {
            return;
        }

        let keys: Vec<_> = state.keys.values().cloned().collect();
        drop(state);

        // normalizing may fall back to a default factory that reads settings
        for key in &keys {
            let name = key.name();
            let old_value = previous.get_value(name, true, false).map(|v| key.normalize(v));
            let new_value = profile.get_value(name, true, false).map(|v| key.normalize(v));
            if old_value != new_value {
                profile.notify_entry_changed(name);
            }
        }

        tracing::debug!(from = %previous.id(), to = %profile.id(), "Switched current settings profile");
        profile.validate_settings_changes();
    }

    // ===== Encode / decode =====

    /// Serializable form of every entry of `profile`
    ///
    /// Entries that cannot be encoded are skipped.
    pub fn encode_settings(&self, profile: &SettingsProfile) -> SettingsDocument {
        let keys = self.keys_snapshot();
        let mut document = SettingsDocument::new();
        for entry in profile.entries_snapshot() {
            let key = keys.get(entry.name());
            match entry.get_serializable_value(key.map(|k| k.as_ref())) {
                Ok(events) => document.insert(entry.name(), events),
                Err(err) => {
                    tracing::debug!(key = %entry.name(), error = %err, "Skipping settings entry");
                }
            }
        }
        document
    }

    /// Write every setting of `document` into `profile`
    ///
    /// Settings without a registered key are kept raw. Values are decoded
    /// without holding the container lock.
    pub fn decode_settings(&self, document: &SettingsDocument, profile: &SettingsProfile) {
        let keys = self.keys_snapshot();
        for (name, events) in document.iter() {
            match keys.get(name) {
                Some(key) => {
                    let value = key.convert_raw(events);
                    profile.set_value_with_kind(name, value, key.is_list());
                }
                None => profile.set_value_with_kind(name, EntryValue::raw(events.clone()), is_sequence(events)),
            }
        }

        // keys registered while decoding
        let late_keys = Self::undecoded_keys(&self.shared.state.lock().keys, profile);
        for key in late_keys {
            profile.convert_entry(key.as_ref());
        }
    }

    fn keys_snapshot(&self) -> KeyTable {
        self.shared.state.lock().keys.clone()
    }

    /// Registered keys for which `profile` still holds a raw entry
    fn undecoded_keys(keys: &KeyTable, profile: &SettingsProfile) -> Vec<Arc<dyn SettingsKeyDescriptor>> {
        profile
            .raw_entry_names()
            .iter()
            .filter_map(|name| keys.get(name).cloned())
            .collect()
    }

    /// Reset to a near-initial state: root is current and empty, no keys
    ///
    /// Pending changes of the root profile are validated first. The root
    /// profile stays registered.
    pub fn clear_settings(&self) {
        let state = self.shared.state.lock();
        self.activate(state, &self.shared.root);
        self.shared.root.validate_settings_changes();

        let detached: Vec<_> = {
            let mut state = self.shared.state.lock();
            let detached = state.profiles.drain(..).filter(|p| !p.is_root()).collect();
            state.profiles.push(Arc::clone(&self.shared.root));
            state.keys.clear();
            detached
        };

        self.shared.root.clear_entries();
        for profile in detached {
            profile.stop_watching();
        }
        tracing::debug!("Cleared settings container");
    }

    // ===== Notifications =====

    pub fn on_settings_file_loaded(
        &self,
        handler: impl Fn(&SettingsFileLoadedEvent) + Send + Sync + 'static,
    ) -> SubscriptionId {
        self.shared.settings_file_loaded.subscribe(handler)
    }

    pub fn remove_settings_file_loaded_handler(&self, id: SubscriptionId) -> bool {
        self.shared.settings_file_loaded.unsubscribe(id)
    }

    // ===== File monitoring =====

    /// Start or stop watching the backing file of `profile`
    ///
    /// Without a configured watcher, or before the profile has a backing
    /// file, only the flag is recorded; the watch starts on the next save.
    pub fn set_monitor_file_modification(
        &self,
        profile: &Arc<SettingsProfile>,
        enabled: bool,
    ) -> Result<(), SettingsError> {
        if !enabled {
            profile.stop_watching();
            return Ok(());
        }

        let watch = match (&self.shared.watcher, profile.file_path()) {
            (Some(watcher), Some(path)) => {
                let subscription = watcher.watch(&path, self.file_change_callback(profile)).map_err(|source| {
                    tracing::error!(path = %path.display(), error = %format!("{source:#}"), "Cannot watch settings file");
                    SettingsError::Watch {
                        path: path.clone(),
                        source,
                    }
                })?;
                Some(subscription)
            }
            _ => None,
        };

        let previous = profile.replace_watch(true, watch);
        drop(previous);
        Ok(())
    }

    fn file_change_callback(&self, profile: &Arc<SettingsProfile>) -> FileChangeCallback {
        let container = self.downgrade();
        let profile = Arc::downgrade(profile);
        Arc::new(move || {
            let (Some(container), Some(profile)) = (SettingsContainer::upgrade(&container), profile.upgrade()) else {
                return;
            };
            container.notify_file_modified(&profile);
        })
    }

    /// React to an external change of the backing file of `profile`
    ///
    /// Changes seen while the profile is being saved are ignored. Otherwise
    /// the profile raises its "file modified" event and is reloaded if a
    /// handler asked for it.
    pub fn notify_file_modified(&self, profile: &Arc<SettingsProfile>) {
        if profile.is_saving() {
            tracing::trace!(profile = %profile.id(), "Ignoring change caused by our own save");
            return;
        }
        let Some(path) = profile.file_path() else {
            return;
        };

        let event = FileModifiedEvent::new(Arc::clone(profile), path.clone());
        profile.emit_file_modified(&event);
        if event.reload_requested() {
            if let Err(err) = self.reload_profile(profile) {
                tracing::error!(path = %path.display(), error = %err, "Reload after external change failed");
            }
        }
    }

    // ===== I/O helpers =====

    fn read_document(&self, path: &Path) -> Result<SettingsDocument, SettingsError> {
        if !self.shared.file_system.exists(path) {
            tracing::error!(path = %path.display(), "Settings file was not found");
            return Err(SettingsError::FileNotFound {
                path: path.to_path_buf(),
            });
        }

        self.shared
            .file_system
            .open_read(path)
            .and_then(|mut reader| self.shared.serializer.deserialize(&mut *reader))
            .map_err(|source| {
                tracing::error!(path = %path.display(), error = %format!("{source:#}"), "Error while loading settings file");
                SettingsError::Deserialization {
                    path: path.to_path_buf(),
                    source,
                }
            })
    }

    fn write_document(&self, path: &Path, document: &SettingsDocument) -> anyhow::Result<()> {
        if let Some(directory) = path.parent() {
            self.shared
                .file_system
                .create_dir_all(directory)
                .with_context(|| format!("cannot create directory {}", directory.display()))?;
        }
        let mut writer = self.shared.file_system.open_write(path)?;
        self.shared.serializer.serialize(&mut *writer, document)?;
        writer.flush()?;
        Ok(())
    }

    fn remove_previous_file(&self, previous: &Path) -> Result<(), SettingsError> {
        if !self.shared.file_system.exists(previous) {
            return Ok(());
        }
        self.shared.file_system.remove_file(previous).map_err(|source| {
            tracing::error!(path = %previous.display(), error = %format!("{source:#}"), "Cannot delete previous settings file");
            SettingsError::Serialization {
                path: previous.to_path_buf(),
                source,
            }
        })
    }

    /// `parent`, or root when absent; a parent must be loaded in this container
    fn resolve_parent(
        &self,
        state: &ContainerState,
        parent: Option<&Arc<SettingsProfile>>,
    ) -> Result<Arc<SettingsProfile>, SettingsError> {
        match parent {
            None => Ok(Arc::clone(&self.shared.root)),
            Some(parent) if state.is_registered(parent) => Ok(Arc::clone(parent)),
            Some(parent) => Err(SettingsError::invalid_operation(format!(
                "parent profile {} is not loaded in this container",
                parent.id()
            ))),
        }
    }
}

impl Default for SettingsContainer {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for SettingsContainer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.shared.state.lock();
        f.debug_struct("SettingsContainer")
            .field("keys", &state.keys.len())
            .field("profiles", &state.profiles.len())
            .field("current", &state.current.id())
            .finish()
    }
}

/// Builder for [`SettingsContainer`]
#[derive(Default)]
pub struct SettingsContainerBuilder {
    config: SettingsConfig,
    serializer: Option<Arc<dyn SettingsSerializer>>,
    file_system: Option<Arc<dyn FileSystem>>,
    watcher: Option<Arc<dyn FileWatcher>>,
}

impl SettingsContainerBuilder {
    pub fn config(mut self, config: SettingsConfig) -> Self {
        self.config = config;
        self
    }

    /// Defaults to [`YamlSettingsSerializer`] built from the configuration
    pub fn serializer(mut self, serializer: Arc<dyn SettingsSerializer>) -> Self {
        self.serializer = Some(serializer);
        self
    }

    /// Defaults to [`LocalFileSystem`]
    pub fn file_system(mut self, file_system: Arc<dyn FileSystem>) -> Self {
        self.file_system = Some(file_system);
        self
    }

    pub fn file_watcher(mut self, watcher: Arc<dyn FileWatcher>) -> Self {
        self.watcher = Some(watcher);
        self
    }

    pub fn build(self) -> SettingsContainer {
        let serializer = self
            .serializer
            .unwrap_or_else(|| Arc::new(YamlSettingsSerializer::from_config(&self.config)));
        let file_system = self.file_system.unwrap_or_else(|| Arc::new(LocalFileSystem));

        let shared = Arc::new_cyclic(|weak: &Weak<ContainerShared>| {
            let root = Arc::new(SettingsProfile::new(weak.clone(), None));
            ContainerShared {
                state: Mutex::new(ContainerState {
                    keys: BTreeMap::new(),
                    profiles: vec![Arc::clone(&root)],
                    current: Arc::clone(&root),
                }),
                root,
                config: self.config,
                serializer,
                file_system,
                watcher: self.watcher,
                settings_file_loaded: Observers::new(),
            }
        });
        SettingsContainer { shared }
    }
}
