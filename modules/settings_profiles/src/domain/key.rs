//! Typed settings keys
//!
//! A key is the single source of truth for the name, type and default value
//! of a setting. Creating a key registers it with a [`SettingsContainer`],
//! which writes the default into the root profile.

use super::container::{ContainerShared, SettingsContainer};
use super::events::{ChangesValidatedEvent, Observers, SubscriptionId};
use super::profile::SettingsProfile;
use super::value::{DecodedValue, EntryValue, SettingValue};
use crate::contract::{ParsingEvent, RawEvents, SettingsError};
use crate::infra::serialization::{from_events, to_events};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt;
use std::ops::Deref;
use std::sync::{Arc, Weak};

/// Types usable as the value of a key
pub trait KeyValue: SettingValue + Clone + PartialEq + Serialize + DeserializeOwned {}

impl<T> KeyValue for T where T: SettingValue + Clone + PartialEq + Serialize + DeserializeOwned {}

/// Type-erased view of a registered key, as stored in the container
pub trait SettingsKeyDescriptor: Send + Sync {
    fn name(&self) -> &str;

    fn display_name(&self) -> &str;

    fn description(&self) -> &str;

    /// Rust type of the value
    fn type_name(&self) -> &'static str;

    fn is_list(&self) -> bool;

    fn default_entry_value(&self) -> EntryValue;

    /// Decode raw events, falling back to the default on failure
    fn convert_raw(&self, events: &[ParsingEvent]) -> EntryValue;

    /// Decode raw values and leave decoded ones untouched
    fn normalize(&self, value: EntryValue) -> EntryValue {
        match value {
            EntryValue::Raw(events) => self.convert_raw(&events),
            decoded => decoded,
        }
    }

    fn encode(&self, value: &DecodedValue) -> Result<RawEvents, SettingsError>;

    fn notify_changes_validated(&self, profile: &Arc<SettingsProfile>);
}

impl fmt::Debug for dyn SettingsKeyDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SettingsKeyDescriptor")
            .field("name", &self.name())
            .field("type", &self.type_name())
            .finish()
    }
}

/// Default value of a key: a value, or a factory building a fresh one
pub enum DefaultValue<T> {
    Value(T),
    Factory(Arc<dyn Fn() -> T + Send + Sync>),
}

impl<T: Clone> DefaultValue<T> {
    pub fn get(&self) -> T {
        match self {
            Self::Value(value) => value.clone(),
            Self::Factory(factory) => factory(),
        }
    }
}

type AcceptableValues<T> = Arc<dyn Fn() -> Vec<T> + Send + Sync>;

struct KeyInner<T> {
    name: String,
    display_name: String,
    description: String,
    default: DefaultValue<T>,
    acceptable_values: Option<AcceptableValues<T>>,
    is_list: bool,
    changes_validated: Observers<ChangesValidatedEvent>,
    container: Weak<ContainerShared>,
}

impl<T: KeyValue> KeyInner<T> {
    fn convert_value(&self, events: &[ParsingEvent]) -> T {
        match from_events::<T>(events) {
            Ok(value) => value,
            Err(err) => {
                tracing::warn!(
                    key = %self.name,
                    error = %err,
                    "Settings value does not match the key type, using the default value"
                );
                self.default.get()
            }
        }
    }

    fn extract(&self, value: EntryValue) -> T {
        match value {
            EntryValue::Raw(events) => self.convert_value(&events),
            EntryValue::Decoded(decoded) => match decoded.downcast_ref::<T>() {
                Some(value) => value.clone(),
                None => {
                    tracing::warn!(
                        key = %self.name,
                        expected = std::any::type_name::<T>(),
                        "Settings value has an unexpected type, using the default value"
                    );
                    self.default.get()
                }
            },
        }
    }
}

impl<T: KeyValue> SettingsKeyDescriptor for KeyInner<T> {
    fn name(&self) -> &str {
        &self.name
    }

    fn display_name(&self) -> &str {
        &self.display_name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn type_name(&self) -> &'static str {
        std::any::type_name::<T>()
    }

    fn is_list(&self) -> bool {
        self.is_list
    }

    fn default_entry_value(&self) -> EntryValue {
        EntryValue::decoded(self.default.get())
    }

    fn convert_raw(&self, events: &[ParsingEvent]) -> EntryValue {
        EntryValue::decoded(self.convert_value(events))
    }

    fn encode(&self, value: &DecodedValue) -> Result<RawEvents, SettingsError> {
        let typed = value
            .downcast_ref::<T>()
            .ok_or_else(|| SettingsError::Conversion {
                name: self.name.clone(),
                reason: format!("value is not a {}", std::any::type_name::<T>()),
            })?;
        to_events(typed).map_err(|err| SettingsError::Conversion {
            name: self.name.clone(),
            reason: err.to_string(),
        })
    }

    fn notify_changes_validated(&self, profile: &Arc<SettingsProfile>) {
        self.changes_validated
            .emit(&ChangesValidatedEvent::new(self.name.clone(), Arc::clone(profile)));
    }
}

/// Builder for [`SettingsKey`]
pub struct SettingsKeyBuilder<T> {
    name: String,
    display_name: Option<String>,
    description: String,
    default: DefaultValue<T>,
    acceptable_values: Option<AcceptableValues<T>>,
    is_list: bool,
}

impl<T: KeyValue> SettingsKeyBuilder<T> {
    fn new(name: impl Into<String>, default: DefaultValue<T>) -> Self {
        Self {
            name: name.into(),
            display_name: None,
            description: String::new(),
            default,
            acceptable_values: None,
            is_list: false,
        }
    }

    pub fn display_name(mut self, display_name: impl Into<String>) -> Self {
        self.display_name = Some(display_name.into());
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Provider of the values a user may pick from
    pub fn acceptable_values(mut self, provider: impl Fn() -> Vec<T> + Send + Sync + 'static) -> Self {
        self.acceptable_values = Some(Arc::new(provider));
        self
    }

    /// Create the key and register it with `container`
    pub fn register(self, container: &SettingsContainer) -> Result<SettingsKey<T>, SettingsError> {
        let display_name = self
            .display_name
            .unwrap_or_else(|| default_display_name(&self.name));
        let inner = Arc::new(KeyInner {
            name: self.name,
            display_name,
            description: self.description,
            default: self.default,
            acceptable_values: self.acceptable_values,
            is_list: self.is_list,
            changes_validated: Observers::new(),
            container: container.downgrade(),
        });

        let descriptor: Arc<dyn SettingsKeyDescriptor> = inner.clone();
        container.register_key(&inner.name, inner.default_entry_value(), descriptor)?;
        Ok(SettingsKey { inner })
    }
}

/// Last path segment of a key name
fn default_display_name(name: &str) -> String {
    name.rsplit(['/', '.'])
        .next()
        .filter(|segment| !segment.is_empty())
        .unwrap_or(name)
        .to_string()
}

/// A typed, registered setting
pub struct SettingsKey<T> {
    inner: Arc<KeyInner<T>>,
}

impl<T> Clone for SettingsKey<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: KeyValue> fmt::Debug for SettingsKey<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SettingsKey")
            .field("name", &self.inner.name)
            .field("type", &std::any::type_name::<T>())
            .finish()
    }
}

impl<T: KeyValue> SettingsKey<T> {
    /// Register a key with a default value
    pub fn new(
        name: impl Into<String>,
        container: &SettingsContainer,
        default_value: T,
    ) -> Result<Self, SettingsError> {
        Self::builder(name, default_value).register(container)
    }

    /// Register a key whose default is built on demand
    pub fn with_default_factory(
        name: impl Into<String>,
        container: &SettingsContainer,
        factory: impl Fn() -> T + Send + Sync + 'static,
    ) -> Result<Self, SettingsError> {
        Self::builder_with_factory(name, factory).register(container)
    }

    pub fn builder(name: impl Into<String>, default_value: T) -> SettingsKeyBuilder<T> {
        SettingsKeyBuilder::new(name, DefaultValue::Value(default_value))
    }

    pub fn builder_with_factory(
        name: impl Into<String>,
        factory: impl Fn() -> T + Send + Sync + 'static,
    ) -> SettingsKeyBuilder<T> {
        SettingsKeyBuilder::new(name, DefaultValue::Factory(Arc::new(factory)))
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn display_name(&self) -> &str {
        &self.inner.display_name
    }

    pub fn description(&self) -> &str {
        &self.inner.description
    }

    pub fn is_list(&self) -> bool {
        self.inner.is_list
    }

    pub fn default_value(&self) -> T {
        self.inner.default.get()
    }

    pub fn acceptable_values(&self) -> Option<Vec<T>> {
        self.inner.acceptable_values.as_ref().map(|provider| provider())
    }

    /// `true` when the key has no acceptable-value list or `value` is in it
    pub fn is_acceptable(&self, value: &T) -> bool {
        self.acceptable_values()
            .map_or(true, |values| values.contains(value))
    }

    /// Type-erased view of this key
    pub fn descriptor(&self) -> Arc<dyn SettingsKeyDescriptor> {
        self.inner.clone()
    }

    /// Resolve the value in `profile` (default: the current profile)
    ///
    /// Fails with [`SettingsError::KeyNotFound`] when neither the profile chain
    /// nor the root holds a value.
    pub fn get_value(
        &self,
        profile: Option<&Arc<SettingsProfile>>,
        search_parent: bool,
        create_in_current: bool,
    ) -> Result<T, SettingsError> {
        let profile = self.resolve_profile(profile)?;
        profile
            .get_value(&self.inner.name, search_parent, create_in_current)
            .map(|value| self.inner.extract(value))
            .ok_or_else(|| SettingsError::KeyNotFound {
                name: self.inner.name.clone(),
            })
    }

    /// Value in the current profile, searching parents
    pub fn get(&self) -> Result<T, SettingsError> {
        self.get_value(None, true, false)
    }

    /// Same resolution as [`SettingsKey::get_value`], never fails
    pub fn try_get_value(
        &self,
        profile: Option<&Arc<SettingsProfile>>,
        search_parent: bool,
        create_in_current: bool,
    ) -> Option<T> {
        self.get_value(profile, search_parent, create_in_current).ok()
    }

    /// Resolved value, or the key default when nothing resolves
    pub fn get_value_or_default(&self, profile: Option<&Arc<SettingsProfile>>) -> T {
        self.try_get_value(profile, true, false)
            .unwrap_or_else(|| self.default_value())
    }

    /// Write into `profile` (default: the current profile)
    pub fn set_value(&self, value: T, profile: Option<&Arc<SettingsProfile>>) -> Result<(), SettingsError> {
        let profile = self.resolve_profile(profile)?;
        profile.set_value_with_kind(&self.inner.name, EntryValue::decoded(value), self.inner.is_list);
        Ok(())
    }

    /// Write into the current profile
    pub fn set(&self, value: T) -> Result<(), SettingsError> {
        self.set_value(value, None)
    }

    /// Decode raw events; the default is returned if they do not fit `T`
    pub fn convert_value(&self, events: &[ParsingEvent]) -> T {
        self.inner.convert_value(events)
    }

    pub fn on_changes_validated(
        &self,
        handler: impl Fn(&ChangesValidatedEvent) + Send + Sync + 'static,
    ) -> SubscriptionId {
        self.inner.changes_validated.subscribe(handler)
    }

    pub fn remove_changes_validated_handler(&self, id: SubscriptionId) -> bool {
        self.inner.changes_validated.unsubscribe(id)
    }

    fn resolve_profile(
        &self,
        profile: Option<&Arc<SettingsProfile>>,
    ) -> Result<Arc<SettingsProfile>, SettingsError> {
        if let Some(profile) = profile {
            return Ok(Arc::clone(profile));
        }
        SettingsContainer::upgrade(&self.inner.container)
            .map(|container| container.current_profile())
            .ok_or_else(|| SettingsError::ContainerDropped {
                name: self.inner.name.clone(),
            })
    }
}

/// A key holding an ordered list of values
pub struct SettingsListKey<T> {
    key: SettingsKey<Vec<T>>,
}

impl<T> Clone for SettingsListKey<T> {
    fn clone(&self) -> Self {
        Self {
            key: self.key.clone(),
        }
    }
}

impl<T: KeyValue> fmt::Debug for SettingsListKey<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("SettingsListKey").field(&self.key).finish()
    }
}

impl<T> SettingsListKey<T>
where
    T: KeyValue,
    Vec<T>: KeyValue,
{
    pub fn new(
        name: impl Into<String>,
        container: &SettingsContainer,
        default_values: impl IntoIterator<Item = T>,
    ) -> Result<Self, SettingsError> {
        Self::builder(name, default_values).register(container)
    }

    pub fn builder(
        name: impl Into<String>,
        default_values: impl IntoIterator<Item = T>,
    ) -> SettingsListKeyBuilder<T> {
        let mut builder = SettingsKey::builder(name, default_values.into_iter().collect::<Vec<T>>());
        builder.is_list = true;
        SettingsListKeyBuilder { builder }
    }

    /// Current list of the current profile, searching parents
    pub fn get_list(&self) -> Result<Vec<T>, SettingsError> {
        self.key.get()
    }

    pub fn set_list(
        &self,
        values: impl IntoIterator<Item = T>,
        profile: Option<&Arc<SettingsProfile>>,
    ) -> Result<(), SettingsError> {
        self.key.set_value(values.into_iter().collect(), profile)
    }

    /// Edit the resolved list and write it back into `profile`
    pub fn update_list(
        &self,
        profile: Option<&Arc<SettingsProfile>>,
        edit: impl FnOnce(&mut Vec<T>),
    ) -> Result<(), SettingsError> {
        let mut values = self.key.get_value(profile, true, false)?;
        edit(&mut values);
        self.key.set_value(values, profile)
    }

    pub fn key(&self) -> &SettingsKey<Vec<T>> {
        &self.key
    }
}

impl<T> Deref for SettingsListKey<T> {
    type Target = SettingsKey<Vec<T>>;

    fn deref(&self) -> &Self::Target {
        &self.key
    }
}

/// Builder for [`SettingsListKey`]
pub struct SettingsListKeyBuilder<T> {
    builder: SettingsKeyBuilder<Vec<T>>,
}

impl<T> SettingsListKeyBuilder<T>
where
    T: KeyValue,
    Vec<T>: KeyValue,
{
    pub fn display_name(self, display_name: impl Into<String>) -> Self {
        Self {
            builder: self.builder.display_name(display_name),
        }
    }

    pub fn description(self, description: impl Into<String>) -> Self {
        Self {
            builder: self.builder.description(description),
        }
    }

    pub fn register(self, container: &SettingsContainer) -> Result<SettingsListKey<T>, SettingsError> {
        Ok(SettingsListKey {
            key: self.builder.register(container)?,
        })
    }
}
