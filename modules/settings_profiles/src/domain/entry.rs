//! Value slot for one key inside one profile

use super::key::SettingsKeyDescriptor;
use super::value::EntryValue;
use crate::contract::{RawEvents, SettingsError};

#[derive(Debug, Clone, PartialEq)]
pub struct SettingsEntry {
    name: String,
    value: EntryValue,
    should_notify: bool,
    is_list: bool,
}

impl SettingsEntry {
    /// New entry; change tracking is enabled
    pub fn from_value(name: impl Into<String>, value: EntryValue, is_list: bool) -> Self {
        Self {
            name: name.into(),
            value,
            should_notify: true,
            is_list,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn value(&self) -> &EntryValue {
        &self.value
    }

    pub fn should_notify(&self) -> bool {
        self.should_notify
    }

    pub fn set_should_notify(&mut self, should_notify: bool) {
        self.should_notify = should_notify;
    }

    pub fn is_list(&self) -> bool {
        self.is_list
    }

    /// Store `value`; returns the replaced value when the change must be recorded
    ///
    /// Equal values are ignored. Nothing is returned while notifications are
    /// off or the owning profile is discarding.
    pub(crate) fn update_value(&mut self, value: EntryValue, discarding: bool) -> Option<EntryValue> {
        if self.value == value {
            return None;
        }
        let previous = std::mem::replace(&mut self.value, value);
        (self.should_notify && !discarding).then_some(previous)
    }

    /// Swap the value without recording a change
    pub(crate) fn replace_untracked(&mut self, value: EntryValue, is_list: bool) {
        self.value = value;
        self.is_list = is_list;
    }

    /// Value in its serialized form
    ///
    /// Raw values are returned verbatim so untouched settings keep their
    /// original shape. Decoded values need the key to be encoded.
    pub fn get_serializable_value(
        &self,
        key: Option<&dyn SettingsKeyDescriptor>,
    ) -> Result<RawEvents, SettingsError> {
        match (&self.value, key) {
            (EntryValue::Raw(events), _) => Ok(events.clone()),
            (EntryValue::Decoded(value), Some(key)) => key.encode(value),
            (EntryValue::Decoded(_), None) => Err(SettingsError::invalid_operation(format!(
                "no settings key registered to serialize the value of {}",
                self.name
            ))),
        }
    }
}
