//! Type-erased setting values

use crate::contract::{is_sequence, RawEvents};
use std::any::Any;
use std::fmt;

/// A value that can be stored in a profile entry
///
/// Implemented for every `Clone + PartialEq + Debug + Send + Sync` type.
/// Equality is the concrete type's `PartialEq`, so nested vectors and maps
/// compare element-wise and key-wise.
pub trait SettingValue: Any + Send + Sync + fmt::Debug {
    fn as_any(&self) -> &dyn Any;
    fn clone_boxed(&self) -> Box<dyn SettingValue>;
    fn equals(&self, other: &dyn SettingValue) -> bool;
}

impl<T> SettingValue for T
where
    T: Any + Clone + PartialEq + fmt::Debug + Send + Sync,
{
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn clone_boxed(&self) -> Box<dyn SettingValue> {
        Box::new(self.clone())
    }

    fn equals(&self, other: &dyn SettingValue) -> bool {
        other
            .as_any()
            .downcast_ref::<T>()
            .is_some_and(|other| self == other)
    }
}

/// Owned, decoded value of some concrete type
pub struct DecodedValue(Box<dyn SettingValue>);

impl DecodedValue {
    pub fn new<T: SettingValue>(value: T) -> Self {
        Self(Box::new(value))
    }

    pub fn downcast_ref<T: 'static>(&self) -> Option<&T> {
        self.0.as_ref().as_any().downcast_ref::<T>()
    }

    pub fn as_value(&self) -> &dyn SettingValue {
        self.0.as_ref()
    }
}

impl Clone for DecodedValue {
    fn clone(&self) -> Self {
        Self(self.0.as_ref().clone_boxed())
    }
}

impl PartialEq for DecodedValue {
    fn eq(&self, other: &Self) -> bool {
        self.0.as_ref().equals(other.0.as_ref())
    }
}

impl fmt::Debug for DecodedValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self.0.as_ref(), f)
    }
}

/// Current form of an entry's value
#[derive(Debug, Clone, PartialEq)]
pub enum EntryValue {
    /// Typed value
    Decoded(DecodedValue),
    /// Events kept verbatim because no key was known to decode them
    Raw(RawEvents),
}

impl EntryValue {
    pub fn decoded<T: SettingValue>(value: T) -> Self {
        Self::Decoded(DecodedValue::new(value))
    }

    pub fn raw(events: RawEvents) -> Self {
        Self::Raw(events)
    }

    pub fn is_raw(&self) -> bool {
        matches!(self, Self::Raw(_))
    }

    pub fn as_raw(&self) -> Option<&RawEvents> {
        match self {
            Self::Raw(events) => Some(events),
            Self::Decoded(_) => None,
        }
    }

    pub fn downcast_ref<T: 'static>(&self) -> Option<&T> {
        match self {
            Self::Decoded(value) => value.downcast_ref::<T>(),
            Self::Raw(_) => None,
        }
    }

    /// Shape hint used when no key describes the value
    pub(crate) fn looks_like_list(&self) -> bool {
        match self {
            Self::Raw(events) => is_sequence(events),
            Self::Decoded(_) => false,
        }
    }
}
