//! Settings Profiles
//!
//! Typed configuration values stored in inheritable profiles. Keys are
//! registered once in a [`SettingsContainer`]; profiles resolve lookups
//! through their parent chain, record changes for validate or discard, and
//! persist to settings files while keeping unknown settings verbatim.

// Public exports
pub mod contract;
pub use contract::{ParsingEvent, RawEvents, ScalarValue, SettingsDocument, SettingsError};

pub mod config;
pub use config::SettingsConfig;

pub mod domain;
pub use domain::{
    ChangesValidatedEvent, EntryValue, FileModifiedEvent, SettingsContainer, SettingsFileLoadedEvent,
    SettingsKey, SettingsListKey, SettingsProfile, SubscriptionId,
};

pub mod infra;
pub use infra::{LocalFileSystem, ManualFileWatcher, YamlSettingsSerializer};
