//! Domain layer - keys, profiles and the container

pub mod collaborators;
pub mod container;
pub mod entry;
pub mod events;
pub mod key;
pub mod profile;
pub mod transaction;
pub mod value;

pub use collaborators::{FileChangeCallback, FileSystem, FileWatcher, SettingsSerializer, WatchSubscription};
pub use container::{SettingsContainer, SettingsContainerBuilder};
pub use entry::SettingsEntry;
pub use events::{ChangesValidatedEvent, FileModifiedEvent, Observers, SettingsFileLoadedEvent, SubscriptionId};
pub use key::{KeyValue, SettingsKey, SettingsKeyBuilder, SettingsKeyDescriptor, SettingsListKey, SettingsListKeyBuilder};
pub use profile::SettingsProfile;
pub use transaction::{Transaction, TransactionStack, ValueChangeOperation};
pub use value::{DecodedValue, EntryValue, SettingValue};
