//! Contract error types for settings profiles
//!
//! These errors are collaborator-agnostic: serializer and file-system failures
//! are logged at the container boundary and mapped onto these variants.

use std::path::PathBuf;

/// Settings subsystem errors
#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    /// A key with the same name is already registered in the container
    #[error("Settings key already registered: {name}")]
    DuplicateKey {
        /// Key name
        name: String,
    },

    /// No value could be resolved for the key, not even its default
    #[error("Settings key not found: {name}")]
    KeyNotFound {
        /// Key name
        name: String,
    },

    /// The settings file does not exist
    #[error("Settings file [{}] was not found", path.display())]
    FileNotFound {
        /// Requested path
        path: PathBuf,
    },

    /// The profile has never been loaded from or saved to a file
    #[error("Profile {profile_id} has no backing file")]
    MissingFilePath {
        /// Profile identifier
        profile_id: uuid::Uuid,
    },

    /// The settings file could not be parsed
    #[error("Error while loading settings file [{}]: {source:#}", path.display())]
    Deserialization {
        /// File being read
        path: PathBuf,
        /// Underlying serializer failure
        #[source]
        source: anyhow::Error,
    },

    /// A profile could not be written
    #[error("Error while saving settings file [{}]: {source:#}", path.display())]
    Serialization {
        /// File being written
        path: PathBuf,
        /// Underlying serializer or file-system failure
        #[source]
        source: anyhow::Error,
    },

    /// The file watcher refused to watch the backing file
    #[error("Cannot watch settings file [{}]: {source:#}", path.display())]
    Watch {
        /// Watched file
        path: PathBuf,
        /// Underlying watcher failure
        #[source]
        source: anyhow::Error,
    },

    /// A value could not be converted to or from its event form
    #[error("Cannot convert value of settings key {name}: {reason}")]
    Conversion {
        /// Key name
        name: String,
        /// Failure details
        reason: String,
    },

    /// The operation is not legal in the current state
    #[error("Invalid operation: {reason}")]
    InvalidOperation {
        /// Why the operation was rejected
        reason: String,
    },

    /// The container owning a key has been dropped
    #[error("Settings container for key {name} no longer exists")]
    ContainerDropped {
        /// Key name
        name: String,
    },
}

impl SettingsError {
    pub(crate) fn invalid_operation(reason: impl Into<String>) -> Self {
        Self::InvalidOperation {
            reason: reason.into(),
        }
    }
}
