//! Infrastructure layer - serializer, file system and watcher implementations

pub mod fs;
pub mod serialization;
pub mod watcher;

pub use fs::LocalFileSystem;
pub use serialization::YamlSettingsSerializer;
pub use watcher::ManualFileWatcher;
