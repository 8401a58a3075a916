//! Settings document serializers

pub mod events;
pub mod yaml;

pub use events::{from_events, to_events};
pub use yaml::YamlSettingsSerializer;
