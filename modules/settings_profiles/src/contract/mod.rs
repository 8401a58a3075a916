//! Contract layer - public models and errors
//!
//! Transport-agnostic types shared by the domain and the serializers.

pub mod error;
pub mod model;

pub use error::SettingsError;
pub use model::{is_sequence, ParsingEvent, RawEvents, ScalarValue, SettingsDocument};
