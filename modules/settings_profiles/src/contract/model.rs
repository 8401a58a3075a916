//! Contract models for settings profiles
//!
//! A settings value travels between the core and a serializer as an ordered
//! sequence of [`ParsingEvent`]s. The sequence can be captured and replayed
//! without knowing the concrete type of the value, which is what lets a
//! profile keep settings whose key is not (yet) registered.

use std::collections::BTreeMap;
use std::fmt;

/// One structured parse event
#[derive(Debug, Clone, PartialEq)]
pub enum ParsingEvent {
    /// Start of a mapping; followed by alternating key and value nodes
    MappingStart {
        /// Optional type tag (without the leading `!`)
        tag: Option<String>,
    },
    /// End of the innermost open mapping
    MappingEnd,
    /// Start of a sequence
    SequenceStart {
        /// Optional type tag (without the leading `!`)
        tag: Option<String>,
    },
    /// End of the innermost open sequence
    SequenceEnd,
    /// A scalar node
    Scalar {
        /// Scalar payload
        value: ScalarValue,
        /// Optional type tag (without the leading `!`)
        tag: Option<String>,
    },
}

impl ParsingEvent {
    /// Untagged scalar event
    pub fn scalar(value: impl Into<ScalarValue>) -> Self {
        Self::Scalar {
            value: value.into(),
            tag: None,
        }
    }

    /// Untagged mapping start
    pub fn mapping_start() -> Self {
        Self::MappingStart { tag: None }
    }

    /// Untagged sequence start
    pub fn sequence_start() -> Self {
        Self::SequenceStart { tag: None }
    }
}

/// Payload of a scalar event
#[derive(Debug, Clone, PartialEq)]
pub enum ScalarValue {
    Null,
    Bool(bool),
    Int(i64),
    UInt(u64),
    Float(f64),
    String(String),
}

impl fmt::Display for ScalarValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => write!(f, "~"),
            Self::Bool(b) => write!(f, "{}", b),
            Self::Int(i) => write!(f, "{}", i),
            Self::UInt(u) => write!(f, "{}", u),
            Self::Float(x) => write!(f, "{}", x),
            Self::String(s) => write!(f, "{}", s),
        }
    }
}

impl From<bool> for ScalarValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for ScalarValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<u64> for ScalarValue {
    fn from(value: u64) -> Self {
        Self::UInt(value)
    }
}

impl From<f64> for ScalarValue {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<&str> for ScalarValue {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<String> for ScalarValue {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

/// Serialized form of a single value
pub type RawEvents = Vec<ParsingEvent>;

/// In-memory form of a settings file: setting name to serialized value,
/// ordered by name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SettingsDocument {
    pub settings: BTreeMap<String, RawEvents>,
}

impl SettingsDocument {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, value: RawEvents) {
        self.settings.insert(name.into(), value);
    }

    pub fn get(&self, name: &str) -> Option<&RawEvents> {
        self.settings.get(name)
    }

    pub fn len(&self) -> usize {
        self.settings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.settings.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &RawEvents)> {
        self.settings.iter()
    }
}

/// Returns `true` when the serialized value is a sequence
pub fn is_sequence(events: &[ParsingEvent]) -> bool {
    matches!(events.first(), Some(ParsingEvent::SequenceStart { .. }))
}
